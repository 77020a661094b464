//! Deterministic fakes shared by the integration tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::annotate::captioner::{
    Captioner, CaptionerError, ImageDescription, ImageTags, ImageText,
};
use crate::semantic::{Embedder, EmbeddingError};

/// Embedder backed by a fixed text -> vector table. Unknown text embeds
/// to the origin, so distances stay predictable.
pub struct StubEmbedder {
    vectors: HashMap<String, Vec<f32>>,
    dimensions: usize,
    fail: bool,
}

impl StubEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            vectors: HashMap::new(),
            dimensions,
            fail: false,
        }
    }

    /// An embedder whose every call fails, for degradation tests.
    pub fn failing(dimensions: usize) -> Self {
        Self {
            vectors: HashMap::new(),
            dimensions,
            fail: true,
        }
    }

    pub fn with(mut self, text: &str, vector: &[f32]) -> Self {
        self.vectors.insert(text.to_string(), vector.to_vec());
        self
    }

    pub fn shared(self) -> Arc<dyn Embedder> {
        Arc::new(self)
    }
}

impl Embedder for StubEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if self.fail {
            return Err(EmbeddingError::EmbeddingFailed(
                "stub embedder failure".to_string(),
            ));
        }

        Ok(self
            .vectors
            .get(text)
            .cloned()
            .unwrap_or_else(|| vec![0.0; self.dimensions]))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id_hash(&self) -> [u8; 32] {
        [42u8; 32]
    }
}

/// Captioner returning canned annotations, counting invocations.
pub struct FakeCaptioner {
    pub description: String,
    pub tags: Vec<String>,
    pub has_text: bool,
    pub text_content: String,
    calls: AtomicUsize,
}

impl FakeCaptioner {
    pub fn new(description: &str, tags: &[&str]) -> Self {
        Self {
            description: description.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            has_text: false,
            text_content: String::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.has_text = true;
        self.text_content = text.to_string();
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Captioner for FakeCaptioner {
    fn describe(&self, _image: &[u8]) -> Result<ImageDescription, CaptionerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ImageDescription {
            description: self.description.clone(),
        })
    }

    fn tag(&self, _image: &[u8]) -> Result<ImageTags, CaptionerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ImageTags {
            tags: self.tags.clone(),
        })
    }

    fn extract_text(&self, _image: &[u8]) -> Result<ImageText, CaptionerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ImageText {
            has_text: self.has_text,
            text_content: self.text_content.clone(),
        })
    }
}
