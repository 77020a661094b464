//! Annotation pipeline.
//!
//! Turns one image into a finished `ImageRecord` by calling the captioning
//! collaborator three times (description, tags, text). The pipeline itself
//! never writes storage: the session layer pushes the returned record
//! through the metadata table and vector store, and a failed captioner
//! call therefore writes nothing anywhere.

pub mod captioner;

pub use captioner::{Captioner, CaptionerError, OllamaCaptioner};

use std::path::Path;

use crate::gallery::ImageRecord;

/// Images below this size are not worth a model round-trip.
pub const MIN_IMAGE_BYTES: u64 = 40 * 1024;

/// Sentinel description for images under the size floor.
pub const TOO_SMALL_DESCRIPTION: &str = "Image too small to process.";

#[derive(Debug, thiserror::Error)]
pub enum AnnotateError {
    #[error("image not found: {0}")]
    NotFound(String),

    #[error("failed to read image {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Captioner(#[from] CaptionerError),
}

/// Annotate the image at `path` (relative to `root`).
///
/// Files under `MIN_IMAGE_BYTES` get the sentinel record without any
/// captioner call. `text_content` is forced empty whenever the collaborator
/// reports `has_text == false`, whatever it put in the field.
pub fn annotate(
    root: &Path,
    path: &str,
    captioner: &dyn Captioner,
) -> Result<ImageRecord, AnnotateError> {
    let full_path = root.join(path);
    if !full_path.is_file() {
        return Err(AnnotateError::NotFound(path.to_string()));
    }

    let io_err = |source: std::io::Error| AnnotateError::Io {
        path: path.to_string(),
        source,
    };

    let size = std::fs::metadata(&full_path).map_err(io_err)?.len();
    if size < MIN_IMAGE_BYTES {
        log::info!("skipping {path}: {size} bytes is below the annotation floor");
        return Ok(ImageRecord {
            description: TOO_SMALL_DESCRIPTION.to_string(),
            tags: Vec::new(),
            text_content: String::new(),
            is_processed: true,
        });
    }

    let image = std::fs::read(&full_path).map_err(io_err)?;

    log::info!("annotating {path} ({size} bytes)");
    let description = captioner.describe(&image)?;
    let tags = captioner.tag(&image)?;
    let text = captioner.extract_text(&image)?;

    let text_content = if text.has_text {
        text.text_content
    } else {
        String::new()
    };

    Ok(ImageRecord {
        description: description.description,
        tags: tags.tags,
        text_content,
        is_processed: true,
    })
}
