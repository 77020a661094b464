use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The persisted metadata table for one folder: relative path -> record.
///
/// A BTreeMap keeps iteration (and therefore serialization) order stable,
/// so reconciling twice without filesystem changes rewrites the exact same
/// bytes.
pub type MetadataSnapshot = BTreeMap<String, ImageRecord>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub text_content: String,

    /// Derived: true iff any of the three fields above is non-empty.
    /// Recomputed on every reconcile and patch.
    #[serde(default)]
    pub is_processed: bool,
}

impl ImageRecord {
    pub fn has_content(&self) -> bool {
        !self.description.is_empty() || !self.tags.is_empty() || !self.text_content.is_empty()
    }

    pub fn refresh_processed(&mut self) {
        self.is_processed = self.has_content();
    }

    /// Text fed to the embedding model for this record.
    pub fn embedding_text(&self) -> String {
        format!(
            "{} {} {}",
            self.description,
            self.tags.join(" "),
            self.text_content
        )
    }

    /// Case-insensitive substring match across description, extracted text
    /// and tags. `needle` must already be lowercased.
    pub fn matches(&self, needle: &str) -> bool {
        self.description.to_lowercase().contains(needle)
            || self.text_content.to_lowercase().contains(needle)
            || self.tags.iter().any(|tag| tag.to_lowercase().contains(needle))
    }
}

/// Partial update for one record. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RecordPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_content: Option<String>,
}

/// Merge a patch into a record and recompute the derived flag.
pub fn apply_patch(record: &mut ImageRecord, patch: RecordPatch) {
    if let Some(description) = patch.description {
        record.description = description;
    }
    if let Some(tags) = patch.tags {
        record.tags = tags;
    }
    if let Some(text_content) = patch.text_content {
        record.text_content = text_content;
    }
    record.refresh_processed();
}

/// One hybrid search result, hydrated from the metadata record.
/// Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub name: String,
    pub path: String,
    pub description: String,
    pub tags: Vec<String>,
    pub text_content: String,
    pub is_processed: bool,
}

impl SearchHit {
    pub fn hydrate(path: &str, record: &ImageRecord) -> Self {
        let name = path.rsplit('/').next().unwrap_or(path).to_string();
        Self {
            name,
            path: path.to_string(),
            description: record.description.clone(),
            tags: record.tags.clone(),
            text_content: record.text_content.clone(),
            is_processed: record.is_processed,
        }
    }
}
