//! In-memory vector entries with nearest-neighbor lookup.
//!
//! Entries are keyed by the image's relative path and carry, besides the
//! embedding, a flattened copy of the annotation fields. Distances are
//! squared L2, which over the embedding model's normalized output orders
//! the same way as cosine distance.

use std::collections::HashMap;

use crate::gallery::ImageRecord;

/// Flattened annotation fields stored next to each embedding. Tags are
/// collapsed to a comma-joined string and the processed flag to its text
/// form so every projected field is a plain string on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordProjection {
    pub description: String,
    pub tags: String,
    pub text_content: String,
    pub is_processed: String,
}

impl RecordProjection {
    pub fn from_record(record: &ImageRecord) -> Self {
        Self {
            description: record.description.clone(),
            tags: record.tags.join(","),
            text_content: record.text_content.clone(),
            is_processed: record.is_processed.to_string(),
        }
    }

    /// Re-inflate the projection. Only used for diagnostics and tests; the
    /// metadata table stays authoritative for these fields.
    pub fn to_record(&self) -> ImageRecord {
        ImageRecord {
            description: self.description.clone(),
            tags: if self.tags.is_empty() {
                Vec::new()
            } else {
                self.tags.split(',').map(|t| t.to_string()).collect()
            },
            text_content: self.text_content.clone(),
            is_processed: self.is_processed == "true",
        }
    }
}

#[derive(Debug, Clone)]
pub struct VectorEntry {
    pub projection: RecordProjection,
    pub embedding: Vec<f32>,
}

/// A nearest-neighbor hit, ascending distance = more similar.
#[derive(Debug, Clone)]
pub struct Neighbor {
    pub path: String,
    pub distance: f32,
}

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Path-keyed vector entries for one folder.
pub struct VectorIndex {
    entries: HashMap<String, VectorEntry>,
    dimensions: usize,
}

impl VectorIndex {
    pub fn new(dimensions: usize) -> Self {
        Self {
            entries: HashMap::new(),
            dimensions,
        }
    }

    pub fn with_capacity(dimensions: usize, capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
            dimensions,
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert or replace the entry for `path`.
    pub fn insert(
        &mut self,
        path: &str,
        projection: RecordProjection,
        embedding: Vec<f32>,
    ) -> Result<(), IndexError> {
        if embedding.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: embedding.len(),
            });
        }

        self.entries.insert(
            path.to_string(),
            VectorEntry {
                projection,
                embedding,
            },
        );

        Ok(())
    }

    pub fn remove(&mut self, path: &str) -> Option<VectorEntry> {
        self.entries.remove(path)
    }

    pub fn get(&self, path: &str) -> Option<&VectorEntry> {
        self.entries.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &VectorEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// The `limit` entries closest to `query`, ascending by distance.
    /// No threshold is applied here; the store layer filters.
    pub fn nearest(&self, query: &[f32], limit: usize) -> Result<Vec<Neighbor>, IndexError> {
        if query.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: query.len(),
            });
        }

        let mut neighbors: Vec<Neighbor> = self
            .entries
            .iter()
            .map(|(path, entry)| Neighbor {
                path: path.clone(),
                distance: squared_distance(query, &entry.embedding),
            })
            .collect();

        neighbors.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        neighbors.truncate(limit);

        Ok(neighbors)
    }
}

fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn projection() -> RecordProjection {
        RecordProjection {
            description: String::new(),
            tags: String::new(),
            text_content: String::new(),
            is_processed: "false".to_string(),
        }
    }

    #[test]
    fn test_insert_and_get() {
        let mut index = VectorIndex::new(3);
        index
            .insert("a.jpg", projection(), vec![1.0, 0.0, 0.0])
            .unwrap();

        assert_eq!(index.len(), 1);
        assert!(index.contains("a.jpg"));
        assert_eq!(index.get("a.jpg").unwrap().embedding, vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut index = VectorIndex::new(3);
        index
            .insert("a.jpg", projection(), vec![1.0, 0.0, 0.0])
            .unwrap();
        index
            .insert("a.jpg", projection(), vec![0.0, 1.0, 0.0])
            .unwrap();

        assert_eq!(index.len(), 1);
        assert_eq!(index.get("a.jpg").unwrap().embedding, vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_insert_dimension_mismatch() {
        let mut index = VectorIndex::new(3);
        let result = index.insert("a.jpg", projection(), vec![1.0, 0.0, 0.0, 0.0]);
        assert!(matches!(result, Err(IndexError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_remove_is_noop_when_absent() {
        let mut index = VectorIndex::new(3);
        assert!(index.remove("ghost.jpg").is_none());
    }

    #[test]
    fn test_nearest_orders_by_ascending_distance() {
        let mut index = VectorIndex::new(2);
        index.insert("far.jpg", projection(), vec![3.0, 0.0]).unwrap();
        index.insert("near.jpg", projection(), vec![1.0, 0.0]).unwrap();
        index.insert("mid.jpg", projection(), vec![2.0, 0.0]).unwrap();

        let neighbors = index.nearest(&[0.0, 0.0], 10).unwrap();
        let order: Vec<&str> = neighbors.iter().map(|n| n.path.as_str()).collect();
        assert_eq!(order, vec!["near.jpg", "mid.jpg", "far.jpg"]);
        assert!((neighbors[0].distance - 1.0).abs() < f32::EPSILON);
        assert!((neighbors[2].distance - 9.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_nearest_respects_limit() {
        let mut index = VectorIndex::new(2);
        for i in 0..5 {
            index
                .insert(&format!("{i}.jpg"), projection(), vec![i as f32, 0.0])
                .unwrap();
        }

        let neighbors = index.nearest(&[0.0, 0.0], 2).unwrap();
        assert_eq!(neighbors.len(), 2);
    }

    #[test]
    fn test_nearest_dimension_mismatch() {
        let index = VectorIndex::new(3);
        assert!(matches!(
            index.nearest(&[1.0], 10),
            Err(IndexError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_projection_roundtrip() {
        let record = ImageRecord {
            description: "red car".to_string(),
            tags: vec!["vehicle".to_string(), "street".to_string()],
            text_content: "STOP".to_string(),
            is_processed: true,
        };

        let projection = RecordProjection::from_record(&record);
        assert_eq!(projection.tags, "vehicle,street");
        assert_eq!(projection.is_processed, "true");
        assert_eq!(projection.to_record(), record);
    }

    #[test]
    fn test_projection_empty_tags() {
        let record = ImageRecord::default();
        let projection = RecordProjection::from_record(&record);
        assert_eq!(projection.to_record().tags, Vec::<String>::new());
    }
}
