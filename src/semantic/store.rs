//! Folder-scoped vector store.
//!
//! Combines an embedder, the in-memory index, and the on-disk file into
//! the store the session layer talks to. Mutations persist write-through
//! and their failures propagate; `search` instead degrades to an empty
//! result so a broken index never takes hybrid search down with it.

use std::path::Path;
use std::sync::Arc;

use crate::gallery::{ImageRecord, MetadataSnapshot};
use crate::semantic::embeddings::{Embedder, EmbeddingError};
use crate::semantic::index::{IndexError, Neighbor, RecordProjection, VectorIndex};
use crate::semantic::storage::{VectorStorage, VectorStorageError};
use crate::semantic::VECTOR_DIR;

#[derive(Debug, thiserror::Error)]
pub enum VectorStoreError {
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Storage error: {0}")]
    Storage(#[from] VectorStorageError),
}

pub struct VectorStore {
    embedder: Arc<dyn Embedder>,
    index: VectorIndex,
    storage: VectorStorage,
    threshold: f32,
}

impl VectorStore {
    /// Open (or create) the vector store for `root`.
    ///
    /// A persisted file written by a different model or format version is
    /// discarded and rebuilt by the next `sync` rather than treated as
    /// fatal; genuine corruption propagates.
    pub fn open(
        root: &Path,
        embedder: Arc<dyn Embedder>,
        threshold: f32,
    ) -> Result<Self, VectorStoreError> {
        let dir = root.join(VECTOR_DIR);
        std::fs::create_dir_all(&dir).map_err(VectorStorageError::Io)?;

        let storage = VectorStorage::new(dir.join("vectors.bin"));
        let model_id = embedder.model_id_hash();
        let dimensions = embedder.dimensions();

        let index = if storage.exists() {
            match storage.load(&model_id, dimensions) {
                Ok(index) => {
                    log::info!("loaded {} vectors from {}", index.len(), dir.display());
                    index
                }
                Err(VectorStorageError::ModelMismatch) => {
                    log::warn!("embedding model changed, starting a fresh index");
                    VectorIndex::new(dimensions)
                }
                Err(VectorStorageError::VersionMismatch(file_version, _)) => {
                    log::warn!(
                        "vector file version {} unsupported, starting a fresh index",
                        file_version
                    );
                    VectorIndex::new(dimensions)
                }
                Err(err) => return Err(err.into()),
            }
        } else {
            VectorIndex::new(dimensions)
        };

        Ok(Self {
            embedder,
            index,
            storage,
            threshold,
        })
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.index.contains(path)
    }

    pub fn paths(&self) -> Vec<String> {
        self.index.paths().map(|p| p.to_string()).collect()
    }

    /// The denormalized copy of the record stored next to the embedding.
    pub fn projection(&self, path: &str) -> Option<ImageRecord> {
        self.index.get(path).map(|entry| entry.projection.to_record())
    }

    /// Embed the record's annotation text and store it under `path`,
    /// replacing any previous entry.
    pub fn upsert(&mut self, path: &str, record: &ImageRecord) -> Result<(), VectorStoreError> {
        let embedding = self.embedder.embed(&record.embedding_text())?;
        self.index
            .insert(path, RecordProjection::from_record(record), embedding)?;
        self.save()
    }

    /// Drop the entry for `path`. Not an error if it was never indexed.
    pub fn remove(&mut self, path: &str) -> Result<(), VectorStoreError> {
        if self.index.remove(path).is_some() {
            self.save()?;
        }
        Ok(())
    }

    /// Make the index key set exactly the snapshot's key set: remove
    /// entries the snapshot no longer has, then re-upsert every record
    /// (unchanged ones included; the idempotent cost is accepted).
    /// Persists once at the end.
    pub fn sync(&mut self, snapshot: &MetadataSnapshot) -> Result<(), VectorStoreError> {
        let stale: Vec<String> = self
            .index
            .paths()
            .filter(|path| !snapshot.contains_key(*path))
            .map(|path| path.to_string())
            .collect();

        for path in &stale {
            self.index.remove(path);
        }

        for (path, record) in snapshot {
            let embedding = self.embedder.embed(&record.embedding_text())?;
            self.index
                .insert(path, RecordProjection::from_record(record), embedding)?;
        }

        self.save()?;

        log::debug!(
            "vector sync complete: {} entries, {} stale removed",
            self.index.len(),
            stale.len()
        );

        Ok(())
    }

    /// Nearest-neighbor search over the indexed annotation text.
    ///
    /// Fetches the `2 * limit` closest entries, keeps those strictly
    /// below the distance threshold, and truncates to `limit`, ascending
    /// by distance. Any internal failure is logged and yields an empty
    /// result instead of propagating.
    pub fn search(&self, query: &str, limit: usize) -> Vec<Neighbor> {
        match self.try_search(query, limit) {
            Ok(neighbors) => neighbors,
            Err(err) => {
                log::warn!("vector search failed, returning no semantic matches: {err}");
                Vec::new()
            }
        }
    }

    fn try_search(&self, query: &str, limit: usize) -> Result<Vec<Neighbor>, VectorStoreError> {
        let embedding = self.embedder.embed(query)?;
        let mut neighbors = self.index.nearest(&embedding, limit.saturating_mul(2))?;
        neighbors.retain(|n| n.distance < self.threshold);
        neighbors.truncate(limit);
        Ok(neighbors)
    }

    fn save(&self) -> Result<(), VectorStoreError> {
        self.storage
            .save(&self.index, &self.embedder.model_id_hash())?;
        Ok(())
    }
}
