//! Durable metadata table for one folder.
//!
//! The table lives next to the images as `image_metadata.json` and is the
//! single source of truth for what the gallery shows. All writes go through
//! a whole-file read-modify-write with an atomic replace (temp file, then
//! rename), so readers never observe a truncated file. Concurrent writers
//! are not locked against each other; the daemon serializes them through
//! its single session.

use std::path::{Path, PathBuf};

use crate::gallery::{apply_patch, ImageRecord, MetadataSnapshot, RecordPatch};
use crate::scanner::{self, ScanError};

/// File name of the persisted snapshot inside the folder.
pub const METADATA_FILE: &str = "image_metadata.json";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no metadata file for folder: {0}")]
    NotFound(String),

    #[error("metadata io failure on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("metadata file is not valid json: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error(transparent)]
    Scan(#[from] ScanError),
}

pub struct MetadataStore {
    root: PathBuf,
}

impl MetadataStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_path(&self) -> PathBuf {
        self.root.join(METADATA_FILE)
    }

    /// Read the persisted snapshot without touching the filesystem scan.
    pub fn load(&self) -> Result<MetadataSnapshot, StoreError> {
        let path = self.file_path();
        if !path.exists() {
            return Err(StoreError::NotFound(self.root.display().to_string()));
        }

        let bytes = std::fs::read(&path).map_err(|source| StoreError::Io {
            path: path.display().to_string(),
            source,
        })?;

        Ok(serde_json::from_slice(&bytes)?)
    }

    fn load_or_empty(&self) -> Result<MetadataSnapshot, StoreError> {
        match self.load() {
            Ok(snapshot) => Ok(snapshot),
            Err(StoreError::NotFound(_)) => Ok(MetadataSnapshot::new()),
            Err(err) => Err(err),
        }
    }

    /// Bring the snapshot in line with the files currently on disk.
    ///
    /// New paths get a fresh empty record, records for vanished paths are
    /// dropped, and `is_processed` is recomputed everywhere. This is the
    /// only operation that adds or removes entries.
    pub fn reconcile(&self) -> Result<MetadataSnapshot, StoreError> {
        let scanned = scanner::scan_folder(&self.root)?;
        let mut snapshot = self.load_or_empty()?;

        snapshot.retain(|path, _| scanned.binary_search(path).is_ok());

        for path in scanned {
            snapshot.entry(path).or_default();
        }

        for record in snapshot.values_mut() {
            record.refresh_processed();
        }

        self.persist(&snapshot)?;

        log::debug!(
            "reconciled {}: {} images tracked",
            self.root.display(),
            snapshot.len()
        );

        Ok(snapshot)
    }

    /// Merge a partial update into the record for `path`, creating the
    /// record when it does not exist yet so later reads always succeed.
    pub fn update(&self, path: &str, patch: RecordPatch) -> Result<ImageRecord, StoreError> {
        let mut snapshot = self.load_or_empty()?;

        let record = snapshot.entry(path.to_string()).or_default();
        apply_patch(record, patch);
        let updated = record.clone();

        self.persist(&snapshot)?;
        Ok(updated)
    }

    /// Overwrite the record for `path` wholesale, as the annotation
    /// pipeline does after a successful captioning run.
    pub fn replace(&self, path: &str, record: ImageRecord) -> Result<(), StoreError> {
        let mut snapshot = self.load_or_empty()?;
        snapshot.insert(path.to_string(), record);
        self.persist(&snapshot)
    }

    fn persist(&self, snapshot: &MetadataSnapshot) -> Result<(), StoreError> {
        let path = self.file_path();
        let temp_path = path.with_extension("json.tmp");

        let bytes = serde_json::to_vec_pretty(snapshot)?;

        let io_err = |source: std::io::Error, at: &Path| StoreError::Io {
            path: at.display().to_string(),
            source,
        };

        if let Err(source) = std::fs::write(&temp_path, &bytes) {
            return Err(io_err(source, &temp_path));
        }

        if let Err(source) = std::fs::rename(&temp_path, &path) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(io_err(source, &path));
        }

        Ok(())
    }
}
