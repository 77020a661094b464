//! One open folder.
//!
//! A `Session` owns the folder's root path, its metadata table, and its
//! vector store, and is the only way the rest of the crate touches either.
//! Opening a folder reconciles the table against the files on disk and
//! syncs the vector store; switching folders means building a new session
//! (the daemon replaces its current one, which drops the old stores).
//! All mutations go through `&mut self`, so a session's two stores cannot
//! race each other.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::annotate::{self, AnnotateError, Captioner, CaptionerError};
use crate::gallery::{ImageRecord, MetadataSnapshot, RecordPatch, SearchHit};
use crate::scanner::ScanError;
use crate::search;
use crate::semantic::{Embedder, VectorStore, VectorStoreError};
use crate::store::{MetadataStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum GalleryError {
    #[error("folder not found: {0}")]
    FolderNotFound(String),

    #[error("image not found: {0}")]
    ImageNotFound(String),

    #[error("no metadata for folder: {0}")]
    MetadataNotFound(String),

    #[error("no folder is open")]
    NoFolderOpen,

    #[error("metadata store error: {0}")]
    Store(StoreError),

    #[error("vector store error: {0}")]
    Vector(#[from] VectorStoreError),

    #[error("annotation failed: {0}")]
    Annotation(CaptionerError),

    #[error("io error: {0}")]
    Io(std::io::Error),
}

impl From<StoreError> for GalleryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(folder) => GalleryError::MetadataNotFound(folder),
            StoreError::Scan(ScanError::NotFound(folder)) => GalleryError::FolderNotFound(folder),
            other => GalleryError::Store(other),
        }
    }
}

impl From<AnnotateError> for GalleryError {
    fn from(err: AnnotateError) -> Self {
        match err {
            AnnotateError::NotFound(path) => GalleryError::ImageNotFound(path),
            AnnotateError::Captioner(err) => GalleryError::Annotation(err),
            AnnotateError::Io { source, .. } => GalleryError::Io(source),
        }
    }
}

pub struct Session {
    root: PathBuf,
    store: MetadataStore,
    vectors: VectorStore,
}

impl Session {
    /// Open a folder: reconcile its metadata against the files on disk,
    /// then bring the vector store in line with the result.
    pub fn open(
        root: impl Into<PathBuf>,
        embedder: Arc<dyn Embedder>,
        distance_threshold: f32,
    ) -> Result<(Self, MetadataSnapshot), GalleryError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(GalleryError::FolderNotFound(root.display().to_string()));
        }

        log::info!("opening folder {}", root.display());

        let store = MetadataStore::new(root.clone());
        let snapshot = store.reconcile()?;

        let mut vectors = VectorStore::open(&root, embedder, distance_threshold)?;
        vectors.sync(&snapshot)?;

        let session = Self {
            root,
            store,
            vectors,
        };
        Ok((session, snapshot))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn indexed_count(&self) -> usize {
        self.vectors.len()
    }

    /// Re-run reconciliation and vector sync, e.g. after files changed on
    /// disk while the folder was open.
    pub fn rescan(&mut self) -> Result<MetadataSnapshot, GalleryError> {
        let snapshot = self.store.reconcile()?;
        self.vectors.sync(&snapshot)?;
        Ok(snapshot)
    }

    pub fn snapshot(&self) -> Result<MetadataSnapshot, GalleryError> {
        Ok(self.store.load()?)
    }

    /// Every image in the folder, hydrated for display.
    pub fn list(&self) -> Result<Vec<SearchHit>, GalleryError> {
        let snapshot = self.snapshot()?;
        Ok(snapshot
            .iter()
            .map(|(path, record)| SearchHit::hydrate(path, record))
            .collect())
    }

    /// Hybrid search over the folder's current metadata.
    pub fn search(&self, query: &str) -> Result<Vec<SearchHit>, GalleryError> {
        let snapshot = self.snapshot()?;
        Ok(search::search(query, &snapshot, &self.vectors))
    }

    /// Run the annotation pipeline for one image and write the result
    /// through both stores. A pipeline failure writes nothing.
    pub fn annotate_image(
        &mut self,
        path: &str,
        captioner: &dyn Captioner,
    ) -> Result<ImageRecord, GalleryError> {
        let record = annotate::annotate(&self.root, path, captioner)?;

        self.store.replace(path, record.clone())?;
        self.vectors.upsert(path, &record)?;

        Ok(record)
    }

    /// Apply a manual metadata edit and write it through both stores.
    pub fn update_metadata(
        &mut self,
        path: &str,
        patch: RecordPatch,
    ) -> Result<ImageRecord, GalleryError> {
        let record = self.store.update(path, patch)?;
        self.vectors.upsert(path, &record)?;
        Ok(record)
    }

    /// Absolute path of one image for serving, rejecting traversal out of
    /// the folder.
    pub fn image_path(&self, rel: &str) -> Result<PathBuf, GalleryError> {
        let rel_path = Path::new(rel);
        let escapes = rel_path
            .components()
            .any(|part| matches!(part, Component::ParentDir | Component::RootDir));
        if escapes {
            return Err(GalleryError::ImageNotFound(rel.to_string()));
        }

        let full = self.root.join(rel_path);
        if !full.is_file() {
            return Err(GalleryError::ImageNotFound(rel.to_string()));
        }
        Ok(full)
    }
}
