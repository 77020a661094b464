//! Session flows: open/reconcile, annotate write-through, manual edits,
//! rescans after filesystem changes, and folder switching.

use std::fs;
use std::path::Path;

use crate::gallery::RecordPatch;
use crate::session::{GalleryError, Session};
use crate::store::{MetadataStore, METADATA_FILE};
use crate::tests::support::{FakeCaptioner, StubEmbedder};

fn image(dir: &Path, name: &str, kib: usize) {
    if let Some(parent) = dir.join(name).parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(dir.join(name), vec![0u8; kib * 1024]).unwrap();
}

#[test]
fn test_open_missing_folder() {
    let dir = tempfile::tempdir().unwrap();
    let result = Session::open(
        dir.path().join("nope"),
        StubEmbedder::new(2).shared(),
        1.5,
    );
    assert!(matches!(result, Err(GalleryError::FolderNotFound(_))));
}

#[test]
fn test_open_reconciles_and_syncs() {
    let dir = tempfile::tempdir().unwrap();
    image(dir.path(), "a.jpg", 1);
    image(dir.path(), "nested/b.png", 1);
    fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

    let (session, snapshot) =
        Session::open(dir.path(), StubEmbedder::new(2).shared(), 1.5).unwrap();

    // membership invariant: snapshot keys == scanned image files
    let keys: Vec<&str> = snapshot.keys().map(|k| k.as_str()).collect();
    assert_eq!(keys, vec!["a.jpg", "nested/b.png"]);

    // sync invariant: the index tracks the same set
    assert_eq!(session.indexed_count(), 2);

    assert!(dir.path().join(METADATA_FILE).exists());
    assert!(dir.path().join(".vectordb/vectors.bin").exists());
}

#[test]
fn test_annotate_writes_through_both_stores() {
    let dir = tempfile::tempdir().unwrap();
    image(dir.path(), "barn.jpg", 41);

    let (mut session, _) =
        Session::open(dir.path(), StubEmbedder::new(2).shared(), 1.5).unwrap();

    let captioner = FakeCaptioner::new("a red barn", &["barn", "farm"]).with_text("EST 1902");
    let record = session.annotate_image("barn.jpg", &captioner).unwrap();

    assert_eq!(captioner.call_count(), 3);
    assert_eq!(record.description, "a red barn");
    assert_eq!(record.text_content, "EST 1902");
    assert!(record.is_processed);

    // metadata table has the record
    let store = MetadataStore::new(dir.path());
    let persisted = store.load().unwrap();
    assert_eq!(persisted["barn.jpg"], record);

    // and the search path sees it immediately
    let hits = session.search("farm").unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].path, "barn.jpg");
}

#[test]
fn test_small_image_annotation_skips_model() {
    let dir = tempfile::tempdir().unwrap();
    image(dir.path(), "thumb.jpg", 39);

    let (mut session, _) =
        Session::open(dir.path(), StubEmbedder::new(2).shared(), 1.5).unwrap();

    let captioner = FakeCaptioner::new("never used", &[]);
    let record = session.annotate_image("thumb.jpg", &captioner).unwrap();

    assert_eq!(captioner.call_count(), 0);
    assert_eq!(record.description, "Image too small to process.");
    assert!(record.is_processed);
}

#[test]
fn test_update_metadata_writes_through() {
    let dir = tempfile::tempdir().unwrap();
    image(dir.path(), "a.jpg", 1);

    let (mut session, _) =
        Session::open(dir.path(), StubEmbedder::new(2).shared(), 1.5).unwrap();

    let record = session
        .update_metadata(
            "a.jpg",
            RecordPatch {
                tags: Some(vec!["holiday".to_string()]),
                ..Default::default()
            },
        )
        .unwrap();
    assert!(record.is_processed);

    let hits = session.search("holiday").unwrap();
    assert_eq!(hits.len(), 1);
}

#[test]
fn test_rescan_drops_deleted_images_everywhere() {
    let dir = tempfile::tempdir().unwrap();
    image(dir.path(), "keep.jpg", 1);
    image(dir.path(), "drop.jpg", 1);

    let (mut session, snapshot) =
        Session::open(dir.path(), StubEmbedder::new(2).shared(), 1.5).unwrap();
    assert_eq!(snapshot.len(), 2);

    fs::remove_file(dir.path().join("drop.jpg")).unwrap();
    let snapshot = session.rescan().unwrap();

    assert_eq!(snapshot.len(), 1);
    assert!(snapshot.contains_key("keep.jpg"));
    assert_eq!(session.indexed_count(), 1);
}

#[test]
fn test_reopening_preserves_annotations() {
    let dir = tempfile::tempdir().unwrap();
    image(dir.path(), "a.jpg", 41);
    let embedder = StubEmbedder::new(2).shared();

    {
        let (mut session, _) = Session::open(dir.path(), embedder.clone(), 1.5).unwrap();
        let captioner = FakeCaptioner::new("a lighthouse at dusk", &["coast"]);
        session.annotate_image("a.jpg", &captioner).unwrap();
    }

    let (session, snapshot) = Session::open(dir.path(), embedder, 1.5).unwrap();
    assert_eq!(snapshot["a.jpg"].description, "a lighthouse at dusk");
    assert_eq!(session.indexed_count(), 1);
}

#[test]
fn test_switching_folders_is_independent() {
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();
    image(first.path(), "one.jpg", 1);
    image(second.path(), "two.jpg", 1);
    image(second.path(), "three.jpg", 1);

    let embedder = StubEmbedder::new(2).shared();

    let (_first_session, first_snapshot) =
        Session::open(first.path(), embedder.clone(), 1.5).unwrap();
    let (second_session, second_snapshot) =
        Session::open(second.path(), embedder, 1.5).unwrap();

    assert_eq!(first_snapshot.len(), 1);
    assert_eq!(second_snapshot.len(), 2);
    assert_eq!(second_session.indexed_count(), 2);

    // each folder carries its own persistence
    assert!(first.path().join(".vectordb/vectors.bin").exists());
    assert!(second.path().join(".vectordb/vectors.bin").exists());
}

#[test]
fn test_image_path_rejects_traversal() {
    let dir = tempfile::tempdir().unwrap();
    image(dir.path(), "a.jpg", 1);

    let (session, _) = Session::open(dir.path(), StubEmbedder::new(2).shared(), 1.5).unwrap();

    assert!(session.image_path("a.jpg").is_ok());
    assert!(matches!(
        session.image_path("../escape.jpg"),
        Err(GalleryError::ImageNotFound(_))
    ));
    assert!(matches!(
        session.image_path("missing.jpg"),
        Err(GalleryError::ImageNotFound(_))
    ));
}

#[test]
fn test_annotation_failure_writes_nothing() {
    use crate::annotate::captioner::{
        Captioner, CaptionerError, ImageDescription, ImageTags, ImageText,
    };

    struct BrokenCaptioner;
    impl Captioner for BrokenCaptioner {
        fn describe(&self, _image: &[u8]) -> Result<ImageDescription, CaptionerError> {
            Err(CaptionerError::Upstream("model offline".to_string()))
        }
        fn tag(&self, _image: &[u8]) -> Result<ImageTags, CaptionerError> {
            Err(CaptionerError::Upstream("model offline".to_string()))
        }
        fn extract_text(&self, _image: &[u8]) -> Result<ImageText, CaptionerError> {
            Err(CaptionerError::Upstream("model offline".to_string()))
        }
    }

    let dir = tempfile::tempdir().unwrap();
    image(dir.path(), "a.jpg", 41);

    let (mut session, _) =
        Session::open(dir.path(), StubEmbedder::new(2).shared(), 1.5).unwrap();

    let result = session.annotate_image("a.jpg", &BrokenCaptioner);
    assert!(matches!(result, Err(GalleryError::Annotation(_))));

    // the record is still the empty one from reconciliation
    let snapshot = session.snapshot().unwrap();
    assert!(!snapshot["a.jpg"].is_processed);
    assert!(snapshot["a.jpg"].description.is_empty());
}
