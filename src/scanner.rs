use std::path::Path;

use walkdir::WalkDir;

/// Extensions treated as images, matched case-insensitively.
pub const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("folder not found: {0}")]
    NotFound(String),

    #[error("failed to walk {root}: {source}")]
    Io {
        root: String,
        #[source]
        source: std::io::Error,
    },
}

/// Recursively enumerate the image files under `root`.
///
/// Returns relative paths with `/` separators regardless of platform,
/// sorted for deterministic output. No side effects.
pub fn scan_folder(root: &Path) -> Result<Vec<String>, ScanError> {
    if !root.is_dir() {
        return Err(ScanError::NotFound(root.display().to_string()));
    }

    let mut paths = Vec::new();

    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|err| ScanError::Io {
            root: root.display().to_string(),
            source: err.into(),
        })?;

        if !entry.file_type().is_file() {
            continue;
        }

        if !has_image_extension(entry.path()) {
            continue;
        }

        if let Ok(rel) = entry.path().strip_prefix(root) {
            let normalized = rel
                .components()
                .map(|part| part.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            paths.push(normalized);
        }
    }

    paths.sort();
    Ok(paths)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}
