//! Binary storage for the per-folder vector index.
//!
//! File format: .vectordb/vectors.bin
//!
//! Header (47 bytes):
//! - version: u8 (1)
//! - model_id: [u8; 32] (SHA256 hash of the embedding model name)
//! - dimensions: u16 (little-endian)
//! - entry_count: u64 (little-endian)
//! - checksum: u32 (CRC32 of the header fields before the checksum)
//!
//! Entries (repeated):
//! - path: u16 length + UTF-8 bytes
//! - description, tags, text_content, is_processed: u32 length + UTF-8
//!   bytes each (the denormalized projection)
//! - embedding: [f32; dimensions] (little-endian)

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::semantic::index::{RecordProjection, VectorEntry, VectorIndex};

/// Current file format version
const FORMAT_VERSION: u8 = 1;

/// Header size in bytes: version(1) + model_id(32) + dimensions(2) + entry_count(8) + checksum(4)
const HEADER_SIZE: usize = 47;

#[derive(Debug, thiserror::Error)]
pub enum VectorStorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Version mismatch: file version {0}, supported version {1}")]
    VersionMismatch(u8, u8),

    #[error("Model mismatch: file uses different model")]
    ModelMismatch,

    #[error("Checksum mismatch: file may be corrupted")]
    ChecksumMismatch,

    #[error("Dimension mismatch: expected {expected}, file has {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Storage manager for one folder's vectors.bin.
pub struct VectorStorage {
    path: PathBuf,
}

impl VectorStorage {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the vector index from storage, validating model identity and
    /// dimensions against what the active embedder expects.
    pub fn load(
        &self,
        expected_model_id: &[u8; 32],
        expected_dimensions: usize,
    ) -> Result<VectorIndex, VectorStorageError> {
        let file = File::open(&self.path)?;
        let mut reader = BufReader::new(file);

        let header = read_header(&mut reader)?;

        if header.model_id != *expected_model_id {
            return Err(VectorStorageError::ModelMismatch);
        }
        if header.dimensions as usize != expected_dimensions {
            return Err(VectorStorageError::DimensionMismatch {
                expected: expected_dimensions,
                got: header.dimensions as usize,
            });
        }

        let mut index =
            VectorIndex::with_capacity(header.dimensions as usize, header.entry_count as usize);

        for _ in 0..header.entry_count {
            let (path, entry) = read_entry(&mut reader, header.dimensions as usize)?;
            // insert cannot fail here: dimensions were read with the header
            let _ = index.insert(&path, entry.projection, entry.embedding);
        }

        Ok(index)
    }

    /// Save the vector index to storage.
    ///
    /// Uses atomic write: temp file -> fsync -> rename
    pub fn save(&self, index: &VectorIndex, model_id: &[u8; 32]) -> Result<(), VectorStorageError> {
        let temp_path = self.path.with_extension("tmp");

        let result = write_to_file(&temp_path, index, model_id);

        if result.is_err() {
            let _ = std::fs::remove_file(&temp_path);
            return result;
        }

        std::fs::rename(&temp_path, &self.path)?;

        Ok(())
    }

    pub fn delete(&self) -> Result<(), VectorStorageError> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

#[derive(Debug)]
struct Header {
    model_id: [u8; 32],
    dimensions: u16,
    entry_count: u64,
}

fn write_to_file(
    path: &Path,
    index: &VectorIndex,
    model_id: &[u8; 32],
) -> Result<(), VectorStorageError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    write_header(
        &mut writer,
        model_id,
        index.dimensions() as u16,
        index.len() as u64,
    )?;

    for (entry_path, entry) in index.iter() {
        write_entry(&mut writer, entry_path, entry)?;
    }

    writer.flush()?;
    let file = writer
        .into_inner()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    file.sync_all()?;

    Ok(())
}

fn write_header(
    writer: &mut BufWriter<File>,
    model_id: &[u8; 32],
    dimensions: u16,
    entry_count: u64,
) -> Result<(), VectorStorageError> {
    let mut header_bytes = [0u8; HEADER_SIZE];

    header_bytes[0] = FORMAT_VERSION;
    header_bytes[1..33].copy_from_slice(model_id);
    header_bytes[33..35].copy_from_slice(&dimensions.to_le_bytes());
    header_bytes[35..43].copy_from_slice(&entry_count.to_le_bytes());

    let checksum = crc32fast::hash(&header_bytes[0..43]);
    header_bytes[43..47].copy_from_slice(&checksum.to_le_bytes());

    writer.write_all(&header_bytes)?;
    Ok(())
}

fn read_header(reader: &mut BufReader<File>) -> Result<Header, VectorStorageError> {
    let mut header_bytes = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header_bytes)?;

    let version = header_bytes[0];
    if version > FORMAT_VERSION {
        return Err(VectorStorageError::VersionMismatch(version, FORMAT_VERSION));
    }

    let mut model_id = [0u8; 32];
    model_id.copy_from_slice(&header_bytes[1..33]);

    let dimensions = u16::from_le_bytes([header_bytes[33], header_bytes[34]]);
    let entry_count = u64::from_le_bytes([
        header_bytes[35],
        header_bytes[36],
        header_bytes[37],
        header_bytes[38],
        header_bytes[39],
        header_bytes[40],
        header_bytes[41],
        header_bytes[42],
    ]);
    let stored_checksum = u32::from_le_bytes([
        header_bytes[43],
        header_bytes[44],
        header_bytes[45],
        header_bytes[46],
    ]);

    let computed_checksum = crc32fast::hash(&header_bytes[0..43]);
    if stored_checksum != computed_checksum {
        return Err(VectorStorageError::ChecksumMismatch);
    }

    Ok(Header {
        model_id,
        dimensions,
        entry_count,
    })
}

fn write_entry(
    writer: &mut BufWriter<File>,
    path: &str,
    entry: &VectorEntry,
) -> Result<(), VectorStorageError> {
    let path_bytes = path.as_bytes();
    if path_bytes.len() > u16::MAX as usize {
        return Err(VectorStorageError::InvalidFormat(format!(
            "path too long to store: {} bytes",
            path_bytes.len()
        )));
    }
    writer.write_all(&(path_bytes.len() as u16).to_le_bytes())?;
    writer.write_all(path_bytes)?;

    for field in [
        &entry.projection.description,
        &entry.projection.tags,
        &entry.projection.text_content,
        &entry.projection.is_processed,
    ] {
        writer.write_all(&(field.len() as u32).to_le_bytes())?;
        writer.write_all(field.as_bytes())?;
    }

    for &value in &entry.embedding {
        writer.write_all(&value.to_le_bytes())?;
    }

    Ok(())
}

fn read_entry(
    reader: &mut BufReader<File>,
    dimensions: usize,
) -> Result<(String, VectorEntry), VectorStorageError> {
    let mut len_bytes = [0u8; 2];
    reader.read_exact(&mut len_bytes)?;
    let path = read_string(reader, u16::from_le_bytes(len_bytes) as usize)?;

    let mut fields = Vec::with_capacity(4);
    for _ in 0..4 {
        let mut len_bytes = [0u8; 4];
        reader.read_exact(&mut len_bytes)?;
        fields.push(read_string(reader, u32::from_le_bytes(len_bytes) as usize)?);
    }
    let mut fields = fields.into_iter();
    let projection = RecordProjection {
        description: fields.next().unwrap_or_default(),
        tags: fields.next().unwrap_or_default(),
        text_content: fields.next().unwrap_or_default(),
        is_processed: fields.next().unwrap_or_default(),
    };

    let mut embedding = Vec::with_capacity(dimensions);
    for _ in 0..dimensions {
        let mut float_bytes = [0u8; 4];
        reader.read_exact(&mut float_bytes)?;
        embedding.push(f32::from_le_bytes(float_bytes));
    }

    Ok((
        path,
        VectorEntry {
            projection,
            embedding,
        },
    ))
}

fn read_string(reader: &mut BufReader<File>, len: usize) -> Result<String, VectorStorageError> {
    let mut bytes = vec![0u8; len];
    reader.read_exact(&mut bytes)?;
    String::from_utf8(bytes)
        .map_err(|e| VectorStorageError::InvalidFormat(format!("non-utf8 string field: {}", e)))
}
