use std::io::{Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use crate::TransferError;

/// Where the bytes of a file live.
#[derive(Debug, Clone)]
pub enum SourceData {
    /// A file on disk, re-opened for every chunk read.
    Disk(PathBuf),
    /// In-memory content (pasted data, generated files).
    Memory(Arc<[u8]>),
}

/// Identity used to detect the same file being added twice.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub name: String,
    pub size: u64,
    pub content_type: String,
    pub modified: Option<SystemTime>,
}

/// A file selected for upload: metadata plus a handle to its bytes.
#[derive(Debug, Clone)]
pub struct FileSource {
    name: String,
    size: u64,
    content_type: String,
    modified: Option<SystemTime>,
    data: SourceData,
}

impl FileSource {
    /// Stats a file on disk and guesses its content type from the extension.
    pub fn from_path(path: &Path) -> Result<Self, TransferError> {
        let metadata = std::fs::metadata(path)?;
        if !metadata.is_file() {
            return Err(TransferError::NotAFile(path.display().to_string()));
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| TransferError::NotAFile(path.display().to_string()))?;

        Ok(Self {
            content_type: guess_content_type(&name),
            name,
            size: metadata.len(),
            modified: metadata.modified().ok(),
            data: SourceData::Disk(path.to_path_buf()),
        })
    }

    /// Wraps in-memory content. The modification time is the moment of the
    /// call, so pasting the same bytes twice yields two distinct files.
    pub fn from_bytes(
        name: impl Into<String>,
        bytes: impl Into<Arc<[u8]>>,
        content_type: Option<&str>,
    ) -> Self {
        let name = name.into();
        let bytes = bytes.into();
        Self {
            content_type: content_type
                .map(str::to_string)
                .unwrap_or_else(|| guess_content_type(&name)),
            name,
            size: bytes.len() as u64,
            modified: Some(SystemTime::now()),
            data: SourceData::Memory(bytes),
        }
    }

    /// Overrides the modification time.
    pub fn with_modified(mut self, modified: Option<SystemTime>) -> Self {
        self.modified = modified;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn modified(&self) -> Option<SystemTime> {
        self.modified
    }

    pub fn data(&self) -> &SourceData {
        &self.data
    }

    /// Composite key of name, size, content type and modification time.
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            name: self.name.clone(),
            size: self.size,
            content_type: self.content_type.clone(),
            modified: self.modified,
        }
    }

    /// Reads up to `range.len()` bytes starting at `range.start`.
    ///
    /// Returns fewer bytes than requested if the underlying data shrank.
    pub(crate) fn read_range(&self, range: Range<u64>) -> std::io::Result<Vec<u8>> {
        let len = range.end.saturating_sub(range.start);
        match &self.data {
            SourceData::Memory(bytes) => {
                let start = (range.start as usize).min(bytes.len());
                let end = (range.end as usize).min(bytes.len());
                Ok(bytes[start..end].to_vec())
            }
            SourceData::Disk(path) => {
                let mut file = std::fs::File::open(path)?;
                file.seek(SeekFrom::Start(range.start))?;
                let mut buf = Vec::with_capacity(len as usize);
                file.take(len).read_to_end(&mut buf)?;
                Ok(buf)
            }
        }
    }
}

fn guess_content_type(name: &str) -> String {
    mime_guess::from_path(name)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}
