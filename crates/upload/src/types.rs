//! Data types for the upload pipeline.

use std::fmt;

use nimbus_protocol::FileRecord;
use nimbus_protocol::constants::{CHUNK_SIZE, MAX_CONCURRENT_CHUNKS_PER_FILE, MAX_CONCURRENT_UPLOADS};
use nimbus_transfer::FileSource;
use uuid::Uuid;

/// Opaque identifier of a file in an upload batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId(Uuid);

impl FileId {
    /// Creates a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FileId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A file the user picked, dropped, or pasted.
#[derive(Debug, Clone)]
pub struct SelectableFile {
    pub id: FileId,
    pub source: FileSource,
}

impl SelectableFile {
    pub fn new(source: FileSource) -> Self {
        Self {
            id: FileId::new(),
            source,
        }
    }
}

/// Per-file upload state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    Pending,
    Uploading,
    Completed,
    Error,
}

/// Progress record of one file, as shown next to it.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadProgress {
    pub file_id: FileId,
    pub display_name: String,
    /// 0..=100.
    pub percent: u8,
    pub state: UploadState,
    pub error_message: Option<String>,
}

impl UploadProgress {
    pub(crate) fn pending(file: &SelectableFile) -> Self {
        Self {
            file_id: file.id,
            display_name: file.source.name().to_string(),
            percent: 0,
            state: UploadState::Pending,
            error_message: None,
        }
    }

    /// Returns `true` if the scheduler would pick this file up on a retry pass.
    pub fn is_pending_or_error(&self) -> bool {
        matches!(self.state, UploadState::Pending | UploadState::Error)
    }
}

/// Event emitted by the scheduler.
#[derive(Debug, Clone)]
pub enum UploadEvent {
    /// A progress record changed.
    Progress(UploadProgress),
    /// A file was finalized by the backend.
    Completed { file_id: FileId, record: FileRecord },
    /// A file upload ended in error.
    Failed { file_id: FileId, error: String },
    /// No session is running any more.
    Idle,
}

/// Tunables of the upload pipeline.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Raw chunk size in bytes.
    pub chunk_size: usize,
    /// Files uploading at the same time.
    pub max_concurrent_uploads: usize,
    /// Chunk requests in flight per file.
    pub max_chunks_per_file: usize,
    /// Collection the uploaded files are added to.
    pub collection_id: Option<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            max_concurrent_uploads: MAX_CONCURRENT_UPLOADS,
            max_chunks_per_file: MAX_CONCURRENT_CHUNKS_PER_FILE,
            collection_id: None,
        }
    }
}

/// Files that had not finished uploading when a scheduler was torn down,
/// to be handed to the next scheduler instance.
#[derive(Debug, Clone, Default)]
pub struct PendingHandoff {
    pub files: Vec<SelectableFile>,
}

impl PendingHandoff {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }
}
