//! Chunked file encoding for resumable uploads.
//!
//! A file is cut into fixed-size byte ranges ([`ChunkPlan`]) and every range
//! is gzip-compressed on its own ([`ChunkCodec`]), so any chunk can be
//! re-encoded and retried without touching its siblings.

mod codec;
mod plan;
mod source;

pub use codec::{ChunkCodec, EncodedChunk, compress};
pub use plan::{ChunkDescriptor, ChunkIter, ChunkPlan};
pub use source::{DedupKey, FileSource, SourceData};

/// Default chunk size: 7 MiB, as expected by the drive backend.
pub const DEFAULT_CHUNK_SIZE: usize = nimbus_protocol::constants::CHUNK_SIZE;

/// Errors produced while opening a file source.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a regular file: {0}")]
    NotAFile(String),
}

/// Errors produced while extracting or compressing a chunk.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("failed to read chunk: {0}")]
    Io(#[from] std::io::Error),

    #[error("chunk {index} out of range (file has {total} chunks)")]
    OutOfRange { index: u64, total: u64 },

    #[error("chunk {index} truncated: expected {expected} bytes, read {actual}")]
    ShortRead {
        index: u64,
        expected: u64,
        actual: u64,
    },

    #[error("failed to compress chunk: {0}")]
    Compress(std::io::Error),
}
