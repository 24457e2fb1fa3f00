use std::io::Write;

use flate2::Compression;
use flate2::write::GzEncoder;

use nimbus_protocol::constants::CHUNK_FILE_SUFFIX;

use crate::EncodeError;
use crate::plan::ChunkPlan;
use crate::source::FileSource;

/// A compressed chunk ready for transport.
#[derive(Debug, Clone)]
pub struct EncodedChunk {
    /// Chunk index within the file.
    pub index: u64,
    /// Size of the chunk before compression.
    pub raw_len: u64,
    /// Part file name sent with the chunk (`<name>.gz`).
    pub file_name: String,
    /// Gzip-compressed chunk bytes.
    pub data: Vec<u8>,
}

/// Cuts a file into chunks and gzip-compresses each chunk independently.
#[derive(Debug, Clone)]
pub struct ChunkCodec {
    source: FileSource,
    plan: ChunkPlan,
}

impl ChunkCodec {
    /// Creates a codec for `source`.
    ///
    /// If `chunk_size` is 0, [`DEFAULT_CHUNK_SIZE`](crate::DEFAULT_CHUNK_SIZE) is used.
    pub fn new(source: FileSource, chunk_size: usize) -> Self {
        let plan = ChunkPlan::new(source.size(), chunk_size);
        Self { source, plan }
    }

    pub fn plan(&self) -> &ChunkPlan {
        &self.plan
    }

    pub fn source(&self) -> &FileSource {
        &self.source
    }

    /// Extracts chunk `index` and compresses it.
    ///
    /// Blocking: reads from disk and runs the compressor. Async callers
    /// should run it on the blocking pool.
    pub fn encode(&self, index: u64) -> Result<EncodedChunk, EncodeError> {
        let range = self.plan.range(index).ok_or(EncodeError::OutOfRange {
            index,
            total: self.plan.total_chunks(),
        })?;
        let expected = range.end - range.start;

        let raw = self.source.read_range(range)?;
        if raw.len() as u64 != expected {
            return Err(EncodeError::ShortRead {
                index,
                expected,
                actual: raw.len() as u64,
            });
        }

        Ok(EncodedChunk {
            index,
            raw_len: expected,
            file_name: format!("{}{CHUNK_FILE_SUFFIX}", self.source.name()),
            data: compress(&raw)?,
        })
    }
}

/// Gzip-compresses `data` as a standalone stream.
pub fn compress(data: &[u8]) -> Result<Vec<u8>, EncodeError> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder.write_all(data).map_err(EncodeError::Compress)?;
    encoder.finish().map_err(EncodeError::Compress)
}
