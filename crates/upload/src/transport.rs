//! Chunk transport trait.
//!
//! The session sends chunks through this trait so the pipeline can be
//! driven by the reqwest client in production and by mocks in tests.

use std::future::Future;
use std::pin::Pin;

use nimbus_transfer::EncodedChunk;
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;

/// Sends one encoded chunk of an upload attempt.
pub trait ChunkTransport: Send + Sync {
    /// Posts `chunk` under `upload_id`.
    ///
    /// Must resolve to [`TransportError::Aborted`] once `cancel` fires
    /// before the server answered.
    fn send_chunk(
        &self,
        upload_id: &str,
        chunk: EncodedChunk,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + '_>>;
}
