//! Resumable, concurrent, chunked file uploads for the Nimbus drive.
//!
//! This crate implements the upload pipeline of the drive client. It has no
//! UI dependencies: callers add files to an [`UploadScheduler`], observe
//! [`UploadEvent`]s, and drive pause/resume/delete/retry from their own
//! controls.
//!
//! # Pipeline
//!
//! 1. **Schedule**: at most `max_concurrent_uploads` files upload at once
//! 2. **Encode**: each chunk is cut from the file and gzip-compressed
//! 3. **Send**: up to `max_chunks_per_file` chunk requests per file
//! 4. **Finalize**: the backend assembles the chunks; a rejected
//!    email/password login falls back to an anonymous token once
//!
//! The HTTP exchange sits behind the [`ChunkTransport`] and
//! [`FinalizeTransport`] traits; [`HttpClient`] implements both with reqwest.

pub mod abort;
pub mod credentials;
pub mod error;
pub mod finalize;
pub mod http;
pub mod scheduler;
pub mod session;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod mock;

pub use abort::{AbortReason, AbortRegistry};
pub use credentials::{AuthCredentials, CredentialStore, generate_client_token};
pub use error::{CredentialError, FinalizeError, TransportError, UploadError};
pub use finalize::{FinalizationClient, FinalizeRequest, FinalizeTransport};
pub use http::HttpClient;
pub use scheduler::UploadScheduler;
pub use session::{
    FileUploadSession, ProgressSink, SessionContext, SessionControl, SessionOutcome,
};
pub use transport::ChunkTransport;
pub use types::{
    FileId, PendingHandoff, SelectableFile, UploadConfig, UploadEvent, UploadProgress,
    UploadState,
};

pub use nimbus_protocol::FileRecord;
pub use nimbus_transfer::FileSource;
