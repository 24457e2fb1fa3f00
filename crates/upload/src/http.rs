//! reqwest implementation of the chunk and finalize transports.
//!
//! Chunks are posted as multipart forms to `/upload/<id>` and the upload is
//! finalized with a second multipart form to `/upload/success/<id>`.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use nimbus_protocol::constants::{
    INVALID_CREDENTIALS_BODY, chunk_fields, chunk_path, finalize_fields, finalize_path,
};
use nimbus_protocol::{ErrorBody, FileRecord};
use nimbus_transfer::EncodedChunk;
use reqwest::StatusCode;
use reqwest::multipart::{Form, Part};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::credentials::AuthCredentials;
use crate::error::{FinalizeError, TransportError};
use crate::finalize::{FinalizeRequest, FinalizeTransport};
use crate::transport::ChunkTransport;

/// HTTP client for the drive upload endpoints.
#[derive(Debug, Clone)]
pub struct HttpClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpClient {
    /// Creates a client for the backend at `base_url`.
    ///
    /// `timeout` bounds each request, including the chunk body upload.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post_chunk(&self, upload_id: &str, chunk: EncodedChunk) -> Result<(), TransportError> {
        let url = format!("{}{}", self.base_url, chunk_path(upload_id));
        let index = chunk.index;
        let size = chunk.data.len();

        let part = Part::bytes(chunk.data)
            .file_name(chunk.file_name)
            .mime_str("application/gzip")
            .map_err(|e| TransportError::Network(e.to_string()))?;
        let form = Form::new()
            .part(chunk_fields::CHUNK, part)
            .text(chunk_fields::CHUNK_INDEX, index.to_string());

        let resp = self
            .http
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        let status = resp.status();

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Http {
                status: status.as_u16(),
                body,
            });
        }

        debug!(upload_id, index, size, "chunk accepted");
        Ok(())
    }

    async fn post_finalize(
        &self,
        upload_id: &str,
        request: &FinalizeRequest,
    ) -> Result<FileRecord, FinalizeError> {
        let url = format!("{}{}", self.base_url, finalize_path(upload_id));

        let mut form = Form::new()
            .text(finalize_fields::TOTAL_CHUNKS, request.total_chunks.to_string())
            .text(
                finalize_fields::ORIGINAL_FILE_NAME,
                request.original_name.clone(),
            );
        if let Some(collection) = &request.collection_id {
            form = form.text(finalize_fields::COLLECTION_ID, collection.clone());
        }
        form = match &request.credentials {
            AuthCredentials::Token(token) => form.text(finalize_fields::TOKEN, token.clone()),
            AuthCredentials::Account { email, password } => form
                .text(finalize_fields::EMAIL, email.clone())
                .text(finalize_fields::PASSWORD, password.clone()),
        };

        let resp = self
            .http
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| FinalizeError::Network(e.to_string()))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| FinalizeError::Network(e.to_string()))?;

        if status.is_success() {
            return serde_json::from_str(&body).map_err(|e| FinalizeError::Decode(e.to_string()));
        }
        Err(classify_finalize_failure(status, &body))
    }
}

/// Maps a non-2xx finalize response to an error.
fn classify_finalize_failure(status: StatusCode, body: &str) -> FinalizeError {
    if status == StatusCode::UNAUTHORIZED && body == INVALID_CREDENTIALS_BODY {
        return FinalizeError::InvalidCredentials;
    }

    let message = match ErrorBody::parse(body) {
        Some(parsed) => parsed.describe().unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request rejected")
                .to_string()
        }),
        None => format!("server returned {}: {}", status.as_u16(), body.trim()),
    };
    FinalizeError::Rejected {
        status: status.as_u16(),
        message,
    }
}

impl ChunkTransport for HttpClient {
    fn send_chunk(
        &self,
        upload_id: &str,
        chunk: EncodedChunk,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + '_>> {
        let upload_id = upload_id.to_string();
        Box::pin(async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(TransportError::Aborted),
                result = self.post_chunk(&upload_id, chunk) => result,
            }
        })
    }
}

impl FinalizeTransport for HttpClient {
    fn finalize<'a>(
        &'a self,
        upload_id: &'a str,
        request: &'a FinalizeRequest,
    ) -> Pin<Box<dyn Future<Output = Result<FileRecord, FinalizeError>> + Send + 'a>> {
        Box::pin(self.post_finalize(upload_id, request))
    }
}
