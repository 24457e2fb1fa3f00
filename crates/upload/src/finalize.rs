//! Finalize call with the anonymous-token fallback.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use nimbus_protocol::FileRecord;
use tracing::{info, warn};

use crate::credentials::{AuthCredentials, CredentialStore};
use crate::error::{FinalizeError, UploadError};

/// Body of a finalize request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizeRequest {
    pub total_chunks: u64,
    pub original_name: String,
    pub credentials: AuthCredentials,
    pub collection_id: Option<String>,
}

/// Sends a finalize request to the backend.
pub trait FinalizeTransport: Send + Sync {
    fn finalize<'a>(
        &'a self,
        upload_id: &'a str,
        request: &'a FinalizeRequest,
    ) -> Pin<Box<dyn Future<Output = Result<FileRecord, FinalizeError>> + Send + 'a>>;
}

/// Asks the backend to assemble an upload, retrying once with the
/// anonymous token when the stored account is rejected.
pub struct FinalizationClient {
    transport: Arc<dyn FinalizeTransport>,
    credentials: Arc<CredentialStore>,
}

impl FinalizationClient {
    pub fn new(transport: Arc<dyn FinalizeTransport>, credentials: Arc<CredentialStore>) -> Self {
        Self {
            transport,
            credentials,
        }
    }

    /// Finalizes `upload_id`.
    ///
    /// On an invalid email/password rejection the stored account is
    /// dropped, a token is ensured, and the request is sent once more with
    /// that token. A failure of the retry is reported as
    /// [`UploadError::FinalizationAuth`]; any other failure as
    /// [`UploadError::Finalization`].
    pub async fn finalize(
        &self,
        upload_id: &str,
        total_chunks: u64,
        original_name: &str,
        credentials: AuthCredentials,
        collection_id: Option<String>,
    ) -> Result<FileRecord, UploadError> {
        let mut request = FinalizeRequest {
            total_chunks,
            original_name: original_name.to_string(),
            credentials,
            collection_id,
        };

        match self.transport.finalize(upload_id, &request).await {
            Ok(record) => Ok(record),
            Err(FinalizeError::InvalidCredentials) => {
                warn!(upload_id, "finalize rejected credentials, retrying with client token");
                let token = self.credentials.fall_back_to_anonymous()?;
                request.credentials = AuthCredentials::Token(token);

                let record = self
                    .transport
                    .finalize(upload_id, &request)
                    .await
                    .map_err(|e| UploadError::FinalizationAuth(e.to_string()))?;
                info!(upload_id, "finalize succeeded with client token");
                Ok(record)
            }
            Err(e) => Err(UploadError::Finalization(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockFinalizer;

    fn account() -> AuthCredentials {
        AuthCredentials::Account {
            email: "a@b.c".into(),
            password: "pw".into(),
        }
    }

    fn client(finalizer: &Arc<MockFinalizer>) -> (FinalizationClient, Arc<CredentialStore>) {
        let store = Arc::new(CredentialStore::in_memory());
        store.set_account("a@b.c", "pw", Some("Ann")).unwrap();
        let client = FinalizationClient::new(finalizer.clone(), store.clone());
        (client, store)
    }

    #[tokio::test]
    async fn success_passes_record_through() {
        let finalizer = Arc::new(MockFinalizer::new());
        let (client, _) = client(&finalizer);

        let record = client
            .finalize("u1", 3, "a.txt", account(), Some("c9".into()))
            .await
            .unwrap();
        assert_eq!(record.file_name, "a.txt");

        let calls = finalizer.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "u1");
        assert_eq!(calls[0].1.total_chunks, 3);
        assert_eq!(calls[0].1.collection_id.as_deref(), Some("c9"));
    }

    #[tokio::test]
    async fn invalid_credentials_retries_with_token() {
        let finalizer = Arc::new(MockFinalizer::new());
        finalizer.push_response(Err(FinalizeError::InvalidCredentials));
        let (client, store) = client(&finalizer);

        client
            .finalize("u1", 2, "a.txt", account(), None)
            .await
            .unwrap();

        let calls = finalizer.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].1.credentials, account());
        let token = store.token().unwrap();
        assert_eq!(calls[1].1.credentials, AuthCredentials::Token(token));
        assert!(!store.has_account());
        assert!(store.display_name().is_none());
    }

    #[tokio::test]
    async fn failed_retry_is_reported() {
        let finalizer = Arc::new(MockFinalizer::new());
        finalizer.push_response(Err(FinalizeError::InvalidCredentials));
        finalizer.push_response(Err(FinalizeError::Rejected {
            status: 403,
            message: "token banned".into(),
        }));
        let (client, _) = client(&finalizer);

        let err = client
            .finalize("u1", 2, "a.txt", account(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::FinalizationAuth(_)));
        assert_eq!(err.to_string(), "Retry finalization failed: token banned");
        assert_eq!(finalizer.calls().len(), 2);
    }

    #[tokio::test]
    async fn other_errors_do_not_retry() {
        let finalizer = Arc::new(MockFinalizer::new());
        finalizer.push_response(Err(FinalizeError::Rejected {
            status: 400,
            message: "Some chunks are missing: [1]".into(),
        }));
        let (client, store) = client(&finalizer);

        let err = client
            .finalize("u1", 2, "a.txt", account(), None)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Finalization failed: Some chunks are missing: [1]"
        );
        assert_eq!(finalizer.calls().len(), 1);
        assert!(store.has_account());
    }

    #[tokio::test]
    async fn token_rejection_also_falls_back() {
        let finalizer = Arc::new(MockFinalizer::new());
        finalizer.push_response(Err(FinalizeError::InvalidCredentials));
        let store = Arc::new(CredentialStore::in_memory());
        store.set_token("old").unwrap();
        let client = FinalizationClient::new(finalizer.clone(), store.clone());

        client
            .finalize("u1", 1, "a.txt", AuthCredentials::Token("old".into()), None)
            .await
            .unwrap();
        assert_eq!(finalizer.calls().len(), 2);
    }
}
