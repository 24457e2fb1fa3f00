//! Stored login details and anonymous token handling.
//!
//! The store keeps what the drive client persists between runs: either an
//! account email/password (plus the display name shown for it) or an
//! anonymous client token. Uploads authenticate with the account when one
//! is stored and with the token otherwise.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::CredentialError;

/// Authentication sent with a finalize request.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthCredentials {
    Token(String),
    Account { email: String, password: String },
}

impl fmt::Debug for AuthCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Token(_) => f.write_str("Token(..)"),
            Self::Account { email, .. } => f
                .debug_struct("Account")
                .field("email", email)
                .finish_non_exhaustive(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct StoredCredentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    display_name: Option<String>,
}

impl StoredCredentials {
    fn account(&self) -> Option<(&str, &str)> {
        match (self.email.as_deref(), self.password.as_deref()) {
            (Some(email), Some(password)) if !email.is_empty() && !password.is_empty() => {
                Some((email, password))
            }
            _ => None,
        }
    }
}

/// Credential store, cached in memory and optionally persisted to a JSON file.
pub struct CredentialStore {
    path: Option<PathBuf>,
    inner: RwLock<StoredCredentials>,
}

impl CredentialStore {
    /// Opens the store at `path`, loading existing credentials from disk.
    pub fn new(path: PathBuf) -> Result<Self, CredentialError> {
        let stored = load_credentials(&path)?;
        Ok(Self {
            path: Some(path),
            inner: RwLock::new(stored),
        })
    }

    /// Creates a store that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            inner: RwLock::new(StoredCredentials::default()),
        }
    }

    /// Stores an account login.
    pub fn set_account(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<(), CredentialError> {
        {
            let mut s = self.inner.write().unwrap_or_else(PoisonError::into_inner);
            s.email = Some(email.to_string());
            s.password = Some(password.to_string());
            s.display_name = display_name.map(str::to_string);
        }
        self.persist()
    }

    /// Stores an anonymous token.
    pub fn set_token(&self, token: &str) -> Result<(), CredentialError> {
        {
            let mut s = self.inner.write().unwrap_or_else(PoisonError::into_inner);
            s.token = Some(token.to_string());
        }
        self.persist()
    }

    pub fn token(&self) -> Option<String> {
        let s = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        s.token.clone()
    }

    pub fn display_name(&self) -> Option<String> {
        let s = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        s.display_name.clone()
    }

    /// Returns `true` if a complete email/password pair is stored.
    pub fn has_account(&self) -> bool {
        let s = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        s.account().is_some()
    }

    /// Resolves the credentials for an upload attempt.
    ///
    /// Prefers the stored account; otherwise uses the anonymous token,
    /// generating and persisting one if none exists yet.
    pub fn resolve(&self) -> Result<AuthCredentials, CredentialError> {
        {
            let s = self.inner.read().unwrap_or_else(PoisonError::into_inner);
            if let Some((email, password)) = s.account() {
                return Ok(AuthCredentials::Account {
                    email: email.to_string(),
                    password: password.to_string(),
                });
            }
        }
        self.ensure_token().map(AuthCredentials::Token)
    }

    /// Forgets the stored account and returns the anonymous token,
    /// creating one if needed. Used after the backend rejected the account.
    pub fn fall_back_to_anonymous(&self) -> Result<String, CredentialError> {
        {
            let mut s = self.inner.write().unwrap_or_else(PoisonError::into_inner);
            s.email = None;
            s.password = None;
            s.display_name = None;
        }
        info!("stored account rejected, falling back to anonymous token");
        let token = self.ensure_token()?;
        self.persist()?;
        Ok(token)
    }

    fn ensure_token(&self) -> Result<String, CredentialError> {
        let token = {
            let mut s = self.inner.write().unwrap_or_else(PoisonError::into_inner);
            if let Some(token) = s.token.as_deref().filter(|t| !t.is_empty()) {
                return Ok(token.to_string());
            }
            let token = generate_client_token();
            s.token = Some(token.clone());
            token
        };
        debug!("generated anonymous client token");
        self.persist()?;
        Ok(token)
    }

    /// Writes the current credentials to disk (no-op for in-memory stores).
    fn persist(&self) -> Result<(), CredentialError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = {
            let s = self.inner.read().unwrap_or_else(PoisonError::into_inner);
            serde_json::to_string_pretty(&*s)?
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(path)?;

        // `mode` only applies on creation; tighten files written by older runs.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
        }
        file.write_all(json.as_bytes())?;

        debug!(path = %path.display(), "persisted credentials");
        Ok(())
    }
}

/// Loads credentials from a JSON file on disk.
fn load_credentials(path: &Path) -> Result<StoredCredentials, CredentialError> {
    if !path.exists() {
        return Ok(StoredCredentials::default());
    }
    let data = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

/// Generates an anonymous client token:
/// `<10 alphanumerics>.<20 alphanumerics>.<unix seconds>`.
pub fn generate_client_token() -> String {
    let mut rng = rand::thread_rng();
    let mut segment = |len: usize| -> String {
        (&mut rng)
            .sample_iter(&Alphanumeric)
            .take(len)
            .map(char::from)
            .collect()
    };
    let first = segment(10);
    let second = segment(20);
    format!("{first}.{second}.{}", chrono::Utc::now().timestamp())
}

/// Returns the default credential file path.
pub fn default_credentials_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("nimbus").join("credentials.json"))
}

/// Returns the platform-specific config directory.
fn config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".config"))
            })
    }

    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA").ok().map(PathBuf::from)
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join(".config"))
    }
}
