//! Uploader configuration management.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/nimbus/uploader.toml`
//! - Windows: `%APPDATA%/nimbus/uploader.toml`

use std::path::{Path, PathBuf};

use nimbus_protocol::constants::{MAX_CONCURRENT_CHUNKS_PER_FILE, MAX_CONCURRENT_UPLOADS};
use nimbus_upload::UploadConfig;
use serde::{Deserialize, Serialize};

use crate::cli::Cli;

const MIB: usize = 1024 * 1024;

/// Uploader configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the drive backend.
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Raw chunk size in MiB.
    #[serde(default = "default_chunk_size_mib")]
    pub chunk_size_mib: u32,

    /// Files uploading at the same time.
    #[serde(default = "default_max_concurrent_uploads")]
    pub max_concurrent_uploads: usize,

    /// Chunk requests in flight per file.
    #[serde(default = "default_max_concurrent_chunks")]
    pub max_concurrent_chunks: usize,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Collection uploaded files are added to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_id: Option<String>,

    /// Credential file (defaults to `nimbus/credentials.json` in the config dir).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_path: Option<PathBuf>,
}

fn default_server_url() -> String {
    "http://localhost:8080".into()
}

fn default_chunk_size_mib() -> u32 {
    7
}

fn default_max_concurrent_uploads() -> usize {
    MAX_CONCURRENT_UPLOADS
}

fn default_max_concurrent_chunks() -> usize {
    MAX_CONCURRENT_CHUNKS_PER_FILE
}

fn default_request_timeout_secs() -> u64 {
    300
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            chunk_size_mib: default_chunk_size_mib(),
            max_concurrent_uploads: default_max_concurrent_uploads(),
            max_concurrent_chunks: default_max_concurrent_chunks(),
            request_timeout_secs: default_request_timeout_secs(),
            collection_id: None,
            credentials_path: None,
        }
    }
}

impl Config {
    /// Loads configuration from disk, or creates a default if not found.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&config_path()?)
    }

    /// Loads configuration from `path`, writing defaults there if absent.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Writes the configuration to `path`.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// Applies command-line overrides.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(server) = &cli.server {
            self.server_url = server.clone();
        }
        if let Some(collection) = &cli.collection {
            self.collection_id = Some(collection.clone());
        }
        if let Some(mib) = cli.chunk_size_mib {
            self.chunk_size_mib = mib;
        }
        if let Some(n) = cli.max_uploads {
            self.max_concurrent_uploads = n;
        }
        if let Some(n) = cli.max_chunks {
            self.max_concurrent_chunks = n;
        }
        if let Some(secs) = cli.timeout_secs {
            self.request_timeout_secs = secs;
        }
        if let Some(path) = &cli.credentials {
            self.credentials_path = Some(path.clone());
        }
    }

    /// Pipeline settings. Zero limits are raised to one.
    pub fn upload_config(&self) -> UploadConfig {
        UploadConfig {
            chunk_size: (self.chunk_size_mib.max(1) as usize).saturating_mul(MIB),
            max_concurrent_uploads: self.max_concurrent_uploads.max(1),
            max_chunks_per_file: self.max_concurrent_chunks.max(1),
            collection_id: self.collection_id.clone().filter(|c| !c.is_empty()),
        }
    }

    /// Credential file to use, if any location is known.
    pub fn credentials_file(&self) -> Option<PathBuf> {
        self.credentials_path
            .clone()
            .or_else(nimbus_upload::credentials::default_credentials_path)
    }
}

/// Returns the platform-specific configuration file path.
pub fn config_path() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home)
            .join(".config")
            .join("nimbus")
            .join("uploader.toml"))
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata).join("nimbus").join("uploader.toml"))
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        Ok(PathBuf::from("/tmp/nimbus/uploader.toml"))
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.server_url, "http://localhost:8080");
        assert_eq!(config.chunk_size_mib, 7);
        assert_eq!(config.max_concurrent_uploads, 3);
        assert_eq!(config.max_concurrent_chunks, 6);
        assert!(config.collection_id.is_none());

        let upload = config.upload_config();
        assert_eq!(upload.chunk_size, 7 * 1024 * 1024);
        assert_eq!(upload.max_concurrent_uploads, 3);
        assert_eq!(upload.max_chunks_per_file, 6);
    }

    #[test]
    fn config_partial_toml() {
        let toml_str = r#"server_url = "https://drive.example.com""#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server_url, "https://drive.example.com");
        assert_eq!(config.chunk_size_mib, 7);
        assert_eq!(config.request_timeout_secs, 300);
    }

    #[test]
    fn config_save_and_load() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nimbus").join("uploader.toml");

        let created = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(created, Config::default());

        let config = Config {
            collection_id: Some("photos".into()),
            max_concurrent_uploads: 5,
            ..Config::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn cli_overrides_file() {
        let cli = Cli::try_parse_from([
            "nimbus-uploader",
            "--server",
            "http://10.0.0.2:8080",
            "--collection",
            "c1",
            "--max-uploads",
            "1",
            "a.txt",
        ])
        .unwrap();
        let mut config = Config::default();
        config.apply_cli(&cli);

        assert_eq!(config.server_url, "http://10.0.0.2:8080");
        assert_eq!(config.collection_id.as_deref(), Some("c1"));
        assert_eq!(config.max_concurrent_uploads, 1);
        assert_eq!(config.max_concurrent_chunks, 6);
    }

    #[test]
    fn zero_limits_are_clamped() {
        let config = Config {
            chunk_size_mib: 0,
            max_concurrent_uploads: 0,
            max_concurrent_chunks: 0,
            collection_id: Some(String::new()),
            ..Config::default()
        };
        let upload = config.upload_config();
        assert_eq!(upload.chunk_size, 1024 * 1024);
        assert_eq!(upload.max_concurrent_uploads, 1);
        assert_eq!(upload.max_chunks_per_file, 1);
        assert!(upload.collection_id.is_none());
    }

    #[test]
    fn config_path_mentions_nimbus() {
        let path = config_path().unwrap();
        assert!(path.to_string_lossy().contains("nimbus"));
    }
}
