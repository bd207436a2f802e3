use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use crate::core::config::AuthConfig;
use crate::core::error::StoreError;
use crate::core::process::{run_command, which, ProcessError};

/// Keychain service name Claude Code stores its OAuth record under.
pub const KEYCHAIN_SERVICE: &str = "Claude Code-credentials";
const KEYCHAIN_ACCOUNT: &str = "claude-code";
const SECURITY_BIN: &str = "security";
const SECURITY_TIMEOUT: Duration = Duration::from_secs(5);
/// `security` exits with this code when the item does not exist.
const SECURITY_ITEM_NOT_FOUND: i32 = 44;

/// OAuth token pair plus expiry, as stored under `claudeAiOauth`.
///
/// Fields this crate does not know about (scopes, subscription type, ...) are
/// carried in `extra` so a refresh-then-save writes them back untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    #[serde(default)]
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Unix timestamp in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Credentials {
    pub fn has_access_token(&self) -> bool {
        !self.access_token.trim().is_empty()
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref().filter(|t| !t.trim().is_empty())
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CredentialsEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    claude_ai_oauth: Option<Credentials>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// Parse a stored record. A record without the `claudeAiOauth` slot counts as
/// not found: there is nothing to authenticate with.
fn decode_record(raw: &str) -> Result<Credentials, StoreError> {
    let envelope: CredentialsEnvelope = serde_json::from_str(raw.trim())
        .map_err(|e| StoreError::Corrupt(e.to_string()))?;
    envelope.claude_ai_oauth.ok_or(StoreError::NotFound)
}

/// Serialize `creds` into the envelope, keeping any other top-level keys of the
/// record being replaced.
fn encode_record(existing: Option<&str>, creds: &Credentials) -> Result<String, StoreError> {
    let mut envelope = existing
        .and_then(|raw| serde_json::from_str::<CredentialsEnvelope>(raw.trim()).ok())
        .unwrap_or(CredentialsEnvelope {
            claude_ai_oauth: None,
            extra: Map::new(),
        });
    envelope.claude_ai_oauth = Some(creds.clone());
    serde_json::to_string(&envelope).map_err(|e| StoreError::Corrupt(e.to_string()))
}

/// Durable storage for the single OAuth record.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self) -> Result<Credentials, StoreError>;

    /// Replace the whole record.
    async fn save(&self, creds: &Credentials) -> Result<(), StoreError>;

    /// Human-readable location, for logs and `config show`.
    fn describe(&self) -> String;
}

/// Pick the store named by the config. `auto` means the keychain on macOS and
/// the credentials file everywhere else.
pub fn store_from_config(auth: &AuthConfig) -> Arc<dyn CredentialStore> {
    let file_store = || -> Arc<dyn CredentialStore> {
        let path = auth
            .credentials_file
            .clone()
            .unwrap_or_else(default_credentials_path);
        Arc::new(FileStore::new(path))
    };
    match auth.credential_source.as_str() {
        "keychain" => Arc::new(KeychainStore::default()),
        "file" => file_store(),
        _ if cfg!(target_os = "macos") => Arc::new(KeychainStore::default()),
        _ => file_store(),
    }
}

/// `~/.claude/.credentials.json`, honouring `CLAUDE_CONFIG_DIR`.
pub fn default_credentials_path() -> PathBuf {
    std::env::var("CLAUDE_CONFIG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("~"))
                .join(".claude")
        })
        .join(".credentials.json")
}

// --- macOS keychain ---

pub struct KeychainStore {
    service: String,
    account: String,
}

impl Default for KeychainStore {
    fn default() -> Self {
        Self {
            service: KEYCHAIN_SERVICE.to_string(),
            account: KEYCHAIN_ACCOUNT.to_string(),
        }
    }
}

fn unavailable(err: ProcessError) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

impl KeychainStore {
    async fn read_raw(&self) -> Result<String, StoreError> {
        if which(SECURITY_BIN).is_none() {
            return Err(StoreError::Unavailable(format!(
                "`{}` not found in PATH",
                SECURITY_BIN
            )));
        }
        let output = run_command(
            SECURITY_BIN,
            &["find-generic-password", "-s", &self.service, "-w"],
            SECURITY_TIMEOUT,
        )
        .await
        .map_err(unavailable)?;

        match output.code {
            Some(0) => Ok(output.stdout),
            Some(SECURITY_ITEM_NOT_FOUND) => Err(StoreError::NotFound),
            _ => Err(StoreError::Unavailable(format!(
                "`security find-generic-password` failed: {}",
                output.stderr
            ))),
        }
    }
}

#[async_trait]
impl CredentialStore for KeychainStore {
    async fn load(&self) -> Result<Credentials, StoreError> {
        let raw = self.read_raw().await?;
        decode_record(&raw)
    }

    async fn save(&self, creds: &Credentials) -> Result<(), StoreError> {
        let existing = match self.read_raw().await {
            Ok(raw) => Some(raw),
            Err(StoreError::NotFound) => None,
            Err(e) => return Err(e),
        };
        let json = encode_record(existing.as_deref(), creds)?;

        // The item may not exist yet; only a failure to run `security` matters.
        run_command(
            SECURITY_BIN,
            &["delete-generic-password", "-s", &self.service],
            SECURITY_TIMEOUT,
        )
        .await
        .map_err(unavailable)?;

        let output = run_command(
            SECURITY_BIN,
            &[
                "add-generic-password",
                "-s",
                &self.service,
                "-a",
                &self.account,
                "-w",
                &json,
                "-U",
            ],
            SECURITY_TIMEOUT,
        )
        .await
        .map_err(unavailable)?;

        if !output.success() {
            return Err(StoreError::Unavailable(format!(
                "`security add-generic-password` failed: {}",
                output.stderr
            )));
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("macOS keychain ({})", self.service)
    }
}

// --- JSON file ---

pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn read_raw(&self) -> Result<Option<String>, StoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Unavailable(format!(
                "Failed to read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}

#[async_trait]
impl CredentialStore for FileStore {
    async fn load(&self) -> Result<Credentials, StoreError> {
        let raw = self.read_raw().await?.ok_or(StoreError::NotFound)?;
        decode_record(&raw)
    }

    async fn save(&self, creds: &Credentials) -> Result<(), StoreError> {
        let existing = self.read_raw().await?;
        let json = encode_record(existing.as_deref(), creds)?;

        let write_err = |e: std::io::Error| {
            StoreError::Unavailable(format!("Failed to write {}: {}", self.path.display(), e))
        };
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        // A leftover temp file would keep its old mode; start from a fresh one.
        match tokio::fs::remove_file(&tmp).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(write_err(e)),
            _ => {}
        }

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        options.mode(0o600);
        let mut file = options.open(&tmp).await.map_err(write_err)?;
        file.write_all(json.as_bytes()).await.map_err(write_err)?;
        file.sync_all().await.map_err(write_err)?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path).await.map_err(write_err)?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

// --- in-memory ---

#[cfg(test)]
pub use memory::MemoryStore;
