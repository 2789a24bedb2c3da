use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CblError, Result};

/// Durable device record: identity plus the long-lived refresh token.
///
/// An empty `refresh_token` means "not authorized".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub product_id: String,
    #[serde(default)]
    pub device_serial_number: String,
    #[serde(default)]
    pub refresh_token: String,
}

/// Storage abstraction for the persisted credential record.
pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Result<CredentialRecord>;
    fn save(&self, record: &CredentialRecord) -> Result<()>;

    fn refresh_token(&self) -> Result<String> {
        Ok(self.load()?.refresh_token)
    }

    fn set_refresh_token(&self, refresh_token: &str) -> Result<()> {
        let mut record = self.load()?;
        record.refresh_token = refresh_token.to_string();
        self.save(&record)
    }

    fn clear_refresh_token(&self) -> Result<()> {
        self.set_refresh_token("")
    }
}

/// File-backed credential store using a TOML file.
///
/// # Example
/// ```no_run
/// use cbl::auth::{CredentialStore, FileCredentialStore};
///
/// let store = FileCredentialStore::new("/tmp/cbl/credentials.toml");
/// store.set_refresh_token("Atzr|example")?;
/// assert_eq!(store.refresh_token()?, "Atzr|example");
/// # Ok::<(), cbl::error::CblError>(())
/// ```
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn new_default() -> Self {
        Self::new(default_store_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_parent(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<CredentialRecord> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(CredentialRecord::default())
            }
            Err(err) => return Err(CblError::Store(err.to_string())),
        };
        let file: RecordFile = toml::from_str(&raw)?;
        Ok(file.record)
    }

    fn save(&self, record: &CredentialRecord) -> Result<()> {
        Self::ensure_parent(&self.path)?;
        let file = RecordFile {
            version: RECORD_FILE_VERSION,
            saved_at: Utc::now(),
            record: record.clone(),
        };
        let serialized = toml::to_string(&file)?;
        fs::write(&self.path, serialized)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }
}

const RECORD_FILE_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RecordFile {
    version: u32,
    saved_at: DateTime<Utc>,
    record: CredentialRecord,
}

pub(crate) fn default_cbl_dir() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().join(".cbl"))
        .unwrap_or_else(|| PathBuf::from(".cbl"))
}

pub(crate) fn default_store_path() -> PathBuf {
    default_cbl_dir().join("credentials.toml")
}
