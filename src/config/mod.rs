//! Configuration system (layered: defaults < TOML file < env < code).

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::auth::store::{default_cbl_dir, default_store_path, CredentialRecord};
use crate::error::{CblError, Result};

pub const DEFAULT_AUTH_BASE_URL: &str = "https://api.amazon.com/auth/O2/";
pub const DEFAULT_PROFILE_URL: &str = "https://api.amazon.com/user/profile";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_REFRESH_MARGIN_SECS: u64 = 120;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Identity sent with every code-pair request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceIdentity {
    pub client_id: String,
    pub product_id: String,
    pub device_serial_number: String,
}

impl DeviceIdentity {
    pub fn new(
        client_id: impl Into<String>,
        product_id: impl Into<String>,
        device_serial_number: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            product_id: product_id.into(),
            device_serial_number: device_serial_number.into(),
        }
    }

    /// True when the client id is empty or still the `<...>` template value.
    pub fn has_placeholder_client_id(&self) -> bool {
        let client_id = self.client_id.trim();
        client_id.is_empty() || placeholder_pattern().is_match(client_id)
    }

    /// Fill empty fields from a stored record.
    pub fn or_record(mut self, record: &CredentialRecord) -> Self {
        if self.client_id.is_empty() {
            self.client_id = record.client_id.clone();
        }
        if self.product_id.is_empty() {
            self.product_id = record.product_id.clone();
        }
        if self.device_serial_number.is_empty() {
            self.device_serial_number = record.device_serial_number.clone();
        }
        self
    }
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^<[^>]*>$").expect("placeholder pattern is valid"))
}

/// Settings for the CBL client.
///
/// Resolution order:
/// 1. Explicit `with_*` calls
/// 2. `CBL_*` environment variables (a `.env` file is loaded if present)
/// 3. TOML config file
/// 4. Built-in defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CblConfig {
    #[serde(flatten)]
    pub identity: DeviceIdentity,
    pub auth_base_url: String,
    pub profile_url: String,
    pub enable_user_profile: bool,
    pub poll_interval_secs: u64,
    pub refresh_margin_secs: u64,
    pub request_timeout_secs: u64,
    pub store_path: PathBuf,
}

impl Default for CblConfig {
    fn default() -> Self {
        Self {
            identity: DeviceIdentity::default(),
            auth_base_url: DEFAULT_AUTH_BASE_URL.to_string(),
            profile_url: DEFAULT_PROFILE_URL.to_string(),
            enable_user_profile: false,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            refresh_margin_secs: DEFAULT_REFRESH_MARGIN_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            store_path: default_store_path(),
        }
    }
}

impl CblConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default config file path (~/.cbl/config.toml).
    pub fn default_config_path() -> PathBuf {
        default_cbl_dir().join("config.toml")
    }

    /// Parse a TOML config file; missing keys fall back to defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| {
            CblError::config(format!("cannot read {}: {err}", path.display()))
        })?;
        Ok(toml::from_str(&raw)?)
    }

    /// Defaults overlaid with environment variables.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::default().apply_env()
    }

    /// Full layering: an explicit file (or the default file if it exists),
    /// then environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv();
        let base = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Self::default_config_path();
                if default_path.is_file() {
                    Self::from_file(&default_path)?
                } else {
                    Self::default()
                }
            }
        };
        base.apply_env()
    }

    /// Overlay `CBL_*` environment variables onto this config.
    pub fn apply_env(mut self) -> Result<Self> {
        if let Some(value) = env_string("CBL_CLIENT_ID") {
            self.identity.client_id = value;
        }
        if let Some(value) = env_string("CBL_PRODUCT_ID") {
            self.identity.product_id = value;
        }
        if let Some(value) = env_string("CBL_DEVICE_SERIAL_NUMBER") {
            self.identity.device_serial_number = value;
        }
        if let Some(value) = env_string("CBL_AUTH_BASE_URL") {
            self.auth_base_url = value;
        }
        if let Some(value) = env_string("CBL_PROFILE_URL") {
            self.profile_url = value;
        }
        if let Some(value) = env_parsed::<bool>("CBL_ENABLE_USER_PROFILE")? {
            self.enable_user_profile = value;
        }
        if let Some(value) = env_parsed::<u64>("CBL_POLL_INTERVAL_SECS")? {
            self.poll_interval_secs = value;
        }
        if let Some(value) = env_parsed::<u64>("CBL_REFRESH_MARGIN_SECS")? {
            self.refresh_margin_secs = value;
        }
        if let Some(value) = env_parsed::<u64>("CBL_REQUEST_TIMEOUT_SECS")? {
            self.request_timeout_secs = value;
        }
        if let Some(value) = env_string("CBL_STORE_PATH") {
            self.store_path = PathBuf::from(value);
        }
        Ok(self)
    }

    pub fn with_identity(mut self, identity: DeviceIdentity) -> Self {
        self.identity = identity;
        self
    }

    pub fn with_auth_base_url(mut self, url: impl Into<String>) -> Self {
        self.auth_base_url = url.into();
        self
    }

    pub fn with_profile_url(mut self, url: impl Into<String>) -> Self {
        self.profile_url = url.into();
        self
    }

    pub fn with_user_profile(mut self, enabled: bool) -> Self {
        self.enable_user_profile = enabled;
        self
    }

    pub fn with_poll_interval_secs(mut self, secs: u64) -> Self {
        self.poll_interval_secs = secs;
        self
    }

    pub fn with_refresh_margin_secs(mut self, secs: u64) -> Self {
        self.refresh_margin_secs = secs;
        self
    }

    pub fn with_request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    pub fn with_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = path.into();
        self
    }

    /// Check the settings an authorization flow cannot run without.
    pub fn validate(&self) -> Result<()> {
        if self.identity.has_placeholder_client_id() {
            return Err(CblError::config(format!(
                "client_id is not configured (got {:?})",
                self.identity.client_id
            )));
        }
        if self.poll_interval_secs == 0 {
            return Err(CblError::config("poll_interval_secs must be at least 1"));
        }
        if reqwest::Url::parse(&self.auth_base_url).is_err() {
            return Err(CblError::config(format!(
                "auth_base_url is not a valid URL: {}",
                self.auth_base_url
            )));
        }
        Ok(())
    }

    /// `alexa:all`, plus `profile` when user profile fetching is enabled.
    pub fn scope(&self) -> &'static str {
        if self.enable_user_profile {
            "alexa:all profile"
        } else {
            "alexa:all"
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn refresh_margin(&self) -> Duration {
        Duration::from_secs(self.refresh_margin_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match env_string(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| CblError::config(format!("{key} has an invalid value: {raw}"))),
        None => Ok(None),
    }
}
