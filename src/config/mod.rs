//! Layered CLI configuration: defaults, then `config.toml`, then environment,
//! then command-line flags (applied by the caller).

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::oauth::endpoints::ProviderEndpoints;
use crate::auth::BackendKind;
use crate::error::{Result, ThreadsError};
use crate::util::fs::write_private;

pub const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:8585/callback";
pub const DEFAULT_SCOPE: &str = "threads_basic";
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Everything a command handler needs to know, passed explicitly.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub default_account: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    /// `auto` or a [`BackendKind`] name.
    pub backend: String,
    pub file_dir: Option<PathBuf>,
    pub expiry_warning_days: i64,
    pub auto_refresh: bool,
    pub authorize_url: Option<String>,
    pub graph_url: Option<String>,
    pub callback_timeout_secs: u64,
    pub http_timeout_secs: u64,
    /// Only ever taken from the environment; never written to disk.
    #[serde(skip)]
    pub file_passphrase: Option<String>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            default_account: None,
            client_id: None,
            client_secret: None,
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            scopes: vec![DEFAULT_SCOPE.to_string()],
            backend: "auto".to_string(),
            file_dir: None,
            expiry_warning_days: 7,
            auto_refresh: false,
            authorize_url: None,
            graph_url: None,
            callback_timeout_secs: 300,
            http_timeout_secs: 30,
            file_passphrase: None,
        }
    }
}

impl fmt::Debug for CliConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CliConfig")
            .field("default_account", &self.default_account)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .field("backend", &self.backend)
            .field("file_dir", &self.file_dir)
            .field("expiry_warning_days", &self.expiry_warning_days)
            .field("auto_refresh", &self.auto_refresh)
            .field("authorize_url", &self.authorize_url)
            .field("graph_url", &self.graph_url)
            .field("callback_timeout_secs", &self.callback_timeout_secs)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .field("file_passphrase", &self.file_passphrase.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl CliConfig {
    /// Defaults overlaid with the TOML file at `path`. A missing file is not
    /// an error.
    pub fn load_file(path: &Path) -> Result<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(err) => return Err(err.into()),
        };
        toml::from_str(&raw).map_err(|e| ThreadsError::ConfigFile {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// File at `path` (or the default location), then `.env` and the process
    /// environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => default_config_path(),
        };
        let mut config = Self::load_file(&path)?;
        config.apply_env(|var| std::env::var(var).ok());
        Ok(config)
    }

    /// Overlay `THREADS_*` variables read through `lookup`. Blank values are
    /// ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |var: &str| lookup(var).filter(|value| !value.trim().is_empty());

        if let Some(value) = get("THREADS_CLIENT_ID") {
            self.client_id = Some(value);
        }
        if let Some(value) = get("THREADS_CLIENT_SECRET") {
            self.client_secret = Some(value);
        }
        if let Some(value) = get("THREADS_REDIRECT_URI") {
            self.redirect_uri = value;
        }
        if let Some(value) = get("THREADS_ACCOUNT") {
            self.default_account = Some(value);
        }
        if let Some(value) = get("THREADS_BACKEND") {
            self.backend = value;
        }
        if let Some(value) = get("THREADS_GRAPH_URL") {
            self.graph_url = Some(value);
        }
        if let Some(value) = get("THREADS_AUTHORIZE_URL") {
            self.authorize_url = Some(value);
        }
        if let Some(value) = get("THREADS_FILE_PASSPHRASE") {
            self.file_passphrase = Some(value);
        }
    }

    /// Write the file-backed settings to `path` (owner-only).
    pub fn save(&self, path: &Path) -> Result<()> {
        let raw = toml::to_string_pretty(self)
            .map_err(|e| ThreadsError::Configuration(format!("cannot encode config: {e}")))?;
        write_private(path, raw.as_bytes())?;
        Ok(())
    }

    /// Persist a new default account without baking environment overrides
    /// into the file.
    pub fn save_default_account(path: &Path, account: &str) -> Result<()> {
        let mut on_disk = Self::load_file(path)?;
        on_disk.default_account = Some(account.to_string());
        on_disk.save(path)
    }

    /// `None` means automatic selection.
    pub fn backend_kind(&self) -> Result<Option<BackendKind>> {
        let value = self.backend.trim();
        if value.is_empty() || value.eq_ignore_ascii_case("auto") {
            return Ok(None);
        }
        BackendKind::from_str(value).map(Some).map_err(|_| {
            ThreadsError::Configuration(format!(
                "unknown backend '{value}' (expected auto, keychain, secret-service, credential-manager, file or memory)"
            ))
        })
    }

    pub fn endpoints(&self) -> ProviderEndpoints {
        let mut endpoints = ProviderEndpoints::default();
        if let Some(url) = &self.authorize_url {
            endpoints = endpoints.with_authorize_url(url);
        }
        if let Some(url) = &self.graph_url {
            endpoints = endpoints.with_graph_url(url);
        }
        endpoints
    }

    pub fn file_dir(&self) -> PathBuf {
        self.file_dir.clone().unwrap_or_else(default_file_dir)
    }

    pub fn expiry_window(&self) -> chrono::Duration {
        chrono::Duration::days(self.expiry_warning_days.max(0))
    }

    pub fn callback_timeout(&self) -> Duration {
        Duration::from_secs(self.callback_timeout_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Comma- or whitespace-separated scope list, as accepted on the command line.
    pub fn set_scopes(&mut self, raw: &str) {
        self.scopes = raw
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|scope| !scope.is_empty())
            .map(str::to_string)
            .collect();
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("net", "threads", "threads-cli")
}

/// `<config dir>/config.toml`, or `./.threads-cli/config.toml` when no home
/// directory can be determined.
pub fn default_config_path() -> PathBuf {
    match project_dirs() {
        Some(dirs) => dirs.config_dir().join(CONFIG_FILE_NAME),
        None => PathBuf::from(".threads-cli").join(CONFIG_FILE_NAME),
    }
}

/// Where the encrypted-file backend keeps its envelopes.
pub fn default_file_dir() -> PathBuf {
    match project_dirs() {
        Some(dirs) => dirs.data_dir().join("credentials"),
        None => PathBuf::from(".threads-cli").join("credentials"),
    }
}
