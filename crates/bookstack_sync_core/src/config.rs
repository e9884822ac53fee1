use std::env;
use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use toml::Value;

use crate::error::SyncError;

pub const DEFAULT_CONFIG_FILENAME: &str = ".bookstack-sync.toml";
pub const DEFAULT_USER_AGENT: &str = "bookstack-sync/0.1";

pub const ENV_URL: &str = "BOOKSTACK_URL";
pub const ENV_TOKEN_ID: &str = "BOOKSTACK_TOKEN_ID";
pub const ENV_TOKEN_SECRET: &str = "BOOKSTACK_TOKEN_SECRET";
pub const ENV_USER_AGENT: &str = "BOOKSTACK_USER_AGENT";

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct SyncConfig {
    #[serde(default)]
    pub bookstack: BookStackSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct BookStackSection {
    pub url: Option<String>,
    pub token_id: Option<String>,
    pub token_secret: Option<String>,
    pub user_agent: Option<String>,
    #[serde(default)]
    pub debug: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Env,
    Config,
    Unset,
}

impl ValueSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Env => "env",
            Self::Config => "config",
            Self::Unset => "unset",
        }
    }
}

/// Validated server URL and API token.
#[derive(Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub url: String,
    pub token_id: String,
    pub token_secret: String,
}

impl fmt::Debug for ServerSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerSettings")
            .field("url", &self.url)
            .field("token_id", &self.token_id)
            .field("token_secret", &"<redacted>")
            .finish()
    }
}

impl ServerSettings {
    pub fn new(url: &str, token_id: &str, token_secret: &str) -> Result<Self, SyncError> {
        let url = normalize_server_url(url)
            .ok_or_else(|| SyncError::Configuration("server URL is empty".to_string()))?;
        let settings = Self {
            url,
            token_id: token_id.trim().to_string(),
            token_secret: token_secret.trim().to_string(),
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        let host = self
            .url
            .strip_prefix("https://")
            .or_else(|| self.url.strip_prefix("http://"));
        match host {
            None => {
                return Err(SyncError::Configuration(format!(
                    "server URL must start with http:// or https://: {}",
                    self.url
                )));
            }
            Some(host) if host.trim_matches('/').is_empty() => {
                return Err(SyncError::Configuration(format!(
                    "server URL has no host: {}",
                    self.url
                )));
            }
            Some(_) => {}
        }
        if self.token_id.trim().is_empty() {
            return Err(SyncError::Configuration("token id is empty".to_string()));
        }
        if self.token_secret.trim().is_empty() {
            return Err(SyncError::Configuration("token secret is empty".to_string()));
        }
        Ok(())
    }

    /// `Authorization` header value for the BookStack API.
    pub fn authorization(&self) -> String {
        format!("Token {}:{}", self.token_id, self.token_secret)
    }
}

impl SyncConfig {
    /// Resolve the server URL: env BOOKSTACK_URL > config > None.
    pub fn url(&self) -> (Option<String>, ValueSource) {
        resolve_value(env_lookup(ENV_URL), self.bookstack.url.as_deref())
    }

    pub fn token_id(&self) -> (Option<String>, ValueSource) {
        resolve_value(env_lookup(ENV_TOKEN_ID), self.bookstack.token_id.as_deref())
    }

    pub fn token_secret(&self) -> (Option<String>, ValueSource) {
        resolve_value(
            env_lookup(ENV_TOKEN_SECRET),
            self.bookstack.token_secret.as_deref(),
        )
    }

    /// Resolve user agent: env BOOKSTACK_USER_AGENT > config > DEFAULT_USER_AGENT.
    pub fn user_agent(&self) -> String {
        resolve_value(
            env_lookup(ENV_USER_AGENT),
            self.bookstack.user_agent.as_deref(),
        )
        .0
        .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    /// Resolve and validate everything a write needs.
    pub fn server_settings(&self) -> Result<ServerSettings, SyncError> {
        self.server_settings_with_lookup(env_lookup)
    }

    fn server_settings_with_lookup<F>(&self, lookup_env: F) -> Result<ServerSettings, SyncError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let (url, _) = resolve_value(lookup_env(ENV_URL), self.bookstack.url.as_deref());
        let (token_id, _) =
            resolve_value(lookup_env(ENV_TOKEN_ID), self.bookstack.token_id.as_deref());
        let (token_secret, _) = resolve_value(
            lookup_env(ENV_TOKEN_SECRET),
            self.bookstack.token_secret.as_deref(),
        );
        let url = url.ok_or_else(|| {
            SyncError::Configuration(format!("server URL is not set (config or {ENV_URL})"))
        })?;
        let token_id = token_id.ok_or_else(|| {
            SyncError::Configuration(format!("token id is not set (config or {ENV_TOKEN_ID})"))
        })?;
        let token_secret = token_secret.ok_or_else(|| {
            SyncError::Configuration(format!(
                "token secret is not set (config or {ENV_TOKEN_SECRET})"
            ))
        })?;
        ServerSettings::new(&url, &token_id, &token_secret)
    }
}

/// Load and parse a SyncConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<SyncConfig> {
    if !config_path.exists() {
        return Ok(SyncConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: SyncConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

#[derive(Debug, Clone, Default)]
pub struct SyncConfigPatch {
    pub set_url: Option<String>,
    pub set_token_id: Option<String>,
    pub set_token_secret: Option<String>,
    pub set_debug: Option<bool>,
}

impl SyncConfigPatch {
    pub fn is_empty(&self) -> bool {
        self.set_url.is_none()
            && self.set_token_id.is_none()
            && self.set_token_secret.is_none()
            && self.set_debug.is_none()
    }
}

/// Update selected keys under `[bookstack]` while preserving all other config sections.
/// Returns `true` when a write occurred.
pub fn patch_config(config_path: &Path, patch: &SyncConfigPatch) -> Result<bool> {
    if patch.is_empty() {
        return Ok(false);
    }

    let url = match &patch.set_url {
        Some(url) => Some(normalize_server_url(url).ok_or_else(|| {
            SyncError::Configuration("server URL cannot be empty".to_string())
        })?),
        None => None,
    };
    let token_id = non_empty(patch.set_token_id.as_deref(), "token id")?;
    let token_secret = non_empty(patch.set_token_secret.as_deref(), "token secret")?;

    let mut root = if config_path.exists() {
        let content = fs::read_to_string(config_path)
            .with_context(|| format!("failed to read {}", config_path.display()))?;
        toml::from_str::<Value>(&content)
            .with_context(|| format!("failed to parse {}", config_path.display()))?
    } else {
        Value::Table(Default::default())
    };
    let original = root.clone();

    let root_table = root.as_table_mut().ok_or_else(|| {
        anyhow::anyhow!(
            "top-level TOML must be a table in {}",
            config_path.display()
        )
    })?;
    let section_entry = root_table
        .entry("bookstack".to_string())
        .or_insert_with(|| Value::Table(Default::default()));
    let section = section_entry.as_table_mut().ok_or_else(|| {
        anyhow::anyhow!("[bookstack] must be a table in {}", config_path.display())
    })?;

    if let Some(url) = url {
        section.insert("url".to_string(), Value::String(url));
    }
    if let Some(token_id) = token_id {
        section.insert("token_id".to_string(), Value::String(token_id));
    }
    if let Some(token_secret) = token_secret {
        section.insert("token_secret".to_string(), Value::String(token_secret));
    }
    if let Some(debug) = patch.set_debug {
        section.insert("debug".to_string(), Value::Boolean(debug));
    }

    if root == original {
        return Ok(false);
    }

    if let Some(parent) = config_path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let rendered = toml::to_string_pretty(&root).context("failed to serialize config TOML")?;
    fs::write(config_path, rendered)
        .with_context(|| format!("failed to write {}", config_path.display()))?;
    Ok(true)
}

/// Trim, prepend `https://` when no scheme is given, and drop trailing slashes.
pub fn normalize_server_url(value: &str) -> Option<String> {
    let trimmed = value.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        Some(trimmed.to_string())
    } else {
        Some(format!("https://{trimmed}"))
    }
}

/// Mask all but the last four characters of a secret for display.
pub fn mask_secret(secret: &str) -> String {
    let count = secret.chars().count();
    if count <= 4 {
        return "*".repeat(count);
    }
    let visible = secret.chars().skip(count - 4).collect::<String>();
    format!("{}{visible}", "*".repeat(count - 4))
}

fn env_lookup(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn resolve_value(
    env_value: Option<String>,
    configured: Option<&str>,
) -> (Option<String>, ValueSource) {
    if let Some(value) = env_value {
        let trimmed = value.trim().to_string();
        if !trimmed.is_empty() {
            return (Some(trimmed), ValueSource::Env);
        }
    }
    match configured.map(str::trim) {
        Some(value) if !value.is_empty() => (Some(value.to_string()), ValueSource::Config),
        _ => (None, ValueSource::Unset),
    }
}

fn non_empty(value: Option<&str>, label: &str) -> Result<Option<String>, SyncError> {
    match value.map(str::trim) {
        Some("") => Err(SyncError::Configuration(format!("{label} cannot be empty"))),
        Some(value) => Ok(Some(value.to_string())),
        None => Ok(None),
    }
}
