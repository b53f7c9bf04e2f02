use serde::Deserialize;
use std::{env, path::PathBuf};

use threadline_providers::{ChatEndpoints, EndpointError};

/// Environment variable that overrides `[server] base_url`.
pub const BASE_URL_ENV: &str = "THREADLINE_BASE_URL";

#[derive(Debug, Default, Deserialize)]
pub struct ThreadlineConfig {
    pub server: Option<ServerConfig>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl ConfigError {
    pub fn path(&self) -> &PathBuf {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ServerConfig {
    pub base_url: Option<String>,
    /// Chat route; defaults to `/ai`.
    pub chat_path: Option<String>,
    /// Thread deletion route; the thread id is appended.
    pub delete_path: Option<String>,
    /// Run cancellation route with an `{id}` placeholder. Unset disables
    /// remote cancellation.
    pub cancel_path: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum EndpointsError {
    #[error("no server base URL configured (set [server] base_url or THREADLINE_BASE_URL)")]
    MissingBaseUrl,
    #[error(transparent)]
    Invalid(#[from] EndpointError),
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value
        .map(|v| expand_env_vars(v.as_str()))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl ServerConfig {
    /// Resolve endpoints. `base_url_override` wins over the configured base URL.
    pub fn endpoints(&self, base_url_override: Option<&str>) -> Result<ChatEndpoints, EndpointsError> {
        let base_url = base_url_override
            .map(str::to_string)
            .or_else(|| non_empty(self.base_url.as_ref()))
            .ok_or(EndpointsError::MissingBaseUrl)?;

        let mut endpoints = ChatEndpoints::new(base_url)?;
        if let Some(path) = non_empty(self.chat_path.as_ref()) {
            endpoints = endpoints.with_chat_path(path)?;
        }
        if let Some(path) = non_empty(self.delete_path.as_ref()) {
            endpoints = endpoints.with_delete_path(path)?;
        }
        if let Some(path) = non_empty(self.cancel_path.as_ref()) {
            endpoints = endpoints.with_cancel_path(path)?;
        }
        Ok(endpoints)
    }
}

fn home_data_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".threadline"))
}

fn config_path() -> Option<PathBuf> {
    home_data_dir().map(|dir| dir.join("config.toml"))
}

/// Replace `${VAR}` with the variable's value (empty when unset).
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let var = &after[..end];
        if !var.is_empty() {
            out.push_str(&env::var(var).unwrap_or_default());
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

impl ThreadlineConfig {
    pub fn load() -> Result<Option<Self>, ConfigError> {
        match config_path() {
            Some(path) => Self::load_from(path),
            None => Ok(None),
        }
    }

    /// Load from an explicit path. A missing file is `Ok(None)`.
    pub fn load_from(path: PathBuf) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "Failed to read config");
                return Err(ConfigError::Read { path, source: err });
            }
        };

        match toml::from_str(&content) {
            Ok(config) => Ok(Some(config)),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "Failed to parse config");
                Err(ConfigError::Parse { path, source: err })
            }
        }
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }

    /// `~/.threadline`: config, logs and saved transcripts live here.
    #[must_use]
    pub fn data_dir() -> Option<PathBuf> {
        home_data_dir()
    }

    /// Endpoints from `[server]`, with [`BASE_URL_ENV`] taking precedence.
    pub fn endpoints(&self) -> Result<ChatEndpoints, EndpointsError> {
        let from_env = env::var(BASE_URL_ENV)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        match &self.server {
            Some(server) => server.endpoints(from_env.as_deref()),
            None => ServerConfig::default().endpoints(from_env.as_deref()),
        }
    }
}
