use serde::Deserialize;
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the config file.
    ReadFile { path: PathBuf, source: std::io::Error },
    /// Failed to parse JSON.
    ParseJson { path: PathBuf, source: serde_json::Error },
    /// Failed to read the API key file.
    ReadApiKey { path: PathBuf, source: std::io::Error },
    /// Validation error.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFile { path, source } => {
                write!(f, "failed to read config file '{}': {}", path.display(), source)
            }
            Self::ParseJson { path, source } => {
                write!(f, "failed to parse config file '{}': {}", path.display(), source)
            }
            Self::ReadApiKey { path, source } => {
                write!(f, "failed to read API key file '{}': {}", path.display(), source)
            }
            Self::Validation(msg) => write!(f, "config validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFile { source, .. } => Some(source),
            Self::ParseJson { source, .. } => Some(source),
            Self::ReadApiKey { source, .. } => Some(source),
            Self::Validation(_) => None,
        }
    }
}

#[derive(Deserialize)]
struct ConfigFile {
    /// Name of the bot as registered with GroupMe. Messages authored under
    /// this name are ignored.
    bot_name: String,
    /// Group whose member list is searched when resolving nicknames.
    group_name: String,
    /// Bot id to post as. Looked up by `bot_name` when absent.
    bot_id: Option<String>,
    /// File holding the GroupMe API token.
    #[serde(default = "default_api_key_file")]
    api_key_file: String,
    /// SQLite file holding the point ledger. Defaults to `<data_dir>/points.db`.
    database_path: Option<String>,
    #[serde(default = "default_bind")]
    bind: String,
    #[serde(default = "default_webhook_path")]
    webhook_path: String,
    #[serde(default = "default_api_base")]
    api_base: String,
    /// Directory for state files (logs, database). Defaults to current directory.
    data_dir: Option<String>,
}

fn default_api_key_file() -> String {
    ".groupy.key".to_string()
}

fn default_bind() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_webhook_path() -> String {
    "/groupme".to_string()
}

fn default_api_base() -> String {
    "https://api.groupme.com/v3".to_string()
}

pub struct Config {
    pub bot_name: String,
    pub group_name: String,
    pub bot_id: Option<String>,
    pub api_key: String,
    pub database_path: PathBuf,
    pub bind: SocketAddr,
    pub webhook_path: String,
    pub api_base: String,
    /// Directory for state files (logs, database).
    pub data_dir: PathBuf,
}

/// Environment values that take precedence over the config file.
#[derive(Default)]
struct EnvOverrides {
    port: Option<String>,
    database_url: Option<String>,
}

impl EnvOverrides {
    fn from_env() -> Self {
        Self {
            port: std::env::var("PORT").ok(),
            database_url: std::env::var("DATABASE_URL").ok(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::load_with(path.as_ref(), EnvOverrides::from_env())
    }

    fn load_with(config_path: &Path, env: EnvOverrides) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(config_path)
            .map_err(|e| ConfigError::ReadFile { path: config_path.to_path_buf(), source: e })?;
        let file: ConfigFile = serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseJson { path: config_path.to_path_buf(), source: e })?;

        if file.bot_name.trim().is_empty() {
            return Err(ConfigError::Validation("bot_name is required".into()));
        }
        if file.group_name.trim().is_empty() {
            return Err(ConfigError::Validation("group_name is required".into()));
        }
        if !file.webhook_path.starts_with('/') {
            return Err(ConfigError::Validation("webhook_path must start with '/'".into()));
        }

        let mut bind: SocketAddr = file.bind.parse().map_err(|_| {
            ConfigError::Validation(format!("bind '{}' is not a socket address", file.bind))
        })?;
        if let Some(port) = env.port {
            let port: u16 = port
                .parse()
                .map_err(|_| ConfigError::Validation(format!("PORT '{}' is not a port number", port)))?;
            bind.set_port(port);
        }

        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        let database_path = match env.database_url {
            Some(url) => PathBuf::from(url.strip_prefix("sqlite://").unwrap_or(&url)),
            None => file
                .database_path
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join("points.db")),
        };

        let key_path = PathBuf::from(&file.api_key_file);
        let api_key = std::fs::read_to_string(&key_path)
            .map_err(|e| ConfigError::ReadApiKey { path: key_path.clone(), source: e })?
            .trim()
            .to_string();
        if api_key.is_empty() {
            return Err(ConfigError::Validation(format!(
                "API key file '{}' is empty",
                key_path.display()
            )));
        }

        Ok(Self {
            bot_name: file.bot_name,
            group_name: file.group_name,
            bot_id: file.bot_id.filter(|id| !id.is_empty()),
            api_key,
            database_path,
            bind,
            webhook_path: file.webhook_path,
            api_base: file.api_base.trim_end_matches('/').to_string(),
            data_dir,
        })
    }
}
