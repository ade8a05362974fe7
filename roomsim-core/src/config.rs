use std::path::Path;
use std::time::Duration;

use config::{Config as ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::publish::{PublishOptions, PublishPlan, DEFAULT_CHUNK_SIZE};

/// Environment variable naming an explicit configuration file
pub const CONFIG_PATH_ENV: &str = "ROOMSIM_CONFIG_PATH";

/// Configuration file picked up from the working directory
pub const DEFAULT_CONFIG_FILE: &str = "roomsim.yaml";

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub connection: ConnectionConfig,
    pub publish: PublishConfig,
    pub logging: LoggingConfig,
}

/// Room server connection details
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub url: Option<String>,
    pub token: Option<String>,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub room: Option<String>,
    pub identity: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    pub targets: Vec<String>,
    pub fps: f64,
    pub demo: bool,
    pub dial_timeout_secs: u64,
    pub data_chunk_size: usize,
    pub data_pacing_ms: u64,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            fps: 0.0,
            demo: false,
            dial_timeout_secs: 10,
            data_chunk_size: DEFAULT_CHUNK_SIZE,
            data_pacing_ms: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

impl LoggingConfig {
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

/// Resolved way of authenticating against the room server
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Pre-minted access token
    Token { url: String, token: String },
    /// API key pair; the token is minted for `identity` in `room`
    ApiKey {
        url: String,
        api_key: String,
        api_secret: String,
        room: String,
        identity: String,
    },
}

impl Credentials {
    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::Token { url, .. } | Self::ApiKey { url, .. } => url,
        }
    }

    /// Room name, when known before connecting
    #[must_use]
    pub fn room(&self) -> Option<&str> {
        match self {
            Self::Token { .. } => None,
            Self::ApiKey { room, .. } => Some(room),
        }
    }

    #[must_use]
    pub fn identity(&self) -> Option<&str> {
        match self {
            Self::Token { .. } => None,
            Self::ApiKey { identity, .. } => Some(identity),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Token { url, token } => f
                .debug_struct("Token")
                .field("url", url)
                .field("token", &mask_secret(token))
                .finish(),
            Self::ApiKey {
                url,
                api_key,
                api_secret,
                room,
                identity,
            } => f
                .debug_struct("ApiKey")
                .field("url", url)
                .field("api_key", api_key)
                .field("api_secret", &mask_secret(api_secret))
                .field("room", room)
                .field("identity", identity)
                .finish(),
        }
    }
}

/// Keep only the first and last character of a secret
#[must_use]
pub fn mask_secret(secret: &str) -> String {
    let mut chars = secret.chars();
    match (chars.next(), chars.next_back()) {
        (Some(first), Some(last)) => format!("{first}***{last}"),
        (Some(_), None) => "*".to_string(),
        _ => String::new(),
    }
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (explicit path, `ROOMSIM_CONFIG_PATH`, or `./roomsim.yaml`)
    /// 3. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        let path = config_file
            .map(str::to_string)
            .or_else(|| std::env::var(CONFIG_PATH_ENV).ok())
            .or_else(|| Path::new(DEFAULT_CONFIG_FILE).exists().then(|| DEFAULT_CONFIG_FILE.to_string()));
        if let Some(path) = path {
            // An explicit file that does not exist is an error
            builder = builder.add_source(File::with_name(&path));
        }

        // ROOMSIM_CONNECTION__URL, ROOMSIM_PUBLISH__DATA_CHUNK_SIZE, ...
        builder = builder.add_source(
            Environment::with_prefix("ROOMSIM")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("publish.targets")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Load from file path
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::load(Some(path))
    }

    /// Collect every configuration problem.
    ///
    /// An empty list means the configuration is usable.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if !self.publish.fps.is_finite() || self.publish.fps < 0.0 {
            problems.push(format!("fps must be a non-negative number, got {}", self.publish.fps));
        }
        if self.publish.data_chunk_size == 0 {
            problems.push("data_chunk_size must be greater than zero".to_string());
        }
        if self.publish.dial_timeout_secs == 0 {
            problems.push("dial_timeout_secs must be greater than zero".to_string());
        }
        if crate::logging::parse_log_level(&self.logging.level).is_err() {
            problems.push(format!("invalid log level: {}", self.logging.level));
        }
        if !matches!(self.logging.format.to_lowercase().as_str(), "json" | "pretty") {
            problems.push(format!("log format must be json or pretty, got {}", self.logging.format));
        }
        if let Err(e) = self.credentials() {
            problems.push(e.to_string());
        }

        problems
    }

    /// Like [`Config::validate`] but as a single error
    pub fn ensure_valid(&self) -> Result<(), ConfigError> {
        let problems = self.validate();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }

    /// Resolve the connection credentials.
    ///
    /// A token wins over an API key pair when both are configured.
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        let c = &self.connection;
        let url = non_empty(&c.url).ok_or(ConfigError::MissingCredentials)?;

        if let Some(token) = non_empty(&c.token) {
            return Ok(Credentials::Token {
                url: url.to_string(),
                token: token.to_string(),
            });
        }

        match (
            non_empty(&c.api_key),
            non_empty(&c.api_secret),
            non_empty(&c.room),
            non_empty(&c.identity),
        ) {
            (Some(api_key), Some(api_secret), Some(room), Some(identity)) => Ok(Credentials::ApiKey {
                url: url.to_string(),
                api_key: api_key.to_string(),
                api_secret: api_secret.to_string(),
                room: room.to_string(),
                identity: identity.to_string(),
            }),
            _ => Err(ConfigError::MissingCredentials),
        }
    }

    #[must_use]
    pub fn publish_plan(&self) -> PublishPlan {
        PublishPlan {
            targets: self.publish.targets.clone(),
            fps: self.publish.fps,
            demo: self.publish.demo,
            options: PublishOptions {
                dial_timeout: Duration::from_secs(self.publish.dial_timeout_secs),
                data_chunk_size: self.publish.data_chunk_size,
                data_pacing: Duration::from_millis(self.publish.data_pacing_ms),
            },
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}
