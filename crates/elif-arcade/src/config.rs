//! Client configuration
//!
//! Configuration can be built explicitly or loaded from `ARCADEDB_*`
//! environment variables. Either way it is validated before a connection is
//! created from it.

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::time::Duration;

use crate::error::{ArcadeError, ArcadeResult};

/// Default server endpoint
pub const DEFAULT_ENDPOINT: &str = "http://localhost:2480";

/// Default prefix of the HTTP API below the endpoint
pub const DEFAULT_API_PREFIX: &str = "/api/v1";

/// Default request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default number of idle sockets kept per host
pub const DEFAULT_POOL_MAX_IDLE: usize = 10;

/// Username and password sent as HTTP basic auth
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Options used when opening a connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectOptions {
    /// Basic auth credentials, if the server requires them
    pub credentials: Option<Credentials>,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Maximum idle sockets kept in the HTTP pool per host
    pub pool_max_idle: usize,
    /// Path prefix of the HTTP API
    pub api_prefix: String,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            credentials: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            pool_max_idle: DEFAULT_POOL_MAX_IDLE,
            api_prefix: DEFAULT_API_PREFIX.to_string(),
        }
    }
}

impl ConnectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(Credentials::new(username, password));
        self
    }

    pub fn timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn pool_max_idle(mut self, pool_max_idle: usize) -> Self {
        self.pool_max_idle = pool_max_idle;
        self
    }

    pub fn api_prefix(mut self, api_prefix: impl Into<String>) -> Self {
        self.api_prefix = api_prefix.into();
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Full connection configuration: where to connect plus how
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArcadeConfig {
    pub endpoint: String,
    pub database: String,
    #[serde(flatten)]
    pub options: ConnectOptions,
}

impl Default for ArcadeConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            database: String::new(),
            options: ConnectOptions::default(),
        }
    }
}

impl ArcadeConfig {
    pub fn new(endpoint: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            database: database.into(),
            options: ConnectOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ConnectOptions) -> Self {
        self.options = options;
        self
    }

    /// Load configuration from `ARCADEDB_*` environment variables
    ///
    /// `ARCADEDB_DATABASE` is required. Credentials are only set when both
    /// `ARCADEDB_USERNAME` and `ARCADEDB_PASSWORD` are present.
    pub fn from_env() -> ArcadeResult<Self> {
        let endpoint = get_env_or_default("ARCADEDB_URL", DEFAULT_ENDPOINT);
        let database = env::var("ARCADEDB_DATABASE").map_err(|_| {
            ArcadeError::Configuration(
                "Missing required environment variable: ARCADEDB_DATABASE".to_string(),
            )
        })?;

        let timeout_secs = parse_env("ARCADEDB_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?;
        let pool_max_idle = parse_env("ARCADEDB_POOL_MAX_IDLE", DEFAULT_POOL_MAX_IDLE)?;
        let api_prefix = get_env_or_default("ARCADEDB_API_PREFIX", DEFAULT_API_PREFIX);

        let credentials = match (env::var("ARCADEDB_USERNAME"), env::var("ARCADEDB_PASSWORD")) {
            (Ok(username), Ok(password)) => Some(Credentials::new(username, password)),
            _ => None,
        };

        let config = ArcadeConfig {
            endpoint,
            database,
            options: ConnectOptions {
                credentials,
                timeout_secs,
                pool_max_idle,
                api_prefix,
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration before it is used to connect
    pub fn validate(&self) -> ArcadeResult<()> {
        let url = url::Url::parse(&self.endpoint)?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ArcadeError::Configuration(format!(
                "Endpoint must use http or https, got '{}'",
                url.scheme()
            )));
        }

        if self.database.trim().is_empty() {
            return Err(ArcadeError::Configuration(
                "Database name must not be empty".to_string(),
            ));
        }

        if self.options.timeout_secs == 0 {
            return Err(ArcadeError::Configuration(
                "Request timeout must be greater than 0".to_string(),
            ));
        }

        if !self.options.api_prefix.is_empty() && !self.options.api_prefix.starts_with('/') {
            return Err(ArcadeError::Configuration(format!(
                "API prefix must start with '/', got '{}'",
                self.options.api_prefix
            )));
        }

        Ok(())
    }
}

fn get_env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> ArcadeResult<T> {
    match env::var(key) {
        Ok(value) => value.parse::<T>().map_err(|_| {
            ArcadeError::Configuration(format!("Invalid value for {}: '{}'", key, value))
        }),
        Err(_) => Ok(default),
    }
}
