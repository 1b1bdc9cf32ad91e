//! Server configuration module.
//!
//! Parses configuration from environment variables for the GateHub server.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `DATABASE_URL` | No | - | Postgres connection string; in-memory store when unset |
//! | `PORT` | No | 8080 | HTTP server port |
//! | `GATEHUB_SAVE_DIR` | No | saved_images | Directory for event image attachments |

use std::env;
use std::path::PathBuf;

use thiserror::Error;

/// Default HTTP server port.
const DEFAULT_PORT: u16 = 8080;

/// Default directory for saved event images.
const DEFAULT_SAVE_DIR: &str = "saved_images";

/// Errors that can occur when parsing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable has invalid format.
    #[error("invalid format for {var}: {message}")]
    InvalidFormat { var: String, message: String },

    /// Port number is invalid.
    #[error("invalid port number: {0}")]
    InvalidPort(#[from] std::num::ParseIntError),
}

/// Server configuration parsed from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string. When absent the server runs with a
    /// non-durable in-memory store.
    pub database_url: Option<String>,

    /// HTTP server port.
    pub port: u16,

    /// Directory event image attachments are written to.
    pub save_dir: PathBuf,
}

impl Config {
    /// Parse configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `PORT` is set but not a valid u16, or a
    /// variable contains invalid unicode.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use gatehub_server::config::Config;
    ///
    /// let config = Config::from_env().expect("Failed to load config");
    /// println!("Server will listen on port {}", config.port);
    /// ```
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = env::var("DATABASE_URL").ok().filter(|s| !s.is_empty());
        let port = parse_port()?;
        let save_dir = parse_save_dir()?;

        Ok(Self {
            database_url,
            port,
            save_dir,
        })
    }
}

/// Parse the PORT environment variable.
///
/// Returns the default port if not set.
fn parse_port() -> Result<u16, ConfigError> {
    match env::var("PORT") {
        Ok(port_str) => Ok(port_str.parse()?),
        Err(env::VarError::NotPresent) => Ok(DEFAULT_PORT),
        Err(env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidFormat {
            var: "PORT".to_string(),
            message: "contains invalid unicode".to_string(),
        }),
    }
}

/// Parse the GATEHUB_SAVE_DIR environment variable.
fn parse_save_dir() -> Result<PathBuf, ConfigError> {
    match env::var("GATEHUB_SAVE_DIR") {
        Ok(dir) if !dir.is_empty() => Ok(PathBuf::from(dir)),
        Ok(_) | Err(env::VarError::NotPresent) => Ok(PathBuf::from(DEFAULT_SAVE_DIR)),
        Err(env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidFormat {
            var: "GATEHUB_SAVE_DIR".to_string(),
            message: "contains invalid unicode".to_string(),
        }),
    }
}
