use std::num::ParseIntError;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: ParseIntError,
    },
    #[error("failed to parse {name} as boolean: {value}")]
    ParseBool { name: String, value: String },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Database
    pub database_path: PathBuf,
    pub db_max_connections: u32,

    // Web Server
    pub web_host: String,
    pub web_port: u16,
    pub static_dir: Option<PathBuf>,
    pub cors_permissive: bool,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if an environment variable is present but invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            // Database
            database_path: PathBuf::from(env_or_default(
                "DATABASE_PATH",
                "./data/mini-blog.sqlite",
            )),
            db_max_connections: parse_env_int("DB_MAX_CONNECTIONS", 5)?,

            // Web Server
            web_host: env_or_default("WEB_HOST", "127.0.0.1"),
            web_port: parse_env_int("WEB_PORT", 3000)?,
            static_dir: optional_env("STATIC_DIR")
                .map(PathBuf::from)
                .or_else(find_static_dir),
            cors_permissive: parse_env_bool("CORS_PERMISSIVE", true)?,
        })
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "DATABASE_PATH".to_string(),
                message: "cannot be empty".to_string(),
            });
        }
        if self.db_max_connections == 0 {
            return Err(ConfigError::InvalidValue {
                name: "DB_MAX_CONNECTIONS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Find the static files directory.
///
/// Checks `./frontend` then `./static`; no fallback is served when neither exists.
fn find_static_dir() -> Option<PathBuf> {
    ["./frontend", "./static"]
        .into_iter()
        .map(PathBuf::from)
        .find(|path| path.is_dir())
}

/// Value of `name`, treating an empty variable as unset.
fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|val| !val.is_empty())
}

fn env_or_default(name: &str, default: &str) -> String {
    optional_env(name).unwrap_or_else(|| default.to_string())
}

/// Parse an integer variable, falling back to `default` when unset or empty.
fn parse_env_int<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr<Err = ParseIntError>,
{
    optional_env(name).map_or(Ok(default), |val| {
        val.parse().map_err(|source| ConfigError::ParseInt {
            name: name.to_string(),
            source,
        })
    })
}

fn parse_env_bool(name: &str, default: bool) -> Result<bool, ConfigError> {
    let Some(val) = optional_env(name) else {
        return Ok(default);
    };
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::ParseBool {
            name: name.to_string(),
            value: val,
        }),
    }
}
