use std::collections::{BTreeMap, HashMap};

use casket_auth::{CasConfig, UserAccount};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Server configuration: the CAS core plus what the host wires around it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub cas: CasConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Username/password accounts, keyed by username.
    #[serde(default)]
    pub users: HashMap<String, UserAccount>,
    /// Principal attributes, keyed by principal name.
    #[serde(default)]
    pub attributes: HashMap<String, BTreeMap<String, Vec<Value>>>,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.cas.validate().map_err(|e| e.to_string())?;
        if tracing_subscriber::EnvFilter::try_new(&self.logging.level).is_err() {
            return Err(format!("logging.level '{}' is not a valid filter", self.logging.level));
        }
        for (username, account) in &self.users {
            if username.is_empty() {
                return Err("users: username must not be empty".into());
            }
            if !account.password_hash.starts_with('$') {
                return Err(format!(
                    "users.{username}.password_hash must be a PHC string (see `casket-server hash-password`)"
                ));
            }
        }
        Ok(())
    }
}

/// Log output settings. `level` takes `EnvFilter` directives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Colored output.
    #[serde(default = "default_true")]
    pub ansi: bool,
    /// Print the event's module path.
    #[serde(default = "default_true")]
    pub with_target: bool,
}
fn default_log_level() -> String {
    "info".into()
}
fn default_true() -> bool {
    true
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            ansi: true,
            with_target: true,
        }
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    pub const DEFAULT_CONFIG_PATH: &str = "casket.toml";

    /// Loads configuration from an optional TOML file, then `CASKET__*` environment
    /// overrides, and validates the result.
    ///
    /// A missing file is not an error; every section has defaults.
    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_PATH));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., CASKET__CAS__PROXY__ENABLED=false
        builder = builder.add_source(
            Environment::with_prefix("CASKET")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}
