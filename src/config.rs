//! Configuration management for the hiring dashboard.
//!
//! Warehouse credentials are loaded from a `.env` file or a TOML secrets file
//! and passed explicitly to the connect call. Nothing is read from, or
//! written to, the process environment.

use crate::db::WarehouseBackend;
use crate::error::{DashboardError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Default address the dashboard is served on.
pub const DEFAULT_BIND: &str = "127.0.0.1:8501";

/// Table holding the credentials in a TOML secrets file.
pub const SECRETS_TABLE: &str = "snowflake_credentials";

/// Names of the credential fields, all required.
pub const CREDENTIAL_FIELDS: [&str; 6] = [
    "user_login",
    "password",
    "account",
    "warehouse",
    "database",
    "schema",
];

/// Warehouse credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Login name.
    pub user_login: String,

    /// Password. Never logged.
    pub password: String,

    /// Account identifier (Snowflake) or `host[:port]` (Postgres).
    pub account: String,

    /// Compute warehouse to run the queries on.
    pub warehouse: String,

    /// Database holding the recruiting relations.
    pub database: String,

    /// Schema holding the recruiting relations.
    pub schema: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user_login", &self.user_login)
            .field("password", &"<redacted>")
            .field("account", &self.account)
            .field("warehouse", &self.warehouse)
            .field("database", &self.database)
            .field("schema", &self.schema)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct SecretsFile {
    snowflake_credentials: Option<HashMap<String, String>>,
}

impl Credentials {
    /// Builds credentials from key-value pairs.
    ///
    /// Every field in [`CREDENTIAL_FIELDS`] must be present and non-empty;
    /// all missing fields are reported in one error. Extra keys are ignored.
    pub fn from_map(values: &HashMap<String, String>) -> Result<Self> {
        let missing: Vec<&str> = CREDENTIAL_FIELDS
            .iter()
            .copied()
            .filter(|field| values.get(*field).map_or(true, |v| v.trim().is_empty()))
            .collect();

        if !missing.is_empty() {
            return Err(DashboardError::config(format!(
                "Missing credential field(s): {}",
                missing.join(", ")
            )));
        }

        let field = |name: &str| values.get(name).cloned().unwrap_or_default();
        Ok(Self {
            user_login: field("user_login"),
            password: field("password"),
            account: field("account"),
            warehouse: field("warehouse"),
            database: field("database"),
            schema: field("schema"),
        })
    }

    /// Loads credentials from a dotenv-style file without touching the
    /// process environment.
    pub fn from_env_file(path: &Path) -> Result<Self> {
        let entries = dotenvy::from_path_iter(path).map_err(|e| {
            DashboardError::config(format!("Failed to read {}: {e}", path.display()))
        })?;

        let mut values = HashMap::new();
        for entry in entries {
            let (key, value) = entry.map_err(|e| {
                DashboardError::config(format!("Invalid entry in {}: {e}", path.display()))
            })?;
            values.insert(key, value);
        }

        Self::from_map(&values).map_err(|e| {
            DashboardError::config(format!("{} in {}", e.message(), path.display()))
        })
    }

    /// Loads credentials from the `[snowflake_credentials]` table of a TOML
    /// secrets file.
    pub fn from_secrets_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DashboardError::config(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::parse_secrets(&content, path)
    }

    fn parse_secrets(content: &str, path: &Path) -> Result<Self> {
        let secrets: SecretsFile = toml::from_str(content).map_err(|e| {
            DashboardError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })?;

        let values = secrets.snowflake_credentials.ok_or_else(|| {
            DashboardError::config(format!(
                "No [{SECRETS_TABLE}] table in {}",
                path.display()
            ))
        })?;

        Self::from_map(&values).map_err(|e| {
            DashboardError::config(format!("{} in {}", e.message(), path.display()))
        })
    }

    /// Resolves credentials from the first available source:
    ///
    /// 1. the secrets file given on the command line
    /// 2. the env file given on the command line
    /// 3. `.env` in the working directory
    /// 4. the secrets file in the platform config directory
    pub fn resolve(secrets: Option<&Path>, env_file: Option<&Path>) -> Result<Self> {
        if let Some(path) = secrets {
            return Self::from_secrets_file(path);
        }
        if let Some(path) = env_file {
            return Self::from_env_file(path);
        }

        let local_env = Path::new(".env");
        if local_env.exists() {
            return Self::from_env_file(local_env);
        }

        let default_secrets = default_secrets_path();
        if default_secrets.exists() {
            return Self::from_secrets_file(&default_secrets);
        }

        Err(DashboardError::config(format!(
            "No credentials found. Create .env or {} with the fields: {}",
            default_secrets.display(),
            CREDENTIAL_FIELDS.join(", ")
        )))
    }

    /// Returns a display-safe string (no password) for logs and the UI.
    pub fn display_string(&self) -> String {
        format!(
            "{}@{} ({}.{} on {})",
            self.user_login, self.account, self.database, self.schema, self.warehouse
        )
    }
}

/// Returns the default secrets file path for the current platform.
pub fn default_secrets_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hiring-dashboard")
        .join("secrets.toml")
}

/// Everything needed to open a warehouse session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarehouseConfig {
    /// Backend to connect to.
    pub backend: WarehouseBackend,

    /// Credentials for the backend.
    pub credentials: Credentials,
}

impl WarehouseConfig {
    /// Creates a warehouse config.
    pub fn new(backend: WarehouseBackend, credentials: Credentials) -> Self {
        Self {
            backend,
            credentials,
        }
    }
}

/// Parses a `host:port` bind address.
pub fn parse_bind_addr(bind: &str) -> Result<SocketAddr> {
    bind.parse()
        .map_err(|_| DashboardError::config(format!("Invalid bind address '{bind}'")))
}
