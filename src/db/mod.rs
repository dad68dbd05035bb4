//! Warehouse abstraction layer.
//!
//! Provides a trait-based interface for warehouse sessions, allowing
//! different backends to be used interchangeably.

mod mock;
mod postgres;
mod snowflake;
mod types;

pub use mock::{FailingWarehouse, FailurePoint, MockWarehouse, MockWarehouseClient};
pub use postgres::PostgresClient;
pub use snowflake::SnowflakeClient;
pub use types::{ColumnInfo, QueryResult, Row, Value};

use crate::config::WarehouseConfig;
use crate::error::{DashboardError, Result};
use async_trait::async_trait;
use sqlparser::dialect::{Dialect, GenericDialect, PostgreSqlDialect, SnowflakeDialect};
use std::fmt;
use std::str::FromStr;

/// Supported warehouse backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WarehouseBackend {
    #[default]
    Snowflake,
    Postgres,
    /// In-memory recruiting dataset.
    Mock,
}

impl WarehouseBackend {
    /// Returns the backend as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Snowflake => "snowflake",
            Self::Postgres => "postgres",
            Self::Mock => "mock",
        }
    }

    /// Parses a backend from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "snowflake" => Some(Self::Snowflake),
            "postgres" | "postgresql" => Some(Self::Postgres),
            "mock" => Some(Self::Mock),
            _ => None,
        }
    }

    /// SQL dialect used to check statements before they are sent.
    pub fn dialect(&self) -> Box<dyn Dialect> {
        match self {
            Self::Snowflake => Box::new(SnowflakeDialect {}),
            Self::Postgres => Box::new(PostgreSqlDialect {}),
            Self::Mock => Box::new(GenericDialect {}),
        }
    }
}

impl fmt::Display for WarehouseBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WarehouseBackend {
    type Err = DashboardError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| {
            DashboardError::config(format!(
                "Unknown backend '{s}'. Expected: snowflake, postgres, or mock"
            ))
        })
    }
}

/// Opens a session for the given configuration.
///
/// This is the central factory function for warehouse sessions.
pub async fn connect(config: &WarehouseConfig) -> Result<Box<dyn WarehouseClient>> {
    match config.backend {
        WarehouseBackend::Snowflake => {
            let client = SnowflakeClient::connect(&config.credentials).await?;
            Ok(Box::new(client))
        }
        WarehouseBackend::Postgres => {
            let client = PostgresClient::connect(&config.credentials).await?;
            Ok(Box::new(client))
        }
        WarehouseBackend::Mock => MockWarehouse::demo().connect().await,
    }
}

/// An open, authenticated warehouse session.
///
/// All operations are async and return Results with DashboardError.
#[async_trait]
pub trait WarehouseClient: Send + Sync {
    /// Backend this session talks to.
    fn backend(&self) -> WarehouseBackend;

    /// Executes a SQL statement and returns all of its rows.
    async fn execute_query(&self, sql: &str) -> Result<QueryResult>;

    /// Releases the session. Calling it again is a no-op.
    async fn close(&self) -> Result<()>;
}

/// Opens warehouse sessions on demand, one per dashboard run.
#[async_trait]
pub trait WarehouseConnector: Send + Sync {
    /// Opens a new session.
    async fn connect(&self) -> Result<Box<dyn WarehouseClient>>;
}

#[async_trait]
impl WarehouseConnector for WarehouseConfig {
    async fn connect(&self) -> Result<Box<dyn WarehouseClient>> {
        connect(self).await
    }
}
