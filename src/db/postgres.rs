//! PostgreSQL warehouse client.
//!
//! Provides the `PostgresClient` struct that implements the `WarehouseClient`
//! trait using sqlx. The Snowflake-style credentials map onto a Postgres
//! connection as follows: `account` is `host[:port]`, `database` is the
//! database, `schema` becomes the `search_path` and `warehouse` is reported
//! as the application name.

use crate::config::Credentials;
use crate::db::{ColumnInfo, QueryResult, Row, Value, WarehouseBackend, WarehouseClient};
use crate::error::{DashboardError, Result};
use async_trait::async_trait;
use bigdecimal::{BigDecimal, ToPrimitive};
use sqlx::postgres::{PgColumn, PgConnectOptions, PgPool, PgPoolOptions, PgRow, Postgres};
use sqlx::{Column as SqlxColumn, Executor, Row as SqlxRow, Statement, TypeInfo};
use std::time::Instant;
use tracing::debug;

/// Default PostgreSQL port.
const DEFAULT_PORT: u16 = 5432;

/// PostgreSQL session.
#[derive(Debug)]
pub struct PostgresClient {
    pool: PgPool,
}

impl PostgresClient {
    /// Creates a new PostgresClient from an existing connection pool.
    ///
    /// This is primarily useful for testing.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a single-connection session described by the credentials.
    pub async fn connect(credentials: &Credentials) -> Result<Self> {
        let (host, port) = split_host_port(&credentials.account)?;

        let options = PgConnectOptions::new()
            .host(&host)
            .port(port)
            .username(&credentials.user_login)
            .password(&credentials.password)
            .database(&credentials.database)
            .application_name(&credentials.warehouse)
            .options([("search_path", credentials.schema.as_str())]);

        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| map_connection_error(e, &host, port, credentials))?;

        debug!("Connected to {}:{}/{}", host, port, credentials.database);
        Ok(Self { pool })
    }

    /// Column metadata for a statement that returned no rows.
    async fn describe_columns(&self, sql: &str) -> Result<Vec<ColumnInfo>> {
        let statement = (&self.pool)
            .prepare(sql)
            .await
            .map_err(|e| DashboardError::query(format_query_error(e)))?;

        Ok(statement
            .columns()
            .iter()
            .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
            .collect())
    }
}

#[async_trait]
impl WarehouseClient for PostgresClient {
    fn backend(&self) -> WarehouseBackend {
        WarehouseBackend::Postgres
    }

    async fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        if self.pool.is_closed() {
            return Err(DashboardError::query("Session is closed"));
        }

        let start = Instant::now();
        let result = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DashboardError::query(format_query_error(e)))?;
        let execution_time = start.elapsed();

        let columns: Vec<ColumnInfo> = match result.first() {
            Some(first_row) => first_row
                .columns()
                .iter()
                .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
                .collect(),
            None => self.describe_columns(sql).await?,
        };

        let rows = result.iter().map(convert_row).collect::<Result<Vec<Row>>>()?;

        Ok(QueryResult::with_data(columns, rows).with_execution_time(execution_time))
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

/// Splits `host[:port]`.
fn split_host_port(account: &str) -> Result<(String, u16)> {
    let account = account.trim();
    if account.is_empty() {
        return Err(DashboardError::config("Postgres host (account) is empty"));
    }

    match account.rsplit_once(':') {
        Some((host, port)) => {
            let port = port.parse::<u16>().map_err(|_| {
                DashboardError::config(format!("Invalid port '{port}' in account '{account}'"))
            })?;
            Ok((host.to_string(), port))
        }
        None => Ok((account.to_string(), DEFAULT_PORT)),
    }
}

/// Converts a sqlx PgRow to our Row type.
fn convert_row(row: &PgRow) -> Result<Row> {
    row.columns()
        .iter()
        .map(|col| convert_value(row, col))
        .collect()
}

/// Converts a single column value from a PgRow to our Value type.
///
/// A value that cannot be decoded is a query error, never a silent NULL.
fn convert_value(row: &PgRow, col: &PgColumn) -> Result<Value> {
    let value = match col.type_info().name().to_uppercase().as_str() {
        "BOOL" | "BOOLEAN" => decode::<bool>(row, col)?.map(Value::Bool),
        "INT2" | "SMALLINT" => decode::<i16>(row, col)?.map(|v| Value::Int(v as i64)),
        "INT4" | "INT" | "INTEGER" => decode::<i32>(row, col)?.map(|v| Value::Int(v as i64)),
        "INT8" | "BIGINT" => decode::<i64>(row, col)?.map(Value::Int),
        "FLOAT4" | "REAL" => decode::<f32>(row, col)?.map(|v| Value::Float(v as f64)),
        "FLOAT8" | "DOUBLE PRECISION" => decode::<f64>(row, col)?.map(Value::Float),
        "NUMERIC" | "DECIMAL" => decode::<BigDecimal>(row, col)?.map(numeric_value),
        _ => decode::<String>(row, col)?.map(Value::String),
    };
    Ok(value.unwrap_or(Value::Null))
}

fn decode<'r, T>(row: &'r PgRow, col: &PgColumn) -> Result<Option<T>>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get::<Option<T>, _>(col.ordinal()).map_err(|e| {
        DashboardError::query(format!(
            "Cannot decode column '{}' of type {}: {}",
            col.name(),
            col.type_info().name(),
            e
        ))
    })
}

/// Whole numbers that fit in i64 stay integers; fractions become floats.
fn numeric_value(n: BigDecimal) -> Value {
    if n.is_integer() {
        if let Some(i) = n.to_i64() {
            return Value::Int(i);
        }
    }
    match n.to_f64() {
        Some(f) => Value::Float(f),
        None => Value::String(n.to_string()),
    }
}

/// Maps sqlx connection errors to user-friendly messages.
fn map_connection_error(
    error: sqlx::Error,
    host: &str,
    port: u16,
    credentials: &Credentials,
) -> DashboardError {
    let user = &credentials.user_login;
    let database = &credentials.database;

    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") || error_str.contains("could not connect") {
        DashboardError::connection(format!(
            "Cannot connect to {host}:{port}. Check that the server is running."
        ))
    } else if error_str.contains("password authentication failed")
        || error_str.contains("authentication failed")
    {
        DashboardError::connection(format!(
            "Authentication failed for user '{user}'. Check your credentials."
        ))
    } else if error_str.contains("does not exist") && error_str.contains("database") {
        DashboardError::connection(format!("Database '{database}' does not exist."))
    } else {
        DashboardError::connection(error.to_string())
    }
}

/// Formats a query error with detail and hint when the server sent them.
fn format_query_error(error: sqlx::Error) -> String {
    let Some(db_error) = error.as_database_error() else {
        return error.to_string();
    };

    let mut result = String::from("ERROR: ");
    result.push_str(db_error.message());

    if let Some(pg_error) = db_error.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
        if let Some(detail) = pg_error.detail() {
            result.push_str("\n  DETAIL: ");
            result.push_str(detail);
        }
        if let Some(hint) = pg_error.hint() {
            result.push_str("\n  HINT: ");
            result.push_str(hint);
        }
    }

    result
}
