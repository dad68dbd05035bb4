//! Snowflake client over the REST session API used by the official drivers.
//!
//! A session is a login token obtained from `/session/v1/login-request`.
//! Statements go to `/queries/v1/query-request` and results arrive as JSON,
//! either inline or split into chunks fetched from cloud storage.

use crate::config::Credentials;
use crate::db::{ColumnInfo, QueryResult, Row, Value, WarehouseBackend, WarehouseClient};
use crate::error::{DashboardError, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;
use uuid::Uuid;

const CLIENT_APP_ID: &str = "hiring-dashboard";

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

const SNOWFLAKE_ACCEPT: &str = "application/snowflake";

/// Response codes for a statement that has not finished yet.
const QUERY_IN_PROGRESS: &str = "333333";
const QUERY_IN_PROGRESS_ASYNC: &str = "333334";

/// Delay between polls of a running statement.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Snowflake session.
pub struct SnowflakeClient {
    http: reqwest::Client,
    base_url: Url,
    token: Mutex<Option<String>>,
    sequence: AtomicU64,
}

impl fmt::Debug for SnowflakeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnowflakeClient")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl SnowflakeClient {
    /// Logs in to the account named in the credentials.
    pub async fn connect(credentials: &Credentials) -> Result<Self> {
        let base_url = account_url(&credentials.account)?;
        Self::connect_to(base_url, credentials).await
    }

    /// Logs in against an explicit endpoint.
    pub async fn connect_to(base_url: Url, credentials: &Credentials) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .gzip(true)
            .build()
            .map_err(|e| DashboardError::connection(format!("Failed to build HTTP client: {e}")))?;

        let token = login(&http, &base_url, credentials).await?;
        debug!("Logged in to Snowflake at {}", base_url);

        Ok(Self {
            http,
            base_url,
            token: Mutex::new(Some(token)),
            sequence: AtomicU64::new(0),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| DashboardError::internal(format!("Invalid Snowflake URL '{path}': {e}")))
    }

    async fn session_token(&self) -> Result<String> {
        self.token
            .lock()
            .await
            .clone()
            .ok_or_else(|| DashboardError::query("Session is closed"))
    }

    async fn submit(&self, token: &str, sql: &str) -> Result<Envelope<QueryData>> {
        let mut url = self.endpoint("/queries/v1/query-request")?;
        url.query_pairs_mut()
            .append_pair("requestId", &Uuid::new_v4().to_string());

        let body = json!({
            "sqlText": sql,
            "asyncExec": false,
            "sequenceId": self.sequence.fetch_add(1, Ordering::SeqCst) + 1,
            "querySubmissionTime": Utc::now().timestamp_millis(),
        });

        let response = self
            .http
            .post(url)
            .headers(auth_headers(token)?)
            .json(&body)
            .send()
            .await
            .map_err(|e| DashboardError::query(format!("Failed to submit query: {e}")))?;

        read_envelope(response).await.map_err(DashboardError::query)
    }

    async fn poll(&self, token: &str, result_url: &str) -> Result<Envelope<QueryData>> {
        let response = self
            .http
            .get(self.endpoint(result_url)?)
            .headers(auth_headers(token)?)
            .send()
            .await
            .map_err(|e| DashboardError::query(format!("Failed to poll query result: {e}")))?;

        read_envelope(response).await.map_err(DashboardError::query)
    }

    async fn collect_result(&self, data: QueryData) -> Result<QueryResult> {
        if let Some(format) = data.query_result_format.as_deref() {
            if !format.eq_ignore_ascii_case("json") {
                return Err(DashboardError::query(format!(
                    "Unsupported result format '{format}'"
                )));
            }
        }

        let mut raw_rows = data.rowset;
        for (index, chunk) in data.chunks.iter().enumerate() {
            debug!(chunk = index, rows = chunk.row_count, "Fetching result chunk");
            let rows = self
                .fetch_chunk(chunk, data.chunk_headers.as_ref(), data.qrmk.as_deref())
                .await?;
            raw_rows.extend(rows);
        }

        let columns = data
            .rowtype
            .iter()
            .map(|column| ColumnInfo::new(&column.name, &column.type_name))
            .collect();
        let rows = raw_rows
            .into_iter()
            .map(|raw| convert_row(&data.rowtype, raw))
            .collect();

        Ok(QueryResult::with_data(columns, rows))
    }

    async fn fetch_chunk(
        &self,
        chunk: &Chunk,
        chunk_headers: Option<&HashMap<String, String>>,
        qrmk: Option<&str>,
    ) -> Result<Vec<RawRow>> {
        let response = self
            .http
            .get(&chunk.url)
            .headers(chunk_request_headers(chunk_headers, qrmk)?)
            .send()
            .await
            .map_err(|e| DashboardError::query(format!("Failed to fetch result chunk: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| DashboardError::query(format!("Failed to read result chunk: {e}")))?;
        if !status.is_success() {
            return Err(DashboardError::query(format!(
                "Result chunk request failed with HTTP {status}"
            )));
        }

        parse_chunk(&body)
            .map_err(|e| DashboardError::query(format!("Malformed result chunk: {e}")))
    }
}

#[async_trait]
impl WarehouseClient for SnowflakeClient {
    fn backend(&self) -> WarehouseBackend {
        WarehouseBackend::Snowflake
    }

    async fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        let start = Instant::now();
        let token = self.session_token().await?;

        let mut envelope = self.submit(&token, sql).await?;
        while envelope.in_progress() {
            let result_url = envelope
                .data
                .as_ref()
                .and_then(|data| data.get_result_url.clone())
                .ok_or_else(|| {
                    DashboardError::query("Query is still running but no result URL was given")
                })?;
            debug!("Query still running, polling {}", result_url);
            tokio::time::sleep(POLL_INTERVAL).await;
            envelope = self.poll(&token, &result_url).await?;
        }

        let data = envelope.into_data().map_err(DashboardError::query)?;
        if let Some(query_id) = data.query_id.as_deref() {
            debug!(query_id, "Snowflake query finished");
        }

        let result = self.collect_result(data).await?;
        Ok(result.with_execution_time(start.elapsed()))
    }

    async fn close(&self) -> Result<()> {
        let Some(token) = self.token.lock().await.take() else {
            return Ok(());
        };

        let mut url = self.endpoint("/session")?;
        url.query_pairs_mut().append_pair("delete", "true");

        let response = self
            .http
            .post(url)
            .headers(auth_headers(&token)?)
            .send()
            .await
            .map_err(|e| {
                DashboardError::connection(format!("Failed to close Snowflake session: {e}"))
            })?;

        let envelope: Envelope<serde_json::Value> =
            read_envelope(response).await.map_err(DashboardError::connection)?;
        if !envelope.success {
            return Err(DashboardError::connection(format!(
                "Failed to close Snowflake session: {}",
                envelope.failure()
            )));
        }

        debug!("Snowflake session closed");
        Ok(())
    }
}

/// Builds the account endpoint from the `account` credential.
///
/// Accepts a bare account identifier (`xy12345.eu-west-1`), a full host
/// name, or a URL.
pub fn account_url(account: &str) -> Result<Url> {
    let account = account.trim();
    let raw = if account.starts_with("http://") || account.starts_with("https://") {
        account.to_string()
    } else if account.contains("snowflakecomputing.com") {
        format!("https://{account}")
    } else {
        format!("https://{account}.snowflakecomputing.com")
    };

    Url::parse(&raw).map_err(|e| {
        DashboardError::connection(format!("Invalid Snowflake account '{account}': {e}"))
    })
}

/// Account name sent at login: the first label of the identifier, upper-cased.
fn account_name(account: &str) -> String {
    let host = account
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    host.split('.').next().unwrap_or(host).to_ascii_uppercase()
}

async fn login(http: &reqwest::Client, base_url: &Url, credentials: &Credentials) -> Result<String> {
    let mut url = base_url
        .join("/session/v1/login-request")
        .map_err(|e| DashboardError::connection(format!("Invalid Snowflake URL: {e}")))?;
    url.query_pairs_mut()
        .append_pair("request_id", &Uuid::new_v4().to_string())
        .append_pair("databaseName", &credentials.database)
        .append_pair("schemaName", &credentials.schema)
        .append_pair("warehouse", &credentials.warehouse);

    let body = json!({
        "data": {
            "CLIENT_APP_ID": CLIENT_APP_ID,
            "CLIENT_APP_VERSION": env!("CARGO_PKG_VERSION"),
            "ACCOUNT_NAME": account_name(&credentials.account),
            "LOGIN_NAME": credentials.user_login,
            "PASSWORD": credentials.password,
            "SESSION_PARAMETERS": {
                "QUERY_RESULT_FORMAT": "JSON",
            },
        }
    });

    debug!(user = %credentials.user_login, "Logging in to Snowflake");
    let response = http
        .post(url)
        .header(ACCEPT, "application/json")
        .json(&body)
        .send()
        .await
        .map_err(|e| {
            DashboardError::connection(format!(
                "Cannot reach Snowflake at {}: {e}",
                base_url.host_str().unwrap_or(base_url.as_str())
            ))
        })?;

    let envelope: Envelope<LoginData> =
        read_envelope(response).await.map_err(DashboardError::connection)?;
    let data = envelope.into_data().map_err(DashboardError::connection)?;
    data.token
        .ok_or_else(|| DashboardError::connection("Login response carried no session token"))
}

fn auth_headers(token: &str) -> Result<HeaderMap> {
    let authorization = HeaderValue::from_str(&format!("Snowflake Token=\"{token}\""))
        .map_err(|e| DashboardError::internal(format!("Invalid session token: {e}")))?;

    let mut headers = HeaderMap::with_capacity(2);
    headers.insert(ACCEPT, HeaderValue::from_static(SNOWFLAKE_ACCEPT));
    headers.insert(AUTHORIZATION, authorization);
    Ok(headers)
}

/// Headers for downloading a result chunk: the ones Snowflake handed out, or
/// the customer key for server-side encrypted storage.
fn chunk_request_headers(
    chunk_headers: Option<&HashMap<String, String>>,
    qrmk: Option<&str>,
) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    match (chunk_headers, qrmk) {
        (Some(given), _) => {
            for (name, value) in given {
                let name = HeaderName::from_bytes(name.as_bytes())
                    .map_err(|e| DashboardError::query(format!("Invalid chunk header: {e}")))?;
                let value = HeaderValue::from_str(value)
                    .map_err(|e| DashboardError::query(format!("Invalid chunk header: {e}")))?;
                headers.insert(name, value);
            }
        }
        (None, Some(key)) => {
            let key = HeaderValue::from_str(key)
                .map_err(|e| DashboardError::query(format!("Invalid chunk key: {e}")))?;
            headers.insert(
                "x-amz-server-side-encryption-customer-algorithm",
                HeaderValue::from_static("AES256"),
            );
            headers.insert("x-amz-server-side-encryption-customer-key", key);
        }
        (None, None) => {}
    }
    Ok(headers)
}

async fn read_envelope<T: DeserializeOwned>(
    response: reqwest::Response,
) -> std::result::Result<Envelope<T>, String> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| format!("Failed to read Snowflake response: {e}"))?;

    if !status.is_success() {
        let detail = serde_json::from_str::<Envelope<serde_json::Value>>(&body)
            .ok()
            .and_then(|envelope| envelope.message)
            .unwrap_or_else(|| body.trim().to_string());
        return Err(format!("Snowflake returned HTTP {status}: {detail}"));
    }

    serde_json::from_str(&body).map_err(|e| format!("Unexpected response from Snowflake: {e}"))
}

/// A result row as sent on the wire.
type RawRow = Vec<Option<String>>;

/// Chunk bodies are comma-separated row arrays without the enclosing brackets.
fn parse_chunk(body: &str) -> serde_json::Result<Vec<RawRow>> {
    serde_json::from_str(&format!("[{}]", body.trim()))
}

fn convert_row(rowtype: &[RowType], raw: RawRow) -> Row {
    raw.into_iter()
        .enumerate()
        .map(|(index, cell)| convert_cell(rowtype.get(index), cell))
        .collect()
}

/// Converts a cell from its JSON text form using the column's logical type.
fn convert_cell(column: Option<&RowType>, cell: Option<String>) -> Value {
    let Some(text) = cell else {
        return Value::Null;
    };
    let Some(column) = column else {
        return Value::String(text);
    };

    match column.type_name.to_ascii_lowercase().as_str() {
        "fixed" if column.scale.unwrap_or(0) == 0 => match text.parse::<i64>() {
            Ok(v) => Value::Int(v),
            Err(_) => Value::String(text),
        },
        "fixed" | "real" => match text.parse::<f64>() {
            Ok(v) => Value::Float(v),
            Err(_) => Value::String(text),
        },
        "boolean" => match text.as_str() {
            "1" | "true" | "TRUE" => Value::Bool(true),
            "0" | "false" | "FALSE" => Value::Bool(false),
            _ => Value::String(text),
        },
        _ => Value::String(text),
    }
}

/// Common response wrapper of the session API.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
    code: Option<String>,
    message: Option<String>,
    #[serde(default)]
    success: bool,
}

impl<T> Envelope<T> {
    fn in_progress(&self) -> bool {
        matches!(
            self.code.as_deref(),
            Some(QUERY_IN_PROGRESS) | Some(QUERY_IN_PROGRESS_ASYNC)
        )
    }

    fn failure(&self) -> String {
        let message = self.message.as_deref().unwrap_or("unknown error");
        match self.code.as_deref() {
            Some(code) => format!("{message} (code {code})"),
            None => message.to_string(),
        }
    }

    fn into_data(self) -> std::result::Result<T, String> {
        if !self.success {
            return Err(self.failure());
        }
        self.data
            .ok_or_else(|| "Snowflake response carried no data".to_string())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LoginData {
    token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct QueryData {
    rowtype: Vec<RowType>,
    rowset: Vec<RawRow>,
    chunks: Vec<Chunk>,
    chunk_headers: Option<HashMap<String, String>>,
    qrmk: Option<String>,
    query_result_format: Option<String>,
    get_result_url: Option<String>,
    query_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RowType {
    name: String,
    #[serde(rename = "type")]
    type_name: String,
    #[serde(default)]
    scale: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Chunk {
    url: String,
    #[serde(rename = "rowCount", default)]
    row_count: usize,
}
