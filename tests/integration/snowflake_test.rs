//! Snowflake REST client tests against an in-process stub of the session API.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use hiring_dashboard::config::{Credentials, WarehouseConfig};
use hiring_dashboard::dashboard::load_dashboard;
use hiring_dashboard::db::{
    QueryResult, SnowflakeClient, Value, WarehouseBackend, WarehouseClient,
};
use hiring_dashboard::error::DashboardError;
use hiring_dashboard::queries::{self, QueryId};
use hiring_dashboard::recruiting::{DepartmentHires, QuarterlyHires, RecruitingDataset};
use pretty_assertions::assert_eq;
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const TOKEN: &str = "stub-session-token";
const PASSWORD: &str = "correct-horse";
const CHUNK_KEY: &str = "stub-qrmk";

/// How the stub answers query requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Rows inline in the response.
    Inline,
    /// First row inline, the rest in a downloadable chunk.
    Chunked,
    /// Statement reported as running; the result comes from a poll.
    Polling,
    /// Statement fails to compile.
    Failing,
}

struct Stub {
    mode: Mode,
    base: String,
    dataset: RecruitingDataset,
    logins: AtomicUsize,
    deletes: AtomicUsize,
    polls: AtomicUsize,
    login_params: Mutex<HashMap<String, String>>,
    statements: Mutex<Vec<String>>,
    pending: Mutex<HashMap<String, String>>,
    chunks: Mutex<Vec<String>>,
}

type StubState = Arc<Stub>;

async fn spawn_stub(mode: Mode) -> StubState {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let stub = Arc::new(Stub {
        mode,
        base: format!("http://{addr}"),
        dataset: RecruitingDataset::demo(),
        logins: AtomicUsize::new(0),
        deletes: AtomicUsize::new(0),
        polls: AtomicUsize::new(0),
        login_params: Mutex::new(HashMap::new()),
        statements: Mutex::new(Vec::new()),
        pending: Mutex::new(HashMap::new()),
        chunks: Mutex::new(Vec::new()),
    });

    let app = Router::new()
        .route("/session/v1/login-request", post(login))
        .route("/queries/v1/query-request", post(query))
        .route("/queries/{id}/result", get(poll))
        .route("/chunks/{index}", get(chunk))
        .route("/session", post(delete_session))
        .with_state(stub.clone());

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    stub
}

fn credentials(stub: &Stub, password: &str) -> Credentials {
    credentials_for(&stub.base, password)
}

fn credentials_for(account: &str, password: &str) -> Credentials {
    Credentials {
        user_login: "analyst".to_string(),
        password: password.to_string(),
        account: account.to_string(),
        warehouse: "COMPUTE_WH".to_string(),
        database: "RECRUITING".to_string(),
        schema: "PUBLIC".to_string(),
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Snowflake Token=\"{TOKEN}\""))
}

fn failure(code: &str, message: &str) -> Json<JsonValue> {
    Json(json!({ "data": null, "code": code, "message": message, "success": false }))
}

async fn login(
    State(stub): State<StubState>,
    Query(params): Query<HashMap<String, String>>,
    Json(body): Json<JsonValue>,
) -> Json<JsonValue> {
    stub.logins.fetch_add(1, Ordering::SeqCst);
    *stub.login_params.lock().unwrap() = params;

    if body["data"]["PASSWORD"] != PASSWORD {
        return Json(json!({
            "data": { "nextAction": "RETRY_LOGIN" },
            "code": "390100",
            "message": "Incorrect username or password was specified.",
            "success": false
        }));
    }

    Json(json!({
        "data": { "token": TOKEN, "masterToken": "master" },
        "code": null,
        "message": null,
        "success": true
    }))
}

/// Converts a mock result to the wire form: text cells and a rowtype.
fn wire_result(result: &QueryResult) -> (JsonValue, Vec<JsonValue>) {
    let rowtype: Vec<JsonValue> = result
        .columns
        .iter()
        .map(|c| json!({ "name": c.name, "type": c.data_type, "scale": 0 }))
        .collect();
    let rows = result
        .rows
        .iter()
        .map(|row| {
            JsonValue::Array(
                row.iter()
                    .map(|cell| match cell {
                        Value::Null => JsonValue::Null,
                        other => JsonValue::String(other.to_display_string()),
                    })
                    .collect(),
            )
        })
        .collect();
    (JsonValue::Array(rowtype), rows)
}

fn evaluate(stub: &Stub, sql: &str) -> Option<QueryResult> {
    let definition = queries::find_by_sql(sql)?;
    Some(match definition.id {
        QueryId::QuarterlyHires => QuarterlyHires::to_result(&stub.dataset.quarterly_hiring_matrix()),
        QueryId::AboveAverageDepartments => {
            DepartmentHires::to_result(&stub.dataset.above_average_departments())
        }
    })
}

fn inline_response(rowtype: JsonValue, rows: Vec<JsonValue>) -> Json<JsonValue> {
    Json(json!({
        "data": {
            "rowtype": rowtype,
            "rowset": rows,
            "queryResultFormat": "json",
            "queryId": "01b0-stub"
        },
        "code": null,
        "message": null,
        "success": true
    }))
}

async fn query(
    State(stub): State<StubState>,
    headers: HeaderMap,
    Json(body): Json<JsonValue>,
) -> Json<JsonValue> {
    if !authorized(&headers) {
        return failure("390104", "Authentication token is invalid.");
    }

    let sql = body["sqlText"].as_str().unwrap_or_default().to_string();
    stub.statements.lock().unwrap().push(sql.clone());

    if stub.mode == Mode::Failing {
        return failure(
            "002003",
            "SQL compilation error: Object 'HIRED_EMPLOYEES' does not exist or not authorized.",
        );
    }

    let Some(result) = evaluate(&stub, &sql) else {
        return failure("001003", "SQL compilation error: unexpected statement");
    };
    let (rowtype, mut rows) = wire_result(&result);

    match stub.mode {
        Mode::Chunked if rows.len() > 1 => {
            let rest: Vec<String> = rows.split_off(1).iter().map(|r| r.to_string()).collect();
            let mut chunks = stub.chunks.lock().unwrap();
            chunks.push(rest.join(",\n"));
            let index = chunks.len() - 1;
            Json(json!({
                "data": {
                    "rowtype": rowtype,
                    "rowset": rows,
                    "chunks": [{ "url": format!("{}/chunks/{index}", stub.base), "rowCount": rest.len() }],
                    "qrmk": CHUNK_KEY,
                    "queryResultFormat": "json"
                },
                "code": null,
                "message": null,
                "success": true
            }))
        }
        Mode::Polling => {
            let id = format!("q{}", stub.statements.lock().unwrap().len());
            stub.pending.lock().unwrap().insert(id.clone(), sql);
            Json(json!({
                "data": { "getResultUrl": format!("/queries/{id}/result"), "queryId": id },
                "code": "333334",
                "message": "Asynchronous execution in progress.",
                "success": true
            }))
        }
        _ => inline_response(rowtype, rows),
    }
}

async fn poll(
    State(stub): State<StubState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Json<JsonValue> {
    if !authorized(&headers) {
        return failure("390104", "Authentication token is invalid.");
    }
    stub.polls.fetch_add(1, Ordering::SeqCst);

    let Some(sql) = stub.pending.lock().unwrap().get(&id).cloned() else {
        return failure("000605", "Query not found");
    };
    let Some(result) = evaluate(&stub, &sql) else {
        return failure("001003", "SQL compilation error: unexpected statement");
    };
    let (rowtype, rows) = wire_result(&result);
    inline_response(rowtype, rows)
}

async fn chunk(
    State(stub): State<StubState>,
    Path(index): Path<usize>,
    headers: HeaderMap,
) -> (axum::http::StatusCode, String) {
    let key = headers
        .get("x-amz-server-side-encryption-customer-key")
        .and_then(|v| v.to_str().ok());
    if key != Some(CHUNK_KEY) {
        return (axum::http::StatusCode::FORBIDDEN, String::new());
    }
    match stub.chunks.lock().unwrap().get(index) {
        Some(body) => (axum::http::StatusCode::OK, body.clone()),
        None => (axum::http::StatusCode::NOT_FOUND, String::new()),
    }
}

async fn delete_session(
    State(stub): State<StubState>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Json<JsonValue> {
    if !authorized(&headers) || params.get("delete").map(String::as_str) != Some("true") {
        return failure("390104", "Authentication token is invalid.");
    }
    stub.deletes.fetch_add(1, Ordering::SeqCst);
    Json(json!({ "data": null, "code": null, "message": null, "success": true }))
}

fn expected_matrix() -> Vec<QuarterlyHires> {
    RecruitingDataset::demo().quarterly_hiring_matrix()
}

#[tokio::test]
async fn test_login_sends_session_context() {
    let stub = spawn_stub(Mode::Inline).await;
    let client = SnowflakeClient::connect(&credentials(&stub, PASSWORD))
        .await
        .unwrap();

    assert_eq!(client.backend(), WarehouseBackend::Snowflake);
    let params = stub.login_params.lock().unwrap().clone();
    assert_eq!(params.get("warehouse").map(String::as_str), Some("COMPUTE_WH"));
    assert_eq!(params.get("databaseName").map(String::as_str), Some("RECRUITING"));
    assert_eq!(params.get("schemaName").map(String::as_str), Some("PUBLIC"));
    assert!(params.contains_key("request_id"));

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_bad_password_is_connection_error() {
    let stub = spawn_stub(Mode::Inline).await;
    let err = SnowflakeClient::connect(&credentials(&stub, "wrong"))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        DashboardError::connection("Incorrect username or password was specified. (code 390100)")
    );
}

#[tokio::test]
async fn test_unreachable_account_is_connection_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let creds = credentials_for(&format!("http://{addr}"), PASSWORD);
    let err = SnowflakeClient::connect(&creds).await.unwrap_err();
    assert!(matches!(err, DashboardError::Connection(_)));
}

#[tokio::test]
async fn test_inline_rows_are_typed() {
    let stub = spawn_stub(Mode::Inline).await;
    let client = SnowflakeClient::connect(&credentials(&stub, PASSWORD))
        .await
        .unwrap();

    let result = client
        .execute_query(queries::QUARTERLY_HIRES.sql)
        .await
        .unwrap();
    assert_eq!(result.columns[0].name, "DEPARTMENT");
    assert_eq!(result.columns[2].data_type, "fixed");
    assert!(matches!(result.rows[0][2], Value::Int(_)));
    assert_eq!(QuarterlyHires::from_result(&result).unwrap(), expected_matrix());

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_chunked_results_are_concatenated() {
    let stub = spawn_stub(Mode::Chunked).await;
    let client = SnowflakeClient::connect(&credentials(&stub, PASSWORD))
        .await
        .unwrap();

    let result = client
        .execute_query(queries::QUARTERLY_HIRES.sql)
        .await
        .unwrap();
    assert_eq!(result.row_count, expected_matrix().len());
    assert_eq!(QuarterlyHires::from_result(&result).unwrap(), expected_matrix());

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_running_statement_is_polled() {
    let stub = spawn_stub(Mode::Polling).await;
    let client = SnowflakeClient::connect(&credentials(&stub, PASSWORD))
        .await
        .unwrap();

    let result = client
        .execute_query(queries::ABOVE_AVERAGE_DEPARTMENTS.sql)
        .await
        .unwrap();
    assert_eq!(stub.polls.load(Ordering::SeqCst), 1);
    assert_eq!(
        DepartmentHires::from_result(&result).unwrap(),
        RecruitingDataset::demo().above_average_departments()
    );

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_compilation_error_is_query_error() {
    let stub = spawn_stub(Mode::Failing).await;
    let client = SnowflakeClient::connect(&credentials(&stub, PASSWORD))
        .await
        .unwrap();

    let err = client
        .execute_query(queries::QUARTERLY_HIRES.sql)
        .await
        .unwrap_err();
    assert!(matches!(err, DashboardError::Query(_)));
    assert!(err.message().contains("HIRED_EMPLOYEES"));
    assert!(err.message().contains("002003"));

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_close_is_idempotent_and_ends_session() {
    let stub = spawn_stub(Mode::Inline).await;
    let client = SnowflakeClient::connect(&credentials(&stub, PASSWORD))
        .await
        .unwrap();

    client.close().await.unwrap();
    client.close().await.unwrap();
    assert_eq!(stub.deletes.load(Ordering::SeqCst), 1);

    let err = client.execute_query("SELECT 1").await.unwrap_err();
    assert_eq!(err, DashboardError::query("Session is closed"));
}

#[tokio::test]
async fn test_full_run_through_config() {
    let stub = spawn_stub(Mode::Inline).await;
    let config = WarehouseConfig::new(WarehouseBackend::Snowflake, credentials(&stub, PASSWORD));

    let dashboard = load_dashboard(&config).await.unwrap();
    assert_eq!(dashboard.sections.len(), 2);
    assert_eq!(
        DepartmentHires::from_result(&dashboard.section("above_average_departments").unwrap().result)
            .unwrap(),
        RecruitingDataset::demo().above_average_departments()
    );

    assert_eq!(stub.logins.load(Ordering::SeqCst), 1);
    assert_eq!(stub.statements.lock().unwrap().len(), 2);
    assert_eq!(stub.deletes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failed_run_still_deletes_session() {
    let stub = spawn_stub(Mode::Failing).await;
    let config = WarehouseConfig::new(WarehouseBackend::Snowflake, credentials(&stub, PASSWORD));

    let result = load_dashboard(&config).await;
    assert!(matches!(result, Err(DashboardError::Query(_))));
    assert_eq!(stub.statements.lock().unwrap().len(), 1);
    assert_eq!(stub.deletes.load(Ordering::SeqCst), 1);
}
