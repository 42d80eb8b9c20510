use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::db::executor::{run_select, ResultSet};
use crate::db::overview::{table_overview, TableOverview};
use crate::llm::models::GeneratedQuery;
use crate::llm::schema::{allowed_tables, compose_refinement, ORDERS_TABLE};
use crate::session::{HistoryEntry, Phase, SessionView};
use crate::sql::validate::ensure_read_only;
use crate::web::state::AppState;

// Request types

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
}

#[derive(Debug, Deserialize)]
pub struct RefineRequest {
    pub refinement: String,
}

// Response types

/// What a generation round produced. `Empty` is the generation-empty case:
/// the model replied but nothing usable came back, and the session is left
/// exactly as it was.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QueryOutcome {
    Ok {
        sql: String,
        table_label: String,
        result: ResultSet,
    },
    Empty {
        warning: String,
    },
}

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: String,
    pub uptime_seconds: i64,
    pub row_count: usize,
}

const EMPTY_SQL_WARNING: &str = "The model did not return any SQL";

// Shared generate -> gate -> execute pipeline. Ok(None) is the
// generation-empty outcome; every failure is mapped to a user-visible
// status here so the callers only decide what to do with the session.
async fn generate_and_execute(
    state: &Arc<AppState>,
    prompt: &str,
) -> Result<Option<(GeneratedQuery, ResultSet)>, (StatusCode, String)> {
    let generated = {
        let manager = state.llm_manager.lock().await;
        manager.generate(prompt).await.map_err(|e| {
            error!("Language model request failed: {}", e);
            (
                StatusCode::BAD_GATEWAY,
                format!("Language model request failed: {}", e),
            )
        })?
    };

    if generated.is_empty() {
        warn!("{}", EMPTY_SQL_WARNING);
        return Ok(None);
    }

    ensure_read_only(&generated.sql, allowed_tables()).map_err(|e| {
        error!("Rejected generated SQL: {}", e);
        (StatusCode::BAD_REQUEST, format!("Rejected generated SQL: {}", e))
    })?;

    info!("Executing generated SQL: {}", generated.sql);

    let pool = state.db_pool.clone();
    let sql = generated.sql.clone();
    let result = tokio::task::spawn_blocking(move || -> Result<ResultSet, String> {
        let conn = pool
            .get()
            .map_err(|e| format!("Database connection error: {}", e))?;
        run_select(&conn, &sql).map_err(|e| e.to_string())
    })
    .await
    .map_err(|e| {
        error!("Task join error: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Database task execution failed: {}", e),
        )
    })?
    .map_err(|e| {
        error!("Query execution failed: {}", e);
        (StatusCode::BAD_REQUEST, format!("Query execution failed: {}", e))
    })?;

    Ok(Some((generated, result)))
}

/// Initial run: free-text question in, generated SQL plus result out.
/// Refused while a question is already active; the refine path is how an
/// active result evolves.
pub async fn run_query(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AskRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let question = payload.question.trim().to_string();
    if question.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Question must not be empty".to_string()));
    }

    {
        let session = state.session.read().await;
        if session.has_active_question() {
            return Err((
                StatusCode::CONFLICT,
                "A query is already active - refine it or reset first".to_string(),
            ));
        }
    }

    info!("NL query: {}", question);

    let Some((generated, result)) = generate_and_execute(&state, &question).await? else {
        return Ok(Json(QueryOutcome::Empty {
            warning: EMPTY_SQL_WARNING.to_string(),
        }));
    };

    let mut session = state.session.write().await;
    session.begin_initial(
        question,
        generated.sql.clone(),
        generated.table_label.clone(),
        result.clone(),
    );

    Ok(Json(QueryOutcome::Ok {
        sql: generated.sql,
        table_label: generated.table_label,
        result,
    }))
}

/// Refinement submit. The follow-up text is folded into the original
/// question; a successful round replaces the displayed result and
/// overwrites the latest history entry.
pub async fn submit_refinement(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RefineRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let refinement = payload.refinement.trim().to_string();
    if refinement.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "Please describe your refinement".to_string(),
        ));
    }

    let original = {
        let session = state.session.read().await;
        if session.phase() != Phase::AwaitingRefinement {
            return Err((
                StatusCode::CONFLICT,
                "No refinement in progress - declare dissatisfaction first".to_string(),
            ));
        }
        session.question().to_string()
    };

    let prompt = compose_refinement(&original, &refinement);
    info!("Refinement prompt: {}", prompt);

    // Generation-empty or any failure leaves the session awaiting refinement
    let Some((generated, result)) = generate_and_execute(&state, &prompt).await? else {
        return Ok(Json(QueryOutcome::Empty {
            warning: EMPTY_SQL_WARNING.to_string(),
        }));
    };

    let mut session = state.session.write().await;
    session.apply_refinement(generated.sql.clone(), generated.table_label.clone(), result.clone());

    Ok(Json(QueryOutcome::Ok {
        sql: generated.sql,
        table_label: generated.table_label,
        result,
    }))
}

/// User declared dissatisfaction with the current result.
pub async fn open_refinement(
    State(state): State<Arc<AppState>>,
) -> Result<StatusCode, (StatusCode, String)> {
    let mut session = state.session.write().await;
    session
        .open_refinement()
        .map_err(|e| (StatusCode::CONFLICT, e.to_string()))?;

    Ok(StatusCode::OK)
}

/// Back to an empty console. History survives.
pub async fn reset_session(State(state): State<Arc<AppState>>) -> StatusCode {
    let mut session = state.session.write().await;
    session.reset();

    StatusCode::OK
}

pub async fn session_view(State(state): State<Arc<AppState>>) -> Json<SessionView> {
    let session = state.session.read().await;
    Json(session.view())
}

pub async fn history(State(state): State<Arc<AppState>>) -> Json<Vec<HistoryEntry>> {
    let session = state.session.read().await;
    Json(session.history().to_vec())
}

/// Schema and statistics for the overview tab.
pub async fn overview(
    State(state): State<Arc<AppState>>,
) -> Result<Json<TableOverview>, (StatusCode, String)> {
    let pool = state.db_pool.clone();
    let overview = tokio::task::spawn_blocking(move || -> Result<TableOverview, String> {
        let conn = pool
            .get()
            .map_err(|e| format!("Database connection error: {}", e))?;
        table_overview(&conn, ORDERS_TABLE).map_err(|e| e.to_string())
    })
    .await
    .map_err(|e| {
        error!("Task join error: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Database task execution failed: {}", e),
        )
    })?
    .map_err(|e| {
        error!("Failed to compute table overview: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, format!("Database error: {}", e))
    })?;

    Ok(Json(overview))
}

/// Current result as a CSV attachment.
pub async fn export_csv(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let result = {
        let session = state.session.read().await;
        session.result().cloned()
    };

    let result = result.ok_or((
        StatusCode::NOT_FOUND,
        "No query result to export".to_string(),
    ))?;

    let csv_bytes = result_to_csv(&result).map_err(|e| {
        error!("CSV encoding failed: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, format!("CSV encoding failed: {}", e))
    })?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/csv; charset=utf-8"),
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_static("attachment; filename=\"query_results.csv\""),
    );

    Ok((headers, csv_bytes))
}

fn result_to_csv(result: &ResultSet) -> Result<Vec<u8>, String> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    writer
        .write_record(&result.columns)
        .map_err(|e| e.to_string())?;

    for row in &result.rows {
        let rendered: Vec<String> = row.iter().map(render_cell).collect();
        writer.write_record(&rendered).map_err(|e| e.to_string())?;
    }

    writer.into_inner().map_err(|e| e.to_string())
}

fn render_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// System status
pub async fn system_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SystemStatus>, (StatusCode, String)> {
    let now = chrono::Utc::now();
    let uptime = now.signed_duration_since(state.startup_time).num_seconds();

    let pool = state.db_pool.clone();
    let row_count = tokio::task::spawn_blocking(move || -> Result<i64, String> {
        let conn = pool
            .get()
            .map_err(|e| format!("Database connection error: {}", e))?;
        let mut stmt = conn
            .prepare(&format!("SELECT COUNT(*) FROM \"{}\"", ORDERS_TABLE))
            .map_err(|e| e.to_string())?;
        stmt.query_row([], |row| row.get(0)).map_err(|e| e.to_string())
    })
    .await
    .map_err(|e| {
        error!("Task join error: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Database task execution failed: {}", e),
        )
    })?
    .map_err(|e| {
        error!("Failed to count rows: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, format!("Database error: {}", e))
    })?;

    Ok(Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime,
        row_count: row_count as usize,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::db::db_pool::DuckDbConnectionManager;
    use crate::db::seed::create_orders_fixture;
    use crate::llm::{ChatBackend, LlmError, LlmManager};
    use crate::web::routes::{api_routes, ui_routes};
    use async_trait::async_trait;
    use axum_test::TestServer;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedBackend {
        replies: Mutex<VecDeque<Result<String, LlmError>>>,
    }

    #[async_trait]
    impl ChatBackend for ScriptedBackend {
        async fn request_reply(&self, _question: &str) -> Result<String, LlmError> {
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(LlmError::ResponseError("script exhausted".to_string())))
        }
    }

    fn reply(sql: &str, label: &str) -> Result<String, LlmError> {
        Ok(json!({ "sql_query": sql, "table_name": label }).to_string())
    }

    fn test_server(replies: Vec<Result<String, LlmError>>) -> TestServer {
        // Leaked so the store outlives the server under test
        let dir = Box::leak(Box::new(tempfile::tempdir().unwrap()));
        let db_path = dir.path().join("orders.duckdb");
        let manager = DuckDbConnectionManager::new(db_path.to_string_lossy().to_string());
        let pool = r2d2::Pool::builder().max_size(2).build(manager).unwrap();
        {
            let conn = pool.get().unwrap();
            create_orders_fixture(&conn, 10, 3).unwrap();
        }

        let llm = LlmManager::from_backend(Box::new(ScriptedBackend {
            replies: Mutex::new(replies.into()),
        }));
        let state = Arc::new(AppState::new(AppConfig::default(), pool, llm));

        TestServer::new(ui_routes().merge(api_routes()).with_state(state)).unwrap()
    }

    const GERMANY_SQL: &str = "select * from \"orders\" where \"Country\" = 'Germany'";

    #[tokio::test]
    async fn initial_query_generates_executes_and_records() {
        let server = test_server(vec![reply(GERMANY_SQL, "German Orders")]);

        let response = server
            .post("/api/query")
            .json(&json!({ "question": "show all orders from Germany" }))
            .await;

        assert_eq!(response.status_code(), StatusCode::OK);
        let body: Value = response.json();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["table_label"], "German Orders");
        assert_eq!(body["result"]["rows"].as_array().unwrap().len(), 3);
        // The generator canonicalizes keyword case
        assert!(body["sql"].as_str().unwrap().starts_with("SELECT"));

        let history: Value = server.get("/api/history").await.json();
        assert_eq!(history.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn second_initial_query_is_refused_until_reset() {
        let server = test_server(vec![
            reply(GERMANY_SQL, "German Orders"),
            reply("select count(*) from \"orders\"", "Order Count"),
        ]);

        let first = server
            .post("/api/query")
            .json(&json!({ "question": "orders from Germany" }))
            .await;
        assert_eq!(first.status_code(), StatusCode::OK);

        let second = server
            .post("/api/query")
            .json(&json!({ "question": "count the orders" }))
            .await;
        assert_eq!(second.status_code(), StatusCode::CONFLICT);

        server.post("/api/reset").await;

        let third = server
            .post("/api/query")
            .json(&json!({ "question": "count the orders" }))
            .await;
        assert_eq!(third.status_code(), StatusCode::OK);
    }

    #[tokio::test]
    async fn refinement_narrows_the_result_and_coalesces_history() {
        let server = test_server(vec![
            reply(GERMANY_SQL, "German Orders"),
            reply(
                "select * from \"orders\" where \"Country\" = 'Germany' and \"Quantity\" > 10",
                "Large German Orders",
            ),
        ]);

        server
            .post("/api/query")
            .json(&json!({ "question": "orders from Germany" }))
            .await;
        let opened = server.post("/api/refine/open").await;
        assert_eq!(opened.status_code(), StatusCode::OK);

        let refined = server
            .post("/api/refine")
            .json(&json!({ "refinement": "only include orders above quantity 10" }))
            .await;
        assert_eq!(refined.status_code(), StatusCode::OK);
        let body: Value = refined.json();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["result"]["rows"].as_array().unwrap().len(), 1);

        let history: Value = server.get("/api/history").await.json();
        let entries = history.as_array().unwrap();
        assert_eq!(entries.len(), 1, "refinement overwrites the latest entry");
        assert_eq!(entries[0]["table_label"], "Large German Orders");
    }

    #[tokio::test]
    async fn empty_refinement_is_rejected_locally() {
        let server = test_server(vec![reply(GERMANY_SQL, "German Orders")]);

        server
            .post("/api/query")
            .json(&json!({ "question": "orders from Germany" }))
            .await;
        server.post("/api/refine/open").await;

        let response = server
            .post("/api/refine")
            .json(&json!({ "refinement": "   " }))
            .await;

        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

        // No generation was consumed; the session is still awaiting refinement
        let view: Value = server.get("/api/session").await.json();
        assert_eq!(view["phase"], "awaiting_refinement");
    }

    #[tokio::test]
    async fn refinement_without_opening_is_refused() {
        let server = test_server(vec![reply(GERMANY_SQL, "German Orders")]);

        server
            .post("/api/query")
            .json(&json!({ "question": "orders from Germany" }))
            .await;

        let response = server
            .post("/api/refine")
            .json(&json!({ "refinement": "only Germany" }))
            .await;

        assert_eq!(response.status_code(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn malformed_model_reply_degrades_to_a_warning() {
        let server = test_server(vec![
            Ok("Sure! The SQL you want is SELECT * FROM orders".to_string()),
            reply(GERMANY_SQL, "German Orders"),
        ]);

        let response = server
            .post("/api/query")
            .json(&json!({ "question": "orders from Germany" }))
            .await;

        assert_eq!(response.status_code(), StatusCode::OK);
        let body: Value = response.json();
        assert_eq!(body["status"], "empty");

        // Nothing was recorded and the question is free to retry
        let history: Value = server.get("/api/history").await.json();
        assert!(history.as_array().unwrap().is_empty());

        let retry = server
            .post("/api/query")
            .json(&json!({ "question": "orders from Germany" }))
            .await;
        assert_eq!(retry.status_code(), StatusCode::OK);
    }

    #[tokio::test]
    async fn transport_failure_surfaces_as_bad_gateway() {
        let server = test_server(vec![Err(LlmError::ConnectionError("boom".to_string()))]);

        let response = server
            .post("/api/query")
            .json(&json!({ "question": "orders from Germany" }))
            .await;

        assert_eq!(response.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn destructive_sql_never_reaches_the_store() {
        let server = test_server(vec![reply("DROP TABLE \"orders\"", "Oops")]);

        let response = server
            .post("/api/query")
            .json(&json!({ "question": "remove everything" }))
            .await;

        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

        // The table is still there
        let status: Value = server.get("/api/status").await.json();
        assert_eq!(status["row_count"], 10);
    }

    #[tokio::test]
    async fn reset_clears_the_console_but_keeps_history() {
        let server = test_server(vec![reply(GERMANY_SQL, "German Orders")]);

        server
            .post("/api/query")
            .json(&json!({ "question": "orders from Germany" }))
            .await;
        server.post("/api/reset").await;

        let view: Value = server.get("/api/session").await.json();
        assert_eq!(view["question"], "");
        assert_eq!(view["sql"], "");
        assert!(view["result"].is_null());
        assert_eq!(view["history_len"], 1);
    }

    #[tokio::test]
    async fn export_returns_the_current_result_as_csv() {
        let server = test_server(vec![reply(GERMANY_SQL, "German Orders")]);

        let missing = server.get("/api/export").await;
        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);

        server
            .post("/api/query")
            .json(&json!({ "question": "orders from Germany" }))
            .await;

        let response = server.get("/api/export").await;
        assert_eq!(response.status_code(), StatusCode::OK);
        let disposition = response.header(header::CONTENT_DISPOSITION);
        assert!(disposition.to_str().unwrap().contains("query_results.csv"));

        let body = response.text();
        let mut lines = body.lines();
        assert_eq!(
            lines.next().unwrap(),
            "InvoiceNo,StockCode,Description,Quantity,InvoiceDate,UnitPrice,CustomerID,Country"
        );
        assert_eq!(lines.count(), 3);
    }

    #[tokio::test]
    async fn overview_reports_schema_and_statistics() {
        let server = test_server(vec![]);

        let response = server.get("/api/overview").await;
        assert_eq!(response.status_code(), StatusCode::OK);

        let body: Value = response.json();
        assert_eq!(body["row_count"], 10);
        assert_eq!(body["columns"].as_array().unwrap().len(), 8);
        assert!(!body["histograms"].as_array().unwrap().is_empty());
    }
}
