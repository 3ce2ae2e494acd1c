use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use clap::Parser;
use pal_core::{
    sentiment::{classify, reply},
    ConversationEntry, TaskDraft,
};
use pal_storage::{StorageError, Store};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const FRONTEND_HTML: &str = include_str!("../assets/index.html");

#[derive(Clone, Debug)]
struct Config {
    addr: String,
    data_file: String,
    sweep_interval: Duration,
    debug: bool,
}

#[derive(Parser, Debug)]
#[command(name = "pal-server")]
struct Args {
    #[arg(long, default_value = "")]
    addr: String,
    #[arg(long, default_value = "")]
    data_file: String,
    #[arg(long, default_value_t = 60)]
    sweep_interval: u64,
    #[arg(long, default_value_t = false)]
    debug: bool,
}

struct AppState {
    store: Store,
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    message: Option<String>,
}

#[tokio::main]
async fn main() {
    let config = load_config();
    init_logging(&config);

    let addr: SocketAddr = match config.addr.parse() {
        Ok(value) => value,
        Err(err) => {
            error!(event = "invalid_addr", error = %err, addr = %config.addr);
            return;
        }
    };

    let store = match Store::open(&config.data_file) {
        Ok(value) => value,
        Err(err) => {
            error!(event = "store_open_failed", error = %err, path = %config.data_file);
            return;
        }
    };
    let state = Arc::new(AppState { store });

    start_sweeper(state.clone(), config.sweep_interval);

    let app = router(state);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(value) => value,
        Err(err) => {
            error!(event = "bind_failed", error = %err, addr = %config.addr);
            return;
        }
    };

    info!(event = "server_start", addr = %config.addr, data_file = %config.data_file);

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        info!(event = "server_shutdown");
    };

    if let Err(err) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
        error!(event = "server_error", error = %err);
    }
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(frontend))
        .route("/health", get(|| async { "ok" }))
        .route("/api/chat", axum::routing::post(chat))
        .route(
            "/api/tasks",
            get(list_tasks)
                .post(create_task)
                .put(update_task)
                .delete(delete_task),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn frontend() -> Html<&'static str> {
    Html(FRONTEND_HTML)
}

async fn chat(State(state): State<Arc<AppState>>, Json(body): Json<ChatRequest>) -> Response {
    let message = body.message.unwrap_or_default().trim().to_string();
    if message.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Empty message");
    }

    let (sentiment, polarity) = classify(&message);
    let response_text = reply(sentiment);

    let entry = ConversationEntry {
        timestamp: Utc::now().to_rfc3339(),
        user: message,
        bot: response_text.to_string(),
        sentiment,
        polarity,
    };
    if let Err(err) = state.store.append_exchange(entry) {
        return storage_error_response(err);
    }

    Json(json!({
        "response": response_text,
        "sentiment": sentiment,
        "polarity": polarity,
    }))
    .into_response()
}

async fn list_tasks(State(state): State<Arc<AppState>>) -> Response {
    Json(state.store.tasks()).into_response()
}

async fn create_task(State(state): State<Arc<AppState>>, Json(draft): Json<TaskDraft>) -> Response {
    match state.store.create_task(draft) {
        Ok(task) => Json(task).into_response(),
        Err(err) => storage_error_response(err),
    }
}

async fn update_task(
    State(state): State<Arc<AppState>>,
    Json(patch): Json<Map<String, Value>>,
) -> Response {
    let Some(id) = patch.get("id").and_then(Value::as_u64) else {
        return error_response(StatusCode::BAD_REQUEST, "Task id is required");
    };
    match state.store.update_task(id, patch) {
        Ok(task) => Json(task).into_response(),
        Err(err) => storage_error_response(err),
    }
}

async fn delete_task(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Map<String, Value>>,
) -> Response {
    let Some(id) = body.get("id").and_then(Value::as_u64) else {
        return error_response(StatusCode::BAD_REQUEST, "Task id is required");
    };
    match state.store.delete_task(id) {
        Ok(()) => Json(json!({"success": true})).into_response(),
        Err(err) => storage_error_response(err),
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({"error": message}))).into_response()
}

fn storage_error_response(err: StorageError) -> Response {
    match err {
        StorageError::EmptyTitle => {
            error_response(StatusCode::BAD_REQUEST, "Task title is required")
        }
        StorageError::TaskNotFound { .. } => {
            error_response(StatusCode::NOT_FOUND, "Task not found")
        }
        other => {
            error!(event = "storage_error", error = %other);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Storage failure")
        }
    }
}

/// The reminder sweeper: wake on a fixed interval, mark every due
/// reminder once, and persist. The loop never terminates; a tick that
/// trips over a malformed reminder is logged and abandoned until the
/// next wakeup.
fn start_sweeper(state: Arc<AppState>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match state.store.sweep_reminders(Utc::now()) {
                Ok(due) => {
                    for title in due {
                        info!(event = "reminder_due", title = %title);
                    }
                }
                Err(err) => {
                    warn!(event = "sweep_failed", error = %err);
                }
            }
        }
    });
}

fn load_config() -> Config {
    let args = Args::parse();
    Config {
        addr: resolve_addr(&args.addr),
        data_file: resolve_data_file(&args.data_file),
        sweep_interval: Duration::from_secs(args.sweep_interval),
        debug: args.debug || env_true("PAL_DEBUG"),
    }
}

fn init_logging(config: &Config) {
    let level = if config.debug {
        "debug".to_string()
    } else if let Ok(level) = std::env::var("PAL_LOG_LEVEL") {
        level
    } else {
        "info".to_string()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn resolve_addr(addr_flag: &str) -> String {
    if !addr_flag.trim().is_empty() {
        return addr_flag.to_string();
    }
    if let Ok(value) = std::env::var("PAL_ADDR") {
        if !value.trim().is_empty() {
            return value;
        }
    }
    "127.0.0.1:5000".to_string()
}

fn resolve_data_file(data_file_flag: &str) -> String {
    if !data_file_flag.trim().is_empty() {
        return data_file_flag.to_string();
    }
    if let Ok(value) = std::env::var("PAL_DATA_FILE") {
        if !value.trim().is_empty() {
            return value;
        }
    }
    "user_data.json".to_string()
}

fn env_true(key: &str) -> bool {
    match std::env::var(key) {
        Ok(value) => matches!(
            value.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use tempfile::TempDir;

    fn test_state(dir: &TempDir) -> Arc<AppState> {
        let store = Store::open(dir.path().join("state.json")).expect("open store");
        Arc::new(AppState { store })
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        serde_json::from_slice(&bytes).expect("parse body")
    }

    #[tokio::test]
    async fn chat_classifies_and_logs_the_exchange() {
        let dir = TempDir::new().expect("tempdir");
        let state = test_state(&dir);

        let response = chat(
            State(state.clone()),
            Json(ChatRequest {
                message: Some("I love this!".to_string()),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["sentiment"], json!("positive"));
        assert_eq!(
            body["response"],
            json!("That's wonderful to hear! Keep up the great vibes.")
        );
        assert!(body["polarity"].as_f64().expect("polarity") > 0.2);

        let doc = state.store.document();
        assert_eq!(doc.conversation.len(), 1);
        assert_eq!(doc.conversation[0].user, "I love this!");
    }

    #[tokio::test]
    async fn chat_rejects_an_empty_message() {
        let dir = TempDir::new().expect("tempdir");
        let state = test_state(&dir);

        for message in [None, Some("".to_string()), Some("   ".to_string())] {
            let response = chat(State(state.clone()), Json(ChatRequest { message })).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }
        assert!(state.store.document().conversation.is_empty());
    }

    #[tokio::test]
    async fn create_without_title_is_a_client_error() {
        let dir = TempDir::new().expect("tempdir");
        let state = test_state(&dir);

        let response = create_task(State(state.clone()), Json(TaskDraft::default())).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(state.store.tasks().is_empty());
    }

    #[tokio::test]
    async fn create_then_list_returns_the_task() {
        let dir = TempDir::new().expect("tempdir");
        let state = test_state(&dir);

        let draft = TaskDraft {
            title: "buy stamps".to_string(),
            ..TaskDraft::default()
        };
        let response = create_task(State(state.clone()), Json(draft)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let created = body_json(response).await;
        assert_eq!(created["id"], json!(1));
        assert_eq!(created["done"], json!(false));

        let response = list_tasks(State(state)).await;
        let listed = body_json(response).await;
        assert_eq!(listed.as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn update_requires_an_id_and_a_known_task() {
        let dir = TempDir::new().expect("tempdir");
        let state = test_state(&dir);

        let response = update_task(State(state.clone()), Json(Map::new())).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let mut patch = Map::new();
        patch.insert("id".to_string(), json!(999));
        let response = update_task(State(state), Json(patch)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_acknowledges_and_then_404s() {
        let dir = TempDir::new().expect("tempdir");
        let state = test_state(&dir);
        let draft = TaskDraft {
            title: "one and only".to_string(),
            ..TaskDraft::default()
        };
        create_task(State(state.clone()), Json(draft)).await;

        let mut body = Map::new();
        body.insert("id".to_string(), json!(1));
        let response = delete_task(State(state.clone()), Json(body.clone())).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"success": true}));
        assert!(state.store.tasks().is_empty());

        let response = delete_task(State(state), Json(body)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
