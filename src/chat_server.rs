use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use crate::error::ChatError;
use crate::orchestrator::SessionOrchestrator;
use crate::store::SessionStore;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<SessionOrchestrator>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/sessions", post(create_session).get(list_sessions))
        .route("/sessions/:id", get(get_session).delete(delete_session))
        .route("/sessions/:id/messages", post(send_message))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "chat API listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Periodically drop sessions that have been idle longer than `idle_secs`.
/// An `idle_secs` of zero disables eviction entirely.
pub fn spawn_idle_eviction(store: Arc<dyn SessionStore>, idle_secs: u64) {
    if idle_secs == 0 {
        return;
    }
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            let evicted = store
                .evict_idle(chrono::Duration::seconds(idle_secs as i64))
                .await;
            if evicted > 0 {
                tracing::info!(evicted, "idle session sweep");
            }
        }
    });
}

#[derive(Deserialize, Default)]
struct CreateSessionRequest {
    employee_id: Option<String>,
}

#[derive(Deserialize)]
struct SendMessageRequest {
    message: Option<String>,
}

async fn create_session(
    State(state): State<AppState>,
    body: Option<Json<CreateSessionRequest>>,
) -> Result<Json<Value>, ChatError> {
    let req = body.map(|Json(b)| b).unwrap_or_default();
    let created = state.orchestrator.create_session(req.employee_id).await?;
    Ok(Json(json!({
        "session_id": created.session_id,
        "message": created.message,
        "status": "success",
    })))
}

async fn send_message(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<Value>, ChatError> {
    let message = req
        .message
        .filter(|m| !m.trim().is_empty())
        .ok_or(ChatError::MissingField("message"))?;
    let responses = state.orchestrator.send_message(id, &message).await?;
    Ok(Json(json!({
        "session_id": id,
        "responses": responses,
        "status": "success",
    })))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ChatError> {
    let snapshot = state.orchestrator.session_snapshot(id).await?;
    Ok(Json(json!({
        "session_id": id,
        "messages": snapshot.messages,
        "last_activity": snapshot.last_activity,
        "preloaded_data": snapshot.preloaded_data,
        "status": "success",
    })))
}

async fn list_sessions(State(state): State<AppState>) -> Json<Value> {
    let sessions = state.orchestrator.list_sessions().await;
    Json(json!({
        "count": sessions.len(),
        "sessions": sessions,
        "status": "success",
    }))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ChatError> {
    state.orchestrator.delete_session(id).await?;
    Ok(Json(json!({
        "message": "Session deleted successfully",
        "status": "success",
    })))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy", "service": "chat-api" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatProvider, ModelTurn};
    use crate::orchestrator::test_doubles::{RecordingInvoker, ScriptedProvider};
    use crate::session::ToolCall;
    use crate::store::InMemorySessionStore;
    use crate::tools::ToolRegistry;

    async fn spawn_server(provider: Arc<dyn ChatProvider>) -> String {
        let orchestrator = Arc::new(SessionOrchestrator::new(
            Arc::new(InMemorySessionStore::new()),
            provider,
            Arc::new(RecordingInvoker::new()),
            ToolRegistry::with_default_tools(),
            8,
        ));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(AppState { orchestrator });
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn turn_text(text: &str) -> ModelTurn {
        ModelTurn {
            text: Some(text.into()),
            call: None,
        }
    }

    fn turn_call(name: &str, args: Value) -> ModelTurn {
        ModelTurn {
            text: None,
            call: Some(ToolCall {
                name: name.into(),
                args: args.as_object().cloned().unwrap_or_default(),
            }),
        }
    }

    #[tokio::test]
    async fn session_lifecycle_over_http() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            turn_text("Noted."),
            turn_call("get_employee_info", json!({"employee_id": "current_employee_id"})),
            turn_text("You are An Nguyen."),
        ]));
        let base = spawn_server(provider).await;
        let client = reqwest::Client::new();

        let created: Value = client
            .post(format!("{}/sessions", base))
            .json(&json!({"employee_id": "E-42"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(created["status"], "success");
        assert_eq!(
            created["message"],
            "Chat session created successfully with employee data"
        );
        let session_id = created["session_id"].as_str().unwrap().to_string();

        let reply: Value = client
            .post(format!("{}/sessions/{}/messages", base, session_id))
            .json(&json!({"message": "who am I?"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let responses = reply["responses"].as_array().unwrap();
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["type"], "tool_result");
        assert_eq!(responses[0]["tool_args"]["employee_id"], "E-42");
        assert_eq!(responses[1]["type"], "ai_message");
        assert_eq!(responses[1]["content"], "You are An Nguyen.");

        let info: Value = client
            .get(format!("{}/sessions/{}", base, session_id))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(info["preloaded_data"]["employee"], true);
        assert_eq!(info["messages"].as_array().unwrap().len(), 2);

        let listing: Value = client
            .get(format!("{}/sessions", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(listing["count"], 1);
        assert!(listing["sessions"][&session_id].is_object());

        let resp = client
            .delete(format!("{}/sessions/{}", base, session_id))
            .send()
            .await
            .unwrap();
        assert!(resp.status().is_success());
        let resp = client
            .get(format!("{}/sessions/{}", base, session_id))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);
    }

    #[tokio::test]
    async fn missing_message_is_rejected() {
        let base = spawn_server(Arc::new(ScriptedProvider::new(vec![]))).await;
        let client = reqwest::Client::new();

        let created: Value = client
            .post(format!("{}/sessions", base))
            .json(&json!({}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let session_id = created["session_id"].as_str().unwrap().to_string();

        let resp = client
            .post(format!("{}/sessions/{}/messages", base, session_id))
            .json(&json!({}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"], "message is required");

        let resp = client
            .post(format!("{}/sessions/{}/messages", base, session_id))
            .json(&json!({"message": "   "}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
    }

    #[tokio::test]
    async fn unknown_session_is_404() {
        let base = spawn_server(Arc::new(ScriptedProvider::new(vec![]))).await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{}/sessions/{}/messages", base, Uuid::new_v4()))
            .json(&json!({"message": "hello"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"], "Session not found. Create a new session first.");
    }

    #[tokio::test]
    async fn health_endpoint() {
        let base = spawn_server(Arc::new(ScriptedProvider::new(vec![]))).await;
        let body: Value = reqwest::get(format!("{}/health", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "healthy");
    }
}
