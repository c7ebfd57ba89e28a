use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;

use crate::db::HrDatabase;
use crate::tools::{ToolContext, ToolRegistry, ToolSet};

/// Shared state for the tool-execution service.
#[derive(Clone)]
pub struct ToolsState {
    db: HrDatabase,
    registry: Arc<ToolRegistry>,
    tools: Arc<ToolSet>,
}

impl ToolsState {
    pub fn new(db: HrDatabase) -> Self {
        Self {
            db,
            registry: Arc::new(ToolRegistry::with_default_tools()),
            tools: Arc::new(ToolSet::with_default_tools()),
        }
    }
}

pub fn router(state: ToolsState) -> Router {
    Router::new()
        .route("/mcp/tools", get(list_tools))
        .route("/mcp/execute", post(execute_tool))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: ToolsState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "tool server listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn list_tools(State(state): State<ToolsState>) -> Json<Value> {
    let tools: Vec<Value> = state
        .registry
        .specs()
        .iter()
        .map(|spec| {
            json!({
                "name": spec.name,
                "description": spec.description,
                "input_schema": spec.parameters,
                "output_schema": { "type": "object" },
            })
        })
        .collect();
    Json(Value::Array(tools))
}

#[derive(Deserialize)]
struct ExecuteRequest {
    tool_name: Option<String>,
    #[serde(default)]
    parameters: Value,
}

/// Run one tool and wrap its result in the execution envelope. Domain
/// failures come back as a 400 with `{"error": ...}` inside the envelope;
/// an unknown tool is a 404; anything unexpected is a 500.
async fn execute_tool(
    State(state): State<ToolsState>,
    Json(req): Json<ExecuteRequest>,
) -> (StatusCode, Json<Value>) {
    let Some(tool_name) = req.tool_name.filter(|n| !n.is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "tool_name is required" })),
        );
    };
    let Some(tool) = state.tools.get(&tool_name) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("Unknown tool: {}", tool_name) })),
        );
    };

    let params = if req.parameters.is_null() {
        json!({})
    } else {
        req.parameters
    };
    let ctx = ToolContext {
        pool: state.db.pool(),
    };
    match tool.run(ctx, &params).await {
        Ok(result) => {
            let status = if result.get("error").is_some() {
                StatusCode::BAD_REQUEST
            } else {
                StatusCode::OK
            };
            (
                status,
                Json(json!({ "tool_name": tool_name, "result": result })),
            )
        }
        Err(e) => {
            tracing::error!(tool = %tool_name, error = %e, "tool execution failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": format!("Server error: {}", e) })),
            )
        }
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy", "service": "tool-server" }))
}
