use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::attachment::Attachment;
use crate::dispatch::Dispatcher;
use crate::history::ConversationStore;
use crate::models::{
  AgentMode, ConversationResponse, Message, ModeInfo, ModesResponse, RespondRequest, RespondResponse,
};

pub struct ServerState {
  pub started_at: Instant,
  pub dispatcher: Dispatcher,
  pub conversations: ConversationStore,
}

impl ServerState {
  pub fn new(dispatcher: Dispatcher) -> Self {
    Self {
      started_at: Instant::now(),
      dispatcher,
      conversations: ConversationStore::new(),
    }
  }
}

pub fn app(state: ServerState) -> Router {
  Router::new()
    .route("/health", get(health))
    .route("/v1/modes", get(modes))
    .route("/v1/respond", post(respond))
    .route(
      "/v1/conversations/:id",
      get(conversation).delete(clear_conversation),
    )
    .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
    .with_state(Arc::new(state))
}

pub async fn run_server(listener: tokio::net::TcpListener, state: ServerState) -> anyhow::Result<()> {
  info!(addr = %listener.local_addr()?, "listening");
  axum::serve(listener, app(state)).await?;
  Ok(())
}

async fn health(State(state): State<Arc<ServerState>>) -> Json<serde_json::Value> {
  let uptime = state.started_at.elapsed().as_millis();
  Json(serde_json::json!({
    "status": "ok",
    "version": env!("CARGO_PKG_VERSION"),
    "uptime_ms": uptime
  }))
}

async fn modes() -> Json<ModesResponse> {
  Json(ModesResponse {
    default: AgentMode::Orchestrator,
    modes: AgentMode::ALL
      .into_iter()
      .map(|mode| ModeInfo {
        mode,
        label: mode.label().to_string(),
        description: mode.description().to_string(),
      })
      .collect(),
  })
}

async fn respond(
  State(state): State<Arc<ServerState>>,
  req: Result<Json<RespondRequest>, JsonRejection>,
) -> Response {
  let req = match req {
    Ok(Json(req)) => req,
    Err(rejection) => {
      return error_response(StatusCode::BAD_REQUEST, "request_invalid", &rejection.body_text())
    }
  };
  let attachment = match req.attachment.as_deref().map(Attachment::parse).transpose() {
    Ok(a) => a,
    Err(err) => return error_response(StatusCode::BAD_REQUEST, "attachment_invalid", &err.to_string()),
  };
  if req.prompt.trim().is_empty() && attachment.is_none() {
    return error_response(StatusCode::BAD_REQUEST, "prompt_missing", "Prompt is empty.");
  }

  let mode = req.mode.unwrap_or(AgentMode::Orchestrator);
  let user = Message::user(&req.prompt, attachment.as_ref());
  let (conversation_id, conversation) = state.conversations.open(req.conversation_id).await;
  let mut history = conversation.lock().await;
  if history.is_empty() {
    info!(conversation = %conversation_id, "conversation started");
  }
  info!(conversation = %conversation_id, mode = %mode, turns = history.len(), "new turn");

  let reply = state
    .dispatcher
    .respond(&req.prompt, mode, history.messages(), attachment.as_ref())
    .await;
  history.push(user.clone());
  history.push(reply.clone());

  (
    StatusCode::OK,
    Json(RespondResponse {
      conversation_id,
      user,
      reply,
    }),
  )
    .into_response()
}

async fn conversation(State(state): State<Arc<ServerState>>, Path(id): Path<String>) -> Response {
  match state.conversations.get(&id).await {
    Some(conversation) => {
      let messages = conversation.lock().await.messages().to_vec();
      (
        StatusCode::OK,
        Json(ConversationResponse {
          conversation_id: id,
          messages,
        }),
      )
        .into_response()
    }
    None => error_response(StatusCode::NOT_FOUND, "conversation_missing", "Conversation not found."),
  }
}

async fn clear_conversation(State(state): State<Arc<ServerState>>, Path(id): Path<String>) -> Response {
  if state.conversations.clear(&id).await {
    info!(conversation = %id, "conversation cleared");
    StatusCode::NO_CONTENT.into_response()
  } else {
    error_response(StatusCode::NOT_FOUND, "conversation_missing", "Conversation not found.")
  }
}

fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
  let body = Json(serde_json::json!({ "error": message, "code": code }));
  (status, body).into_response()
}
