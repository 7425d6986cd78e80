//! WebSocket upgrade + message loop. Each client message is parsed as JSON and
//! forwarded to core logic. We reply with a single JSON message per request.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tracing::{info, error, instrument, debug};

use crate::error::ApiError;
use crate::logic;
use crate::protocol::{ClientWsMessage, ServerWsMessage};
use crate::state::AppState;

#[instrument(level = "info", skip(ws, state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "anamnesis_backend", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "anamnesis_backend", "WebSocket connected");
  while let Some(Ok(msg)) = socket.recv().await {
    match msg {
      Message::Text(txt) => {
        let reply_msg = match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(incoming) => {
            debug!(target: "anamnesis_backend", "WS received: {:?}", &incoming);
            handle_client_ws(incoming, &state).await
          }
          Err(e) => ServerWsMessage::Error { error: "bad_request".into(), message: format!("Invalid JSON: {}", e) },
        };

        let out = serde_json::to_string(&reply_msg).unwrap_or_else(|e| {
          serde_json::json!({ "type": "error", "error": "internal", "message": format!("Serialization error: {}", e) }).to_string()
        });

        if let Err(e) = socket.send(Message::Text(out)).await {
          error!(target: "anamnesis_backend", error = %e, "WS send error");
          break;
        }
      }
      Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
      Message::Close(_) => break,
      _ => {}
    }
  }
  info!(target: "anamnesis_backend", "WebSocket disconnected");
}

fn ws_error(e: ApiError) -> ServerWsMessage {
  ServerWsMessage::Error { error: e.kind().into(), message: e.to_string() }
}

#[instrument(level = "info", skip(state))]
pub(crate) async fn handle_client_ws(msg: ClientWsMessage, state: &AppState) -> ServerWsMessage {
  match msg {
    ClientWsMessage::Ping => ServerWsMessage::Pong,

    ClientWsMessage::NewCapsule { mode, roles, course_topic } => {
      match logic::new_capsule(state, mode, &roles, course_topic.as_deref()).await {
        Ok(capsule) => {
          info!(target: "capsule", id = %capsule.id, source = ?capsule.source, "WS new_capsule served");
          ServerWsMessage::Capsule { capsule }
        }
        Err(e) => ws_error(e),
      }
    }

    ClientWsMessage::SubmitAnswers { capsule_id, answers } => {
      match logic::submit_answers(state, &capsule_id, &answers).await {
        Ok(evaluation) => ServerWsMessage::Evaluation { evaluation },
        Err(e) => ws_error(e),
      }
    }

    ClientWsMessage::AddCourse { name, ctype, status } => {
      match logic::add_course(state, &name, ctype, status).await {
        Ok(course) => ServerWsMessage::Course { course },
        Err(e) => ws_error(e),
      }
    }

    ClientWsMessage::AddTopic { course_id, name, notes } => {
      match logic::add_topic(state, course_id, &name, &notes).await {
        Ok(topic) => ServerWsMessage::Topic { topic },
        Err(e) => ws_error(e),
      }
    }

    ClientWsMessage::ListCourses => ServerWsMessage::Courses { courses: logic::list_courses(state).await },
  }
}
