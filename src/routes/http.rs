//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented and logs parameters and basic result info.

use std::sync::Arc;
use axum::{
  async_trait,
  extract::{rejection::JsonRejection, FromRequest, Path, Request, State},
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use tracing::{debug, info, instrument, warn};

use crate::domain::Role;
use crate::error::ApiError;
use crate::logic;
use crate::protocol::*;
use crate::state::AppState;

/// Map an error to `(status, {"error", "message"})`.
fn error_response(e: ApiError) -> Response {
  let status = e.status();
  if status.is_server_error() {
    warn!(target: "anamnesis_backend", %status, error = %e, "Request failed");
  }
  (status, Json(ErrorOut { error: e.kind().into(), message: e.to_string() })).into_response()
}

/// `Json<T>` whose rejections use the same `{error, message}` body as every
/// other failure, always with status 400.
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
  Json<T>: FromRequest<S, Rejection = JsonRejection>,
  S: Send + Sync,
{
  type Rejection = Response;

  async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
    match Json::<T>::from_request(req, state).await {
      Ok(Json(value)) => Ok(ApiJson(value)),
      Err(rejection) => {
        debug!(target: "anamnesis_backend", error = %rejection.body_text(), "Rejected request body");
        Err(error_response(ApiError::BadRequest(rejection.body_text())))
      }
    }
  }
}

fn respond<T: serde::Serialize>(r: Result<T, ApiError>) -> Response {
  match r {
    Ok(body) => Json(body).into_response(),
    Err(e) => error_response(e),
  }
}

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(HealthOut {
    ok: true,
    primary_model: state.generator.primary_model().to_string(),
    fallback_model: state.generator.fallback_model().to_string(),
  })
}

#[instrument(level = "info")]
pub async fn http_get_roles() -> impl IntoResponse {
  Json(RolesOut { roles: Role::ALL.to_vec() })
}

#[instrument(level = "info", skip(state, body), fields(mode = %body.mode.as_str(), roles = body.roles.len(), has_topic = body.course_topic.is_some()))]
pub async fn http_post_capsule(
  State(state): State<Arc<AppState>>,
  ApiJson(body): ApiJson<CapsuleIn>,
) -> Response {
  let r = logic::new_capsule(&state, body.mode, &body.roles, body.course_topic.as_deref()).await;
  if let Ok(out) = &r {
    info!(target: "capsule", id = %out.id, source = ?out.source, "HTTP capsule served");
  }
  respond(r)
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_capsule(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(SessionOut::from(logic::current_session(&state).await))
}

#[instrument(level = "info", skip(state, body), fields(%body.capsule_id, answers = body.answers.len()))]
pub async fn http_post_answers(
  State(state): State<Arc<AppState>>,
  ApiJson(body): ApiJson<AnswersIn>,
) -> Response {
  respond(logic::submit_answers(&state, &body.capsule_id, &body.answers).await)
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_courses(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(CoursesOut { courses: logic::list_courses(&state).await })
}

#[instrument(level = "info", skip(state, body), fields(name = %body.name))]
pub async fn http_post_course(
  State(state): State<Arc<AppState>>,
  ApiJson(body): ApiJson<CourseIn>,
) -> Response {
  match logic::add_course(&state, &body.name, body.ctype, body.status).await {
    Ok(course) => (StatusCode::CREATED, Json(course)).into_response(),
    Err(e) => error_response(e),
  }
}

#[instrument(level = "info", skip(state, body), fields(%course_id, name = %body.name))]
pub async fn http_post_topic(
  State(state): State<Arc<AppState>>,
  Path(course_id): Path<u32>,
  ApiJson(body): ApiJson<TopicIn>,
) -> Response {
  match logic::add_topic(&state, course_id, &body.name, &body.notes).await {
    Ok(topic) => (StatusCode::CREATED, Json(topic)).into_response(),
    Err(e) => error_response(e),
  }
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_quota(State(state): State<Arc<AppState>>) -> Response {
  respond::<QuotaOut>(logic::quota_status(&state))
}

#[instrument(level = "info", skip(state))]
pub async fn http_post_quota_reset(State(state): State<Arc<AppState>>) -> Response {
  let r = logic::reset_quota(&state).await;
  if r.is_ok() {
    info!(target: "capsule", "HTTP quota reset");
  }
  respond::<QuotaOut>(r)
}
