//! Axum router wiring the endpoints in SPEC_FULL.md §6 to `TurnRunner`/`hil`.
//!
//! Every handler does request parsing and response shaping only; the actual
//! workflow behavior lives in `turn_runner`, `hil`, and `persistence`.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::api::auth::require_auth;
use crate::api::tenant;
use crate::catalog::DomainCatalog;
use crate::classify::{self, QnaSubtype};
use crate::config::KernelConfig;
use crate::error::{ApiError, KernelError};
use crate::hil;
use crate::persistence;
use crate::turn_runner::TurnRunner;
use crate::types::{InboundMessage, MessageExtras, TaskStatus, TurnResult};

#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<TurnRunner>,
    pub config: Arc<KernelConfig>,
}

struct ApiErrorResponse(StatusCode, ApiError);

impl IntoResponse for ApiErrorResponse {
    fn into_response(self) -> Response {
        (self.0, Json(self.1)).into_response()
    }
}

impl From<&KernelError> for ApiErrorResponse {
    fn from(err: &KernelError) -> Self {
        let status = match err {
            KernelError::LockTimeout(_) => StatusCode::SERVICE_UNAVAILABLE,
            KernelError::EventNotFound(_) | KernelError::HilNotFound(_) => StatusCode::NOT_FOUND,
            KernelError::Unauthorized => StatusCode::UNAUTHORIZED,
            _ => StatusCode::BAD_REQUEST,
        };
        ApiErrorResponse(status, ApiError::from(err))
    }
}

fn cors_layer(config: &KernelConfig) -> CorsLayer {
    if config.allowed_origins.is_empty() {
        CorsLayer::new()
    } else {
        let origins: Vec<axum::http::HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new().allow_origin(AllowOrigin::list(origins))
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);
    let config_for_auth = state.config.clone();

    Router::new()
        .route("/api/start-conversation", post(start_conversation))
        .route("/api/send-message", post(send_message))
        .route("/api/tasks/:task_id/approve", post(approve_task))
        .route("/api/tasks/:task_id/reject", post(reject_task))
        .route("/api/tasks/pending", get(pending_tasks))
        .route("/api/events/:event_id/pay-deposit", post(pay_deposit))
        .layer(middleware::from_fn_with_state(config_for_auth, require_auth))
        .route("/health", get(health))
        .route("/docs", get(docs))
        .route("/", get(docs))
        .route("/api/qna", post(qna))
        .layer(cors)
        .with_state(state)
}

fn resolved_team(state: &AppState, headers: &HeaderMap) -> Option<String> {
    tenant::resolve(&state.config, headers).team_id
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn docs() -> impl IntoResponse {
    Json(json!({
        "endpoints": [
            "POST /api/start-conversation",
            "POST /api/send-message",
            "POST /api/tasks/{task_id}/approve",
            "POST /api/tasks/{task_id}/reject",
            "GET /api/tasks/pending",
            "POST /api/events/{event_id}/pay-deposit",
            "POST /api/qna",
        ]
    }))
}

#[derive(Debug, Deserialize)]
struct QnaBody {
    question: String,
}

/// Allowlisted, read-only Q&A responder (SPEC_FULL.md §6, §4.8's
/// `qna_step_anchor` table). Never touches tenant state — this is a
/// standalone lookup against the domain catalog, not a turn.
async fn qna(State(state): State<AppState>, Json(body): Json<QnaBody>) -> Response {
    let subtype = classify::classify_qna_subtype(&body.question);
    let step_anchor = classify::qna_step_anchor(subtype);
    let answer = qna_answer(subtype, state.runner.catalog().as_ref());
    (
        StatusCode::OK,
        Json(json!({
            "answer": answer,
            "step_anchor": step_anchor.map(|s| format!("{s:?}")),
        })),
    )
        .into_response()
}

fn qna_answer(subtype: QnaSubtype, catalog: &dyn DomainCatalog) -> String {
    match subtype {
        QnaSubtype::RoomCapacity => {
            let mut rooms = catalog.rooms_for(1, &[]);
            rooms.sort_by_key(|r| r.capacity);
            if rooms.is_empty() {
                "I don't have room details on hand right now — a team member will follow up.".to_string()
            } else {
                let listing = rooms
                    .iter()
                    .map(|r| format!("{} (up to {})", r.name, r.capacity))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("Our rooms and capacities: {listing}.")
            }
        }
        QnaSubtype::Pricing => {
            let mut rooms = catalog.rooms_for(1, &[]);
            rooms.sort_by(|a, b| a.room_id.cmp(&b.room_id));
            if rooms.is_empty() {
                "Pricing depends on the room and date — a team member will follow up with a quote.".to_string()
            } else {
                let listing = rooms
                    .iter()
                    .map(|r| format!("{} from ${:.0}", r.name, r.base_rate))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("Base rates: {listing}. Final pricing depends on date and any add-ons.")
            }
        }
        QnaSubtype::DateAvailability => {
            "Availability depends on the date you have in mind — let me know the date and I'll check.".to_string()
        }
        QnaSubtype::SiteVisit => {
            "Happy to arrange a site visit — let me know a few dates/times that work for you.".to_string()
        }
        QnaSubtype::General => {
            "Happy to help — could you tell me a bit more about what you'd like to know?".to_string()
        }
    }
}

#[derive(Debug, Deserialize)]
struct StartConversationBody {
    email_body: String,
    from_email: String,
    from_name: Option<String>,
}

async fn start_conversation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<StartConversationBody>,
) -> Response {
    let team_id = resolved_team(&state, &headers);
    let message = InboundMessage {
        msg_id: None,
        from_email: body.from_email,
        from_name: body.from_name,
        subject: None,
        body: body.email_body,
        ts: None,
        thread_id: None,
        session_id: None,
        extras: MessageExtras::default(),
    };
    let result = state.runner.run_turn(team_id.as_deref(), message).await;
    turn_result_response(result)
}

async fn send_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(message): Json<InboundMessage>,
) -> Response {
    let team_id = resolved_team(&state, &headers);
    let result = state.runner.run_turn(team_id.as_deref(), message).await;
    turn_result_response(result)
}

fn turn_result_response(result: TurnResult) -> Response {
    (StatusCode::OK, Json(result)).into_response()
}

#[derive(Debug, Deserialize, Default)]
struct ApproveBody {
    manager_notes: Option<String>,
    edited_message: Option<String>,
}

async fn approve_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(task_id): Path<String>,
    body: Option<Json<ApproveBody>>,
) -> Response {
    let team_id = resolved_team(&state, &headers);
    let body = body.map(|Json(b)| b).unwrap_or_default();

    let (lock, mut db) = match persistence::load_locked(&state.config.state_dir, team_id.as_deref()) {
        Ok(v) => v,
        Err(e) => return ApiErrorResponse::from(&e).into_response(),
    };

    let effect = match hil::approve(&mut db, &task_id, body.manager_notes, body.edited_message) {
        Ok(effect) => effect,
        Err(e) => {
            drop(lock);
            return ApiErrorResponse::from(&e).into_response();
        }
    };

    if let Err(e) = persistence::save(&state.config.state_dir, team_id.as_deref(), &db, state.config.debug) {
        log::error!("failed to persist state after HIL approve: {e}");
    }
    drop(lock);

    let draft = match effect {
        hil::ApprovalEffect::EmitDraft(d) => d,
        hil::ApprovalEffect::OfferAccepted(d) => d,
    };
    (StatusCode::OK, Json(draft)).into_response()
}

#[derive(Debug, Deserialize, Default)]
struct RejectBody {
    manager_notes: Option<String>,
}

async fn reject_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(task_id): Path<String>,
    body: Option<Json<RejectBody>>,
) -> Response {
    let team_id = resolved_team(&state, &headers);
    let body = body.map(|Json(b)| b).unwrap_or_default();

    let (lock, mut db) = match persistence::load_locked(&state.config.state_dir, team_id.as_deref()) {
        Ok(v) => v,
        Err(e) => return ApiErrorResponse::from(&e).into_response(),
    };

    let draft = match hil::reject(&mut db, &task_id, body.manager_notes) {
        Ok(draft) => draft,
        Err(e) => {
            drop(lock);
            return ApiErrorResponse::from(&e).into_response();
        }
    };

    if let Err(e) = persistence::save(&state.config.state_dir, team_id.as_deref(), &db, state.config.debug) {
        log::error!("failed to persist state after HIL reject: {e}");
    }
    drop(lock);

    (StatusCode::OK, Json(draft)).into_response()
}

async fn pending_tasks(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let team_id = resolved_team(&state, &headers);
    let (lock, db) = match persistence::load_locked(&state.config.state_dir, team_id.as_deref()) {
        Ok(v) => v,
        Err(e) => return ApiErrorResponse::from(&e).into_response(),
    };
    let pending: Vec<_> = db.tasks.iter().filter(|t| t.status == TaskStatus::Pending).cloned().collect();
    drop(lock);
    (StatusCode::OK, Json(pending)).into_response()
}

async fn pay_deposit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(event_id): Path<String>,
) -> Response {
    let team_id = resolved_team(&state, &headers);

    let client_email = {
        let (lock, db) = match persistence::load_locked(&state.config.state_dir, team_id.as_deref()) {
            Ok(v) => v,
            Err(e) => return ApiErrorResponse::from(&e).into_response(),
        };
        let email = db.find_event(&event_id).map(|e| e.client_email.clone());
        drop(lock);
        match email {
            Some(email) => email,
            None => return ApiErrorResponse::from(&KernelError::EventNotFound(event_id)).into_response(),
        }
    };

    let message = InboundMessage {
        msg_id: None,
        from_email: client_email,
        from_name: None,
        subject: None,
        body: "I have paid the deposit.".to_string(),
        ts: None,
        thread_id: None,
        session_id: None,
        extras: MessageExtras {
            event_id: Some(event_id),
            deposit_just_paid: true,
            ..Default::default()
        },
    };
    let result = state.runner.run_turn(team_id.as_deref(), message).await;
    turn_result_response(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use crate::classify::NullLlmAdapter;

    fn test_config(dir: &std::path::Path) -> KernelConfig {
        KernelConfig {
            env: "test".to_string(),
            auth_enabled: false,
            auth_mode: crate::config::AuthMode::Bearer,
            api_key: None,
            tenant_header_enabled: false,
            allowed_origins: Vec::new(),
            debug: false,
            state_dir: dir.to_path_buf(),
            default_team_id: "acme".to_string(),
        }
    }

    fn test_state(dir: &std::path::Path) -> AppState {
        let config = Arc::new(test_config(dir));
        let runner = Arc::new(TurnRunner::new(
            (*config).clone(),
            Arc::new(InMemoryCatalog::new(vec![], vec![])) as Arc<dyn DomainCatalog>,
            Arc::new(NullLlmAdapter),
        ));
        AppState { runner, config }
    }

    #[tokio::test]
    async fn test_health_reports_ok() {
        let response = health().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_pay_deposit_on_missing_event_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let response = pay_deposit(State(state), HeaderMap::new(), Path("missing".to_string())).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_pending_tasks_empty_for_fresh_tenant() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let response = pending_tasks(State(state), HeaderMap::new()).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_qna_answers_without_touching_tenant_state() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let body = QnaBody { question: "How much does a room cost?".to_string() };
        let response = qna(State(state), Json(body)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
