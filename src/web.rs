//! Read-only status endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use crate::profile::{EditField, FindPartnerStep, OnboardingStep, UserId, UserProfile};
use crate::session::SessionRouter;
use crate::store::Database;

/// Shared state for status routes.
#[derive(Clone)]
pub struct StatusRouteState {
    pub db: Arc<dyn Database>,
    /// Present when the bot runs with a session router.
    pub sessions: Option<Arc<SessionRouter>>,
}

/// Conversation cursors of one user.
#[derive(Debug, Serialize)]
struct SessionSnapshot {
    telegram_id: UserId,
    registered: bool,
    onboarding: OnboardingStep,
    editing: EditField,
    find_partner: FindPartnerStep,
    browse_cursor: usize,
    views_in_window: u32,
}

impl From<&UserProfile> for SessionSnapshot {
    fn from(profile: &UserProfile) -> Self {
        Self {
            telegram_id: profile.telegram_id,
            registered: profile.is_registered(),
            onboarding: profile.onboarding,
            editing: profile.editing,
            find_partner: profile.find_partner,
            browse_cursor: profile.browse_cursor,
            views_in_window: profile.views_in_window,
        }
    }
}

/// GET /health
async fn health(State(state): State<StatusRouteState>) -> impl IntoResponse {
    let mut body = serde_json::json!({ "status": "ok" });
    if let Some(sessions) = &state.sessions {
        body["active_sessions"] = sessions.active_sessions().into();
    }
    Json(body)
}

/// GET /api/users/{id}/session
///
/// 404 when the user has never contacted the bot.
async fn get_session(
    State(state): State<StatusRouteState>,
    Path(id): Path<UserId>,
) -> impl IntoResponse {
    match state.db.get_profile(id).await {
        Ok(Some(profile)) => Json(SessionSnapshot::from(&profile)).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "No such user" })),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(user_id = id, "Session lookup failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "Lookup failed" })),
            )
                .into_response()
        }
    }
}

/// Build the status routes.
pub fn status_routes(state: StatusRouteState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS]);

    Router::new()
        .route("/health", get(health))
        .route("/api/users/{id}/session", get(get_session))
        .with_state(state)
        .layer(cors)
}
