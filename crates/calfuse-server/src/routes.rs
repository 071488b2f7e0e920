//! HTTP routes.
//!
//! | route                   | handler                               |
//! |-------------------------|---------------------------------------|
//! | `GET /auth-url`         | [`Orchestrator::begin`]               |
//! | `GET /google-callback`  | [`Orchestrator::complete`] (Google)   |
//! | `GET /outlook-callback` | [`Orchestrator::complete`] (Outlook)  |
//! | `GET /callback`         | [`Orchestrator::complete`] (any)      |
//! | `GET /healthz`          | registered providers                  |
//!
//! A callback whose `state` expired is answered with `expired_request` for
//! one more request TTL after expiry. Past that the entry is purged and the
//! same `state` is reported as `csrf_mismatch`.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use calfuse_core::ProviderId;
use calfuse_protocol::{
    AuthUrlQuery, AuthUrlResponse, CallbackQuery, ErrorKind, ErrorResponse, EventsResponse,
    HealthResponse,
};
use tracing::debug;

use crate::orchestrator::{Orchestrator, OrchestratorError};

/// Builds the API router.
pub fn router(orchestrator: Orchestrator) -> Router {
    Router::new()
        .route("/auth-url", get(auth_url))
        .route("/google-callback", get(google_callback))
        .route("/outlook-callback", get(outlook_callback))
        .route("/callback", get(callback))
        .route("/healthz", get(healthz))
        .with_state(orchestrator)
}

/// Error returned by every handler, rendered as an [`ErrorResponse`].
#[derive(Debug)]
pub struct ApiError(ErrorResponse);

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        Self(err.to_response())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self(ErrorResponse::with_detail(
            ErrorKind::BadRequest,
            rejection.body_text(),
        ))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.error.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.0)).into_response()
    }
}

async fn auth_url(
    State(orchestrator): State<Orchestrator>,
    query: Result<Query<AuthUrlQuery>, QueryRejection>,
) -> Result<Json<AuthUrlResponse>, ApiError> {
    let Query(query) = query?;
    let scopes = query.scopes();
    let auth = orchestrator.begin(&query.provider, scopes.as_deref()).await?;
    Ok(Json(AuthUrlResponse {
        url: auth.url.to_string(),
    }))
}

async fn google_callback(
    State(orchestrator): State<Orchestrator>,
    query: Result<Query<CallbackQuery>, QueryRejection>,
) -> Result<Json<EventsResponse>, ApiError> {
    handle_callback(orchestrator, Some(ProviderId::Google), query).await
}

async fn outlook_callback(
    State(orchestrator): State<Orchestrator>,
    query: Result<Query<CallbackQuery>, QueryRejection>,
) -> Result<Json<EventsResponse>, ApiError> {
    handle_callback(orchestrator, Some(ProviderId::Outlook), query).await
}

async fn callback(
    State(orchestrator): State<Orchestrator>,
    query: Result<Query<CallbackQuery>, QueryRejection>,
) -> Result<Json<EventsResponse>, ApiError> {
    handle_callback(orchestrator, None, query).await
}

async fn handle_callback(
    orchestrator: Orchestrator,
    expected_provider: Option<ProviderId>,
    query: Result<Query<CallbackQuery>, QueryRejection>,
) -> Result<Json<EventsResponse>, ApiError> {
    let Query(query) = query?;
    let state = query
        .state
        .filter(|s| !s.is_empty())
        .ok_or(OrchestratorError::MissingParameter("state"))?;

    if let Some(error) = query.error {
        debug!(
            error = %error,
            description = query.error_description.as_deref().unwrap_or_default(),
            "provider returned an error on callback"
        );
        return Err(orchestrator
            .reject(expected_provider, &state, &error)
            .await
            .into());
    }

    let code = query.code.unwrap_or_default();
    let events = orchestrator
        .complete(expected_provider, &code, &state)
        .await?;
    Ok(Json(EventsResponse { events }))
}

async fn healthz(State(orchestrator): State<Orchestrator>) -> Json<HealthResponse> {
    Json(HealthResponse::ok(orchestrator.providers()))
}
