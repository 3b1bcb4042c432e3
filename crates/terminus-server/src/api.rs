//! HTTP API for terminus.
//!
//! JSON in, JSON out. Every handler resolves the caller's address with the
//! [`Caller`] extractor and hands it to the coordinator; domain rejections
//! come back as [`ApiError`] with the matching status code.

use crate::node::AppState;
use crate::ws::ws_feed_handler;
use axum::{
    extract::{ConnectInfo, FromRequestParts, State},
    http::{header, request::Parts, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use terminus_core::{ClientAddr, HandleStatus, ItemStatus, ReservationError};
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

type SharedState = Arc<AppState>;

/// Build the API router.
pub fn build_router(state: SharedState) -> Router {
    // CORS layer for browser access
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        // Catalog
        .route("/items", get(list_items))
        // Identity
        .route("/check-handle", post(check_handle))
        .route("/login", post(login))
        .route("/register", post(register))
        .route("/current-identity", get(current_identity))
        .route("/logout", post(logout))
        // Claims
        .route("/claim", post(claim))
        .route("/release", post(release))
        .route("/force-release", post(force_release))
        .route("/reset-all", post(reset_all))
        // Legacy paths from the first deployment
        .route("/api/stations", get(list_items))
        .route("/api/reserve", post(claim))
        .route("/api/unreserve", post(release))
        .route("/api/release", post(force_release))
        .route("/api/reset-all", post(reset_all))
        // WebSocket for live ownership changes
        .route("/ws", get(ws_feed_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// --- Errors ---

/// Error returned by API handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Reservation(#[from] ReservationError),

    /// The transport gave no peer address and no trusted header named one.
    #[error("caller address unavailable")]
    NoCallerAddress,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Reservation(e) => match e {
                ReservationError::Unauthenticated => StatusCode::UNAUTHORIZED,
                ReservationError::Forbidden => StatusCode::FORBIDDEN,
                ReservationError::UnknownHandle => StatusCode::NOT_FOUND,
                ReservationError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
                ReservationError::AlreadyClaimed { .. }
                | ReservationError::InvalidItem
                | ReservationError::NotClaimed
                | ReservationError::NoActiveClaim
                | ReservationError::HandleTaken
                | ReservationError::InvalidHandle(_) => StatusCode::BAD_REQUEST,
            },
            Self::NoCallerAddress => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({ "error": self.to_string() }));
        match self {
            Self::Reservation(ReservationError::RateLimited { retry_after }) => {
                let secs = retry_after.as_secs().max(1).to_string();
                (status, [(header::RETRY_AFTER, secs)], body).into_response()
            }
            _ => (status, body).into_response(),
        }
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// --- Caller resolution ---

/// Address of the client making the request.
///
/// With proxy trust enabled the first `X-Forwarded-For` entry wins, then
/// `X-Real-IP`; otherwise the TCP peer address is used as-is.
#[derive(Debug, Clone)]
pub struct Caller(pub ClientAddr);

impl FromRequestParts<SharedState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        if state.trust_proxy {
            if let Some(addr) = forwarded_addr(&parts.headers) {
                return Ok(Caller(addr));
            }
        }
        parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(peer)| Caller(ClientAddr::from(peer.ip())))
            .ok_or(ApiError::NoCallerAddress)
    }
}

fn forwarded_addr(headers: &HeaderMap) -> Option<ClientAddr> {
    let first_forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    first_forwarded.or_else(real_ip).map(ClientAddr::new)
}

// --- Health ---

async fn health() -> &'static str {
    "OK"
}

// --- Catalog ---

async fn list_items(
    State(state): State<SharedState>,
    Caller(caller): Caller,
) -> Json<Vec<ItemStatus>> {
    Json(state.coordinator.items(&caller).await)
}

// --- Identity ---

#[derive(Debug, Deserialize)]
struct HandleRequest {
    handle: String,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckHandleResponse {
    exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    needs_auth: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    has_item: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    item: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    available: Option<bool>,
}

async fn check_handle(
    State(state): State<SharedState>,
    Caller(caller): Caller,
    Json(req): Json<HandleRequest>,
) -> ApiResult<CheckHandleResponse> {
    let status = state.coordinator.check_handle(&req.handle, &caller).await?;
    Ok(Json(match status {
        HandleStatus::Unregistered => CheckHandleResponse {
            exists: false,
            available: Some(true),
            ..Default::default()
        },
        HandleStatus::Registered {
            owner_is_caller,
            current_station,
        } => CheckHandleResponse {
            exists: true,
            needs_auth: Some(!owner_is_caller),
            has_item: Some(current_station.is_some()),
            item: current_station.map(|s| s.to_string()),
            available: None,
        },
    }))
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    success: bool,
    handle: Option<String>,
    item: Option<String>,
}

async fn login(
    State(state): State<SharedState>,
    Caller(caller): Caller,
    Json(req): Json<HandleRequest>,
) -> ApiResult<LoginResponse> {
    let identity = state.coordinator.login(&req.handle, &caller).await?;
    Ok(Json(LoginResponse {
        success: true,
        handle: identity.handle,
        item: identity.claim.map(|s| s.to_string()),
    }))
}

#[derive(Debug, Serialize)]
struct RegisterResponse {
    success: bool,
    handle: Option<String>,
}

async fn register(
    State(state): State<SharedState>,
    Caller(caller): Caller,
    Json(req): Json<HandleRequest>,
) -> ApiResult<RegisterResponse> {
    let identity = state.coordinator.register(&req.handle, &caller).await?;
    Ok(Json(RegisterResponse {
        success: true,
        handle: identity.handle,
    }))
}

#[derive(Debug, Serialize)]
struct CurrentIdentityResponse {
    authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    handle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    item: Option<String>,
}

async fn current_identity(
    State(state): State<SharedState>,
    Caller(caller): Caller,
) -> Json<CurrentIdentityResponse> {
    let identity = state.coordinator.current_identity(&caller).await;
    Json(match identity {
        Some(identity) => CurrentIdentityResponse {
            authenticated: true,
            handle: identity.handle,
            item: identity.claim.map(|s| s.to_string()),
        },
        None => CurrentIdentityResponse {
            authenticated: false,
            handle: None,
            item: None,
        },
    })
}

async fn logout(
    State(state): State<SharedState>,
    Caller(caller): Caller,
) -> Json<serde_json::Value> {
    state.coordinator.logout(&caller).await;
    Json(json!({ "success": true }))
}

// --- Claims ---

#[derive(Debug, Deserialize)]
struct ClaimRequest {
    #[serde(alias = "station")]
    item: String,
}

#[derive(Debug, Serialize)]
struct ClaimResponse {
    success: bool,
    item: String,
}

async fn claim(
    State(state): State<SharedState>,
    Caller(caller): Caller,
    Json(req): Json<ClaimRequest>,
) -> ApiResult<ClaimResponse> {
    let item = state.coordinator.claim(&caller, &req.item).await?;
    Ok(Json(ClaimResponse {
        success: true,
        item,
    }))
}

async fn release(
    State(state): State<SharedState>,
    Caller(caller): Caller,
) -> ApiResult<ClaimResponse> {
    let item = state.coordinator.release(&caller).await?;
    Ok(Json(ClaimResponse {
        success: true,
        item,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ForceReleaseRequest {
    #[serde(alias = "station")]
    item: String,
    #[serde(default, alias = "adminKey")]
    admin_token: String,
}

async fn force_release(
    State(state): State<SharedState>,
    Json(req): Json<ForceReleaseRequest>,
) -> ApiResult<serde_json::Value> {
    state
        .coordinator
        .force_release(&req.item, &req.admin_token)
        .await?;
    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResetAllRequest {
    #[serde(default, alias = "adminKey")]
    admin_token: String,
}

async fn reset_all(
    State(state): State<SharedState>,
    Json(req): Json<ResetAllRequest>,
) -> ApiResult<serde_json::Value> {
    state.coordinator.reset_all(&req.admin_token).await?;
    Ok(Json(json!({ "success": true })))
}
