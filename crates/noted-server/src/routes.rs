//! HTTP routing and handlers

use std::sync::Arc;

use axum::extract::{Query, Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::get;
use axum::{Extension, Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use noted_core::sync::{SyncRequest, SyncResponse};

use crate::auth::{self, AuthenticatedUser, JwtVerifier};
use crate::config::AppConfig;
use crate::error::AppError;
use crate::reconcile;
use crate::store::AuthoritativeStore;

#[derive(Clone)]
pub struct AppState {
    pub verifier: Arc<JwtVerifier>,
    pub store: Arc<tokio::sync::Mutex<AuthoritativeStore>>,
}

impl AppState {
    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        let store = AuthoritativeStore::open(&config.database_path)?;
        Ok(Self {
            verifier: Arc::new(JwtVerifier::new(&config.jwt_secret)),
            store: Arc::new(tokio::sync::Mutex::new(store)),
        })
    }

    /// In-memory state for tests
    pub fn in_memory(jwt_secret: &str) -> Result<Self, AppError> {
        Ok(Self {
            verifier: Arc::new(JwtVerifier::new(jwt_secret)),
            store: Arc::new(tokio::sync::Mutex::new(
                AuthoritativeStore::open_in_memory()?,
            )),
        })
    }
}

pub fn app_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/sync", get(sync_pull).post(sync_push))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/healthz", get(healthz))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = auth::extract_bearer_token(request.headers())?;
    let user = state.verifier.verify_access_token(token)?;
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "time": Utc::now().to_rfc3339(),
    }))
}

#[derive(Debug, Deserialize)]
struct SyncQuery {
    since: Option<String>,
}

async fn sync_pull(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Query(query): Query<SyncQuery>,
) -> Result<Json<SyncResponse>, AppError> {
    let since = match query.since.as_deref() {
        None | Some("") => None,
        Some(raw) => Some(
            DateTime::parse_from_rfc3339(raw)
                .map_err(|_| AppError::bad_request("invalid 'since' timestamp format"))?
                .with_timezone(&Utc),
        ),
    };

    let store = state.store.lock().await;
    let response = reconcile::pull(&store, user.user_id, since)?;
    Ok(Json(response))
}

async fn sync_push(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(request): Json<SyncRequest>,
) -> Result<Json<SyncResponse>, AppError> {
    tracing::debug!(
        user = %user.user_id,
        records = request.record_count(),
        "Applying pushed batch"
    );
    let mut store = state.store.lock().await;
    let response = reconcile::push(&mut store, user.user_id, &request)?;
    Ok(Json(response))
}
