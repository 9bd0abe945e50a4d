//! HTTP API.
//!
//! Every route lives under `/api` and answers with the JSON envelope
//! `{ success, data?, message? }`; failures render through
//! [`ApiError`](crate::error::ApiError).
//!
//! # Endpoints
//!
//! - `GET /api/contacts` - Filtered, sorted, paginated listing with facets
//! - `GET /api/contacts/filters/:facet` - Distinct categories, tags or statuses
//! - `GET /api/contacts/export/:format` - CSV or JSON download
//! - `POST /api/contacts/bulk/actions` - Set-wide delete, update, star, unstar, change-status
//! - `GET|PUT|DELETE /api/contacts/:id` - Single-contact operations
//! - `POST /api/contacts` - Create a contact
//! - `POST /api/contacts/:id/star` - Toggle the starred flag
//! - `POST|DELETE /api/contacts/:id/groups/:group_id` - Group membership
//! - `GET|POST /api/groups`, `PUT|DELETE /api/groups/:id` - Groups
//! - `GET /api/analytics/dashboard`, `GET /api/analytics/activities` - Analytics
//! - `GET /api/health` - Health check

pub mod analytics;
pub mod contacts;
pub mod groups;

use std::time::Instant;

use axum::{
    Json, Router,
    extract::State,
    http::{
        Method, StatusCode,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    middleware::map_response,
    response::IntoResponse,
    routing::{get, post, put},
};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::warn;

use crate::activity::ActivityLog;
use crate::config::Config;
use crate::error::expose_internal_errors;
use crate::model::HealthResponse;
use crate::storage::{Storage, current_timestamp};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub storage: Storage,
    pub activity: ActivityLog,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(storage: Storage, activity: ActivityLog) -> Self {
        Self {
            storage,
            activity,
            started_at: Instant::now(),
        }
    }
}

/// Build the application router with its middleware stack.
pub fn router(state: AppState, config: &Config) -> Router {
    let api = Router::new()
        .route(
            "/contacts",
            get(contacts::list_contacts).post(contacts::create_contact),
        )
        .route("/contacts/filters/:facet", get(contacts::get_facet))
        .route("/contacts/export/:format", get(contacts::export_contacts))
        .route("/contacts/bulk/actions", post(contacts::bulk_action))
        .route(
            "/contacts/:id",
            get(contacts::get_contact)
                .put(contacts::update_contact)
                .delete(contacts::delete_contact),
        )
        .route("/contacts/:id/star", post(contacts::toggle_star))
        .route(
            "/contacts/:id/groups/:group_id",
            post(contacts::attach_group).delete(contacts::detach_group),
        )
        .route("/groups", get(groups::list_groups).post(groups::create_group))
        .route(
            "/groups/:id",
            put(groups::update_group).delete(groups::delete_group),
        )
        .route("/analytics/dashboard", get(analytics::get_dashboard))
        .route("/analytics/activities", get(analytics::list_activities))
        .route("/health", get(health_check));

    let mut app = Router::new()
        .nest("/api", api)
        .fallback(route_not_found)
        .with_state(state);

    if !config.environment.is_production() {
        app = app.layer(map_response(expose_internal_errors));
    }

    let cors = CorsLayer::new()
        .allow_origin(config.client_origin.clone())
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION]);

    app.layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors),
    )
}

/// GET /health - Liveness plus database connectivity.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = match state.storage.ping().await {
        Ok(()) => "connected",
        Err(e) => {
            warn!(error = %e, "Health check could not reach the database");
            "disconnected"
        }
    };

    Json(HealthResponse {
        status: "healthy",
        timestamp: current_timestamp(),
        database,
        uptime: state.started_at.elapsed().as_secs_f64(),
    })
}

async fn route_not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "success": false, "error": "Route not found" })),
    )
}
