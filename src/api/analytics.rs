//! Analytics handlers.

use axum::{
    Json,
    extract::{Query, State, rejection::QueryRejection},
};
use chrono::Utc;
use tracing::{info, instrument, warn};

use super::AppState;
use crate::analytics::build_dashboard;
use crate::error::ApiError;
use crate::model::{ActivityEntry, DashboardData, Envelope, Paged, Pagination};
use crate::query::ActivityListQuery;

/// GET /analytics/dashboard - Summary counts, category and weekly charts,
/// latest contacts and recent activity.
#[instrument(skip(state))]
pub async fn get_dashboard(
    State(state): State<AppState>,
) -> Result<Json<Envelope<DashboardData>>, ApiError> {
    let dashboard = build_dashboard(&state.storage, Utc::now())
        .await
        .inspect_err(|e| warn!(error = %e, "Failed to build dashboard"))?;

    info!(
        total_contacts = dashboard.summary.total_contacts,
        total_groups = dashboard.summary.total_groups,
        "Dashboard computed"
    );

    Ok(Json(Envelope::data(dashboard)))
}

/// GET /analytics/activities - The audit log, newest first.
///
/// # Query Parameters
///
/// - `page` (default 1)
/// - `limit` (default 20, at most 100)
#[instrument(skip(state))]
pub async fn list_activities(
    State(state): State<AppState>,
    query: Result<Query<ActivityListQuery>, QueryRejection>,
) -> Result<Json<Paged<ActivityEntry>>, ApiError> {
    let Query(query) = query?;
    let page = query.parse()?;

    let (activities, total) = tokio::try_join!(
        state.storage.list_activities(page),
        state.storage.count_activities(),
    )?;

    Ok(Json(Paged {
        success: true,
        data: activities,
        pagination: Pagination::new(total, page.page, page.limit),
    }))
}
