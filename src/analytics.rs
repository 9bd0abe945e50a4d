//! Dashboard analytics.
//!
//! The dashboard is assembled from independent read-only queries that run
//! concurrently. Any failing query fails the whole dashboard; partial
//! results are never returned.

use chrono::{DateTime, Duration, Utc};

use crate::model::{ContactStatus, DashboardData, DashboardSummary};
use crate::query::ContactFilter;
use crate::storage::Storage;

/// Number of days covered by the weekly creation chart.
const WEEKLY_WINDOW_DAYS: i64 = 7;

/// Number of contacts and activities shown in the "latest" lists.
const LATEST_COUNT: u32 = 5;

/// Compute headline counts across contacts and groups.
pub async fn compute_summary(storage: &Storage) -> anyhow::Result<DashboardSummary> {
    let all = ContactFilter::default();
    let active = ContactFilter::with_status(ContactStatus::Active.as_str());
    let starred = ContactFilter::with_starred(true);

    let (total_contacts, active_contacts, starred_contacts, total_groups) = tokio::try_join!(
        storage.count_contacts(&all),
        storage.count_contacts(&active),
        storage.count_contacts(&starred),
        storage.count_groups(),
    )?;

    Ok(DashboardSummary {
        total_contacts,
        active_contacts,
        starred_contacts,
        total_groups,
    })
}

/// Build the full dashboard as of `now`.
///
/// # Arguments
///
/// * `storage` - Database connection
/// * `now` - Reference timestamp; the weekly chart covers the seven days before it
pub async fn build_dashboard(storage: &Storage, now: DateTime<Utc>) -> anyhow::Result<DashboardData> {
    let since = now - Duration::days(WEEKLY_WINDOW_DAYS);

    let (summary, category_stats, weekly_stats, latest_contacts, recent_activities) = tokio::try_join!(
        compute_summary(storage),
        storage.category_stats(),
        storage.daily_creations_since(since),
        storage.latest_contacts(LATEST_COUNT),
        storage.recent_activities(LATEST_COUNT),
    )?;

    Ok(DashboardData {
        summary,
        category_stats,
        weekly_stats,
        latest_contacts,
        recent_activities,
    })
}
