//! SQLite storage layer for the contact manager.
//!
//! Three tables back the three entity collections:
//!
//! - `contacts`: list- and map-valued fields (`tags`, `group_ids`,
//!   `custom_fields`) are JSON text and are queried with SQLite's JSON1
//!   functions
//! - `contact_groups`: group records with a maintained `contact_count`
//! - `activities`: the append-only audit log
//!
//! Timestamps are stored as integer milliseconds since the Unix epoch.
//! Operations that touch more than one entity (group count maintenance,
//! cascading detach) run inside a single transaction.

use std::collections::HashMap;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{DateTime, SubsecRound, Utc};
use sqlx::sqlite::{
    Sqlite, SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{QueryBuilder, Row};

use crate::model::{
    ActivityAction, ActivityEntry, Category, CategoryStat, Contact, ContactChanges, ContactPreview,
    ContactSource, ContactStatus, DailyCount, Facets, Group, GroupChanges,
};
use crate::query::{ContactFilter, ContactListParams, FacetKind, PageRequest, SortKey};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS contacts (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        email TEXT NOT NULL,
        phone TEXT NOT NULL,
        message TEXT NOT NULL DEFAULT '',
        category TEXT NOT NULL DEFAULT 'Personal'
            CHECK (category IN ('Personal', 'Business', 'Family', 'Friends', 'Work', 'Other')),
        tags TEXT NOT NULL DEFAULT '[]',
        group_ids TEXT NOT NULL DEFAULT '[]',
        status TEXT NOT NULL DEFAULT 'Active'
            CHECK (status IN ('Active', 'Inactive', 'Archived')),
        source TEXT NOT NULL DEFAULT 'Manual'
            CHECK (source IN ('Manual', 'Import', 'Website', 'Referral')),
        starred INTEGER NOT NULL DEFAULT 0,
        last_contacted INTEGER,
        notes TEXT NOT NULL DEFAULT '',
        custom_fields TEXT NOT NULL DEFAULT '{}',
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        search_text TEXT NOT NULL DEFAULT ''
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_contacts_name ON contacts(name)",
    "CREATE INDEX IF NOT EXISTS idx_contacts_email ON contacts(email)",
    "CREATE INDEX IF NOT EXISTS idx_contacts_status ON contacts(status)",
    "CREATE INDEX IF NOT EXISTS idx_contacts_category ON contacts(category)",
    "CREATE INDEX IF NOT EXISTS idx_contacts_starred ON contacts(starred)",
    "CREATE INDEX IF NOT EXISTS idx_contacts_created_at ON contacts(created_at)",
    r#"
    CREATE TABLE IF NOT EXISTS contact_groups (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        description TEXT NOT NULL DEFAULT '',
        color TEXT NOT NULL DEFAULT '#667eea',
        icon TEXT NOT NULL DEFAULT '👥',
        contact_count INTEGER NOT NULL DEFAULT 0 CHECK (contact_count >= 0),
        is_private INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS activities (
        id TEXT PRIMARY KEY,
        action TEXT NOT NULL,
        entity_type TEXT NOT NULL DEFAULT 'Contact',
        entity_id TEXT,
        entity_name TEXT NOT NULL DEFAULT '',
        changes TEXT NOT NULL DEFAULT '{}',
        performed_by TEXT NOT NULL DEFAULT 'System',
        ip_address TEXT,
        user_agent TEXT,
        timestamp INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_activities_timestamp ON activities(timestamp)",
    "CREATE INDEX IF NOT EXISTS idx_activities_entity ON activities(entity_id, timestamp)",
    "CREATE INDEX IF NOT EXISTS idx_activities_action ON activities(action, timestamp)",
];

const CONTACT_COLUMNS: &str = "id, name, email, phone, message, category, tags, group_ids, \
     status, source, starred, last_contacted, notes, custom_fields, created_at, updated_at";

const GROUP_COLUMNS: &str =
    "id, name, description, color, icon, contact_count, is_private, created_at, updated_at";

const ACTIVITY_COLUMNS: &str = "id, action, entity_type, entity_id, entity_name, changes, \
     performed_by, ip_address, user_agent, timestamp";

/// Current time at the precision the store keeps.
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Folded text the search filter matches against. The needle is folded
/// with the same `to_lowercase`; SQLite's `lower()` only folds ASCII.
fn search_text(name: &str, email: &str, phone: &str, message: &str) -> String {
    format!("{name}\n{email}\n{phone}\n{message}").to_lowercase()
}

/// Rows matched and rows actually changed by a set-wide update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateCounts {
    pub matched: u64,
    pub modified: u64,
}

/// Result of attaching a contact to, or detaching it from, a group.
#[derive(Debug, Clone, PartialEq)]
pub enum MembershipOutcome {
    ContactNotFound,
    GroupNotFound,
    /// `changed` is false when membership was already in the requested state.
    Applied {
        contact: Contact,
        group: Group,
        changed: bool,
    },
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Create a new storage instance and initialize the schema.
    ///
    /// # Arguments
    ///
    /// * `database_url` - SQLite connection string (e.g., "sqlite:contacts.db?mode=rwc" or "sqlite::memory:")
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        // Each connection to an in-memory database sees its own database, so
        // keep exactly one connection alive for the lifetime of the pool.
        let in_memory = database_url.contains(":memory:");
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let storage = Self { pool };
        storage.initialize_schema().await?;

        Ok(storage)
    }

    async fn initialize_schema(&self) -> anyhow::Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Close every pooled connection. Later queries fail.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Check that the database answers queries.
    pub async fn ping(&self) -> anyhow::Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    // ========================================================================
    // Contacts
    // ========================================================================

    /// Insert a contact and bump the count of every group it references.
    pub async fn insert_contact(&self, contact: &Contact) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!(
            "INSERT INTO contacts ({CONTACT_COLUMNS}, search_text) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&contact.id)
        .bind(&contact.name)
        .bind(&contact.email)
        .bind(&contact.phone)
        .bind(&contact.message)
        .bind(contact.category.as_str())
        .bind(serde_json::to_string(&contact.tags)?)
        .bind(serde_json::to_string(&contact.groups)?)
        .bind(contact.status.as_str())
        .bind(contact.source.as_str())
        .bind(contact.starred)
        .bind(contact.last_contacted.map(|t| t.timestamp_millis()))
        .bind(&contact.notes)
        .bind(serde_json::to_string(&contact.custom_fields)?)
        .bind(contact.created_at.timestamp_millis())
        .bind(contact.updated_at.timestamp_millis())
        .bind(search_text(
            &contact.name,
            &contact.email,
            &contact.phone,
            &contact.message,
        ))
        .execute(&mut *tx)
        .await?;

        let deltas: Vec<(String, i64)> = contact.groups.iter().map(|g| (g.clone(), 1)).collect();
        adjust_group_counts(&mut tx, &deltas, contact.created_at).await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn find_contact(&self, id: &str) -> anyhow::Result<Option<Contact>> {
        let row = sqlx::query(&format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(contact_from_row).transpose()
    }

    /// Fetch one page of contacts matching the filter, in the requested order.
    pub async fn list_contacts(&self, params: &ContactListParams) -> anyhow::Result<Vec<Contact>> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {CONTACT_COLUMNS} FROM contacts"));
        push_contact_filter(&mut qb, &params.filter);

        match &params.sort_key {
            SortKey::Column(column) => {
                let direction = params.sort_order.as_sql();
                qb.push(format!(" ORDER BY {column} {direction}, rowid {direction}"));
            }
            SortKey::Unrecognized(_) => {
                qb.push(" ORDER BY rowid ASC");
            }
        }

        qb.push(" LIMIT ")
            .push_bind(i64::from(params.page.limit))
            .push(" OFFSET ")
            .push_bind(params.page.offset());

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(contact_from_row).collect()
    }

    /// Count contacts matching the filter, ignoring pagination.
    pub async fn count_contacts(&self, filter: &ContactFilter) -> anyhow::Result<i64> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM contacts");
        push_contact_filter(&mut qb, filter);

        Ok(qb.build_query_scalar::<i64>().fetch_one(&self.pool).await?)
    }

    /// Every contact matching the filter, in insertion order.
    pub async fn export_contacts(&self, filter: &ContactFilter) -> anyhow::Result<Vec<Contact>> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {CONTACT_COLUMNS} FROM contacts"));
        push_contact_filter(&mut qb, filter);
        qb.push(" ORDER BY rowid ASC");

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(contact_from_row).collect()
    }

    /// Distinct values of one facet across all contacts, sorted.
    pub async fn distinct_values(&self, kind: FacetKind) -> anyhow::Result<Vec<String>> {
        let sql = match kind {
            FacetKind::Categories => "SELECT DISTINCT category AS value FROM contacts ORDER BY value",
            FacetKind::Statuses => "SELECT DISTINCT status AS value FROM contacts ORDER BY value",
            FacetKind::Tags => {
                "SELECT DISTINCT j.value AS value \
                 FROM contacts, json_each(contacts.tags) AS j ORDER BY value"
            }
        };

        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;
        rows.iter()
            .map(|r| r.try_get::<String, _>("value").map_err(Into::into))
            .collect()
    }

    /// All three facets, computed over the whole collection.
    pub async fn contact_facets(&self) -> anyhow::Result<Facets> {
        Ok(Facets {
            categories: self.distinct_values(FacetKind::Categories).await?,
            tags: self.distinct_values(FacetKind::Tags).await?,
            statuses: self.distinct_values(FacetKind::Statuses).await?,
        })
    }

    /// Apply a partial update to one contact and return the stored result.
    ///
    /// Group references changed here do not adjust group counts.
    pub async fn update_contact(
        &self,
        id: &str,
        changes: &ContactChanges,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<Contact>> {
        let columns = changed_columns(changes)?;
        let mut tx = self.pool.begin().await?;

        let mut qb = QueryBuilder::<Sqlite>::new("");
        push_contact_assignments(&mut qb, &columns, now);
        qb.push(" WHERE id = ").push_bind(id.to_string());

        let result = qb.build().execute(&mut *tx).await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }

        let ids = [id.to_string()];
        if touches_search_text(changes) {
            refresh_search_text(&mut tx, &ids).await?;
        }
        tx.commit().await?;

        self.find_contact(id).await
    }

    /// Apply the same partial update to every listed contact in one statement.
    ///
    /// Only contacts where at least one supplied value differs are written;
    /// the rest count as matched but not modified.
    pub async fn update_contacts(
        &self,
        ids: &[String],
        changes: &ContactChanges,
        now: DateTime<Utc>,
    ) -> anyhow::Result<UpdateCounts> {
        if ids.is_empty() {
            return Ok(UpdateCounts {
                matched: 0,
                modified: 0,
            });
        }

        let columns = changed_columns(changes)?;
        let mut tx = self.pool.begin().await?;

        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM contacts WHERE id IN (");
        push_id_list(&mut count, ids);
        let matched = count.build_query_scalar::<i64>().fetch_one(&mut *tx).await?;

        let mut qb = QueryBuilder::<Sqlite>::new("");
        push_contact_assignments(&mut qb, &columns, now);
        qb.push(" WHERE id IN (");
        push_id_list(&mut qb, ids);
        push_change_guard(&mut qb, &columns);
        let modified = qb.build().execute(&mut *tx).await?.rows_affected();

        if modified > 0 && touches_search_text(changes) {
            refresh_search_text(&mut tx, ids).await?;
        }
        tx.commit().await?;

        Ok(UpdateCounts {
            matched: u64::try_from(matched)?,
            modified,
        })
    }

    /// Flip the starred flag. Returns the new value and the contact's name.
    pub async fn toggle_star(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<(bool, String)>> {
        let row = sqlx::query(
            r#"
            UPDATE contacts
            SET starred = NOT starred, updated_at = ?
            WHERE id = ?
            RETURNING starred, name
            "#,
        )
        .bind(now.timestamp_millis())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some((row.try_get("starred")?, row.try_get("name")?))),
            None => Ok(None),
        }
    }

    /// Delete one contact, decrementing every group it referenced.
    pub async fn delete_contact(&self, id: &str) -> anyhow::Result<Option<Contact>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE id = ?"))
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(contact) = row.as_ref().map(contact_from_row).transpose()? else {
            return Ok(None);
        };

        let deltas: Vec<(String, i64)> = contact.groups.iter().map(|g| (g.clone(), -1)).collect();
        adjust_group_counts(&mut tx, &deltas, current_timestamp()).await?;

        sqlx::query("DELETE FROM contacts WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(contact))
    }

    /// Delete every listed contact in one statement, keeping group counts in step.
    ///
    /// Returns the number of contacts deleted.
    pub async fn delete_contacts(&self, ids: &[String]) -> anyhow::Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;

        let mut select = QueryBuilder::<Sqlite>::new("SELECT group_ids FROM contacts WHERE id IN (");
        push_id_list(&mut select, ids);
        let rows = select.build().fetch_all(&mut *tx).await?;

        let mut tally: HashMap<String, i64> = HashMap::new();
        for row in &rows {
            let groups: Vec<String> = serde_json::from_str(&row.try_get::<String, _>("group_ids")?)?;
            for group in groups {
                *tally.entry(group).or_default() -= 1;
            }
        }
        let deltas: Vec<(String, i64)> = tally.into_iter().collect();
        adjust_group_counts(&mut tx, &deltas, current_timestamp()).await?;

        let mut delete = QueryBuilder::<Sqlite>::new("DELETE FROM contacts WHERE id IN (");
        push_id_list(&mut delete, ids);
        let deleted = delete.build().execute(&mut *tx).await?.rows_affected();

        tx.commit().await?;
        Ok(deleted)
    }

    /// Add a group reference to a contact and bump the group's count.
    pub async fn attach_group(
        &self,
        contact_id: &str,
        group_id: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<MembershipOutcome> {
        self.change_membership(contact_id, group_id, true, now).await
    }

    /// Remove a group reference from a contact and decrement the group's count.
    pub async fn detach_group(
        &self,
        contact_id: &str,
        group_id: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<MembershipOutcome> {
        self.change_membership(contact_id, group_id, false, now).await
    }

    async fn change_membership(
        &self,
        contact_id: &str,
        group_id: &str,
        attach: bool,
        now: DateTime<Utc>,
    ) -> anyhow::Result<MembershipOutcome> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE id = ?"))
            .bind(contact_id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(mut contact) = row.as_ref().map(contact_from_row).transpose()? else {
            return Ok(MembershipOutcome::ContactNotFound);
        };

        let row = sqlx::query(&format!("SELECT {GROUP_COLUMNS} FROM contact_groups WHERE id = ?"))
            .bind(group_id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(mut group) = row.as_ref().map(group_from_row).transpose()? else {
            return Ok(MembershipOutcome::GroupNotFound);
        };

        let is_member = contact.groups.iter().any(|g| g == group_id);
        if is_member == attach {
            return Ok(MembershipOutcome::Applied {
                contact,
                group,
                changed: false,
            });
        }

        let delta = if attach {
            contact.groups.push(group_id.to_string());
            1
        } else {
            contact.groups.retain(|g| g != group_id);
            -1
        };
        contact.updated_at = now;

        sqlx::query("UPDATE contacts SET group_ids = ?, updated_at = ? WHERE id = ?")
            .bind(serde_json::to_string(&contact.groups)?)
            .bind(now.timestamp_millis())
            .bind(contact_id)
            .execute(&mut *tx)
            .await?;
        adjust_group_counts(&mut tx, &[(group_id.to_string(), delta)], now).await?;

        tx.commit().await?;

        group.contact_count = (group.contact_count + delta).max(0);
        group.updated_at = now;

        Ok(MembershipOutcome::Applied {
            contact,
            group,
            changed: true,
        })
    }

    // ========================================================================
    // Groups
    // ========================================================================

    /// All groups sorted by name.
    pub async fn list_groups(&self) -> anyhow::Result<Vec<Group>> {
        let rows = sqlx::query(&format!(
            "SELECT {GROUP_COLUMNS} FROM contact_groups ORDER BY name ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(group_from_row).collect()
    }

    pub async fn find_group(&self, id: &str) -> anyhow::Result<Option<Group>> {
        let row = sqlx::query(&format!("SELECT {GROUP_COLUMNS} FROM contact_groups WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(group_from_row).transpose()
    }

    /// Load the listed groups in one query. Unknown ids are skipped.
    pub async fn find_groups(&self, ids: &[String]) -> anyhow::Result<Vec<Group>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {GROUP_COLUMNS} FROM contact_groups WHERE id IN ("
        ));
        push_id_list(&mut qb, ids);
        let rows = qb.build().fetch_all(&self.pool).await?;

        rows.iter().map(group_from_row).collect()
    }

    pub async fn find_group_by_name(&self, name: &str) -> anyhow::Result<Option<Group>> {
        let row = sqlx::query(&format!(
            "SELECT {GROUP_COLUMNS} FROM contact_groups WHERE name = ?"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(group_from_row).transpose()
    }

    /// Insert a group. Fails with a unique violation if the name is taken.
    pub async fn insert_group(&self, group: &Group) -> anyhow::Result<()> {
        sqlx::query(&format!(
            "INSERT INTO contact_groups ({GROUP_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&group.id)
        .bind(&group.name)
        .bind(&group.description)
        .bind(&group.color)
        .bind(&group.icon)
        .bind(group.contact_count.max(0))
        .bind(group.is_private)
        .bind(group.created_at.timestamp_millis())
        .bind(group.updated_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn update_group(
        &self,
        id: &str,
        changes: &GroupChanges,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<Group>> {
        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE contact_groups SET updated_at = ");
        qb.push_bind(now.timestamp_millis());
        if let Some(name) = &changes.name {
            qb.push(", name = ").push_bind(name.clone());
        }
        if let Some(description) = &changes.description {
            qb.push(", description = ").push_bind(description.clone());
        }
        if let Some(color) = &changes.color {
            qb.push(", color = ").push_bind(color.clone());
        }
        if let Some(icon) = &changes.icon {
            qb.push(", icon = ").push_bind(icon.clone());
        }
        if let Some(is_private) = changes.is_private {
            qb.push(", is_private = ").push_bind(is_private);
        }
        qb.push(" WHERE id = ").push_bind(id.to_string());

        let result = qb.build().execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.find_group(id).await
    }

    /// Pull the group out of every contact, then delete it.
    ///
    /// Returns the deleted group and the number of contacts detached, or
    /// `None` (with nothing modified) if the group does not exist.
    pub async fn delete_group(&self, id: &str) -> anyhow::Result<Option<(Group, u64)>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!("SELECT {GROUP_COLUMNS} FROM contact_groups WHERE id = ?"))
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(group) = row.as_ref().map(group_from_row).transpose()? else {
            return Ok(None);
        };

        let detached = sqlx::query(
            r#"
            UPDATE contacts
            SET group_ids = (
                    SELECT json_group_array(value)
                    FROM json_each(contacts.group_ids)
                    WHERE value <> ?
                ),
                updated_at = ?
            WHERE EXISTS (
                SELECT 1 FROM json_each(contacts.group_ids) WHERE value = ?
            )
            "#,
        )
        .bind(id)
        .bind(current_timestamp().timestamp_millis())
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        sqlx::query("DELETE FROM contact_groups WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some((group, detached)))
    }

    pub async fn count_groups(&self) -> anyhow::Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM contact_groups")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    // ========================================================================
    // Activities
    // ========================================================================

    pub async fn insert_activity(&self, entry: &ActivityEntry) -> anyhow::Result<()> {
        sqlx::query(&format!(
            "INSERT INTO activities ({ACTIVITY_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&entry.id)
        .bind(entry.action.as_str())
        .bind(&entry.entity_type)
        .bind(&entry.entity_id)
        .bind(&entry.entity_name)
        .bind(serde_json::to_string(&entry.changes)?)
        .bind(&entry.performed_by)
        .bind(&entry.ip_address)
        .bind(&entry.user_agent)
        .bind(entry.timestamp.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// One page of the audit log, newest first.
    pub async fn list_activities(&self, page: PageRequest) -> anyhow::Result<Vec<ActivityEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {ACTIVITY_COLUMNS} FROM activities \
             ORDER BY timestamp DESC, rowid DESC LIMIT ? OFFSET ?"
        ))
        .bind(i64::from(page.limit))
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(activity_from_row).collect()
    }

    pub async fn count_activities(&self) -> anyhow::Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM activities")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// The most recent entries about one entity, newest first.
    pub async fn activities_for_entity(
        &self,
        entity_id: &str,
        limit: u32,
    ) -> anyhow::Result<Vec<ActivityEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {ACTIVITY_COLUMNS} FROM activities WHERE entity_id = ? \
             ORDER BY timestamp DESC, rowid DESC LIMIT ?"
        ))
        .bind(entity_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(activity_from_row).collect()
    }

    pub async fn recent_activities(&self, limit: u32) -> anyhow::Result<Vec<ActivityEntry>> {
        self.list_activities(PageRequest { page: 1, limit }).await
    }

    // ========================================================================
    // Analytics
    // ========================================================================

    /// Contact counts per category, largest first.
    pub async fn category_stats(&self) -> anyhow::Result<Vec<CategoryStat>> {
        let rows = sqlx::query(
            r#"
            SELECT category, COUNT(*) AS count
            FROM contacts
            GROUP BY category
            ORDER BY count DESC, category ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                Ok::<_, anyhow::Error>(CategoryStat {
                    category: r.try_get("category")?,
                    count: r.try_get("count")?,
                })
            })
            .collect()
    }

    /// Contacts created at or after `since`, counted per UTC day, oldest day first.
    pub async fn daily_creations_since(
        &self,
        since: DateTime<Utc>,
    ) -> anyhow::Result<Vec<DailyCount>> {
        let rows = sqlx::query(
            r#"
            SELECT strftime('%Y-%m-%d', created_at / 1000, 'unixepoch') AS day,
                   COUNT(*) AS count
            FROM contacts
            WHERE created_at >= ?
            GROUP BY day
            ORDER BY day ASC
            "#,
        )
        .bind(since.timestamp_millis())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                Ok::<_, anyhow::Error>(DailyCount {
                    date: r.try_get("day")?,
                    count: r.try_get("count")?,
                })
            })
            .collect()
    }

    /// The most recently created contacts, newest first.
    pub async fn latest_contacts(&self, limit: u32) -> anyhow::Result<Vec<ContactPreview>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, email, category, created_at
            FROM contacts
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                Ok::<_, anyhow::Error>(ContactPreview {
                    id: r.try_get("id")?,
                    name: r.try_get("name")?,
                    email: r.try_get("email")?,
                    category: parse_column(r, "category", Category::parse)?,
                    created_at: from_millis(r.try_get("created_at")?)?,
                })
            })
            .collect()
    }
}

/// Whether an error raised by this module is a unique-constraint violation.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.downcast_ref::<sqlx::Error>()
        .and_then(|e| e.as_database_error())
        .is_some_and(|e| e.is_unique_violation())
}

/// Apply count deltas to groups, clamping every count at zero.
async fn adjust_group_counts(
    conn: &mut SqliteConnection,
    deltas: &[(String, i64)],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    for (group_id, delta) in deltas {
        sqlx::query(
            r#"
            UPDATE contact_groups
            SET contact_count = MAX(contact_count + ?, 0), updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(*delta)
        .bind(now.timestamp_millis())
        .bind(group_id)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

fn push_id_list(qb: &mut QueryBuilder<'_, Sqlite>, ids: &[String]) {
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(id.clone());
    }
    separated.push_unseparated(")");
}

fn push_contact_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &ContactFilter) {
    qb.push(" WHERE 1 = 1");

    if let Some(search) = &filter.search {
        qb.push(" AND instr(search_text, ")
            .push_bind(search.to_lowercase())
            .push(") > 0");
    }
    if let Some(category) = &filter.category {
        qb.push(" AND category = ").push_bind(category.clone());
    }
    if let Some(status) = &filter.status {
        qb.push(" AND status = ").push_bind(status.clone());
    }
    if let Some(group) = &filter.group {
        qb.push(" AND EXISTS (SELECT 1 FROM json_each(contacts.group_ids) WHERE value = ")
            .push_bind(group.clone())
            .push(")");
    }
    if let Some(tag) = &filter.tag {
        qb.push(" AND EXISTS (SELECT 1 FROM json_each(contacts.tags) WHERE value = ")
            .push_bind(tag.clone())
            .push(")");
    }
    if let Some(starred) = filter.starred {
        qb.push(" AND starred = ").push_bind(starred);
    }
}

/// A bound value for one contact column.
#[derive(Debug, Clone)]
enum ColumnValue {
    Text(String),
    Integer(i64),
    Flag(bool),
}

/// The columns a partial update writes, in a fixed order.
fn changed_columns(changes: &ContactChanges) -> anyhow::Result<Vec<(&'static str, ColumnValue)>> {
    let mut columns = Vec::new();
    let mut text = |column: &'static str, value: String| columns.push((column, ColumnValue::Text(value)));

    if let Some(name) = &changes.name {
        text("name", name.clone());
    }
    if let Some(email) = &changes.email {
        text("email", email.clone());
    }
    if let Some(phone) = &changes.phone {
        text("phone", phone.clone());
    }
    if let Some(message) = &changes.message {
        text("message", message.clone());
    }
    if let Some(category) = changes.category {
        text("category", category.as_str().to_string());
    }
    if let Some(tags) = &changes.tags {
        text("tags", serde_json::to_string(tags)?);
    }
    if let Some(groups) = &changes.groups {
        text("group_ids", serde_json::to_string(groups)?);
    }
    if let Some(status) = changes.status {
        text("status", status.as_str().to_string());
    }
    if let Some(source) = changes.source {
        text("source", source.as_str().to_string());
    }
    if let Some(notes) = &changes.notes {
        text("notes", notes.clone());
    }
    if let Some(custom_fields) = &changes.custom_fields {
        text("custom_fields", serde_json::to_string(custom_fields)?);
    }
    if let Some(starred) = changes.starred {
        columns.push(("starred", ColumnValue::Flag(starred)));
    }
    if let Some(last_contacted) = changes.last_contacted {
        columns.push((
            "last_contacted",
            ColumnValue::Integer(last_contacted.timestamp_millis()),
        ));
    }

    Ok(columns)
}

fn push_value(qb: &mut QueryBuilder<'_, Sqlite>, value: &ColumnValue) {
    match value {
        ColumnValue::Text(text) => qb.push_bind(text.clone()),
        ColumnValue::Integer(number) => qb.push_bind(*number),
        ColumnValue::Flag(flag) => qb.push_bind(*flag),
    };
}

fn push_contact_assignments(
    qb: &mut QueryBuilder<'_, Sqlite>,
    columns: &[(&'static str, ColumnValue)],
    now: DateTime<Utc>,
) {
    qb.push("UPDATE contacts SET updated_at = ")
        .push_bind(now.timestamp_millis());

    for (column, value) in columns {
        qb.push(format!(", {column} = "));
        push_value(qb, value);
    }
}

/// Restrict an update to rows where some supplied value differs.
fn push_change_guard(qb: &mut QueryBuilder<'_, Sqlite>, columns: &[(&'static str, ColumnValue)]) {
    if columns.is_empty() {
        qb.push(" AND 0");
        return;
    }

    qb.push(" AND (");
    for (i, (column, value)) in columns.iter().enumerate() {
        if i > 0 {
            qb.push(" OR ");
        }
        qb.push(format!("{column} IS NOT "));
        push_value(qb, value);
    }
    qb.push(")");
}

fn touches_search_text(changes: &ContactChanges) -> bool {
    changes.name.is_some()
        || changes.email.is_some()
        || changes.phone.is_some()
        || changes.message.is_some()
}

/// Recompute the folded search text of the listed contacts.
async fn refresh_search_text(conn: &mut SqliteConnection, ids: &[String]) -> anyhow::Result<()> {
    let mut select =
        QueryBuilder::<Sqlite>::new("SELECT id, name, email, phone, message FROM contacts WHERE id IN (");
    push_id_list(&mut select, ids);
    let rows = select.build().fetch_all(&mut *conn).await?;

    for row in &rows {
        let folded = search_text(
            row.try_get("name")?,
            row.try_get("email")?,
            row.try_get("phone")?,
            row.try_get("message")?,
        );
        sqlx::query("UPDATE contacts SET search_text = ? WHERE id = ?")
            .bind(folded)
            .bind(row.try_get::<String, _>("id")?)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

fn from_millis(ms: i64) -> anyhow::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| anyhow!("timestamp out of range: {ms}"))
}

fn parse_column<T>(row: &SqliteRow, column: &str, parse: fn(&str) -> Option<T>) -> anyhow::Result<T> {
    let raw: String = row.try_get(column)?;
    parse(&raw).ok_or_else(|| anyhow!("unexpected {column} value {raw:?}"))
}

fn contact_from_row(row: &SqliteRow) -> anyhow::Result<Contact> {
    Ok(Contact {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        message: row.try_get("message")?,
        category: parse_column(row, "category", Category::parse)?,
        tags: serde_json::from_str(&row.try_get::<String, _>("tags")?)?,
        groups: serde_json::from_str(&row.try_get::<String, _>("group_ids")?)?,
        status: parse_column(row, "status", ContactStatus::parse)?,
        source: parse_column(row, "source", ContactSource::parse)?,
        starred: row.try_get("starred")?,
        last_contacted: row
            .try_get::<Option<i64>, _>("last_contacted")?
            .map(from_millis)
            .transpose()?,
        notes: row.try_get("notes")?,
        custom_fields: serde_json::from_str(&row.try_get::<String, _>("custom_fields")?)?,
        created_at: from_millis(row.try_get("created_at")?)?,
        updated_at: from_millis(row.try_get("updated_at")?)?,
    })
}

fn group_from_row(row: &SqliteRow) -> anyhow::Result<Group> {
    Ok(Group {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        color: row.try_get("color")?,
        icon: row.try_get("icon")?,
        contact_count: row.try_get("contact_count")?,
        is_private: row.try_get("is_private")?,
        created_at: from_millis(row.try_get("created_at")?)?,
        updated_at: from_millis(row.try_get("updated_at")?)?,
    })
}

fn activity_from_row(row: &SqliteRow) -> anyhow::Result<ActivityEntry> {
    Ok(ActivityEntry {
        id: row.try_get("id")?,
        action: parse_column(row, "action", ActivityAction::parse)?,
        entity_type: row.try_get("entity_type")?,
        entity_id: row.try_get("entity_id")?,
        entity_name: row.try_get("entity_name")?,
        changes: serde_json::from_str(&row.try_get::<String, _>("changes")?)?,
        performed_by: row.try_get("performed_by")?,
        ip_address: row.try_get("ip_address")?,
        user_agent: row.try_get("user_agent")?,
        timestamp: from_millis(row.try_get("timestamp")?)?,
    })
}
