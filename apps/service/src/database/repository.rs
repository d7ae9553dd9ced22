use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use libsql::{Connection, Row, params};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::models::{Summary, TargetStatus, uptime_percentage};
use crate::config::TargetConfig;
use crate::monitoring::types::{Check, Target};
use crate::pool::LibsqlPool;

const UPTIME_WINDOW_HOURS: i64 = 24;

const CHECK_COLUMNS: &str =
    "target_id, status_code, response_time_ms, is_up, error, ssl_days_remaining, checked_at";

const TARGET_COLUMNS: &str =
    "id, name, url, method, expected_status, timeout_ms, headers, expect_body_contains";

/// Database trait for abstracting database operations
#[async_trait]
pub trait Database: Send + Sync {
    /// Upsert configured targets keyed by URL and return them with stable ids
    ///
    /// Targets missing from `configs` are kept but marked inactive.
    async fn sync_targets(&self, configs: &[TargetConfig]) -> Result<Vec<Target>>;

    /// Append one check
    async fn insert_check(&self, check: &Check) -> Result<i64>;

    /// Active targets with their latest check and 24h uptime
    async fn get_targets(&self) -> Result<Vec<TargetStatus>>;

    /// Checks for a target within the trailing window, oldest first
    async fn get_target_history(&self, target_id: Uuid, hours: u32) -> Result<Vec<Check>>;

    /// Aggregate counts over active targets
    async fn get_summary(&self) -> Result<Summary> {
        Ok(Summary::from_statuses(&self.get_targets().await?))
    }
}

/// LibSQL database implementation
pub struct DatabaseImpl {
    pool: LibsqlPool,
}

impl DatabaseImpl {
    /// Create a new database instance from a pool
    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    /// Get a connection from the pool
    async fn get_conn(&self) -> Result<deadpool::managed::Object<crate::pool::LibsqlManager>> {
        Ok(self.pool.get().await?)
    }

    async fn latest_check(conn: &Connection, target_id: &str) -> Result<Option<Check>> {
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {CHECK_COLUMNS} FROM checks WHERE target_id = ? ORDER BY checked_at DESC, id DESC LIMIT 1"
                ),
                params![target_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(check_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn uptime_since(
        conn: &Connection,
        target_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<f64>> {
        let mut rows = conn
            .query(
                "SELECT COUNT(*), COALESCE(SUM(is_up), 0) FROM checks WHERE target_id = ? AND checked_at >= ?",
                params![target_id, since.timestamp_millis()],
            )
            .await?;

        let row = rows.next().await?.ok_or_else(|| anyhow!("uptime query returned no rows"))?;
        let total: i64 = row.get(0)?;
        let up: i64 = row.get(1)?;
        Ok(uptime_percentage(up, total))
    }
}

#[async_trait]
impl Database for DatabaseImpl {
    async fn sync_targets(&self, configs: &[TargetConfig]) -> Result<Vec<Target>> {
        let conn = self.get_conn().await?;
        let now = Utc::now().timestamp();
        let tx = conn.transaction().await?;

        tx.execute("UPDATE targets SET active = 0", ()).await?;

        let mut targets = Vec::with_capacity(configs.len());
        for config in configs {
            let headers = serde_json::to_string(&config.headers)?;
            tx.execute(
                "INSERT INTO targets (id, name, url, method, expected_status, timeout_ms, headers, expect_body_contains, active, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)
                 ON CONFLICT(url) DO UPDATE SET
                    name = excluded.name,
                    method = excluded.method,
                    expected_status = excluded.expected_status,
                    timeout_ms = excluded.timeout_ms,
                    headers = excluded.headers,
                    expect_body_contains = excluded.expect_body_contains,
                    active = 1,
                    updated_at = excluded.updated_at",
                params![
                    Uuid::new_v4().to_string(),
                    config.name.clone(),
                    config.url.clone(),
                    config.method.clone(),
                    config.expected_status as i64,
                    config.timeout_ms as i64,
                    headers,
                    config.expect_body_contains.clone(),
                    now,
                    now
                ],
            )
            .await?;

            let mut rows = tx
                .query(
                    &format!("SELECT {TARGET_COLUMNS} FROM targets WHERE url = ?"),
                    params![config.url.clone()],
                )
                .await?;
            let row = rows
                .next()
                .await?
                .ok_or_else(|| anyhow!("target {} missing after upsert", config.url))?;
            targets.push(target_from_row(&row)?);
        }

        tx.commit().await?;
        Ok(targets)
    }

    async fn insert_check(&self, check: &Check) -> Result<i64> {
        let conn = self.get_conn().await?;

        conn.execute(
            &format!("INSERT INTO checks ({CHECK_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?)"),
            params![
                check.target_id.to_string(),
                check.status_code.map(|v| v as i64),
                check.response_time_ms as i64,
                if check.is_up { 1 } else { 0 },
                check.error.clone(),
                check.ssl_days_remaining,
                check.checked_at.timestamp_millis()
            ],
        )
        .await?;

        Ok(conn.last_insert_rowid())
    }

    async fn get_targets(&self) -> Result<Vec<TargetStatus>> {
        let conn = self.get_conn().await?;
        let since = Utc::now() - Duration::hours(UPTIME_WINDOW_HOURS);

        let mut rows = conn
            .query(
                &format!("SELECT {TARGET_COLUMNS} FROM targets WHERE active = 1 ORDER BY created_at, name"),
                (),
            )
            .await?;

        let mut targets = Vec::new();
        while let Some(row) = rows.next().await? {
            targets.push(target_from_row(&row)?);
        }

        let mut statuses = Vec::with_capacity(targets.len());
        for target in targets {
            let id = target.id.to_string();
            let latest_check = Self::latest_check(&conn, &id).await?;
            let uptime_24h = Self::uptime_since(&conn, &id, since).await?;
            statuses.push(TargetStatus { target, latest_check, uptime_24h });
        }

        Ok(statuses)
    }

    async fn get_target_history(&self, target_id: Uuid, hours: u32) -> Result<Vec<Check>> {
        let conn = self.get_conn().await?;
        let since = Utc::now() - Duration::hours(hours as i64);

        let mut rows = conn
            .query(
                &format!(
                    "SELECT {CHECK_COLUMNS} FROM checks WHERE target_id = ? AND checked_at >= ? ORDER BY checked_at ASC, id ASC"
                ),
                params![target_id.to_string(), since.timestamp_millis()],
            )
            .await?;

        let mut checks = Vec::new();
        while let Some(row) = rows.next().await? {
            checks.push(check_from_row(&row)?);
        }

        Ok(checks)
    }
}

fn target_from_row(row: &Row) -> Result<Target> {
    let id: String = row.get(0)?;
    let headers: String = row.get(6)?;
    let headers: BTreeMap<String, String> = serde_json::from_str(&headers)?;

    Ok(Target {
        id: Uuid::parse_str(&id)?,
        name: row.get(1)?,
        url: row.get(2)?,
        method: row.get(3)?,
        expected_status: row.get::<i64>(4)? as u16,
        timeout_ms: row.get::<i64>(5)? as u64,
        headers,
        expect_body_contains: row.get(7)?,
    })
}

fn check_from_row(row: &Row) -> Result<Check> {
    let target_id: String = row.get(0)?;
    let checked_at: i64 = row.get(6)?;

    Ok(Check {
        target_id: Uuid::parse_str(&target_id)?,
        status_code: row.get::<Option<i64>>(1)?.map(|v| v as u16),
        response_time_ms: row.get::<i64>(2)? as u64,
        is_up: row.get::<i64>(3)? != 0,
        error: row.get(4)?,
        ssl_days_remaining: row.get(5)?,
        checked_at: DateTime::from_timestamp_millis(checked_at)
            .ok_or_else(|| anyhow!("invalid check timestamp {}", checked_at))?,
    })
}
