//! SQLite-backed [`StateStore`] and [`RunStore`] implementations.
//!
//! Maps each port operation to SQL against the schema created by
//! [`crate::migrate`]. Both adapters share one [`SqlitePool`]; timestamps
//! are stored as unix seconds and the run stats payload as JSON text.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use surplus_harvest_core::models::{
    AuditEvent, AuditEventKind, ConnectorConfig, ConnectorKey, ConnectorStatus, RunRecord,
    RunStats, RunStatus, StoredCaseRecord,
};
use surplus_harvest_core::store::{
    NewRun, RunHandle, RunQuery, RunStore, RunUpdate, StateStore,
};

fn to_ts(at: DateTime<Utc>) -> i64 {
    at.timestamp()
}

fn from_ts(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_else(Utc::now)
}

/// SQLite implementation of the [`RunStore`] port.
pub struct SqliteRunStore {
    pool: SqlitePool,
}

impl SqliteRunStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn row_to_run(row: &sqlx::sqlite::SqliteRow) -> Result<RunRecord> {
    let status_text: String = row.get("status");
    let status = RunStatus::parse(&status_text)
        .ok_or_else(|| anyhow::anyhow!("unknown run status '{}'", status_text))?;

    let stats: Option<RunStats> = row
        .get::<Option<String>, _>("stats")
        .map(|text| serde_json::from_str(&text))
        .transpose()?;

    Ok(RunRecord {
        id: row.get("id"),
        connector_id: row.get("connector_id"),
        key: ConnectorKey::new(
            row.get::<String, _>("state"),
            row.get::<String, _>("county_code"),
        ),
        status,
        started_at: from_ts(row.get("started_at")),
        finished_at: row.get::<Option<i64>, _>("finished_at").map(from_ts),
        cursor: row.get("cursor"),
        error_message: row.get("error_message"),
        stats,
        attempt_count: row.get::<i64, _>("attempt_count") as u32,
    })
}

#[async_trait]
impl RunStore for SqliteRunStore {
    async fn latest_cursor(&self, connector: &ConnectorConfig) -> Result<Option<String>> {
        let cursor: Option<Option<String>> = sqlx::query_scalar(
            "SELECT cursor FROM connector_cursors WHERE connector_id = ? AND state = ? AND county_code = ?",
        )
        .bind(&connector.spider_name)
        .bind(&connector.key.state)
        .bind(&connector.key.county_code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(cursor.flatten())
    }

    async fn create_run(&self, connector: &ConnectorConfig, input: NewRun) -> Result<RunHandle> {
        let id = Uuid::new_v4().to_string();

        sqlx::query(
            r#"
            INSERT INTO connector_runs
                (id, connector_id, state, county_code, status, started_at, cursor, attempt_count, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&connector.spider_name)
        .bind(&connector.key.state)
        .bind(&connector.key.county_code)
        .bind(input.status.as_str())
        .bind(to_ts(input.started_at))
        .bind(&input.cursor)
        .bind(input.attempt_count as i64)
        .bind(to_ts(Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(RunHandle {
            id,
            attempt_count: input.attempt_count,
        })
    }

    async fn update_run(&self, run_id: &str, update: RunUpdate) -> Result<()> {
        let stats_json = update
            .stats
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"
            UPDATE connector_runs
            SET status = ?, finished_at = ?, error_message = ?, cursor = ?, stats = ?, attempt_count = ?
            WHERE id = ?
            "#,
        )
        .bind(update.status.as_str())
        .bind(update.finished_at.map(to_ts))
        .bind(&update.error_message)
        .bind(&update.cursor)
        .bind(&stats_json)
        .bind(update.attempt_count as i64)
        .bind(run_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn persist_cursor(
        &self,
        connector: &ConnectorConfig,
        cursor: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO connector_cursors (connector_id, state, county_code, cursor, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(connector_id, state, county_code) DO UPDATE SET
                cursor = excluded.cursor,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&connector.spider_name)
        .bind(&connector.key.state)
        .bind(&connector.key.county_code)
        .bind(cursor)
        .bind(to_ts(Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_runs(&self, query: RunQuery) -> Result<Vec<RunRecord>> {
        let rows = match &query.connector_id {
            Some(connector_id) => {
                sqlx::query(
                    r#"
                    SELECT id, connector_id, state, county_code, status, started_at,
                           finished_at, error_message, cursor, stats, attempt_count
                    FROM connector_runs
                    WHERE connector_id = ?
                    ORDER BY created_at DESC, id DESC
                    LIMIT ?
                    "#,
                )
                .bind(connector_id)
                .bind(query.limit as i64)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT id, connector_id, state, county_code, status, started_at,
                           finished_at, error_message, cursor, stats, attempt_count
                    FROM connector_runs
                    ORDER BY created_at DESC, id DESC
                    LIMIT ?
                    "#,
                )
                .bind(query.limit as i64)
                .fetch_all(&self.pool)
                .await?
            }
        };

        let mut runs = Vec::new();
        for row in &rows {
            runs.push(row_to_run(row)?);
        }

        // The case-ref filter digs into the stats JSON, so it is applied
        // here, within the already-limited window.
        if let Some(case_ref) = &query.case_ref {
            runs.retain(|run| {
                run.stats
                    .as_ref()
                    .and_then(|stats| stats.case_refs.as_ref())
                    .map(|refs| refs.iter().any(|r| r == case_ref))
                    .unwrap_or(false)
            });
        }

        Ok(runs)
    }
}

/// SQLite implementation of the [`StateStore`] port.
pub struct SqliteStateStore {
    pool: SqlitePool,
}

impl SqliteStateStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn status(&self, connector: &ConnectorConfig) -> Result<ConnectorStatus> {
        let row = sqlx::query(
            r#"
            SELECT last_run, last_cursor, last_job_id, extracted, created, failures, last_error
            FROM connector_status
            WHERE connector_key = ?
            "#,
        )
        .bind(connector.key.canonical())
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            None => ConnectorStatus::default(),
            Some(row) => ConnectorStatus {
                last_run: row.get::<Option<i64>, _>("last_run").map(from_ts),
                last_cursor: row.get("last_cursor"),
                last_job_id: row.get("last_job_id"),
                extracted: row.get::<i64, _>("extracted") as u64,
                created: row.get::<i64, _>("created") as u64,
                failures: row.get::<i64, _>("failures") as u64,
                last_error: row.get("last_error"),
            },
        })
    }

    async fn put_status(
        &self,
        connector: &ConnectorConfig,
        status: ConnectorStatus,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO connector_status
                (connector_key, last_run, last_cursor, last_job_id, extracted, created, failures, last_error)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(connector_key) DO UPDATE SET
                last_run = excluded.last_run,
                last_cursor = excluded.last_cursor,
                last_job_id = excluded.last_job_id,
                extracted = excluded.extracted,
                created = excluded.created,
                failures = excluded.failures,
                last_error = excluded.last_error
            "#,
        )
        .bind(connector.key.canonical())
        .bind(status.last_run.map(to_ts))
        .bind(&status.last_cursor)
        .bind(&status.last_job_id)
        .bind(status.extracted as i64)
        .bind(status.created as i64)
        .bind(status.failures as i64)
        .bind(&status.last_error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remember_case(&self, record: StoredCaseRecord) -> Result<()> {
        let normalized_json = serde_json::to_string(&record.normalized)?;

        // Presence of the dedupe key is conclusive; a replay never
        // overwrites the first ingested record.
        sqlx::query(
            r#"
            INSERT INTO cases
                (dedupe_key, case_ref, state, county_code, property_id, sale_date, raw_sha256, normalized_json, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(dedupe_key) DO NOTHING
            "#,
        )
        .bind(&record.dedupe_key)
        .bind(&record.case_ref)
        .bind(&record.connector.state)
        .bind(&record.connector.county_code)
        .bind(&record.property_id)
        .bind(&record.sale_date)
        .bind(&record.raw_sha256)
        .bind(&normalized_json)
        .bind(to_ts(Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_case(&self, dedupe_key: &str) -> Result<Option<StoredCaseRecord>> {
        let row = sqlx::query(
            r#"
            SELECT dedupe_key, case_ref, state, county_code, property_id, sale_date, raw_sha256, normalized_json
            FROM cases
            WHERE dedupe_key = ?
            "#,
        )
        .bind(dedupe_key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<StoredCaseRecord> {
            let normalized = serde_json::from_str(&row.get::<String, _>("normalized_json"))?;
            Ok(StoredCaseRecord {
                case_ref: row.get("case_ref"),
                normalized,
                dedupe_key: row.get("dedupe_key"),
                connector: ConnectorKey::new(
                    row.get::<String, _>("state"),
                    row.get::<String, _>("county_code"),
                ),
                property_id: row.get("property_id"),
                sale_date: row.get("sale_date"),
                raw_sha256: row.get("raw_sha256"),
            })
        })
        .transpose()
    }

    async fn list_cases(&self) -> Result<Vec<StoredCaseRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT dedupe_key, case_ref, state, county_code, property_id, sale_date, raw_sha256, normalized_json
            FROM cases
            ORDER BY created_at ASC, dedupe_key ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut cases = Vec::new();
        for row in &rows {
            let normalized = serde_json::from_str(&row.get::<String, _>("normalized_json"))?;
            cases.push(StoredCaseRecord {
                case_ref: row.get("case_ref"),
                normalized,
                dedupe_key: row.get("dedupe_key"),
                connector: ConnectorKey::new(
                    row.get::<String, _>("state"),
                    row.get::<String, _>("county_code"),
                ),
                property_id: row.get("property_id"),
                sale_date: row.get("sale_date"),
                raw_sha256: row.get("raw_sha256"),
            });
        }
        Ok(cases)
    }

    async fn audit(&self, event: AuditEvent) -> Result<()> {
        let payload = serde_json::to_string(&event.payload)?;

        sqlx::query(
            "INSERT INTO audit_log (event, at, state, county_code, payload) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(event.event.as_str())
        .bind(to_ts(event.at))
        .bind(&event.connector.state)
        .bind(&event.connector.county_code)
        .bind(&payload)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_audits(&self) -> Result<Vec<AuditEvent>> {
        let rows = sqlx::query(
            "SELECT event, at, state, county_code, payload FROM audit_log ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut events = Vec::new();
        for row in &rows {
            let kind_text: String = row.get("event");
            let kind = AuditEventKind::parse(&kind_text)
                .ok_or_else(|| anyhow::anyhow!("unknown audit event '{}'", kind_text))?;
            events.push(AuditEvent {
                event: kind,
                at: from_ts(row.get("at")),
                connector: ConnectorKey::new(
                    row.get::<String, _>("state"),
                    row.get::<String, _>("county_code"),
                ),
                payload: serde_json::from_str(&row.get::<String, _>("payload"))?,
            });
        }
        Ok(events)
    }
}
