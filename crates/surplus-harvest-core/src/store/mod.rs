//! Storage abstraction for Surplus Harvest.
//!
//! Two ports cover everything the pipeline persists, enabling pluggable
//! backends (SQLite in production, in-memory for tests) behind the same
//! contract:
//!
//! - [`RunStore`] — run rows and the authoritative resume cursor.
//! - [`StateStore`] — aggregated connector status, the dedupe case cache,
//!   and the append-only audit sink.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{
    AuditEvent, ConnectorConfig, ConnectorStatus, RunRecord, RunStats, RunStatus,
    StoredCaseRecord,
};

/// Input for a freshly created run row.
#[derive(Debug, Clone)]
pub struct NewRun {
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub cursor: Option<String>,
    pub attempt_count: u32,
}

/// Identity handed back by [`RunStore::create_run`]; the orchestrator
/// carries it across attempts of the same cycle.
#[derive(Debug, Clone)]
pub struct RunHandle {
    pub id: String,
    pub attempt_count: u32,
}

/// Replacement values for a run row's mutable columns. Every field is
/// written as given (`None` clears), so callers always state the full
/// picture of the attempt they are recording.
#[derive(Debug, Clone)]
pub struct RunUpdate {
    pub status: RunStatus,
    pub finished_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub cursor: Option<String>,
    pub stats: Option<RunStats>,
    pub attempt_count: u32,
}

/// Filter for [`RunStore::list_runs`]. Results are most-recent-first.
#[derive(Debug, Clone)]
pub struct RunQuery {
    pub connector_id: Option<String>,
    /// Match runs whose stats mention this case reference.
    pub case_ref: Option<String>,
    pub limit: usize,
}

impl Default for RunQuery {
    fn default() -> Self {
        Self {
            connector_id: None,
            case_ref: None,
            limit: 20,
        }
    }
}

/// Durable record of execution attempts and the authoritative cursor.
///
/// [`persist_cursor`](RunStore::persist_cursor) is the only way the resume
/// point advances; the orchestrator invokes it exclusively on a fully
/// successful batch.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// The authoritative cursor for a connector, if any run has committed.
    async fn latest_cursor(&self, connector: &ConnectorConfig) -> Result<Option<String>>;

    /// Create a run row for a fresh attempt chain.
    async fn create_run(&self, connector: &ConnectorConfig, input: NewRun) -> Result<RunHandle>;

    /// Rewrite a run row's mutable columns (status transitions and attempt
    /// bookkeeping reuse the same row).
    async fn update_run(&self, run_id: &str, update: RunUpdate) -> Result<()>;

    /// Advance the authoritative resume point.
    async fn persist_cursor(
        &self,
        connector: &ConnectorConfig,
        cursor: Option<&str>,
    ) -> Result<()>;

    /// Query run history, most recent first.
    async fn list_runs(&self, query: RunQuery) -> Result<Vec<RunRecord>>;
}

/// Aggregated status, dedupe cache, and audit sink.
///
/// The status and cursor views here are derived caches for operators; the
/// [`RunStore`] cursor is authoritative for resumption.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Aggregated view of the most recent run. Default when never run.
    async fn status(&self, connector: &ConnectorConfig) -> Result<ConnectorStatus>;

    /// Replace the aggregated view.
    async fn put_status(
        &self,
        connector: &ConnectorConfig,
        status: ConnectorStatus,
    ) -> Result<()>;

    /// Remember an ingested record under its dedupe key. Idempotent: a key
    /// already present is left untouched.
    async fn remember_case(&self, record: StoredCaseRecord) -> Result<()>;

    async fn find_case(&self, dedupe_key: &str) -> Result<Option<StoredCaseRecord>>;

    async fn list_cases(&self) -> Result<Vec<StoredCaseRecord>>;

    /// Append an event to the audit sink. Fire-and-forget at the call
    /// sites; failures are logged, never propagated into run control flow.
    async fn audit(&self, event: AuditEvent) -> Result<()>;

    async fn list_audits(&self) -> Result<Vec<AuditEvent>>;
}
