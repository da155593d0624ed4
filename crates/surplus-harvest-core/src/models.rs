//! Core data models used throughout Surplus Harvest.
//!
//! These types represent the connectors, scraped items, canonical case
//! records, and run bookkeeping that flow through the ingestion pipeline.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Jurisdiction identity for one connector: a two-letter state plus a
/// county code. Forms a case-insensitive composite key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectorKey {
    pub state: String,
    pub county_code: String,
}

impl ConnectorKey {
    pub fn new(state: impl Into<String>, county_code: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            county_code: county_code.into(),
        }
    }

    /// Canonical uppercased `STATE-COUNTY` form used as a registry and
    /// status key.
    pub fn canonical(&self) -> String {
        format!(
            "{}-{}",
            self.state.to_uppercase(),
            self.county_code.to_uppercase()
        )
    }
}

/// Whether the job host pre-normalizes fields or returns raw rows only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParsingMode {
    Raw,
    Normalized,
}

/// Identity and execution parameters for one jurisdiction connector.
/// Immutable once loaded into the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorConfig {
    pub key: ConnectorKey,
    /// Spider name on the job host; doubles as the connector id in run rows.
    pub spider_name: String,
    /// Source pages this connector watches. Informational.
    pub watch_urls: Vec<String>,
    pub schedule_interval_secs: u64,
    pub parsing_mode: ParsingMode,
}

/// One raw record returned by a scrape job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapedItem {
    pub state: String,
    pub county_code: String,
    pub property_id: String,
    #[serde(default)]
    pub sale_date: Option<String>,
    /// Opaque source payload, kept verbatim for audit.
    #[serde(default = "empty_object")]
    pub raw: serde_json::Value,
    /// Partial canonical payload when the job host pre-normalizes.
    #[serde(default)]
    pub normalized: Option<NormalizedCaseDraft>,
    #[serde(default)]
    pub raw_sha256: Option<String>,
    /// Opaque replay position supplied by the job host.
    #[serde(default)]
    pub cursor: Option<String>,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// Structured property address on a canonical case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    pub city: String,
    pub state: String,
    #[serde(default)]
    pub postal_code: Option<String>,
    pub county_code: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartyRole {
    Plaintiff,
    Defendant,
    Owner,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Party {
    pub role: PartyRole,
    pub name: String,
    #[serde(default)]
    pub contact: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Amount {
    #[serde(rename = "type")]
    pub kind: String,
    pub amount: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    "USD".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CaseStatus {
    Open,
    Pending,
    Closed,
    #[default]
    Unknown,
}

/// Validated, canonical case payload handed to the downstream
/// case-management consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedCase {
    pub case_ref: String,
    pub state: String,
    pub county_code: String,
    pub source_system: String,
    /// `YYYY-MM-DD`.
    pub filed_at: String,
    #[serde(default)]
    pub sale_date: Option<String>,
    #[serde(default)]
    pub property_address: Option<Address>,
    #[serde(default)]
    pub parties: Vec<Party>,
    #[serde(default)]
    pub amounts: Vec<Amount>,
    #[serde(default)]
    pub status: CaseStatus,
    /// Free-form metadata; always carries the source `property_id`.
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Original raw payload, for audit.
    #[serde(default = "empty_object")]
    pub raw: serde_json::Value,
}

/// Partial canonical payload as supplied by a job host in `normalized`
/// parsing mode. Every field is optional; the ingestion service fills the
/// gaps from the item and the connector.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NormalizedCaseDraft {
    #[serde(default)]
    pub case_ref: Option<String>,
    #[serde(default)]
    pub source_system: Option<String>,
    #[serde(default)]
    pub filed_at: Option<String>,
    #[serde(default)]
    pub sale_date: Option<String>,
    #[serde(default)]
    pub property_address: Option<Address>,
    #[serde(default)]
    pub parties: Option<Vec<Party>>,
    #[serde(default)]
    pub amounts: Option<Vec<Amount>>,
    #[serde(default)]
    pub status: Option<CaseStatus>,
    #[serde(default)]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

/// A canonical record remembered in the state store's dedupe cache.
///
/// Presence of `dedupe_key` in the cache is conclusive proof an equivalent
/// raw record was already ingested, regardless of which run produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCaseRecord {
    pub case_ref: String,
    pub normalized: NormalizedCase,
    pub dedupe_key: String,
    pub connector: ConnectorKey,
    pub property_id: String,
    pub sale_date: Option<String>,
    pub raw_sha256: String,
}

/// Aggregated, queryable view per connector. Derived cache; the run store
/// cursor is authoritative for resumption.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectorStatus {
    pub last_run: Option<DateTime<Utc>>,
    pub last_cursor: Option<String>,
    pub last_job_id: Option<String>,
    pub extracted: u64,
    pub created: u64,
    pub failures: u64,
    pub last_error: Option<String>,
}

/// Lifecycle state of one run row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Queued,
    Running,
    Success,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "queued" => Some(RunStatus::Queued),
            "running" => Some(RunStatus::Running),
            "success" => Some(RunStatus::Success),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }
}

/// Typed stats payload attached to a run row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    pub extracted: u64,
    pub created: u64,
    pub failures: u64,
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub case_refs: Option<Vec<String>>,
}

/// One execution attempt of a connector. The row is created `running` and
/// reaches a terminal `success` or `failed`; retries of the same
/// orchestration cycle reuse the row and bump `attempt_count`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub connector_id: String,
    pub key: ConnectorKey,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub cursor: Option<String>,
    pub error_message: Option<String>,
    pub stats: Option<RunStats>,
    pub attempt_count: u32,
}

/// Events emitted to the audit ledger, fire-and-forget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventKind {
    ConnectorRunStarted,
    ConnectorRunFinished,
    CasesCreated,
}

impl AuditEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventKind::ConnectorRunStarted => "connector_run_started",
            AuditEventKind::ConnectorRunFinished => "connector_run_finished",
            AuditEventKind::CasesCreated => "cases_created",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "connector_run_started" => Some(AuditEventKind::ConnectorRunStarted),
            "connector_run_finished" => Some(AuditEventKind::ConnectorRunFinished),
            "cases_created" => Some(AuditEventKind::CasesCreated),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event: AuditEventKind,
    pub at: DateTime<Utc>,
    pub connector: ConnectorKey,
    pub payload: serde_json::Value,
}

/// Resume state for one connector inside a retry chain: the run row to
/// reuse and the attempts burned so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunAttempt {
    pub run_id: String,
    pub attempt_count: u32,
}

/// Caller-owned context carried across attempts of one orchestration
/// cycle, keyed by canonical connector key. Must not be shared across
/// concurrent cycles.
pub type RunCycleContext = HashMap<String, RunAttempt>;
