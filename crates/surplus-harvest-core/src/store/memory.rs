//! In-memory [`StateStore`] and [`RunStore`] implementations for tests.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock` for thread safety.
//! Run rows keep insertion order so listing can return most-recent-first
//! without timestamps ever colliding.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{
    AuditEvent, ConnectorConfig, ConnectorStatus, RunRecord, StoredCaseRecord,
};

use super::{NewRun, RunHandle, RunQuery, RunStore, RunUpdate, StateStore};

fn cursor_key(connector: &ConnectorConfig) -> String {
    format!("{}:{}", connector.spider_name, connector.key.canonical())
}

/// In-memory run store.
pub struct InMemoryRunStore {
    runs: RwLock<Vec<RunRecord>>,
    cursors: RwLock<HashMap<String, Option<String>>>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self {
            runs: RwLock::new(Vec::new()),
            cursors: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryRunStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn latest_cursor(&self, connector: &ConnectorConfig) -> Result<Option<String>> {
        let cursors = self.cursors.read().unwrap();
        Ok(cursors.get(&cursor_key(connector)).cloned().flatten())
    }

    async fn create_run(&self, connector: &ConnectorConfig, input: NewRun) -> Result<RunHandle> {
        let id = Uuid::new_v4().to_string();
        let record = RunRecord {
            id: id.clone(),
            connector_id: connector.spider_name.clone(),
            key: connector.key.clone(),
            status: input.status,
            started_at: input.started_at,
            finished_at: None,
            cursor: input.cursor,
            error_message: None,
            stats: None,
            attempt_count: input.attempt_count,
        };
        self.runs.write().unwrap().push(record);
        Ok(RunHandle {
            id,
            attempt_count: input.attempt_count,
        })
    }

    async fn update_run(&self, run_id: &str, update: RunUpdate) -> Result<()> {
        let mut runs = self.runs.write().unwrap();
        if let Some(run) = runs.iter_mut().find(|run| run.id == run_id) {
            run.status = update.status;
            run.finished_at = update.finished_at;
            run.error_message = update.error_message;
            run.cursor = update.cursor;
            run.stats = update.stats;
            run.attempt_count = update.attempt_count;
        }
        Ok(())
    }

    async fn persist_cursor(
        &self,
        connector: &ConnectorConfig,
        cursor: Option<&str>,
    ) -> Result<()> {
        let mut cursors = self.cursors.write().unwrap();
        cursors.insert(cursor_key(connector), cursor.map(str::to_string));
        Ok(())
    }

    async fn list_runs(&self, query: RunQuery) -> Result<Vec<RunRecord>> {
        let runs = self.runs.read().unwrap();
        let matches: Vec<RunRecord> = runs
            .iter()
            .rev()
            .filter(|run| {
                query
                    .connector_id
                    .as_deref()
                    .map(|id| run.connector_id == id)
                    .unwrap_or(true)
            })
            .filter(|run| {
                query
                    .case_ref
                    .as_deref()
                    .map(|case_ref| {
                        run.stats
                            .as_ref()
                            .and_then(|stats| stats.case_refs.as_ref())
                            .map(|refs| refs.iter().any(|r| r == case_ref))
                            .unwrap_or(false)
                    })
                    .unwrap_or(true)
            })
            .take(query.limit)
            .cloned()
            .collect();
        Ok(matches)
    }
}

/// In-memory state store.
pub struct InMemoryStateStore {
    statuses: RwLock<HashMap<String, ConnectorStatus>>,
    cases: RwLock<HashMap<String, StoredCaseRecord>>,
    case_order: RwLock<Vec<String>>,
    audits: RwLock<Vec<AuditEvent>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self {
            statuses: RwLock::new(HashMap::new()),
            cases: RwLock::new(HashMap::new()),
            case_order: RwLock::new(Vec::new()),
            audits: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn status(&self, connector: &ConnectorConfig) -> Result<ConnectorStatus> {
        let statuses = self.statuses.read().unwrap();
        Ok(statuses
            .get(&connector.key.canonical())
            .cloned()
            .unwrap_or_default())
    }

    async fn put_status(
        &self,
        connector: &ConnectorConfig,
        status: ConnectorStatus,
    ) -> Result<()> {
        let mut statuses = self.statuses.write().unwrap();
        statuses.insert(connector.key.canonical(), status);
        Ok(())
    }

    async fn remember_case(&self, record: StoredCaseRecord) -> Result<()> {
        let mut cases = self.cases.write().unwrap();
        if !cases.contains_key(&record.dedupe_key) {
            self.case_order
                .write()
                .unwrap()
                .push(record.dedupe_key.clone());
            cases.insert(record.dedupe_key.clone(), record);
        }
        Ok(())
    }

    async fn find_case(&self, dedupe_key: &str) -> Result<Option<StoredCaseRecord>> {
        let cases = self.cases.read().unwrap();
        Ok(cases.get(dedupe_key).cloned())
    }

    async fn list_cases(&self) -> Result<Vec<StoredCaseRecord>> {
        let cases = self.cases.read().unwrap();
        let order = self.case_order.read().unwrap();
        Ok(order
            .iter()
            .filter_map(|key| cases.get(key).cloned())
            .collect())
    }

    async fn audit(&self, event: AuditEvent) -> Result<()> {
        self.audits.write().unwrap().push(event);
        Ok(())
    }

    async fn list_audits(&self) -> Result<Vec<AuditEvent>> {
        Ok(self.audits.read().unwrap().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ConnectorKey, NormalizedCase, ParsingMode, RunStats, RunStatus,
    };
    use chrono::Utc;

    fn connector() -> ConnectorConfig {
        ConnectorConfig {
            key: ConnectorKey::new("GA", "FULTON"),
            spider_name: "ga_fulton_overages".to_string(),
            watch_urls: vec![],
            schedule_interval_secs: 60,
            parsing_mode: ParsingMode::Normalized,
        }
    }

    fn stored(dedupe_key: &str) -> StoredCaseRecord {
        StoredCaseRecord {
            case_ref: "TS-GA-FULTON-20240101-AAAA00-0".to_string(),
            normalized: NormalizedCase {
                case_ref: "TS-GA-FULTON-20240101-AAAA00-0".to_string(),
                state: "GA".to_string(),
                county_code: "FULTON".to_string(),
                source_system: "test".to_string(),
                filed_at: "2024-01-01".to_string(),
                sale_date: None,
                property_address: None,
                parties: vec![],
                amounts: vec![],
                status: Default::default(),
                metadata: serde_json::Map::new(),
                raw: serde_json::json!({}),
            },
            dedupe_key: dedupe_key.to_string(),
            connector: ConnectorKey::new("GA", "FULTON"),
            property_id: "123".to_string(),
            sale_date: None,
            raw_sha256: "abc".to_string(),
        }
    }

    #[tokio::test]
    async fn remember_case_is_idempotent_per_dedupe_key() {
        let store = InMemoryStateStore::new();
        store.remember_case(stored("K1")).await.unwrap();
        store.remember_case(stored("K1")).await.unwrap();
        store.remember_case(stored("K2")).await.unwrap();

        assert_eq!(store.list_cases().await.unwrap().len(), 2);
        assert!(store.find_case("K1").await.unwrap().is_some());
        assert!(store.find_case("K3").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn run_rows_are_reused_by_update() {
        let store = InMemoryRunStore::new();
        let connector = connector();

        let handle = store
            .create_run(
                &connector,
                NewRun {
                    status: RunStatus::Running,
                    started_at: Utc::now(),
                    cursor: None,
                    attempt_count: 1,
                },
            )
            .await
            .unwrap();

        store
            .update_run(
                &handle.id,
                RunUpdate {
                    status: RunStatus::Success,
                    finished_at: Some(Utc::now()),
                    error_message: None,
                    cursor: Some("cursor-1".to_string()),
                    stats: Some(RunStats {
                        extracted: 1,
                        created: 1,
                        failures: 0,
                        job_id: Some("job-1".to_string()),
                        case_refs: Some(vec!["TS-GA-FULTON-20240101-AAAA00-0".to_string()]),
                    }),
                    attempt_count: 2,
                },
            )
            .await
            .unwrap();

        let runs = store.list_runs(RunQuery::default()).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Success);
        assert_eq!(runs[0].attempt_count, 2);

        let by_ref = store
            .list_runs(RunQuery {
                case_ref: Some("TS-GA-FULTON-20240101-AAAA00-0".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_ref.len(), 1);

        let miss = store
            .list_runs(RunQuery {
                case_ref: Some("TS-TX-HARRIS-20240101-AAAA00-0".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(miss.is_empty());
    }

    #[tokio::test]
    async fn persisted_cursor_round_trips() {
        let store = InMemoryRunStore::new();
        let connector = connector();

        assert_eq!(store.latest_cursor(&connector).await.unwrap(), None);
        store
            .persist_cursor(&connector, Some("cursor-9"))
            .await
            .unwrap();
        assert_eq!(
            store.latest_cursor(&connector).await.unwrap(),
            Some("cursor-9".to_string())
        );
        store.persist_cursor(&connector, None).await.unwrap();
        assert_eq!(store.latest_cursor(&connector).await.unwrap(), None);
    }
}
