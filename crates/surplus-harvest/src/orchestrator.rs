//! Connector run orchestration.
//!
//! Ties the registry, job client, ingestion service, and stores together.
//! One `run_connector` invocation is a small state machine:
//!
//! ```text
//!   latest cursor ──▶ run row (new or reused) ──▶ schedule + fetch
//!        │                                              │
//!        │                                        ingest_batch
//!        │                                              │
//!        │              ┌───────────────────────────────┤
//!        │              ▼                               ▼
//!        │        all items ok                    any item failed
//!        │        persist cursor                  keep old cursor
//!        └──────▶ run SUCCESS                     run FAILED + error
//! ```
//!
//! A failed batch withholds the cursor so the next attempt replays from
//! the previous resume point; records created before the failure stay in
//! the dedupe cache, so the replay skips them instead of recreating them.

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use serde_json::json;
use thiserror::Error;

use surplus_harvest_core::jobs::{JobClient, JobSettings};
use surplus_harvest_core::jurisdiction::JurisdictionGate;
use surplus_harvest_core::models::{
    AuditEvent, AuditEventKind, ConnectorConfig, ConnectorKey, ConnectorStatus, RunAttempt,
    RunCycleContext, RunStats, RunStatus,
};
use surplus_harvest_core::store::{NewRun, RunHandle, RunStore, RunUpdate, StateStore};

use crate::config::RetryConfig;
use crate::ingest::{CaseIngestionService, ItemFailure};
use crate::registry::ConnectorRegistry;

/// Terminal outcome of one successful connector run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub connector: ConnectorKey,
    pub job_id: String,
    pub run_id: String,
    pub attempt_count: u32,
    pub extracted: u64,
    pub created: u64,
}

/// Payload of a run rejected for per-item ingestion failures. The cursor
/// recorded here is the resume point the run rolled back to.
#[derive(Debug)]
pub struct IngestionFailure {
    pub connector: ConnectorKey,
    pub job_id: String,
    pub cursor: Option<String>,
    pub extracted: u64,
    pub created: u64,
    pub failures: Vec<ItemFailure>,
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("ingestion failures")]
    Ingestion(IngestionFailure),
}

pub struct Orchestrator {
    registry: Arc<ConnectorRegistry>,
    state: Arc<dyn StateStore>,
    runs: Arc<dyn RunStore>,
    jobs: Arc<dyn JobClient>,
    ingestion: CaseIngestionService,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<ConnectorRegistry>,
        state: Arc<dyn StateStore>,
        runs: Arc<dyn RunStore>,
        jobs: Arc<dyn JobClient>,
        gate: Arc<dyn JurisdictionGate>,
    ) -> Self {
        let ingestion = CaseIngestionService::new(state.clone(), gate);
        Self {
            registry,
            state,
            runs,
            jobs,
            ingestion,
        }
    }

    pub fn registry(&self) -> &ConnectorRegistry {
        &self.registry
    }

    pub fn state(&self) -> &Arc<dyn StateStore> {
        &self.state
    }

    pub fn runs(&self) -> &Arc<dyn RunStore> {
        &self.runs
    }

    /// Audit is fire-and-forget: a sink failure is logged, never allowed
    /// to affect run control flow.
    async fn audit(
        &self,
        connector: &ConnectorConfig,
        event: AuditEventKind,
        payload: serde_json::Value,
    ) {
        let result = self
            .state
            .audit(AuditEvent {
                event,
                at: Utc::now(),
                connector: connector.key.clone(),
                payload,
            })
            .await;
        if let Err(error) = result {
            tracing::warn!(
                connector = %connector.key.canonical(),
                %error,
                "audit sink rejected event"
            );
        }
    }

    /// Run a single connector with no prior attempt context.
    pub async fn run_connector(&self, connector: &ConnectorConfig) -> Result<RunOutcome> {
        let mut ctx = RunCycleContext::new();
        self.run_connector_with_context(connector, &mut ctx).await
    }

    /// Run a single connector, reusing the run row recorded in `ctx` by an
    /// earlier attempt of the same cycle. The context entry is written as
    /// soon as the run row exists, so it survives any later failure.
    pub async fn run_connector_with_context(
        &self,
        connector: &ConnectorConfig,
        ctx: &mut RunCycleContext,
    ) -> Result<RunOutcome> {
        let started_at = Utc::now();
        let canonical = connector.key.canonical();
        let previous_cursor = self.runs.latest_cursor(connector).await?;

        self.audit(
            connector,
            AuditEventKind::ConnectorRunStarted,
            json!({ "cursor": previous_cursor }),
        )
        .await;

        let handle = match ctx.get(&canonical) {
            None => {
                self.runs
                    .create_run(
                        connector,
                        NewRun {
                            status: RunStatus::Running,
                            started_at,
                            cursor: previous_cursor.clone(),
                            attempt_count: 1,
                        },
                    )
                    .await?
            }
            Some(prior) => {
                let attempt_count = prior.attempt_count + 1;
                self.runs
                    .update_run(
                        &prior.run_id,
                        RunUpdate {
                            status: RunStatus::Running,
                            finished_at: None,
                            error_message: None,
                            cursor: previous_cursor.clone(),
                            stats: None,
                            attempt_count,
                        },
                    )
                    .await?;
                RunHandle {
                    id: prior.run_id.clone(),
                    attempt_count,
                }
            }
        };
        ctx.insert(
            canonical.clone(),
            RunAttempt {
                run_id: handle.id.clone(),
                attempt_count: handle.attempt_count,
            },
        );

        tracing::info!(
            connector = %canonical,
            run_id = %handle.id,
            attempt = handle.attempt_count,
            cursor = previous_cursor.as_deref().unwrap_or("-"),
            "connector run started"
        );

        let settings = JobSettings {
            cursor: previous_cursor.clone(),
            extra: Vec::new(),
        };
        let job_id = match self.jobs.schedule_job(&connector.spider_name, &settings).await {
            Ok(job_id) => job_id,
            Err(error) => {
                return self
                    .host_failure(connector, &handle, &previous_cursor, error.into())
                    .await;
            }
        };

        let items = match self.jobs.fetch_items(&job_id).await {
            Ok(items) => items,
            Err(error) => {
                return self
                    .host_failure(connector, &handle, &previous_cursor, error.into())
                    .await;
            }
        };

        let extracted = items.len() as u64;
        let ingestion = self.ingestion.ingest_batch(connector, &items).await?;
        let cursor = ingestion.cursor.clone().or_else(|| previous_cursor.clone());
        let created_refs: Vec<String> = ingestion
            .created
            .iter()
            .map(|record| record.case_ref.clone())
            .collect();

        if !ingestion.failures.is_empty() {
            let stats = RunStats {
                extracted,
                created: ingestion.created.len() as u64,
                failures: ingestion.failures.len() as u64,
                job_id: Some(job_id.clone()),
                case_refs: (!created_refs.is_empty()).then(|| created_refs.clone()),
            };

            // The cursor is withheld: the run must be replayable from the
            // previous resume point. Created records stay in the dedupe
            // cache, so the replay skips them.
            self.runs
                .update_run(
                    &handle.id,
                    RunUpdate {
                        status: RunStatus::Failed,
                        finished_at: Some(Utc::now()),
                        error_message: Some("ingestion failures".to_string()),
                        cursor: previous_cursor.clone(),
                        stats: Some(stats.clone()),
                        attempt_count: handle.attempt_count,
                    },
                )
                .await?;

            self.state
                .put_status(
                    connector,
                    ConnectorStatus {
                        last_run: Some(started_at),
                        last_cursor: previous_cursor.clone(),
                        last_job_id: Some(job_id.clone()),
                        extracted,
                        created: stats.created,
                        failures: stats.failures,
                        last_error: Some("ingestion failures".to_string()),
                    },
                )
                .await?;

            self.audit(
                connector,
                AuditEventKind::ConnectorRunFinished,
                json!({
                    "job_id": job_id,
                    "extracted": extracted,
                    "created": stats.created,
                    "failures": stats.failures,
                    "error": "ingestion failures",
                }),
            )
            .await;

            tracing::warn!(
                connector = %canonical,
                job_id = %job_id,
                failures = stats.failures,
                "connector run rejected"
            );

            return Err(OrchestratorError::Ingestion(IngestionFailure {
                connector: connector.key.clone(),
                job_id,
                cursor,
                extracted,
                created: stats.created,
                failures: ingestion.failures,
            })
            .into());
        }

        let stats = RunStats {
            extracted,
            created: ingestion.created.len() as u64,
            failures: 0,
            job_id: Some(job_id.clone()),
            case_refs: (!created_refs.is_empty()).then(|| created_refs.clone()),
        };

        self.runs
            .persist_cursor(connector, cursor.as_deref())
            .await?;
        self.runs
            .update_run(
                &handle.id,
                RunUpdate {
                    status: RunStatus::Success,
                    finished_at: Some(Utc::now()),
                    error_message: None,
                    cursor: cursor.clone(),
                    stats: Some(stats.clone()),
                    attempt_count: handle.attempt_count,
                },
            )
            .await?;
        self.state
            .put_status(
                connector,
                ConnectorStatus {
                    last_run: Some(started_at),
                    last_cursor: cursor.clone(),
                    last_job_id: Some(job_id.clone()),
                    extracted,
                    created: stats.created,
                    failures: 0,
                    last_error: None,
                },
            )
            .await?;

        self.audit(
            connector,
            AuditEventKind::ConnectorRunFinished,
            json!({
                "job_id": job_id,
                "extracted": extracted,
                "created": stats.created,
                "failures": 0,
            }),
        )
        .await;

        if !created_refs.is_empty() {
            self.audit(
                connector,
                AuditEventKind::CasesCreated,
                json!({
                    "job_id": job_id,
                    "case_refs": created_refs,
                    "count": created_refs.len(),
                }),
            )
            .await;
        }

        tracing::info!(
            connector = %canonical,
            job_id = %job_id,
            extracted,
            created = stats.created,
            "connector run finished"
        );

        Ok(RunOutcome {
            connector: connector.key.clone(),
            job_id,
            run_id: handle.id,
            attempt_count: handle.attempt_count,
            extracted,
            created: stats.created,
        })
    }

    /// Scheduling or item fetch failed: mark the run failed, leave the
    /// cursor untouched, and surface the transport error.
    async fn host_failure(
        &self,
        connector: &ConnectorConfig,
        handle: &RunHandle,
        previous_cursor: &Option<String>,
        error: anyhow::Error,
    ) -> Result<RunOutcome> {
        let message = error.to_string();

        self.runs
            .update_run(
                &handle.id,
                RunUpdate {
                    status: RunStatus::Failed,
                    finished_at: Some(Utc::now()),
                    error_message: Some(message.clone()),
                    cursor: previous_cursor.clone(),
                    stats: None,
                    attempt_count: handle.attempt_count,
                },
            )
            .await?;

        let mut status = self.state.status(connector).await?;
        status.last_run = Some(Utc::now());
        status.extracted = 0;
        status.created = 0;
        status.failures = 1;
        status.last_error = Some(message.clone());
        self.state.put_status(connector, status).await?;

        self.audit(
            connector,
            AuditEventKind::ConnectorRunFinished,
            json!({ "error": message }),
        )
        .await;

        tracing::error!(
            connector = %connector.key.canonical(),
            %message,
            "connector run failed at the job host"
        );

        Err(error)
    }

    /// One cycle: every registered connector, sequentially, in canonical
    /// key order. The first error aborts the cycle; `ctx` keeps the run
    /// rows of every attempted connector so a retry resumes instead of
    /// starting over.
    pub async fn run_all_connectors(
        &self,
        ctx: &mut RunCycleContext,
    ) -> Result<Vec<RunOutcome>> {
        let mut outcomes = Vec::new();
        for connector in self.registry.list() {
            let outcome = self.run_connector_with_context(connector, ctx).await?;
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// Retry a whole cycle with exponential backoff, waiting
    /// `base_delay_ms * 2^(attempt-1)` between attempts via the injected
    /// `wait` function. The context map is shared across attempts, so
    /// connectors keep their run row and `attempt_count` climbs instead of
    /// new rows appearing.
    pub async fn run_all_connectors_with_retry<F, Fut>(
        &self,
        retry: RetryConfig,
        wait: F,
    ) -> Result<Vec<RunOutcome>>
    where
        F: Fn(u64) -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut ctx = RunCycleContext::new();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            match self.run_all_connectors(&mut ctx).await {
                Ok(outcomes) => return Ok(outcomes),
                Err(error) => {
                    if attempt >= retry.max_attempts {
                        return Err(error);
                    }
                    let delay = retry
                        .base_delay_ms
                        .saturating_mul(1u64 << (attempt - 1).min(63));
                    tracing::warn!(
                        attempt,
                        delay_ms = delay,
                        error = %error,
                        "cycle failed; backing off before retry"
                    );
                    wait(delay).await;
                }
            }
        }
    }

    /// Cycle retry with real sleeping between attempts.
    pub async fn run_all_connectors_with_backoff(
        &self,
        retry: RetryConfig,
    ) -> Result<Vec<RunOutcome>> {
        self.run_all_connectors_with_retry(retry, |ms| {
            tokio::time::sleep(std::time::Duration::from_millis(ms))
        })
        .await
    }

    /// Aggregated status of every registered connector, for operator
    /// listings.
    pub async fn statuses(&self) -> Result<Vec<(ConnectorConfig, ConnectorStatus)>> {
        let mut result = Vec::new();
        for connector in self.registry.list() {
            let status = self.state.status(connector).await?;
            result.push((connector.clone(), status));
        }
        Ok(result)
    }
}
