//! Batch ingestion.
//!
//! Turns a batch of raw scraped items into remembered canonical case
//! records. Items are processed independently: a bad item is captured as a
//! failure and never stops its siblings. The returned cursor is the last
//! cursor seen across processed items (created or skipped); the caller
//! decides whether it may be persisted.

use std::sync::Arc;

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use sha2::{Digest, Sha256};

use surplus_harvest_core::caseref::generate_case_ref;
use surplus_harvest_core::jurisdiction::JurisdictionGate;
use surplus_harvest_core::models::{
    ConnectorConfig, NormalizedCase, NormalizedCaseDraft, ScrapedItem, StoredCaseRecord,
};
use surplus_harvest_core::store::StateStore;
use surplus_harvest_core::validate::{is_iso_date, validate_normalized_case};

/// One item the batch could not ingest, with a human-readable reason.
#[derive(Debug, Clone)]
pub struct ItemFailure {
    pub property_id: String,
    pub reason: String,
}

/// Result of one `ingest_batch` call.
#[derive(Debug, Clone, Default)]
pub struct IngestionOutcome {
    pub created: Vec<StoredCaseRecord>,
    pub skipped: Vec<StoredCaseRecord>,
    pub failures: Vec<ItemFailure>,
    /// Last cursor carried by any processed item; `None` when no item had
    /// one.
    pub cursor: Option<String>,
}

pub struct CaseIngestionService {
    state: Arc<dyn StateStore>,
    gate: Arc<dyn JurisdictionGate>,
}

fn sha256_hex(value: &serde_json::Value) -> String {
    let body = serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string());
    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn dedupe_key(item: &ScrapedItem, raw_sha: &str) -> String {
    format!(
        "{}-{}-{}-{}-{}",
        item.state.to_uppercase(),
        item.county_code.to_uppercase(),
        item.property_id,
        item.sale_date.as_deref().unwrap_or("UNKNOWN"),
        raw_sha
    )
}

fn today_iso() -> String {
    Utc::now().date_naive().format("%Y-%m-%d").to_string()
}

impl CaseIngestionService {
    pub fn new(state: Arc<dyn StateStore>, gate: Arc<dyn JurisdictionGate>) -> Self {
        Self { state, gate }
    }

    /// Assemble the canonical payload for one item, filling gaps in any
    /// job-supplied draft from the item and the connector.
    fn build_normalized_case(
        &self,
        connector: &ConnectorConfig,
        item: &ScrapedItem,
    ) -> Result<NormalizedCase, String> {
        let draft: NormalizedCaseDraft = item.normalized.clone().unwrap_or_default();

        let case_ref = match draft.case_ref {
            Some(case_ref) => case_ref,
            None => {
                let date = match &item.sale_date {
                    Some(sale_date) if is_iso_date(sale_date) => {
                        NaiveDate::parse_from_str(sale_date, "%Y-%m-%d")
                            .map_err(|_| format!("invalid sale date '{}'", sale_date))?
                    }
                    Some(sale_date) => {
                        return Err(format!("invalid sale date '{}'", sale_date));
                    }
                    None => Utc::now().date_naive(),
                };
                generate_case_ref(&item.state, &item.county_code, date)
            }
        };

        let filed_at = draft
            .filed_at
            .or_else(|| item.sale_date.clone())
            .unwrap_or_else(today_iso);

        let mut metadata = draft.metadata.unwrap_or_default();
        metadata.insert(
            "property_id".to_string(),
            serde_json::Value::String(item.property_id.clone()),
        );

        Ok(NormalizedCase {
            case_ref,
            state: item.state.clone(),
            county_code: item.county_code.clone(),
            source_system: draft
                .source_system
                .unwrap_or_else(|| connector.spider_name.clone()),
            filed_at,
            sale_date: draft.sale_date.or_else(|| item.sale_date.clone()),
            property_address: draft.property_address,
            parties: draft.parties.unwrap_or_default(),
            amounts: draft.amounts.unwrap_or_default(),
            status: draft.status.unwrap_or_default(),
            metadata,
            raw: item.raw.clone(),
        })
    }

    /// Validate and normalize one new (not-yet-seen) item.
    fn prepare_record(
        &self,
        connector: &ConnectorConfig,
        item: &ScrapedItem,
        raw_sha: &str,
        dedupe_key: &str,
    ) -> Result<StoredCaseRecord, String> {
        let normalized = self.build_normalized_case(connector, item)?;

        if !self.gate.is_enabled(&item.state, &item.county_code) {
            return Err(format!(
                "jurisdiction {}/{} is not enabled for ingestion",
                item.state.to_uppercase(),
                item.county_code.to_uppercase()
            ));
        }

        validate_normalized_case(&normalized)?;

        Ok(StoredCaseRecord {
            case_ref: normalized.case_ref.clone(),
            sale_date: normalized.sale_date.clone(),
            normalized,
            dedupe_key: dedupe_key.to_string(),
            connector: connector.key.clone(),
            property_id: item.property_id.clone(),
            raw_sha256: raw_sha.to_string(),
        })
    }

    /// Ingest a batch. Store access failures propagate as errors; per-item
    /// validation problems land in `failures` and never abort the batch.
    pub async fn ingest_batch(
        &self,
        connector: &ConnectorConfig,
        items: &[ScrapedItem],
    ) -> Result<IngestionOutcome> {
        let mut outcome = IngestionOutcome::default();

        for item in items {
            let raw_sha = item
                .raw_sha256
                .clone()
                .unwrap_or_else(|| sha256_hex(&item.raw));
            let key = dedupe_key(item, &raw_sha);

            if let Some(existing) = self.state.find_case(&key).await? {
                outcome.skipped.push(existing);
                if item.cursor.is_some() {
                    outcome.cursor = item.cursor.clone();
                }
                continue;
            }

            match self.prepare_record(connector, item, &raw_sha, &key) {
                Ok(record) => {
                    self.state.remember_case(record.clone()).await?;
                    outcome.created.push(record);
                    if item.cursor.is_some() {
                        outcome.cursor = item.cursor.clone();
                    }
                }
                Err(reason) => {
                    tracing::debug!(
                        property_id = %item.property_id,
                        %reason,
                        "item failed ingestion"
                    );
                    outcome.failures.push(ItemFailure {
                        property_id: item.property_id.clone(),
                        reason,
                    });
                }
            }
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(property_id: &str) -> ScrapedItem {
        ScrapedItem {
            state: "GA".to_string(),
            county_code: "FULTON".to_string(),
            property_id: property_id.to_string(),
            sale_date: Some("2024-01-01".to_string()),
            raw: serde_json::json!({ "property_id": property_id }),
            normalized: None,
            raw_sha256: None,
            cursor: None,
        }
    }

    #[test]
    fn dedupe_key_uppercases_jurisdiction_and_defaults_sale_date() {
        let mut it = item("123");
        it.state = "ga".to_string();
        it.county_code = "fulton".to_string();
        assert_eq!(dedupe_key(&it, "abc"), "GA-FULTON-123-2024-01-01-abc");

        it.sale_date = None;
        assert_eq!(dedupe_key(&it, "abc"), "GA-FULTON-123-UNKNOWN-abc");
    }

    #[test]
    fn raw_hash_is_stable_for_equal_payloads() {
        let a = item("123");
        let b = item("123");
        assert_eq!(sha256_hex(&a.raw), sha256_hex(&b.raw));
        assert_ne!(sha256_hex(&a.raw), sha256_hex(&item("124").raw));
    }
}
