//! Canonical case schema validation.
//!
//! Checks a [`NormalizedCase`] against the contract the downstream
//! case-management consumer expects. Violations are reported as a single
//! human-readable reason string so the ingestion service can record them
//! as per-item failures.

use chrono::NaiveDate;

use crate::caseref::validate_case_ref;
use crate::models::{Address, NormalizedCase};

/// Whether a string is a zero-padded `YYYY-MM-DD` calendar date.
pub fn is_iso_date(value: &str) -> bool {
    value.len() == 10 && NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
}

fn check_address(address: &Address, issues: &mut Vec<String>) {
    if address.line1.trim().is_empty() {
        issues.push("property_address.line1 must not be empty".to_string());
    }
    if address.city.trim().is_empty() {
        issues.push("property_address.city must not be empty".to_string());
    }
    if address.state.len() != 2 {
        issues.push("property_address.state must be a two-letter code".to_string());
    }
    if !(2..=12).contains(&address.county_code.len()) {
        issues.push("property_address.county_code must be 2-12 characters".to_string());
    }
    if let Some(zip) = &address.postal_code {
        let ok = match zip.len() {
            5 => zip.chars().all(|c| c.is_ascii_digit()),
            10 => {
                zip.as_bytes()[5] == b'-'
                    && zip[..5].chars().all(|c| c.is_ascii_digit())
                    && zip[6..].chars().all(|c| c.is_ascii_digit())
            }
            _ => false,
        };
        if !ok {
            issues.push(format!("property_address.postal_code '{}' is not a ZIP code", zip));
        }
    }
}

/// Validate a canonical case payload.
///
/// Returns `Err` with every violation joined into one reason string; the
/// payload must not be remembered or counted as created when this fails.
pub fn validate_normalized_case(case: &NormalizedCase) -> Result<(), String> {
    let mut issues = Vec::new();

    if !validate_case_ref(&case.case_ref) {
        issues.push(format!("invalid case reference '{}'", case.case_ref));
    }
    if case.state.len() != 2 {
        issues.push("state must be a two-letter code".to_string());
    }
    if !(2..=12).contains(&case.county_code.len()) {
        issues.push("county_code must be 2-12 characters".to_string());
    }
    if case.source_system.trim().is_empty() {
        issues.push("source_system must not be empty".to_string());
    }
    if !is_iso_date(&case.filed_at) {
        issues.push(format!("filed_at '{}' is not a YYYY-MM-DD date", case.filed_at));
    }
    if let Some(sale_date) = &case.sale_date {
        if !is_iso_date(sale_date) {
            issues.push(format!("sale_date '{}' is not a YYYY-MM-DD date", sale_date));
        }
    }
    if let Some(address) = &case.property_address {
        check_address(address, &mut issues);
    }
    for (i, party) in case.parties.iter().enumerate() {
        if party.name.trim().is_empty() {
            issues.push(format!("parties[{}].name must not be empty", i));
        }
    }
    for (i, amount) in case.amounts.iter().enumerate() {
        if amount.kind.trim().is_empty() {
            issues.push(format!("amounts[{}].type must not be empty", i));
        }
        if !amount.amount.is_finite() || amount.amount < 0.0 {
            issues.push(format!("amounts[{}].amount must be non-negative", i));
        }
        if amount.currency.len() != 3 {
            issues.push(format!("amounts[{}].currency must be a 3-letter code", i));
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(issues.join("; "))
    }
}
