//! Canonical case-reference format.
//!
//! A case reference looks like `TS-GA-FULTON-20240101-AB12C3-7`:
//! prefix, two-letter state, county code, sale/filing date, a six-character
//! random block, and a single check digit computed over everything before
//! it. Downstream systems treat the string as opaque; this module owns
//! generation and verification.

use std::sync::Mutex;

use anyhow::{bail, Result};
use chrono::{NaiveDate, Utc};
use uuid::Uuid;

const PREFIX: &str = "TS";
const RAND_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const CHECKSUM_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const COUNTER_BASE: u64 = 36;
// Two base-36 digits of collision counter per millisecond.
const COUNTER_MODULO: u64 = COUNTER_BASE * COUNTER_BASE;

/// Parsed components of a valid case reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseRefParts {
    pub state: String,
    pub county_code: String,
    pub date: String,
    pub random: String,
    pub check_digit: char,
}

fn char_value(c: char) -> u64 {
    match c {
        '0'..='9' => c as u64 - '0' as u64,
        'A'..='Z' => c as u64 - 'A' as u64 + 10,
        _ => 0,
    }
}

fn compute_check_digit(body: &str) -> char {
    let mut acc: u64 = 0;
    for c in body.chars().filter(|c| *c != '-') {
        let c = c.to_ascii_uppercase();
        acc = (acc * 31 + char_value(c)) % CHECKSUM_ALPHABET.len() as u64;
    }
    CHECKSUM_ALPHABET[acc as usize] as char
}

fn random_block(length: usize) -> String {
    let bytes = Uuid::new_v4().into_bytes();
    bytes
        .iter()
        .take(length)
        .map(|b| RAND_ALPHABET[(*b as usize) % RAND_ALPHABET.len()] as char)
        .collect()
}

static SEQ: Mutex<(i64, u64)> = Mutex::new((0, 0));

/// Four random characters plus a two-digit base-36 counter that only
/// repeats if more than 1296 references are minted in one millisecond.
fn unique_random_block() -> String {
    let now_ms = Utc::now().timestamp_millis();
    let counter = {
        let mut seq = SEQ.lock().expect("case ref sequence lock poisoned");
        if seq.0 == now_ms {
            seq.1 = (seq.1 + 1) % COUNTER_MODULO;
        } else {
            *seq = (now_ms, 0);
        }
        seq.1
    };

    let hi = CHECKSUM_ALPHABET[(counter / COUNTER_BASE) as usize] as char;
    let lo = CHECKSUM_ALPHABET[(counter % COUNTER_BASE) as usize] as char;
    format!("{}{}{}", random_block(4), hi, lo)
}

/// Mint a fresh case reference for a jurisdiction and date.
pub fn generate_case_ref(state: &str, county_code: &str, date: NaiveDate) -> String {
    let state = state.to_uppercase();
    let county_code = county_code.to_uppercase();
    let date = date.format("%Y%m%d");
    let base = format!(
        "{}-{}-{}-{}-{}",
        PREFIX,
        state,
        county_code,
        date,
        unique_random_block()
    );
    let check = compute_check_digit(&base);
    format!("{}-{}", base, check)
}

fn split_parts(case_ref: &str) -> Option<CaseRefParts> {
    let segments: Vec<&str> = case_ref.split('-').collect();
    if segments.len() != 6 || segments[0] != PREFIX {
        return None;
    }

    let (state, county, date, random, check) = (
        segments[1],
        segments[2],
        segments[3],
        segments[4],
        segments[5],
    );

    let alnum = |s: &str| s.chars().all(|c| c.is_ascii_alphanumeric() && !c.is_ascii_lowercase());
    if state.len() != 2 || !state.chars().all(|c| c.is_ascii_uppercase()) {
        return None;
    }
    if !(3..=8).contains(&county.len()) || !alnum(county) {
        return None;
    }
    if date.len() != 8 || !date.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if random.len() != 6 || !alnum(random) {
        return None;
    }
    if check.len() != 1 || !alnum(check) {
        return None;
    }

    Some(CaseRefParts {
        state: state.to_string(),
        county_code: county.to_string(),
        date: date.to_string(),
        random: random.to_string(),
        check_digit: check.chars().next().unwrap(),
    })
}

/// Whether a string is a well-formed case reference with a correct check
/// digit.
pub fn validate_case_ref(case_ref: &str) -> bool {
    let parts = match split_parts(case_ref) {
        Some(parts) => parts,
        None => return false,
    };

    // Body is everything before the trailing "-<check>".
    let body = &case_ref[..case_ref.len() - 2];
    compute_check_digit(body) == parts.check_digit
}

/// Parse a case reference into its components, verifying the check digit.
pub fn parse_case_ref(case_ref: &str) -> Result<CaseRefParts> {
    let parts = match split_parts(case_ref) {
        Some(parts) => parts,
        None => bail!("case reference is not in the expected format"),
    };

    let body = &case_ref[..case_ref.len() - 2];
    if compute_check_digit(body) != parts.check_digit {
        bail!("invalid check digit");
    }

    Ok(parts)
}

/// Scan free text for the first valid case reference, uppercasing
/// candidates before verification.
pub fn extract_case_ref_from_text(text: &str) -> Option<String> {
    let upper = text.to_uppercase();
    let bytes = upper.as_bytes();
    let mut start = 0;

    while let Some(pos) = upper[start..].find("TS-") {
        let begin = start + pos;
        let end = upper[begin..]
            .find(|c: char| !c.is_ascii_alphanumeric() && c != '-')
            .map(|offset| begin + offset)
            .unwrap_or(bytes.len());

        let candidate = &upper[begin..end];
        if validate_case_ref(candidate) {
            return Some(candidate.to_string());
        }
        start = begin + 3;
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn generated_refs_validate() {
        let case_ref = generate_case_ref("ga", "fulton", date(2024, 1, 1));
        assert!(case_ref.starts_with("TS-GA-FULTON-20240101-"));
        assert!(validate_case_ref(&case_ref));
    }

    #[test]
    fn generated_refs_are_unique() {
        let a = generate_case_ref("TX", "HARRIS", date(2024, 6, 1));
        let b = generate_case_ref("TX", "HARRIS", date(2024, 6, 1));
        assert_ne!(a, b);
    }

    #[test]
    fn parse_returns_components() {
        let case_ref = generate_case_ref("AZ", "MARICOPA", date(2023, 12, 31));
        let parts = parse_case_ref(&case_ref).unwrap();
        assert_eq!(parts.state, "AZ");
        assert_eq!(parts.county_code, "MARICOPA");
        assert_eq!(parts.date, "20231231");
        assert_eq!(parts.random.len(), 6);
    }

    #[test]
    fn tampered_check_digit_is_rejected() {
        let case_ref = generate_case_ref("GA", "FULTON", date(2024, 1, 1));
        let check = case_ref.chars().last().unwrap();
        let swapped = if check == '0' { '1' } else { '0' };
        let mut tampered = case_ref[..case_ref.len() - 1].to_string();
        tampered.push(swapped);
        assert!(!validate_case_ref(&tampered));
        assert!(parse_case_ref(&tampered).is_err());
    }

    #[test]
    fn malformed_refs_are_rejected() {
        assert!(!validate_case_ref("INVALID-REFERENCE"));
        assert!(!validate_case_ref("TS-G-FULTON-20240101-ABCDEF-0"));
        assert!(!validate_case_ref("TS-GA-FULTON-2024010-ABCDEF-0"));
        assert!(!validate_case_ref(""));
    }

    #[test]
    fn extracts_ref_from_surrounding_text() {
        let case_ref = generate_case_ref("GA", "FULTON", date(2024, 1, 1));
        let text = format!("re: your claim ({}) from January.", case_ref.to_lowercase());
        assert_eq!(extract_case_ref_from_text(&text), Some(case_ref));
        assert_eq!(extract_case_ref_from_text("no reference here"), None);
        assert_eq!(extract_case_ref_from_text("TS-XX-BOGUS-00000000-AAAAAA-0"), None);
    }
}
