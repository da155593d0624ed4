//! Jurisdiction enablement gate.
//!
//! Ingestion consults the gate per item: a disabled jurisdiction turns the
//! item into a captured validation failure rather than a created case.
//! Flags can flip at runtime, so enablement may change between items of
//! the same cycle.

use std::collections::HashMap;
use std::sync::RwLock;

/// Collaborator check: is a jurisdiction currently accepting ingestion?
pub trait JurisdictionGate: Send + Sync {
    fn is_enabled(&self, state: &str, county_code: &str) -> bool;
}

fn flag_key(state: &str, county_code: &str) -> String {
    format!("{}-{}", state.to_uppercase(), county_code.to_uppercase())
}

/// Flag-map gate with a configurable default for jurisdictions that have
/// no explicit entry.
pub struct JurisdictionSet {
    flags: RwLock<HashMap<String, bool>>,
    default_enabled: bool,
}

impl JurisdictionSet {
    /// A gate that admits every jurisdiction until told otherwise. Used
    /// when no enablement entries are configured.
    pub fn permissive() -> Self {
        Self {
            flags: RwLock::new(HashMap::new()),
            default_enabled: true,
        }
    }

    /// A gate seeded from explicit flags; jurisdictions without an entry
    /// are disabled.
    pub fn from_flags<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, String, bool)>,
    {
        let flags = entries
            .into_iter()
            .map(|(state, county, enabled)| (flag_key(&state, &county), enabled))
            .collect();
        Self {
            flags: RwLock::new(flags),
            default_enabled: false,
        }
    }

    /// Flip one jurisdiction's flag at runtime.
    pub fn set_enabled(&self, state: &str, county_code: &str, enabled: bool) {
        let mut flags = self.flags.write().unwrap();
        flags.insert(flag_key(state, county_code), enabled);
    }
}

impl JurisdictionGate for JurisdictionSet {
    fn is_enabled(&self, state: &str, county_code: &str) -> bool {
        let flags = self.flags.read().unwrap();
        flags
            .get(&flag_key(state, county_code))
            .copied()
            .unwrap_or(self.default_enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permissive_gate_admits_unknown_jurisdictions() {
        let gate = JurisdictionSet::permissive();
        assert!(gate.is_enabled("ga", "fulton"));
        assert!(gate.is_enabled("TX", "HARRIS"));
    }

    #[test]
    fn explicit_flags_are_authoritative() {
        let gate = JurisdictionSet::from_flags(vec![
            ("GA".to_string(), "FULTON".to_string(), true),
            ("TX".to_string(), "HARRIS".to_string(), false),
        ]);
        assert!(gate.is_enabled("ga", "fulton"));
        assert!(!gate.is_enabled("TX", "HARRIS"));
        assert!(!gate.is_enabled("AZ", "MARICOPA"));
    }

    #[test]
    fn flags_can_flip_mid_stream() {
        let gate = JurisdictionSet::permissive();
        assert!(gate.is_enabled("GA", "FULTON"));
        gate.set_enabled("GA", "FULTON", false);
        assert!(!gate.is_enabled("GA", "FULTON"));
        assert!(gate.is_enabled("TX", "HARRIS"));
    }
}
