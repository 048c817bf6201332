//! Transition detection
//!
//! Classifies a fresh throttle flag against the ledger's recorded flag.
//! Pure and deterministic: the same `(entry, observed)` pair always yields
//! the same answer, and nothing is mutated.

use crate::traits::LedgerEntry;

/// Outcome of comparing an observation with the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detection {
    /// The resource has no ledger entry yet
    FirstObservation,
    /// The throttle flag differs from the recorded one
    Transition {
        /// Recorded flag
        from: bool,
        /// Observed flag
        to: bool,
    },
    /// The throttle flag matches the recorded one
    NoChange,
}

impl Detection {
    /// Whether this outcome requires a ledger mutation and side effects
    pub fn is_actionable(&self) -> bool {
        !matches!(self, Detection::NoChange)
    }
}

/// Classify an observed throttle flag against a ledger entry
pub fn detect(entry: Option<&LedgerEntry>, observed_throttled: bool) -> Detection {
    match entry {
        None => Detection::FirstObservation,
        Some(entry) if entry.current_throttled != observed_throttled => Detection::Transition {
            from: entry.current_throttled,
            to: observed_throttled,
        },
        Some(_) => Detection::NoChange,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn absent_entry_is_first_observation() {
        assert_eq!(detect(None, false), Detection::FirstObservation);
        assert_eq!(detect(None, true), Detection::FirstObservation);
    }

    #[test]
    fn flag_change_is_transition() {
        let entry = LedgerEntry::baseline("srv", false, Utc::now());
        assert_eq!(
            detect(Some(&entry), true),
            Detection::Transition { from: false, to: true }
        );

        let entry = LedgerEntry::baseline("srv", true, Utc::now());
        assert_eq!(
            detect(Some(&entry), false),
            Detection::Transition { from: true, to: false }
        );
    }

    #[test]
    fn same_flag_is_no_change() {
        let entry = LedgerEntry::baseline("srv", true, Utc::now());
        assert_eq!(detect(Some(&entry), true), Detection::NoChange);
        assert!(!detect(Some(&entry), true).is_actionable());
    }

    #[test]
    fn repeated_detection_after_apply_is_no_change() {
        let now = Utc::now();
        let mut entry = LedgerEntry::baseline("srv", false, now);

        let first = detect(Some(&entry), true);
        assert!(first.is_actionable());
        entry.record_throttled(now);

        assert_eq!(detect(Some(&entry), true), Detection::NoChange);
        assert_eq!(detect(Some(&entry), true), Detection::NoChange);
    }

    #[test]
    fn detection_does_not_mutate() {
        let entry = LedgerEntry::baseline("srv", false, Utc::now());
        let before = entry.clone();
        let _ = detect(Some(&entry), true);
        assert_eq!(entry, before);
    }
}
