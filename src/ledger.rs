//! Local, non-authoritative record of successful redemptions on this device.
//!
//! Used only for operator-visible listing and manual export. It is never
//! consulted to decide whether a token may be redeemed; that decision
//! belongs solely to the token store.

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::token::Scope;

/// One successful redemption as observed on this device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub subject: String,
    pub scope: Scope,
    /// Store-recorded redemption time.
    pub redeemed_at: DateTime<Utc>,
    /// Local wall-clock time the result was displayed.
    pub recorded_at: DateTime<Utc>,
    /// Operator/device identifier.
    pub device: String,
}

/// Append-only sequence of successes.
#[derive(Debug)]
pub struct Ledger {
    device: String,
    entries: Mutex<Vec<LedgerEntry>>,
}

impl Ledger {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn record(&self, subject: String, scope: Scope, redeemed_at: DateTime<Utc>) {
        self.guard().push(LedgerEntry {
            subject,
            scope,
            redeemed_at,
            recorded_at: Utc::now(),
            device: self.device.clone(),
        });
    }

    /// Snapshot of all entries, in append order.
    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.guard().clone()
    }

    pub fn len(&self) -> usize {
        self.guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }

    /// Local and reversible; token state in the store is untouched.
    pub fn clear(&self) {
        self.guard().clear();
    }

    fn guard(&self) -> MutexGuard<'_, Vec<LedgerEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_in_append_order_and_clears() {
        let ledger = Ledger::new("gate-1");
        ledger.record("ENR1".into(), Scope::new(["d", "Morning"]), Utc::now());
        ledger.record("ENR2".into(), Scope::new(["d", "Evening"]), Utc::now());

        let entries = ledger.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].subject, "ENR1");
        assert_eq!(entries[1].subject, "ENR2");
        assert!(entries.iter().all(|e| e.device == "gate-1"));

        ledger.clear();
        assert!(ledger.is_empty());
    }
}
