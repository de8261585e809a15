use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::token::Scope;

/// Outcome of presenting one scanned payload to the redemption engine.
///
/// Ephemeral and process-local; only `Success` is mirrored into the local
/// ledger. `TransientError` means "unknown — do not show success": the store
/// may or may not have consumed the token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ScanResult {
    Success {
        subject: String,
        scope: Scope,
        used_at: DateTime<Utc>,
    },
    AlreadyUsed {
        scope: Scope,
        used_at: Option<DateTime<Utc>>,
    },
    Invalid {
        raw: String,
    },
    TransientError {
        cause: String,
    },
}

impl ScanResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ScanResult::Success { .. })
    }
}

/// The operator-facing signal: one unambiguous line per outcome.
impl fmt::Display for ScanResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanResult::Success {
                subject,
                scope,
                used_at,
            } => write!(f, "ADMIT  {subject} [{scope}] at {}", used_at.to_rfc3339()),
            ScanResult::AlreadyUsed { scope, used_at } => match used_at {
                Some(at) => write!(f, "DENY   already used at {} [{scope}]", at.to_rfc3339()),
                None => write!(f, "DENY   already used [{scope}]"),
            },
            ScanResult::Invalid { raw } => write!(f, "DENY   invalid payload {raw:?}"),
            ScanResult::TransientError { cause } => {
                write!(f, "ERROR  {cause} — result unknown, rescan")
            }
        }
    }
}
