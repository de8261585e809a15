//! Delimited-text export of redemption records.
//!
//! Columns: subject, each scope field, redemption timestamp (RFC 3339),
//! operator/device identifier.

use std::io::{self, Write};

use chrono::{DateTime, Utc};

use crate::ledger::LedgerEntry;
use crate::models::token::{TokenRecord, TokenState};

pub const DEFAULT_DELIMITER: char = '\t';

/// Serialize a device's local ledger.
pub fn write_ledger<W: Write>(
    out: &mut W,
    entries: &[LedgerEntry],
    delimiter: char,
) -> io::Result<()> {
    for entry in entries {
        write_row(
            out,
            &entry.subject,
            entry.scope.fields(),
            entry.redeemed_at,
            &entry.device,
            delimiter,
        )?;
    }
    Ok(())
}

/// Serialize the store's used set. `device` identifies the exporting
/// station; per-record device attribution is not stored server-side.
pub fn write_used_records<W: Write>(
    out: &mut W,
    records: &[TokenRecord],
    device: &str,
    delimiter: char,
) -> io::Result<()> {
    for record in records {
        if record.state != TokenState::Used {
            continue;
        }
        let Some(used_at) = record.used_at else {
            tracing::warn!(token = %record.id, "used record without a timestamp, skipped");
            continue;
        };
        write_row(
            out,
            &record.subject,
            record.scope.fields(),
            used_at,
            device,
            delimiter,
        )?;
    }
    Ok(())
}

fn write_row<W: Write>(
    out: &mut W,
    subject: &str,
    scope: &[String],
    used_at: DateTime<Utc>,
    device: &str,
    delimiter: char,
) -> io::Result<()> {
    write!(out, "{subject}")?;
    for field in scope {
        write!(out, "{delimiter}{field}")?;
    }
    writeln!(out, "{delimiter}{}{delimiter}{device}", used_at.to_rfc3339())
}
