//! Redemption engine: resolves a scanned payload to a token record and
//! atomically transitions it unused → used.
//!
//! The check and the consume happen inside one store transaction; under any
//! number of concurrent attempts on the same token, exactly one caller
//! observes `Success` and the rest observe `AlreadyUsed`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::errors::StoreError;
use crate::models::outcome::ScanResult;
use crate::models::token::{ScannedPayload, TokenRecord, TokenState};
use crate::store::{TokenStore, TxOutcome, TxVerdict};

pub const DEFAULT_REDEEM_TIMEOUT: Duration = Duration::from_secs(5);

pub struct RedemptionEngine<S> {
    store: Arc<S>,
    timeout: Duration,
}

impl<S: TokenStore> RedemptionEngine<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            timeout: DEFAULT_REDEEM_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Present one raw scanned payload.
    ///
    /// A store failure or timeout yields `TransientError` and is never
    /// retried here: the transaction's side effect may already have been
    /// applied, and a blind retry would misreport state. The operator
    /// retries by rescanning.
    pub async fn redeem(&self, raw: &str) -> ScanResult {
        let payload = match ScannedPayload::parse(raw) {
            Ok(payload) => payload,
            Err(e) => {
                debug!(error = %e, "unparseable payload");
                return ScanResult::Invalid {
                    raw: raw.to_string(),
                };
            }
        };
        let id = payload.token_id();

        // Resolution lookup. This read may be stale under concurrent
        // redemption; the transaction below re-reads authoritatively.
        let record = match self.bounded(self.store.get(&id)).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!(token = %id, "unknown token");
                return ScanResult::Invalid {
                    raw: raw.to_string(),
                };
            }
            Err(e) => return transient(&id, e),
        };

        // Scope is issuer-fixed: embedded payload fields must match the
        // issued record or the payload is treated as forged.
        if let ScannedPayload::Embedded { subject, scope } = &payload {
            if *subject != record.subject || *scope != record.scope {
                warn!(token = %id, "embedded fields do not match the issued record");
                return ScanResult::Invalid {
                    raw: raw.to_string(),
                };
            }
        }

        let now = Utc::now();
        let consume = move |rec: &mut TokenRecord| {
            if rec.state == TokenState::Used {
                return TxVerdict::Abort;
            }
            rec.state = TokenState::Used;
            rec.used_at = Some(now);
            TxVerdict::Commit
        };

        match self.bounded(self.store.transact(&id, &consume)).await {
            Ok(TxOutcome::Committed(rec)) => {
                info!(token = %id, subject = %rec.subject, scope = %rec.scope, "token redeemed");
                ScanResult::Success {
                    subject: rec.subject,
                    scope: rec.scope,
                    used_at: now,
                }
            }
            Ok(TxOutcome::Aborted(rec)) => {
                info!(token = %id, used_at = ?rec.used_at, "token already used");
                ScanResult::AlreadyUsed {
                    scope: rec.scope,
                    used_at: rec.used_at,
                }
            }
            // Disappeared between lookup and transaction; not admissible.
            Ok(TxOutcome::NotFound) => ScanResult::Invalid {
                raw: raw.to_string(),
            },
            Err(e) => transient(&id, e),
        }
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout),
        }
    }
}

fn transient(id: &str, e: StoreError) -> ScanResult {
    warn!(token = %id, error = %e, "store failure during redemption");
    ScanResult::TransientError {
        cause: e.to_string(),
    }
}
