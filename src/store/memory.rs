//! In-memory token store.
//!
//! Backs tests and single-device demos. Per-id atomicity comes from holding
//! the DashMap entry lock across the whole read-modify-write: no concurrent
//! `transact` on the same id can interleave between the closure's read and
//! the write-back.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::errors::StoreError;
use crate::models::token::{TokenRecord, TokenState};
use crate::store::{TokenStore, TxFn, TxOutcome, TxVerdict};

#[derive(Debug, Default)]
pub struct MemoryStore {
    tokens: DashMap<String, TokenRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn get(&self, id: &str) -> Result<Option<TokenRecord>, StoreError> {
        Ok(self.tokens.get(id).map(|r| r.value().clone()))
    }

    async fn transact(&self, id: &str, apply: TxFn<'_>) -> Result<TxOutcome, StoreError> {
        // `get_mut` holds the shard write lock for the duration of the
        // closure, so the read it observes is fresh and the write-back is
        // part of the same critical section.
        match self.tokens.get_mut(id) {
            None => Ok(TxOutcome::NotFound),
            Some(mut entry) => {
                let mut candidate = entry.value().clone();
                match apply(&mut candidate) {
                    TxVerdict::Abort => Ok(TxOutcome::Aborted(entry.value().clone())),
                    TxVerdict::Commit => {
                        *entry.value_mut() = candidate.clone();
                        Ok(TxOutcome::Committed(candidate))
                    }
                }
            }
        }
    }

    async fn insert(&self, record: TokenRecord) -> Result<(), StoreError> {
        self.tokens.insert(record.id.clone(), record);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<TokenRecord>, StoreError> {
        let mut records: Vec<TokenRecord> =
            self.tokens.iter().map(|r| r.value().clone()).collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(records)
    }

    async fn list_used(&self) -> Result<Vec<TokenRecord>, StoreError> {
        let mut records: Vec<TokenRecord> = self
            .tokens
            .iter()
            .filter(|r| r.value().state == TokenState::Used)
            .map(|r| r.value().clone())
            .collect();
        records.sort_by(|a, b| a.used_at.cmp(&b.used_at).then(a.id.cmp(&b.id)));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::models::token::Scope;

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        tokio_test::block_on(store.insert(TokenRecord::issue(
            "tok-1",
            "ENR1",
            Scope::new(["2025-12-16", "Morning"]),
        )))
        .unwrap();
        store
    }

    #[test]
    fn transact_commit_applies_the_mutation() {
        let store = seeded();
        let now = Utc::now();
        let outcome = tokio_test::block_on(store.transact("tok-1", &move |rec| {
            rec.state = TokenState::Used;
            rec.used_at = Some(now);
            TxVerdict::Commit
        }))
        .unwrap();

        let TxOutcome::Committed(rec) = outcome else {
            panic!("expected commit, got {outcome:?}");
        };
        assert_eq!(rec.state, TokenState::Used);
        assert_eq!(rec.used_at, Some(now));

        // The write-back is visible to later reads.
        let stored = tokio_test::block_on(store.get("tok-1")).unwrap().unwrap();
        assert_eq!(stored.state, TokenState::Used);
    }

    #[test]
    fn transact_abort_leaves_the_record_untouched() {
        let store = seeded();
        let outcome = tokio_test::block_on(store.transact("tok-1", &|rec| {
            rec.state = TokenState::Used;
            TxVerdict::Abort
        }))
        .unwrap();

        let TxOutcome::Aborted(rec) = outcome else {
            panic!("expected abort, got {outcome:?}");
        };
        assert_eq!(rec.state, TokenState::Unused);
        let stored = tokio_test::block_on(store.get("tok-1")).unwrap().unwrap();
        assert_eq!(stored.state, TokenState::Unused);
        assert_eq!(stored.used_at, None);
    }

    #[test]
    fn transact_unknown_id_is_not_found() {
        let store = seeded();
        let outcome =
            tokio_test::block_on(store.transact("nope", &|_| TxVerdict::Commit)).unwrap();
        assert_eq!(outcome, TxOutcome::NotFound);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_consume_has_one_winner() {
        let store = MemoryStore::new();
        store
            .insert(TokenRecord::issue(
                "tok-1",
                "ENR1",
                Scope::new(["2025-12-16", "Morning"]),
            ))
            .await
            .unwrap();
        let store = std::sync::Arc::new(store);
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let now = Utc::now();
                store
                    .transact("tok-1", &move |rec| {
                        if rec.state == TokenState::Used {
                            return TxVerdict::Abort;
                        }
                        rec.state = TokenState::Used;
                        rec.used_at = Some(now);
                        TxVerdict::Commit
                    })
                    .await
                    .unwrap()
            }));
        }

        let mut commits = 0;
        for handle in handles {
            if let TxOutcome::Committed(_) = handle.await.unwrap() {
                commits += 1;
            }
        }
        assert_eq!(commits, 1, "exactly one transaction may win");
    }
}
