pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::errors::StoreError;
use crate::models::token::TokenRecord;

/// Decision returned by a transaction closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxVerdict {
    Commit,
    Abort,
}

/// Result of [`TokenStore::transact`]. `Aborted` carries the record as it
/// was observed inside the transaction (unmodified).
#[derive(Debug, Clone, PartialEq)]
pub enum TxOutcome {
    Committed(TokenRecord),
    Aborted(TokenRecord),
    NotFound,
}

/// Transaction body. It observes a fresh read of the record inside the
/// store's per-id critical section and mutates it in place; the mutation is
/// applied iff it returns `Commit` and no concurrent transaction on the same
/// id committed first.
pub type TxFn<'a> = &'a (dyn Fn(&mut TokenRecord) -> TxVerdict + Send + Sync);

/// Abstraction over token store backends.
/// Implementations: PgStore (row-locked transactions), MemoryStore (DashMap).
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Point lookup by token id. The result may be stale under concurrent
    /// redemption; only `transact` sees an authoritative read.
    async fn get(&self, id: &str) -> Result<Option<TokenRecord>, StoreError>;

    /// Run `apply` against a fresh read of the record as one indivisible
    /// read-modify-write, linearizable per id. A separate get-then-update is
    /// not equivalent and must never be substituted for this.
    async fn transact(&self, id: &str, apply: TxFn<'_>) -> Result<TxOutcome, StoreError>;

    /// Insert a newly issued token (the issuer's output contract).
    async fn insert(&self, record: TokenRecord) -> Result<(), StoreError>;

    /// All issued tokens, oldest first.
    async fn list(&self) -> Result<Vec<TokenRecord>, StoreError>;

    /// The used set, ordered by redemption time (the export surface).
    async fn list_used(&self) -> Result<Vec<TokenRecord>, StoreError>;
}
