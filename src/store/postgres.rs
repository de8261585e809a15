//! Postgres-backed token store.
//!
//! `transact` takes a row lock (`SELECT … FOR UPDATE`) so the closure's
//! read-modify-write is one indivisible operation per token id across all
//! devices. Two scanners racing on the same token serialize on the row; the
//! loser observes the winner's committed state.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::errors::StoreError;
use crate::models::token::{Scope, TokenRecord, TokenState};
use crate::store::{TokenStore, TxFn, TxOutcome, TxVerdict};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run pending migrations from the migrations/ directory.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct TokenRow {
    id: String,
    subject: String,
    scope: Vec<String>,
    state: String,
    used_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<TokenRow> for TokenRecord {
    fn from(row: TokenRow) -> Self {
        let state = match row.state.as_str() {
            "unused" => TokenState::Unused,
            // Unknown states fail closed: the token is not admissible.
            _ => TokenState::Used,
        };
        TokenRecord {
            id: row.id,
            subject: row.subject,
            scope: Scope::new(row.scope),
            state,
            used_at: row.used_at,
            created_at: row.created_at,
        }
    }
}

const SELECT_COLUMNS: &str = "id, subject, scope, state, used_at, created_at";

#[async_trait::async_trait]
impl TokenStore for PgStore {
    async fn get(&self, id: &str) -> Result<Option<TokenRecord>, StoreError> {
        let row = sqlx::query_as::<_, TokenRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM admission_tokens WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(TokenRecord::from))
    }

    async fn transact(&self, id: &str, apply: TxFn<'_>) -> Result<TxOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        // FOR UPDATE serializes all transactions on this id; the row read
        // here cannot be changed underneath the closure.
        let row = sqlx::query_as::<_, TokenRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM admission_tokens WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(TxOutcome::NotFound);
        };

        let current = TokenRecord::from(row);
        let mut candidate = current.clone();
        match apply(&mut candidate) {
            TxVerdict::Abort => {
                tx.rollback().await?;
                Ok(TxOutcome::Aborted(current))
            }
            TxVerdict::Commit => {
                sqlx::query(
                    "UPDATE admission_tokens SET subject = $2, scope = $3, state = $4, used_at = $5 WHERE id = $1",
                )
                .bind(&candidate.id)
                .bind(&candidate.subject)
                .bind(candidate.scope.fields().to_vec())
                .bind(candidate.state.as_str())
                .bind(candidate.used_at)
                .execute(&mut *tx)
                .await?;
                tx.commit().await?;
                Ok(TxOutcome::Committed(candidate))
            }
        }
    }

    async fn insert(&self, record: TokenRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO admission_tokens (id, subject, scope, state, used_at, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&record.id)
        .bind(&record.subject)
        .bind(record.scope.fields().to_vec())
        .bind(record.state.as_str())
        .bind(record.used_at)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<TokenRecord>, StoreError> {
        let rows = sqlx::query_as::<_, TokenRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM admission_tokens ORDER BY created_at ASC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(TokenRecord::from).collect())
    }

    async fn list_used(&self) -> Result<Vec<TokenRecord>, StoreError> {
        let rows = sqlx::query_as::<_, TokenRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM admission_tokens WHERE state = 'used' ORDER BY used_at ASC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(TokenRecord::from).collect())
    }
}
