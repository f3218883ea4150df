//! TTL lease over a keyed-expiry store
//!
//! Formalizes the mutual-exclusion primitive independently of the
//! extraction logic it guards: `try_acquire` maps to SETNX-with-TTL,
//! `release` to delete-if-token-matches. Release is idempotent: releasing
//! an expired lock, or one re-acquired by someone else, is a no-op rather
//! than an error.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

/// Lease store errors
#[derive(Debug, Error)]
pub enum LeaseError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Shared keyed-expiry store with compare-and-set semantics
#[async_trait]
pub trait KeyedExpiryStore: Send + Sync {
    /// SETNX: claim `key` with `token` for `ttl` unless a live claim exists
    async fn set_if_absent(&self, key: &str, token: &str, ttl: Duration)
        -> Result<bool, LeaseError>;

    /// Delete `key` only if it is still held with `token`
    ///
    /// Returns false (not an error) when the claim expired or belongs to
    /// another holder.
    async fn delete_if_match(&self, key: &str, token: &str) -> Result<bool, LeaseError>;
}

/// Opaque proof of lease ownership
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseToken(String);

impl LeaseToken {
    fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Outcome of a lease acquisition attempt
#[derive(Debug)]
pub enum AcquireOutcome {
    Acquired(LeaseToken),
    Busy,
}

/// Lease-based mutual exclusion with a fixed TTL
#[derive(Clone)]
pub struct LeaseCoordinator {
    store: std::sync::Arc<dyn KeyedExpiryStore>,
    ttl: Duration,
}

impl LeaseCoordinator {
    pub fn new(store: std::sync::Arc<dyn KeyedExpiryStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Attempt to acquire the lease for `lock_key`
    pub async fn try_acquire(&self, lock_key: &str) -> Result<AcquireOutcome, LeaseError> {
        let token = LeaseToken::generate();
        if self
            .store
            .set_if_absent(lock_key, token.as_str(), self.ttl)
            .await?
        {
            Ok(AcquireOutcome::Acquired(token))
        } else {
            Ok(AcquireOutcome::Busy)
        }
    }

    /// Release a held lease; no-op if it already expired or changed hands
    pub async fn release(&self, lock_key: &str, token: &LeaseToken) -> Result<(), LeaseError> {
        let released = self.store.delete_if_match(lock_key, token.as_str()).await?;
        if !released {
            tracing::debug!("lease {} already expired or re-acquired", lock_key);
        }
        Ok(())
    }
}

/// In-process expiry store
///
/// Backs single-node deployments and tests. Expiry uses the tokio clock so
/// timing tests can pause and advance it deterministically.
#[derive(Default)]
pub struct MemoryExpiryStore {
    entries: parking_lot::Mutex<HashMap<String, (String, tokio::time::Instant)>>,
}

impl MemoryExpiryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyedExpiryStore for MemoryExpiryStore {
    async fn set_if_absent(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, LeaseError> {
        let now = tokio::time::Instant::now();
        let mut entries = self.entries.lock();

        if let Some((_, expires_at)) = entries.get(key) {
            if *expires_at > now {
                return Ok(false);
            }
            // Expired claim: fall through and replace
        }

        entries.insert(key.to_string(), (token.to_string(), now + ttl));
        Ok(true)
    }

    async fn delete_if_match(&self, key: &str, token: &str) -> Result<bool, LeaseError> {
        let now = tokio::time::Instant::now();
        let mut entries = self.entries.lock();

        match entries.get(key) {
            Some((held_token, expires_at)) if held_token == token && *expires_at > now => {
                entries.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// SQLite-backed expiry store
///
/// Shares leases across processes on one box through the same database the
/// rest of the server uses. Expiry is wall-clock millisecond timestamps.
pub struct SqliteExpiryStore {
    pool: SqlitePool,
}

impl SqliteExpiryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn init(&self) -> Result<(), LeaseError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS extraction_locks (
                lock_key TEXT PRIMARY KEY,
                holder_token TEXT NOT NULL,
                acquired_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl KeyedExpiryStore for SqliteExpiryStore {
    async fn set_if_absent(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, LeaseError> {
        let now = Utc::now().timestamp_millis();
        let expires_at = now + ttl.as_millis() as i64;

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM extraction_locks WHERE lock_key = ? AND expires_at <= ?")
            .bind(key)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query(
            r#"
            INSERT INTO extraction_locks (lock_key, holder_token, acquired_at, expires_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(lock_key) DO NOTHING
            "#,
        )
        .bind(key)
        .bind(token)
        .bind(now)
        .bind(expires_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_if_match(&self, key: &str, token: &str) -> Result<bool, LeaseError> {
        let now = Utc::now().timestamp_millis();
        let result = sqlx::query(
            "DELETE FROM extraction_locks WHERE lock_key = ? AND holder_token = ? AND expires_at > ?",
        )
        .bind(key)
        .bind(token)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
