#![allow(async_fn_in_trait)]

use chrono::{DateTime, Utc};
use gymtap_core::{MemberId, TokenValue};
use sqlx::SqlitePool;

use crate::error::StorageResult;
use crate::models::Token;

/// Fields of a token about to be inserted.
#[derive(Debug, Clone)]
pub struct NewToken {
    pub value: TokenValue,
    pub member_id: MemberId,
    pub issued_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Repository trait for Token entity operations
///
/// Native async trait methods (Edition 2024); implementations must be
/// `Send + Sync` so a store can be shared across request handlers.
pub trait TokenRepository: Send + Sync {
    /// Find a token by its value
    async fn find_by_value(&self, value: &TokenValue) -> StorageResult<Option<Token>>;

    /// Check if a token value is already taken
    async fn exists_by_value(&self, value: &TokenValue) -> StorageResult<bool>;

    /// Insert a new token and return the stored row
    ///
    /// Fails with a UNIQUE violation if the value is taken.
    async fn insert(&self, token: &NewToken) -> StorageResult<Token>;

    /// Mark a token revoked in a single statement
    ///
    /// Returns `false` if no token has this value. Revoking twice keeps the
    /// first `revoked_at`.
    async fn revoke(&self, value: &TokenValue, at: DateTime<Utc>) -> StorageResult<bool>;

    /// All tokens of a member, newest first
    async fn find_by_member(&self, member_id: MemberId) -> StorageResult<Vec<Token>>;

    /// Number of unrevoked tokens whose expiry is at or before `now`
    async fn count_expired(&self, now: DateTime<Utc>) -> StorageResult<u64>;
}

/// SQLite implementation of TokenRepository
#[derive(Debug, Clone)]
pub struct SqliteTokenRepository {
    pool: SqlitePool,
}

impl SqliteTokenRepository {
    /// Create a new SQLite token repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl TokenRepository for SqliteTokenRepository {
    async fn find_by_value(&self, value: &TokenValue) -> StorageResult<Option<Token>> {
        let token = sqlx::query_as::<_, Token>(
            r#"
            SELECT id, value, member_id, issued_at, expires_at, revoked, revoked_at
            FROM tokens
            WHERE value = ?
            "#,
        )
        .bind(value.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(token)
    }

    async fn exists_by_value(&self, value: &TokenValue) -> StorageResult<bool> {
        let result: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tokens WHERE value = ?")
            .bind(value.as_str())
            .fetch_one(&self.pool)
            .await?;

        Ok(result.0 > 0)
    }

    async fn insert(&self, token: &NewToken) -> StorageResult<Token> {
        let stored = sqlx::query_as::<_, Token>(
            r#"
            INSERT INTO tokens (value, member_id, issued_at, expires_at)
            VALUES (?, ?, ?, ?)
            RETURNING id, value, member_id, issued_at, expires_at, revoked, revoked_at
            "#,
        )
        .bind(token.value.as_str())
        .bind(token.member_id.get())
        .bind(token.issued_at)
        .bind(token.expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(stored)
    }

    async fn revoke(&self, value: &TokenValue, at: DateTime<Utc>) -> StorageResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE tokens
            SET revoked = 1, revoked_at = COALESCE(revoked_at, ?)
            WHERE value = ?
            "#,
        )
        .bind(at)
        .bind(value.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_by_member(&self, member_id: MemberId) -> StorageResult<Vec<Token>> {
        let tokens = sqlx::query_as::<_, Token>(
            r#"
            SELECT id, value, member_id, issued_at, expires_at, revoked, revoked_at
            FROM tokens
            WHERE member_id = ?
            ORDER BY issued_at DESC, id DESC
            "#,
        )
        .bind(member_id.get())
        .fetch_all(&self.pool)
        .await?;

        Ok(tokens)
    }

    async fn count_expired(&self, now: DateTime<Utc>) -> StorageResult<u64> {
        // Compared in Rust: stored timestamps are text with variable precision.
        let expiries: Vec<(DateTime<Utc>,)> = sqlx::query_as(
            r#"
            SELECT expires_at
            FROM tokens
            WHERE revoked = 0 AND expires_at IS NOT NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(expiries.iter().filter(|(at,)| *at <= now).count() as u64)
    }
}
