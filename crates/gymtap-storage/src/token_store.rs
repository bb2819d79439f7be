//! Token lifecycle service.
//!
//! [`TokenStore`] mints, validates, revokes and lists tokens on top of a
//! [`TokenRepository`] and a [`MemberDirectory`]. It knows nothing about
//! NFC: the orchestrator calls [`TokenStore::require_valid`] as its write
//! gate before any device is engaged.

use chrono::{Duration, Utc};
use gymtap_core::constants::{MAX_GENERATION_ATTEMPTS, MAX_TOKEN_TTL_DAYS, TOKEN_LENGTH};
use gymtap_core::{MemberId, TokenState, TokenValue};
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::error::{StorageError, StorageResult};
use crate::models::{Member, MemberStatus, Token};
use crate::repositories::{
    MemberDirectory, NewToken, SqliteMemberDirectory, SqliteTokenRepository, TokenRepository,
};
use crate::Database;

/// Token lifecycle service.
///
/// # Examples
///
/// ```no_run
/// use gymtap_core::MemberId;
/// use gymtap_storage::{Database, TokenStore};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let db = Database::in_memory().await?;
/// let store = TokenStore::sqlite(&db);
///
/// let token = store.generate(MemberId::new(1)?, Some(30)).await?;
/// let state = store.validate(&token.value, Some(token.member_id)).await?;
/// assert!(state.is_valid());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TokenStore<T, M> {
    tokens: T,
    members: M,
}

impl TokenStore<SqliteTokenRepository, SqliteMemberDirectory> {
    /// Store backed by the SQLite repositories of `db`.
    pub fn sqlite(db: &Database) -> Self {
        Self::new(
            SqliteTokenRepository::new(db.pool().clone()),
            SqliteMemberDirectory::new(db.pool().clone()),
        )
    }
}

impl<T: TokenRepository, M: MemberDirectory> TokenStore<T, M> {
    pub fn new(tokens: T, members: M) -> Self {
        Self { tokens, members }
    }

    /// Mint a fresh token for `member_id`.
    ///
    /// `ttl_days` of `None` issues a token that never expires.
    ///
    /// # Errors
    ///
    /// - `Validation` if the member does not exist or `ttl_days` is 0 or
    ///   above [`MAX_TOKEN_TTL_DAYS`]
    /// - `Internal` if no unique value could be drawn
    pub async fn generate(
        &self,
        member_id: MemberId,
        ttl_days: Option<u32>,
    ) -> StorageResult<Token> {
        if let Some(days) = ttl_days
            && (days == 0 || days > MAX_TOKEN_TTL_DAYS)
        {
            return Err(StorageError::Validation(format!(
                "ttl_days must be between 1 and {MAX_TOKEN_TTL_DAYS}, got {days}"
            )));
        }

        if !self.members.member_exists(member_id).await? {
            return Err(StorageError::Validation(format!(
                "Member {member_id} does not exist"
            )));
        }

        for attempt in 1..=MAX_GENERATION_ATTEMPTS {
            let value = random_token_value()?;

            if self.tokens.exists_by_value(&value).await? {
                warn!(attempt, "Token value collision, drawing again");
                continue;
            }

            let issued_at = Utc::now();
            let new_token = NewToken {
                value,
                member_id,
                issued_at,
                expires_at: ttl_days.map(|days| issued_at + Duration::days(i64::from(days))),
            };

            match self.tokens.insert(&new_token).await {
                Ok(token) => {
                    info!(
                        member_id = %member_id,
                        token = %token.value.redacted(),
                        ttl_days,
                        "Token issued"
                    );
                    return Ok(token);
                }
                Err(e) if e.is_unique_violation() => {
                    warn!(attempt, "Token value taken at insert, drawing again");
                }
                Err(e) => return Err(e),
            }
        }

        Err(StorageError::Internal(format!(
            "no unique token value after {MAX_GENERATION_ATTEMPTS} attempts"
        )))
    }

    /// Current state of `value`, optionally checking it belongs to
    /// `expected_member`.
    ///
    /// A non-valid state is a normal return.
    ///
    /// # Errors
    ///
    /// - `NotFound` if no token has this value or its member was deleted
    /// - `Mismatch` if it belongs to another member
    pub async fn validate(
        &self,
        value: &TokenValue,
        expected_member: Option<MemberId>,
    ) -> StorageResult<TokenState> {
        let (token, _) = self.owned_token(value, expected_member).await?;
        let state = token.state();

        debug!(token = %value.redacted(), %state, "Token validated");
        Ok(state)
    }

    /// Write gate: the token must exist, belong to `member_id` and be
    /// valid, and the member must be active.
    ///
    /// # Errors
    ///
    /// `NotFound` or `Mismatch` as for [`validate`](Self::validate), and
    /// `Validation` if the token is expired or revoked or the member is
    /// not active.
    pub async fn require_valid(
        &self,
        value: &TokenValue,
        member_id: MemberId,
    ) -> StorageResult<Token> {
        let (token, owner) = self.owned_token(value, Some(member_id)).await?;

        if owner.status != MemberStatus::Active {
            return Err(StorageError::Validation(format!(
                "Member {member_id} is not active"
            )));
        }

        match token.state() {
            TokenState::Valid => Ok(token),
            state => Err(StorageError::Validation(format!(
                "Token {} is {state}",
                value.redacted()
            ))),
        }
    }

    /// Revoke `value`. Idempotent.
    ///
    /// # Errors
    ///
    /// `NotFound` if no token has this value.
    pub async fn revoke(&self, value: &TokenValue) -> StorageResult<()> {
        if !self.tokens.revoke(value, Utc::now()).await? {
            return Err(StorageError::token_not_found(value));
        }

        info!(token = %value.redacted(), "Token revoked");
        Ok(())
    }

    /// Tokens of `member_id`, newest first.
    pub async fn list_for_member(&self, member_id: MemberId) -> StorageResult<Vec<Token>> {
        self.tokens.find_by_member(member_id).await
    }

    /// Token detail, `None` if unknown.
    pub async fn get(&self, value: &TokenValue) -> StorageResult<Option<Token>> {
        self.tokens.find_by_value(value).await
    }

    /// How many unrevoked tokens have expired. Nothing is modified.
    pub async fn count_expired(&self) -> StorageResult<u64> {
        self.tokens.count_expired(Utc::now()).await
    }

    /// Token and its owner. Tokens of a deleted member are gone along
    /// with the member.
    async fn owned_token(
        &self,
        value: &TokenValue,
        expected_member: Option<MemberId>,
    ) -> StorageResult<(Token, Member)> {
        let token = self
            .tokens
            .find_by_value(value)
            .await?
            .ok_or_else(|| StorageError::token_not_found(value))?;

        let owner = match self.members.find_by_id(token.member_id).await? {
            Some(member) if member.exists() => member,
            _ => {
                debug!(
                    token = %value.redacted(),
                    member_id = %token.member_id,
                    "Token owner deleted"
                );
                return Err(StorageError::token_not_found(value));
            }
        };

        if let Some(expected) = expected_member
            && token.member_id != expected
        {
            return Err(StorageError::Mismatch(format!(
                "Token {} does not belong to member {expected}",
                value.redacted()
            )));
        }

        Ok((token, owner))
    }
}

fn random_token_value() -> StorageResult<TokenValue> {
    let raw: String = OsRng
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect();

    TokenValue::new(&raw).map_err(|e| StorageError::Internal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn setup() -> (
        Database,
        TokenStore<SqliteTokenRepository, SqliteMemberDirectory>,
        MemberId,
    ) {
        let db = Database::in_memory().await.unwrap();
        let member = SqliteMemberDirectory::new(db.pool().clone())
            .insert("Ana Souza")
            .await
            .unwrap();
        let store = TokenStore::sqlite(&db);
        (db, store, MemberId::new(member.id).unwrap())
    }

    #[test]
    fn test_random_values_are_alphanumeric() {
        let values: HashSet<String> = (0..100)
            .map(|_| random_token_value().unwrap().as_str().to_string())
            .collect();

        assert_eq!(values.len(), 100);
        for value in values {
            assert_eq!(value.len(), TOKEN_LENGTH);
            assert!(value.bytes().all(|b| b.is_ascii_alphanumeric()));
        }
    }

    #[tokio::test]
    async fn test_generate_sets_expiry() {
        let (_db, store, member) = setup().await;

        let token = store.generate(member, Some(30)).await.unwrap();
        assert_eq!(token.member_id, member);
        assert!(!token.revoked);
        assert_eq!(
            token.expires_at.unwrap() - token.issued_at,
            Duration::days(30)
        );

        let forever = store.generate(member, None).await.unwrap();
        assert_eq!(forever.expires_at, None);
        assert_ne!(forever.value, token.value);
    }

    #[tokio::test]
    async fn test_generate_rejects_bad_ttl() {
        let (_db, store, member) = setup().await;

        for ttl in [0, MAX_TOKEN_TTL_DAYS + 1] {
            let result = store.generate(member, Some(ttl)).await;
            assert!(matches!(result, Err(StorageError::Validation(_))), "ttl {ttl}");
        }
        assert!(store.generate(member, Some(MAX_TOKEN_TTL_DAYS)).await.is_ok());
    }

    #[tokio::test]
    async fn test_generate_rejects_unknown_and_deleted_members() {
        let (db, store, member) = setup().await;

        let unknown = MemberId::new(9999).unwrap();
        assert!(matches!(
            store.generate(unknown, None).await,
            Err(StorageError::Validation(_))
        ));

        SqliteMemberDirectory::new(db.pool().clone())
            .set_status(member, MemberStatus::Deleted)
            .await
            .unwrap();
        assert!(matches!(
            store.generate(member, None).await,
            Err(StorageError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_validate_and_member_binding() {
        let (db, store, member) = setup().await;
        let other = SqliteMemberDirectory::new(db.pool().clone())
            .insert("Bruno Lima")
            .await
            .unwrap();
        let other = MemberId::new(other.id).unwrap();

        let token = store.generate(member, Some(1)).await.unwrap();

        assert_eq!(
            store.validate(&token.value, None).await.unwrap(),
            TokenState::Valid
        );
        assert_eq!(
            store.validate(&token.value, Some(member)).await.unwrap(),
            TokenState::Valid
        );
        assert!(matches!(
            store.validate(&token.value, Some(other)).await,
            Err(StorageError::Mismatch(_))
        ));

        let unknown = TokenValue::new("doesnotexist").unwrap();
        assert!(matches!(
            store.validate(&unknown, None).await,
            Err(StorageError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_tokens_of_deleted_member_are_gone() {
        let (db, store, member) = setup().await;
        let token = store.generate(member, None).await.unwrap();

        SqliteMemberDirectory::new(db.pool().clone())
            .set_status(member, MemberStatus::Deleted)
            .await
            .unwrap();

        assert!(matches!(
            store.validate(&token.value, None).await,
            Err(StorageError::NotFound { .. })
        ));
        assert!(matches!(
            store.require_valid(&token.value, member).await,
            Err(StorageError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_inactive_member_cannot_pass_write_gate() {
        let (db, store, member) = setup().await;
        let token = store.generate(member, None).await.unwrap();
        let members = SqliteMemberDirectory::new(db.pool().clone());

        members.set_status(member, MemberStatus::Inactive).await.unwrap();

        // The token itself stays valid.
        assert_eq!(
            store.validate(&token.value, Some(member)).await.unwrap(),
            TokenState::Valid
        );
        match store.require_valid(&token.value, member).await {
            Err(StorageError::Validation(message)) => {
                assert_eq!(message, format!("Member {member} is not active"));
            }
            other => panic!("expected Validation, got {other:?}"),
        }

        members.set_status(member, MemberStatus::Active).await.unwrap();
        assert!(store.require_valid(&token.value, member).await.is_ok());
    }

    #[tokio::test]
    async fn test_expired_token_is_reported_not_raised() {
        let (db, store, member) = setup().await;
        let repo = SqliteTokenRepository::new(db.pool().clone());

        let issued_at = Utc::now() - Duration::days(10);
        let token = repo
            .insert(&NewToken {
                value: TokenValue::new("expiredToken01").unwrap(),
                member_id: member,
                issued_at,
                expires_at: Some(issued_at + Duration::days(1)),
            })
            .await
            .unwrap();

        assert_eq!(
            store.validate(&token.value, Some(member)).await.unwrap(),
            TokenState::Expired
        );
        assert!(matches!(
            store.require_valid(&token.value, member).await,
            Err(StorageError::Validation(_))
        ));
        assert_eq!(store.count_expired().await.unwrap(), 1);

        // Reporting does not modify anything.
        assert_eq!(store.count_expired().await.unwrap(), 1);
        assert!(!store.get(&token.value).await.unwrap().unwrap().revoked);
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent_and_keeps_first_time() {
        let (_db, store, member) = setup().await;
        let token = store.generate(member, None).await.unwrap();

        store.revoke(&token.value).await.unwrap();
        let first = store.get(&token.value).await.unwrap().unwrap();
        assert!(first.revoked);
        let revoked_at: DateTime<Utc> = first.revoked_at.unwrap();

        store.revoke(&token.value).await.unwrap();
        let second = store.get(&token.value).await.unwrap().unwrap();
        assert_eq!(second.revoked_at, Some(revoked_at));

        assert_eq!(
            store.validate(&token.value, None).await.unwrap(),
            TokenState::Revoked
        );
        assert!(matches!(
            store.require_valid(&token.value, member).await,
            Err(StorageError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_revoke_unknown_token() {
        let (_db, store, _member) = setup().await;
        let unknown = TokenValue::new("nope").unwrap();

        assert!(matches!(
            store.revoke(&unknown).await,
            Err(StorageError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_list_for_member_newest_first() {
        let (_db, store, member) = setup().await;

        let mut issued = Vec::new();
        for _ in 0..3 {
            issued.push(store.generate(member, None).await.unwrap());
        }

        let listed = store.list_for_member(member).await.unwrap();
        let listed_ids: Vec<i64> = listed.iter().map(|t| t.id).collect();
        let expected: Vec<i64> = issued.iter().rev().map(|t| t.id).collect();
        assert_eq!(listed_ids, expected);
    }

    /// Repository that reports the first `collisions` values as taken.
    struct CollidingRepository {
        inner: SqliteTokenRepository,
        collisions: usize,
        checks: AtomicUsize,
    }

    impl TokenRepository for CollidingRepository {
        async fn find_by_value(&self, value: &TokenValue) -> StorageResult<Option<Token>> {
            self.inner.find_by_value(value).await
        }

        async fn exists_by_value(&self, value: &TokenValue) -> StorageResult<bool> {
            let n = self.checks.fetch_add(1, Ordering::SeqCst);
            if n < self.collisions {
                return Ok(true);
            }
            self.inner.exists_by_value(value).await
        }

        async fn insert(&self, token: &NewToken) -> StorageResult<Token> {
            self.inner.insert(token).await
        }

        async fn revoke(&self, value: &TokenValue, at: DateTime<Utc>) -> StorageResult<bool> {
            self.inner.revoke(value, at).await
        }

        async fn find_by_member(&self, member_id: MemberId) -> StorageResult<Vec<Token>> {
            self.inner.find_by_member(member_id).await
        }

        async fn count_expired(&self, now: DateTime<Utc>) -> StorageResult<u64> {
            self.inner.count_expired(now).await
        }
    }

    fn colliding_store(
        db: &Database,
        collisions: usize,
    ) -> TokenStore<CollidingRepository, SqliteMemberDirectory> {
        TokenStore::new(
            CollidingRepository {
                inner: SqliteTokenRepository::new(db.pool().clone()),
                collisions,
                checks: AtomicUsize::new(0),
            },
            SqliteMemberDirectory::new(db.pool().clone()),
        )
    }

    #[tokio::test]
    async fn test_collisions_are_retried_silently() {
        let (db, _store, member) = setup().await;
        let store = colliding_store(&db, MAX_GENERATION_ATTEMPTS - 1);

        assert!(store.generate(member, None).await.is_ok());
    }

    #[tokio::test]
    async fn test_generation_gives_up_after_max_attempts() {
        let (db, _store, member) = setup().await;
        let store = colliding_store(&db, MAX_GENERATION_ATTEMPTS);

        assert!(matches!(
            store.generate(member, None).await,
            Err(StorageError::Internal(_))
        ));
    }
}
