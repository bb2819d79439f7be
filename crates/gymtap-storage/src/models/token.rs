use chrono::{DateTime, Utc};
use gymtap_core::{MemberId, TokenState, TokenValue};
use serde::{Deserialize, Serialize};

/// Access token minted for a member.
///
/// The lifecycle state is never stored: it is derived from `revoked` and
/// `expires_at` at the moment it is asked for, so a token expires without
/// any write to the database. Revocation is the only mutation and it is
/// irreversible.
///
/// # Database Schema
///
/// Maps to the `tokens` table:
/// - `value` is unique
/// - `member_id` references `members(id)` with `ON DELETE CASCADE`
/// - `revoked_at` is set by the first revoke and never overwritten
///
/// # Examples
///
/// ```
/// use chrono::{Duration, Utc};
/// use gymtap_core::{MemberId, TokenState, TokenValue};
/// use gymtap_storage::models::Token;
///
/// let issued_at = Utc::now();
/// let token = Token {
///     id: 1,
///     value: TokenValue::new("abc123").unwrap(),
///     member_id: MemberId::new(42).unwrap(),
///     issued_at,
///     expires_at: Some(issued_at + Duration::days(30)),
///     revoked: false,
///     revoked_at: None,
/// };
///
/// assert_eq!(token.state_at(issued_at), TokenState::Valid);
/// assert_eq!(token.state_at(issued_at + Duration::days(31)), TokenState::Expired);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Token {
    pub id: i64,

    #[sqlx(try_from = "String")]
    pub value: TokenValue,

    #[sqlx(try_from = "i64")]
    pub member_id: MemberId,

    pub issued_at: DateTime<Utc>,

    /// `None` means the token never expires.
    pub expires_at: Option<DateTime<Utc>>,

    pub revoked: bool,

    pub revoked_at: Option<DateTime<Utc>>,
}

impl Token {
    /// Lifecycle state at `now`.
    pub fn state_at(&self, now: DateTime<Utc>) -> TokenState {
        TokenState::derive(self.revoked, self.expires_at, now)
    }

    /// Lifecycle state right now.
    pub fn state(&self) -> TokenState {
        self.state_at(Utc::now())
    }

    pub fn is_valid(&self) -> bool {
        self.state().is_valid()
    }
}
