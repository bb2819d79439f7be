use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Member lifecycle status.
///
/// Deleting a member is a soft delete: the row stays with status
/// `deleted` and the member no longer counts as existing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    Active,
    Inactive,
    Deleted,
}

/// Gym member as seen by the token store.
///
/// Member management lives elsewhere; tokens only need to know whether
/// the owner exists and whether it may receive new cards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Member {
    pub id: i64,
    pub name: String,
    pub status: MemberStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Member {
    /// Whether the member counts as existing for token operations.
    pub fn exists(&self) -> bool {
        self.status != MemberStatus::Deleted
    }
}
