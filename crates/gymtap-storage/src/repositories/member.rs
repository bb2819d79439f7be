#![allow(async_fn_in_trait)]

use gymtap_core::MemberId;
use sqlx::SqlitePool;

use crate::error::{StorageError, StorageResult};
use crate::models::{Member, MemberStatus};

/// Read side of the member directory consumed by the token store.
pub trait MemberDirectory: Send + Sync {
    /// Whether the member exists (any status other than `deleted`)
    async fn member_exists(&self, member_id: MemberId) -> StorageResult<bool>;

    /// Find a member by ID, including soft-deleted ones
    async fn find_by_id(&self, member_id: MemberId) -> StorageResult<Option<Member>>;
}

/// SQLite implementation of MemberDirectory
#[derive(Debug, Clone)]
pub struct SqliteMemberDirectory {
    pool: SqlitePool,
}

impl SqliteMemberDirectory {
    /// Create a new SQLite member directory
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Register a member with status `active`.
    pub async fn insert(&self, name: &str) -> StorageResult<Member> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StorageError::Validation(
                "Member name must not be empty".to_string(),
            ));
        }

        let member = sqlx::query_as::<_, Member>(
            r#"
            INSERT INTO members (name)
            VALUES (?)
            RETURNING id, name, status, created_at, updated_at
            "#,
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;

        Ok(member)
    }

    /// Change a member's status (`deleted` is the soft delete).
    pub async fn set_status(&self, member_id: MemberId, status: MemberStatus) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE members
            SET status = ?, updated_at = datetime('now')
            WHERE id = ?
            "#,
        )
        .bind(status)
        .bind(member_id.get())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound {
                entity_type: "Member".to_string(),
                field: "id".to_string(),
                value: member_id.to_string(),
            });
        }

        Ok(())
    }
}

impl MemberDirectory for SqliteMemberDirectory {
    async fn member_exists(&self, member_id: MemberId) -> StorageResult<bool> {
        let result: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM members WHERE id = ? AND status != 'deleted'")
                .bind(member_id.get())
                .fetch_one(&self.pool)
                .await?;

        Ok(result.0 > 0)
    }

    async fn find_by_id(&self, member_id: MemberId) -> StorageResult<Option<Member>> {
        let member = sqlx::query_as::<_, Member>(
            r#"
            SELECT id, name, status, created_at, updated_at
            FROM members
            WHERE id = ?
            "#,
        )
        .bind(member_id.get())
        .fetch_optional(&self.pool)
        .await?;

        Ok(member)
    }
}
