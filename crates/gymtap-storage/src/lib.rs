//! Storage layer for GymTap.
//!
//! SQLite persistence for access tokens and the member directory they
//! reference, plus the [`TokenStore`] lifecycle service built on top.
//!
//! # Architecture
//!
//! - [`Database`] - connection pool with embedded migrations
//! - [`TokenRepository`], [`MemberDirectory`] - data access traits
//! - [`TokenStore`] - generate, validate, revoke, list
//!
//! Token state (valid, expired, revoked) is derived on read and never
//! stored; revocation is the only mutation and is a single UPDATE, so
//! concurrent revokes are safe without extra locking.
//!
//! # Example
//!
//! ```no_run
//! use gymtap_core::MemberId;
//! use gymtap_storage::{Database, DatabaseConfig, TokenStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new(DatabaseConfig::new("gymtap.db")).await?;
//! let store = TokenStore::sqlite(&db);
//!
//! for token in store.list_for_member(MemberId::new(42)?).await? {
//!     println!("{} {}", token.value.redacted(), token.state());
//! }
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod error;
pub mod models;
pub mod repositories;
pub mod token_store;

pub use connection::{Database, DatabaseConfig};
pub use error::{StorageError, StorageResult};
pub use models::{Member, MemberStatus, Token};
pub use repositories::{
    MemberDirectory, NewToken, SqliteMemberDirectory, SqliteTokenRepository, TokenRepository,
};
pub use token_store::TokenStore;

/// [`TokenStore`] over the SQLite repositories.
pub type SqliteTokenStore = TokenStore<SqliteTokenRepository, SqliteMemberDirectory>;
