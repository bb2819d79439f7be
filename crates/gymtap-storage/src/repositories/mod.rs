pub mod member;
pub mod token;

pub use member::{MemberDirectory, SqliteMemberDirectory};
pub use token::{NewToken, SqliteTokenRepository, TokenRepository};
