pub mod member;
pub mod token;

pub use member::{Member, MemberStatus};
pub use token::Token;
