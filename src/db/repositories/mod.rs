//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles the queries for a single table.

pub mod session;
pub mod user;

pub use session::{generate_token, SessionRepository, SqlxSessionRepository};
pub use user::{SqlxUserRepository, UserRepository};
