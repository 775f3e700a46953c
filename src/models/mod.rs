//! Data models
//!
//! Database entities (User, Session) and the inputs used to create or
//! update them.

mod session;
mod user;

pub use session::Session;
pub use user::{NewUser, UpdateUserInput, User, UserPublic};
