//! Services layer - Business logic
//!
//! This module contains the authentication core and the user profile logic.
//! Services are responsible for:
//! - Implementing business rules
//! - Coordinating between repositories
//! - Handling validation and error cases

pub mod error;
pub mod password;
pub mod session;
pub mod sweeper;
pub mod user;

pub use error::AuthError;
pub use password::CredentialVerifier;
pub use session::SessionManager;
pub use sweeper::{spawn_session_sweeper, SessionSweeper};
pub use user::{validate_login_input, RegisterInput, UserService};
