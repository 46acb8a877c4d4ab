//! Passwords, session tokens and request authentication

pub mod password;
pub mod session;
pub mod token;

pub use session::{CurrentUser, MaybeUser, Session};
pub use token::{Claims, JwtKeys};
