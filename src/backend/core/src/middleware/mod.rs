//! HTTP middleware for the Covenant gateway.
pub mod auth;

pub use auth::{AuthError, AuthLayer, AuthService, AuthSettings, Authenticator, Claims};
