//! Authentication for the help-desk gateway.
//!
//! Tokens are HS256 JWTs. Revocation is tracked in an in-process
//! [`RevocationList`] that the [`TokenIssuer`] consults before trusting any
//! token; a background sweeper bounds its memory.

pub mod error;
pub mod password;
pub mod revocation;
pub mod service;
pub mod token;

pub use error::{AuthError, Result};
pub use password::{
    hash_password, hash_password_blocking, verify_password, verify_password_blocking,
};
pub use revocation::{DEFAULT_SWEEP_INTERVAL, RevocationList, SweeperHandle};
pub use service::{AuthResponse, AuthService};
pub use token::{ACCESS_TOKEN_TTL, Claims, REFRESH_TOKEN_TTL, TokenIssuer, TokenPair};
