//! Token and password primitives used by the identity store and the verifier.

pub mod password;
pub mod token;

pub use password::{hash_password, validate_password, verify_password, HashParams};
pub use token::{issue_token, parse_token, TokenClaims};
