//! Opaque bearer tokens: URL-safe base64 of `<u|g>:<principal id>:<nonce>`.
//! The nonce changes on every issue, so a rotated token never matches the stored value again.

use base64::Engine;

use crate::error::{AuthError, AuthResult};
use crate::model::PrincipalRole;

const NONCE_BYTES: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    pub role: PrincipalRole,
    pub principal_id: String,
}

fn role_tag(role: PrincipalRole) -> &'static str {
    match role {
        PrincipalRole::User => "u",
        PrincipalRole::Group => "g",
    }
}

fn gen_nonce() -> AuthResult<String> {
    let mut buf = [0u8; NONCE_BYTES];
    getrandom::getrandom(&mut buf).map_err(|e| AuthError::internal(format!("token nonce: {}", e)))?;
    Ok(buf.iter().map(|b| format!("{:02x}", b)).collect())
}

pub fn issue_token(role: PrincipalRole, principal_id: &str) -> AuthResult<String> {
    let raw = format!("{}:{}:{}", role_tag(role), principal_id, gen_nonce()?);
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(raw.as_bytes()))
}

/// Decode a token into its claims. Anything that is not a well-formed token is
/// `InvalidCredential`; whether the claims still resolve is the verifier's concern.
pub fn parse_token(token: &str) -> AuthResult<TokenClaims> {
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(token.trim())
        .map_err(|_| AuthError::invalid_credential("token is not valid base64"))?;
    let raw = String::from_utf8(bytes).map_err(|_| AuthError::invalid_credential("token is not utf-8"))?;
    let mut parts = raw.splitn(3, ':');
    let (Some(tag), Some(id), Some(nonce)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(AuthError::invalid_credential("token has too few segments"));
    };
    let role = match tag {
        "u" => PrincipalRole::User,
        "g" => PrincipalRole::Group,
        _ => return Err(AuthError::invalid_credential("token has unknown principal tag")),
    };
    if id.is_empty() || nonce.len() != NONCE_BYTES * 2 || !nonce.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(AuthError::invalid_credential("token segments are malformed"));
    }
    Ok(TokenClaims { role, principal_id: id.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_then_parse() {
        let t = issue_token(PrincipalRole::Group, "abc123").unwrap();
        let claims = parse_token(&t).unwrap();
        assert_eq!(claims.role, PrincipalRole::Group);
        assert_eq!(claims.principal_id, "abc123");
    }

    #[test]
    fn every_issue_is_fresh() {
        let a = issue_token(PrincipalRole::User, "u1").unwrap();
        let b = issue_token(PrincipalRole::User, "u1").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn malformed_tokens_are_invalid_credentials() {
        let not_b64 = parse_token("%%%").unwrap_err();
        assert!(matches!(not_b64, AuthError::InvalidCredential { .. }));

        let enc = |s: &str| base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(s.as_bytes());
        for raw in ["u:abc", "x:abc:00112233445566778899aabbccddeeff", "u::00112233445566778899aabbccddeeff", "u:abc:zz"] {
            let err = parse_token(&enc(raw)).unwrap_err();
            assert!(matches!(err, AuthError::InvalidCredential { .. }), "expected invalid for {}", raw);
        }
    }
}
