use super::*;

#[test]
fn http_status_mapping() {
    assert_eq!(AuthError::invalid_credential("bad").http_status(), 401);
    assert_eq!(AuthError::credential_disabled("off").http_status(), 401);
    assert_eq!(AuthError::identity_not_found("gone").http_status(), 401);
    assert_eq!(AuthError::PermissionDenied { resource: "namespaces/ns1".into(), reason: "explicit_deny".into() }.http_status(), 403);
    assert_eq!(AuthError::not_found("missing").http_status(), 404);
    assert_eq!(AuthError::conflict("dup").http_status(), 409);
    assert_eq!(AuthError::validation("oops").http_status(), 400);
    assert_eq!(AuthError::NotInitialized { kind: "checker".into() }.http_status(), 500);
    assert_eq!(AuthError::internal("panic").http_status(), 500);
}

#[test]
fn authentication_failures_are_grouped() {
    assert!(AuthError::invalid_credential("x").is_authentication_failure());
    assert!(AuthError::credential_disabled("x").is_authentication_failure());
    assert!(AuthError::identity_not_found("x").is_authentication_failure());
    assert!(!AuthError::not_found("x").is_authentication_failure());
    assert!(!AuthError::Cancelled.is_authentication_failure());
}

#[test]
fn response_code_mapping() {
    assert_eq!(AuthError::validation("x").response_code(), ResponseCode::InvalidParameter);
    assert_eq!(AuthError::conflict("x").response_code(), ResponseCode::Conflict);
    assert_eq!(AuthError::credential_disabled("x").response_code(), ResponseCode::TokenDisabled);
    assert_eq!(AuthError::DuplicatePluginName { kind: "user".into(), name: "defaultUser".into() }.response_code(), ResponseCode::Internal);
}

#[test]
fn display_carries_context() {
    let err = AuthError::PermissionDenied { resource: "services/orders".into(), reason: "explicit_deny".into() };
    assert_eq!(err.to_string(), "permission denied on services/orders: explicit_deny");
    assert_eq!(err.code_str(), "permission_denied");
}
