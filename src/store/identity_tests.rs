use super::*;
use crate::api::ResponseCode;
use crate::model::{ResourceType, WILDCARD_RESOURCE};

fn store() -> DefaultIdentityStore {
    DefaultIdentityStore::new(
        SharedAuthState::in_memory(),
        UserStoreOptions { password_memory_kib: 64, password_iterations: 1 },
    )
}

fn new_user(name: &str, owner: &str) -> CreateUser {
    CreateUser { name: name.into(), password: "passw0rd".into(), owner: owner.into(), ..Default::default() }
}

fn create(store: &DefaultIdentityStore, name: &str, owner: &str) -> String {
    let resp = store.create_users(vec![new_user(name, owner)]);
    assert_eq!(resp.code, ResponseCode::Success, "{:?}", resp);
    resp.responses[0].id.clone().unwrap()
}

#[test]
fn main_account_gets_wildcard_default_strategy() {
    let s = store();
    let id = create(&s, "alice", "");
    let snap = s.state().snapshot();
    let def = snap.default_strategy_of(&PrincipalRef::user(&id)).unwrap();
    assert_eq!(def.owner, id);
    assert!(def.has_resource(ResourceType::Services, WILDCARD_RESOURCE));
    assert_eq!(s.user_record(&id).unwrap().user_type, UserRole::Owner);
}

#[test]
fn sub_account_requires_live_owner() {
    let s = store();
    let resp = s.create_users(vec![new_user("bob", "missing")]);
    assert_eq!(resp.code, ResponseCode::NotFound);

    let owner = create(&s, "alice", "");
    let bob = create(&s, "bob", &owner);
    let rec = s.user_record(&bob).unwrap();
    assert_eq!(rec.user_type, UserRole::SubAccount);
    assert_eq!(rec.tenant_id(), owner);
    let def = s.state().snapshot().default_strategy_of(&PrincipalRef::user(&bob)).cloned().unwrap();
    assert_eq!(def.owner, owner);
    assert!(def.resources.is_empty());

    // A sub-account cannot own further sub-accounts.
    let nested = s.create_users(vec![new_user("carol", &bob)]);
    assert_eq!(nested.code, ResponseCode::NotFound);
}

#[test]
fn duplicate_names_conflict_per_owner() {
    let s = store();
    let a = create(&s, "alice", "");
    let resp = s.create_users(vec![new_user("alice", ""), new_user("alice", &a)]);
    assert_eq!(resp.code, ResponseCode::PartialFailure);
    assert_eq!(resp.responses[0].code, ResponseCode::Conflict);
    assert_eq!(resp.responses[1].code, ResponseCode::Success);
}

#[test]
fn invalid_passwords_and_names_are_rejected() {
    let s = store();
    let mut short = new_user("alice", "");
    short.password = "123".into();
    let mut bad_name = new_user("al ice", "");
    bad_name.password = "passw0rd".into();
    let resp = s.create_users(vec![short, bad_name]);
    assert_eq!(resp.code, ResponseCode::InvalidParameter);
    assert_eq!(s.get_users(&QueryParams::new()).unwrap().total, 0);
}

#[test]
fn deleting_owner_with_sub_accounts_conflicts() {
    let s = store();
    let owner = create(&s, "alice", "");
    let bob = create(&s, "bob", &owner);
    assert_eq!(s.delete_users(vec![owner.clone()]).code, ResponseCode::Conflict);
    assert_eq!(s.delete_users(vec![bob.clone(), owner.clone()]).code, ResponseCode::Success);
    assert!(matches!(s.user_record(&owner), Err(AuthError::NotFound { .. })));
    assert!(s.state().snapshot().default_strategy_of(&PrincipalRef::user(&owner)).is_none());
}

#[test]
fn deleting_user_drops_group_membership() {
    let s = store();
    let owner = create(&s, "alice", "");
    let bob = create(&s, "bob", &owner);
    let g = s.create_group(CreateGroup { name: "ops".into(), owner: owner.clone(), user_ids: vec![bob.clone()], ..Default::default() }).unwrap();
    assert_eq!(s.groups_of_user(&bob).unwrap(), vec![g.id.clone()]);
    s.delete_users(vec![bob.clone()]);
    assert!(s.get_group(&g.id).unwrap().user_ids.is_empty());
}

#[test]
fn group_members_must_be_tenant_users() {
    let s = store();
    let alice = create(&s, "alice", "");
    let other = create(&s, "zed", "");
    let err = s
        .create_group(CreateGroup { name: "ops".into(), owner: alice.clone(), user_ids: vec![other], ..Default::default() })
        .unwrap_err();
    assert!(matches!(err, AuthError::Validation { .. }));
    let err = s
        .create_group(CreateGroup { name: "ops".into(), owner: alice, user_ids: vec!["ghost".into()], ..Default::default() })
        .unwrap_err();
    assert!(matches!(err, AuthError::NotFound { .. }));
}

#[test]
fn group_update_and_delete() {
    let s = store();
    let owner = create(&s, "alice", "");
    let bob = create(&s, "bob", &owner);
    let g = s.create_group(CreateGroup { name: "ops".into(), owner: owner.clone(), ..Default::default() }).unwrap();
    let resp = s.update_groups(vec![
        ModifyGroup { id: g.id.clone(), add_user_ids: vec![bob.clone()], comment: Some("on-call".into()), ..Default::default() },
        ModifyGroup { id: "nope".into(), ..Default::default() },
    ]);
    assert_eq!(resp.code, ResponseCode::PartialFailure);
    let view = s.get_group(&g.id).unwrap();
    assert_eq!(view.user_ids, vec![bob.clone()]);
    assert_eq!(view.comment, "on-call");

    assert_eq!(s.delete_groups(vec![g.id.clone()]).code, ResponseCode::Success);
    assert!(s.groups_of_user(&bob).unwrap().is_empty());
    assert!(s.state().snapshot().default_strategy_of(&PrincipalRef::group(&g.id)).is_none());
}

#[test]
fn token_enable_keeps_value_and_reset_rotates() {
    let s = store();
    let id = create(&s, "alice", "");
    let before = s.get_user_token(&id).unwrap();
    s.update_user_token(&id, false).unwrap();
    let disabled = s.get_user_token(&id).unwrap();
    assert_eq!(disabled.token, before.token);
    assert!(!disabled.enabled);

    let rotated = s.reset_user_token(&id).unwrap();
    assert_ne!(rotated.token, before.token);
    assert!(!rotated.enabled);
}

#[test]
fn login_paths() {
    let s = store();
    let owner = create(&s, "alice", "");
    let bob = create(&s, "bob", &owner);

    let ok = s.login(&LoginRequest { owner: None, name: "alice".into(), password: "passw0rd".into() }).unwrap();
    assert_eq!(ok.user_id, owner);
    assert_eq!(ok.token, s.get_user_token(&owner).unwrap().token);

    let sub = s.login(&LoginRequest { owner: Some("alice".into()), name: "bob".into(), password: "passw0rd".into() }).unwrap();
    assert_eq!(sub.user_id, bob);
    assert_eq!(sub.owner_id, owner);

    let bad = s.login(&LoginRequest { owner: None, name: "alice".into(), password: "wrong-pw".into() }).unwrap_err();
    assert!(matches!(bad, AuthError::InvalidCredential { .. }));
    let unknown = s.login(&LoginRequest { owner: None, name: "nobody".into(), password: "passw0rd".into() }).unwrap_err();
    assert!(matches!(unknown, AuthError::InvalidCredential { .. }));

    s.update_user_token(&owner, false).unwrap();
    let disabled = s.login(&LoginRequest { owner: None, name: "alice".into(), password: "passw0rd".into() }).unwrap_err();
    assert!(matches!(disabled, AuthError::CredentialDisabled { .. }));
}

#[test]
fn password_change_checks_old_password() {
    let s = store();
    let id = create(&s, "alice", "");
    let wrong = s.update_user_password(ModifyUserPassword { id: id.clone(), old_password: Some("nope-nope".into()), new_password: "n3wpass".into() });
    assert!(matches!(wrong, Err(AuthError::InvalidCredential { .. })));
    s.update_user_password(ModifyUserPassword { id: id.clone(), old_password: Some("passw0rd".into()), new_password: "n3wpass".into() }).unwrap();
    assert!(s.login(&LoginRequest { owner: None, name: "alice".into(), password: "n3wpass".into() }).is_ok());
}

#[test]
fn user_queries_filter_and_page() {
    let s = store();
    let owner = create(&s, "alice", "");
    create(&s, "svc-a", &owner);
    create(&s, "svc-b", &owner);
    create(&s, "ops", &owner);

    let subs = s.get_users(&QueryParams::new().with("name", "svc-*")).unwrap();
    assert_eq!(subs.total, 2);
    assert_eq!(subs.items[0].name, "svc-a");

    let paged = s.get_users(&QueryParams::new().with("owner", owner.as_str()).with("offset", "1").with("limit", "2")).unwrap();
    assert_eq!(paged.total, 4);
    assert_eq!(paged.items.len(), 2);

    assert!(s.get_users(&QueryParams::new().with("limit", "x")).is_err());
}

#[test]
fn unknown_options_fail_at_load() {
    let entry = PluginEntry::named(DEFAULT_USER_PLUGIN).with_option("password_cost", 3);
    assert!(matches!(DefaultIdentityStore::from_entry(&entry, SharedAuthState::in_memory()), Err(AuthError::Validation { .. })));
    let zero = PluginEntry::named(DEFAULT_USER_PLUGIN).with_option("password_iterations", 0);
    assert!(DefaultIdentityStore::from_entry(&zero, SharedAuthState::in_memory()).is_err());
}
