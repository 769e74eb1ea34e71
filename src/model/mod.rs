//! Records owned by the identity and policy stores, plus the derived operator identity.
//! Users and groups live in `user`, strategies and principals in `strategy`.

mod operator;
mod resource;
mod strategy;
mod user;

pub use operator::{OperatorInfo, ANONYMOUS_OPERATOR_ID};
pub use resource::{Operation, ResourceEntry, ResourceType};
pub use strategy::{Principal, PrincipalRef, PrincipalRole, StrategyAction, StrategyDetail, StrategyResource, WILDCARD_RESOURCE};
pub use user::{GroupView, User, UserGroup, UserRole, UserView};

/// Fresh 32-hex id for users, groups and strategies.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Fresh revision stamp; changes on every strategy mutation.
pub fn new_revision() -> String {
    uuid::Uuid::new_v4().to_string()
}
