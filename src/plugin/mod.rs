//! Plugin seams: the identity store, policy store and checker traits, plus
//! the factory types the registries hold.

mod registry;

pub use registry::Registry;

use std::sync::Arc;

use crate::api::{
    BatchWriteResponse, CreateGroup, CreateStrategy, CreateUser, LoginRequest, LoginResponse, ModifyGroup,
    ModifyStrategy, ModifyUser, ModifyUserPassword, PrincipalResources, QueryParams, QueryResponse, TokenInfo,
};
use crate::checker::Decision;
use crate::config::PluginEntry;
use crate::context::AcquireContext;
use crate::error::AuthResult;
use crate::history::HistorySink;
use crate::model::{GroupView, OperatorInfo, PrincipalRef, StrategyDetail, User, UserGroup, UserView};
use crate::store::{AuthSnapshot, SharedAuthState};

pub trait UserOperations: Send + Sync {
    /// Batch create; each item commits on its own.
    fn create_users(&self, users: Vec<CreateUser>) -> BatchWriteResponse;
    fn update_user(&self, req: ModifyUser) -> AuthResult<UserView>;
    fn update_user_password(&self, req: ModifyUserPassword) -> AuthResult<()>;
    fn delete_users(&self, ids: Vec<String>) -> BatchWriteResponse;
    fn get_users(&self, query: &QueryParams) -> AuthResult<QueryResponse<UserView>>;
    /// Full stored record of a valid user, token included.
    fn user_record(&self, id: &str) -> AuthResult<User>;
    fn get_user_token(&self, id: &str) -> AuthResult<TokenInfo>;
    /// Flip the enabled flag; the token value is kept.
    fn update_user_token(&self, id: &str, enable: bool) -> AuthResult<()>;
    /// Rotate the token. The previous value stops resolving immediately.
    fn reset_user_token(&self, id: &str) -> AuthResult<TokenInfo>;
    fn login(&self, req: &LoginRequest) -> AuthResult<LoginResponse>;
}

pub trait GroupOperations: Send + Sync {
    fn create_group(&self, req: CreateGroup) -> AuthResult<GroupView>;
    fn update_groups(&self, reqs: Vec<ModifyGroup>) -> BatchWriteResponse;
    fn delete_groups(&self, ids: Vec<String>) -> BatchWriteResponse;
    fn get_groups(&self, query: &QueryParams) -> AuthResult<QueryResponse<GroupView>>;
    fn get_group(&self, id: &str) -> AuthResult<GroupView>;
    fn group_record(&self, id: &str) -> AuthResult<UserGroup>;
    fn get_group_token(&self, id: &str) -> AuthResult<TokenInfo>;
    fn update_group_token(&self, id: &str, enable: bool) -> AuthResult<()>;
    fn reset_group_token(&self, id: &str) -> AuthResult<TokenInfo>;
    /// Ids of the valid groups the user is a member of.
    fn groups_of_user(&self, user_id: &str) -> AuthResult<Vec<String>>;
}

/// Users and groups together, the unit selected by the `user` config entry.
pub trait IdentityStore: UserOperations + GroupOperations {
    fn name(&self) -> &str;

    /// Whether the reference names a live user or group.
    fn principal_exists(&self, principal: &PrincipalRef) -> bool {
        match principal.role {
            crate::model::PrincipalRole::User => self.user_record(&principal.id).is_ok(),
            crate::model::PrincipalRole::Group => self.group_record(&principal.id).is_ok(),
        }
    }
}

pub trait PolicyStore: Send + Sync {
    fn name(&self) -> &str;
    fn create_strategy(&self, req: CreateStrategy) -> AuthResult<StrategyDetail>;
    fn update_strategies(&self, reqs: Vec<ModifyStrategy>) -> BatchWriteResponse;
    fn delete_strategies(&self, ids: Vec<String>) -> BatchWriteResponse;
    fn get_strategies(&self, query: &QueryParams) -> AuthResult<QueryResponse<StrategyDetail>>;
    fn get_strategy(&self, id: &str) -> AuthResult<StrategyDetail>;
    fn get_principal_resources(&self, principal: &PrincipalRef) -> AuthResult<PrincipalResources>;
    /// Valid strategies binding the principal directly or, for users, through a group.
    fn principal_strategies(&self, principal: &PrincipalRef) -> AuthResult<Vec<StrategyDetail>>;
    /// `principal_strategies` read from a snapshot the caller already holds, so
    /// identity resolution and strategy lookup see the same state.
    fn principal_strategies_in(&self, snap: &AuthSnapshot, principal: &PrincipalRef) -> AuthResult<Vec<StrategyDetail>> {
        Ok(snap.strategies_for(principal))
    }
    /// Keep default strategies in step with a completed resource create/modify/delete.
    fn after_resource_operation(&self, ctx: &AcquireContext) -> AuthResult<()>;
}

pub trait CredentialVerifier: Send + Sync {
    /// Resolve the context's token and attach the resulting identity to it.
    fn verify(&self, ctx: &mut AcquireContext) -> AuthResult<OperatorInfo>;
    fn is_open_client_auth(&self) -> bool;
    fn is_open_console_auth(&self) -> bool;
}

pub trait PermissionChecker: Send + Sync {
    fn check_client_permission(&self, ctx: &mut AcquireContext) -> AuthResult<Decision>;
    fn check_console_permission(&self, ctx: &mut AcquireContext) -> AuthResult<Decision>;
}

pub trait AuthChecker: CredentialVerifier + PermissionChecker {
    fn name(&self) -> &str;
}

/// Collaborators handed to every factory.
#[derive(Clone)]
pub struct PluginContext {
    pub state: SharedAuthState,
    pub history: Arc<dyn HistorySink>,
}

pub type IdentityStoreFactory =
    Arc<dyn Fn(&PluginEntry, &PluginContext) -> AuthResult<Arc<dyn IdentityStore>> + Send + Sync>;

pub type PolicyStoreFactory = Arc<
    dyn Fn(&PluginEntry, &PluginContext, Arc<dyn IdentityStore>) -> AuthResult<Arc<dyn PolicyStore>> + Send + Sync,
>;

pub type CheckerFactory = Arc<
    dyn Fn(&PluginEntry, &PluginContext, Arc<dyn IdentityStore>, Arc<dyn PolicyStore>) -> AuthResult<Arc<dyn AuthChecker>>
        + Send
        + Sync,
>;
