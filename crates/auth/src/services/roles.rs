use std::sync::Arc;

use tracing::{info, instrument};

use capita_core::UserId;

use crate::error::{AuthError, AuthResult};
use crate::identity::{Identity, normalize_email};
use crate::ports::RoleStore;
use crate::principal::UserPrincipal;
use crate::roles::Role;

/// Role lookups and user/role association.
pub struct RoleAuthority<S> {
    store: Arc<S>,
}

impl<S> Clone for RoleAuthority<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: RoleStore> RoleAuthority<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Fails with `RoleNotFound` (and writes nothing) for an unknown role.
    /// A failed insert is a store fault, not a missing role.
    #[instrument(skip(self), err)]
    pub async fn add_role_to_user(&self, user_id: UserId, role_name: &str) -> AuthResult<()> {
        let role = self.role_by_name(role_name).await?;
        self.store.assign_role(user_id, role.id).await?;
        info!(role = %role.name, "role assigned");
        Ok(())
    }

    pub async fn role_by_name(&self, role_name: &str) -> AuthResult<Role> {
        self.store
            .find_role_by_name(role_name)
            .await?
            .ok_or_else(|| AuthError::RoleNotFound(role_name.to_string()))
    }

    pub async fn role_by_user_id(&self, user_id: UserId) -> AuthResult<Role> {
        self.store
            .role_for_user(user_id)
            .await?
            .ok_or_else(|| AuthError::RoleNotFound(format!("user {user_id}")))
    }

    pub async fn role_by_user_email(&self, email: &str) -> AuthResult<Role> {
        let email = normalize_email(email);
        self.store
            .role_for_email(&email)
            .await?
            .ok_or(AuthError::RoleNotFound(email))
    }

    /// The identity together with the role its tokens are minted from.
    pub async fn principal_for(&self, identity: Identity) -> AuthResult<UserPrincipal> {
        let role = self.role_by_user_id(identity.id).await?;
        Ok(UserPrincipal::new(identity, role))
    }
}
