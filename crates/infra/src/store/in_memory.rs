use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use capita_auth::{
    Identity, IdentityStore, NewIdentity, Role, RoleStore, StoreError, StoreResult,
    VerificationCode, VerificationLink, VerificationStore, default_roles,
};
use capita_core::{RoleId, UserId};

#[derive(Debug, Default)]
struct State {
    identities: HashMap<UserId, Identity>,
    roles: HashMap<RoleId, Role>,
    user_roles: HashMap<UserId, RoleId>,
    // keyed by owner: one live code / pending reset per user
    mfa_codes: HashMap<UserId, VerificationCode>,
    reset_links: HashMap<UserId, VerificationLink>,
    account_links: HashMap<String, VerificationLink>,
}

impl State {
    fn identity_by_email(&self, email: &str) -> Option<&Identity> {
        self.identities.values().find(|i| i.email == email)
    }

    fn role_of(&self, user_id: UserId) -> Option<Role> {
        let role_id = self.user_roles.get(&user_id)?;
        self.roles.get(role_id).cloned()
    }

    fn identity_mut(&mut self, id: UserId) -> StoreResult<&mut Identity> {
        self.identities
            .get_mut(&id)
            .ok_or_else(|| StoreError::backend(format!("identity {id} does not exist")))
    }
}

/// In-memory implementation of every auth store port.
///
/// Intended for tests/dev. Every operation takes the single lock once, so
/// replace-per-user and consume-and-delete are atomic.
#[derive(Debug)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Seeded with the default roles.
    pub fn new() -> Self {
        Self::with_roles(default_roles())
    }

    pub fn with_roles(roles: Vec<Role>) -> Self {
        let state = State {
            roles: roles.into_iter().map(|r| (r.id, r)).collect(),
            ..State::default()
        };
        Self {
            state: RwLock::new(state),
        }
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| StoreError::backend("lock poisoned"))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| StoreError::backend("lock poisoned"))
    }
}

#[async_trait]
impl IdentityStore for InMemoryStore {
    async fn register_identity(
        &self,
        new: NewIdentity,
        role_id: RoleId,
        account_link: VerificationLink,
    ) -> StoreResult<Identity> {
        let mut state = self.write()?;
        if state.identity_by_email(&new.email).is_some() {
            return Err(StoreError::Conflict(format!("email {} already exists", new.email)));
        }
        if state.identities.contains_key(&new.id) {
            return Err(StoreError::Conflict(format!("identity {} already exists", new.id)));
        }
        if !state.roles.contains_key(&role_id) {
            return Err(StoreError::backend(format!("role {role_id} does not exist")));
        }
        if state.account_links.contains_key(&account_link.key) {
            return Err(StoreError::Conflict(format!("link key {} already exists", account_link.key)));
        }
        // all checks pass before the first insert
        let identity = new.into_identity();
        state.identities.insert(identity.id, identity.clone());
        state.user_roles.insert(identity.id, role_id);
        state.account_links.insert(account_link.key.clone(), account_link);
        Ok(identity)
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<Identity>> {
        Ok(self.read()?.identity_by_email(email).cloned())
    }

    async fn find_by_id(&self, id: UserId) -> StoreResult<Option<Identity>> {
        Ok(self.read()?.identities.get(&id).cloned())
    }

    async fn email_exists(&self, email: &str) -> StoreResult<bool> {
        Ok(self.read()?.identity_by_email(email).is_some())
    }

    async fn enable_identity(&self, id: UserId) -> StoreResult<bool> {
        let mut state = self.write()?;
        let identity = state.identity_mut(id)?;
        let changed = !identity.enabled;
        identity.enabled = true;
        Ok(changed)
    }

    async fn set_locked(&self, id: UserId, locked: bool) -> StoreResult<()> {
        let mut state = self.write()?;
        state.identity_mut(id)?.locked = locked;
        Ok(())
    }
}

#[async_trait]
impl RoleStore for InMemoryStore {
    async fn find_role_by_name(&self, name: &str) -> StoreResult<Option<Role>> {
        Ok(self.read()?.roles.values().find(|r| r.name == name).cloned())
    }

    async fn assign_role(&self, user_id: UserId, role_id: RoleId) -> StoreResult<()> {
        let mut state = self.write()?;
        if !state.roles.contains_key(&role_id) {
            return Err(StoreError::backend(format!("role {role_id} does not exist")));
        }
        state.user_roles.insert(user_id, role_id);
        Ok(())
    }

    async fn role_for_user(&self, user_id: UserId) -> StoreResult<Option<Role>> {
        Ok(self.read()?.role_of(user_id))
    }

    async fn role_for_email(&self, email: &str) -> StoreResult<Option<Role>> {
        let state = self.read()?;
        Ok(state
            .identity_by_email(email)
            .and_then(|i| state.role_of(i.id)))
    }
}

#[async_trait]
impl VerificationStore for InMemoryStore {
    async fn replace_mfa_code(&self, code: VerificationCode) -> StoreResult<()> {
        self.write()?.mfa_codes.insert(code.user_id, code);
        Ok(())
    }

    async fn find_mfa_code(&self, code: &str) -> StoreResult<Option<VerificationCode>> {
        Ok(self
            .read()?
            .mfa_codes
            .values()
            .find(|c| c.code == code)
            .cloned())
    }

    async fn mfa_code_for_user(&self, user_id: UserId) -> StoreResult<Option<VerificationCode>> {
        Ok(self.read()?.mfa_codes.get(&user_id).cloned())
    }

    async fn delete_mfa_code(&self, code: &str) -> StoreResult<bool> {
        let mut state = self.write()?;
        let owner = state
            .mfa_codes
            .iter()
            .find(|(_, c)| c.code == code)
            .map(|(user_id, _)| *user_id);
        Ok(owner.and_then(|id| state.mfa_codes.remove(&id)).is_some())
    }

    async fn insert_account_link(&self, link: VerificationLink) -> StoreResult<()> {
        let mut state = self.write()?;
        if state.account_links.contains_key(&link.key) {
            return Err(StoreError::Conflict(format!("link key {} already exists", link.key)));
        }
        state.account_links.insert(link.key.clone(), link);
        Ok(())
    }

    async fn find_account_link(&self, key: &str) -> StoreResult<Option<VerificationLink>> {
        Ok(self.read()?.account_links.get(key).cloned())
    }

    async fn replace_reset_link(&self, link: VerificationLink) -> StoreResult<()> {
        self.write()?.reset_links.insert(link.user_id, link);
        Ok(())
    }

    async fn find_reset_link(&self, key: &str) -> StoreResult<Option<VerificationLink>> {
        Ok(self
            .read()?
            .reset_links
            .values()
            .find(|l| l.key == key)
            .cloned())
    }

    async fn complete_password_reset(&self, key: &str, password_hash: &str) -> StoreResult<bool> {
        let mut state = self.write()?;
        let Some(user_id) = state
            .reset_links
            .values()
            .find(|l| l.key == key)
            .map(|l| l.user_id)
        else {
            return Ok(false);
        };
        state.identity_mut(user_id)?.password_hash = password_hash.to_string();
        state.reset_links.remove(&user_id);
        Ok(true)
    }
}
