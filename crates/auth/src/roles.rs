use serde::{Deserialize, Serialize};

use capita_core::RoleId;

use crate::permissions::{Permission, parse_permission_string};

pub const ROLE_USER: &str = "ROLE_USER";
pub const ROLE_MANAGER: &str = "ROLE_MANAGER";
pub const ROLE_ADMIN: &str = "ROLE_ADMIN";
pub const ROLE_SYSADMIN: &str = "ROLE_SYSADMIN";

/// Role reference data.
///
/// `permission` stays a flat string (the shape stored and embedded in tokens);
/// use [`Role::authorities`] to get the parsed list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub permission: String,
}

impl Role {
    pub fn new(name: impl Into<String>, permission: impl Into<String>) -> Self {
        Self {
            id: RoleId::new(),
            name: name.into(),
            permission: permission.into(),
        }
    }

    pub fn authorities(&self) -> Vec<Permission> {
        parse_permission_string(&self.permission)
    }
}

/// The roles every deployment starts with.
pub fn default_roles() -> Vec<Role> {
    vec![
        Role::new(ROLE_USER, "READ:USER,READ:CUSTOMER"),
        Role::new(
            ROLE_MANAGER,
            "READ:USER,READ:CUSTOMER,UPDATE:USER,UPDATE:CUSTOMER",
        ),
        Role::new(
            ROLE_ADMIN,
            "READ:USER,READ:CUSTOMER,CREATE:USER,CREATE:CUSTOMER,UPDATE:USER,UPDATE:CUSTOMER",
        ),
        Role::new(
            ROLE_SYSADMIN,
            "READ:USER,READ:CUSTOMER,CREATE:USER,CREATE:CUSTOMER,UPDATE:USER,UPDATE:CUSTOMER,DELETE:USER,DELETE:CUSTOMER",
        ),
    ]
}
