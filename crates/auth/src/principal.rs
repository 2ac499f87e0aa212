use serde::{Deserialize, Serialize};

use crate::identity::Identity;
use crate::permissions::Permission;
use crate::roles::Role;

/// Identity context attached to a request once its bearer token verified.
///
/// Transport-agnostic: the API layer stores it in request extensions and it
/// is dropped with the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Token subject (the identity's email).
    pub subject: String,
    pub authorities: Vec<Permission>,
}

impl Principal {
    pub fn new(subject: impl Into<String>, authorities: Vec<Permission>) -> Self {
        Self {
            subject: subject.into(),
            authorities,
        }
    }

    pub fn has_authority(&self, required: &str) -> bool {
        self.authorities.iter().any(|p| p.as_str() == required)
    }
}

/// An identity together with its role: what tokens are minted from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPrincipal {
    pub identity: Identity,
    pub role: Role,
}

impl UserPrincipal {
    pub fn new(identity: Identity, role: Role) -> Self {
        Self { identity, role }
    }

    pub fn email(&self) -> &str {
        &self.identity.email
    }

    pub fn authorities(&self) -> Vec<Permission> {
        self.role.authorities()
    }
}
