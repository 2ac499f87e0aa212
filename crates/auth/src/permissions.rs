use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Authority (capability token) carried in access tokens and request contexts.
///
/// Authorities are opaque strings such as `"READ:USER"` or `"DELETE:CUSTOMER"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Permission {
    fn from(value: &str) -> Self {
        Self::new(value.to_string())
    }
}

/// Split a role's flat permission string into authorities.
///
/// Tokens are separated by commas and/or whitespace; empty tokens are skipped
/// and the original order is kept (duplicates removed).
pub fn parse_permission_string(raw: &str) -> Vec<Permission> {
    let mut out: Vec<Permission> = Vec::new();
    for token in raw.split(|c: char| c == ',' || c.is_whitespace()) {
        if token.is_empty() {
            continue;
        }
        if out.iter().any(|p| p.as_str() == token) {
            continue;
        }
        out.push(Permission::new(token.to_string()));
    }
    out
}

/// Render authorities as token claim values.
pub fn to_claim_values(permissions: &[Permission]) -> Vec<String> {
    permissions.iter().map(|p| p.as_str().to_string()).collect()
}
