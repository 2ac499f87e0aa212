//! bcrypt-backed password capability.
//!
//! bcrypt is CPU-bound, so every hash and compare runs on tokio's blocking
//! pool instead of an async worker.

use async_trait::async_trait;
use tracing::warn;

use capita_auth::{AuthError, AuthResult, PasswordEncoder};

#[derive(Debug, Clone)]
pub struct BcryptPasswordEncoder {
    cost: u32,
    /// Real hash at `cost` that no submitted password is compared to on purpose.
    decoy_hash: Option<String>,
}

impl BcryptPasswordEncoder {
    pub fn new(cost: u32) -> Self {
        let decoy_hash = match bcrypt::hash("capita-decoy", cost) {
            Ok(hash) => Some(hash),
            Err(e) => {
                warn!(cost, error = %e, "cannot build decoy password hash");
                None
            }
        };
        Self { cost, decoy_hash }
    }
}

impl Default for BcryptPasswordEncoder {
    fn default() -> Self {
        Self::new(bcrypt::DEFAULT_COST)
    }
}

fn verify(raw: String, hash: String) -> bool {
    match bcrypt::verify(raw, &hash) {
        Ok(ok) => ok,
        Err(e) => {
            warn!(error = %e, "stored password hash is unusable");
            false
        }
    }
}

#[async_trait]
impl PasswordEncoder for BcryptPasswordEncoder {
    async fn encode(&self, raw: &str) -> AuthResult<String> {
        let raw = raw.to_string();
        let cost = self.cost;
        tokio::task::spawn_blocking(move || bcrypt::hash(raw, cost))
            .await
            .map_err(|e| AuthError::unexpected(format!("password hashing task failed: {e}")))?
            .map_err(|e| AuthError::unexpected(format!("password hashing failed: {e}")))
    }

    /// A malformed stored hash never matches.
    async fn matches(&self, raw: &str, hash: &str) -> AuthResult<bool> {
        let (raw, hash) = (raw.to_string(), hash.to_string());
        tokio::task::spawn_blocking(move || verify(raw, hash))
            .await
            .map_err(|e| AuthError::unexpected(format!("password check task failed: {e}")))
    }

    async fn decoy_match(&self, raw: &str) -> AuthResult<()> {
        if let Some(decoy) = &self.decoy_hash {
            self.matches(raw, decoy).await?;
        }
        Ok(())
    }
}
