use std::sync::Arc;

use anyhow::Context;

use capita_auth::{
    AuthDependencies, AuthServices, Notifier, RandomSecretGenerator, TokenService,
};
use capita_core::{Clock, SystemClock};
use capita_infra::{AuthConfig, BcryptPasswordEncoder, InMemoryStore, PostgresStore};

/// Wires the capability ports shared by both store flavours.
pub fn auth_dependencies(
    config: &AuthConfig,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
) -> anyhow::Result<AuthDependencies> {
    let tokens = TokenService::new(config.jwt_secret.as_bytes(), clock.clone())
        .context("failed to initialise the token service")?;
    Ok(AuthDependencies {
        tokens: Arc::new(tokens),
        passwords: Arc::new(BcryptPasswordEncoder::new(config.bcrypt_cost)),
        secrets: Arc::new(RandomSecretGenerator),
        notifier,
        clock,
        settings: config.verification_settings(),
    })
}

pub fn build_in_memory_services(deps: AuthDependencies) -> Arc<AuthServices<InMemoryStore>> {
    // In-memory wiring (dev/test): seeded roles, nothing persisted.
    Arc::new(AuthServices::new(Arc::new(InMemoryStore::new()), deps))
}

pub async fn build_persistent_services(
    config: &AuthConfig,
    deps: AuthDependencies,
) -> anyhow::Result<Arc<AuthServices<PostgresStore>>> {
    let database_url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set when USE_PERSISTENT_STORES=true")?;
    let store = PostgresStore::connect(database_url)
        .await
        .context("failed to connect to Postgres")?;
    Ok(Arc::new(AuthServices::new(Arc::new(store), deps)))
}

pub fn system_clock() -> Arc<dyn Clock> {
    Arc::new(SystemClock)
}
