//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store + capability wiring
//! - `routes/`: HTTP routes + handlers
//! - `dto.rs`: request/response DTOs and the response envelope
//! - `errors.rs`: error taxonomy -> HTTP status mapping

use std::sync::Arc;

use axum::{Extension, Router};
use tower::ServiceBuilder;
use tracing::info;

use capita_auth::{AuthServices, AuthStore, AuthorizationGate, Notifier};
use capita_core::Clock;
use capita_infra::{AuthConfig, LoggingNotifier};

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: &AuthConfig) -> anyhow::Result<Router> {
    let deps = services::auth_dependencies(config, Arc::new(LoggingNotifier), services::system_clock())?;

    if config.use_persistent_stores {
        info!("using Postgres stores");
        let services = services::build_persistent_services(config, deps).await?;
        return Ok(router(services));
    }

    info!("using in-memory stores");
    Ok(router(services::build_in_memory_services(deps)))
}

/// In-memory app with caller-supplied delivery and time.
pub fn build_in_memory_app(
    config: &AuthConfig,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
) -> anyhow::Result<Router> {
    let deps = services::auth_dependencies(config, notifier, clock)?;
    Ok(router(services::build_in_memory_services(deps)))
}

/// Routes behind the authorization gate, bound to one store. The fallback is
/// gated too, so unknown paths need credentials like any other.
pub fn router<S: AuthStore>(services: Arc<AuthServices<S>>) -> Router {
    let gate = Arc::new(AuthorizationGate::new(services.tokens.clone()));
    let auth_state = middleware::AuthState { gate };

    routes::router::<S>()
        .fallback(errors::not_found)
        .layer(
            ServiceBuilder::new()
                .layer(Extension(services))
                .layer(axum::middleware::from_fn_with_state(
                    auth_state,
                    middleware::auth_middleware,
                )),
        )
}
