use axum::{Router, routing::get};

use capita_auth::AuthStore;

pub mod system;
pub mod users;

/// Every route the service exposes. Access rules live in the gate, not here.
pub fn router<S: AuthStore>() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .nest("/users", users::router::<S>())
}
