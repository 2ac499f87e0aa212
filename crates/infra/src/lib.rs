//! Infrastructure layer: configuration, store adapters, password hashing,
//! notification delivery.

pub mod config;
pub mod notify;
pub mod password;
pub mod store;

mod integration_tests;

pub use config::{AuthConfig, ConfigError};
pub use notify::{LoggingNotifier, RecordingNotifier};
pub use password::BcryptPasswordEncoder;
pub use store::{InMemoryStore, PostgresStore};
