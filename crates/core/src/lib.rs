//! `capita-core` — shared building blocks (identifiers, clock, domain errors).
//!
//! This crate carries **no** infrastructure concerns.

pub mod clock;
pub mod error;
pub mod id;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{DomainError, DomainResult};
pub use id::{RoleId, UserId};
