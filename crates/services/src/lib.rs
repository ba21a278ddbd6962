#![forbid(unsafe_code)]

pub mod auth;
pub mod error;
pub mod progress_service;

pub use learn_core::Clock;

pub use auth::{AuthProvider, HostedAuth, StaticAuth, resolve_learner};
pub use error::{AuthError, ProgressError};
pub use progress_service::{ProgressService, ProgressStore};
