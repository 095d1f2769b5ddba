//! clank-dash library.
//!
//! Client-side core of the Clank bot management dashboard: OAuth2 login,
//! guild selection, TTL-cached resource fetching against the dashboard
//! backend, and the onboarding task checklist.

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod reason;
pub mod session;
pub mod store;
pub mod tasks;
pub mod types;

pub use config::Config;
pub use error::{ClankDashError, Result};
