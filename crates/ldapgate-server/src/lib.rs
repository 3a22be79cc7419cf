//! HTTP front end for ldapgate

pub mod credentials;
pub mod handler;
pub mod metrics;
pub mod server;

pub use credentials::BasicCredentials;
pub use metrics::MetricsRecorder;
pub use server::{admin_router, auth_router, AppState, AuthServer};
