//! TaskFlow session core
//!
//! Client-side authentication lifecycle for the TaskFlow GraphQL API.
//!
//! This crate provides:
//! - Persisted token store with fixed keys for the token and session snapshot
//! - Observable session state with explicit login/logout/update transitions
//! - Request pipeline (error detection, auth header injection, transport)
//! - Single-flight token refresh coordination
//! - Bootstrap validation of a persisted token on startup

pub mod api;
pub mod bootstrap;
pub mod classify;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod operations;
pub mod pipeline;
pub mod refresh;
pub mod session;
pub mod store;
pub mod transport;

#[cfg(test)]
pub(crate) mod testutil;

pub use bootstrap::{BootstrapState, BootstrapValidator};
pub use client::TaskflowClient;
pub use config::ClientConfig;
pub use error::{SessionError, SessionResult};
pub use models::{Role, Token, User};
pub use session::{Session, SessionContext, SessionSnapshot};
pub use store::TokenStore;
