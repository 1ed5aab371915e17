//! Per-cell authorization service.
//!
//! Every cell (tenant) has its own accounts and its own RSA signing key. Clients obtain
//! access tokens through the implicit grant at `/{cell}/__authz` and verify them with the
//! JWK Set published at `/{cell}/__certs`.

pub mod admin;
pub mod api;
pub mod authz;
pub mod cells;
pub mod certs;
pub mod config;
pub mod directory;
pub mod entity;
pub mod error;
pub mod keys;
pub mod locks;
pub mod logging;
pub mod messages;
pub mod state;
pub mod token;

pub use state::AppState;
