//! HTTP API module.
//!
//! This module provides the HTTP server, per-user sessions and API types for
//! the partlens backend.

pub mod logs;
pub mod server;
pub mod session;
pub mod types;

pub use logs::*;
pub use server::{build_router, start_server};
pub use session::SessionStore;
pub use types::*;
