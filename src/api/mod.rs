//! HTTP and WebSocket surface.
//!
//! The router is composable: `api_router()` returns a `Router` that can be
//! mounted on any axum server instance. `start_server()` binds and runs it.

pub mod endpoints;
pub mod error;
pub mod router;
pub mod server;
pub mod types;
pub mod websocket;

pub use router::api_router;
pub use server::{start_server, ApiServer, ServerError};
pub use types::ApiContext;
