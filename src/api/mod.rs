//! HTTP routes and request processing

pub mod handler;
pub mod helpers;
pub mod parsing;

// Re-export the router for convenience
pub use handler::{AppState, router, serve};
