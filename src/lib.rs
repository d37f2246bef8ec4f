//! Relay - forwards free-text prompts to OpenAI-compatible chat APIs.
//!
//! A browser or script posts a question to the relay, which answers it via an
//! OpenAI-compatible deployment using either the server's stored credentials
//! or ones supplied with the request.
//!
//! # Architecture
//!
//! The interesting work happens in [`ai`]:
//! - [`ai::endpoint`] discovers the real API root behind an ambiguous base URL
//! - [`ai::client`] walks a chain of completion strategies with round retries
//! - [`ai::extract`] turns whichever response shape came back into text
//!
//! [`api`] is a thin axum router in front of it, and [`core`] holds the
//! configuration and shared data types.
//!
//! # Example
//!
//! ```no_run
//! use relay::ai::{CompletionInvoker, EndpointResolver};
//! use relay::core::models::CompletionRequest;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Set up structured logging
//!     relay::setup_logging();
//!
//!     let http = reqwest::Client::new();
//!     let base_url = EndpointResolver::new(http.clone())
//!         .resolve("https://gateway.example.com")
//!         .await;
//!
//!     let answer = CompletionInvoker::new(http)
//!         .complete(&CompletionRequest {
//!             model: "gpt-3.5-turbo".into(),
//!             system_prompt: "Answer briefly.".into(),
//!             user_prompt: "Hi".into(),
//!             api_key: "sk-example".into(),
//!             base_url,
//!         })
//!         .await?;
//!
//!     println!("{answer}");
//!     Ok(())
//! }
//! ```

// Module declarations
pub mod ai;
pub mod api;
pub mod core;
pub mod errors;

pub use errors::RelayError;

/// Configure structured JSON logging.
///
/// The level filter comes from `RUST_LOG` and defaults to `info`. Calling
/// this more than once is harmless; later calls leave the first subscriber
/// in place.
///
/// # Example
///
/// ```
/// relay::setup_logging();
/// ```
pub fn setup_logging() {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().json().with_target(true);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}
