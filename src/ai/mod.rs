//! All upstream LLM functionality

pub mod client;
pub mod diagnostics;
pub mod endpoint;
pub mod extract;

// Re-export main types for convenience
pub use client::{CompletionInvoker, CompletionStrategy};
pub use diagnostics::ConnectivityProbe;
pub use endpoint::EndpointResolver;
pub use extract::{RawResponse, extract};
