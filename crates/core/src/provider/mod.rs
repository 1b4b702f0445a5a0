//! Upstream session layer abstraction.
//!
//! The engine drives purchases through the `Provider` trait: a preflight
//! eligibility check followed by order creation.

mod http;
mod traits;
mod types;

pub use http::HttpProvider;
pub use traits::{Provider, ProviderError};
pub use types::{OrderRequest, OrderResult, PreflightResult, ProviderReply};
