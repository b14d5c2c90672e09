//! Provider gateway for shellpilot.
//!
//! [`HttpGateway`] implements `shellpilot_core::Gateway`: it routes a call
//! through the [`EndpointTable`], builds the request body for the call's
//! kind, and runs the reply through the [`normalizer`].

pub mod body;
pub mod budget;
pub mod endpoints;
pub mod http;
pub mod normalizer;
pub mod sse;

pub use body::build_request_body;
pub use budget::{ModelInfo, token_budget};
pub use endpoints::{Backend, EndpointTable, Framing};
pub use http::HttpGateway;
pub use normalizer::{ResponseShape, normalize, normalize_str};
