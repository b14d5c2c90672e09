//! # shellpilot tool protocol server
//!
//! Serves a [`ToolRegistry`](shellpilot_core::tool::ToolRegistry) over
//! newline-delimited JSON-RPC 2.0. The binary wires it to stdin/stdout; tests
//! drive it through in-memory pipes.

pub mod protocol;
pub mod server;

pub use protocol::{Request, Response, RpcError};
pub use server::{ServerInfo, ToolServer};
