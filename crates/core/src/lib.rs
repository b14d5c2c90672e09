//! # shellpilot core
//!
//! Domain types, traits, and error definitions for the shellpilot agent
//! runtime. Every other crate depends inward on this one.
//!
//! - [`call`]: the immutable call descriptor handed to a gateway
//! - [`response`]: the normalized, insert-once attribute bag
//! - [`gateway`]: the backend abstraction, buffered and streaming
//! - [`context`]: context entries fed back into prompts
//! - [`tool`]: the tool trait, registry and argument validation
//! - [`shell`]: shell batch specs and results
//! - [`token`]: token counting for budgets and context size

pub mod call;
pub mod context;
pub mod error;
pub mod event;
pub mod gateway;
pub mod response;
pub mod shell;
pub mod token;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use call::{CallDescriptor, RequestKind};
pub use context::{ContextEntry, EntryKind};
pub use error::{NormalizeError, ProviderError, ToolError};
pub use event::{EventBus, SessionEvent};
pub use gateway::{Gateway, ResponseStream, StreamEvent};
pub use response::{AttrValue, NormalizedResponse, Usage};
pub use shell::{BatchResult, ShellCommandSpec, ShellResult};
pub use token::{HeuristicCounter, TokenCounter};
pub use tool::{Tool, ToolDefinition, ToolRegistry, ToolStatus};
