//! The shellpilot control loop.
//!
//! A session follows a **Prompt → Approve → Execute** cycle:
//!
//! 1. **Receive** an operator directive
//! 2. **Send** it, or the accumulated context, to the configured gateway
//! 3. **If commands** are embedded: approve, execute, record output, loop
//! 4. **If finished** or nothing new is proposed: return the transcript
//!
//! The loop also ends when the session's wall-clock budget is spent.

pub mod approval;
pub mod repl;
pub mod store;

pub use approval::{ApprovalPolicy, Approver, LineApprover, ScriptedApprover};
pub use repl::{CallTemplate, Outcome, ReplSession, SessionObserver, SessionReport};
pub use store::{ContextStore, SessionLease};
