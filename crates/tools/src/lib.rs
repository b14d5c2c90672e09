//! Built-in tools for shellpilot.
//!
//! The [`ShellExecutor`] runs command batches; the [`ShellTool`] exposes it
//! to the tool protocol server and to anything else holding a registry.

pub mod executor;
pub mod shell;

use shellpilot_config::ShellConfig;
use shellpilot_core::tool::ToolRegistry;

pub use executor::ShellExecutor;
pub use shell::ShellTool;

/// Create a registry with every built-in tool.
pub fn default_registry(config: &ShellConfig) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(
        ShellTool::new(ShellExecutor::from_config(config)).with_default_timeout(config.default_timeout_secs),
    ));
    registry
}
