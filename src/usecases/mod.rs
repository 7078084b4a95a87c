//! Use case layer: inbox workflows and orchestration.

pub mod actions;
pub mod bootstrap;
pub mod context;
pub mod contracts;
pub mod conversation_loader;
pub mod engine;
pub mod inbox_pager;

/// Returns the usecases module name for smoke checks.
pub fn module_name() -> &'static str {
    "usecases"
}
