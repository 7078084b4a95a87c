//! Domain layer: inbox entities, stores and synchronization rules.

pub mod chat;
pub mod chat_list_state;
pub mod conversation_state;
pub mod events;
pub mod filter;
pub mod message;
pub mod mutation;
pub mod pending_actions;
pub mod status;

/// Returns the domain module name for smoke checks.
pub fn module_name() -> &'static str {
    "domain"
}
