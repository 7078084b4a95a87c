use thiserror::Error;

use super::{
    chat::{ChatId, ChatSummary},
    conversation_state::{ConversationHistory, SelectionToken},
    filter::PageTicket,
    message::Message,
    mutation::ChatMutation,
    pending_actions::ActionId,
    status::ConnectionStatus,
};

/// Server-initiated event, validated at the transport boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    NewMessage(Message),
    ChatMutated(ChatMutation),
}

/// Failure of one REST call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("request timed out")]
    Timeout,
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("request was not authorized")]
    Unauthorized,
    #[error("resource not found")]
    NotFound,
    #[error("server answered {code}: {body}")]
    Status { code: u16, body: String },
    #[error("response violated the data contract: {0}")]
    InvalidData(String),
}

/// Operational fault classes of the synchronization engine. None of them is
/// fatal; each maps to a stable log code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncFault {
    NetworkFailure,
    /// A response for a superseded request was discarded.
    StaleResult,
    ConflictingMutation,
    UnknownChatReference,
    ConnectionLost,
}

impl SyncFault {
    pub fn code(self) -> &'static str {
        match self {
            Self::NetworkFailure => "NETWORK_FAILURE",
            Self::StaleResult => "STALE_RESULT",
            Self::ConflictingMutation => "CONFLICTING_MUTATION",
            Self::UnknownChatReference => "UNKNOWN_CHAT_REFERENCE",
            Self::ConnectionLost => "CONNECTION_LOST",
        }
    }
}

/// Acknowledgement of a mutating call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ActionAck {
    /// Server id of a sent message, when the endpoint reports it.
    pub message_id: Option<String>,
}

/// Everything the engine loop reacts to, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    Push(PushEvent),
    Connection(ConnectionStatus),
    ChatsFetched {
        ticket: PageTicket,
        result: Result<Vec<ChatSummary>, ApiError>,
    },
    ConversationFetched {
        token: SelectionToken,
        full_history: bool,
        result: Result<ConversationHistory, ApiError>,
    },
    ActionCompleted {
        action_id: ActionId,
        result: Result<ActionAck, ApiError>,
    },
    SeenCompleted {
        chat_id: ChatId,
        result: Result<(), ApiError>,
    },
}

impl EngineEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Push(PushEvent::NewMessage(_)) => "push_new_message",
            Self::Push(PushEvent::ChatMutated(_)) => "push_chat_mutated",
            Self::Connection(_) => "connection",
            Self::ChatsFetched { .. } => "chats_fetched",
            Self::ConversationFetched { .. } => "conversation_fetched",
            Self::ActionCompleted { .. } => "action_completed",
            Self::SeenCompleted { .. } => "seen_completed",
        }
    }
}

/// Receives engine events from background work.
pub trait EventSink: Send + Sync + 'static {
    fn emit(&self, event: EngineEvent);
}
