//! Ports to the remote surfaces the engine drives.
//!
//! Calls are fire-and-forget: implementations perform the work in the
//! background and report completion as an `EngineEvent` through their sink,
//! so the engine never blocks and completions interleave with push events.

use crate::domain::{
    chat::{AgentId, ChatId, ChatStatus, OrgId, TagId},
    conversation_state::SelectionToken,
    filter::PageTicket,
    message::MessageType,
    pending_actions::ActionId,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatsQuery {
    pub org_id: OrgId,
    pub channel_id: Option<String>,
    pub status: Option<ChatStatus>,
    pub tag_id: Option<TagId>,
    pub agent_id: Option<AgentId>,
    pub search: Option<String>,
    pub page: u32,
    pub page_size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationQuery {
    pub org_id: OrgId,
    pub chat_id: ChatId,
    /// Latest `count` messages; `None` asks for the whole history.
    pub count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenRequest {
    pub org_id: OrgId,
    pub chat_id: ChatId,
    pub agent_id: AgentId,
    pub last_message_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationRequest {
    Assign { agent_id: AgentId },
    AcceptReject { agent_id: AgentId, is_accept: bool },
    ChangeStatus { status: ChatStatus },
    SetTag { tag_id: TagId },
    RemoveTag { tag_id: TagId },
    SetNote { note: String },
    Send {
        agent_id: AgentId,
        message_type: MessageType,
        content: String,
    },
}

impl MutationRequest {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Assign { .. } => "assign",
            Self::AcceptReject { .. } => "accept_reject",
            Self::ChangeStatus { .. } => "change_status",
            Self::SetTag { .. } => "set_tag",
            Self::RemoveTag { .. } => "remove_tag",
            Self::SetNote { .. } => "set_note",
            Self::Send { .. } => "send",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationCall {
    pub org_id: OrgId,
    pub chat_id: ChatId,
    pub request: MutationRequest,
}

pub trait ChatQueryApi {
    fn fetch_chats(&self, ticket: PageTicket, query: ChatsQuery);
    fn fetch_conversation(&self, token: SelectionToken, query: ConversationQuery);
}

pub trait ChatMutationApi {
    fn mark_seen(&self, request: SeenRequest);
    fn submit(&self, action_id: ActionId, call: MutationCall);
}

/// Control surface of the live push connection. Presence calls are
/// best-effort and never fail the caller.
pub trait PushSession {
    fn join_chat(&self, chat_id: &str, agent_id: &str);
    fn leave_chat(&self, agent_id: &str, chat_id: &str);
    /// Stops the connection for good.
    fn close(&self);
}
