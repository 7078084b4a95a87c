use std::{
    cell::RefCell,
    rc::Rc,
    sync::Mutex,
};

use chrono::{DateTime, TimeZone, Utc};

use crate::{
    domain::{
        chat::{AcceptState, ChatStatus, ChatSummary, Platform},
        conversation_state::SelectionToken,
        events::{EngineEvent, EventSink},
        filter::PageTicket,
        message::{Message, MessageId, MessageType, SenderType},
        pending_actions::ActionId,
    },
    usecases::contracts::{
        ChatMutationApi, ChatQueryApi, ChatsQuery, ConversationQuery, MutationCall,
        PushSession, SeenRequest,
    },
};

/// Fixed instant `secs` seconds after an arbitrary epoch.
pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0)
        .single()
        .expect("fixture timestamp is valid")
}

pub fn chat(chat_id: &str, latest_secs: i64) -> ChatSummary {
    ChatSummary {
        chat_id: chat_id.to_owned(),
        org_id: "org-1".to_owned(),
        channel_id: None,
        display_name: format!("Chat {chat_id}"),
        platform: Platform::default(),
        latest_message_preview: None,
        latest_message_at: Some(at(latest_secs)),
        unread_count: 0,
        assigned_agent_id: None,
        accept_state: AcceptState::NotOffered,
        tag_id: None,
        note: None,
        status: ChatStatus::Pending,
    }
}

pub fn message(id: &str, chat_id: &str, content: &str, secs: i64) -> Message {
    Message {
        id: MessageId::Server(id.to_owned()),
        chat_id: chat_id.to_owned(),
        sender_type: SenderType::Customer,
        sender_user_id: None,
        message_type: MessageType::Text,
        content: content.to_owned(),
        timestamp: at(secs),
    }
}

/// Records every outbound call the engine makes instead of performing it.
/// Clones share one recording.
#[derive(Clone, Default)]
pub struct RecordingBackend {
    page_queries: Rc<RefCell<Vec<(PageTicket, ChatsQuery)>>>,
    conversation_queries: Rc<RefCell<Vec<(SelectionToken, ConversationQuery)>>>,
    seen_requests: Rc<RefCell<Vec<SeenRequest>>>,
    submitted: Rc<RefCell<Vec<(ActionId, MutationCall)>>>,
    presence_calls: Rc<RefCell<Vec<String>>>,
}

impl RecordingBackend {
    pub fn page_queries(&self) -> Vec<(PageTicket, ChatsQuery)> {
        self.page_queries.borrow().clone()
    }

    pub fn conversation_queries(&self) -> Vec<(SelectionToken, ConversationQuery)> {
        self.conversation_queries.borrow().clone()
    }

    pub fn seen_requests(&self) -> Vec<SeenRequest> {
        self.seen_requests.borrow().clone()
    }

    pub fn submitted(&self) -> Vec<(ActionId, MutationCall)> {
        self.submitted.borrow().clone()
    }

    pub fn presence_calls(&self) -> Vec<String> {
        self.presence_calls.borrow().clone()
    }

    pub fn last_ticket(&self) -> PageTicket {
        self.page_queries
            .borrow()
            .last()
            .map(|(ticket, _)| *ticket)
            .expect("a page fetch was issued")
    }

    pub fn last_token(&self) -> SelectionToken {
        self.conversation_queries
            .borrow()
            .last()
            .map(|(token, _)| *token)
            .expect("a conversation fetch was issued")
    }
}

impl ChatQueryApi for RecordingBackend {
    fn fetch_chats(&self, ticket: PageTicket, query: ChatsQuery) {
        self.page_queries.borrow_mut().push((ticket, query));
    }

    fn fetch_conversation(&self, token: SelectionToken, query: ConversationQuery) {
        self.conversation_queries.borrow_mut().push((token, query));
    }
}

impl ChatMutationApi for RecordingBackend {
    fn mark_seen(&self, request: SeenRequest) {
        self.seen_requests.borrow_mut().push(request);
    }

    fn submit(&self, action_id: ActionId, call: MutationCall) {
        self.submitted.borrow_mut().push((action_id, call));
    }
}

impl PushSession for RecordingBackend {
    fn join_chat(&self, chat_id: &str, agent_id: &str) {
        self.presence_calls
            .borrow_mut()
            .push(format!("join {chat_id} {agent_id}"));
    }

    fn leave_chat(&self, agent_id: &str, chat_id: &str) {
        self.presence_calls
            .borrow_mut()
            .push(format!("leave {agent_id} {chat_id}"));
    }

    fn close(&self) {
        self.presence_calls.borrow_mut().push("close".to_owned());
    }
}

/// Thread-safe sink that keeps emitted events for inspection.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<EngineEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<EngineEvent> {
        self.events.lock().expect("sink lock").clone()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: EngineEvent) {
        self.events.lock().expect("sink lock").push(event);
    }
}
