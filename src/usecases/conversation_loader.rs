//! Conversation loader: owns the history of the one selected chat.

use crate::domain::{
    chat::{AgentId, ChatId, ChatSummary, OrgId},
    chat_list_state::ChatListState,
    conversation_state::{ConversationHistory, ConversationState, MessageInsert, SelectionToken},
    events::ApiError,
    message::Message,
    mutation::ChatMutation,
};

use super::contracts::{
    ChatMutationApi, ChatQueryApi, ConversationQuery, PushSession, SeenRequest,
};

pub const DEFAULT_HISTORY_COUNT: u32 = 30;
const MAX_HISTORY_COUNT: u32 = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The result belongs to a superseded selection and was ignored.
    Stale,
    Ready {
        chat_id: ChatId,
        marked_seen: bool,
    },
    Failed {
        chat_id: ChatId,
        error: ApiError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationLoader {
    org_id: OrgId,
    agent_id: AgentId,
    history_count: u32,
    last_token: u64,
    current: Option<ConversationState>,
}

impl ConversationLoader {
    pub fn new(org_id: impl Into<OrgId>, agent_id: impl Into<AgentId>, history_count: u32) -> Self {
        let history_count = match history_count {
            0 => DEFAULT_HISTORY_COUNT,
            value if value > MAX_HISTORY_COUNT => MAX_HISTORY_COUNT,
            value => value,
        };

        Self {
            org_id: org_id.into(),
            agent_id: agent_id.into(),
            history_count,
            last_token: 0,
            current: None,
        }
    }

    pub fn current(&self) -> Option<&ConversationState> {
        self.current.as_ref()
    }

    pub fn selected_chat_id(&self) -> Option<&str> {
        self.current.as_ref().map(ConversationState::chat_id)
    }

    /// Mutable access to the open conversation when it shows `chat_id`.
    pub fn conversation_for(&mut self, chat_id: &str) -> Option<&mut ConversationState> {
        self.current
            .as_mut()
            .filter(|state| state.chat_id() == chat_id)
    }

    /// Opens `summary`, superseding whatever was selected or loading before.
    pub fn select(
        &mut self,
        summary: ChatSummary,
        presence: &dyn PushSession,
        api: &dyn ChatQueryApi,
    ) -> SelectionToken {
        let token = self.next_token();

        if let Some(previous) = self.current.take() {
            presence.leave_chat(&self.agent_id, previous.chat_id());
        }
        presence.join_chat(&summary.chat_id, &self.agent_id);

        api.fetch_conversation(token, self.query(&summary.chat_id, Some(self.history_count)));
        tracing::debug!(chat_id = %summary.chat_id, token = token.0, "conversation selected");
        self.current = Some(ConversationState::loading(token, summary));
        token
    }

    /// Re-fetches the latest messages of the current selection.
    pub fn reload(&mut self, api: &dyn ChatQueryApi) -> Option<SelectionToken> {
        let token = SelectionToken(self.last_token + 1);
        let chat_id = self.current.as_ref()?.chat_id().to_owned();
        self.last_token = token.0;

        api.fetch_conversation(token, self.query(&chat_id, Some(self.history_count)));
        if let Some(state) = self.current.as_mut() {
            state.reload(token);
        }
        Some(token)
    }

    /// Fetches the unbounded history of the current selection.
    pub fn load_full_history(&self, api: &dyn ChatQueryApi) -> Option<SelectionToken> {
        let state = self.current.as_ref()?;
        api.fetch_conversation(state.token(), self.query(state.chat_id(), None));
        Some(state.token())
    }

    /// Announces the open chat again on a fresh push connection.
    pub fn rejoin(&self, presence: &dyn PushSession) -> bool {
        match self.current.as_ref() {
            Some(state) => {
                presence.join_chat(state.chat_id(), &self.agent_id);
                true
            }
            None => false,
        }
    }

    pub fn deselect(&mut self, presence: &dyn PushSession) -> Option<ChatId> {
        let previous = self.current.take()?;
        presence.leave_chat(&self.agent_id, previous.chat_id());
        Some(previous.chat_id().to_owned())
    }

    /// Settles a conversation fetch issued under `token`.
    pub fn complete(
        &mut self,
        token: SelectionToken,
        full_history: bool,
        result: Result<ConversationHistory, ApiError>,
        chat_list: &mut ChatListState,
        mutations: &dyn ChatMutationApi,
    ) -> LoadOutcome {
        let Some(state) = self.current.as_mut().filter(|state| state.token() == token) else {
            return LoadOutcome::Stale;
        };
        let chat_id = state.chat_id().to_owned();

        let history = match result {
            Ok(history) => history,
            Err(error) => {
                if !full_history {
                    state.set_error();
                }
                return LoadOutcome::Failed { chat_id, error };
            }
        };

        if full_history {
            state.merge_history(history.messages);
            return LoadOutcome::Ready {
                chat_id,
                marked_seen: false,
            };
        }

        state.set_ready(history);
        let had_unread = state.summary().unread_count > 0
            || chat_list
                .get(&chat_id)
                .is_some_and(|summary| summary.unread_count > 0);

        if had_unread {
            mutations.mark_seen(SeenRequest {
                org_id: self.org_id.clone(),
                chat_id: chat_id.clone(),
                agent_id: self.agent_id.clone(),
                last_message_id: state.latest_server_message_id().map(str::to_owned),
            });
            state.mark_read();
            chat_list.mark_read(&chat_id);
        }

        LoadOutcome::Ready {
            chat_id,
            marked_seen: had_unread,
        }
    }

    /// Applies a pushed message when it belongs to the open chat.
    pub fn apply_push_message(&mut self, message: &Message) -> Option<MessageInsert> {
        self.conversation_for(&message.chat_id)
            .map(|state| state.insert_message(message.clone()))
    }

    pub fn apply_mutation(&mut self, mutation: &ChatMutation) -> bool {
        self.conversation_for(&mutation.chat_id)
            .is_some_and(|state| state.apply_mutation(mutation))
    }

    /// Withdraws the hand-off offer of `chat_id` while an answer is in flight.
    /// Returns false when no offer is pending.
    pub fn take_offer(&mut self, chat_id: &str) -> bool {
        match self.conversation_for(chat_id) {
            Some(state) if state.pending_acceptance() => {
                state.set_pending_acceptance(false);
                true
            }
            _ => false,
        }
    }

    pub fn restore_offer(&mut self, chat_id: &str) {
        if let Some(state) = self.conversation_for(chat_id) {
            state.set_pending_acceptance(true);
        }
    }

    fn next_token(&mut self) -> SelectionToken {
        self.last_token += 1;
        SelectionToken(self.last_token)
    }

    fn query(&self, chat_id: &str, count: Option<u32>) -> ConversationQuery {
        ConversationQuery {
            org_id: self.org_id.clone(),
            chat_id: chat_id.to_owned(),
            count,
        }
    }
}
