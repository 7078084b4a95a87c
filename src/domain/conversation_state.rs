use super::{
    chat::{AcceptState, ChatSummary, TagId},
    message::{Message, MessageId},
    mutation::ChatMutation,
};

/// Version of a selection. Every `select` issues a new, larger token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SelectionToken(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationPhase {
    Loading,
    Ready,
    Error,
}

/// Conversation payload returned by the messages endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConversationHistory {
    pub messages: Vec<Message>,
    pub note: Option<String>,
    pub tag_ids: Vec<TagId>,
    pub accept_state: AcceptState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageInsert {
    Inserted,
    /// A local placeholder was replaced by its server echo.
    Reconciled,
    Duplicate,
}

/// Full context of the open chat. Always bound to one selection token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationState {
    token: SelectionToken,
    summary: ChatSummary,
    messages: Vec<Message>,
    note: Option<String>,
    tag_ids: Vec<TagId>,
    pending_acceptance: bool,
    phase: ConversationPhase,
}

impl ConversationState {
    pub fn loading(token: SelectionToken, summary: ChatSummary) -> Self {
        Self {
            token,
            note: summary.note.clone(),
            tag_ids: summary.tag_id.iter().cloned().collect(),
            pending_acceptance: summary.accept_state.is_pending(),
            summary,
            messages: Vec::new(),
            phase: ConversationPhase::Loading,
        }
    }

    pub fn token(&self) -> SelectionToken {
        self.token
    }

    pub fn chat_id(&self) -> &str {
        &self.summary.chat_id
    }

    pub fn summary(&self) -> &ChatSummary {
        &self.summary
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    pub fn tag_ids(&self) -> &[TagId] {
        &self.tag_ids
    }

    pub fn pending_acceptance(&self) -> bool {
        self.pending_acceptance
    }

    pub fn phase(&self) -> ConversationPhase {
        self.phase
    }

    pub fn latest_server_message_id(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find_map(|message| message.id.server_id())
    }

    /// Installs the fetched history, keeping anything pushed while loading.
    pub fn set_ready(&mut self, history: ConversationHistory) {
        let pushed = std::mem::take(&mut self.messages);
        self.messages = Vec::with_capacity(history.messages.len() + pushed.len());
        for message in history.messages {
            self.insert_message(message);
        }

        // Server copies already shown were reconciled earlier and cannot
        // settle another placeholder.
        let mut claimed: Vec<MessageId> = pushed
            .iter()
            .filter(|message| !message.id.is_local())
            .map(|message| message.id.clone())
            .collect();
        for message in pushed {
            if message.id.is_local() {
                let settled_by = self
                    .messages
                    .iter()
                    .find(|existing| !claimed.contains(&existing.id) && message.is_echoed_by(existing))
                    .map(|existing| existing.id.clone());
                if let Some(server_id) = settled_by {
                    claimed.push(server_id);
                    continue;
                }
            }
            self.insert_message(message);
        }

        self.note = history.note;
        self.summary.note = self.note.clone();
        self.tag_ids = history.tag_ids;
        self.summary.accept_state = history.accept_state;
        self.pending_acceptance = history.accept_state.is_pending();
        self.phase = ConversationPhase::Ready;
    }

    /// Merges a longer history into the loaded one.
    pub fn merge_history(&mut self, messages: Vec<Message>) {
        for message in messages {
            self.insert_message(message);
        }
    }

    pub fn set_error(&mut self) {
        self.phase = ConversationPhase::Error;
    }

    /// Rebinds the state to a newer token for a reload of the same chat.
    pub fn reload(&mut self, token: SelectionToken) {
        self.token = token;
        self.phase = ConversationPhase::Loading;
    }

    /// Inserts `message` in timestamp order unless its id is already present.
    pub fn insert_message(&mut self, message: Message) -> MessageInsert {
        if self.messages.iter().any(|existing| existing.id == message.id) {
            return MessageInsert::Duplicate;
        }

        if let Some(index) = self
            .messages
            .iter()
            .position(|existing| existing.is_echoed_by(&message))
        {
            self.messages.remove(index);
            self.insert_sorted(message);
            return MessageInsert::Reconciled;
        }

        self.insert_sorted(message);
        MessageInsert::Inserted
    }

    pub fn remove_message(&mut self, id: &MessageId) -> bool {
        let before = self.messages.len();
        self.messages.retain(|message| &message.id != id);
        self.messages.len() != before
    }

    /// Gives a placeholder its server id. If the echo already landed, the
    /// placeholder is dropped instead.
    pub fn promote_placeholder(&mut self, local: &MessageId, server_id: String) -> bool {
        let server = MessageId::Server(server_id);
        if self.messages.iter().any(|message| message.id == server) {
            return self.remove_message(local);
        }

        match self.messages.iter_mut().find(|message| &message.id == local) {
            Some(message) => {
                message.id = server;
                true
            }
            None => false,
        }
    }

    /// Mirrors a chat patch onto the open conversation.
    pub fn apply_mutation(&mut self, mutation: &ChatMutation) -> bool {
        let before = self.clone();
        self.summary.apply(mutation);

        if let Some(note) = &mutation.note {
            self.note = note.clone();
        }
        if let Some(tag_id) = &mutation.tag_id {
            self.tag_ids = tag_id.iter().cloned().collect();
        }
        if let Some(accept_state) = mutation.accept_state {
            self.pending_acceptance = accept_state.is_pending();
        }

        *self != before
    }

    pub fn add_tag(&mut self, tag_id: &str) {
        if !self.tag_ids.iter().any(|existing| existing == tag_id) {
            self.tag_ids.push(tag_id.to_owned());
        }
        self.summary.tag_id = Some(tag_id.to_owned());
    }

    pub fn remove_tag(&mut self, tag_id: &str) {
        self.tag_ids.retain(|existing| existing != tag_id);
        self.summary.tag_id = self.tag_ids.last().cloned();
    }

    pub fn set_tag_ids(&mut self, tag_ids: Vec<TagId>) {
        self.summary.tag_id = tag_ids.last().cloned();
        self.tag_ids = tag_ids;
    }

    pub fn set_pending_acceptance(&mut self, pending: bool) {
        self.pending_acceptance = pending;
    }

    pub fn mark_read(&mut self) {
        self.summary.unread_count = 0;
    }

    fn insert_sorted(&mut self, message: Message) {
        let position = self
            .messages
            .iter()
            .rposition(|existing| existing.timestamp <= message.timestamp)
            .map_or(0, |index| index + 1);
        self.messages.insert(position, message);
    }
}
