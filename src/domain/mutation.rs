//! Field-level chat patches shared by push events, optimistic actions and rollbacks.

use super::chat::{AcceptState, AgentId, ChatId, ChatStatus, TagId};

/// A mutable attribute of a chat that a patch can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatField {
    Note,
    Tag,
    Status,
    AssignedAgent,
    Acceptance,
    Unread,
}

/// Absolute-value patch for one chat.
///
/// Every field is independently optional. Nullable attributes use a nested
/// option so "absent" (`None`) differs from "set to null" (`Some(None)`).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChatMutation {
    pub chat_id: ChatId,
    pub note: Option<Option<String>>,
    pub tag_id: Option<Option<TagId>>,
    pub status: Option<ChatStatus>,
    pub assigned_agent_id: Option<Option<AgentId>>,
    pub accept_state: Option<AcceptState>,
    pub unread_count: Option<u32>,
}

impl ChatMutation {
    pub fn new(chat_id: impl Into<ChatId>) -> Self {
        Self {
            chat_id: chat_id.into(),
            ..Self::default()
        }
    }

    pub fn fields(&self) -> Vec<ChatField> {
        let mut fields = Vec::new();
        if self.note.is_some() {
            fields.push(ChatField::Note);
        }
        if self.tag_id.is_some() {
            fields.push(ChatField::Tag);
        }
        if self.status.is_some() {
            fields.push(ChatField::Status);
        }
        if self.assigned_agent_id.is_some() {
            fields.push(ChatField::AssignedAgent);
        }
        if self.accept_state.is_some() {
            fields.push(ChatField::Acceptance);
        }
        if self.unread_count.is_some() {
            fields.push(ChatField::Unread);
        }
        fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }

    pub fn touches(&self, field: ChatField) -> bool {
        match field {
            ChatField::Note => self.note.is_some(),
            ChatField::Tag => self.tag_id.is_some(),
            ChatField::Status => self.status.is_some(),
            ChatField::AssignedAgent => self.assigned_agent_id.is_some(),
            ChatField::Acceptance => self.accept_state.is_some(),
            ChatField::Unread => self.unread_count.is_some(),
        }
    }

    /// Moves `field` out of this patch into the returned one.
    pub fn take(&mut self, field: ChatField) -> ChatMutation {
        let mut taken = ChatMutation::new(self.chat_id.clone());
        match field {
            ChatField::Note => taken.note = self.note.take(),
            ChatField::Tag => taken.tag_id = self.tag_id.take(),
            ChatField::Status => taken.status = self.status.take(),
            ChatField::AssignedAgent => taken.assigned_agent_id = self.assigned_agent_id.take(),
            ChatField::Acceptance => taken.accept_state = self.accept_state.take(),
            ChatField::Unread => taken.unread_count = self.unread_count.take(),
        }
        taken
    }

    /// Overlays the fields present in `newer` on top of this patch.
    pub fn merge(&mut self, newer: &ChatMutation) {
        if newer.note.is_some() {
            self.note = newer.note.clone();
        }
        if newer.tag_id.is_some() {
            self.tag_id = newer.tag_id.clone();
        }
        if newer.status.is_some() {
            self.status = newer.status;
        }
        if newer.assigned_agent_id.is_some() {
            self.assigned_agent_id = newer.assigned_agent_id.clone();
        }
        if newer.accept_state.is_some() {
            self.accept_state = newer.accept_state;
        }
        if newer.unread_count.is_some() {
            self.unread_count = newer.unread_count;
        }
    }

    /// Fields both patches carry with different values.
    pub fn conflicts_with(&self, other: &ChatMutation) -> Vec<ChatField> {
        let mut conflicts = Vec::new();
        if differs(&self.note, &other.note) {
            conflicts.push(ChatField::Note);
        }
        if differs(&self.tag_id, &other.tag_id) {
            conflicts.push(ChatField::Tag);
        }
        if differs(&self.status, &other.status) {
            conflicts.push(ChatField::Status);
        }
        if differs(&self.assigned_agent_id, &other.assigned_agent_id) {
            conflicts.push(ChatField::AssignedAgent);
        }
        if differs(&self.accept_state, &other.accept_state) {
            conflicts.push(ChatField::Acceptance);
        }
        if differs(&self.unread_count, &other.unread_count) {
            conflicts.push(ChatField::Unread);
        }
        conflicts
    }
}

fn differs<T: PartialEq>(left: &Option<T>, right: &Option<T>) -> bool {
    matches!((left, right), (Some(l), Some(r)) if l != r)
}
