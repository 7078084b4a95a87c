//! Ledger of optimistic edits that still await their REST confirmation.

use std::collections::HashMap;

use super::{
    chat::{ChatId, TagId},
    message::MessageId,
    mutation::{ChatField, ChatMutation},
};

/// Identifier handed back to the caller of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Note,
    Tag,
    Assign,
    Status,
    Acceptance,
    Send,
}

impl ActionKind {
    /// Chat fields the action is actively changing.
    pub fn owned_fields(self) -> &'static [ChatField] {
        match self {
            Self::Note => &[ChatField::Note],
            Self::Tag => &[ChatField::Tag],
            Self::Assign => &[ChatField::AssignedAgent, ChatField::Acceptance],
            Self::Status => &[ChatField::Status],
            Self::Acceptance => &[ChatField::Acceptance, ChatField::AssignedAgent],
            Self::Send => &[],
        }
    }

    pub fn as_label(self) -> &'static str {
        match self {
            Self::Note => "note",
            Self::Tag => "tag",
            Self::Assign => "assign",
            Self::Status => "status",
            Self::Acceptance => "acceptance",
            Self::Send => "send",
        }
    }
}

/// Everything needed to undo one optimistic edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rollback {
    /// Pre-action values of the owned fields.
    pub patch: ChatMutation,
    /// Conversation tag list before a tag edit.
    pub tag_ids: Option<Vec<TagId>>,
    /// Hand-off flag before an accept/reject.
    pub pending_acceptance: Option<bool>,
    /// Placeholder shown for an optimistic send.
    pub placeholder: Option<MessageId>,
}

impl Rollback {
    pub fn new(patch: ChatMutation) -> Self {
        Self {
            patch,
            tag_ids: None,
            pending_acceptance: None,
            placeholder: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAction {
    pub id: ActionId,
    pub chat_id: ChatId,
    pub kind: ActionKind,
    /// The optimistic values that were applied.
    pub optimistic: ChatMutation,
    pub rollback: Rollback,
    /// Push values for owned fields that arrived while the call was outstanding.
    pub masked: ChatMutation,
}

impl PendingAction {
    /// The patch that undoes this action: masked push values win over
    /// pre-action values.
    pub fn rollback_patch(&self) -> ChatMutation {
        let mut patch = self.rollback.patch.clone();
        patch.merge(&self.masked);
        patch
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PendingActionLedger {
    next_id: u64,
    by_key: HashMap<(ChatId, ActionKind), PendingAction>,
}

impl PendingActionLedger {
    pub fn is_pending(&self, chat_id: &str, kind: ActionKind) -> bool {
        self.by_key.contains_key(&(chat_id.to_owned(), kind))
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// Hands out the next action id without recording anything. Sends own no
    /// chat fields and are tracked by their caller.
    pub fn allocate_id(&mut self) -> ActionId {
        self.next_id += 1;
        ActionId(self.next_id)
    }

    /// Records a new in-flight action. Returns `None` when the same kind is
    /// already outstanding for the chat.
    pub fn begin(
        &mut self,
        chat_id: &str,
        kind: ActionKind,
        optimistic: ChatMutation,
        rollback: Rollback,
    ) -> Option<ActionId> {
        let key = (chat_id.to_owned(), kind);
        if self.by_key.contains_key(&key) {
            return None;
        }

        let id = self.allocate_id();
        self.by_key.insert(
            key,
            PendingAction {
                id,
                chat_id: chat_id.to_owned(),
                kind,
                optimistic,
                rollback,
                masked: ChatMutation::new(chat_id),
            },
        );
        Some(id)
    }

    /// Removes and returns the action with `id`.
    pub fn finish(&mut self, id: ActionId) -> Option<PendingAction> {
        let key = self
            .by_key
            .iter()
            .find(|(_, action)| action.id == id)
            .map(|(key, _)| key.clone())?;
        self.by_key.remove(&key)
    }

    /// Strips from `mutation` every field an outstanding action on the same
    /// chat owns, remembering the stripped values on that action.
    pub fn mask(&mut self, mutation: &mut ChatMutation) {
        let chat_id = mutation.chat_id.clone();
        for action in self
            .by_key
            .values_mut()
            .filter(|action| action.chat_id == chat_id)
        {
            for field in action.kind.owned_fields() {
                if mutation.touches(*field) {
                    let taken = mutation.take(*field);
                    action.masked.merge(&taken);
                }
            }
        }
    }

    /// Outstanding actions in no particular order.
    pub fn actions(&self) -> impl Iterator<Item = &PendingAction> {
        self.by_key.values()
    }
}
