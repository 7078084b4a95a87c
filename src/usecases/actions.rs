//! Optimistic chat actions and their reconciliation with REST outcomes and
//! concurrent push updates.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{
    chat::{AcceptState, AgentId, ChatId, ChatStatus, ChatSummary, OrgId, TagId},
    chat_list_state::ChatListState,
    events::{ActionAck, ApiError, SyncFault},
    filter::FilterState,
    message::{Message, MessageId, MessageType, SenderType},
    mutation::{ChatField, ChatMutation},
    pending_actions::{ActionId, ActionKind, PendingActionLedger, Rollback},
};

use super::{
    contracts::{ChatMutationApi, MutationCall, MutationRequest},
    conversation_loader::ConversationLoader,
};

const ACTION_FAILED: &str = "ACTION_FAILED";

/// Synchronous refusal of an action. Nothing was changed or sent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error("chat {0} is not loaded")]
    UnknownChat(ChatId),
    #[error("a {} action is already pending for chat {chat_id}", .kind.as_label())]
    ActionInFlight { chat_id: ChatId, kind: ActionKind },
    #[error("chat {0} has no pending hand-off offer")]
    NotOffered(ChatId),
    #[error("message text is empty")]
    EmptyMessage,
}

/// Asynchronous outcome of an issued action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineNotice {
    ActionConfirmed {
        action_id: ActionId,
        chat_id: ChatId,
        kind: ActionKind,
    },
    ActionFailed {
        action_id: ActionId,
        chat_id: ChatId,
        kind: ActionKind,
        error: ApiError,
    },
}

impl EngineNotice {
    pub fn action_id(&self) -> ActionId {
        match self {
            Self::ActionConfirmed { action_id, .. } | Self::ActionFailed { action_id, .. } => {
                *action_id
            }
        }
    }
}

/// What settling an action asks of the engine beyond the store updates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSettled {
    pub notice: EngineNotice,
    /// The chat left this agent's inbox and must be deselected if open.
    pub closed_chat: Option<ChatId>,
}

/// Stores an action touches, borrowed from the engine for one call.
pub struct ActionTargets<'a> {
    pub chat_list: &'a mut ChatListState,
    pub loader: &'a mut ConversationLoader,
    pub filter: &'a FilterState,
}

impl ActionTargets<'_> {
    fn summary(&self, chat_id: &str) -> Result<ChatSummary, ActionError> {
        self.chat_list
            .get(chat_id)
            .or_else(|| {
                self.loader
                    .current()
                    .filter(|state| state.chat_id() == chat_id)
                    .map(|state| state.summary())
            })
            .cloned()
            .ok_or_else(|| ActionError::UnknownChat(chat_id.to_owned()))
    }

    fn has_offer(&self, chat_id: &str, summary: &ChatSummary) -> bool {
        match self.loader.current().filter(|state| state.chat_id() == chat_id) {
            Some(state) => state.pending_acceptance(),
            None => summary.accept_state.is_pending(),
        }
    }

    fn apply(&mut self, patch: &ChatMutation) {
        if patch.is_empty() {
            return;
        }
        self.chat_list.patch(patch);
        self.loader.apply_mutation(patch);
    }
}

/// Conversation tag-list edit behind a pending tag action.
#[derive(Debug, Clone, PartialEq, Eq)]
enum TagEdit {
    Add(TagId),
    Remove(TagId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingSend {
    chat_id: ChatId,
    placeholder: Option<MessageId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionCoordinator {
    org_id: OrgId,
    agent_id: AgentId,
    ledger: PendingActionLedger,
    sends: HashMap<ActionId, PendingSend>,
    rejections: HashSet<ActionId>,
    tag_edits: HashMap<ActionId, TagEdit>,
    next_local_id: u64,
}

impl ActionCoordinator {
    pub fn new(org_id: impl Into<OrgId>, agent_id: impl Into<AgentId>) -> Self {
        Self {
            org_id: org_id.into(),
            agent_id: agent_id.into(),
            ledger: PendingActionLedger::default(),
            sends: HashMap::new(),
            rejections: HashSet::new(),
            tag_edits: HashMap::new(),
            next_local_id: 0,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.ledger.len() + self.sends.len()
    }

    pub fn is_pending(&self, chat_id: &str, kind: ActionKind) -> bool {
        match kind {
            ActionKind::Send => self.sends.values().any(|send| send.chat_id == chat_id),
            kind => self.ledger.is_pending(chat_id, kind),
        }
    }

    /// Strips push fields owned by outstanding actions from `mutation`.
    pub fn filter_push(&mut self, mutation: &mut ChatMutation) {
        self.ledger.mask(mutation);
    }

    /// Lays every outstanding optimistic edit back over freshly fetched rows
    /// and conversation state, which only reflect the server's view.
    pub fn reapply_pending(&self, targets: &mut ActionTargets<'_>) {
        for action in self.ledger.actions() {
            targets.chat_list.patch(&action.optimistic);
            let Some(state) = targets.loader.conversation_for(&action.chat_id) else {
                continue;
            };
            match (action.kind, self.tag_edits.get(&action.id)) {
                (ActionKind::Tag, Some(TagEdit::Add(tag_id))) => state.add_tag(tag_id),
                (ActionKind::Tag, Some(TagEdit::Remove(tag_id))) => state.remove_tag(tag_id),
                (ActionKind::Acceptance, _) => {
                    state.apply_mutation(&action.optimistic);
                    state.set_pending_acceptance(false);
                }
                _ => {
                    state.apply_mutation(&action.optimistic);
                }
            }
        }
    }

    pub fn set_note(
        &mut self,
        targets: &mut ActionTargets<'_>,
        api: &dyn ChatMutationApi,
        chat_id: &str,
        note: Option<String>,
    ) -> Result<ActionId, ActionError> {
        let note = note
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());
        let mut optimistic = ChatMutation::new(chat_id);
        optimistic.note = Some(note.clone());

        self.run_patch(
            targets,
            api,
            ActionKind::Note,
            optimistic,
            MutationRequest::SetNote {
                note: note.unwrap_or_default(),
            },
        )
    }

    pub fn assign_agent(
        &mut self,
        targets: &mut ActionTargets<'_>,
        api: &dyn ChatMutationApi,
        chat_id: &str,
        agent_id: &str,
    ) -> Result<ActionId, ActionError> {
        let mut optimistic = ChatMutation::new(chat_id);
        optimistic.assigned_agent_id = Some(Some(agent_id.to_owned()));

        self.run_patch(
            targets,
            api,
            ActionKind::Assign,
            optimistic,
            MutationRequest::Assign {
                agent_id: agent_id.to_owned(),
            },
        )
    }

    pub fn change_status(
        &mut self,
        targets: &mut ActionTargets<'_>,
        api: &dyn ChatMutationApi,
        chat_id: &str,
        status: ChatStatus,
    ) -> Result<ActionId, ActionError> {
        let mut optimistic = ChatMutation::new(chat_id);
        optimistic.status = Some(status);

        self.run_patch(
            targets,
            api,
            ActionKind::Status,
            optimistic,
            MutationRequest::ChangeStatus { status },
        )
    }

    pub fn set_tag(
        &mut self,
        targets: &mut ActionTargets<'_>,
        api: &dyn ChatMutationApi,
        chat_id: &str,
        tag_id: &str,
    ) -> Result<ActionId, ActionError> {
        let summary = targets.summary(chat_id)?;
        self.ensure_idle(chat_id, ActionKind::Tag)?;

        let mut optimistic = ChatMutation::new(chat_id);
        optimistic.tag_id = Some(Some(tag_id.to_owned()));
        let rollback = self.tag_rollback(targets, &summary);
        let action_id = self.record(chat_id, ActionKind::Tag, optimistic.clone(), rollback)?;

        targets.chat_list.patch(&optimistic);
        if let Some(state) = targets.loader.conversation_for(chat_id) {
            state.add_tag(tag_id);
        }
        self.tag_edits.insert(action_id, TagEdit::Add(tag_id.to_owned()));
        self.submit(
            api,
            action_id,
            chat_id,
            MutationRequest::SetTag {
                tag_id: tag_id.to_owned(),
            },
        );
        Ok(action_id)
    }

    pub fn remove_tag(
        &mut self,
        targets: &mut ActionTargets<'_>,
        api: &dyn ChatMutationApi,
        chat_id: &str,
        tag_id: &str,
    ) -> Result<ActionId, ActionError> {
        let summary = targets.summary(chat_id)?;
        self.ensure_idle(chat_id, ActionKind::Tag)?;

        let remaining: Option<TagId> = match targets.loader.current().filter(|s| s.chat_id() == chat_id) {
            Some(state) => state
                .tag_ids()
                .iter()
                .filter(|existing| existing.as_str() != tag_id)
                .last()
                .cloned(),
            None => summary.tag_id.clone().filter(|existing| existing != tag_id),
        };
        let mut optimistic = ChatMutation::new(chat_id);
        optimistic.tag_id = Some(remaining);
        let rollback = self.tag_rollback(targets, &summary);
        let action_id = self.record(chat_id, ActionKind::Tag, optimistic.clone(), rollback)?;

        targets.chat_list.patch(&optimistic);
        if let Some(state) = targets.loader.conversation_for(chat_id) {
            state.remove_tag(tag_id);
        }
        self.tag_edits.insert(action_id, TagEdit::Remove(tag_id.to_owned()));
        self.submit(
            api,
            action_id,
            chat_id,
            MutationRequest::RemoveTag {
                tag_id: tag_id.to_owned(),
            },
        );
        Ok(action_id)
    }

    /// Answers a pending hand-off offer with "accept".
    pub fn accept(
        &mut self,
        targets: &mut ActionTargets<'_>,
        api: &dyn ChatMutationApi,
        chat_id: &str,
    ) -> Result<ActionId, ActionError> {
        let mut optimistic = ChatMutation::new(chat_id);
        optimistic.accept_state = Some(AcceptState::Accepted);
        optimistic.assigned_agent_id = Some(Some(self.agent_id.clone()));
        self.answer_offer(targets, api, optimistic, true)
    }

    /// Answers a pending hand-off offer with "reject". The chat leaves the
    /// inbox once the server confirms.
    pub fn reject(
        &mut self,
        targets: &mut ActionTargets<'_>,
        api: &dyn ChatMutationApi,
        chat_id: &str,
    ) -> Result<ActionId, ActionError> {
        let action_id = self.answer_offer(targets, api, ChatMutation::new(chat_id), false)?;
        self.rejections.insert(action_id);
        Ok(action_id)
    }

    pub fn send_message(
        &mut self,
        targets: &mut ActionTargets<'_>,
        api: &dyn ChatMutationApi,
        chat_id: &str,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<ActionId, ActionError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ActionError::EmptyMessage);
        }
        targets.summary(chat_id)?;

        let action_id = self.ledger.allocate_id();
        let placeholder = targets.loader.conversation_for(chat_id).map(|state| {
            self.next_local_id += 1;
            let id = MessageId::Local(self.next_local_id);
            state.insert_message(Message {
                id: id.clone(),
                chat_id: chat_id.to_owned(),
                sender_type: SenderType::Agent,
                sender_user_id: Some(self.agent_id.clone()),
                message_type: MessageType::Text,
                content: content.to_owned(),
                timestamp: now,
            });
            id
        });
        self.sends.insert(
            action_id,
            PendingSend {
                chat_id: chat_id.to_owned(),
                placeholder,
            },
        );

        self.submit(
            api,
            action_id,
            chat_id,
            MutationRequest::Send {
                agent_id: self.agent_id.clone(),
                message_type: MessageType::Text,
                content: content.to_owned(),
            },
        );
        Ok(action_id)
    }

    /// Settles the REST outcome of `action_id`. Unknown ids yield `None`.
    pub fn on_completed(
        &mut self,
        targets: &mut ActionTargets<'_>,
        action_id: ActionId,
        result: Result<ActionAck, ApiError>,
    ) -> Option<ActionSettled> {
        if let Some(send) = self.sends.remove(&action_id) {
            return Some(settle_send(targets, action_id, send, result));
        }

        let action = self.ledger.finish(action_id)?;
        let is_rejection = self.rejections.remove(&action_id);
        self.tag_edits.remove(&action_id);
        let chat_id = action.chat_id.clone();

        let notice = match result {
            Ok(_) => {
                let conflicts = action.optimistic.conflicts_with(&action.masked);
                if !conflicts.is_empty() {
                    tracing::warn!(
                        code = SyncFault::ConflictingMutation.code(),
                        chat_id = %chat_id,
                        kind = action.kind.as_label(),
                        fields = ?conflicts,
                        "pushed value contradicts confirmed action; keeping pushed value"
                    );
                }
                targets.apply(&action.masked);

                EngineNotice::ActionConfirmed {
                    action_id,
                    chat_id: chat_id.clone(),
                    kind: action.kind,
                }
            }
            Err(error) => {
                tracing::warn!(
                    code = ACTION_FAILED,
                    chat_id = %chat_id,
                    kind = action.kind.as_label(),
                    error = %error,
                    "action failed; rolling back"
                );

                targets.apply(&action.rollback_patch());
                if action.masked.tag_id.is_none() {
                    if let (Some(tag_ids), Some(state)) = (
                        action.rollback.tag_ids.clone(),
                        targets.loader.conversation_for(&chat_id),
                    ) {
                        state.set_tag_ids(tag_ids);
                    }
                }
                if action.rollback.pending_acceptance == Some(true)
                    && action.masked.accept_state.is_none()
                {
                    targets.loader.restore_offer(&chat_id);
                }

                EngineNotice::ActionFailed {
                    action_id,
                    chat_id: chat_id.clone(),
                    kind: action.kind,
                    error,
                }
            }
        };

        let confirmed = matches!(notice, EngineNotice::ActionConfirmed { .. });
        let closed_chat = if confirmed && is_rejection {
            targets.chat_list.remove(&chat_id);
            Some(chat_id)
        } else {
            targets.chat_list.remove_if_filtered_out(&chat_id, targets.filter);
            None
        };

        Some(ActionSettled {
            notice,
            closed_chat,
        })
    }

    fn answer_offer(
        &mut self,
        targets: &mut ActionTargets<'_>,
        api: &dyn ChatMutationApi,
        optimistic: ChatMutation,
        is_accept: bool,
    ) -> Result<ActionId, ActionError> {
        let chat_id = optimistic.chat_id.clone();
        let summary = targets.summary(&chat_id)?;
        self.ensure_idle(&chat_id, ActionKind::Acceptance)?;
        if !targets.has_offer(&chat_id, &summary) {
            return Err(ActionError::NotOffered(chat_id));
        }

        let mut rollback = Rollback::new(summary.capture(&optimistic.fields()));
        rollback.pending_acceptance = Some(true);
        let action_id = self.record(&chat_id, ActionKind::Acceptance, optimistic.clone(), rollback)?;

        targets.loader.take_offer(&chat_id);
        targets.apply(&optimistic);
        self.submit(
            api,
            action_id,
            &chat_id,
            MutationRequest::AcceptReject {
                agent_id: self.agent_id.clone(),
                is_accept,
            },
        );
        Ok(action_id)
    }

    fn run_patch(
        &mut self,
        targets: &mut ActionTargets<'_>,
        api: &dyn ChatMutationApi,
        kind: ActionKind,
        optimistic: ChatMutation,
        request: MutationRequest,
    ) -> Result<ActionId, ActionError> {
        let chat_id = optimistic.chat_id.clone();
        let summary = targets.summary(&chat_id)?;
        self.ensure_idle(&chat_id, kind)?;

        let rollback = Rollback::new(summary.capture(&optimistic.fields()));
        let action_id = self.record(&chat_id, kind, optimistic.clone(), rollback)?;

        targets.apply(&optimistic);
        self.submit(api, action_id, &chat_id, request);
        Ok(action_id)
    }

    fn tag_rollback(&self, targets: &ActionTargets<'_>, summary: &ChatSummary) -> Rollback {
        let mut rollback = Rollback::new(summary.capture(&[ChatField::Tag]));
        rollback.tag_ids = targets
            .loader
            .current()
            .filter(|state| state.chat_id() == summary.chat_id)
            .map(|state| state.tag_ids().to_vec());
        rollback
    }

    fn ensure_idle(&self, chat_id: &str, kind: ActionKind) -> Result<(), ActionError> {
        if self.ledger.is_pending(chat_id, kind) {
            return Err(ActionError::ActionInFlight {
                chat_id: chat_id.to_owned(),
                kind,
            });
        }
        Ok(())
    }

    fn record(
        &mut self,
        chat_id: &str,
        kind: ActionKind,
        optimistic: ChatMutation,
        rollback: Rollback,
    ) -> Result<ActionId, ActionError> {
        self.ledger
            .begin(chat_id, kind, optimistic, rollback)
            .ok_or_else(|| ActionError::ActionInFlight {
                chat_id: chat_id.to_owned(),
                kind,
            })
    }

    fn submit(
        &self,
        api: &dyn ChatMutationApi,
        action_id: ActionId,
        chat_id: &str,
        request: MutationRequest,
    ) {
        tracing::debug!(
            action_id = action_id.0,
            chat_id,
            request = request.name(),
            "submitting chat action"
        );
        api.submit(
            action_id,
            MutationCall {
                org_id: self.org_id.clone(),
                chat_id: chat_id.to_owned(),
                request,
            },
        );
    }
}

fn settle_send(
    targets: &mut ActionTargets<'_>,
    action_id: ActionId,
    send: PendingSend,
    result: Result<ActionAck, ApiError>,
) -> ActionSettled {
    let notice = match result {
        Ok(ack) => {
            if let (Some(local), Some(server_id), Some(state)) = (
                send.placeholder.as_ref(),
                ack.message_id,
                targets.loader.conversation_for(&send.chat_id),
            ) {
                state.promote_placeholder(local, server_id);
            }
            EngineNotice::ActionConfirmed {
                action_id,
                chat_id: send.chat_id,
                kind: ActionKind::Send,
            }
        }
        Err(error) => {
            tracing::warn!(
                code = ACTION_FAILED,
                chat_id = %send.chat_id,
                kind = ActionKind::Send.as_label(),
                error = %error,
                "message was not sent"
            );
            if let (Some(local), Some(state)) = (
                send.placeholder.as_ref(),
                targets.loader.conversation_for(&send.chat_id),
            ) {
                state.remove_message(local);
            }
            EngineNotice::ActionFailed {
                action_id,
                chat_id: send.chat_id,
                kind: ActionKind::Send,
                error,
            }
        }
    };

    ActionSettled {
        notice,
        closed_chat: None,
    }
}
