use std::collections::VecDeque;

use super::{
    chat::{ChatId, ChatSummary},
    filter::FilterState,
    message::{Message, MessageId},
    mutation::ChatMutation,
};

/// How many applied message ids each row remembers for duplicate suppression.
const RECENT_MESSAGE_IDS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatListUiState {
    Loading,
    Ready,
    Empty,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NewMessageOutcome {
    Applied,
    Duplicate,
    /// The store has no row for the chat; a summary cannot be built from a message.
    UnknownChat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    Applied,
    Unchanged,
    /// The row no longer matched the filter after the patch and was dropped.
    Removed,
    /// The chat is absent but the patch suggests it now belongs to the filter.
    UnknownChat,
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ChatEntry {
    summary: ChatSummary,
    recent_message_ids: VecDeque<MessageId>,
}

impl ChatEntry {
    fn new(summary: ChatSummary) -> Self {
        Self {
            summary,
            recent_message_ids: VecDeque::new(),
        }
    }

    fn remember(&mut self, id: &MessageId) -> bool {
        if self.recent_message_ids.contains(id) {
            return false;
        }
        if self.recent_message_ids.len() == RECENT_MESSAGE_IDS {
            self.recent_message_ids.pop_front();
        }
        self.recent_message_ids.push_back(id.clone());
        true
    }
}

/// Canonical ordered inbox for the active filter.
///
/// Rows are unique by chat id and ordered by latest message time, newest
/// first. Rows without any message sort last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatListState {
    ui_state: ChatListUiState,
    entries: Vec<ChatEntry>,
    selected_chat_id: Option<ChatId>,
}

impl Default for ChatListState {
    fn default() -> Self {
        Self {
            ui_state: ChatListUiState::Loading,
            entries: Vec::new(),
            selected_chat_id: None,
        }
    }
}

impl ChatListState {
    pub fn ui_state(&self) -> ChatListUiState {
        self.ui_state
    }

    pub fn chats(&self) -> impl Iterator<Item = &ChatSummary> {
        self.entries.iter().map(|entry| &entry.summary)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, chat_id: &str) -> Option<&ChatSummary> {
        self.position(chat_id).map(|index| &self.entries[index].summary)
    }

    pub fn contains(&self, chat_id: &str) -> bool {
        self.position(chat_id).is_some()
    }

    pub fn total_unread(&self) -> u32 {
        self.chats().map(|chat| chat.unread_count).sum()
    }

    pub fn selected_chat_id(&self) -> Option<&str> {
        self.selected_chat_id.as_deref()
    }

    pub fn set_selected(&mut self, chat_id: Option<ChatId>) {
        self.selected_chat_id = chat_id;
    }

    pub fn set_loading(&mut self) {
        self.ui_state = ChatListUiState::Loading;
        self.entries.clear();
    }

    pub fn set_error(&mut self) {
        self.ui_state = ChatListUiState::Error;
        self.entries.clear();
    }

    /// Merges a fetched page.
    ///
    /// The first page replaces the contents. Later pages only add chats that
    /// are not present yet; a present chat is refreshed only when the fetched
    /// row carries a newer latest message.
    pub fn apply_page(&mut self, chats: Vec<ChatSummary>, is_first_page: bool) {
        if is_first_page {
            let previous = std::mem::take(&mut self.entries);
            for summary in chats {
                if self.contains(&summary.chat_id) {
                    continue;
                }
                let mut entry = previous
                    .iter()
                    .find(|old| old.summary.chat_id == summary.chat_id)
                    .map(|old| ChatEntry {
                        summary: summary.clone(),
                        recent_message_ids: old.recent_message_ids.clone(),
                    })
                    .unwrap_or_else(|| ChatEntry::new(summary));
                self.clear_unread_if_selected(&mut entry.summary);
                self.entries.push(entry);
            }
        } else {
            for mut summary in chats {
                self.clear_unread_if_selected(&mut summary);
                match self.position(&summary.chat_id) {
                    Some(index) => {
                        let existing = &mut self.entries[index].summary;
                        if summary.latest_message_at > existing.latest_message_at {
                            *existing = summary;
                        }
                    }
                    None => self.entries.push(ChatEntry::new(summary)),
                }
            }
        }

        self.sort();
        self.ui_state = if self.entries.is_empty() {
            ChatListUiState::Empty
        } else {
            ChatListUiState::Ready
        };
    }

    /// Reflects a pushed message on its row and moves the row up.
    pub fn apply_new_message(&mut self, message: &Message) -> NewMessageOutcome {
        let Some(index) = self.position(&message.chat_id) else {
            return NewMessageOutcome::UnknownChat;
        };

        let is_selected = self.selected_chat_id.as_deref() == Some(message.chat_id.as_str());
        let mut entry = self.entries.remove(index);
        if !entry.remember(&message.id) {
            self.entries.insert(index, entry);
            return NewMessageOutcome::Duplicate;
        }

        let summary = &mut entry.summary;
        if summary
            .latest_message_at
            .map_or(true, |latest| message.timestamp >= latest)
        {
            summary.latest_message_preview = Some(message.preview());
            summary.latest_message_at = Some(message.timestamp);
        }
        if !is_selected {
            summary.unread_count = summary.unread_count.saturating_add(1);
        }

        let latest = summary.latest_message_at;
        let position = self
            .entries
            .iter()
            .position(|other| other.summary.latest_message_at <= latest)
            .unwrap_or(self.entries.len());
        self.entries.insert(position, entry);
        if self.ui_state == ChatListUiState::Empty {
            self.ui_state = ChatListUiState::Ready;
        }

        NewMessageOutcome::Applied
    }

    /// Applies a pushed patch, then re-checks the row against `filter`.
    pub fn apply_mutation(&mut self, mutation: &ChatMutation, filter: &FilterState) -> MutationOutcome {
        let Some(index) = self.position(&mutation.chat_id) else {
            return if filter.admits_mutation(mutation) {
                MutationOutcome::UnknownChat
            } else {
                MutationOutcome::Ignored
            };
        };

        let changed = self.patch_entry(index, mutation);
        if self.remove_if_filtered_out(&mutation.chat_id, filter) {
            return MutationOutcome::Removed;
        }

        if changed {
            MutationOutcome::Applied
        } else {
            MutationOutcome::Unchanged
        }
    }

    /// Applies a patch without re-evaluating filter membership.
    ///
    /// Used for optimistic edits and their rollbacks, which must land on the
    /// same row they started from.
    pub fn patch(&mut self, mutation: &ChatMutation) -> bool {
        match self.position(&mutation.chat_id) {
            Some(index) => self.patch_entry(index, mutation),
            None => false,
        }
    }

    pub fn remove_if_filtered_out(&mut self, chat_id: &str, filter: &FilterState) -> bool {
        let Some(index) = self.position(chat_id) else {
            return false;
        };
        if filter.matches(&self.entries[index].summary) {
            return false;
        }

        self.entries.remove(index);
        if self.entries.is_empty() {
            self.ui_state = ChatListUiState::Empty;
        }
        true
    }

    pub fn remove(&mut self, chat_id: &str) -> Option<ChatSummary> {
        let index = self.position(chat_id)?;
        let entry = self.entries.remove(index);
        if self.entries.is_empty() {
            self.ui_state = ChatListUiState::Empty;
        }
        Some(entry.summary)
    }

    /// Resets the unread counter. Returns whether there was anything unread.
    pub fn mark_read(&mut self, chat_id: &str) -> bool {
        let Some(index) = self.position(chat_id) else {
            return false;
        };
        let summary = &mut self.entries[index].summary;
        let had_unread = summary.unread_count > 0;
        summary.unread_count = 0;
        had_unread
    }

    fn patch_entry(&mut self, index: usize, mutation: &ChatMutation) -> bool {
        let is_selected = self.selected_chat_id.as_deref() == Some(mutation.chat_id.as_str());
        let summary = &mut self.entries[index].summary;
        let changed = summary.apply(mutation);
        if is_selected && summary.unread_count > 0 {
            summary.unread_count = 0;
        }
        changed
    }

    fn clear_unread_if_selected(&self, summary: &mut ChatSummary) {
        if self.selected_chat_id.as_deref() == Some(summary.chat_id.as_str()) {
            summary.unread_count = 0;
        }
    }

    fn position(&self, chat_id: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.summary.chat_id == chat_id)
    }

    fn sort(&mut self) {
        // Stable: rows with equal times keep their arrival order.
        self.entries.sort_by(|left, right| {
            right
                .summary
                .latest_message_at
                .cmp(&left.summary.latest_message_at)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{
            chat::ChatStatus,
            filter::{FilterChange, StatusFilter},
        },
        test_support::{at, chat, message},
    };

    fn ids(state: &ChatListState) -> Vec<String> {
        state.chats().map(|chat| chat.chat_id.clone()).collect()
    }

    #[test]
    fn default_state_is_loading_and_empty() {
        let state = ChatListState::default();

        assert_eq!(state.ui_state(), ChatListUiState::Loading);
        assert!(state.is_empty());
        assert_eq!(state.selected_chat_id(), None);
    }

    #[test]
    fn first_page_replaces_contents_and_orders_by_time() {
        let mut state = ChatListState::default();
        state.apply_page(vec![chat("old", 1)], true);

        state.apply_page(vec![chat("a", 5), chat("b", 9), chat("c", 7)], true);

        assert_eq!(ids(&state), vec!["b", "c", "a"]);
        assert_eq!(state.ui_state(), ChatListUiState::Ready);
    }

    #[test]
    fn empty_first_page_transitions_to_empty_state() {
        let mut state = ChatListState::default();

        state.apply_page(vec![], true);

        assert_eq!(state.ui_state(), ChatListUiState::Empty);
    }

    #[test]
    fn appended_page_skips_present_chats_without_moving_them() {
        let mut state = ChatListState::default();
        state.apply_page(vec![chat("a", 10), chat("b", 5)], true);
        let mut stale_copy = chat("a", 10);
        stale_copy.display_name = "changed".to_owned();

        state.apply_page(vec![stale_copy, chat("c", 3)], false);

        assert_eq!(ids(&state), vec!["a", "b", "c"]);
        assert_eq!(state.get("a").map(|c| c.display_name.as_str()), Some("Chat a"));
    }

    #[test]
    fn appended_row_with_newer_time_refreshes_and_reorders() {
        let mut state = ChatListState::default();
        state.apply_page(vec![chat("a", 10), chat("b", 5)], true);

        state.apply_page(vec![chat("b", 20)], false);

        assert_eq!(ids(&state), vec!["b", "a"]);
        assert_eq!(state.len(), 2);
    }

    #[test]
    fn duplicate_ids_inside_a_page_keep_the_first() {
        let mut state = ChatListState::default();

        state.apply_page(vec![chat("a", 10), chat("a", 2)], true);

        assert_eq!(state.len(), 1);
        assert_eq!(state.get("a").and_then(|c| c.latest_message_at), Some(at(10)));
    }

    #[test]
    fn new_message_moves_chat_to_head_and_counts_unread() {
        let mut state = ChatListState::default();
        state.apply_page(vec![chat("A", 10), chat("B", 5)], true);

        let outcome = state.apply_new_message(&message("m1", "B", "hi", 20));

        assert_eq!(outcome, NewMessageOutcome::Applied);
        assert_eq!(ids(&state), vec!["B", "A"]);
        let b = state.get("B").expect("B present");
        assert_eq!(b.unread_count, 1);
        assert_eq!(b.latest_message_at, Some(at(20)));
        assert_eq!(b.latest_message_preview.as_deref(), Some("hi"));
    }

    #[test]
    fn new_message_for_selected_chat_keeps_unread_at_zero() {
        let mut state = ChatListState::default();
        state.apply_page(vec![chat("A", 10), chat("B", 5)], true);
        state.set_selected(Some("B".to_owned()));

        state.apply_new_message(&message("m1", "B", "hi", 20));

        assert_eq!(ids(&state), vec!["B", "A"]);
        assert_eq!(state.get("B").map(|c| c.unread_count), Some(0));
    }

    #[test]
    fn repeated_new_message_is_idempotent() {
        let mut state = ChatListState::default();
        state.apply_page(vec![chat("A", 10), chat("B", 5)], true);
        let pushed = message("m1", "B", "hi", 20);

        state.apply_new_message(&pushed);
        let once = state.clone();
        let outcome = state.apply_new_message(&pushed);

        assert_eq!(outcome, NewMessageOutcome::Duplicate);
        assert_eq!(state, once);
    }

    #[test]
    fn older_message_does_not_regress_preview() {
        let mut state = ChatListState::default();
        state.apply_page(vec![chat("A", 10)], true);

        state.apply_new_message(&message("late", "A", "older", 4));

        let a = state.get("A").expect("A present");
        assert_eq!(a.latest_message_at, Some(at(10)));
        assert_eq!(a.unread_count, 1);
    }

    #[test]
    fn new_message_for_unknown_chat_is_reported() {
        let mut state = ChatListState::default();
        state.apply_page(vec![chat("A", 10)], true);

        let outcome = state.apply_new_message(&message("m1", "Z", "hi", 20));

        assert_eq!(outcome, NewMessageOutcome::UnknownChat);
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn repeated_mutation_is_idempotent() {
        let mut state = ChatListState::default();
        let filter = FilterState::default();
        state.apply_page(vec![chat("A", 10)], true);
        let mut mutation = ChatMutation::new("A");
        mutation.tag_id = Some(Some("vip".to_owned()));
        mutation.status = Some(ChatStatus::InProgress);

        assert_eq!(state.apply_mutation(&mutation, &filter), MutationOutcome::Applied);
        let once = state.clone();
        assert_eq!(state.apply_mutation(&mutation, &filter), MutationOutcome::Unchanged);
        assert_eq!(state, once);
    }

    #[test]
    fn mutation_that_leaves_filter_removes_row() {
        let mut state = ChatListState::default();
        let mut filter = FilterState::default();
        filter.apply(FilterChange::Status(StatusFilter::Unassigned));
        state.apply_page(vec![chat("A", 10), chat("B", 5)], true);
        let mut mutation = ChatMutation::new("A");
        mutation.assigned_agent_id = Some(Some("agent-2".to_owned()));

        let outcome = state.apply_mutation(&mutation, &filter);

        assert_eq!(outcome, MutationOutcome::Removed);
        assert_eq!(ids(&state), vec!["B"]);
    }

    #[test]
    fn mutation_for_absent_chat_reports_unknown_only_when_it_may_match() {
        let mut state = ChatListState::default();
        let mut filter = FilterState::default();
        filter.apply(FilterChange::Status(StatusFilter::Status(ChatStatus::Pending)));

        let mut matching = ChatMutation::new("Z");
        matching.status = Some(ChatStatus::Pending);
        let mut other = ChatMutation::new("Z");
        other.status = Some(ChatStatus::Closed);

        assert_eq!(state.apply_mutation(&matching, &filter), MutationOutcome::UnknownChat);
        assert_eq!(state.apply_mutation(&other, &filter), MutationOutcome::Ignored);
    }

    #[test]
    fn selected_chat_ignores_pushed_unread_count() {
        let mut state = ChatListState::default();
        state.apply_page(vec![chat("A", 10)], true);
        state.set_selected(Some("A".to_owned()));
        let mut mutation = ChatMutation::new("A");
        mutation.unread_count = Some(4);

        state.apply_mutation(&mutation, &FilterState::default());

        assert_eq!(state.get("A").map(|c| c.unread_count), Some(0));
    }

    #[test]
    fn mark_read_resets_instead_of_decrementing() {
        let mut state = ChatListState::default();
        let mut unread = chat("A", 10);
        unread.unread_count = 3;
        state.apply_page(vec![unread], true);

        assert!(state.mark_read("A"));
        assert!(!state.mark_read("A"));
        assert_eq!(state.get("A").map(|c| c.unread_count), Some(0));
    }

    #[test]
    fn removing_last_row_transitions_to_empty() {
        let mut state = ChatListState::default();
        state.apply_page(vec![chat("A", 10)], true);

        assert!(state.remove("A").is_some());
        assert_eq!(state.ui_state(), ChatListUiState::Empty);
        assert!(state.remove("A").is_none());
    }

    #[test]
    fn total_unread_sums_rows() {
        let mut state = ChatListState::default();
        let mut a = chat("A", 10);
        a.unread_count = 2;
        let mut b = chat("B", 5);
        b.unread_count = 3;
        state.apply_page(vec![a, b], true);

        assert_eq!(state.total_unread(), 5);
    }
}
