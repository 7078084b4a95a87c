//! Plain-text rendering of engine snapshots.
//!
//! Conversations are printed the way a chat pane reads:
//! - date separators between days
//! - consecutive messages from one sender grouped under a single header
//! - unconfirmed sends marked as such

use chrono::{DateTime, Local, NaiveDate, Utc};

use crate::{
    domain::{
        chat::ChatSummary,
        chat_list_state::{ChatListState, ChatListUiState},
        conversation_state::{ConversationPhase, ConversationState},
        filter::{FilterState, StatusFilter},
        message::{Message, SenderType},
        status::ConnectionStatus,
    },
    usecases::actions::EngineNotice,
};

const PREVIEW_CHARS: usize = 40;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageListElement {
    DateSeparator(String),
    Message {
        time: String,
        sender: Option<String>,
        content: String,
        pending: bool,
    },
}

/// Groups consecutive messages of one sender and inserts date separators.
pub fn build_message_list_elements(
    messages: &[Message],
    customer_name: &str,
    own_agent_id: &str,
) -> Vec<MessageListElement> {
    let mut elements = Vec::new();
    let mut prev_date: Option<NaiveDate> = None;
    let mut prev_sender: Option<String> = None;

    for message in messages {
        let date = local_date(message.timestamp);
        if prev_date != Some(date) {
            elements.push(MessageListElement::DateSeparator(format_date(date)));
            prev_sender = None;
        }

        let sender = sender_name(message, customer_name, own_agent_id);
        let show_sender = prev_sender.as_deref() != Some(sender.as_str());

        elements.push(MessageListElement::Message {
            time: format_time(message.timestamp),
            sender: show_sender.then(|| sender.clone()),
            content: message.preview(),
            pending: message.id.is_local(),
        });

        prev_date = Some(date);
        prev_sender = Some(sender);
    }

    elements
}

pub fn element_lines(element: &MessageListElement) -> Vec<String> {
    match element {
        MessageListElement::DateSeparator(date) => vec![format!("--- {date} ---")],
        MessageListElement::Message {
            time,
            sender,
            content,
            pending,
        } => {
            let marker = if *pending { " (sending)" } else { "" };
            let body = if content.is_empty() {
                "[Empty message]"
            } else {
                content.as_str()
            };
            let mut lines = Vec::new();
            if let Some(sender) = sender {
                lines.push(format!("{time:>5} {sender}:"));
            }
            for (index, text) in body.lines().enumerate() {
                let last = index + 1 == body.lines().count();
                let suffix = if last { marker } else { "" };
                lines.push(format!("      {text}{suffix}"));
            }
            lines
        }
    }
}

pub fn status_line(
    connection: ConnectionStatus,
    filter: &FilterState,
    chat_count: usize,
    has_more: bool,
    pending_actions: usize,
) -> String {
    let mut line = format!(
        "{} | {} chats{} | {}",
        connection_label(connection),
        chat_count,
        if has_more { " (more available)" } else { "" },
        filter_summary(filter)
    );
    if pending_actions > 0 {
        line.push_str(&format!(" | {pending_actions} pending"));
    }
    line
}

pub fn chat_list_lines(chats: &ChatListState) -> Vec<String> {
    match chats.ui_state() {
        ChatListUiState::Loading if chats.is_empty() => return vec!["Loading chats...".to_owned()],
        ChatListUiState::Error => return vec!["Could not load chats. Try `refresh`.".to_owned()],
        ChatListUiState::Empty => return vec!["No chats match this filter.".to_owned()],
        _ => {}
    }

    let selected = chats.selected_chat_id();
    chats
        .chats()
        .map(|chat| chat_line(chat, selected == Some(chat.chat_id.as_str())))
        .collect()
}

fn chat_line(chat: &ChatSummary, selected: bool) -> String {
    let cursor = if selected { ">" } else { " " };
    let unread = if chat.unread_count > 0 {
        format!(" ({})", chat.unread_count)
    } else {
        String::new()
    };
    let offer = if chat.accept_state.is_pending() {
        " [offer]"
    } else {
        ""
    };
    let time = chat
        .latest_message_at
        .map(format_time)
        .unwrap_or_else(|| "--:--".to_owned());
    let preview: String = chat
        .latest_message_preview
        .as_deref()
        .unwrap_or_default()
        .chars()
        .take(PREVIEW_CHARS)
        .collect();

    format!(
        "{cursor} {:<12} {}{unread} [{} {}]{offer} {time} {preview}",
        chat.chat_id,
        chat.display_name,
        chat.platform.as_label(),
        chat.status.as_label(),
    )
}

pub fn conversation_lines(conversation: &ConversationState, own_agent_id: &str) -> Vec<String> {
    let summary = conversation.summary();
    let mut lines = vec![format!(
        "== {} ({}) [{}] ==",
        summary.display_name,
        summary.chat_id,
        summary.status.as_label()
    )];

    let mut details = Vec::new();
    if let Some(agent) = &summary.assigned_agent_id {
        details.push(format!("assigned: {agent}"));
    }
    if !conversation.tag_ids().is_empty() {
        details.push(format!("tags: {}", conversation.tag_ids().join(", ")));
    }
    if let Some(note) = conversation.note() {
        details.push(format!("note: {note}"));
    }
    if conversation.pending_acceptance() {
        details.push("waiting for accept/reject".to_owned());
    }
    if !details.is_empty() {
        lines.push(details.join(" | "));
    }

    match conversation.phase() {
        ConversationPhase::Loading if conversation.messages().is_empty() => {
            lines.push("Loading messages...".to_owned());
        }
        ConversationPhase::Error => {
            lines.push("Could not load messages. Try `open` again.".to_owned());
        }
        _ => {
            let elements = build_message_list_elements(
                conversation.messages(),
                &summary.display_name,
                own_agent_id,
            );
            lines.extend(elements.iter().flat_map(element_lines));
        }
    }

    lines
}

pub fn notice_line(notice: &EngineNotice) -> String {
    match notice {
        EngineNotice::ActionConfirmed {
            action_id,
            chat_id,
            kind,
        } => format!("#{} {} on {chat_id} done", action_id.0, kind.as_label()),
        EngineNotice::ActionFailed {
            action_id,
            chat_id,
            kind,
            error,
        } => format!(
            "#{} {} on {chat_id} failed and was undone: {error}",
            action_id.0,
            kind.as_label()
        ),
    }
}

pub fn connection_label(status: ConnectionStatus) -> String {
    match status {
        ConnectionStatus::Connecting => "connecting".to_owned(),
        ConnectionStatus::Connected => "live".to_owned(),
        ConnectionStatus::Reconnecting { attempt } => {
            format!("connection lost, reconnecting (attempt {attempt})")
        }
        ConnectionStatus::Disconnected => "disconnected".to_owned(),
    }
}

fn filter_summary(filter: &FilterState) -> String {
    let status = match filter.status {
        StatusFilter::All => "all".to_owned(),
        StatusFilter::Unread => "unread".to_owned(),
        StatusFilter::Unassigned => "unassigned".to_owned(),
        StatusFilter::Status(status) => status.as_label().to_owned(),
    };
    let mut parts = vec![format!("status={status}")];
    if let Some(channel) = &filter.channel_id {
        parts.push(format!("channel={channel}"));
    }
    if let Some(tag) = &filter.tag_id {
        parts.push(format!("tag={tag}"));
    }
    if let Some(term) = &filter.search_term {
        parts.push(format!("search=\"{term}\""));
    }
    parts.join(" ")
}

fn sender_name(message: &Message, customer_name: &str, own_agent_id: &str) -> String {
    match message.sender_type {
        SenderType::Customer => customer_name.to_owned(),
        SenderType::Agent => match message.sender_user_id.as_deref() {
            Some(id) if id == own_agent_id => "You".to_owned(),
            Some(id) => format!("Agent {id}"),
            None => "Agent".to_owned(),
        },
    }
}

fn local_date(timestamp: DateTime<Utc>) -> NaiveDate {
    timestamp.with_timezone(&Local).date_naive()
}

fn format_date(date: NaiveDate) -> String {
    date.format("%-d %b %Y").to_string()
}

fn format_time(timestamp: DateTime<Utc>) -> String {
    timestamp.with_timezone(&Local).format("%H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{
            message::{MessageId, MessageType},
            pending_actions::{ActionId, ActionKind},
        },
        test_support::{chat, message},
    };

    const DAY: i64 = 86_400;

    fn from_agent(id: &str, agent: &str, content: &str, secs: i64) -> Message {
        Message {
            sender_type: SenderType::Agent,
            sender_user_id: Some(agent.to_owned()),
            ..message(id, "c", content, secs)
        }
    }

    #[test]
    fn groups_consecutive_messages_from_same_sender() {
        let messages = vec![message("m1", "c", "First", 0), message("m2", "c", "Second", 60)];

        let elements = build_message_list_elements(&messages, "Alice", "agent-1");

        assert_eq!(elements.len(), 3);
        assert!(matches!(&elements[1], MessageListElement::Message { sender: Some(name), .. } if name == "Alice"));
        assert!(matches!(&elements[2], MessageListElement::Message { sender: None, .. }));
    }

    #[test]
    fn names_own_and_other_agents() {
        let messages = vec![
            from_agent("m1", "agent-1", "Hi", 0),
            from_agent("m2", "agent-2", "Hello", 60),
        ];

        let elements = build_message_list_elements(&messages, "Alice", "agent-1");

        assert!(matches!(&elements[1], MessageListElement::Message { sender: Some(name), .. } if name == "You"));
        assert!(matches!(&elements[2], MessageListElement::Message { sender: Some(name), .. } if name == "Agent agent-2"));
    }

    #[test]
    fn date_change_inserts_separator_and_resets_grouping() {
        let messages = vec![message("m1", "c", "Day 1", 0), message("m2", "c", "Day 2", 2 * DAY)];

        let elements = build_message_list_elements(&messages, "Alice", "agent-1");

        assert_eq!(elements.len(), 4);
        assert!(matches!(&elements[2], MessageListElement::DateSeparator(_)));
        assert!(matches!(&elements[3], MessageListElement::Message { sender: Some(_), .. }));
    }

    #[test]
    fn placeholder_and_media_render_with_markers() {
        let placeholder = Message {
            id: MessageId::Local(1),
            ..from_agent("x", "agent-1", "on my way", 0)
        };
        let image = Message {
            message_type: MessageType::Image,
            ..message("m2", "c", "", 30)
        };

        let elements = build_message_list_elements(&[placeholder, image], "Alice", "agent-1");
        let lines: Vec<String> = elements.iter().flat_map(element_lines).collect();

        assert!(lines.iter().any(|line| line.ends_with("on my way (sending)")));
        assert!(lines.iter().any(|line| line.trim() == "[Image]"));
    }

    #[test]
    fn chat_lines_mark_selection_unread_and_offer() {
        let mut state = ChatListState::default();
        let mut offered = chat("a", 10);
        offered.unread_count = 2;
        offered.accept_state = crate::domain::chat::AcceptState::Offered;
        state.apply_page(vec![offered, chat("b", 5)], true);
        state.set_selected(Some("a".to_owned()));

        let lines = chat_list_lines(&state);

        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("> a"));
        assert!(lines[0].contains("Chat a (2)"));
        assert!(lines[0].contains("[offer]"));
        assert!(lines[1].starts_with("  b"));
    }

    #[test]
    fn empty_and_failed_lists_explain_themselves() {
        let mut state = ChatListState::default();
        assert_eq!(chat_list_lines(&state), vec!["Loading chats...".to_owned()]);

        state.set_error();
        assert!(chat_list_lines(&state)[0].contains("refresh"));
    }

    #[test]
    fn status_line_summarises_filter_and_connection() {
        let mut filter = FilterState::default();
        filter.status = StatusFilter::Unread;
        filter.search_term = Some("ali".to_owned());

        let line = status_line(ConnectionStatus::Reconnecting { attempt: 2 }, &filter, 4, true, 1);

        assert_eq!(
            line,
            "connection lost, reconnecting (attempt 2) | 4 chats (more available) | status=unread search=\"ali\" | 1 pending"
        );
    }

    #[test]
    fn failed_notice_mentions_rollback() {
        let notice = EngineNotice::ActionFailed {
            action_id: ActionId(7),
            chat_id: "c".to_owned(),
            kind: ActionKind::Tag,
            error: crate::domain::events::ApiError::Timeout,
        };

        assert_eq!(
            notice_line(&notice),
            "#7 tag on c failed and was undone: request timed out"
        );
    }
}
