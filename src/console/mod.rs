//! Line-oriented agent console: parses commands, drives the engine and
//! renders its snapshots as text.

pub mod command;
pub mod input;
pub mod render;

use crate::{
    domain::pending_actions::ActionId,
    usecases::{actions::ActionError, engine::InboxEngine},
};

use command::{ConsoleCommand, HELP_LINES};

const NO_OPEN_CHAT: &str = "Open a chat first (`open <chat>`).";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Continue(Vec<String>),
    Quit,
}

/// Status line, chat list and the open conversation.
pub fn snapshot_lines(engine: &InboxEngine, own_agent_id: &str) -> Vec<String> {
    let mut lines = vec![render::status_line(
        engine.connection_status(),
        engine.filter(),
        engine.chats().len(),
        engine.has_more_pages(),
        engine.pending_actions(),
    )];
    lines.extend(render::chat_list_lines(engine.chats()));
    if let Some(conversation) = engine.conversation() {
        lines.push(String::new());
        lines.extend(render::conversation_lines(conversation, own_agent_id));
    }
    lines
}

pub fn execute(engine: &mut InboxEngine, own_agent_id: &str, command: ConsoleCommand) -> Step {
    let lines = match command {
        ConsoleCommand::Quit => return Step::Quit,
        ConsoleCommand::Help => HELP_LINES.iter().map(|line| (*line).to_owned()).collect(),
        ConsoleCommand::List => snapshot_lines(engine, own_agent_id),
        ConsoleCommand::More => {
            if engine.load_more() {
                vec!["Loading the next page...".to_owned()]
            } else {
                vec!["No more pages.".to_owned()]
            }
        }
        ConsoleCommand::Refresh => {
            engine.refresh();
            vec!["Refreshing...".to_owned()]
        }
        ConsoleCommand::FilterStatus(status) => filter_outcome(engine.set_status_filter(status)),
        ConsoleCommand::FilterChannel(channel) => filter_outcome(engine.set_channel_filter(channel)),
        ConsoleCommand::FilterTag(tag) => filter_outcome(engine.set_tag_filter(tag)),
        ConsoleCommand::FilterSearch(term) => filter_outcome(engine.set_search(term)),
        ConsoleCommand::Open(chat_id) => match engine.select(&chat_id) {
            Ok(_) => vec![format!("Opening {chat_id}...")],
            Err(error) => vec![error.to_string()],
        },
        ConsoleCommand::Close => match engine.deselect() {
            Some(chat_id) => vec![format!("Closed {chat_id}.")],
            None => vec!["No chat is open.".to_owned()],
        },
        ConsoleCommand::Reload => match engine.reload_conversation() {
            Some(_) => vec!["Reloading...".to_owned()],
            None => vec![NO_OPEN_CHAT.to_owned()],
        },
        ConsoleCommand::History => match engine.load_full_history() {
            Some(_) => vec!["Loading the full history...".to_owned()],
            None => vec![NO_OPEN_CHAT.to_owned()],
        },
        ConsoleCommand::Note(note) => on_open_chat(engine, "note", |engine, chat_id| {
            engine.set_note(chat_id, note)
        }),
        ConsoleCommand::Tag(tag_id) => on_open_chat(engine, "tag", |engine, chat_id| {
            engine.set_tag(chat_id, &tag_id)
        }),
        ConsoleCommand::Untag(tag_id) => on_open_chat(engine, "untag", |engine, chat_id| {
            engine.remove_tag(chat_id, &tag_id)
        }),
        ConsoleCommand::Assign(agent_id) => on_open_chat(engine, "assign", |engine, chat_id| {
            engine.assign_agent(chat_id, &agent_id)
        }),
        ConsoleCommand::Status(status) => on_open_chat(engine, "status", |engine, chat_id| {
            engine.change_status(chat_id, status)
        }),
        ConsoleCommand::Send(text) => on_open_chat(engine, "send", |engine, chat_id| {
            engine.send_message(chat_id, &text)
        }),
        ConsoleCommand::Accept => {
            on_open_chat(engine, "accept", |engine, chat_id| engine.accept(chat_id))
        }
        ConsoleCommand::Reject => {
            on_open_chat(engine, "reject", |engine, chat_id| engine.reject(chat_id))
        }
    };
    Step::Continue(lines)
}

fn filter_outcome(changed: bool) -> Vec<String> {
    if changed {
        vec!["Filter applied; loading...".to_owned()]
    } else {
        vec!["Filter unchanged.".to_owned()]
    }
}

fn on_open_chat<F>(engine: &mut InboxEngine, label: &str, action: F) -> Vec<String>
where
    F: FnOnce(&mut InboxEngine, &str) -> Result<ActionId, ActionError>,
{
    let Some(chat_id) = engine
        .conversation()
        .map(|conversation| conversation.chat_id().to_owned())
    else {
        return vec![NO_OPEN_CHAT.to_owned()];
    };

    match action(engine, &chat_id) {
        Ok(action_id) => vec![format!("#{} {label} on {chat_id} sent", action_id.0)],
        Err(error) => vec![error.to_string()],
    }
}
