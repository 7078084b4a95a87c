//! Line commands of the agent console.

use thiserror::Error;

use crate::domain::{chat::ChatStatus, filter::StatusFilter};

pub const HELP_LINES: [&str; 17] = [
    "list                      show the inbox",
    "more                      load the next page",
    "refresh                   reload page 1 with the current filter",
    "filter status <status>    all | unread | unassigned | pending | assigned | inprogress | closed",
    "filter channel <id|all>   narrow to one channel",
    "filter tag <id|none>      narrow to one tag",
    "filter search [term]      search by name; no term clears",
    "open <chat>               open a conversation",
    "close                     close the open conversation",
    "reload                    reload the open conversation",
    "history                   load the full history of the open conversation",
    "note [text]               set the note; no text clears it",
    "tag <id> / untag <id>     add or remove a tag",
    "assign <agent>            assign the open chat",
    "status <status>           change the chat status",
    "send <text> / accept / reject",
    "quit                      leave the console",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    List,
    More,
    Refresh,
    FilterStatus(StatusFilter),
    FilterChannel(Option<String>),
    FilterTag(Option<String>),
    FilterSearch(Option<String>),
    Open(String),
    Close,
    Reload,
    History,
    Note(Option<String>),
    Tag(String),
    Untag(String),
    Assign(String),
    Status(ChatStatus),
    Send(String),
    Accept,
    Reject,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unknown command `{0}`; type `help`")]
    Unknown(String),
    #[error("`{command}` needs {expected}")]
    MissingArgument {
        command: &'static str,
        expected: &'static str,
    },
    #[error("unknown status `{0}`")]
    UnknownStatus(String),
}

/// Parses one input line. Blank lines yield `Ok(None)`.
pub fn parse(line: &str) -> Result<Option<ConsoleCommand>, CommandError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (word, rest) = split_word(line);
    let command = match word.to_ascii_lowercase().as_str() {
        "list" | "ls" => ConsoleCommand::List,
        "more" => ConsoleCommand::More,
        "refresh" => ConsoleCommand::Refresh,
        "filter" => parse_filter(rest)?,
        "open" => ConsoleCommand::Open(required_word(rest, "open", "a chat id")?),
        "close" => ConsoleCommand::Close,
        "reload" => ConsoleCommand::Reload,
        "history" => ConsoleCommand::History,
        "note" => ConsoleCommand::Note(optional_text(rest)),
        "tag" => ConsoleCommand::Tag(required_word(rest, "tag", "a tag id")?),
        "untag" => ConsoleCommand::Untag(required_word(rest, "untag", "a tag id")?),
        "assign" => ConsoleCommand::Assign(required_word(rest, "assign", "an agent id")?),
        "status" => {
            let label = required_word(rest, "status", "a status")?;
            ConsoleCommand::Status(
                ChatStatus::from_label(&label).ok_or(CommandError::UnknownStatus(label))?,
            )
        }
        "send" => ConsoleCommand::Send(optional_text(rest).ok_or(CommandError::MissingArgument {
            command: "send",
            expected: "message text",
        })?),
        "accept" => ConsoleCommand::Accept,
        "reject" => ConsoleCommand::Reject,
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" => ConsoleCommand::Quit,
        other => return Err(CommandError::Unknown(other.to_owned())),
    };
    Ok(Some(command))
}

fn parse_filter(rest: &str) -> Result<ConsoleCommand, CommandError> {
    let (field, value) = split_word(rest);
    match field.to_ascii_lowercase().as_str() {
        "status" => {
            let label = required_word(value, "filter status", "a status")?;
            StatusFilter::from_label(&label)
                .map(ConsoleCommand::FilterStatus)
                .ok_or(CommandError::UnknownStatus(label))
        }
        "channel" => Ok(ConsoleCommand::FilterChannel(clearable(value, "all"))),
        "tag" => Ok(ConsoleCommand::FilterTag(clearable(value, "none"))),
        "search" => Ok(ConsoleCommand::FilterSearch(optional_text(value))),
        _ => Err(CommandError::MissingArgument {
            command: "filter",
            expected: "status, channel, tag or search",
        }),
    }
}

fn split_word(text: &str) -> (&str, &str) {
    let text = text.trim_start();
    match text.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (text, ""),
    }
}

fn required_word(
    text: &str,
    command: &'static str,
    expected: &'static str,
) -> Result<String, CommandError> {
    let (word, _) = split_word(text);
    if word.is_empty() {
        return Err(CommandError::MissingArgument { command, expected });
    }
    Ok(word.to_owned())
}

fn optional_text(text: &str) -> Option<String> {
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_owned())
}

/// `None` for an empty value or the given reset keyword.
fn clearable(text: &str, reset: &str) -> Option<String> {
    let (word, _) = split_word(text);
    (!word.is_empty() && !word.eq_ignore_ascii_case(reset)).then(|| word.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(line: &str) -> ConsoleCommand {
        parse(line).expect("valid command").expect("not blank")
    }

    #[test]
    fn blank_lines_are_ignored() {
        assert_eq!(parse("   "), Ok(None));
    }

    #[test]
    fn parses_navigation_commands() {
        assert_eq!(parsed("list"), ConsoleCommand::List);
        assert_eq!(parsed("MORE"), ConsoleCommand::More);
        assert_eq!(parsed("open  chat-7 "), ConsoleCommand::Open("chat-7".to_owned()));
        assert_eq!(parsed("close"), ConsoleCommand::Close);
        assert_eq!(parsed("reload"), ConsoleCommand::Reload);
        assert_eq!(parsed("history"), ConsoleCommand::History);
        assert_eq!(parsed("quit"), ConsoleCommand::Quit);
    }

    #[test]
    fn filters_accept_reset_keywords() {
        assert_eq!(
            parsed("filter status unread"),
            ConsoleCommand::FilterStatus(StatusFilter::Unread)
        );
        assert_eq!(
            parsed("filter status closed"),
            ConsoleCommand::FilterStatus(StatusFilter::Status(ChatStatus::Closed))
        );
        assert_eq!(parsed("filter channel all"), ConsoleCommand::FilterChannel(None));
        assert_eq!(
            parsed("filter channel line-main"),
            ConsoleCommand::FilterChannel(Some("line-main".to_owned()))
        );
        assert_eq!(parsed("filter tag none"), ConsoleCommand::FilterTag(None));
        assert_eq!(
            parsed("filter search  alice smith "),
            ConsoleCommand::FilterSearch(Some("alice smith".to_owned()))
        );
        assert_eq!(parsed("filter search"), ConsoleCommand::FilterSearch(None));
    }

    #[test]
    fn message_and_note_keep_inner_spacing() {
        assert_eq!(
            parsed("send hello   there"),
            ConsoleCommand::Send("hello   there".to_owned())
        );
        assert_eq!(parsed("note"), ConsoleCommand::Note(None));
        assert_eq!(
            parsed("note call back tomorrow"),
            ConsoleCommand::Note(Some("call back tomorrow".to_owned()))
        );
    }

    #[test]
    fn chat_actions_parse_their_argument() {
        assert_eq!(parsed("tag vip"), ConsoleCommand::Tag("vip".to_owned()));
        assert_eq!(parsed("untag vip"), ConsoleCommand::Untag("vip".to_owned()));
        assert_eq!(parsed("assign agent-2"), ConsoleCommand::Assign("agent-2".to_owned()));
        assert_eq!(parsed("status inprogress"), ConsoleCommand::Status(ChatStatus::InProgress));
        assert_eq!(parsed("accept"), ConsoleCommand::Accept);
        assert_eq!(parsed("reject"), ConsoleCommand::Reject);
    }

    #[test]
    fn reports_missing_and_unknown_input() {
        assert_eq!(
            parse("send   "),
            Err(CommandError::MissingArgument {
                command: "send",
                expected: "message text",
            })
        );
        assert_eq!(
            parse("status archived"),
            Err(CommandError::UnknownStatus("archived".to_owned()))
        );
        assert_eq!(parse("dance"), Err(CommandError::Unknown("dance".to_owned())));
        assert!(matches!(
            parse("filter colour red"),
            Err(CommandError::MissingArgument { command: "filter", .. })
        ));
    }
}
