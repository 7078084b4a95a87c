use std::{
    io::{self, BufRead},
    thread::{self, JoinHandle},
};

const CONSOLE_INPUT_FAILED: &str = "CONSOLE_INPUT_FAILED";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleInput {
    Line(String),
    /// The input stream ended or failed.
    Closed,
}

/// Reads `reader` line by line on a dedicated thread. The thread ends after
/// reporting `Closed`, or as soon as `on_input` returns `false`.
pub fn spawn_line_reader<R, F>(reader: R, mut on_input: F) -> io::Result<JoinHandle<()>>
where
    R: BufRead + Send + 'static,
    F: FnMut(ConsoleInput) -> bool + Send + 'static,
{
    thread::Builder::new()
        .name("inbox-sync-console".to_owned())
        .spawn(move || {
            for line in reader.lines() {
                match line {
                    Ok(line) => {
                        if !on_input(ConsoleInput::Line(line)) {
                            return;
                        }
                    }
                    Err(error) => {
                        tracing::warn!(code = CONSOLE_INPUT_FAILED, error = %error, "console input failed");
                        break;
                    }
                }
            }
            on_input(ConsoleInput::Closed);
        })
}
