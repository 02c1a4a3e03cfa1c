//! Parsing of interactive stdin lines.

use tether_protocol::InteractionOutcome;

/// One line of user input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Input {
    /// Send as a user message.
    Message(String),
    /// Answer an interaction.
    Respond {
        /// Request id.
        request_id: String,
        /// Outcome.
        outcome: InteractionOutcome,
    },
    /// Print the client snapshot.
    Status,
    /// Disconnect and exit.
    Quit,
    /// Blank line.
    Nothing,
    /// A slash command that could not be parsed.
    Invalid(String),
}

/// Parse one line.
pub fn parse(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Nothing;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Input::Message(line.to_string());
    };

    let (name, rest) = command.split_once(char::is_whitespace).unwrap_or((command, ""));
    let rest = rest.trim();
    match name {
        "approve" | "deny" => {
            if rest.is_empty() || rest.contains(char::is_whitespace) {
                return Input::Invalid(format!("usage: /{name} <request-id>"));
            }
            let outcome = if name == "approve" {
                InteractionOutcome::Approved
            } else {
                InteractionOutcome::Denied
            };
            Input::Respond {
                request_id: rest.to_string(),
                outcome,
            }
        }
        "answer" => match rest.split_once(char::is_whitespace) {
            Some((id, answer)) if !answer.trim().is_empty() => Input::Respond {
                request_id: id.to_string(),
                outcome: InteractionOutcome::Answered {
                    answer: answer.trim().to_string(),
                },
            },
            _ => Input::Invalid("usage: /answer <request-id> <text>".to_string()),
        },
        "status" => Input::Status,
        "quit" | "exit" => Input::Quit,
        // `//text` sends a message starting with a slash.
        _ if command.starts_with('/') => Input::Message(command.to_string()),
        other => Input::Invalid(format!("unknown command: /{other}")),
    }
}
