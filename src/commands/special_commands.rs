//! Special commands parser for the interactive chat session
//!
//! Lines starting with `/` are commands rather than questions. Command
//! names are case-insensitive; the `/upload` path argument keeps its case.
//! `exit` and `quit` are also accepted without the slash.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when parsing special commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Unknown command was entered
    #[error("Unknown command: {0}\n\nType '/help' to see available commands")]
    UnknownCommand(String),

    /// Command requires an argument but none was provided
    #[error("Command {command} requires an argument\n\nUsage: {usage}")]
    MissingArgument { command: String, usage: String },

    /// Command does not take arguments
    #[error("Command {command} does not take arguments: {arg}")]
    UnexpectedArgument { command: String, arg: String },
}

/// Special commands that can be executed during interactive chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialCommand {
    /// Upload a file and make it the active document
    Upload(PathBuf),
    /// Show the active document and a preview of its content
    ShowDocument,
    /// Drop the active document (and the chat about it)
    ClearDocument,
    /// Empty the chat log
    ClearChat,
    /// Print the chat log
    History,
    /// Show session, document, and chat status
    Status,
    /// Show help
    Help,
    /// Leave the session
    Exit,
    /// Not a command; send the line as a question
    None,
}

/// Parse a line of REPL input
///
/// # Errors
///
/// Returns [`CommandError`] for unknown commands or bad arguments
///
/// # Examples
///
/// ```
/// use ragchat::commands::special_commands::{parse_special_command, SpecialCommand};
///
/// assert_eq!(parse_special_command("/HELP").unwrap(), SpecialCommand::Help);
/// assert_eq!(parse_special_command("what is this?").unwrap(), SpecialCommand::None);
/// ```
pub fn parse_special_command(input: &str) -> Result<SpecialCommand, CommandError> {
    let trimmed = input.trim();
    let lower = trimmed.to_lowercase();

    if lower == "exit" || lower == "quit" {
        return Ok(SpecialCommand::Exit);
    }
    if !trimmed.starts_with('/') {
        return Ok(SpecialCommand::None);
    }

    let (name, arg) = match trimmed.split_once(char::is_whitespace) {
        Some((name, arg)) => (name.to_lowercase(), arg.trim()),
        None => (lower.clone(), ""),
    };

    let no_arg = |cmd: SpecialCommand| {
        if arg.is_empty() {
            Ok(cmd)
        } else {
            Err(CommandError::UnexpectedArgument {
                command: name.clone(),
                arg: arg.to_string(),
            })
        }
    };

    match name.as_str() {
        "/upload" => {
            if arg.is_empty() {
                Err(CommandError::MissingArgument {
                    command: "/upload".to_string(),
                    usage: "/upload <path>".to_string(),
                })
            } else {
                Ok(SpecialCommand::Upload(PathBuf::from(arg)))
            }
        }
        "/document" | "/doc" => no_arg(SpecialCommand::ShowDocument),
        "/clear-document" => no_arg(SpecialCommand::ClearDocument),
        "/clear" => no_arg(SpecialCommand::ClearChat),
        "/history" => no_arg(SpecialCommand::History),
        "/status" => no_arg(SpecialCommand::Status),
        "/help" | "/?" => no_arg(SpecialCommand::Help),
        "/exit" | "/quit" => no_arg(SpecialCommand::Exit),
        _ => Err(CommandError::UnknownCommand(name.clone())),
    }
}

/// Display help for the chat session
pub fn print_help() {
    println!(
        r#"
Chat Session Commands
=====================

DOCUMENT:
  /upload <path>   - Upload a PDF, TXT, or MD file (max 10MB)
  /document        - Show the active document and a preview
  /clear-document  - Remove the active document and clear the chat

CHAT:
  /clear           - Clear the chat history
  /history         - Show the chat history

SESSION:
  /status          - Show sign-in, document, and chat status
  /help            - Show this help message
  /exit            - Leave the session (also: exit, quit)

Anything else is sent as a question about the active document.
"#
    );
}
