//! REPL command parsing.
//!
//! Lines starting with `/` are commands; anything else is sent to the model.
//! A leading `//` escapes the slash so a message may start with one.

use thiserror::Error;

/// Errors from parsing a command line.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    /// The command name is not known.
    #[error("unknown command: /{0} (try /help)")]
    Unknown(String),

    /// `/edit` was missing its field or value.
    #[error("usage: /edit <method|path|params|query|body> <value>")]
    EditUsage,
}

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Blank line.
    Empty,
    /// Message for the model.
    Chat(String),
    /// Execute the pending tool call.
    Exec,
    /// Dismiss the pending tool call.
    Dismiss,
    /// Edit a field of the pending tool call.
    Edit {
        /// Field name.
        field: String,
        /// Raw value; JSON for the map and body fields.
        value: String,
    },
    /// Show the pending tool call.
    Show,
    /// Print the transcript.
    History,
    /// Forget the conversation.
    Clear,
    /// Print the API digest.
    Schema,
    /// Print the tool definition offered to the model.
    Tools,
    /// Print command help.
    Help,
    /// Leave the REPL.
    Quit,
}

impl Command {
    /// Parse an input line.
    ///
    /// # Errors
    ///
    /// Returns `CommandError` for an unknown command or a malformed `/edit`.
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(Self::Empty);
        }
        if let Some(escaped) = line.strip_prefix("//") {
            return Ok(Self::Chat(format!("/{escaped}")));
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Ok(Self::Chat(line.to_string()));
        };

        let (name, args) = match rest.split_once(char::is_whitespace) {
            Some((name, args)) => (name, args.trim()),
            None => (rest, ""),
        };

        match name {
            "exec" | "x" => Ok(Self::Exec),
            "dismiss" | "d" => Ok(Self::Dismiss),
            "edit" | "e" => {
                let (field, value) = args
                    .split_once(char::is_whitespace)
                    .ok_or(CommandError::EditUsage)?;
                Ok(Self::Edit {
                    field: field.to_string(),
                    value: value.trim().to_string(),
                })
            }
            "show" => Ok(Self::Show),
            "history" | "h" => Ok(Self::History),
            "clear" => Ok(Self::Clear),
            "schema" => Ok(Self::Schema),
            "tools" => Ok(Self::Tools),
            "help" | "?" => Ok(Self::Help),
            "quit" | "q" | "exit" => Ok(Self::Quit),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

/// Help text printed by `/help`.
pub const HELP: &str = "\
Commands:
  /exec                 execute the pending tool call
  /edit <field> <value> change the pending call (method, path, params, query, body)
  /dismiss              skip the pending tool call
  /show                 show the pending tool call and its request
  /history              print the conversation
  /clear                forget the conversation
  /schema               print the loaded API description
  /tools                print the tool definition sent to the model
  /quit                 leave
Ctrl-C cancels a response in progress. Start a message with // to send a leading slash.";
