//! Error types for command handling and the saved-game store.

use thiserror::Error;

/// Everything a client can be told went wrong with a command.
///
/// Parse and precondition failures are raised before a handler runs and are
/// reported without a command tag; `Rule` violations come out of the rule
/// engines and are tagged with the originating command name.
#[derive(Debug, Error)]
pub enum GameError {
    #[error("Invalid command {0}")]
    UnknownCommand(String),
    #[error("Invalid card: {0}")]
    InvalidCard(String),
    #[error("Invalid number of parameters for command {command}: {expected} expected, {given} given")]
    WrongArity {
        command: String,
        expected: usize,
        given: usize,
    },
    #[error("Invalid game status")]
    WrongStatus,
    #[error("It's not your turn")]
    NotYourTurn,
    #[error("You're not a player")]
    NotAPlayer,
    #[error("Incorrect message type: expected a text frame")]
    NotText,
    #[error("{0}")]
    Rule(&'static str),
}

/// A rejected command, optionally tagged with the command it came from.
#[derive(Debug)]
pub struct CommandFailure {
    pub error: GameError,
    pub command: Option<String>,
}

impl CommandFailure {
    pub fn untagged(error: GameError) -> Self {
        Self {
            error,
            command: None,
        }
    }

    pub fn tagged(error: GameError, command: &str) -> Self {
        Self {
            error,
            command: Some(command.to_owned()),
        }
    }
}

/// Saved-game store failures. Never surfaced to clients; the offending row
/// is discarded instead.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
    #[error("corrupt saved game: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
