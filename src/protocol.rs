//! The textual frame protocol and the command registry.
//!
//! A frame is `name|arg1|arg2|...`; `|` is the sole delimiter and is
//! stripped from every outbound argument, so arguments never contain it on
//! the wire. Commands are declared in static descriptor tables rather than
//! resolved by naming convention at runtime.

use std::fmt::Display;

use crate::cards::Card;
use crate::error::GameError;
use crate::game::GameStatus;

pub const DELIMITER: char = '|';

/// Split an inbound frame into its command name and raw arguments.
pub fn split_frame(text: &str) -> (&str, Vec<&str>) {
    let mut parts = text.split(DELIMITER);
    let name = parts.next().unwrap_or_default();
    (name, parts.collect())
}

/// Builder for outbound frames. Arguments are stringified with any literal
/// `|` removed.
#[derive(Debug, Clone)]
pub struct Frame {
    buf: String,
}

impl Frame {
    pub fn event(name: &str) -> Self {
        let mut frame = Frame { buf: String::new() };
        frame.push_clean(name);
        frame
    }

    fn push_clean(&mut self, part: &str) {
        self.buf.extend(part.chars().filter(|&c| c != DELIMITER));
    }

    pub fn arg(mut self, value: impl Display) -> Self {
        self.buf.push(DELIMITER);
        let part = value.to_string();
        self.push_clean(&part);
        self
    }

    pub fn args<I>(mut self, values: I) -> Self
    where
        I: IntoIterator,
        I::Item: Display,
    {
        for value in values {
            self = self.arg(value);
        }
        self
    }

    pub fn into_string(self) -> String {
        self.buf
    }
}

/// How a command binds the calling player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerBinding {
    /// No player resolution.
    None,
    /// The caller must be a seated player.
    Required,
    /// The caller's seat is resolved if it exists.
    Optional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Str,
    Card,
}

/// Declarative description of one command: its preconditions and its
/// positional argument shape.
#[derive(Debug)]
pub struct CommandSpec {
    pub name: &'static str,
    pub status: Option<GameStatus>,
    pub current_player: bool,
    pub binding: PlayerBinding,
    pub args: &'static [ArgKind],
}

/// Commands every game understands.
pub static BASE_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "current_state",
        status: None,
        current_player: false,
        binding: PlayerBinding::Optional,
        args: &[],
    },
    CommandSpec {
        name: "join",
        status: None,
        current_player: false,
        binding: PlayerBinding::None,
        args: &[ArgKind::Str],
    },
    CommandSpec {
        name: "name",
        status: None,
        current_player: false,
        binding: PlayerBinding::Required,
        args: &[ArgKind::Str],
    },
    CommandSpec {
        name: "rematch",
        status: Some(GameStatus::Ended),
        current_player: false,
        binding: PlayerBinding::Required,
        args: &[],
    },
];

pub static BRISCOLA_COMMANDS: &[CommandSpec] = &[CommandSpec {
    name: "play",
    status: Some(GameStatus::Started),
    current_player: true,
    binding: PlayerBinding::None,
    args: &[ArgKind::Card],
}];

pub static SCOPA_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "play",
        status: Some(GameStatus::Started),
        current_player: true,
        binding: PlayerBinding::None,
        args: &[ArgKind::Card],
    },
    CommandSpec {
        name: "take_choice",
        status: Some(GameStatus::Started),
        current_player: true,
        binding: PlayerBinding::None,
        args: &[ArgKind::Card],
    },
];

/// Resolve a command name against a variant table, falling back to the
/// shared base commands.
pub fn lookup<'a>(
    variant_commands: &'a [CommandSpec],
    name: &str,
) -> Option<&'a CommandSpec> {
    variant_commands
        .iter()
        .chain(BASE_COMMANDS.iter())
        .find(|spec| spec.name == name)
}

/// A coerced positional argument.
#[derive(Debug, Clone)]
pub enum Arg {
    Str(String),
    Card(Card),
}

/// Check arity and coerce raw arguments into their declared kinds.
pub fn coerce(spec: &CommandSpec, raw: &[&str]) -> Result<Vec<Arg>, GameError> {
    if raw.len() != spec.args.len() {
        return Err(GameError::WrongArity {
            command: spec.name.to_owned(),
            expected: spec.args.len(),
            given: raw.len(),
        });
    }
    spec.args
        .iter()
        .zip(raw)
        .map(|(kind, value)| match kind {
            ArgKind::Str => Ok(Arg::Str((*value).to_owned())),
            ArgKind::Card => value
                .parse()
                .map(Arg::Card)
                .map_err(|_| GameError::InvalidCard((*value).to_owned())),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::{Rank, Suit};

    #[test]
    fn frames_join_and_strip_the_delimiter() {
        let frame = Frame::event("players")
            .arg("Al|ice")
            .arg("Bob")
            .into_string();
        assert_eq!(frame, "players|Alice|Bob");
    }

    #[test]
    fn frames_split_into_name_and_args() {
        let (name, args) = split_frame("play|denari:7");
        assert_eq!(name, "play");
        assert_eq!(args, vec!["denari:7"]);

        let (name, args) = split_frame("current_state");
        assert_eq!(name, "current_state");
        assert!(args.is_empty());
    }

    #[test]
    fn unknown_commands_do_not_resolve() {
        assert!(lookup(BRISCOLA_COMMANDS, "take_choice").is_none());
        assert!(lookup(SCOPA_COMMANDS, "take_choice").is_some());
        assert!(lookup(BRISCOLA_COMMANDS, "join").is_some());
    }

    #[test]
    fn coercion_checks_arity() {
        let spec = lookup(BRISCOLA_COMMANDS, "play").expect("registered");
        let err = coerce(spec, &[]).expect_err("missing card");
        assert_eq!(
            err.to_string(),
            "Invalid number of parameters for command play: 1 expected, 0 given"
        );
        let err = coerce(spec, &["denari:7", "coppe:re"]).expect_err("extra arg");
        assert!(matches!(
            err,
            GameError::WrongArity {
                expected: 1,
                given: 2,
                ..
            }
        ));
    }

    #[test]
    fn coercion_parses_cards() {
        let spec = lookup(SCOPA_COMMANDS, "take_choice").expect("registered");
        let args = coerce(spec, &["spade:cavallo"]).expect("valid card");
        match &args[..] {
            [Arg::Card(card)] => {
                assert_eq!(card.suit, Suit::Spade);
                assert_eq!(card.rank, Rank::Cavallo);
            }
            other => panic!("unexpected coercion: {other:?}"),
        }

        let err = coerce(spec, &["spade-cavallo"]).expect_err("malformed");
        assert_eq!(err.to_string(), "Invalid card: spade-cavallo");
    }
}
