use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const SEPARATOR: char = '%';
pub const MAX_TEXT_LEN: usize = 200;
pub const NICKNAME_MIN_LEN: usize = 3;
pub const NICKNAME_MAX_LEN: usize = 15;
pub const MAX_LOBBY_PLAYERS: usize = 4;
pub const MIN_START_PLAYERS: usize = 2;
pub const DEFAULT_LOBBY: &str = "Welcome";
pub const DICE_PER_ROLL: usize = 3;
pub const START_COLOR: &str = "white";
pub const START_FIELD: &str = "white1";
pub const PROBE_INTERVAL_SECS: u64 = 5;
pub const PONG_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Join,
    Nick,
    Chat,
    Brod,
    Wisp,
    Velo,
    Rady,
    Strt,
    Rstt,
    Roll,
    Chos,
    Deos,
    Move,
    Next,
    Quit,
    Qcnf,
    Ping,
    Pong,
    List,
    Crlo,
    Lome,
    Glst,
    High,
    Winn,
    Fnsh,
    Info,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Join => "JOIN",
            Verb::Nick => "NICK",
            Verb::Chat => "CHAT",
            Verb::Brod => "BROD",
            Verb::Wisp => "WISP",
            Verb::Velo => "VELO",
            Verb::Rady => "RADY",
            Verb::Strt => "STRT",
            Verb::Rstt => "RSTT",
            Verb::Roll => "ROLL",
            Verb::Chos => "CHOS",
            Verb::Deos => "DEOS",
            Verb::Move => "MOVE",
            Verb::Next => "NEXT",
            Verb::Quit => "QUIT",
            Verb::Qcnf => "QCNF",
            Verb::Ping => "PING",
            Verb::Pong => "PONG",
            Verb::List => "LIST",
            Verb::Crlo => "CRLO",
            Verb::Lome => "LOME",
            Verb::Glst => "GLST",
            Verb::High => "HIGH",
            Verb::Winn => "WINN",
            Verb::Fnsh => "FNSH",
            Verb::Info => "INFO",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verb {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "JOIN" => Ok(Verb::Join),
            "NICK" => Ok(Verb::Nick),
            "CHAT" => Ok(Verb::Chat),
            "BROD" => Ok(Verb::Brod),
            "WISP" => Ok(Verb::Wisp),
            "VELO" => Ok(Verb::Velo),
            "RADY" => Ok(Verb::Rady),
            "STRT" => Ok(Verb::Strt),
            "RSTT" => Ok(Verb::Rstt),
            "ROLL" => Ok(Verb::Roll),
            "CHOS" => Ok(Verb::Chos),
            "DEOS" => Ok(Verb::Deos),
            "MOVE" => Ok(Verb::Move),
            "NEXT" => Ok(Verb::Next),
            "QUIT" => Ok(Verb::Quit),
            "QCNF" => Ok(Verb::Qcnf),
            "PING" => Ok(Verb::Ping),
            "PONG" => Ok(Verb::Pong),
            "LIST" => Ok(Verb::List),
            "CRLO" => Ok(Verb::Crlo),
            "LOME" => Ok(Verb::Lome),
            "GLST" => Ok(Verb::Glst),
            "HIGH" => Ok(Verb::High),
            "WINN" => Ok(Verb::Winn),
            "FNSH" => Ok(Verb::Fnsh),
            "INFO" => Ok(Verb::Info),
            other => Err(DecodeError::UnknownVerb(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    EmptyLine,
    UnknownVerb(String),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::EmptyLine => write!(f, "empty protocol line"),
            DecodeError::UnknownVerb(v) => write!(f, "unknown verb '{}'", v),
        }
    }
}

impl std::error::Error for DecodeError {}

/// A single protocol line: a verb plus at most one payload segment.
///
/// The payload may itself contain the separator exactly once more to carry
/// two sub-fields (e.g. `CHAT%sender%message`); `split_payload` exposes that
/// form. Encoding and decoding round-trip byte-identically for the bare,
/// one-segment and two-segment shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub verb: Verb,
    pub payload: Option<String>,
}

impl Message {
    pub fn bare(verb: Verb) -> Self {
        Self {
            verb,
            payload: None,
        }
    }

    pub fn with_payload(verb: Verb, payload: impl Into<String>) -> Self {
        Self {
            verb,
            payload: Some(payload.into()),
        }
    }

    pub fn two_part(verb: Verb, first: &str, second: &str) -> Self {
        Self {
            verb,
            payload: Some(format!("{}{}{}", first, SEPARATOR, second)),
        }
    }

    pub fn encode(&self) -> String {
        match &self.payload {
            Some(payload) => format!("{}{}{}", self.verb.as_str(), SEPARATOR, payload),
            None => self.verb.as_str().to_string(),
        }
    }

    /// Decodes one line by splitting on the first separator only; everything
    /// after it is the payload, untouched.
    pub fn decode(line: &str) -> Result<Self, DecodeError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return Err(DecodeError::EmptyLine);
        }
        match line.split_once(SEPARATOR) {
            Some((verb, payload)) => Ok(Self {
                verb: verb.parse()?,
                payload: Some(payload.to_string()),
            }),
            None => Ok(Self {
                verb: line.parse()?,
                payload: None,
            }),
        }
    }

    /// Splits a two-segment payload on its first separator.
    pub fn split_payload(&self) -> Option<(&str, &str)> {
        self.payload.as_deref()?.split_once(SEPARATOR)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiceColor {
    Red,
    Blue,
    Green,
    Yellow,
    Orange,
    Purple,
}

impl DiceColor {
    pub const ALL: [DiceColor; 6] = [
        DiceColor::Red,
        DiceColor::Blue,
        DiceColor::Green,
        DiceColor::Yellow,
        DiceColor::Orange,
        DiceColor::Purple,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DiceColor::Red => "red",
            DiceColor::Blue => "blue",
            DiceColor::Green => "green",
            DiceColor::Yellow => "yellow",
            DiceColor::Orange => "orange",
            DiceColor::Purple => "purple",
        }
    }

    pub fn parse(s: &str) -> Option<DiceColor> {
        DiceColor::ALL.iter().copied().find(|c| c.as_str() == s)
    }

    pub fn index(&self) -> usize {
        match self {
            DiceColor::Red => 0,
            DiceColor::Blue => 1,
            DiceColor::Green => 2,
            DiceColor::Yellow => 3,
            DiceColor::Orange => 4,
            DiceColor::Purple => 5,
        }
    }

    /// How many fields of this color the standard track carries.
    pub fn field_count(&self) -> usize {
        match self {
            DiceColor::Red => 7,
            DiceColor::Blue => 10,
            DiceColor::Green => 10,
            DiceColor::Yellow => 10,
            DiceColor::Orange => 10,
            DiceColor::Purple => 7,
        }
    }
}

impl fmt::Display for DiceColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Nicknames and lobby names share one format: ASCII alphanumeric plus
/// underscore and hyphen, 3 to 15 characters.
pub fn is_valid_nickname(name: &str) -> bool {
    let len = name.chars().count();
    if !(NICKNAME_MIN_LEN..=NICKNAME_MAX_LEN).contains(&len) {
        return false;
    }
    name.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Prepares free text for re-embedding in an outbound line: embedded
/// separators become spaces and the text is truncated to MAX_TEXT_LEN.
pub fn sanitize_text(text: &str) -> String {
    text.chars()
        .take(MAX_TEXT_LEN)
        .map(|c| if c == SEPARATOR { ' ' } else { c })
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSnapshot {
    pub id: u32,
    pub nickname: String,
    pub bike_color: Option<String>,
    pub lobby: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LobbySnapshot {
    pub name: String,
    pub state: String,
    pub members: Vec<String>,
    pub winners: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub lobby: String,
    pub state: String,
    pub current_player: Option<String>,
    pub positions: Vec<(String, String)>,
}
