use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The only top-level command the engine understands.
pub const DOCKER: &str = "docker";

/// Subcommand that takes a second level (`docker compose up`).
pub const COMPOSE: &str = "compose";

static QUOTED_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""([^"]*)"|'([^']*)'|(\S+)"#).expect("token pattern compiles"));

/// Value of a single flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
    /// A flag given without a value (`-d`, `--all`).
    Switch(bool),
    /// A flag given once with a value (`--name web`).
    Value(String),
    /// A value-taking flag repeated several times (`-p 80:80 -p 443:443`).
    Values(Vec<String>),
}

impl FlagValue {
    /// Last value given for the flag, if it carried one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FlagValue::Switch(_) => None,
            FlagValue::Value(v) => Some(v),
            FlagValue::Values(vs) => vs.last().map(String::as_str),
        }
    }

    /// Every value given for the flag, in command-line order.
    pub fn values(&self) -> Vec<&str> {
        match self {
            FlagValue::Switch(_) => Vec::new(),
            FlagValue::Value(v) => vec![v.as_str()],
            FlagValue::Values(vs) => vs.iter().map(String::as_str).collect(),
        }
    }

    pub fn is_switch(&self) -> bool {
        matches!(self, FlagValue::Switch(true))
    }
}

pub type Flags = BTreeMap<String, FlagValue>;

/// A command line split into its parts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedCommand {
    /// The input exactly as typed, whitespace included
    pub raw: String,
    pub command: String,
    /// `run`, `ps`, ... or a compound such as `compose up`
    pub subcommand: Option<String>,
    pub args: Vec<String>,
    pub flags: Flags,
}

impl ParsedCommand {
    pub fn is_docker(&self) -> bool {
        self.command == DOCKER
    }

    /// True when the flag was given without a value.
    pub fn switch(&self, key: &str) -> bool {
        self.flags.get(key).is_some_and(FlagValue::is_switch)
    }

    pub fn any_switch(&self, keys: &[&str]) -> bool {
        keys.iter().any(|k| self.switch(k))
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.flags.get(key).and_then(FlagValue::as_str)
    }

    /// First value found among several spellings of a flag (`-t` / `--tag`).
    pub fn value_of(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|k| self.value(k))
    }

    /// All values given under any of the spellings, in spelling order.
    pub fn values_of(&self, keys: &[&str]) -> Vec<&str> {
        keys.iter()
            .filter_map(|k| self.flags.get(*k))
            .flat_map(FlagValue::values)
            .collect()
    }
}

/// Flags that consume the following token as their value, per subcommand.
fn value_flags(subcommand: &str) -> &'static [&'static str] {
    match subcommand {
        "run" => &[
            "p", "e", "v", "name", "net", "network", "h", "hostname", "u", "user", "w", "workdir",
        ],
        "exec" => &["e", "u", "w", "workdir"],
        "build" => &["t", "tag", "f", "file", "target"],
        "compose" => &["f", "file", "p", "project-name", "tail", "n"],
        "logs" => &["tail", "n"],
        _ => &[],
    }
}

const GLOBAL_VALUE_FLAGS: &[&str] = &["H", "host", "c", "context"];

/// Parse a raw command line.
pub fn parse(raw: &str) -> ParsedCommand {
    let tokens = tokenize(raw.trim());
    if tokens.is_empty() {
        return ParsedCommand {
            raw: raw.to_string(),
            ..ParsedCommand::default()
        };
    }

    let mut tokens = tokens.into_iter().peekable();
    let command = tokens.next().unwrap_or_default();

    if command != DOCKER {
        return ParsedCommand {
            raw: raw.to_string(),
            command,
            subcommand: None,
            args: tokens.collect(),
            flags: Flags::new(),
        };
    }

    let mut subcommand = tokens.next();
    if subcommand.as_deref() == Some(COMPOSE) {
        if let Some(next) = tokens.next_if(|t| !t.starts_with('-')) {
            subcommand = Some(format!("{COMPOSE} {next}"));
        }
    }

    let base = subcommand
        .as_deref()
        .and_then(|s| s.split(' ').next())
        .unwrap_or_default();
    let takes_value =
        |key: &str| value_flags(base).contains(&key) || GLOBAL_VALUE_FLAGS.contains(&key);

    let mut flags = Flags::new();
    let mut args = Vec::new();

    while let Some(token) = tokens.next() {
        if let Some(long) = token.strip_prefix("--") {
            match long.split_once('=') {
                Some((key, value)) if !key.is_empty() => {
                    insert_flag(&mut flags, key, FlagValue::Value(value.to_string()));
                    continue;
                }
                None if !long.is_empty() => {
                    let value = if takes_value(long) {
                        tokens.next_if(|next| !next.starts_with('-'))
                    } else {
                        None
                    };
                    insert_flag(&mut flags, long, value.map_or(FlagValue::Switch(true), FlagValue::Value));
                    continue;
                }
                _ => {}
            }
        } else if let Some(short) = token.strip_prefix('-') {
            if short.chars().count() > 1 {
                for c in short.chars() {
                    insert_flag(&mut flags, &c.to_string(), FlagValue::Switch(true));
                }
                continue;
            }
            if !short.is_empty() {
                let value = if takes_value(short) {
                    tokens.next_if(|next| !next.starts_with('-'))
                } else {
                    None
                };
                insert_flag(&mut flags, short, value.map_or(FlagValue::Switch(true), FlagValue::Value));
                continue;
            }
        }

        // First positional token: everything after it is an argument.
        args.push(token);
        args.extend(tokens.by_ref());
    }

    ParsedCommand {
        raw: raw.to_string(),
        command,
        subcommand,
        args,
        flags,
    }
}

fn insert_flag(flags: &mut Flags, key: &str, value: FlagValue) {
    let merged = match (flags.remove(key), value) {
        (Some(FlagValue::Value(prev)), FlagValue::Value(next)) => FlagValue::Values(vec![prev, next]),
        (Some(FlagValue::Values(mut prev)), FlagValue::Value(next)) => {
            prev.push(next);
            FlagValue::Values(prev)
        }
        (_, value) => value,
    };
    flags.insert(key.to_string(), merged);
}

/// Split on whitespace, keeping `"..."` and `'...'` spans together.
///
/// There is no escaping: backslashes and `#` are ordinary characters, and a
/// quote inside a word is part of that word.
fn tokenize(input: &str) -> Vec<String> {
    QUOTED_TOKEN
        .captures_iter(input)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3)))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Join arguments into a line that [`parse`] splits back into the same tokens.
///
/// A token is wrapped in quotes when it is empty, holds whitespace or starts
/// with a quote. One that contains both quote characters and whitespace
/// cannot be written back and is passed through as is.
pub fn join<S: AsRef<str>>(words: &[S]) -> String {
    words
        .iter()
        .map(|w| quote(w.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

fn quote(word: &str) -> String {
    let needs_quotes =
        word.is_empty() || word.chars().any(char::is_whitespace) || word.starts_with(['"', '\'']);
    if !needs_quotes {
        word.to_string()
    } else if !word.contains('"') {
        format!("\"{word}\"")
    } else if !word.contains('\'') {
        format!("'{word}'")
    } else {
        word.to_string()
    }
}
