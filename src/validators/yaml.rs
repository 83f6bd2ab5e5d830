//! Minimal indentation-based YAML reader.
//!
//! Understands block mappings, block sequences (`- item`, including
//! `- key: value` mapping items) and plain or quoted scalars. Anchors, flow
//! collections, multi-document streams and block scalars are not supported:
//! flow collections are read as plain strings and `|`/`>` blocks are skipped
//! and read as an empty mapping. Lines that are not `key: value` are skipped
//! together with anything nested under them, a repeated key keeps its last
//! value and a tab counts as one column of indentation. This covers the
//! compose-file shapes the simulator deals with; it is not a general YAML
//! parser.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Yaml {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Seq(Vec<Yaml>),
    Map(Mapping),
}

impl Yaml {
    pub fn as_map(&self) -> Option<&Mapping> {
        match self {
            Yaml::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_seq(&self) -> Option<&[Yaml]> {
        match self {
            Yaml::Seq(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Yaml::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Scalar rendered as text; numbers are stringified, other kinds are `None`.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Yaml::Str(s) => Some(s.clone()),
            Yaml::Int(n) => Some(n.to_string()),
            Yaml::Float(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Anything other than `null`, `false` or an empty string.
    pub fn is_set(&self) -> bool {
        !matches!(self, Yaml::Null | Yaml::Bool(false)) && self.as_str() != Some("")
    }
}

/// Mapping that keeps keys in document order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mapping {
    entries: Vec<(String, Yaml)>,
}

impl Mapping {
    pub fn get(&self, key: &str) -> Option<&Yaml> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// True when the key is present with a non-empty value.
    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some_and(Yaml::is_set)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Yaml)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert, replacing the value of a key that is already present.
    fn insert(&mut self, key: String, value: Yaml) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.entries.push((key, value)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YamlError {
    pub line: usize,
    pub message: String,
}

impl fmt::Display for YamlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for YamlError {}

fn err(line: usize, message: impl Into<String>) -> YamlError {
    YamlError {
        line,
        message: message.into(),
    }
}

#[derive(Debug, Clone, Copy)]
struct Line<'a> {
    number: usize,
    indent: usize,
    text: &'a str,
}

struct Reader<'a> {
    lines: Vec<Line<'a>>,
    pos: usize,
}

/// Parse a document whose root is a mapping.
pub fn parse_yaml(content: &str) -> Result<Mapping, YamlError> {
    let mut lines = Vec::new();
    for (idx, raw) in content.lines().enumerate() {
        let number = idx + 1;
        let trimmed = raw.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if trimmed == "---" && lines.is_empty() {
            continue;
        }
        lines.push(Line {
            number,
            indent: raw.len() - trimmed.len(),
            text: trimmed.trim_end(),
        });
    }

    let mut reader = Reader { lines, pos: 0 };
    let Some(first) = reader.peek() else {
        return Ok(Mapping::default());
    };
    if is_seq_item(first.text) {
        return Err(err(first.number, "expected a mapping at the top level, found a sequence"));
    }

    let mut root = Mapping::default();
    reader.parse_entries(first.indent, &mut root)?;
    if let Some(line) = reader.peek() {
        return Err(err(line.number, "unexpected indentation"));
    }
    Ok(root)
}

impl<'a> Reader<'a> {
    fn peek(&self) -> Option<Line<'a>> {
        self.lines.get(self.pos).copied()
    }

    fn parse_entries(&mut self, indent: usize, map: &mut Mapping) -> Result<(), YamlError> {
        while let Some(line) = self.peek() {
            if line.indent < indent {
                break;
            }
            if line.indent > indent {
                return Err(err(line.number, "unexpected indentation"));
            }
            if is_seq_item(line.text) {
                return Err(err(line.number, "sequence item where a mapping key was expected"));
            }
            self.pos += 1;
            self.parse_entry(line.text, indent, map)?;
        }
        Ok(())
    }

    fn parse_entry(&mut self, text: &str, indent: usize, map: &mut Mapping) -> Result<(), YamlError> {
        let Some((key, rest)) = split_key(text) else {
            self.skip_deeper(indent);
            return Ok(());
        };
        let value = match rest {
            "" => self.parse_nested(indent)?,
            block if is_block_scalar(block) => {
                self.skip_deeper(indent);
                Yaml::Map(Mapping::default())
            }
            scalar => parse_scalar(scalar),
        };
        map.insert(key, value);
        Ok(())
    }

    /// Value of a key written with nothing after the colon.
    fn parse_nested(&mut self, indent: usize) -> Result<Yaml, YamlError> {
        match self.peek() {
            Some(next) if next.indent > indent => {
                if is_seq_item(next.text) {
                    Ok(Yaml::Seq(self.parse_sequence(next.indent)?))
                } else {
                    let mut nested = Mapping::default();
                    self.parse_entries(next.indent, &mut nested)?;
                    Ok(Yaml::Map(nested))
                }
            }
            // compact style: sequence items at the same indent as their key
            Some(next) if next.indent == indent && is_seq_item(next.text) => {
                Ok(Yaml::Seq(self.parse_sequence(indent)?))
            }
            _ => Ok(Yaml::Map(Mapping::default())),
        }
    }

    fn parse_sequence(&mut self, indent: usize) -> Result<Vec<Yaml>, YamlError> {
        let mut items = Vec::new();
        while let Some(line) = self.peek() {
            if line.indent < indent || (line.indent == indent && !is_seq_item(line.text)) {
                break;
            }
            if line.indent > indent {
                return Err(err(line.number, "unexpected indentation"));
            }
            self.pos += 1;

            let after_dash = &line.text[1..];
            let item = after_dash.trim_start();
            if item.is_empty() {
                let value = match self.peek() {
                    Some(next) if next.indent > indent => self.parse_nested(indent)?,
                    _ => Yaml::Null,
                };
                items.push(value);
            } else if looks_like_entry(item) {
                let item_indent = indent + 1 + (after_dash.len() - item.len());
                let mut map = Mapping::default();
                self.parse_entry(item, item_indent, &mut map)?;
                self.parse_entries(item_indent, &mut map)?;
                items.push(Yaml::Map(map));
            } else {
                items.push(parse_scalar(item));
            }
        }
        Ok(items)
    }

    fn skip_deeper(&mut self, indent: usize) {
        while self.peek().is_some_and(|l| l.indent > indent) {
            self.pos += 1;
        }
    }
}

fn is_seq_item(text: &str) -> bool {
    text == "-" || text.starts_with("- ")
}

fn is_block_scalar(value: &str) -> bool {
    matches!(value, "|" | ">" | "|-" | ">-" | "|+" | ">+")
}

fn is_quoted(value: &str) -> bool {
    value.starts_with('"') || value.starts_with('\'')
}

/// `key: value` inside a sequence item, as opposed to a scalar like `8080:80`.
fn looks_like_entry(item: &str) -> bool {
    !is_quoted(item) && !item.starts_with('{') && !item.starts_with('[') && split_key(item).is_some()
}

/// Split `key: rest` at the first colon followed by whitespace or end of line.
fn split_key(text: &str) -> Option<(String, &str)> {
    if is_quoted(text) {
        let quote = text.chars().next()?;
        let close = text[1..].find(quote)? + 1;
        let after = text[close + 1..].strip_prefix(':')?;
        if !(after.is_empty() || after.starts_with(char::is_whitespace)) {
            return None;
        }
        return Some((text[1..close].to_string(), strip_comment(after.trim())));
    }

    let bytes = text.as_bytes();
    let idx = bytes.iter().enumerate().position(|(i, b)| {
        *b == b':' && bytes.get(i + 1).map_or(true, |next| next.is_ascii_whitespace())
    })?;
    let key = text[..idx].trim();
    if key.is_empty() {
        return None;
    }
    Some((key.to_string(), strip_comment(text[idx + 1..].trim())))
}

fn strip_comment(value: &str) -> &str {
    if is_quoted(value) {
        return value;
    }
    match value.find(" #") {
        Some(idx) => value[..idx].trim_end(),
        None if value.starts_with('#') => "",
        None => value,
    }
}

fn parse_scalar(value: &str) -> Yaml {
    match value {
        "true" => return Yaml::Bool(true),
        "false" => return Yaml::Bool(false),
        "null" | "~" => return Yaml::Null,
        _ => {}
    }

    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return Yaml::Str(value[1..value.len() - 1].to_string());
        }
    }

    if let Ok(n) = value.parse::<i64>() {
        return Yaml::Int(n);
    }
    if looks_numeric(value) {
        if let Ok(n) = value.parse::<f64>() {
            return Yaml::Float(n);
        }
    }
    Yaml::Str(value.to_string())
}

/// Rejects the words `inf`/`nan` that `f64::from_str` would accept.
fn looks_numeric(value: &str) -> bool {
    let digits = value.trim_start_matches(['+', '-']);
    digits.chars().any(|c| c.is_ascii_digit())
        && digits.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
}
