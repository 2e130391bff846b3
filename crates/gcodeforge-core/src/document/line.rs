//! Single G-code line representation
//!
//! A [`Line`] holds the parsed form of one source line: command word,
//! single-letter parameters, `KEY=VALUE` parameters and an optional
//! trailing comment. Link fields are owned by [`super::GcodeFile`].

use std::fmt;

use super::{LineId, SectionId};
use crate::annotator::Annotation;

/// Value carried by a single-letter parameter
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// Bare letter with no value (`G28 X`)
    Flag,
    /// Numeric value
    Number(f64),
    /// Non-numeric value, kept verbatim so that serialization is lossless
    Text(String),
}

impl ParamValue {
    fn parse(raw: &str) -> Self {
        if raw.is_empty() {
            Self::Flag
        } else if let Ok(value) = raw.parse::<f64>() {
            Self::Number(value)
        } else {
            Self::Text(raw.to_string())
        }
    }

    /// Numeric value, if this is a number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }
}

/// Single-letter parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    /// Upper-cased parameter letter
    pub letter: char,
    /// Parameter value
    pub value: ParamValue,
}

/// Fixed output precision for a parameter of a given command.
///
/// Motion commands round positions and feed to 3 places and extrusion to 5.
/// Everything else is written unrounded.
pub fn param_precision(command: Option<&str>, letter: char) -> Option<usize> {
    match command {
        Some("G0") | Some("G1") => match letter {
            'X' | 'Y' | 'F' => Some(3),
            'E' => Some(5),
            _ => None,
        },
        _ => None,
    }
}

/// One line of a G-code file
#[derive(Debug, Clone, Default)]
pub struct Line {
    command: Option<String>,
    params: Vec<Param>,
    eq_params: Vec<(String, String)>,
    comment: Option<String>,

    /// Geometry and classification written by the annotator
    pub annotation: Annotation,

    pub(crate) prev: Option<LineId>,
    pub(crate) next: Option<LineId>,
    pub(crate) section: Option<SectionId>,
}

impl Line {
    /// Create a line with just a command word
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: Some(command.into().to_uppercase()),
            ..Self::default()
        }
    }

    /// Create a comment-only line
    pub fn comment_only(comment: impl Into<String>) -> Self {
        Self {
            comment: Some(comment.into()),
            ..Self::default()
        }
    }

    /// Create a blank line
    pub fn blank() -> Self {
        Self::default()
    }

    /// Parse a single line of text.
    ///
    /// Parsing never fails: anything before the first `;` is split on
    /// whitespace, the first token becomes the command and the remaining
    /// tokens become parameters.
    pub fn parse(text: &str) -> Self {
        let (code, comment) = match text.split_once(';') {
            Some((code, comment)) => (code, Some(comment.to_string())),
            None => (text, None),
        };

        let mut tokens = code.split_whitespace();
        let command = tokens.next().map(str::to_uppercase);

        let mut params = Vec::new();
        let mut eq_params = Vec::new();
        for token in tokens {
            if let Some((key, value)) = token.split_once('=') {
                eq_params.push((key.to_string(), value.to_string()));
                continue;
            }

            let mut chars = token.chars();
            let Some(letter) = chars.next() else {
                continue;
            };
            params.push(Param {
                letter: letter.to_ascii_uppercase(),
                value: ParamValue::parse(chars.as_str()),
            });
        }

        Self {
            command,
            params,
            eq_params,
            comment,
            ..Self::default()
        }
    }

    /// Copy the textual content of this line.
    ///
    /// The copy is detached (no links, no section) and carries a fresh
    /// annotation.
    pub fn duplicate(&self) -> Self {
        Self {
            command: self.command.clone(),
            params: self.params.clone(),
            eq_params: self.eq_params.clone(),
            comment: self.comment.clone(),
            ..Self::default()
        }
    }

    /// Command word, upper-cased
    pub fn command(&self) -> Option<&str> {
        self.command.as_deref()
    }

    /// Whether this is a linear move (`G0` or `G1`)
    pub fn is_move(&self) -> bool {
        matches!(self.command(), Some("G0") | Some("G1"))
    }

    /// Whether the line has neither a command nor a comment
    pub fn is_blank(&self) -> bool {
        self.command.is_none() && self.comment.is_none()
    }

    /// All single-letter parameters in insertion order
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Look up a parameter by letter
    pub fn param(&self, letter: char) -> Option<&ParamValue> {
        self.params
            .iter()
            .find(|p| p.letter == letter)
            .map(|p| &p.value)
    }

    /// Whether a parameter letter is present in any form
    pub fn has_param(&self, letter: char) -> bool {
        self.param(letter).is_some()
    }

    /// Numeric value of a parameter
    pub fn number(&self, letter: char) -> Option<f64> {
        self.param(letter).and_then(ParamValue::as_number)
    }

    /// Set a parameter, keeping its position if it already exists
    pub fn set_param(&mut self, letter: char, value: ParamValue) {
        let letter = letter.to_ascii_uppercase();
        match self.params.iter_mut().find(|p| p.letter == letter) {
            Some(param) => param.value = value,
            None => self.params.push(Param { letter, value }),
        }
    }

    /// Set a numeric parameter
    pub fn set_number(&mut self, letter: char, value: f64) {
        self.set_param(letter, ParamValue::Number(value));
    }

    /// Remove a parameter, returning its value
    pub fn remove_param(&mut self, letter: char) -> Option<ParamValue> {
        let index = self.params.iter().position(|p| p.letter == letter)?;
        Some(self.params.remove(index).value)
    }

    /// Builder form of [`Line::set_number`]
    pub fn with_number(mut self, letter: char, value: f64) -> Self {
        self.set_number(letter, value);
        self
    }

    /// `KEY=VALUE` parameters in insertion order
    pub fn eq_params(&self) -> &[(String, String)] {
        &self.eq_params
    }

    /// Look up a `KEY=VALUE` parameter
    pub fn eq_param(&self, key: &str) -> Option<&str> {
        self.eq_params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set a `KEY=VALUE` parameter, keeping its position if it exists
    pub fn set_eq_param(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.eq_params.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.eq_params.push((key, value)),
        }
    }

    /// Builder form of [`Line::set_eq_param`]
    pub fn with_eq_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_eq_param(key, value);
        self
    }

    /// Trailing comment text, without the `;`
    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    /// Replace the trailing comment
    pub fn set_comment(&mut self, comment: Option<String>) {
        self.comment = comment;
    }

    /// Builder form of [`Line::set_comment`]
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Previous line in the file
    pub fn prev(&self) -> Option<LineId> {
        self.prev
    }

    /// Next line in the file
    pub fn next(&self) -> Option<LineId> {
        self.next
    }

    /// Owning section, `None` while detached
    pub fn section(&self) -> Option<SectionId> {
        self.section
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = Vec::with_capacity(self.params.len() + 2);

        if let Some(command) = &self.command {
            parts.push(command.clone());
        }

        for param in &self.params {
            let part = match &param.value {
                ParamValue::Flag => param.letter.to_string(),
                ParamValue::Number(value) => match param_precision(self.command(), param.letter) {
                    Some(places) => format!("{}{:.*}", param.letter, places, value),
                    None => format!("{}{}", param.letter, value),
                },
                ParamValue::Text(text) => format!("{}{}", param.letter, text),
            };
            parts.push(part);
        }

        parts.extend(self.eq_params.iter().map(|(k, v)| format!("{}={}", k, v)));

        if let Some(comment) = &self.comment {
            parts.push(format!(";{}", comment));
        }

        f.write_str(&parts.join(" "))
    }
}
