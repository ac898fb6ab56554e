use serde::Serialize;
use std::fmt;

/// What kind of entity a [`ParseError`] is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorType {
    Argument,
    Flag,
    Command,
    None,
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Argument => "argument",
            Self::Flag => "flag",
            Self::Command => "command",
            Self::None => "token",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorCode {
    /// Malformed UTF-8 where a codepoint or a value was expected.
    BadString,
    /// A token starting with three or more dashes.
    SyntaxError,
    /// No command was named and no global command is configured.
    NoGlobalCommand,
    /// `--flag=value` for a valueless flag.
    FlagWithValue,
    /// A valued argument without a value.
    MissingValue,
    UnknownParameter,
    RequiredArgument,
    /// The argument's validator rejected the value.
    InvalidValue,
    /// Occurrence count outside the declared bounds.
    OutOfBound,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::BadString => "malformed UTF-8",
            Self::SyntaxError => "syntax error",
            Self::NoGlobalCommand => "no command given and no global command configured",
            Self::FlagWithValue => "flag does not take a value",
            Self::MissingValue => "missing value",
            Self::UnknownParameter => "unknown parameter",
            Self::RequiredArgument => "missing required argument",
            Self::InvalidValue => "invalid value",
            Self::OutOfBound => "wrong number of occurrences",
        })
    }
}

/// A parse failure, annotated with the index of the offending argv token.
///
/// Sub-parsers create errors relative to the token they were handed; each
/// enclosing stage shifts `position` by its own offset on the way out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{code}: {kind} '{argument}'{} at position {position}", value_suffix(.value))]
pub struct ParseError {
    pub argument: String,
    pub value: Option<String>,
    #[serde(rename = "type")]
    pub kind: ErrorType,
    pub code: ErrorCode,
    pub position: usize,
}

fn value_suffix(value: &Option<String>) -> String {
    match value {
        Some(v) => format!(" (value '{v}')"),
        None => String::new(),
    }
}

impl ParseError {
    pub fn new(kind: ErrorType, code: ErrorCode, argument: impl Into<String>) -> Self {
        Self {
            argument: argument.into(),
            value: None,
            kind,
            code,
            position: 0,
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn at(mut self, position: usize) -> Self {
        self.position = position;
        self
    }

    /// Shift the position by the offset of the enclosing token stream.
    pub fn offset(mut self, by: usize) -> Self {
        self.position += by;
        self
    }
}

pub type ParseResult<T> = Result<T, ParseError>;
