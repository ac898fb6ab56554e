//! Parse output. Everything borrows from the [`Parser`](crate::Parser) and
//! the argv tokens.

use serde::Serialize;
use std::borrow::Cow;

use crate::config::Command;

/// One parsed parameter of the active command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind")]
pub enum Parameter<'a> {
    /// Only the latest occurrence's value is kept.
    Argument { name: &'a str, value: &'a str },
    Flag { name: &'a str, occurrences: u32 },
}

impl<'a> Parameter<'a> {
    pub fn name(&self) -> &'a str {
        match self {
            Self::Argument { name, .. } | Self::Flag { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ParsedCommand<'a> {
    pub name: &'a str,
    pub parameters: Vec<Parameter<'a>>,
    #[serde(skip)]
    pub(crate) config: &'a Command,
}

impl<'a> ParsedCommand<'a> {
    pub(crate) fn new(config: &'a Command) -> Self {
        Self {
            name: &config.longname,
            parameters: Vec::new(),
            config,
        }
    }

    /// The command declaration this result was parsed against.
    pub fn config(&self) -> &'a Command {
        self.config
    }

    /// Value given for argument `name` on the command line.
    pub fn get(&self, name: &str) -> Option<&'a str> {
        self.parameters.iter().find_map(|p| match p {
            Parameter::Argument { name: n, value } if *n == name => Some(*value),
            _ => None,
        })
    }

    /// Like [`get`](Self::get), falling back to the declared default value.
    pub fn value_of(&self, name: &str) -> Option<&'a str> {
        self.get(name).or_else(|| {
            self.config
                .find_argument(name.as_bytes())
                .and_then(|a| a.default_value.as_deref())
        })
    }

    /// How many times flag `name` occurred (0 if never).
    pub fn occurrences(&self, name: &str) -> u32 {
        self.parameters
            .iter()
            .find_map(|p| match p {
                Parameter::Flag { name: n, occurrences } if *n == name => Some(*occurrences),
                _ => None,
            })
            .unwrap_or(0)
    }

    /// Whether a flag or argument called `name` occurred.
    pub fn is_present(&self, name: &str) -> bool {
        self.parameters.iter().any(|p| p.name() == name)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ParsedArgs<'a> {
    /// argv\[0\], lossily decoded.
    pub program: Cow<'a, str>,
    pub command: ParsedCommand<'a>,
    /// Parameters given before the command name. Nothing populates this yet.
    pub parameters: Vec<Parameter<'a>>,
}
