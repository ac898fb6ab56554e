//! Parser configuration: commands and the flags/arguments they accept.
//!
//! Everything here is built up front with consuming builder methods and is
//! never touched again while parsing.

use std::fmt;
use std::sync::Arc;

/// Predicate over an argument's raw value.
pub type Validator = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Occurrence bounds (`min..=max`) for a flag or argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub min: u32,
    pub max: u32,
}

impl Bounds {
    pub const UNBOUNDED: u32 = u32::MAX;

    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    pub fn accepts(&self, count: u32) -> bool {
        count <= self.max
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::new(0, Self::UNBOUNDED)
    }
}

/// A valued parameter (`--name=value`, `-n value` or a positional input).
#[derive(Clone)]
pub struct Argument {
    pub longname: String,
    pub shortname: Option<char>,
    pub description: String,
    pub bounds: Bounds,
    pub metavar: Option<String>,
    pub validator: Option<Validator>,
    pub default_value: Option<String>,
    /// Must occur at least once regardless of `bounds.min`.
    pub required: bool,
}

impl Argument {
    pub fn new(longname: impl Into<String>) -> Self {
        Self {
            longname: longname.into(),
            shortname: None,
            description: String::new(),
            bounds: Bounds::default(),
            metavar: None,
            validator: None,
            default_value: None,
            required: false,
        }
    }

    pub fn shortname(mut self, shortname: char) -> Self {
        self.shortname = Some(shortname);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn min(mut self, min: u32) -> Self {
        self.bounds.min = min;
        self
    }

    pub fn max(mut self, max: u32) -> Self {
        self.bounds.max = max;
        self
    }

    pub fn metavar(mut self, metavar: impl Into<String>) -> Self {
        self.metavar = Some(metavar.into());
        self
    }

    pub fn validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Run the validator, if any. Arguments without one accept every value.
    pub fn accepts(&self, value: &str) -> bool {
        self.validator.as_ref().is_none_or(|v| v(value))
    }
}

impl fmt::Debug for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Argument")
            .field("longname", &self.longname)
            .field("shortname", &self.shortname)
            .field("description", &self.description)
            .field("bounds", &self.bounds)
            .field("metavar", &self.metavar)
            .field("validator", &self.validator.as_ref().map(|_| "<fn>"))
            .field("default_value", &self.default_value)
            .field("required", &self.required)
            .finish()
    }
}

/// A valueless parameter counted by occurrence.
#[derive(Debug, Clone)]
pub struct Flag {
    pub longname: String,
    pub shortname: Option<char>,
    pub description: String,
    pub bounds: Bounds,
}

impl Flag {
    pub fn new(longname: impl Into<String>) -> Self {
        Self {
            longname: longname.into(),
            shortname: None,
            description: String::new(),
            bounds: Bounds::default(),
        }
    }

    pub fn shortname(mut self, shortname: char) -> Self {
        self.shortname = Some(shortname);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn min(mut self, min: u32) -> Self {
        self.bounds.min = min;
        self
    }

    pub fn max(mut self, max: u32) -> Self {
        self.bounds.max = max;
        self
    }
}

/// A command grammar: the flags and arguments valid after its name.
#[derive(Debug, Clone)]
pub struct Command {
    pub longname: String,
    pub shortname: Option<char>,
    pub description: String,
    pub arguments: Vec<Argument>,
    pub flags: Vec<Flag>,
}

impl Command {
    pub fn new(longname: impl Into<String>) -> Self {
        Self {
            longname: longname.into(),
            shortname: None,
            description: String::new(),
            arguments: Vec::new(),
            flags: Vec::new(),
        }
    }

    pub fn shortname(mut self, shortname: char) -> Self {
        self.shortname = Some(shortname);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn argument(mut self, argument: Argument) -> Self {
        self.arguments.push(argument);
        self
    }

    pub fn flag(mut self, flag: Flag) -> Self {
        self.flags.push(flag);
        self
    }

    // Lookups are first-match: duplicate declarations are allowed and the
    // earliest one shadows the rest.

    pub fn find_flag(&self, longname: &[u8]) -> Option<&Flag> {
        self.flags.iter().find(|f| f.longname.as_bytes() == longname)
    }

    pub fn find_short_flag(&self, shortname: char) -> Option<&Flag> {
        self.flags.iter().find(|f| f.shortname == Some(shortname))
    }

    pub fn find_argument(&self, longname: &[u8]) -> Option<&Argument> {
        self.arguments
            .iter()
            .find(|a| a.longname.as_bytes() == longname)
    }

    pub fn find_short_argument(&self, shortname: char) -> Option<&Argument> {
        self.arguments
            .iter()
            .find(|a| a.shortname == Some(shortname))
    }
}

/// The command used when argv names none.
#[derive(Debug, Clone)]
pub enum GlobalCommand {
    Inline(Command),
    /// Longname of one of the configured commands, looked up at parse time.
    Named(String),
}
