//! JSON data model for cmdparse configurations.
//!
//! A `ParserSchema` mirrors the builder API of `cmdparse` so a parser can be
//! described in a file (`cmdparse.json`) and built at runtime. Validators
//! cannot be expressed in JSON; `possible-values` covers the common case.

use std::collections::HashMap;

use cmdparse::{Argument, Command, Flag, Parser};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SCHEMA_NAME: &str = "cmdparse.json";

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("shortname of '{name}' must be exactly one character, got {short:?}")]
    BadShortname { name: String, short: String },
    #[error("'{name}' has min {min} greater than max {max}")]
    InvalidBounds { name: String, min: u32, max: u32 },
    #[error("unsupported schema-version {0} (expected 1)")]
    UnsupportedVersion(u32),
    #[error("invalid schema JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct FlagSchema {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct ArgSchema {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metavar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(default)]
    pub required: bool,
    /// When non-empty, values outside this list are rejected.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub possible_values: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct CommandSchema {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<FlagSchema>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<ArgSchema>,
}

/// `"global-command": "build"` or `"global-command": { "name": ... }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GlobalCommandSchema {
    Named(String),
    Inline(CommandSchema),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct ParserSchema {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_command: Option<GlobalCommandSchema>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<CommandSchema>,
}

/// Something legal but probably unintended in a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaWarning {
    /// Two declarations in one command share a longname; the first one wins.
    DuplicateLongname { command: String, name: String },
    /// Two declarations in one command share a shortname; the first one wins.
    DuplicateShortname { command: String, short: char },
    DuplicateCommand { name: String },
    /// `global-command` names a command that is not configured.
    UnknownGlobalCommand { name: String },
}

impl std::fmt::Display for SchemaWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateLongname { command, name } => {
                write!(f, "command '{command}': '--{name}' is declared more than once")
            }
            Self::DuplicateShortname { command, short } => {
                write!(f, "command '{command}': '-{short}' is declared more than once")
            }
            Self::DuplicateCommand { name } => write!(f, "command '{name}' is declared more than once"),
            Self::UnknownGlobalCommand { name } => {
                write!(f, "global command '{name}' does not match any command")
            }
        }
    }
}

fn shortname(owner: &str, short: Option<&str>) -> Result<Option<char>, SchemaError> {
    let Some(raw) = short else {
        return Ok(None);
    };
    let mut chars = raw.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(Some(c)),
        _ => Err(SchemaError::BadShortname {
            name: owner.to_string(),
            short: raw.to_string(),
        }),
    }
}

fn bounds(name: &str, min: Option<u32>, max: Option<u32>) -> Result<(u32, u32), SchemaError> {
    let min = min.unwrap_or(0);
    let max = max.unwrap_or(u32::MAX);
    if min > max {
        return Err(SchemaError::InvalidBounds {
            name: name.to_string(),
            min,
            max,
        });
    }
    Ok((min, max))
}

impl FlagSchema {
    pub fn to_flag(&self) -> Result<Flag, SchemaError> {
        let (min, max) = bounds(&self.name, self.min, self.max)?;
        let mut flag = Flag::new(&self.name)
            .description(&self.description)
            .min(min)
            .max(max);
        if let Some(c) = shortname(&self.name, self.short.as_deref())? {
            flag = flag.shortname(c);
        }
        Ok(flag)
    }
}

impl ArgSchema {
    pub fn to_argument(&self) -> Result<Argument, SchemaError> {
        let (min, max) = bounds(&self.name, self.min, self.max)?;
        let mut arg = Argument::new(&self.name)
            .description(&self.description)
            .min(min)
            .max(max)
            .required(self.required);
        if let Some(c) = shortname(&self.name, self.short.as_deref())? {
            arg = arg.shortname(c);
        }
        if let Some(metavar) = &self.metavar {
            arg = arg.metavar(metavar);
        }
        if let Some(default_value) = &self.default_value {
            arg = arg.default_value(default_value);
        }
        if !self.possible_values.is_empty() {
            let allowed = self.possible_values.clone();
            arg = arg.validator(move |v| allowed.iter().any(|p| p == v));
        }
        Ok(arg)
    }
}

impl CommandSchema {
    pub fn to_command(&self) -> Result<Command, SchemaError> {
        let mut command = Command::new(&self.name).description(&self.description);
        if let Some(c) = shortname(&self.name, self.short.as_deref())? {
            command = command.shortname(c);
        }
        for flag in &self.flags {
            command = command.flag(flag.to_flag()?);
        }
        for arg in &self.args {
            command = command.argument(arg.to_argument()?);
        }
        Ok(command)
    }

    fn warnings(&self, out: &mut Vec<SchemaWarning>) {
        let mut longs: HashMap<&str, usize> = HashMap::new();
        let mut shorts: HashMap<char, usize> = HashMap::new();
        let decls = self
            .flags
            .iter()
            .map(|f| (f.name.as_str(), f.short.as_deref()))
            .chain(self.args.iter().map(|a| (a.name.as_str(), a.short.as_deref())));
        for (name, short) in decls {
            *longs.entry(name).or_default() += 1;
            if let Some(c) = short.and_then(|s| s.chars().next()) {
                *shorts.entry(c).or_default() += 1;
            }
        }

        let mut dup_longs: Vec<&str> = longs
            .into_iter()
            .filter(|(_, n)| *n > 1)
            .map(|(name, _)| name)
            .collect();
        dup_longs.sort_unstable();
        out.extend(dup_longs.into_iter().map(|name| SchemaWarning::DuplicateLongname {
            command: self.name.clone(),
            name: name.to_string(),
        }));

        let mut dup_shorts: Vec<char> = shorts
            .into_iter()
            .filter(|(_, n)| *n > 1)
            .map(|(c, _)| c)
            .collect();
        dup_shorts.sort_unstable();
        out.extend(dup_shorts.into_iter().map(|short| SchemaWarning::DuplicateShortname {
            command: self.name.clone(),
            short,
        }));
    }
}

impl ParserSchema {
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        let schema: Self = serde_json::from_str(json)?;
        if let Some(version) = schema.schema_version {
            if version != SCHEMA_VERSION {
                return Err(SchemaError::UnsupportedVersion(version));
            }
        }
        Ok(schema)
    }

    pub fn to_json_pretty(&self) -> Result<String, SchemaError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Build the immutable parser described by this schema.
    pub fn build(&self) -> Result<Parser, SchemaError> {
        let mut builder = Parser::builder();
        for command in &self.commands {
            builder = builder.command(command.to_command()?);
        }
        builder = match &self.global_command {
            None => builder,
            Some(GlobalCommandSchema::Named(name)) => builder.global_command_name(name),
            Some(GlobalCommandSchema::Inline(command)) => {
                builder.global_command(command.to_command()?)
            }
        };
        Ok(builder.build())
    }

    /// Collisions and dangling references. None of these stop `build`.
    pub fn warnings(&self) -> Vec<SchemaWarning> {
        let mut out = Vec::new();

        let mut seen: HashMap<&str, usize> = HashMap::new();
        for command in &self.commands {
            *seen.entry(command.name.as_str()).or_default() += 1;
        }
        let mut dups: Vec<&str> = seen
            .into_iter()
            .filter(|(_, n)| *n > 1)
            .map(|(name, _)| name)
            .collect();
        dups.sort_unstable();
        out.extend(dups.into_iter().map(|name| SchemaWarning::DuplicateCommand {
            name: name.to_string(),
        }));

        match &self.global_command {
            Some(GlobalCommandSchema::Named(name)) => {
                if !self.commands.iter().any(|c| &c.name == name) {
                    out.push(SchemaWarning::UnknownGlobalCommand { name: name.clone() });
                }
            }
            Some(GlobalCommandSchema::Inline(command)) => command.warnings(&mut out),
            None => {}
        }
        for command in &self.commands {
            command.warnings(&mut out);
        }
        out
    }

    /// Starter schema written by `cmdparse init`.
    pub fn example() -> Self {
        Self {
            schema_version: Some(SCHEMA_VERSION),
            global_command: Some(GlobalCommandSchema::Named("build".to_string())),
            commands: vec![
                CommandSchema {
                    name: "build".to_string(),
                    short: Some("b".to_string()),
                    description: "Build the project".to_string(),
                    flags: vec![FlagSchema {
                        name: "verbose".to_string(),
                        short: Some("v".to_string()),
                        description: "More output, repeatable".to_string(),
                        max: Some(3),
                        ..Default::default()
                    }],
                    args: vec![
                        ArgSchema {
                            name: "out".to_string(),
                            short: Some("o".to_string()),
                            description: "Output path".to_string(),
                            metavar: Some("FILE".to_string()),
                            required: true,
                            ..Default::default()
                        },
                        ArgSchema {
                            name: "profile".to_string(),
                            short: Some("p".to_string()),
                            default_value: Some("debug".to_string()),
                            possible_values: vec!["debug".to_string(), "release".to_string()],
                            max: Some(1),
                            ..Default::default()
                        },
                    ],
                },
                CommandSchema {
                    name: "clean".to_string(),
                    short: Some("c".to_string()),
                    description: "Remove build output".to_string(),
                    flags: vec![FlagSchema {
                        name: "all".to_string(),
                        short: Some("a".to_string()),
                        ..Default::default()
                    }],
                    ..Default::default()
                },
            ],
        }
    }
}
