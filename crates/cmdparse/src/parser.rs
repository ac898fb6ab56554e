//! The parsing engine.
//!
//! Flow: resolve the command from the first token after the program name,
//! classify every remaining token (long option, short option or bundle,
//! positional input), then check required arguments and occurrence bounds.
//!
//! Sub-parsers never touch the parsed state directly. They return a
//! `ParameterDelta` for one token, and the delta is registered only once the
//! whole token has been understood, so a failing token commits nothing.

use std::borrow::Cow;
use std::collections::HashMap;

use tracing::{debug, trace};

use crate::config::{Argument, Command, Flag, GlobalCommand};
use crate::error::{ErrorCode, ErrorType, ParseError, ParseResult};
use crate::result::{Parameter, ParsedArgs, ParsedCommand};
use crate::utf8;

#[derive(Debug, Clone, Default)]
pub struct ParserBuilder {
    commands: Vec<Command>,
    global_command: Option<GlobalCommand>,
}

impl ParserBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn command(mut self, command: Command) -> Self {
        self.commands.push(command);
        self
    }

    /// Use an inline command when argv names none.
    pub fn global_command(mut self, command: Command) -> Self {
        self.global_command = Some(GlobalCommand::Inline(command));
        self
    }

    /// Use the configured command called `longname` when argv names none.
    ///
    /// The name is resolved at parse time; an unknown name behaves like no
    /// global command at all.
    pub fn global_command_name(mut self, longname: impl Into<String>) -> Self {
        self.global_command = Some(GlobalCommand::Named(longname.into()));
        self
    }

    pub fn build(self) -> Parser {
        Parser {
            commands: self.commands,
            global_command: self.global_command,
        }
    }
}

/// An immutable parser configuration. Cheap to share across threads.
#[derive(Debug, Clone)]
pub struct Parser {
    commands: Vec<Command>,
    global_command: Option<GlobalCommand>,
}

impl Parser {
    pub fn builder() -> ParserBuilder {
        ParserBuilder::new()
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn global_command_ref(&self) -> Option<&GlobalCommand> {
        self.global_command.as_ref()
    }

    /// The command used when argv does not name one, if it resolves.
    pub fn global_command(&self) -> Option<&Command> {
        match self.global_command.as_ref()? {
            GlobalCommand::Inline(command) => Some(command),
            GlobalCommand::Named(name) => self.commands.iter().find(|c| &c.longname == name),
        }
    }

    /// Parse `tokens`, where `tokens[0]` is the program name.
    ///
    /// Tokens are raw bytes so that non-UTF-8 argv (see
    /// [`OsString::into_encoded_bytes`](std::ffi::OsString::into_encoded_bytes))
    /// is reported as [`ErrorCode::BadString`] instead of being lost.
    pub fn parse<'a, T: AsRef<[u8]>>(&'a self, tokens: &'a [T]) -> ParseResult<ParsedArgs<'a>> {
        let program = tokens
            .first()
            .map(|p| String::from_utf8_lossy(p.as_ref()))
            .unwrap_or(Cow::Borrowed(""));
        let rest = tokens.get(1..).unwrap_or_default();

        let (command, consumed) = self.resolve(rest).map_err(|e| e.offset(1))?;
        let start = 1 + consumed;
        let parsed = parse_tokens(&rest[consumed..], command).map_err(|e| e.offset(start))?;

        Ok(ParsedArgs {
            program,
            command: parsed,
            parameters: Vec::new(),
        })
    }

    /// Pick the command governing `rest` (argv without the program name).
    ///
    /// Returns the command and how many tokens its name took (0 or 1).
    fn resolve<'a, T: AsRef<[u8]>>(&'a self, rest: &'a [T]) -> ParseResult<(&'a Command, usize)> {
        let Some(candidate) = rest.first().map(|t| t.as_ref()) else {
            return self.fallback(b"");
        };
        if candidate.starts_with(b"-") {
            return self.fallback(b"");
        }

        let (first, first_len) = utf8::decode_leading(candidate).map_err(|_| {
            ParseError::new(
                ErrorType::None,
                ErrorCode::BadString,
                String::from_utf8_lossy(candidate),
            )
        })?;

        // A single-codepoint token is tried as a shortname first; a command
        // with a one-letter longname is still reachable through the second
        // lookup.
        let by_short = if first_len == candidate.len() {
            self.commands.iter().find(|c| c.shortname == Some(first))
        } else {
            None
        };
        let found = by_short.or_else(|| {
            self.commands
                .iter()
                .find(|c| c.longname.as_bytes() == candidate)
        });

        match found {
            Some(command) => {
                debug!(command = %command.longname, "resolved command");
                Ok((command, 1))
            }
            None => self.fallback(candidate),
        }
    }

    /// The global command, consuming no token.
    fn fallback(&self, argument: &[u8]) -> ParseResult<(&Command, usize)> {
        let command = self.global_command().ok_or_else(|| {
            ParseError::new(
                ErrorType::Command,
                ErrorCode::NoGlobalCommand,
                String::from_utf8_lossy(argument),
            )
        })?;
        debug!(command = %command.longname, "using global command");
        Ok((command, 0))
    }
}

/// A single pending registration produced by a sub-parser.
#[derive(Debug, Clone)]
pub(crate) enum Registration<'a> {
    Flag(&'a Flag),
    Argument {
        decl: &'a Argument,
        value: &'a str,
        /// Offset of the value token from the token that produced it.
        at: usize,
    },
}

pub(crate) type ParameterDelta<'a> = Vec<Registration<'a>>;

/// Forward-only cursor over a command's tokens.
///
/// Positions are relative to the start of the slice.
#[derive(Debug)]
pub(crate) struct TokenCursor<'a, T> {
    tokens: &'a [T],
    next: usize,
}

impl<'a, T: AsRef<[u8]>> TokenCursor<'a, T> {
    pub(crate) fn new(tokens: &'a [T]) -> Self {
        Self { tokens, next: 0 }
    }
}

impl<'a, T: AsRef<[u8]>> Iterator for TokenCursor<'a, T> {
    type Item = (usize, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let token = self.tokens.get(self.next)?;
        let at = self.next;
        self.next += 1;
        Some((at, token.as_ref()))
    }
}

/// Parse state for the active command.
#[derive(Debug)]
struct CommandState<'a> {
    parsed: ParsedCommand<'a>,
    flag_counts: HashMap<&'a str, u32>,
    argument_counts: HashMap<&'a str, u32>,
}

impl<'a> CommandState<'a> {
    fn new(command: &'a Command) -> Self {
        Self {
            parsed: ParsedCommand::new(command),
            flag_counts: HashMap::new(),
            argument_counts: HashMap::new(),
        }
    }

    fn flag_count(&self, name: &str) -> u32 {
        self.flag_counts.get(name).copied().unwrap_or(0)
    }

    fn argument_count(&self, name: &str) -> u32 {
        self.argument_counts.get(name).copied().unwrap_or(0)
    }

    fn register(&mut self, delta: ParameterDelta<'a>) -> ParseResult<()> {
        for registration in delta {
            match registration {
                Registration::Flag(flag) => self.add_flag(flag)?,
                Registration::Argument { decl, value, at } => {
                    self.add_argument(decl, value).map_err(|e| e.offset(at))?
                }
            }
        }
        Ok(())
    }

    fn add_flag(&mut self, flag: &'a Flag) -> ParseResult<()> {
        let name = flag.longname.as_str();
        let count = self.flag_count(name).saturating_add(1);
        if !flag.bounds.accepts(count) {
            return Err(ParseError::new(ErrorType::Flag, ErrorCode::OutOfBound, name));
        }
        self.flag_counts.insert(name, count);

        let existing = self.parsed.parameters.iter_mut().find_map(|p| match p {
            Parameter::Flag { name: n, occurrences } if *n == name => Some(occurrences),
            _ => None,
        });
        match existing {
            Some(occurrences) => *occurrences = count,
            None => self.parsed.parameters.push(Parameter::Flag {
                name,
                occurrences: count,
            }),
        }
        Ok(())
    }

    fn add_argument(&mut self, argument: &'a Argument, value: &'a str) -> ParseResult<()> {
        let name = argument.longname.as_str();
        if !argument.accepts(value) {
            return Err(
                ParseError::new(ErrorType::Argument, ErrorCode::InvalidValue, name)
                    .with_value(value),
            );
        }
        let count = self.argument_count(name).saturating_add(1);
        if !argument.bounds.accepts(count) {
            return Err(
                ParseError::new(ErrorType::Argument, ErrorCode::OutOfBound, name)
                    .with_value(value),
            );
        }
        self.argument_counts.insert(name, count);

        let existing = self.parsed.parameters.iter_mut().find_map(|p| match p {
            Parameter::Argument { name: n, value: slot } if *n == name => Some(slot),
            _ => None,
        });
        match existing {
            Some(slot) => *slot = value,
            None => self
                .parsed
                .parameters
                .push(Parameter::Argument { name, value }),
        }
        Ok(())
    }

    /// Post-parse checks. Errors are positioned at the start of the
    /// command's token stream.
    fn finish(self) -> ParseResult<ParsedCommand<'a>> {
        let command = self.parsed.config();

        let mut missing: Vec<&str> = command
            .arguments
            .iter()
            .filter(|a| a.required)
            .map(|a| a.longname.as_str())
            .collect();
        for parameter in &self.parsed.parameters {
            match parameter {
                Parameter::Argument { name, .. } => missing.retain(|m| m != name),
                Parameter::Flag { .. } => {}
            }
        }
        if let Some(name) = missing.first() {
            return Err(ParseError::new(
                ErrorType::Argument,
                ErrorCode::RequiredArgument,
                *name,
            ));
        }

        for flag in &command.flags {
            if self.flag_count(&flag.longname) < flag.bounds.min {
                return Err(ParseError::new(
                    ErrorType::Flag,
                    ErrorCode::OutOfBound,
                    flag.longname.as_str(),
                ));
            }
        }
        for argument in &command.arguments {
            if self.argument_count(&argument.longname) < argument.bounds.min {
                return Err(ParseError::new(
                    ErrorType::Argument,
                    ErrorCode::OutOfBound,
                    argument.longname.as_str(),
                ));
            }
        }

        Ok(self.parsed)
    }
}

/// Classify every token of `command`'s stream.
fn parse_tokens<'a, T: AsRef<[u8]>>(
    tokens: &'a [T],
    command: &'a Command,
) -> ParseResult<ParsedCommand<'a>> {
    let mut state = CommandState::new(command);
    let mut cursor = TokenCursor::new(tokens);

    while let Some((at, token)) = cursor.next() {
        trace!(position = at, token = %String::from_utf8_lossy(token), "classifying token");

        // No separator state: `--` and `-` go through the option parsers
        // like any other dashed token.
        let delta = if token.starts_with(b"---") {
            return Err(ParseError::new(
                ErrorType::None,
                ErrorCode::SyntaxError,
                String::from_utf8_lossy(token),
            )
            .at(at));
        } else if token.starts_with(b"--") {
            parse_long(token, command)
        } else if token.starts_with(b"-") {
            parse_short(token, command, &mut cursor)
        } else {
            parse_input(token, command, &state)
        };

        let delta = delta.map_err(|e| e.offset(at))?;
        state.register(delta).map_err(|e| e.offset(at))?;
    }

    state.finish()
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Argument values must be valid UTF-8.
fn decode_value<'a>(bytes: &'a [u8], argument: &str) -> ParseResult<&'a str> {
    std::str::from_utf8(bytes).map_err(|_| {
        ParseError::new(ErrorType::Argument, ErrorCode::BadString, argument)
            .with_value(lossy(bytes))
    })
}

/// `--name` or `--name=value`.
fn parse_long<'a>(token: &'a [u8], command: &'a Command) -> ParseResult<ParameterDelta<'a>> {
    let body = &token[2..];
    let (name, value) = match body.iter().position(|&b| b == b'=') {
        Some(eq) => (&body[..eq], Some(&body[eq + 1..])),
        None => (body, None),
    };

    if let Some(flag) = command.find_flag(name) {
        if let Some(value) = value {
            return Err(
                ParseError::new(ErrorType::Flag, ErrorCode::FlagWithValue, flag.longname.as_str())
                    .with_value(lossy(value)),
            );
        }
        return Ok(vec![Registration::Flag(flag)]);
    }

    if let Some(argument) = command.find_argument(name) {
        let Some(value) = value else {
            return Err(ParseError::new(
                ErrorType::Argument,
                ErrorCode::MissingValue,
                argument.longname.as_str(),
            ));
        };
        let value = decode_value(value, &argument.longname)?;
        return Ok(vec![Registration::Argument {
            decl: argument,
            value,
            at: 0,
        }]);
    }

    let err = ParseError::new(ErrorType::Argument, ErrorCode::UnknownParameter, lossy(name));
    Err(match value {
        Some(value) => err.with_value(lossy(value)),
        None => err,
    })
}

/// `-x`, `-x value` or a bundle of flags such as `-xyz`.
fn parse_short<'a, T: AsRef<[u8]>>(
    token: &'a [u8],
    command: &'a Command,
    cursor: &mut TokenCursor<'a, T>,
) -> ParseResult<ParameterDelta<'a>> {
    let name = &token[1..];
    let bad_string = || ParseError::new(ErrorType::Flag, ErrorCode::BadString, lossy(name));

    let (first, first_len) = utf8::decode_leading(name).map_err(|_| bad_string())?;

    if name.len() > first_len {
        // Only flags can be bundled; a valued argument must stand alone.
        let mut delta = Vec::new();
        for item in utf8::codepoints(name) {
            let (_, ch) = item.map_err(|_| bad_string())?;
            let flag = command.find_short_flag(ch).ok_or_else(|| {
                ParseError::new(ErrorType::Flag, ErrorCode::UnknownParameter, lossy(name))
            })?;
            delta.push(Registration::Flag(flag));
        }
        return Ok(delta);
    }

    if let Some(flag) = command.find_short_flag(first) {
        return Ok(vec![Registration::Flag(flag)]);
    }

    if let Some(argument) = command.find_short_argument(first) {
        let Some((_, raw)) = cursor.next() else {
            return Err(ParseError::new(
                ErrorType::Argument,
                ErrorCode::MissingValue,
                argument.longname.as_str(),
            ));
        };
        let value = decode_value(raw, &argument.longname).map_err(|e| e.at(1))?;
        return Ok(vec![Registration::Argument {
            decl: argument,
            value,
            at: 1,
        }]);
    }

    Err(ParseError::new(
        ErrorType::Argument,
        ErrorCode::UnknownParameter,
        lossy(name),
    ))
}

/// A positional token fills the first argument still below its maximum.
fn parse_input<'a>(
    token: &'a [u8],
    command: &'a Command,
    state: &CommandState<'a>,
) -> ParseResult<ParameterDelta<'a>> {
    let slot = command.arguments.iter().find(|a| {
        a.bounds
            .accepts(state.argument_count(&a.longname).saturating_add(1))
    });
    let Some(argument) = slot else {
        return Err(match command.arguments.last() {
            None => ParseError::new(ErrorType::Argument, ErrorCode::UnknownParameter, lossy(token)),
            Some(last) => ParseError::new(
                ErrorType::Argument,
                ErrorCode::OutOfBound,
                last.longname.as_str(),
            )
            .with_value(lossy(token)),
        });
    };
    let value = decode_value(token, &argument.longname)?;
    Ok(vec![Registration::Argument {
        decl: argument,
        value,
        at: 0,
    }])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Bounds;

    fn build_command() -> Command {
        Command::new("build")
            .shortname('b')
            .flag(Flag::new("verbose").shortname('v'))
            .argument(Argument::new("out").shortname('o').required(true))
    }

    fn example_parser() -> Parser {
        Parser::builder().command(build_command()).build()
    }

    fn err_of(result: ParseResult<ParsedArgs<'_>>) -> ParseError {
        match result {
            Ok(parsed) => panic!("expected an error, got {parsed:?}"),
            Err(err) => err,
        }
    }

    #[test]
    fn example_build_with_flag_and_argument() {
        let parser = example_parser();
        let tokens = ["prog", "build", "-v", "--out=bin"];
        let parsed = parser.parse(&tokens).unwrap();

        assert_eq!(parsed.program, "prog");
        assert_eq!(parsed.command.name, "build");
        assert_eq!(
            parsed.command.parameters,
            vec![
                Parameter::Flag {
                    name: "verbose",
                    occurrences: 1
                },
                Parameter::Argument {
                    name: "out",
                    value: "bin"
                },
            ]
        );
        assert!(parsed.parameters.is_empty());
    }

    #[test]
    fn example_missing_required_argument() {
        let parser = example_parser();
        let err = err_of(parser.parse(&["prog", "build", "-v"]));
        assert_eq!(err.code, ErrorCode::RequiredArgument);
        assert_eq!(err.kind, ErrorType::Argument);
        assert_eq!(err.argument, "out");
        // Points at the start of the command's own tokens.
        assert_eq!(err.position, 2);
    }

    #[test]
    fn global_command_with_no_tokens_yields_no_parameters() {
        let parser = Parser::builder()
            .global_command(
                Command::new("main")
                    .flag(Flag::new("quiet").shortname('q'))
                    .argument(Argument::new("file").default_value("-")),
            )
            .build();
        let parsed = parser.parse(&["prog"]).unwrap();
        assert_eq!(parsed.command.name, "main");
        assert!(parsed.command.parameters.is_empty());
        // Defaults are visible through lookups, never as parameters.
        assert_eq!(parsed.command.value_of("file"), Some("-"));
        assert_eq!(parsed.command.get("file"), None);
    }

    #[test]
    fn missing_global_command_is_an_error() {
        let parser = example_parser();
        let err = err_of(parser.parse(&["prog"]));
        assert_eq!(err.kind, ErrorType::Command);
        assert_eq!(err.code, ErrorCode::NoGlobalCommand);
        assert_eq!(err.position, 1);

        let err = err_of(parser.parse(&["prog", "-v"]));
        assert_eq!(err.code, ErrorCode::NoGlobalCommand);
    }

    #[test]
    fn named_global_command_is_resolved_at_parse_time() {
        let parser = Parser::builder()
            .command(build_command())
            .global_command_name("build")
            .build();
        let parsed = parser.parse(&["prog", "-v", "-o", "x"]).unwrap();
        assert_eq!(parsed.command.name, "build");
        assert_eq!(parsed.command.get("out"), Some("x"));

        let dangling = Parser::builder()
            .command(build_command())
            .global_command_name("missing")
            .build();
        assert!(dangling.global_command().is_none());
        assert!(matches!(
            dangling.global_command_ref(),
            Some(GlobalCommand::Named(name)) if name == "missing"
        ));
        let err = err_of(dangling.parse(&["prog"]));
        assert_eq!(err.code, ErrorCode::NoGlobalCommand);
    }

    #[test]
    fn command_resolves_by_shortname_or_longname() {
        let parser = Parser::builder()
            .command(build_command())
            .command(Command::new("x").flag(Flag::new("all")))
            .command(Command::new("straße").shortname('ß'))
            .build();

        let parsed = parser.parse(&["prog", "b", "--out=o"]).unwrap();
        assert_eq!(parsed.command.name, "build");

        // One-letter longname without a matching shortname.
        let parsed = parser.parse(&["prog", "x", "--all"]).unwrap();
        assert_eq!(parsed.command.name, "x");

        let parsed = parser.parse(&["prog", "ß"]).unwrap();
        assert_eq!(parsed.command.name, "straße");
        let parsed = parser.parse(&["prog", "straße"]).unwrap();
        assert_eq!(parsed.command.name, "straße");
    }

    #[test]
    fn unmatched_command_token_falls_back_to_global() {
        let parser = Parser::builder()
            .command(build_command())
            .global_command(Command::new("main").argument(Argument::new("input")))
            .build();
        let parsed = parser.parse(&["prog", "README.md"]).unwrap();
        assert_eq!(parsed.command.name, "main");
        assert_eq!(parsed.command.get("input"), Some("README.md"));

        let err = err_of(example_parser().parse(&["prog", "deploy"]));
        assert_eq!(err.code, ErrorCode::NoGlobalCommand);
        assert_eq!(err.argument, "deploy");
        assert_eq!(err.position, 1);
    }

    #[test]
    fn malformed_command_token_is_bad_string() {
        let parser = example_parser();
        let tokens: [&[u8]; 2] = [b"prog", &[0xff, b'x']];
        let err = err_of(parser.parse(&tokens));
        assert_eq!(err.kind, ErrorType::None);
        assert_eq!(err.code, ErrorCode::BadString);
        assert_eq!(err.position, 1);
    }

    #[test]
    fn flag_with_value_is_rejected_for_any_value() {
        let parser = example_parser();
        for value in ["", "1", "yes", "a=b", "--", "ü"] {
            let token = format!("--verbose={value}");
            let tokens = ["prog", "build", "--out=x", token.as_str()];
            let err = err_of(parser.parse(&tokens));
            assert_eq!(err.kind, ErrorType::Flag);
            assert_eq!(err.code, ErrorCode::FlagWithValue);
            assert_eq!(err.argument, "verbose");
            assert_eq!(err.value.as_deref(), Some(value));
            assert_eq!(err.position, 3);
        }
    }

    #[test]
    fn long_argument_without_value_is_missing_value() {
        let parser = example_parser();
        let err = err_of(parser.parse(&["prog", "build", "--out", "bin"]));
        assert_eq!(err.kind, ErrorType::Argument);
        assert_eq!(err.code, ErrorCode::MissingValue);
        assert_eq!(err.argument, "out");
        assert_eq!(err.position, 2);
    }

    #[test]
    fn long_value_splits_at_first_equals() {
        let parser = example_parser();
        let parsed = parser.parse(&["prog", "build", "--out=a=b"]).unwrap();
        assert_eq!(parsed.command.get("out"), Some("a=b"));
        let parsed = parser.parse(&["prog", "build", "--out="]).unwrap();
        assert_eq!(parsed.command.get("out"), Some(""));
    }

    #[test]
    fn unknown_long_option() {
        let parser = example_parser();
        let err = err_of(parser.parse(&["prog", "build", "--out=x", "--color=auto"]));
        assert_eq!(err.code, ErrorCode::UnknownParameter);
        assert_eq!(err.kind, ErrorType::Argument);
        assert_eq!(err.argument, "color");
        assert_eq!(err.value.as_deref(), Some("auto"));
        assert_eq!(err.position, 3);
    }

    #[test]
    fn short_argument_consumes_next_token() {
        let parser = example_parser();
        let parsed = parser.parse(&["prog", "build", "-o", "-v"]).unwrap();
        assert_eq!(parsed.command.get("out"), Some("-v"));
        assert_eq!(parsed.command.occurrences("verbose"), 0);

        let err = err_of(parser.parse(&["prog", "build", "-v", "-o"]));
        assert_eq!(err.code, ErrorCode::MissingValue);
        assert_eq!(err.argument, "out");
        assert_eq!(err.position, 3);
    }

    #[test]
    fn unknown_single_short_option() {
        let parser = example_parser();
        let err = err_of(parser.parse(&["prog", "build", "-x"]));
        assert_eq!(err.kind, ErrorType::Argument);
        assert_eq!(err.code, ErrorCode::UnknownParameter);
        assert_eq!(err.argument, "x");
    }

    fn bundle_command() -> Command {
        Command::new("ls")
            .flag(Flag::new("all").shortname('a'))
            .flag(Flag::new("brief").shortname('b'))
            .flag(Flag::new("ümlaut").shortname('ü'))
            .argument(Argument::new("color").shortname('c'))
    }

    #[test]
    fn short_bundle_counts_each_flag() {
        let parser = Parser::builder().global_command(bundle_command()).build();
        let parsed = parser.parse(&["prog", "-abaü"]).unwrap();
        assert_eq!(parsed.command.occurrences("all"), 2);
        assert_eq!(parsed.command.occurrences("brief"), 1);
        assert_eq!(parsed.command.occurrences("ümlaut"), 1);
        assert_eq!(parsed.command.parameters.len(), 3);
    }

    #[test]
    fn short_bundle_with_unknown_member_fails_on_cluster() {
        let parser = Parser::builder().global_command(bundle_command()).build();
        // `c` is an argument, which cannot be bundled.
        let err = err_of(parser.parse(&["prog", "-a", "-abc"]));
        assert_eq!(err.kind, ErrorType::Flag);
        assert_eq!(err.code, ErrorCode::UnknownParameter);
        assert_eq!(err.argument, "abc");
        assert_eq!(err.position, 2);
    }

    #[test]
    fn short_bundle_commits_nothing_on_failure() {
        let command = bundle_command();
        let tokens = ["-a", "-abz"];
        let mut state = CommandState::new(&command);
        let mut cursor = TokenCursor::new(&tokens);

        let (_, token) = cursor.next().unwrap();
        let delta = parse_short(token, &command, &mut cursor).unwrap();
        state.register(delta).unwrap();
        assert_eq!(state.flag_count("all"), 1);

        // `a` and `b` are known, `z` is not: the cluster fails as a whole.
        let (_, token) = cursor.next().unwrap();
        let err = parse_short(token, &command, &mut cursor).unwrap_err();
        assert_eq!(err.code, ErrorCode::UnknownParameter);
        assert_eq!(state.flag_count("all"), 1);
        assert_eq!(state.flag_count("brief"), 0);
        assert_eq!(
            state.parsed.parameters,
            vec![Parameter::Flag {
                name: "all",
                occurrences: 1
            }]
        );

        // Without the bad member the whole cluster lands at once.
        let tokens = ["-ab"];
        let mut cursor = TokenCursor::new(&tokens);
        let (_, token) = cursor.next().unwrap();
        let delta = parse_short(token, &command, &mut cursor).unwrap();
        state.register(delta).unwrap();
        assert_eq!(state.flag_count("all"), 2);
        assert_eq!(state.flag_count("brief"), 1);
    }

    #[test]
    fn malformed_short_option_is_bad_string() {
        let parser = Parser::builder().global_command(bundle_command()).build();
        let tokens: [&[u8]; 3] = [b"prog", b"-a", &[b'-', b'a', 0xc3]];
        let err = err_of(parser.parse(&tokens));
        assert_eq!(err.kind, ErrorType::Flag);
        assert_eq!(err.code, ErrorCode::BadString);
        assert_eq!(err.position, 2);

        let tokens: [&[u8]; 2] = [b"prog", &[b'-', 0xff]];
        let err = err_of(parser.parse(&tokens));
        assert_eq!(err.code, ErrorCode::BadString);
        assert_eq!(err.position, 1);
    }

    #[test]
    fn malformed_value_is_bad_string_at_value_token() {
        let parser = example_parser();
        let tokens: [&[u8]; 4] = [b"prog", b"build", b"-o", &[0xfe]];
        let err = err_of(parser.parse(&tokens));
        assert_eq!(err.kind, ErrorType::Argument);
        assert_eq!(err.code, ErrorCode::BadString);
        assert_eq!(err.argument, "out");
        assert_eq!(err.position, 3);
    }

    #[test]
    fn triple_dash_is_a_syntax_error_at_its_position() {
        let parser = example_parser();
        let cases: [&[&str]; 4] = [
            &["prog", "build", "---x"],
            &["prog", "build", "--out=a", "---x"],
            &["prog", "build", "-v", "--out=a", "---x", "-v"],
            &["prog", "build", "---"],
        ];
        for tokens in cases {
            let err = err_of(parser.parse(tokens));
            let expected = tokens.iter().position(|t| t.starts_with("---")).unwrap();
            assert_eq!(err.kind, ErrorType::None);
            assert_eq!(err.code, ErrorCode::SyntaxError);
            assert_eq!(err.position, expected, "tokens: {tokens:?}");
        }
    }

    #[test]
    fn required_argument_satisfied_by_long_or_short_form() {
        let parser = example_parser();
        let long = parser.parse(&["prog", "build", "--out=bin"]).unwrap();
        let short = parser.parse(&["prog", "build", "-o", "bin"]).unwrap();
        assert_eq!(long.command.parameters, short.command.parameters);
    }

    #[test]
    fn long_forms_round_trip_every_declared_parameter() {
        let command = Command::new("deploy")
            .flag(Flag::new("dry-run"))
            .flag(Flag::new("force").shortname('f'))
            .argument(Argument::new("region"))
            .argument(Argument::new("tag").shortname('t'))
            .argument(Argument::new("replicas"));
        let parser = Parser::builder().command(command.clone()).build();

        let mut tokens = vec!["prog".to_string(), "deploy".to_string()];
        for flag in &command.flags {
            tokens.push(format!("--{}", flag.longname));
        }
        for argument in &command.arguments {
            tokens.push(format!("--{}=first", argument.longname));
            tokens.push(format!("--{}=v-{}", argument.longname, argument.longname));
        }

        let parsed = parser.parse(&tokens).unwrap();
        let mut names: Vec<&str> = parsed.command.parameters.iter().map(|p| p.name()).collect();
        names.sort_unstable();
        let mut declared: Vec<&str> = command
            .flags
            .iter()
            .map(|f| f.longname.as_str())
            .chain(command.arguments.iter().map(|a| a.longname.as_str()))
            .collect();
        declared.sort_unstable();
        assert_eq!(names, declared);

        for argument in &command.arguments {
            let expected = format!("v-{}", argument.longname);
            assert_eq!(parsed.command.get(&argument.longname), Some(expected.as_str()));
        }
    }

    #[test]
    fn validator_rejection_is_an_error() {
        let parser = Parser::builder()
            .global_command(
                Command::new("main")
                    .argument(
                        Argument::new("jobs")
                            .shortname('j')
                            .validator(|v| v.parse::<u32>().is_ok()),
                    ),
            )
            .build();
        assert_eq!(
            parser.parse(&["prog", "-j", "4"]).unwrap().command.get("jobs"),
            Some("4")
        );

        let err = err_of(parser.parse(&["prog", "-j", "many"]));
        assert_eq!(err.code, ErrorCode::InvalidValue);
        assert_eq!(err.argument, "jobs");
        assert_eq!(err.value.as_deref(), Some("many"));
        assert_eq!(err.position, 2);

        let err = err_of(parser.parse(&["prog", "--jobs=x"]));
        assert_eq!(err.code, ErrorCode::InvalidValue);
        assert_eq!(err.position, 1);
    }

    #[test]
    fn occurrence_bounds_are_enforced() {
        let parser = Parser::builder()
            .global_command(
                Command::new("main")
                    .flag(Flag::new("verbose").shortname('v').max(2))
                    .flag(Flag::new("yes").shortname('y').min(1))
                    .argument(Argument::new("tag").shortname('t').max(1)),
            )
            .build();

        let parsed = parser.parse(&["prog", "-y", "-vv"]).unwrap();
        assert_eq!(parsed.command.occurrences("verbose"), 2);

        let err = err_of(parser.parse(&["prog", "-y", "-v", "-vv"]));
        assert_eq!(err.kind, ErrorType::Flag);
        assert_eq!(err.code, ErrorCode::OutOfBound);
        assert_eq!(err.position, 3);

        let err = err_of(parser.parse(&["prog", "-y", "-t", "a", "--tag=b"]));
        assert_eq!(err.kind, ErrorType::Argument);
        assert_eq!(err.code, ErrorCode::OutOfBound);
        assert_eq!(err.position, 4);

        let err = err_of(parser.parse(&["prog", "-v"]));
        assert_eq!(err.kind, ErrorType::Flag);
        assert_eq!(err.code, ErrorCode::OutOfBound);
        assert_eq!(err.argument, "yes");
    }

    #[test]
    fn repeated_argument_keeps_latest_value() {
        let parser = example_parser();
        let parsed = parser
            .parse(&["prog", "build", "--out=a", "-v", "-o", "b", "--out=c"])
            .unwrap();
        assert_eq!(
            parsed.command.parameters,
            vec![
                Parameter::Argument {
                    name: "out",
                    value: "c"
                },
                Parameter::Flag {
                    name: "verbose",
                    occurrences: 1
                },
            ]
        );
    }

    #[test]
    fn positional_inputs_fill_arguments_in_order() {
        let parser = Parser::builder()
            .command(
                Command::new("cp")
                    .argument(Argument::new("src").max(1))
                    .argument(Argument::new("dst").max(1)),
            )
            .build();
        let parsed = parser.parse(&["prog", "cp", "a.txt", "b.txt"]).unwrap();
        assert_eq!(parsed.command.get("src"), Some("a.txt"));
        assert_eq!(parsed.command.get("dst"), Some("b.txt"));

        let err = err_of(parser.parse(&["prog", "cp", "a", "b", "c"]));
        assert_eq!(err.code, ErrorCode::OutOfBound);
        assert_eq!(err.argument, "dst");
        assert_eq!(err.value.as_deref(), Some("c"));
        assert_eq!(err.position, 4);
    }

    #[test]
    fn positional_input_without_arguments_is_unknown() {
        let parser = Parser::builder()
            .command(Command::new("clean").flag(Flag::new("all")))
            .build();
        let err = err_of(parser.parse(&["prog", "clean", "--all", "stray"]));
        assert_eq!(err.code, ErrorCode::UnknownParameter);
        assert_eq!(err.argument, "stray");
        assert_eq!(err.position, 3);
    }

    #[test]
    fn bare_dashes_are_options_not_separators() {
        let parser = Parser::builder()
            .global_command(
                Command::new("run")
                    .flag(Flag::new("verbose").shortname('v'))
                    .argument(Argument::new("args")),
            )
            .build();

        let err = err_of(parser.parse(&["prog", "--", "---x"]));
        assert_eq!(err.kind, ErrorType::Argument);
        assert_eq!(err.code, ErrorCode::UnknownParameter);
        assert_eq!(err.argument, "");
        assert_eq!(err.position, 1);

        // `---x` is rejected at its own position whatever precedes it.
        let err = err_of(parser.parse(&["prog", "-v", "---x"]));
        assert_eq!(err.code, ErrorCode::SyntaxError);
        assert_eq!(err.position, 2);
        let err = err_of(parser.parse(&["prog", "-v", "x", "---x", "--"]));
        assert_eq!(err.code, ErrorCode::SyntaxError);
        assert_eq!(err.position, 3);

        let err = err_of(parser.parse(&["prog", "--"]));
        assert_eq!(err.code, ErrorCode::UnknownParameter);
        assert_eq!(err.position, 1);

        let err = err_of(parser.parse(&["prog", "-v", "-"]));
        assert_eq!(err.kind, ErrorType::Flag);
        assert_eq!(err.code, ErrorCode::BadString);
        assert_eq!(err.position, 2);
    }

    #[test]
    fn first_declaration_wins_on_collisions() {
        let parser = Parser::builder()
            .global_command(
                Command::new("main")
                    .flag(Flag::new("dup").shortname('d'))
                    .flag(Flag::new("other").shortname('d'))
                    .argument(Argument::new("dup")),
            )
            .build();
        let parsed = parser.parse(&["prog", "-d", "--dup"]).unwrap();
        assert_eq!(parsed.command.occurrences("dup"), 2);
        assert_eq!(parsed.command.occurrences("other"), 0);
    }

    #[test]
    fn default_bounds_are_unbounded() {
        assert_eq!(Bounds::default(), Bounds::new(0, Bounds::UNBOUNDED));
        assert!(Bounds::default().accepts(u32::MAX));
    }

    #[test]
    fn parser_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Parser>();

        let parser = example_parser();
        std::thread::scope(|s| {
            for i in 0..4 {
                let parser = &parser;
                s.spawn(move || {
                    let out = format!("--out={i}");
                    let tokens = ["prog", "build", out.as_str()];
                    let parsed = parser.parse(&tokens).unwrap();
                    assert_eq!(parsed.command.get("out"), Some(i.to_string().as_str()));
                });
            }
        });
    }

    #[test]
    fn parsed_args_serialize_with_tagged_parameters() {
        let parser = example_parser();
        let tokens = ["prog", "build", "-v", "--out=bin"];
        let parsed = parser.parse(&tokens).unwrap();
        let json = serde_json::to_value(&parsed).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "program": "prog",
                "command": {
                    "name": "build",
                    "parameters": [
                        { "kind": "Flag", "name": "verbose", "occurrences": 1 },
                        { "kind": "Argument", "name": "out", "value": "bin" },
                    ],
                },
                "parameters": [],
            })
        );
    }
}
