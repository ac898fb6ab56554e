//! Declarative command-line parsing with positioned errors.
//!
//! A [`Parser`] is built once from [`Command`] declarations (each holding
//! [`Flag`]s and [`Argument`]s) and then classifies raw argv tokens into a
//! [`ParsedArgs`] or a [`ParseError`] that points at the offending token.
//!
//! ```
//! use cmdparse::{Argument, Command, Flag, Parser};
//!
//! let parser = Parser::builder()
//!     .command(
//!         Command::new("build")
//!             .flag(Flag::new("verbose").shortname('v'))
//!             .argument(Argument::new("out").shortname('o').required(true)),
//!     )
//!     .build();
//!
//! let parsed = parser.parse(&["prog", "build", "-v", "--out=bin"]).unwrap();
//! assert_eq!(parsed.command.name, "build");
//! assert_eq!(parsed.command.get("out"), Some("bin"));
//! assert_eq!(parsed.command.occurrences("verbose"), 1);
//! ```

pub mod config;
pub mod error;
pub mod parser;
pub mod result;
pub mod utf8;

pub use config::{Argument, Bounds, Command, Flag, GlobalCommand, Validator};
pub use error::{ErrorCode, ErrorType, ParseError};
pub use parser::{Parser, ParserBuilder};
pub use result::{Parameter, ParsedArgs, ParsedCommand};
