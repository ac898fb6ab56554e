mod schema_file;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use cmdparse::GlobalCommand;
use serde::Serialize;
use std::{
    ffi::OsString,
    fs,
    path::PathBuf,
};
use tracing_subscriber::{EnvFilter, fmt};

use crate::schema_file::{load_schema, write_default_schema};

#[derive(Parser)]
#[command(name = "cmdparse")]
#[command(version, about = "Parse command lines against a declarative JSON schema", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter cmdparse.json
    Init(InitArgs),

    /// Validate a schema and report colliding declarations
    Check(CheckArgs),

    /// Parse a command line and print the result as JSON
    Parse(ParseArgs),
}

#[derive(Parser)]
struct InitArgs {
    /// Project directory (default: current directory)
    #[arg(value_name = "DIR")]
    dir: Option<PathBuf>,

    /// Replace an existing cmdparse.json
    #[arg(long)]
    force: bool,
}

#[derive(Parser)]
struct CheckArgs {
    /// Path to the schema
    #[arg(short, long, default_value = "cmdparse.json", value_name = "FILE")]
    schema: PathBuf,

    /// Fail when the schema has warnings
    #[arg(long)]
    strict: bool,
}

#[derive(Parser)]
struct ParseArgs {
    /// Path to the schema
    #[arg(short, long, default_value = "cmdparse.json", value_name = "FILE")]
    schema: PathBuf,

    /// Pretty-print the JSON output
    #[arg(long)]
    pretty: bool,

    /// Command line to parse; the first token is the program name
    #[arg(last = true, required = true, value_name = "TOKENS")]
    tokens: Vec<OsString>,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Init(args) => init(args),
        Commands::Check(args) => check(args),
        Commands::Parse(args) => parse(args),
    }
}

fn init(args: InitArgs) -> Result<()> {
    let dir = args.dir.unwrap_or_else(|| PathBuf::from("."));

    fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create directory: {}", dir.display()))?;

    let (dest, written) = write_default_schema(&dir, args.force)?;
    if !written {
        bail!(
            "{} already exists (use --force to overwrite)",
            dest.display()
        );
    }

    eprintln!("Created: {}", dest.display());
    eprintln!("\nNext steps:");
    eprintln!("  1. Edit {} to describe your commands", dest.display());
    eprintln!("  2. Run: cmdparse check");
    eprintln!("  3. Run: cmdparse parse -- prog build --out=app");

    Ok(())
}

fn check(args: CheckArgs) -> Result<()> {
    tracing::debug!("executing check command");

    let schema = load_schema(&args.schema)?;
    let parser = schema
        .build()
        .with_context(|| format!("invalid schema: {}", args.schema.display()))?;

    let warnings = schema.warnings();
    for warning in &warnings {
        tracing::warn!("{warning}");
    }

    let global = match parser.global_command_ref() {
        None => "<none>".to_string(),
        Some(GlobalCommand::Inline(command)) => format!("{} (inline)", command.longname),
        Some(GlobalCommand::Named(name)) if parser.global_command().is_none() => {
            format!("{name} (unresolved)")
        }
        Some(GlobalCommand::Named(name)) => name.clone(),
    };
    println!(
        "{}: {} command(s), global command: {}",
        args.schema.display(),
        parser.commands().len(),
        global
    );

    if args.strict && !warnings.is_empty() {
        bail!("schema has {} warning(s)", warnings.len());
    }
    Ok(())
}

fn parse(args: ParseArgs) -> Result<()> {
    let schema = load_schema(&args.schema)?;
    let parser = schema
        .build()
        .with_context(|| format!("invalid schema: {}", args.schema.display()))?;

    let tokens: Vec<Vec<u8>> = args
        .tokens
        .into_iter()
        .map(OsString::into_encoded_bytes)
        .collect();
    tracing::debug!(tokens = tokens.len(), "parsing command line");

    match parser.parse(&tokens) {
        Ok(parsed) => print_json(&parsed, args.pretty),
        Err(err) => {
            print_json(&err, args.pretty)?;
            Err(anyhow::Error::new(err).context("command line rejected"))
        }
    }
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let out = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .context("failed to serialize output")?;
    println!("{out}");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}
