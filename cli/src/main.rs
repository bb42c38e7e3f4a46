use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use flagtree_core::{
    Command, CommandDef, EnvSource, ErrorCode, MapEnv, ParseOutcome, PlainHelp, ProcessEnv,
    check_definition, validate_tree,
};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

/// CLI-specific output format enum with clap argument parsing support.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliOutputFormat {
    Json,
    Yaml,
}

#[derive(Debug, Parser)]
#[command(name = "flagtree", version, disable_help_subcommand = true)]
#[command(about = "Check, parse and inspect declarative command definitions")]
struct Cli {
    /// Log debug output to stderr (overrides RUST_LOG).
    #[arg(long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    /// Build a definition file and report whether it is sound.
    Check(CheckArgs),
    /// Parse a token list against a definition and print the result as JSON.
    Parse(ParseArgs),
    /// Dump the command tree of a definition.
    Tree(TreeArgs),
    /// Print plain-text help for a command of a definition.
    Help(HelpArgs),
}

#[derive(Debug, Args)]
struct CheckArgs {
    /// Definition file (JSON or YAML, `-` for stdin).
    file: PathBuf,
}

#[derive(Debug, Args)]
struct ParseArgs {
    /// Definition file (JSON or YAML, `-` for stdin).
    file: PathBuf,
    /// Ignore environment variables bound to flags.
    #[arg(long)]
    no_env: bool,
    /// Tokens to parse, written after `--`.
    #[arg(last = true, allow_hyphen_values = true)]
    tokens: Vec<String>,
}

#[derive(Debug, Args)]
struct TreeArgs {
    /// Definition file (JSON or YAML, `-` for stdin).
    file: PathBuf,
    /// Output format.
    #[arg(long, default_value = "json")]
    format: CliOutputFormat,
}

#[derive(Debug, Args)]
struct HelpArgs {
    /// Definition file (JSON or YAML, `-` for stdin).
    file: PathBuf,
    /// Subcommand names leading to the command to describe.
    path: Vec<String>,
}

/// A failure with the process exit code it maps to.
#[derive(Debug)]
struct CliError {
    message: String,
    code: i32,
}

impl CliError {
    /// Bad definitions, unreadable files and other setup failures.
    fn setup(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: 1,
        }
    }
}

impl From<flagtree_core::Error> for CliError {
    /// Errors caused by the parsed tokens exit with 2, everything else with 1.
    fn from(err: flagtree_core::Error) -> Self {
        let code = match err.code() {
            ErrorCode::ParseFailed
            | ErrorCode::ValidationFailed
            | ErrorCode::EnvOverlay
            | ErrorCode::MutexGroupViolation
            | ErrorCode::RequiredGroupViolation => 2,
            _ => 1,
        };
        Self {
            message: err.to_string(),
            code,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        CliCommand::Check(args) => run_check(args),
        CliCommand::Parse(args) => run_parse(args),
        CliCommand::Tree(args) => run_tree(args),
        CliCommand::Help(args) => run_help(args),
    };

    if let Err(err) = result {
        eprintln!("error: {}", err.message);
        std::process::exit(err.code);
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

fn read_source(path: &Path) -> Result<String, CliError> {
    if path == Path::new("-") {
        let mut raw = String::new();
        std::io::stdin()
            .read_to_string(&mut raw)
            .map_err(|e| CliError::setup(format!("failed to read stdin: {e}")))?;
        return Ok(raw);
    }
    fs::read_to_string(path)
        .map_err(|e| CliError::setup(format!("failed to read {}: {e}", path.display())))
}

/// Reads a definition, picking the format from the file extension. Stdin and
/// unknown extensions are read as YAML, which also accepts JSON.
fn load_definition(path: &Path) -> Result<CommandDef, CliError> {
    let raw = read_source(path)?;
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let def = if is_json {
        serde_json::from_str(&raw)
            .map_err(|e| CliError::setup(format!("invalid definition {}: {e}", path.display())))?
    } else {
        serde_yaml::from_str(&raw)
            .map_err(|e| CliError::setup(format!("invalid definition {}: {e}", path.display())))?
    };
    debug!(path = %path.display(), json = is_json, "loaded definition");
    Ok(def)
}

fn build(path: &Path) -> Result<Arc<Command>, CliError> {
    let def = load_definition(path)?;
    check_definition(&def).map_err(|e| CliError::setup(e.to_string()))
}

fn run_check(args: CheckArgs) -> Result<(), CliError> {
    let def = load_definition(&args.file)?;
    let root = def.build().map_err(|e| CliError::setup(e.to_string()))?;

    let problems = validate_tree(&root);
    if !problems.is_empty() {
        for problem in &problems {
            eprintln!("  {problem}");
        }
        return Err(CliError::setup(format!(
            "{} has {} problem(s)",
            args.file.display(),
            problems.len()
        )));
    }

    let snapshot = root.snapshot();
    let (commands, flags) = count_nodes(&snapshot);
    println!(
        "{}: OK ({commands} command(s), {flags} flag(s))",
        args.file.display()
    );
    Ok(())
}

fn count_nodes(node: &flagtree_core::CommandSnapshot) -> (usize, usize) {
    node.subcommands
        .iter()
        .map(count_nodes)
        .fold((1, node.flags.len()), |(c, f), (dc, df)| (c + dc, f + df))
}

fn run_parse(args: ParseArgs) -> Result<(), CliError> {
    let root = build(&args.file)?;
    info!(tokens = args.tokens.len(), no_env = args.no_env, "parsing");

    let outcome = if args.no_env {
        parse_with(MapEnv::new(), &root, &args.tokens)?
    } else {
        parse_with(ProcessEnv, &root, &args.tokens)?
    };

    if outcome.help_requested() {
        print!("{}", outcome.active().render_help(&PlainHelp));
        return Ok(());
    }
    if outcome.version_requested() {
        println!("{}", root.config().version.unwrap_or_default());
        return Ok(());
    }

    let report = ParseReport::from_outcome(&outcome);
    println!("{}", to_json(&report)?);
    Ok(())
}

fn parse_with<E: EnvSource>(
    env: E,
    root: &Arc<Command>,
    tokens: &[String],
) -> Result<ParseOutcome, CliError> {
    Ok(flagtree_core::Parser::with_env(env).parse_and_validate(root, tokens)?)
}

/// What `flagtree parse` prints.
#[derive(Debug, Serialize)]
struct ParseReport {
    /// Path of the deepest command reached.
    command: String,
    /// Positional arguments left on that command.
    args: Vec<String>,
    /// Values of the flags that were set, keyed by command path and flag name.
    flags: Map<String, Value>,
}

impl ParseReport {
    fn from_outcome(outcome: &ParseOutcome) -> Self {
        let mut flags = Map::new();
        for command in outcome.path() {
            let set: Map<String, Value> = command
                .flags()
                .list()
                .iter()
                .filter(|flag| flag.is_set())
                .map(|flag| (flag.name().to_string(), flag.value_json()))
                .collect();
            flags.insert(command.path(), Value::Object(set));
        }
        Self {
            command: outcome.active().path(),
            args: outcome.args(),
            flags,
        }
    }
}

fn run_tree(args: TreeArgs) -> Result<(), CliError> {
    let root = build(&args.file)?;
    let snapshot = root.snapshot();
    let rendered = match args.format {
        CliOutputFormat::Json => to_json(&snapshot)?,
        CliOutputFormat::Yaml => serde_yaml::to_string(&snapshot)
            .map_err(|e| CliError::setup(format!("YAML serialization failed: {e}")))?,
    };
    println!("{}", rendered.trim_end());
    Ok(())
}

fn run_help(args: HelpArgs) -> Result<(), CliError> {
    let root = build(&args.file)?;
    let mut command = root;
    for name in &args.path {
        command = command
            .subcommand(name)
            .ok_or_else(|| CliError::setup(format!("{} has no subcommand {name}", command.path())))?;
    }
    print!("{}", command.render_help(&PlainHelp));
    Ok(())
}

fn to_json<T: Serialize>(value: &T) -> Result<String, CliError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| CliError::setup(format!("JSON serialization failed: {e}")))
}
