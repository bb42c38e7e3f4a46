//! Parsing a token list against a command tree.
//!
//! For each command on the routed path, in order:
//!
//! 1. **Environment overlay**: every unset flag with a bound variable that
//!    is present and non-empty is set from it. Failures are collected and
//!    reported together as [`Error::EnvOverlay`].
//! 2. **Token parsing**: the command's [`FlagSet`](crate::FlagSet) consumes
//!    flag tokens; the first failure aborts.
//! 3. **Argument capture**: the remaining tokens are appended to the
//!    command's positional arguments.
//! 4. **Subcommand dispatch**: when routing is enabled and the first
//!    remaining token names a child, parsing continues in that child with the
//!    tokens after it. An unknown first token is left as a positional
//!    argument rather than reported.
//!
//! Because the overlay runs before token parsing and every `set` overwrites,
//! a command-line value beats an environment value, which beats the default.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::command::{Command, HELP_LONG, MAX_TREE_DEPTH, VERSION_LONG};
use crate::env::{self, EnvSource, ProcessEnv};
use crate::error::{EnvValueError, Error, Result};
use crate::validate::validate_command;

/// Parser behavior switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Dispatch into subcommands named by the first positional token.
    pub route_subcommands: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            route_subcommands: true,
        }
    }
}

/// Result of a successful parse.
#[derive(Debug, Clone)]
pub struct ParseOutcome {
    path: Vec<Arc<Command>>,
}

impl ParseOutcome {
    /// Commands visited, root first.
    pub fn path(&self) -> &[Arc<Command>] {
        &self.path
    }

    /// The deepest command reached.
    pub fn active(&self) -> &Arc<Command> {
        // path always holds at least the root
        &self.path[self.path.len() - 1]
    }

    /// Positional arguments left on the deepest command.
    pub fn args(&self) -> Vec<String> {
        self.active().args()
    }

    /// Whether the builtin `--help` was set anywhere on the path.
    pub fn help_requested(&self) -> bool {
        self.path.iter().any(|command| command.builtin_set(HELP_LONG))
    }

    /// Whether the builtin `--version` was set.
    pub fn version_requested(&self) -> bool {
        self.path.iter().any(|command| command.builtin_set(VERSION_LONG))
    }
}

/// Parses token lists, reading bound environment variables from `E`.
#[derive(Debug, Clone)]
pub struct Parser<E = ProcessEnv> {
    env: E,
    options: ParseOptions,
}

impl Default for Parser<ProcessEnv> {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser<ProcessEnv> {
    /// A parser reading the process environment.
    pub fn new() -> Self {
        Self {
            env: ProcessEnv,
            options: ParseOptions::default(),
        }
    }
}

impl<E: EnvSource> Parser<E> {
    /// A parser reading variables from `env`.
    pub fn with_env(env: E) -> Self {
        Self {
            env,
            options: ParseOptions::default(),
        }
    }

    pub fn options(mut self, options: ParseOptions) -> Self {
        self.options = options;
        self
    }

    /// Parses `tokens` starting at `root`.
    ///
    /// # Errors
    ///
    /// [`Error::EnvOverlay`] when bound environment values are rejected,
    /// [`Error::Parse`] when the token list is malformed.
    pub fn parse<S: AsRef<str>>(&self, root: &Arc<Command>, tokens: &[S]) -> Result<ParseOutcome> {
        let tokens: Vec<String> = tokens.iter().map(|t| t.as_ref().to_string()).collect();
        let mut path = Vec::new();
        self.parse_command(root, &tokens, &mut path)?;
        Ok(ParseOutcome { path })
    }

    /// Parses, then validates every command on the routed path.
    ///
    /// Validation is skipped when `--help` or `--version` was requested, so
    /// those work even when required flags are missing.
    pub fn parse_and_validate<S: AsRef<str>>(
        &self,
        root: &Arc<Command>,
        tokens: &[S],
    ) -> Result<ParseOutcome> {
        let outcome = self.parse(root, tokens)?;
        if outcome.help_requested() || outcome.version_requested() {
            debug!("help or version requested, skipping validation");
            return Ok(outcome);
        }
        for command in outcome.path() {
            validate_command(command)?;
        }
        Ok(outcome)
    }

    fn parse_command(
        &self,
        command: &Arc<Command>,
        tokens: &[String],
        path: &mut Vec<Arc<Command>>,
    ) -> Result<()> {
        if path.len() >= MAX_TREE_DEPTH {
            return Err(Error::parse(
                command.path(),
                "subcommand nesting exceeds the depth limit",
            ));
        }
        path.push(Arc::clone(command));

        self.apply_env(command)?;

        let rest = command.flags().parse_tokens(tokens)?;
        trace!(command = %command.path(), remaining = rest.len(), "tokens parsed");
        command.record_args(rest.clone());

        if !self.options.route_subcommands || !command.has_subcommands() {
            return Ok(());
        }
        let Some(first) = rest.first() else {
            return Ok(());
        };
        match command.subcommand(first) {
            Some(child) => {
                debug!(parent = %command.path(), subcommand = child.name(), "dispatching");
                self.parse_command(&child, &rest[1..], path)
            }
            None => {
                trace!(token = %first, "no subcommand matched, keeping as argument");
                Ok(())
            }
        }
    }

    /// Fills unset flags of `command` from their bound environment variables.
    pub fn apply_env(&self, command: &Command) -> Result<()> {
        let prefix = command.env_prefix();
        let mut applied: HashSet<String> = HashSet::new();
        let mut errors = Vec::new();

        for flag in command.flags().list() {
            let Some(variable) = flag.env_var() else {
                continue;
            };
            if flag.is_set() {
                continue;
            }
            let Some(value) = env::lookup(&self.env, prefix.as_deref(), &variable) else {
                continue;
            };
            if !applied.insert(flag.name().to_string()) {
                continue;
            }
            let full_name = format!("{}{variable}", prefix.as_deref().unwrap_or(""));
            match flag.set_str(&value) {
                Ok(()) => trace!(flag = flag.name(), variable = %full_name, "applied from environment"),
                Err(err) => errors.push(EnvValueError {
                    flag: flag.name().to_string(),
                    variable: full_name,
                    source: Box::new(err),
                }),
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::EnvOverlay { errors })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::MapEnv;
    use crate::error::ErrorCode;
    use crate::flag::{BoolFlag, Flag, FlagCore, IntFlag, StringFlag};

    fn parser(env: MapEnv) -> Parser<MapEnv> {
        Parser::with_env(env)
    }

    #[test]
    fn test_command_line_beats_environment() {
        let root = Command::new("app", "", "");
        let x = root
            .add_flag(
                StringFlag::new("x", "", "default".into(), "")
                    .unwrap()
                    .with_env("FOO"),
            )
            .unwrap();

        parser(MapEnv::new().with("FOO", "env_value"))
            .parse(&root, &["--x", "cmd_value"])
            .unwrap();
        assert_eq!(x.get(), "cmd_value");
    }

    #[test]
    fn test_environment_beats_default() {
        let root = Command::new("app", "", "");
        let port = root
            .add_flag(IntFlag::new("port", "p", 80, "").unwrap().with_env("PORT"))
            .unwrap();
        let host = root
            .add_flag(
                StringFlag::new("host", "", "localhost".into(), "")
                    .unwrap()
                    .with_env("HOST"),
            )
            .unwrap();

        let env = MapEnv::new().with("PORT", "8080").with("HOST", "");
        parser(env).parse(&root, &[] as &[&str]).unwrap();
        assert_eq!(port.get(), 8080);
        assert!(port.is_set());
        assert_eq!(host.get(), "localhost");
        assert!(!host.is_set());
    }

    #[test]
    fn test_env_prefix_from_root() {
        let root = Command::new("app", "", "");
        root.set_env_prefix("APP_");
        let serve = Command::new("serve", "", "");
        root.add_subcommand(&serve).unwrap();
        let port = serve
            .add_flag(IntFlag::new("port", "", 80, "").unwrap().with_env("PORT"))
            .unwrap();

        let env = MapEnv::new().with("APP_PORT", "9000").with("PORT", "1");
        parser(env).parse(&root, &["serve"]).unwrap();
        assert_eq!(port.get(), 9000);
    }

    #[test]
    fn test_env_errors_are_aggregated() {
        let root = Command::new("app", "", "");
        root.add_flag(IntFlag::new("port", "", 80, "").unwrap().with_env("PORT"))
            .unwrap();
        root.add_flag(IntFlag::new("workers", "", 1, "").unwrap().with_env("WORKERS"))
            .unwrap();
        let name = root
            .add_flag(StringFlag::new("name", "", String::new(), "").unwrap().with_env("NAME"))
            .unwrap();

        let env = MapEnv::new()
            .with("PORT", "eighty")
            .with("WORKERS", "many")
            .with("NAME", "ok");
        let err = parser(env).parse(&root, &[] as &[&str]).unwrap_err();

        assert_eq!(err.code(), ErrorCode::EnvOverlay);
        let message = err.to_string();
        assert!(message.contains("port"), "{message}");
        assert!(message.contains("workers"), "{message}");
        match err {
            Error::EnvOverlay { errors } => assert_eq!(errors.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(name.get(), "ok");
    }

    #[test]
    fn test_env_skips_flags_already_set() {
        let root = Command::new("app", "", "");
        let level = root
            .add_flag(IntFlag::new("level", "l", 0, "").unwrap().with_env("LEVEL"))
            .unwrap();
        level.set(3).unwrap();

        parser(MapEnv::new().with("LEVEL", "not-a-number"))
            .parse(&root, &[] as &[&str])
            .unwrap();
        assert_eq!(level.get(), 3);
    }

    #[test]
    fn test_subcommand_routing() {
        let root = Command::new("app", "", "");
        let verbose = root
            .add_flag(BoolFlag::new("verbose", "v", false, "").unwrap())
            .unwrap();
        let run = Command::new("run", "r", "");
        let jobs = run.add_flag(IntFlag::new("jobs", "j", 1, "").unwrap()).unwrap();
        root.add_subcommand(&run).unwrap();

        let outcome = parser(MapEnv::new())
            .parse(&root, &["-v", "r", "-j", "4", "target"])
            .unwrap();

        assert!(verbose.get());
        assert_eq!(jobs.get(), 4);
        assert!(Arc::ptr_eq(outcome.active(), &run));
        assert_eq!(outcome.path().len(), 2);
        assert_eq!(outcome.args(), vec!["target"]);
        assert_eq!(root.args(), vec!["r", "-j", "4", "target"]);
        assert!(run.is_parsed());
    }

    #[test]
    fn test_unknown_first_token_is_an_argument() {
        let root = Command::new("app", "", "");
        root.add_subcommand(&Command::new("build", "", "")).unwrap();

        let outcome = parser(MapEnv::new())
            .parse(&root, &["biuld", "x"])
            .unwrap();
        assert!(Arc::ptr_eq(outcome.active(), &root));
        assert_eq!(outcome.args(), vec!["biuld", "x"]);
    }

    #[test]
    fn test_routing_can_be_disabled() {
        let root = Command::new("app", "", "");
        let build = Command::new("build", "", "");
        root.add_subcommand(&build).unwrap();

        let outcome = parser(MapEnv::new())
            .options(ParseOptions {
                route_subcommands: false,
            })
            .parse(&root, &["build"])
            .unwrap();
        assert!(Arc::ptr_eq(outcome.active(), &root));
        assert!(!build.is_parsed());
    }

    #[test]
    fn test_token_error_aborts() {
        let root = Command::new("app", "", "");
        let sub = Command::new("sub", "", "");
        root.add_subcommand(&sub).unwrap();

        let err = parser(MapEnv::new())
            .parse(&root, &["sub", "--nope"])
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ParseFailed);
        assert!(err.to_string().contains("sub"));
    }

    #[test]
    fn test_help_skips_validation() {
        let root = Command::new("app", "", "");
        root.add_flag(StringFlag::new("input", "i", String::new(), "").unwrap())
            .unwrap();
        root.add_required_group("io", &["input"]);
        root.add_builtin_flags().unwrap();

        let p = parser(MapEnv::new());
        let outcome = p.parse_and_validate(&root, &["--help"]).unwrap();
        assert!(outcome.help_requested());
        assert!(!outcome.version_requested());

        root.reset();
        let err = p.parse_and_validate(&root, &[] as &[&str]).unwrap_err();
        assert_eq!(err.code(), ErrorCode::RequiredGroupViolation);
    }

    #[test]
    fn test_user_help_flag_is_not_builtin() {
        let root = Command::new("app", "", "");
        let help = root
            .add_flag(BoolFlag::new("help", "", false, "").unwrap())
            .unwrap();
        let outcome = parser(MapEnv::new()).parse(&root, &["--help"]).unwrap();
        assert!(help.is_set());
        assert!(!outcome.help_requested());
    }

    #[test]
    fn test_user_flags_named_like_builtins_do_not_skip_validation() {
        let root = Command::new("app", "", "");
        root.set_version("1.0");

        let sub = Command::new("sub", "", "");
        sub.add_flag(BoolFlag::new("version", "", false, "").unwrap())
            .unwrap();
        sub.add_flag(StringFlag::new("input", "i", String::new(), "").unwrap())
            .unwrap();
        sub.add_required_group("io", &["input"]);

        let docs = Command::new("docs", "", "");
        docs.add_flag(StringFlag::new("help", "", String::new(), "topic").unwrap())
            .unwrap();
        docs.add_flag(StringFlag::new("input", "i", String::new(), "").unwrap())
            .unwrap();
        docs.add_required_group("io", &["input"]);

        root.add_subcommands(&[sub, docs]).unwrap();
        root.add_builtin_flags().unwrap();

        let p = parser(MapEnv::new());
        for tokens in [&["sub", "--version"][..], &["docs", "--help", "topic"][..]] {
            root.reset();
            let err = p.parse_and_validate(&root, tokens).unwrap_err();
            match err {
                Error::RequiredGroup { group, missing } => {
                    assert_eq!(group, "io");
                    assert_eq!(missing, vec!["input"]);
                }
                other => panic!("unexpected error for {tokens:?}: {other}"),
            }
        }

        // the real builtins still win
        root.reset();
        let outcome = p.parse_and_validate(&root, &["sub", "--help"]).unwrap();
        assert!(outcome.help_requested());
        root.reset();
        let outcome = p.parse_and_validate(&root, &["--version", "sub"]).unwrap();
        assert!(outcome.version_requested());
    }

    #[test]
    fn test_late_subcommand_help_skips_validation() {
        let root = Command::new("app", "", "");
        root.add_builtin_flags().unwrap();

        let late = Command::new("late", "", "");
        late.add_flag(StringFlag::new("input", "i", String::new(), "").unwrap())
            .unwrap();
        late.add_required_group("io", &["input"]);
        root.add_subcommand(&late).unwrap();

        let p = parser(MapEnv::new());
        let outcome = p.parse_and_validate(&root, &["late", "-h"]).unwrap();
        assert!(outcome.help_requested());
        assert_eq!(outcome.active().name(), "late");

        root.reset();
        let err = p.parse_and_validate(&root, &["late"]).unwrap_err();
        assert_eq!(err.code(), ErrorCode::RequiredGroupViolation);
    }

    #[test]
    fn test_mutex_conflict_from_tokens_names_each_flag_once() {
        let root = Command::new("app", "", "");
        root.add_flag(BoolFlag::new("run", "r", false, "").unwrap())
            .unwrap();
        root.add_flag(BoolFlag::new("parallel", "p", false, "").unwrap())
            .unwrap();
        root.add_mutex_group("mode", &["run", "parallel", "r", "p"], true);

        let p = parser(MapEnv::new());
        for tokens in [&["-r", "-p"][..], &["--run", "-p"][..], &["-rp"][..]] {
            root.reset();
            match p.parse_and_validate(&root, tokens).unwrap_err() {
                Error::MutexConflict { group, set } => {
                    assert_eq!(group, "mode");
                    assert_eq!(set, vec!["run", "parallel"], "tokens {tokens:?}");
                }
                other => panic!("unexpected error for {tokens:?}: {other}"),
            }
        }

        root.reset();
        assert!(p.parse_and_validate(&root, &["-r", "--run"]).is_ok());
    }

    #[test]
    fn test_required_group_from_tokens_reports_missing() {
        let root = Command::new("copy", "", "");
        root.add_flag(StringFlag::new("input", "i", String::new(), "").unwrap())
            .unwrap();
        root.add_flag(StringFlag::new("output", "o", String::new(), "").unwrap())
            .unwrap();
        root.add_required_group("io", &["input", "output"]);

        let p = parser(MapEnv::new());
        match p.parse_and_validate(&root, &["--input", "x"]).unwrap_err() {
            Error::RequiredGroup { group, missing } => {
                assert_eq!(group, "io");
                assert_eq!(missing, vec!["output"]);
            }
            other => panic!("unexpected error: {other}"),
        }

        root.reset();
        let outcome = p
            .parse_and_validate(&root, &["--input", "x", "-o=y", "rest"])
            .unwrap();
        assert_eq!(outcome.args(), vec!["rest"]);
    }
}
