//! Typed command-line flags, subcommand trees and an environment-aware
//! parser.
//!
//! The pieces, bottom up:
//!
//! - [`Registry`]: a thread-safe store addressed by a long and/or a short
//!   name, both resolving to one stable [`EntryId`].
//! - [`Flag`] / [`FlagCore`]: typed flags ([`IntFlag`], [`EnumFlag`],
//!   [`StringSliceFlag`], [`MapFlag`], ...) that validate before they commit.
//! - [`Command`]: a node owning a [`FlagSet`], positional arguments and
//!   children, attached with cycle detection.
//! - [`Parser`]: environment overlay, token parsing, argument capture and
//!   subcommand dispatch, followed by [`validate_command`] on every command
//!   reached.
//! - [`CommandDef`]: the same tree described as serde data.
//!
//! # Example
//!
//! ```
//! use flagtree_core::*;
//!
//! let app = Command::new("app", "", "example tool");
//! let verbose = app.add_flag(BoolFlag::new("verbose", "v", false, "chatty output").unwrap()).unwrap();
//!
//! let run = Command::new("run", "r", "run a job");
//! let jobs = run
//!     .add_flag(UintFlag::new("jobs", "j", 1, "parallel jobs").unwrap().with_env("JOBS"))
//!     .unwrap();
//! app.add_subcommand(&run).unwrap();
//!
//! let parser = Parser::with_env(MapEnv::new().with("JOBS", "4"));
//! let outcome = parser.parse_and_validate(&app, &["-v", "run", "target"]).unwrap();
//!
//! assert!(verbose.get());
//! assert_eq!(jobs.get(), 4);
//! assert_eq!(outcome.active().name(), "run");
//! assert_eq!(outcome.args(), vec!["target"]);
//! ```

pub mod command;
pub mod definition;
pub mod env;
pub mod error;
pub mod flag;
pub mod flagset;
pub mod names;
pub mod parser;
pub mod registry;
pub mod snapshot;
pub mod validate;

pub use command::{
    BuiltinNames, Command, CommandConfig, HELP_LONG, HELP_SHORT, MAX_TREE_DEPTH, MutexGroup,
    RequiredGroup, VERSION_LONG, validate_subcommand,
};
pub use definition::{CommandDef, FlagDef, check_definition};
pub use env::{EnvSource, MapEnv, ProcessEnv};
pub use error::{EnvValueError, Error, ErrorCode, Result};
pub use flag::{
    BaseFlag, BoolFlag, BoolSliceFlag, DurationFlag, DurationSliceFlag, EnumFlag, Flag, FlagCore,
    FlagKind, FlagValue, FloatFlag, FloatSliceFlag, IntFlag, IntSliceFlag, MapFlag, Scalar,
    ScalarFlag, SliceFlag, StringFlag, StringSliceFlag, UintFlag, UintSliceFlag, Validator,
    format_duration, parse_duration,
};
pub use flagset::FlagSet;
pub use names::{validate_command_names, validate_flag_names};
pub use parser::{ParseOptions, ParseOutcome, Parser};
pub use registry::{EntryId, Registry};
pub use snapshot::{CommandSnapshot, CompletionGenerator, FlagSnapshot, HelpRenderer, PlainHelp};
pub use validate::{
    revalidate_enums, validate_command, validate_mutex_groups, validate_required_groups,
    validate_tree,
};
