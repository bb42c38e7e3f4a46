//! Error types for registry, flag, parser and validation operations.
//!
//! Every public entry point in the crate returns [`Error`]. Each variant maps
//! to a stable [`ErrorCode`] so callers (and the CLI wiring layer) can branch
//! on the class of failure without matching message text.

use serde::Serialize;
use thiserror::Error;

/// Stable classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorCode {
    /// Empty or malformed name.
    InvalidName,
    /// A registry name is already taken.
    AlreadyExists,
    /// Lookup miss.
    NotFound,
    /// A flag was initialized twice.
    AlreadyInitialized,
    /// Validator, range, enum or format rejection.
    ValidationFailed,
    /// Token-grammar error.
    ParseFailed,
    /// Several environment values failed to apply.
    EnvOverlay,
    /// More than one (or, when required, none) of a mutex group is set.
    MutexGroupViolation,
    /// A required group has unset members.
    RequiredGroupViolation,
    /// A group references a flag name the command does not register.
    InvalidGroupMember,
    /// Attaching a subcommand would create a cycle.
    CyclicReference,
}

/// Errors produced by flagtree.
#[derive(Debug, Error)]
pub enum Error {
    /// Name is empty, both names are empty, or contains illegal characters.
    #[error("invalid name: {0}")]
    InvalidName(String),

    /// Name already maps to a registered item.
    #[error("name already registered: {0}")]
    AlreadyExists(String),

    /// Name does not map to any registered item.
    #[error("not found: {0}")]
    NotFound(String),

    /// `init` was called on a flag that already carries metadata.
    #[error("flag already initialized: {0}")]
    AlreadyInitialized(String),

    /// A candidate value was rejected before being committed.
    #[error("invalid value {value:?} for flag {flag}: {reason}")]
    Validation {
        flag: String,
        value: String,
        reason: String,
    },

    /// The token list could not be interpreted.
    #[error("{command}: {reason}")]
    Parse {
        command: String,
        reason: String,
        #[source]
        source: Option<Box<Error>>,
    },

    /// One or more environment values were rejected.
    #[error("environment overlay failed for {}: {}", flag_names(.errors), joined(.errors))]
    EnvOverlay { errors: Vec<EnvValueError> },

    /// More than one flag of a mutex group is set.
    #[error("mutually exclusive flags set in group {group}: {}", .set.join(", "))]
    MutexConflict { group: String, set: Vec<String> },

    /// No flag of a mutex group is set and the group does not allow that.
    #[error("one of the flags in group {group} must be set: {}", .members.join(", "))]
    MutexNoneSet { group: String, members: Vec<String> },

    /// Required flags are missing.
    #[error("required flags not set in group {group}: {}", .missing.join(", "))]
    RequiredGroup { group: String, missing: Vec<String> },

    /// A group lists a name that is not a registered flag.
    #[error("invalid flag name {name:?} in group {group}")]
    InvalidGroupMember { group: String, name: String },

    /// Attaching `child` under `parent` would make a command its own descendant.
    #[error("cyclic reference: {child} is {parent} or one of its ancestors")]
    CyclicReference { parent: String, child: String },
}

/// A single rejected environment value, kept inside [`Error::EnvOverlay`].
#[derive(Debug, Error)]
#[error("{variable} ({flag}): {source}")]
pub struct EnvValueError {
    pub flag: String,
    pub variable: String,
    #[source]
    pub source: Box<Error>,
}

fn flag_names(errors: &[EnvValueError]) -> String {
    errors
        .iter()
        .map(|e| e.flag.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn joined(errors: &[EnvValueError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// Returns the stable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidName(_) => ErrorCode::InvalidName,
            Self::AlreadyExists(_) => ErrorCode::AlreadyExists,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::AlreadyInitialized(_) => ErrorCode::AlreadyInitialized,
            Self::Validation { .. } => ErrorCode::ValidationFailed,
            Self::Parse { .. } => ErrorCode::ParseFailed,
            Self::EnvOverlay { .. } => ErrorCode::EnvOverlay,
            Self::MutexConflict { .. } | Self::MutexNoneSet { .. } => {
                ErrorCode::MutexGroupViolation
            }
            Self::RequiredGroup { .. } => ErrorCode::RequiredGroupViolation,
            Self::InvalidGroupMember { .. } => ErrorCode::InvalidGroupMember,
            Self::CyclicReference { .. } => ErrorCode::CyclicReference,
        }
    }

    pub(crate) fn validation(
        flag: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Validation {
            flag: flag.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn parse(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parse {
            command: command.into(),
            reason: reason.into(),
            source: None,
        }
    }
}

/// Convenience alias for results with [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
