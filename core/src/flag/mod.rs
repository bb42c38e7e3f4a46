//! Typed flags.
//!
//! Every concrete kind owns a [`BaseFlag`] and implements [`FlagCore`]:
//! a pure string-to-value conversion plus an optional domain check. The
//! blanket [`Flag`] impl turns that into the object-safe interface the
//! registry, parser and validator work with, so a kind's `set_str` is always
//! "parse, check, hand the value to the base for commit".
//!
//! # Examples
//!
//! ```
//! use flagtree_core::{Flag, FlagCore, IntFlag};
//!
//! let port = IntFlag::new("port", "p", 8080, "listen port")
//!     .unwrap()
//!     .with_range(1, 65535);
//!
//! assert_eq!(port.get(), 8080);
//! port.set_str("9000").unwrap();
//! assert_eq!(port.get(), 9000);
//! assert!(port.set_str("70000").is_err());
//! assert_eq!(port.get(), 9000);
//!
//! port.reset();
//! assert!(!port.is_set());
//! ```

mod base;
mod collection;
mod enumeration;
mod scalar;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

pub use base::{BaseFlag, FlagValue, Validator};
pub use collection::{
    BoolSliceFlag, DurationSliceFlag, FloatSliceFlag, IntSliceFlag, MapFlag, SliceFlag,
    StringSliceFlag, UintSliceFlag,
};
pub use enumeration::EnumFlag;
pub use scalar::{
    BoolFlag, DurationFlag, FloatFlag, IntFlag, Scalar, ScalarFlag, StringFlag, UintFlag,
    format_duration, parse_duration,
};

/// Declared kind of a flag, used by snapshots and definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagKind {
    Bool,
    Int,
    Uint,
    Float,
    String,
    Duration,
    Enum,
    BoolSlice,
    IntSlice,
    UintSlice,
    FloatSlice,
    StringSlice,
    DurationSlice,
    StringMap,
}

impl FlagKind {
    /// Short type label for help output (`int`, `strings`, ...).
    pub fn label(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Uint => "uint",
            Self::Float => "float",
            Self::String => "string",
            Self::Duration => "duration",
            Self::Enum => "enum",
            Self::BoolSlice => "bools",
            Self::IntSlice => "ints",
            Self::UintSlice => "uints",
            Self::FloatSlice => "floats",
            Self::StringSlice => "strings",
            Self::DurationSlice => "durations",
            Self::StringMap => "map",
        }
    }
}

impl fmt::Display for FlagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Typed side of a flag kind.
///
/// Implementors provide the conversion and domain rules; the provided
/// methods route typed reads and writes through the owned [`BaseFlag`].
pub trait FlagCore {
    type Value: FlagValue;

    const KIND: FlagKind;

    /// Whether the current value is checked again after parsing.
    const RECHECK: bool = false;

    fn base(&self) -> &BaseFlag<Self::Value>;

    /// Converts raw input. Must not touch flag state.
    fn parse_value(&self, raw: &str) -> std::result::Result<Self::Value, String>;

    fn render(&self, value: &Self::Value) -> String;

    fn value_to_json(&self, value: &Self::Value) -> Value;

    /// Domain rule applied before every commit (range, membership).
    fn check_value(&self, _value: &Self::Value) -> std::result::Result<(), String> {
        Ok(())
    }

    /// Values offered to completion generators.
    fn allowed(&self) -> Vec<String> {
        Vec::new()
    }

    /// Attaches names and usage. See [`BaseFlag::init`].
    fn init(&self, long: &str, short: &str, usage: &str) -> Result<()> {
        self.base().init(long, short, usage)
    }

    fn get(&self) -> Self::Value {
        self.base().get()
    }

    fn default_value(&self) -> Self::Value {
        self.base().default_value()
    }

    /// Stores `value` after the domain check and validator accept it.
    fn set(&self, value: Self::Value) -> Result<()> {
        let base = self.base();
        self.check_value(&value)
            .map_err(|reason| Error::validation(base.display_name(), self.render(&value), reason))?;
        base.commit(value, |v| self.render(v))
    }

    fn set_validator<F>(&self, validator: F)
    where
        F: Fn(&Self::Value) -> std::result::Result<(), String> + Send + Sync + 'static,
        Self: Sized,
    {
        self.base().set_validator(Arc::new(validator));
    }
}

/// Object-safe flag interface used by registries, parsers and validators.
pub trait Flag: Send + Sync + fmt::Debug {
    fn long_name(&self) -> &str;
    fn short_name(&self) -> &str;
    fn usage(&self) -> &str;
    fn kind(&self) -> FlagKind;

    /// Long name when present, otherwise the short name.
    fn name(&self) -> &str;

    /// Parses `raw` and commits it. Malformed input leaves state unchanged.
    fn set_str(&self, raw: &str) -> Result<()>;
    fn is_set(&self) -> bool;
    fn reset(&self);

    fn value_string(&self) -> String;
    fn default_string(&self) -> String;
    fn value_json(&self) -> Value;

    fn bind_env(&self, name: &str);
    fn env_var(&self) -> Option<String>;

    /// Checks the current value, including defaults and values that never
    /// went through `set_str`. A no-op for kinds without re-check.
    fn revalidate(&self) -> Result<()>;

    fn choices(&self) -> Vec<String>;

    fn is_bool(&self) -> bool {
        self.kind() == FlagKind::Bool
    }
}

impl<F> Flag for F
where
    F: FlagCore + Send + Sync + fmt::Debug,
{
    fn long_name(&self) -> &str {
        self.base().long_name()
    }

    fn short_name(&self) -> &str {
        self.base().short_name()
    }

    fn usage(&self) -> &str {
        self.base().usage()
    }

    fn kind(&self) -> FlagKind {
        F::KIND
    }

    fn name(&self) -> &str {
        self.base().display_name()
    }

    fn set_str(&self, raw: &str) -> Result<()> {
        let base = self.base();
        let value = self
            .parse_value(raw)
            .and_then(|v| self.check_value(&v).map(|()| v))
            .map_err(|reason| Error::validation(base.display_name(), raw, reason))?;
        base.commit(value, |_| raw.to_string())
    }

    fn is_set(&self) -> bool {
        self.base().is_set()
    }

    fn reset(&self) {
        self.base().reset();
    }

    fn value_string(&self) -> String {
        self.base().with_current(|v| self.render(v))
    }

    fn default_string(&self) -> String {
        self.base().with_default(|v| self.render(v))
    }

    fn value_json(&self) -> Value {
        self.base().with_current(|v| self.value_to_json(v))
    }

    fn bind_env(&self, name: &str) {
        self.base().bind_env(name);
    }

    fn env_var(&self) -> Option<String> {
        self.base().env_var()
    }

    fn revalidate(&self) -> Result<()> {
        if !F::RECHECK {
            return Ok(());
        }
        let value = self.base().get();
        self.check_value(&value).map_err(|reason| {
            Error::validation(self.base().display_name(), self.render(&value), reason)
        })
    }

    fn choices(&self) -> Vec<String> {
        self.allowed()
    }
}
