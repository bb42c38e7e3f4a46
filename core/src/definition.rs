//! Declarative command trees.
//!
//! A [`CommandDef`] describes a tree as data (JSON, YAML, anything serde
//! reads) and [`CommandDef::build`] turns it into live [`Command`]s through
//! the same constructors programmatic code uses, so it fails the same way.
//!
//! # Examples
//!
//! ```
//! use flagtree_core::{CommandDef, Flag, MapEnv, Parser};
//!
//! let def: CommandDef = serde_json::from_str(r#"{
//!     "name": "deploy",
//!     "flags": [
//!         {"name": "region", "short": "r", "kind": "enum", "choices": ["eu", "us"]},
//!         {"name": "replicas", "kind": "uint", "default": "2", "min": "1", "max": "10"}
//!     ],
//!     "subcommands": [{"name": "status", "short": "st"}]
//! }"#).unwrap();
//!
//! let root = def.build().unwrap();
//! let outcome = Parser::with_env(MapEnv::new())
//!     .parse_and_validate(&root, &["-r", "us", "st"])
//!     .unwrap();
//! assert_eq!(outcome.active().name(), "status");
//! assert_eq!(root.flag("region").unwrap().value_string(), "us");
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::command::{Command, CommandConfig, MutexGroup, RequiredGroup};
use crate::error::{Error, Result};
use crate::flag::{EnumFlag, Flag, FlagCore, FlagKind, MapFlag, Scalar, ScalarFlag, SliceFlag};
use crate::validate::validate_tree;

/// One command node and everything below it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub short: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang_flag: Option<String>,
    /// Register `--help` (and `--version`, the language flag) after building.
    /// Only read on the root.
    #[serde(default)]
    pub builtins: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<FlagDef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mutex_groups: Vec<MutexGroup>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_groups: Vec<RequiredGroup>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subcommands: Vec<CommandDef>,
}

/// One flag.
///
/// `default`, `min` and `max` are written the way a user would type the
/// value on the command line and are parsed by the flag's own kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlagDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub short: String,
    pub kind: FlagKind,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub usage: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,
    /// Allowed values of an `enum` flag.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
    #[serde(default)]
    pub case_insensitive: bool,
    /// Item separator of slice and map kinds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<char>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<String>,
}

impl FlagDef {
    fn invalid(&self, value: &str, reason: impl Into<String>) -> Error {
        Error::validation(&self.name, value, reason)
    }

    fn parse_with<F: FlagCore>(&self, sample: &F, raw: &str) -> Result<F::Value> {
        sample
            .parse_value(raw)
            .map_err(|reason| self.invalid(raw, reason))
    }

    fn parse_default<F: FlagCore>(&self, sample: &F) -> Result<Option<F::Value>> {
        self.default
            .as_deref()
            .map(|raw| self.parse_with(sample, raw))
            .transpose()
    }

    /// Builds the flag this definition describes.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidName`] for bad names, [`Error::Validation`] for a
    /// default, bound or choice list the kind cannot accept.
    pub fn build(&self) -> Result<Arc<dyn Flag>> {
        if !self.choices.is_empty() && self.kind != FlagKind::Enum {
            return Err(self.invalid(
                &self.choices.join(","),
                format!("choices only apply to enum flags, not {}", self.kind),
            ));
        }

        let flag: Arc<dyn Flag> = match self.kind {
            FlagKind::Bool => self.scalar::<bool>()?,
            FlagKind::Int => self.scalar::<i64>()?,
            FlagKind::Uint => self.scalar::<u64>()?,
            FlagKind::Float => self.scalar::<f64>()?,
            FlagKind::String => self.scalar::<String>()?,
            FlagKind::Duration => self.scalar::<Duration>()?,
            FlagKind::Enum => self.enumeration()?,
            FlagKind::BoolSlice => self.slice::<bool>()?,
            FlagKind::IntSlice => self.slice::<i64>()?,
            FlagKind::UintSlice => self.slice::<u64>()?,
            FlagKind::FloatSlice => self.slice::<f64>()?,
            FlagKind::StringSlice => self.slice::<String>()?,
            FlagKind::DurationSlice => self.slice::<Duration>()?,
            FlagKind::StringMap => self.map()?,
        };
        if let Some(env) = &self.env {
            flag.bind_env(env);
        }
        Ok(flag)
    }

    fn scalar<T: Scalar + Default>(&self) -> Result<Arc<dyn Flag>> {
        let sample = ScalarFlag::<T>::uninit(T::default());
        let default = self.parse_default(&sample)?.unwrap_or_default();
        let mut flag = ScalarFlag::new(&self.name, &self.short, default, &self.usage)?;

        match (&self.min, &self.max) {
            (None, None) => {}
            (Some(min), Some(max)) => {
                let (lo, hi) = (self.parse_with(&sample, min)?, self.parse_with(&sample, max)?);
                if lo > hi {
                    return Err(self.invalid(
                        &format!("{min}..{max}"),
                        "min must not exceed max",
                    ));
                }
                flag = flag.with_range(lo, hi);
            }
            (Some(bound), None) | (None, Some(bound)) => {
                return Err(self.invalid(bound, "min and max must be given together"));
            }
        }
        Ok(Arc::new(flag))
    }

    fn enumeration(&self) -> Result<Arc<dyn Flag>> {
        let default = match (&self.default, self.choices.first()) {
            (Some(default), _) => default.as_str(),
            (None, Some(first)) => first.as_str(),
            (None, None) => "",
        };
        let mut flag = EnumFlag::new(
            &self.name,
            &self.short,
            default,
            self.choices.iter().cloned(),
            &self.usage,
        )?;
        if self.case_insensitive {
            flag = flag.case_insensitive();
        }
        Ok(Arc::new(flag))
    }

    fn slice<T: Scalar>(&self) -> Result<Arc<dyn Flag>> {
        let mut sample = SliceFlag::<T>::new(&self.name, &self.short, Vec::new(), &self.usage)?;
        if let Some(delimiter) = self.delimiter {
            sample = sample.with_delimiter(delimiter);
        }
        match self.parse_default(&sample)? {
            None => Ok(Arc::new(sample)),
            Some(default) => {
                let mut flag = SliceFlag::new(&self.name, &self.short, default, &self.usage)?;
                if let Some(delimiter) = self.delimiter {
                    flag = flag.with_delimiter(delimiter);
                }
                Ok(Arc::new(flag))
            }
        }
    }

    fn map(&self) -> Result<Arc<dyn Flag>> {
        let mut sample = MapFlag::new(&self.name, &self.short, BTreeMap::new(), &self.usage)?;
        if let Some(delimiter) = self.delimiter {
            sample = sample.with_delimiter(delimiter);
        }
        match self.parse_default(&sample)? {
            None => Ok(Arc::new(sample)),
            Some(default) => {
                let mut flag = MapFlag::new(&self.name, &self.short, default, &self.usage)?;
                if let Some(delimiter) = self.delimiter {
                    flag = flag.with_delimiter(delimiter);
                }
                Ok(Arc::new(flag))
            }
        }
    }
}

impl CommandDef {
    /// Builds the live tree.
    ///
    /// Flags of one command are registered together and children of one
    /// command are attached together, so a name collision leaves that level
    /// empty rather than half-built.
    pub fn build(&self) -> Result<Arc<Command>> {
        let root = self.build_node()?;
        if self.builtins {
            root.add_builtin_flags()?;
        }
        Ok(root)
    }

    fn build_node(&self) -> Result<Arc<Command>> {
        let command = Command::try_new(&self.name, &self.short, &self.description)?;
        command.set_config(CommandConfig {
            version: self.version.clone(),
            mutex_groups: self.mutex_groups.clone(),
            required_groups: self.required_groups.clone(),
            lang_flag: self.lang_flag.clone(),
            env_prefix: self.env_prefix.clone(),
        });

        let flags = self
            .flags
            .iter()
            .map(FlagDef::build)
            .collect::<Result<Vec<_>>>()?;
        command.flags().add_all(flags)?;

        let children = self
            .subcommands
            .iter()
            .map(CommandDef::build_node)
            .collect::<Result<Vec<_>>>()?;
        command.add_subcommands(&children)?;

        debug!(
            command = %self.name,
            flags = self.flags.len(),
            subcommands = children.len(),
            "built command from definition"
        );
        Ok(command)
    }
}

/// Builds `def` and checks every group member across the tree, returning the
/// first problem.
pub fn check_definition(def: &CommandDef) -> Result<Arc<Command>> {
    let root = def.build()?;
    match validate_tree(&root).into_iter().next() {
        Some(err) => Err(err),
        None => Ok(root),
    }
}
