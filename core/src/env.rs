//! Environment variable sources for the parser's overlay step.

use std::collections::HashMap;

/// Read-only view of environment variables.
pub trait EnvSource: Send + Sync {
    /// Returns the value of `name`, or `None` when unset or not valid UTF-8.
    fn var(&self, name: &str) -> Option<String>;
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// In-memory environment, for tests and for hosts that assemble their own.
#[derive(Debug, Clone, Default)]
pub struct MapEnv {
    vars: HashMap<String, String>,
}

impl MapEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MapEnv {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl EnvSource for MapEnv {
    fn var(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }
}

/// Looks `name` up with an optional prefix, treating empty values as absent.
pub(crate) fn lookup(source: &dyn EnvSource, prefix: Option<&str>, name: &str) -> Option<String> {
    let key = match prefix {
        Some(prefix) => format!("{prefix}{name}"),
        None => name.to_string(),
    };
    source.var(&key).filter(|value| !value.is_empty())
}
