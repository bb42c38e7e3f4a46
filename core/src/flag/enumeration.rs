use std::fmt;

use serde_json::Value;

use super::{BaseFlag, FlagCore, FlagKind};
use crate::error::{Error, Result};

/// String flag restricted to a fixed set of values.
///
/// Matching input is stored in its declared spelling, so with
/// case-insensitive matching `--format JSON` reads back as `json`.
pub struct EnumFlag {
    base: BaseFlag<String>,
    allowed: Vec<String>,
    case_sensitive: bool,
}

impl fmt::Debug for EnumFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnumFlag")
            .field("base", &self.base)
            .field("allowed", &self.allowed)
            .field("case_sensitive", &self.case_sensitive)
            .finish()
    }
}

impl EnumFlag {
    /// Creates an initialized, case-sensitive enum flag.
    ///
    /// The default is not checked here; the post-parse re-check reports a
    /// default outside `allowed`.
    pub fn new<I, S>(long: &str, short: &str, default: &str, allowed: I, usage: &str) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let allowed: Vec<String> = allowed.into_iter().map(Into::into).collect();
        if allowed.is_empty() {
            return Err(Error::validation(
                if long.is_empty() { short } else { long },
                default,
                "enum flag needs at least one allowed value",
            ));
        }
        let flag = Self {
            base: BaseFlag::new(default.to_string()),
            allowed,
            case_sensitive: true,
        };
        flag.base.init(long, short, usage)?;
        Ok(flag)
    }

    pub fn case_insensitive(mut self) -> Self {
        self.case_sensitive = false;
        self
    }

    pub fn with_env(self, name: &str) -> Self {
        self.base.bind_env(name);
        self
    }

    pub fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    fn lookup(&self, raw: &str) -> Option<&String> {
        self.allowed.iter().find(|candidate| {
            if self.case_sensitive {
                candidate.as_str() == raw
            } else {
                candidate.eq_ignore_ascii_case(raw)
            }
        })
    }
}

impl FlagCore for EnumFlag {
    type Value = String;

    const KIND: FlagKind = FlagKind::Enum;
    const RECHECK: bool = true;

    fn base(&self) -> &BaseFlag<String> {
        &self.base
    }

    fn parse_value(&self, raw: &str) -> std::result::Result<String, String> {
        self.lookup(raw)
            .cloned()
            .ok_or_else(|| format!("must be one of: {}", self.allowed.join(", ")))
    }

    fn render(&self, value: &String) -> String {
        value.clone()
    }

    fn value_to_json(&self, value: &String) -> Value {
        Value::String(value.clone())
    }

    fn check_value(&self, value: &String) -> std::result::Result<(), String> {
        match self.lookup(value) {
            Some(_) => Ok(()),
            None => Err(format!("must be one of: {}", self.allowed.join(", "))),
        }
    }

    // stores the declared spelling, whichever case the caller used
    fn set(&self, value: String) -> Result<()> {
        let canonical = self
            .parse_value(&value)
            .map_err(|reason| Error::validation(self.base.display_name(), value, reason))?;
        self.base.commit(canonical, |v| v.clone())
    }

    fn allowed(&self) -> Vec<String> {
        self.allowed.clone()
    }
}
