use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::names::validate_flag_names;

/// User-supplied check run against every candidate value before it is stored.
pub type Validator<T> = Arc<dyn Fn(&T) -> std::result::Result<(), String> + Send + Sync>;

/// Values a flag can hold.
pub trait FlagValue: Clone + fmt::Debug + Send + Sync + 'static {}

impl<T: Clone + fmt::Debug + Send + Sync + 'static> FlagValue for T {}

#[derive(Debug)]
struct Meta {
    long: String,
    short: String,
    usage: String,
}

struct State<T> {
    default: T,
    // None means "unset, read the default"
    value: Option<T>,
    validator: Option<Validator<T>>,
    env: Option<String>,
}

/// Shared storage and locking for every flag kind.
///
/// Metadata is written once by [`BaseFlag::init`]; the mutable state lives
/// behind a per-instance lock so different flags never contend and
/// operations on the same flag are linearizable.
pub struct BaseFlag<T> {
    meta: OnceLock<Meta>,
    state: RwLock<State<T>>,
}

impl<T: FlagValue> fmt::Debug for BaseFlag<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("BaseFlag")
            .field("long", &self.long_name())
            .field("short", &self.short_name())
            .field("default", &state.default)
            .field("value", &state.value)
            .field("env", &state.env)
            .finish()
    }
}

impl<T: FlagValue> BaseFlag<T> {
    /// Creates an uninitialized flag holding `default`.
    pub fn new(default: T) -> Self {
        Self {
            meta: OnceLock::new(),
            state: RwLock::new(State {
                default,
                value: None,
                validator: None,
                env: None,
            }),
        }
    }

    /// Attaches names and usage text. Allowed exactly once.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidName`] when both names are empty or malformed,
    /// [`Error::AlreadyInitialized`] on a second call.
    pub fn init(&self, long: &str, short: &str, usage: &str) -> Result<()> {
        if let Some(existing) = self.meta.get() {
            return Err(Error::AlreadyInitialized(display(existing)));
        }
        validate_flag_names(long, short)?;
        self.meta
            .set(Meta {
                long: long.to_string(),
                short: short.to_string(),
                usage: usage.to_string(),
            })
            .map_err(|meta| Error::AlreadyInitialized(display(&meta)))
    }

    pub fn is_initialized(&self) -> bool {
        self.meta.get().is_some()
    }

    pub fn long_name(&self) -> &str {
        self.meta.get().map_or("", |m| m.long.as_str())
    }

    pub fn short_name(&self) -> &str {
        self.meta.get().map_or("", |m| m.short.as_str())
    }

    pub fn usage(&self) -> &str {
        self.meta.get().map_or("", |m| m.usage.as_str())
    }

    /// Long name when present, otherwise the short name.
    pub fn display_name(&self) -> &str {
        match self.meta.get() {
            Some(meta) if !meta.long.is_empty() => &meta.long,
            Some(meta) => &meta.short,
            None => "<uninitialized>",
        }
    }

    /// Stores a copy of `value` after the validator accepts it.
    ///
    /// On rejection the previous state is kept untouched.
    pub fn set(&self, value: T) -> Result<()> {
        self.commit(value, |v| format!("{v:?}"))
    }

    /// Like [`set`](Self::set), reporting rejections with `shown` as the
    /// offending input.
    pub(crate) fn commit(&self, value: T, shown: impl FnOnce(&T) -> String) -> Result<()> {
        let mut state = self.state.write();
        if let Some(validator) = &state.validator {
            validator(&value)
                .map_err(|reason| Error::validation(self.display_name(), shown(&value), reason))?;
        }
        state.value = Some(value);
        Ok(())
    }

    /// Current value if set, default otherwise.
    pub fn get(&self) -> T {
        let state = self.state.read();
        state.value.as_ref().unwrap_or(&state.default).clone()
    }

    /// Runs `f` against the current value without cloning it.
    pub fn with_current<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let state = self.state.read();
        f(state.value.as_ref().unwrap_or(&state.default))
    }

    pub fn default_value(&self) -> T {
        self.state.read().default.clone()
    }

    /// Runs `f` against the default value without cloning it.
    pub fn with_default<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.state.read().default)
    }

    pub fn is_set(&self) -> bool {
        self.state.read().value.is_some()
    }

    /// Clears the set value so reads fall back to the default.
    pub fn reset(&self) {
        self.state.write().value = None;
    }

    /// Mutates the live storage in place: the set value when there is one,
    /// the default otherwise.
    ///
    /// This bypasses the validator and does not change [`is_set`](Self::is_set).
    /// Keeping the result meaningful is the caller's responsibility.
    pub fn update_unchecked<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut state = self.state.write();
        let state = &mut *state;
        match state.value.as_mut() {
            Some(value) => f(value),
            None => f(&mut state.default),
        }
    }

    pub fn set_validator(&self, validator: Validator<T>) {
        self.state.write().validator = Some(validator);
    }

    /// Records the environment variable this flag reads from.
    ///
    /// Metadata only; the parser performs the lookup.
    pub fn bind_env(&self, name: &str) {
        self.state.write().env = Some(name.to_string());
    }

    pub fn env_var(&self) -> Option<String> {
        self.state.read().env.clone()
    }
}

fn display(meta: &Meta) -> String {
    if meta.long.is_empty() {
        meta.short.clone()
    } else {
        meta.long.clone()
    }
}
