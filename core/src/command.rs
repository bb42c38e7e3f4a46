//! Command contexts and the subcommand tree.
//!
//! A [`Command`] owns its flags, its positional arguments, its children and a
//! weak back-reference to its parent. Children are attached in batches that
//! are validated in full (name collisions, cycles, prior attachment) before
//! any of them is committed.
//!
//! # Examples
//!
//! ```
//! use flagtree_core::{BoolFlag, Command, ErrorCode};
//!
//! let git = Command::new("git", "", "the stupid content tracker");
//! let remote = Command::new("remote", "", "manage remotes");
//! let add = Command::new("add", "a", "add a remote");
//!
//! git.add_subcommands(&[remote.clone()]).unwrap();
//! remote.add_subcommands(&[add.clone()]).unwrap();
//! remote.add_flag(BoolFlag::new("verbose", "v", false, "").unwrap()).unwrap();
//!
//! assert_eq!(add.path(), "git remote add");
//! assert!(git.subcommand("remote").is_some());
//!
//! // git cannot become a child of its own descendant
//! let err = add.add_subcommands(&[git.clone()]).unwrap_err();
//! assert_eq!(err.code(), ErrorCode::CyclicReference);
//! assert!(add.subcommands().is_empty());
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::flag::{BoolFlag, Flag, StringFlag};
use crate::flagset::FlagSet;
use crate::names::validate_command_names;
use crate::registry::{EntryId, Registry};

/// Upper bound on ancestor walks. Guarantees termination even if a cycle
/// slipped into the tree some other way.
pub const MAX_TREE_DEPTH: usize = 256;

pub const HELP_LONG: &str = "help";
pub const HELP_SHORT: &str = "h";
pub const VERSION_LONG: &str = "version";

// Serializes every attach and builtin installation across all trees, so an
// ancestor walk and the commit that follows it see the same parents.
static TREE_LOCK: Mutex<()> = parking_lot::const_mutex(());

/// Flags of which at most one may be set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutexGroup {
    pub name: String,
    /// Long or short names; aliases of one flag count once.
    pub flags: Vec<String>,
    /// Whether having none of them set is acceptable.
    #[serde(default)]
    pub allow_none: bool,
}

/// Flags which must all be set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredGroup {
    pub name: String,
    pub flags: Vec<String>,
}

/// Per-command configuration block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandConfig {
    /// Version string reported by the builtin `--version` flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub mutex_groups: Vec<MutexGroup>,
    #[serde(default)]
    pub required_groups: Vec<RequiredGroup>,
    /// Long name of a builtin language/locale flag, e.g. `lang`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang_flag: Option<String>,
    /// Prefix prepended to every bound environment variable name. Read from
    /// the root of the tree.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_prefix: Option<String>,
}

/// Names of the builtin flags registered on a tree.
///
/// Owned by the root command. Whether a given flag *is* a builtin is decided
/// per command by identity, see [`Command::is_builtin`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuiltinNames {
    names: HashSet<String>,
}

impl BuiltinNames {
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    fn insert(&mut self, long: &str, short: &str) {
        for name in [long, short] {
            if !name.is_empty() {
                self.names.insert(name.to_string());
            }
        }
    }
}

#[derive(Debug, Default)]
struct ParseState {
    args: Vec<String>,
    parsed: bool,
}

/// One node of the command tree.
pub struct Command {
    long: String,
    short: String,
    description: String,
    flags: FlagSet,
    children: Registry<Arc<Command>>,
    // leaf lock: never held while acquiring another lock
    parent: RwLock<Weak<Command>>,
    state: Mutex<ParseState>,
    config: RwLock<CommandConfig>,
    builtins: OnceLock<BuiltinNames>,
    // entries of `flags` registered by the builtin installers
    builtin_ids: RwLock<HashSet<EntryId>>,
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("long", &self.long)
            .field("short", &self.short)
            .field("flags", &self.flags)
            .field("children", &self.children)
            .finish_non_exhaustive()
    }
}

impl Command {
    /// Creates a root command.
    ///
    /// # Panics
    ///
    /// When both names are empty or a name is malformed. That is a bug in the
    /// calling program, not bad user input; use [`Command::try_new`] when
    /// names come from data.
    pub fn new(long: &str, short: &str, description: &str) -> Arc<Self> {
        match Self::try_new(long, short, description) {
            Ok(command) => command,
            Err(err) => panic!("cannot construct command ({long:?}, {short:?}): {err}"),
        }
    }

    /// Fallible form of [`Command::new`].
    pub fn try_new(long: &str, short: &str, description: &str) -> Result<Arc<Self>> {
        validate_command_names(long, short)?;
        let name = if long.is_empty() { short } else { long };
        Ok(Arc::new(Self {
            long: long.to_string(),
            short: short.to_string(),
            description: description.to_string(),
            flags: FlagSet::new(name),
            children: Registry::new(),
            parent: RwLock::new(Weak::new()),
            state: Mutex::new(ParseState::default()),
            config: RwLock::new(CommandConfig::default()),
            builtins: OnceLock::new(),
            builtin_ids: RwLock::new(HashSet::new()),
        }))
    }

    pub fn long_name(&self) -> &str {
        &self.long
    }

    pub fn short_name(&self) -> &str {
        &self.short
    }

    /// Long name when present, otherwise the short name.
    pub fn name(&self) -> &str {
        if self.long.is_empty() {
            &self.short
        } else {
            &self.long
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Space-separated names from the root down to this command.
    pub fn path(&self) -> String {
        let mut names = vec![self.name().to_string()];
        let mut current = self.parent();
        while let Some(node) = current {
            if names.len() > MAX_TREE_DEPTH {
                break;
            }
            names.push(node.name().to_string());
            current = node.parent();
        }
        names.reverse();
        names.join(" ")
    }

    pub fn flags(&self) -> &FlagSet {
        &self.flags
    }

    /// Registers a flag on this command and returns a typed handle.
    pub fn add_flag<F: Flag + 'static>(&self, flag: F) -> Result<Arc<F>> {
        self.flags.add(flag)
    }

    /// Looks a flag up by long or short name.
    pub fn flag(&self, name: &str) -> Option<Arc<dyn Flag>> {
        self.flags.lookup(name)
    }

    pub fn parent(&self) -> Option<Arc<Command>> {
        self.parent.read().upgrade()
    }

    /// The top of the tree this command belongs to.
    pub fn root(self: &Arc<Self>) -> Arc<Command> {
        let mut node = Arc::clone(self);
        for _ in 0..MAX_TREE_DEPTH {
            match node.parent() {
                Some(parent) => node = parent,
                None => break,
            }
        }
        node
    }

    /// Looks a direct child up by long or short name.
    pub fn subcommand(&self, name: &str) -> Option<Arc<Command>> {
        self.children.get(name)
    }

    /// Direct children in attachment order.
    pub fn subcommands(&self) -> Vec<Arc<Command>> {
        self.children.list()
    }

    pub fn has_subcommands(&self) -> bool {
        !self.children.is_empty()
    }

    /// Attaches one child. See [`Command::add_subcommands`].
    pub fn add_subcommand(self: &Arc<Self>, child: &Arc<Command>) -> Result<()> {
        self.add_subcommands(std::slice::from_ref(child))
    }

    /// Attaches a batch of children, all or nothing.
    ///
    /// When the tree already carries builtin flags, every attached child and
    /// its descendants receive `--help` as well.
    ///
    /// # Errors
    ///
    /// [`Error::CyclicReference`] when a child is this command or one of its
    /// ancestors, [`Error::AlreadyExists`] on a name collision (with existing
    /// children or inside the batch) or when a child already has a parent.
    pub fn add_subcommands(self: &Arc<Self>, children: &[Arc<Command>]) -> Result<()> {
        let _tree = TREE_LOCK.lock();

        let mut batch: Vec<&Arc<Command>> = Vec::with_capacity(children.len());
        for child in children {
            validate_subcommand(self, child)?;
            if let Some(current) = child.parent() {
                return Err(Error::AlreadyExists(format!(
                    "{} is already a subcommand of {}",
                    child.name(),
                    current.path()
                )));
            }
            if batch.iter().any(|seen| Arc::ptr_eq(seen, child)) {
                return Err(Error::AlreadyExists(format!(
                    "{} appears twice in the batch",
                    child.name()
                )));
            }
            batch.push(child);
        }

        self.children.register_all(
            batch
                .iter()
                .map(|child| (Arc::clone(child), child.long.clone(), child.short.clone())),
        )?;

        let weak = Arc::downgrade(self);
        for child in &batch {
            *child.parent.write() = weak.clone();
        }

        if self.builtin_names().is_some() {
            for child in &batch {
                if let Err(err) = child.add_help_recursive(0) {
                    warn!(command = %child.path(), error = %err, "could not add --help");
                }
            }
        }

        debug!(
            parent = %self.path(),
            count = batch.len(),
            "attached subcommands"
        );
        Ok(())
    }

    /// Positional arguments captured by the last parse.
    pub fn args(&self) -> Vec<String> {
        self.state.lock().args.clone()
    }

    pub fn is_parsed(&self) -> bool {
        self.state.lock().parsed
    }

    pub(crate) fn record_args(&self, args: Vec<String>) {
        let mut state = self.state.lock();
        state.args.extend(args);
        state.parsed = true;
    }

    /// Clears captured arguments and resets every flag on this command and
    /// its descendants, so the tree can be parsed again.
    pub fn reset(&self) {
        {
            let mut state = self.state.lock();
            state.args.clear();
            state.parsed = false;
        }
        for flag in self.flags.list() {
            flag.reset();
        }
        for child in self.subcommands() {
            child.reset();
        }
    }

    /// A copy of the configuration block.
    pub fn config(&self) -> CommandConfig {
        self.config.read().clone()
    }

    /// Replaces the configuration block.
    pub fn set_config(&self, config: CommandConfig) {
        *self.config.write() = config;
    }

    pub fn set_version(&self, version: &str) {
        self.config.write().version = Some(version.to_string());
    }

    pub fn set_env_prefix(&self, prefix: &str) {
        self.config.write().env_prefix = Some(prefix.to_string());
    }

    pub fn set_lang_flag(&self, name: &str) {
        self.config.write().lang_flag = Some(name.to_string());
    }

    pub fn add_mutex_group<S: AsRef<str>>(&self, name: &str, flags: &[S], allow_none: bool) {
        self.config.write().mutex_groups.push(MutexGroup {
            name: name.to_string(),
            flags: flags.iter().map(|f| f.as_ref().to_string()).collect(),
            allow_none,
        });
    }

    pub fn add_required_group<S: AsRef<str>>(&self, name: &str, flags: &[S]) {
        self.config.write().required_groups.push(RequiredGroup {
            name: name.to_string(),
            flags: flags.iter().map(|f| f.as_ref().to_string()).collect(),
        });
    }

    /// The environment prefix configured on the root of this tree.
    pub fn env_prefix(&self) -> Option<String> {
        match self.top() {
            Some(root) => root.config().env_prefix,
            None => self.config().env_prefix,
        }
    }

    // Root ancestor, or None when this command is the root.
    fn top(&self) -> Option<Arc<Command>> {
        let mut current = self.parent();
        let mut top = None;
        let mut depth = 0;
        while let Some(node) = current {
            depth += 1;
            if depth > MAX_TREE_DEPTH {
                break;
            }
            current = node.parent();
            top = Some(node);
        }
        top
    }

    /// Registers the builtin flags on this command (the root) and `--help`
    /// on every current descendant.
    ///
    /// Root: `--help/-h`, `--version` when a version is configured, and the
    /// configured language flag. Subcommands attached later get `--help` on
    /// attach. Calling this twice fails with [`Error::AlreadyExists`].
    pub fn add_builtin_flags(&self) -> Result<()> {
        let _tree = TREE_LOCK.lock();
        let config = self.config();
        let mut names = BuiltinNames::default();

        let mut flags: Vec<Arc<dyn Flag>> = vec![Arc::new(BoolFlag::new(
            HELP_LONG,
            HELP_SHORT,
            false,
            "show help",
        )?)];
        names.insert(HELP_LONG, HELP_SHORT);
        if config.version.is_some() {
            flags.push(Arc::new(BoolFlag::new(
                VERSION_LONG,
                "",
                false,
                "print version",
            )?));
            names.insert(VERSION_LONG, "");
        }
        if let Some(lang) = &config.lang_flag {
            flags.push(Arc::new(StringFlag::new(
                lang,
                "",
                String::new(),
                "output language",
            )?));
            names.insert(lang, "");
        }

        if self.builtins.get().is_some() {
            return Err(Error::AlreadyExists("builtin flags".to_string()));
        }
        let ids = self.flags.add_all(flags)?;
        self.builtin_ids.write().extend(ids);
        for child in self.subcommands() {
            child.add_help_recursive(0)?;
        }
        self.builtins
            .set(names)
            .map_err(|_| Error::AlreadyExists("builtin flags".to_string()))
    }

    fn add_help_recursive(&self, depth: usize) -> Result<()> {
        if depth > MAX_TREE_DEPTH {
            return Ok(());
        }
        if !self.flags.registry().has(HELP_LONG) {
            // keep a user's own -h
            let short = if self.flags.registry().has(HELP_SHORT) {
                ""
            } else {
                HELP_SHORT
            };
            let id = self
                .flags
                .add_shared(Arc::new(BoolFlag::new(HELP_LONG, short, false, "show help")?))?;
            self.builtin_ids.write().insert(id);
        }
        for child in self.subcommands() {
            child.add_help_recursive(depth + 1)?;
        }
        Ok(())
    }

    /// The builtin-name table of the tree this command belongs to.
    pub fn builtin_names(&self) -> Option<BuiltinNames> {
        match self.top() {
            Some(root) => root.builtins.get().cloned(),
            None => self.builtins.get().cloned(),
        }
    }

    /// Whether `name` resolves, on this command, to a flag registered by
    /// [`Command::add_builtin_flags`]. A user flag that merely shares a
    /// builtin's name is not one.
    pub fn is_builtin(&self, name: &str) -> bool {
        self.flags
            .registry()
            .id_of(name)
            .is_some_and(|id| self.builtin_ids.read().contains(&id))
    }

    /// Whether the builtin flag `name` was set on this command.
    pub(crate) fn builtin_set(&self, name: &str) -> bool {
        self.is_builtin(name) && self.flag(name).is_some_and(|flag| flag.is_set())
    }
}

/// Checks that `child` may be attached under `parent`.
///
/// Fails with [`Error::CyclicReference`] when `child` is `parent` itself or
/// one of its ancestors (compared by identity, not name), and with
/// [`Error::AlreadyExists`] when either of `child`'s names is already used by
/// one of `parent`'s children.
pub fn validate_subcommand(parent: &Arc<Command>, child: &Arc<Command>) -> Result<()> {
    let cyclic = || Error::CyclicReference {
        parent: parent.name().to_string(),
        child: child.name().to_string(),
    };

    let mut current = Some(Arc::clone(parent));
    let mut depth = 0;
    while let Some(node) = current {
        if Arc::ptr_eq(&node, child) {
            return Err(cyclic());
        }
        depth += 1;
        if depth > MAX_TREE_DEPTH {
            return Err(cyclic());
        }
        current = node.parent();
    }

    for name in [child.long_name(), child.short_name()] {
        if !name.is_empty() && parent.children.has(name) {
            return Err(Error::AlreadyExists(format!(
                "subcommand {name} of {}",
                parent.path()
            )));
        }
    }
    Ok(())
}
