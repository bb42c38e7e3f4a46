//! Dual-key registry shared by flag sets and subcommand maps.
//!
//! Each item is stored exactly once in an arena slot addressed by a
//! monotonically increasing [`EntryId`]. A secondary `name → id` index holds
//! up to two aliases (long and short) per item, so [`Registry::count`] always
//! reports distinct items rather than alias entries, and removing an item by
//! either alias drops both.
//!
//! # Examples
//!
//! ```
//! use flagtree_core::Registry;
//!
//! let registry = Registry::new();
//! registry.register("payload", "verbose", "v").unwrap();
//!
//! assert_eq!(registry.get("verbose"), Some("payload"));
//! assert_eq!(registry.get("v"), Some("payload"));
//! assert_eq!(registry.count(), 1);
//!
//! registry.unregister("v").unwrap();
//! assert!(!registry.has("verbose"));
//! assert_eq!(registry.count(), 0);
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::num::NonZeroU64;

use parking_lot::RwLock;

use crate::error::{Error, Result};

/// Identifier of a registry entry. Starts at 1 and is never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(NonZeroU64);

impl EntryId {
    /// Returns the raw numeric value.
    pub fn get(self) -> u64 {
        self.0.get()
    }

    fn slot(self) -> usize {
        (self.0.get() - 1) as usize
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct Inner<T> {
    slots: Vec<Option<T>>,
    names: HashMap<String, EntryId>,
    live: usize,
}

impl<T> Inner<T> {
    fn next_id(&self) -> EntryId {
        // slots.len() + 1 is never zero
        EntryId(NonZeroU64::MIN.saturating_add(self.slots.len() as u64))
    }

    fn check_names<'a>(&self, long: &'a str, short: &'a str) -> Result<Vec<&'a str>> {
        if long.is_empty() && short.is_empty() {
            return Err(Error::InvalidName(
                "at least one of long or short name is required".to_string(),
            ));
        }
        if long == short {
            return Err(Error::InvalidName(format!(
                "long and short names are identical: {long}"
            )));
        }
        let names: Vec<&str> = [long, short].into_iter().filter(|n| !n.is_empty()).collect();
        for name in &names {
            if self.names.contains_key(*name) {
                return Err(Error::AlreadyExists((*name).to_string()));
            }
        }
        Ok(names)
    }

    fn insert(&mut self, item: T, names: &[&str]) -> EntryId {
        let id = self.next_id();
        self.slots.push(Some(item));
        for name in names {
            self.names.insert((*name).to_string(), id);
        }
        self.live += 1;
        id
    }
}

/// Thread-safe dual-key store.
pub struct Registry<T> {
    inner: RwLock<Inner<T>>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        let mut names: Vec<&str> = inner.names.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("Registry")
            .field("count", &inner.live)
            .field("names", &names)
            .finish()
    }
}

impl<T> Registry<T> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                slots: Vec::new(),
                names: HashMap::new(),
                live: 0,
            }),
        }
    }

    /// Stores `item` under `long` and/or `short`.
    ///
    /// Empty names are skipped; at least one must be non-empty.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidName`] when both names are empty or identical,
    /// [`Error::AlreadyExists`] when either name is taken.
    pub fn register(&self, item: T, long: &str, short: &str) -> Result<EntryId> {
        let mut inner = self.inner.write();
        let names = inner.check_names(long, short)?;
        Ok(inner.insert(item, &names))
    }

    /// Stores a batch of items under one lock acquisition.
    ///
    /// Every entry is checked against the current contents and against the
    /// rest of the batch before anything is inserted, so either all items
    /// are registered or none are.
    pub fn register_all<I>(&self, items: I) -> Result<Vec<EntryId>>
    where
        I: IntoIterator<Item = (T, String, String)>,
    {
        let items: Vec<(T, String, String)> = items.into_iter().collect();
        let mut inner = self.inner.write();

        let mut batch_names: HashSet<&str> = HashSet::new();
        for (_, long, short) in &items {
            for name in inner.check_names(long, short)? {
                if !batch_names.insert(name) {
                    return Err(Error::AlreadyExists(name.to_string()));
                }
            }
        }

        let mut ids = Vec::with_capacity(items.len());
        for (item, long, short) in items {
            let names: Vec<&str> = [long.as_str(), short.as_str()]
                .into_iter()
                .filter(|n| !n.is_empty())
                .collect();
            ids.push(inner.insert(item, &names));
        }
        Ok(ids)
    }

    /// Removes the item `name` points to, along with every alias of it.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when `name` is unknown.
    pub fn unregister(&self, name: &str) -> Result<T> {
        let mut inner = self.inner.write();
        let id = *inner
            .names
            .get(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        inner.names.retain(|_, v| *v != id);
        let item = inner.slots[id.slot()]
            .take()
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        inner.live -= 1;
        Ok(item)
    }

    /// Returns `true` if `name` is registered.
    pub fn has(&self, name: &str) -> bool {
        self.inner.read().names.contains_key(name)
    }

    /// Resolves an alias to its entry id.
    pub fn id_of(&self, name: &str) -> Option<EntryId> {
        self.inner.read().names.get(name).copied()
    }

    /// Returns the names (long first when both exist) registered for `id`.
    pub fn names_of(&self, id: EntryId) -> Vec<String> {
        let inner = self.inner.read();
        let mut names: Vec<String> = inner
            .names
            .iter()
            .filter(|(_, v)| **v == id)
            .map(|(k, _)| k.clone())
            .collect();
        names.sort_by_key(|n| std::cmp::Reverse(n.len()));
        names
    }

    /// Number of distinct stored items.
    pub fn count(&self) -> usize {
        self.inner.read().live
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Drops every item and alias. Ids keep increasing afterwards.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        for slot in &mut inner.slots {
            *slot = None;
        }
        inner.names.clear();
        inner.live = 0;
    }

    /// Visits items in registration order until `visit` returns `false`.
    ///
    /// The registry's read lock is held for the duration of the walk, so
    /// `visit` must not register or unregister on the same registry.
    pub fn range<F>(&self, mut visit: F)
    where
        F: FnMut(EntryId, &T) -> bool,
    {
        let inner = self.inner.read();
        for (index, slot) in inner.slots.iter().enumerate() {
            if let Some(item) = slot {
                let id = EntryId(NonZeroU64::MIN.saturating_add(index as u64));
                if !visit(id, item) {
                    break;
                }
            }
        }
    }
}

impl<T: Clone> Registry<T> {
    /// Looks up an item by either alias.
    pub fn get(&self, name: &str) -> Option<T> {
        let inner = self.inner.read();
        let id = inner.names.get(name)?;
        inner.slots[id.slot()].clone()
    }

    /// Looks up an item by id.
    pub fn get_by_id(&self, id: EntryId) -> Option<T> {
        self.inner.read().slots.get(id.slot())?.clone()
    }

    /// Returns every stored item in registration order.
    pub fn list(&self) -> Vec<T> {
        self.inner.read()
            .slots
            .iter()
            .flatten()
            .cloned()
            .collect()
    }
}
