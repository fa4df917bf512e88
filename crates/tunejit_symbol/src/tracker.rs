use std::fmt;
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// A symbol name bound to an address in this process.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GlobalMapping {
    pub name: String,
    pub address: usize,
}

impl GlobalMapping {
    pub fn new(name: impl Into<String>, address: usize) -> Self {
        Self {
            name: name.into(),
            address,
        }
    }

    /// Bind `name` to the address of a static or function item.
    pub fn of<T>(name: impl Into<String>, item: *const T) -> Self {
        Self::new(name, item as usize)
    }
}

impl fmt::Display for GlobalMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {:#x}", self.name, self.address)
    }
}

/// What is known about a function that became tunable.
#[derive(Clone, Debug)]
pub struct TrackedFunction {
    pub name: String,
    pub globals: Arc<[GlobalMapping]>,
}

/// Registry from an original function's address to its canonical name and the
/// external globals its specializations must be linked against.
///
/// Entries are added once when a function first becomes tunable and are never
/// removed. Consumers only read it, when rehydrating serialized code.
pub struct SymbolTracker {
    by_address: RwLock<AHashMap<usize, TrackedFunction>>,
    by_name: RwLock<AHashMap<String, usize>>,
}

impl Default for SymbolTracker {
    fn default() -> Self {
        Self {
            by_address: RwLock::new(AHashMap::new()),
            by_name: RwLock::new(AHashMap::new()),
        }
    }
}

impl SymbolTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `address` as the original of `name`.
    ///
    /// Returns `false`, leaving the existing entry in place, if the address
    /// or the name is already tracked.
    pub fn track<I>(&self, address: usize, name: impl Into<String>, globals: I) -> bool
    where
        I: IntoIterator<Item = GlobalMapping>,
    {
        let name = name.into();
        let mut by_address = self.by_address.write();
        let mut by_name = self.by_name.write();
        if by_address.contains_key(&address) || by_name.contains_key(&name) {
            return false;
        }

        by_name.insert(name.clone(), address);
        by_address.insert(
            address,
            TrackedFunction {
                name,
                globals: globals.into_iter().collect(),
            },
        );
        true
    }

    pub fn address_of(&self, name: &str) -> Option<usize> {
        self.by_name.read().get(name).copied()
    }

    pub fn name_and_globals(&self, address: usize) -> Option<(String, Arc<[GlobalMapping]>)> {
        self.by_address
            .read()
            .get(&address)
            .map(|tracked| (tracked.name.clone(), Arc::clone(&tracked.globals)))
    }

    /// Global mappings for the function originally named `name`, if tracked.
    pub fn globals_for(&self, name: &str) -> Option<Arc<[GlobalMapping]>> {
        let address = self.address_of(name)?;
        self.name_and_globals(address).map(|(_, globals)| globals)
    }

    pub fn contains(&self, address: usize) -> bool {
        self.by_address.read().contains_key(&address)
    }

    pub fn len(&self) -> usize {
        self.by_address.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_address.read().is_empty()
    }

    pub fn all(&self) -> Vec<TrackedFunction> {
        self.by_address.read().values().cloned().collect()
    }
}
