//! The module cache.
//!
//! Maps a module key (an absolute file path, or `skiff:<name>` for
//! framework-internal modules) to the loaded module. `require` fills it, the
//! framework bootstrap seeds it, and reload prunes it by key. Entries are
//! never edited in place; a reloaded module is a new `Arc`.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use skiff_types::Value;

/// Key prefix reserved for framework-internal modules.
pub const INTERNAL_PREFIX: &str = "skiff:";

/// A loaded module.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub key: String,
    /// Backing file, if the module came from disk.
    pub path: Option<PathBuf>,
    pub source: String,
    /// Top-level bindings, in the order-independent form `require` returns.
    pub exports: BTreeMap<String, Value>,
}

impl Module {
    pub fn new(key: impl Into<String>, path: Option<PathBuf>, source: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            path,
            source: source.into(),
            exports: BTreeMap::new(),
        }
    }

    pub fn with_exports(mut self, exports: BTreeMap<String, Value>) -> Self {
        self.exports = exports;
        self
    }

    /// The exports as a record value.
    pub fn exports_value(&self) -> Value {
        Value::Record(self.exports.clone())
    }

    pub fn is_internal(&self) -> bool {
        self.key.starts_with(INTERNAL_PREFIX)
    }
}

/// Key → loaded module table.
#[derive(Debug, Default, Clone)]
pub struct ModuleCache {
    entries: BTreeMap<String, Arc<Module>>,
}

impl ModuleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Arc<Module>> {
        self.entries.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert a module under its own key, returning the shared handle.
    pub fn insert(&mut self, module: Module) -> Arc<Module> {
        let module = Arc::new(module);
        self.entries.insert(module.key.clone(), module.clone());
        module
    }

    /// Put back a previously removed handle, keeping its identity.
    pub fn restore(&mut self, module: Arc<Module>) {
        self.entries.insert(module.key.clone(), module);
    }

    pub fn remove(&mut self, key: &str) -> Option<Arc<Module>> {
        self.entries.remove(key)
    }

    /// Snapshot of all keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
