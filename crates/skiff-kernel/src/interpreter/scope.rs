//! Variable scopes.
//!
//! A scope is a flat table of bindings. Lookups chain explicitly in the
//! interpreter: a module's own scope first, then the global scope; the
//! shell scope first, then the global scope.

use std::collections::BTreeMap;

use skiff_types::Value;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    vars: BTreeMap<String, Value>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.vars.remove(name)
    }

    /// All bindings, sorted by name.
    pub fn all(&self) -> Vec<(String, Value)> {
        self.vars
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn into_bindings(self) -> BTreeMap<String, Value> {
        self.vars
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_overwrite() {
        let mut scope = Scope::new();
        scope.set("X", Value::Int(1));
        scope.set("X", Value::Int(2));
        assert_eq!(scope.get("X"), Some(&Value::Int(2)));
        assert_eq!(scope.len(), 1);
        assert_eq!(scope.remove("X"), Some(Value::Int(2)));
        assert!(scope.is_empty());
    }
}
