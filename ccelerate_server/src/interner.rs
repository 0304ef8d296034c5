#![deny(clippy::unwrap_used)]

use std::{collections::HashMap, hash::Hash};

/// Bidirectional `T ↔ u32` map used for compact graph storage (spec.md's L3
/// leaf component): the include-graph resolver (§4.2) and the dependency
/// cache (§4.4) both store large numbers of repeated filenames and directive
/// hashes, and intern them to small integer ids instead of cloning strings.
#[derive(Debug, Default)]
pub struct Interner<T: Eq + Hash + Clone> {
    values: Vec<T>,
    ids: HashMap<T, u32>,
}

impl<T: Eq + Hash + Clone> Interner<T> {
    pub fn new() -> Self {
        Self {
            values: Vec::new(),
            ids: HashMap::new(),
        }
    }

    /// Returns the id for `value`, interning it if this is the first time it
    /// is seen.
    pub fn intern(&mut self, value: T) -> u32 {
        if let Some(id) = self.ids.get(&value) {
            return *id;
        }
        let id = self.values.len() as u32;
        self.values.push(value.clone());
        self.ids.insert(value, id);
        id
    }

    pub fn get(&self, id: u32) -> Option<&T> {
        self.values.get(id as usize)
    }

    pub fn lookup(&self, value: &T) -> Option<u32> {
        self.ids.get(value).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
