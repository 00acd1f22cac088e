// IdentifierRegistry - label names mapped to dense classifier targets
//
// Identifiers live in an arena indexed by target; a name -> target map gives
// constant-time lookup in both directions. Registration order fixes the target,
// and only `session_count` changes after registration.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A registered label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    pub name: String,
    /// Classifier target; equals the registration index
    pub target: usize,
    /// Completed training sessions for this label
    pub session_count: u32,
}

#[derive(Debug, Default)]
pub struct IdentifierRegistry {
    identifiers: Vec<Identifier>,
    by_name: HashMap<String, usize>,
}

impl IdentifierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name` and return its target
    ///
    /// Registering a name twice returns the existing target unchanged.
    pub fn register(&mut self, name: &str) -> usize {
        if let Some(&target) = self.by_name.get(name) {
            return target;
        }
        let target = self.identifiers.len();
        self.identifiers.push(Identifier {
            name: name.to_string(),
            target,
            session_count: 0,
        });
        self.by_name.insert(name.to_string(), target);
        target
    }

    pub fn get(&self, name: &str) -> Option<&Identifier> {
        self.by_name.get(name).map(|&target| &self.identifiers[target])
    }

    pub fn target(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn name_of(&self, target: usize) -> Option<&str> {
        self.identifiers.get(target).map(|id| id.name.as_str())
    }

    pub fn session_count(&self, name: &str) -> Option<u32> {
        self.get(name).map(|id| id.session_count)
    }

    /// Count one completed session for `target`, returning the new count
    pub fn complete_session(&mut self, target: usize) -> Option<u32> {
        let identifier = self.identifiers.get_mut(target)?;
        identifier.session_count += 1;
        Some(identifier.session_count)
    }

    /// Storage key for the next session of `name`: `"<name>_<session_count>"`
    pub fn session_label(&self, name: &str) -> Option<String> {
        self.get(name)
            .map(|id| format!("{}_{}", id.name, id.session_count))
    }

    pub fn len(&self) -> usize {
        self.identifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Identifier> {
        self.identifiers.iter()
    }
}
