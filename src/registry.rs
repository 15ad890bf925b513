//! Session registry
//!
//! Maps each live session to its current display name. Entries keep their
//! registration order, which makes lookups by name deterministic: when two
//! sessions share a name, the one registered first wins.

use indexmap::IndexMap;

use crate::types::SessionId;

/// One registry entry
#[derive(Debug, Clone)]
pub struct Entry<S> {
    pub session: S,
    pub name: String,
}

/// Insertion-ordered `SessionId -> (session, name)` map
///
/// Owned by the router task; every key has at most one entry.
#[derive(Debug)]
pub struct Registry<S> {
    entries: IndexMap<SessionId, Entry<S>>,
}

impl<S: Clone> Registry<S> {
    pub fn new() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }

    /// Register a session under `name`
    ///
    /// Returns false (and changes nothing) if the id is already present.
    pub fn insert(&mut self, id: SessionId, session: S, name: String) -> bool {
        if self.entries.contains_key(&id) {
            return false;
        }
        self.entries.insert(id, Entry { session, name });
        true
    }

    /// Replace the display name, returning the old one
    pub fn rename(&mut self, id: SessionId, name: String) -> Option<String> {
        self.entries
            .get_mut(&id)
            .map(|entry| std::mem::replace(&mut entry.name, name))
    }

    /// Remove an entry, preserving the order of the rest
    pub fn remove(&mut self, id: SessionId) -> Option<Entry<S>> {
        self.entries.shift_remove(&id)
    }

    pub fn get(&self, id: SessionId) -> Option<&Entry<S>> {
        self.entries.get(&id)
    }

    pub fn name_of(&self, id: SessionId) -> Option<&str> {
        self.entries.get(&id).map(|entry| entry.name.as_str())
    }

    /// First session (in registration order) currently named `name`
    pub fn find_by_name(&self, name: &str) -> Option<(SessionId, &Entry<S>)> {
        self.entries
            .iter()
            .find(|(_, entry)| entry.name == name)
            .map(|(id, entry)| (*id, entry))
    }

    /// Stable copy of all sessions for iteration outside the map
    pub fn snapshot(&self) -> Vec<(SessionId, S)> {
        self.entries
            .iter()
            .map(|(id, entry)| (*id, entry.session.clone()))
            .collect()
    }

    /// Current `(id, name)` pairs in registration order
    pub fn names(&self) -> Vec<(SessionId, String)> {
        self.entries
            .iter()
            .map(|(id, entry)| (*id, entry.name.clone()))
            .collect()
    }

    /// Remove every entry, in registration order
    pub fn drain(&mut self) -> Vec<(SessionId, Entry<S>)> {
        self.entries.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<S: Clone> Default for Registry<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_of(names: &[&str]) -> (Registry<u32>, Vec<SessionId>) {
        let mut registry = Registry::new();
        let mut ids = Vec::new();
        for (i, name) in names.iter().enumerate() {
            let id = SessionId::new();
            assert!(registry.insert(id, i as u32, name.to_string()));
            ids.push(id);
        }
        (registry, ids)
    }

    #[test]
    fn test_insert_rejects_duplicate_key() {
        let (mut registry, ids) = registry_of(&["Alice"]);
        assert!(!registry.insert(ids[0], 7, "Mallory".to_string()));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.name_of(ids[0]), Some("Alice"));
    }

    #[test]
    fn test_rename_only_touches_target() {
        let (mut registry, ids) = registry_of(&["Alice", "Carol"]);

        let old = registry.rename(ids[0], "Bob".to_string());
        assert_eq!(old.as_deref(), Some("Alice"));
        assert_eq!(registry.name_of(ids[0]), Some("Bob"));
        assert_eq!(registry.name_of(ids[1]), Some("Carol"));

        assert!(registry.rename(SessionId::new(), "Ghost".to_string()).is_none());
    }

    #[test]
    fn test_find_by_name_picks_first_registered() {
        let (registry, ids) = registry_of(&["Alice", "Twin", "Twin"]);

        let (found, entry) = registry.find_by_name("Twin").unwrap();
        assert_eq!(found, ids[1]);
        assert_eq!(entry.session, 1);
        assert!(registry.find_by_name("Nobody").is_none());
    }

    #[test]
    fn test_remove_preserves_order() {
        let (mut registry, ids) = registry_of(&["A", "B", "C"]);

        assert!(registry.remove(ids[1]).is_some());
        assert!(registry.remove(ids[1]).is_none());

        let names: Vec<String> = registry.names().into_iter().map(|(_, n)| n).collect();
        assert_eq!(names, vec!["A", "C"]);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let (mut registry, ids) = registry_of(&["A", "B"]);

        let snapshot = registry.snapshot();
        registry.remove(ids[0]);

        assert_eq!(snapshot.len(), 2);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_drain_empties() {
        let (mut registry, _) = registry_of(&["A", "B"]);
        let drained = registry.drain();
        assert_eq!(drained.len(), 2);
        assert!(registry.is_empty());
    }
}
