//! Shared key/value state for a flow run
//!
//! The whiteboard holds string values (resource IDs, names, CIDRs) that are
//! exported as a flat map at the end of every run, plus a side channel of
//! cached objects that only live as long as the process.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

/// Value stored for resources that have been deleted.
///
/// Survives export/import so that a partially completed teardown is
/// recognised on the next run.
pub const DELETED_MARKER: &str = "<deleted>";

const LIST_SEPARATOR: char = ',';

type ObjectMap = HashMap<String, Arc<dyn Any + Send + Sync>>;

/// Thread-safe state store shared by all tasks of a flow
#[derive(Default)]
pub struct Whiteboard {
    values: Mutex<BTreeMap<String, String>>,
    objects: Mutex<ObjectMap>,
}

impl std::fmt::Debug for Whiteboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Whiteboard")
            .field("values", &*self.values())
            .field("objects", &self.objects().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Whiteboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a whiteboard hydrated from persisted state
    pub fn from_flat_map(map: &BTreeMap<String, String>) -> Self {
        let board = Self::new();
        board.import_from_flat_map(map);
        board
    }

    fn values(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        // a panicking task cannot leave a half-written entry behind
        self.values.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn objects(&self) -> MutexGuard<'_, ObjectMap> {
        self.objects.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Get a value. Unset keys and deletion markers both read as `None`.
    pub fn get(&self, key: &str) -> Option<String> {
        self.values()
            .get(key)
            .filter(|v| v.as_str() != DELETED_MARKER)
            .cloned()
    }

    /// Get a value, treating an explicitly-set empty string as absent
    pub fn get_non_empty(&self, key: &str) -> Option<String> {
        self.get(key).filter(|v| !v.is_empty())
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.values().insert(key.into(), value.into());
    }

    pub fn delete(&self, key: &str) -> Option<String> {
        self.values().remove(key)
    }

    /// Store a list value (comma-joined)
    pub fn set_list<I, S>(&self, key: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = values
            .into_iter()
            .map(|v| v.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(&LIST_SEPARATOR.to_string());
        self.set(key, joined);
    }

    /// Read a list value. An empty string is an empty list.
    pub fn get_list(&self, key: &str) -> Option<Vec<String>> {
        self.get(key).map(|v| {
            v.split(LIST_SEPARATOR)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
    }

    /// Record that the resource behind `key` has been deleted
    pub fn set_as_deleted(&self, key: impl Into<String>) {
        self.set(key, DELETED_MARKER);
    }

    pub fn is_already_deleted(&self, key: &str) -> bool {
        self.values()
            .get(key)
            .is_some_and(|v| v.as_str() == DELETED_MARKER)
    }

    /// Remove every deletion marker, returning how many were removed
    pub fn clear_deleted_markers(&self) -> usize {
        let mut values = self.values();
        let before = values.len();
        values.retain(|_, v| v.as_str() != DELETED_MARKER);
        before - values.len()
    }

    /// Cache an object for the remainder of this run. Never exported.
    pub fn set_object<T: Any + Send + Sync>(&self, key: impl Into<String>, object: T) {
        self.objects().insert(key.into(), Arc::new(object));
    }

    /// Fetch a cached object if present and of the requested type
    pub fn get_object<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let object = self.objects().get(key).cloned()?;
        object.downcast::<T>().ok()
    }

    pub fn delete_object(&self, key: &str) {
        self.objects().remove(key);
    }

    /// True when no string values are stored
    pub fn is_empty(&self) -> bool {
        self.values().is_empty()
    }

    /// Merge persisted state into the whiteboard. Existing keys are overwritten.
    pub fn import_from_flat_map(&self, map: &BTreeMap<String, String>) {
        let mut values = self.values();
        for (k, v) in map {
            values.insert(k.clone(), v.clone());
        }
    }

    /// Snapshot of all string values, deletion markers included
    pub fn export_as_flat_map(&self) -> BTreeMap<String, String> {
        self.values().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_unset_and_empty() {
        let board = Whiteboard::new();
        assert_eq!(board.get("Router"), None);

        board.set("Router", "");
        assert_eq!(board.get("Router"), Some(String::new()));
        assert_eq!(board.get_non_empty("Router"), None);
        assert!(!board.is_empty());
    }

    #[test]
    fn test_export_import() {
        let board = Whiteboard::new();
        board.set("Network", "net-1");
        board.set_list("EgressCIDRs", ["203.0.113.5/32", "203.0.113.6/32"]);
        board.set_object("SecurityGroup", 42u32);

        let exported = board.export_as_flat_map();
        assert_eq!(exported.len(), 2);
        assert_eq!(exported["EgressCIDRs"], "203.0.113.5/32,203.0.113.6/32");

        let restored = Whiteboard::from_flat_map(&exported);
        assert_eq!(restored.get("Network").as_deref(), Some("net-1"));
        assert_eq!(
            restored.get_list("EgressCIDRs").unwrap(),
            vec!["203.0.113.5/32", "203.0.113.6/32"]
        );
        // objects are not persisted
        assert!(restored.get_object::<u32>("SecurityGroup").is_none());
    }

    #[test]
    fn test_objects_are_typed() {
        let board = Whiteboard::new();
        board.set_object("SecurityGroup", String::from("sg"));
        assert_eq!(
            board.get_object::<String>("SecurityGroup").as_deref(),
            Some(&"sg".to_string())
        );
        assert!(board.get_object::<u64>("SecurityGroup").is_none());
        assert!(board.is_empty());
    }

    #[test]
    fn test_deleted_markers() {
        let board = Whiteboard::new();
        board.set("Subnet", "sub-1");
        board.set_as_deleted("Subnet");

        assert_eq!(board.get("Subnet"), None);
        assert!(board.is_already_deleted("Subnet"));
        assert_eq!(board.export_as_flat_map()["Subnet"], DELETED_MARKER);

        let restored = Whiteboard::from_flat_map(&board.export_as_flat_map());
        assert!(restored.is_already_deleted("Subnet"));

        assert_eq!(restored.clear_deleted_markers(), 1);
        assert!(restored.is_empty());
    }

    #[test]
    fn test_empty_list() {
        let board = Whiteboard::new();
        board.set_list("DNSNameservers", Vec::<String>::new());
        assert_eq!(board.get_list("DNSNameservers"), Some(vec![]));
        assert_eq!(board.get_list("Missing"), None);
    }
}
