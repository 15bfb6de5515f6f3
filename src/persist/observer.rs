//! Mutation observer for a JSON object graph.
//!
//! `Observed` owns the root object and a list of write-notify callbacks.
//! Every write that goes through it (directly by path or through an
//! `ObservedView`) is applied in place and then reported to all
//! subscribers together with the full root state.
//!
//! Objects are observed recursively: reading an object field through a view
//! yields another view. Sequences and scalars are leaves and are handed out
//! as shared references, so the only way to change them is to write the
//! whole field again. Top-level fields may pin their discipline explicitly
//! through a [`FieldSchema`].

use crate::core::{Result, StoreError};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Callback invoked after every observed write with the full root state.
pub type WriteNotify = Arc<dyn Fn(&Value) + Send + Sync>;

// ============================================================================
// Field disciplines
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discipline {
    /// Object observed recursively; nested writes are allowed.
    Deep,
    /// Value replaced as a whole; writes below it are rejected.
    Atomic,
}

impl Discipline {
    /// Discipline implied by the shape of a value.
    pub fn of(value: &Value) -> Self {
        if value.is_object() {
            Discipline::Deep
        } else {
            Discipline::Atomic
        }
    }
}

/// Declared disciplines for top-level fields.
///
/// Undeclared fields fall back to [`Discipline::of`] on their current value.
#[derive(Debug, Clone, Default)]
pub struct FieldSchema {
    fields: BTreeMap<String, Discipline>,
}

impl FieldSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deep(mut self, field: impl Into<String>) -> Self {
        self.fields.insert(field.into(), Discipline::Deep);
        self
    }

    pub fn atomic(mut self, field: impl Into<String>) -> Self {
        self.fields.insert(field.into(), Discipline::Atomic);
        self
    }

    pub fn declared(&self, field: &str) -> Option<Discipline> {
        self.fields.get(field).copied()
    }

    fn resolve(&self, field: &str, value: &Value) -> Discipline {
        match self.declared(field) {
            Some(Discipline::Atomic) => Discipline::Atomic,
            Some(Discipline::Deep) | None => Discipline::of(value),
        }
    }
}

// ============================================================================
// Observed root
// ============================================================================

/// Read-only result of a path lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Node<'a> {
    Object(&'a Map<String, Value>),
    Leaf(&'a Value),
}

pub struct Observed {
    root: Value,
    schema: FieldSchema,
    subscribers: Vec<WriteNotify>,
}

impl fmt::Debug for Observed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observed")
            .field("root", &self.root)
            .field("schema", &self.schema)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl Observed {
    pub fn new(root: Map<String, Value>) -> Self {
        Self {
            root: Value::Object(root),
            schema: FieldSchema::default(),
            subscribers: Vec::new(),
        }
    }

    /// Wraps `root`, rejecting deep fields that do not currently hold an object.
    pub fn with_schema(root: Map<String, Value>, schema: FieldSchema) -> Result<Self> {
        for (field, value) in &root {
            if schema.declared(field) == Some(Discipline::Deep) && !value.is_object() {
                return Err(StoreError::InvalidPath(format!(
                    "field '{}' must hold an object",
                    field
                )));
            }
        }
        Ok(Self {
            root: Value::Object(root),
            schema,
            subscribers: Vec::new(),
        })
    }

    pub fn subscribe<F>(&mut self, callback: F)
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.subscribers.push(Arc::new(callback));
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Current root state.
    pub fn state(&self) -> &Value {
        &self.root
    }

    pub fn into_inner(self) -> Map<String, Value> {
        match self.root {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    pub fn get<S: AsRef<str>>(&self, path: &[S]) -> Option<Node<'_>> {
        let value = self.lookup(path)?;
        match self.discipline_at(path, value) {
            Discipline::Deep => value.as_object().map(Node::Object),
            Discipline::Atomic => Some(Node::Leaf(value)),
        }
    }

    /// Writes `value` at `path` and notifies subscribers.
    pub fn set<S: AsRef<str>>(&mut self, path: &[S], value: Value) -> Result<()> {
        self.check_write(path, Some(&value))?;
        let (key, parent) = split_path(path)?;
        self.parent_mut(parent)?.insert(key.to_string(), value);
        self.notify();
        Ok(())
    }

    /// Removes the key at `path`; subscribers are notified only if it existed.
    pub fn remove<S: AsRef<str>>(&mut self, path: &[S]) -> Result<Option<Value>> {
        self.check_write(path, None)?;
        let (key, parent) = split_path(path)?;
        let removed = self.parent_mut(parent)?.remove(key);
        if removed.is_some() {
            self.notify();
        }
        Ok(removed)
    }

    /// View over the root object.
    pub fn view(&mut self) -> ObservedView<'_> {
        ObservedView {
            root: self,
            path: Vec::new(),
        }
    }

    fn lookup<S: AsRef<str>>(&self, path: &[S]) -> Option<&Value> {
        let mut node = &self.root;
        for segment in path {
            node = node.as_object()?.get(segment.as_ref())?;
        }
        Some(node)
    }

    fn discipline_at<S: AsRef<str>>(&self, path: &[S], value: &Value) -> Discipline {
        match path.first() {
            None => Discipline::Deep,
            Some(top) if path.len() == 1 => self.schema.resolve(top.as_ref(), value),
            Some(_) => Discipline::of(value),
        }
    }

    fn check_write<S: AsRef<str>>(&self, path: &[S], value: Option<&Value>) -> Result<()> {
        let Some(top): Option<&str> = path.first().map(|segment| segment.as_ref()) else {
            return Err(StoreError::InvalidPath(
                "the root object cannot be replaced".to_string(),
            ));
        };

        let declared = self.schema.declared(top);
        if path.len() == 1 {
            if let (Some(Discipline::Deep), Some(value)) = (declared, value) {
                if !value.is_object() {
                    return Err(StoreError::InvalidPath(format!(
                        "field '{}' must hold an object",
                        top
                    )));
                }
            }
            return Ok(());
        }

        if declared == Some(Discipline::Atomic) {
            return Err(StoreError::InvalidPath(format!(
                "field '{}' is replaced atomically; write the whole field",
                top
            )));
        }

        // Every ancestor below the root must be an observed object.
        for depth in 1..path.len() {
            let prefix = &path[..depth];
            match self.lookup(prefix) {
                Some(value) if value.is_object() => {}
                Some(_) => {
                    return Err(StoreError::InvalidPath(format!(
                        "'{}' is a leaf; write the whole field",
                        join_path(prefix)
                    )));
                }
                None => {
                    return Err(StoreError::InvalidPath(format!(
                        "'{}' does not exist",
                        join_path(prefix)
                    )));
                }
            }
        }
        Ok(())
    }

    fn parent_mut<S: AsRef<str>>(&mut self, parent: &[S]) -> Result<&mut Map<String, Value>> {
        let mut node = &mut self.root;
        for segment in parent {
            node = node.get_mut(segment.as_ref()).ok_or_else(|| {
                StoreError::InvalidPath(format!("'{}' does not exist", join_path(parent)))
            })?;
        }
        node.as_object_mut().ok_or_else(|| {
            StoreError::InvalidPath(format!("'{}' is not an object", join_path(parent)))
        })
    }

    fn notify(&self) {
        for subscriber in &self.subscribers {
            subscriber(&self.root);
        }
    }
}

fn split_path<S: AsRef<str>>(path: &[S]) -> Result<(&str, &[S])> {
    match path.split_last() {
        Some((key, parent)) => Ok((key.as_ref(), parent)),
        None => Err(StoreError::InvalidPath("empty path".to_string())),
    }
}

fn join_path<S: AsRef<str>>(path: &[S]) -> String {
    path.iter()
        .map(|segment| segment.as_ref())
        .collect::<Vec<&str>>()
        .join(".")
}

// ============================================================================
// Views
// ============================================================================

/// Result of reading a field through a view.
pub enum Field<'v> {
    Nested(ObservedView<'v>),
    Leaf(&'v Value),
}

/// Observed window onto one object inside the root.
pub struct ObservedView<'a> {
    root: &'a mut Observed,
    path: Vec<String>,
}

impl ObservedView<'_> {
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Raw read of a direct child.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.object().and_then(|map| map.get(key))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &Value)> + '_ {
        self.object().into_iter().flat_map(|map| map.iter())
    }

    /// Reads a child; objects come back wrapped, everything else as a leaf.
    pub fn field(&mut self, key: &str) -> Option<Field<'_>> {
        let path = self.child_path(key);
        let value = self.root.lookup(&path)?;
        match self.root.discipline_at(&path, value) {
            Discipline::Deep => Some(Field::Nested(ObservedView {
                root: &mut *self.root,
                path,
            })),
            Discipline::Atomic => self.root.lookup(&path).map(Field::Leaf),
        }
    }

    /// Nested view of an object child; `None` for leaves and missing keys.
    pub fn child(&mut self, key: &str) -> Option<ObservedView<'_>> {
        match self.field(key)? {
            Field::Nested(view) => Some(view),
            Field::Leaf(_) => None,
        }
    }

    pub fn set(&mut self, key: &str, value: Value) -> Result<()> {
        let path = self.child_path(key);
        self.root.set(&path, value)
    }

    pub fn remove(&mut self, key: &str) -> Result<Option<Value>> {
        let path = self.child_path(key);
        self.root.remove(&path)
    }

    fn object(&self) -> Option<&Map<String, Value>> {
        self.root.lookup(&self.path).and_then(Value::as_object)
    }

    fn child_path(&self, key: &str) -> Vec<String> {
        let mut path = self.path.clone();
        path.push(key.to_string());
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn counting(observed: &mut Observed) -> (Arc<AtomicUsize>, Arc<Mutex<Option<Value>>>) {
        let count = Arc::new(AtomicUsize::new(0));
        let last = Arc::new(Mutex::new(None));
        let count_cb = count.clone();
        let last_cb = last.clone();
        observed.subscribe(move |state| {
            count_cb.fetch_add(1, Ordering::SeqCst);
            *last_cb.lock().unwrap() = Some(state.clone());
        });
        (count, last)
    }

    #[test]
    fn test_top_level_write_notifies_with_full_state() {
        let mut observed = Observed::new(object(json!({"a": 1, "b": {"c": 2}})));
        let (count, last) = counting(&mut observed);

        observed.set(&["a"], json!(5)).unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(
            last.lock().unwrap().clone().unwrap(),
            json!({"a": 5, "b": {"c": 2}})
        );
    }

    #[test]
    fn test_nested_write_through_views() {
        let mut observed = Observed::new(object(json!({"outer": {"inner": {"x": 1}}})));
        let (count, last) = counting(&mut observed);

        {
            let mut root = observed.view();
            let mut outer = root.child("outer").unwrap();
            let mut inner = outer.child("inner").unwrap();
            assert_eq!(inner.path(), ["outer".to_string(), "inner".to_string()]);
            inner.set("x", json!(2)).unwrap();
            inner.set("y", json!("new")).unwrap();
        }

        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(
            last.lock().unwrap().clone().unwrap(),
            json!({"outer": {"inner": {"x": 2, "y": "new"}}})
        );
    }

    #[test]
    fn test_sequences_are_leaves() {
        let mut observed = Observed::new(object(json!({"list": [1, 2], "nested": {"list": [3]}})));
        let mut root = observed.view();

        assert!(matches!(root.field("list"), Some(Field::Leaf(v)) if v == &json!([1, 2])));
        assert!(root.child("list").is_none());

        let mut nested = root.child("nested").unwrap();
        assert!(matches!(nested.field("list"), Some(Field::Leaf(_))));
        assert!(nested.field("missing").is_none());
    }

    #[test]
    fn test_write_below_sequence_rejected() {
        let mut observed = Observed::new(object(json!({"list": [1, 2]})));
        let (count, _) = counting(&mut observed);

        let err = observed.set(&["list", "0"], json!(9)).unwrap_err();
        assert!(matches!(err, StoreError::InvalidPath(_)));
        assert_eq!(count.load(Ordering::SeqCst), 0);

        observed.set(&["list"], json!([9, 2])).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_schema_disciplines() {
        let schema = FieldSchema::new().deep("chats").atomic("settings");
        let mut observed = Observed::with_schema(
            object(json!({"chats": {}, "settings": {"mode": "a"}})),
            schema,
        )
        .unwrap();

        assert!(matches!(observed.get(&["settings"]), Some(Node::Leaf(_))));
        assert!(matches!(observed.get(&["chats"]), Some(Node::Object(_))));

        let err = observed.set(&["settings", "mode"], json!("b")).unwrap_err();
        assert!(matches!(err, StoreError::InvalidPath(_)));

        let err = observed.set(&["chats"], json!([])).unwrap_err();
        assert!(matches!(err, StoreError::InvalidPath(_)));

        observed.set(&["settings"], json!({"mode": "b"})).unwrap();
        observed.set(&["chats", "1"], json!(["p"])).unwrap();
        assert_eq!(
            observed.state(),
            &json!({"chats": {"1": ["p"]}, "settings": {"mode": "b"}})
        );
    }

    #[test]
    fn test_schema_rejects_non_object_deep_field() {
        let schema = FieldSchema::new().deep("chats");
        let err = Observed::with_schema(object(json!({"chats": []})), schema).unwrap_err();
        assert!(matches!(err, StoreError::InvalidPath(_)));
    }

    #[test]
    fn test_remove_notifies_only_when_present() {
        let mut observed = Observed::new(object(json!({"m": {"k": 1}})));
        let (count, last) = counting(&mut observed);

        assert_eq!(observed.remove(&["m", "absent"]).unwrap(), None);
        assert_eq!(count.load(Ordering::SeqCst), 0);

        let removed = observed.view().child("m").unwrap().remove("k").unwrap();
        assert_eq!(removed, Some(json!(1)));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(last.lock().unwrap().clone().unwrap(), json!({"m": {}}));
    }

    #[test]
    fn test_write_into_missing_parent_fails() {
        let mut observed = Observed::new(Map::new());
        let err = observed.set(&["a", "b"], json!(1)).unwrap_err();
        assert!(matches!(err, StoreError::InvalidPath(_)));
        let err = observed.set::<&str>(&[], json!(1)).unwrap_err();
        assert!(matches!(err, StoreError::InvalidPath(_)));
    }

    #[test]
    fn test_reads_do_not_notify() {
        let mut observed = Observed::new(object(json!({"a": {"b": [1]}})));
        let (count, _) = counting(&mut observed);

        let mut root = observed.view();
        let a = root.child("a").unwrap();
        assert_eq!(a.entries().count(), 1);
        assert!(a.contains("b"));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
