use super::path::Path;
use super::DatabaseError;
use serde::de::DeserializeOwned;
use serde_json::{map, Value};
use std::iter::Enumerate;
use std::slice;

/// An immutable copy of the data read from a database location.
///
/// A location without data reads as `null`; such a snapshot does not
/// [`exist`](Snapshot::exists).
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    path: Path,
    value: Value,
}

impl Snapshot {
    pub(crate) fn new(path: Path, value: Value) -> Self {
        Self { path, value }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The key of the location this snapshot was read from, `None` for the root.
    pub fn key(&self) -> Option<&str> {
        self.path.key()
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    pub fn exists(&self) -> bool {
        !self.value.is_null()
    }

    /// Deserializes the value. Returns `Ok(None)` if there is no data.
    pub fn val<T: DeserializeOwned>(&self) -> Result<Option<T>, DatabaseError> {
        if !self.exists() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(self.value.clone())?))
    }

    /// Snapshot of a descendant location. Missing descendants are returned as
    /// snapshots that do not exist.
    pub fn child(&self, relative: &str) -> Result<Snapshot, DatabaseError> {
        let path = self.path.child(relative)?;
        let relative = Path::new(relative)?;

        let mut current = Some(&self.value);
        for segment in relative.segments() {
            current = current.and_then(|value| match value {
                Value::Object(map) => map.get(segment),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            });
        }

        Ok(Snapshot::new(path, current.cloned().unwrap_or(Value::Null)))
    }

    pub fn has_child(&self, relative: &str) -> bool {
        self.child(relative).map(|child| child.exists()).unwrap_or(false)
    }

    pub fn has_children(&self) -> bool {
        self.num_children() > 0
    }

    pub fn num_children(&self) -> usize {
        match &self.value {
            Value::Object(map) => map.len(),
            Value::Array(items) => items.len(),
            _ => 0,
        }
    }

    /// Iterates over the direct children as `(key, snapshot)` pairs.
    ///
    /// Arrays are keyed by their index. Scalars and missing data have no
    /// children. Each call starts a fresh iteration.
    pub fn children(&self) -> Children<'_> {
        let inner = match &self.value {
            Value::Object(map) => ChildrenInner::Object(map.iter()),
            Value::Array(items) => ChildrenInner::Array(items.iter().enumerate()),
            _ => ChildrenInner::Empty,
        };
        Children {
            path: &self.path,
            inner,
        }
    }

    pub fn for_each_child<F>(&self, mut f: F)
    where
        F: FnMut(&str, &Snapshot),
    {
        for (key, child) in self.children() {
            f(&key, &child);
        }
    }
}

/// Iterator returned by [`Snapshot::children`].
pub struct Children<'a> {
    path: &'a Path,
    inner: ChildrenInner<'a>,
}

enum ChildrenInner<'a> {
    Object(map::Iter<'a>),
    Array(Enumerate<slice::Iter<'a, Value>>),
    Empty,
}

impl<'a> Iterator for Children<'a> {
    type Item = (String, Snapshot);

    fn next(&mut self) -> Option<Self::Item> {
        let (key, value) = match &mut self.inner {
            ChildrenInner::Object(iter) => {
                let (key, value) = iter.next()?;
                (key.clone(), value)
            }
            ChildrenInner::Array(iter) => {
                let (index, value) = iter.next()?;
                (index.to_string(), value)
            }
            ChildrenInner::Empty => return None,
        };
        let child = Snapshot::new(self.path.child_unchecked(&key), value.clone());
        Some((key, child))
    }
}
