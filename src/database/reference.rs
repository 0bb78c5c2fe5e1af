use super::api_client::{location_url, ApiClient};
use super::path::{self, Path};
use super::query::Query;
use super::snapshot::Snapshot;
use super::{DatabaseError, Operation};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// A handle to a location in the database.
///
/// Navigation never touches the network. Writes go straight to the server and
/// return `&self` so they can be chained.
#[derive(Clone)]
pub struct Reference {
    client: Arc<dyn ApiClient>,
    path: Path,
}

impl Reference {
    pub(crate) fn new(client: Arc<dyn ApiClient>, path: Path) -> Self {
        Self { client, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The last segment of the path, `None` for the root.
    pub fn key(&self) -> Option<&str> {
        self.path.key()
    }

    pub fn parent(&self) -> Result<Reference, DatabaseError> {
        Ok(self.at(path::parent_of(&self.path)?))
    }

    pub fn root(&self) -> Reference {
        self.at(Path::root())
    }

    /// A reference to `relative` below this location. `relative` may contain `/`.
    pub fn child(&self, relative: &str) -> Result<Reference, DatabaseError> {
        let path = path::join(&self.path, relative)?;
        if path == self.path {
            return Err(DatabaseError::InvalidArgument(format!(
                "Invalid child path '{}'",
                relative
            )));
        }
        Ok(self.at(path))
    }

    fn at(&self, path: Path) -> Reference {
        Reference::new(Arc::clone(&self.client), path)
    }

    /// This location as a query without any parameters.
    pub fn query(&self) -> Query {
        Query::new(Arc::clone(&self.client), self.path.clone())
    }

    pub fn order_by_child(&self, child: &str) -> Result<Query, DatabaseError> {
        self.query().order_by_child(child)
    }

    pub fn order_by_key(&self) -> Query {
        self.query().order_by_key()
    }

    pub fn order_by_value(&self) -> Query {
        self.query().order_by_value()
    }

    pub fn start_at(&self, value: impl Into<Value>) -> Result<Query, DatabaseError> {
        self.query().start_at(value)
    }

    pub fn end_at(&self, value: impl Into<Value>) -> Result<Query, DatabaseError> {
        self.query().end_at(value)
    }

    pub fn equal_to(&self, value: impl Into<Value>) -> Result<Query, DatabaseError> {
        self.query().equal_to(value)
    }

    pub fn limit_to_first(&self, limit: i64) -> Result<Query, DatabaseError> {
        self.query().limit_to_first(limit)
    }

    pub fn limit_to_last(&self, limit: i64) -> Result<Query, DatabaseError> {
        self.query().limit_to_last(limit)
    }

    pub fn shallow(&self) -> Query {
        self.query().shallow()
    }

    pub async fn get_snapshot(&self) -> Result<Snapshot, DatabaseError> {
        self.query().get_snapshot().await
    }

    pub async fn get_value(&self) -> Result<Value, DatabaseError> {
        self.query().get_value().await
    }

    pub fn uri(&self) -> Url {
        location_url(self.client.base_url(), &self.path)
    }

    /// Replaces the data at this location.
    pub async fn set<T: Serialize + ?Sized>(&self, value: &T) -> Result<&Self, DatabaseError> {
        let value = serde_json::to_value(value)?;
        debug!(path = %self.path, "setting value");

        self.client
            .set(&self.path, &value)
            .await
            .map_err(|source| DatabaseError::remote(Operation::Set, &self.path, source))?;

        Ok(self)
    }

    /// Writes the given children, leaving all other children untouched.
    ///
    /// `values` must serialize to a JSON object; keys may be nested paths.
    pub async fn update<T: Serialize + ?Sized>(&self, values: &T) -> Result<&Self, DatabaseError> {
        let values = match serde_json::to_value(values)? {
            Value::Object(map) => map,
            other => {
                return Err(DatabaseError::InvalidArgument(format!(
                    "update expects a mapping of children, got {}",
                    other
                )))
            }
        };
        debug!(path = %self.path, keys = values.len(), "updating children");

        self.client
            .update(&self.path, &values)
            .await
            .map_err(|source| DatabaseError::remote(Operation::Update, &self.path, source))?;

        Ok(self)
    }

    pub async fn remove(&self) -> Result<&Self, DatabaseError> {
        debug!(path = %self.path, "removing value");

        self.client
            .remove(&self.path)
            .await
            .map_err(|source| DatabaseError::remote(Operation::Remove, &self.path, source))?;

        Ok(self)
    }

    /// Stores `value` under a new, time-ordered child key generated by the
    /// server and returns a reference to it.
    pub async fn push<T: Serialize + ?Sized>(&self, value: &T) -> Result<Reference, DatabaseError> {
        let value = serde_json::to_value(value)?;

        let key = self
            .client
            .push(&self.path, &value)
            .await
            .map_err(|source| DatabaseError::remote(Operation::Push, &self.path, source))?;
        debug!(path = %self.path, %key, "pushed child");

        self.child(&key)
    }
}

impl From<Reference> for Query {
    fn from(reference: Reference) -> Self {
        Query::new(reference.client, reference.path)
    }
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reference").field("path", &self.path).finish()
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.uri().as_str())
    }
}
