use super::api_client::{location_url, ApiClient};
use super::path::Path;
use super::snapshot::Snapshot;
use super::{DatabaseError, Operation};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Ordering directive of a query. Only one can be active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderBy {
    Child(String),
    Key,
    Value,
}

impl OrderBy {
    // The REST API expects the directive as a JSON string, quotes included.
    fn wire_value(&self) -> String {
        let raw = match self {
            OrderBy::Child(path) => path.as_str(),
            OrderBy::Key => "$key",
            OrderBy::Value => "$value",
        };
        Value::String(raw.to_string()).to_string()
    }
}

/// Result-count cap. `limitToFirst` and `limitToLast` share this slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    First(u32),
    Last(u32),
}

/// The filtering, ordering and pagination parameters accumulated by a [`Query`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams {
    pub order_by: Option<OrderBy>,
    pub start_at: Option<Value>,
    pub end_at: Option<Value>,
    pub equal_to: Option<Value>,
    pub limit: Option<Limit>,
    pub shallow: bool,
}

impl QueryParams {
    pub fn is_empty(&self) -> bool {
        *self == QueryParams::default()
    }

    /// Serializes the parameters in canonical order:
    /// orderBy, startAt, endAt, equalTo, limitToFirst, limitToLast, shallow.
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();

        if let Some(order_by) = &self.order_by {
            pairs.push(("orderBy", order_by.wire_value()));
        }
        if let Some(value) = &self.start_at {
            pairs.push(("startAt", value.to_string()));
        }
        if let Some(value) = &self.end_at {
            pairs.push(("endAt", value.to_string()));
        }
        if let Some(value) = &self.equal_to {
            pairs.push(("equalTo", value.to_string()));
        }
        match self.limit {
            Some(Limit::First(n)) => pairs.push(("limitToFirst", n.to_string())),
            Some(Limit::Last(n)) => pairs.push(("limitToLast", n.to_string())),
            None => {}
        }
        if self.shallow {
            pairs.push(("shallow", "true".to_string()));
        }

        pairs
    }
}

/// A read over a database location, with ordering and filtering applied.
///
/// Every modifier leaves `self` untouched and returns a new `Query`, so a
/// query can be shared and extended from several places.
#[derive(Clone)]
pub struct Query {
    pub(crate) client: Arc<dyn ApiClient>,
    pub(crate) path: Path,
    pub(crate) params: QueryParams,
}

impl Query {
    pub(crate) fn new(client: Arc<dyn ApiClient>, path: Path) -> Self {
        Self {
            client,
            path,
            params: QueryParams::default(),
        }
    }

    fn with_params(&self, modify: impl FnOnce(&mut QueryParams)) -> Self {
        let mut params = self.params.clone();
        modify(&mut params);
        Self {
            client: Arc::clone(&self.client),
            path: self.path.clone(),
            params,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn params(&self) -> &QueryParams {
        &self.params
    }

    /// Orders results by the value of the given (possibly nested) child.
    pub fn order_by_child(&self, child: &str) -> Result<Self, DatabaseError> {
        let child_path = Path::new(child)?;
        if child_path.is_root() {
            return Err(DatabaseError::InvalidArgument(
                "orderByChild requires a non-empty child path".to_string(),
            ));
        }
        let child = child_path.as_str().trim_start_matches('/').to_string();
        Ok(self.with_params(|params| params.order_by = Some(OrderBy::Child(child))))
    }

    pub fn order_by_key(&self) -> Self {
        self.with_params(|params| params.order_by = Some(OrderBy::Key))
    }

    pub fn order_by_value(&self) -> Self {
        self.with_params(|params| params.order_by = Some(OrderBy::Value))
    }

    pub fn start_at(&self, value: impl Into<Value>) -> Result<Self, DatabaseError> {
        let value = scalar("startAt", value.into())?;
        Ok(self.with_params(|params| params.start_at = Some(value)))
    }

    pub fn end_at(&self, value: impl Into<Value>) -> Result<Self, DatabaseError> {
        let value = scalar("endAt", value.into())?;
        Ok(self.with_params(|params| params.end_at = Some(value)))
    }

    pub fn equal_to(&self, value: impl Into<Value>) -> Result<Self, DatabaseError> {
        let value = scalar("equalTo", value.into())?;
        Ok(self.with_params(|params| params.equal_to = Some(value)))
    }

    pub fn limit_to_first(&self, limit: i64) -> Result<Self, DatabaseError> {
        let limit = positive_limit("limitToFirst", limit)?;
        Ok(self.with_params(|params| params.limit = Some(Limit::First(limit))))
    }

    pub fn limit_to_last(&self, limit: i64) -> Result<Self, DatabaseError> {
        let limit = positive_limit("limitToLast", limit)?;
        Ok(self.with_params(|params| params.limit = Some(Limit::Last(limit))))
    }

    /// Returns children as `true` markers instead of their full payload.
    pub fn shallow(&self) -> Self {
        self.with_params(|params| params.shallow = true)
    }

    /// Runs the query and materializes the result.
    pub async fn get_snapshot(&self) -> Result<Snapshot, DatabaseError> {
        debug!(path = %self.path, params = ?self.params, "querying database");
        let value = self
            .client
            .get(&self.path, &self.params)
            .await
            .map_err(|source| DatabaseError::remote(Operation::Get, &self.path, source))?;

        Ok(Snapshot::new(self.path.clone(), value))
    }

    pub async fn get_value(&self) -> Result<Value, DatabaseError> {
        Ok(self.get_snapshot().await?.into_value())
    }

    /// The location and parameters of this query as a URL, for diagnostics.
    pub fn uri(&self) -> Url {
        let mut url = location_url(self.client.base_url(), &self.path);
        let pairs = self.params.to_query_pairs();
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }
        url
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("path", &self.path)
            .field("params", &self.params)
            .finish()
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.uri().as_str())
    }
}

fn scalar(name: &str, value: Value) -> Result<Value, DatabaseError> {
    match value {
        Value::Array(_) | Value::Object(_) => Err(DatabaseError::InvalidArgument(format!(
            "{} only accepts strings, numbers, booleans or null",
            name
        ))),
        scalar => Ok(scalar),
    }
}

fn positive_limit(name: &str, limit: i64) -> Result<u32, DatabaseError> {
    if limit <= 0 {
        return Err(DatabaseError::InvalidArgument(format!(
            "{} must be a positive integer, got {}",
            name, limit
        )));
    }
    u32::try_from(limit).map_err(|_| {
        DatabaseError::InvalidArgument(format!("{} is too large: {}", name, limit))
    })
}
