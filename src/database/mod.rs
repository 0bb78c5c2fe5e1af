//! Firebase Realtime Database module.
//!
//! Data is addressed with [`Reference`]s, which can be navigated
//! (`parent`, `child`, `root`), written to (`set`, `update`, `remove`, `push`)
//! and turned into [`Query`]s by applying ordering and filtering modifiers.
//! Reads return immutable [`Snapshot`]s.
//!
//! Nothing is cached locally: every read and write is a single round-trip to
//! the database REST API.
//!
//! ```rust,no_run
//! # use firebase_admin_rest::database::{FirebaseDatabase, DatabaseError};
//! # async fn run(db: FirebaseDatabase) -> Result<(), DatabaseError> {
//! let scores = db.reference("scores")?;
//! let top = scores.order_by_value().limit_to_last(3)?.get_snapshot().await?;
//! for (player, score) in top.children() {
//!     println!("{}: {}", player, score.value());
//! }
//! # Ok(())
//! # }
//! ```

pub mod api_client;
pub mod path;
pub mod query;
pub mod reference;
pub mod snapshot;


pub use self::api_client::{ApiClient, ApiError, HttpApiClient};
pub use self::path::Path;
pub use self::query::{Limit, OrderBy, Query, QueryParams};
pub use self::reference::Reference;
pub use self::snapshot::Snapshot;

use crate::core::middleware::AuthMiddleware;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

/// The remote operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Get,
    Set,
    Update,
    Remove,
    Push,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Get => "get",
            Operation::Set => "set",
            Operation::Update => "update",
            Operation::Remove => "remove",
            Operation::Push => "push",
        };
        f.write_str(name)
    }
}

/// Errors that can occur during Realtime Database operations.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Navigation past the root.
    #[error("Out of range: {0}")]
    OutOfRange(String),
    /// A malformed path segment or query argument. Raised before any request is sent.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// The transport or the service rejected the operation.
    #[error("{operation} at {path} failed: {source}")]
    RemoteOperationFailed {
        operation: Operation,
        path: Path,
        #[source]
        source: ApiError,
    },
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl DatabaseError {
    pub(crate) fn remote(operation: Operation, path: &Path, source: ApiError) -> Self {
        DatabaseError::RemoteOperationFailed {
            operation,
            path: path.clone(),
            source,
        }
    }
}

/// Client for a Firebase Realtime Database instance.
#[derive(Clone)]
pub struct FirebaseDatabase {
    client: Arc<dyn ApiClient>,
}

impl FirebaseDatabase {
    /// Creates a new `FirebaseDatabase` for the database at `database_url`
    /// (e.g. `https://my-project-default-rtdb.firebaseio.com`).
    ///
    /// This is typically called via `FirebaseApp::database()`.
    pub fn new(middleware: AuthMiddleware, database_url: Url) -> Self {
        Self::with_api_client(Arc::new(HttpApiClient::authorized(middleware, database_url)))
    }

    /// Uses a custom transport for all database operations.
    pub fn with_api_client(client: Arc<dyn ApiClient>) -> Self {
        Self { client }
    }

    #[cfg(test)]
    pub(crate) fn new_with_client(
        client: reqwest_middleware::ClientWithMiddleware,
        database_url: Url,
    ) -> Self {
        Self::with_api_client(Arc::new(HttpApiClient::new(client, database_url)))
    }

    pub fn root(&self) -> Reference {
        Reference::new(Arc::clone(&self.client), Path::root())
    }

    /// Gets a `Reference` to the slash-separated `path`, e.g. `"users/alice"`.
    pub fn reference(&self, path: &str) -> Result<Reference, DatabaseError> {
        Ok(Reference::new(Arc::clone(&self.client), Path::new(path)?))
    }
}
