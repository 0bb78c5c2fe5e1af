//! Server-side access to Firebase over its REST APIs: the Realtime Database,
//! Authentication user management and Cloud Messaging.
//!
//! ```rust,no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use firebase_admin_rest::FirebaseApp;
//!
//! let app = FirebaseApp::from_service_account_file("service-account.json").await?;
//! let db = app.database()?;
//! let user = db.reference("users/alice")?.get_value().await?;
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "auth")]
pub mod auth;
pub mod core;
#[cfg(feature = "database")]
pub mod database;
#[cfg(feature = "messaging")]
pub mod messaging;

#[cfg(feature = "auth")]
use crate::auth::{AuthError, FirebaseAuth};
use crate::core::middleware::AuthMiddleware;
#[cfg(feature = "database")]
use crate::database::{DatabaseError, FirebaseDatabase};
#[cfg(feature = "messaging")]
use crate::messaging::{FirebaseMessaging, MessagingError};
use std::path::Path;
use url::Url;
use yup_oauth2::ServiceAccountKey;

const DEFAULT_DATABASE_URL: &str = "https://{project_id}-default-rtdb.firebaseio.com";

/// Entry point holding the service account credentials shared by all services.
#[derive(Clone)]
pub struct FirebaseApp {
    middleware: AuthMiddleware,
    database_url: Option<Url>,
}

impl FirebaseApp {
    pub fn new(service_account_key: ServiceAccountKey) -> Self {
        Self {
            middleware: AuthMiddleware::new(service_account_key),
            database_url: None,
        }
    }

    /// Reads a service account JSON key file, as downloaded from the Firebase console.
    pub async fn from_service_account_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let key = yup_oauth2::read_service_account_key(path).await?;
        Ok(Self::new(key))
    }

    /// Overrides the Realtime Database URL, needed for non-default instances.
    pub fn with_database_url(mut self, database_url: Url) -> Self {
        self.database_url = Some(database_url);
        self
    }

    pub fn project_id(&self) -> Option<&str> {
        self.middleware.project_id()
    }

    /// The configured database URL, or the project's default instance.
    pub fn database_url(&self) -> Option<Url> {
        if let Some(url) = &self.database_url {
            return Some(url.clone());
        }
        let project_id = self.project_id().filter(|id| !id.is_empty())?;
        Url::parse(&DEFAULT_DATABASE_URL.replace("{project_id}", project_id)).ok()
    }

    #[cfg(feature = "auth")]
    pub fn auth(&self) -> Result<FirebaseAuth, AuthError> {
        FirebaseAuth::new(self.middleware.clone())
    }

    #[cfg(feature = "database")]
    pub fn database(&self) -> Result<FirebaseDatabase, DatabaseError> {
        let url = self.database_url().ok_or_else(|| {
            DatabaseError::InvalidArgument(
                "No database URL configured and the service account has no project_id"
                    .to_string(),
            )
        })?;
        Ok(FirebaseDatabase::new(self.middleware.clone(), url))
    }

    #[cfg(feature = "messaging")]
    pub fn messaging(&self) -> Result<FirebaseMessaging, MessagingError> {
        FirebaseMessaging::new(self.middleware.clone())
    }
}
