//! Firebase Authentication module.
//!
//! User management over the Identity Toolkit REST API, ID token verification
//! and custom token creation.

pub mod keys;
pub mod models;
pub mod token;
pub mod verifier;

#[cfg(test)]
mod tests;

use crate::auth::models::{
    AccountIdResponse, CreateUserRequest, DeleteAccountRequest, EmailIdentifier,
    GetAccountInfoRequest, GetAccountInfoResponse, ListUsersResponse, OobCodeRequest,
    OobCodeResponse, OobRequestType, UpdateUserRequest, UserIdentifier, UserRecord,
};
use crate::auth::token::{CustomTokenClaims, ServiceAccountSigner, TokenSigner, TokenSigningError};
use crate::auth::verifier::{
    FirebaseTokenClaims, IdTokenVerifier, TokenVerificationError, TokenVerifier,
};
use crate::core::authorized_client;
use crate::core::middleware::AuthMiddleware;
use crate::core::parse_error_response;
use futures::stream::{self, Stream};
use reqwest::header;
use reqwest_middleware::ClientWithMiddleware;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

const IDENTITY_TOOLKIT_V1_API: &str =
    "https://identitytoolkit.googleapis.com/v1/projects/{project_id}";

// The batchGet endpoint returns at most this many accounts per page.
const MAX_LIST_USERS_PAGE_SIZE: u32 = 1000;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("HTTP Request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Middleware error: {0}")]
    MiddlewareError(#[from] reqwest_middleware::Error),
    #[error("API error: {0}")]
    ApiError(String),
    #[error("User not found")]
    UserNotFound,
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("The ID token of user {0} has been revoked")]
    RevokedIdToken(String),
    #[error("Token verification failed: {0}")]
    TokenVerification(#[from] TokenVerificationError),
    #[error("Token signing failed: {0}")]
    TokenSigning(#[from] TokenSigningError),
    #[error("No {0} configured")]
    NotConfigured(&'static str),
}

/// Client for Firebase Authentication.
#[derive(Clone)]
pub struct FirebaseAuth {
    client: ClientWithMiddleware,
    base_url: String,
    verifier: Option<Arc<dyn TokenVerifier>>,
    signer: Option<Arc<dyn TokenSigner>>,
}

impl FirebaseAuth {
    /// Creates a new `FirebaseAuth` instance.
    ///
    /// This is typically called via `FirebaseApp::auth()`. Fails with
    /// `NotConfigured` when the service account has no `project_id`.
    pub fn new(middleware: AuthMiddleware) -> Result<Self, AuthError> {
        let project_id = middleware
            .project_id()
            .filter(|id| !id.is_empty())
            .ok_or(AuthError::NotConfigured("project_id"))?
            .to_string();
        let base_url = IDENTITY_TOOLKIT_V1_API.replace("{project_id}", &project_id);
        let signer = ServiceAccountSigner::new(&middleware.key);

        Ok(Self {
            client: authorized_client(middleware),
            base_url,
            verifier: Some(Arc::new(IdTokenVerifier::new(project_id))),
            signer: Some(Arc::new(signer)),
        })
    }

    #[cfg(test)]
    pub(crate) fn new_with_client(client: ClientWithMiddleware, base_url: String) -> Self {
        Self {
            client,
            base_url,
            verifier: None,
            signer: None,
        }
    }

    pub fn with_token_verifier(mut self, verifier: Arc<dyn TokenVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn with_token_signer(mut self, signer: Arc<dyn TokenSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    async fn post<B: Serialize, R: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
        context: &str,
    ) -> Result<R, AuthError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        debug!(%url, "auth request");

        let response = self
            .client
            .post(&url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(serde_json::to_vec(body)?)
            .send()
            .await?;

        if !response.status().is_success() {
            let message = parse_error_response(response, context).await;
            warn!(%message, "auth request failed");
            return Err(AuthError::ApiError(message));
        }

        Ok(response.json().await?)
    }

    async fn get_account_info(&self, request: GetAccountInfoRequest) -> Result<UserRecord, AuthError> {
        let result: GetAccountInfoResponse = self
            .post("accounts:lookup", &request, "Get user failed")
            .await?;

        result
            .users
            .and_then(|mut users| users.pop())
            .ok_or(AuthError::UserNotFound)
    }

    pub async fn get_user(&self, uid: &str) -> Result<UserRecord, AuthError> {
        self.get_account_info(GetAccountInfoRequest {
            local_id: Some(vec![uid.to_string()]),
            email: None,
            phone_number: None,
        })
        .await
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<UserRecord, AuthError> {
        self.get_account_info(GetAccountInfoRequest {
            local_id: None,
            email: Some(vec![email.to_string()]),
            phone_number: None,
        })
        .await
    }

    pub async fn get_user_by_phone_number(&self, phone: &str) -> Result<UserRecord, AuthError> {
        self.get_account_info(GetAccountInfoRequest {
            local_id: None,
            email: None,
            phone_number: Some(vec![phone.to_string()]),
        })
        .await
    }

    /// Fetches a single page of accounts.
    pub async fn list_users_page(
        &self,
        max_results: u32,
        page_token: Option<&str>,
    ) -> Result<ListUsersResponse, AuthError> {
        let url = format!("{}/accounts:batchGet", self.base_url);

        let mut params = vec![("maxResults", max_results.to_string())];
        if let Some(token) = page_token {
            params.push(("nextPageToken", token.to_string()));
        }
        debug!(%url, max_results, "listing users");

        let response = self.client.get(&url).query(&params).send().await?;

        if !response.status().is_success() {
            return Err(AuthError::ApiError(
                parse_error_response(response, "List users failed").await,
            ));
        }

        Ok(response.json().await?)
    }

    /// Lists up to `max_results` users, fetching `batch_size` accounts per request.
    ///
    /// Nothing is requested until the returned listing is streamed.
    pub fn list_users(&self, max_results: usize, batch_size: u32) -> UserListing<'_> {
        UserListing {
            auth: self,
            max_results,
            batch_size: batch_size.clamp(1, MAX_LIST_USERS_PAGE_SIZE),
        }
    }

    /// Creates a user and returns the stored record.
    pub async fn create_user(&self, request: CreateUserRequest) -> Result<UserRecord, AuthError> {
        // The create response only carries the new uid.
        let created: AccountIdResponse = self
            .post("accounts", &request, "Create user failed")
            .await?;
        self.get_user(&created.local_id).await
    }

    pub async fn create_user_with_email_and_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<UserRecord, AuthError> {
        self.create_user(CreateUserRequest {
            email: Some(email.to_string()),
            password: Some(password.to_string()),
            ..Default::default()
        })
        .await
    }

    pub async fn create_anonymous_user(&self) -> Result<UserRecord, AuthError> {
        self.create_user(CreateUserRequest::default()).await
    }

    pub async fn update_user(&self, request: UpdateUserRequest) -> Result<UserRecord, AuthError> {
        let updated: AccountIdResponse = self
            .post("accounts:update", &request, "Update user failed")
            .await?;
        self.get_user(&updated.local_id).await
    }

    pub async fn change_user_password(
        &self,
        user: impl Into<UserIdentifier>,
        new_password: &str,
    ) -> Result<UserRecord, AuthError> {
        self.update_user(UpdateUserRequest {
            local_id: user.into().uid().to_string(),
            password: Some(new_password.to_string()),
            ..Default::default()
        })
        .await
    }

    pub async fn change_user_email(
        &self,
        user: impl Into<UserIdentifier>,
        new_email: &str,
    ) -> Result<UserRecord, AuthError> {
        self.update_user(UpdateUserRequest {
            local_id: user.into().uid().to_string(),
            email: Some(new_email.to_string()),
            ..Default::default()
        })
        .await
    }

    pub async fn delete_user(&self, user: impl Into<UserIdentifier>) -> Result<(), AuthError> {
        let request = DeleteAccountRequest {
            local_id: user.into().uid().to_string(),
        };
        let _: Value = self
            .post("accounts:delete", &request, "Delete user failed")
            .await?;
        Ok(())
    }

    async fn send_oob_code(
        &self,
        request_type: OobRequestType,
        recipient: EmailIdentifier,
        return_oob_link: bool,
    ) -> Result<Option<String>, AuthError> {
        let request = OobCodeRequest {
            request_type,
            email: recipient.email()?,
            return_oob_link,
        };
        let response: OobCodeResponse = self
            .post("accounts:sendOobCode", &request, "Send OOB code failed")
            .await?;
        Ok(response.oob_link)
    }

    pub async fn send_email_verification(
        &self,
        user: impl Into<EmailIdentifier>,
    ) -> Result<(), AuthError> {
        self.send_oob_code(OobRequestType::VerifyEmail, user.into(), false)
            .await?;
        Ok(())
    }

    pub async fn send_password_reset_email(
        &self,
        user: impl Into<EmailIdentifier>,
    ) -> Result<(), AuthError> {
        self.send_oob_code(OobRequestType::PasswordReset, user.into(), false)
            .await?;
        Ok(())
    }

    /// Generates a password reset link without sending an email.
    pub async fn generate_password_reset_link(
        &self,
        user: impl Into<EmailIdentifier>,
    ) -> Result<String, AuthError> {
        self.send_oob_code(OobRequestType::PasswordReset, user.into(), true)
            .await?
            .ok_or_else(|| AuthError::ApiError("Response did not contain an oobLink".to_string()))
    }

    pub async fn generate_email_verification_link(
        &self,
        user: impl Into<EmailIdentifier>,
    ) -> Result<String, AuthError> {
        self.send_oob_code(OobRequestType::VerifyEmail, user.into(), true)
            .await?
            .ok_or_else(|| AuthError::ApiError("Response did not contain an oobLink".to_string()))
    }

    /// Revokes all refresh tokens of the user. ID tokens issued before this
    /// call are rejected by [`verify_id_token`](Self::verify_id_token) with
    /// `check_revoked`. Returns the uid.
    pub async fn revoke_refresh_tokens(
        &self,
        user: impl Into<UserIdentifier>,
    ) -> Result<String, AuthError> {
        let uid = user.into().uid().to_string();
        let request = UpdateUserRequest {
            local_id: uid.clone(),
            valid_since: Some(chrono::Utc::now().timestamp().to_string()),
            ..Default::default()
        };
        let _: AccountIdResponse = self
            .post("accounts:update", &request, "Revoke refresh tokens failed")
            .await?;
        Ok(uid)
    }

    /// Verifies an ID token and returns its claims.
    ///
    /// With `check_revoked`, the user is looked up and the token is rejected if
    /// it was issued before the user's tokens were revoked.
    pub async fn verify_id_token(
        &self,
        token: &str,
        check_revoked: bool,
    ) -> Result<FirebaseTokenClaims, AuthError> {
        let verifier = self
            .verifier
            .as_ref()
            .ok_or(AuthError::NotConfigured("token verifier"))?;
        let claims = verifier.verify(token).await?;

        if check_revoked {
            let user = self.get_user(&claims.sub).await?;
            if let Some(valid_since) = user.tokens_valid_after_time {
                if (claims.auth_time as i64) < valid_since.timestamp() {
                    return Err(AuthError::RevokedIdToken(claims.sub));
                }
            }
        }

        Ok(claims)
    }

    /// Creates a custom token for `uid`, optionally carrying extra claims.
    ///
    /// The token expires after `expires_in`, one hour if `None` (also the maximum).
    pub fn create_custom_token(
        &self,
        uid: &str,
        claims: Option<Map<String, Value>>,
        expires_in: Option<chrono::Duration>,
    ) -> Result<String, AuthError> {
        let signer = self
            .signer
            .as_ref()
            .ok_or(AuthError::NotConfigured("token signer"))?;
        let mut claims =
            CustomTokenClaims::new(signer.issuer(), uid, claims, chrono::Utc::now().timestamp())?;
        if let Some(lifetime) = expires_in {
            claims = claims.expires_in(lifetime)?;
        }
        Ok(signer.sign(&claims)?)
    }
}

/// A lazily fetched listing of user accounts.
///
/// Each call to [`stream`](UserListing::stream) starts from the first page.
pub struct UserListing<'a> {
    auth: &'a FirebaseAuth,
    max_results: usize,
    batch_size: u32,
}

struct ListingState {
    page_token: Option<String>,
    buffer: VecDeque<UserRecord>,
    yielded: usize,
    exhausted: bool,
}

impl<'a> UserListing<'a> {
    /// Streams the users one at a time, requesting a new page only when the
    /// previous one has been consumed.
    pub fn stream(&self) -> impl Stream<Item = Result<UserRecord, AuthError>> + 'a {
        let auth = self.auth;
        let max_results = self.max_results;
        let batch_size = self.batch_size;

        let state = ListingState {
            page_token: None,
            buffer: VecDeque::new(),
            yielded: 0,
            exhausted: false,
        };

        stream::try_unfold(state, move |state| {
            next_user(auth, max_results, batch_size, state)
        })
    }
}

async fn next_user(
    auth: &FirebaseAuth,
    max_results: usize,
    batch_size: u32,
    mut state: ListingState,
) -> Result<Option<(UserRecord, ListingState)>, AuthError> {
    loop {
        if state.yielded >= max_results {
            return Ok(None);
        }
        if let Some(user) = state.buffer.pop_front() {
            state.yielded += 1;
            return Ok(Some((user, state)));
        }
        if state.exhausted {
            return Ok(None);
        }

        let remaining = u32::try_from(max_results - state.yielded).unwrap_or(u32::MAX);
        let page = auth
            .list_users_page(batch_size.min(remaining), state.page_token.as_deref())
            .await?;

        state.buffer.extend(page.users.unwrap_or_default());
        state.page_token = page.next_page_token.filter(|token| !token.is_empty());
        state.exhausted = state.page_token.is_none();
    }
}
