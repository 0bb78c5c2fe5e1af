use super::AuthError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// A user account, as returned by the Identity Toolkit API.
///
/// Serializes to (and deserializes from) its own camelCase shape; raw API
/// account documents go through [`from_response_data`](Self::from_response_data).
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct UserRecord {
    pub uid: String,
    pub email: Option<String>,
    pub email_verified: bool,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub phone_number: Option<String>,
    pub disabled: bool,
    pub metadata: UserMetadata,
    pub provider_data: Vec<UserInfo>,
    pub password_hash: Option<String>,
    pub password_salt: Option<String>,
    pub custom_claims: Map<String, Value>,
    pub tenant_id: Option<String>,
    /// Tokens issued before this instant are considered revoked.
    pub tokens_valid_after_time: Option<DateTime<Utc>>,
}

impl UserRecord {
    /// Maps a raw account document (as found in `accounts:lookup` or
    /// `accounts:batchGet` responses) into a `UserRecord`.
    ///
    /// Only `localId` is required; unknown fields are ignored.
    pub fn from_response_data(data: Value) -> Result<Self, AuthError> {
        let response: UserRecordResponse = serde_json::from_value(data)?;
        Ok(response.into())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserMetadata {
    pub creation_time: Option<DateTime<Utc>>,
    pub last_sign_in_time: Option<DateTime<Utc>>,
    pub last_refresh_time: Option<DateTime<Utc>>,
}

/// A user's account at a single identity provider (password, google.com, phone, ...).
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub uid: String,
    pub provider_id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub photo_url: Option<String>,
    pub phone_number: Option<String>,
}

// Timestamps come back as strings, but older payloads and fixtures use numbers.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl NumberOrString {
    fn as_i64(&self) -> Option<i64> {
        match self {
            NumberOrString::Integer(n) => Some(*n),
            NumberOrString::Float(f) if f.is_finite() => Some(f.trunc() as i64),
            NumberOrString::Float(_) => None,
            NumberOrString::Text(s) => s
                .parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        }
    }
}

/// Maps a list of raw account documents, as found in lookup and listing responses.
fn deserialize_accounts<'de, D>(deserializer: D) -> Result<Option<Vec<UserRecord>>, D::Error>
where
    D: Deserializer<'de>,
{
    let accounts = Option::<Vec<UserRecordResponse>>::deserialize(deserializer)?;
    Ok(accounts.map(|accounts| accounts.into_iter().map(UserRecord::from).collect()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserRecordResponse {
    local_id: String,
    email: Option<String>,
    email_verified: Option<bool>,
    display_name: Option<String>,
    photo_url: Option<String>,
    phone_number: Option<String>,
    disabled: Option<bool>,
    created_at: Option<NumberOrString>,
    last_login_at: Option<NumberOrString>,
    last_refresh_at: Option<String>,
    provider_user_info: Option<Vec<ProviderUserInfo>>,
    password_hash: Option<String>,
    salt: Option<String>,
    custom_attributes: Option<String>,
    tenant_id: Option<String>,
    valid_since: Option<NumberOrString>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProviderUserInfo {
    provider_id: String,
    raw_id: Option<String>,
    federated_id: Option<String>,
    display_name: Option<String>,
    email: Option<String>,
    photo_url: Option<String>,
    phone_number: Option<String>,
}

impl From<ProviderUserInfo> for UserInfo {
    fn from(info: ProviderUserInfo) -> Self {
        UserInfo {
            uid: info.raw_id.or(info.federated_id).unwrap_or_default(),
            provider_id: info.provider_id,
            display_name: info.display_name,
            email: info.email,
            photo_url: info.photo_url,
            phone_number: info.phone_number,
        }
    }
}

fn millis_to_time(value: Option<NumberOrString>) -> Option<DateTime<Utc>> {
    value
        .and_then(|v| v.as_i64())
        .and_then(DateTime::from_timestamp_millis)
}

impl From<UserRecordResponse> for UserRecord {
    fn from(data: UserRecordResponse) -> Self {
        let custom_claims = data
            .custom_attributes
            .as_deref()
            .and_then(|raw| serde_json::from_str::<Map<String, Value>>(raw).ok())
            .unwrap_or_default();

        let tokens_valid_after_time = data
            .valid_since
            .and_then(|v| v.as_i64())
            .filter(|secs| *secs != 0)
            .and_then(|secs| DateTime::from_timestamp(secs, 0));

        UserRecord {
            uid: data.local_id,
            email: data.email,
            email_verified: data.email_verified.unwrap_or(false),
            display_name: data.display_name,
            photo_url: data.photo_url,
            phone_number: data.phone_number,
            disabled: data.disabled.unwrap_or(false),
            metadata: UserMetadata {
                creation_time: millis_to_time(data.created_at),
                last_sign_in_time: millis_to_time(data.last_login_at),
                last_refresh_time: data
                    .last_refresh_at
                    .as_deref()
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .map(|t| t.with_timezone(&Utc)),
            },
            provider_data: data
                .provider_user_info
                .unwrap_or_default()
                .into_iter()
                .map(UserInfo::from)
                .collect(),
            password_hash: data.password_hash,
            password_salt: data.salt,
            custom_claims,
            tenant_id: data.tenant_id,
            tokens_valid_after_time,
        }
    }
}

/// Identifies the user an operation applies to, either by uid or by a record
/// previously fetched.
#[derive(Debug, Clone, PartialEq)]
pub enum UserIdentifier {
    Uid(String),
    User(UserRecord),
}

impl UserIdentifier {
    pub fn uid(&self) -> &str {
        match self {
            UserIdentifier::Uid(uid) => uid,
            UserIdentifier::User(user) => &user.uid,
        }
    }
}

impl From<&str> for UserIdentifier {
    fn from(uid: &str) -> Self {
        UserIdentifier::Uid(uid.to_string())
    }
}

impl From<String> for UserIdentifier {
    fn from(uid: String) -> Self {
        UserIdentifier::Uid(uid)
    }
}

impl From<UserRecord> for UserIdentifier {
    fn from(user: UserRecord) -> Self {
        UserIdentifier::User(user)
    }
}

impl From<&UserRecord> for UserIdentifier {
    fn from(user: &UserRecord) -> Self {
        UserIdentifier::User(user.clone())
    }
}

/// Identifies the recipient of an out-of-band email, either by address or by
/// a record carrying one.
#[derive(Debug, Clone, PartialEq)]
pub enum EmailIdentifier {
    Email(String),
    User(UserRecord),
}

impl EmailIdentifier {
    pub fn email(&self) -> Result<&str, AuthError> {
        match self {
            EmailIdentifier::Email(email) => Ok(email),
            EmailIdentifier::User(user) => user.email.as_deref().ok_or_else(|| {
                AuthError::InvalidArgument(format!("User {} has no email address", user.uid))
            }),
        }
    }
}

impl From<&str> for EmailIdentifier {
    fn from(email: &str) -> Self {
        EmailIdentifier::Email(email.to_string())
    }
}

impl From<String> for EmailIdentifier {
    fn from(email: String) -> Self {
        EmailIdentifier::Email(email)
    }
}

impl From<UserRecord> for EmailIdentifier {
    fn from(user: UserRecord) -> Self {
        EmailIdentifier::User(user)
    }
}

impl From<&UserRecord> for EmailIdentifier {
    fn from(user: &UserRecord) -> Self {
        EmailIdentifier::User(user.clone())
    }
}

#[derive(Debug, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
}

#[derive(Debug, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub local_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(rename = "disableUser", skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_attributes: Option<String>,
    /// Epoch seconds; tokens issued earlier are revoked.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_since: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListUsersResponse {
    #[serde(default, deserialize_with = "deserialize_accounts")]
    pub users: Option<Vec<UserRecord>>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GetAccountInfoRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_id: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GetAccountInfoResponse {
    #[serde(default, deserialize_with = "deserialize_accounts")]
    pub users: Option<Vec<UserRecord>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AccountIdResponse {
    pub local_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DeleteAccountRequest {
    pub local_id: String,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub(crate) enum OobRequestType {
    PasswordReset,
    VerifyEmail,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OobCodeRequest<'a> {
    pub request_type: OobRequestType,
    pub email: &'a str,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub return_oob_link: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OobCodeResponse {
    pub oob_link: Option<String>,
}
