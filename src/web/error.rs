use axum::{Json, http::StatusCode, response::IntoResponse};
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    auth::{CryptError, OAuthError},
    error::log_error,
    model::{DatabaseError, ResourceType},
    progress::ProgressError,
    storage::{StorageError, UploadError},
};

pub type WebResult<T> = std::result::Result<T, WebError>;

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("RegistrationUserConflict")]
    RegistrationUserConflict,

    #[error("RegistrationInvalidInput: {0}")]
    RegistrationInvalidInput(String),
}

#[derive(Debug, Error)]
pub enum AuthenticationError {
    #[error("AuthenticationTokenInvalid, source: {source_name}. Error: {error}")]
    AuthenticationTokenInvalid {
        source_name: String,
        error: CryptError,
    },

    #[error("AuthenticationRequired")]
    AuthenticationRequired,

    #[error("AuthenticationInvalidCredentials")]
    AuthenticationInvalidCredentials,

    #[error("AuthenticationRefreshRejected")]
    AuthenticationRefreshRejected,

    #[error("AuthenticationAccountLocked until {until}")]
    AuthenticationAccountLocked { until: DateTime<Utc> },

    #[error("AuthenticationAccountInactive: {status}")]
    AuthenticationAccountInactive { status: String },

    #[error("AuthenticationStaffRequired")]
    AuthenticationStaffRequired,

    #[error("AuthenticationOAuthFailed. Error: {0}")]
    AuthenticationOAuthFailed(OAuthError),
}

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("ResourceNotFound: {resource_type:?}")]
    ResourceNotFound { resource_type: ResourceType },

    #[error("ResourceForbidden: {resource_type:?}")]
    ResourceForbidden { resource_type: ResourceType },

    #[error("ResourceFetchError: {resource_type:?}. Error: {error}")]
    ResourceFetchError {
        resource_type: ResourceType,
        error: DatabaseError,
    },

    #[error("ResourceBadRequest: {resource_type:?}. Reason: {reason}")]
    ResourceBadRequest {
        resource_type: ResourceType,
        reason: String,
    },
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("ServerCryptError: {0}")]
    ServerCryptError(#[from] CryptError),

    #[error("ServerStorageError: {0}")]
    ServerStorageError(#[from] StorageError),

    #[error("ServerUnavailable: {0}")]
    ServerUnavailable(String),
}

impl ServerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ServerUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn client_display(&self) -> String {
        match self {
            Self::ServerUnavailable(what) => format!("Service unavailable: {what}."),
            _ => String::from("Internal server error."),
        }
    }
}

impl RegistrationError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::RegistrationUserConflict => StatusCode::CONFLICT,
            Self::RegistrationInvalidInput(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn client_display(&self) -> String {
        match self {
            Self::RegistrationUserConflict => {
                String::from("Registration error, user already exists.")
            }
            Self::RegistrationInvalidInput(reason) => format!("Registration error, {reason}"),
        }
    }
}

impl AuthenticationError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::AuthenticationTokenInvalid { .. } => StatusCode::UNAUTHORIZED,
            Self::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            Self::AuthenticationInvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::AuthenticationRefreshRejected => StatusCode::UNAUTHORIZED,
            Self::AuthenticationAccountLocked { .. } => StatusCode::LOCKED,
            Self::AuthenticationAccountInactive { .. } => StatusCode::FORBIDDEN,
            Self::AuthenticationStaffRequired => StatusCode::FORBIDDEN,
            Self::AuthenticationOAuthFailed(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn client_display(&self) -> String {
        match self {
            Self::AuthenticationTokenInvalid { .. } => {
                String::from("Authentication error, token invalid or expired.")
            }
            Self::AuthenticationRequired => String::from("Authentication required."),
            Self::AuthenticationInvalidCredentials => {
                String::from("Authentication error, user not found or password is invalid.")
            }
            Self::AuthenticationRefreshRejected => {
                String::from("Authentication error, refresh token invalid or revoked.")
            }
            Self::AuthenticationAccountLocked { until } => format!(
                "Authentication error, account locked until {}.",
                until.to_rfc3339()
            ),
            Self::AuthenticationAccountInactive { status } => {
                format!("Authentication error, account is {status}.")
            }
            Self::AuthenticationStaffRequired => {
                String::from("Instructor or admin role required.")
            }
            Self::AuthenticationOAuthFailed(_) => {
                String::from("Authentication error, Google sign-in failed.")
            }
        }
    }
}

impl ResourceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ResourceNotFound { .. } => StatusCode::NOT_FOUND,
            Self::ResourceForbidden { .. } => StatusCode::FORBIDDEN,
            Self::ResourceFetchError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ResourceBadRequest { .. } => StatusCode::BAD_REQUEST,
        }
    }

    pub fn client_display(&self) -> String {
        match self {
            Self::ResourceNotFound { .. } => String::from("Resource error, resource not found."),
            Self::ResourceForbidden { .. } => String::from("Resource error, resource forbidden."),
            Self::ResourceFetchError { .. } => {
                String::from("Resource error, unable to fetch resource.")
            }
            Self::ResourceBadRequest { reason, .. } => reason.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum WebError {
    #[error("ResourceError - {0}")]
    ResourceError(#[from] ResourceError),
    #[error("AuthenticationError - {0}")]
    AuthenticationError(#[from] AuthenticationError),
    #[error("RegistrationError - {0}")]
    RegistrationError(#[from] RegistrationError),
    #[error("ValidationError - {0}")]
    ValidationError(String),
    #[error("ServerError - {0}")]
    ServerError(#[from] ServerError),
}

impl WebError {
    pub fn resource_not_found(r#type: ResourceType) -> Self {
        Self::ResourceError(ResourceError::ResourceNotFound {
            resource_type: r#type,
        })
    }

    pub fn resource_forbidden(r#type: ResourceType) -> Self {
        Self::ResourceError(ResourceError::ResourceForbidden {
            resource_type: r#type,
        })
    }

    pub fn resource_fetch_error(r#type: ResourceType, error: DatabaseError) -> Self {
        Self::ResourceError(ResourceError::ResourceFetchError {
            resource_type: r#type,
            error,
        })
    }

    pub fn resource_bad_request<S: Into<String>>(r#type: ResourceType, reason: S) -> Self {
        Self::ResourceError(ResourceError::ResourceBadRequest {
            resource_type: r#type,
            reason: reason.into(),
        })
    }

    /// Maps `Forbidden` from an access check, everything else is a fetch error.
    pub fn access_error(r#type: ResourceType, error: DatabaseError) -> Self {
        match error {
            DatabaseError::Forbidden => Self::resource_forbidden(r#type),
            e => Self::resource_fetch_error(r#type, e),
        }
    }

    pub fn user_bad_request<S: Into<String>>(message: S) -> Self {
        Self::ValidationError(message.into())
    }

    pub fn auth_token_invalid<S: Into<String>>(source_name: S, error: CryptError) -> Self {
        Self::AuthenticationError(AuthenticationError::AuthenticationTokenInvalid {
            source_name: source_name.into(),
            error,
        })
    }

    pub fn auth_required() -> Self {
        Self::AuthenticationError(AuthenticationError::AuthenticationRequired)
    }

    pub fn auth_invalid_credentials() -> Self {
        Self::AuthenticationError(AuthenticationError::AuthenticationInvalidCredentials)
    }

    pub fn auth_refresh_rejected() -> Self {
        Self::AuthenticationError(AuthenticationError::AuthenticationRefreshRejected)
    }

    pub fn account_locked(until: DateTime<Utc>) -> Self {
        Self::AuthenticationError(AuthenticationError::AuthenticationAccountLocked { until })
    }

    pub fn account_inactive<S: Into<String>>(status: S) -> Self {
        Self::AuthenticationError(AuthenticationError::AuthenticationAccountInactive {
            status: status.into(),
        })
    }

    pub fn staff_required() -> Self {
        Self::AuthenticationError(AuthenticationError::AuthenticationStaffRequired)
    }

    pub fn registration_conflict() -> Self {
        Self::RegistrationError(RegistrationError::RegistrationUserConflict)
    }

    pub fn registration_invalid<S: Into<String>>(reason: S) -> Self {
        Self::RegistrationError(RegistrationError::RegistrationInvalidInput(reason.into()))
    }

    pub fn server_crypt_error(e: CryptError) -> Self {
        Self::ServerError(ServerError::ServerCryptError(e))
    }

    pub fn server_storage_error(e: StorageError) -> Self {
        Self::ServerError(ServerError::ServerStorageError(e))
    }

    pub fn service_unavailable<S: Into<String>>(what: S) -> Self {
        Self::ServerError(ServerError::ServerUnavailable(what.into()))
    }

    pub fn status_code(&self) -> axum::http::StatusCode {
        match self {
            Self::ResourceError(e) => e.status_code(),
            Self::RegistrationError(e) => e.status_code(),
            Self::AuthenticationError(e) => e.status_code(),
            Self::ValidationError(_) => StatusCode::BAD_REQUEST,
            Self::ServerError(e) => e.status_code(),
        }
    }

    pub fn client_display(&self) -> String {
        match self {
            Self::ResourceError(e) => e.client_display(),
            Self::RegistrationError(e) => e.client_display(),
            Self::AuthenticationError(e) => e.client_display(),
            Self::ValidationError(message) => message.clone(),
            Self::ServerError(e) => e.client_display(),
        }
    }
}

impl From<ProgressError> for WebError {
    fn from(value: ProgressError) -> Self {
        match value {
            ProgressError::DatabaseError(e) => {
                Self::resource_fetch_error(ResourceType::UserProgress, e)
            }
            ProgressError::ModuleNotFound(_) => Self::resource_not_found(ResourceType::Module),
            ProgressError::PathwayNotFound(_) => Self::resource_not_found(ResourceType::Pathway),
            e @ ProgressError::ModuleNotInPathway { .. } => {
                Self::resource_bad_request(ResourceType::Module, capitalize(&e.to_string()))
            }
            ProgressError::IncompleteResources(ids) => Self::user_bad_request(format!(
                "Complete all resources before completing this module. Incomplete resources: {}",
                ids.join(", ")
            )),
        }
    }
}

impl From<UploadError> for WebError {
    fn from(value: UploadError) -> Self {
        Self::resource_bad_request(ResourceType::Submission, value.to_string())
    }
}

impl From<OAuthError> for WebError {
    fn from(value: OAuthError) -> Self {
        match value {
            OAuthError::NotConfigured => Self::service_unavailable("Google OAuth is not configured"),
            e => Self::AuthenticationError(AuthenticationError::AuthenticationOAuthFailed(e)),
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[derive(serde::Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    /// Human-readable message for the client
    pub message: String,
    /// HTTP status code (stringified)
    pub status_code: String,
    /// Optional debug details (only in debug mode)
    pub details: Option<String>,
}

impl IntoResponse for WebError {
    fn into_response(self) -> axum::response::Response {
        log_error(&self);

        let status_code = self.status_code();
        let display = self.client_display();

        let body = ErrorResponse {
            message: display,
            status_code: status_code.as_str().to_string(),
            details: if cfg!(debug_assertions) {
                Some(self.to_string())
            } else {
                None
            },
        };

        (status_code, Json(body)).into_response()
    }
}
