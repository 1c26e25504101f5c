use std::fmt::{Display, Formatter};

use kube::core::ErrorResponse;
use thiserror::Error;

use crate::{
    selection::labels::SelectorError,
    validation::{ErrorList, FieldError, FieldPath},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictReason {
    /// an object with the same name already exists
    AlreadyExists,
    /// the object was modified since it was read
    Conflict,
}

impl ConflictReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictReason::AlreadyExists => "AlreadyExists",
            ConflictReason::Conflict => "Conflict",
        }
    }
}

impl Display for ConflictReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("{} '{}' is invalid: {}", .kind, .name, .errors)]
    Invalid {
        kind: String,
        name: String,
        errors: ErrorList,
    },
    #[error("Operation cannot be fulfilled on {} '{}' ({}): {}", .kind, .name, .reason, .message)]
    Conflict {
        kind: String,
        name: String,
        reason: ConflictReason,
        message: String,
    },
    #[error("{} '{}' not found!", .kind, .name)]
    NotFound { kind: String, name: String },
    #[error("Bad request: {}", .0)]
    BadRequest(String),
    #[error("Resource version is too old: {}", .0)]
    Expired(String),
    #[error("Service unavailable: {}", .0)]
    Unavailable(String),
    #[error("Couldn't decode the object: {}", .0)]
    Decode(String),
}

impl ApiError {
    pub fn invalid(kind: &str, name: &str, errors: ErrorList) -> Self {
        ApiError::Invalid {
            kind: kind.to_owned(),
            name: name.to_owned(),
            errors,
        }
    }

    pub fn not_found(kind: &str, name: &str) -> Self {
        ApiError::NotFound {
            kind: kind.to_owned(),
            name: name.to_owned(),
        }
    }

    pub fn already_exists(kind: &str, name: &str) -> Self {
        ApiError::Conflict {
            kind: kind.to_owned(),
            name: name.to_owned(),
            reason: ConflictReason::AlreadyExists,
            message: "object already exists".to_owned(),
        }
    }

    pub fn conflict(kind: &str, name: &str, message: impl Into<String>) -> Self {
        ApiError::Conflict {
            kind: kind.to_owned(),
            name: name.to_owned(),
            reason: ConflictReason::Conflict,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ApiError::Conflict { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(
            self,
            ApiError::Conflict {
                reason: ConflictReason::AlreadyExists,
                ..
            }
        )
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, ApiError::Invalid { .. })
    }

    pub fn code(&self) -> u16 {
        match self {
            ApiError::Invalid { .. } => 422,
            ApiError::Conflict { .. } => 409,
            ApiError::NotFound { .. } => 404,
            ApiError::BadRequest(_) => 400,
            ApiError::Expired(_) => 410,
            ApiError::Unavailable(_) => 503,
            ApiError::Decode(_) => 500,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            ApiError::Invalid { .. } => "Invalid",
            ApiError::Conflict { reason, .. } => reason.as_str(),
            ApiError::NotFound { .. } => "NotFound",
            ApiError::BadRequest(_) => "BadRequest",
            ApiError::Expired(_) => "Expired",
            ApiError::Unavailable(_) => "ServiceUnavailable",
            ApiError::Decode(_) => "InternalError",
        }
    }

    /// Wire shape used for `ERROR` watch events.
    pub fn to_error_response(&self) -> ErrorResponse {
        ErrorResponse {
            status: "Failure".to_owned(),
            message: self.to_string(),
            reason: self.reason().to_owned(),
            code: self.code(),
        }
    }

    /// Field level causes aren't carried by [`ErrorResponse`], so an `Invalid`
    /// response decodes into a single root-level error holding the message.
    pub fn from_error_response(response: ErrorResponse) -> Self {
        match response.code {
            422 => ApiError::Invalid {
                kind: String::new(),
                name: String::new(),
                errors: vec![FieldError::invalid(
                    FieldPath::default(),
                    "",
                    response.message,
                )]
                .into(),
            },
            409 => ApiError::Conflict {
                kind: String::new(),
                name: String::new(),
                reason: match response.reason.as_str() {
                    "AlreadyExists" => ConflictReason::AlreadyExists,
                    _ => ConflictReason::Conflict,
                },
                message: response.message,
            },
            404 => ApiError::NotFound {
                kind: String::new(),
                name: response.message,
            },
            410 => ApiError::Expired(response.message),
            400 => ApiError::BadRequest(response.message),
            _ => ApiError::Unavailable(response.message),
        }
    }
}

impl From<kube::Error> for ApiError {
    fn from(value: kube::Error) -> Self {
        match value {
            kube::Error::Api(response) => ApiError::from_error_response(response),
            kube::Error::SerdeError(error) => ApiError::Decode(error.to_string()),
            other => ApiError::Unavailable(other.to_string()),
        }
    }
}

impl From<SelectorError> for ApiError {
    fn from(value: SelectorError) -> Self {
        ApiError::BadRequest(value.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(value: serde_json::Error) -> Self {
        ApiError::Decode(value.to_string())
    }
}
