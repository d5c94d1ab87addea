/// Unified error types for the Avenir waitlist service
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the waitlist service
#[derive(Error, Debug)]
pub enum WaitlistError {
    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A unique column rejected the write
    #[error("Duplicate {field}")]
    Duplicate { field: &'static str },

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Every generated access code collided with an existing one
    #[error("Could not allocate a unique access code after {attempts} attempts")]
    CodeSpaceExhausted { attempts: u32 },

    /// Store errors that are not database driver errors
    #[error("Store error: {0}")]
    Store(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Email delivery errors
    #[error("Email error: {0}")]
    Email(String),

    /// Rate limiting errors
    #[error("Rate limit exceeded")]
    RateLimitExceeded { retry_after: std::time::Duration },

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WaitlistError {
    /// Message safe to show to an end user
    pub fn display_message(&self) -> String {
        match self {
            WaitlistError::Duplicate { field } => {
                format!("That {} is already in use", field.replace('_', " "))
            }
            WaitlistError::Validation(msg) | WaitlistError::NotFound(msg) => msg.clone(),
            WaitlistError::Store(msg) => msg.clone(),
            WaitlistError::Database(sqlx::Error::Database(db)) => db.message().to_string(),
            WaitlistError::RateLimitExceeded { .. } => {
                "Too many requests. Please slow down.".to_string()
            }
            _ => "An unexpected error occurred. Please try again.".to_string(),
        }
    }
}

/// JSON error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Convert WaitlistError to HTTP response
impl IntoResponse for WaitlistError {
    fn into_response(self) -> Response {
        let retry_after = match self {
            WaitlistError::RateLimitExceeded { retry_after } => Some(retry_after),
            _ => None,
        };

        let (status, error_code, message) = match self {
            WaitlistError::Validation(_) => (
                StatusCode::BAD_REQUEST,
                "InvalidRequest",
                self.display_message(),
            ),
            WaitlistError::NotFound(_) => (
                StatusCode::NOT_FOUND,
                "NotFound",
                self.display_message(),
            ),
            WaitlistError::Duplicate { .. } => (
                StatusCode::CONFLICT,
                "Conflict",
                self.to_string(),
            ),
            WaitlistError::RateLimitExceeded { .. } => (
                StatusCode::TOO_MANY_REQUESTS,
                "RateLimitExceeded",
                "Rate limit exceeded".to_string(),
            ),
            WaitlistError::Database(_)
            | WaitlistError::Store(_)
            | WaitlistError::Internal(_)
            | WaitlistError::Io(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalServerError",
                "Internal server error".to_string(), // Don't leak details
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalServerError",
                self.to_string(),
            ),
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
        });

        let mut response = (status, body).into_response();
        if let Some(retry_after) = retry_after {
            // Whole seconds, rounded up so clients never retry early
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs.max(1)));
        }
        response
    }
}

/// Result type alias for waitlist operations
pub type WaitlistResult<T> = Result<T, WaitlistError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_display_message() {
        let err = WaitlistError::Duplicate { field: "access_code" };
        assert_eq!(err.display_message(), "That access code is already in use");
    }

    #[test]
    fn test_internal_errors_hide_details() {
        let response = WaitlistError::Internal("pool poisoned".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let err = WaitlistError::CodeSpaceExhausted { attempts: 10 };
        assert_eq!(
            err.display_message(),
            "An unexpected error occurred. Please try again."
        );
    }

    #[test]
    fn test_rate_limit_status() {
        let response = WaitlistError::RateLimitExceeded {
            retry_after: std::time::Duration::from_secs(1),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "1");

        let response = WaitlistError::RateLimitExceeded {
            retry_after: std::time::Duration::from_millis(2500),
        }
        .into_response();
        assert_eq!(response.headers()[header::RETRY_AFTER], "3");
    }

    #[test]
    fn test_validation_and_not_found_carry_their_message() {
        let response = WaitlistError::Validation("Missing code".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.headers().get(header::RETRY_AFTER).is_none());

        let err = WaitlistError::NotFound("Endpoint not found".to_string());
        assert_eq!(err.display_message(), "Endpoint not found");
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }
}
