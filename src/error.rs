/// Error Handling Module
///
/// One enum per failure domain, folded into `AppError` so `?` works across
/// layers. The HTTP mapping keeps infrastructure failures (503) apart from
/// authorization decisions (401).

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use std::error::Error as StdError;
use std::fmt;

/// ============================================================================
/// 1. DOMAIN-SPECIFIC ERROR TYPES
/// ============================================================================

/// Malformed request data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    EmptyField(String),
    TooLong(String, usize),
    InvalidFormat(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyField(field) => write!(f, "{} is empty", field),
            ValidationError::TooLong(field, max) => {
                write!(f, "{} is too long (maximum {} characters)", field, max)
            }
            ValidationError::InvalidFormat(field) => write!(f, "{} has invalid format", field),
        }
    }
}

impl StdError for ValidationError {}

/// Account creation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountError {
    UsernameTaken,
    PhoneTaken,
}

impl fmt::Display for AccountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountError::UsernameTaken => write!(f, "username already exists"),
            AccountError::PhoneTaken => write!(f, "phone number already exists"),
        }
    }
}

impl StdError for AccountError {}

/// Authentication and authorization outcomes
///
/// Every variant is a definitive decision and is never retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    InvalidCredentials,
    InvalidSignature,
    UnsupportedAlgorithm,
    ExpiredToken,
    SessionExpired,
    Unauthorized,
    MissingToken,
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::InvalidCredentials => write!(f, "Invalid credentials"),
            AuthError::InvalidSignature => write!(f, "Token signature is invalid"),
            AuthError::UnsupportedAlgorithm => write!(f, "Token signing algorithm is not supported"),
            AuthError::ExpiredToken => write!(f, "Token has expired"),
            AuthError::SessionExpired => write!(f, "Session has expired"),
            AuthError::Unauthorized => write!(f, "Unauthorized"),
            AuthError::MissingToken => write!(f, "Missing authentication token"),
        }
    }
}

impl StdError for AuthError {}

/// Signing keypair errors
#[derive(Debug)]
pub enum KeyError {
    Generation(String),
    Persistence(String),
}

impl fmt::Display for KeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyError::Generation(msg) => write!(f, "Key generation failed: {}", msg),
            KeyError::Persistence(msg) => write!(f, "Key persistence failed: {}", msg),
        }
    }
}

impl StdError for KeyError {}

/// Session and user store errors
///
/// `Timeout` and `Unavailable` may be retried by the caller; the stores never
/// retry on their own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    NotFound,
    Conflict,
    Timeout,
    Unavailable(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound => write!(f, "Record not found"),
            StoreError::Conflict => write!(f, "Record was concurrently modified"),
            StoreError::Timeout => write!(f, "Store operation timed out"),
            StoreError::Unavailable(msg) => write!(f, "Store unavailable: {}", msg),
        }
    }
}

impl StdError for StoreError {}

/// Configuration errors
#[derive(Debug)]
pub enum ConfigError {
    MissingRequired(String),
    InvalidValue(String),
    ParseError(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingRequired(msg) => write!(f, "Missing required config: {}", msg),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config value: {}", msg),
            ConfigError::ParseError(msg) => write!(f, "Config parse error: {}", msg),
        }
    }
}

impl StdError for ConfigError {}

/// ============================================================================
/// 2. UNIFIED APPLICATION ERROR TYPE
/// ============================================================================

#[derive(Debug)]
pub enum AppError {
    Validation(ValidationError),
    Account(AccountError),
    Auth(AuthError),
    Key(KeyError),
    Store(StoreError),
    Config(ConfigError),
    TokenSigning(String),
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(e) => write!(f, "{}", e),
            AppError::Account(e) => write!(f, "{}", e),
            AppError::Auth(e) => write!(f, "{}", e),
            AppError::Key(e) => write!(f, "{}", e),
            AppError::Store(e) => write!(f, "{}", e),
            AppError::Config(e) => write!(f, "{}", e),
            AppError::TokenSigning(msg) => write!(f, "Token signing failed: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl StdError for AppError {}

impl AppError {
    /// True when the failure says nothing about the caller's credentials.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            AppError::Store(StoreError::Timeout | StoreError::Unavailable(_))
                | AppError::Key(_)
                | AppError::Config(_)
                | AppError::TokenSigning(_)
                | AppError::Internal(_)
        )
    }
}

// ============================================================================
// FROM IMPLEMENTATIONS
// ============================================================================

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err)
    }
}

impl From<AccountError> for AppError {
    fn from(err: AccountError) -> Self {
        AppError::Account(err)
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::Auth(err)
    }
}

impl From<KeyError> for AppError {
    fn from(err: KeyError) -> Self {
        AppError::Key(err)
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Store(err)
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err)
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(format!("Blocking task failed: {}", err))
    }
}

// ============================================================================
// 3. HTTP RESPONSE MAPPING
// ============================================================================

/// Error response structure for HTTP responses
#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    /// Unique error ID for tracking
    pub error_id: String,
    pub message: String,
    /// Error code for client-side handling
    pub code: String,
    pub status: u16,
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error_id: String, message: String, code: String, status: u16) -> Self {
        Self {
            error_id,
            message,
            code,
            status,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Trait for converting errors to HTTP responses with proper logging
pub trait ErrorHandler {
    fn error_response(&self, request_id: &str) -> (StatusCode, ErrorResponse);
    fn log_error(&self, request_id: &str);
}

impl AppError {
    fn classify(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Validation(e) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", e.to_string()),

            AppError::Account(e) => (StatusCode::CONFLICT, "DUPLICATE_ENTRY", e.to_string()),

            AppError::Auth(e) => {
                let code = match e {
                    AuthError::InvalidCredentials => "INVALID_CREDENTIALS",
                    AuthError::ExpiredToken => "TOKEN_EXPIRED",
                    AuthError::SessionExpired => "SESSION_EXPIRED",
                    AuthError::MissingToken => "MISSING_TOKEN",
                    AuthError::InvalidSignature
                    | AuthError::UnsupportedAlgorithm
                    | AuthError::Unauthorized => "UNAUTHORIZED",
                };
                (StatusCode::UNAUTHORIZED, code, e.to_string())
            }

            // A lost rotation race or a missing session ends in a fresh login
            AppError::Store(StoreError::NotFound) | AppError::Store(StoreError::Conflict) => (
                StatusCode::UNAUTHORIZED,
                "SESSION_INVALID",
                "Session is no longer valid, please log in again".to_string(),
            ),
            AppError::Store(StoreError::Timeout) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "STORE_TIMEOUT",
                "Session store timed out".to_string(),
            ),
            AppError::Store(StoreError::Unavailable(_)) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "STORE_UNAVAILABLE",
                "Session store temporarily unavailable".to_string(),
            ),

            AppError::Key(_) | AppError::TokenSigning(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "KEY_ERROR",
                "Token service error".to_string(),
            ),
            AppError::Config(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONFIG_ERROR",
                "Server configuration error".to_string(),
            ),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Internal server error".to_string(),
            ),
        }
    }
}

impl ErrorHandler for AppError {
    fn error_response(&self, request_id: &str) -> (StatusCode, ErrorResponse) {
        let (status, code, message) = self.classify();
        let error_response =
            ErrorResponse::new(request_id.to_string(), message, code.to_string(), status.as_u16());
        (status, error_response)
    }

    fn log_error(&self, request_id: &str) {
        if self.is_infrastructure() {
            tracing::error!(request_id = request_id, error = %self, "Server-side failure");
            return;
        }
        match self {
            AppError::Auth(AuthError::InvalidCredentials) => {
                tracing::warn!(request_id = request_id, error = %self, "Invalid credentials attempt");
            }
            AppError::Auth(_) | AppError::Store(_) => {
                tracing::warn!(request_id = request_id, error = %self, "Authentication error");
            }
            _ => {
                tracing::warn!(request_id = request_id, error = %self, "Request rejected");
            }
        }
    }
}

/// Implement ResponseError for Actix-web integration
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let request_id = crate::logger::current_request_id();
        self.log_error(&request_id);

        let (status, error_response) = <Self as ErrorHandler>::error_response(self, &request_id);

        HttpResponse::build(status).json(error_response)
    }

    fn status_code(&self) -> StatusCode {
        self.classify().0
    }
}
