use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use chrono::Local;
use log::error;
use serde::Serialize;
use thiserror::Error;

use crate::auth::{RoleError, TokenError};
use crate::user::{RepositoryError, StorageError};

pub const ACCOUNT_LOCKED: &str = "Your account has been locked. Please contact administration";
pub const ACCOUNT_DISABLED: &str =
    "Your account has been disabled. If this is an error, please contact administration";
pub const INCORRECT_CREDENTIALS: &str = "Username / password incorrect. Please try again";
pub const NOT_ENOUGH_PERMISSION: &str = "You do not have enough permission";
pub const LOGIN_REQUIRED: &str = "You need to log in to access this page";
pub const TOKEN_EXPIRED: &str = "Token has expired. Please log in again";
pub const INTERNAL_SERVER_ERROR_MSG: &str = "An error occurred while processing the request";
pub const ERROR_PROCESSING_FILE: &str = "Error occurred while processing file";
pub const NO_MAPPING: &str = "There is no mapping for this URL";
pub const USERNAME_ALREADY_EXISTS: &str = "Username already exists";
pub const EMAIL_ALREADY_EXISTS: &str = "Email already exists";

/// 统一的响应体，错误与部分成功消息共用
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse {
    pub timestamp: String,
    pub http_status_code: u16,
    pub http_status: String,
    pub reason: String,
    pub message: String,
}

impl ApiResponse {
    pub fn new(status: StatusCode, message: &str) -> Self {
        let phrase = status.canonical_reason().unwrap_or("Unknown");
        Self {
            timestamp: Local::now().format("%m-%d-%Y %I:%M:%S").to_string(),
            http_status_code: status.as_u16(),
            http_status: phrase.to_uppercase().replace(' ', "_"),
            reason: phrase.to_uppercase(),
            message: message.to_uppercase(),
        }
    }

    pub fn respond(status: StatusCode, message: &str) -> HttpResponse {
        HttpResponse::build(status).json(Self::new(status, message))
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{}", ACCOUNT_DISABLED)]
    AccountDisabled,

    #[error("{}", INCORRECT_CREDENTIALS)]
    BadCredentials,

    #[error("{}", ACCOUNT_LOCKED)]
    AccountLocked,

    #[error("{}", NOT_ENOUGH_PERMISSION)]
    AccessDenied,

    #[error("{}", LOGIN_REQUIRED)]
    Unauthenticated,

    #[error("{}", TOKEN_EXPIRED)]
    TokenExpired,

    #[error("{}", USERNAME_ALREADY_EXISTS)]
    UsernameExists,

    #[error("{}", EMAIL_ALREADY_EXISTS)]
    EmailExists,

    #[error("No user found by username: {0}")]
    UserNotFound(String),

    #[error("No user found for email: {0}")]
    EmailNotFound(String),

    #[error("No user found with id: {0}")]
    UserIdNotFound(i64),

    #[error("{0}")]
    Validation(String),

    #[error("{}", NO_MAPPING)]
    NoMapping,

    #[error("file processing failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// 返回给客户端的消息；5xx 错误只返回固定文本
    fn client_message(&self) -> String {
        match self {
            ApiError::Io(_) => ERROR_PROCESSING_FILE.to_string(),
            ApiError::Internal(_) => INTERNAL_SERVER_ERROR_MSG.to_string(),
            other => other.to_string(),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::AccountDisabled
            | ApiError::BadCredentials
            | ApiError::UsernameExists
            | ApiError::EmailExists
            | ApiError::UserNotFound(_)
            | ApiError::EmailNotFound(_)
            | ApiError::UserIdNotFound(_)
            | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::AccountLocked | ApiError::Unauthenticated | ApiError::TokenExpired => {
                StatusCode::UNAUTHORIZED
            }
            ApiError::AccessDenied => StatusCode::FORBIDDEN,
            ApiError::NoMapping => StatusCode::NOT_FOUND,
            ApiError::Io(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            error!("请求处理失败: {}", self);
        }
        ApiResponse::respond(status, &self.client_message())
    }
}

impl From<RepositoryError> for ApiError {
    fn from(e: RepositoryError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::InvalidName(name) => {
                ApiError::Validation(format!("Invalid file name: {}", name))
            }
            StorageError::Io(e) => ApiError::Io(e),
        }
    }
}

impl From<RoleError> for ApiError {
    fn from(e: RoleError) -> Self {
        ApiError::Validation(e.to_string())
    }
}

impl From<TokenError> for ApiError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Expired => ApiError::TokenExpired,
            TokenError::Invalid | TokenError::Malformed => ApiError::Unauthenticated,
            TokenError::Signing(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<bcrypt::BcryptError> for ApiError {
    fn from(e: bcrypt::BcryptError) -> Self {
        ApiError::Internal(format!("password hashing failed: {}", e))
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(e: validator::ValidationErrors) -> Self {
        ApiError::Validation(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;
    use serde_json::Value;

    async fn body_of(err: ApiError) -> (StatusCode, Value) {
        let resp = err.error_response();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body()).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[actix_web::test]
    async fn bad_credentials_message_is_uppercased() {
        let (status, body) = body_of(ApiError::BadCredentials).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["httpStatusCode"], 400);
        assert_eq!(body["httpStatus"], "BAD_REQUEST");
        assert_eq!(body["reason"], "BAD REQUEST");
        assert_eq!(body["message"], INCORRECT_CREDENTIALS.to_uppercase());
    }

    #[actix_web::test]
    async fn access_denied_is_forbidden_and_locked_is_unauthorized() {
        let (status, body) = body_of(ApiError::AccessDenied).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["message"], "YOU DO NOT HAVE ENOUGH PERMISSION");

        let (status, body) = body_of(ApiError::AccountLocked).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["httpStatus"], "UNAUTHORIZED");
    }

    #[actix_web::test]
    async fn internal_errors_hide_their_detail() {
        let (status, body) = body_of(ApiError::Internal("connection reset by peer".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], INTERNAL_SERVER_ERROR_MSG.to_uppercase());
        assert!(!body["message"].as_str().unwrap().contains("CONNECTION RESET"));
    }

    #[actix_web::test]
    async fn io_errors_report_file_processing() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let (status, body) = body_of(ApiError::from(io)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], ERROR_PROCESSING_FILE.to_uppercase());
    }

    #[test]
    fn token_errors_map_to_unauthenticated_variants() {
        assert!(matches!(ApiError::from(TokenError::Expired), ApiError::TokenExpired));
        assert!(matches!(ApiError::from(TokenError::Invalid), ApiError::Unauthenticated));
        assert!(matches!(ApiError::from(TokenError::Malformed), ApiError::Unauthenticated));
    }
}
