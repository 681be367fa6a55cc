use actix_web::HttpResponse;
use thiserror::Error;

pub type Res<T> = std::result::Result<T, AppError>;

/// Failure taxonomy for calls to external parties: the payment gateway or a
/// sibling service. Job code matches on this to decide between retrying with
/// backoff, re-authenticating once, transitioning state, or giving up.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Network failure, timeout or 5xx. Safe to retry.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// Bearer token was rejected. Re-authenticate once and retry once.
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// The remote party understood the request and declined it.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// Unique-key or constraint conflict, translated to the domain.
    #[error("integrity violation: {0}")]
    Integrity(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    // === CONVERSION ERRORS ===
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("Reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("External service error: {0}")]
    Service(#[from] ServiceError),

    // === APPLICATION ERRORS ===
    #[error("Authorization error: {0}")]
    Unauthorized(String),

    #[error("Resource conflict: {0}")]
    Conflict(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn to_http_response(&self) -> HttpResponse {
        let is_dev = cfg!(debug_assertions);

        let to_internal_json = |err_msg: &str| {
            if is_dev {
                serde_json::json!({ "error": err_msg })
            } else {
                serde_json::json!({ "error": "Internal server error" })
            }
        };

        match self {
            // === CONVERSION ERRORS ===
            AppError::Database(error) => {
                log::error!("Database error: {}", error);
                HttpResponse::InternalServerError().json(to_internal_json(&error.to_string()))
            }
            AppError::Jwt(error) => {
                log::error!("JWT error: {}", error);
                HttpResponse::InternalServerError().json(to_internal_json(&error.to_string()))
            }
            AppError::Reqwest(error) => {
                log::error!("Reqwest error: {}", error);
                HttpResponse::InternalServerError().json(to_internal_json(&error.to_string()))
            }
            AppError::Service(error) => {
                log::error!("External service error: {}", error);
                match error {
                    ServiceError::Unavailable(_) | ServiceError::Auth(_) => {
                        HttpResponse::BadGateway()
                            .json(serde_json::json!({ "error": self.to_string() }))
                    }
                    ServiceError::Rejected(_) => HttpResponse::BadRequest()
                        .json(serde_json::json!({ "error": self.to_string() })),
                    ServiceError::Integrity(_) => HttpResponse::Conflict()
                        .json(serde_json::json!({ "error": self.to_string() })),
                }
            }

            // === APPLICATION ERRORS ===
            AppError::Unauthorized(_) => {
                HttpResponse::Unauthorized().json(serde_json::json!({ "error": self.to_string() }))
            }
            AppError::Conflict(_) => {
                HttpResponse::Conflict().json(serde_json::json!({ "error": self.to_string() }))
            }
            AppError::NotFound(_) => {
                HttpResponse::NotFound().json(serde_json::json!({ "error": self.to_string() }))
            }
            AppError::BadRequest(_) => {
                HttpResponse::BadRequest().json(serde_json::json!({ "error": self.to_string() }))
            }

            AppError::Internal(error) => {
                log::error!("Internal error: {}", error);
                HttpResponse::InternalServerError().json(to_internal_json(&error.to_string()))
            }
        }
    }
}

impl actix_web::ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        self.to_http_response()
    }
}
