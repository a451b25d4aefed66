use axum::extract::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::env;
use std::fmt::{self, Debug, Display};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    pub code: i32,
    pub message: String,
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

impl std::error::Error for Error {}

impl From<env::VarError> for Error {
    fn from(err: env::VarError) -> Self {
        env_var_error(err)
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        database_error(err)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        reqwest_error(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        serialization_error(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        io_error(err)
    }
}

impl From<oso::OsoError> for Error {
    fn from(err: oso::OsoError) -> Self {
        tracing::error!(error = %err, "policy evaluation failed");
        unexpected_error()
    }
}

impl Error {
    pub fn status(&self) -> StatusCode {
        match self.code {
            3 | 4 => StatusCode::BAD_GATEWAY,
            1..=99 => StatusCode::INTERNAL_SERVER_ERROR,
            100..=199 => StatusCode::BAD_REQUEST,
            200 => StatusCode::UNAUTHORIZED,
            201..=299 => StatusCode::FORBIDDEN,
            300..=399 => StatusCode::NOT_FOUND,
            400..=499 => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_internal(&self) -> bool {
        self.code < 100
    }

    pub fn is_invalid_input_error(&self) -> bool {
        (100..200).contains(&self.code)
    }

    pub fn is_conflict(&self) -> bool {
        (400..500).contains(&self.code)
    }

    pub fn is_upstream_error(&self) -> bool {
        self.code == 3 || self.code == 4
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = match self.code {
            3 | 4 => "Upstream Failure",
            1..=99 => "Internal Server Error",
            _ => self.message.as_str(),
        };

        let body = Json(json!({
            "code": self.code,
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

pub fn invalid_input_error() -> Error {
    Error {
        code: 101,
        message: "invalid input".into(),
    }
}

pub fn validation_error(message: impl Into<String>) -> Error {
    Error {
        code: 102,
        message: message.into(),
    }
}

pub fn unauthenticated_error() -> Error {
    Error {
        code: 200,
        message: "missing identity".into(),
    }
}

pub fn unauthorized_error() -> Error {
    Error {
        code: 201,
        message: "unauthorized".into(),
    }
}

pub fn not_eligible_error(message: impl Into<String>) -> Error {
    Error {
        code: 202,
        message: message.into(),
    }
}

pub fn not_found_error(message: impl Into<String>) -> Error {
    Error {
        code: 300,
        message: message.into(),
    }
}

pub fn conflict_error(message: impl Into<String>) -> Error {
    Error {
        code: 400,
        message: message.into(),
    }
}

pub fn invalid_state_error() -> Error {
    Error {
        code: 402,
        message: "invalid state".into(),
    }
}

pub fn expired_error() -> Error {
    Error {
        code: 401,
        message: "expired".into(),
    }
}

pub fn env_var_error(_: env::VarError) -> Error {
    Error {
        code: 1,
        message: "environment variable error".into(),
    }
}

pub fn config_error(message: impl Into<String>) -> Error {
    Error {
        code: 1,
        message: message.into(),
    }
}

pub fn database_error<T: Debug>(err: T) -> Error {
    tracing::error!(error = ?err, "database error");
    Error {
        code: 2,
        message: "database error".into(),
    }
}

pub fn reqwest_error(err: reqwest::Error) -> Error {
    tracing::warn!(error = %err, "transport error");
    Error {
        code: 3,
        message: "reqwest error".into(),
    }
}

pub fn upstream_error(message: impl Into<String>) -> Error {
    Error {
        code: 4,
        message: message.into(),
    }
}

pub fn io_error(err: std::io::Error) -> Error {
    tracing::error!(error = %err, "io error");
    Error {
        code: 7,
        message: "io error".into(),
    }
}

pub fn unexpected_error() -> Error {
    Error {
        code: 5,
        message: "unexpected error".into(),
    }
}

pub fn serialization_error(_: serde_json::Error) -> Error {
    Error {
        code: 6,
        message: "serialization error".into(),
    }
}

#[test]
fn error_status_mapping() {
    assert_eq!(conflict_error("x").status(), StatusCode::CONFLICT);
    assert_eq!(expired_error().status(), StatusCode::CONFLICT);
    assert_eq!(upstream_error("ledger").status(), StatusCode::BAD_GATEWAY);
    assert_eq!(validation_error("x").status(), StatusCode::BAD_REQUEST);
    assert_eq!(unauthenticated_error().status(), StatusCode::UNAUTHORIZED);
    assert_eq!(unauthorized_error().status(), StatusCode::FORBIDDEN);
    assert_eq!(not_found_error("x").status(), StatusCode::NOT_FOUND);
    assert_eq!(unexpected_error().status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[test]
fn error_classification() {
    assert!(expired_error().is_conflict());
    assert!(!expired_error().is_internal());
    assert!(upstream_error("ledger").is_upstream_error());
    assert!(upstream_error("ledger").is_internal());
    assert!(validation_error("bad").is_invalid_input_error());
}
