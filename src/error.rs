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

pub const INVALID_STATE: i32 = 100;
pub const INVALID_INPUT: i32 = 101;
pub const INVALID_TRANSITION: i32 = 102;
pub const DUPLICATE_BID: i32 = 103;
pub const CONFLICT: i32 = 104;
pub const NOT_FOUND: i32 = 105;
pub const UNAUTHORIZED: i32 = 106;
pub const FORBIDDEN: i32 = 107;

// Postgres SQLSTATEs for serialization_failure and deadlock_detected.
const RETRYABLE_SQLSTATES: [&str; 2] = ["40001", "40P01"];
pub(crate) const UNIQUE_VIOLATION: &str = "23505";

impl Error {
    pub fn is_internal(&self) -> bool {
        (1..=99).contains(&self.code)
    }

    pub fn is_invalid_state_error(&self) -> bool {
        self.code == INVALID_STATE
    }

    pub fn is_invalid_input_error(&self) -> bool {
        self.code == INVALID_INPUT
    }

    pub fn is_invalid_transition_error(&self) -> bool {
        self.code == INVALID_TRANSITION
    }

    pub fn is_duplicate_bid_error(&self) -> bool {
        self.code == DUPLICATE_BID
    }

    /// Lost a race against another writer. Callers may re-read and retry.
    pub fn is_conflict_error(&self) -> bool {
        self.code == CONFLICT
    }

    pub fn is_not_found_error(&self) -> bool {
        self.code == NOT_FOUND
    }

    pub fn is_unauthorized_error(&self) -> bool {
        self.code == UNAUTHORIZED
    }

    pub fn is_forbidden_error(&self) -> bool {
        self.code == FORBIDDEN
    }
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
        if let Some(db_err) = err.as_database_error() {
            if let Some(code) = db_err.code() {
                if RETRYABLE_SQLSTATES.contains(&&*code) {
                    tracing::warn!("transaction lost a serialization race: {}", db_err);
                    return conflict_error();
                }
            }
        }

        database_error(err)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        reqwest_error(err)
    }
}

impl From<oso::OsoError> for Error {
    fn from(err: oso::OsoError) -> Self {
        authorizor_error(err)
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_message) = match self.code {
            1..=99 => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error"),
            INVALID_INPUT => (StatusCode::BAD_REQUEST, self.message.as_str()),
            NOT_FOUND => (StatusCode::NOT_FOUND, self.message.as_str()),
            UNAUTHORIZED => (StatusCode::UNAUTHORIZED, self.message.as_str()),
            FORBIDDEN => (StatusCode::FORBIDDEN, self.message.as_str()),
            INVALID_STATE | INVALID_TRANSITION | DUPLICATE_BID | CONFLICT => {
                (StatusCode::CONFLICT, self.message.as_str())
            }
            _ => (StatusCode::BAD_REQUEST, self.message.as_str()),
        };

        let body = Json(json!({
            "code": self.code,
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

pub fn invalid_state_error() -> Error {
    Error {
        code: INVALID_STATE,
        message: "invalid state".into(),
    }
}

pub fn invalid_input_error() -> Error {
    Error {
        code: INVALID_INPUT,
        message: "invalid input".into(),
    }
}

pub fn invalid_transition_error() -> Error {
    Error {
        code: INVALID_TRANSITION,
        message: "invalid transition".into(),
    }
}

pub fn duplicate_bid_error() -> Error {
    Error {
        code: DUPLICATE_BID,
        message: "duplicate bid".into(),
    }
}

pub fn conflict_error() -> Error {
    Error {
        code: CONFLICT,
        message: "conflict".into(),
    }
}

pub fn not_found_error() -> Error {
    Error {
        code: NOT_FOUND,
        message: "not found".into(),
    }
}

pub fn unauthorized_error() -> Error {
    Error {
        code: UNAUTHORIZED,
        message: "unauthorized".into(),
    }
}

pub fn forbidden_error() -> Error {
    Error {
        code: FORBIDDEN,
        message: "forbidden".into(),
    }
}

pub fn env_var_error(_: env::VarError) -> Error {
    Error {
        code: 1,
        message: "environment variable error".into(),
    }
}

pub fn database_error<T: Debug>(err: T) -> Error {
    tracing::error!("database error: {:?}", err);

    Error {
        code: 2,
        message: "database error".into(),
    }
}

pub fn reqwest_error(err: reqwest::Error) -> Error {
    tracing::error!("reqwest error: {}", err);

    Error {
        code: 3,
        message: "reqwest error".into(),
    }
}

pub fn upstream_error() -> Error {
    Error {
        code: 4,
        message: "upstream error".into(),
    }
}

pub fn unexpected_error() -> Error {
    Error {
        code: 5,
        message: "unexpected error".into(),
    }
}

pub fn authorizor_error(err: oso::OsoError) -> Error {
    tracing::error!("authorizor error: {}", err);

    Error {
        code: 6,
        message: "authorizor error".into(),
    }
}

#[test]
fn internal_codes_are_not_domain_errors() {
    assert!(database_error("boom").is_internal());
    assert!(unexpected_error().is_internal());
    assert!(!conflict_error().is_internal());
    assert!(!forbidden_error().is_internal());
}

#[test]
fn domain_errors_map_to_client_statuses() {
    let cases = [
        (invalid_state_error(), StatusCode::CONFLICT),
        (invalid_input_error(), StatusCode::BAD_REQUEST),
        (invalid_transition_error(), StatusCode::CONFLICT),
        (duplicate_bid_error(), StatusCode::CONFLICT),
        (conflict_error(), StatusCode::CONFLICT),
        (not_found_error(), StatusCode::NOT_FOUND),
        (unauthorized_error(), StatusCode::UNAUTHORIZED),
        (forbidden_error(), StatusCode::FORBIDDEN),
        (upstream_error(), StatusCode::INTERNAL_SERVER_ERROR),
    ];

    for (err, status) in cases {
        assert_eq!(err.into_response().status(), status);
    }
}
