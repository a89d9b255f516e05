use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};

lazy_static::lazy_static! {
    static ref DEBUG_MODE: AtomicBool = AtomicBool::new(false);
}

/// Enables verbose error bodies. Called once from `main` before serving.
pub fn set_debug(enabled: bool) {
    DEBUG_MODE.store(enabled, Ordering::Relaxed);
}

fn debug_enabled() -> bool {
    DEBUG_MODE.load(Ordering::Relaxed)
}

/// Handler result: explicit status plus a JSON body, or a classified error.
pub type Payload<T> = Result<(StatusCode, Json<T>), Error>;

pub fn proceeds<V>(value: V) -> Payload<V>
where
    V: Serialize,
{
    Ok((StatusCode::OK, Json(value)))
}

pub fn creates<V>(value: V) -> Payload<V>
where
    V: Serialize,
{
    Ok((StatusCode::CREATED, Json(value)))
}

pub async fn handler404(path: Uri) -> (StatusCode, Json<Error>) {
    (
        StatusCode::NOT_FOUND,
        Json(Error::NotFound {
            message: format!("Invalid path: {}", path),
        }),
    )
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "error")]
pub enum Error {
    InvalidPayload { message: String },
    AuthenticationFailure { message: String },
    Forbidden { message: String },
    NotFound { message: String },
    AlreadyExists { message: String },
    Conflict { message: String },
    PortalDisabled { message: String },
    InternalError { kind: &'static str, message: String },
}

impl Error {
    pub fn invalid<S: Into<String>>(msg: S) -> Error {
        Error::InvalidPayload {
            message: msg.into(),
        }
    }

    pub fn unauthenticated<S: Into<String>>(msg: S) -> Error {
        Error::AuthenticationFailure {
            message: msg.into(),
        }
    }

    pub fn forbidden<S: Into<String>>(msg: S) -> Error {
        Error::Forbidden {
            message: msg.into(),
        }
    }

    pub fn not_found<S: Into<String>>(msg: S) -> Error {
        Error::NotFound {
            message: msg.into(),
        }
    }

    pub fn already_exists<S: Into<String>>(msg: S) -> Error {
        Error::AlreadyExists {
            message: msg.into(),
        }
    }

    pub fn conflict<S: Into<String>>(msg: S) -> Error {
        Error::Conflict {
            message: msg.into(),
        }
    }

    pub fn internal<S: Into<String>>(kind: &'static str, msg: S) -> Error {
        Error::InternalError {
            kind,
            message: msg.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Error::InvalidPayload { .. }
            | Error::AlreadyExists { .. }
            | Error::PortalDisabled { .. } => StatusCode::BAD_REQUEST,
            Error::AuthenticationFailure { .. } => StatusCode::UNAUTHORIZED,
            Error::Forbidden { .. } => StatusCode::FORBIDDEN,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Conflict { .. } => StatusCode::CONFLICT,
            Error::InternalError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Error::InvalidPayload { message }
            | Error::AuthenticationFailure { message }
            | Error::Forbidden { message }
            | Error::NotFound { message }
            | Error::AlreadyExists { message }
            | Error::Conflict { message }
            | Error::PortalDisabled { message }
            | Error::InternalError { message, .. } => message.as_str(),
        }
    }

    /// Body actually sent to the client. Internal details are withheld
    /// unless the debug flag is on.
    fn redacted(self) -> Error {
        match self {
            Error::InternalError { kind, message } if debug_enabled() => {
                Error::InternalError { kind, message }
            }
            Error::InternalError { kind, .. } => Error::InternalError {
                kind,
                message: "Internal Server Error".to_string(),
            },
            other => other,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            log::error!("request failed: {:?}", self);
        } else {
            log::debug!("request rejected ({}): {}", status, self.message());
        }
        (status, Json(self.redacted())).into_response()
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        // unique-index violations are the authoritative duplicate guard;
        // map them to the same error the handler pre-checks produce
        if let sqlx::Error::Database(ref db) = err {
            if db.code().as_deref() == Some("23505") {
                return Error::AlreadyExists {
                    message: "A record with these unique fields already exists".to_string(),
                };
            }
        }
        Error::InternalError {
            kind: "DatabaseError",
            message: err.to_string(),
        }
    }
}

impl From<pbkdf2::password_hash::Error> for Error {
    fn from(err: pbkdf2::password_hash::Error) -> Self {
        Error::InternalError {
            kind: "PasswordHashError",
            message: err.to_string(),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for Error {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Error::InternalError {
            kind: "TokenError",
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_taxonomy() {
        assert_eq!(Error::invalid("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(Error::already_exists("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            Error::unauthenticated("x").status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(Error::forbidden("x").status(), StatusCode::FORBIDDEN);
        assert_eq!(Error::not_found("x").status(), StatusCode::NOT_FOUND);
        assert_eq!(Error::conflict("x").status(), StatusCode::CONFLICT);
        assert_eq!(
            Error::internal("DatabaseError", "x").status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn envelope_carries_message_and_error_kind() {
        let body = serde_json::to_value(Error::not_found("Class not found")).unwrap();
        assert_eq!(body["message"], "Class not found");
        assert_eq!(body["error"], "NotFound");
    }

    #[test]
    fn internal_details_are_withheld_without_debug() {
        set_debug(false);
        let redacted = Error::internal("DatabaseError", "connection refused").redacted();
        assert_eq!(redacted.message(), "Internal Server Error");

        set_debug(true);
        let verbose = Error::internal("DatabaseError", "connection refused").redacted();
        assert_eq!(verbose.message(), "connection refused");
        set_debug(false);
    }
}
