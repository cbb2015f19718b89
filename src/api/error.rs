use deadpool_redis::{redis::RedisError, CreatePoolError, PoolError};
use serde_json::Value;
use std::borrow::Cow;

pub const GENERIC_FAILURE_MESSAGE: &str = "Something went wrong. Please try again.";
pub const NETWORK_FAILURE_MESSAGE: &str = "Unable to reach the server. Check your connection.";

/// Structured codes the backend sends in the `error` field for a dead session.
const AUTH_ERROR_CODES: &[&str] = &[
    "TOKEN_EXPIRED",
    "TOKEN_INVALID",
    "UNAUTHENTICATED",
    "UNAUTHORIZED",
    "NOT_LOGGED_IN",
    "USER_NOT_FOUND",
];

/// Fallback phrasing used when the backend sends no code. Lowercase.
const AUTH_MESSAGE_MARKERS: &[&str] = &[
    "expired",
    "unauthorized",
    "not logged in",
    "not authenticated",
    "user not found",
    "invalid token",
    "token invalid",
    "invalid signature",
    "jwt",
];

#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("Network Error: {0}")]
    Network(Cow<'static, str>),
    #[error("Authentication Error: {message}")]
    Authentication { status: Option<u16>, message: Cow<'static, str> },
    #[error("Validation Error: {message}")]
    Validation { status: Option<u16>, code: Option<String>, message: Cow<'static, str> },
    #[error("Server Error ({status})")]
    Server { status: u16, message: Option<Cow<'static, str>> },
    #[error("Serialization Error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClientError {
    pub fn network(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Network(msg.into())
    }

    pub fn not_logged_in() -> Self {
        Self::Authentication { status: None, message: "Not logged in".into() }
    }

    /// A rejection decided locally, before any request is sent.
    pub fn invalid(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Validation { status: None, code: None, message: msg.into() }
    }

    pub fn server(status: u16, msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Server { status, message: Some(msg.into()) }
    }

    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Authentication { status, .. } | Self::Validation { status, .. } => *status,
            Self::Server { status, .. } => Some(*status),
            Self::Network(_) | Self::Serialization(_) => None,
        }
    }

    /// Text shown to the user in a transient notification.
    pub fn user_message(&self) -> Cow<'static, str> {
        match self {
            Self::Network(_) => NETWORK_FAILURE_MESSAGE.into(),
            Self::Authentication { message, .. } | Self::Validation { message, .. }
                if !message.trim().is_empty() =>
            {
                message.clone()
            }
            Self::Server { message: Some(message), .. } if !message.trim().is_empty() => {
                message.clone()
            }
            _ => GENERIC_FAILURE_MESSAGE.into(),
        }
    }

    /// Classifies a non-2xx response.
    ///
    /// For 401 and 403 a structured code wins over the message text. Message matching is
    /// only used when the backend sent no code at all.
    pub fn from_response(status: u16, body: ErrorBody) -> Self {
        let ErrorBody { message, code } = body;
        let message: Cow<'static, str> = message.map(Cow::Owned).unwrap_or_default();

        match status {
            401 | 403 => {
                let is_auth = match code.as_deref() {
                    Some(code) => AUTH_ERROR_CODES.contains(&code),
                    None => looks_like_auth_failure(&message),
                };
                if is_auth {
                    Self::Authentication { status: Some(status), message }
                } else {
                    Self::Validation { status: Some(status), code, message }
                }
            }
            400..=499 => Self::Validation { status: Some(status), code, message },
            _ => Self::Server {
                status,
                message: if message.is_empty() { None } else { Some(message) },
            },
        }
    }
}

fn looks_like_auth_failure(message: &str) -> bool {
    let lower = message.to_lowercase();
    AUTH_MESSAGE_MARKERS.iter().any(|marker| lower.contains(marker))
}

fn is_error_code(value: &str) -> bool {
    !value.is_empty()
        && value.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

/// Error payload as sent by the backend: `{ "message": "...", "error": "TOKEN_EXPIRED" }`.
///
/// Older endpoints put a sentence in `error` instead of a code; that sentence is treated as the
/// message.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ErrorBody {
    pub message: Option<String>,
    pub code: Option<String>,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: Some(message.into()), code: None }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn from_value(value: &Value) -> Self {
        let text = |key: &str| {
            value.get(key).and_then(Value::as_str).map(str::trim).filter(|s| !s.is_empty())
        };

        match value {
            Value::String(s) if !s.trim().is_empty() => Self::new(s.trim()),
            Value::Object(_) => {
                let mut body = ErrorBody {
                    message: text("message").map(str::to_string),
                    code: text("code").filter(|c| is_error_code(c)).map(str::to_string),
                };
                if let Some(error) = text("error") {
                    if is_error_code(error) {
                        body.code.get_or_insert_with(|| error.to_string());
                    } else if body.message.is_none() {
                        body.message = Some(error.to_string());
                    }
                }
                body
            }
            _ => Self::default(),
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            log::error!("Malformed response body: {:?}", err);
            return ClientError::server(
                err.status().map(|s| s.as_u16()).unwrap_or(200),
                "Malformed response from server",
            );
        }
        log::warn!("Transport failure: {:?}", err);
        ClientError::Network(err.to_string().into())
    }
}

impl From<validator::ValidationErrors> for ClientError {
    fn from(errors: validator::ValidationErrors) -> Self {
        // Schema-level errors are reported as field errors under `__all__`.
        let message = errors
            .field_errors()
            .values()
            .flat_map(|errs| errs.iter())
            .find_map(|e| e.message.clone())
            .unwrap_or_else(|| errors.to_string().into());
        ClientError::Validation { status: None, code: None, message }
    }
}

impl From<CreatePoolError> for ClientError {
    fn from(err: CreatePoolError) -> Self {
        log::error!("Redis pool init error: {:?}", err);
        ClientError::Network(err.to_string().into())
    }
}

impl From<PoolError> for ClientError {
    fn from(err: PoolError) -> Self {
        log::error!("Redis pool error: {:?}", err);
        ClientError::Network(err.to_string().into())
    }
}

impl From<RedisError> for ClientError {
    fn from(err: RedisError) -> Self {
        log::error!("Redis error: {:?}", err);
        ClientError::Network(err.to_string().into())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("{name} must be a valid {expected}")]
    Invalid { name: &'static str, expected: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn classify(status: u16, body: Value) -> ClientError {
        ClientError::from_response(status, ErrorBody::from_value(&body))
    }

    #[test]
    fn validation_message_on_401_keeps_session() {
        let err = classify(401, json!({ "message": "Invalid ticket size format" }));
        assert!(matches!(err, ClientError::Validation { status: Some(401), .. }));
        assert_eq!(err.user_message(), "Invalid ticket size format");
    }

    #[test]
    fn expired_token_on_401_is_authentication() {
        let err = classify(401, json!({ "message": "Unauthorized: token expired" }));
        assert!(err.is_authentication());
    }

    #[test]
    fn structured_code_wins_over_message() {
        let err = classify(401, json!({ "message": "Session expired", "error": "TICKET_FORMAT" }));
        assert!(
            matches!(err, ClientError::Validation { code: Some(ref c), .. } if c == "TICKET_FORMAT")
        );

        let err = classify(401, json!({ "message": "Please retry", "error": "TOKEN_EXPIRED" }));
        assert!(err.is_authentication());
    }

    #[test]
    fn sentence_in_error_field_is_a_message() {
        let body = ErrorBody::from_value(&json!({ "error": "User not found" }));
        assert_eq!(body.message.as_deref(), Some("User not found"));
        assert_eq!(body.code, None);
        assert!(ClientError::from_response(401, body).is_authentication());
    }

    #[test]
    fn forbidden_with_backend_style_message_is_authentication() {
        let err = classify(403, json!({ "message": "Token Invalid or Expired" }));
        assert!(err.is_authentication());

        let err = classify(403, json!({ "message": "No permission" }));
        assert!(matches!(err, ClientError::Validation { status: Some(403), .. }));
    }

    #[test]
    fn server_errors_fall_back_to_generic_message() {
        let err = classify(500, Value::Null);
        assert!(matches!(err, ClientError::Server { status: 500, message: None }));
        assert_eq!(err.user_message(), GENERIC_FAILURE_MESSAGE);

        let err = classify(503, json!({ "message": "Maintenance window" }));
        assert_eq!(err.user_message(), "Maintenance window");
    }

    #[test]
    fn other_client_errors_are_validation() {
        let err = classify(409, json!({ "message": "Friend request already exists" }));
        assert!(matches!(err, ClientError::Validation { status: Some(409), .. }));
    }
}
