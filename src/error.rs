use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::{Deserialize, Serialize};
use sqlx::Error as SqlxError;
use thiserror::Error as ThisError;
use tokio_tungstenite::tungstenite::Error as WsError;

#[derive(Debug, ThisError)]
pub enum NexusError {
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("HTTP request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(Box<WsError>),

    #[error("Database error: {0}")]
    DatabaseError(#[from] SqlxError),

    #[error("Ractor error: {0}")]
    RactorError(String),

    #[error("Remote store error ({status}): {body:?}")]
    Remote {
        status: StatusCode,
        body: PostgrestError,
    },

    #[error("Remote store is not configured")]
    NotConfigured,

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Quote {0} not found")]
    NotFound(i64),

    #[error("No quotes available")]
    NoQuotesAvailable,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Too many login attempts")]
    RateLimited,
}

impl NexusError {
    /// The failure came from talking to the remote store rather than from the caller's input.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            NexusError::Reqwest(_)
                | NexusError::UrlParse(_)
                | NexusError::WebSocket(_)
                | NexusError::Remote { .. }
                | NexusError::Json(_)
        )
    }

    /// PostgREST error code, when the remote store returned one.
    pub fn remote_code(&self) -> Option<&str> {
        match self {
            NexusError::Remote { body, .. } => body.code.as_deref(),
            _ => None,
        }
    }
}

impl From<WsError> for NexusError {
    fn from(e: WsError) -> Self {
        NexusError::WebSocket(Box::new(e))
    }
}

impl IntoResponse for NexusError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_body) = match self {
            NexusError::Validation(reason) => (
                StatusCode::BAD_REQUEST,
                ApiErrorBody {
                    code: "VALIDATION".to_string(),
                    message: reason,
                },
            ),
            NexusError::NotFound(id) => (
                StatusCode::NOT_FOUND,
                ApiErrorBody {
                    code: "NOT_FOUND".to_string(),
                    message: format!("Quote {id} not found."),
                },
            ),
            NexusError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                ApiErrorBody {
                    code: "UNAUTHORIZED".to_string(),
                    message: "Admin login required.".to_string(),
                },
            ),
            NexusError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                ApiErrorBody {
                    code: "RATE_LIMIT".to_string(),
                    message: "Too many login attempts, try again later.".to_string(),
                },
            ),
            NexusError::NoQuotesAvailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                ApiErrorBody {
                    code: "NO_QUOTES".to_string(),
                    message: "No quotes are available right now.".to_string(),
                },
            ),
            NexusError::NotConfigured => (
                StatusCode::SERVICE_UNAVAILABLE,
                ApiErrorBody {
                    code: "NOT_CONFIGURED".to_string(),
                    message: "The quote store is not configured.".to_string(),
                },
            ),
            NexusError::Reqwest(_)
            | NexusError::UrlParse(_)
            | NexusError::WebSocket(_)
            | NexusError::Json(_)
            | NexusError::Remote { .. } => (
                StatusCode::BAD_GATEWAY,
                ApiErrorBody {
                    code: "BAD_GATEWAY".to_string(),
                    message: "The quote store is unavailable.".to_string(),
                },
            ),
            NexusError::DatabaseError(_) | NexusError::RactorError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiErrorBody {
                    code: "INTERNAL_ERROR".to_string(),
                    message: "An internal server error occurred.".to_string(),
                },
            ),
        };
        (status, Json(ApiErrorResponse { error: error_body })).into_response()
    }
}

/// Standardized API error response body
#[derive(Serialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorBody,
}

/// PostgREST error payload, e.g. `{"code":"PGRST116","message":"...","details":null,"hint":null}`.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct PostgrestError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub hint: Option<String>,
}

/// "The result contains 0 rows" when a single object was requested.
pub const PGRST_NO_ROWS: &str = "PGRST116";
/// "Could not find the table in the schema cache".
pub const PGRST_NO_TABLE: &str = "PGRST205";
/// Postgres `undefined_table`.
pub const PG_UNDEFINED_TABLE: &str = "42P01";
