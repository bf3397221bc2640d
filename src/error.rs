use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Error body returned to clients.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub detail: String,
}

/// Which optimistic guard a conflict came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// End-turn for a round that already ended.
    Round,
    /// Confirmation for a session that changed since it was prompted.
    State,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GameError {
    #[error("game {game_id} not found")]
    NotFound { game_id: String },
    #[error("invalid precondition: {0}")]
    InvalidPrecondition(String),
    /// Optimistic guard failed. `expected` is what the caller saw, `actual` is current.
    #[error("conflict: expected {expected}, current is {actual}")]
    Conflict {
        kind: ConflictKind,
        expected: String,
        actual: String,
    },
    #[error("validation error: {0}")]
    Validation(String),
    #[error("session unavailable: {0}")]
    Unavailable(String),
}

impl GameError {
    pub fn not_found(game_id: impl Into<String>) -> Self {
        Self::NotFound {
            game_id: game_id.into(),
        }
    }

    pub fn precondition(detail: impl Into<String>) -> Self {
        Self::InvalidPrecondition(detail.into())
    }

    pub fn validation(detail: impl Into<String>) -> Self {
        Self::Validation(detail.into())
    }

    pub fn stale_round(expected: u32, actual: u32) -> Self {
        Self::Conflict {
            kind: ConflictKind::Round,
            expected: format!("round {expected}"),
            actual: format!("round {actual}"),
        }
    }

    pub fn stale_state(expected: &str, actual: &str) -> Self {
        Self::Conflict {
            kind: ConflictKind::State,
            expected: format!("state {expected}"),
            actual: format!("state {actual}"),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "GAME_NOT_FOUND",
            Self::InvalidPrecondition(_) => "INVALID_PRECONDITION",
            Self::Conflict {
                kind: ConflictKind::Round,
                ..
            } => "STALE_ROUND",
            Self::Conflict {
                kind: ConflictKind::State,
                ..
            } => "STALE_STATE",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Unavailable(_) => "SESSION_UNAVAILABLE",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::InvalidPrecondition(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for GameError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            code: self.code(),
            detail: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}
