//! # AppError
//!
//! Centralized error handling for the Idea Board workspace.
//! Every failure a caller can recover from maps to one of these variants;
//! none of them is meant to bring the application down.

use thiserror::Error;

/// The primary error type for all ib-core operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// Resource not found (e.g., Idea, Author, Bio)
    #[error("{0} not found with ID {1}")]
    NotFound(String, String),

    /// Validation failure (e.g., empty comment, missing title)
    #[error("validation error: {0}")]
    Validation(String),

    /// The action needs a signed-in user, or the user does not own the resource
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Remote store failure (network error, backend exception, bad payload)
    #[error("remote store error: {0}")]
    Remote(String),

    /// Resource already exists (e.g., a second bio for the same author)
    #[error("conflict: {0}")]
    Conflict(String),

    /// Anything else that should never happen in a healthy process
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn not_found(kind: &str, id: impl ToString) -> Self {
        AppError::NotFound(kind.to_string(), id.to_string())
    }

    /// Message suitable for an inline toast: no variant prefix.
    pub fn user_message(&self) -> String {
        match self {
            AppError::NotFound(kind, _) => format!("{} not found", capitalize(kind)),
            AppError::Validation(msg) | AppError::Unauthorized(msg) | AppError::Conflict(msg) => {
                msg.clone()
            }
            AppError::Remote(_) | AppError::Internal(_) => {
                "Something went wrong. Please try again.".to_string()
            }
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Remote(format!("malformed document: {err}"))
    }
}

/// A specialized Result type for Idea Board logic.
pub type Result<T> = std::result::Result<T, AppError>;
