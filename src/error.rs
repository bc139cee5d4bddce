//! Error types for the listmatch server
//!
//! Every failure goes back to the client as `500` with a plain-text message;
//! the command-line client prints whatever text it receives.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::codec::CodecError;
use crate::upload::StoreError;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Store(#[from] StoreError),

    #[error("{0}\nreading")]
    Codec(#[from] CodecError),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Store(StoreError::NotFound) | AppError::Store(StoreError::EmptyUpload) => {
                tracing::debug!(error = %self, "Match against unknown upload");
            }
            AppError::Codec(CodecError::Body(e)) => {
                tracing::debug!(error = %e, "Request body aborted");
            }
            _ => {
                tracing::warn!(error = %self, "Request failed");
            }
        }

        (
            self.status_code(),
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.to_string(),
        )
            .into_response()
    }
}
