use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde_json::json;
use std::path::PathBuf;
use thiserror::Error;

/// Structured error types for the cropscan application.
///
/// Each variant captures context specific to its error domain (filesystem, image
/// decoding, local model, remote API) so callers never have to parse error strings.
#[derive(Error, Debug)]
pub enum CropscanError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Filesystem error: {operation} failed for {path:?}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Image processing error: {operation} failed")]
    ImageProcessing {
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Model error: {operation} failed")]
    Model {
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Remote API error: {operation} failed")]
    RemoteApi {
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Remote API rejected the request with status {status}: {message}")]
    ApiRejected { status: u16, message: String },

    #[error("Backend {backend} returned no predictions")]
    NoPredictions { backend: String },
}

pub type Result<T> = std::result::Result<T, CropscanError>;

/// Handlers return `CropscanError` directly; this mapping is the single place
/// where error domains become HTTP statuses.
impl IntoResponse for CropscanError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::ImageProcessing { .. } | Self::NoPredictions { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::RemoteApi { .. } | Self::ApiRejected { .. } => StatusCode::BAD_GATEWAY,
            Self::Configuration { .. } | Self::FileSystem { .. } | Self::Model { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        tracing::warn!(error = %self, status = %status, "request failed");
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// I/O errors without call-site context fall back to this conversion. Code that
/// has a path and operation should construct `FileSystem` directly.
impl From<std::io::Error> for CropscanError {
    fn from(err: std::io::Error) -> Self {
        Self::FileSystem {
            path: PathBuf::from("unknown"),
            operation: "unknown".to_string(),
            source: err,
        }
    }
}

impl From<image::ImageError> for CropscanError {
    fn from(err: image::ImageError) -> Self {
        Self::ImageProcessing {
            operation: "image processing".to_string(),
            source: Box::new(err),
        }
    }
}

impl From<ort::Error> for CropscanError {
    fn from(err: ort::Error) -> Self {
        Self::Model {
            operation: "ort operation".to_string(),
            source: Box::new(err),
        }
    }
}

/// Shape errors occur during tensor operations which are part of model
/// inference, so they are categorized as model errors.
impl From<ndarray::ShapeError> for CropscanError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::Model {
            operation: "tensor shape conversion".to_string(),
            source: Box::new(err),
        }
    }
}

impl From<reqwest::Error> for CropscanError {
    fn from(err: reqwest::Error) -> Self {
        Self::RemoteApi {
            operation: "http request".to_string(),
            source: Box::new(err),
        }
    }
}

impl From<serde_json::Error> for CropscanError {
    fn from(err: serde_json::Error) -> Self {
        Self::RemoteApi {
            operation: "response decoding".to_string(),
            source: Box::new(err),
        }
    }
}
