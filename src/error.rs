//! Domain errors for image preparation, document assembly and capture sessions.

use axum::http::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum ExtractorError {
    #[error("unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("failed to decode image: {0}")]
    Decode(String),

    #[error("failed to compress image: {0}")]
    Compression(String),

    #[error("failed to build document: {0}")]
    Document(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("image index {index} out of range (session has {len} images)")]
    ImageIndexOutOfRange { index: usize, len: usize },
}

impl ExtractorError {
    /// HTTP status a handler should answer with for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::UnsupportedFileType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::Decode(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Compression(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Document(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::SessionNotFound(_) | Self::ImageIndexOutOfRange { .. } => StatusCode::NOT_FOUND,
        }
    }
}

impl From<ExtractorError> for (StatusCode, String) {
    fn from(err: ExtractorError) -> Self {
        (err.status_code(), err.to_string())
    }
}

impl From<zip::result::ZipError> for ExtractorError {
    fn from(err: zip::result::ZipError) -> Self {
        Self::Document(err.to_string())
    }
}

impl From<std::io::Error> for ExtractorError {
    fn from(err: std::io::Error) -> Self {
        Self::Document(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ExtractorError>;
