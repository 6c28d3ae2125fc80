//! Error types for the pose overlay library.

use thiserror::Error;

/// Message surfaced when camera setup fails for any reason
pub const CAPTURE_UNAVAILABLE_MESSAGE: &str =
    "This host does not support video capture, or this device does not have a camera";

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    /// `OpenCV` operation failed
    #[error("OpenCV error: {0}")]
    OpenCV(#[from] opencv::Error),

    /// `ONNX` Runtime inference failed
    #[error("ONNX Runtime error: {0}")]
    OnnxRuntime(#[from] ort::OrtError),

    /// Camera capability missing, permission denied, or stream never became ready
    #[error("Capture unavailable: {0}")]
    CaptureUnavailable(String),

    /// A cycle ran without a loaded model or a playable video source
    #[error("Inference unavailable: {0}")]
    InferenceUnavailable(String),

    /// Invalid input parameters provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Model loading or inference error
    #[error("Model error: {0}")]
    ModelError(String),

    /// Model input configuration error
    #[error("Model input error: {0}")]
    ModelInputError(String),

    /// Model output processing error
    #[error("Model output error: {0}")]
    ModelOutputError(String),

    /// Model data shape or format error
    #[error("Model data format error: {0}")]
    ModelDataFormatError(String),

    /// Display window operation failed
    #[error("Window error: {0}")]
    Window(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic I/O error with description
    #[error("I/O error: {0}")]
    IoError(String),
}

impl Error {
    /// Capture failure carrying the fixed user-facing message
    #[must_use]
    pub fn capture_unavailable() -> Self {
        Self::CaptureUnavailable(CAPTURE_UNAVAILABLE_MESSAGE.to_string())
    }
}

/// Convenience type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, Error>;
