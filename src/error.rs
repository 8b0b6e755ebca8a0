//! Error types for the bdrow client.

use thiserror::Error;

/// Result type alias for bdrow operations.
pub type BdrowResult<T> = Result<T, BdrowError>;

/// Errors that can occur outside the intent layer.
///
/// Intents on [`crate::SessionManager`] never return these; they are folded
/// into the snapshot's `error_message` instead.
#[derive(Error, Debug)]
pub enum BdrowError {
    /// Image decode/encode error.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Filesystem error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed.
    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    /// JSON serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Base64 payload could not be decoded.
    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Image dimensions exceed what the rasterizer can address.
    #[error("Image {width}x{height} exceeds the raster limit of {limit}px per side")]
    ImageTooLarge { width: u32, height: u32, limit: u32 },

    /// Font data could not be registered or laid out.
    #[error("Font error: {0}")]
    Font(String),

    /// Index out of bounds for list operations.
    #[error("Index {index} out of bounds for list of length {length}")]
    IndexOutOfBounds { index: usize, length: usize },

    /// Invalid argument supplied by a caller.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl BdrowError {
    /// Creates an ImageTooLarge error.
    pub fn image_too_large(width: u32, height: u32, limit: u32) -> Self {
        Self::ImageTooLarge {
            width,
            height,
            limit,
        }
    }

    /// Creates a Font error.
    pub fn font(msg: impl Into<String>) -> Self {
        Self::Font(msg.into())
    }

    /// Creates an IndexOutOfBounds error.
    pub fn index_out_of_bounds(index: usize, length: usize) -> Self {
        Self::IndexOutOfBounds { index, length }
    }

    /// Creates an InvalidArgument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}
