//! Error types for texture storage and compression

use thiserror::Error;

/// Result type for texture operations
pub type Result<T> = std::result::Result<T, TextureError>;

/// Errors that can occur while building, addressing or converting textures
#[derive(Error, Debug)]
pub enum TextureError {
    /// I/O errors from the underlying byte stream
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Dimensions are misaligned, zero, or not a power of two where required
    #[error("Invalid dimensions {width}x{height}x{depth}: {reason}")]
    InvalidDimensions {
        width: u32,
        height: u32,
        depth: u32,
        reason: String,
    },

    /// Slice count does not match the texture type
    #[error("Invalid slice count {slice_count} for {texture_type}")]
    InvalidSliceCount {
        texture_type: String,
        slice_count: u32,
    },

    /// Operation not supported for this format or texture type
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Mip, slice or region index out of range
    #[error("Out of range: {0}")]
    OutOfRange(String),

    /// Destination buffer smaller than the data to be written into it
    #[error("Buffer too small: required {required}, got {actual}")]
    BufferTooSmall { required: usize, actual: usize },

    /// Malformed input data (serialized stream or raw pixel buffer)
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Source image could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),
}

impl TextureError {
    /// Create a new invalid dimensions error
    pub fn invalid_dimensions<S: Into<String>>(width: u32, height: u32, depth: u32, reason: S) -> Self {
        Self::InvalidDimensions {
            width,
            height,
            depth,
            reason: reason.into(),
        }
    }

    /// Create a new invalid slice count error
    pub fn invalid_slice_count<S: Into<String>>(texture_type: S, slice_count: u32) -> Self {
        Self::InvalidSliceCount {
            texture_type: texture_type.into(),
            slice_count,
        }
    }

    /// Create a new unsupported operation error
    pub fn unsupported<S: Into<String>>(operation: S) -> Self {
        Self::UnsupportedOperation(operation.into())
    }

    /// Create a new out of range error
    pub fn out_of_range<S: Into<String>>(msg: S) -> Self {
        Self::OutOfRange(msg.into())
    }

    /// Create a new buffer too small error
    pub fn buffer_too_small(required: usize, actual: usize) -> Self {
        Self::BufferTooSmall { required, actual }
    }

    /// Create a new invalid data error
    pub fn invalid_data<S: Into<String>>(msg: S) -> Self {
        Self::InvalidData(msg.into())
    }

    /// Create a new decode error
    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Self::Decode(msg.into())
    }

    /// Check if the caller can reasonably retry with different arguments
    pub fn is_recoverable(&self) -> bool {
        match self {
            TextureError::Io(_) => false,
            TextureError::InvalidDimensions { .. } => true, // Resize and retry
            TextureError::InvalidSliceCount { .. } => true,
            TextureError::UnsupportedOperation(_) => false,
            TextureError::OutOfRange(_) => true,
            TextureError::BufferTooSmall { .. } => true, // Grow the buffer
            TextureError::InvalidData(_) => false,
            TextureError::Decode(_) => false,
        }
    }
}
