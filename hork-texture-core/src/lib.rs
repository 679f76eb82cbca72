//! Hork Texture Core
//!
//! Error types and the GPU pixel format registry shared by the codec and
//! storage crates.

pub mod error;
pub mod format;

// Re-export main types
pub use error::{Result, TextureError};
pub use format::{
    DataType, FormatKind, TextureFormat, TextureFormatInfo, calc_num_mips, describe, describe_id,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_functionality() {
        let info = describe(TextureFormat::RGBA8_UNORM);
        assert_eq!(info.bytes_per_block, 4);
        assert_eq!(info.block_size, 1);
        assert_eq!(info.kind, FormatKind::Normalized);
    }
}
