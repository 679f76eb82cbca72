//! Pixel codecs for hork-texture
//!
//! Two families of codecs live here:
//!
//! - **Packed channel codecs** ([`packed`]): bit exact conversion between
//!   packed layouts (R5G6B5, R10G10B10A2, R11G11B10 float, half float, ...)
//!   and one `f32` per channel.
//! - **Block compression** ([`bc`]): BC1 through BC7 encoders and decoders,
//!   with a multi-threaded BC6H image compressor.
//!
//! # Example
//!
//! ```rust,no_run
//! use hork_texture_codec::{BlockCompression, compress_image};
//!
//! let rgba = vec![255u8; 64 * 64 * 4];
//! let mode = BlockCompression::Bc7 { uber_level: 2 };
//! let mut blocks = vec![0u8; mode.output_size(64, 64)];
//! compress_image(&mode, &rgba, 64 * 4, 64, 64, &mut blocks, None)?;
//! # Ok::<(), hork_texture_core::TextureError>(())
//! ```

pub mod bc;
pub mod packed;

pub use bc::{
    BC1_DEFAULT_QUALITY, BC1_MAX_QUALITY, BC6H_DEFAULT_WORKERS, BC7_DEFAULT_UBER_LEVEL,
    BC7_MAX_UBER_LEVEL, Bc1Flags, Bc6hSettings, BlockCompression, compress_image,
    decompress_image, decompressed_format,
};
pub use packed::{ChannelCodec, codec_for_format};
