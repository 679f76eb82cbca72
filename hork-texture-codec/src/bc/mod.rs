//! BCn block compression
//!
//! Every format works on 4x4 texel blocks. The per-format modules expose
//! block level `encode_block`/`decode_block`; this module adds the image
//! level entry points that walk the block grid honoring a row stride.

mod fit;
mod partition;

pub mod bc1;
pub mod bc2;
pub mod bc3;
pub mod bc4;
pub mod bc5;
pub mod bc6h;
pub mod bc7;

use std::sync::atomic::{AtomicU32, Ordering};

use hork_texture_core::{Result, TextureError, TextureFormat};
use serde::{Deserialize, Serialize};
use tracing::trace;

pub use bc1::{BC1_DEFAULT_QUALITY, BC1_MAX_QUALITY, Bc1Flags};
pub use bc6h::{BC6H_DEFAULT_WORKERS, Bc6hSettings};
pub use bc7::{BC7_DEFAULT_UBER_LEVEL, BC7_MAX_UBER_LEVEL};

/// Block compression format together with its encoder settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockCompression {
    /// RGB with optional 1-bit alpha, from RGBA8
    Bc1 { quality: u32, flags: Bc1Flags },
    /// RGB with 4-bit explicit alpha, from RGBA8
    Bc2 { quality: u32 },
    /// RGB with interpolated alpha, from RGBA8
    Bc3 { quality: u32, high_quality_alpha: bool },
    /// Single channel, from R8
    Bc4 { high_quality: bool },
    /// Two channels, from RG8
    Bc5 { high_quality: bool },
    /// HDR RGB, from RGBA32_FLOAT
    Bc6h(Bc6hSettings),
    /// RGBA, from RGBA8
    Bc7 { uber_level: u32 },
}

impl BlockCompression {
    /// Bytes per encoded 4x4 block
    pub fn block_bytes(&self) -> usize {
        match self {
            BlockCompression::Bc1 { .. } | BlockCompression::Bc4 { .. } => 8,
            _ => 16,
        }
    }

    /// Encoded size of a `width` x `height` image
    pub fn output_size(&self, width: u32, height: u32) -> usize {
        width.div_ceil(4) as usize * height.div_ceil(4) as usize * self.block_bytes()
    }

    /// Bytes per source pixel expected by `compress_image`
    pub fn source_bytes_per_pixel(&self) -> usize {
        match self {
            BlockCompression::Bc4 { .. } => 1,
            BlockCompression::Bc5 { .. } => 2,
            BlockCompression::Bc6h(_) => 16,
            _ => 4,
        }
    }

    /// Format of the compressed data
    pub fn format(&self, srgb: bool) -> TextureFormat {
        let format = match self {
            BlockCompression::Bc1 { .. } => TextureFormat::BC1_UNORM,
            BlockCompression::Bc2 { .. } => TextureFormat::BC2_UNORM,
            BlockCompression::Bc3 { .. } => TextureFormat::BC3_UNORM,
            BlockCompression::Bc4 { .. } => TextureFormat::BC4_UNORM,
            BlockCompression::Bc5 { .. } => TextureFormat::BC5_UNORM,
            BlockCompression::Bc6h(settings) if settings.signed => TextureFormat::BC6H_SFLOAT,
            BlockCompression::Bc6h(_) => TextureFormat::BC6H_UFLOAT,
            BlockCompression::Bc7 { .. } => TextureFormat::BC7_UNORM,
        };
        if srgb { format.to_srgb() } else { format }
    }
}

/// Uncompressed format a block compressed format decodes to
///
/// Returns `None` for formats that are not block compressed.
pub fn decompressed_format(format: TextureFormat) -> Option<TextureFormat> {
    use TextureFormat::*;
    Some(match format {
        BC1_UNORM | BC2_UNORM | BC3_UNORM | BC7_UNORM => RGBA8_UNORM,
        BC1_UNORM_SRGB | BC2_UNORM_SRGB | BC3_UNORM_SRGB | BC7_UNORM_SRGB => RGBA8_UNORM_SRGB,
        BC4_UNORM => R8_UNORM,
        BC4_SNORM => R8_SNORM,
        BC5_UNORM => RG8_UNORM,
        BC5_SNORM => RG8_SNORM,
        BC6H_UFLOAT | BC6H_SFLOAT => RGBA32_FLOAT,
        _ => return None,
    })
}

fn check_block_aligned(width: u32, height: u32, what: &str) -> Result<()> {
    if width % 4 != 0 || height % 4 != 0 {
        return Err(TextureError::invalid_dimensions(
            width,
            height,
            1,
            format!("{} requires multiples of 4", what),
        ));
    }
    Ok(())
}

fn check_strided(len: usize, stride: usize, row_bytes: usize, height: u32) -> Result<()> {
    if stride < row_bytes {
        return Err(TextureError::invalid_data(format!(
            "row stride {} is smaller than a row of {} bytes",
            stride, row_bytes
        )));
    }
    let required = if height == 0 {
        0
    } else {
        stride * (height as usize - 1) + row_bytes
    };
    if len < required {
        return Err(TextureError::buffer_too_small(required, len));
    }
    Ok(())
}

fn gather<const N: usize>(src: &[u8], stride: usize, block_x: usize, block_y: usize) -> [[u8; N]; 16] {
    std::array::from_fn(|i| {
        let offset = (block_y * 4 + i / 4) * stride + (block_x * 4 + i % 4) * N;
        std::array::from_fn(|c| src[offset + c])
    })
}

fn scatter<const N: usize>(
    texels: &[[u8; N]; 16],
    dst: &mut [u8],
    stride: usize,
    block_x: usize,
    block_y: usize,
) {
    for (i, texel) in texels.iter().enumerate() {
        let offset = (block_y * 4 + i / 4) * stride + (block_x * 4 + i % 4) * N;
        dst[offset..offset + N].copy_from_slice(texel);
    }
}

/// Compress an image into BCn blocks
///
/// `src` holds `height` rows of `width` pixels laid out as described by
/// [`BlockCompression::source_bytes_per_pixel`], `src_stride` bytes apart.
/// Blocks are written to `dst` row by row. Dimensions must be multiples of 4.
pub fn compress_image(
    mode: &BlockCompression,
    src: &[u8],
    src_stride: usize,
    width: u32,
    height: u32,
    dst: &mut [u8],
    progress: Option<&AtomicU32>,
) -> Result<()> {
    check_block_aligned(width, height, "block compression")?;
    check_strided(src.len(), src_stride, width as usize * mode.source_bytes_per_pixel(), height)?;
    let required = mode.output_size(width, height);
    if dst.len() < required {
        return Err(TextureError::buffer_too_small(required, dst.len()));
    }

    if let BlockCompression::Bc6h(settings) = mode {
        return bc6h::compress_image(src, src_stride, width, height, dst, settings, progress);
    }

    let blocks_x = (width / 4) as usize;
    let blocks_y = (height / 4) as usize;
    let block_bytes = mode.block_bytes();
    let blocks = dst[..required].chunks_exact_mut(block_bytes);

    for (index, out) in blocks.enumerate() {
        let (bx, by) = (index % blocks_x, index / blocks_x);
        match *mode {
            BlockCompression::Bc1 { quality, flags } => {
                out.copy_from_slice(&bc1::encode_block(&gather(src, src_stride, bx, by), quality, flags))
            }
            BlockCompression::Bc2 { quality } => {
                out.copy_from_slice(&bc2::encode_block(&gather(src, src_stride, bx, by), quality))
            }
            BlockCompression::Bc3 {
                quality,
                high_quality_alpha,
            } => out.copy_from_slice(&bc3::encode_block(
                &gather(src, src_stride, bx, by),
                quality,
                high_quality_alpha,
            )),
            BlockCompression::Bc4 { high_quality } => {
                let texels = gather::<1>(src, src_stride, bx, by).map(|t| t[0]);
                out.copy_from_slice(&bc4::encode_block(&texels, high_quality))
            }
            BlockCompression::Bc5 { high_quality } => {
                out.copy_from_slice(&bc5::encode_block(&gather(src, src_stride, bx, by), high_quality))
            }
            BlockCompression::Bc7 { uber_level } => {
                out.copy_from_slice(&bc7::encode_block(&gather(src, src_stride, bx, by), uber_level))
            }
            BlockCompression::Bc6h(_) => unreachable!("handled above"),
        }
        if let Some(counter) = progress {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    trace!(
        "compressed {}x{} into {} {} blocks",
        width,
        height,
        blocks_x * blocks_y,
        mode.format(false)
    );
    Ok(())
}

/// Decompress BCn blocks into the layout of [`decompressed_format`]
///
/// Rows are written `dst_stride` bytes apart. BC6H decodes to RGBA32_FLOAT
/// with alpha set to 1.
pub fn decompress_image(
    format: TextureFormat,
    src: &[u8],
    dst: &mut [u8],
    dst_stride: usize,
    width: u32,
    height: u32,
) -> Result<()> {
    let Some(target) = decompressed_format(format) else {
        return Err(TextureError::unsupported(format!(
            "{} is not a block compressed format",
            format
        )));
    };
    check_block_aligned(width, height, "block decompression")?;

    let required = format.calculate_data_size(width, height)?;
    if src.len() < required {
        return Err(TextureError::buffer_too_small(required, src.len()));
    }
    let pixel_bytes = target.bytes_per_block() as usize;
    check_strided(dst.len(), dst_stride, width as usize * pixel_bytes, height)?;

    let blocks_x = (width / 4) as usize;
    let block_bytes = format.bytes_per_block() as usize;

    for (index, block) in src[..required].chunks_exact(block_bytes).enumerate() {
        let (bx, by) = (index % blocks_x, index / blocks_x);
        match format {
            TextureFormat::BC1_UNORM | TextureFormat::BC1_UNORM_SRGB => {
                scatter(&bc1::decode_block(&to_array(block)), dst, dst_stride, bx, by)
            }
            TextureFormat::BC2_UNORM | TextureFormat::BC2_UNORM_SRGB => {
                scatter(&bc2::decode_block(&to_array(block)), dst, dst_stride, bx, by)
            }
            TextureFormat::BC3_UNORM | TextureFormat::BC3_UNORM_SRGB => {
                scatter(&bc3::decode_block(&to_array(block)), dst, dst_stride, bx, by)
            }
            TextureFormat::BC7_UNORM | TextureFormat::BC7_UNORM_SRGB => {
                scatter(&bc7::decode_block(&to_array(block)), dst, dst_stride, bx, by)
            }
            TextureFormat::BC4_UNORM => {
                let texels = bc4::decode_block(&to_array(block)).map(|v| [v]);
                scatter(&texels, dst, dst_stride, bx, by)
            }
            TextureFormat::BC4_SNORM => {
                let texels = bc4::decode_block_signed(&to_array(block)).map(|v| [v as u8]);
                scatter(&texels, dst, dst_stride, bx, by)
            }
            TextureFormat::BC5_UNORM => {
                scatter(&bc5::decode_block(&to_array(block)), dst, dst_stride, bx, by)
            }
            TextureFormat::BC5_SNORM => {
                let texels = bc5::decode_block_signed(&to_array(block)).map(|t| t.map(|v| v as u8));
                scatter(&texels, dst, dst_stride, bx, by)
            }
            TextureFormat::BC6H_UFLOAT | TextureFormat::BC6H_SFLOAT => {
                let signed = format == TextureFormat::BC6H_SFLOAT;
                let texels = bc6h::decode_block(&to_array(block), signed).map(|[r, g, b]| {
                    let mut bytes = [0u8; 16];
                    for (chunk, v) in bytes.chunks_exact_mut(4).zip([r, g, b, 1.0]) {
                        chunk.copy_from_slice(&v.to_le_bytes());
                    }
                    bytes
                });
                scatter(&texels, dst, dst_stride, bx, by)
            }
            _ => unreachable!("decompressed_format accepted {}", format),
        }
    }
    Ok(())
}

fn to_array<const N: usize>(block: &[u8]) -> [u8; N] {
    std::array::from_fn(|i| block[i])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_size() {
        let bc1 = BlockCompression::Bc1 {
            quality: BC1_DEFAULT_QUALITY,
            flags: Bc1Flags::default(),
        };
        assert_eq!(bc1.block_bytes(), 8);
        assert_eq!(bc1.output_size(256, 256), 64 * 64 * 8);
        assert_eq!(BlockCompression::Bc7 { uber_level: 0 }.output_size(8, 4), 32);
    }

    #[test]
    fn test_format_mapping() {
        let bc3 = BlockCompression::Bc3 {
            quality: 0,
            high_quality_alpha: false,
        };
        assert_eq!(bc3.format(false), TextureFormat::BC3_UNORM);
        assert_eq!(bc3.format(true), TextureFormat::BC3_UNORM_SRGB);
        // No sRGB variant for single channel formats
        assert_eq!(BlockCompression::Bc4 { high_quality: true }.format(true), TextureFormat::BC4_UNORM);
        let signed = BlockCompression::Bc6h(Bc6hSettings {
            signed: true,
            workers: 1,
        });
        assert_eq!(signed.format(false), TextureFormat::BC6H_SFLOAT);
        assert_eq!(signed.source_bytes_per_pixel(), 16);
    }

    #[test]
    fn test_decompressed_format() {
        assert_eq!(
            decompressed_format(TextureFormat::BC7_UNORM_SRGB),
            Some(TextureFormat::RGBA8_UNORM_SRGB)
        );
        assert_eq!(decompressed_format(TextureFormat::BC5_SNORM), Some(TextureFormat::RG8_SNORM));
        assert_eq!(decompressed_format(TextureFormat::RGBA8_UNORM), None);
    }

    #[test]
    fn test_misaligned_dimensions_are_rejected() {
        let mode = BlockCompression::Bc4 { high_quality: false };
        let src = vec![0u8; 6 * 4];
        let mut dst = vec![0u8; 64];
        let err = compress_image(&mode, &src, 6, 6, 4, &mut dst, None).unwrap_err();
        assert!(matches!(err, TextureError::InvalidDimensions { .. }));
    }

    #[test]
    fn test_short_destination_is_rejected() {
        let mode = BlockCompression::Bc7 { uber_level: 0 };
        let src = vec![0u8; 8 * 8 * 4];
        let mut dst = vec![0u8; 32];
        let err = compress_image(&mode, &src, 32, 8, 8, &mut dst, None).unwrap_err();
        assert!(matches!(err, TextureError::BufferTooSmall { required: 64, actual: 32 }));
    }

    #[test]
    fn test_strided_round_trip() {
        // 8x4 RG8 image with 4 bytes of row padding
        let stride = 8 * 2 + 4;
        let mut src = vec![0xEEu8; stride * 4];
        for y in 0..4 {
            for x in 0..8 {
                let o = y * stride + x * 2;
                src[o] = if x < 4 { 40 } else { 200 };
                src[o + 1] = 90;
            }
        }
        let mode = BlockCompression::Bc5 { high_quality: false };
        let mut blocks = vec![0u8; mode.output_size(8, 4)];
        let progress = AtomicU32::new(0);
        compress_image(&mode, &src, stride, 8, 4, &mut blocks, Some(&progress)).unwrap();
        assert_eq!(progress.load(Ordering::Relaxed), 2);

        let mut out = vec![0u8; 8 * 2 * 4];
        decompress_image(TextureFormat::BC5_UNORM, &blocks, &mut out, 16, 8, 4).unwrap();
        for y in 0..4 {
            for x in 0..8 {
                let o = y * 16 + x * 2;
                assert_eq!(out[o], if x < 4 { 40 } else { 200 });
                assert_eq!(out[o + 1], 90);
            }
        }
    }

    #[test]
    fn test_decompress_rejects_linear_formats() {
        let mut dst = vec![0u8; 64];
        let err = decompress_image(TextureFormat::RGBA8_UNORM, &[0; 64], &mut dst, 16, 4, 4).unwrap_err();
        assert!(matches!(err, TextureError::UnsupportedOperation(_)));
    }
}
