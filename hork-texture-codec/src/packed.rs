//! Packed pixel channel codecs
//!
//! Converts between packed bit layouts and an expanded representation with
//! one `f32` per channel. Channels are packed little-endian with the first
//! named channel in the lowest bits (R5G6B5 stores red in bits 0..5).

use half::f16;
use hork_texture_core::{DataType, Result, TextureError, TextureFormat};

/// Bidirectional converter between a packed pixel layout and `f32` channels
pub trait ChannelCodec: Send + Sync {
    /// Bytes needed to hold a packed `width` x `height` image
    fn required_buffer_size(&self, width: u32, height: u32) -> usize {
        self.row_stride(width) * height as usize
    }

    /// Unpack `packed` into `expanded`, `channel_count()` floats per pixel
    fn decode(&self, packed: &[u8], expanded: &mut [f32]) -> Result<()>;

    /// Pack `expanded` into `packed`
    fn encode(&self, expanded: &[f32], packed: &mut [u8]) -> Result<()>;

    /// Number of channels in the expanded representation
    fn channel_count(&self) -> usize;

    /// Packed storage type
    fn data_type(&self) -> DataType;

    /// Check if the packed values are gamma encoded
    fn is_srgb(&self) -> bool {
        false
    }

    /// Bytes per packed pixel
    fn bytes_per_pixel(&self) -> usize;

    /// Bytes per packed row
    fn row_stride(&self, width: u32) -> usize {
        width as usize * self.bytes_per_pixel()
    }
}

/// Number of pixels both buffers can hold, or an error if they disagree
fn pixel_count(codec: &dyn ChannelCodec, packed: usize, expanded: usize) -> Result<usize> {
    let pixels = packed / codec.bytes_per_pixel();
    let required = pixels * codec.channel_count();
    if expanded < required {
        return Err(TextureError::buffer_too_small(required, expanded));
    }
    Ok(pixels)
}

/// Scale-and-round quantization to `max`
#[inline]
fn quantize(value: f32, max: u32) -> u32 {
    (value.clamp(0.0, 1.0) * max as f32 + 0.5) as u32
}

/// Decision points between adjacent 5-bit values
#[allow(clippy::excessive_precision)]
static MIDPOINTS_5: [f32; 32] = [
    0.0161290323, 0.0483870968, 0.0806451613, 0.112903226, 0.14516129, 0.177419355,
    0.209677419, 0.241935484, 0.274193548, 0.306451613, 0.338709677, 0.370967742,
    0.403225806, 0.435483871, 0.467741935, 0.5, 0.532258065, 0.564516129,
    0.596774194, 0.629032258, 0.661290323, 0.693548387, 0.725806452, 0.758064516,
    0.790322581, 0.822580645, 0.85483871, 0.887096774, 0.919354839, 0.951612903,
    0.983870968, 1.0,
];

/// Decision points between adjacent 6-bit values
#[allow(clippy::excessive_precision)]
static MIDPOINTS_6: [f32; 64] = [
    0.00793650794, 0.0238095238, 0.0396825397, 0.0555555556, 0.0714285714, 0.0873015873,
    0.103174603, 0.119047619, 0.134920635, 0.150793651, 0.166666667, 0.182539683,
    0.198412698, 0.214285714, 0.23015873, 0.246031746, 0.261904762, 0.277777778,
    0.293650794, 0.30952381, 0.325396825, 0.341269841, 0.357142857, 0.373015873,
    0.388888889, 0.404761905, 0.420634921, 0.436507937, 0.452380952, 0.468253968,
    0.484126984, 0.5, 0.515873016, 0.531746032, 0.547619048, 0.563492063,
    0.579365079, 0.595238095, 0.611111111, 0.626984127, 0.642857143, 0.658730159,
    0.674603175, 0.69047619, 0.706349206, 0.722222222, 0.738095238, 0.753968254,
    0.76984127, 0.785714286, 0.801587302, 0.817460317, 0.833333333, 0.849206349,
    0.865079365, 0.880952381, 0.896825397, 0.912698413, 0.928571429, 0.944444444,
    0.96031746, 0.976190476, 0.992063492, 1.0,
];

/// Nearest representable value through a midpoint table
#[inline]
fn quantize_midpoint(value: f32, table: &[f32]) -> u16 {
    let value = value.clamp(0.0, 1.0);
    table.partition_point(|&m| m < value) as u16
}

#[inline]
fn read_u16(bytes: &[u8]) -> u16 {
    u16::from_le_bytes([bytes[0], bytes[1]])
}

#[inline]
fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// R4G4B4A4 UNORM
pub struct R4G4B4A4Codec;

impl ChannelCodec for R4G4B4A4Codec {
    fn decode(&self, packed: &[u8], expanded: &mut [f32]) -> Result<()> {
        let pixels = pixel_count(self, packed.len(), expanded.len())?;
        for (src, dst) in packed.chunks_exact(2).zip(expanded.chunks_exact_mut(4)).take(pixels) {
            let v = read_u16(src);
            for (c, out) in dst.iter_mut().enumerate() {
                *out = ((v >> (c * 4)) & 0xF) as f32 / 15.0;
            }
        }
        Ok(())
    }

    fn encode(&self, expanded: &[f32], packed: &mut [u8]) -> Result<()> {
        let pixels = pixel_count(self, packed.len(), expanded.len())?;
        for (src, dst) in expanded.chunks_exact(4).zip(packed.chunks_exact_mut(2)).take(pixels) {
            let v = src
                .iter()
                .enumerate()
                .fold(0u16, |acc, (c, &x)| acc | (quantize(x, 15) as u16) << (c * 4));
            dst.copy_from_slice(&v.to_le_bytes());
        }
        Ok(())
    }

    fn channel_count(&self) -> usize {
        4
    }

    fn data_type(&self) -> DataType {
        DataType::R4G4B4A4
    }

    fn bytes_per_pixel(&self) -> usize {
        2
    }
}

/// R5G6B5 UNORM
pub struct R5G6B5Codec;

impl ChannelCodec for R5G6B5Codec {
    fn decode(&self, packed: &[u8], expanded: &mut [f32]) -> Result<()> {
        let pixels = pixel_count(self, packed.len(), expanded.len())?;
        for (src, dst) in packed.chunks_exact(2).zip(expanded.chunks_exact_mut(3)).take(pixels) {
            let v = read_u16(src);
            dst[0] = (v & 0x1F) as f32 / 31.0;
            dst[1] = ((v >> 5) & 0x3F) as f32 / 63.0;
            dst[2] = ((v >> 11) & 0x1F) as f32 / 31.0;
        }
        Ok(())
    }

    fn encode(&self, expanded: &[f32], packed: &mut [u8]) -> Result<()> {
        let pixels = pixel_count(self, packed.len(), expanded.len())?;
        for (src, dst) in expanded.chunks_exact(3).zip(packed.chunks_exact_mut(2)).take(pixels) {
            let r = quantize_midpoint(src[0], &MIDPOINTS_5);
            let g = quantize_midpoint(src[1], &MIDPOINTS_6);
            let b = quantize_midpoint(src[2], &MIDPOINTS_5);
            dst.copy_from_slice(&(r | g << 5 | b << 11).to_le_bytes());
        }
        Ok(())
    }

    fn channel_count(&self) -> usize {
        3
    }

    fn data_type(&self) -> DataType {
        DataType::R5G6B5
    }

    fn bytes_per_pixel(&self) -> usize {
        2
    }
}

/// R5G5B5A1 UNORM
pub struct R5G5B5A1Codec;

impl ChannelCodec for R5G5B5A1Codec {
    fn decode(&self, packed: &[u8], expanded: &mut [f32]) -> Result<()> {
        let pixels = pixel_count(self, packed.len(), expanded.len())?;
        for (src, dst) in packed.chunks_exact(2).zip(expanded.chunks_exact_mut(4)).take(pixels) {
            let v = read_u16(src);
            dst[0] = (v & 0x1F) as f32 / 31.0;
            dst[1] = ((v >> 5) & 0x1F) as f32 / 31.0;
            dst[2] = ((v >> 10) & 0x1F) as f32 / 31.0;
            dst[3] = (v >> 15) as f32;
        }
        Ok(())
    }

    fn encode(&self, expanded: &[f32], packed: &mut [u8]) -> Result<()> {
        let pixels = pixel_count(self, packed.len(), expanded.len())?;
        for (src, dst) in expanded.chunks_exact(4).zip(packed.chunks_exact_mut(2)).take(pixels) {
            let r = quantize_midpoint(src[0], &MIDPOINTS_5);
            let g = quantize_midpoint(src[1], &MIDPOINTS_5);
            let b = quantize_midpoint(src[2], &MIDPOINTS_5);
            let a = (src[3] >= 0.5) as u16;
            dst.copy_from_slice(&(r | g << 5 | b << 10 | a << 15).to_le_bytes());
        }
        Ok(())
    }

    fn channel_count(&self) -> usize {
        4
    }

    fn data_type(&self) -> DataType {
        DataType::R5G5B5A1
    }

    fn bytes_per_pixel(&self) -> usize {
        2
    }
}

/// R10G10B10A2, normalized or raw integer
pub struct R10G10B10A2Codec {
    pub normalized: bool,
}

impl R10G10B10A2Codec {
    fn scale(&self, bits: u32) -> f32 {
        if self.normalized {
            ((1u32 << bits) - 1) as f32
        } else {
            1.0
        }
    }
}

impl ChannelCodec for R10G10B10A2Codec {
    fn decode(&self, packed: &[u8], expanded: &mut [f32]) -> Result<()> {
        let pixels = pixel_count(self, packed.len(), expanded.len())?;
        let (s10, s2) = (self.scale(10), self.scale(2));
        for (src, dst) in packed.chunks_exact(4).zip(expanded.chunks_exact_mut(4)).take(pixels) {
            let v = read_u32(src);
            dst[0] = (v & 0x3FF) as f32 / s10;
            dst[1] = ((v >> 10) & 0x3FF) as f32 / s10;
            dst[2] = ((v >> 20) & 0x3FF) as f32 / s10;
            dst[3] = (v >> 30) as f32 / s2;
        }
        Ok(())
    }

    fn encode(&self, expanded: &[f32], packed: &mut [u8]) -> Result<()> {
        let pixels = pixel_count(self, packed.len(), expanded.len())?;
        let pack = |x: f32, bits: u32| -> u32 {
            let max = (1u32 << bits) - 1;
            if self.normalized {
                quantize(x, max)
            } else {
                (x.max(0.0) + 0.5).min(max as f32) as u32
            }
        };
        for (src, dst) in expanded.chunks_exact(4).zip(packed.chunks_exact_mut(4)).take(pixels) {
            let v = pack(src[0], 10) | pack(src[1], 10) << 10 | pack(src[2], 10) << 20 | pack(src[3], 2) << 30;
            dst.copy_from_slice(&v.to_le_bytes());
        }
        Ok(())
    }

    fn channel_count(&self) -> usize {
        4
    }

    fn data_type(&self) -> DataType {
        DataType::R10G10B10A2
    }

    fn bytes_per_pixel(&self) -> usize {
        4
    }
}

/// R11G11B10 unsigned float
///
/// Each channel is converted to half float and its bit pattern truncated:
/// red and green keep bits 4..15, blue keeps bits 5..15. Negative values
/// clamp to zero since the packed layout has no sign bits.
pub struct R11G11B10FCodec;

impl ChannelCodec for R11G11B10FCodec {
    fn decode(&self, packed: &[u8], expanded: &mut [f32]) -> Result<()> {
        let pixels = pixel_count(self, packed.len(), expanded.len())?;
        for (src, dst) in packed.chunks_exact(4).zip(expanded.chunks_exact_mut(3)).take(pixels) {
            let v = read_u32(src);
            dst[0] = f16::from_bits(((v & 0x7FF) << 4) as u16).to_f32();
            dst[1] = f16::from_bits((((v >> 11) & 0x7FF) << 4) as u16).to_f32();
            dst[2] = f16::from_bits((((v >> 22) & 0x3FF) << 5) as u16).to_f32();
        }
        Ok(())
    }

    fn encode(&self, expanded: &[f32], packed: &mut [u8]) -> Result<()> {
        let pixels = pixel_count(self, packed.len(), expanded.len())?;
        let half_bits = |x: f32| -> u32 { f16::from_f32(x.max(0.0)).to_bits() as u32 };
        for (src, dst) in expanded.chunks_exact(3).zip(packed.chunks_exact_mut(4)).take(pixels) {
            let r = (half_bits(src[0]) >> 4) & 0x7FF;
            let g = (half_bits(src[1]) >> 4) & 0x7FF;
            let b = (half_bits(src[2]) >> 5) & 0x3FF;
            dst.copy_from_slice(&(r | g << 11 | b << 22).to_le_bytes());
        }
        Ok(())
    }

    fn channel_count(&self) -> usize {
        3
    }

    fn data_type(&self) -> DataType {
        DataType::R11G11B10F
    }

    fn bytes_per_pixel(&self) -> usize {
        4
    }
}

/// Half float with 1, 2 or 4 channels
pub struct HalfCodec {
    pub channels: usize,
}

impl ChannelCodec for HalfCodec {
    fn decode(&self, packed: &[u8], expanded: &mut [f32]) -> Result<()> {
        let pixels = pixel_count(self, packed.len(), expanded.len())?;
        let count = pixels * self.channels;
        for (src, dst) in packed.chunks_exact(2).zip(expanded.iter_mut()).take(count) {
            *dst = f16::from_bits(read_u16(src)).to_f32();
        }
        Ok(())
    }

    fn encode(&self, expanded: &[f32], packed: &mut [u8]) -> Result<()> {
        let pixels = pixel_count(self, packed.len(), expanded.len())?;
        let count = pixels * self.channels;
        for (src, dst) in expanded.iter().zip(packed.chunks_exact_mut(2)).take(count) {
            dst.copy_from_slice(&f16::from_f32(*src).to_bits().to_le_bytes());
        }
        Ok(())
    }

    fn channel_count(&self) -> usize {
        self.channels
    }

    fn data_type(&self) -> DataType {
        DataType::Half
    }

    fn bytes_per_pixel(&self) -> usize {
        self.channels * 2
    }
}

static R4G4B4A4: R4G4B4A4Codec = R4G4B4A4Codec;
static R5G6B5: R5G6B5Codec = R5G6B5Codec;
static R5G5B5A1: R5G5B5A1Codec = R5G5B5A1Codec;
static R10G10B10A2_UNORM: R10G10B10A2Codec = R10G10B10A2Codec { normalized: true };
static R10G10B10A2_UINT: R10G10B10A2Codec = R10G10B10A2Codec { normalized: false };
static R11G11B10F: R11G11B10FCodec = R11G11B10FCodec;
static HALF_1: HalfCodec = HalfCodec { channels: 1 };
static HALF_2: HalfCodec = HalfCodec { channels: 2 };
static HALF_4: HalfCodec = HalfCodec { channels: 4 };

/// Get the channel codec of a packed or half float format
///
/// Returns `None` for formats stored as plain integers or 32-bit floats.
pub fn codec_for_format(format: TextureFormat) -> Option<&'static dyn ChannelCodec> {
    match format {
        TextureFormat::R4G4B4A4_UNORM => Some(&R4G4B4A4),
        TextureFormat::R5G6B5_UNORM => Some(&R5G6B5),
        TextureFormat::R5G5B5A1_UNORM => Some(&R5G5B5A1),
        TextureFormat::R10G10B10A2_UNORM => Some(&R10G10B10A2_UNORM),
        TextureFormat::R10G10B10A2_UINT => Some(&R10G10B10A2_UINT),
        TextureFormat::R11G11B10_FLOAT => Some(&R11G11B10F),
        TextureFormat::R16_FLOAT => Some(&HALF_1),
        TextureFormat::RG16_FLOAT => Some(&HALF_2),
        TextureFormat::RGBA16_FLOAT => Some(&HALF_4),
        _ => None,
    }
}
