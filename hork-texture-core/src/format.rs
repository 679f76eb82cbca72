//! GPU pixel format registry
//!
//! Every texture format the storage layer understands is listed in a single
//! static table, indexed by the format id. Ids are stable: they are written
//! into serialized image storage as a single byte.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, TextureError};

/// GPU texture formats
///
/// Values are the persistent format ids. Unknown ids map to `Undefined`.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum TextureFormat {
    #[default]
    Undefined = 0,

    // 8/16/32 bit single channel
    R8_UINT,
    R8_SINT,
    R8_UNORM,
    R8_SNORM,
    R16_UINT,
    R16_SINT,
    R16_UNORM,
    R16_SNORM,
    R16_FLOAT,
    R32_UINT,
    R32_SINT,
    R32_FLOAT,

    // Two channels
    RG8_UINT,
    RG8_SINT,
    RG8_UNORM,
    RG8_SNORM,
    RG16_UINT,
    RG16_SINT,
    RG16_UNORM,
    RG16_SNORM,
    RG16_FLOAT,
    RG32_UINT,
    RG32_SINT,
    RG32_FLOAT,

    // Three channels
    RGB32_UINT,
    RGB32_SINT,
    RGB32_FLOAT,

    // Four channels
    RGBA8_UINT,
    RGBA8_SINT,
    RGBA8_UNORM,
    RGBA8_SNORM,
    RGBA8_UNORM_SRGB,
    BGRA8_UNORM,
    BGRA8_UNORM_SRGB,
    RGBA16_UINT,
    RGBA16_SINT,
    RGBA16_UNORM,
    RGBA16_SNORM,
    RGBA16_FLOAT,
    RGBA32_UINT,
    RGBA32_SINT,
    RGBA32_FLOAT,

    // Packed
    R4G4B4A4_UNORM,
    R5G6B5_UNORM,
    R5G5B5A1_UNORM,
    R10G10B10A2_UINT,
    R10G10B10A2_UNORM,
    R11G11B10_FLOAT,

    // Depth/stencil
    D16,
    D24S8,
    D32,
    D32S8,

    // Block compressed
    BC1_UNORM,
    BC1_UNORM_SRGB,
    BC2_UNORM,
    BC2_UNORM_SRGB,
    BC3_UNORM,
    BC3_UNORM_SRGB,
    BC4_UNORM,
    BC4_SNORM,
    BC5_UNORM,
    BC5_SNORM,
    BC6H_UFLOAT,
    BC6H_SFLOAT,
    BC7_UNORM,
    BC7_UNORM_SRGB,
}

/// How shaders interpret the stored values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormatKind {
    Integer,
    Normalized,
    Float,
    DepthStencil,
}

/// Storage type of a single element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Uint8,
    Uint16,
    Uint32,
    Half,
    Float,
    R4G4B4A4,
    R5G6B5,
    R5G5B5A1,
    R10G10B10A2,
    R11G11B10F,
    /// 4x4 block compressed payload
    Compressed,
}

/// Static description of a texture format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureFormatInfo {
    pub format: TextureFormat,
    pub name: &'static str,
    /// Bytes per texel for linear formats, per 4x4 block for compressed ones
    pub bytes_per_block: u32,
    /// 1 for linear formats, 4 for all BCn formats
    pub block_size: u32,
    pub kind: FormatKind,
    pub data_type: DataType,
    pub has_red: bool,
    pub has_green: bool,
    pub has_blue: bool,
    pub has_alpha: bool,
    pub has_depth: bool,
    pub has_stencil: bool,
    pub signed: bool,
    pub srgb: bool,
}

impl TextureFormatInfo {
    /// Number of color channels (depth/stencil excluded)
    pub fn channel_count(&self) -> u32 {
        self.has_red as u32 + self.has_green as u32 + self.has_blue as u32 + self.has_alpha as u32
    }

    /// Check if the format is block compressed
    pub fn is_compressed(&self) -> bool {
        self.block_size > 1
    }
}

// Channel masks for the table below
const R: u8 = 0b0000_0001;
const RG: u8 = 0b0000_0011;
const RGB: u8 = 0b0000_0111;
const RGBA: u8 = 0b0000_1111;
const DEPTH: u8 = 0b0001_0000;
const DEPTH_STENCIL: u8 = 0b0011_0000;
const NONE: u8 = 0;

const fn info(
    format: TextureFormat,
    name: &'static str,
    bytes_per_block: u32,
    block_size: u32,
    kind: FormatKind,
    data_type: DataType,
    channels: u8,
    signed: bool,
    srgb: bool,
) -> TextureFormatInfo {
    TextureFormatInfo {
        format,
        name,
        bytes_per_block,
        block_size,
        kind,
        data_type,
        has_red: channels & 0b0000_0001 != 0,
        has_green: channels & 0b0000_0010 != 0,
        has_blue: channels & 0b0000_0100 != 0,
        has_alpha: channels & 0b0000_1000 != 0,
        has_depth: channels & 0b0001_0000 != 0,
        has_stencil: channels & 0b0010_0000 != 0,
        signed,
        srgb,
    }
}

use DataType as D;
use FormatKind as K;
use TextureFormat as F;

/// Format table, indexed by format id
static FORMAT_TABLE: [TextureFormatInfo; TextureFormat::COUNT] = [
    info(F::Undefined, "UNDEFINED", 0, 1, K::Normalized, D::Uint8, NONE, false, false),
    info(F::R8_UINT, "R8_UINT", 1, 1, K::Integer, D::Uint8, R, false, false),
    info(F::R8_SINT, "R8_SINT", 1, 1, K::Integer, D::Uint8, R, true, false),
    info(F::R8_UNORM, "R8_UNORM", 1, 1, K::Normalized, D::Uint8, R, false, false),
    info(F::R8_SNORM, "R8_SNORM", 1, 1, K::Normalized, D::Uint8, R, true, false),
    info(F::R16_UINT, "R16_UINT", 2, 1, K::Integer, D::Uint16, R, false, false),
    info(F::R16_SINT, "R16_SINT", 2, 1, K::Integer, D::Uint16, R, true, false),
    info(F::R16_UNORM, "R16_UNORM", 2, 1, K::Normalized, D::Uint16, R, false, false),
    info(F::R16_SNORM, "R16_SNORM", 2, 1, K::Normalized, D::Uint16, R, true, false),
    info(F::R16_FLOAT, "R16_FLOAT", 2, 1, K::Float, D::Half, R, true, false),
    info(F::R32_UINT, "R32_UINT", 4, 1, K::Integer, D::Uint32, R, false, false),
    info(F::R32_SINT, "R32_SINT", 4, 1, K::Integer, D::Uint32, R, true, false),
    info(F::R32_FLOAT, "R32_FLOAT", 4, 1, K::Float, D::Float, R, true, false),
    info(F::RG8_UINT, "RG8_UINT", 2, 1, K::Integer, D::Uint8, RG, false, false),
    info(F::RG8_SINT, "RG8_SINT", 2, 1, K::Integer, D::Uint8, RG, true, false),
    info(F::RG8_UNORM, "RG8_UNORM", 2, 1, K::Normalized, D::Uint8, RG, false, false),
    info(F::RG8_SNORM, "RG8_SNORM", 2, 1, K::Normalized, D::Uint8, RG, true, false),
    info(F::RG16_UINT, "RG16_UINT", 4, 1, K::Integer, D::Uint16, RG, false, false),
    info(F::RG16_SINT, "RG16_SINT", 4, 1, K::Integer, D::Uint16, RG, true, false),
    info(F::RG16_UNORM, "RG16_UNORM", 4, 1, K::Normalized, D::Uint16, RG, false, false),
    info(F::RG16_SNORM, "RG16_SNORM", 4, 1, K::Normalized, D::Uint16, RG, true, false),
    info(F::RG16_FLOAT, "RG16_FLOAT", 4, 1, K::Float, D::Half, RG, true, false),
    info(F::RG32_UINT, "RG32_UINT", 8, 1, K::Integer, D::Uint32, RG, false, false),
    info(F::RG32_SINT, "RG32_SINT", 8, 1, K::Integer, D::Uint32, RG, true, false),
    info(F::RG32_FLOAT, "RG32_FLOAT", 8, 1, K::Float, D::Float, RG, true, false),
    info(F::RGB32_UINT, "RGB32_UINT", 12, 1, K::Integer, D::Uint32, RGB, false, false),
    info(F::RGB32_SINT, "RGB32_SINT", 12, 1, K::Integer, D::Uint32, RGB, true, false),
    info(F::RGB32_FLOAT, "RGB32_FLOAT", 12, 1, K::Float, D::Float, RGB, true, false),
    info(F::RGBA8_UINT, "RGBA8_UINT", 4, 1, K::Integer, D::Uint8, RGBA, false, false),
    info(F::RGBA8_SINT, "RGBA8_SINT", 4, 1, K::Integer, D::Uint8, RGBA, true, false),
    info(F::RGBA8_UNORM, "RGBA8_UNORM", 4, 1, K::Normalized, D::Uint8, RGBA, false, false),
    info(F::RGBA8_SNORM, "RGBA8_SNORM", 4, 1, K::Normalized, D::Uint8, RGBA, true, false),
    info(F::RGBA8_UNORM_SRGB, "RGBA8_UNORM_SRGB", 4, 1, K::Normalized, D::Uint8, RGBA, false, true),
    info(F::BGRA8_UNORM, "BGRA8_UNORM", 4, 1, K::Normalized, D::Uint8, RGBA, false, false),
    info(F::BGRA8_UNORM_SRGB, "BGRA8_UNORM_SRGB", 4, 1, K::Normalized, D::Uint8, RGBA, false, true),
    info(F::RGBA16_UINT, "RGBA16_UINT", 8, 1, K::Integer, D::Uint16, RGBA, false, false),
    info(F::RGBA16_SINT, "RGBA16_SINT", 8, 1, K::Integer, D::Uint16, RGBA, true, false),
    info(F::RGBA16_UNORM, "RGBA16_UNORM", 8, 1, K::Normalized, D::Uint16, RGBA, false, false),
    info(F::RGBA16_SNORM, "RGBA16_SNORM", 8, 1, K::Normalized, D::Uint16, RGBA, true, false),
    info(F::RGBA16_FLOAT, "RGBA16_FLOAT", 8, 1, K::Float, D::Half, RGBA, true, false),
    info(F::RGBA32_UINT, "RGBA32_UINT", 16, 1, K::Integer, D::Uint32, RGBA, false, false),
    info(F::RGBA32_SINT, "RGBA32_SINT", 16, 1, K::Integer, D::Uint32, RGBA, true, false),
    info(F::RGBA32_FLOAT, "RGBA32_FLOAT", 16, 1, K::Float, D::Float, RGBA, true, false),
    info(F::R4G4B4A4_UNORM, "R4G4B4A4_UNORM", 2, 1, K::Normalized, D::R4G4B4A4, RGBA, false, false),
    info(F::R5G6B5_UNORM, "R5G6B5_UNORM", 2, 1, K::Normalized, D::R5G6B5, RGB, false, false),
    info(F::R5G5B5A1_UNORM, "R5G5B5A1_UNORM", 2, 1, K::Normalized, D::R5G5B5A1, RGBA, false, false),
    info(F::R10G10B10A2_UINT, "R10G10B10A2_UINT", 4, 1, K::Integer, D::R10G10B10A2, RGBA, false, false),
    info(F::R10G10B10A2_UNORM, "R10G10B10A2_UNORM", 4, 1, K::Normalized, D::R10G10B10A2, RGBA, false, false),
    info(F::R11G11B10_FLOAT, "R11G11B10_FLOAT", 4, 1, K::Float, D::R11G11B10F, RGB, false, false),
    info(F::D16, "D16", 2, 1, K::DepthStencil, D::Uint16, DEPTH, false, false),
    info(F::D24S8, "D24S8", 4, 1, K::DepthStencil, D::Uint32, DEPTH_STENCIL, false, false),
    info(F::D32, "D32", 4, 1, K::DepthStencil, D::Float, DEPTH, false, false),
    info(F::D32S8, "D32S8", 8, 1, K::DepthStencil, D::Float, DEPTH_STENCIL, false, false),
    info(F::BC1_UNORM, "BC1_UNORM", 8, 4, K::Normalized, D::Compressed, RGBA, false, false),
    info(F::BC1_UNORM_SRGB, "BC1_UNORM_SRGB", 8, 4, K::Normalized, D::Compressed, RGBA, false, true),
    info(F::BC2_UNORM, "BC2_UNORM", 16, 4, K::Normalized, D::Compressed, RGBA, false, false),
    info(F::BC2_UNORM_SRGB, "BC2_UNORM_SRGB", 16, 4, K::Normalized, D::Compressed, RGBA, false, true),
    info(F::BC3_UNORM, "BC3_UNORM", 16, 4, K::Normalized, D::Compressed, RGBA, false, false),
    info(F::BC3_UNORM_SRGB, "BC3_UNORM_SRGB", 16, 4, K::Normalized, D::Compressed, RGBA, false, true),
    info(F::BC4_UNORM, "BC4_UNORM", 8, 4, K::Normalized, D::Compressed, R, false, false),
    info(F::BC4_SNORM, "BC4_SNORM", 8, 4, K::Normalized, D::Compressed, R, true, false),
    info(F::BC5_UNORM, "BC5_UNORM", 16, 4, K::Normalized, D::Compressed, RG, false, false),
    info(F::BC5_SNORM, "BC5_SNORM", 16, 4, K::Normalized, D::Compressed, RG, true, false),
    info(F::BC6H_UFLOAT, "BC6H_UFLOAT", 16, 4, K::Float, D::Compressed, RGB, false, false),
    info(F::BC6H_SFLOAT, "BC6H_SFLOAT", 16, 4, K::Float, D::Compressed, RGB, true, false),
    info(F::BC7_UNORM, "BC7_UNORM", 16, 4, K::Normalized, D::Compressed, RGBA, false, false),
    info(F::BC7_UNORM_SRGB, "BC7_UNORM_SRGB", 16, 4, K::Normalized, D::Compressed, RGBA, false, true),
];

impl TextureFormat {
    /// Number of formats in the registry, `Undefined` included
    pub const COUNT: usize = TextureFormat::BC7_UNORM_SRGB as usize + 1;

    /// Get the static format description
    pub fn info(&self) -> &'static TextureFormatInfo {
        &FORMAT_TABLE[*self as usize]
    }

    /// Persistent format id
    pub fn id(&self) -> u8 {
        *self as u8
    }

    /// Human readable name
    pub fn name(&self) -> &'static str {
        self.info().name
    }

    /// Find a format by name, ignoring case
    ///
    /// Unknown names are logged and resolve to `Undefined`.
    pub fn find_by_name(name: &str) -> TextureFormat {
        match FORMAT_TABLE
            .iter()
            .find(|info| info.name.eq_ignore_ascii_case(name))
        {
            Some(info) => info.format,
            None => {
                warn!("TextureFormat::find_by_name: unknown format '{}'", name);
                TextureFormat::Undefined
            }
        }
    }

    /// Iterate every defined format
    pub fn all() -> impl Iterator<Item = TextureFormat> {
        FORMAT_TABLE.iter().skip(1).map(|info| info.format)
    }

    /// Check if format is block compressed
    pub fn is_compressed(&self) -> bool {
        self.info().is_compressed()
    }

    /// Check if format stores gamma encoded color
    pub fn is_srgb(&self) -> bool {
        self.info().srgb
    }

    /// Block edge length in texels
    pub fn block_size(&self) -> u32 {
        self.info().block_size
    }

    /// Bytes per texel, or per block for compressed formats
    pub fn bytes_per_block(&self) -> u32 {
        self.info().bytes_per_block
    }

    /// Number of color channels
    pub fn channel_count(&self) -> u32 {
        self.info().channel_count()
    }

    /// Check if format is one of the depth/stencil formats
    pub fn is_depth_stencil(&self) -> bool {
        self.info().kind == FormatKind::DepthStencil
    }

    /// The sRGB variant of the format, or the format itself if there is none
    pub fn to_srgb(&self) -> TextureFormat {
        match self {
            TextureFormat::RGBA8_UNORM => TextureFormat::RGBA8_UNORM_SRGB,
            TextureFormat::BGRA8_UNORM => TextureFormat::BGRA8_UNORM_SRGB,
            TextureFormat::BC1_UNORM => TextureFormat::BC1_UNORM_SRGB,
            TextureFormat::BC2_UNORM => TextureFormat::BC2_UNORM_SRGB,
            TextureFormat::BC3_UNORM => TextureFormat::BC3_UNORM_SRGB,
            TextureFormat::BC7_UNORM => TextureFormat::BC7_UNORM_SRGB,
            other => *other,
        }
    }

    /// The linear variant of an sRGB format, or the format itself
    pub fn to_linear(&self) -> TextureFormat {
        match self {
            TextureFormat::RGBA8_UNORM_SRGB => TextureFormat::RGBA8_UNORM,
            TextureFormat::BGRA8_UNORM_SRGB => TextureFormat::BGRA8_UNORM,
            TextureFormat::BC1_UNORM_SRGB => TextureFormat::BC1_UNORM,
            TextureFormat::BC2_UNORM_SRGB => TextureFormat::BC2_UNORM,
            TextureFormat::BC3_UNORM_SRGB => TextureFormat::BC3_UNORM,
            TextureFormat::BC7_UNORM_SRGB => TextureFormat::BC7_UNORM,
            other => *other,
        }
    }

    /// Get data size of a single `width` x `height` image in this format
    ///
    /// Compressed sizes round each dimension up to a whole block. Sizes that
    /// do not fit `usize` are reported as [`TextureError::InvalidData`].
    pub fn calculate_data_size(&self, width: u32, height: u32) -> Result<usize> {
        let info = self.info();
        let (columns, rows) = if info.is_compressed() {
            (width.div_ceil(info.block_size), height.div_ceil(info.block_size))
        } else {
            (width, height)
        };
        (columns as usize)
            .checked_mul(rows as usize)
            .and_then(|blocks| blocks.checked_mul(info.bytes_per_block as usize))
            .ok_or_else(|| {
                TextureError::invalid_data(format!("{}x{} {} does not fit in memory", width, height, self.name()))
            })
    }
}

impl From<u8> for TextureFormat {
    fn from(value: u8) -> Self {
        FORMAT_TABLE
            .get(value as usize)
            .map(|info| info.format)
            .unwrap_or(TextureFormat::Undefined)
    }
}

impl std::fmt::Display for TextureFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Describe a format
pub fn describe(format: TextureFormat) -> &'static TextureFormatInfo {
    format.info()
}

/// Describe a format by raw id; out of range ids describe `Undefined`
pub fn describe_id(id: u8) -> &'static TextureFormatInfo {
    FORMAT_TABLE.get(id as usize).unwrap_or(&FORMAT_TABLE[0])
}

/// Number of mip levels of a full chain
///
/// `floor(log2(max(w, h, d) / block_size)) + 1`; compressed chains stop at a
/// single block.
pub fn calc_num_mips(format: TextureFormat, width: u32, height: u32, depth: u32) -> u32 {
    let size = width.max(height).max(depth) / format.block_size();
    if size == 0 {
        return 1;
    }
    32 - size.leading_zeros()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_indexed_by_id() {
        for (id, info) in FORMAT_TABLE.iter().enumerate() {
            assert_eq!(info.format as usize, id, "{} is out of place", info.name);
            assert_eq!(TextureFormat::from(id as u8), info.format);
        }
    }

    #[test]
    fn test_unknown_id_is_undefined() {
        assert_eq!(TextureFormat::from(200), TextureFormat::Undefined);
        assert_eq!(describe_id(255).format, TextureFormat::Undefined);
    }

    #[test]
    fn test_find_by_name() {
        assert_eq!(TextureFormat::find_by_name("bc3_unorm"), TextureFormat::BC3_UNORM);
        assert_eq!(
            TextureFormat::find_by_name("RGBA8_UNORM_SRGB"),
            TextureFormat::RGBA8_UNORM_SRGB
        );
        assert_eq!(TextureFormat::find_by_name("ASTC_4x4"), TextureFormat::Undefined);
    }

    #[test]
    fn test_format_info() {
        let info = TextureFormat::BC1_UNORM.info();
        assert_eq!(info.bytes_per_block, 8);
        assert_eq!(info.block_size, 4);
        assert!(info.is_compressed());

        let info = TextureFormat::R5G6B5_UNORM.info();
        assert_eq!(info.data_type, DataType::R5G6B5);
        assert_eq!(info.channel_count(), 3);
        assert!(!info.has_alpha);

        assert!(TextureFormat::D24S8.is_depth_stencil());
        assert!(TextureFormat::BC6H_SFLOAT.info().signed);
    }

    #[test]
    fn test_srgb_mapping() {
        assert_eq!(TextureFormat::BC3_UNORM.to_srgb(), TextureFormat::BC3_UNORM_SRGB);
        assert_eq!(TextureFormat::BC3_UNORM_SRGB.to_linear(), TextureFormat::BC3_UNORM);
        assert_eq!(TextureFormat::BC4_UNORM.to_srgb(), TextureFormat::BC4_UNORM);
        for format in TextureFormat::all() {
            assert!(!format.to_linear().is_srgb());
        }
    }

    #[test]
    fn test_calc_num_mips() {
        assert_eq!(calc_num_mips(TextureFormat::RGBA8_UNORM, 256, 256, 1), 9);
        assert_eq!(calc_num_mips(TextureFormat::RGBA8_UNORM, 256, 1, 1), 9);
        assert_eq!(calc_num_mips(TextureFormat::RGBA8_UNORM, 300, 200, 1), 9);
        assert_eq!(calc_num_mips(TextureFormat::RGBA8_UNORM, 1, 1, 1), 1);
        assert_eq!(calc_num_mips(TextureFormat::RGBA8_UNORM, 16, 16, 64), 7);
        assert_eq!(calc_num_mips(TextureFormat::BC3_UNORM, 256, 256, 1), 7);
        assert_eq!(calc_num_mips(TextureFormat::BC1_UNORM, 4, 4, 1), 1);
    }

    #[test]
    fn test_data_size() {
        assert_eq!(TextureFormat::RGBA8_UNORM.calculate_data_size(4, 4).unwrap(), 64);
        assert_eq!(TextureFormat::BC1_UNORM.calculate_data_size(8, 8).unwrap(), 32);
        assert_eq!(TextureFormat::BC7_UNORM.calculate_data_size(5, 5).unwrap(), 64);

        let err = TextureFormat::RGBA32_FLOAT.calculate_data_size(u32::MAX, u32::MAX).unwrap_err();
        assert!(matches!(err, TextureError::InvalidData(_)));
    }
}
