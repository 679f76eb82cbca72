//! Texture import pipeline
//!
//! Turns a decoded [`RawImage`] into a GPU ready [`ImageStorage`]: picks the
//! stored format and block compression, fixes up channels, generates the mip
//! chain and compresses it.

mod color_grading;
mod normal_map;
mod roughness;

pub use color_grading::{
    COLOR_GRADING_LUT_SIZE, ColorGradingSettings, apply_color_grading, create_color_grading_lut,
    create_color_grading_lut_from_image, create_luminance_color_grading_lut,
};
pub use normal_map::{NormalMapPacking, create_normal_map, pack_normal, unpack_normal};
pub use roughness::create_roughness_map;

use bitflags::bitflags;
use half::f16;
use hork_texture_codec::{
    BC1_DEFAULT_QUALITY, BC6H_DEFAULT_WORKERS, BC7_DEFAULT_UBER_LEVEL, Bc1Flags, Bc6hSettings, BlockCompression,
};
use hork_texture_core::{Result, TextureError, TextureFormat};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::mipmap::{ImageMipmapConfig, resample_params};
use crate::raw_image::{RawImage, RawImageFormat};
use crate::resample::resample;
use crate::storage::{ImageRegion, ImageStorage, ImageStorageDesc, ImageStorageFlags};
use crate::texels;

bitflags! {
    /// Import pipeline switches
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct ImageImportFlags: u32 {
        /// Block compress 8-bit sources
        const USE_COMPRESSION = 1 << 0;
        /// Also compress float sources, with BC6H
        const ALLOW_HDRI_COMPRESSION = 1 << 1;
        /// Store uncompressed float sources as half floats
        const STORE_HDRI_AS_HALF_FLOAT = 1 << 2;
        /// Tag 8-bit color sources as sRGB
        const ASSUME_8BIT_RGB_IMAGES_ARE_SRGB = 1 << 3;
    }
}

/// Encoder settings used when the pipeline compresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportOptions {
    pub bc1_quality: u32,
    pub bc7_uber_level: u32,
    /// Max quality path for BC3 alpha, BC4 and BC5
    pub high_quality: bool,
    pub bc6h_workers: usize,
    /// Use BC7 instead of BC1/BC3 for 8-bit color
    pub prefer_bc7: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            bc1_quality: BC1_DEFAULT_QUALITY,
            bc7_uber_level: BC7_DEFAULT_UBER_LEVEL,
            high_quality: true,
            bc6h_workers: BC6H_DEFAULT_WORKERS,
            prefer_bc7: false,
        }
    }
}

impl ImportOptions {
    fn color_compression(&self, has_alpha: bool) -> BlockCompression {
        if self.prefer_bc7 {
            BlockCompression::Bc7 {
                uber_level: self.bc7_uber_level,
            }
        } else if has_alpha {
            BlockCompression::Bc3 {
                quality: self.bc1_quality,
                high_quality_alpha: self.high_quality,
            }
        } else {
            BlockCompression::Bc1 {
                quality: self.bc1_quality,
                flags: Bc1Flags::empty(),
            }
        }
    }
}

fn floats_to_bytes(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn floats_to_halves(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|&v| f16::from_f32(v).to_le_bytes()).collect()
}

/// Build a 2D texture from a decoded image
///
/// `mipmap_config` requests a full mip chain generated with those settings.
pub fn create_image(
    raw: &RawImage,
    mipmap_config: Option<&ImageMipmapConfig>,
    storage_flags: ImageStorageFlags,
    import_flags: ImageImportFlags,
    options: &ImportOptions,
) -> Result<ImageStorage> {
    use RawImageFormat::*;

    let compress = import_flags.contains(ImageImportFlags::USE_COMPRESSION);
    let srgb = import_flags.contains(ImageImportFlags::ASSUME_8BIT_RGB_IMAGES_ARE_SRGB);
    let color = |format: TextureFormat| if srgb { format.to_srgb() } else { format };
    let (width, height) = (raw.width(), raw.height());
    let mut flags = storage_flags;

    let (pixels, format, compression) = match raw.format() {
        R8 => {
            flags |= ImageStorageFlags::NO_ALPHA;
            let compression = BlockCompression::Bc4 {
                high_quality: options.high_quality,
            };
            (raw.data().to_vec(), TextureFormat::R8_UNORM, compress.then_some(compression))
        }
        R8_ALPHA => {
            let compression = BlockCompression::Bc5 {
                high_quality: options.high_quality,
            };
            (raw.data().to_vec(), TextureFormat::RG8_UNORM, compress.then_some(compression))
        }
        RGB8 | BGR8 => {
            flags |= ImageStorageFlags::NO_ALPHA;
            let rgba = raw.convert(RGBA8).into_data();
            let compression = options.color_compression(false);
            (rgba, color(TextureFormat::RGBA8_UNORM), compress.then_some(compression))
        }
        RGBA8 | BGRA8 => {
            let rgba = if raw.format() == BGRA8 { raw.convert(RGBA8).into_data() } else { raw.data().to_vec() };
            let compression = options.color_compression(true);
            (rgba, color(TextureFormat::RGBA8_UNORM), compress.then_some(compression))
        }
        _ => return create_hdr_image(raw, mipmap_config, flags, import_flags, options),
    };

    debug!(
        "importing {}x{} {:?} as {}{}",
        width,
        height,
        raw.format(),
        format,
        compression.map(|c| format!(" -> {}", c.format(format.is_srgb()))).unwrap_or_default()
    );
    build_storage(pixels, format, width, height, flags, compression, mipmap_config)
}

fn create_hdr_image(
    raw: &RawImage,
    mipmap_config: Option<&ImageMipmapConfig>,
    mut flags: ImageStorageFlags,
    import_flags: ImageImportFlags,
    options: &ImportOptions,
) -> Result<ImageStorage> {
    use RawImageFormat::*;

    let half = import_flags.contains(ImageImportFlags::STORE_HDRI_AS_HALF_FLOAT);
    let bc6h = import_flags.contains(ImageImportFlags::USE_COMPRESSION | ImageImportFlags::ALLOW_HDRI_COMPRESSION);
    let (width, height) = (raw.width(), raw.height());

    if bc6h {
        if half {
            return Err(TextureError::unsupported(
                "half float storage cannot be combined with BC6H compression",
            ));
        }
        if raw.format().has_alpha() {
            warn!("BC6H has no alpha channel, dropping alpha of {:?} source", raw.format());
        }
        flags |= ImageStorageFlags::NO_ALPHA;
        let mut values = raw.convert(RGBA32_FLOAT).to_floats();
        for pixel in values.chunks_exact_mut(4) {
            pixel[3] = 1.0;
        }
        let settings = Bc6hSettings {
            signed: values.iter().any(|&v| v < 0.0),
            workers: options.bc6h_workers,
        };
        debug!("importing {}x{} {:?} as {}", width, height, raw.format(), BlockCompression::Bc6h(settings).format(false));
        let pixels = floats_to_bytes(&values);
        return build_storage(
            pixels,
            TextureFormat::RGBA32_FLOAT,
            width,
            height,
            flags,
            Some(BlockCompression::Bc6h(settings)),
            mipmap_config,
        );
    }

    let (target, format) = match (raw.format(), half) {
        (R32_FLOAT, false) => (R32_FLOAT, TextureFormat::R32_FLOAT),
        (R32_FLOAT, true) => (R32_FLOAT, TextureFormat::R16_FLOAT),
        (R32_ALPHA_FLOAT, false) => (R32_ALPHA_FLOAT, TextureFormat::RG32_FLOAT),
        (R32_ALPHA_FLOAT, true) => (R32_ALPHA_FLOAT, TextureFormat::RG16_FLOAT),
        (RGB32_FLOAT | BGR32_FLOAT, false) => (RGB32_FLOAT, TextureFormat::RGB32_FLOAT),
        (RGB32_FLOAT | BGR32_FLOAT, true) => {
            // No three channel half format: synthesize opaque alpha
            flags |= ImageStorageFlags::NO_ALPHA;
            (RGBA32_FLOAT, TextureFormat::RGBA16_FLOAT)
        }
        (_, false) => (RGBA32_FLOAT, TextureFormat::RGBA32_FLOAT),
        (_, true) => (RGBA32_FLOAT, TextureFormat::RGBA16_FLOAT),
    };
    if matches!(target, R32_FLOAT | RGB32_FLOAT) {
        flags |= ImageStorageFlags::NO_ALPHA;
    }

    let values = raw.convert(target).to_floats();
    let pixels = if half { floats_to_halves(&values) } else { floats_to_bytes(&values) };
    debug!("importing {}x{} {:?} as {}", width, height, raw.format(), format);
    build_storage(pixels, format, width, height, flags, None, mipmap_config)
}

/// Dimension a compressed texture can be stored at
///
/// Mipmapped textures snap to the nearest power of two, others to the
/// nearest multiple of the block size.
fn compatible_dimension(size: u32, mipmapped: bool) -> u32 {
    if mipmapped {
        let upper = size.next_power_of_two();
        let lower = upper >> 1;
        let nearest = if size - lower < upper - size { lower } else { upper };
        nearest.max(4)
    } else {
        (size.saturating_add(2) / 4 * 4).max(4)
    }
}

fn is_compatible(size: u32, mipmapped: bool) -> bool {
    size % 4 == 0 && (!mipmapped || size.is_power_of_two())
}

/// Store level 0, generate the mip chain and compress
///
/// `pixels` holds `width` x `height` texels of `format`. When compression is
/// requested at a size the block format cannot take, level 0 is resampled
/// to the nearest size it can.
pub(crate) fn build_storage(
    pixels: Vec<u8>,
    format: TextureFormat,
    width: u32,
    height: u32,
    flags: ImageStorageFlags,
    compression: Option<BlockCompression>,
    mipmap_config: Option<&ImageMipmapConfig>,
) -> Result<ImageStorage> {
    let mipmapped = mipmap_config.is_some();
    let config = mipmap_config.copied().unwrap_or_default();

    let (mut width, mut height, mut pixels) = (width, height, pixels);
    if compression.is_some() && !(is_compatible(width, mipmapped) && is_compatible(height, mipmapped)) {
        let target_width = compatible_dimension(width, mipmapped);
        let target_height = compatible_dimension(height, mipmapped);
        debug!(
            "resizing {}x{} to {}x{} for block compression",
            width, height, target_width, target_height
        );

        let params = resample_params(format, flags, &config);
        let values = texels::decode(format, &pixels)?;
        let resized = resample(&values, width, height, target_width, target_height, &params)?;
        pixels = vec![0; format.calculate_data_size(target_width, target_height)?];
        texels::encode(format, &resized, &mut pixels)?;
        width = target_width;
        height = target_height;
    }

    let mut desc = ImageStorageDesc {
        flags,
        ..ImageStorageDesc::new_2d(width, height, format)
    };
    if mipmapped {
        desc = desc.with_mipmaps();
    }

    let mut storage = ImageStorage::new(desc)?;
    storage.write_subresource(0, 0, ImageRegion::new(0, 0, width, height), &pixels)?;
    if mipmapped {
        storage.generate_mipmaps(0, &config)?;
    }

    match compression {
        Some(compression) => storage.compress(&compression, None),
        None => Ok(storage),
    }
}
