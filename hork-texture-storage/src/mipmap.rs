//! Mip chain generation

use hork_texture_core::{FormatKind, Result, TextureError, TextureFormat};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::resample::{EdgeMode, ResampleFilter, ResampleParams, resample};
use crate::storage::{ImageStorage, ImageStorageFlags, TextureType};
use crate::texels;

/// Filtering used to build each mip level from the one above it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ImageMipmapConfig {
    pub edge_mode: EdgeMode,
    pub filter: ResampleFilter,
}

/// Resampler settings for texels of `format` stored with `flags`
pub(crate) fn resample_params(format: TextureFormat, flags: ImageStorageFlags, config: &ImageMipmapConfig) -> ResampleParams {
    let info = format.info();
    let channels = info.channel_count() as usize;
    ResampleParams {
        channels,
        alpha_channel: (info.has_alpha && !flags.contains(ImageStorageFlags::NO_ALPHA)).then(|| channels - 1),
        srgb: info.srgb,
        premultiplied: flags.contains(ImageStorageFlags::ALPHA_PREMULTIPLIED),
        filter: config.filter,
        edge_mode: config.edge_mode,
    }
}

impl ImageStorage {
    /// Rebuild every mip level of `slice_index` below the base level
    pub fn generate_mipmaps(&mut self, slice_index: u32, config: &ImageMipmapConfig) -> Result<()> {
        self.generate_mip_levels(slice_index, 1, config)
    }

    /// Rebuild mip levels `first_mip..` of one slice, chaining from `first_mip - 1`
    pub(crate) fn generate_mip_levels(&mut self, slice_index: u32, first_mip: u32, config: &ImageMipmapConfig) -> Result<()> {
        let desc = *self.desc();
        let reject = |what: &str| {
            error!("mipmap generation is not supported for {}", what);
            Err(TextureError::unsupported(format!("mipmap generation for {}", what)))
        };
        if desc.texture_type == TextureType::Tex3D {
            return reject("3D textures");
        }
        if desc.format.is_compressed() {
            return reject("block compressed formats");
        }
        if desc.format.info().kind == FormatKind::DepthStencil {
            return reject("depth-stencil formats");
        }
        if first_mip == 0 {
            return Err(TextureError::out_of_range("mip generation cannot overwrite the base level"));
        }
        if first_mip >= desc.num_mipmaps {
            return Ok(());
        }

        let params = resample_params(desc.format, desc.flags, config);
        let previous = self.subresource(slice_index, first_mip - 1)?;
        let (mut width, mut height) = (previous.width(), previous.height());
        let mut pixels = texels::decode(desc.format, previous.data())?;

        for mip in first_mip..desc.num_mipmaps {
            let (next_width, next_height, _) = desc.mip_dimensions(mip);
            pixels = resample(&pixels, width, height, next_width, next_height, &params)?;
            texels::encode(desc.format, &pixels, self.subresource_mut(slice_index, mip)?.data_mut())?;
            width = next_width;
            height = next_height;
        }

        debug!(
            "generated mips {}..{} of slice {} ({}x{} {})",
            first_mip, desc.num_mipmaps, slice_index, desc.width, desc.height, desc.format
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ImageStorageDesc;

    #[test]
    fn test_uniform_image_stays_uniform() {
        let desc = ImageStorageDesc::new_2d(8, 4, TextureFormat::RGBA8_UNORM).with_mipmaps();
        let mut storage = ImageStorage::new(desc).unwrap();
        let len = storage.subresource(0, 0).unwrap().size_in_bytes();
        let texel = [200u8, 100, 50, 255];
        let pixels: Vec<u8> = texel.iter().copied().cycle().take(len).collect();
        storage.subresource_mut(0, 0).unwrap().data_mut().copy_from_slice(&pixels);

        storage.generate_mipmaps(0, &ImageMipmapConfig::default()).unwrap();
        for mip in 1..desc.num_mipmaps {
            let level = storage.subresource(0, mip).unwrap();
            for chunk in level.data().chunks_exact(4) {
                for (a, b) in chunk.iter().zip(texel) {
                    assert!(a.abs_diff(b) <= 1, "mip {} texel {:?}", mip, chunk);
                }
            }
        }
        assert_eq!(storage.subresource(0, 3).unwrap().width(), 1);
    }

    #[test]
    fn test_box_filter_averages() {
        let desc = ImageStorageDesc::new_2d(2, 2, TextureFormat::R32_FLOAT).with_mipmaps();
        let mut storage = ImageStorage::new(desc).unwrap();
        let values: Vec<u8> = [0.0f32, 1.0, 2.0, 3.0].iter().flat_map(|v| v.to_le_bytes()).collect();
        storage.subresource_mut(0, 0).unwrap().data_mut().copy_from_slice(&values);

        let config = ImageMipmapConfig {
            filter: ResampleFilter::Box,
            ..Default::default()
        };
        storage.generate_mipmaps(0, &config).unwrap();
        let top = storage.subresource(0, 1).unwrap().data();
        let v = f32::from_le_bytes([top[0], top[1], top[2], top[3]]);
        assert!((v - 1.5).abs() < 1e-5);
    }

    #[test]
    fn test_rejected_formats() {
        let config = ImageMipmapConfig::default();

        let mut bc = ImageStorage::new(ImageStorageDesc::new_2d(8, 8, TextureFormat::BC1_UNORM).with_mipmaps()).unwrap();
        assert!(matches!(bc.generate_mipmaps(0, &config), Err(TextureError::UnsupportedOperation(_))));

        let mut depth = ImageStorage::new(ImageStorageDesc::new_2d(8, 8, TextureFormat::D32).with_mipmaps()).unwrap();
        assert!(matches!(depth.generate_mipmaps(0, &config), Err(TextureError::UnsupportedOperation(_))));

        let volume = ImageStorageDesc {
            texture_type: TextureType::Tex3D,
            depth: 4,
            ..ImageStorageDesc::new_2d(4, 4, TextureFormat::R8_UNORM)
        };
        let mut volume = ImageStorage::new(volume.with_mipmaps()).unwrap();
        assert!(matches!(volume.generate_mipmaps(0, &config), Err(TextureError::UnsupportedOperation(_))));
    }

    #[test]
    fn test_single_level_is_a_no_op() {
        let mut storage = ImageStorage::new(ImageStorageDesc::new_2d(4, 4, TextureFormat::R8_UNORM)).unwrap();
        storage.data_mut().fill(9);
        storage.generate_mipmaps(0, &ImageMipmapConfig::default()).unwrap();
        assert!(storage.data().iter().all(|&v| v == 9));
    }
}
