//! Tangent space normal map packing

use hork_texture_codec::{Bc1Flags, BlockCompression};
use hork_texture_core::{Result, TextureError, TextureFormat};
use serde::{Deserialize, Serialize};

use super::{ImportOptions, build_storage};
use crate::mipmap::ImageMipmapConfig;
use crate::storage::{ImageStorage, ImageStorageFlags};

const STEREOGRAPHIC_SCALE: f32 = 1.7777;

/// How a unit normal is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum NormalMapPacking {
    /// XYZ in RGB, compressible with BC1
    RgbaBc1,
    /// XY in RG, Z reconstructed; compressible with BC5
    #[default]
    RgBc5,
    /// Spheremap transform in RG
    SphereMap,
    /// Scaled stereographic projection in RG
    Stereographic,
    /// Paraboloid projection in RG
    Paraboloid,
    /// X in alpha, Y in green, compressible with BC3
    RgbaBc3,
}

impl NormalMapPacking {
    /// Bytes per packed texel
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            NormalMapPacking::RgbaBc1 | NormalMapPacking::RgbaBc3 => 4,
            _ => 2,
        }
    }

    fn format(&self) -> TextureFormat {
        match self.bytes_per_pixel() {
            4 => TextureFormat::RGBA8_UNORM,
            _ => TextureFormat::RG8_UNORM,
        }
    }

    fn compression(&self, options: &ImportOptions) -> BlockCompression {
        match self {
            NormalMapPacking::RgbaBc1 | NormalMapPacking::RgbaBc3 if options.prefer_bc7 => BlockCompression::Bc7 {
                uber_level: options.bc7_uber_level,
            },
            NormalMapPacking::RgbaBc1 => BlockCompression::Bc1 {
                quality: options.bc1_quality,
                flags: Bc1Flags::empty(),
            },
            NormalMapPacking::RgbaBc3 => BlockCompression::Bc3 {
                quality: options.bc1_quality,
                high_quality_alpha: options.high_quality,
            },
            _ => BlockCompression::Bc5 {
                high_quality: options.high_quality,
            },
        }
    }
}

fn to_unorm(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0 + 0.5) as u8
}

fn to_snorm(v: f32) -> u8 {
    to_unorm(v * 0.5 + 0.5)
}

fn from_snorm(v: u8) -> f32 {
    v as f32 / 255.0 * 2.0 - 1.0
}

fn normalize(v: [f32; 3]) -> [f32; 3] {
    let len = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if len > 0.0 {
        [v[0] / len, v[1] / len, v[2] / len]
    } else {
        [0.0, 0.0, 1.0]
    }
}

fn reconstruct_z(x: f32, y: f32) -> [f32; 3] {
    normalize([x, y, (1.0 - x * x - y * y).max(0.0).sqrt()])
}

/// Pack a normal into the first `packing.bytes_per_pixel()` bytes
pub fn pack_normal(normal: [f32; 3], packing: NormalMapPacking) -> [u8; 4] {
    let [x, y, z] = normalize(normal);
    match packing {
        NormalMapPacking::RgbaBc1 => [to_snorm(x), to_snorm(y), to_snorm(z), 255],
        NormalMapPacking::RgBc5 => [to_snorm(x), to_snorm(y), 0, 0],
        NormalMapPacking::SphereMap => {
            let f = (8.0 * z + 8.0).sqrt();
            if f == 0.0 {
                return [128, 128, 0, 0];
            }
            [to_unorm(x / f + 0.5), to_unorm(y / f + 0.5), 0, 0]
        }
        NormalMapPacking::Stereographic => {
            let d = (z + 1.0) * STEREOGRAPHIC_SCALE;
            [to_snorm(x / d), to_snorm(y / d), 0, 0]
        }
        NormalMapPacking::Paraboloid => {
            // Scale so that (a, b, 1 - a^2 - b^2) points along the normal
            let k = 2.0 / (z + (4.0 - 3.0 * z * z).max(0.0).sqrt());
            [to_snorm(k * x), to_snorm(k * y), 0, 0]
        }
        NormalMapPacking::RgbaBc3 => [255, to_snorm(y), 0, to_snorm(x)],
    }
}

/// Recover a unit normal from packed bytes
pub fn unpack_normal(texel: &[u8], packing: NormalMapPacking) -> [f32; 3] {
    match packing {
        NormalMapPacking::RgbaBc1 => normalize([from_snorm(texel[0]), from_snorm(texel[1]), from_snorm(texel[2])]),
        NormalMapPacking::RgBc5 => reconstruct_z(from_snorm(texel[0]), from_snorm(texel[1])),
        NormalMapPacking::SphereMap => {
            let fx = texel[0] as f32 / 255.0 * 4.0 - 2.0;
            let fy = texel[1] as f32 / 255.0 * 4.0 - 2.0;
            let f = fx * fx + fy * fy;
            let g = (1.0 - f / 4.0).max(0.0).sqrt();
            normalize([fx * g, fy * g, 1.0 - f / 2.0])
        }
        NormalMapPacking::Stereographic => {
            let px = from_snorm(texel[0]) * STEREOGRAPHIC_SCALE;
            let py = from_snorm(texel[1]) * STEREOGRAPHIC_SCALE;
            let g = 2.0 / (px * px + py * py + 1.0);
            [g * px, g * py, g - 1.0]
        }
        NormalMapPacking::Paraboloid => {
            let a = from_snorm(texel[0]);
            let b = from_snorm(texel[1]);
            normalize([a, b, 1.0 - a * a - b * b])
        }
        NormalMapPacking::RgbaBc3 => reconstruct_z(from_snorm(texel[3]), from_snorm(texel[1])),
    }
}

/// Build a normal map from `width` x `height` normals
///
/// `options` picks the encoder settings when `use_compression` is set;
/// with `prefer_bc7` the four channel packings go to BC7.
pub fn create_normal_map(
    normals: &[[f32; 3]],
    width: u32,
    height: u32,
    packing: NormalMapPacking,
    use_compression: bool,
    mipmap_config: Option<&ImageMipmapConfig>,
    options: &ImportOptions,
) -> Result<ImageStorage> {
    let expected = width as usize * height as usize;
    if normals.len() != expected {
        return Err(TextureError::invalid_data(format!(
            "{}x{} normal map needs {} normals, got {}",
            width,
            height,
            expected,
            normals.len()
        )));
    }

    let bpp = packing.bytes_per_pixel();
    let pixels: Vec<u8> = normals
        .iter()
        .flat_map(|&n| pack_normal(n, packing).into_iter().take(bpp))
        .collect();
    let compression = use_compression.then(|| packing.compression(options));

    // Alpha of the RGBA packings is either constant or a vector component
    build_storage(
        pixels,
        packing.format(),
        width,
        height,
        ImageStorageFlags::NO_ALPHA,
        compression,
        mipmap_config,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [NormalMapPacking; 6] = [
        NormalMapPacking::RgbaBc1,
        NormalMapPacking::RgBc5,
        NormalMapPacking::SphereMap,
        NormalMapPacking::Stereographic,
        NormalMapPacking::Paraboloid,
        NormalMapPacking::RgbaBc3,
    ];

    /// Upper hemisphere, horizon included
    fn sample_normals() -> Vec<[f32; 3]> {
        let mut normals = Vec::new();
        for i in 0..=48 {
            for j in 0..48 {
                let theta = i as f32 / 48.0 * std::f32::consts::FRAC_PI_2;
                let phi = j as f32 / 48.0 * std::f32::consts::TAU;
                normals.push([theta.sin() * phi.cos(), theta.sin() * phi.sin(), theta.cos()]);
            }
        }
        normals
    }

    fn max_axis_error(packing: NormalMapPacking, axes: std::ops::Range<usize>) -> f32 {
        let mut worst = 0.0f32;
        for n in sample_normals() {
            let back = unpack_normal(&pack_normal(n, packing), packing);
            for axis in axes.clone() {
                worst = worst.max((back[axis] - n[axis]).abs());
            }
        }
        worst
    }

    #[test]
    fn test_stored_axes_within_quantization() {
        assert!(max_axis_error(NormalMapPacking::RgbaBc1, 0..3) <= 1.5 / 255.0);
        for packing in [NormalMapPacking::RgBc5, NormalMapPacking::RgbaBc3] {
            let worst = max_axis_error(packing, 0..2);
            assert!(worst <= 1.5 / 255.0, "{:?}: {}", packing, worst * 255.0);
        }
    }

    #[test]
    fn test_reconstructed_z() {
        // z comes from 1 - x^2 - y^2, so its square carries the error of the
        // stored axes: (1/255) * (2 * sqrt(2) + 2/255) at most. Near the
        // horizon the square root amplifies that to about 24/255 on z itself.
        for packing in [NormalMapPacking::RgBc5, NormalMapPacking::RgbaBc3] {
            for n in sample_normals() {
                let back = unpack_normal(&pack_normal(n, packing), packing);
                assert!(back[2] >= 0.0);
                assert!(
                    (back[2] * back[2] - n[2] * n[2]).abs() <= 3.0 / 255.0,
                    "{:?}: {:?} -> {:?}",
                    packing,
                    n,
                    back
                );
            }
        }
    }

    #[test]
    fn test_projected_packings() {
        // The projections only spend part of the channel range on the upper
        // hemisphere, which widens the per-axis error past one step
        let limits = [
            (NormalMapPacking::SphereMap, 4.0),
            (NormalMapPacking::Stereographic, 4.0),
            (NormalMapPacking::Paraboloid, 3.5),
        ];
        for (packing, limit) in limits {
            let worst = max_axis_error(packing, 0..3);
            assert!(worst <= limit / 255.0, "{:?}: {}", packing, worst * 255.0);
        }
    }

    #[test]
    fn test_repacking_is_stable() {
        for packing in ALL {
            let bytes = packing.bytes_per_pixel();
            for n in sample_normals() {
                let packed = pack_normal(n, packing);
                let repacked = pack_normal(unpack_normal(&packed, packing), packing);
                for (a, b) in packed[..bytes].iter().zip(&repacked[..bytes]) {
                    assert!(a.abs_diff(*b) <= 1, "{:?}: {:?} -> {:?}", packing, packed, repacked);
                }
            }
        }
    }

    #[test]
    fn test_flat_normal() {
        for packing in ALL {
            let back = unpack_normal(&pack_normal([0.0, 0.0, 1.0], packing), packing);
            assert!((back[2] - 1.0).abs() < 1e-3, "{:?}: {:?}", packing, back);
        }
    }

    #[test]
    fn test_create_normal_map() {
        let normals = vec![[0.0, 0.0, 1.0]; 64];
        let options = ImportOptions::default();
        let storage = create_normal_map(&normals, 8, 8, NormalMapPacking::RgbaBc1, false, None, &options).unwrap();
        assert_eq!(storage.format(), TextureFormat::RGBA8_UNORM);
        assert_eq!(&storage.data()[..4], &[128, 128, 255, 255]);

        let config = ImageMipmapConfig::default();
        let storage = create_normal_map(&normals, 8, 8, NormalMapPacking::RgBc5, true, Some(&config), &options).unwrap();
        assert_eq!(storage.format(), TextureFormat::BC5_UNORM);
        assert_eq!(storage.desc().num_mipmaps, 2);

        assert!(create_normal_map(&normals, 4, 4, NormalMapPacking::RgBc5, false, None, &options).is_err());
    }

    #[test]
    fn test_normal_map_uses_caller_options() {
        let normals = vec![[0.0, 0.0, 1.0]; 64];
        let options = ImportOptions {
            prefer_bc7: true,
            bc7_uber_level: 0,
            ..Default::default()
        };
        let storage = create_normal_map(&normals, 8, 8, NormalMapPacking::RgbaBc1, true, None, &options).unwrap();
        assert_eq!(storage.format(), TextureFormat::BC7_UNORM);

        let storage = create_normal_map(&normals, 8, 8, NormalMapPacking::RgbaBc3, true, None, &ImportOptions::default())
            .unwrap();
        assert_eq!(storage.format(), TextureFormat::BC3_UNORM);

        // Two channel packings stay on BC5
        let storage = create_normal_map(&normals, 8, 8, NormalMapPacking::RgBc5, true, None, &options).unwrap();
        assert_eq!(storage.format(), TextureFormat::BC5_UNORM);
    }
}
