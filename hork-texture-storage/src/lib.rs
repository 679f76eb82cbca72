//! Texture storage and import for hork-texture
//!
//! This crate owns texture data once it leaves the source decoder:
//!
//! - **Raw images** ([`RawImage`]): decoded single level pixels, loaded
//!   through the `image` crate
//! - **Image storage** ([`ImageStorage`]): every mip level of every slice in
//!   one buffer, addressable per subresource, with a compact binary form
//! - **Mipmaps**: gamma and alpha aware mip chain generation on top of a
//!   separable resampler
//! - **Import**: format and compression selection, normal and roughness
//!   maps, color grading LUTs
//!
//! # Example
//!
//! ```rust,no_run
//! use hork_texture_storage::{
//!     ImageImportFlags, ImageMipmapConfig, ImageStorageFlags, ImportOptions, create_image,
//!     create_raw_image,
//! };
//! use std::fs::File;
//! use std::io::BufReader;
//!
//! let raw = create_raw_image(BufReader::new(File::open("albedo.png")?), None)?;
//! let texture = create_image(
//!     &raw,
//!     Some(&ImageMipmapConfig::default()),
//!     ImageStorageFlags::empty(),
//!     ImageImportFlags::USE_COMPRESSION | ImageImportFlags::ASSUME_8BIT_RGB_IMAGES_ARE_SRGB,
//!     &ImportOptions::default(),
//! )?;
//! texture.write(&mut File::create("albedo.tex")?)?;
//! # Ok::<(), hork_texture_core::TextureError>(())
//! ```

pub mod import;
pub mod mipmap;
pub mod raw_image;
pub mod resample;
pub mod storage;

mod texels;

pub use import::{
    COLOR_GRADING_LUT_SIZE, ColorGradingSettings, ImageImportFlags, ImportOptions, NormalMapPacking,
    apply_color_grading, create_color_grading_lut, create_color_grading_lut_from_image, create_image,
    create_luminance_color_grading_lut, create_normal_map, create_roughness_map, pack_normal, unpack_normal,
};
pub use mipmap::ImageMipmapConfig;
pub use raw_image::{RawImage, RawImageFormat, create_raw_image};
pub use resample::{EdgeMode, ResampleFilter, ResampleParams, resample};
pub use storage::{
    ImageRegion, ImageStorage, ImageStorageDesc, ImageStorageFlags, ImageSubresource, ImageSubresourceMut,
    TextureType,
};
