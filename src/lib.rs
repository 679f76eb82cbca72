//! Hork Texture
//!
//! Texture image storage, mip chain generation and BCn block compression for
//! the Hork engine.
//!
//! The workspace is split into three crates, all re-exported here:
//!
//! - `hork-texture-core`: error type and the GPU pixel format registry
//! - `hork-texture-codec`: packed channel codecs and BC1 through BC7
//! - `hork-texture-storage`: raw images, image storage, mipmaps and import
//!
//! # Examples
//!
//! ```rust,no_run
//! use hork_texture::{
//!     ImageImportFlags, ImageMipmapConfig, ImageStorage, ImageStorageFlags, ImportOptions,
//!     RawImage, RawImageFormat, create_image,
//! };
//!
//! let raw = RawImage::new(256, 256, RawImageFormat::RGBA8);
//! let texture = create_image(
//!     &raw,
//!     Some(&ImageMipmapConfig::default()),
//!     ImageStorageFlags::empty(),
//!     ImageImportFlags::USE_COMPRESSION,
//!     &ImportOptions::default(),
//! )?;
//!
//! let mut bytes = Vec::new();
//! texture.write(&mut bytes)?;
//! let loaded = ImageStorage::read(&mut bytes.as_slice())?;
//! assert_eq!(loaded.desc(), texture.desc());
//! # Ok::<(), hork_texture::TextureError>(())
//! ```

pub use hork_texture_core::{
    DataType, FormatKind, Result, TextureError, TextureFormat, TextureFormatInfo, calc_num_mips,
    describe, describe_id,
};

pub use hork_texture_codec::{
    BC1_DEFAULT_QUALITY, BC1_MAX_QUALITY, BC6H_DEFAULT_WORKERS, BC7_DEFAULT_UBER_LEVEL,
    BC7_MAX_UBER_LEVEL, Bc1Flags, Bc6hSettings, BlockCompression, ChannelCodec, codec_for_format,
    compress_image, decompress_image, decompressed_format,
};

pub use hork_texture_storage::{
    COLOR_GRADING_LUT_SIZE, ColorGradingSettings, EdgeMode, ImageImportFlags, ImageMipmapConfig,
    ImageRegion, ImageStorage, ImageStorageDesc, ImageStorageFlags, ImageSubresource,
    ImageSubresourceMut, ImportOptions, NormalMapPacking, RawImage, RawImageFormat,
    ResampleFilter, ResampleParams, TextureType, apply_color_grading, create_color_grading_lut,
    create_color_grading_lut_from_image, create_image, create_luminance_color_grading_lut,
    create_normal_map, create_raw_image, create_roughness_map, pack_normal, resample,
    unpack_normal,
};

/// Per-crate module access for items not re-exported at the root
pub mod codec {
    pub use hork_texture_codec::{bc, packed};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reexports_compose() {
        let raw = RawImage::new(8, 8, RawImageFormat::RGBA8);
        let texture = create_image(
            &raw,
            None,
            ImageStorageFlags::empty(),
            ImageImportFlags::USE_COMPRESSION,
            &ImportOptions::default(),
        )
        .unwrap();
        assert_eq!(texture.format(), TextureFormat::BC3_UNORM);
        assert_eq!(describe(texture.format()).block_size, 4);
    }
}
