use hork_texture_codec::BlockCompression;
use hork_texture_core::{Result, TextureError, TextureFormat};

use super::build_storage;
use crate::mipmap::ImageMipmapConfig;
use crate::storage::{ImageStorage, ImageStorageFlags};

/// Build a single channel roughness map, optionally BC4 compressed
pub fn create_roughness_map(
    values: &[u8],
    width: u32,
    height: u32,
    use_compression: bool,
    mipmap_config: Option<&ImageMipmapConfig>,
) -> Result<ImageStorage> {
    let expected = width as usize * height as usize;
    if values.len() != expected {
        return Err(TextureError::invalid_data(format!(
            "{}x{} roughness map needs {} values, got {}",
            width,
            height,
            expected,
            values.len()
        )));
    }

    let compression = use_compression.then_some(BlockCompression::Bc4 { high_quality: true });
    build_storage(
        values.to_vec(),
        TextureFormat::R8_UNORM,
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

    #[test]
    fn test_uncompressed_roughness() {
        let values: Vec<u8> = (0..16).map(|v| v * 16).collect();
        let storage = create_roughness_map(&values, 4, 4, false, None).unwrap();
        assert_eq!(storage.format(), TextureFormat::R8_UNORM);
        assert_eq!(storage.data(), values.as_slice());
    }

    #[test]
    fn test_compressed_roughness_with_mips() {
        let values = vec![200u8; 64 * 64];
        let storage = create_roughness_map(&values, 64, 64, true, Some(&ImageMipmapConfig::default())).unwrap();
        assert_eq!(storage.format(), TextureFormat::BC4_UNORM);
        assert_eq!(storage.desc().num_mipmaps, 5);

        let decoded = storage.decompress().unwrap();
        assert_eq!(decoded.format(), TextureFormat::R8_UNORM);
        assert_eq!(decoded.desc().num_mipmaps, 7);
        assert!(decoded.data().iter().all(|&v| v == 200));
    }

    #[test]
    fn test_size_mismatch() {
        let err = create_roughness_map(&[0; 3], 2, 2, false, None).unwrap_err();
        assert!(matches!(err, TextureError::InvalidData(_)));
    }
}
