//! Import pipeline tests
//!
//! End to end runs from raw pixels to compressed, mipmapped storages.

use std::io::Cursor;

use hork_texture_core::{TextureFormat, calc_num_mips};
use hork_texture_storage::{
    ColorGradingSettings, EdgeMode, ImageImportFlags, ImageMipmapConfig, ImageStorageFlags, ImportOptions,
    RawImage, RawImageFormat, ResampleFilter, create_color_grading_lut, create_image, create_raw_image,
};

fn gradient(width: u32, height: u32, format: RawImageFormat) -> RawImage {
    let channels = format.channel_count();
    let mut image = RawImage::new(width, height, format);
    for (i, px) in image.data_mut().chunks_exact_mut(channels).enumerate() {
        let x = i as u32 % width;
        let y = i as u32 / width;
        for (c, v) in px.iter_mut().enumerate() {
            *v = match c {
                0 => (x * 255 / width) as u8,
                1 => (y * 255 / height) as u8,
                2 => 64,
                _ => 200,
            };
        }
    }
    image
}

#[test]
fn test_rgba8_with_mips_to_bc3() {
    let raw = gradient(256, 256, RawImageFormat::RGBA8);
    let storage = create_image(
        &raw,
        Some(&ImageMipmapConfig::default()),
        ImageStorageFlags::empty(),
        ImageImportFlags::USE_COMPRESSION,
        &ImportOptions::default(),
    )
    .unwrap();

    let desc = storage.desc();
    assert_eq!(desc.format, TextureFormat::BC3_UNORM);
    assert_eq!(desc.slice_count, 1);
    assert_eq!((desc.width, desc.height), (256, 256));
    assert_eq!(desc.num_mipmaps, calc_num_mips(TextureFormat::BC3_UNORM, 256, 256, 1));
    assert_eq!(desc.num_mipmaps, 7);

    // Uncompressed, the same import keeps the whole chain
    let storage = create_image(
        &raw,
        Some(&ImageMipmapConfig::default()),
        ImageStorageFlags::empty(),
        ImageImportFlags::empty(),
        &ImportOptions::default(),
    )
    .unwrap();
    assert_eq!(storage.desc().num_mipmaps, 9);
    assert_eq!(storage.subresource(0, 0).unwrap().data(), raw.data());
}

#[test]
fn test_rgb8_300_is_resized_for_bc1() {
    let raw = gradient(300, 300, RawImageFormat::RGB8);
    let config = ImageMipmapConfig {
        edge_mode: EdgeMode::Clamp,
        filter: ResampleFilter::Triangle,
    };
    let storage = create_image(
        &raw,
        Some(&config),
        ImageStorageFlags::empty(),
        ImageImportFlags::USE_COMPRESSION | ImageImportFlags::ASSUME_8BIT_RGB_IMAGES_ARE_SRGB,
        &ImportOptions::default(),
    )
    .unwrap();

    let desc = storage.desc();
    assert_eq!(desc.format, TextureFormat::BC1_UNORM_SRGB);
    assert_eq!((desc.width, desc.height), (256, 256));
    assert!(desc.flags.contains(ImageStorageFlags::NO_ALPHA));
    assert!(desc.validate().is_ok());
    assert_eq!(storage.size_in_bytes(), desc.data_size().unwrap());
}

#[test]
fn test_unaligned_without_mips_snaps_to_blocks() {
    let raw = gradient(30, 18, RawImageFormat::R8);
    let storage = create_image(
        &raw,
        None,
        ImageStorageFlags::empty(),
        ImageImportFlags::USE_COMPRESSION,
        &ImportOptions::default(),
    )
    .unwrap();
    assert_eq!(storage.format(), TextureFormat::BC4_UNORM);
    assert_eq!((storage.desc().width, storage.desc().height), (32, 20));
}

#[test]
fn test_prefer_bc7() {
    let raw = gradient(64, 64, RawImageFormat::BGRA8);
    let options = ImportOptions {
        prefer_bc7: true,
        bc7_uber_level: 0,
        ..Default::default()
    };
    let storage = create_image(
        &raw,
        None,
        ImageStorageFlags::empty(),
        ImageImportFlags::USE_COMPRESSION,
        &options,
    )
    .unwrap();
    assert_eq!(storage.format(), TextureFormat::BC7_UNORM);

    let decoded = storage.decompress().unwrap();
    // BGRA source: blue (constant 64) ends up in red after the swap
    let first = &decoded.data()[..4];
    assert!(first[0].abs_diff(64) <= 8, "{:?}", first);
    assert!(first[3].abs_diff(200) <= 8, "{:?}", first);
}

#[test]
fn test_luma_alpha_goes_to_bc5() {
    let raw = gradient(16, 16, RawImageFormat::R8_ALPHA);
    let storage = create_image(
        &raw,
        Some(&ImageMipmapConfig::default()),
        ImageStorageFlags::empty(),
        ImageImportFlags::USE_COMPRESSION,
        &ImportOptions::default(),
    )
    .unwrap();
    assert_eq!(storage.format(), TextureFormat::BC5_UNORM);
    assert_eq!(storage.desc().num_mipmaps, 3);
}

#[test]
fn test_decoded_png_import() {
    let source = image::RgbaImage::from_fn(8, 8, |x, y| image::Rgba([x as u8 * 30, y as u8 * 30, 0, 255]));
    let mut encoded = Cursor::new(Vec::new());
    source.write_to(&mut encoded, image::ImageFormat::Png).unwrap();
    encoded.set_position(0);

    let raw = create_raw_image(encoded, Some(RawImageFormat::RGB8)).unwrap();
    assert_eq!(raw.format(), RawImageFormat::RGB8);

    let storage = create_image(
        &raw,
        None,
        ImageStorageFlags::empty(),
        ImageImportFlags::empty(),
        &ImportOptions::default(),
    )
    .unwrap();
    assert_eq!(storage.format(), TextureFormat::RGBA8_UNORM);
    assert_eq!(&storage.data()[..8], &[0, 0, 0, 255, 30, 0, 0, 255]);
}

#[test]
fn test_identity_color_grading_lut() {
    let lut = create_color_grading_lut(&ColorGradingSettings::default()).unwrap();
    let desc = lut.desc();
    assert_eq!((desc.width, desc.height, desc.depth), (16, 16, 16));
    for z in 0..16usize {
        for y in 0..16usize {
            for x in 0..16usize {
                let i = (z * 256 + y * 16 + x) * 4;
                let texel = &lut.data()[i..i + 3];
                for (v, c) in texel.iter().zip([x, y, z]) {
                    let expected = c as f32 / 15.0;
                    assert!((*v as f32 / 255.0 - expected).abs() <= 1.0 / 255.0);
                }
            }
        }
    }
}
