//! Color grading lookup tables
//!
//! LUTs are 16x16x16 RGBA8 volumes indexed by the graded color: red along
//! X, green along Y and blue along Z.

use hork_texture_core::{Result, TextureError, TextureFormat};
use serde::{Deserialize, Serialize};

use crate::raw_image::{RawImage, RawImageFormat, luminance};
use crate::storage::{ImageStorage, ImageStorageDesc, ImageStorageFlags, TextureType};

/// Texels along each axis of a color grading LUT
pub const COLOR_GRADING_LUT_SIZE: u32 = 16;

/// Grading controls; the default leaves colors untouched
///
/// Lift, gamma and gain are centered on 0.5.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorGradingSettings {
    pub gamma: [f32; 3],
    pub lift: [f32; 3],
    pub gain: [f32; 3],
    pub presaturation: [f32; 3],
    /// White balance temperature in Kelvin
    pub temperature: f32,
    pub temperature_strength: [f32; 3],
    /// Blend toward the pre-tint luminance after the temperature tint
    pub temperature_brightness_normalization: f32,
}

impl Default for ColorGradingSettings {
    fn default() -> Self {
        Self {
            gamma: [0.5; 3],
            lift: [0.5; 3],
            gain: [0.5; 3],
            presaturation: [1.0; 3],
            temperature: 6500.0,
            temperature_strength: [0.0; 3],
            temperature_brightness_normalization: 0.0,
        }
    }
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Black body color of a temperature, normalized to `[0, 1]`
fn kelvin_to_rgb(kelvin: f32) -> [f32; 3] {
    let t = kelvin / 100.0;
    let red = if t <= 66.0 {
        255.0
    } else {
        329.698_73 * (t - 60.0).powf(-0.133_204_76)
    };
    let green = if t <= 66.0 {
        99.470_8 * t.ln() - 161.119_57
    } else {
        288.122_17 * (t - 60.0).powf(-0.075_514_85)
    };
    let blue = if t >= 66.0 {
        255.0
    } else if t <= 19.0 {
        0.0
    } else {
        138.517_73 * (t - 10.0).ln() - 305.044_8
    };
    [red, green, blue].map(|v| v.clamp(0.0, 255.0) / 255.0)
}

/// Grade one linear color
pub fn apply_color_grading(settings: &ColorGradingSettings, color: [f32; 3]) -> [f32; 3] {
    let tint = kelvin_to_rgb(settings.temperature);
    let before = luminance(color);
    let mut c: [f32; 3] = std::array::from_fn(|i| lerp(color[i], color[i] * tint[i], settings.temperature_strength[i]));

    let after = luminance(c);
    if after > 0.0 {
        let scale = before / after;
        c = c.map(|v| lerp(v, v * scale, settings.temperature_brightness_normalization));
    }

    let l = luminance(c);
    std::array::from_fn(|i| {
        let mut v = lerp(l, c[i], settings.presaturation[i]);
        v += (2.0 * settings.lift[i] - 1.0) * (1.0 - v);
        v = v.max(0.0).powf(0.5 / settings.gamma[i].max(1e-4));
        v *= 2.0 * settings.gain[i];
        v.clamp(0.0, 1.0)
    })
}

fn lut_storage() -> Result<ImageStorage> {
    let size = COLOR_GRADING_LUT_SIZE;
    ImageStorage::new(ImageStorageDesc {
        texture_type: TextureType::Tex3D,
        width: size,
        height: size,
        depth: size,
        flags: ImageStorageFlags::NO_ALPHA,
        ..ImageStorageDesc::new_2d(size, size, TextureFormat::RGBA8_UNORM)
    })
}

fn fill_lut(mut texel: impl FnMut([f32; 3]) -> [f32; 3]) -> Result<ImageStorage> {
    let mut storage = lut_storage()?;
    let size = COLOR_GRADING_LUT_SIZE as usize;
    let scale = (size - 1) as f32;
    for (i, out) in storage.data_mut().chunks_exact_mut(4).enumerate() {
        let (x, y, z) = (i % size, i / size % size, i / (size * size));
        let color = texel([x as f32 / scale, y as f32 / scale, z as f32 / scale]);
        for (o, v) in out.iter_mut().zip(color) {
            *o = (v.clamp(0.0, 1.0) * 255.0 + 0.5) as u8;
        }
        out[3] = 255;
    }
    Ok(storage)
}

/// Bake `settings` into a 16x16x16 LUT
pub fn create_color_grading_lut(settings: &ColorGradingSettings) -> Result<ImageStorage> {
    fill_lut(|color| apply_color_grading(settings, color))
}

/// LUT that maps every color to its gray luminance
pub fn create_luminance_color_grading_lut() -> Result<ImageStorage> {
    fill_lut(|color| [luminance(color); 3])
}

/// Rebuild a LUT from a 256x16 strip of sixteen 16x16 tiles, one per blue slice
pub fn create_color_grading_lut_from_image(image: &RawImage) -> Result<ImageStorage> {
    let size = COLOR_GRADING_LUT_SIZE;
    if image.width() != size * size || image.height() != size {
        return Err(TextureError::invalid_dimensions(
            image.width(),
            image.height(),
            1,
            format!("color grading atlas must be {}x{}", size * size, size),
        ));
    }

    let rgba = image.convert(RawImageFormat::RGBA8);
    let atlas = rgba.data();
    let mut storage = lut_storage()?;
    let size = size as usize;
    for (i, out) in storage.data_mut().chunks_exact_mut(4).enumerate() {
        let (x, y, z) = (i % size, i / size % size, i / (size * size));
        let offset = (y * size * size + z * size + x) * 4;
        out[..3].copy_from_slice(&atlas[offset..offset + 3]);
        out[3] = 255;
    }
    Ok(storage)
}
