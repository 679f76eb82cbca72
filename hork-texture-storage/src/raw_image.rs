//! Decoded source images
//!
//! A [`RawImage`] is a tightly packed, top-down pixel buffer in one of the
//! layouts the import pipeline understands. Float layouts store `f32`
//! little endian.

use std::io::{BufRead, Seek};

use hork_texture_core::{Result, TextureError};
use image::{DynamicImage, ImageReader};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Pixel layout of a [`RawImage`]
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RawImageFormat {
    R8,
    R8_ALPHA,
    RGB8,
    BGR8,
    RGBA8,
    BGRA8,
    R32_FLOAT,
    R32_ALPHA_FLOAT,
    RGB32_FLOAT,
    BGR32_FLOAT,
    RGBA32_FLOAT,
    BGRA32_FLOAT,
}

impl RawImageFormat {
    pub fn channel_count(&self) -> usize {
        use RawImageFormat::*;
        match self {
            R8 | R32_FLOAT => 1,
            R8_ALPHA | R32_ALPHA_FLOAT => 2,
            RGB8 | BGR8 | RGB32_FLOAT | BGR32_FLOAT => 3,
            RGBA8 | BGRA8 | RGBA32_FLOAT | BGRA32_FLOAT => 4,
        }
    }

    pub fn is_float(&self) -> bool {
        use RawImageFormat::*;
        matches!(
            self,
            R32_FLOAT | R32_ALPHA_FLOAT | RGB32_FLOAT | BGR32_FLOAT | RGBA32_FLOAT | BGRA32_FLOAT
        )
    }

    pub fn has_alpha(&self) -> bool {
        self.channel_count() % 2 == 0
    }

    /// Blue is stored before red
    pub fn is_bgr(&self) -> bool {
        use RawImageFormat::*;
        matches!(self, BGR8 | BGRA8 | BGR32_FLOAT | BGRA32_FLOAT)
    }

    pub fn bytes_per_pixel(&self) -> usize {
        self.channel_count() * if self.is_float() { 4 } else { 1 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawImage {
    width: u32,
    height: u32,
    format: RawImageFormat,
    data: Vec<u8>,
}

impl RawImage {
    /// Zero filled image
    pub fn new(width: u32, height: u32, format: RawImageFormat) -> Self {
        let size = width as usize * height as usize * format.bytes_per_pixel();
        Self {
            width,
            height,
            format,
            data: vec![0; size],
        }
    }

    /// Wrap existing pixels, checking the buffer length
    pub fn from_data(width: u32, height: u32, format: RawImageFormat, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * format.bytes_per_pixel();
        if data.len() != expected {
            return Err(TextureError::invalid_data(format!(
                "{}x{} {:?} needs {} bytes, got {}",
                width,
                height,
                format,
                expected,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    /// Wrap `f32` channels
    pub fn from_floats(width: u32, height: u32, format: RawImageFormat, values: &[f32]) -> Result<Self> {
        if !format.is_float() {
            return Err(TextureError::invalid_data(format!("{:?} is not a float layout", format)));
        }
        Self::from_data(width, height, format, values.iter().flat_map(|v| v.to_le_bytes()).collect())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> RawImageFormat {
        self.format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Channels as `f32`; 8-bit channels are normalized to `[0, 1]`
    pub fn to_floats(&self) -> Vec<f32> {
        if self.format.is_float() {
            self.data
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect()
        } else {
            self.data.iter().map(|&v| v as f32 / 255.0).collect()
        }
    }

    /// Adopt the pixels of a decoded image
    ///
    /// Layouts without a direct counterpart are widened to 8-bit RGBA, or to
    /// float RGBA for high precision sources. `desired` converts afterwards.
    pub fn from_dynamic_image(image: &DynamicImage, desired: Option<RawImageFormat>) -> Result<Self> {
        let (width, height) = (image.width(), image.height());
        let raw = match image {
            DynamicImage::ImageLuma8(buf) => Self::from_data(width, height, RawImageFormat::R8, buf.as_raw().clone())?,
            DynamicImage::ImageLumaA8(buf) => {
                Self::from_data(width, height, RawImageFormat::R8_ALPHA, buf.as_raw().clone())?
            }
            DynamicImage::ImageRgb8(buf) => Self::from_data(width, height, RawImageFormat::RGB8, buf.as_raw().clone())?,
            DynamicImage::ImageRgba8(buf) => {
                Self::from_data(width, height, RawImageFormat::RGBA8, buf.as_raw().clone())?
            }
            DynamicImage::ImageRgb32F(buf) => Self::from_floats(width, height, RawImageFormat::RGB32_FLOAT, buf.as_raw())?,
            DynamicImage::ImageRgba32F(buf) => {
                Self::from_floats(width, height, RawImageFormat::RGBA32_FLOAT, buf.as_raw())?
            }
            DynamicImage::ImageLuma16(_) => Self::from_data(width, height, RawImageFormat::R8, image.to_luma8().into_raw())?,
            DynamicImage::ImageLumaA16(_) => {
                Self::from_data(width, height, RawImageFormat::R8_ALPHA, image.to_luma_alpha8().into_raw())?
            }
            DynamicImage::ImageRgb16(_) => Self::from_data(width, height, RawImageFormat::RGB8, image.to_rgb8().into_raw())?,
            DynamicImage::ImageRgba16(_) => {
                Self::from_data(width, height, RawImageFormat::RGBA8, image.to_rgba8().into_raw())?
            }
            _ => Self::from_floats(width, height, RawImageFormat::RGBA32_FLOAT, image.to_rgba32f().as_raw())?,
        };

        match desired {
            Some(format) if format != raw.format => Ok(raw.convert(format)),
            _ => Ok(raw),
        }
    }

    /// Convert to another layout
    ///
    /// Gray targets take Rec. 709 luminance, missing alpha becomes opaque and
    /// gray sources are replicated into color channels.
    pub fn convert(&self, target: RawImageFormat) -> Self {
        if target == self.format {
            return self.clone();
        }

        let src = self.to_floats();
        let channels = self.format.channel_count();
        let out_channels = target.channel_count();
        let pixel_count = src.len() / channels;
        let mut data = Vec::with_capacity(pixel_count * target.bytes_per_pixel());

        for p in src.chunks_exact(channels) {
            let (rgb, alpha) = match channels {
                1 => ([p[0]; 3], 1.0),
                2 => ([p[0]; 3], p[1]),
                _ => {
                    let rgb = if self.format.is_bgr() { [p[2], p[1], p[0]] } else { [p[0], p[1], p[2]] };
                    (rgb, if channels == 4 { p[3] } else { 1.0 })
                }
            };
            let gray = if channels <= 2 { rgb[0] } else { luminance(rgb) };
            let [r, g, b] = if target.is_bgr() { [rgb[2], rgb[1], rgb[0]] } else { rgb };
            let texel = match out_channels {
                1 => [gray, 0.0, 0.0, 0.0],
                2 => [gray, alpha, 0.0, 0.0],
                3 => [r, g, b, 0.0],
                _ => [r, g, b, alpha],
            };

            for &v in &texel[..out_channels] {
                if target.is_float() {
                    data.extend_from_slice(&v.to_le_bytes());
                } else {
                    data.push((v.clamp(0.0, 1.0) * 255.0 + 0.5) as u8);
                }
            }
        }

        Self {
            width: self.width,
            height: self.height,
            format: target,
            data,
        }
    }

    /// Exchange red and blue, toggling between RGB and BGR layouts
    pub fn swap_red_blue(&mut self) {
        use RawImageFormat::*;
        let (swapped, size) = match self.format {
            RGB8 => (BGR8, 1),
            BGR8 => (RGB8, 1),
            RGBA8 => (BGRA8, 1),
            BGRA8 => (RGBA8, 1),
            RGB32_FLOAT => (BGR32_FLOAT, 4),
            BGR32_FLOAT => (RGB32_FLOAT, 4),
            RGBA32_FLOAT => (BGRA32_FLOAT, 4),
            BGRA32_FLOAT => (RGBA32_FLOAT, 4),
            _ => return,
        };
        let bpp = self.format.bytes_per_pixel();
        for pixel in self.data.chunks_exact_mut(bpp) {
            for i in 0..size {
                pixel.swap(i, 2 * size + i);
            }
        }
        self.format = swapped;
    }

    /// Multiply color by alpha; no-op for layouts without alpha
    pub fn premultiply_alpha(&mut self) {
        if !self.format.has_alpha() {
            return;
        }
        let channels = self.format.channel_count();
        if self.format.is_float() {
            let mut values = self.to_floats();
            for pixel in values.chunks_exact_mut(channels) {
                let alpha = pixel[channels - 1];
                for v in &mut pixel[..channels - 1] {
                    *v *= alpha;
                }
            }
            self.data = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        } else {
            for pixel in self.data.chunks_exact_mut(channels) {
                let alpha = pixel[channels - 1] as u32;
                for v in &mut pixel[..channels - 1] {
                    *v = ((*v as u32 * alpha + 127) / 255) as u8;
                }
            }
        }
    }

    /// Mirror rows top to bottom
    pub fn flip_vertical(&mut self) {
        let row = self.width as usize * self.format.bytes_per_pixel();
        let height = self.height as usize;
        for y in 0..height / 2 {
            let (top, bottom) = self.data.split_at_mut((height - 1 - y) * row);
            top[y * row..(y + 1) * row].swap_with_slice(&mut bottom[..row]);
        }
    }
}

/// Rec. 709 luminance of a linear color
pub(crate) fn luminance(rgb: [f32; 3]) -> f32 {
    0.2126 * rgb[0] + 0.7152 * rgb[1] + 0.0722 * rgb[2]
}

/// Decode an encoded image (PNG, JPEG, TGA, HDR, ...) from a stream
pub fn create_raw_image<R: BufRead + Seek>(reader: R, desired: Option<RawImageFormat>) -> Result<RawImage> {
    let image = ImageReader::new(reader)
        .with_guessed_format()?
        .decode()
        .map_err(|e| TextureError::decode(e.to_string()))?;
    debug!("decoded {}x{} {:?}", image.width(), image.height(), image.color());
    RawImage::from_dynamic_image(&image, desired)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbImage};
    use std::io::Cursor;

    #[test]
    fn test_from_data_checks_length() {
        assert!(RawImage::from_data(2, 2, RawImageFormat::RGB8, vec![0; 12]).is_ok());
        let err = RawImage::from_data(2, 2, RawImageFormat::RGB8, vec![0; 11]).unwrap_err();
        assert!(matches!(err, TextureError::InvalidData(_)));
    }

    #[test]
    fn test_convert_to_gray_and_back() {
        let image = RawImage::from_data(1, 1, RawImageFormat::BGR8, vec![0, 0, 255]).unwrap();
        let gray = image.convert(RawImageFormat::R8);
        // Red only: 0.2126 * 255
        assert_eq!(gray.data(), &[54]);

        let rgba = gray.convert(RawImageFormat::RGBA8);
        assert_eq!(rgba.data(), &[54, 54, 54, 255]);

        let float = image.convert(RawImageFormat::RGBA32_FLOAT);
        assert_eq!(float.to_floats(), vec![1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_gray_weights() {
        let image = RawImage::from_data(3, 1, RawImageFormat::RGBA8, vec![0, 255, 0, 90, 0, 0, 255, 255, 255, 255, 255, 255])
            .unwrap();
        let gray = image.convert(RawImageFormat::R8_ALPHA);
        // 0.7152 * 255 and 0.0722 * 255, alpha carried over
        assert_eq!(gray.data(), &[182, 90, 18, 255, 255, 255]);

        let float = image.convert(RawImageFormat::R32_FLOAT).to_floats();
        assert!((float[0] - luminance([0.0, 1.0, 0.0])).abs() < 1e-6);
    }

    #[test]
    fn test_swap_red_blue() {
        let mut image = RawImage::from_data(1, 1, RawImageFormat::RGBA8, vec![1, 2, 3, 4]).unwrap();
        image.swap_red_blue();
        assert_eq!(image.format(), RawImageFormat::BGRA8);
        assert_eq!(image.data(), &[3, 2, 1, 4]);

        let mut float = RawImage::from_floats(1, 1, RawImageFormat::RGB32_FLOAT, &[1.0, 2.0, 3.0]).unwrap();
        float.swap_red_blue();
        assert_eq!(float.to_floats(), vec![3.0, 2.0, 1.0]);
    }

    #[test]
    fn test_premultiply_and_flip() {
        let mut image = RawImage::from_data(1, 2, RawImageFormat::RGBA8, vec![255, 128, 0, 128, 10, 20, 30, 255]).unwrap();
        image.premultiply_alpha();
        assert_eq!(&image.data()[..4], &[128, 64, 0, 128]);
        image.flip_vertical();
        assert_eq!(image.data(), &[10, 20, 30, 255, 128, 64, 0, 128]);
    }

    #[test]
    fn test_decode_png() {
        let source = RgbImage::from_fn(3, 2, |x, y| image::Rgb([x as u8 * 50, y as u8 * 100, 7]));
        let mut encoded = Cursor::new(Vec::new());
        source.write_to(&mut encoded, ImageFormat::Png).unwrap();
        encoded.set_position(0);

        let raw = create_raw_image(encoded, None).unwrap();
        assert_eq!((raw.width(), raw.height(), raw.format()), (3, 2, RawImageFormat::RGB8));
        assert_eq!(raw.data(), source.as_raw().as_slice());

        let err = create_raw_image(Cursor::new(vec![1u8, 2, 3]), None).unwrap_err();
        assert!(matches!(err, TextureError::Decode(_)));
    }
}
