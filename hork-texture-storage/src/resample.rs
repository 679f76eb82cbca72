//! Separable image resampler
//!
//! Works on interleaved `f32` channels. Color channels of sRGB data are
//! filtered in linear space, and color is weighted by alpha unless the data
//! is already premultiplied.

use hork_texture_core::{Result, TextureError};
use serde::{Deserialize, Serialize};

/// How samples outside the image are produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EdgeMode {
    /// Repeat the edge texel
    #[default]
    Clamp,
    /// Mirror the image at its edges
    Reflect,
    /// Tile the image
    Wrap,
    /// Treat outside texels as zero
    Zero,
}

/// Resampling kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ResampleFilter {
    Box,
    Triangle,
    /// Cubic B-spline (B = 1, C = 0)
    CubicBSpline,
    /// Catmull-Rom spline (B = 0, C = 1/2)
    CatmullRom,
    /// Mitchell-Netravali (B = 1/3, C = 1/3)
    #[default]
    Mitchell,
}

/// Mitchell-Netravali family of cubics
fn bc_cubic(x: f32, b: f32, c: f32) -> f32 {
    let x = x.abs();
    if x < 1.0 {
        ((12.0 - 9.0 * b - 6.0 * c) * x * x * x + (-18.0 + 12.0 * b + 6.0 * c) * x * x + (6.0 - 2.0 * b)) / 6.0
    } else if x < 2.0 {
        ((-b - 6.0 * c) * x * x * x
            + (6.0 * b + 30.0 * c) * x * x
            + (-12.0 * b - 48.0 * c) * x
            + (8.0 * b + 24.0 * c))
            / 6.0
    } else {
        0.0
    }
}

impl ResampleFilter {
    /// Kernel radius at unit scale
    pub fn support(self) -> f32 {
        match self {
            ResampleFilter::Box => 0.5,
            ResampleFilter::Triangle => 1.0,
            _ => 2.0,
        }
    }

    /// Kernel value at distance `x` from the sample center
    pub fn weight(self, x: f32) -> f32 {
        match self {
            ResampleFilter::Box => {
                if (-0.5..0.5).contains(&x) {
                    1.0
                } else {
                    0.0
                }
            }
            ResampleFilter::Triangle => (1.0 - x.abs()).max(0.0),
            ResampleFilter::CubicBSpline => bc_cubic(x, 1.0, 0.0),
            ResampleFilter::CatmullRom => bc_cubic(x, 0.0, 0.5),
            ResampleFilter::Mitchell => bc_cubic(x, 1.0 / 3.0, 1.0 / 3.0),
        }
    }
}

/// Layout and color interpretation of the data being resampled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResampleParams {
    /// Interleaved channels per texel
    pub channels: usize,
    /// Index of the alpha channel, if alpha should weight color
    pub alpha_channel: Option<usize>,
    /// The first three non-alpha channels are sRGB encoded
    pub srgb: bool,
    /// Color is already multiplied by alpha
    pub premultiplied: bool,
    pub filter: ResampleFilter,
    pub edge_mode: EdgeMode,
}

impl ResampleParams {
    /// Plain data: no alpha weighting, no gamma
    pub fn linear(channels: usize, filter: ResampleFilter, edge_mode: EdgeMode) -> Self {
        Self {
            channels,
            alpha_channel: None,
            srgb: false,
            premultiplied: false,
            filter,
            edge_mode,
        }
    }

    /// Gamma encoded channels of one texel: up to three, skipping alpha
    fn color_channels<'a>(&self, texel: &'a mut [f32]) -> impl Iterator<Item = &'a mut f32> {
        let alpha = self.alpha_channel;
        texel
            .iter_mut()
            .enumerate()
            .filter(move |(c, _)| Some(*c) != alpha)
            .take(3)
            .map(|(_, v)| v)
    }
}

#[inline]
pub fn srgb_to_linear(v: f32) -> f32 {
    if v <= 0.04045 {
        v / 12.92
    } else {
        ((v + 0.055) / 1.055).powf(2.4)
    }
}

#[inline]
pub fn linear_to_srgb(v: f32) -> f32 {
    let v = v.max(0.0);
    if v <= 0.0031308 {
        v * 12.92
    } else {
        1.055 * v.powf(1.0 / 2.4) - 0.055
    }
}

fn resolve(edge_mode: EdgeMode, index: i64, len: i64) -> Option<usize> {
    let resolved = match edge_mode {
        EdgeMode::Clamp => index.clamp(0, len - 1),
        EdgeMode::Wrap => index.rem_euclid(len),
        EdgeMode::Reflect => {
            let m = index.rem_euclid(2 * len);
            if m >= len { 2 * len - 1 - m } else { m }
        }
        EdgeMode::Zero => {
            if !(0..len).contains(&index) {
                return None;
            }
            index
        }
    };
    Some(resolved as usize)
}

/// Normalized source taps of every destination sample along one axis
fn contributions(src_len: u32, dst_len: u32, filter: ResampleFilter, edge_mode: EdgeMode) -> Vec<Vec<(usize, f32)>> {
    let scale = src_len as f32 / dst_len as f32;
    let filter_scale = scale.max(1.0);
    let support = filter.support() * filter_scale;

    (0..dst_len)
        .map(|i| {
            let center = (i as f32 + 0.5) * scale - 0.5;
            let start = (center - support).floor() as i64;
            let end = (center + support).ceil() as i64;

            let mut taps = Vec::with_capacity((end - start + 1) as usize);
            let mut total = 0.0;
            for j in start..=end {
                let w = filter.weight((j as f32 - center) / filter_scale);
                if w == 0.0 {
                    continue;
                }
                // Zero edges still count toward the normalization
                total += w;
                if let Some(s) = resolve(edge_mode, j, src_len as i64) {
                    taps.push((s, w));
                }
            }
            if total != 0.0 {
                for tap in &mut taps {
                    tap.1 /= total;
                }
            }
            taps
        })
        .collect()
}

/// Resample `src` (`src_width` x `src_height` texels) to the destination size
pub fn resample(
    src: &[f32],
    src_width: u32,
    src_height: u32,
    dst_width: u32,
    dst_height: u32,
    params: &ResampleParams,
) -> Result<Vec<f32>> {
    if src_width == 0 || src_height == 0 || dst_width == 0 || dst_height == 0 {
        return Err(TextureError::invalid_dimensions(
            dst_width,
            dst_height,
            1,
            format!("cannot resample from {}x{}", src_width, src_height),
        ));
    }
    let channels = params.channels;
    let expected = src_width as usize * src_height as usize * channels;
    if channels == 0 || src.len() != expected {
        return Err(TextureError::invalid_data(format!(
            "resampler expected {} values, got {}",
            expected,
            src.len()
        )));
    }

    let weight_by = if params.premultiplied { None } else { params.alpha_channel };

    // To linear, alpha weighted space
    let mut work = src.to_vec();
    for texel in work.chunks_exact_mut(channels) {
        if params.srgb {
            for v in params.color_channels(texel) {
                *v = srgb_to_linear(*v);
            }
        }
        if let Some(a) = weight_by {
            let alpha = texel[a];
            for (c, v) in texel.iter_mut().enumerate() {
                if c != a {
                    *v *= alpha;
                }
            }
        }
    }

    // Horizontal pass
    let (sw, sh) = (src_width as usize, src_height as usize);
    let (dw, dh) = (dst_width as usize, dst_height as usize);
    let horizontal = contributions(src_width, dst_width, params.filter, params.edge_mode);
    let mut tmp = vec![0.0f32; dw * sh * channels];
    for y in 0..sh {
        let row = &work[y * sw * channels..(y + 1) * sw * channels];
        let out = &mut tmp[y * dw * channels..(y + 1) * dw * channels];
        for (x, taps) in horizontal.iter().enumerate() {
            let texel = &mut out[x * channels..(x + 1) * channels];
            for &(s, w) in taps {
                for (c, v) in texel.iter_mut().enumerate() {
                    *v += row[s * channels + c] * w;
                }
            }
        }
    }

    // Vertical pass
    let vertical = contributions(src_height, dst_height, params.filter, params.edge_mode);
    let row_len = dw * channels;
    let mut dst = vec![0.0f32; dw * dh * channels];
    for (y, taps) in vertical.iter().enumerate() {
        let out = &mut dst[y * row_len..(y + 1) * row_len];
        for &(s, w) in taps {
            let row = &tmp[s * row_len..(s + 1) * row_len];
            for (o, v) in out.iter_mut().zip(row) {
                *o += v * w;
            }
        }
    }

    // Back to the source encoding
    for texel in dst.chunks_exact_mut(channels) {
        if let Some(a) = weight_by {
            let alpha = texel[a];
            for (c, v) in texel.iter_mut().enumerate() {
                if c != a {
                    *v = if alpha > 0.0 { *v / alpha } else { 0.0 };
                }
            }
        }
        if params.srgb {
            for v in params.color_channels(texel) {
                *v = linear_to_srgb(*v);
            }
        }
    }

    Ok(dst)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(channels: usize, filter: ResampleFilter, edge_mode: EdgeMode) -> ResampleParams {
        ResampleParams::linear(channels, filter, edge_mode)
    }

    #[test]
    fn test_filters_are_normalized_at_zero() {
        assert_eq!(ResampleFilter::Box.weight(0.0), 1.0);
        assert_eq!(ResampleFilter::Triangle.weight(0.0), 1.0);
        assert_eq!(ResampleFilter::CatmullRom.weight(0.0), 1.0);
        assert!((ResampleFilter::CubicBSpline.weight(0.0) - 2.0 / 3.0).abs() < 1e-6);
        assert!((ResampleFilter::Mitchell.weight(0.0) - 8.0 / 9.0).abs() < 1e-6);
        assert_eq!(ResampleFilter::Mitchell.weight(2.0), 0.0);
    }

    #[test]
    fn test_box_halving_averages_pairs() {
        let src = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0];
        let out = resample(&src, 4, 2, 2, 1, &params(1, ResampleFilter::Box, EdgeMode::Clamp)).unwrap();
        assert_eq!(out, vec![2.5, 4.5]);
    }

    #[test]
    fn test_constant_image_is_preserved() {
        let src = vec![0.3f32; 7 * 5 * 2];
        for filter in [
            ResampleFilter::Box,
            ResampleFilter::Triangle,
            ResampleFilter::CubicBSpline,
            ResampleFilter::CatmullRom,
            ResampleFilter::Mitchell,
        ] {
            for edge in [EdgeMode::Clamp, EdgeMode::Reflect, EdgeMode::Wrap] {
                let out = resample(&src, 7, 5, 3, 2, &params(2, filter, edge)).unwrap();
                assert!(out.iter().all(|v| (v - 0.3).abs() < 1e-5), "{:?} {:?}", filter, edge);
            }
        }
    }

    #[test]
    fn test_zero_edge_darkens_borders() {
        let src = vec![1.0f32; 8];
        let out = resample(&src, 8, 1, 4, 1, &params(1, ResampleFilter::Triangle, EdgeMode::Zero)).unwrap();
        assert!(out[0] < 1.0);
        assert!((out[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_edge_resolution() {
        assert_eq!(resolve(EdgeMode::Clamp, -3, 4), Some(0));
        assert_eq!(resolve(EdgeMode::Wrap, -1, 4), Some(3));
        assert_eq!(resolve(EdgeMode::Reflect, -1, 4), Some(0));
        assert_eq!(resolve(EdgeMode::Reflect, 5, 4), Some(2));
        assert_eq!(resolve(EdgeMode::Zero, 4, 4), None);
    }

    #[test]
    fn test_alpha_weighting_ignores_transparent_color() {
        // Red transparent texel next to an opaque green one
        let src = [1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 1.0];
        let mut p = params(4, ResampleFilter::Box, EdgeMode::Clamp);
        p.alpha_channel = Some(3);
        let out = resample(&src, 2, 1, 1, 1, &p).unwrap();
        assert!(out[0].abs() < 1e-6);
        assert!((out[1] - 1.0).abs() < 1e-6);
        assert!((out[3] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_srgb_averaging_happens_in_linear_space() {
        let src = [0.0, 1.0];
        let mut p = params(1, ResampleFilter::Box, EdgeMode::Clamp);
        p.srgb = true;
        let out = resample(&src, 2, 1, 1, 1, &p).unwrap();
        assert!((out[0] - linear_to_srgb(0.5)).abs() < 1e-5);
        assert!(out[0] > 0.7);
    }

    #[test]
    fn test_size_mismatch_is_rejected() {
        let err = resample(&[0.0; 3], 2, 1, 1, 1, &params(2, ResampleFilter::Box, EdgeMode::Clamp)).unwrap_err();
        assert!(matches!(err, TextureError::InvalidData(_)));
    }
}
