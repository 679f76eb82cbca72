//! BC1 (DXT1) color blocks
//!
//! An 8 byte block holds two R5G6B5 endpoints and sixteen 2-bit indices.
//! When `color0 > color1` the block interpolates four colors, otherwise it
//! holds three colors plus transparent black at index 3.

use bitflags::bitflags;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use super::fit;

/// Highest BC1 quality level
pub const BC1_MAX_QUALITY: u32 = 18;

/// Quality level used when the caller has no preference
pub const BC1_DEFAULT_QUALITY: u32 = 10;

bitflags! {
    /// BC1 encoder switches
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Bc1Flags: u32 {
        /// Allow opaque blocks to use the 3-color mode when it lowers the error
        const USE_3_COLOR_BLOCKS = 1 << 0;
        /// Texels with alpha below 128 take the transparent index of the
        /// 3-color mode and decode as `[0, 0, 0, 0]`
        ///
        /// Keyed on alpha only: opaque black texels are fitted like any other
        /// color and stay opaque.
        const TRANSPARENT_TO_BLACK = 1 << 1;
    }
}

impl Default for Bc1Flags {
    fn default() -> Self {
        Bc1Flags::USE_3_COLOR_BLOCKS
    }
}

/// Encoder effort for one quality level
#[derive(Debug, Clone, Copy)]
struct QualityLevel {
    use_pca: bool,
    refine_passes: u32,
    try_three_color: bool,
    perturb_rounds: u32,
}

static QUALITY_LEVELS: Lazy<[QualityLevel; BC1_MAX_QUALITY as usize + 1]> = Lazy::new(|| {
    std::array::from_fn(|level| QualityLevel {
        use_pca: level >= 1,
        refine_passes: match level {
            0 => 0,
            1..=4 => 1,
            5..=9 => 2,
            10..=14 => 3,
            _ => 4,
        },
        try_three_color: level >= 3,
        perturb_rounds: match level {
            0..=11 => 0,
            12..=15 => 1,
            _ => 2,
        },
    })
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    FourColor,
    ThreeColor,
}

impl Mode {
    fn weights(self) -> &'static [f32] {
        match self {
            Mode::FourColor => &[0.0, 1.0, 1.0 / 3.0, 2.0 / 3.0],
            Mode::ThreeColor => &[0.0, 1.0, 0.5],
        }
    }
}

/// Expand a R5G6B5 value to 8 bits per channel
#[inline]
pub(crate) fn expand_565(c: u16) -> [u8; 3] {
    let r = ((c >> 11) & 0x1F) as u8;
    let g = ((c >> 5) & 0x3F) as u8;
    let b = (c & 0x1F) as u8;
    [r << 3 | r >> 2, g << 2 | g >> 4, b << 3 | b >> 2]
}

#[inline]
fn pack_565(color: &[f32; 3]) -> u16 {
    let r = (color[0].clamp(0.0, 255.0) * 31.0 / 255.0 + 0.5) as u16;
    let g = (color[1].clamp(0.0, 255.0) * 63.0 / 255.0 + 0.5) as u16;
    let b = (color[2].clamp(0.0, 255.0) * 31.0 / 255.0 + 0.5) as u16;
    r << 11 | g << 5 | b
}

/// Decoded palette of a color block
fn palette(c0: u16, c1: u16, mode: Mode) -> [[u8; 4]; 4] {
    let a = expand_565(c0);
    let b = expand_565(c1);
    let mix = |wa: u16, wb: u16, div: u16| -> [u8; 4] {
        let c = |i: usize| ((wa * a[i] as u16 + wb * b[i] as u16 + div / 2) / div) as u8;
        [c(0), c(1), c(2), 255]
    };
    match mode {
        Mode::FourColor => [
            [a[0], a[1], a[2], 255],
            [b[0], b[1], b[2], 255],
            mix(2, 1, 3),
            mix(1, 2, 3),
        ],
        Mode::ThreeColor => [
            [a[0], a[1], a[2], 255],
            [b[0], b[1], b[2], 255],
            mix(1, 1, 2),
            [0, 0, 0, 0],
        ],
    }
}

#[inline]
fn color_distance(a: &[u8; 4], b: &[u8; 4]) -> u32 {
    (0..3)
        .map(|c| {
            let d = a[c] as i32 - b[c] as i32;
            (d * d) as u32
        })
        .sum()
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    mode: Mode,
    c0: u16,
    c1: u16,
    indices: [u8; 16],
    error: u32,
}

/// Pick the nearest palette entry for every active texel
fn evaluate(pixels: &[[u8; 4]; 16], active: &[bool; 16], c0: u16, c1: u16, mode: Mode) -> Candidate {
    let pal = palette(c0, c1, mode);
    let usable = mode.weights().len();
    let mut indices = [0u8; 16];
    let mut error = 0;
    for i in 0..16 {
        if !active[i] {
            indices[i] = 3;
            continue;
        }
        let (best, dist) = pal[..usable]
            .iter()
            .enumerate()
            .map(|(idx, p)| (idx, color_distance(p, &pixels[i])))
            .min_by_key(|&(_, d)| d)
            .unwrap_or((0, 0));
        indices[i] = best as u8;
        error += dist;
    }
    Candidate {
        mode,
        c0,
        c1,
        indices,
        error,
    }
}

fn fit_mode(pixels: &[[u8; 4]; 16], active: &[bool; 16], mode: Mode, level: &QualityLevel) -> Candidate {
    let mut points = [[0.0f32; 3]; 16];
    let mut count = 0;
    for i in 0..16 {
        if active[i] {
            points[count] = [pixels[i][0] as f32, pixels[i][1] as f32, pixels[i][2] as f32];
            count += 1;
        }
    }
    let points = &points[..count];

    let (lo, hi) = if level.use_pca {
        let mean = fit::mean(points);
        let axis = fit::principal_axis(points, &mean);
        fit::line_endpoints(points, &mean, &axis)
    } else {
        let (lo, hi) = fit::bounding_box(points);
        let inset: [f32; 3] = std::array::from_fn(|c| (hi[c] - lo[c]) / 16.0);
        (
            std::array::from_fn(|c| lo[c] + inset[c]),
            std::array::from_fn(|c| hi[c] - inset[c]),
        )
    };

    let mut best = evaluate(pixels, active, pack_565(&hi), pack_565(&lo), mode);

    let weights = mode.weights();
    for _ in 0..level.refine_passes {
        let mut w = [0.0f32; 16];
        let mut n = 0;
        for i in 0..16 {
            if active[i] {
                w[n] = weights[best.indices[i] as usize];
                n += 1;
            }
        }
        let Some((a, b)) = fit::least_squares_endpoints(points, &w[..n]) else {
            break;
        };
        let candidate = evaluate(pixels, active, pack_565(&a), pack_565(&b), mode);
        if candidate.error >= best.error {
            break;
        }
        best = candidate;
    }

    for _ in 0..level.perturb_rounds {
        let mut improved = false;
        for endpoint in 0..2 {
            for (shift, mask) in [(11u16, 0x1Fu16), (5, 0x3F), (0, 0x1F)] {
                for delta in [-1i32, 1] {
                    let base = if endpoint == 0 { best.c0 } else { best.c1 };
                    let field = ((base >> shift) & mask) as i32 + delta;
                    if field < 0 || field > mask as i32 {
                        continue;
                    }
                    let value = (base & !(mask << shift)) | (field as u16) << shift;
                    let (c0, c1) = if endpoint == 0 { (value, best.c1) } else { (best.c0, value) };
                    let candidate = evaluate(pixels, active, c0, c1, mode);
                    if candidate.error < best.error {
                        best = candidate;
                        improved = true;
                    }
                }
            }
        }
        if !improved {
            break;
        }
    }

    best
}

/// Order endpoints the way the decoder expects for the chosen mode
fn emit(candidate: Candidate) -> [u8; 8] {
    let Candidate {
        mode,
        mut c0,
        mut c1,
        mut indices,
        ..
    } = candidate;

    match mode {
        Mode::FourColor => {
            if c0 < c1 {
                std::mem::swap(&mut c0, &mut c1);
                indices.iter_mut().for_each(|i| *i ^= 1);
            } else if c0 == c1 {
                indices = [0; 16];
            }
        }
        Mode::ThreeColor => {
            if c0 > c1 {
                std::mem::swap(&mut c0, &mut c1);
                indices.iter_mut().filter(|i| **i < 2).for_each(|i| *i ^= 1);
            }
        }
    }

    let bits = indices
        .iter()
        .enumerate()
        .fold(0u32, |acc, (i, &idx)| acc | (idx as u32) << (i * 2));

    let mut block = [0u8; 8];
    block[0..2].copy_from_slice(&c0.to_le_bytes());
    block[2..4].copy_from_slice(&c1.to_le_bytes());
    block[4..8].copy_from_slice(&bits.to_le_bytes());
    block
}

/// Encode 16 RGBA texels (row major) into a BC1 block
pub fn encode_block(pixels: &[[u8; 4]; 16], quality: u32, flags: Bc1Flags) -> [u8; 8] {
    let level = &QUALITY_LEVELS[quality.min(BC1_MAX_QUALITY) as usize];

    let mut active = [true; 16];
    if flags.contains(Bc1Flags::TRANSPARENT_TO_BLACK) {
        for (a, p) in active.iter_mut().zip(pixels) {
            *a = p[3] >= 128;
        }
    }

    if !active.iter().any(|&a| a) {
        // Fully transparent, 3-color mode with every index at 3
        return [0, 0, 0, 0, 0xFF, 0xFF, 0xFF, 0xFF];
    }

    if active.iter().any(|&a| !a) {
        return emit(fit_mode(pixels, &active, Mode::ThreeColor, level));
    }

    let mut best = fit_mode(pixels, &active, Mode::FourColor, level);
    if flags.contains(Bc1Flags::USE_3_COLOR_BLOCKS) && level.try_three_color && best.error > 0 {
        let three = fit_mode(pixels, &active, Mode::ThreeColor, level);
        if three.error < best.error {
            best = three;
        }
    }
    emit(best)
}

/// Encode the color half of a BC2/BC3 block, which always decodes as four colors
pub(crate) fn encode_color_block(pixels: &[[u8; 4]; 16], quality: u32) -> [u8; 8] {
    let level = &QUALITY_LEVELS[quality.min(BC1_MAX_QUALITY) as usize];
    emit(fit_mode(pixels, &[true; 16], Mode::FourColor, level))
}

fn decode_with_mode(block: &[u8; 8], force_four_color: bool) -> [[u8; 4]; 16] {
    let c0 = u16::from_le_bytes([block[0], block[1]]);
    let c1 = u16::from_le_bytes([block[2], block[3]]);
    let mode = if force_four_color || c0 > c1 {
        Mode::FourColor
    } else {
        Mode::ThreeColor
    };
    let pal = palette(c0, c1, mode);
    let bits = u32::from_le_bytes([block[4], block[5], block[6], block[7]]);

    let mut pixels = [[0u8; 4]; 16];
    for (i, pixel) in pixels.iter_mut().enumerate() {
        *pixel = pal[((bits >> (i * 2)) & 0b11) as usize];
    }
    pixels
}

/// Decode a BC1 block into 16 RGBA texels
pub fn decode_block(block: &[u8; 8]) -> [[u8; 4]; 16] {
    decode_with_mode(block, false)
}

/// Decode the color half of a BC2/BC3 block
pub(crate) fn decode_color_block(block: &[u8; 8]) -> [[u8; 4]; 16] {
    decode_with_mode(block, true)
}
