//! BC6H HDR blocks
//!
//! Fourteen modes share one data driven header description: each mode lists
//! the header bit segments in stream order, and both the encoder and the
//! decoder walk the same list. Two-region modes use the first 32 BC7
//! two-subset shapes and 3-bit indices; one-region modes use 4-bit indices.

use std::sync::atomic::{AtomicU32, Ordering};

use half::f16;
use hork_texture_core::{Result, TextureError};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::bc7::{WEIGHTS_3, WEIGHTS_4};
use super::fit;
use super::partition::{ANCHOR_2, subset_of};

/// Worker count used when the caller has no preference
pub const BC6H_DEFAULT_WORKERS: usize = 16;

/// Shapes available to two-region modes
const SHAPES: usize = 32;

/// Largest finite half float
const HALF_MAX: f32 = 65504.0;

/// Header fields: shape index plus endpoint `w`, `x`, `y`, `z` per channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Field {
    D,
    RW,
    RX,
    RY,
    RZ,
    GW,
    GX,
    GY,
    GZ,
    BW,
    BX,
    BY,
    BZ,
}

use Field::*;

impl Field {
    /// Endpoint slot and channel, `None` for the shape index
    fn slot(self) -> Option<(usize, usize)> {
        match self {
            D => None,
            RW => Some((0, 0)),
            RX => Some((1, 0)),
            RY => Some((2, 0)),
            RZ => Some((3, 0)),
            GW => Some((0, 1)),
            GX => Some((1, 1)),
            GY => Some((2, 1)),
            GZ => Some((3, 1)),
            BW => Some((0, 2)),
            BX => Some((1, 2)),
            BY => Some((2, 2)),
            BZ => Some((3, 2)),
        }
    }
}

/// Bits `start` through `end` of a field, walked from `start` toward `end`
#[derive(Debug, Clone, Copy)]
struct Segment {
    field: Field,
    start: u8,
    end: u8,
}

impl Segment {
    fn bits(&self) -> impl Iterator<Item = u32> {
        let (start, end) = (self.start as u32, self.end as u32);
        let ascending = start <= end;
        let len = start.abs_diff(end) + 1;
        (0..len).map(move |i| if ascending { start + i } else { start - i })
    }
}

const fn s(field: Field, start: u8, end: u8) -> Segment {
    Segment { field, start, end }
}

const LAYOUT_1: &[Segment] = &[
    s(GY, 4, 4), s(BY, 4, 4), s(BZ, 4, 4), s(RW, 0, 9), s(GW, 0, 9), s(BW, 0, 9), s(RX, 0, 4),
    s(GZ, 4, 4), s(GY, 0, 3), s(GX, 0, 4), s(BZ, 0, 0), s(GZ, 0, 3), s(BX, 0, 4), s(BZ, 1, 1),
    s(BY, 0, 3), s(RY, 0, 4), s(BZ, 2, 2), s(RZ, 0, 4), s(BZ, 3, 3), s(D, 0, 4),
];
const LAYOUT_2: &[Segment] = &[
    s(GY, 5, 5), s(GZ, 4, 4), s(GZ, 5, 5), s(RW, 0, 6), s(BZ, 0, 0), s(BZ, 1, 1), s(BY, 4, 4),
    s(GW, 0, 6), s(BY, 5, 5), s(BZ, 2, 2), s(GY, 4, 4), s(BW, 0, 6), s(BZ, 3, 3), s(BZ, 5, 5),
    s(BZ, 4, 4), s(RX, 0, 5), s(GY, 0, 3), s(GX, 0, 5), s(GZ, 0, 3), s(BX, 0, 5), s(BY, 0, 3),
    s(RY, 0, 5), s(RZ, 0, 5), s(D, 0, 4),
];
const LAYOUT_3: &[Segment] = &[
    s(RW, 0, 9), s(GW, 0, 9), s(BW, 0, 9), s(RX, 0, 4), s(RW, 10, 10), s(GY, 0, 3),
    s(GX, 0, 3), s(GW, 10, 10), s(BZ, 0, 0), s(GZ, 0, 3), s(BX, 0, 3), s(BW, 10, 10),
    s(BZ, 1, 1), s(BY, 0, 3), s(RY, 0, 4), s(BZ, 2, 2), s(RZ, 0, 4), s(BZ, 3, 3), s(D, 0, 4),
];
const LAYOUT_4: &[Segment] = &[
    s(RW, 0, 9), s(GW, 0, 9), s(BW, 0, 9), s(RX, 0, 3), s(RW, 10, 10), s(GZ, 4, 4),
    s(GY, 0, 3), s(GX, 0, 4), s(GW, 10, 10), s(GZ, 0, 3), s(BX, 0, 3), s(BW, 10, 10),
    s(BZ, 1, 1), s(BY, 0, 3), s(RY, 0, 3), s(BZ, 0, 0), s(BZ, 2, 2), s(RZ, 0, 3), s(GY, 4, 4),
    s(BZ, 3, 3), s(D, 0, 4),
];
const LAYOUT_5: &[Segment] = &[
    s(RW, 0, 9), s(GW, 0, 9), s(BW, 0, 9), s(RX, 0, 3), s(RW, 10, 10), s(BY, 4, 4),
    s(GY, 0, 3), s(GX, 0, 3), s(GW, 10, 10), s(BZ, 0, 0), s(GZ, 0, 3), s(BX, 0, 4),
    s(BW, 10, 10), s(BY, 0, 3), s(RY, 0, 3), s(BZ, 1, 1), s(BZ, 2, 2), s(RZ, 0, 3),
    s(BZ, 4, 4), s(BZ, 3, 3), s(D, 0, 4),
];
const LAYOUT_6: &[Segment] = &[
    s(RW, 0, 8), s(BY, 4, 4), s(GW, 0, 8), s(GY, 4, 4), s(BW, 0, 8), s(BZ, 4, 4), s(RX, 0, 4),
    s(GZ, 4, 4), s(GY, 0, 3), s(GX, 0, 4), s(BZ, 0, 0), s(GZ, 0, 3), s(BX, 0, 4), s(BZ, 1, 1),
    s(BY, 0, 3), s(RY, 0, 4), s(BZ, 2, 2), s(RZ, 0, 4), s(BZ, 3, 3), s(D, 0, 4),
];
const LAYOUT_7: &[Segment] = &[
    s(RW, 0, 7), s(GZ, 4, 4), s(BY, 4, 4), s(GW, 0, 7), s(BZ, 2, 2), s(GY, 4, 4), s(BW, 0, 7),
    s(BZ, 3, 3), s(BZ, 4, 4), s(RX, 0, 5), s(GY, 0, 3), s(GX, 0, 4), s(BZ, 0, 0), s(GZ, 0, 3),
    s(BX, 0, 4), s(BZ, 1, 1), s(BY, 0, 3), s(RY, 0, 5), s(RZ, 0, 5), s(D, 0, 4),
];
const LAYOUT_8: &[Segment] = &[
    s(RW, 0, 7), s(BZ, 0, 0), s(BY, 4, 4), s(GW, 0, 7), s(GY, 5, 5), s(GY, 4, 4), s(BW, 0, 7),
    s(GZ, 5, 5), s(BZ, 4, 4), s(RX, 0, 4), s(GZ, 4, 4), s(GY, 0, 3), s(GX, 0, 5), s(GZ, 0, 3),
    s(BX, 0, 4), s(BZ, 1, 1), s(BY, 0, 3), s(RY, 0, 4), s(BZ, 2, 2), s(RZ, 0, 4), s(BZ, 3, 3),
    s(D, 0, 4),
];
const LAYOUT_9: &[Segment] = &[
    s(RW, 0, 7), s(BZ, 1, 1), s(BY, 4, 4), s(GW, 0, 7), s(BY, 5, 5), s(GY, 4, 4), s(BW, 0, 7),
    s(BZ, 5, 5), s(BZ, 4, 4), s(RX, 0, 4), s(GZ, 4, 4), s(GY, 0, 3), s(GX, 0, 4), s(BZ, 0, 0),
    s(GZ, 0, 3), s(BX, 0, 5), s(BY, 0, 3), s(RY, 0, 4), s(BZ, 2, 2), s(RZ, 0, 4), s(BZ, 3, 3),
    s(D, 0, 4),
];
const LAYOUT_10: &[Segment] = &[
    s(RW, 0, 5), s(GZ, 4, 4), s(BZ, 0, 0), s(BZ, 1, 1), s(BY, 4, 4), s(GW, 0, 5), s(GY, 5, 5),
    s(BY, 5, 5), s(BZ, 2, 2), s(GY, 4, 4), s(BW, 0, 5), s(GZ, 5, 5), s(BZ, 3, 3), s(BZ, 5, 5),
    s(BZ, 4, 4), s(RX, 0, 5), s(GY, 0, 3), s(GX, 0, 5), s(GZ, 0, 3), s(BX, 0, 5), s(BY, 0, 3),
    s(RY, 0, 5), s(RZ, 0, 5), s(D, 0, 4),
];
const LAYOUT_11: &[Segment] = &[
    s(RW, 0, 9), s(GW, 0, 9), s(BW, 0, 9), s(RX, 0, 9), s(GX, 0, 9), s(BX, 0, 9),
];
const LAYOUT_12: &[Segment] = &[
    s(RW, 0, 9), s(GW, 0, 9), s(BW, 0, 9), s(RX, 0, 8), s(RW, 10, 10), s(GX, 0, 8),
    s(GW, 10, 10), s(BX, 0, 8), s(BW, 10, 10),
];
const LAYOUT_13: &[Segment] = &[
    s(RW, 0, 9), s(GW, 0, 9), s(BW, 0, 9), s(RX, 0, 7), s(RW, 11, 10), s(GX, 0, 7),
    s(GW, 11, 10), s(BX, 0, 7), s(BW, 11, 10),
];
const LAYOUT_14: &[Segment] = &[
    s(RW, 0, 9), s(GW, 0, 9), s(BW, 0, 9), s(RX, 0, 3), s(RW, 15, 10), s(GX, 0, 3),
    s(GW, 15, 10), s(BX, 0, 3), s(BW, 15, 10),
];

#[derive(Debug, Clone, Copy)]
struct ModeDesc {
    /// Mode value, read LSB first
    value: u32,
    /// 2 for the first two modes, 5 otherwise
    value_bits: u32,
    two_regions: bool,
    transformed: bool,
    endpoint_bits: u32,
    delta_bits: [u32; 3],
    layout: &'static [Segment],
}

const fn desc(
    value: u32,
    value_bits: u32,
    two_regions: bool,
    transformed: bool,
    endpoint_bits: u32,
    delta_bits: [u32; 3],
    layout: &'static [Segment],
) -> ModeDesc {
    ModeDesc {
        value,
        value_bits,
        two_regions,
        transformed,
        endpoint_bits,
        delta_bits,
        layout,
    }
}

const MODES: [ModeDesc; 14] = [
    desc(0b00, 2, true, true, 10, [5, 5, 5], LAYOUT_1),
    desc(0b01, 2, true, true, 7, [6, 6, 6], LAYOUT_2),
    desc(0b00010, 5, true, true, 11, [5, 4, 4], LAYOUT_3),
    desc(0b00110, 5, true, true, 11, [4, 5, 4], LAYOUT_4),
    desc(0b01010, 5, true, true, 11, [4, 4, 5], LAYOUT_5),
    desc(0b01110, 5, true, true, 9, [5, 5, 5], LAYOUT_6),
    desc(0b10010, 5, true, true, 8, [6, 5, 5], LAYOUT_7),
    desc(0b10110, 5, true, true, 8, [5, 6, 5], LAYOUT_8),
    desc(0b11010, 5, true, true, 8, [5, 5, 6], LAYOUT_9),
    desc(0b11110, 5, true, false, 6, [6, 6, 6], LAYOUT_10),
    desc(0b00011, 5, false, false, 10, [10, 10, 10], LAYOUT_11),
    desc(0b00111, 5, false, true, 11, [9, 9, 9], LAYOUT_12),
    desc(0b01011, 5, false, true, 12, [8, 8, 8], LAYOUT_13),
    desc(0b01111, 5, false, true, 16, [4, 4, 4], LAYOUT_14),
];

#[inline]
fn mask(bits: u32) -> i32 {
    ((1i64 << bits) - 1) as i32
}

#[inline]
fn sign_extend(value: i32, bits: u32) -> i32 {
    let shift = 32 - bits;
    (value << shift) >> shift
}

/// Endpoint value before interpolation
fn unquantize(value: i32, bits: u32, signed: bool) -> i32 {
    if !signed {
        if bits >= 15 || value == 0 {
            value
        } else if value == mask(bits) {
            0xFFFF
        } else {
            ((value << 16) + 0x8000) >> bits
        }
    } else {
        if bits >= 16 {
            return value;
        }
        let magnitude = value.abs();
        let unq = if magnitude == 0 {
            0
        } else if magnitude >= mask(bits - 1) {
            0x7FFF
        } else {
            ((magnitude << 15) + 0x4000) >> (bits - 1)
        };
        if value < 0 { -unq } else { unq }
    }
}

/// Scale an interpolated value to half float range, as a signed magnitude
#[inline]
fn finish_unquantize(value: i32, signed: bool) -> i32 {
    if !signed {
        (value * 31) >> 6
    } else if value < 0 {
        -(((-value) * 31) >> 5)
    } else {
        (value * 31) >> 5
    }
}

#[inline]
fn half_from_int(value: i32) -> f16 {
    if value < 0 {
        f16::from_bits(0x8000 | (-value) as u16)
    } else {
        f16::from_bits(value as u16)
    }
}

#[inline]
fn interpolate(a: i32, b: i32, weight: u32) -> i32 {
    let w = weight as i32;
    (a * (64 - w) + b * w + 32) >> 6
}

fn find_mode(bits: u128) -> Option<usize> {
    let low2 = (bits & 0b11) as u32;
    if low2 < 2 {
        return Some(low2 as usize);
    }
    let low5 = (bits & 0b11111) as u32;
    MODES.iter().position(|m| m.value_bits == 5 && m.value == low5)
}

fn index_bits(mode: &ModeDesc) -> u32 {
    if mode.two_regions { 3 } else { 4 }
}

fn is_anchor(mode: &ModeDesc, shape: usize, texel: usize) -> bool {
    texel == 0 || (mode.two_regions && texel == ANCHOR_2[shape] as usize)
}

fn region_of(mode: &ModeDesc, shape: usize, texel: usize) -> usize {
    if mode.two_regions { subset_of(2, shape, texel) } else { 0 }
}

/// Interpolated half float values of a region, as signed magnitudes
fn palette(a: &[i32; 3], b: &[i32; 3], mode: &ModeDesc, signed: bool) -> ([[i32; 3]; 16], usize) {
    let weights: &[u32] = if mode.two_regions { &WEIGHTS_3 } else { &WEIGHTS_4 };
    let mut pal = [[0i32; 3]; 16];
    for (entry, &w) in pal.iter_mut().zip(weights) {
        for c in 0..3 {
            entry[c] = finish_unquantize(interpolate(a[c], b[c], w), signed);
        }
    }
    (pal, weights.len())
}


/// Sign and delta decode the stored endpoint fields
fn resolve_endpoints(raw: &[[i32; 3]; 4], mode: &ModeDesc, signed: bool) -> [[i32; 3]; 4] {
    let slots = if mode.two_regions { 4 } else { 2 };
    let epb = mode.endpoint_bits;
    let mut out = [[0i32; 3]; 4];
    for c in 0..3 {
        let base = if signed { sign_extend(raw[0][c], epb) } else { raw[0][c] };
        out[0][c] = base;
        for slot in 1..slots {
            out[slot][c] = if mode.transformed {
                let delta = sign_extend(raw[slot][c], mode.delta_bits[c]);
                let value = (base + delta) & mask(epb);
                if signed { sign_extend(value, epb) } else { value }
            } else if signed {
                sign_extend(raw[slot][c], epb)
            } else {
                raw[slot][c]
            };
        }
    }
    out
}

/// Per region palettes for quantized endpoints
fn region_palettes(endpoints: &[[i32; 3]; 4], mode: &ModeDesc, signed: bool) -> [[[i32; 3]; 16]; 2] {
    let unq = endpoints.map(|e| e.map(|v| unquantize(v, mode.endpoint_bits, signed)));
    let mut palettes = [[[0i32; 3]; 16]; 2];
    palettes[0] = palette(&unq[0], &unq[1], mode, signed).0;
    if mode.two_regions {
        palettes[1] = palette(&unq[2], &unq[3], mode, signed).0;
    }
    palettes
}

/// Decode a BC6H block into 16 RGB texels
///
/// Reserved modes decode to zero.
pub fn decode_block(block: &[u8; 16], signed: bool) -> [[f32; 3]; 16] {
    let bits = u128::from_le_bytes(*block);
    let Some(mode_index) = find_mode(bits) else {
        return [[0.0; 3]; 16];
    };
    let mode = &MODES[mode_index];

    let mut pos = mode.value_bits;
    let mut raw = [[0i32; 3]; 4];
    let mut shape = 0usize;
    for segment in mode.layout {
        for bit in segment.bits() {
            let value = ((bits >> pos) & 1) as i32;
            pos += 1;
            match segment.field.slot() {
                Some((slot, c)) => raw[slot][c] |= value << bit,
                None => shape |= (value as usize) << bit,
            }
        }
    }

    let endpoints = resolve_endpoints(&raw, mode, signed);
    let palettes = region_palettes(&endpoints, mode, signed);
    let ib = index_bits(mode);

    let mut texels = [[0.0f32; 3]; 16];
    for (i, texel) in texels.iter_mut().enumerate() {
        let count = ib - is_anchor(mode, shape, i) as u32;
        let index = ((bits >> pos) as u32 & ((1 << count) - 1)) as usize;
        pos += count;
        let entry = palettes[region_of(mode, shape, i)][index];
        *texel = entry.map(|v| half_from_int(v).to_f32());
    }
    texels
}

/// Half float bit pattern of a texel channel as a signed magnitude
fn half_int(value: f32, signed: bool) -> i32 {
    let value = if value.is_nan() {
        0.0
    } else if signed {
        value.clamp(-HALF_MAX, HALF_MAX)
    } else {
        value.clamp(0.0, HALF_MAX)
    };
    let bits = f16::from_f32(value).to_bits();
    if bits & 0x8000 != 0 {
        -((bits & 0x7FFF) as i32)
    } else {
        bits as i32
    }
}

/// Map a half float magnitude back to interpolation space
fn unfinish(value: i32, signed: bool) -> f32 {
    if signed {
        value as f32 * 32.0 / 31.0
    } else {
        value as f32 * 64.0 / 31.0
    }
}

/// Nearest endpoint value whose unquantized form is closest to `value`
fn quantize(value: f32, bits: u32, signed: bool) -> i32 {
    let (lo, hi, scale) = if signed {
        let hi = mask(bits - 1);
        (-hi, hi, hi as f32 / 32767.0)
    } else {
        let hi = mask(bits);
        (0, hi, hi as f32 / 65535.0)
    };
    let estimate = ((value * scale).round() as i32).clamp(lo, hi);

    let mut best = (estimate, f32::MAX);
    for q in (estimate - 1)..=(estimate + 1) {
        let q = q.clamp(lo, hi);
        let d = (unquantize(q, bits, signed) as f32 - value).abs();
        if d < best.1 {
            best = (q, d);
        }
    }
    best.0
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    mode: usize,
    shape: usize,
    endpoints: [[i32; 3]; 4],
    indices: [u8; 16],
    error: u64,
}

fn assign_indices(
    targets: &[[i32; 3]; 16],
    endpoints: &[[i32; 3]; 4],
    mode: &ModeDesc,
    shape: usize,
    signed: bool,
    indices: &mut [u8; 16],
) -> u64 {
    let palettes = region_palettes(endpoints, mode, signed);
    let count = 1usize << index_bits(mode);
    let mut error = 0u64;
    for (i, target) in targets.iter().enumerate() {
        let pal = &palettes[region_of(mode, shape, i)][..count];
        let mut best = (0usize, u64::MAX);
        for (idx, entry) in pal.iter().enumerate() {
            let d: u64 = (0..3)
                .map(|c| {
                    let d = (entry[c] - target[c]) as i64;
                    (d * d) as u64
                })
                .sum();
            if d < best.1 {
                best = (idx, d);
            }
        }
        indices[i] = best.0 as u8;
        error += best.1;
    }
    error
}

fn deltas_fit(endpoints: &[[i32; 3]; 4], mode: &ModeDesc) -> bool {
    let slots = if mode.two_regions { 4 } else { 2 };
    (0..3).all(|c| {
        let bits = mode.delta_bits[c];
        let lo = -(1i32 << (bits - 1));
        let hi = (1i32 << (bits - 1)) - 1;
        (1..slots).all(|slot| {
            let d = endpoints[slot][c] - endpoints[0][c];
            (lo..=hi).contains(&d)
        })
    })
}

fn encode_mode(
    targets: &[[i32; 3]; 16],
    points: &[[f32; 3]; 16],
    mode_index: usize,
    shape: usize,
    signed: bool,
) -> Option<Candidate> {
    let mode = &MODES[mode_index];
    let regions = if mode.two_regions { 2 } else { 1 };

    let mut endpoints = [[0i32; 3]; 4];
    for region in 0..regions {
        let mut members = [[0.0f32; 3]; 16];
        let mut count = 0;
        for (i, p) in points.iter().enumerate() {
            if region_of(mode, shape, i) == region {
                members[count] = *p;
                count += 1;
            }
        }
        let members = &members[..count];
        let mean = fit::mean(members);
        let axis = fit::principal_axis(members, &mean);
        let (a, b) = fit::line_endpoints(members, &mean, &axis);
        endpoints[region * 2] = a.map(|v| quantize(v, mode.endpoint_bits, signed));
        endpoints[region * 2 + 1] = b.map(|v| quantize(v, mode.endpoint_bits, signed));
    }

    let mut indices = [0u8; 16];
    let error = assign_indices(targets, &endpoints, mode, shape, signed, &mut indices);

    // Anchor texels must have their index high bit clear
    let ib = index_bits(mode);
    let half = 1u8 << (ib - 1);
    let max = (1u8 << ib) - 1;
    for region in 0..regions {
        let anchor = if region == 0 { 0 } else { ANCHOR_2[shape] as usize };
        if indices[anchor] >= half {
            endpoints.swap(region * 2, region * 2 + 1);
            for (i, index) in indices.iter_mut().enumerate() {
                if region_of(mode, shape, i) == region {
                    *index = max - *index;
                }
            }
        }
    }

    if mode.transformed && !deltas_fit(&endpoints, mode) {
        return None;
    }

    Some(Candidate {
        mode: mode_index,
        shape,
        endpoints,
        indices,
        error,
    })
}

fn emit(candidate: &Candidate) -> [u8; 16] {
    let mode = &MODES[candidate.mode];
    let epb = mode.endpoint_bits;

    let mut stored = [[0i32; 3]; 4];
    for c in 0..3 {
        let base = candidate.endpoints[0][c];
        stored[0][c] = base & mask(epb);
        for slot in 1..4 {
            let v = candidate.endpoints[slot][c];
            stored[slot][c] = if mode.transformed {
                (v - base) & mask(mode.delta_bits[c])
            } else {
                v & mask(epb)
            };
        }
    }

    let mut bits = mode.value as u128;
    let mut pos = mode.value_bits;
    for segment in mode.layout {
        for bit in segment.bits() {
            let value = match segment.field.slot() {
                Some((slot, c)) => (stored[slot][c] >> bit) & 1,
                None => (candidate.shape as i32 >> bit) & 1,
            };
            bits |= (value as u128) << pos;
            pos += 1;
        }
    }

    let ib = index_bits(mode);
    for (i, &index) in candidate.indices.iter().enumerate() {
        let count = ib - is_anchor(mode, candidate.shape, i) as u32;
        bits |= (index as u128) << pos;
        pos += count;
    }
    debug_assert_eq!(pos, 128);
    bits.to_le_bytes()
}

/// Shape whose two regions are best described by one line each
fn best_shape(points: &[[f32; 3]; 16]) -> usize {
    let mut best = (0usize, f32::MAX);
    for shape in 0..SHAPES {
        let mut residual = 0.0;
        for region in 0..2 {
            let mut members = [[0.0f32; 3]; 16];
            let mut count = 0;
            for (i, p) in points.iter().enumerate() {
                if subset_of(2, shape, i) == region {
                    members[count] = *p;
                    count += 1;
                }
            }
            residual += fit::line_residual(&members[..count]);
        }
        if residual < best.1 {
            best = (shape, residual);
        }
    }
    best.0
}

/// Encode 16 RGB texels (row major) into a BC6H block
pub fn encode_block(texels: &[[f32; 3]; 16], signed: bool) -> [u8; 16] {
    let targets = texels.map(|t| t.map(|v| half_int(v, signed)));
    let points = targets.map(|t| t.map(|h| unfinish(h, signed)));

    let mut best: Option<Candidate> = None;
    let consider = |candidate: Option<Candidate>, best: &mut Option<Candidate>| {
        if let Some(c) = candidate
            && best.is_none_or(|b| c.error < b.error)
        {
            *best = Some(c);
        }
    };

    for mode_index in 10..14 {
        consider(encode_mode(&targets, &points, mode_index, 0, signed), &mut best);
    }
    if best.is_none_or(|b| b.error > 0) {
        let shape = best_shape(&points);
        for mode_index in 0..10 {
            consider(encode_mode(&targets, &points, mode_index, shape, signed), &mut best);
        }
    }

    match best {
        Some(candidate) => emit(&candidate),
        None => [0; 16],
    }
}

/// BC6H image compression settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bc6hSettings {
    /// Compress as BC6H_SFLOAT instead of BC6H_UFLOAT
    pub signed: bool,
    /// Number of contiguous block spans compressed in parallel
    pub workers: usize,
}

impl Default for Bc6hSettings {
    fn default() -> Self {
        Self {
            signed: false,
            workers: BC6H_DEFAULT_WORKERS,
        }
    }
}

fn gather(src: &[u8], stride: usize, block_x: usize, block_y: usize) -> [[f32; 3]; 16] {
    std::array::from_fn(|i| {
        let x = block_x * 4 + i % 4;
        let y = block_y * 4 + i / 4;
        let offset = y * stride + x * 16;
        std::array::from_fn(|c| {
            let o = offset + c * 4;
            f32::from_le_bytes([src[o], src[o + 1], src[o + 2], src[o + 3]])
        })
    })
}

/// Compress an RGBA32_FLOAT image into BC6H blocks
///
/// The block grid is split into `settings.workers` contiguous spans, each
/// compressed on its own scoped thread into a disjoint part of `dst`. The
/// output does not depend on the worker count. `progress`, when given, is
/// incremented once per finished block.
pub fn compress_image(
    src: &[u8],
    stride: usize,
    width: u32,
    height: u32,
    dst: &mut [u8],
    settings: &Bc6hSettings,
    progress: Option<&AtomicU32>,
) -> Result<()> {
    if width % 4 != 0 || height % 4 != 0 {
        return Err(TextureError::invalid_dimensions(
            width,
            height,
            1,
            "BC6H compression requires multiples of 4",
        ));
    }
    let blocks_x = (width / 4) as usize;
    let blocks_y = (height / 4) as usize;
    let total = blocks_x * blocks_y;
    if total == 0 {
        return Ok(());
    }

    let required_src = stride * (height as usize - 1) + width as usize * 16;
    if src.len() < required_src {
        return Err(TextureError::buffer_too_small(required_src, src.len()));
    }
    if dst.len() < total * 16 {
        return Err(TextureError::buffer_too_small(total * 16, dst.len()));
    }

    let workers = settings.workers.clamp(1, total);
    let span = total.div_ceil(workers);
    let signed = settings.signed;

    std::thread::scope(|scope| {
        for (worker, chunk) in dst[..total * 16].chunks_mut(span * 16).enumerate() {
            scope.spawn(move || {
                let first = worker * span;
                for (k, out) in chunk.chunks_exact_mut(16).enumerate() {
                    let block = first + k;
                    let texels = gather(src, stride, block % blocks_x, block / blocks_x);
                    out.copy_from_slice(&encode_block(&texels, signed));
                    if let Some(counter) = progress {
                        counter.fetch_add(1, Ordering::Relaxed);
                    }
                }
            });
        }
    });

    debug!(
        "BC6H: compressed {}x{} ({} blocks) on {} workers",
        width, height, total, workers
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn max_abs_error(a: &[[f32; 3]; 16], b: &[[f32; 3]; 16]) -> f32 {
        a.iter()
            .zip(b)
            .flat_map(|(x, y)| (0..3).map(move |c| (x[c] - y[c]).abs()))
            .fold(0.0, f32::max)
    }

    #[test]
    fn test_layouts_cover_every_bit_once() {
        for (index, mode) in MODES.iter().enumerate() {
            let mut seen = HashSet::new();
            let mut total = mode.value_bits;
            for segment in mode.layout {
                for bit in segment.bits() {
                    assert!(seen.insert((segment.field, bit)), "mode {} repeats a bit", index + 1);
                    total += 1;
                }
            }
            let expected = if mode.two_regions { 82 } else { 65 };
            assert_eq!(total, expected, "mode {}", index + 1);

            let slots = if mode.two_regions { 4 } else { 2 };
            for field in [RW, GW, BW] {
                for bit in 0..mode.endpoint_bits {
                    assert!(seen.contains(&(field, bit)), "mode {} lacks {:?}[{}]", index + 1, field, bit);
                }
            }
            for (c, fields) in [[RX, RY, RZ], [GX, GY, GZ], [BX, BY, BZ]].iter().enumerate() {
                for field in fields.iter().take(slots - 1) {
                    for bit in 0..mode.delta_bits[c] {
                        assert!(seen.contains(&(*field, bit)));
                    }
                }
            }
        }
    }

    #[test]
    fn test_reserved_mode_decodes_to_zero() {
        let mut block = [0u8; 16];
        block[0] = 0b10011;
        assert_eq!(decode_block(&block, false), [[0.0; 3]; 16]);
    }

    #[test]
    fn test_unquantize_extremes() {
        assert_eq!(unquantize(0, 10, false), 0);
        assert_eq!(unquantize(1023, 10, false), 0xFFFF);
        assert_eq!(unquantize(0xFFFF, 16, false), 0xFFFF);
        assert_eq!(unquantize(511, 10, true), 0x7FFF);
        assert_eq!(unquantize(-511, 10, true), -0x7FFF);
        assert_eq!(finish_unquantize(0xFFFF, false), 0x7BFF);
        assert_eq!(finish_unquantize(-0x7FFF, true), -0x7BFF);
    }

    #[test]
    fn test_uniform_block_unsigned() {
        let texels = [[1.0f32, 0.5, 2.0]; 16];
        let decoded = decode_block(&encode_block(&texels, false), false);
        for texel in decoded {
            assert!((texel[0] - 1.0).abs() < 0.01);
            assert!((texel[1] - 0.5).abs() < 0.005);
            assert!((texel[2] - 2.0).abs() < 0.02);
        }
    }

    #[test]
    fn test_uniform_block_signed() {
        let texels = [[-1.5f32, 0.25, 3.0]; 16];
        let decoded = decode_block(&encode_block(&texels, true), true);
        for texel in decoded {
            assert!((texel[0] + 1.5).abs() < 0.015);
            assert!((texel[1] - 0.25).abs() < 0.005);
            assert!((texel[2] - 3.0).abs() < 0.03);
        }
    }

    #[test]
    fn test_negative_values_clamp_when_unsigned() {
        let texels = [[-4.0f32, f32::NAN, 1.0]; 16];
        let decoded = decode_block(&encode_block(&texels, false), false);
        for texel in decoded {
            assert_eq!(texel[0], 0.0);
            assert_eq!(texel[1], 0.0);
        }
    }

    #[test]
    fn test_gradient_block() {
        let texels: [[f32; 3]; 16] = std::array::from_fn(|i| {
            let t = i as f32 / 16.0;
            [1.0 + t, 1.5, 1.9 - t * 0.5]
        });
        let decoded = decode_block(&encode_block(&texels, false), false);
        assert!(max_abs_error(&texels, &decoded) < 0.06);
    }

    #[test]
    fn test_two_region_block() {
        let texels: [[f32; 3]; 16] = std::array::from_fn(|i| {
            if i % 4 < 2 { [4.0, 0.25, 0.25] } else { [0.25, 0.25, 4.0] }
        });
        let decoded = decode_block(&encode_block(&texels, false), false);
        assert!(max_abs_error(&texels, &decoded) < 0.1);
    }

    #[test]
    fn test_every_mode_round_trips_its_own_encoding() {
        let texels: [[f32; 3]; 16] = std::array::from_fn(|i| {
            let t = i as f32 / 256.0;
            [1.0 + t, 1.1 - t, 1.05 + t * 0.5]
        });
        for signed in [false, true] {
            let targets = texels.map(|t| t.map(|v| half_int(v, signed)));
            let points = targets.map(|t| t.map(|h| unfinish(h, signed)));
            let mut encoded_modes = 0;
            for mode_index in 0..MODES.len() {
                let shape = if MODES[mode_index].two_regions { 13 } else { 0 };
                let Some(candidate) = encode_mode(&targets, &points, mode_index, shape, signed)
                else {
                    continue;
                };
                encoded_modes += 1;
                let block = emit(&candidate);
                assert_eq!(find_mode(u128::from_le_bytes(block)), Some(mode_index));

                let mode = &MODES[mode_index];
                let palettes = region_palettes(&candidate.endpoints, mode, signed);
                let decoded = decode_block(&block, signed);
                for i in 0..16 {
                    let entry = palettes[region_of(mode, shape, i)][candidate.indices[i] as usize];
                    let expected = entry.map(|v| half_from_int(v).to_f32());
                    assert_eq!(decoded[i], expected, "mode {} texel {}", mode_index + 1, i);
                }
            }
            assert!(encoded_modes >= 10);
        }
    }
}
