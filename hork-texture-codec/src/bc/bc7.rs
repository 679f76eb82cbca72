//! BC7 blocks
//!
//! The decoder handles all eight modes. The encoder searches mode 6 at every
//! uber level and, from level 1 up, the best ranked two-subset partitions in
//! modes 1 and 3 (opaque blocks) or mode 7 (blocks with alpha).

use once_cell::sync::Lazy;

use super::fit;
use super::partition::{ANCHOR_2, ANCHOR_3_SECOND, ANCHOR_3_THIRD, subset_of};

/// Highest BC7 uber level
pub const BC7_MAX_UBER_LEVEL: u32 = 4;

/// Uber level used when the caller has no preference
pub const BC7_DEFAULT_UBER_LEVEL: u32 = 2;

#[derive(Debug, Clone, Copy)]
struct ModeInfo {
    subsets: usize,
    partition_bits: u32,
    rotation_bits: u32,
    index_selection_bits: u32,
    color_bits: u32,
    alpha_bits: u32,
    endpoint_pbits: bool,
    shared_pbits: bool,
    index_bits: u32,
    index2_bits: u32,
}

const fn mode(
    subsets: usize,
    partition_bits: u32,
    rotation_bits: u32,
    index_selection_bits: u32,
    color_bits: u32,
    alpha_bits: u32,
    endpoint_pbits: bool,
    shared_pbits: bool,
    index_bits: u32,
    index2_bits: u32,
) -> ModeInfo {
    ModeInfo {
        subsets,
        partition_bits,
        rotation_bits,
        index_selection_bits,
        color_bits,
        alpha_bits,
        endpoint_pbits,
        shared_pbits,
        index_bits,
        index2_bits,
    }
}

const MODES: [ModeInfo; 8] = [
    mode(3, 4, 0, 0, 4, 0, true, false, 3, 0),
    mode(2, 6, 0, 0, 6, 0, false, true, 3, 0),
    mode(3, 6, 0, 0, 5, 0, false, false, 2, 0),
    mode(2, 6, 0, 0, 7, 0, true, false, 2, 0),
    mode(1, 0, 2, 1, 5, 6, false, false, 2, 3),
    mode(1, 0, 2, 0, 7, 8, false, false, 2, 2),
    mode(1, 0, 0, 0, 7, 7, true, false, 4, 0),
    mode(2, 6, 0, 0, 5, 5, true, false, 2, 0),
];

const WEIGHTS_2: [u32; 4] = [0, 21, 43, 64];
pub(crate) const WEIGHTS_3: [u32; 8] = [0, 9, 18, 27, 37, 46, 55, 64];
pub(crate) const WEIGHTS_4: [u32; 16] = [0, 4, 9, 13, 17, 21, 26, 30, 34, 38, 43, 47, 51, 55, 60, 64];

fn weights(bits: u32) -> &'static [u32] {
    match bits {
        2 => &WEIGHTS_2,
        3 => &WEIGHTS_3,
        _ => &WEIGHTS_4,
    }
}

#[inline]
fn interpolate(a: u8, b: u8, weight: u32) -> u8 {
    (((64 - weight) * a as u32 + weight * b as u32 + 32) >> 6) as u8
}

/// Expand an `n` bit value to 8 bits by replicating its high bits
#[inline]
fn expand(value: u32, bits: u32) -> u8 {
    if bits >= 8 {
        return value as u8;
    }
    ((value << (8 - bits)) | (value >> (2 * bits).saturating_sub(8))) as u8
}

fn is_anchor(subsets: usize, partition: usize, pixel: usize) -> bool {
    pixel == 0
        || match subsets {
            2 => pixel == ANCHOR_2[partition] as usize,
            3 => pixel == ANCHOR_3_SECOND[partition] as usize || pixel == ANCHOR_3_THIRD[partition] as usize,
            _ => false,
        }
}

fn anchor_of(subsets: usize, partition: usize, subset: usize) -> usize {
    match (subsets, subset) {
        (_, 0) => 0,
        (2, _) => ANCHOR_2[partition] as usize,
        (_, 1) => ANCHOR_3_SECOND[partition] as usize,
        _ => ANCHOR_3_THIRD[partition] as usize,
    }
}

struct BitReader {
    bits: u128,
    pos: u32,
}

impl BitReader {
    fn read(&mut self, count: u32) -> u32 {
        if count == 0 {
            return 0;
        }
        let value = (self.bits >> self.pos) as u32 & ((1u32 << count) - 1);
        self.pos += count;
        value
    }
}

struct BitWriter {
    bits: u128,
    pos: u32,
}

impl BitWriter {
    fn write(&mut self, value: u32, count: u32) {
        if count == 0 {
            return;
        }
        let masked = value as u128 & ((1u128 << count) - 1);
        self.bits |= masked << self.pos;
        self.pos += count;
    }
}

/// Decode a BC7 block into 16 RGBA texels
///
/// Blocks with the reserved mode decode to transparent black.
pub fn decode_block(block: &[u8; 16]) -> [[u8; 4]; 16] {
    let bits = u128::from_le_bytes(*block);
    let mode_index = (block[0] as u32).trailing_zeros() as usize;
    if mode_index >= MODES.len() {
        return [[0; 4]; 16];
    }
    let info = &MODES[mode_index];
    let mut reader = BitReader {
        bits,
        pos: mode_index as u32 + 1,
    };

    let partition = reader.read(info.partition_bits) as usize;
    let rotation = reader.read(info.rotation_bits);
    let index_selection = reader.read(info.index_selection_bits);

    let mut raw = [[[0u32; 4]; 2]; 3];
    for c in 0..3 {
        for subset in raw.iter_mut().take(info.subsets) {
            for endpoint in subset.iter_mut() {
                endpoint[c] = reader.read(info.color_bits);
            }
        }
    }
    if info.alpha_bits > 0 {
        for subset in raw.iter_mut().take(info.subsets) {
            for endpoint in subset.iter_mut() {
                endpoint[3] = reader.read(info.alpha_bits);
            }
        }
    }

    let mut pbits = [[0u32; 2]; 3];
    if info.endpoint_pbits {
        for subset in pbits.iter_mut().take(info.subsets) {
            subset[0] = reader.read(1);
            subset[1] = reader.read(1);
        }
    } else if info.shared_pbits {
        for subset in pbits.iter_mut().take(info.subsets) {
            let p = reader.read(1);
            *subset = [p, p];
        }
    }
    let has_pbits = info.endpoint_pbits || info.shared_pbits;

    let mut endpoints = [[[0u8; 4]; 2]; 3];
    for s in 0..info.subsets {
        for e in 0..2 {
            for c in 0..4 {
                let bits = if c < 3 { info.color_bits } else { info.alpha_bits };
                endpoints[s][e][c] = if bits == 0 {
                    255
                } else if has_pbits {
                    expand(raw[s][e][c] << 1 | pbits[s][e], bits + 1)
                } else {
                    expand(raw[s][e][c], bits)
                };
            }
        }
    }

    let mut primary = [0u32; 16];
    for (i, index) in primary.iter_mut().enumerate() {
        let anchor = is_anchor(info.subsets, partition, i) as u32;
        *index = reader.read(info.index_bits - anchor);
    }
    let mut secondary = [0u32; 16];
    if info.index2_bits > 0 {
        for (i, index) in secondary.iter_mut().enumerate() {
            *index = reader.read(info.index2_bits - (i == 0) as u32);
        }
    }

    let mut pixels = [[0u8; 4]; 16];
    for (i, pixel) in pixels.iter_mut().enumerate() {
        let subset = subset_of(info.subsets, partition, i);
        let [a, b] = endpoints[subset];
        let (color_index, color_bits, alpha_index, alpha_bits) = if info.index2_bits == 0 {
            (primary[i], info.index_bits, primary[i], info.index_bits)
        } else if index_selection == 0 {
            (primary[i], info.index_bits, secondary[i], info.index2_bits)
        } else {
            (secondary[i], info.index2_bits, primary[i], info.index_bits)
        };
        let cw = weights(color_bits)[color_index as usize];
        let aw = weights(alpha_bits)[alpha_index as usize];
        for c in 0..3 {
            pixel[c] = interpolate(a[c], b[c], cw);
        }
        pixel[3] = interpolate(a[3], b[3], aw);

        match rotation {
            1 => pixel.swap(0, 3),
            2 => pixel.swap(1, 3),
            3 => pixel.swap(2, 3),
            _ => {}
        }
    }
    pixels
}

/// Encoder effort for one uber level
#[derive(Debug, Clone, Copy)]
struct UberLevel {
    partitions_to_try: usize,
    refine_passes: u32,
}

static UBER_LEVELS: Lazy<[UberLevel; BC7_MAX_UBER_LEVEL as usize + 1]> = Lazy::new(|| {
    std::array::from_fn(|level| UberLevel {
        partitions_to_try: match level {
            0 => 0,
            1 => 8,
            2 => 16,
            3 => 32,
            _ => 64,
        },
        refine_passes: match level {
            0 | 1 => 1,
            2 | 3 => 2,
            _ => 3,
        },
    })
});

/// A fully specified candidate encoding
#[derive(Debug, Clone, Copy)]
struct Encoding {
    mode: usize,
    partition: usize,
    raw: [[[u8; 4]; 2]; 3],
    pbits: [[u8; 2]; 3],
    indices: [u8; 16],
    error: u32,
}

/// Quantized endpoint: stored values and their 8-bit expansion
#[derive(Debug, Clone, Copy)]
struct Endpoint {
    raw: [u8; 4],
    value: [u8; 4],
}

fn quantize_endpoint(target: &[f32; 4], info: &ModeInfo, pbit: Option<u32>) -> (Endpoint, u32) {
    let mut raw = [0u8; 4];
    let mut value = [255u8; 4];
    let mut error = 0u32;
    for c in 0..4 {
        let bits = if c < 3 { info.color_bits } else { info.alpha_bits };
        if bits == 0 {
            let d = 255 - target[c].clamp(0.0, 255.0) as i32;
            error += (d * d) as u32;
            continue;
        }
        let total = bits + pbit.is_some() as u32;
        let max_raw = (1i32 << bits) - 1;
        let scaled = target[c].clamp(0.0, 255.0) / 255.0 * ((1u32 << total) - 1) as f32;
        let estimate = match pbit {
            Some(p) => ((scaled - p as f32) / 2.0).round() as i32,
            None => scaled.round() as i32,
        };

        let mut best = (0i32, 0u8, u32::MAX);
        for q in (estimate - 1)..=(estimate + 1) {
            let q = q.clamp(0, max_raw);
            let full = match pbit {
                Some(p) => (q as u32) << 1 | p,
                None => q as u32,
            };
            let expanded = expand(full, total);
            let d = (expanded as f32 - target[c]).abs() as u32;
            let d = d * d;
            if d < best.2 {
                best = (q, expanded, d);
            }
        }
        raw[c] = best.0 as u8;
        value[c] = best.1;
        error += best.2;
    }
    (Endpoint { raw, value }, error)
}

/// Quantize a pair of endpoints, choosing p-bits by endpoint error
fn quantize_pair(a: &[f32; 4], b: &[f32; 4], info: &ModeInfo) -> ([Endpoint; 2], [u8; 2]) {
    if info.endpoint_pbits {
        let pick = |target: &[f32; 4]| -> (Endpoint, u8) {
            // Opaque endpoints need the p-bit set to reach 255
            if info.alpha_bits > 0 && target[3] >= 254.5 {
                return (quantize_endpoint(target, info, Some(1)).0, 1);
            }
            let (e0, err0) = quantize_endpoint(target, info, Some(0));
            let (e1, err1) = quantize_endpoint(target, info, Some(1));
            if err1 < err0 { (e1, 1) } else { (e0, 0) }
        };
        let (ea, pa) = pick(a);
        let (eb, pb) = pick(b);
        ([ea, eb], [pa, pb])
    } else if info.shared_pbits {
        let (a0, ea0) = quantize_endpoint(a, info, Some(0));
        let (b0, eb0) = quantize_endpoint(b, info, Some(0));
        let (a1, ea1) = quantize_endpoint(a, info, Some(1));
        let (b1, eb1) = quantize_endpoint(b, info, Some(1));
        if ea1 + eb1 < ea0 + eb0 {
            ([a1, b1], [1, 1])
        } else {
            ([a0, b0], [0, 0])
        }
    } else {
        let (ea, _) = quantize_endpoint(a, info, None);
        let (eb, _) = quantize_endpoint(b, info, None);
        ([ea, eb], [0, 0])
    }
}

#[inline]
fn pixel_error(a: &[u8; 4], b: &[u8; 4]) -> u32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = *x as i32 - *y as i32;
            (d * d) as u32
        })
        .sum()
}

/// Best index for each texel of one subset, returns the subset error
fn assign_indices(
    pixels: &[[u8; 4]; 16],
    members: &[usize],
    endpoints: &[Endpoint; 2],
    index_bits: u32,
    indices: &mut [u8; 16],
) -> u32 {
    let w = weights(index_bits);
    let mut palette = [[0u8; 4]; 16];
    for (color, &weight) in palette.iter_mut().zip(w) {
        *color = std::array::from_fn(|c| interpolate(endpoints[0].value[c], endpoints[1].value[c], weight));
    }
    let palette = &palette[..w.len()];

    let mut error = 0;
    for &i in members {
        let mut best = (0usize, u32::MAX);
        for (idx, color) in palette.iter().enumerate() {
            let d = pixel_error(color, &pixels[i]);
            if d < best.1 {
                best = (idx, d);
            }
        }
        indices[i] = best.0 as u8;
        error += best.1;
    }
    error
}

/// Fit, quantize and index one subset
fn encode_subset(
    pixels: &[[u8; 4]; 16],
    members: &[usize],
    info: &ModeInfo,
    level: &UberLevel,
    indices: &mut [u8; 16],
) -> ([Endpoint; 2], [u8; 2], u32) {
    let mut points = [[0.0f32; 4]; 16];
    for (n, &i) in members.iter().enumerate() {
        points[n] = pixels[i].map(|v| v as f32);
    }
    let points = &points[..members.len()];

    let mean = fit::mean(points);
    let axis = fit::principal_axis(points, &mean);
    let (a, b) = fit::line_endpoints(points, &mean, &axis);

    let (mut endpoints, mut pbits) = quantize_pair(&a, &b, info);
    let mut error = assign_indices(pixels, members, &endpoints, info.index_bits, indices);

    let w = weights(info.index_bits);
    for _ in 0..level.refine_passes {
        let mut pw = [0.0f32; 16];
        for (n, &i) in members.iter().enumerate() {
            pw[n] = w[indices[i] as usize] as f32 / 64.0;
        }
        let Some((a, b)) = fit::least_squares_endpoints(points, &pw[..members.len()]) else {
            break;
        };
        let (candidate, candidate_pbits) = quantize_pair(&a, &b, info);
        let mut candidate_indices = *indices;
        let candidate_error =
            assign_indices(pixels, members, &candidate, info.index_bits, &mut candidate_indices);
        if candidate_error >= error {
            break;
        }
        endpoints = candidate;
        pbits = candidate_pbits;
        error = candidate_error;
        *indices = candidate_indices;
    }

    (endpoints, pbits, error)
}

fn encode_mode(pixels: &[[u8; 4]; 16], mode_index: usize, partition: usize, level: &UberLevel) -> Encoding {
    let info = &MODES[mode_index];
    let mut encoding = Encoding {
        mode: mode_index,
        partition,
        raw: [[[0; 4]; 2]; 3],
        pbits: [[0; 2]; 3],
        indices: [0; 16],
        error: 0,
    };

    for subset in 0..info.subsets {
        let mut members = [0usize; 16];
        let mut count = 0;
        for i in 0..16 {
            if subset_of(info.subsets, partition, i) == subset {
                members[count] = i;
                count += 1;
            }
        }
        let members = &members[..count];

        let (mut endpoints, mut pbits, error) =
            encode_subset(pixels, members, info, level, &mut encoding.indices);

        // The anchor texel must have its index high bit clear
        let half = 1u8 << (info.index_bits - 1);
        let anchor = anchor_of(info.subsets, partition, subset);
        if encoding.indices[anchor] >= half {
            endpoints.swap(0, 1);
            pbits.swap(0, 1);
            let max = (1u8 << info.index_bits) - 1;
            for &i in members {
                encoding.indices[i] = max - encoding.indices[i];
            }
        }

        encoding.raw[subset] = [endpoints[0].raw, endpoints[1].raw];
        encoding.pbits[subset] = pbits;
        encoding.error += error;
    }
    encoding
}

fn emit(encoding: &Encoding) -> [u8; 16] {
    let info = &MODES[encoding.mode];
    let mut writer = BitWriter { bits: 0, pos: 0 };

    writer.write(1 << encoding.mode, encoding.mode as u32 + 1);
    writer.write(encoding.partition as u32, info.partition_bits);
    writer.write(0, info.rotation_bits);
    writer.write(0, info.index_selection_bits);

    for c in 0..3 {
        for subset in encoding.raw.iter().take(info.subsets) {
            for endpoint in subset {
                writer.write(endpoint[c] as u32, info.color_bits);
            }
        }
    }
    if info.alpha_bits > 0 {
        for subset in encoding.raw.iter().take(info.subsets) {
            for endpoint in subset {
                writer.write(endpoint[3] as u32, info.alpha_bits);
            }
        }
    }
    if info.endpoint_pbits {
        for subset in encoding.pbits.iter().take(info.subsets) {
            writer.write(subset[0] as u32, 1);
            writer.write(subset[1] as u32, 1);
        }
    } else if info.shared_pbits {
        for subset in encoding.pbits.iter().take(info.subsets) {
            writer.write(subset[0] as u32, 1);
        }
    }

    for (i, &index) in encoding.indices.iter().enumerate() {
        let anchor = is_anchor(info.subsets, encoding.partition, i) as u32;
        writer.write(index as u32, info.index_bits - anchor);
    }
    debug_assert_eq!(writer.pos, 128);
    writer.bits.to_le_bytes()
}

/// Two-subset partitions ordered by how well two lines fit the block
fn rank_partitions(pixels: &[[u8; 4]; 16]) -> [(f32, usize); 64] {
    let mut ranked = [(0.0f32, 0usize); 64];
    for (partition, entry) in ranked.iter_mut().enumerate() {
        let mut residual = 0.0;
        for subset in 0..2 {
            let mut points = [[0.0f32; 4]; 16];
            let mut count = 0;
            for (i, p) in pixels.iter().enumerate() {
                if subset_of(2, partition, i) == subset {
                    points[count] = p.map(|v| v as f32);
                    count += 1;
                }
            }
            residual += fit::line_residual(&points[..count]);
        }
        *entry = (residual, partition);
    }
    ranked.sort_unstable_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    ranked
}

/// Encode 16 RGBA texels (row major) into a BC7 block
pub fn encode_block(pixels: &[[u8; 4]; 16], uber_level: u32) -> [u8; 16] {
    let level = &UBER_LEVELS[uber_level.min(BC7_MAX_UBER_LEVEL) as usize];

    let mut best = encode_mode(pixels, 6, 0, level);
    if best.error == 0 || level.partitions_to_try == 0 {
        return emit(&best);
    }

    let opaque = pixels.iter().all(|p| p[3] == 255);
    let modes: &[usize] = if opaque { &[1, 3] } else { &[7] };
    for &(_, partition) in rank_partitions(pixels).iter().take(level.partitions_to_try) {
        for &mode_index in modes {
            let candidate = encode_mode(pixels, mode_index, partition, level);
            if candidate.error < best.error {
                best = candidate;
            }
        }
    }
    emit(&best)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn total_error(a: &[[u8; 4]; 16], b: &[[u8; 4]; 16]) -> u32 {
        a.iter().zip(b).map(|(x, y)| pixel_error(x, y)).sum()
    }

    fn max_error(a: &[[u8; 4]; 16], b: &[[u8; 4]; 16]) -> u8 {
        a.iter()
            .zip(b)
            .flat_map(|(x, y)| x.iter().zip(y).map(|(p, q)| p.abs_diff(*q)))
            .max()
            .unwrap_or(0)
    }

    fn block_mode(block: &[u8; 16]) -> u32 {
        (block[0] as u32).trailing_zeros()
    }

    #[test]
    fn test_mode_bit_budget() {
        for (index, info) in MODES.iter().enumerate() {
            let endpoint_bits = info.subsets as u32 * 2 * (3 * info.color_bits + info.alpha_bits);
            let pbits = if info.endpoint_pbits {
                info.subsets as u32 * 2
            } else if info.shared_pbits {
                info.subsets as u32
            } else {
                0
            };
            let index_bits = 16 * info.index_bits - info.subsets as u32
                + if info.index2_bits > 0 { 16 * info.index2_bits - 1 } else { 0 };
            let total = index as u32
                + 1
                + info.partition_bits
                + info.rotation_bits
                + info.index_selection_bits
                + endpoint_bits
                + pbits
                + index_bits;
            assert_eq!(total, 128, "mode {}", index);
        }
    }

    #[test]
    fn test_reserved_mode_decodes_to_black() {
        assert_eq!(decode_block(&[0u8; 16]), [[0u8; 4]; 16]);
    }

    #[test]
    fn test_uniform_block_all_levels() {
        let pixels = [[12u8, 250, 99, 180]; 16];
        for level in 0..=BC7_MAX_UBER_LEVEL {
            let block = encode_block(&pixels, level);
            let decoded = decode_block(&block);
            assert!(max_error(&pixels, &decoded) <= 2, "level {}", level);
        }
    }

    #[test]
    fn test_opaque_gradient() {
        let pixels: [[u8; 4]; 16] = std::array::from_fn(|i| {
            let v = (i * 16) as u8;
            [v, 255 - v, v / 2, 255]
        });
        let decoded = decode_block(&encode_block(&pixels, BC7_DEFAULT_UBER_LEVEL));
        assert!(max_error(&pixels, &decoded) <= 6);
        assert!(decoded.iter().all(|p| p[3] == 255));
    }

    #[test]
    fn test_two_region_block_uses_partitions() {
        let pixels: [[u8; 4]; 16] = std::array::from_fn(|i| {
            let (x, y) = (i % 4, i / 4);
            let shade = if y % 2 == 0 { 255 } else { 128 };
            if x < 2 { [shade, 0, 0, 255] } else { [0, shade, 0, 255] }
        });
        let fast = encode_block(&pixels, 0);
        let best = encode_block(&pixels, BC7_MAX_UBER_LEVEL);
        assert_eq!(block_mode(&fast), 6);
        assert!(matches!(block_mode(&best), 1 | 3));

        let fast_error = total_error(&pixels, &decode_block(&fast));
        let best_error = total_error(&pixels, &decode_block(&best));
        assert!(best_error <= fast_error);
        assert!(max_error(&pixels, &decode_block(&best)) <= 4);
    }

    #[test]
    fn test_translucent_block_uses_alpha_modes() {
        let pixels: [[u8; 4]; 16] = std::array::from_fn(|i| {
            let (x, y) = (i % 4, i / 4);
            let shade = if y % 2 == 0 { 240 } else { 60 };
            if x < 2 { [shade, 20, 20, 64] } else { [20, 20, shade, 200] }
        });
        let block = encode_block(&pixels, BC7_MAX_UBER_LEVEL);
        assert!(matches!(block_mode(&block), 6 | 7));
        let decoded = decode_block(&block);
        assert!(max_error(&pixels, &decoded) <= 16);
    }

    #[test]
    fn test_mode_5_rotation_decode() {
        // Hand-built mode 5 block: rotation 1 swaps red and alpha
        let mut writer = BitWriter { bits: 0, pos: 0 };
        writer.write(1 << 5, 6);
        writer.write(1, 2); // rotation
        for value in [127u32, 127, 0, 0, 0, 0] {
            writer.write(value, 7); // r0 r1 g0 g1 b0 b1
        }
        writer.write(64, 8); // a0
        writer.write(64, 8); // a1
        writer.write(0, 31);
        writer.write(0, 31);
        assert_eq!(writer.pos, 128);

        let decoded = decode_block(&writer.bits.to_le_bytes());
        for p in decoded {
            assert_eq!(p, [64, 0, 0, 255]);
        }
    }
}
