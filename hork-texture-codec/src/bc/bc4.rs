//! BC4 single channel blocks
//!
//! Two 8-bit endpoints followed by sixteen 3-bit indices. `e0 > e1` selects
//! six interpolated values, otherwise four plus the constants 0 and 255.

use super::fit;

type Palette = [u8; 8];

fn palette(e0: u8, e1: u8) -> Palette {
    let (a, b) = (e0 as u32, e1 as u32);
    let mut pal = [e0, e1, 0, 0, 0, 0, 0, 0];
    if e0 > e1 {
        for i in 1..7u32 {
            pal[i as usize + 1] = (((7 - i) * a + i * b + 3) / 7) as u8;
        }
    } else {
        for i in 1..5u32 {
            pal[i as usize + 1] = (((5 - i) * a + i * b + 2) / 5) as u8;
        }
        pal[6] = 0;
        pal[7] = 255;
    }
    pal
}

/// Interpolation weight of `e1` for each index
fn weights(six_values: bool) -> [f32; 8] {
    if six_values {
        [0.0, 1.0, 1.0 / 7.0, 2.0 / 7.0, 3.0 / 7.0, 4.0 / 7.0, 5.0 / 7.0, 6.0 / 7.0]
    } else {
        [0.0, 1.0, 0.2, 0.4, 0.6, 0.8, 0.0, 0.0]
    }
}

#[derive(Debug, Clone, Copy)]
struct Fit {
    e0: u8,
    e1: u8,
    indices: [u8; 16],
    error: u32,
}

fn evaluate(values: &[u8; 16], e0: u8, e1: u8) -> Fit {
    let pal = palette(e0, e1);
    let mut indices = [0u8; 16];
    let mut error = 0;
    for (index, &v) in indices.iter_mut().zip(values) {
        let mut best = (0usize, u32::MAX);
        for (i, &p) in pal.iter().enumerate() {
            let d = (p as i32 - v as i32).unsigned_abs();
            if d < best.1 {
                best = (i, d);
            }
        }
        *index = best.0 as u8;
        error += best.1 * best.1;
    }
    Fit {
        e0,
        e1,
        indices,
        error,
    }
}

fn refine(values: &[u8; 16], mut best: Fit) -> Fit {
    let six_values = best.e0 > best.e1;
    let w = weights(six_values);

    // Least squares pass over the texels that use interpolated values
    let mut points = [[0.0f32; 1]; 16];
    let mut pw = [0.0f32; 16];
    let mut n = 0;
    for (i, &v) in values.iter().enumerate() {
        let idx = best.indices[i] as usize;
        if !six_values && idx >= 6 {
            continue;
        }
        points[n] = [v as f32];
        pw[n] = w[idx];
        n += 1;
    }
    if let Some((a, b)) = fit::least_squares_endpoints(&points[..n], &pw[..n]) {
        let e0 = (a[0].clamp(0.0, 255.0) + 0.5) as u8;
        let e1 = (b[0].clamp(0.0, 255.0) + 0.5) as u8;
        if (e0 > e1) == six_values {
            let candidate = evaluate(values, e0, e1);
            if candidate.error < best.error {
                best = candidate;
            }
        }
    }

    // Local search around the current endpoints, keeping the mode
    let (c0, c1) = (best.e0 as i32, best.e1 as i32);
    for d0 in -2..=2 {
        for d1 in -2..=2 {
            let e0 = c0 + d0;
            let e1 = c1 + d1;
            if !(0..=255).contains(&e0) || !(0..=255).contains(&e1) || (e0 > e1) != six_values {
                continue;
            }
            let candidate = evaluate(values, e0 as u8, e1 as u8);
            if candidate.error < best.error {
                best = candidate;
            }
        }
    }
    best
}

fn emit(fit: &Fit) -> [u8; 8] {
    let bits = fit
        .indices
        .iter()
        .enumerate()
        .fold(0u64, |acc, (i, &idx)| acc | (idx as u64) << (i * 3));
    let mut block = [0u8; 8];
    block[0] = fit.e0;
    block[1] = fit.e1;
    block[2..8].copy_from_slice(&bits.to_le_bytes()[..6]);
    block
}

/// Encode 16 texels (row major) into a BC4 block
///
/// `high_quality` also tries the four value mode and refines endpoints.
pub fn encode_block(values: &[u8; 16], high_quality: bool) -> [u8; 8] {
    let min = values.iter().copied().min().unwrap_or(0);
    let max = values.iter().copied().max().unwrap_or(0);
    if min == max {
        return [max, min, 0, 0, 0, 0, 0, 0];
    }

    let mut best = evaluate(values, max, min);
    if !high_quality {
        return emit(&best);
    }

    best = refine(values, best);

    // Four value mode, with 0 and 255 available for free
    let inner = values.iter().copied().filter(|&v| v != 0 && v != 255);
    let lo = inner.clone().min();
    let hi = inner.max();
    if let (Some(lo), Some(hi)) = (lo, hi) {
        let candidate = refine(values, evaluate(values, lo, hi));
        if candidate.error < best.error {
            best = candidate;
        }
    }
    emit(&best)
}

fn index_bits(block: &[u8; 8]) -> u64 {
    u64::from_le_bytes([block[2], block[3], block[4], block[5], block[6], block[7], 0, 0])
}

/// Decode a BC4 UNORM block into 16 texels
pub fn decode_block(block: &[u8; 8]) -> [u8; 16] {
    let pal = palette(block[0], block[1]);
    let bits = index_bits(block);
    std::array::from_fn(|i| pal[((bits >> (i * 3)) & 0b111) as usize])
}

/// Decode a BC4 SNORM block into 16 signed texels
pub fn decode_block_signed(block: &[u8; 8]) -> [i8; 16] {
    let e0 = (block[0] as i8).max(-127) as i32;
    let e1 = (block[1] as i8).max(-127) as i32;
    let div_round = |n: i32, d: i32| -> i32 {
        if n >= 0 { (n + d / 2) / d } else { (n - d / 2) / d }
    };

    let mut pal = [e0, e1, 0, 0, 0, 0, 0, 0];
    if e0 > e1 {
        for i in 1..7 {
            pal[i as usize + 1] = div_round((7 - i) * e0 + i * e1, 7);
        }
    } else {
        for i in 1..5 {
            pal[i as usize + 1] = div_round((5 - i) * e0 + i * e1, 5);
        }
        pal[6] = -127;
        pal[7] = 127;
    }

    let bits = index_bits(block);
    std::array::from_fn(|i| pal[((bits >> (i * 3)) & 0b111) as usize] as i8)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn max_error(a: &[u8; 16], b: &[u8; 16]) -> u8 {
        a.iter().zip(b).map(|(x, y)| x.abs_diff(*y)).max().unwrap_or(0)
    }

    #[test]
    fn test_uniform_block_is_exact() {
        for v in [0u8, 1, 77, 128, 254, 255] {
            let values = [v; 16];
            for hq in [false, true] {
                assert_eq!(decode_block(&encode_block(&values, hq)), values);
            }
        }
    }

    #[test]
    fn test_two_value_block_is_exact() {
        let mut values = [30u8; 16];
        values[3] = 200;
        values[9] = 200;
        let decoded = decode_block(&encode_block(&values, false));
        assert_eq!(decoded, values);
    }

    #[test]
    fn test_gradient_error() {
        let values: [u8; 16] = std::array::from_fn(|i| (i * 17) as u8);
        let fast = decode_block(&encode_block(&values, false));
        let best = decode_block(&encode_block(&values, true));
        assert!(max_error(&values, &fast) <= 20);
        assert!(max_error(&values, &best) <= 26);
    }

    #[test]
    fn test_four_value_mode_keeps_extremes() {
        let mut values = [100u8; 16];
        values[0] = 0;
        values[1] = 255;
        values[2] = 110;
        let decoded = decode_block(&encode_block(&values, true));
        assert_eq!(decoded[0], 0);
        assert_eq!(decoded[1], 255);
        assert!(max_error(&values, &decoded) <= 3);
    }

    #[test]
    fn test_signed_decode() {
        // e0 = 127, e1 = -127, every index 1
        let mut block = [127u8, 0x81, 0, 0, 0, 0, 0, 0];
        let bits: u64 = (0..16).fold(0, |acc, i| acc | 1 << (i * 3));
        block[2..8].copy_from_slice(&bits.to_le_bytes()[..6]);
        assert!(decode_block_signed(&block).iter().all(|&v| v == -127));

        // -128 is clamped to -127
        let block = [0x80u8, 0x80, 0, 0, 0, 0, 0, 0];
        assert!(decode_block_signed(&block).iter().all(|&v| v == -127));
    }
}
