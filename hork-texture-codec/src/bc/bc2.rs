//! BC2 (DXT3) blocks: explicit 4-bit alpha followed by a BC1 color block

use super::bc1;

/// Nearest 4-bit alpha for an 8-bit value
#[inline]
fn quantize_alpha(a: u8) -> u64 {
    ((a as u32 * 15 + 127) / 255) as u64
}

/// Encode 16 RGBA texels into a BC2 block
pub fn encode_block(pixels: &[[u8; 4]; 16], quality: u32) -> [u8; 16] {
    let alpha = pixels
        .iter()
        .enumerate()
        .fold(0u64, |acc, (i, p)| acc | quantize_alpha(p[3]) << (i * 4));

    let mut block = [0u8; 16];
    block[..8].copy_from_slice(&alpha.to_le_bytes());
    block[8..].copy_from_slice(&bc1::encode_color_block(pixels, quality));
    block
}

/// Decode a BC2 block into 16 RGBA texels
pub fn decode_block(block: &[u8; 16]) -> [[u8; 4]; 16] {
    let mut color = [0u8; 8];
    color.copy_from_slice(&block[8..]);
    let mut pixels = bc1::decode_color_block(&color);

    let mut alpha = [0u8; 8];
    alpha.copy_from_slice(&block[..8]);
    let alpha = u64::from_le_bytes(alpha);
    for (i, p) in pixels.iter_mut().enumerate() {
        p[3] = ((alpha >> (i * 4)) & 0xF) as u8 * 17;
    }
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alpha_rounding() {
        assert_eq!(quantize_alpha(0), 0);
        assert_eq!(quantize_alpha(255), 15);
        assert_eq!(quantize_alpha(8), 0);
        assert_eq!(quantize_alpha(9), 1);
        assert_eq!(quantize_alpha(128), 8);
    }

    #[test]
    fn test_uniform_block() {
        let pixels = [[40u8, 80, 160, 100]; 16];
        let decoded = decode_block(&encode_block(&pixels, bc1::BC1_DEFAULT_QUALITY));
        for p in decoded {
            assert!(p[0].abs_diff(40) <= 4);
            assert!(p[1].abs_diff(80) <= 4);
            assert!(p[2].abs_diff(160) <= 4);
            assert!(p[3].abs_diff(100) <= 8);
        }
    }

    #[test]
    fn test_alpha_per_texel() {
        let mut pixels = [[0u8, 0, 0, 0]; 16];
        for (i, p) in pixels.iter_mut().enumerate() {
            p[3] = (i * 17) as u8;
        }
        let decoded = decode_block(&encode_block(&pixels, 0));
        for (i, p) in decoded.iter().enumerate() {
            assert_eq!(p[3], (i * 17) as u8);
        }
    }
}
