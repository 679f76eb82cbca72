//! BC3 (DXT5) blocks: a BC4 alpha block followed by a BC1 color block

use super::{bc1, bc4};

/// Encode 16 RGBA texels into a BC3 block
pub fn encode_block(pixels: &[[u8; 4]; 16], quality: u32, high_quality_alpha: bool) -> [u8; 16] {
    let alpha: [u8; 16] = std::array::from_fn(|i| pixels[i][3]);

    let mut block = [0u8; 16];
    block[..8].copy_from_slice(&bc4::encode_block(&alpha, high_quality_alpha));
    block[8..].copy_from_slice(&bc1::encode_color_block(pixels, quality));
    block
}

/// Decode a BC3 block into 16 RGBA texels
pub fn decode_block(block: &[u8; 16]) -> [[u8; 4]; 16] {
    let mut half = [0u8; 8];
    half.copy_from_slice(&block[8..]);
    let mut pixels = bc1::decode_color_block(&half);

    half.copy_from_slice(&block[..8]);
    let alpha = bc4::decode_block(&half);
    for (p, a) in pixels.iter_mut().zip(alpha) {
        p[3] = a;
    }
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_block() {
        let pixels = [[10u8, 200, 90, 33]; 16];
        for hq in [false, true] {
            let decoded = decode_block(&encode_block(&pixels, bc1::BC1_DEFAULT_QUALITY, hq));
            for p in decoded {
                assert!(p[0].abs_diff(10) <= 4);
                assert!(p[1].abs_diff(200) <= 4);
                assert!(p[2].abs_diff(90) <= 4);
                assert_eq!(p[3], 33);
            }
        }
    }

    #[test]
    fn test_alpha_is_independent_of_color() {
        let mut pixels = [[255u8, 255, 255, 255]; 16];
        for (i, p) in pixels.iter_mut().enumerate() {
            p[3] = if i % 2 == 0 { 0 } else { 255 };
        }
        let decoded = decode_block(&encode_block(&pixels, 0, false));
        for (i, p) in decoded.iter().enumerate() {
            assert_eq!(p[3], pixels[i][3]);
            assert_eq!(&p[..3], &[255, 255, 255]);
        }
    }
}
