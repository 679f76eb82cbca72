//! BC5 two channel blocks, stored as two independent BC4 blocks

use super::bc4;

/// Encode 16 RG texels into a BC5 block
pub fn encode_block(texels: &[[u8; 2]; 16], high_quality: bool) -> [u8; 16] {
    let red: [u8; 16] = std::array::from_fn(|i| texels[i][0]);
    let green: [u8; 16] = std::array::from_fn(|i| texels[i][1]);

    let mut block = [0u8; 16];
    block[..8].copy_from_slice(&bc4::encode_block(&red, high_quality));
    block[8..].copy_from_slice(&bc4::encode_block(&green, high_quality));
    block
}

fn split(block: &[u8; 16]) -> ([u8; 8], [u8; 8]) {
    let mut red = [0u8; 8];
    let mut green = [0u8; 8];
    red.copy_from_slice(&block[..8]);
    green.copy_from_slice(&block[8..]);
    (red, green)
}

/// Decode a BC5 UNORM block into 16 RG texels
pub fn decode_block(block: &[u8; 16]) -> [[u8; 2]; 16] {
    let (red, green) = split(block);
    let red = bc4::decode_block(&red);
    let green = bc4::decode_block(&green);
    std::array::from_fn(|i| [red[i], green[i]])
}

/// Decode a BC5 SNORM block into 16 signed RG texels
pub fn decode_block_signed(block: &[u8; 16]) -> [[i8; 2]; 16] {
    let (red, green) = split(block);
    let red = bc4::decode_block_signed(&red);
    let green = bc4::decode_block_signed(&green);
    std::array::from_fn(|i| [red[i], green[i]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_block_is_exact() {
        let texels = [[128u8, 64]; 16];
        assert_eq!(decode_block(&encode_block(&texels, false)), texels);
        assert_eq!(decode_block(&encode_block(&texels, true)), texels);
    }

    #[test]
    fn test_channels_do_not_bleed() {
        let texels: [[u8; 2]; 16] = std::array::from_fn(|i| [(i * 16) as u8, 200]);
        let decoded = decode_block(&encode_block(&texels, true));
        for (d, t) in decoded.iter().zip(&texels) {
            assert!(d[0].abs_diff(t[0]) <= 24);
            assert_eq!(d[1], 200);
        }
    }
}
