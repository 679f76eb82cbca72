//! Conversion between stored texels and `f32` channels
//!
//! Normalized formats map to `[0, 1]` (or `[-1, 1]` when signed), integer
//! formats keep their raw values and float formats pass through. Packed and
//! half float formats go through their channel codec.

use hork_texture_codec::codec_for_format;
use hork_texture_core::{DataType, FormatKind, Result, TextureError, TextureFormat};

fn check_supported(format: TextureFormat) -> Result<()> {
    let info = format.info();
    if format == TextureFormat::Undefined || info.is_compressed() || info.kind == FormatKind::DepthStencil {
        return Err(TextureError::unsupported(format!("texel conversion of {}", format)));
    }
    Ok(())
}

/// Expand stored texels to `channel_count()` floats per texel
pub(crate) fn decode(format: TextureFormat, bytes: &[u8]) -> Result<Vec<f32>> {
    check_supported(format)?;
    if let Some(codec) = codec_for_format(format) {
        let pixels = bytes.len() / codec.bytes_per_pixel();
        let mut out = vec![0.0; pixels * codec.channel_count()];
        codec.decode(bytes, &mut out)?;
        return Ok(out);
    }

    let info = format.info();
    let values = match (info.data_type, info.kind, info.signed) {
        (DataType::Uint8, FormatKind::Normalized, false) => {
            bytes.iter().map(|&b| b as f32 / 255.0).collect()
        }
        (DataType::Uint8, FormatKind::Normalized, true) => bytes
            .iter()
            .map(|&b| (b as i8 as f32 / 127.0).max(-1.0))
            .collect(),
        (DataType::Uint8, _, false) => bytes.iter().map(|&b| b as f32).collect(),
        (DataType::Uint8, _, true) => bytes.iter().map(|&b| b as i8 as f32).collect(),
        (DataType::Uint16, kind, signed) => bytes
            .chunks_exact(2)
            .map(|c| {
                let raw = u16::from_le_bytes([c[0], c[1]]);
                match (kind, signed) {
                    (FormatKind::Normalized, false) => raw as f32 / 65535.0,
                    (FormatKind::Normalized, true) => (raw as i16 as f32 / 32767.0).max(-1.0),
                    (_, false) => raw as f32,
                    (_, true) => raw as i16 as f32,
                }
            })
            .collect(),
        (DataType::Uint32, _, signed) => bytes
            .chunks_exact(4)
            .map(|c| {
                let raw = u32::from_le_bytes([c[0], c[1], c[2], c[3]]);
                if signed { raw as i32 as f32 } else { raw as f32 }
            })
            .collect(),
        (DataType::Float, _, _) => bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
        _ => return Err(TextureError::unsupported(format!("texel conversion of {}", format))),
    };
    Ok(values)
}

/// Store floats produced by [`decode`] back into `bytes`
pub(crate) fn encode(format: TextureFormat, values: &[f32], bytes: &mut [u8]) -> Result<()> {
    check_supported(format)?;
    if let Some(codec) = codec_for_format(format) {
        return codec.encode(values, bytes);
    }

    let info = format.info();
    let element = match info.data_type {
        DataType::Uint8 => 1,
        DataType::Uint16 => 2,
        DataType::Uint32 | DataType::Float => 4,
        _ => return Err(TextureError::unsupported(format!("texel conversion of {}", format))),
    };
    let required = values.len() * element;
    if bytes.len() < required {
        return Err(TextureError::buffer_too_small(required, bytes.len()));
    }

    let normalized = info.kind == FormatKind::Normalized;
    for (&v, out) in values.iter().zip(bytes.chunks_exact_mut(element)) {
        match (info.data_type, normalized, info.signed) {
            (DataType::Uint8, true, false) => out[0] = (v.clamp(0.0, 1.0) * 255.0 + 0.5) as u8,
            (DataType::Uint8, true, true) => out[0] = (v.clamp(-1.0, 1.0) * 127.0).round() as i8 as u8,
            (DataType::Uint8, false, false) => out[0] = v.round().clamp(0.0, 255.0) as u8,
            (DataType::Uint8, false, true) => out[0] = v.round().clamp(-128.0, 127.0) as i8 as u8,
            (DataType::Uint16, true, false) => {
                out.copy_from_slice(&((v.clamp(0.0, 1.0) * 65535.0 + 0.5) as u16).to_le_bytes())
            }
            (DataType::Uint16, true, true) => {
                out.copy_from_slice(&((v.clamp(-1.0, 1.0) * 32767.0).round() as i16).to_le_bytes())
            }
            (DataType::Uint16, false, false) => {
                out.copy_from_slice(&(v.round().clamp(0.0, 65535.0) as u16).to_le_bytes())
            }
            (DataType::Uint16, false, true) => {
                out.copy_from_slice(&(v.round().clamp(-32768.0, 32767.0) as i16).to_le_bytes())
            }
            (DataType::Uint32, _, false) => out.copy_from_slice(&(v.round().max(0.0) as u32).to_le_bytes()),
            (DataType::Uint32, _, true) => out.copy_from_slice(&(v.round() as i32).to_le_bytes()),
            _ => out.copy_from_slice(&v.to_le_bytes()),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unorm8_round_trip() {
        let bytes = [0u8, 1, 127, 128, 254, 255, 17, 33];
        let values = decode(TextureFormat::RGBA8_UNORM, &bytes).unwrap();
        assert_eq!(values[5], 1.0);
        let mut out = [0u8; 8];
        encode(TextureFormat::RGBA8_UNORM, &values, &mut out).unwrap();
        assert_eq!(out, bytes);
    }

    #[test]
    fn test_snorm8_clamps_minimum() {
        let values = decode(TextureFormat::RG8_SNORM, &[0x80, 0x7F]).unwrap();
        assert_eq!(values, vec![-1.0, 1.0]);
    }

    #[test]
    fn test_float_and_half() {
        let mut bytes = Vec::new();
        for v in [0.5f32, -2.0, 1.0e6] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        assert_eq!(decode(TextureFormat::RGB32_FLOAT, &bytes).unwrap(), vec![0.5, -2.0, 1.0e6]);

        let mut half = [0u8; 4];
        encode(TextureFormat::RG16_FLOAT, &[0.25, -8.0], &mut half).unwrap();
        assert_eq!(decode(TextureFormat::RG16_FLOAT, &half).unwrap(), vec![0.25, -8.0]);
    }

    #[test]
    fn test_rejects_compressed_and_depth() {
        assert!(decode(TextureFormat::BC1_UNORM, &[0; 8]).is_err());
        assert!(decode(TextureFormat::D32, &[0; 4]).is_err());
        assert!(encode(TextureFormat::D24S8, &[0.0], &mut [0; 4]).is_err());
    }
}
