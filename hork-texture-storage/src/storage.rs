//! Image storage
//!
//! An [`ImageStorage`] owns one contiguous buffer holding every mip level of
//! every slice. Levels are stored largest first; inside a level, slices (or
//! depth layers for 3D textures) are stored back to back.
//!
//! Binary layout, little endian:
//!
//! ```text
//! u8  texture type
//! u32 width
//! u32 height
//! u32 depth (slice count for non-3D types)
//! u32 mip count
//! u8  format id
//! u32 flags
//! u32 data size
//! ... data
//! ```

use std::io::{self, Read, Write};
use std::sync::atomic::AtomicU32;

use bitflags::bitflags;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use hork_texture_codec::{BlockCompression, compress_image, decompress_image, decompressed_format};
use hork_texture_core::{Result, TextureError, TextureFormat, calc_num_mips};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::mipmap::ImageMipmapConfig;

/// Texture dimensionality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum TextureType {
    Tex1D = 0,
    Tex1DArray = 1,
    #[default]
    Tex2D = 2,
    Tex2DArray = 3,
    Tex3D = 4,
    Cube = 5,
    CubeArray = 6,
}

impl TextureType {
    /// Resolve a serialized type id
    pub fn from_id(id: u8) -> Option<Self> {
        Some(match id {
            0 => TextureType::Tex1D,
            1 => TextureType::Tex1DArray,
            2 => TextureType::Tex2D,
            3 => TextureType::Tex2DArray,
            4 => TextureType::Tex3D,
            5 => TextureType::Cube,
            6 => TextureType::CubeArray,
            _ => return None,
        })
    }

    pub fn is_1d(&self) -> bool {
        matches!(self, TextureType::Tex1D | TextureType::Tex1DArray)
    }

    pub fn is_cube(&self) -> bool {
        matches!(self, TextureType::Cube | TextureType::CubeArray)
    }
}

bitflags! {
    /// Interpretation of the stored texels
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct ImageStorageFlags: u32 {
        /// The alpha channel carries no information
        const NO_ALPHA = 1 << 0;
        /// Color channels are multiplied by alpha
        const ALPHA_PREMULTIPLIED = 1 << 1;
    }
}

/// Shape and format of an [`ImageStorage`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageStorageDesc {
    pub texture_type: TextureType,
    pub width: u32,
    pub height: u32,
    /// Depth of 3D textures, 1 otherwise
    pub depth: u32,
    /// Array layers; 6 per cube
    pub slice_count: u32,
    pub num_mipmaps: u32,
    pub format: TextureFormat,
    pub flags: ImageStorageFlags,
}

impl Default for ImageStorageDesc {
    fn default() -> Self {
        Self {
            texture_type: TextureType::Tex2D,
            width: 1,
            height: 1,
            depth: 1,
            slice_count: 1,
            num_mipmaps: 1,
            format: TextureFormat::RGBA8_UNORM,
            flags: ImageStorageFlags::empty(),
        }
    }
}

impl ImageStorageDesc {
    /// Single level 2D texture
    pub fn new_2d(width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            width,
            height,
            format,
            ..Default::default()
        }
    }

    /// Same texture with a full mip chain
    pub fn with_mipmaps(mut self) -> Self {
        self.num_mipmaps = self.full_mip_count();
        self
    }

    /// Mip count of a complete chain for this size and format
    pub fn full_mip_count(&self) -> u32 {
        let depth = if self.texture_type == TextureType::Tex3D { self.depth } else { 1 };
        calc_num_mips(self.format, self.width, self.height, depth)
    }

    /// Check every structural invariant
    pub fn validate(&self) -> Result<()> {
        let (w, h, d) = (self.width, self.height, self.depth);
        let dims = |reason: &str| TextureError::invalid_dimensions(w, h, d, reason);

        if self.format == TextureFormat::Undefined {
            return Err(TextureError::unsupported("storage with an undefined format"));
        }
        if w == 0 || h == 0 || d == 0 {
            return Err(dims("dimensions must be non-zero"));
        }
        if self.texture_type.is_1d() && h != 1 {
            return Err(dims("1D textures must have a height of 1"));
        }
        if self.texture_type.is_cube() && w != h {
            return Err(dims("cube faces must be square"));
        }
        if self.texture_type != TextureType::Tex3D && d != 1 {
            return Err(dims("only 3D textures have depth"));
        }

        let slices = self.slice_count;
        let slices_ok = match self.texture_type {
            TextureType::Tex1D | TextureType::Tex2D | TextureType::Tex3D => slices == 1,
            TextureType::Cube => slices == 6,
            TextureType::CubeArray => slices > 0 && slices % 6 == 0,
            TextureType::Tex1DArray | TextureType::Tex2DArray => slices >= 1,
        };
        if !slices_ok {
            return Err(TextureError::invalid_slice_count(
                format!("{:?}", self.texture_type),
                slices,
            ));
        }

        if self.format.is_compressed() {
            if self.texture_type == TextureType::Tex3D {
                return Err(TextureError::unsupported("block compressed 3D textures"));
            }
            let bs = self.format.block_size();
            if w % bs != 0 || h % bs != 0 {
                return Err(dims("compressed dimensions must be multiples of the block size"));
            }
            if self.num_mipmaps > 1 && !(w.is_power_of_two() && h.is_power_of_two()) {
                return Err(dims("mipmapped compressed textures must be powers of two"));
            }
        }

        let full = self.full_mip_count();
        if self.num_mipmaps != 1 && self.num_mipmaps != full {
            return Err(TextureError::out_of_range(format!(
                "mip count {} must be 1 or {}",
                self.num_mipmaps, full
            )));
        }
        Ok(())
    }

    /// Stored dimensions of a mip level, never below one block
    pub fn mip_dimensions(&self, mip: u32) -> (u32, u32, u32) {
        let bs = self.format.block_size();
        let width = (self.width >> mip).max(bs);
        let height = (self.height >> mip).max(bs);
        let depth = if self.texture_type == TextureType::Tex3D {
            (self.depth >> mip).max(1)
        } else {
            1
        };
        (width, height, depth)
    }

    /// Addressable slices at a mip level: depth layers for 3D textures
    pub fn slice_count_at_mip(&self, mip: u32) -> u32 {
        if self.texture_type == TextureType::Tex3D {
            self.mip_dimensions(mip).2
        } else {
            self.slice_count
        }
    }

    fn slice_size(&self, mip: u32) -> Result<usize> {
        let (width, height, _) = self.mip_dimensions(mip);
        self.format.calculate_data_size(width, height)
    }

    fn mip_size(&self, mip: u32) -> Result<usize> {
        self.slice_size(mip)?
            .checked_mul(self.slice_count_at_mip(mip) as usize)
            .ok_or_else(|| self.overflow())
    }

    fn mip_offset(&self, mip: u32) -> Result<usize> {
        (0..mip).try_fold(0usize, |offset, m| {
            offset.checked_add(self.mip_size(m)?).ok_or_else(|| self.overflow())
        })
    }

    fn overflow(&self) -> TextureError {
        TextureError::invalid_data(format!(
            "{}x{}x{} {} with {} slices does not fit in memory",
            self.width, self.height, self.depth, self.format, self.slice_count
        ))
    }

    /// Total bytes of all levels and slices
    pub fn data_size(&self) -> Result<usize> {
        self.mip_offset(self.num_mipmaps)
    }
}

/// Rectangle inside one subresource, in texels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl ImageRegion {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }
}

/// Borrowed view of one (slice, mip) of an [`ImageStorage`]
#[derive(Debug, Clone, Copy)]
pub struct ImageSubresource<'a> {
    data: &'a [u8],
    width: u32,
    height: u32,
    format: TextureFormat,
    slice_index: u32,
    mip_index: u32,
    slice_count: u32,
}

impl<'a> ImageSubresource<'a> {
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> TextureFormat {
        self.format
    }

    pub fn slice_index(&self) -> u32 {
        self.slice_index
    }

    pub fn mip_index(&self) -> u32 {
        self.mip_index
    }

    /// Slices addressable at this mip level
    pub fn slice_count(&self) -> u32 {
        self.slice_count
    }

    /// Bytes per row of texels, or of blocks for compressed formats
    pub fn row_pitch(&self) -> usize {
        self.width.div_ceil(self.format.block_size()) as usize * self.format.bytes_per_block() as usize
    }

    pub fn size_in_bytes(&self) -> usize {
        self.data.len()
    }
}

/// Mutable view of one (slice, mip) of an [`ImageStorage`]
#[derive(Debug)]
pub struct ImageSubresourceMut<'a> {
    data: &'a mut [u8],
    width: u32,
    height: u32,
    format: TextureFormat,
}

impl ImageSubresourceMut<'_> {
    pub fn data(&self) -> &[u8] {
        &*self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut *self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> TextureFormat {
        self.format
    }
}

/// Owned, fully allocated texture data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageStorage {
    desc: ImageStorageDesc,
    data: Vec<u8>,
}

impl ImageStorage {
    /// Allocate zeroed storage for `desc`
    pub fn new(desc: ImageStorageDesc) -> Result<Self> {
        desc.validate()?;
        Ok(Self {
            desc,
            data: vec![0; desc.data_size()?],
        })
    }

    /// Reallocate for a new description, discarding the old contents
    pub fn reset(&mut self, desc: ImageStorageDesc) -> Result<()> {
        *self = Self::new(desc)?;
        Ok(())
    }

    pub fn desc(&self) -> &ImageStorageDesc {
        &self.desc
    }

    pub fn format(&self) -> TextureFormat {
        self.desc.format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn size_in_bytes(&self) -> usize {
        self.data.len()
    }

    /// Stored dimensions of a mip level
    pub fn mip_dimensions(&self, mip: u32) -> (u32, u32, u32) {
        self.desc.mip_dimensions(mip)
    }

    fn locate(&self, slice_index: u32, mip_index: u32) -> Result<(usize, usize)> {
        let desc = &self.desc;
        if mip_index >= desc.num_mipmaps {
            return Err(TextureError::out_of_range(format!(
                "mip {} of {}",
                mip_index, desc.num_mipmaps
            )));
        }
        let slices = desc.slice_count_at_mip(mip_index);
        if slice_index >= slices {
            return Err(TextureError::out_of_range(format!(
                "slice {} of {} at mip {}",
                slice_index, slices, mip_index
            )));
        }
        let size = desc.slice_size(mip_index)?;
        let offset = desc.mip_offset(mip_index)? + slice_index as usize * size;
        Ok((offset, size))
    }

    /// View one slice of one mip level
    pub fn subresource(&self, slice_index: u32, mip_index: u32) -> Result<ImageSubresource<'_>> {
        let (offset, size) = self.locate(slice_index, mip_index)?;
        let (width, height, _) = self.desc.mip_dimensions(mip_index);
        Ok(ImageSubresource {
            data: &self.data[offset..offset + size],
            width,
            height,
            format: self.desc.format,
            slice_index,
            mip_index,
            slice_count: self.desc.slice_count_at_mip(mip_index),
        })
    }

    /// Mutable view of one slice of one mip level
    pub fn subresource_mut(&mut self, slice_index: u32, mip_index: u32) -> Result<ImageSubresourceMut<'_>> {
        let (offset, size) = self.locate(slice_index, mip_index)?;
        let (width, height, _) = self.desc.mip_dimensions(mip_index);
        Ok(ImageSubresourceMut {
            data: &mut self.data[offset..offset + size],
            width,
            height,
            format: self.desc.format,
        })
    }

    /// Row span of `region` inside a subresource: (first byte, bytes per row, rows, pitch)
    fn region_layout(&self, mip_index: u32, region: &ImageRegion) -> Result<(usize, usize, usize, usize)> {
        let (width, height, _) = self.desc.mip_dimensions(mip_index);
        let format = self.desc.format;
        let bs = format.block_size();

        let inside = region.width > 0
            && region.height > 0
            && region.x.checked_add(region.width).is_some_and(|r| r <= width)
            && region.y.checked_add(region.height).is_some_and(|b| b <= height);
        if !inside {
            return Err(TextureError::out_of_range(format!(
                "region {:?} outside of {}x{} mip {}",
                region, width, height, mip_index
            )));
        }
        if [region.x, region.y, region.width, region.height].iter().any(|v| v % bs != 0) {
            return Err(TextureError::invalid_dimensions(
                region.width,
                region.height,
                1,
                format!("region must be aligned to {}x{} blocks", bs, bs),
            ));
        }

        let bpb = format.bytes_per_block() as usize;
        let pitch = (width / bs) as usize * bpb;
        let first = (region.y / bs) as usize * pitch + (region.x / bs) as usize * bpb;
        let row_bytes = (region.width / bs) as usize * bpb;
        let rows = (region.height / bs) as usize;
        Ok((first, row_bytes, rows, pitch))
    }

    /// Copy tightly packed rows from `src` into a region of a subresource
    pub fn write_subresource(&mut self, slice_index: u32, mip_index: u32, region: ImageRegion, src: &[u8]) -> Result<()> {
        let (offset, _) = self.locate(slice_index, mip_index)?;
        let (first, row_bytes, rows, pitch) = self.region_layout(mip_index, &region)?;
        let required = row_bytes * rows;
        if src.len() < required {
            return Err(TextureError::buffer_too_small(required, src.len()));
        }
        for (row, chunk) in src[..required].chunks_exact(row_bytes).enumerate() {
            let start = offset + first + row * pitch;
            self.data[start..start + row_bytes].copy_from_slice(chunk);
        }
        Ok(())
    }

    /// Copy a region of a subresource into tightly packed rows of `dst`
    pub fn read_subresource(&self, slice_index: u32, mip_index: u32, region: ImageRegion, dst: &mut [u8]) -> Result<()> {
        let (offset, _) = self.locate(slice_index, mip_index)?;
        let (first, row_bytes, rows, pitch) = self.region_layout(mip_index, &region)?;
        let required = row_bytes * rows;
        if dst.len() < required {
            return Err(TextureError::buffer_too_small(required, dst.len()));
        }
        for (row, chunk) in dst[..required].chunks_exact_mut(row_bytes).enumerate() {
            let start = offset + first + row * pitch;
            chunk.copy_from_slice(&self.data[start..start + row_bytes]);
        }
        Ok(())
    }

    /// Serialize to `writer`
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        let desc = &self.desc;
        let size = u32::try_from(self.data.len())
            .map_err(|_| TextureError::invalid_data(format!("{} bytes do not fit the size field", self.data.len())))?;
        let depth = if desc.texture_type == TextureType::Tex3D {
            desc.depth
        } else {
            desc.slice_count
        };

        writer.write_u8(desc.texture_type as u8)?;
        writer.write_u32::<LittleEndian>(desc.width)?;
        writer.write_u32::<LittleEndian>(desc.height)?;
        writer.write_u32::<LittleEndian>(depth)?;
        writer.write_u32::<LittleEndian>(desc.num_mipmaps)?;
        writer.write_u8(desc.format.id())?;
        writer.write_u32::<LittleEndian>(desc.flags.bits())?;
        writer.write_u32::<LittleEndian>(size)?;
        writer.write_all(&self.data)?;
        Ok(())
    }

    /// Deserialize from `reader`
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let type_id = reader.read_u8()?;
        let texture_type = TextureType::from_id(type_id)
            .ok_or_else(|| TextureError::invalid_data(format!("unknown texture type {}", type_id)))?;
        let width = reader.read_u32::<LittleEndian>()?;
        let height = reader.read_u32::<LittleEndian>()?;
        let depth = reader.read_u32::<LittleEndian>()?;
        let num_mipmaps = reader.read_u32::<LittleEndian>()?;
        let format = TextureFormat::from(reader.read_u8()?);
        let flags = ImageStorageFlags::from_bits_truncate(reader.read_u32::<LittleEndian>()?);
        let size = reader.read_u32::<LittleEndian>()? as usize;

        let (depth, slice_count) = if texture_type == TextureType::Tex3D {
            (depth, 1)
        } else {
            (1, depth)
        };
        let desc = ImageStorageDesc {
            texture_type,
            width,
            height,
            depth,
            slice_count,
            num_mipmaps,
            format,
            flags,
        };
        desc.validate()?;
        let expected = desc.data_size()?;
        if size != expected {
            return Err(TextureError::invalid_data(format!(
                "data size {} does not match the description ({} bytes)",
                size, expected
            )));
        }

        // Grow with the stream instead of trusting the header for the allocation
        let mut data = Vec::new();
        reader.by_ref().take(size as u64).read_to_end(&mut data)?;
        if data.len() != size {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("expected {} bytes of image data, got {}", size, data.len()),
            )
            .into());
        }
        Ok(Self { desc, data })
    }

    /// Compress every subresource into a new storage
    ///
    /// The source must hold the uncompressed layout the block format is fed
    /// with (RGBA8 for BC1/2/3/7, R8 for BC4, RG8 for BC5, RGBA32_FLOAT for
    /// BC6H). A full mip chain is cut where the compressed chain ends at a
    /// single block.
    pub fn compress(&self, compression: &BlockCompression, progress: Option<&AtomicU32>) -> Result<ImageStorage> {
        let desc = &self.desc;
        let accepted: &[TextureFormat] = match compression {
            BlockCompression::Bc4 { .. } => &[TextureFormat::R8_UNORM],
            BlockCompression::Bc5 { .. } => &[TextureFormat::RG8_UNORM],
            BlockCompression::Bc6h(_) => &[TextureFormat::RGBA32_FLOAT],
            _ => &[TextureFormat::RGBA8_UNORM, TextureFormat::RGBA8_UNORM_SRGB],
        };
        if !accepted.contains(&desc.format) {
            return Err(TextureError::unsupported(format!(
                "{} cannot be compressed to {}",
                desc.format,
                compression.format(false)
            )));
        }

        let format = compression.format(desc.format.is_srgb());
        let mut target = ImageStorageDesc { format, ..*desc };
        target.num_mipmaps = if desc.num_mipmaps > 1 { target.full_mip_count() } else { 1 };
        let mut dst = ImageStorage::new(target)?;

        let pixel_bytes = compression.source_bytes_per_pixel();
        for mip in 0..target.num_mipmaps {
            for slice in 0..desc.slice_count {
                let src = self.subresource(slice, mip)?;
                let mut out = dst.subresource_mut(slice, mip)?;
                let (width, height) = (out.width(), out.height());
                if (src.width(), src.height()) == (width, height) {
                    compress_image(compression, src.data(), width as usize * pixel_bytes, width, height, out.data_mut(), progress)?;
                } else {
                    // Levels below one block on an axis are padded by edge replication
                    let padded = pad_edges(src.data(), src.width(), src.height(), pixel_bytes, width, height);
                    compress_image(compression, &padded, width as usize * pixel_bytes, width, height, out.data_mut(), progress)?;
                }
            }
        }

        debug!(
            "compressed {}x{} {} into {} ({} mips, {} slices)",
            desc.width, desc.height, desc.format, format, target.num_mipmaps, desc.slice_count
        );
        Ok(dst)
    }

    /// Decode a block compressed storage into its uncompressed counterpart
    ///
    /// Mip levels the compressed chain does not have are regenerated from
    /// the smallest decoded level.
    pub fn decompress(&self) -> Result<ImageStorage> {
        let desc = &self.desc;
        let Some(format) = decompressed_format(desc.format) else {
            return Err(TextureError::unsupported(format!("{} is not block compressed", desc.format)));
        };

        let mut target = ImageStorageDesc { format, ..*desc };
        target.num_mipmaps = if desc.num_mipmaps > 1 { target.full_mip_count() } else { 1 };
        let mut dst = ImageStorage::new(target)?;
        let pixel_bytes = format.bytes_per_block() as usize;

        for mip in 0..desc.num_mipmaps {
            for slice in 0..desc.slice_count {
                let src = self.subresource(slice, mip)?;
                let (width, height) = (src.width(), src.height());
                let mut decoded = vec![0u8; width as usize * height as usize * pixel_bytes];
                decompress_image(desc.format, src.data(), &mut decoded, width as usize * pixel_bytes, width, height)?;

                let mut out = dst.subresource_mut(slice, mip)?;
                let row = out.width() as usize * pixel_bytes;
                let rows = out.height() as usize;
                let stride = width as usize * pixel_bytes;
                for (y, chunk) in out.data_mut().chunks_exact_mut(row).take(rows).enumerate() {
                    chunk.copy_from_slice(&decoded[y * stride..y * stride + row]);
                }
            }
        }

        if target.num_mipmaps > desc.num_mipmaps {
            for slice in 0..desc.slice_count {
                dst.generate_mip_levels(slice, desc.num_mipmaps, &ImageMipmapConfig::default())?;
            }
        }
        Ok(dst)
    }
}

/// Grow an image to `width` x `height` by repeating its last row and column
fn pad_edges(src: &[u8], src_width: u32, src_height: u32, pixel_bytes: usize, width: u32, height: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(width as usize * height as usize * pixel_bytes);
    for y in 0..height {
        let sy = y.min(src_height - 1) as usize;
        for x in 0..width {
            let sx = x.min(src_width - 1) as usize;
            let offset = (sy * src_width as usize + sx) * pixel_bytes;
            out.extend_from_slice(&src[offset..offset + pixel_bytes]);
        }
    }
    out
}
