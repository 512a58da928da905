//! PS2 GS pixel/palette codec: direct-color and indexed storage formats,
//! the 8bpp block swizzle, and CLUT tiling.

use std::io::{Read, Seek, Write};

use anyhow::{anyhow, Result};
use byteorder::{ReadBytesExt, WriteBytesExt};

use crate::error::CodecError;

/// Interchange color. Alpha is full-range 0-255; the 0-0x80 GS alpha scale
/// is applied at the storage boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }
}

/// GS PSM storage formats. Z variants are stored identically to their CT
/// counterparts and are decoded the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PixelFormat {
    Psmct32 = 0x00,
    Psmct24 = 0x01,
    Psmct16 = 0x02,
    Psmct16s = 0x0A,
    Psmt8 = 0x13,
    Psmt4 = 0x14,
    Psmt8h = 0x1B,
    Psmt4hl = 0x24,
    Psmt4hh = 0x2C,
    Psmz32 = 0x30,
    Psmz24 = 0x31,
    Psmz16 = 0x32,
    Psmz16s = 0x3A,
}

impl PixelFormat {
    pub fn from_u8(value: u8) -> Result<Self> {
        use PixelFormat::*;
        Ok(match value {
            0x00 => Psmct32,
            0x01 => Psmct24,
            0x02 => Psmct16,
            0x0A => Psmct16s,
            0x13 => Psmt8,
            0x14 => Psmt4,
            0x1B => Psmt8h,
            0x24 => Psmt4hl,
            0x2C => Psmt4hh,
            0x30 => Psmz32,
            0x31 => Psmz24,
            0x32 => Psmz16,
            0x3A => Psmz16s,
            other => {
                return Err(anyhow!(CodecError::NotImplemented(format!(
                    "pixel format {other:#04x}"
                ))))
            }
        })
    }

    pub fn is_indexed(self) -> bool {
        matches!(
            self,
            PixelFormat::Psmt8
                | PixelFormat::Psmt8h
                | PixelFormat::Psmt4
                | PixelFormat::Psmt4hl
                | PixelFormat::Psmt4hh
        )
    }

    /// Palette size implied by an indexed format, 0 otherwise.
    pub fn palette_entries(self) -> usize {
        match self {
            PixelFormat::Psmt8 | PixelFormat::Psmt8h => 256,
            PixelFormat::Psmt4 | PixelFormat::Psmt4hl | PixelFormat::Psmt4hh => 16,
            _ => 0,
        }
    }

    /// Byte size of a `width` x `height` block in this format.
    pub fn data_size(self, width: usize, height: usize) -> Result<usize> {
        use PixelFormat::*;
        Ok(match self {
            Psmct32 | Psmz32 => width * height * 4,
            Psmct24 | Psmz24 => width * height * 3,
            Psmct16 | Psmct16s | Psmz16 | Psmz16s => width * height * 2,
            Psmt8 | Psmt8h => width * height,
            Psmt4 | Psmt4hl | Psmt4hh => (width * height).div_ceil(2),
        })
    }
}

/// Decoded pixel block: direct colors or palette indices in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub enum PixelData {
    Colors(Vec<Rgba>),
    Indices(Vec<u8>),
}

impl PixelData {
    pub fn len(&self) -> usize {
        match self {
            PixelData::Colors(c) => c.len(),
            PixelData::Indices(i) => i.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// GS alpha is 0x00-0x80. 0x80 maps to fully opaque; the scaling below is an
// exact inverse pair on the representable set.
fn alpha_to_full(a: u8) -> u8 {
    ((a as u16) << 1).min(255) as u8
}

fn alpha_to_gs(a: u8) -> u8 {
    ((a as u16 + 1) >> 1) as u8
}

pub fn read_pixels<R: Read + Seek>(
    format: PixelFormat,
    reader: &mut R,
    width: usize,
    height: usize,
) -> Result<PixelData> {
    use PixelFormat::*;
    let count = width * height;
    match format {
        Psmct32 | Psmz32 => {
            let mut colors = Vec::with_capacity(count);
            for _ in 0..count {
                let r = reader.read_u8()?;
                let g = reader.read_u8()?;
                let b = reader.read_u8()?;
                let a = reader.read_u8()?;
                colors.push(Rgba::new(r, g, b, alpha_to_full(a)));
            }
            Ok(PixelData::Colors(colors))
        }
        Psmct24 | Psmz24 => {
            let mut colors = Vec::with_capacity(count);
            for _ in 0..count {
                let r = reader.read_u8()?;
                let g = reader.read_u8()?;
                let b = reader.read_u8()?;
                colors.push(Rgba::new(r, g, b, 255));
            }
            Ok(PixelData::Colors(colors))
        }
        Psmct16 | Psmct16s | Psmz16 | Psmz16s => {
            let mut colors = Vec::with_capacity(count);
            for _ in 0..count {
                let word = reader.read_u16::<byteorder::LittleEndian>()?;
                let r = ((word & 0x1F) << 3) as u8;
                let g = (((word >> 5) & 0x1F) << 3) as u8;
                let b = (((word >> 10) & 0x1F) << 3) as u8;
                let a = if word & 0x8000 != 0 { 255 } else { 0 };
                colors.push(Rgba::new(r, g, b, a));
            }
            Ok(PixelData::Colors(colors))
        }
        Psmt8 => {
            let mut data = vec![0u8; count];
            reader.read_exact(&mut data)?;
            Ok(PixelData::Indices(unswizzle8(width, height, &data)))
        }
        Psmt8h => {
            let mut data = vec![0u8; count];
            reader.read_exact(&mut data)?;
            Ok(PixelData::Indices(data))
        }
        Psmt4 | Psmt4hl | Psmt4hh => {
            let mut packed = vec![0u8; count.div_ceil(2)];
            reader.read_exact(&mut packed)?;
            let mut indices = Vec::with_capacity(count);
            for byte in packed {
                indices.push(byte & 0x0F);
                if indices.len() < count {
                    indices.push(byte >> 4);
                }
            }
            Ok(PixelData::Indices(indices))
        }
    }
}

pub fn write_pixels<W: Write + Seek>(
    format: PixelFormat,
    writer: &mut W,
    width: usize,
    height: usize,
    data: &PixelData,
) -> Result<()> {
    use PixelFormat::*;
    let count = width * height;
    if data.len() != count {
        return Err(anyhow!(CodecError::InvalidData(format!(
            "pixel block has {} entries, expected {count} ({width}x{height})",
            data.len()
        ))));
    }
    match (format, data) {
        (Psmct32 | Psmz32, PixelData::Colors(colors)) => {
            for c in colors {
                writer.write_u8(c.r)?;
                writer.write_u8(c.g)?;
                writer.write_u8(c.b)?;
                writer.write_u8(alpha_to_gs(c.a))?;
            }
            Ok(())
        }
        (Psmct24 | Psmz24, PixelData::Colors(colors)) => {
            for c in colors {
                writer.write_u8(c.r)?;
                writer.write_u8(c.g)?;
                writer.write_u8(c.b)?;
            }
            Ok(())
        }
        (Psmct16 | Psmct16s | Psmz16 | Psmz16s, PixelData::Colors(colors)) => {
            for c in colors {
                let mut word = ((c.r as u16) >> 3)
                    | (((c.g as u16) >> 3) << 5)
                    | (((c.b as u16) >> 3) << 10);
                if c.a >= 0x80 {
                    word |= 0x8000;
                }
                writer.write_u16::<byteorder::LittleEndian>(word)?;
            }
            Ok(())
        }
        (Psmt8, PixelData::Indices(indices)) => {
            writer.write_all(&swizzle8(width, height, indices))?;
            Ok(())
        }
        (Psmt8h, PixelData::Indices(indices)) => {
            writer.write_all(indices)?;
            Ok(())
        }
        (Psmt4 | Psmt4hl | Psmt4hh, PixelData::Indices(indices)) => {
            for pair in indices.chunks(2) {
                let lo = pair[0] & 0x0F;
                let hi = pair.get(1).copied().unwrap_or(0) & 0x0F;
                writer.write_u8(lo | (hi << 4))?;
            }
            Ok(())
        }
        _ => Err(anyhow!(CodecError::NotImplemented(format!(
            "pixel data kind does not match format {format:?}"
        )))),
    }
}

// The GS stores 8bpp textures in 16x16-texel pages built from 8x2 columns;
// the address arithmetic below is the fixed block/column/byte remapping.
fn swizzled_index(width: usize, x: usize, y: usize) -> usize {
    let block_location = (y & !0xF) * width + (x & !0xF) * 2;
    let swap_selector = (((y + 2) >> 2) & 0x1) * 4;
    let pos_y = (((y & !3) >> 1) + (y & 1)) & 0x7;
    let column_location = pos_y * width * 2 + ((x + swap_selector) & 0x7) * 4;
    let byte_num = ((y >> 1) & 1) + ((x >> 2) & 2);
    block_location + column_location + byte_num
}

/// Whether the 8bpp block remapping applies to this block size. Smaller or
/// unaligned blocks are stored linearly.
pub fn swizzle8_applies(width: usize, height: usize) -> bool {
    width % 16 == 0 && height % 16 == 0 && width > 0 && height > 0
}

/// Linear row-major 8bpp data -> GS tiled block order.
pub fn swizzle8(width: usize, height: usize, data: &[u8]) -> Vec<u8> {
    if !swizzle8_applies(width, height) {
        return data.to_vec();
    }
    let mut out = vec![0u8; data.len()];
    for y in 0..height {
        for x in 0..width {
            out[swizzled_index(width, x, y)] = data[y * width + x];
        }
    }
    out
}

/// GS tiled block order -> linear row-major. Exact inverse of [`swizzle8`].
pub fn unswizzle8(width: usize, height: usize, data: &[u8]) -> Vec<u8> {
    if !swizzle8_applies(width, height) {
        return data.to_vec();
    }
    let mut out = vec![0u8; data.len()];
    for y in 0..height {
        for x in 0..width {
            out[y * width + x] = data[swizzled_index(width, x, y)];
        }
    }
    out
}

/// Applies the CLUT tiling permutation to a 256-entry palette: within each
/// 32-entry group, entries 8..16 and 16..24 swap places. The swap is an
/// involution, so it is also the inverse transform.
pub fn tile_palette(palette: &mut [Rgba]) {
    debug_assert_eq!(palette.len(), 256);
    for group in palette.chunks_exact_mut(32) {
        for i in 0..8 {
            group.swap(8 + i, 16 + i);
        }
    }
}

/// Inverse of [`tile_palette`].
pub fn untile_palette(palette: &mut [Rgba]) {
    tile_palette(palette);
}

/// Reads a palette block: 16 colors as a 4x4 block, 256 colors as a 16x16
/// block with the CLUT tiling permutation undone.
pub fn read_palette<R: Read + Seek>(
    format: PixelFormat,
    reader: &mut R,
    colors: usize,
) -> Result<Vec<Rgba>> {
    let dim = match colors {
        16 => 4,
        256 => 16,
        other => {
            return Err(anyhow!(CodecError::NotImplemented(format!(
                "palette of {other} colors"
            ))))
        }
    };
    let data = read_pixels(format, reader, dim, dim)?;
    let mut palette = match data {
        PixelData::Colors(c) => c,
        PixelData::Indices(_) => {
            return Err(anyhow!(CodecError::NotImplemented(format!(
                "indexed palette format {format:?}"
            ))))
        }
    };
    if colors == 256 {
        untile_palette(&mut palette);
    }
    Ok(palette)
}

pub fn write_palette<W: Write + Seek>(
    format: PixelFormat,
    writer: &mut W,
    palette: &[Rgba],
) -> Result<()> {
    let dim = match palette.len() {
        16 => 4,
        256 => 16,
        other => {
            return Err(anyhow!(CodecError::NotImplemented(format!(
                "palette of {other} colors"
            ))))
        }
    };
    let mut entries = palette.to_vec();
    if entries.len() == 256 {
        tile_palette(&mut entries);
    }
    write_pixels(format, writer, dim, dim, &PixelData::Colors(entries))
}
