//! TMX single-texture container: chunk header, optional palette block(s),
//! base pixel block plus mip-map blocks.

use std::io::{Cursor, Read, Seek, Write};

use anyhow::{anyhow, Context, Result};
use binrw::{binrw, BinReaderExt, BinWriterExt};

use crate::error::CodecError;
use crate::io::{ChunkHeader, WriteBinExt};
use crate::pixel::{self, PixelData, PixelFormat, Rgba};
use crate::Resource;

pub const TMX_TAG: [u8; 4] = *b"TMX0";

/// Texture wrap mode, a 2-bit field per axis in the packed wrap byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapMode {
    Repeat,
    Clamp,
}

/// Packed wrap byte sentinel meaning "unset, default repeat".
pub const WRAP_UNSET: u8 = 0xFF;

#[binrw]
#[derive(Debug, Clone, Copy, Default)]
#[br(little)]
#[bw(little)]
struct TmxPictureHeader {
    unused: u32,
    palette_count: u8,
    palette_fmt: u8,
    width: u16,
    height: u16,
    pixel_fmt: u8,
    mip_map_count: u8,
    mip_k: u8,
    mip_l: u8,
    reserved: u8,
    wrap_modes: u8,
    user_texture_id: i32,
    user_clut_id: i32,
    user_comment: [u8; 28],
}

#[derive(Debug, Clone, PartialEq)]
pub struct TmxTexture {
    pub flags: u16,
    pub user_id: u16,
    pub palette_format: PixelFormat,
    pub pixel_format: PixelFormat,
    pub width: u16,
    pub height: u16,
    pub mip_k: u8,
    pub mip_l: u8,
    pub wrap_modes: u8,
    pub user_texture_id: i32,
    pub user_clut_id: i32,
    pub user_comment: String,
    /// One palette per CLUT; empty for direct-color textures.
    pub palettes: Vec<Vec<Rgba>>,
    pub pixels: PixelData,
    /// Extra pixel blocks, mip `i` (1-based) sized `dim / (2*(2*i))`.
    pub mipmaps: Vec<PixelData>,
}

/// Mip dimension rule used by TMX (and SPR-embedded TMX). This is the
/// progression found in game data, not the conventional `dim >> level`.
/// `level` is 1-based; level 0 is the base image and has no mip dimension.
pub fn mip_dimension(dim: u16, level: usize) -> usize {
    debug_assert!(level > 0, "mip levels are 1-based");
    (dim as usize) / (2 * (2 * level))
}

impl TmxTexture {
    pub fn new(width: u16, height: u16, pixel_format: PixelFormat, pixels: PixelData) -> Self {
        Self {
            flags: 0x0002,
            user_id: 0,
            palette_format: PixelFormat::Psmct32,
            pixel_format,
            width,
            height,
            mip_k: 0,
            mip_l: 0,
            wrap_modes: WRAP_UNSET,
            user_texture_id: 0,
            user_clut_id: 0,
            user_comment: String::new(),
            palettes: Vec::new(),
            pixels,
            mipmaps: Vec::new(),
        }
    }

    pub fn horizontal_wrap(&self) -> WrapMode {
        if self.wrap_modes == WRAP_UNSET || self.wrap_modes & 0x3 == 0 {
            WrapMode::Repeat
        } else {
            WrapMode::Clamp
        }
    }

    pub fn vertical_wrap(&self) -> WrapMode {
        if self.wrap_modes == WRAP_UNSET || (self.wrap_modes >> 2) & 0x3 == 0 {
            WrapMode::Repeat
        } else {
            WrapMode::Clamp
        }
    }

    pub fn read<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        let header: ChunkHeader = reader.read_le().context("failed to read TMX chunk header")?;
        if header.tag != TMX_TAG {
            return Err(anyhow!(CodecError::mismatch(&TMX_TAG, &header.tag)));
        }
        let pic: TmxPictureHeader = reader
            .read_le()
            .context("failed to read TMX picture header")?;

        let pixel_format = PixelFormat::from_u8(pic.pixel_fmt)?;
        let palette_format = if pic.palette_count > 0 {
            PixelFormat::from_u8(pic.palette_fmt)?
        } else {
            PixelFormat::Psmct32
        };

        let mut palettes = Vec::with_capacity(pic.palette_count as usize);
        if pic.palette_count > 0 {
            let colors = pixel_format.palette_entries();
            if colors == 0 {
                return Err(anyhow!(CodecError::InvalidData(format!(
                    "palette_count {} with non-indexed format {pixel_format:?}",
                    pic.palette_count
                ))));
            }
            for _ in 0..pic.palette_count {
                palettes.push(pixel::read_palette(palette_format, reader, colors)?);
            }
        }

        let width = pic.width as usize;
        let height = pic.height as usize;
        let pixels = pixel::read_pixels(pixel_format, reader, width, height)?;
        let mut mipmaps = Vec::with_capacity(pic.mip_map_count as usize);
        for level in 1..=pic.mip_map_count as usize {
            let mw = mip_dimension(pic.width, level);
            let mh = mip_dimension(pic.height, level);
            mipmaps.push(pixel::read_pixels(pixel_format, reader, mw, mh)?);
        }

        let comment_end = pic
            .user_comment
            .iter()
            .rposition(|&b| b != 0)
            .map_or(0, |p| p + 1);

        Ok(Self {
            flags: header.flags,
            user_id: header.user_id,
            palette_format,
            pixel_format,
            width: pic.width,
            height: pic.height,
            mip_k: pic.mip_k,
            mip_l: pic.mip_l,
            wrap_modes: pic.wrap_modes,
            user_texture_id: pic.user_texture_id,
            user_clut_id: pic.user_clut_id,
            user_comment: crate::io::decode_sjis(&pic.user_comment[..comment_end]),
            palettes,
            pixels,
            mipmaps,
        })
    }

    pub fn write<W: Write + Seek>(&self, writer: &mut W) -> Result<()> {
        let start = writer.stream_position()?;
        let header = ChunkHeader::new(self.flags, self.user_id, TMX_TAG);
        writer.write_le(&header)?;

        let mut comment = [0u8; 28];
        {
            let mut cursor = Cursor::new(&mut comment[..]);
            cursor.write_fixed_sjis(&self.user_comment, 28)?;
        }

        let pic = TmxPictureHeader {
            unused: 0,
            palette_count: self.palettes.len() as u8,
            palette_fmt: if self.palettes.is_empty() {
                0
            } else {
                self.palette_format as u8
            },
            width: self.width,
            height: self.height,
            pixel_fmt: self.pixel_format as u8,
            mip_map_count: self.mipmaps.len() as u8,
            mip_k: self.mip_k,
            mip_l: self.mip_l,
            reserved: 0,
            wrap_modes: self.wrap_modes,
            user_texture_id: self.user_texture_id,
            user_clut_id: self.user_clut_id,
            user_comment: comment,
        };
        writer.write_le(&pic)?;

        for palette in &self.palettes {
            pixel::write_palette(self.palette_format, writer, palette)?;
        }
        pixel::write_pixels(
            self.pixel_format,
            writer,
            self.width as usize,
            self.height as usize,
            &self.pixels,
        )?;
        for (i, mip) in self.mipmaps.iter().enumerate() {
            let level = i + 1;
            let mw = mip_dimension(self.width, level);
            let mh = mip_dimension(self.height, level);
            pixel::write_pixels(self.pixel_format, writer, mw, mh, mip)?;
        }

        let end = writer.stream_position()?;
        writer.backpatch_i32(start + 4, (end - start) as i32)?;
        Ok(())
    }
}

impl Resource for TmxTexture {
    fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        Self::read(&mut cursor).context("failed to decode TMX texture")
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        let mut cursor = Cursor::new(&mut data);
        self.write(&mut cursor).context("failed to encode TMX texture")?;
        Ok(data)
    }
}
