//! SPR/SPR4 sprite containers: a key-frame table and a texture table, each
//! located through its own pointer table. SPR embeds TMX chunks; SPR4 embeds
//! opaque pre-encoded TGA blobs. The container logic is otherwise identical.

use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use anyhow::{anyhow, Context, Result};
use binrw::{binrw, BinReaderExt, BinWriterExt};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::CodecError;
use crate::io::{check_offset, ChunkHeader, PointerEntry, ReadBinExt, WriteBinExt};
use crate::tmx::TmxTexture;
use crate::Resource;

pub const SPR_TAG: [u8; 4] = *b"SPR0";
pub const SPR4_TAG: [u8; 4] = *b"SPR4";

pub const KEY_FRAME_FIELD_COUNT: usize = 28;
const KEY_FRAME_COMMENT_WIDTH: usize = 16;

#[binrw]
#[derive(Debug, Clone, Copy, Default)]
#[br(little)]
#[bw(little)]
struct SprBody {
    unused: u32,
    texture_count: u16,
    key_frame_count: u16,
    texture_table_offset: i32,
    key_frame_table_offset: i32,
    pad: u32,
}

/// One sprite key frame: a comment and the raw positional/metadata fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyFrame {
    pub comment: String,
    pub fields: [i32; KEY_FRAME_FIELD_COUNT],
}

impl Default for KeyFrame {
    fn default() -> Self {
        Self {
            comment: String::new(),
            fields: [0; KEY_FRAME_FIELD_COUNT],
        }
    }
}

impl KeyFrame {
    fn read<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        let comment = reader.read_fixed_sjis(KEY_FRAME_COMMENT_WIDTH)?;
        let mut fields = [0i32; KEY_FRAME_FIELD_COUNT];
        for field in &mut fields {
            *field = reader.read_i32::<LittleEndian>()?;
        }
        Ok(Self { comment, fields })
    }

    fn write<W: Write + Seek>(&self, writer: &mut W) -> Result<()> {
        writer.write_fixed_sjis(&self.comment, KEY_FRAME_COMMENT_WIDTH)?;
        for field in &self.fields {
            writer.write_i32::<LittleEndian>(*field)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SprFile {
    pub flags: u16,
    pub user_id: u16,
    pub key_frames: Vec<KeyFrame>,
    pub textures: Vec<TmxTexture>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Spr4File {
    pub flags: u16,
    pub user_id: u16,
    pub key_frames: Vec<KeyFrame>,
    /// Pre-encoded TGA images, carried opaquely.
    pub textures: Vec<Vec<u8>>,
}

struct RawContainer {
    header: ChunkHeader,
    key_frames: Vec<KeyFrame>,
    texture_offsets: Vec<u64>,
}

fn read_container<R: Read + Seek>(reader: &mut R, tag: [u8; 4]) -> Result<RawContainer> {
    let base = reader.stream_position()?;
    let header: ChunkHeader = reader.read_le().context("failed to read SPR chunk header")?;
    if header.tag != tag {
        return Err(anyhow!(CodecError::mismatch(&tag, &header.tag)));
    }
    let body: SprBody = reader.read_le().context("failed to read SPR header body")?;

    reader.seek(SeekFrom::Start(base + body.texture_table_offset as u64))?;
    let texture_table = reader.read_pointer_table(body.texture_count as usize)?;
    reader.seek(SeekFrom::Start(base + body.key_frame_table_offset as u64))?;
    let key_frame_table = reader.read_pointer_table(body.key_frame_count as usize)?;

    let mut key_frames = Vec::with_capacity(key_frame_table.len());
    for entry in &key_frame_table {
        check_offset(entry.offset as i64, header.length as i64, "key frame")?;
        reader.seek(SeekFrom::Start(base + entry.offset as u64))?;
        key_frames.push(KeyFrame::read(reader)?);
    }

    let mut texture_offsets = Vec::with_capacity(texture_table.len());
    for entry in &texture_table {
        check_offset(entry.offset as i64, header.length as i64, "texture")?;
        texture_offsets.push(base + entry.offset as u64);
    }

    Ok(RawContainer { header, key_frames, texture_offsets })
}

fn write_container<W, T, F>(
    writer: &mut W,
    tag: [u8; 4],
    flags: u16,
    user_id: u16,
    key_frames: &[KeyFrame],
    textures: &[T],
    item_alignment: u64,
    mut write_texture: F,
) -> Result<()>
where
    W: Write + Seek,
    F: FnMut(&mut W, &T) -> Result<()>,
{
    let base = writer.stream_position()?;
    let header = ChunkHeader::new(flags, user_id, tag);
    writer.write_le(&header)?;

    let texture_table_offset = (ChunkHeader::SIZE + 20) as i32;
    let key_frame_table_offset = texture_table_offset + 8 * textures.len() as i32;
    let body = SprBody {
        unused: 0,
        texture_count: textures.len() as u16,
        key_frame_count: key_frames.len() as u16,
        texture_table_offset,
        key_frame_table_offset,
        pad: 0,
    };
    writer.write_le(&body)?;

    // Reserve both pointer tables, then come back once offsets are known.
    let zero = vec![PointerEntry::default(); textures.len() + key_frames.len()];
    writer.write_pointer_table(&zero)?;

    let mut key_frame_entries = Vec::with_capacity(key_frames.len());
    for frame in key_frames {
        let pos = writer.align_zero(item_alignment)?;
        key_frame_entries.push(PointerEntry {
            reserved: 0,
            offset: (pos - base) as i32,
        });
        frame.write(writer)?;
    }

    let mut texture_entries = Vec::with_capacity(textures.len());
    for texture in textures {
        let pos = writer.align_zero(item_alignment)?;
        texture_entries.push(PointerEntry {
            reserved: 0,
            offset: (pos - base) as i32,
        });
        write_texture(writer, texture)?;
    }

    let end = writer.stream_position()?;
    writer.seek(SeekFrom::Start(base + texture_table_offset as u64))?;
    writer.write_pointer_table(&texture_entries)?;
    writer.write_pointer_table(&key_frame_entries)?;
    writer.seek(SeekFrom::Start(end))?;
    writer.backpatch_i32(base + 4, (end - base) as i32)?;
    Ok(())
}

impl SprFile {
    pub fn read<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        let raw = read_container(reader, SPR_TAG)?;
        let mut textures = Vec::with_capacity(raw.texture_offsets.len());
        for &offset in &raw.texture_offsets {
            reader.seek(SeekFrom::Start(offset))?;
            textures.push(TmxTexture::read(reader).context("failed to read SPR texture")?);
        }
        Ok(Self {
            flags: raw.header.flags,
            user_id: raw.header.user_id,
            key_frames: raw.key_frames,
            textures,
        })
    }

    pub fn write<W: Write + Seek>(&self, writer: &mut W) -> Result<()> {
        write_container(
            writer,
            SPR_TAG,
            self.flags,
            self.user_id,
            &self.key_frames,
            &self.textures,
            16,
            |w, texture| texture.write(w),
        )
    }
}

impl Spr4File {
    pub fn read<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        let base = reader.stream_position()?;
        let raw = read_container(reader, SPR4_TAG)?;
        let container_end = base + raw.header.length as u64;
        let mut textures = Vec::with_capacity(raw.texture_offsets.len());
        for (i, &offset) in raw.texture_offsets.iter().enumerate() {
            // Blobs carry no length field; each one runs to the next table
            // offset, the last to the container end.
            let end = raw
                .texture_offsets
                .get(i + 1)
                .copied()
                .unwrap_or(container_end);
            if end < offset {
                return Err(anyhow!(CodecError::InvalidData(format!(
                    "texture table offsets not ascending at entry {i}"
                ))));
            }
            reader.seek(SeekFrom::Start(offset))?;
            let mut blob = vec![0u8; (end - offset) as usize];
            reader.read_exact(&mut blob)?;
            textures.push(blob);
        }
        Ok(Self {
            flags: raw.header.flags,
            user_id: raw.header.user_id,
            key_frames: raw.key_frames,
            textures,
        })
    }

    pub fn write<W: Write + Seek>(&self, writer: &mut W) -> Result<()> {
        // Blobs have no length field, so they are written back-to-back: the
        // gap between table offsets must be the exact blob extent.
        write_container(
            writer,
            SPR4_TAG,
            self.flags,
            self.user_id,
            &self.key_frames,
            &self.textures,
            1,
            |w, blob| {
                w.write_all(blob)?;
                Ok(())
            },
        )
    }
}

impl Resource for SprFile {
    fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        Self::read(&mut cursor).context("failed to decode SPR container")
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        let mut cursor = Cursor::new(&mut data);
        self.write(&mut cursor).context("failed to encode SPR container")?;
        Ok(data)
    }
}

impl Resource for Spr4File {
    fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        Self::read(&mut cursor).context("failed to decode SPR4 container")
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        let mut cursor = Cursor::new(&mut data);
        self.write(&mut cursor).context("failed to encode SPR4 container")?;
        Ok(data)
    }
}
