//! BMD/MSG dialogue container: standard and selection messages holding
//! dialog pages of interleaved Shift-JIS text and nibble-encoded function
//! tokens, an actor name table, and a compressed pointer-relocation table.

use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use anyhow::{anyhow, Context, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::warn;

use crate::error::CodecError;
use crate::io::{check_offset, decode_sjis, encode_sjis, ChunkHeader, ReadBinExt, WriteBinExt};
use crate::Resource;

pub const BMD_TAG: [u8; 4] = *b"MSG1";

/// All intra-container offsets are relative to this data start address.
pub const DATA_START: u32 = 0x20;

const MESSAGE_NAME_WIDTH: usize = 24;
const FUNCTION_MARKER: u8 = 0xF0;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// A run of Shift-JIS text.
    Text(String),
    /// A function call: 3-bit category, 5-bit id, raw parameter bytes.
    Function { category: u8, id: u8, params: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dialog {
    pub tokens: Vec<Token>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Spoken dialogue, optionally attributed to an actor-table entry.
    Standard {
        name: String,
        actor: Option<u16>,
        dialogs: Vec<Dialog>,
    },
    /// Multi-choice selection; never attributed.
    Selection { name: String, dialogs: Vec<Dialog> },
}

impl Message {
    pub fn name(&self) -> &str {
        match self {
            Message::Standard { name, .. } | Message::Selection { name, .. } => name,
        }
    }

    pub fn dialogs(&self) -> &[Dialog] {
        match self {
            Message::Standard { dialogs, .. } | Message::Selection { dialogs, .. } => dialogs,
        }
    }

    fn kind(&self) -> u32 {
        match self {
            Message::Standard { .. } => 0,
            Message::Selection { .. } => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MessageScript {
    pub user_id: u16,
    pub messages: Vec<Message>,
    pub actors: Vec<String>,
}

// ---------------------------------------------------------------------------
// Relocation table
//
// The serialized container stores rel-0x20 offsets; the engine patches them
// to absolute addresses at load time using this table, a delta encoding of
// every file position holding such an offset. Deltas are escape-coded:
// one byte for 1..=0xFE, 0x00 + u16 for larger, 0x00 + zero u16 + u32 above
// that. The accumulator starts one byte below the data start so a field
// sitting exactly at the data start still gets a nonzero delta.
// ---------------------------------------------------------------------------

pub fn encode_relocations(positions: &[u32], base: u32) -> Vec<u8> {
    let mut sorted = positions.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    sorted.retain(|&pos| pos >= base);
    let mut out = Vec::new();
    let mut prev = base.wrapping_sub(1);
    for pos in sorted {
        let delta = pos - prev;
        if delta <= 0xFE {
            out.push(delta as u8);
        } else if delta <= 0xFFFF {
            out.push(0);
            out.extend_from_slice(&(delta as u16).to_le_bytes());
        } else {
            out.push(0);
            out.extend_from_slice(&0u16.to_le_bytes());
            out.extend_from_slice(&delta.to_le_bytes());
        }
        prev = pos;
    }
    out
}

pub fn decode_relocations(data: &[u8], base: u32) -> Result<Vec<u32>> {
    let mut positions = Vec::new();
    let mut prev = base.wrapping_sub(1);
    let mut cursor = Cursor::new(data);
    while (cursor.position() as usize) < data.len() {
        let b = cursor.read_u8()?;
        let delta = if b != 0 {
            b as u32
        } else {
            let wide = cursor.read_u16::<LittleEndian>()?;
            if wide != 0 {
                wide as u32
            } else {
                cursor.read_u32::<LittleEndian>()?
            }
        };
        if delta == 0 {
            return Err(anyhow!(CodecError::InvalidData(
                "zero delta in relocation table".into()
            )));
        }
        prev += delta;
        positions.push(prev);
    }
    Ok(positions)
}

// ---------------------------------------------------------------------------
// Token stream
// ---------------------------------------------------------------------------

fn read_tokens<R: Read + Seek>(reader: &mut R) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut text = Vec::new();
    loop {
        let b = reader.read_u8()?;
        if b == 0 {
            break;
        }
        if b & 0xF0 == FUNCTION_MARKER {
            if !text.is_empty() {
                tokens.push(Token::Text(decode_sjis(&text)));
                text.clear();
            }
            // Low nibble counts parameter byte pairs, offset by one.
            let param_count = ((b & 0x0F) as usize).saturating_sub(1) * 2;
            let head = reader.read_u8()?;
            let mut params = vec![0u8; param_count];
            reader.read_exact(&mut params)?;
            tokens.push(Token::Function {
                category: head >> 5,
                id: head & 0x1F,
                params,
            });
        } else {
            text.push(b);
            // High-bit bytes begin a 2-byte Shift-JIS sequence.
            if b & 0x80 != 0 {
                text.push(reader.read_u8()?);
            }
        }
    }
    if !text.is_empty() {
        tokens.push(Token::Text(decode_sjis(&text)));
    }
    Ok(tokens)
}

fn write_tokens<W: Write + Seek>(writer: &mut W, tokens: &[Token]) -> Result<()> {
    for token in tokens {
        match token {
            Token::Text(s) => {
                writer.write_all(&encode_sjis(s))?;
            }
            Token::Function { category, id, params } => {
                let mut params = params.clone();
                if params.len() % 2 != 0 {
                    warn!("function token has odd parameter count, padding");
                    params.push(0);
                }
                let pairs = params.len() / 2;
                if pairs + 1 > 0x0F {
                    return Err(anyhow!(CodecError::InvalidData(format!(
                        "function token with {} parameter bytes exceeds encoding range",
                        params.len()
                    ))));
                }
                writer.write_u8(FUNCTION_MARKER | (pairs as u8 + 1))?;
                writer.write_u8((category << 5) | (id & 0x1F))?;
                writer.write_all(&params)?;
            }
        }
    }
    writer.write_u8(0)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Container
// ---------------------------------------------------------------------------

impl MessageScript {
    pub fn read<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        let base = reader.stream_position()?;
        let header: ChunkHeader = binrw::BinReaderExt::read_le(reader)
            .context("failed to read BMD chunk header")?;
        if header.tag != BMD_TAG {
            return Err(anyhow!(CodecError::mismatch(&BMD_TAG, &header.tag)));
        }
        let _unused = reader.read_u32::<LittleEndian>()?;
        let reloc_offset = reader.read_u32::<LittleEndian>()?;
        let reloc_size = reader.read_u32::<LittleEndian>()?;
        let message_count = reader.read_u32::<LittleEndian>()?;
        let _relocated = reader.read_u16::<LittleEndian>()?;
        let _version = reader.read_u16::<LittleEndian>()?;

        let mut message_pointers = Vec::with_capacity(message_count as usize);
        for _ in 0..message_count {
            let kind = reader.read_u32::<LittleEndian>()?;
            let offset = reader.read_u32::<LittleEndian>()?;
            check_offset(offset as i64, header.length as i64, "message")?;
            message_pointers.push((kind, offset));
        }

        let actor_offsets_offset = reader.read_u32::<LittleEndian>()?;
        let actor_count = reader.read_u32::<LittleEndian>()?;
        let _pad = reader.read_u32::<LittleEndian>()?;
        let _pad = reader.read_u32::<LittleEndian>()?;

        let mut actors = Vec::with_capacity(actor_count as usize);
        if actor_count > 0 {
            reader.seek(SeekFrom::Start(base + (DATA_START + actor_offsets_offset) as u64))?;
            let mut name_offsets = Vec::with_capacity(actor_count as usize);
            for _ in 0..actor_count {
                name_offsets.push(reader.read_u32::<LittleEndian>()?);
            }
            for offset in name_offsets {
                check_offset(offset as i64, header.length as i64, "actor name")?;
                reader.seek(SeekFrom::Start(base + (DATA_START + offset) as u64))?;
                actors.push(reader.read_cstring_sjis()?);
            }
        }

        let mut messages = Vec::with_capacity(message_pointers.len());
        for (kind, offset) in message_pointers {
            reader.seek(SeekFrom::Start(base + (DATA_START + offset) as u64))?;
            let message = match kind {
                0 => read_standard(reader, base, header.length)?,
                1 => read_selection(reader, base, header.length)?,
                other => {
                    return Err(anyhow!(CodecError::NotImplemented(format!(
                        "message kind {other}"
                    ))))
                }
            };
            messages.push(message);
        }

        // The table itself is not kept in the model (encode recomputes it),
        // but a malformed one is still a hard error.
        if reloc_size > 0 {
            check_offset(reloc_offset as i64, header.length as i64, "relocation table")?;
            reader.seek(SeekFrom::Start(base + reloc_offset as u64))?;
            let mut table = vec![0u8; reloc_size as usize];
            reader.read_exact(&mut table)?;
            decode_relocations(&table, DATA_START)
                .context("failed to decode relocation table")?;
        }

        Ok(Self {
            user_id: header.user_id,
            messages,
            actors,
        })
    }

    pub fn write<W: Write + Seek>(&self, writer: &mut W) -> Result<()> {
        let base = writer.stream_position()?;
        // Positions (file-relative) of every rel-0x20 offset field written,
        // for the relocation table.
        let mut pointer_fields: Vec<u32> = Vec::new();

        let header = ChunkHeader::new(0x0007, self.user_id, BMD_TAG);
        binrw::BinWriterExt::write_le(writer, &header)?;
        writer.write_u32::<LittleEndian>(0)?; // unused
        let reloc_fixup = writer.stream_position()?;
        writer.write_u32::<LittleEndian>(0)?; // reloc_offset
        writer.write_u32::<LittleEndian>(0)?; // reloc_size
        writer.write_u32::<LittleEndian>(self.messages.len() as u32)?;
        writer.write_u16::<LittleEndian>(0)?; // relocated flag
        writer.write_u16::<LittleEndian>(0x0002)?; // version

        let message_table = writer.stream_position()?;
        for message in &self.messages {
            writer.write_u32::<LittleEndian>(message.kind())?;
            pointer_fields.push((writer.stream_position()? - base) as u32);
            writer.write_u32::<LittleEndian>(0)?;
        }

        let actor_header = writer.stream_position()?;
        pointer_fields.push((actor_header - base) as u32);
        writer.write_u32::<LittleEndian>(0)?; // actor offset table, backpatched
        writer.write_u32::<LittleEndian>(self.actors.len() as u32)?;
        writer.write_u32::<LittleEndian>(0)?;
        writer.write_u32::<LittleEndian>(0)?;

        // Message bodies.
        let mut message_offsets = Vec::with_capacity(self.messages.len());
        for message in &self.messages {
            let pos = writer.align_zero(4)?;
            message_offsets.push((pos - base) as u32 - DATA_START);
            match message {
                Message::Standard { name, actor, dialogs } => {
                    write_message_body(
                        writer,
                        base,
                        name,
                        Some(actor.map_or(0xFFFF, |a| a & 0x7FFF)),
                        dialogs,
                        &mut pointer_fields,
                    )?;
                }
                Message::Selection { name, dialogs } => {
                    write_message_body(writer, base, name, None, dialogs, &mut pointer_fields)?;
                }
            }
        }

        // Actor name table.
        let actor_table_pos = writer.align_zero(4)?;
        let mut name_fixups = Vec::with_capacity(self.actors.len());
        for _ in &self.actors {
            name_fixups.push(writer.stream_position()?);
            pointer_fields.push((writer.stream_position()? - base) as u32);
            writer.write_u32::<LittleEndian>(0)?;
        }
        for (actor, fixup) in self.actors.iter().zip(&name_fixups) {
            let pos = writer.stream_position()?;
            writer.backpatch_u32(*fixup, (pos - base) as u32 - DATA_START)?;
            writer.write_cstring_sjis(actor)?;
        }

        // Relocation table, always last.
        let reloc_pos = writer.align_zero(4)?;
        let reloc = encode_relocations(&pointer_fields, DATA_START);
        writer.write_all(&reloc)?;

        let end = writer.stream_position()?;

        // Backpatch message offsets, actor table offset, reloc fields, length.
        writer.seek(SeekFrom::Start(message_table))?;
        for (message, offset) in self.messages.iter().zip(&message_offsets) {
            writer.write_u32::<LittleEndian>(message.kind())?;
            writer.write_u32::<LittleEndian>(*offset)?;
        }
        writer.write_u32::<LittleEndian>((actor_table_pos - base) as u32 - DATA_START)?;
        writer.seek(SeekFrom::Start(end))?;
        writer.backpatch_u32(reloc_fixup, (reloc_pos - base) as u32)?;
        writer.backpatch_u32(reloc_fixup + 4, reloc.len() as u32)?;
        writer.backpatch_i32(base + 4, (end - base) as i32)?;
        Ok(())
    }
}

fn read_dialogs<R: Read + Seek>(
    reader: &mut R,
    base: u64,
    length: i32,
    count: usize,
) -> Result<Vec<Dialog>> {
    let mut offsets = Vec::with_capacity(count);
    for _ in 0..count {
        let offset = reader.read_u32::<LittleEndian>()?;
        check_offset(offset as i64, length as i64, "dialog page")?;
        offsets.push(offset);
    }
    let _text_size = reader.read_u32::<LittleEndian>()?;
    let mut dialogs = Vec::with_capacity(count);
    for offset in offsets {
        reader.seek(SeekFrom::Start(base + (DATA_START + offset) as u64))?;
        dialogs.push(Dialog { tokens: read_tokens(reader)? });
    }
    Ok(dialogs)
}

fn read_standard<R: Read + Seek>(reader: &mut R, base: u64, length: i32) -> Result<Message> {
    let name = reader.read_fixed_sjis(MESSAGE_NAME_WIDTH)?;
    let page_count = reader.read_u16::<LittleEndian>()?;
    let actor_raw = reader.read_u16::<LittleEndian>()?;
    // The high bit is a non-semantic engine flag.
    let actor = if actor_raw == 0xFFFF {
        None
    } else {
        Some(actor_raw & 0x7FFF)
    };
    let dialogs = read_dialogs(reader, base, length, page_count as usize)?;
    Ok(Message::Standard { name, actor, dialogs })
}

fn read_selection<R: Read + Seek>(reader: &mut R, base: u64, length: i32) -> Result<Message> {
    let name = reader.read_fixed_sjis(MESSAGE_NAME_WIDTH)?;
    let _reserved = reader.read_u16::<LittleEndian>()?;
    let option_count = reader.read_u16::<LittleEndian>()?;
    let _reserved = reader.read_u32::<LittleEndian>()?;
    let dialogs = read_dialogs(reader, base, length, option_count as usize)?;
    Ok(Message::Selection { name, dialogs })
}

/// Writes one message body. `actor` is `Some(raw id)` for standard messages
/// and `None` for selections, which carry a reserved word pair instead.
fn write_message_body<W: Write + Seek>(
    writer: &mut W,
    base: u64,
    name: &str,
    actor: Option<u16>,
    dialogs: &[Dialog],
    pointer_fields: &mut Vec<u32>,
) -> Result<()> {
    writer.write_fixed_sjis(name, MESSAGE_NAME_WIDTH)?;
    match actor {
        Some(id) => {
            writer.write_u16::<LittleEndian>(dialogs.len() as u16)?;
            writer.write_u16::<LittleEndian>(id)?;
        }
        None => {
            writer.write_u16::<LittleEndian>(0)?;
            writer.write_u16::<LittleEndian>(dialogs.len() as u16)?;
            writer.write_u32::<LittleEndian>(0)?;
        }
    }

    let offset_table = writer.stream_position()?;
    for _ in dialogs {
        pointer_fields.push((writer.stream_position()? - base) as u32);
        writer.write_u32::<LittleEndian>(0)?;
    }
    let size_fixup = writer.stream_position()?;
    writer.write_u32::<LittleEndian>(0)?;

    let pages_start = writer.stream_position()?;
    let mut page_offsets = Vec::with_capacity(dialogs.len());
    for dialog in dialogs {
        page_offsets.push((writer.stream_position()? - base) as u32 - DATA_START);
        write_tokens(writer, &dialog.tokens)?;
    }
    let pages_end = writer.align_zero(4)?;

    writer.seek(SeekFrom::Start(offset_table))?;
    for offset in &page_offsets {
        writer.write_u32::<LittleEndian>(*offset)?;
    }
    writer.seek(SeekFrom::Start(pages_end))?;
    writer.backpatch_u32(size_fixup, (pages_end - pages_start) as u32)?;
    Ok(())
}

impl Resource for MessageScript {
    fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        Self::read(&mut cursor).context("failed to decode BMD container")
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        let mut cursor = Cursor::new(&mut data);
        self.write(&mut cursor).context("failed to encode BMD container")?;
        Ok(data)
    }
}
