//! BF bytecode container: a typed-table header locating procedure and jump
//! label tables, the flat opcode stream, an optional embedded MSG1 dialogue
//! container, and a raw string block.

pub mod assembler;
pub mod disassembler;
pub mod opcode;

use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use anyhow::{anyhow, Context, Result};
use binrw::{binrw, BinReaderExt, BinWriterExt};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::bmd::MessageScript;
use crate::error::CodecError;
use crate::io::{check_offset, ChunkHeader, ReadBinExt, WriteBinExt};
use crate::Resource;

pub use assembler::assemble;
pub use disassembler::disassemble;
pub use opcode::{Instruction, Opcode, Operand};

pub const BF_TAG: [u8; 4] = *b"FLW0";

const SECTION_COUNT: u32 = 5;
const SECTION_PROCEDURES: u32 = 0;
const SECTION_JUMPS: u32 = 1;
const SECTION_OPCODES: u32 = 2;
const SECTION_MESSAGES: u32 = 3;
const SECTION_STRINGS: u32 = 4;

const LABEL_NAME_WIDTH: usize = 24;
const LABEL_RECORD_SIZE: u32 = 32;

#[binrw]
#[derive(Debug, Clone, Copy, Default)]
#[br(little)]
#[bw(little)]
struct SectionEntry {
    kind: u32,
    element_length: u32,
    element_count: u32,
    data_offset: u32,
}

/// A named position in the opcode list. On disk the position is a word
/// offset; in the model it is the logical opcode index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub name: String,
    pub opcode_index: u32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FlowScript {
    pub user_id: u16,
    pub local_int_count: u16,
    pub local_float_count: u16,
    pub procedures: Vec<Label>,
    pub jumps: Vec<Label>,
    pub opcodes: Vec<Opcode>,
    pub messages: Option<MessageScript>,
    pub strings: Vec<u8>,
}

impl FlowScript {
    pub fn read<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        let base = reader.stream_position()?;
        let header: ChunkHeader = reader.read_le().context("failed to read BF chunk header")?;
        if header.tag != BF_TAG {
            return Err(anyhow!(CodecError::mismatch(&BF_TAG, &header.tag)));
        }
        let section_count = reader.read_u32::<LittleEndian>()?;
        let local_int_count = reader.read_u16::<LittleEndian>()?;
        let local_float_count = reader.read_u16::<LittleEndian>()?;
        let _endianness = reader.read_u16::<LittleEndian>()?;
        let _unused = reader.read_u16::<LittleEndian>()?;
        let _padding = reader.read_u32::<LittleEndian>()?;
        let _padding = reader.read_u32::<LittleEndian>()?;

        let mut sections = Vec::with_capacity(section_count as usize);
        for _ in 0..section_count {
            let entry: SectionEntry = reader.read_le()?;
            check_offset(entry.data_offset as i64, header.length as i64, "section")?;
            sections.push(entry);
        }

        let mut raw_procedures = Vec::new();
        let mut raw_jumps = Vec::new();
        let mut words = Vec::new();
        let mut messages = None;
        let mut strings = Vec::new();

        for entry in &sections {
            reader.seek(SeekFrom::Start(base + entry.data_offset as u64))?;
            match entry.kind {
                SECTION_PROCEDURES => {
                    raw_procedures = read_label_records(reader, entry.element_count as usize)?;
                }
                SECTION_JUMPS => {
                    raw_jumps = read_label_records(reader, entry.element_count as usize)?;
                }
                SECTION_OPCODES => {
                    words.reserve(entry.element_count as usize);
                    for _ in 0..entry.element_count {
                        words.push(reader.read_u32::<LittleEndian>()?);
                    }
                }
                SECTION_MESSAGES => {
                    if entry.element_count > 0 {
                        let mut blob = vec![0u8; entry.element_count as usize];
                        reader.read_exact(&mut blob)?;
                        messages = Some(
                            MessageScript::from_bytes(&blob)
                                .context("failed to decode embedded message container")?,
                        );
                    }
                }
                SECTION_STRINGS => {
                    strings = vec![0u8; entry.element_count as usize];
                    reader.read_exact(&mut strings)?;
                }
                other => {
                    return Err(anyhow!(CodecError::NotImplemented(format!(
                        "BF section kind {other}"
                    ))))
                }
            }
        }

        let (opcodes, word_offsets) = parse_opcodes(&words)?;
        let procedures = fixup_labels(raw_procedures, &word_offsets)?;
        let jumps = fixup_labels(raw_jumps, &word_offsets)?;

        Ok(Self {
            user_id: header.user_id,
            local_int_count,
            local_float_count,
            procedures,
            jumps,
            opcodes,
            messages,
            strings,
        })
    }

    pub fn write<W: Write + Seek>(&self, writer: &mut W) -> Result<()> {
        let base = writer.stream_position()?;
        let header = ChunkHeader::new(0, self.user_id, BF_TAG);
        writer.write_le(&header)?;
        writer.write_u32::<LittleEndian>(SECTION_COUNT)?;
        writer.write_u16::<LittleEndian>(self.local_int_count)?;
        writer.write_u16::<LittleEndian>(self.local_float_count)?;
        writer.write_u16::<LittleEndian>(0)?; // endianness
        writer.write_u16::<LittleEndian>(0)?;
        writer.write_u32::<LittleEndian>(0)?;
        writer.write_u32::<LittleEndian>(0)?;

        let table_pos = writer.stream_position()?;
        for _ in 0..SECTION_COUNT {
            writer.write_le(&SectionEntry::default())?;
        }

        // Word offsets for converting label indices back to disk form.
        let mut word_offsets = Vec::with_capacity(self.opcodes.len());
        let mut next = 0u32;
        for op in &self.opcodes {
            word_offsets.push(next);
            next += op.word_size();
        }

        let mut entries = Vec::with_capacity(SECTION_COUNT as usize);

        let pos = writer.align_zero(16)?;
        entries.push(SectionEntry {
            kind: SECTION_PROCEDURES,
            element_length: LABEL_RECORD_SIZE,
            element_count: self.procedures.len() as u32,
            data_offset: (pos - base) as u32,
        });
        write_label_records(writer, &self.procedures, &word_offsets)?;

        let pos = writer.align_zero(16)?;
        entries.push(SectionEntry {
            kind: SECTION_JUMPS,
            element_length: LABEL_RECORD_SIZE,
            element_count: self.jumps.len() as u32,
            data_offset: (pos - base) as u32,
        });
        write_label_records(writer, &self.jumps, &word_offsets)?;

        let pos = writer.align_zero(16)?;
        entries.push(SectionEntry {
            kind: SECTION_OPCODES,
            element_length: 4,
            element_count: next,
            data_offset: (pos - base) as u32,
        });
        for op in &self.opcodes {
            write_opcode(writer, op)?;
        }

        let pos = writer.align_zero(16)?;
        let message_blob = match &self.messages {
            Some(script) => script.to_bytes()?,
            None => Vec::new(),
        };
        entries.push(SectionEntry {
            kind: SECTION_MESSAGES,
            element_length: 1,
            element_count: message_blob.len() as u32,
            data_offset: (pos - base) as u32,
        });
        writer.write_all(&message_blob)?;

        let pos = writer.align_zero(16)?;
        entries.push(SectionEntry {
            kind: SECTION_STRINGS,
            element_length: 1,
            element_count: self.strings.len() as u32,
            data_offset: (pos - base) as u32,
        });
        writer.write_all(&self.strings)?;

        let end = writer.stream_position()?;
        writer.seek(SeekFrom::Start(table_pos))?;
        for entry in &entries {
            writer.write_le(entry)?;
        }
        writer.seek(SeekFrom::Start(end))?;
        writer.backpatch_i32(base + 4, (end - base) as i32)?;
        Ok(())
    }
}

fn read_label_records<R: Read + Seek>(reader: &mut R, count: usize) -> Result<Vec<(String, u32)>> {
    let mut records = Vec::with_capacity(count);
    for _ in 0..count {
        let name = reader.read_fixed_sjis(LABEL_NAME_WIDTH)?;
        let offset = reader.read_u32::<LittleEndian>()?;
        let _reserved = reader.read_u32::<LittleEndian>()?;
        records.push((name, offset));
    }
    Ok(records)
}

fn write_label_records<W: Write + Seek>(
    writer: &mut W,
    labels: &[Label],
    word_offsets: &[u32],
) -> Result<()> {
    for label in labels {
        let offset = word_offsets.get(label.opcode_index as usize).ok_or_else(|| {
            anyhow!(CodecError::InvalidData(format!(
                "label '{}' targets opcode {} beyond the opcode list",
                label.name, label.opcode_index
            )))
        })?;
        writer.write_fixed_sjis(&label.name, LABEL_NAME_WIDTH)?;
        writer.write_u32::<LittleEndian>(*offset)?;
        writer.write_u32::<LittleEndian>(0)?;
    }
    Ok(())
}

/// Scans the flat word stream into opcodes, returning the word offset of
/// each parsed opcode for label fixup.
fn parse_opcodes(words: &[u32]) -> Result<(Vec<Opcode>, Vec<u32>)> {
    let mut opcodes = Vec::new();
    let mut word_offsets = Vec::new();
    let mut i = 0usize;
    while i < words.len() {
        let word = words[i];
        let instruction = Instruction::from_u16((word & 0xFFFF) as u16);
        word_offsets.push(i as u32);
        if instruction.is_extended() {
            let literal = *words.get(i + 1).ok_or_else(|| {
                anyhow!(CodecError::InvalidData(
                    "opcode stream ends inside a push literal".into()
                ))
            })?;
            let operand = match instruction {
                Instruction::PushFloat => Operand::Float(f32::from_bits(literal)),
                _ => Operand::Int(literal),
            };
            opcodes.push(Opcode::new(instruction, operand));
            i += 2;
        } else {
            let operand = if instruction.is_zero_operand() {
                Operand::None
            } else {
                Operand::Short((word >> 16) as u16)
            };
            opcodes.push(Opcode::new(instruction, operand));
            i += 1;
        }
    }
    Ok((opcodes, word_offsets))
}

fn write_opcode<W: Write + Seek>(writer: &mut W, op: &Opcode) -> Result<()> {
    let low = op.instruction.value() as u32;
    if op.instruction.is_extended() {
        let literal = match op.operand {
            Operand::Int(v) => v,
            Operand::Float(f) => f.to_bits(),
            other => {
                return Err(anyhow!(CodecError::InvalidData(format!(
                    "{:?} requires a literal operand, found {other:?}",
                    op.instruction
                ))))
            }
        };
        writer.write_u32::<LittleEndian>(low)?;
        writer.write_u32::<LittleEndian>(literal)?;
    } else {
        let short = match op.operand {
            Operand::None => 0,
            Operand::Short(s) => s as u32,
            other => {
                return Err(anyhow!(CodecError::InvalidData(format!(
                    "{:?} cannot carry operand {other:?}",
                    op.instruction
                ))))
            }
        };
        writer.write_u32::<LittleEndian>(low | (short << 16))?;
    }
    Ok(())
}

/// Labels are recorded by word offset on disk but consumers address the
/// logical opcode list, so each offset is re-resolved by linear search.
fn fixup_labels(records: Vec<(String, u32)>, word_offsets: &[u32]) -> Result<Vec<Label>> {
    records
        .into_iter()
        .map(|(name, offset)| {
            let opcode_index = word_offsets
                .iter()
                .position(|&w| w == offset)
                .ok_or_else(|| {
                    anyhow!(CodecError::InvalidData(format!(
                        "label '{name}' word offset {offset} is not an opcode boundary"
                    )))
                })?;
            Ok(Label { name, opcode_index: opcode_index as u32 })
        })
        .collect()
}

impl Resource for FlowScript {
    fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        Self::read(&mut cursor).context("failed to decode BF container")
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        let mut cursor = Cursor::new(&mut data);
        self.write(&mut cursor).context("failed to encode BF container")?;
        Ok(data)
    }
}
