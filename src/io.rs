use std::io::{Read, Seek, SeekFrom, Write};

use anyhow::{anyhow, Result};
use binrw::binrw;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use encoding_rs::SHIFT_JIS;

/// Fixed chunk header shared by every Atlus container format.
///
/// `length` covers the whole chunk including this header; encoders write it
/// as zero and backpatch it once the body size is known.
#[binrw]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[br(little)]
#[bw(little)]
pub struct ChunkHeader {
    pub flags: u16,
    pub user_id: u16,
    pub length: i32,
    pub tag: [u8; 4],
}

impl ChunkHeader {
    pub const SIZE: u64 = 12;

    pub fn new(flags: u16, user_id: u16, tag: [u8; 4]) -> Self {
        Self { flags, user_id, length: 0, tag }
    }
}

/// Pointer table entry locating a sub-structure within a container.
#[binrw]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[br(little)]
#[bw(little)]
pub struct PointerEntry {
    pub reserved: i32,
    pub offset: i32,
}

pub fn encode_sjis(s: &str) -> Vec<u8> {
    let (bytes, _, _) = SHIFT_JIS.encode(s);
    bytes.into_owned()
}

pub fn decode_sjis(bytes: &[u8]) -> String {
    let (s, _, _) = SHIFT_JIS.decode(bytes);
    s.into_owned()
}

/// Largest prefix length of encoded Shift-JIS `bytes` that is at most `max`
/// and does not split a 2-byte sequence.
fn sjis_boundary(bytes: &[u8], max: usize) -> usize {
    let mut i = 0;
    while i < max && i < bytes.len() {
        let b = bytes[i];
        let step = if (0x81..=0x9F).contains(&b) || (0xE0..=0xFC).contains(&b) {
            2
        } else {
            1
        };
        if i + step > max {
            break;
        }
        i += step;
    }
    i
}

pub trait ReadBinExt: Read + Seek {
    /// Reads a null-terminated Shift-JIS string.
    fn read_cstring_sjis(&mut self) -> Result<String> {
        let mut bytes = Vec::new();
        loop {
            let b = self.read_u8()?;
            if b == 0 {
                break;
            }
            bytes.push(b);
        }
        Ok(decode_sjis(&bytes))
    }

    /// Reads a fixed-width Shift-JIS field, trimming trailing nulls.
    fn read_fixed_sjis(&mut self, width: usize) -> Result<String> {
        let mut buf = vec![0u8; width];
        self.read_exact(&mut buf)?;
        let end = buf.iter().rposition(|&b| b != 0).map_or(0, |p| p + 1);
        Ok(decode_sjis(&buf[..end]))
    }

    fn read_pointer_table(&mut self, count: usize) -> Result<Vec<PointerEntry>> {
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let reserved = self.read_i32::<LittleEndian>()?;
            let offset = self.read_i32::<LittleEndian>()?;
            entries.push(PointerEntry { reserved, offset });
        }
        Ok(entries)
    }

    /// Seeks forward to the next multiple of `alignment` bytes.
    fn align(&mut self, alignment: u64) -> Result<u64> {
        let pos = self.stream_position()?;
        let rem = pos % alignment;
        if rem != 0 {
            self.seek(SeekFrom::Current((alignment - rem) as i64))?;
        }
        Ok(self.stream_position()?)
    }
}

impl<R: Read + Seek + ?Sized> ReadBinExt for R {}

pub trait WriteBinExt: Write + Seek {
    /// Writes a null-terminated Shift-JIS string.
    fn write_cstring_sjis(&mut self, s: &str) -> Result<()> {
        self.write_all(&encode_sjis(s))?;
        self.write_u8(0)?;
        Ok(())
    }

    /// Writes a Shift-JIS string into a fixed-width zero-padded field.
    ///
    /// A string longer than the field is truncated to at most `width - 1`
    /// bytes, on a character boundary, so a terminator survives and no
    /// 2-byte sequence is split; an exactly-`width`-byte string fills the
    /// field with no terminator.
    fn write_fixed_sjis(&mut self, s: &str, width: usize) -> Result<()> {
        let mut bytes = encode_sjis(s);
        if bytes.len() > width {
            log::warn!(
                "string field overflow ({} bytes > {}), truncating",
                bytes.len(),
                width
            );
            bytes.truncate(sjis_boundary(&bytes, width - 1));
        }
        bytes.resize(width, 0);
        self.write_all(&bytes)?;
        Ok(())
    }

    fn write_pointer_table(&mut self, entries: &[PointerEntry]) -> Result<()> {
        for entry in entries {
            self.write_i32::<LittleEndian>(entry.reserved)?;
            self.write_i32::<LittleEndian>(entry.offset)?;
        }
        Ok(())
    }

    /// Pads with zero bytes to the next multiple of `alignment`.
    fn align_zero(&mut self, alignment: u64) -> Result<u64> {
        let pos = self.stream_position()?;
        let rem = pos % alignment;
        if rem != 0 {
            let pad = alignment - rem;
            for _ in 0..pad {
                self.write_u8(0)?;
            }
        }
        Ok(self.stream_position()?)
    }

    /// Overwrites a previously reserved u32 field, restoring the position.
    fn backpatch_u32(&mut self, at: u64, value: u32) -> Result<()> {
        let saved = self.stream_position()?;
        self.seek(SeekFrom::Start(at))?;
        self.write_u32::<LittleEndian>(value)?;
        self.seek(SeekFrom::Start(saved))?;
        Ok(())
    }

    fn backpatch_i32(&mut self, at: u64, value: i32) -> Result<()> {
        let saved = self.stream_position()?;
        self.seek(SeekFrom::Start(at))?;
        self.write_i32::<LittleEndian>(value)?;
        self.seek(SeekFrom::Start(saved))?;
        Ok(())
    }
}

impl<W: Write + Seek + ?Sized> WriteBinExt for W {}

/// Validates that a container-relative offset lands inside the declared
/// chunk length.
pub fn check_offset(offset: i64, length: i64, what: &str) -> Result<()> {
    if offset < 0 || (length > 0 && offset > length) {
        return Err(anyhow!(crate::error::CodecError::InvalidData(format!(
            "{what} offset {offset:#x} outside container length {length:#x}"
        ))));
    }
    Ok(())
}
