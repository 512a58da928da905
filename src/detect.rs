//! Format sniffing and decode dispatch: a plain ordered table of
//! `(extension, validator)` pairs, and the typed decode entry point the
//! resource factory calls.

use anyhow::Result;
use byteorder::{ByteOrder, LittleEndian};

use crate::bf::FlowScript;
use crate::bmd::MessageScript;
use crate::rw::{self, RwNodeHeader};
use crate::spr::{Spr4File, SprFile};
use crate::tmx::TmxTexture;
use crate::Resource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Tmx,
    Spr,
    Spr4,
    Bmd,
    Bf,
    Rws,
}

fn tag_at_8(data: &[u8], tag: &[u8; 4]) -> bool {
    data.len() >= 12 && &data[8..12] == tag
}

fn validate_rws(data: &[u8]) -> bool {
    if data.len() < RwNodeHeader::SIZE as usize {
        return false;
    }
    let node_id = LittleEndian::read_u32(&data[0..4]);
    let size = LittleEndian::read_u32(&data[4..8]) as usize;
    node_id == rw::NODE_CLUMP && data.len() >= RwNodeHeader::SIZE as usize + size
}

/// Detection table, checked in order. Extensions are for the factory's
/// extension-first lookup; validators check the byte signature.
pub static FORMATS: &[(&str, FileFormat, fn(&[u8]) -> bool)] = &[
    ("tmx", FileFormat::Tmx, |d| tag_at_8(d, b"TMX0")),
    ("spr", FileFormat::Spr, |d| tag_at_8(d, b"SPR0")),
    ("spr4", FileFormat::Spr4, |d| tag_at_8(d, b"SPR4")),
    ("bmd", FileFormat::Bmd, |d| tag_at_8(d, b"MSG1")),
    ("msg", FileFormat::Bmd, |d| tag_at_8(d, b"MSG1")),
    ("bf", FileFormat::Bf, |d| tag_at_8(d, b"FLW0")),
    ("rws", FileFormat::Rws, validate_rws),
    ("dff", FileFormat::Rws, validate_rws),
];

/// Signature-only detection, first match wins.
pub fn detect(data: &[u8]) -> Option<FileFormat> {
    FORMATS
        .iter()
        .find(|entry| (entry.2)(data))
        .map(|entry| entry.1)
}

/// Extension-first detection: formats registered under `extension` are
/// validated before the rest of the table.
pub fn detect_with_extension(extension: &str, data: &[u8]) -> Option<FileFormat> {
    let extension = extension.to_ascii_lowercase();
    FORMATS
        .iter()
        .filter(|entry| entry.0 == extension)
        .chain(FORMATS.iter().filter(|entry| entry.0 != extension))
        .find(|entry| (entry.2)(data))
        .map(|entry| entry.1)
}

/// A decoded file of any supported format.
#[derive(Debug)]
pub enum TypedFile {
    Tmx(TmxTexture),
    Spr(SprFile),
    Spr4(Spr4File),
    Bmd(MessageScript),
    Bf(FlowScript),
    Rws(rw::RwNode),
}

impl TypedFile {
    pub fn from_bytes(format: FileFormat, data: &[u8]) -> Result<Self> {
        Ok(match format {
            FileFormat::Tmx => TypedFile::Tmx(TmxTexture::from_bytes(data)?),
            FileFormat::Spr => TypedFile::Spr(SprFile::from_bytes(data)?),
            FileFormat::Spr4 => TypedFile::Spr4(Spr4File::from_bytes(data)?),
            FileFormat::Bmd => TypedFile::Bmd(MessageScript::from_bytes(data)?),
            FileFormat::Bf => TypedFile::Bf(FlowScript::from_bytes(data)?),
            FileFormat::Rws => TypedFile::Rws(rw::RwNode::from_bytes(data)?),
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        match self {
            TypedFile::Tmx(f) => f.to_bytes(),
            TypedFile::Spr(f) => f.to_bytes(),
            TypedFile::Spr4(f) => f.to_bytes(),
            TypedFile::Bmd(f) => f.to_bytes(),
            TypedFile::Bf(f) => f.to_bytes(),
            TypedFile::Rws(f) => f.to_bytes(),
        }
    }
}
