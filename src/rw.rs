//! RenderWare stream nodes: a generic recursive `{type, size, version}`
//! envelope. Known composite types parse their body as child nodes; unknown
//! types round-trip as raw bytes.

use std::io::{Cursor, Read, Seek, Write};

use anyhow::{anyhow, Context, Result};
use binrw::{binrw, BinReaderExt, BinWriterExt};

use crate::error::CodecError;
use crate::Resource;

pub const NODE_STRUCT: u32 = 0x01;
pub const NODE_STRING: u32 = 0x02;
pub const NODE_EXTENSION: u32 = 0x03;
pub const NODE_MATERIAL: u32 = 0x07;
pub const NODE_MATERIAL_LIST: u32 = 0x08;
pub const NODE_FRAME_LIST: u32 = 0x0E;
pub const NODE_GEOMETRY: u32 = 0x0F;
pub const NODE_CLUMP: u32 = 0x10;
pub const NODE_ATOMIC: u32 = 0x14;
pub const NODE_TEXTURE_NATIVE: u32 = 0x15;
pub const NODE_GEOMETRY_LIST: u32 = 0x1A;

#[binrw]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[br(little)]
#[bw(little)]
pub struct RwNodeHeader {
    pub node_id: u32,
    /// Body size, excluding this 12-byte header.
    pub size: u32,
    pub version: u32,
}

impl RwNodeHeader {
    pub const SIZE: u64 = 12;
}

#[derive(Debug, Clone, PartialEq)]
pub enum RwNode {
    /// Leaf carrying raw structure data interpreted by its parent type.
    Struct { version: u32, data: Vec<u8> },
    /// Null-padded ASCII name, padded to a 4-byte boundary on write.
    String { version: u32, value: String },
    /// Known composite node: body is a sequence of children.
    Composite {
        node_id: u32,
        version: u32,
        children: Vec<RwNode>,
    },
    /// Unknown node id, body preserved byte-for-byte.
    Raw {
        node_id: u32,
        version: u32,
        data: Vec<u8>,
    },
}

fn is_composite(node_id: u32) -> bool {
    matches!(
        node_id,
        NODE_EXTENSION
            | NODE_MATERIAL
            | NODE_MATERIAL_LIST
            | NODE_FRAME_LIST
            | NODE_GEOMETRY
            | NODE_CLUMP
            | NODE_ATOMIC
            | NODE_TEXTURE_NATIVE
            | NODE_GEOMETRY_LIST
    )
}

impl RwNode {
    pub fn node_id(&self) -> u32 {
        match self {
            RwNode::Struct { .. } => NODE_STRUCT,
            RwNode::String { .. } => NODE_STRING,
            RwNode::Composite { node_id, .. } | RwNode::Raw { node_id, .. } => *node_id,
        }
    }

    pub fn version(&self) -> u32 {
        match self {
            RwNode::Struct { version, .. }
            | RwNode::String { version, .. }
            | RwNode::Composite { version, .. }
            | RwNode::Raw { version, .. } => *version,
        }
    }

    pub fn read<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        let header: RwNodeHeader = reader
            .read_le()
            .context("failed to read RenderWare node header")?;
        let mut body = vec![0u8; header.size as usize];
        reader.read_exact(&mut body).with_context(|| {
            format!(
                "node {:#x} declares {} body bytes past end of stream",
                header.node_id, header.size
            )
        })?;

        match header.node_id {
            NODE_STRUCT => Ok(RwNode::Struct { version: header.version, data: body }),
            NODE_STRING => {
                let end = body.iter().position(|&b| b == 0).unwrap_or(body.len());
                Ok(RwNode::String {
                    version: header.version,
                    value: String::from_utf8_lossy(&body[..end]).into_owned(),
                })
            }
            id if is_composite(id) => {
                let mut children = Vec::new();
                let mut cursor = Cursor::new(&body[..]);
                while (cursor.position() as usize) < body.len() {
                    let remaining = body.len() as u64 - cursor.position();
                    if remaining < RwNodeHeader::SIZE {
                        return Err(anyhow!(CodecError::InvalidData(format!(
                            "child sequence of node {id:#x} leaves {remaining} trailing bytes"
                        ))));
                    }
                    children.push(RwNode::read(&mut cursor)?);
                }
                Ok(RwNode::Composite {
                    node_id: id,
                    version: header.version,
                    children,
                })
            }
            id => Ok(RwNode::Raw { node_id: id, version: header.version, data: body }),
        }
    }

    pub fn write<W: Write + Seek>(&self, writer: &mut W) -> Result<()> {
        // Children are serialized first so the header carries an exact size.
        let body = self.body_bytes()?;
        let header = RwNodeHeader {
            node_id: self.node_id(),
            size: body.len() as u32,
            version: self.version(),
        };
        writer.write_le(&header)?;
        writer.write_all(&body)?;
        Ok(())
    }

    fn body_bytes(&self) -> Result<Vec<u8>> {
        match self {
            RwNode::Struct { data, .. } | RwNode::Raw { data, .. } => Ok(data.clone()),
            RwNode::String { value, .. } => {
                let mut bytes = value.as_bytes().to_vec();
                bytes.push(0);
                while bytes.len() % 4 != 0 {
                    bytes.push(0);
                }
                Ok(bytes)
            }
            RwNode::Composite { children, .. } => {
                let mut body = Vec::new();
                let mut cursor = Cursor::new(&mut body);
                for child in children {
                    child.write(&mut cursor)?;
                }
                Ok(body)
            }
        }
    }
}

impl Resource for RwNode {
    fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        Self::read(&mut cursor).context("failed to decode RenderWare node")
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        let mut cursor = Cursor::new(&mut data);
        self.write(&mut cursor).context("failed to encode RenderWare node")?;
        Ok(data)
    }
}
