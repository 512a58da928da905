//! Binary codecs for the PS2-era Atlus asset formats handled by Amicitia:
//! TMX textures, SPR/SPR4 sprite containers, BMD/MSG dialogue scripts, BF
//! bytecode containers (with assembler/disassembler), and RenderWare stream
//! nodes.

pub mod bf;
pub mod bmd;
pub mod detect;
pub mod error;
pub mod io;
pub mod pixel;
pub mod rw;
pub mod spr;
pub mod tmx;

use anyhow::Result;

/// Decode/encode entry points every codec exposes.
pub trait Resource: std::fmt::Debug {
    fn from_bytes(data: &[u8]) -> Result<Self>
    where
        Self: Sized;
    fn to_bytes(&self) -> Result<Vec<u8>>;
}

pub use bf::{assemble, disassemble, FlowScript};
pub use bmd::{Dialog, Message, MessageScript, Token};
pub use detect::{detect, detect_with_extension, FileFormat, TypedFile};
pub use error::CodecError;
pub use pixel::{PixelData, PixelFormat, Rgba};
pub use rw::RwNode;
pub use spr::{KeyFrame, Spr4File, SprFile};
pub use tmx::TmxTexture;
