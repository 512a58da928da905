use thiserror::Error;

/// Distinct failure conditions surfaced by the codecs.
///
/// Codec entry points return `anyhow::Result`; callers that need to tell a
/// wrong-signature file apart from an unsupported variant can downcast to
/// this type.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The tag/signature at a known offset did not match the expected
    /// constant for the type being parsed.
    #[error("format mismatch: expected tag {expected:?}, found {found:?}")]
    FormatMismatch { expected: String, found: String },

    /// A format variant (pixel format, message kind, ...) outside the
    /// supported set.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// An assembler reference that matched no declared label.
    #[error("label not found: '{label}' (line {line})")]
    LabelNotFound { label: String, line: usize },

    /// A structural violation inside an otherwise well-tagged container:
    /// out-of-range pointer, overrunning child node, dangling label offset.
    #[error("invalid data: {0}")]
    InvalidData(String),
}

impl CodecError {
    pub fn mismatch(expected: &[u8; 4], found: &[u8; 4]) -> Self {
        CodecError::FormatMismatch {
            expected: String::from_utf8_lossy(expected).into_owned(),
            found: String::from_utf8_lossy(found).into_owned(),
        }
    }
}
