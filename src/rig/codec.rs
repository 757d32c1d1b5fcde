use serde_json::Value;
use thiserror::Error;

use crate::error::RigError;

// ─── Container layout constants ───────────────────────────────────────────────

/// "glTF", little-endian.
pub const CONTAINER_MAGIC: u32 = 0x4654_6C67;
pub const CONTAINER_VERSION: u32 = 2;
/// Magic + version + total length, 4 bytes each.
pub const HEADER_LEN: usize = 12;
/// Chunk-length + chunk-tag prefix.
pub const CHUNK_PREFIX_LEN: usize = 8;
/// "JSON".
pub const CHUNK_TAG_STRUCTURAL: u32 = 0x4E4F_534A;
/// "BIN\0".
pub const CHUNK_TAG_BINARY: u32 = 0x004E_4942;

// ─── Errors ───────────────────────────────────────────────────────────────────

/// Why a container buffer could not be parsed.
///
/// Callers recover by falling back to append-only embedding; retrying the
/// parse on the same bytes is never useful.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("container is {actual} bytes, below the {HEADER_LEN}-byte header minimum")]
    BufferTooSmall { actual: usize },

    #[error("unrecognized container magic 0x{found:08X}")]
    BadMagic { found: u32 },

    #[error("unsupported container version {found}")]
    UnsupportedVersion { found: u32 },

    #[error("declared total length {declared} disagrees with buffer length {actual}")]
    TotalLengthMismatch { declared: usize, actual: usize },

    #[error("chunk at offset {offset} needs {needed} bytes but only {available} remain")]
    TruncatedChunk {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("first chunk tag 0x{found:08X} is not a structural chunk")]
    MissingStructuralChunk { found: u32 },

    #[error("structural chunk is not parseable: {0}")]
    MalformedStructuralChunk(#[source] serde_json::Error),
}

// ─── Document ─────────────────────────────────────────────────────────────────

/// A parsed container: the structural chunk as JSON plus the raw binary
/// payload. Owned exclusively by the codec during a parse/serialize cycle
/// and treated as immutable once handed to the analyzer.
#[derive(Debug, Clone)]
pub struct ContainerDocument {
    pub json: Value,
    pub bin: Option<Vec<u8>>,
}

// ─── Parse ────────────────────────────────────────────────────────────────────

fn read_u32_le(bytes: &[u8], offset: usize) -> Option<u32> {
    let slice = bytes.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]))
}

pub(super) fn align4(len: usize) -> usize {
    len.div_ceil(4) * 4
}

/// Parse a container buffer defensively.
///
/// The magic, version and total length are validated first, and every chunk
/// length is cross-checked against the buffer before any payload is copied.
pub fn parse(bytes: &[u8]) -> Result<ContainerDocument, ParseError> {
    if bytes.len() < HEADER_LEN {
        return Err(ParseError::BufferTooSmall {
            actual: bytes.len(),
        });
    }

    let magic = read_u32_le(bytes, 0).unwrap_or(0);
    if magic != CONTAINER_MAGIC {
        return Err(ParseError::BadMagic { found: magic });
    }

    let version = read_u32_le(bytes, 4).unwrap_or(0);
    if version != CONTAINER_VERSION {
        return Err(ParseError::UnsupportedVersion { found: version });
    }

    let declared = read_u32_le(bytes, 8).unwrap_or(0) as usize;
    if declared != bytes.len() {
        return Err(ParseError::TotalLengthMismatch {
            declared,
            actual: bytes.len(),
        });
    }

    let mut offset = HEADER_LEN;

    let (structural_len, structural_tag) =
        read_chunk_prefix(bytes, offset).ok_or(ParseError::TruncatedChunk {
            offset,
            needed: CHUNK_PREFIX_LEN,
            available: bytes.len() - offset,
        })?;
    if structural_tag != CHUNK_TAG_STRUCTURAL {
        return Err(ParseError::MissingStructuralChunk {
            found: structural_tag,
        });
    }
    let payload_start = offset + CHUNK_PREFIX_LEN;
    let payload_end = payload_start.checked_add(structural_len).filter(|end| *end <= bytes.len()).ok_or(
        ParseError::TruncatedChunk {
            offset,
            needed: CHUNK_PREFIX_LEN + structural_len,
            available: bytes.len() - offset,
        },
    )?;

    let json: Value = serde_json::from_slice(&bytes[payload_start..payload_end])
        .map_err(ParseError::MalformedStructuralChunk)?;

    offset = payload_start + align4(structural_len);

    let mut bin = None;
    if let Some((binary_len, binary_tag)) = read_chunk_prefix(bytes, offset) {
        if binary_tag == CHUNK_TAG_BINARY {
            let payload_start = offset + CHUNK_PREFIX_LEN;
            let payload_end = payload_start
                .checked_add(binary_len)
                .filter(|end| *end <= bytes.len())
                .ok_or(ParseError::TruncatedChunk {
                    offset,
                    needed: CHUNK_PREFIX_LEN + binary_len,
                    available: bytes.len() - offset,
                })?;
            bin = Some(bytes[payload_start..payload_end].to_vec());
        }
        // Chunks with unknown tags are tolerated and left untouched.
    }

    Ok(ContainerDocument { json, bin })
}

fn read_chunk_prefix(bytes: &[u8], offset: usize) -> Option<(usize, u32)> {
    let len = read_u32_le(bytes, offset)? as usize;
    let tag = read_u32_le(bytes, offset + 4)?;
    Some((len, tag))
}

// ─── Serialize ────────────────────────────────────────────────────────────────

/// Re-emit a container: header, structural chunk padded with spaces to a
/// 4-byte boundary, then the binary chunk (padded with zeros) when present.
///
/// The header total-length field is verified against the final buffer
/// length before returning; a consumer re-parsing the output must succeed.
pub fn serialize(document: &ContainerDocument) -> Result<Vec<u8>, RigError> {
    let json_bytes = serde_json::to_vec(&document.json)
        .map_err(|err| RigError::SerializationInvariant(format!("structural chunk: {err}")))?;
    let json_padded = align4(json_bytes.len());

    let bin_padded = document
        .bin
        .as_ref()
        .map(|bin| align4(bin.len()))
        .unwrap_or(0);

    let mut total = HEADER_LEN + CHUNK_PREFIX_LEN + json_padded;
    if document.bin.is_some() {
        total += CHUNK_PREFIX_LEN + bin_padded;
    }

    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&CONTAINER_MAGIC.to_le_bytes());
    out.extend_from_slice(&CONTAINER_VERSION.to_le_bytes());
    out.extend_from_slice(&(total as u32).to_le_bytes());

    out.extend_from_slice(&(json_padded as u32).to_le_bytes());
    out.extend_from_slice(&CHUNK_TAG_STRUCTURAL.to_le_bytes());
    out.extend_from_slice(&json_bytes);
    out.resize(out.len() + (json_padded - json_bytes.len()), b' ');

    if let Some(bin) = &document.bin {
        out.extend_from_slice(&(bin_padded as u32).to_le_bytes());
        out.extend_from_slice(&CHUNK_TAG_BINARY.to_le_bytes());
        out.extend_from_slice(bin);
        out.resize(out.len() + (bin_padded - bin.len()), 0);
    }

    let written = read_u32_le(&out, 8).unwrap_or(0) as usize;
    if written != out.len() {
        return Err(RigError::SerializationInvariant(format!(
            "header declares {written} bytes but the buffer holds {}",
            out.len()
        )));
    }

    Ok(out)
}

// ─── Tests ────────────────────────────────────────────────────────────────────
