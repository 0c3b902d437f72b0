//! Overlay (danmaku) payload decoding
//!
//! The comment track arrives either as plain XML or as raw-deflate compressed
//! XML. The two are told apart by the first byte.

use bytes::Bytes;
use flate2::{Decompress, FlushDecompress, Status};
use thiserror::Error;
use tracing::{debug, warn};

/// Leading byte of an XML document
const XML_MARKER: u8 = b'<';

/// Output growth step while inflating
const CHUNK_SIZE: usize = 8 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OverlayFormatError {
    #[error("Overlay payload is empty")]
    Empty,
}

/// Decode a raw overlay payload into XML bytes
///
/// Undecodable payloads are returned unchanged.
pub fn decode(raw: Bytes) -> Result<Bytes, OverlayFormatError> {
    let Some(&first) = raw.first() else {
        return Err(OverlayFormatError::Empty);
    };
    if first == XML_MARKER {
        return Ok(raw);
    }

    match inflate_raw(&raw) {
        Some(decoded) if !decoded.is_empty() => {
            debug!(compressed = raw.len(), decoded = decoded.len(), "Inflated overlay payload");
            Ok(Bytes::from(decoded))
        }
        _ => Ok(raw),
    }
}

/// Raw deflate (no zlib header) until end of stream
///
/// A truncated stream yields what was recovered so far. `None` on corrupt
/// input.
fn inflate_raw(input: &[u8]) -> Option<Vec<u8>> {
    let mut inflater = Decompress::new(false);
    let mut out = Vec::with_capacity(input.len().saturating_mul(4).max(CHUNK_SIZE));

    loop {
        let consumed = usize::try_from(inflater.total_in()).ok()?;
        let produced = inflater.total_out();
        out.reserve(CHUNK_SIZE);

        match inflater.decompress_vec(&input[consumed..], &mut out, FlushDecompress::None) {
            Ok(Status::StreamEnd) => break,
            // Needs more input than there is
            Ok(Status::BufError) => break,
            Ok(Status::Ok) => {
                if inflater.total_in() == consumed as u64 && inflater.total_out() == produced {
                    break;
                }
            }
            Err(e) if e.needs_dictionary().is_some() => break,
            Err(e) => {
                warn!(error = %e, "Overlay payload is not valid deflate data");
                return None;
            }
        }
    }

    Some(out)
}
