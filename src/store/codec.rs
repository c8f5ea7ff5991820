//! Result payload codec for the remote tier.
//!
//! Results are serialized to JSON. Payloads above [`COMPRESSION_THRESHOLD`]
//! are gzip-compressed and prefixed with a four-byte marker so the decoder
//! can tell compressed payloads from plain ones. Payloads written before
//! compression existed carry no marker and decode as plain JSON; an empty
//! payload decodes to `None`.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::Result;
use crate::value::QueryResult;

/// Serialized payloads larger than this are stored compressed.
const COMPRESSION_THRESHOLD: usize = 10 * 1024;

/// Prefix identifying a gzip-compressed payload.
const COMPRESSION_MARKER: &[u8; 4] = b"RCZ1";

/// Serialize a result for storage, compressing when it pays off.
pub(crate) fn encode_result(result: &QueryResult) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(result)?;
    if json.len() <= COMPRESSION_THRESHOLD {
        return Ok(json);
    }
    let mut out = Vec::with_capacity(COMPRESSION_MARKER.len() + json.len() / 4);
    out.extend_from_slice(COMPRESSION_MARKER);
    let mut encoder = GzEncoder::new(out, Compression::default());
    encoder.write_all(&json)?;
    Ok(encoder.finish()?)
}

/// Decode a stored payload. Empty payloads mean the result was absent.
pub(crate) fn decode_result(bytes: &[u8]) -> Result<Option<QueryResult>> {
    if bytes.is_empty() {
        return Ok(None);
    }
    if let Some(compressed) = bytes.strip_prefix(COMPRESSION_MARKER) {
        let mut decoder = GzDecoder::new(compressed);
        let mut json = Vec::new();
        decoder.read_to_end(&mut json)?;
        return Ok(Some(serde_json::from_slice(&json)?));
    }
    // No marker: plain JSON, possibly written before compression existed.
    Ok(Some(serde_json::from_slice(bytes)?))
}
