//! Binary chunk frames: 4-byte big-endian header length + JSON header + raw bytes.
//!
//! Carries the same fields as a `file-chunk` message without the base64
//! overhead on the chunk bytes.

use serde::{Deserialize, Serialize};

/// Header of a binary chunk frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinaryChunkHeader {
    pub transfer_id: String,
    pub chunk_index: u32,
    /// 0 when the client does not announce a chunk count.
    #[serde(default)]
    pub total_chunks: u32,
}

/// A parsed binary chunk frame.
#[derive(Debug)]
pub struct BinaryChunk {
    pub header: BinaryChunkHeader,
    pub data: Vec<u8>,
}

/// Parses a raw binary WebSocket frame.
///
/// Wire format: `[4 bytes: header_len (big-endian)][header_len bytes: JSON][rest: payload]`
pub fn parse_binary_chunk(frame: &[u8]) -> Result<BinaryChunk, ParseError> {
    let Some((len_bytes, rest)) = frame.split_first_chunk::<4>() else {
        return Err(ParseError::TooShort);
    };
    let header_len = u32::from_be_bytes(*len_bytes) as usize;

    if rest.len() < header_len {
        return Err(ParseError::HeaderTruncated {
            expected: header_len,
            got: rest.len(),
        });
    }

    let (header_bytes, payload) = rest.split_at(header_len);
    let header: BinaryChunkHeader =
        serde_json::from_slice(header_bytes).map_err(|e| ParseError::InvalidJson(e.to_string()))?;

    Ok(BinaryChunk {
        header,
        data: payload.to_vec(),
    })
}

/// Encodes a chunk as a binary frame.
pub fn encode_binary_chunk(
    header: &BinaryChunkHeader,
    payload: &[u8],
) -> Result<Vec<u8>, serde_json::Error> {
    let header_json = serde_json::to_vec(header)?;
    let header_len = header_json.len() as u32;

    let mut buf = Vec::with_capacity(4 + header_json.len() + payload.len());
    buf.extend_from_slice(&header_len.to_be_bytes());
    buf.extend_from_slice(&header_json);
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Errors from binary frame parsing.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("message too short (need at least 4 bytes)")]
    TooShort,

    #[error("header truncated: expected {expected} bytes, got {got}")]
    HeaderTruncated { expected: usize, got: usize },

    #[error("invalid header JSON: {0}")]
    InvalidJson(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_binary_frame(header: &[u8], payload: &[u8]) -> Vec<u8> {
        let len = header.len() as u32;
        let mut buf = Vec::new();
        buf.extend_from_slice(&len.to_be_bytes());
        buf.extend_from_slice(header);
        buf.extend_from_slice(payload);
        buf
    }

    #[test]
    fn parse_chunk_frame() {
        let header = serde_json::to_vec(&serde_json::json!({
            "transferId": "t-1",
            "chunkIndex": 3,
            "totalChunks": 8
        }))
        .unwrap();
        let payload = b"binary data here";

        let chunk = parse_binary_chunk(&make_binary_frame(&header, payload)).unwrap();
        assert_eq!(chunk.header.transfer_id, "t-1");
        assert_eq!(chunk.header.chunk_index, 3);
        assert_eq!(chunk.header.total_chunks, 8);
        assert_eq!(chunk.data, payload);
    }

    #[test]
    fn total_chunks_is_optional() {
        let header = br#"{"transferId":"t-2","chunkIndex":0}"#;
        let chunk = parse_binary_chunk(&make_binary_frame(header, b"x")).unwrap();
        assert_eq!(chunk.header.total_chunks, 0);
    }

    #[test]
    fn parse_too_short() {
        let result = parse_binary_chunk(&[0, 0, 0]);
        assert!(matches!(result, Err(ParseError::TooShort)));
    }

    #[test]
    fn parse_header_truncated() {
        // Header says 100 bytes but only has 5.
        let data = [0, 0, 0, 100, 1, 2, 3, 4, 5];
        let result = parse_binary_chunk(&data);
        assert!(matches!(
            result,
            Err(ParseError::HeaderTruncated {
                expected: 100,
                got: 5
            })
        ));
    }

    #[test]
    fn parse_invalid_json() {
        let frame = make_binary_frame(b"not json", b"payload");
        let result = parse_binary_chunk(&frame);
        assert!(matches!(result, Err(ParseError::InvalidJson(_))));
    }

    #[test]
    fn missing_transfer_id_is_invalid() {
        let frame = make_binary_frame(br#"{"chunkIndex":0}"#, b"payload");
        assert!(matches!(
            parse_binary_chunk(&frame),
            Err(ParseError::InvalidJson(_))
        ));
    }

    #[test]
    fn encoded_frame_parses_back() {
        let header = BinaryChunkHeader {
            transfer_id: "t-3".into(),
            chunk_index: 1,
            total_chunks: 2,
        };
        let encoded = encode_binary_chunk(&header, b"roundtrip data").unwrap();
        let parsed = parse_binary_chunk(&encoded).unwrap();
        assert_eq!(parsed.header, header);
        assert_eq!(parsed.data, b"roundtrip data");
    }

    #[test]
    fn empty_payload() {
        let header = br#"{"transferId":"t-4","chunkIndex":0,"totalChunks":1}"#;
        let chunk = parse_binary_chunk(&make_binary_frame(header, &[])).unwrap();
        assert!(chunk.data.is_empty());
    }
}
