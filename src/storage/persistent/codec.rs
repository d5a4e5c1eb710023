//! Line codec for journal entries.
//!
//! Each line is the CRC32 of the JSON payload (8 lowercase hex digits), one
//! space, and the payload itself:
//!
//! ```text
//! 1c291ca3 {"sequence":1,"recorded_at":"...","record":{...}}
//! ```
//!
//! The checksum covers exactly the payload bytes, so a torn write or a
//! flipped byte anywhere in the line is detected before JSON parsing.

use crc32fast::Hasher;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::PersistenceError;

/// Upper bound on a single line, matching the largest entry we accept.
pub const MAX_LINE_BYTES: usize = 16 * 1024 * 1024;

fn checksum(bytes: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(bytes);
    hasher.finalize()
}

/// Encodes `value` as one newline-terminated journal line.
pub fn encode_line<T: Serialize>(value: &T) -> Result<String, PersistenceError> {
    let json = serde_json::to_string(value).map_err(|e| PersistenceError::Serialization(e.to_string()))?;
    if json.len() > MAX_LINE_BYTES {
        return Err(PersistenceError::Serialization(format!(
            "entry of {} bytes exceeds maximum {MAX_LINE_BYTES}",
            json.len()
        )));
    }
    Ok(format!("{:08x} {json}\n", checksum(json.as_bytes())))
}

/// Decodes one line (without its trailing newline).
///
/// `line_no` is 1-based and only used for error reporting.
pub fn decode_line<T: DeserializeOwned>(line: &str, line_no: usize) -> Result<T, PersistenceError> {
    let corrupt = |reason: String| PersistenceError::Corrupt { line: line_no, reason };

    if line.len() > MAX_LINE_BYTES + 9 {
        return Err(corrupt(format!("line exceeds maximum {MAX_LINE_BYTES} bytes")));
    }
    let (crc_hex, payload) = line
        .split_once(' ')
        .ok_or_else(|| corrupt("missing checksum separator".to_string()))?;
    if crc_hex.len() != 8 {
        return Err(corrupt(format!("malformed checksum '{crc_hex}'")));
    }
    let stored = u32::from_str_radix(crc_hex, 16).map_err(|_| corrupt(format!("malformed checksum '{crc_hex}'")))?;
    let computed = checksum(payload.as_bytes());
    if stored != computed {
        return Err(corrupt(format!(
            "CRC mismatch: stored={stored:08x}, computed={computed:08x}"
        )));
    }
    serde_json::from_str(payload).map_err(|e| corrupt(format!("invalid entry: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_roundtrip() {
        let line = encode_line(&vec!["a", "b"]).unwrap();
        assert!(line.ends_with('\n'));
        let decoded: Vec<String> = decode_line(line.trim_end(), 1).unwrap();
        assert_eq!(decoded, vec!["a", "b"]);
    }

    #[test]
    fn detects_flipped_byte() {
        let line = encode_line(&"payload").unwrap();
        let tampered = line.trim_end().replace("payload", "paylaod");
        let err = decode_line::<String>(&tampered, 7).unwrap_err();
        assert!(matches!(err, PersistenceError::Corrupt { line: 7, ref reason } if reason.contains("CRC")));
    }

    #[test]
    fn rejects_malformed_frames() {
        assert!(decode_line::<String>("no-separator", 1).is_err());
        assert!(decode_line::<String>("zz \"x\"", 1).is_err());
        assert!(decode_line::<String>("", 1).is_err());
    }
}
