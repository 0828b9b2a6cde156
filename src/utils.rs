//! Utility functions for decoding and formatting

use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};

/// Decode base64 the way subscription providers actually emit it
///
/// Whitespace and line breaks are ignored, and both the standard and URL-safe
/// alphabets are accepted with or without padding.
///
/// # Examples
///
/// ```
/// use linkspeed::utils::decode_base64;
///
/// assert_eq!(decode_base64("aGVsbG8=").unwrap(), b"hello");
/// assert_eq!(decode_base64("aGVs\nbG8").unwrap(), b"hello");
/// ```
pub fn decode_base64(input: &str) -> Result<Vec<u8>> {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Err(Error::Decode("empty base64 payload".to_string()));
    }

    let unpadded = compact.trim_end_matches('=');
    let url_safe = compact.contains(['-', '_']);
    let attempt = if url_safe {
        URL_SAFE
            .decode(&compact)
            .or_else(|_| URL_SAFE_NO_PAD.decode(unpadded))
    } else {
        STANDARD
            .decode(&compact)
            .or_else(|_| STANDARD_NO_PAD.decode(unpadded))
    };

    attempt.map_err(|e| Error::Decode(format!("invalid base64 payload: {}", e)))
}

/// Decode base64 into UTF-8 text
pub fn decode_base64_text(input: &str) -> Result<String> {
    let bytes = decode_base64(input)?;
    String::from_utf8(bytes).map_err(|e| Error::Decode(format!("payload is not UTF-8: {}", e)))
}

/// Format a byte count with binary (IEC) units, e.g. `1.5 MiB`
///
/// # Examples
///
/// ```
/// use linkspeed::utils::byte_count_iec;
///
/// assert_eq!(byte_count_iec(512), "512 B");
/// assert_eq!(byte_count_iec(1536), "1.5 KiB");
/// ```
pub fn byte_count_iec(bytes: i64) -> String {
    const UNIT: i64 = 1024;
    if bytes < UNIT {
        return format!("{} B", bytes);
    }
    let mut div = UNIT;
    let mut exp = 0;
    let mut n = bytes / UNIT;
    while n >= UNIT && exp < 5 {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    let suffix = ["K", "M", "G", "T", "P", "E"][exp];
    format!("{:.1} {}iB", bytes as f64 / div as f64, suffix)
}
