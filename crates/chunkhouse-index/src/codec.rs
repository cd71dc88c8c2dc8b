//! Order-Preserving Tuple Codec
//!
//! Index range keys are tuples of strings - `(label, value, chunkID)` -
//! encoded so that the lexicographic byte order of the encodings equals the
//! element-wise lexicographic order of the tuples. Range queries depend on
//! two properties:
//!
//! 1. **Ordering**: `encode([a, b]) < encode([a, b'])` iff `b < b'`.
//! 2. **Prefix**: `encode([a, b])` is a strict byte-prefix of
//!    `encode([a, b, c])`, so a `BEGINS_WITH` condition on a one- or
//!    two-field encoding selects every tuple extending it.
//!
//! ## Wire Format
//!
//! Each element is written as its UTF-8 bytes with embedded `0x00` escaped
//! as `0x00 0xFF`, followed by a `0x00` terminator. The terminator sorts
//! below every unescaped byte, which is what makes shorter elements sort
//! first. Decoding is unambiguous because elements are UTF-8: `0xFF` never
//! appears as the first byte of an element, so `0x00 0xFF` can only be an
//! escape.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

const TERMINATOR: u8 = 0x00;
const ESCAPE: u8 = 0xff;

/// Encode a tuple of strings into an order-preserving byte string.
pub fn encode(elements: &[&str]) -> Bytes {
    let mut buf = BytesMut::with_capacity(elements.iter().map(|e| e.len() + 1).sum());
    for element in elements {
        for &b in element.as_bytes() {
            if b == TERMINATOR {
                buf.put_u8(TERMINATOR);
                buf.put_u8(ESCAPE);
            } else {
                buf.put_u8(b);
            }
        }
        buf.put_u8(TERMINATOR);
    }
    buf.freeze()
}

/// Decode exactly `n` elements, rejecting trailing bytes.
pub fn decode(buf: &[u8], n: usize) -> Result<Vec<String>> {
    let mut elements = Vec::with_capacity(n);
    let mut rest = buf;
    for _ in 0..n {
        let (element, remainder) = decode_one(rest)?;
        elements.push(element);
        rest = remainder;
    }
    if !rest.is_empty() {
        return Err(Error::Codec(format!(
            "{} trailing bytes after {} elements",
            rest.len(),
            n
        )));
    }
    Ok(elements)
}

fn decode_one(buf: &[u8]) -> Result<(String, &[u8])> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < buf.len() {
        match buf[i] {
            TERMINATOR if buf.get(i + 1) == Some(&ESCAPE) => {
                out.push(TERMINATOR);
                i += 2;
            }
            TERMINATOR => {
                let element = String::from_utf8(out)
                    .map_err(|e| Error::Codec(format!("element is not UTF-8: {e}")))?;
                return Ok((element, &buf[i + 1..]));
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    Err(Error::Codec("unterminated element".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let encoded = encode(&["job", "api", "abc/0/64"]);
        let decoded = decode(&encoded, 3).unwrap();
        assert_eq!(decoded, vec!["job", "api", "abc/0/64"]);
    }

    #[test]
    fn test_round_trip_with_embedded_nul() {
        let value = "a\u{0}b";
        let encoded = encode(&["job", value]);
        let decoded = decode(&encoded, 2).unwrap();
        assert_eq!(decoded, vec!["job", value]);
    }

    #[test]
    fn test_prefix_property() {
        let two = encode(&["job", "api"]);
        let three = encode(&["job", "api", "abc/0/64"]);
        assert!(three.len() > two.len());
        assert_eq!(&three[..two.len()], &two[..]);
    }

    #[test]
    fn test_one_field_prefix_covers_all_values() {
        let one = encode(&["job"]);
        for value in ["", "a", "api", "zz"] {
            let full = encode(&["job", value, "id/0/1"]);
            assert!(full.starts_with(&one), "value {value:?}");
        }
        // ...but not a different label that shares a prefix
        assert!(!encode(&["jobs", "api"]).starts_with(&encode(&["job"])[..]));
    }

    #[test]
    fn test_ordering_matches_element_ordering() {
        let pairs = [
            ("a", "b"),
            ("a", "ba"),
            ("a", "c"),
            ("ab", ""),
            ("b", "a"),
        ];
        let encoded: Vec<Bytes> = pairs.iter().map(|(a, b)| encode(&[a, b])).collect();
        let mut sorted = encoded.clone();
        sorted.sort();
        assert_eq!(encoded, sorted);
    }

    #[test]
    fn test_shorter_element_sorts_first() {
        assert!(encode(&["a"]) < encode(&["a\u{0}"]));
        assert!(encode(&["a\u{0}"]) < encode(&["a\u{1}"]));
        assert!(encode(&["a"]) < encode(&["aa"]));
    }

    #[test]
    fn test_decode_rejects_truncation() {
        let encoded = encode(&["job", "api"]);
        assert!(decode(&encoded[..encoded.len() - 1], 2).is_err());
        assert!(decode(&encoded, 3).is_err());
    }

    #[test]
    fn test_decode_rejects_trailing_bytes() {
        let encoded = encode(&["job", "api", "id"]);
        assert!(decode(&encoded, 2).is_err());
    }

    #[test]
    fn test_empty_elements() {
        let encoded = encode(&["", ""]);
        assert_eq!(decode(&encoded, 2).unwrap(), vec!["", ""]);
    }
}
