//! A permissive UTF-8 decoder for URI paths.
//!
//! Ordinary UTF-8 decoders reject overlong encodings outright; this one
//! accepts them (an evasion technique some servers also tolerate) but
//! records the fact via a flag, along with whether any invalid byte
//! sequences were encountered. The caller decides what to do about it.

use crate::bestfit_key;
use crate::util::{BestFitMap, Flags};

/// Decodes a byte stream that is expected to be UTF-8 but can't be trusted
/// to actually be well-formed, converting valid (including overlong) or
/// byte-for-byte invalid sequences into a single-byte stream via a best-fit
/// mapping, and recording anomalies as it goes.
pub struct Utf8Decoder<'a> {
    bestfit_map: &'a BestFitMap,
    /// The decoded, single-byte-per-character output.
    pub decoded_bytes: Vec<u8>,
    /// Anomalies observed while decoding (HTP_PATH_UTF8_*).
    pub flags: Flags,
}

impl<'a> Utf8Decoder<'a> {
    pub fn new(bestfit_map: &'a BestFitMap) -> Self {
        Utf8Decoder {
            bestfit_map,
            decoded_bytes: Vec::new(),
            flags: Flags::empty(),
        }
    }

    /// Decodes `data` in place, appending to `decoded_bytes` and accumulating
    /// `flags` as anomalies are found. May be called more than once to
    /// decode several chunks into the same output buffer.
    pub fn decode_and_validate(&mut self, data: &[u8]) {
        let mut seen_valid = false;
        let mut i = 0;
        while i < data.len() {
            let byte = data[i];
            if byte < 0x80 {
                self.decoded_bytes.push(byte);
                i += 1;
                continue;
            }
            let (seq_len, mut codepoint) = if byte & 0xe0 == 0xc0 {
                (2usize, (byte & 0x1f) as u32)
            } else if byte & 0xf0 == 0xe0 {
                (3usize, (byte & 0x0f) as u32)
            } else if byte & 0xf8 == 0xf0 {
                (4usize, (byte & 0x07) as u32)
            } else {
                // Not a valid leading byte at all.
                self.flags |= Flags::HTP_PATH_UTF8_INVALID;
                self.decoded_bytes.push(byte);
                i += 1;
                continue;
            };
            if i + seq_len > data.len() {
                // Truncated sequence: copy the remaining raw bytes through.
                self.flags |= Flags::HTP_PATH_UTF8_INVALID;
                self.decoded_bytes.extend_from_slice(&data[i..]);
                break;
            }
            let mut valid = true;
            for &cb in &data[i + 1..i + seq_len] {
                if cb & 0xc0 != 0x80 {
                    valid = false;
                    break;
                }
                codepoint = (codepoint << 6) | (cb & 0x3f) as u32;
            }
            if !valid {
                self.flags |= Flags::HTP_PATH_UTF8_INVALID;
                self.decoded_bytes.push(byte);
                i += 1;
                continue;
            }
            seen_valid = true;
            let overlong = match seq_len {
                2 => codepoint < 0x80,
                3 => codepoint < 0x800,
                4 => codepoint < 0x10000,
                _ => false,
            };
            if overlong {
                self.flags |= Flags::HTP_PATH_UTF8_OVERLONG;
            }
            // Fullwidth form evasion: U+FF00-U+FFEF map onto the ASCII range.
            if (0xff00..=0xffef).contains(&codepoint) {
                self.flags |= Flags::HTP_PATH_HALF_FULL_RANGE;
            }
            self.decoded_bytes.push(self.bestfit_codepoint(codepoint));
            i += seq_len;
        }
        if seen_valid && !self.flags.contains(Flags::HTP_PATH_UTF8_INVALID) {
            self.flags |= Flags::HTP_PATH_UTF8_VALID;
        }
    }

    fn bestfit_codepoint(&self, codepoint: u32) -> u8 {
        if codepoint < 0x100 {
            return codepoint as u8;
        }
        let c1 = ((codepoint >> 8) & 0xff) as u8;
        let c2 = (codepoint & 0xff) as u8;
        self.bestfit_map.get(bestfit_key!(c1, c2))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decodes_ascii_unchanged() {
        let map = BestFitMap::new(&[]);
        let mut d = Utf8Decoder::new(&map);
        d.decode_and_validate(b"/index.html");
        assert_eq!(d.decoded_bytes, b"/index.html");
        assert!(d.flags.is_empty());
    }

    #[test]
    fn flags_overlong_two_byte_sequence() {
        let map = BestFitMap::new(&[]);
        let mut d = Utf8Decoder::new(&map);
        // 0xC0 0xAF is an overlong encoding of '/'.
        d.decode_and_validate(&[0xc0, 0xaf]);
        assert!(d.flags.contains(Flags::HTP_PATH_UTF8_OVERLONG));
    }

    #[test]
    fn flags_invalid_continuation_byte() {
        let map = BestFitMap::new(&[]);
        let mut d = Utf8Decoder::new(&map);
        d.decode_and_validate(&[0xc2, 0x20]);
        assert!(d.flags.contains(Flags::HTP_PATH_UTF8_INVALID));
        assert!(!d.flags.contains(Flags::HTP_PATH_UTF8_VALID));
    }

    #[test]
    fn marks_valid_when_no_invalid_seen() {
        let map = BestFitMap::new(&[]);
        let mut d = Utf8Decoder::new(&map);
        // A valid two-byte encoding of U+00E9 (e acute).
        d.decode_and_validate(&[0xc3, 0xa9]);
        assert!(d.flags.contains(Flags::HTP_PATH_UTF8_VALID));
        assert!(!d.flags.contains(Flags::HTP_PATH_UTF8_INVALID));
    }
}
