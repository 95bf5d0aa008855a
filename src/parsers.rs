//! Small, independent parsers for the numeric and protocol-version tokens
//! that show up in header values and the request line. Kept separate from
//! the header/line grammars in [`crate::request_generic`] because they're
//! reused from both the request and response sides, and from the
//! transaction-level header processing that determines body framing.

use crate::{
    bstr::Bstr,
    connection_parser::ConnectionParser,
    log::HtpLogCode,
    transaction::{HtpProtocol, HtpResponseNumber},
    util::is_space,
};

/// A forgiving parser for a positive integer in the given base. Only
/// linear whitespace is allowed before and after the digits; anything else
/// mixed in is a parse failure.
fn parse_positive_integer_whitespace(data: &[u8], base: u32) -> Option<i64> {
    if data.is_empty() {
        return None;
    }
    let mut pos = 0;
    while pos < data.len() && is_space(data[pos]) {
        pos += 1;
    }
    if pos == data.len() {
        return None;
    }
    let start = pos;
    while pos < data.len() && (data[pos] as char).is_digit(base) {
        pos += 1;
    }
    if pos == start {
        return None;
    }
    let value = i64::from_str_radix(std::str::from_utf8(&data[start..pos]).ok()?, base).ok()?;
    while pos < data.len() {
        if !is_space(data[pos]) {
            return None;
        }
        pos += 1;
    }
    Some(value)
}

/// Parses a Content-Length header value. Returns `None` if it isn't a
/// clean positive decimal number (optionally surrounded by whitespace).
///
/// `connp`, when given, is used to log a warning on a malformed value;
/// passing `None` skips logging (used when comparing two duplicate headers
/// against each other, where the warning is emitted by the caller instead).
pub fn parse_content_length(value: &Bstr, connp: Option<&mut ConnectionParser>) -> Option<i64> {
    let result = parse_positive_integer_whitespace(value.as_slice(), 10);
    if result.is_none() {
        if let Some(connp) = connp {
            htp_warn!(
                connp,
                HtpLogCode::INVALID_CONTENT_LENGTH_FIELD_IN_REQUEST,
                "Content-Length field is not a valid number"
            );
        }
    }
    result
}

/// Parses a chunk-size line (a positive hexadecimal number, with optional
/// chunk extensions already stripped by the caller). Returns `Ok(None)` if
/// no digits were found at all (distinct from a format error worth
/// reporting as -1 downstream, matching the chunked-length caller's own
/// handling of a bare empty line).
pub fn parse_chunked_length(data: &Bstr) -> crate::error::Result<Option<i32>> {
    match parse_positive_integer_whitespace(data.as_slice(), 16) {
        Some(len) if len >= 0 && len <= i32::MAX as i64 => Ok(Some(len as i32)),
        _ => Ok(None),
    }
}

/// Parses the protocol token off a request or status line (e.g. `HTTP/1.1`).
pub fn parse_protocol(protocol: &[u8], connp: &mut ConnectionParser) -> HtpProtocol {
    // Is this a generally well formed protocol token?
    if protocol.len() < 5 || !protocol[..5].eq_ignore_ascii_case(b"HTTP/") {
        return HtpProtocol::INVALID;
    }
    let rest = &protocol[5..];
    if rest.len() != 3 || rest[1] != b'.' || !rest[0].is_ascii_digit() || !rest[2].is_ascii_digit() {
        htp_warn!(
            connp,
            HtpLogCode::PROTOCOL_CONTAINS_EXTRA_DATA,
            "Request line: invalid protocol"
        );
        return HtpProtocol::INVALID;
    }
    match (rest[0], rest[2]) {
        (b'0', b'9') => HtpProtocol::V0_9,
        (b'1', b'0') => HtpProtocol::V1_0,
        (b'1', b'1') => HtpProtocol::V1_1,
        _ => HtpProtocol::INVALID,
    }
}

/// Parses the status-code token off a response status line. A three digit
/// code in the 100-999 range is a valid status; anything else (non-digits,
/// wrong length, all-zero, out of range) is reported as invalid rather than
/// rejecting the line outright, matching how a lenient inspector keeps
/// parsing a status line it can't fully make sense of.
pub fn parse_status(status: &[u8]) -> HtpResponseNumber {
    if status.len() != 3 || !status.iter().all(u8::is_ascii_digit) {
        return HtpResponseNumber::INVALID;
    }
    match std::str::from_utf8(status).ok().and_then(|s| s.parse::<u16>().ok()) {
        Some(n) if n >= 100 => HtpResponseNumber::VALUE(n),
        _ => HtpResponseNumber::INVALID,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::Config;

    #[test]
    fn content_length_accepts_padded_digits() {
        let value = Bstr::from("  1234  ");
        assert_eq!(parse_content_length(&value, None), Some(1234));
    }

    #[test]
    fn content_length_rejects_garbage() {
        let value = Bstr::from("12a4");
        assert_eq!(parse_content_length(&value, None), None);
    }

    #[test]
    fn chunk_length_parses_hex() {
        let value = Bstr::from("1A");
        assert_eq!(parse_chunked_length(&value).unwrap(), Some(26));
    }

    #[test]
    fn status_accepts_three_digit_codes() {
        assert_eq!(parse_status(b"200"), HtpResponseNumber::VALUE(200));
        assert_eq!(parse_status(b"404"), HtpResponseNumber::VALUE(404));
    }

    #[test]
    fn status_rejects_malformed_codes() {
        assert_eq!(parse_status(b"20"), HtpResponseNumber::INVALID);
        assert_eq!(parse_status(b"20a"), HtpResponseNumber::INVALID);
        assert_eq!(parse_status(b""), HtpResponseNumber::INVALID);
        assert_eq!(parse_status(b"0200"), HtpResponseNumber::INVALID);
    }

    #[test]
    fn protocol_recognizes_known_versions() {
        let mut connp = ConnectionParser::new(Config::default());
        assert_eq!(parse_protocol(b"HTTP/1.1", &mut connp), HtpProtocol::V1_1);
        assert_eq!(parse_protocol(b"HTTP/1.0", &mut connp), HtpProtocol::V1_0);
        assert_eq!(parse_protocol(b"HTTP/0.9", &mut connp), HtpProtocol::V0_9);
        assert_eq!(parse_protocol(b"JUNK", &mut connp), HtpProtocol::INVALID);
    }
}
