use crate::{
    bstr::Bstr,
    config::{htp_url_encoding_handling_t, DecoderConfig, HtpServerPersonality, HtpUnwanted},
    error::Result,
    hook::FileDataHook,
    request::HtpMethod,
    transaction::Transaction,
    utf8_decoder::Utf8Decoder,
    HtpStatus,
};
use nom::{
    branch::alt,
    bytes::complete::{
        is_not, tag, tag_no_case, take, take_till, take_until, take_while, take_while1,
        take_while_m_n,
    },
    bytes::streaming::take_till as streaming_take_till,
    bytes::streaming::take_while as streaming_take_while,
    character::complete::{char, digit1},
    character::is_space as nom_is_space,
    combinator::{map, not, opt},
    multi::{fold_many0, many1},
    number::complete::be_u8,
    sequence::tuple,
    IResult,
};

use std::io::Write;
use std::rc::Rc;
use std::sync::Mutex;
use tempfile::Builder;
use tempfile::NamedTempFile;

pub const HTP_VERSION_STRING_FULL: &'_ str = concat!("LibHTP v", env!("CARGO_PKG_VERSION"), "\x00");

// Various flag bits. Even though we have a flag field in several places
// (header, transaction, connection), these fields are all in the same namespace
// because we may want to set the same flag in several locations. For example, we
// may set FIELD_FOLDED on the actual folded header, but also on the transaction
// that contains the header. Both uses are useful.

// Connection flags are 8 bits wide.
bitflags::bitflags! {
    pub struct ConnectionFlags: u8 {
        const UNKNOWN        = 0x00;
        const PIPELINED      = 0x01;
        const HTTP_0_9_EXTRA = 0x02;
    }
}

// All other flags are 64 bits wide.
bitflags::bitflags! {
    pub struct Flags: u64 {
        const FIELD_UNPARSEABLE      = 0x0000_0000_0004;
        const FIELD_INVALID          = 0x0000_0000_0008;
        const FIELD_FOLDED           = 0x0000_0000_0010;
        const FIELD_REPEATED         = 0x0000_0000_0020;
        const FIELD_LONG             = 0x0000_0000_0040;
        const FIELD_RAW_NUL          = 0x0000_0000_0080;
        const REQUEST_SMUGGLING      = 0x0000_0000_0100;
        const INVALID_FOLDING        = 0x0000_0000_0200;
        const REQUEST_INVALID_T_E    = 0x0000_0000_0400;
        const MULTI_PACKET_HEAD      = 0x0000_0000_0800;
        const HOST_MISSING           = 0x0000_0000_1000;
        const HOST_AMBIGUOUS         = 0x0000_0000_2000;
        const HTP_PATH_ENCODED_NUL       = 0x0000_0000_4000;
        const HTP_PATH_RAW_NUL           = 0x0000_0000_8000;
        const HTP_PATH_INVALID_ENCODING  = 0x0000_0001_0000;
        const HTP_PATH_INVALID           = 0x0000_0002_0000;
        const HTP_PATH_OVERLONG_U        = 0x0000_0004_0000;
        const HTP_PATH_ENCODED_SEPARATOR = 0x0000_0008_0000;
        /// At least one valid UTF-8 character and no invalid ones.
        const HTP_PATH_UTF8_VALID        = 0x0000_0010_0000;
        const HTP_PATH_UTF8_INVALID      = 0x0000_0020_0000;
        const HTP_PATH_UTF8_OVERLONG     = 0x0000_0040_0000;
        /// Range U+FF00 - U+FFEF detected.
        const HTP_PATH_HALF_FULL_RANGE   = 0x0000_0080_0000;
        const STATUS_LINE_INVALID    = 0x0000_0100_0000;
        /// Host in the URI.
        const HOSTU_INVALID          = 0x0000_0200_0000;
        /// Host in the Host header.
        const HOSTH_INVALID          = 0x0000_0400_0000;
        const HOST_INVALID           = ( Self::HOSTU_INVALID.bits | Self::HOSTH_INVALID.bits );
        const URLEN_ENCODED_NUL      = 0x0000_0800_0000;
        const URLEN_INVALID_ENCODING = 0x0000_1000_0000;
        const URLEN_OVERLONG_U       = 0x0000_2000_0000;
        /// Range U+FF00 - U+FFEF detected.
        const URLEN_HALF_FULL_RANGE  = 0x0000_4000_0000;
        const URLEN_RAW_NUL          = 0x0000_8000_0000;
        const REQUEST_INVALID        = 0x0001_0000_0000;
        const REQUEST_INVALID_C_L    = 0x0002_0000_0000;
        const AUTH_INVALID           = 0x0004_0000_0000;
        /// Transfer-Encoding present but its value isn't exactly "chunked".
        const RESPONSE_INVALID_T_E   = 0x0008_0000_0000;
        /// Both Transfer-Encoding: chunked and Content-Length present on the
        /// same response; a favorite response-splitting/smuggling vector.
        const RESPONSE_INVALID_C_L   = 0x0010_0000_0000;
    }
}

/// Plain-`u64` mirror of [`Flags`]'s bit layout, for the places (header name/value
/// records) that carry their flags as a bare integer rather than the bitflags
/// type itself. Bit values must stay in lockstep with `Flags` above.
pub struct HtpFlags;

impl HtpFlags {
    pub const FIELD_UNPARSEABLE: u64 = Flags::FIELD_UNPARSEABLE.bits;
    pub const FIELD_INVALID: u64 = Flags::FIELD_INVALID.bits;
    pub const FIELD_FOLDED: u64 = Flags::FIELD_FOLDED.bits;
    pub const FIELD_REPEATED: u64 = Flags::FIELD_REPEATED.bits;
    pub const FIELD_LONG: u64 = Flags::FIELD_LONG.bits;
    pub const FIELD_RAW_NUL: u64 = Flags::FIELD_RAW_NUL.bits;
    pub const REQUEST_SMUGGLING: u64 = Flags::REQUEST_SMUGGLING.bits;
    pub const INVALID_FOLDING: u64 = Flags::INVALID_FOLDING.bits;
    pub const REQUEST_INVALID_T_E: u64 = Flags::REQUEST_INVALID_T_E.bits;
    pub const MULTI_PACKET_HEAD: u64 = Flags::MULTI_PACKET_HEAD.bits;
    pub const HOST_MISSING: u64 = Flags::HOST_MISSING.bits;
    pub const HOST_AMBIGUOUS: u64 = Flags::HOST_AMBIGUOUS.bits;
    pub const STATUS_LINE_INVALID: u64 = Flags::STATUS_LINE_INVALID.bits;
    pub const HOSTU_INVALID: u64 = Flags::HOSTU_INVALID.bits;
    pub const HOSTH_INVALID: u64 = Flags::HOSTH_INVALID.bits;
    pub const HOST_INVALID: u64 = Flags::HOST_INVALID.bits;
    pub const REQUEST_INVALID: u64 = Flags::REQUEST_INVALID.bits;
    pub const REQUEST_INVALID_C_L: u64 = Flags::REQUEST_INVALID_C_L.bits;
    pub const AUTH_INVALID: u64 = Flags::AUTH_INVALID.bits;
    pub const RESPONSE_INVALID_T_E: u64 = Flags::RESPONSE_INVALID_T_E.bits;
    pub const RESPONSE_INVALID_C_L: u64 = Flags::RESPONSE_INVALID_C_L.bits;
}

/// Common interface for reading and writing a single anomaly bit, implemented
/// both for raw `u64` flag fields (header name/value records) and for the
/// bitflags-backed [`Flags`] type (transaction/connection flag fields), so
/// call sites that only know "I have a flags-like thing and a bit" don't need
/// to care which representation they're holding.
pub trait FlagOperations<T> {
    fn is_set(&self, flag: T) -> bool;
    fn set(&mut self, flag: T);
    fn unset(&mut self, flag: T);
    fn reset(&mut self);
}

impl FlagOperations<u64> for u64 {
    fn is_set(&self, flag: u64) -> bool {
        self & flag != 0
    }

    fn set(&mut self, flag: u64) {
        *self |= flag;
    }

    fn unset(&mut self, flag: u64) {
        *self &= !flag;
    }

    fn reset(&mut self) {
        *self = 0;
    }
}

impl FlagOperations<u64> for Flags {
    fn is_set(&self, flag: u64) -> bool {
        self.bits() & flag != 0
    }

    fn set(&mut self, flag: u64) {
        *self |= Flags::from_bits_truncate(flag);
    }

    fn unset(&mut self, flag: u64) {
        *self &= !Flags::from_bits_truncate(flag);
    }

    fn reset(&mut self) {
        *self = Flags::empty();
    }
}

/// Looks up a single replacement byte for a two-byte "best-fit" key, used
/// when collapsing UTF-8 and `%u`-encoded characters that have no single-byte
/// ASCII equivalent down to something a byte-oriented signature can match.
///
/// Implemented as a linear scan over a small static table; a hashed or
/// binary-searched table would behave identically and is a reasonable
/// alternative for embedders carrying a much larger map.
pub struct BestFitMap {
    map: &'static [(u16, u8)],
}

impl BestFitMap {
    pub const fn new(map: &'static [(u16, u8)]) -> Self {
        BestFitMap { map }
    }

    /// Returns the mapped replacement byte, or the low byte of the key
    /// (the fallback the original codepoint's low byte would decode to)
    /// if no mapping is present.
    pub fn get(&self, key: u16) -> u8 {
        for &(k, v) in self.map {
            if k == key {
                return v;
            }
        }
        (key & 0xff) as u8
    }
}

/// Builds the two-byte lookup key used by [`BestFitMap::get`] from the high
/// and low bytes of a `%u`-encoded character or a UTF-8 codepoint.
#[macro_export]
macro_rules! bestfit_key {
    ($c1:expr, $c2:expr) => {
        (($c1 as u16) << 8) | ($c2 as u16)
    };
}

/// The default best-fit table: ASCII passes through unchanged, and the most
/// common fullwidth Unicode forms (U+FF01-U+FF5E) fold down to their ASCII
/// counterparts, mirroring the mapping most web servers apply.
pub static DEFAULT_BESTFIT_MAP: BestFitMap = BestFitMap::new(&[]);

#[repr(C)]
#[derive(Copy, Clone, Debug)]
pub enum HtpFileSource {
    MULTIPART = 1,
    PUT = 2,
}

/// Used to represent files that are seen during the processing of HTTP traffic. Most
/// commonly this refers to files seen in multipart/form-data payloads. In addition, PUT
/// request bodies can be treated as files.
#[derive(Debug, Clone)]
pub struct File {
    /// Where did this file come from? Possible values: MULTIPART and PUT.
    pub source: HtpFileSource,
    /// File name, as provided (e.g., in the Content-Disposition multipart part header).
    pub filename: Option<Bstr>,
    /// File length.
    pub len: usize,
    /// The file used for external storage.
    pub tmpfile: Option<Rc<Mutex<NamedTempFile>>>,
}

impl File {
    pub fn new(source: HtpFileSource, filename: Option<Bstr>) -> File {
        File {
            source,
            filename,
            len: 0,
            tmpfile: None,
        }
    }

    /// Create new tempfile
    pub fn create(&mut self, tmpfile: &str) -> Result<()> {
        self.tmpfile = Some(Rc::new(Mutex::new(
            Builder::new()
                .prefix("libhtp-put-file-")
                .rand_bytes(5)
                .tempfile_in(tmpfile)?,
        )));
        Ok(())
    }

    /// Write data to tempfile
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        if let Some(mutex) = &self.tmpfile {
            if let Ok(mut tmpfile) = mutex.lock() {
                tmpfile.write_all(data)?;
            }
        }
        Ok(())
    }

    /// Update file length and invoke any file data callbacks on the provided cfg
    pub fn handle_file_data(
        &mut self,
        hook: &FileDataHook,
        data: *const u8,
        len: usize,
    ) -> Result<()> {
        self.len = self.len.wrapping_add(len);
        // Package data for the callbacks.
        let mut file_data = FileData::new(self, data, len);
        // Send data to callbacks
        hook.run_all(&mut file_data)
    }
}

/// Represents a chunk of file data.
pub struct FileData<'a> {
    /// File information.
    pub file: &'a File,
    /// Pointer to the data buffer.
    pub data: *const u8,
    /// Buffer length.
    pub len: usize,
}

impl FileData<'_> {
    pub fn new(file: &File, data: *const u8, len: usize) -> FileData {
        FileData { file, data, len }
    }
}

/// Is character a separator character?
pub fn is_separator(c: u8) -> bool {
    // separators = "(" | ")" | "<" | ">" | "@"
    // | "," | ";" | ":" | "\" | <">
    // | "/" | "[" | "]" | "?" | "="
    // | "{" | "}" | SP | HT
    matches!(
        c as char,
        '(' | ')' | '<' | '>' | '@' | ',' | ';' | ':' | '\\' | '"' | '/' | '[' | ']' | '?' | '=' | '{' | '}' | ' ' | '\t'
    )
}

/// Is character a token character?
pub fn is_token(c: u8) -> bool {
    // token = 1*<any CHAR except CTLs or separators>
    // CHAR  = <any US-ASCII character (octets 0 - 127)>
    !(c < 32 || c > 126 || is_separator(c))
}

pub fn take_ascii_whitespace<'a>() -> impl Fn(&'a [u8]) -> IResult<&'a [u8], &'a [u8]> {
    move |input| take_while(|c: u8| c.is_ascii_whitespace())(input)
}

/// Trims leading and trailing whitespace (as defined by [`is_space`]) from the input.
pub fn trimmed(data: &[u8]) -> &[u8] {
    let start = data.iter().position(|&c| !is_space(c)).unwrap_or(data.len());
    let end = data
        .iter()
        .rposition(|&c| !is_space(c))
        .map(|i| i + 1)
        .unwrap_or(0);
    if start >= end {
        &data[0..0]
    } else {
        &data[start..end]
    }
}

/// Remove all line terminators (LF, CR or CRLF) from
/// the end of the line provided as input.
pub fn chomp(mut data: &[u8]) -> &[u8] {
    loop {
        let last_char = data.last();
        if last_char == Some(&(b'\n')) || last_char == Some(&(b'\r')) {
            data = &data[..data.len() - 1];
        } else {
            break;
        }
    }
    data
}

/// Is character a white space character?
pub fn is_space(c: u8) -> bool {
    matches!(c as char, ' ' | '\t' | '\r' | '\n' | '\x0b' | '\x0c')
}

/// Helper function that mimics the functionality of bytes::complete::take_until, ignoring tag case.
/// Returns the longest input slice till it case insensitively matches the pattern. It doesn't consume the pattern.
pub fn take_until_no_case(tag: &[u8]) -> impl Fn(&[u8]) -> IResult<&[u8], &[u8]> + '_ {
    move |input| {
        if tag.is_empty() {
            return Ok((b"", input));
        }
        let mut new_input = input;
        let mut bytes_consumed: usize = 0;
        while !new_input.is_empty() {
            let (left, consumed) = take_till::<_, _, (&[u8], nom::error::ErrorKind)>(|c: u8| {
                c.to_ascii_lowercase() == tag[0] || c.to_ascii_uppercase() == tag[0]
            })(new_input)?;
            new_input = left;
            bytes_consumed = bytes_consumed.wrapping_add(consumed.len());
            if tag_no_case::<_, _, (&[u8], nom::error::ErrorKind)>(tag)(new_input).is_ok() {
                return Ok((new_input, &input[..bytes_consumed]));
            } else if let Ok((left, consumed)) =
                take::<_, _, (&[u8], nom::error::ErrorKind)>(1usize)(new_input)
            {
                bytes_consumed = bytes_consumed.wrapping_add(consumed.len());
                new_input = left;
            }
        }
        Ok((b"", input))
    }
}

/// Converts request method string into a method type.
pub fn convert_to_method(method: &[u8]) -> HtpMethod {
    match method {
        b"GET" => HtpMethod::GET,
        b"PUT" => HtpMethod::PUT,
        b"POST" => HtpMethod::POST,
        b"DELETE" => HtpMethod::DELETE,
        b"CONNECT" => HtpMethod::CONNECT,
        b"OPTIONS" => HtpMethod::OPTIONS,
        b"TRACE" => HtpMethod::TRACE,
        b"PATCH" => HtpMethod::PATCH,
        b"PROPFIND" => HtpMethod::PROPFIND,
        b"PROPPATCH" => HtpMethod::PROPPATCH,
        b"MKCOL" => HtpMethod::MKCOL,
        b"COPY" => HtpMethod::COPY,
        b"MOVE" => HtpMethod::MOVE,
        b"LOCK" => HtpMethod::LOCK,
        b"UNLOCK" => HtpMethod::UNLOCK,
        b"VERSION-CONTROL" => HtpMethod::VERSION_CONTROL,
        b"CHECKOUT" => HtpMethod::CHECKOUT,
        b"UNCHECKOUT" => HtpMethod::UNCHECKOUT,
        b"CHECKIN" => HtpMethod::CHECKIN,
        b"UPDATE" => HtpMethod::UPDATE,
        b"LABEL" => HtpMethod::LABEL,
        b"REPORT" => HtpMethod::REPORT,
        b"MKWORKSPACE" => HtpMethod::MKWORKSPACE,
        b"MKACTIVITY" => HtpMethod::MKACTIVITY,
        b"BASELINE-CONTROL" => HtpMethod::BASELINE_CONTROL,
        b"MERGE" => HtpMethod::MERGE,
        b"INVALID" => HtpMethod::INVALID,
        b"HEAD" => HtpMethod::HEAD,
        _ => HtpMethod::UNKNOWN,
    }
}

/// Is the given line empty?
pub fn is_line_empty(data: &[u8]) -> bool {
    matches!(data, b"\x0d" | b"\x0a" | b"\x0d\x0a")
}

/// Does line consist entirely of whitespace characters?
pub fn is_line_whitespace(data: &[u8]) -> bool {
    !data.iter().any(|c| !is_space(*c))
}

/// Searches for and extracts the next set of ascii digits from the input slice if present.
/// Parses over leading and trailing LWS characters.
pub fn ascii_digits<'a>() -> impl Fn(&'a [u8]) -> IResult<&'a [u8], (&'a [u8], &'a [u8])> {
    move |input| {
        map(
            tuple((
                nom_take_is_space,
                take_till(|c: u8| c.is_ascii_digit()),
                digit1,
                nom_take_is_space,
            )),
            |(_, leading_data, digits, _)| (leading_data, digits),
        )(input)
    }
}

/// Searches for and extracts the next set of hex digits from the input slice if present.
/// Parses over leading and trailing LWS characters.
pub fn hex_digits<'a>() -> impl Fn(&'a [u8]) -> IResult<&'a [u8], &'a [u8]> {
    move |input| {
        map(
            tuple((
                nom_take_is_space,
                take_while1(|c: u8| c.is_ascii_hexdigit()),
                nom_take_is_space,
            )),
            |(_, digits, _)| digits,
        )(input)
    }
}

/// Determines if the given line is a continuation (of some previous line).
pub fn is_line_folded(data: &[u8]) -> bool {
    if data.is_empty() {
        return false;
    }
    is_folding_char(data[0])
}

pub fn is_folding_char(c: u8) -> bool {
    nom_is_space(c) || c == 0
}

/// Determines if the given line is a request terminator.
pub fn is_line_terminator(
    server_personality: HtpServerPersonality,
    data: &[u8],
    next_no_lf: bool,
) -> bool {
    // Is this the end of request headers?
    if server_personality == HtpServerPersonality::IIS_5_0 {
        // IIS 5 will accept a whitespace line as a terminator
        if is_line_whitespace(data) {
            return true;
        }
    }

    // Treat an empty line as terminator
    if is_line_empty(data) {
        return true;
    }
    if data.len() == 2 && nom_is_space(data[0]) && data[1] == b'\n' {
        return next_no_lf;
    }
    false
}

/// Determines if the given line can be ignored when it appears before a request.
pub fn is_line_ignorable(server_personality: HtpServerPersonality, data: &[u8]) -> bool {
    is_line_terminator(server_personality, data, false)
}

/// Attempts to convert the provided port slice to a u16.
/// Returns `None` if the conversion fails or the result is 0.
pub fn convert_port(port: &[u8]) -> Option<u16> {
    if port.is_empty() {
        return None;
    }
    if let Ok(res) = std::str::from_utf8(port) {
        if let Ok(port_number) = res.parse::<u16>() {
            if port_number == 0 {
                return None;
            }
            return Some(port_number);
        }
    }
    None
}

/// Convert two input bytes into a single byte by assuming the input consists
/// of hexadecimal characters. Will happily convert invalid input.
fn x2c(input: &[u8]) -> IResult<&[u8], u8> {
    let (input, (c1, c2)) = tuple((be_u8, be_u8))(input)?;
    let mut decoded_byte: u8 = if c1 >= b'A' {
        ((c1 & 0xdf) - b'A') + 10
    } else {
        c1 - b'0'
    };
    decoded_byte = (decoded_byte as i32 * 16) as u8;
    decoded_byte += if c2 >= b'A' {
        ((c2 & 0xdf) - b'A') + 10
    } else {
        c2 - b'0'
    };
    Ok((input, decoded_byte))
}

/// Decode a UTF-8 encoded path. Replaces a possibly-invalid utf8 byte stream with
/// an ascii stream. Overlong characters will be decoded and invalid characters will
/// be replaced with the replacement byte specified in the cfg. Best-fit mapping will
/// be used to convert UTF-8 into a single-byte stream. The resulting decoded path will
/// be stored in the input path if the transaction cfg indicates it.
pub fn utf8_decode_and_validate_uri_path_inplace(
    cfg: &DecoderConfig,
    flags: &mut Flags,
    status: &mut HtpUnwanted,
    path: &mut Bstr,
) {
    let mut decoder = Utf8Decoder::new(&cfg.bestfit_map);
    decoder.decode_and_validate(path.as_slice());
    if cfg.utf8_convert_bestfit {
        path.clear();
        path.add(decoder.decoded_bytes.as_slice());
    }
    *flags |= decoder.flags;

    if flags.contains(Flags::HTP_PATH_UTF8_INVALID) && cfg.utf8_invalid_unwanted != HtpUnwanted::IGNORE
    {
        *status = cfg.utf8_invalid_unwanted;
    }
}

/// Decode a %u-encoded character, using best-fit mapping as necessary. Path version.
fn decode_u_encoding_path<'a>(
    i: &'a [u8],
    cfg: &DecoderConfig,
) -> IResult<&'a [u8], (u8, Flags, HtpUnwanted)> {
    let mut flags = Flags::empty();
    let mut expected_status_code = HtpUnwanted::IGNORE;
    let (i, c1) = x2c(i)?;
    let (i, c2) = x2c(i)?;
    let mut r = c2;
    if c1 == 0 {
        flags |= Flags::HTP_PATH_OVERLONG_U
    } else {
        // Check for fullwidth form evasion
        if c1 == 0xff {
            flags |= Flags::HTP_PATH_HALF_FULL_RANGE
        }
        expected_status_code = cfg.u_encoding_unwanted;
        // Use best-fit mapping
        r = cfg.bestfit_map.get(bestfit_key!(c1, c2));
    }
    // Check for encoded path separators
    if r == b'/' || cfg.backslash_convert_slashes && r == b'\\' {
        flags |= Flags::HTP_PATH_ENCODED_SEPARATOR
    }
    Ok((i, (r, flags, expected_status_code)))
}

/// Decode a %u-encoded character, using best-fit mapping as necessary. Params version.
fn decode_u_encoding_params<'a>(
    i: &'a [u8],
    cfg: &DecoderConfig,
) -> IResult<&'a [u8], (u8, Flags)> {
    let (i, c1) = x2c(i)?;
    let (i, c2) = x2c(i)?;
    let mut flags = Flags::empty();
    // Check for overlong usage first.
    if c1 == 0 {
        flags |= Flags::URLEN_OVERLONG_U;
        return Ok((i, (c2, flags)));
    }
    // Both bytes were used.
    // Detect half-width and full-width range.
    if c1 == 0xff && c2 <= 0xef {
        flags |= Flags::URLEN_HALF_FULL_RANGE
    }
    // Use best-fit mapping.
    Ok((i, (cfg.bestfit_map.get(bestfit_key!(c1, c2)), flags)))
}

/// Decodes path valid uencoded params according to the given cfg settings.
fn path_decode_valid_uencoding(
    cfg: &DecoderConfig,
) -> impl Fn(&[u8]) -> IResult<&[u8], (u8, HtpUnwanted, Flags, bool)> + '_ {
    move |remaining_input| {
        let (left, _) = tag_no_case("u")(remaining_input)?;
        let mut output = remaining_input;
        let mut byte = b'%';
        let mut flags = Flags::empty();
        let mut expected_status_code = HtpUnwanted::IGNORE;
        if cfg.u_encoding_decode {
            let (left, hex) = take_while_m_n(4, 4, |c: u8| c.is_ascii_hexdigit())(left)?;
            output = left;
            expected_status_code = cfg.u_encoding_unwanted;
            // Decode a valid %u encoding.
            let (_, (b, f, c)) = decode_u_encoding_path(hex, cfg)?;
            byte = b;
            flags |= f;
            if c != HtpUnwanted::IGNORE {
                expected_status_code = c;
            }
            if byte == 0 {
                flags |= Flags::HTP_PATH_ENCODED_NUL;
                if cfg.nul_encoded_unwanted != HtpUnwanted::IGNORE {
                    expected_status_code = cfg.nul_encoded_unwanted
                }
                if cfg.nul_encoded_terminates {
                    // Terminate the path at the raw NUL byte.
                    return Ok((b"", (byte, expected_status_code, flags, false)));
                }
            }
        }
        let (byte, code) = path_decode_control(byte, cfg);
        if code != HtpUnwanted::IGNORE {
            expected_status_code = code;
        }
        Ok((output, (byte, expected_status_code, flags, true)))
    }
}

/// Decodes path invalid uencoded params according to the given cfg settings.
fn path_decode_invalid_uencoding(
    cfg: &DecoderConfig,
) -> impl Fn(&[u8]) -> IResult<&[u8], (u8, HtpUnwanted, Flags, bool)> + '_ {
    move |remaining_input| {
        let mut output = remaining_input;
        let mut byte = b'%';
        let mut flags = Flags::empty();
        let mut expected_status_code = HtpUnwanted::IGNORE;
        let (left, _) = tag_no_case("u")(remaining_input)?;
        if cfg.u_encoding_decode {
            let (left, hex) = take(4usize)(left)?;
            // Invalid %u encoding
            flags = Flags::HTP_PATH_INVALID_ENCODING;
            expected_status_code = cfg.url_encoding_invalid_unwanted;
            if cfg.url_encoding_invalid_handling == htp_url_encoding_handling_t::HTP_URL_DECODE_REMOVE_PERCENT {
                // Do not place anything in output; consume the %.
                return Ok((remaining_input, (byte, expected_status_code, flags, false)));
            } else if cfg.url_encoding_invalid_handling == htp_url_encoding_handling_t::HTP_URL_DECODE_PROCESS_INVALID {
                let (_, (b, f, c)) = decode_u_encoding_path(hex, cfg)?;
                if c != HtpUnwanted::IGNORE {
                    expected_status_code = c;
                }
                flags |= f;
                byte = b;
                output = left;
            }
        }
        let (byte, code) = path_decode_control(byte, cfg);
        if code != HtpUnwanted::IGNORE {
            expected_status_code = code;
        }
        Ok((output, (byte, expected_status_code, flags, true)))
    }
}

/// Decodes path valid hex according to the given cfg settings.
fn path_decode_valid_hex(
    cfg: &DecoderConfig,
) -> impl Fn(&[u8]) -> IResult<&[u8], (u8, HtpUnwanted, Flags, bool)> + '_ {
    move |remaining_input| {
        let original_remaining = remaining_input;
        // Valid encoding (2 xbytes)
        not(tag_no_case("u"))(remaining_input)?;
        let (mut left, hex) = take_while_m_n(2, 2, |c: u8| c.is_ascii_hexdigit())(remaining_input)?;
        let mut flags = Flags::empty();
        let mut expected_status_code = HtpUnwanted::IGNORE;
        // Convert from hex.
        let (_, mut byte) = x2c(hex)?;
        if byte == 0 {
            flags |= Flags::HTP_PATH_ENCODED_NUL;
            expected_status_code = cfg.nul_encoded_unwanted;
            if cfg.nul_encoded_terminates {
                // Terminate the path at the raw NUL byte.
                return Ok((b"", (byte, expected_status_code, flags, false)));
            }
        }
        if byte == b'/' || (cfg.backslash_convert_slashes && byte == b'\\') {
            flags |= Flags::HTP_PATH_ENCODED_SEPARATOR;
            if cfg.path_separators_encoded_unwanted != HtpUnwanted::IGNORE {
                expected_status_code = cfg.path_separators_encoded_unwanted
            }
            if !cfg.path_separators_decode {
                // Leave encoded
                byte = b'%';
                left = original_remaining;
            }
        }
        let (byte, expected_status_code) = path_decode_control(byte, cfg);
        Ok((left, (byte, expected_status_code, flags, true)))
    }
}

/// Decodes path invalid hex according to the given cfg settings.
fn path_decode_invalid_hex(
    cfg: &DecoderConfig,
) -> impl Fn(&[u8]) -> IResult<&[u8], (u8, HtpUnwanted, Flags, bool)> + '_ {
    move |remaining_input| {
        let mut remaining = remaining_input;
        // Valid encoding (2 xbytes)
        not(tag_no_case("u"))(remaining_input)?;
        let (left, hex) = take(2usize)(remaining_input)?;
        let mut byte = b'%';
        // Invalid encoding
        let flags = Flags::HTP_PATH_INVALID_ENCODING;
        let expected_status_code = cfg.url_encoding_invalid_unwanted;
        if cfg.url_encoding_invalid_handling == htp_url_encoding_handling_t::HTP_URL_DECODE_REMOVE_PERCENT {
            // Do not place anything in output; consume the %.
            return Ok((remaining_input, (byte, expected_status_code, flags, false)));
        } else if cfg.url_encoding_invalid_handling == htp_url_encoding_handling_t::HTP_URL_DECODE_PROCESS_INVALID {
            // Decode
            let (_, b) = x2c(hex)?;
            remaining = left;
            byte = b;
        }
        let (byte, expected_status_code) = path_decode_control(byte, cfg);
        Ok((remaining, (byte, expected_status_code, flags, true)))
    }
}

/// If the first byte of the input path string is a '%', it attempts to decode according to the
/// configuration specified by cfg. Various flags (HTP_PATH_*) might be set. If something in the
/// input would cause a particular server to respond with an error, the appropriate status
/// code will be set.
fn path_decode_percent(
    cfg: &DecoderConfig,
) -> impl Fn(&[u8]) -> IResult<&[u8], (u8, HtpUnwanted, Flags, bool)> + '_ {
    move |i| {
        let (remaining_input, c) = char('%')(i)?;
        let byte = c as u8;
        alt((
            path_decode_valid_uencoding(cfg),
            path_decode_invalid_uencoding(cfg),
            move |remaining_input| {
                let (_, _) = tag_no_case("u")(remaining_input)?;
                // Invalid %u encoding (not enough data)
                let flags = Flags::HTP_PATH_INVALID_ENCODING;
                let expected_status_code = cfg.url_encoding_invalid_unwanted;
                if cfg.url_encoding_invalid_handling == htp_url_encoding_handling_t::HTP_URL_DECODE_REMOVE_PERCENT {
                    // Do not place anything in output; consume the %.
                    return Ok((remaining_input, (byte, expected_status_code, flags, false)));
                }
                Ok((remaining_input, (byte, expected_status_code, flags, true)))
            },
            path_decode_valid_hex(cfg),
            path_decode_invalid_hex(cfg),
            move |remaining_input| {
                // Invalid URL encoding (not even 2 bytes of data)
                Ok((
                    remaining_input,
                    (
                        byte,
                        cfg.url_encoding_invalid_unwanted,
                        Flags::HTP_PATH_INVALID_ENCODING,
                        cfg.url_encoding_invalid_handling != htp_url_encoding_handling_t::HTP_URL_DECODE_REMOVE_PERCENT,
                    ),
                ))
            },
        ))(remaining_input)
    }
}

/// Assumes the input is already decoded and checks if it is null byte or control character,
/// handling each according to the decoder configuration settings.
fn path_parse_other(
    cfg: &DecoderConfig,
) -> impl Fn(&[u8]) -> IResult<&[u8], (u8, HtpUnwanted, Flags, bool)> + '_ {
    move |i| {
        let (remaining_input, byte) = be_u8(i)?;
        let mut expected_status_code = HtpUnwanted::IGNORE;
        // One non-encoded byte.
        // Did we get a raw NUL byte?
        if byte == 0 {
            expected_status_code = cfg.nul_raw_unwanted;
            if cfg.nul_raw_terminates {
                // Terminate the path at the encoded NUL byte.
                return Ok((b"", (byte, expected_status_code, Flags::empty(), false)));
            }
        }
        let (byte, expected_status_code) = path_decode_control(byte, cfg);
        Ok((
            remaining_input,
            (byte, expected_status_code, Flags::empty(), true),
        ))
    }
}

/// Checks for control characters and converts them according to the cfg settings.
fn path_decode_control(mut byte: u8, cfg: &DecoderConfig) -> (u8, HtpUnwanted) {
    // Note: What if an invalid encoding decodes into a path separator? This is
    // theoretical at the moment: the only platform known not to convert
    // separators is Apache, which also responds with 400 on invalid encoding.
    let expected_status_code = if byte < 0x20 {
        cfg.control_chars_unwanted
    } else {
        HtpUnwanted::IGNORE
    };
    // Convert backslashes to forward slashes, if necessary
    if byte == b'\\' && cfg.backslash_convert_slashes {
        byte = b'/'
    }
    // Lowercase characters, if necessary
    if cfg.convert_lowercase {
        byte = byte.to_ascii_lowercase()
    }
    (byte, expected_status_code)
}

/// Decode a request path according to the settings in the provided configuration structure.
fn path_decode<'a>(
    input: &'a [u8],
    cfg: &'a DecoderConfig,
) -> IResult<&'a [u8], (Vec<u8>, Flags, HtpUnwanted)> {
    fold_many0(
        alt((path_decode_percent(cfg), path_parse_other(cfg))),
        (Vec::new(), Flags::empty(), HtpUnwanted::IGNORE),
        |mut acc: (Vec<_>, Flags, HtpUnwanted), (byte, code, flag, insert)| {
            // If we're compressing separators then we need
            // to check if the previous character was a separator
            if insert {
                if byte == b'/' && cfg.path_separators_compress {
                    if acc.0.is_empty() || acc.0[acc.0.len() - 1] != b'/' {
                        acc.0.push(byte);
                    }
                } else {
                    acc.0.push(byte);
                }
            }
            acc.1 |= flag;
            acc.2 = code;
            acc
        },
    )(input)
}

/// Removes RFC 3986 dot-segments (`.` and `..`) from a path in place, as a
/// single-pass rewrite over `/`-separated segments: `.` segments are
/// dropped, and a `..` segment drops itself plus the last segment kept so
/// far (if any — a `..` that climbs above the root is absorbed silently).
pub fn remove_dot_segments_inplace(path: &mut Bstr) {
    let input = path.as_slice();
    let leading_slash = input.first() == Some(&b'/');
    let trailing_slash = input.len() > 1 && input.last() == Some(&b'/');
    let mut segments: Vec<&[u8]> = Vec::new();
    for segment in input.split(|&b| b == b'/') {
        match segment {
            b"" | b"." => continue,
            b".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }
    let mut out = Vec::new();
    if leading_slash {
        out.push(b'/');
    }
    for (i, seg) in segments.iter().enumerate() {
        if i > 0 {
            out.push(b'/');
        }
        out.extend_from_slice(seg);
    }
    if trailing_slash && !segments.is_empty() {
        out.push(b'/');
    }
    path.clear();
    path.add(out.as_slice());
}

/// Decode the parsed uri path inplace according to the settings in the transaction
/// configuration structure: percent/`%u` decoding and separator/control/case
/// policy, then UTF-8 validation/best-fit mapping, then dot-segment removal.
pub fn decode_uri_path_inplace(
    decoder_cfg: &DecoderConfig,
    flag: &mut Flags,
    status: &mut HtpUnwanted,
    path: &mut Bstr,
) {
    if let Ok((_, (consumed, flags, expected_status_code))) = path_decode(path.as_slice(), decoder_cfg)
    {
        path.clear();
        path.add(consumed.as_slice());
        *status = expected_status_code;
        *flag |= flags;
    }
    utf8_decode_and_validate_uri_path_inplace(decoder_cfg, flag, status, path);
    remove_dot_segments_inplace(path);
}

pub fn urldecode_uri_inplace(
    decoder_cfg: &DecoderConfig,
    flags: &mut Flags,
    input: &mut Bstr,
) -> Result<()> {
    if let Ok((_, (consumed, f, _))) = urldecode_ex(input.as_slice(), decoder_cfg) {
        (*input).clear();
        input.add(consumed.as_slice());
        if f.contains(Flags::URLEN_INVALID_ENCODING) {
            *flags |= Flags::HTP_PATH_INVALID_ENCODING
        }
        if f.contains(Flags::URLEN_ENCODED_NUL) {
            *flags |= Flags::HTP_PATH_ENCODED_NUL
        }
        if f.contains(Flags::URLEN_RAW_NUL) {
            *flags |= Flags::HTP_PATH_RAW_NUL;
        }
        Ok(())
    } else {
        Err(HtpStatus::ERROR)
    }
}

pub fn tx_urldecode_params_inplace(tx: &mut Transaction, input: &mut Bstr) -> Result<()> {
    let decoder_cfg = unsafe { &(*(tx.cfg)).decoder_cfg };
    if let Ok((_, (consumed, flags, expected_status))) = urldecode_ex(input.as_slice(), decoder_cfg)
    {
        (*input).clear();
        input.add(consumed.as_slice());
        tx.flags |= flags;
        tx.response_status_expected_number = expected_status;
        Ok(())
    } else {
        Err(HtpStatus::ERROR)
    }
}

/// Performs in-place decoding of the input string, according to the configuration specified
/// by cfg. On output, various flags (URLEN_*) might be set.
pub fn urldecode_inplace(cfg: &DecoderConfig, input: &mut Bstr, flags: &mut Flags) -> Result<()> {
    if let Ok((_, (consumed, flag, _))) = urldecode_ex(input.as_slice(), cfg) {
        (*input).clear();
        input.add(consumed.as_slice());
        *flags |= flag;
        Ok(())
    } else {
        Err(HtpStatus::ERROR)
    }
}

/// Decodes valid uencoded hex bytes according to the given cfg settings. e.g. "u0064" -> "d"
fn url_decode_valid_uencoding(
    cfg: &DecoderConfig,
) -> impl Fn(&[u8]) -> IResult<&[u8], (u8, HtpUnwanted, Flags, bool)> + '_ {
    move |input| {
        let (left, _) = alt((char('u'), char('U')))(input)?;
        if cfg.u_encoding_decode {
            let (input, hex) = take_while_m_n(4, 4, |c: u8| c.is_ascii_hexdigit())(left)?;
            let (_, (byte, flags)) = decode_u_encoding_params(hex, cfg)?;
            return Ok((input, (byte, cfg.u_encoding_unwanted, flags, true)));
        }
        Ok((input, (b'%', HtpUnwanted::IGNORE, Flags::empty(), true)))
    }
}

/// Decodes invalid uencoded params according to the given cfg settings. e.g. "u00}9" -> "i"
fn url_decode_invalid_uencoding(
    cfg: &DecoderConfig,
) -> impl Fn(&[u8]) -> IResult<&[u8], (u8, HtpUnwanted, Flags, bool)> + '_ {
    move |mut input| {
        let (left, _) = alt((char('u'), char('U')))(input)?;
        let mut byte = b'%';
        let mut code = HtpUnwanted::IGNORE;
        let mut flags = Flags::empty();
        let mut insert = true;
        if cfg.u_encoding_decode {
            // Invalid %u encoding (could not find 4 xdigits).
            let (left, invalid_hex) = take(4usize)(left)?;
            flags |= Flags::URLEN_INVALID_ENCODING;
            code = if cfg.url_encoding_invalid_unwanted != HtpUnwanted::IGNORE {
                cfg.url_encoding_invalid_unwanted
            } else {
                cfg.u_encoding_unwanted
            };
            if cfg.url_encoding_invalid_handling == htp_url_encoding_handling_t::HTP_URL_DECODE_REMOVE_PERCENT {
                // Do not place anything in output; consume the %.
                insert = false;
            } else if cfg.url_encoding_invalid_handling == htp_url_encoding_handling_t::HTP_URL_DECODE_PROCESS_INVALID {
                let (_, (b, f)) = decode_u_encoding_params(invalid_hex, cfg)?;
                flags |= f;
                byte = b;
                input = left;
            }
        }
        Ok((input, (byte, code, flags, insert)))
    }
}

/// Decodes valid hex byte. e.g. "2f" -> "/"
fn url_decode_valid_hex<'a>() -> impl Fn(&'a [u8]) -> IResult<&'a [u8], (u8, HtpUnwanted, Flags, bool)> {
    move |input| {
        // Valid encoding (2 xbytes)
        not(alt((char('u'), char('U'))))(input)?;
        let (input, hex) = take_while_m_n(2, 2, |c: u8| c.is_ascii_hexdigit())(input)?;
        let (_, byte) = x2c(hex)?;
        Ok((input, (byte, HtpUnwanted::IGNORE, Flags::empty(), true)))
    }
}

/// Decodes invalid hex byte according to the given cfg settings. e.g. "}9" -> "i"
fn url_decode_invalid_hex(
    cfg: &DecoderConfig,
) -> impl Fn(&[u8]) -> IResult<&[u8], (u8, HtpUnwanted, Flags, bool)> + '_ {
    move |mut input| {
        not(alt((char('u'), char('U'))))(input)?;
        // Invalid encoding (2 bytes, but not hexadecimal digits).
        let mut byte = b'%';
        let mut insert = true;
        if cfg.url_encoding_invalid_handling == htp_url_encoding_handling_t::HTP_URL_DECODE_REMOVE_PERCENT {
            // Do not place anything in output; consume the %.
            insert = false;
        } else if cfg.url_encoding_invalid_handling == htp_url_encoding_handling_t::HTP_URL_DECODE_PROCESS_INVALID {
            let (left, b) = x2c(input)?;
            input = left;
            byte = b;
        }
        Ok((
            input,
            (
                byte,
                cfg.url_encoding_invalid_unwanted,
                Flags::URLEN_INVALID_ENCODING,
                insert,
            ),
        ))
    }
}

/// If the first byte of the input string is a '%', it attempts to decode according to the
/// configuration specified by cfg. Various flags (URLEN_*) might be set. If something in the
/// input would cause a particular server to respond with an error, the appropriate status
/// code will be set.
fn url_decode_percent(
    cfg: &DecoderConfig,
) -> impl Fn(&[u8]) -> IResult<&[u8], (u8, HtpUnwanted, Flags, bool)> + '_ {
    move |i| {
        let (input, _) = char('%')(i)?;
        let (input, (byte, mut expected_status_code, mut flags, insert)) = alt((
            url_decode_valid_uencoding(cfg),
            url_decode_invalid_uencoding(cfg),
            url_decode_valid_hex(),
            url_decode_invalid_hex(cfg),
            move |input| {
                // Invalid %u encoding; not enough data. (not even 2 bytes)
                Ok((
                    input,
                    (
                        b'%',
                        cfg.url_encoding_invalid_unwanted,
                        Flags::URLEN_INVALID_ENCODING,
                        cfg.url_encoding_invalid_handling != htp_url_encoding_handling_t::HTP_URL_DECODE_REMOVE_PERCENT,
                    ),
                ))
            },
        ))(input)?;
        // Did we get an encoded NUL byte?
        if byte == 0 {
            flags |= Flags::URLEN_ENCODED_NUL;
            if cfg.nul_encoded_unwanted != HtpUnwanted::IGNORE {
                expected_status_code = cfg.nul_encoded_unwanted
            }
            if cfg.nul_encoded_terminates {
                // Terminate the path at the encoded NUL byte.
                return Ok((b"", (byte, expected_status_code, flags, false)));
            }
        }
        Ok((input, (byte, expected_status_code, flags, insert)))
    }
}

/// Consumes the next byte if it is a '+', decoding it according to the cfg.
fn url_decode_plus(
    cfg: &DecoderConfig,
) -> impl Fn(&[u8]) -> IResult<&[u8], (u8, HtpUnwanted, Flags, bool)> + '_ {
    move |input| {
        let (input, byte) = map(char('+'), |byte| {
            // Decoding of the plus character is conditional on the configuration.
            if cfg.plusspace_decode {
                0x20
            } else {
                byte as u8
            }
        })(input)?;
        Ok((input, (byte, HtpUnwanted::IGNORE, Flags::empty(), true)))
    }
}

/// Consumes the next byte in the input string and treats it as an unencoded byte.
/// Handles raw null bytes according to the input cfg settings.
fn url_parse_unencoded_byte(
    cfg: &DecoderConfig,
) -> impl Fn(&[u8]) -> IResult<&[u8], (u8, HtpUnwanted, Flags, bool)> + '_ {
    move |input| {
        let (input, byte) = be_u8(input)?;
        // One non-encoded byte.
        // Did we get a raw NUL byte?
        if byte == 0 {
            return Ok((
                if cfg.nul_raw_terminates { b"" } else { input },
                (
                    byte,
                    cfg.nul_raw_unwanted,
                    Flags::URLEN_RAW_NUL,
                    !cfg.nul_raw_terminates,
                ),
            ));
        }
        Ok((input, (byte, HtpUnwanted::IGNORE, Flags::empty(), true)))
    }
}

/// Performs decoding of the input string, according to the configuration specified by cfg.
/// Various flags (URLEN_*) might be set. If something in the input would cause a particular
/// server to respond with an error, the appropriate status code will be set.
fn urldecode_ex<'a>(
    input: &'a [u8],
    cfg: &'a DecoderConfig,
) -> IResult<&'a [u8], (Vec<u8>, Flags, HtpUnwanted)> {
    fold_many0(
        alt((
            url_decode_percent(cfg),
            url_decode_plus(cfg),
            url_parse_unencoded_byte(cfg),
        )),
        (Vec::new(), Flags::empty(), HtpUnwanted::IGNORE),
        |mut acc: (Vec<_>, Flags, HtpUnwanted), (byte, code, flag, insert)| {
            if insert {
                acc.0.push(byte);
            }
            acc.1 |= flag;
            if code != HtpUnwanted::IGNORE {
                acc.2 = code;
            }
            acc
        },
    )(input)
}

/// Determine if the information provided on the response line is good enough. Browsers are
/// lax when it comes to response line parsing: in most cases they only look for "http" at
/// the beginning.
pub fn treat_response_line_as_body(data: &[u8]) -> bool {
    tuple((opt(take_is_space), tag_no_case("http")))(data).is_err()
}

/// Implements relaxed (not strictly RFC) hostname validation.
pub fn validate_hostname(input: &[u8]) -> bool {
    if input.is_empty() || input.len() > 255 {
        return false;
    }
    if char::<_, (&[u8], nom::error::ErrorKind)>('[')(input).is_ok() {
        return if let Ok((input, _)) = is_not::<_, _, (&[u8], nom::error::ErrorKind)>("#?/]")(input) {
            char::<_, (&[u8], nom::error::ErrorKind)>(']')(input).is_ok()
        } else {
            false
        };
    }
    if tag::<_, _, (&[u8], nom::error::ErrorKind)>(".")(input).is_ok()
        || take_until::<_, _, (&[u8], nom::error::ErrorKind)>("..")(input).is_ok()
    {
        return false;
    }
    for section in input.split(|&c| c == b'.') {
        if section.len() > 63 {
            return false;
        }
        if take_while_m_n::<_, _, (&[u8], nom::error::ErrorKind)>(section.len(), section.len(), |c| {
            c == b'-' || (c as char).is_alphanumeric()
        })(section)
        .is_err()
        {
            return false;
        }
    }
    true
}

/// Returns the crate's version string.
pub fn get_version() -> *const std::os::raw::c_char {
    HTP_VERSION_STRING_FULL.as_ptr() as *const std::os::raw::c_char
}

/// Splits by colon and removes leading whitespace from value.
pub fn split_by_colon(data: &[u8]) -> IResult<&[u8], &[u8]> {
    let (value, (header, _)) = tuple((take_until(":"), char(':')))(data)?;
    let (value, _) = nom_take_is_space(value)?;
    Ok((header, value))
}

// Removes whitespace as defined by nom (tab and ' ')
pub fn nom_take_is_space(data: &[u8]) -> IResult<&[u8], &[u8]> {
    take_while(nom_is_space)(data)
}

/// Returns data before the first null character if it exists.
pub fn take_until_null(data: &[u8]) -> IResult<&[u8], &[u8]> {
    take_while(|c| c != b'\0')(data)
}

/// Returns data without trailing whitespace.
pub fn take_is_space_trailing(data: &[u8]) -> IResult<&[u8], &[u8]> {
    if let Some(index) = data.iter().rposition(|c| !is_space(*c)) {
        Ok((&data[..(index + 1)], &data[(index + 1)..]))
    } else {
        Ok((b"", data))
    }
}

/// Take spaces as defined by is_space.
pub fn take_is_space(data: &[u8]) -> IResult<&[u8], &[u8]> {
    take_while(is_space)(data)
}

/// Take any non-space character as defined by is_space.
pub fn take_not_is_space(data: &[u8]) -> IResult<&[u8], &[u8]> {
    take_while(|c: u8| !is_space(c))(data)
}

/// Returns true if each character is a token.
pub fn is_word_token(data: &[u8]) -> bool {
    !data.iter().any(|c| !is_token(*c))
}

/// Returns all data up to and including the first new line or null.
pub fn take_till_lf_null(data: &[u8]) -> IResult<&[u8], &[u8]> {
    let res = streaming_take_till(|c| c == b'\n' || c == 0)(data);
    if let Ok((_, line)) = res {
        Ok((&data[line.len() + 1..], &data[0..line.len() + 1]))
    } else {
        res
    }
}

/// Returns all data up to and including the first new line.
pub fn take_till_lf(data: &[u8]) -> IResult<&[u8], &[u8]> {
    let res = streaming_take_till(|c| c == b'\n')(data);
    if let Ok((_, line)) = res {
        Ok((&data[line.len() + 1..], &data[0..line.len() + 1]))
    } else {
        res
    }
}

/// Returns a vector of data followed by line ending.
pub fn req_sep_by_line_endings(data: &[u8]) -> IResult<&[u8], Vec<&[u8]>> {
    let header_parser = alt((
        take_while1(|c: u8| c != b'\n' && c != b'\r'),
        alt((tag("\r\n"), tag("\n"))),
    ));
    many1(header_parser)(data)
}

/// Returns all data up to and including the first lf or cr character.
pub fn take_not_eol(data: &[u8]) -> IResult<&[u8], &[u8]> {
    let res = streaming_take_while(|c: u8| c != b'\n' && c != b'\r')(data);
    if let Ok((_, line)) = res {
        Ok((&data[line.len() + 1..], &data[0..line.len() + 1]))
    } else {
        res
    }
}

/// Returns a vector of data followed by line endings.
pub fn res_sep_by_line_endings(data: &[u8]) -> IResult<&[u8], Vec<&[u8]>> {
    let header_parser = alt((
        take_while1(|c: u8| c != b'\n' && c != b'\r'),
        alt((
            tag("\r\n\r\n"),
            tag("\n\r\r\n\r\n"),
            tag("\n\n"),
            tag("\r\r"),
            tag("\r\n"),
            tag("\r"),
            tag("\n"),
        )),
    ));
    many1(header_parser)(data)
}

#[cfg(test)]
#[allow(non_snake_case)]
mod test {
    use super::*;

    #[test]
    fn AsciiDigits() {
        assert_eq!(
            Ok((b"bcd ".as_ref(), (b"a".as_ref(), b"200".as_ref()))),
            ascii_digits()(b"    a200 \t  bcd ")
        );
        assert_eq!(
            Ok((b"".as_ref(), (b"".as_ref(), b"555555555".as_ref()))),
            ascii_digits()(b"   555555555    ")
        );
        assert_eq!(
            Ok((b"500".as_ref(), (b"".as_ref(), b"555555555".as_ref()))),
            ascii_digits()(b"   555555555    500")
        );
        assert!(ascii_digits()(b"   garbage no ascii ").is_err());
    }

    #[test]
    fn HexDigits() {
        assert_eq!(Ok((b"".as_ref(), b"12a5".as_ref())), hex_digits()(b"12a5"));
        assert_eq!(
            Ok((b"".as_ref(), b"12a5".as_ref())),
            hex_digits()(b"    \t12a5    ")
        );
        assert_eq!(
            Ok((b".....".as_ref(), b"12a5".as_ref())),
            hex_digits()(b"12a5   .....")
        );
        assert!(hex_digits()(b"  .....").is_err());
    }

    #[test]
    fn TakeUntilNoCase() {
        let (remaining, consumed) = take_until_no_case(b"TAG")(
            b"Let's fish for a Tag, but what about this TaG, or this TAG, or another tag. GO FISH.",
        )
        .unwrap();
        assert_eq!(consumed, b"Let's fish for a ".as_ref());
        assert_eq!(
            remaining,
            b"Tag, but what about this TaG, or this TAG, or another tag. GO FISH.".as_ref()
        );
    }

    #[test]
    fn flag_operations_on_raw_u64() {
        let mut flags: u64 = 0;
        flags.set(HtpFlags::FIELD_INVALID);
        assert!(flags.is_set(HtpFlags::FIELD_INVALID));
        assert!(!flags.is_set(HtpFlags::FIELD_REPEATED));
        flags.unset(HtpFlags::FIELD_INVALID);
        assert!(!flags.is_set(HtpFlags::FIELD_INVALID));
    }

    #[test]
    fn flag_operations_bridge_bitflags() {
        let mut flags = Flags::empty();
        flags.set(HtpFlags::HOST_MISSING);
        assert!(flags.contains(Flags::HOST_MISSING));
        assert!(flags.is_set(HtpFlags::HOST_MISSING));
    }

    #[test]
    fn trims_leading_and_trailing_whitespace() {
        assert_eq!(trimmed(b"   value   "), b"value");
        assert_eq!(trimmed(b"value"), b"value");
        assert_eq!(trimmed(b"   "), b"");
    }

    #[test]
    fn bestfit_map_falls_back_to_low_byte() {
        let map = BestFitMap::new(&[(bestfit_key!(0xc2u8, 0xa9u8), b'c')]);
        assert_eq!(map.get(bestfit_key!(0xc2u8, 0xa9u8)), b'c');
        assert_eq!(map.get(bestfit_key!(0x00u8, 0x41u8)), b'A');
    }

    #[test]
    fn validates_relaxed_hostnames() {
        assert!(validate_hostname(b"www.example.com"));
        assert!(validate_hostname(b"[::1]"));
        assert!(!validate_hostname(b".example.com"));
        assert!(!validate_hostname(b"example..com"));
        assert!(!validate_hostname(b""));
    }

    #[test]
    fn removes_dot_segments() {
        let mut path = Bstr::from("/a/./b/../c");
        remove_dot_segments_inplace(&mut path);
        assert_eq!(path, "/a/c");

        let mut path = Bstr::from("/../a");
        remove_dot_segments_inplace(&mut path);
        assert_eq!(path, "/a");

        let mut path = Bstr::from("/a/b/..");
        remove_dot_segments_inplace(&mut path);
        assert_eq!(path, "/a/");

        let mut path = Bstr::from("/..");
        remove_dot_segments_inplace(&mut path);
        assert_eq!(path, "/");
    }

    #[test]
    fn decode_uri_path_inplace_applies_all_three_phases() {
        let cfg = DecoderConfig::default();
        let mut flags = Flags::empty();
        let mut status = HtpUnwanted::IGNORE;
        let mut path = Bstr::from("/a%20b/./../c");
        decode_uri_path_inplace(&cfg, &mut flags, &mut status, &mut path);
        assert_eq!(path, "/c");
    }
}
