//! Parser configuration.
//!
//! `Config` is handed to a [`crate::connection_parser::ConnectionParser`] by
//! value and lives for as long as the connection does; `Transaction` only
//! ever sees it through the raw pointer the connection parser hands out; by
//! the time a transaction exists the parser already owns the config, and
//! there is no safe way to give the transaction its own borrow without
//! fighting the arena-of-transactions design `Connection` uses.

use crate::hook::{DataHook, FileDataHook};
use crate::util::BestFitMap;

/// Controls how a server is assumed to behave when its behavior isn't
/// dictated by a standard. Most of the difference between personalities is
/// in how forgiving they are of malformed input.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HtpServerPersonality {
    /// Minimal handling, no compensation for server/browser quirks.
    MINIMAL,
    /// Mimic the generic behavior used by most open-source components.
    GENERIC,
    /// Mimic IIS 5.0, as shipped with Windows 2000.
    IIS_5_0,
    /// Mimic Apache 2.x.
    APACHE_2,
}

impl Default for HtpServerPersonality {
    fn default() -> Self {
        HtpServerPersonality::GENERIC
    }
}

/// The status an anomaly should be reported with. Traffic inspection code
/// never aborts on a malformed field, but records what status a compliant
/// server would plausibly have responded with, for detection rules that key
/// off the expected response.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HtpUnwanted {
    /// Nothing unusual about this.
    IGNORE,
    /// The condition is unusual enough to be reported, with the given status code.
    CODE(u16),
}

impl HtpUnwanted {
    pub const BAD_REQUEST: HtpUnwanted = HtpUnwanted::CODE(400);
    pub const NOT_IMPLEMENTED: HtpUnwanted = HtpUnwanted::CODE(501);
}

/// How a parser should behave when it encounters invalid percent-encoding.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum htp_url_encoding_handling_t {
    /// Leave invalid encodings in the output untouched, '%' and all.
    HTP_URL_DECODE_PRESERVE_PERCENT,
    /// Drop the '%' but keep decoding the rest as best it can.
    HTP_URL_DECODE_REMOVE_PERCENT,
    /// Attempt to decode the invalid encoding anyway.
    HTP_URL_DECODE_PROCESS_INVALID,
}

/// Knobs for the URI/path percent- and UTF-8-decoding pipeline.
///
/// Every field here corresponds to a specific evasion or compatibility
/// concern the original libhtp catalogued; sensible defaults try to match
/// the most common server behavior (a mix of Apache and IIS quirks).
#[derive(Clone)]
pub struct DecoderConfig {
    /// Whether to decode `%u`-encoded characters.
    pub u_encoding_decode: bool,
    /// Reported status when a valid `%u` encoding is seen.
    pub u_encoding_unwanted: HtpUnwanted,
    /// Convert backslashes to forward slashes.
    pub backslash_convert_slashes: bool,
    /// Lowercase decoded bytes.
    pub convert_lowercase: bool,
    /// Compress consecutive path separators into one.
    pub path_separators_compress: bool,
    /// Actually decode encoded path separators, rather than leaving them encoded.
    pub path_separators_decode: bool,
    /// Reported status when an encoded path separator is seen.
    pub path_separators_encoded_unwanted: HtpUnwanted,
    /// Reported status when an encoded NUL byte is seen.
    pub nul_encoded_unwanted: HtpUnwanted,
    /// Stop decoding at an encoded NUL byte.
    pub nul_encoded_terminates: bool,
    /// Reported status when a raw NUL byte is seen.
    pub nul_raw_unwanted: HtpUnwanted,
    /// Stop decoding at a raw NUL byte.
    pub nul_raw_terminates: bool,
    /// Reported status when a raw control character is seen.
    pub control_chars_unwanted: HtpUnwanted,
    /// How to handle invalid percent-encoding.
    pub url_encoding_invalid_handling: htp_url_encoding_handling_t,
    /// Reported status when invalid percent-encoding is seen.
    pub url_encoding_invalid_unwanted: HtpUnwanted,
    /// Decode '+' as a space in the query string.
    pub plusspace_decode: bool,
    /// Convert decoded UTF-8 to its best-fit single-byte form in place.
    pub utf8_convert_bestfit: bool,
    /// Reported status when invalid UTF-8 is seen in a path.
    pub utf8_invalid_unwanted: HtpUnwanted,
    /// Table used to collapse UTF-8/`%u` characters with no ASCII
    /// equivalent down to a single representative byte.
    pub bestfit_map: BestFitMap,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        DecoderConfig {
            u_encoding_decode: true,
            u_encoding_unwanted: HtpUnwanted::IGNORE,
            backslash_convert_slashes: false,
            convert_lowercase: false,
            path_separators_compress: false,
            path_separators_decode: false,
            path_separators_encoded_unwanted: HtpUnwanted::IGNORE,
            nul_encoded_unwanted: HtpUnwanted::IGNORE,
            nul_encoded_terminates: false,
            nul_raw_unwanted: HtpUnwanted::IGNORE,
            nul_raw_terminates: false,
            control_chars_unwanted: HtpUnwanted::IGNORE,
            url_encoding_invalid_handling: htp_url_encoding_handling_t::HTP_URL_DECODE_PRESERVE_PERCENT,
            url_encoding_invalid_unwanted: HtpUnwanted::IGNORE,
            plusspace_decode: true,
            utf8_convert_bestfit: false,
            utf8_invalid_unwanted: HtpUnwanted::IGNORE,
            bestfit_map: BestFitMap::new(&[]),
        }
    }
}

/// Top-level parser configuration, owned by the
/// [`crate::connection_parser::ConnectionParser`] for the life of a connection.
pub struct Config {
    /// Decoding options for URI paths and urlencoded parameters.
    pub decoder_cfg: DecoderConfig,
    /// Which server's quirks to emulate when the standard doesn't say.
    pub server_personality: HtpServerPersonality,
    /// Maximum size of a single header/request line field before it's
    /// flagged as unreasonably long.
    pub field_limit: usize,
    /// Reported status for a request line with leading whitespace.
    pub requestline_leading_whitespace_unwanted: HtpUnwanted,
    /// Directory new PUT request body tempfiles are created in.
    pub tmpdir: String,
    /// Called with each chunk of raw request header data, as seen on the wire.
    pub hook_request_header_data: DataHook,
    /// Called with each chunk of request body data.
    pub hook_request_body_data: DataHook,
    /// Called with each chunk of raw request trailer data, as seen on the wire.
    pub hook_request_trailer_data: DataHook,
    /// Called with each chunk of a PUT request body treated as a file.
    pub hook_request_file_data: FileDataHook,
    /// Called with each chunk of raw response header data, as seen on the wire.
    pub hook_response_header_data: DataHook,
    /// Called with each chunk of response body data.
    pub hook_response_body_data: DataHook,
    /// Called with each chunk of raw response trailer data, as seen on the wire.
    pub hook_response_trailer_data: DataHook,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            decoder_cfg: DecoderConfig::default(),
            server_personality: HtpServerPersonality::default(),
            field_limit: 18_000,
            requestline_leading_whitespace_unwanted: HtpUnwanted::IGNORE,
            tmpdir: std::env::temp_dir().to_string_lossy().into_owned(),
            hook_request_header_data: DataHook::default(),
            hook_request_body_data: DataHook::default(),
            hook_request_trailer_data: DataHook::default(),
            hook_request_file_data: FileDataHook::default(),
            hook_response_header_data: DataHook::default(),
            hook_response_body_data: DataHook::default(),
            hook_response_trailer_data: DataHook::default(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Config::default()
    }

    pub fn set_server_personality(&mut self, personality: HtpServerPersonality) {
        self.server_personality = personality;
    }

    pub fn set_field_limit(&mut self, limit: usize) {
        self.field_limit = limit;
    }

    pub fn set_u_encoding_decode(&mut self, enabled: bool) {
        self.decoder_cfg.u_encoding_decode = enabled;
    }

    pub fn set_backslash_convert_slashes(&mut self, enabled: bool) {
        self.decoder_cfg.backslash_convert_slashes = enabled;
    }

    pub fn set_convert_lowercase(&mut self, enabled: bool) {
        self.decoder_cfg.convert_lowercase = enabled;
    }

    pub fn set_path_separators_compress(&mut self, enabled: bool) {
        self.decoder_cfg.path_separators_compress = enabled;
    }

    pub fn set_path_separators_decode(&mut self, enabled: bool) {
        self.decoder_cfg.path_separators_decode = enabled;
    }

    pub fn set_nul_encoded_terminates(&mut self, enabled: bool) {
        self.decoder_cfg.nul_encoded_terminates = enabled;
    }

    pub fn set_nul_raw_terminates(&mut self, enabled: bool) {
        self.decoder_cfg.nul_raw_terminates = enabled;
    }

    pub fn set_plusspace_decode(&mut self, enabled: bool) {
        self.decoder_cfg.plusspace_decode = enabled;
    }

    pub fn set_utf8_convert_bestfit(&mut self, enabled: bool) {
        self.decoder_cfg.utf8_convert_bestfit = enabled;
    }

    pub fn set_url_encoding_invalid_handling(&mut self, handling: htp_url_encoding_handling_t) {
        self.decoder_cfg.url_encoding_invalid_handling = handling;
    }

    pub fn set_bestfit_map(&mut self, map: BestFitMap) {
        self.decoder_cfg.bestfit_map = map;
    }

    /// Releases this configuration. A no-op beyond normal `Drop` semantics;
    /// kept as an explicit method so embedders that received a `*mut Config`
    /// from [`create`] have a symmetric call to pair with it.
    pub fn destroy(&mut self) {}
}

/// Allocates a `Config` with default settings, returning an owning raw
/// pointer for callers that need a stable address to hand across an FFI
/// boundary.
///
/// # Safety
/// The returned pointer must eventually be passed to [`Config::destroy`]
/// and then freed with `Box::from_raw`, exactly once.
pub fn create() -> *mut Config {
    Box::into_raw(Box::new(Config::default()))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_are_permissive() {
        let cfg = Config::default();
        assert_eq!(cfg.server_personality, HtpServerPersonality::GENERIC);
        assert!(cfg.decoder_cfg.u_encoding_decode);
    }

    #[test]
    fn setters_reach_the_decoder_config() {
        let mut cfg = Config::default();
        cfg.set_url_encoding_invalid_handling(
            htp_url_encoding_handling_t::HTP_URL_DECODE_PROCESS_INVALID,
        );
        assert_eq!(
            cfg.decoder_cfg.url_encoding_invalid_handling,
            htp_url_encoding_handling_t::HTP_URL_DECODE_PROCESS_INVALID
        );
    }
}
