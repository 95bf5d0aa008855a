//! Per-transaction request/response state.
//!
//! A `Transaction` is created the moment a new request line starts arriving
//! and lives in the owning [`crate::connection::Connection`]'s transaction
//! arena for as long as the connection does; both the inbound and outbound
//! state machines drive the same transaction from opposite ends, advancing
//! `request_progress`/`response_progress` independently since a request can
//! be fully parsed well before its response shows up (pipelining), and a
//! response can equally arrive before we've finished dealing with the
//! request body (100-continue, CONNECT).

use crate::{
    bstr::Bstr,
    config::{Config, HtpUnwanted},
    connection_parser::{ConnectionParser, State},
    error::Result,
    hook::DataHook,
    parsers::parse_content_length,
    request::HtpMethod,
    table::Table,
    uri::{parse_uri, Uri},
    util::{decode_uri_path_inplace, Flags},
};
use std::cmp::Ordering;

/// A single parsed header field, as stored on a transaction.
///
/// Distinct from the [`crate::headers::Header`] nom produces while a header
/// block is being folded and split: by the time one of these exists, folding
/// and name/value splitting are already done, so this is just a plain
/// `Bstr` pair plus whatever anomaly flags were noticed along the way.
#[derive(Clone, Debug)]
pub struct Header {
    pub name: Bstr,
    pub value: Bstr,
    pub flags: u64,
}

impl Header {
    pub fn new(name: impl Into<Bstr>, value: impl Into<Bstr>) -> Self {
        Header {
            name: name.into(),
            value: value.into(),
            flags: 0,
        }
    }

    pub fn new_with_flags(name: impl Into<Bstr>, value: impl Into<Bstr>, flags: u64) -> Self {
        Header {
            name: name.into(),
            value: value.into(),
            flags,
        }
    }
}

/// HTTP version, as seen on a request or status line.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HtpProtocol {
    /// Error while parsing the protocol version.
    ERROR,
    /// Protocol not parsed yet.
    UNKNOWN,
    /// HTTP/0.9, identified by the complete absence of a version token.
    V0_9,
    V1_0,
    V1_1,
    /// A version token was present but didn't parse as `HTTP/<digit>.<digit>`.
    INVALID,
}

/// How far along a request is. Tracked separately from
/// [`HtpResponseProgress`] because, with pipelining, a connection can have a
/// request fully parsed while still waiting on an earlier response.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum HtpRequestProgress {
    START,
    LINE,
    HEADERS,
    BODY,
    TRAILER,
    COMPLETE,
}

/// Mirror of [`HtpRequestProgress`] for the response side.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum HtpResponseProgress {
    START,
    LINE,
    HEADERS,
    BODY,
    TRAILER,
    COMPLETE,
}

/// How a message body is delimited.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HtpTransferCoding {
    /// Not yet determined.
    UNKNOWN,
    /// Delimited by a known length (Content-Length, or a CONNECT/identity body).
    IDENTITY,
    /// Delimited by chunk framing (Transfer-Encoding: chunked).
    CHUNKED,
    /// No body at all.
    NO_BODY,
    ERROR,
}

/// A response status code, which traffic inspection code must treat as
/// plain attacker-controlled bytes until proven otherwise: it may be
/// missing, non-numeric, or out of the 100-999 range entirely.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HtpResponseNumber {
    /// Not seen yet.
    UNKNOWN,
    /// Seen, but didn't parse as a plausible status code.
    INVALID,
    VALUE(u16),
}

impl Default for HtpResponseNumber {
    fn default() -> Self {
        HtpResponseNumber::UNKNOWN
    }
}

impl HtpResponseNumber {
    /// True if this is a concrete status code within `[lo, hi]` (inclusive).
    pub fn in_range(&self, lo: u16, hi: u16) -> bool {
        matches!(self, HtpResponseNumber::VALUE(n) if *n >= lo && *n <= hi)
    }

    /// True if this is exactly the given status code.
    pub fn eq_num(&self, n: u16) -> bool {
        matches!(self, HtpResponseNumber::VALUE(v) if *v == n)
    }
}

/// Data handed to a body-data hook: a borrowed slice of bytes belonging to
/// one transaction, plus whether this is the final (possibly empty) call for
/// that body.
pub struct Data<'a> {
    tx: *mut Transaction,
    data: Option<&'a [u8]>,
    is_last: bool,
}

impl<'a> Data<'a> {
    pub fn new(tx: *mut Transaction, data: Option<&'a [u8]>, is_last: bool) -> Self {
        Data { tx, data, is_last }
    }

    /// The transaction this data chunk belongs to.
    pub fn tx(&self) -> *mut Transaction {
        self.tx
    }

    /// Pointer to the start of the data, or NULL if this call carries no bytes.
    pub fn data(&self) -> *const u8 {
        self.data.map(|d| d.as_ptr()).unwrap_or(std::ptr::null())
    }

    /// Length of the data, 0 if this call carries no bytes.
    pub fn len(&self) -> usize {
        self.data.map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if no further body data will follow for this message.
    pub fn is_last(&self) -> bool {
        self.is_last
    }

    pub fn as_slice(&self) -> Option<&[u8]> {
        self.data
    }
}

/// One HTTP request and its (eventually arriving) response.
///
/// Holds raw pointers back to the owning [`ConnectionParser`] and its
/// [`Config`] rather than borrows: the parser owns a `Vec<Transaction>`
/// inside its `Connection`, and a live `&mut ConnectionParser` is already on
/// the call stack every time a transaction method runs, so a safe borrow
/// would alias. This mirrors the pointer-heavy shape the rest of this crate
/// uses at the `ConnectionParser`/`Config` boundary for the same reason.
pub struct Transaction {
    /// This transaction's index in the connection's transaction arena.
    pub index: usize,
    /// The parser driving this transaction.
    pub connp: *mut ConnectionParser,
    /// The configuration in effect when this transaction was created.
    pub cfg: *const Config,
    /// Opaque per-transaction embedder state, for the hybrid-mode C API.
    pub user_data: *mut core::ffi::c_void,

    /// Anomaly flags accumulated while parsing this transaction.
    pub flags: Flags,

    // --- request ---
    pub request_progress: HtpRequestProgress,
    pub request_line: Option<Bstr>,
    pub request_method: Option<Bstr>,
    pub request_method_number: HtpMethod,
    pub request_uri: Option<Bstr>,
    pub parsed_uri: Option<Uri>,
    pub request_protocol: Option<Bstr>,
    pub request_protocol_number: HtpProtocol,
    /// True if the request line carried no protocol token at all (HTTP/0.9).
    pub is_protocol_0_9: bool,
    pub request_headers: Table<Header>,
    /// Raw bytes of the blank line separating headers from the body (or the
    /// trailer from the end of a chunked message), kept so the original
    /// header block can be reconstructed byte-for-byte if needed.
    pub request_headers_sep: Option<Bstr>,
    /// How many times a repeated header name has been seen, capped at 64.
    pub req_header_repetitions: u8,
    pub request_transfer_coding: HtpTransferCoding,
    /// Value of the Content-Length header, or -1 if absent/invalid.
    pub request_content_length: i64,
    /// Total bytes of body seen so far.
    pub request_message_len: i64,
    /// Number of ignorable (empty/whitespace) lines skipped before the request line.
    pub request_ignored_lines: u32,
    pub hook_request_body_data: DataHook,

    // --- response ---
    pub response_progress: HtpResponseProgress,
    pub response_line: Option<Bstr>,
    pub response_protocol: Option<Bstr>,
    pub response_status: Option<Bstr>,
    pub response_status_number: HtpResponseNumber,
    /// The reason phrase that follows the status code on the status line.
    pub response_message: Option<Bstr>,
    /// Status an anomaly in the *request* would make a compliant server
    /// respond with (e.g. 400 for a malformed request line); compared
    /// against the actual response to spot server-provoked anomalies.
    pub response_status_expected_number: HtpUnwanted,
    pub response_protocol_number: HtpProtocol,
    pub response_headers: Table<Header>,
    /// Raw bytes of the blank line separating response headers from the body.
    pub response_headers_sep: Option<Bstr>,
    /// How many times a repeated response header name has been seen, capped at 64.
    pub res_header_repetitions: u8,
    pub response_transfer_coding: HtpTransferCoding,
    /// Value of the Content-Length header, or -1 if absent/invalid.
    pub response_content_length: i64,
    /// Total bytes of body seen so far.
    pub response_message_len: i64,
    /// Content-Type, lowercased and truncated at the first `;` or space (parameters dropped).
    pub response_content_type: Option<Bstr>,
    /// Number of ignorable (empty/whitespace) lines skipped before the status line.
    pub response_ignored_lines: u32,
    /// How many 100-Continue interim responses have been seen for this
    /// transaction; a second one is a protocol violation.
    pub seen_100continue: u32,
    pub hook_response_body_data: DataHook,
}

impl Transaction {
    /// Creates a new transaction bound to `connp`, inheriting its current config.
    pub fn new(connp: &mut ConnectionParser, index: usize) -> Self {
        Transaction {
            index,
            connp: connp as *mut ConnectionParser,
            cfg: &connp.cfg as *const Config,
            user_data: std::ptr::null_mut(),
            flags: Flags::empty(),

            request_progress: HtpRequestProgress::START,
            request_line: None,
            request_method: None,
            request_method_number: HtpMethod::UNKNOWN,
            request_uri: None,
            parsed_uri: None,
            request_protocol: None,
            request_protocol_number: HtpProtocol::UNKNOWN,
            is_protocol_0_9: false,
            request_headers: Table::with_capacity(32),
            request_headers_sep: None,
            req_header_repetitions: 0,
            request_transfer_coding: HtpTransferCoding::UNKNOWN,
            request_content_length: -1,
            request_message_len: 0,
            request_ignored_lines: 0,
            hook_request_body_data: connp.cfg.hook_request_body_data.clone(),

            response_progress: HtpResponseProgress::START,
            response_line: None,
            response_protocol: None,
            response_status: None,
            response_status_number: HtpResponseNumber::UNKNOWN,
            response_status_expected_number: HtpUnwanted::IGNORE,
            response_protocol_number: HtpProtocol::UNKNOWN,
            response_headers: Table::with_capacity(32),
            response_headers_sep: None,
            res_header_repetitions: 0,
            response_transfer_coding: HtpTransferCoding::UNKNOWN,
            response_content_length: -1,
            response_message_len: 0,
            response_content_type: None,
            response_ignored_lines: 0,
            seen_100continue: 0,
            hook_response_body_data: connp.cfg.hook_response_body_data.clone(),
        }
    }

    /// Derives `request_transfer_coding`/`request_content_length` from the
    /// now-complete set of request headers. A no-op if already determined
    /// (e.g. on the second call after chunked trailers are read).
    fn determine_request_transfer_coding(&mut self, connp: &mut ConnectionParser) {
        if self.request_transfer_coding != HtpTransferCoding::UNKNOWN {
            return;
        }
        if let Some((_, h)) = self
            .request_headers
            .get_nocase_nozero("Transfer-Encoding")
        {
            if h.value.cmp_nocase("chunked") == Ordering::Equal {
                self.request_transfer_coding = HtpTransferCoding::CHUNKED;
                return;
            }
        }
        if let Some((_, h)) = self.request_headers.get_nocase_nozero("Content-Length") {
            match parse_content_length(&h.value, Some(connp)) {
                Some(len) => {
                    self.request_content_length = len;
                    self.request_transfer_coding = HtpTransferCoding::IDENTITY;
                    return;
                }
                None => {
                    self.request_transfer_coding = HtpTransferCoding::ERROR;
                    return;
                }
            }
        }
        self.request_transfer_coding = HtpTransferCoding::NO_BODY;
    }

    /// Starts a new transaction: moves the inbound state machine past IDLE
    /// and into request-line parsing.
    pub fn state_request_start(&mut self, connp: &mut ConnectionParser) -> Result<()> {
        connp.in_state = State::LINE;
        Ok(())
    }

    /// Called once the request line has been parsed. Splits the raw
    /// request-target into a structured URI and normalizes/decodes its path.
    pub fn state_request_line(&mut self, connp: &mut ConnectionParser) -> Result<()> {
        if let Some(uri) = self.request_uri.clone() {
            let mut parsed = parse_uri(uri.as_slice());
            parsed.normalize_port();
            if let Some(path) = &mut parsed.path {
                let decoder_cfg = unsafe { &(*self.cfg).decoder_cfg };
                decode_uri_path_inplace(
                    decoder_cfg,
                    &mut self.flags,
                    &mut self.response_status_expected_number,
                    path,
                );
            }
            self.parsed_uri = Some(parsed);
        }
        self.request_progress = HtpRequestProgress::LINE;
        connp.in_state = State::PROTOCOL;
        Ok(())
    }

    /// Called once the request headers (or, on the second pass, chunked
    /// trailers) have been fully read.
    pub fn state_request_headers(&mut self, connp: &mut ConnectionParser) -> Result<()> {
        connp.req_receiver_finalize_clear()?;
        self.determine_request_transfer_coding(connp);
        if self.request_progress != HtpRequestProgress::TRAILER {
            self.request_progress = HtpRequestProgress::HEADERS;
        }
        connp.in_state = State::CONNECT_CHECK;
        Ok(())
    }

    /// Called once the request (body included) has been fully read.
    pub fn state_request_complete(&mut self, connp: &mut ConnectionParser) -> Result<()> {
        if self.request_progress == HtpRequestProgress::COMPLETE {
            return Ok(());
        }
        self.request_progress = HtpRequestProgress::COMPLETE;
        connp.req_receiver_finalize_clear()?;
        connp.in_state = State::IDLE;
        connp.clear_in_tx();
        Ok(())
    }

    /// Feeds a chunk of request body data (or, with `data: None`, signals
    /// end of body) to the request body hooks.
    pub fn req_process_body_data(
        &mut self,
        connp: &mut ConnectionParser,
        data: Option<&[u8]>,
    ) -> Result<()> {
        let is_last = data.is_none();
        let mut d = Data::new(self as *mut Transaction, data, is_last);
        connp.req_run_hook_body_data(&mut d)
    }

    /// Starts response parsing for this transaction.
    pub fn state_response_start(&mut self, connp: &mut ConnectionParser) -> Result<()> {
        connp.out_state = State::LINE;
        Ok(())
    }

    /// Called once the response status line has been parsed.
    pub fn state_response_line(&mut self, connp: &mut ConnectionParser) -> Result<()> {
        self.response_progress = HtpResponseProgress::LINE;
        connp.out_state = State::HEADERS;
        Ok(())
    }

    /// Called once the response headers (or trailers) have been fully read.
    pub fn state_response_headers(&mut self, connp: &mut ConnectionParser) -> Result<()> {
        connp.res_receiver_finalize_clear()?;
        if self.response_progress != HtpResponseProgress::TRAILER {
            self.response_progress = HtpResponseProgress::HEADERS;
        }
        connp.out_state = State::BODY_DETERMINE;
        Ok(())
    }

    /// Called once the response (body included) has been fully read.
    ///
    /// `hybrid_mode` is nonzero when a hybrid-mode embedder is driving this
    /// transition directly (rather than the stream parser reaching it on
    /// its own), in which case the outbound state machine is left alone:
    /// the embedder owns advancing it.
    pub fn state_response_complete_ex(
        &mut self,
        connp: &mut ConnectionParser,
        hybrid_mode: i32,
    ) -> Result<()> {
        if self.response_progress == HtpResponseProgress::COMPLETE {
            return Ok(());
        }
        self.response_progress = HtpResponseProgress::COMPLETE;
        connp.res_receiver_finalize_clear()?;
        if hybrid_mode == 0 {
            connp.out_state = State::IDLE;
            connp.clear_out_tx();
        }
        Ok(())
    }

    /// Feeds a chunk of response body data (or, with `data: None`, signals
    /// end of body) to the response body hooks.
    pub fn res_process_body_data(
        &mut self,
        connp: &mut ConnectionParser,
        data: Option<&[u8]>,
    ) -> Result<()> {
        let is_last = data.is_none();
        let mut d = Data::new(self as *mut Transaction, data, is_last);
        connp.res_run_hook_body_data(&mut d)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::Config;

    #[test]
    fn new_transaction_starts_at_the_beginning() {
        let mut connp = ConnectionParser::new(Config::default());
        let tx = Transaction::new(&mut connp, 0);
        assert_eq!(tx.request_progress, HtpRequestProgress::START);
        assert_eq!(tx.response_progress, HtpResponseProgress::START);
        assert_eq!(tx.request_method_number, HtpMethod::UNKNOWN);
        assert_eq!(tx.request_transfer_coding, HtpTransferCoding::UNKNOWN);
    }

    #[test]
    fn response_number_range_checks() {
        let n = HtpResponseNumber::VALUE(204);
        assert!(n.in_range(200, 299));
        assert!(!n.in_range(300, 399));
        assert!(n.eq_num(204));
        assert!(!HtpResponseNumber::UNKNOWN.in_range(200, 299));
    }

    #[test]
    fn state_request_line_splits_and_decodes_the_uri() {
        let mut connp = ConnectionParser::new(Config::default());
        let index = connp.create_tx().unwrap();
        connp.set_in_tx_id(Some(index));
        connp.in_tx_mut_ok().unwrap().request_uri =
            Some(Bstr::from("/a%20b/./c?q=1"));
        connp.state_request_line().unwrap();
        let tx = connp.in_tx().unwrap();
        let parsed = tx.parsed_uri.as_ref().unwrap();
        assert_eq!(parsed.path.as_ref().unwrap(), "/a b/./c");
        assert_eq!(parsed.query.as_ref().unwrap(), "q=1");
    }
}
