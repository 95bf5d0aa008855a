//! Anomaly and diagnostic logging.
//!
//! Traffic inspection code wants to know about malformed input without the
//! parser aborting because of it, so most of what would be `log::warn!` or
//! `log::error!` calls elsewhere end up here instead: each one is attached
//! to the connection that produced it and can be drained by the embedder
//! independently of whatever general-purpose logger the host process uses.

use std::net::IpAddr;
use std::sync::mpsc::{channel, Receiver, Sender};

/// Severity of a logged event.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HtpLogLevel {
    ERROR,
    WARNING,
    INFO,
}

/// Stable identifiers for the anomalies and events the parser can report.
///
/// Kept as an enum (rather than raw strings) so embedders can filter or
/// count occurrences without parsing message text.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HtpLogCode {
    CONNECTION_ALREADY_OPEN,
    REQUEST_FIELD_TOO_LONG,
    REQUEST_FIELD_MISSING_COLON,
    REQUEST_INVALID_EMPTY_NAME,
    REQUEST_INVALID_LWS_AFTER_NAME,
    REQUEST_HEADER_INVALID,
    INVALID_REQUEST_FIELD_FOLDING,
    DUPLICATE_CONTENT_LENGTH_FIELD_IN_REQUEST,
    REQUEST_HEADER_REPETITION,
    REQUEST_LINE_LEADING_WHITESPACE,
    METHOD_DELIM_NON_COMPLIANT,
    URI_DELIM_NON_COMPLIANT,
    REQUEST_LINE_UNKNOWN_METHOD,
    REQUEST_LINE_UNKNOWN_METHOD_NO_PROTOCOL,
    REQUEST_LINE_UNKNOWN_METHOD_INVALID_PROTOCOL,
    REQUEST_LINE_NO_PROTOCOL,
    REQUEST_LINE_INVALID,
    INVALID_REQUEST_CHUNK_LEN,
    INVALID_CONTENT_LENGTH_FIELD_IN_REQUEST,
    REQUEST_SERVER_PORT_TX,
    PARSER_STATE_ERROR,
    MISSING_INBOUND_TRANSACTION_DATA,
    ZERO_LENGTH_DATA_CHUNKS,
    INVALID_GAP,
    REQUEST_BODY_UNEXPECTED,
    REQUEST_BODY_DATA_ON_GET,
    CONTENT_LENGTH_EXTRA_DATA_START,
    CONTENT_LENGTH_EXTRA_DATA_END,
    PROTOCOL_CONTAINS_EXTRA_DATA,
    RESPONSE_LINE_INVALID,
    RESPONSE_FIELD_MISSING_COLON,
    RESPONSE_INVALID_EMPTY_NAME,
    RESPONSE_INVALID_LWS_AFTER_NAME,
    RESPONSE_HEADER_REPETITION,
    DUPLICATE_CONTENT_LENGTH_FIELD_IN_RESPONSE,
    URI_HOST_INVALID,
    HEADER_HOST_INVALID,
    AUTH_UNRECOGNIZED,
    MISSING_OUTBOUND_TRANSACTION_DATA,
    RESPONSE_FIELD_TOO_LONG,
    RESPONSE_BODY_UNEXPECTED,
    INVALID_CONTENT_LENGTH_FIELD_IN_RESPONSE,
    INVALID_RESPONSE_CHUNK_LEN,
    ABNORMAL_CHUNKED_ENCODING_VALUE,
    CHUNKED_ENCODING_ON_OLD_HTTP,
    SWITCHING_PROTOCOLS_WITH_CONTENT_LENGTH,
    ALREADY_SEEN_100_CONTINUE,
    MULTIPART_BYTERANGES_IN_RESPONSE,
}

/// A single logged event, attached to the connection that produced it.
pub struct Message {
    pub level: HtpLogLevel,
    pub code: HtpLogCode,
    pub msg: String,
    pub file: String,
    pub line: u32,
}

/// A logged event paired with enough connection context to make sense of it
/// once it's been pulled out of the channel.
pub struct Log {
    pub msg: Message,
    pub client_addr: Option<IpAddr>,
    pub client_port: Option<u16>,
    pub server_addr: Option<IpAddr>,
    pub server_port: Option<u16>,
}

/// The sending/receiving halves of a connection's log channel.
///
/// A channel (rather than a plain `Vec`) lets the embedder drain messages
/// from a different thread than the one doing the parsing, without needing
/// a lock around the connection itself.
pub struct LogChannel {
    sender: Sender<Message>,
    receiver: Receiver<Message>,
}

impl LogChannel {
    pub fn new() -> Self {
        let (sender, receiver) = channel();
        LogChannel { sender, receiver }
    }

    pub fn sender(&self) -> Sender<Message> {
        self.sender.clone()
    }

    /// Pulls the next queued message, if any, without blocking.
    pub fn get_next_log(&self) -> Option<Message> {
        self.receiver.try_recv().ok()
    }

    /// Drains every message currently queued.
    pub fn get_logs(&self) -> Vec<Message> {
        self.receiver.try_iter().collect()
    }
}

impl Default for LogChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Pushes a message onto a connection's log channel. Send failures (nobody
/// is listening any more) are silently ignored, mirroring the "best effort"
/// nature of this kind of diagnostic logging.
#[doc(hidden)]
pub fn emit(sender: &Sender<Message>, level: HtpLogLevel, code: HtpLogCode, msg: &str, file: &str, line: u32) {
    let _ = sender.send(Message {
        level,
        code,
        msg: msg.to_string(),
        file: file.to_string(),
        line,
    });
}

/// Logs an error-level anomaly against `$connp`'s connection.
#[macro_export]
macro_rules! htp_error {
    ($connp:expr, $code:expr, $msg:expr) => {
        $crate::log::emit(
            &$connp.conn.log_sender(),
            $crate::log::HtpLogLevel::ERROR,
            $code,
            $msg,
            file!(),
            line!(),
        )
    };
}

/// Logs a warning-level anomaly against `$connp`'s connection.
#[macro_export]
macro_rules! htp_warn {
    ($connp:expr, $code:expr, $msg:expr) => {
        $crate::log::emit(
            &$connp.conn.log_sender(),
            $crate::log::HtpLogLevel::WARNING,
            $code,
            $msg,
            file!(),
            line!(),
        )
    };
}

/// Logs an info-level event against `$connp`'s connection.
#[macro_export]
macro_rules! htp_info {
    ($connp:expr, $code:expr, $msg:expr) => {
        $crate::log::emit(
            &$connp.conn.log_sender(),
            $crate::log::HtpLogLevel::INFO,
            $code,
            $msg,
            file!(),
            line!(),
        )
    };
}

/// Logs a warning exactly once per transaction: `$tx_flags` (a transaction's
/// persistent flag set) records whether `$flag` has already been reported,
/// while `$local_flags` accumulates the same bit for the caller's own use
/// (e.g. attaching it to the header currently being built).
#[macro_export]
macro_rules! htp_warn_once {
    ($connp:expr, $code:expr, $msg:expr, $tx_flags:expr, $local_flags:expr, $flag:expr) => {{
        if !$tx_flags.is_set($flag) {
            htp_warn!($connp, $code, $msg);
        }
        $tx_flags.set($flag);
        $local_flags.set($flag);
    }};
}
