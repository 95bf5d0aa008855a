#![allow(non_camel_case_types)]

//! A permissive, stream-oriented HTTP/1.x parser.
//!
//! The parser is built as a resumable state machine: each call into the
//! connection parser feeds it a chunk of bytes and the state machine runs
//! until it runs out of input, finds a reason to stop, or hits an error.
//! Traffic inspection tools are expected to tolerate malformed input rather
//! than reject it, so most anomalies are recorded as flags on the
//! transaction instead of aborting the parse.

#[macro_use]
pub mod log;

pub mod bstr;
pub mod config;
pub mod connection;
pub mod connection_parser;
pub mod error;
pub mod headers;
pub mod hook;
pub mod list;
pub mod parsers;
pub mod request;
pub mod request_generic;
pub mod response;
pub mod response_generic;
pub mod table;
pub mod transaction;
pub mod utf8_decoder;
pub mod uri;
pub mod util;

/// Status returned by most parsing operations.
///
/// `OK` means a step completed and the state machine can move on. The other
/// variants are not really "errors" in the Rust sense so much as signals the
/// feed driver uses to decide what to do next: ask for more data, pause,
/// hand control to the other side of a tunnel, or give up on the connection.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HtpStatus {
    ERROR = -1,
    OK = 0,
    DECLINED = 10,
    /// More data is needed before this step can complete.
    DATA = 11,
    /// More data is needed, but on the other stream (request vs response).
    DATA_OTHER = 12,
    /// Parsing complete for this stream; the caller should stop feeding it.
    STOP = 13,
    /// Like `DATA`, but the data consumed so far should be buffered by the
    /// caller because the parser will need it again.
    DATA_BUFFER = 14,
}

impl std::fmt::Display for HtpStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for HtpStatus {}
