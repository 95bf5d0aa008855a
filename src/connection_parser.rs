//! The resumable request/response state machine driver.
//!
//! `ConnectionParser` owns exactly one [`Connection`], one [`Config`], and
//! drives two independent state machines (inbound/request, outbound/response)
//! over whatever bytes are fed to it via [`ConnectionParser::request`]/
//! [`ConnectionParser::response`] (defined in `request.rs`/`response.rs`).
//! Nothing here blocks or owns a socket; callers hand over bytes as they
//! arrive and get a `HtpStreamState` back telling them what to do next.

use crate::{
    bstr::Bstr,
    config::{Config, HtpServerPersonality},
    connection::{Connection, Time},
    error::Result,
    hook::DataHook,
    transaction::Transaction,
    util::{ConnectionFlags, File},
    HtpStatus,
};
use std::io::Cursor;

/// Per-stream parsing state. Not every variant is valid for both the
/// request and response directions; states only used by one side are noted.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum State {
    NONE,
    IDLE,
    LINE,
    HEADERS,
    BODY_CHUNKED_DATA_END,
    BODY_CHUNKED_DATA,
    BODY_CHUNKED_LENGTH,
    BODY_DETERMINE,
    FINALIZE,
    /// request-only
    PROTOCOL,
    /// request-only
    CONNECT_CHECK,
    /// request-only
    CONNECT_PROBE_DATA,
    /// request-only
    CONNECT_WAIT_RESPONSE,
    /// request-only
    BODY_IDENTITY,
    /// request-only
    IGNORE_DATA_AFTER_HTTP_0_9,
    /// response-only
    BODY_IDENTITY_STREAM_CLOSE,
    /// response-only
    BODY_IDENTITY_CL_KNOWN,
}

/// The state of one direction (request or response) of a connection's stream.
#[repr(C)]
#[derive(Copy, Clone, PartialEq, Debug)]
pub enum HtpStreamState {
    NEW,
    OPEN,
    CLOSED,
    ERROR,
    /// A CONNECT request succeeded; bytes from here on are opaque to us.
    TUNNEL,
    DATA_OTHER,
    STOP,
    DATA,
}

/// Drives the request and response state machines for one connection.
pub struct ConnectionParser {
    /// This parser's configuration. Owned, not shared: each connection gets
    /// its own (cheap, since the hook lists inside are reference-counted).
    pub cfg: Config,
    /// The connection this parser is working on.
    pub conn: Connection,
    /// Opaque pointer for embedders to stash their own per-connection state on.
    pub user_data: *mut core::ffi::c_void,

    /// Inbound (request) stream status.
    pub in_status: HtpStreamState,
    /// Outbound (response) stream status.
    pub out_status: HtpStreamState,
    /// Set when inbound data is still unprocessed but the response parser
    /// needs to stop at the end of the current transaction to let another
    /// request be produced first (pipelining).
    pub out_data_other_at_tx_end: bool,

    /// Timestamp of the last inbound chunk, if the caller provided one.
    pub in_timestamp: Option<Time>,
    /// The current inbound data chunk; `position()` tracks how much of it
    /// has been consumed so far.
    pub in_curr_data: Cursor<Vec<u8>>,
    pub in_current_receiver_offset: u64,
    pub in_chunk_count: usize,
    pub in_chunk_request_index: usize,
    /// Buffered partial line, when a line can't be processed without more data.
    pub in_buf: Bstr,
    /// Accumulator for a folded (multi-line) request header.
    pub in_header: Option<Bstr>,
    in_tx: Option<usize>,
    pub in_content_length: i64,
    pub in_body_data_left: i64,
    pub in_chunked_length: i64,
    pub in_state: State,
    pub in_state_previous: State,
    /// Receiver for raw inbound bytes, when request header data is being observed.
    pub in_data_receiver_hook: Option<DataHook>,

    /// Index of the next transaction expected to produce a response.
    pub out_next_tx_index: usize,
    pub out_timestamp: Option<Time>,
    pub out_curr_data: Cursor<Vec<u8>>,
    pub out_current_receiver_offset: u64,
    pub out_buf: Bstr,
    pub out_header: Option<Bstr>,
    out_tx: Option<usize>,
    pub out_content_length: i64,
    pub out_body_data_left: i64,
    pub out_chunked_length: i64,
    pub out_state: State,
    pub out_state_previous: State,
    pub out_data_receiver_hook: Option<DataHook>,

    /// Extracted body of the current PUT request, if any.
    pub put_file: Option<File>,
}

impl std::fmt::Debug for ConnectionParser {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("ConnectionParser")
            .field("in_status", &self.in_status)
            .field("out_status", &self.out_status)
            .field("user_data", &self.user_data)
            .field("in_tx", &self.in_tx)
            .field("out_tx", &self.out_tx)
            .finish()
    }
}

impl ConnectionParser {
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            conn: Connection::default(),
            user_data: std::ptr::null_mut(),
            in_status: HtpStreamState::NEW,
            out_status: HtpStreamState::NEW,
            out_data_other_at_tx_end: false,
            in_timestamp: None,
            in_curr_data: Cursor::new(Vec::new()),
            in_current_receiver_offset: 0,
            in_chunk_count: 0,
            in_chunk_request_index: 0,
            in_buf: Bstr::new(),
            in_header: None,
            in_tx: None,
            in_content_length: 0,
            in_body_data_left: 0,
            in_chunked_length: 0,
            in_state: State::IDLE,
            in_state_previous: State::NONE,
            in_data_receiver_hook: None,
            out_next_tx_index: 0,
            out_timestamp: None,
            out_curr_data: Cursor::new(Vec::new()),
            out_current_receiver_offset: 0,
            out_buf: Bstr::new(),
            out_header: None,
            out_tx: None,
            out_content_length: 0,
            out_body_data_left: 0,
            out_chunked_length: 0,
            out_state: State::IDLE,
            out_state_previous: State::NONE,
            out_data_receiver_hook: None,
            put_file: None,
        }
    }

    /// Creates a transaction, attaches it to the connection, and makes it
    /// the current inbound transaction.
    pub fn create_tx(&mut self) -> Result<usize> {
        // A new request arriving before the previous response finished means
        // the client is pipelining.
        if self.conn.tx_size() > self.out_next_tx_index {
            self.conn.flags |= ConnectionFlags::PIPELINED;
        }
        let index = self.conn.tx_size();
        let tx = Transaction::new(self, index);
        self.conn.push_tx(tx);
        self.in_tx = Some(index);
        self.in_reset();
        Ok(index)
    }

    /// Drops any reference this parser holds to the given transaction
    /// index (the transaction itself stays in the connection's arena).
    pub fn remove_tx(&mut self, tx: usize) {
        if let Some(in_tx) = self.in_tx() {
            if in_tx.index == tx {
                self.in_tx = None
            }
        }
        if let Some(out_tx) = self.out_tx() {
            if out_tx.index == tx {
                self.out_tx = None
            }
        }
    }

    pub fn in_tx(&self) -> Option<&Transaction> {
        self.in_tx.and_then(|in_tx| self.conn.tx(in_tx))
    }

    pub fn in_tx_mut(&mut self) -> Option<&mut Transaction> {
        self.in_tx.and_then(move |in_tx| self.conn.tx_mut(in_tx))
    }

    pub fn in_tx_mut_ok(&mut self) -> Result<&mut Transaction> {
        self.in_tx
            .and_then(move |in_tx| self.conn.tx_mut(in_tx))
            .ok_or(HtpStatus::ERROR)
    }

    pub fn in_tx_ptr(&self) -> *const Transaction {
        self.in_tx()
            .map(|in_tx| in_tx as *const Transaction)
            .unwrap_or(std::ptr::null())
    }

    pub fn in_tx_mut_ptr(&mut self) -> *mut Transaction {
        self.in_tx_mut()
            .map(|in_tx| in_tx as *mut Transaction)
            .unwrap_or(std::ptr::null_mut())
    }

    pub fn set_in_tx(&mut self, tx: &Transaction) {
        self.in_tx = Some(tx.index);
    }

    pub fn set_in_tx_id(&mut self, tx_id: Option<usize>) {
        self.in_tx = tx_id;
    }

    pub fn clear_in_tx(&mut self) {
        self.in_tx = None;
    }

    pub fn out_tx(&self) -> Option<&Transaction> {
        self.out_tx.and_then(|out_tx| self.conn.tx(out_tx))
    }

    pub fn out_tx_mut(&mut self) -> Option<&mut Transaction> {
        self.out_tx.and_then(move |out_tx| self.conn.tx_mut(out_tx))
    }

    pub fn out_tx_mut_ok(&mut self) -> Result<&mut Transaction> {
        self.out_tx
            .and_then(move |out_tx| self.conn.tx_mut(out_tx))
            .ok_or(HtpStatus::ERROR)
    }

    pub fn out_tx_ptr(&self) -> *const Transaction {
        self.out_tx()
            .map(|out_tx| out_tx as *const Transaction)
            .unwrap_or(std::ptr::null())
    }

    pub fn out_tx_mut_ptr(&mut self) -> *mut Transaction {
        self.out_tx_mut()
            .map(|out_tx| out_tx as *mut Transaction)
            .unwrap_or(std::ptr::null_mut())
    }

    pub fn set_out_tx(&mut self, tx: &Transaction) {
        self.out_tx = Some(tx.index);
    }

    pub fn set_out_tx_id(&mut self, tx_id: Option<usize>) {
        self.out_tx = tx_id;
    }

    pub fn clear_out_tx(&mut self) {
        self.out_tx = None;
    }

    /// Dispatches to the handler for the current inbound state.
    pub fn handle_in_state(&mut self, data: &[u8]) -> Result<()> {
        let data = &data[self.in_curr_data.position() as usize..];
        match self.in_state {
            State::NONE => Err(HtpStatus::ERROR),
            State::IDLE => self.req_idle(),
            State::IGNORE_DATA_AFTER_HTTP_0_9 => self.req_ignore_data_after_http_0_9(),
            State::LINE => self.req_line(data),
            State::PROTOCOL => self.req_protocol(data),
            State::HEADERS => self.req_headers(data),
            State::CONNECT_WAIT_RESPONSE => self.req_connect_wait_response(),
            State::CONNECT_CHECK => self.req_connect_check(),
            State::CONNECT_PROBE_DATA => self.req_connect_probe_data(data),
            State::BODY_DETERMINE => self.req_body_determine(),
            State::BODY_CHUNKED_DATA => self.req_body_chunked_data(data),
            State::BODY_CHUNKED_LENGTH => self.req_body_chunked_length(data),
            State::BODY_CHUNKED_DATA_END => self.req_body_chunked_data_end(data),
            State::BODY_IDENTITY => self.req_body_identity(data),
            State::FINALIZE => self.req_finalize(data),
            // response-only states
            _ => Err(HtpStatus::ERROR),
        }
    }

    /// Dispatches to the handler for the current outbound state.
    pub fn handle_out_state(&mut self, data: &[u8]) -> Result<()> {
        let data = &data[self.out_curr_data.position() as usize..];
        match self.out_state {
            State::NONE => Err(HtpStatus::ERROR),
            State::IDLE => self.res_idle(),
            State::LINE => self.res_line(data),
            State::HEADERS => self.res_headers(data),
            State::BODY_DETERMINE => self.res_body_determine(),
            State::BODY_CHUNKED_DATA => self.res_body_chunked_data(data),
            State::BODY_CHUNKED_LENGTH => self.res_body_chunked_length(data),
            State::BODY_CHUNKED_DATA_END => self.res_body_chunked_data_end(data),
            State::FINALIZE => self.res_finalize(data),
            State::BODY_IDENTITY_STREAM_CLOSE => self.res_body_identity_stream_close(data),
            State::BODY_IDENTITY_CL_KNOWN => self.res_body_identity_cl_known(data),
            // request-only states
            _ => Err(HtpStatus::ERROR),
        }
    }

    /// Parses a request line, dispatching on server personality for the
    /// handful of quirks (e.g. Apache's tolerance for missing whitespace)
    /// that vary by it.
    pub fn parse_request_line(&mut self, request_line: &[u8]) -> Result<()> {
        self.in_tx_mut_ok()?.request_line = Some(Bstr::from(request_line));
        if self.cfg.server_personality == HtpServerPersonality::APACHE_2 {
            self.parse_request_line_generic_ex(request_line, true)
        } else {
            self.parse_request_line_generic_ex(request_line, false)
        }
    }

    /// Parses a response status line.
    pub fn parse_response_line(&mut self, response_line: &[u8]) -> Result<()> {
        self.out_tx_mut_ok()?.response_line = Some(Bstr::from(response_line));
        self.parse_response_line_generic(response_line)
    }

    pub fn process_request_headers<'a>(&mut self, data: &'a [u8]) -> Result<(&'a [u8], bool)> {
        self.process_request_headers_generic(data)
    }

    pub fn process_response_headers<'a>(&mut self, data: &'a [u8]) -> Result<(&'a [u8], bool)> {
        self.process_response_headers_generic(data)
    }

    /// Tells the inbound stream there is no more data coming, letting it
    /// finalize whatever depends on stream closure (e.g. identity bodies
    /// delimited by connection close).
    pub fn req_close(&mut self, timestamp: Option<Time>) {
        if self.in_status != HtpStreamState::ERROR {
            self.in_status = HtpStreamState::CLOSED
        }
        unsafe {
            self.req_data(timestamp, std::ptr::null(), 0);
        }
    }

    /// Closes both directions of the connection.
    pub fn close(&mut self, timestamp: Option<Time>) {
        self.conn.close(timestamp);
        if self.in_status != HtpStreamState::ERROR {
            self.in_status = HtpStreamState::CLOSED
        }
        if self.out_status != HtpStreamState::ERROR {
            self.out_status = HtpStreamState::CLOSED
        }
        unsafe {
            self.req_data(timestamp, std::ptr::null(), 0);
            self.res_data(timestamp, std::ptr::null(), 0);
        }
    }

    /// Resets the per-transaction inbound accounting. Called when a new
    /// transaction starts.
    pub fn in_reset(&mut self) {
        self.in_content_length = -1;
        self.in_body_data_left = -1;
        self.in_chunk_request_index = self.in_chunk_count;
    }

    /// Bytes consumed from the current inbound chunk so far.
    pub fn req_data_consumed(&self) -> i64 {
        self.in_curr_data.position() as i64
    }

    /// Bytes consumed from the current outbound chunk so far.
    pub fn res_data_consumed(&self) -> i64 {
        self.out_curr_data.position() as i64
    }

    /// Records the connection's endpoints, rejecting the call if the
    /// connection has already been opened.
    pub fn open(
        &mut self,
        client_addr: Option<std::net::IpAddr>,
        client_port: Option<u16>,
        server_addr: Option<std::net::IpAddr>,
        server_port: Option<u16>,
        timestamp: Option<Time>,
    ) {
        if self.in_status != HtpStreamState::NEW || self.out_status != HtpStreamState::NEW {
            htp_error!(
                self,
                crate::log::HtpLogCode::CONNECTION_ALREADY_OPEN,
                "Connection is already open"
            );
            return;
        }
        self.conn
            .open(client_addr, client_port, server_addr, server_port, timestamp);
        self.in_status = HtpStreamState::OPEN;
        self.out_status = HtpStreamState::OPEN;
    }

    /// Attaches opaque embedder state to this parser.
    pub fn set_user_data(&mut self, user_data: *mut core::ffi::c_void) {
        self.user_data = user_data;
    }

    pub fn req_process_body_data_ex(&mut self, data: &[u8]) -> Result<()> {
        let connp_ptr: *mut Self = self as *mut Self;
        if let Some(tx) = self.in_tx_mut() {
            tx.req_process_body_data(unsafe { &mut *connp_ptr }, Some(data))
        } else {
            Err(HtpStatus::ERROR)
        }
    }

    pub fn state_request_start(&mut self) -> Result<()> {
        let connp_ptr: *mut Self = self as *mut Self;
        if let Some(tx) = self.in_tx_mut() {
            tx.state_request_start(unsafe { &mut *connp_ptr })
        } else {
            Err(HtpStatus::ERROR)
        }
    }

    pub fn state_request_headers(&mut self) -> Result<()> {
        let connp_ptr: *mut Self = self as *mut Self;
        if let Some(tx) = self.in_tx_mut() {
            tx.state_request_headers(unsafe { &mut *connp_ptr })
        } else {
            Err(HtpStatus::ERROR)
        }
    }

    pub fn state_request_line(&mut self) -> Result<()> {
        let connp_ptr: *mut Self = self as *mut Self;
        if let Some(tx) = self.in_tx_mut() {
            tx.state_request_line(unsafe { &mut *connp_ptr })
        } else {
            Err(HtpStatus::ERROR)
        }
    }

    pub fn state_request_complete(&mut self) -> Result<()> {
        let connp_ptr: *mut Self = self as *mut Self;
        if let Some(tx) = self.in_tx_mut() {
            tx.state_request_complete(unsafe { &mut *connp_ptr })
        } else {
            Err(HtpStatus::ERROR)
        }
    }

    pub fn res_process_body_data_ex(&mut self, data: Option<&[u8]>) -> Result<()> {
        let connp_ptr: *mut Self = self as *mut Self;
        if let Some(tx) = self.out_tx_mut() {
            tx.res_process_body_data(unsafe { &mut *connp_ptr }, data)
        } else {
            Err(HtpStatus::ERROR)
        }
    }

    pub fn state_response_start(&mut self) -> Result<()> {
        let connp_ptr: *mut Self = self as *mut Self;
        if let Some(tx) = self.out_tx_mut() {
            tx.state_response_start(unsafe { &mut *connp_ptr })
        } else {
            Err(HtpStatus::ERROR)
        }
    }

    pub fn state_response_headers(&mut self) -> Result<()> {
        let connp_ptr: *mut Self = self as *mut Self;
        if let Some(tx) = self.out_tx_mut() {
            tx.state_response_headers(unsafe { &mut *connp_ptr })
        } else {
            Err(HtpStatus::ERROR)
        }
    }

    pub fn state_response_line(&mut self) -> Result<()> {
        let connp_ptr: *mut Self = self as *mut Self;
        if let Some(tx) = self.out_tx_mut() {
            tx.state_response_line(unsafe { &mut *connp_ptr })
        } else {
            Err(HtpStatus::ERROR)
        }
    }

    pub fn state_response_complete_ex(&mut self, hybrid_mode: i32) -> Result<()> {
        let connp_ptr: *mut Self = self as *mut Self;
        if let Some(tx) = self.out_tx_mut() {
            tx.state_response_complete_ex(unsafe { &mut *connp_ptr }, hybrid_mode)
        } else {
            Err(HtpStatus::ERROR)
        }
    }
}
