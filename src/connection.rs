//! Per-connection state: endpoints, byte counters, and the anomaly log.

use crate::log::{Log, LogChannel, Message};
use crate::transaction::Transaction;
use crate::util::ConnectionFlags;
use std::net::IpAddr;
use std::sync::mpsc::Sender;

/// A timestamp as handed across the C API: seconds and microseconds since
/// the epoch. Kept as a plain `libc::timeval` rather than a `chrono`
/// timestamp so the FFI surface doesn't need to know about a calendar
/// library at all.
pub type Time = libc::timeval;

/// Endpoint and traffic-volume state for one TCP connection, shared by every
/// transaction parsed on it.
pub struct Connection {
    /// Client IP address.
    pub client_addr: Option<IpAddr>,
    /// Client port.
    pub client_port: Option<u16>,
    /// Server IP address.
    pub server_addr: Option<IpAddr>,
    /// Server port.
    pub server_port: Option<u16>,

    /// Anomaly/diagnostic log channel for this connection.
    log_channel: LogChannel,

    /// Connection-wide parsing flags.
    pub flags: ConnectionFlags,
    /// When the connection was opened.
    pub open_timestamp: Option<Time>,
    /// When the connection was closed.
    pub close_timestamp: Option<Time>,
    /// Inbound byte counter.
    pub in_data_counter: i64,
    /// Outbound byte counter.
    pub out_data_counter: i64,

    /// Every transaction parsed on this connection, in the order it was created.
    transactions: Vec<Transaction>,
}

impl Default for Connection {
    fn default() -> Self {
        Self {
            client_addr: None,
            client_port: None,
            server_addr: None,
            server_port: None,
            log_channel: LogChannel::new(),
            flags: ConnectionFlags::UNKNOWN,
            open_timestamp: None,
            close_timestamp: None,
            in_data_counter: 0,
            out_data_counter: 0,
            transactions: Vec::new(),
        }
    }
}

impl Connection {
    /// Records the connection's endpoints and open time. Does not perform
    /// any I/O; the parser is fed data separately.
    pub fn open(
        &mut self,
        client_addr: Option<IpAddr>,
        client_port: Option<u16>,
        server_addr: Option<IpAddr>,
        server_port: Option<u16>,
        timestamp: Option<Time>,
    ) {
        self.client_addr = client_addr;
        self.client_port = client_port;
        self.server_addr = server_addr;
        self.server_port = server_port;
        if timestamp.is_some() {
            self.open_timestamp = timestamp;
        }
    }

    /// Records the connection's close time.
    pub fn close(&mut self, timestamp: Option<Time>) {
        if timestamp.is_some() {
            self.close_timestamp = timestamp;
        }
    }

    /// Keeps track of inbound data volume.
    pub fn track_inbound_data(&mut self, len: usize) {
        self.in_data_counter = (self.in_data_counter as u64).wrapping_add(len as u64) as i64;
    }

    /// Keeps track of outbound data volume.
    pub fn track_outbound_data(&mut self, len: usize) {
        self.out_data_counter = (self.out_data_counter as u64).wrapping_add(len as u64) as i64;
    }

    /// The sending half of this connection's log channel; used by the
    /// `htp_warn!`/`htp_error!`/`htp_info!` macros.
    pub fn log_sender(&self) -> Sender<Message> {
        self.log_channel.sender()
    }

    /// Drains and returns every anomaly logged on this connection so far.
    pub fn get_logs(&self) -> Vec<Log> {
        self.log_channel
            .get_logs()
            .into_iter()
            .map(|msg| self.attach(msg))
            .collect()
    }

    /// Returns the next logged anomaly, if any, without blocking.
    pub fn get_next_log(&self) -> Option<Log> {
        self.log_channel.get_next_log().map(|msg| self.attach(msg))
    }

    /// Number of transactions created on this connection so far.
    pub fn tx_size(&self) -> usize {
        self.transactions.len()
    }

    /// Appends a newly created transaction to the connection's arena.
    pub fn push_tx(&mut self, tx: Transaction) {
        self.transactions.push(tx);
    }

    /// Looks up a transaction by index.
    pub fn tx(&self, index: usize) -> Option<&Transaction> {
        self.transactions.get(index)
    }

    /// Looks up a transaction by index, mutably.
    pub fn tx_mut(&mut self, index: usize) -> Option<&mut Transaction> {
        self.transactions.get_mut(index)
    }

    /// Looks up a transaction by index, as a raw pointer (NULL if absent).
    ///
    /// Exposed for hybrid-mode embedders that hold on to a transaction
    /// pointer across calls into the parser.
    pub fn tx_mut_ptr(&mut self, index: usize) -> *mut Transaction {
        self.tx_mut(index)
            .map(|tx| tx as *mut Transaction)
            .unwrap_or(std::ptr::null_mut())
    }

    fn attach(&self, msg: Message) -> Log {
        Log {
            msg,
            client_addr: self.client_addr,
            client_port: self.client_port,
            server_addr: self.server_addr,
            server_port: self.server_port,
        }
    }
}

impl PartialEq for Connection {
    fn eq(&self, rhs: &Self) -> bool {
        self.client_addr == rhs.client_addr
            && self.client_port == rhs.client_port
            && self.server_addr == rhs.server_addr
            && self.server_port == rhs.server_port
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::log::{HtpLogCode, HtpLogLevel};
    use std::net::Ipv4Addr;

    #[test]
    fn tracks_endpoints_and_data_volume() {
        let mut conn = Connection::default();
        conn.open(
            Some(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))),
            Some(32768),
            Some(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))),
            Some(80),
            None,
        );
        conn.track_inbound_data(10);
        conn.track_inbound_data(5);
        assert_eq!(conn.in_data_counter, 15);
        assert_eq!(conn.client_port, Some(32768));
    }

    #[test]
    fn logged_messages_carry_connection_context() {
        let conn = Connection::default();
        crate::log::emit(
            &conn.log_sender(),
            HtpLogLevel::WARNING,
            HtpLogCode::REQUEST_LINE_INVALID,
            "test",
            file!(),
            line!(),
        );
        let logs = conn.get_logs();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].msg.level, HtpLogLevel::WARNING);
    }
}
