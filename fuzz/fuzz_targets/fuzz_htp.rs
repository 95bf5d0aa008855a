#![allow(non_snake_case)]
#![no_main]
#[macro_use]
extern crate libfuzzer_sys;
extern crate htp_ids;

use htp_ids::connection_parser::{ConnectionParser, HtpStreamState};
use htp_ids::config::{Config, HtpServerPersonality};
use std::net::{IpAddr, Ipv4Addr};

#[derive(Debug)]
enum Chunk {
    Client(Vec<u8>),
    Server(Vec<u8>),
}

#[derive(Debug)]
struct TestInput {
    chunks: Vec<Chunk>,
}

impl TestInput {
    // Splits a fuzzer-provided byte string into client/server chunks on
    // ">>>"/"<<<" boundary markers, same convention the corpus fixtures use.
    fn new(input: &[u8]) -> Self {
        let mut test_input = TestInput { chunks: Vec::new() };
        let mut current = Vec::<u8>::new();
        let mut client = true;
        for line in input.split(|c| *c == b'\n') {
            if line.len() >= 3
                && ((line[0] == b'>' && line[1] == b'>' && line[2] == b'>')
                    || (line[0] == b'<' && line[1] == b'<' && line[2] == b'<'))
            {
                if !current.is_empty() {
                    if let Some(b'\n') = current.last() {
                        current.pop();
                    }
                    if let Some(b'\r') = current.last() {
                        current.pop();
                    }
                    test_input.append(client, current);
                    current = Vec::<u8>::new();
                }
                client = line[0] == b'>';
            } else {
                current.extend_from_slice(line);
                current.push(b'\n');
            }
        }
        current.pop();
        test_input.append(client, current);
        test_input
    }

    fn append(&mut self, client: bool, data: Vec<u8>) {
        if client {
            self.chunks.push(Chunk::Client(data));
        } else {
            self.chunks.push(Chunk::Server(data));
        }
    }
}

impl IntoIterator for TestInput {
    type Item = Chunk;
    type IntoIter = std::vec::IntoIter<Self::Item>;
    fn into_iter(self) -> Self::IntoIter {
        self.chunks.into_iter()
    }
}

fn test_config() -> Config {
    let mut cfg = Config::default();
    cfg.set_server_personality(HtpServerPersonality::APACHE_2);
    cfg
}

fn run(data: &[u8]) {
    let mut connp = ConnectionParser::new(test_config());
    connp.open(
        Some(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))),
        Some(10000),
        Some(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))),
        Some(80),
        None,
    );

    let mut request_buf: Option<Vec<u8>> = None;
    let mut response_buf: Option<Vec<u8>> = None;
    for chunk in TestInput::new(data) {
        match chunk {
            Chunk::Client(bytes) => unsafe {
                let rc =
                    connp.req_data(None, bytes.as_ptr() as *const core::ffi::c_void, bytes.len());
                if rc == HtpStreamState::ERROR {
                    return;
                }
                if rc == HtpStreamState::DATA_OTHER {
                    let consumed = connp.req_data_consumed() as usize;
                    request_buf = Some(bytes[consumed..].to_vec());
                }
            },
            Chunk::Server(bytes) => unsafe {
                if let Some(remaining) = response_buf.take() {
                    let rc = connp.res_data(
                        None,
                        remaining.as_ptr() as *const core::ffi::c_void,
                        remaining.len(),
                    );
                    if rc == HtpStreamState::ERROR {
                        return;
                    }
                }
                let rc =
                    connp.res_data(None, bytes.as_ptr() as *const core::ffi::c_void, bytes.len());
                if rc == HtpStreamState::ERROR {
                    return;
                }
                if rc == HtpStreamState::DATA_OTHER {
                    let consumed = connp.res_data_consumed() as usize;
                    response_buf = Some(bytes[consumed..].to_vec());
                }
                if let Some(remaining) = request_buf.take() {
                    let rc = connp.req_data(
                        None,
                        remaining.as_ptr() as *const core::ffi::c_void,
                        remaining.len(),
                    );
                    if rc == HtpStreamState::ERROR {
                        return;
                    }
                }
            },
        }
    }

    if let Some(remaining) = response_buf.take() {
        unsafe {
            connp.res_data(
                None,
                remaining.as_ptr() as *const core::ffi::c_void,
                remaining.len(),
            );
        }
    }
    connp.close(None);
}

fuzz_target!(|data: &[u8]| {
    run(data);
});
