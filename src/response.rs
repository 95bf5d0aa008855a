use crate::{
    bstr::Bstr,
    connection::Time,
    connection_parser::{ConnectionParser, HtpStreamState, State},
    error::Result,
    hook::DataHook,
    log::HtpLogCode,
    parsers::parse_content_length,
    request::HtpMethod,
    transaction::{Data, HtpResponseProgress, HtpTransferCoding, Transaction},
    uri::Uri,
    util::{
        chomp, is_line_ignorable, is_line_terminator, is_space, take_till_lf,
        treat_response_line_as_body, FlagOperations, HtpFlags,
    },
    HtpStatus,
};
use std::io::{Cursor, Seek, SeekFrom};

/// True if `needle` occurs anywhere in `haystack`, ignoring ASCII case.
fn contains_nocase(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() || haystack.len() < needle.len() {
        return needle.is_empty();
    }
    haystack
        .windows(needle.len())
        .any(|w| w.eq_ignore_ascii_case(needle))
}

impl ConnectionParser {
    /// Sends outstanding connection data to the currently active data receiver hook.
    ///
    /// Returns OK, or a value returned from a callback.
    fn res_receiver_send_data(&mut self, is_last: bool) -> Result<()> {
        let mut data = Data::new(
            self.out_tx_mut_ptr(),
            Some(
                &self.out_curr_data.get_ref()[self.out_current_receiver_offset as usize
                    ..self.out_curr_data.position() as usize],
            ),
            is_last,
        );
        if let Some(hook) = &self.out_data_receiver_hook {
            hook.run_all(&mut data)?;
        } else {
            return Ok(());
        };
        self.out_current_receiver_offset = self.out_curr_data.position();
        Ok(())
    }

    /// Configures the data receiver hook. If there is a previous hook, it will be finalized and cleared.
    ///
    /// Returns OK, or a value returned from a callback.
    fn res_receiver_set(&mut self, data_receiver_hook: Option<DataHook>) -> Result<()> {
        // Ignore result.
        let _ = self.res_receiver_finalize_clear();
        self.out_data_receiver_hook = data_receiver_hook;
        self.out_current_receiver_offset = self.out_curr_data.position();
        Ok(())
    }

    /// Finalizes an existing data receiver hook by sending any outstanding data to it. The
    /// hook is then removed so that it receives no more data.
    ///
    /// Returns OK, or a value returned from a callback.
    pub fn res_receiver_finalize_clear(&mut self) -> Result<()> {
        if self.out_data_receiver_hook.is_none() {
            return Ok(());
        }
        let rc = self.res_receiver_send_data(true);
        self.out_data_receiver_hook = None;
        rc
    }

    /// Handles response parser state changes. At the moment, this function is used only
    /// to configure data receivers, which are sent raw connection data.
    ///
    /// Returns OK, or a value returned from a callback.
    fn res_handle_state_change(&mut self) -> Result<()> {
        if self.out_state_previous == self.out_state {
            return Ok(());
        }
        if self.out_state == State::HEADERS {
            unsafe {
                let header_fn = Some(
                    (*self.out_tx_mut_ok()?.cfg)
                        .hook_response_header_data
                        .clone(),
                );
                let trailer_fn = Some(
                    (*self.out_tx_mut_ok()?.cfg)
                        .hook_response_trailer_data
                        .clone(),
                );

                match self.out_tx_mut_ok()?.response_progress {
                    HtpResponseProgress::HEADERS => self.res_receiver_set(header_fn),
                    HtpResponseProgress::TRAILER => self.res_receiver_set(trailer_fn),
                    _ => Ok(()),
                }?;
            }
        }
        self.out_state_previous = self.out_state;
        Ok(())
    }

    /// If there is any data left in the outbound data chunk, this function will preserve
    /// it for later consumption. The maximum amount accepted for buffering is controlled
    /// by htp_config_t::field_limit.
    ///
    /// Returns OK, or ERROR on fatal failure.
    fn res_check_buffer_limit(&mut self, len: usize) -> Result<()> {
        if len == 0 {
            return Ok(());
        }
        let mut newlen: usize = self.out_buf.len().wrapping_add(len);
        if let Some(header) = &self.out_header {
            newlen = newlen.wrapping_add(header.len())
        }
        let field_limit = unsafe { (*self.out_tx_mut_ok()?.cfg).field_limit };
        if newlen > field_limit {
            htp_error!(
                self,
                HtpLogCode::RESPONSE_FIELD_TOO_LONG,
                format!(
                    "Response buffer over the limit: size {} limit {}.",
                    newlen, field_limit
                )
            );
            return Err(HtpStatus::ERROR);
        }
        Ok(())
    }

    /// The idle state is where the parser will end up after a transaction is processed.
    /// If there is more data available, a new response will be started, unless the
    /// request side is still ahead and a pipeline-related suspension applies.
    ///
    /// Returns OK on state change, ERROR on error, or HTP_DATA when more data is needed.
    pub fn res_idle(&mut self) -> Result<()> {
        // We want to start parsing the next response (and change
        // the state from IDLE) only if there's at least one
        // byte of data available. Otherwise we could be creating
        // new structures even if there's no more data on the
        // connection.
        if self.out_curr_data.position() as i64 >= self.res_curr_len() {
            return Err(HtpStatus::DATA);
        }

        // If the outbound transaction is waiting for the inbound side to
        // catch up (pipelining), don't start a new response yet.
        if self.out_next_tx_index >= self.conn.tx_size() {
            return self.res_create_orphan_tx();
        }

        self.set_out_tx_id(Some(self.out_next_tx_index));
        self.out_next_tx_index = self.out_next_tx_index.wrapping_add(1);

        unsafe {
            let _ = self.state_response_start();
        }
        Ok(())
    }

    /// Creates a transaction with a placeholder request, for a response that
    /// arrived without a matching request ever having been seen (e.g. the
    /// very first bytes on a connection happen to be a response).
    fn res_create_orphan_tx(&mut self) -> Result<()> {
        let index = self.conn.tx_size();
        let mut tx = Transaction::new(self, index);
        tx.request_uri = Some(Bstr::from("/libhtp::request_uri_not_seen"));
        tx.parsed_uri = Some(Uri {
            path: Some(Bstr::from("/libhtp::request_uri_not_seen")),
            ..Uri::new()
        });
        self.conn.push_tx(tx);
        self.out_next_tx_index = index.wrapping_add(1);
        self.set_out_tx_id(Some(index));
        unsafe {
            let _ = self.state_response_start();
        }
        Ok(())
    }

    /// Parse the response line.
    ///
    /// Returns OK on succesful parse, ERROR on error.
    pub fn res_line_complete(&mut self, line: &[u8]) -> Result<()> {
        if !self.out_buf.is_empty() {
            self.res_check_buffer_limit(line.len())?;
        }
        let mut data = std::mem::take(&mut self.out_buf);
        data.add(line);
        if data.len() == 0 {
            return Err(HtpStatus::DATA);
        }
        // Is this a line that should be ignored?
        if is_line_ignorable(self.cfg.server_personality, &data) {
            self.out_tx_mut_ok()?.response_ignored_lines =
                self.out_tx_mut_ok()?.response_ignored_lines.wrapping_add(1);
            return Ok(());
        }
        let data = chomp(&data);
        unsafe {
            self.parse_response_line(data)?;
            self.state_response_line()?;
        }
        Ok(())
    }

    /// Parses response line.
    ///
    /// Returns OK on state change, ERROR on error, or HTP_DATA when more data is needed.
    pub fn res_line(&mut self, data: &[u8]) -> Result<()> {
        match take_till_lf(data) {
            Ok((_, read)) => {
                self.out_curr_data
                    .seek(SeekFrom::Current(read.len() as i64))?;
                self.res_line_complete(read)
            }
            _ => {
                if self.out_status == HtpStreamState::CLOSED {
                    self.out_curr_data.seek(SeekFrom::End(0))?;
                    self.res_line_complete(data)
                } else {
                    self.handle_absent_lf_out(data)
                }
            }
        }
    }

    /// Parses response headers.
    ///
    /// Returns OK on state change, ERROR on error, or HTP_DATA when more data is needed.
    pub fn res_headers(&mut self, data: &[u8]) -> Result<()> {
        let mut rest = data;
        loop {
            if self.out_status == HtpStreamState::CLOSED {
                if let Some(out_header) = self.out_header.take() {
                    self.process_response_header(out_header.as_slice())?;
                }
                self.out_buf.clear();
                self.out_tx_mut_ok()?.response_progress = HtpResponseProgress::TRAILER;
                unsafe { return self.state_response_headers().into() };
            }
            if let Ok((remaining, line)) = take_till_lf(rest) {
                self.out_curr_data
                    .seek(SeekFrom::Current(line.len() as i64))?;
                if !self.out_buf.is_empty() {
                    self.res_check_buffer_limit(line.len())?;
                }
                let mut data = std::mem::take(&mut self.out_buf);
                data.add(line);

                rest = remaining;
                unsafe {
                    if is_line_terminator(self.cfg.server_personality, &data, false) {
                        if let Some(out_header) = self.out_header.take() {
                            self.process_response_header(out_header.as_slice())?;
                        }
                        self.out_tx_mut_ok()?.response_headers_sep = Some(data.clone());
                        return self.state_response_headers().into();
                    }
                }

                let chomped = chomp(&data);
                if !crate::util::is_line_folded(chomped) {
                    if let Some(out_header) = self.out_header.take() {
                        self.process_response_header(out_header.as_slice())?;
                    }

                    if let Some(byte) = remaining.get(0) {
                        if !crate::util::is_folding_char(*byte) {
                            self.process_response_header(chomped)?;
                        } else {
                            self.out_header = Some(Bstr::from(chomped));
                        }
                    } else {
                        self.out_header = Some(Bstr::from(chomped));
                    }
                } else if self.out_header.is_none() {
                    // Folding without a previous header line to fold into; nothing to warn
                    // about distinctly from the request side's equivalent case, so we just
                    // keep the data for parsing later.
                    self.out_header = Some(Bstr::from(chomped));
                } else if let Some(header) = &mut self.out_header {
                    header.add(&chomped);
                }
            } else {
                self.handle_absent_lf_out(rest)?;
            }
        }
    }

    /// Parses one already-assembled (folding already resolved) response
    /// header line and hands it off to the generic header processor.
    ///
    /// Returns OK, or ERROR on a callback failure.
    pub fn process_response_header(&mut self, data: &[u8]) -> Result<()> {
        self.process_response_headers_generic(data)?;
        Ok(())
    }

    /// Determines presence (and encoding) of a response body, following the
    /// permissive rules a traffic inspector needs: CONNECT tunnels, 1xx/204/304
    /// no-body responses, 100-Continue interim responses, and the usual
    /// Transfer-Encoding/Content-Length precedence.
    ///
    /// Returns OK on state change, ERROR on error, or HTP_DATA when more data is needed.
    pub fn res_body_determine(&mut self) -> Result<()> {
        let status = self.out_tx_mut_ok()?.response_status_number;
        let request_method_is_connect =
            self.out_tx_mut_ok()?.request_method_number == HtpMethod::CONNECT;

        let te = self
            .out_tx_mut_ok()?
            .response_headers
            .get_nocase_nozero("Transfer-Encoding")
            .map(|(_, h)| h.value.clone());
        let cl = self
            .out_tx_mut_ok()?
            .response_headers
            .get_nocase_nozero("Content-Length")
            .map(|(_, h)| h.value.clone());

        if request_method_is_connect && status.in_range(200, 299) {
            // The tunnel is established; nothing the server said after the
            // status line belongs to HTTP any more. state_response_headers()
            // always leaves out_state at BODY_DETERMINE, so FINALIZE has to
            // be applied after it runs, not before.
            self.state_response_headers()?;
            self.out_state = State::FINALIZE;
            return Ok(());
        }

        if status.eq_num(101) {
            if te.is_none() && cl.is_none() {
                self.in_status = HtpStreamState::TUNNEL;
                self.out_status = HtpStreamState::TUNNEL;
                self.state_response_headers()?;
                self.out_state = State::FINALIZE;
                return Ok(());
            } else {
                htp_warn!(
                    self,
                    HtpLogCode::SWITCHING_PROTOCOLS_WITH_CONTENT_LENGTH,
                    "Switching Protocols with a Content-Length"
                );
            }
        }

        if status.eq_num(100) && te.is_none() && cl.is_none() {
            if self.out_tx_mut_ok()?.seen_100continue != 0 {
                htp_error!(
                    self,
                    HtpLogCode::ALREADY_SEEN_100_CONTINUE,
                    "Already seen a 100-Continue response"
                );
                return Err(HtpStatus::ERROR);
            }
            self.out_tx_mut_ok()?.response_headers.clear();
            self.out_tx_mut_ok()?.response_progress = HtpResponseProgress::LINE;
            self.out_tx_mut_ok()?.seen_100continue =
                self.out_tx_mut_ok()?.seen_100continue.wrapping_add(1);
            self.out_state = State::LINE;
            return Ok(());
        }

        let request_method_is_head =
            self.out_tx_mut_ok()?.request_method_number == HtpMethod::HEAD;
        if self.out_state != State::FINALIZE && request_method_is_head {
            self.out_tx_mut_ok()?.response_transfer_coding = HtpTransferCoding::NO_BODY;
            self.out_state = State::FINALIZE;
        }

        if self.out_state != State::FINALIZE
            && (status.in_range(100, 199) && !status.eq_num(100) && !status.eq_num(101)
                || status.eq_num(204)
                || status.eq_num(304))
        {
            if te.is_none() && cl.is_none() {
                self.out_tx_mut_ok()?.response_transfer_coding = HtpTransferCoding::NO_BODY;
                self.out_state = State::FINALIZE;
            } else {
                htp_warn!(
                    self,
                    HtpLogCode::RESPONSE_BODY_UNEXPECTED,
                    "Unexpected response body"
                );
            }
        }

        if self.out_state != State::FINALIZE {
            if let Some((_, h)) = self
                .out_tx_mut_ok()?
                .response_headers
                .get_nocase_nozero("Content-Type")
            {
                let mut value = h.value.clone();
                value.make_ascii_lowercase();
                let truncated = value
                    .as_slice()
                    .iter()
                    .position(|&c| c == b';' || is_space(c))
                    .map(|end| &value.as_slice()[..end])
                    .unwrap_or_else(|| value.as_slice());
                self.out_tx_mut_ok()?.response_content_type = Some(Bstr::from(truncated));
            }
        }

        if self.out_state == State::FINALIZE {
            return Ok(());
        }

        if let Some(te) = &te {
            if contains_nocase(te.as_slice(), b"chunked") {
                self.out_tx_mut_ok()?.response_transfer_coding = HtpTransferCoding::CHUNKED;
                self.out_tx_mut_ok()?.response_progress = HtpResponseProgress::BODY;
                self.out_state = State::BODY_CHUNKED_LENGTH;
                if te.cmp_nocase("chunked") != std::cmp::Ordering::Equal {
                    htp_warn!(
                        self,
                        HtpLogCode::ABNORMAL_CHUNKED_ENCODING_VALUE,
                        "Transfer-Encoding has abnormal chunked value"
                    );
                    self.out_tx_mut_ok()?.flags.set(HtpFlags::RESPONSE_INVALID_T_E);
                }
                if self.out_tx_mut_ok()?.response_protocol_number
                    != crate::transaction::HtpProtocol::V1_1
                {
                    htp_warn!(
                        self,
                        HtpLogCode::CHUNKED_ENCODING_ON_OLD_HTTP,
                        "Chunked transfer-coding on HTTP/0.9 or HTTP/1.0"
                    );
                }
                if cl.is_some() {
                    self.out_tx_mut_ok()?.flags.set(HtpFlags::RESPONSE_INVALID_C_L);
                }
                return Ok(());
            }
        }

        if let Some(cl) = &cl {
            self.out_tx_mut_ok()?.response_transfer_coding = HtpTransferCoding::IDENTITY;
            let repeated = self
                .out_tx_mut_ok()?
                .response_headers
                .get_nocase_nozero("Content-Length")
                .map(|(_, h)| h.flags.is_set(HtpFlags::FIELD_REPEATED))
                .unwrap_or(false);
            if repeated {
                self.out_tx_mut_ok()?.flags.set(HtpFlags::RESPONSE_INVALID_C_L);
            }
            match parse_content_length(cl, Some(self)) {
                Some(len) => {
                    self.out_tx_mut_ok()?.response_content_length = len;
                    self.out_content_length = len;
                    self.out_body_data_left = len;
                    if len != 0 {
                        self.out_tx_mut_ok()?.response_progress = HtpResponseProgress::BODY;
                        self.out_state = State::BODY_IDENTITY_CL_KNOWN;
                    } else {
                        self.out_state = State::FINALIZE;
                    }
                }
                None => {
                    htp_error!(
                        self,
                        HtpLogCode::INVALID_CONTENT_LENGTH_FIELD_IN_RESPONSE,
                        "Invalid Content-Length field in response"
                    );
                    return Err(HtpStatus::ERROR);
                }
            }
            return Ok(());
        }

        if let Some(ct) = &self.out_tx_mut_ok()?.response_content_type {
            if contains_nocase(ct.as_slice(), b"multipart/byteranges") {
                htp_error!(
                    self,
                    HtpLogCode::MULTIPART_BYTERANGES_IN_RESPONSE,
                    "C-T multipart/byteranges in responses is not supported"
                );
                return Err(HtpStatus::ERROR);
            }
        }
        self.out_tx_mut_ok()?.response_transfer_coding = HtpTransferCoding::IDENTITY;
        self.out_tx_mut_ok()?.response_progress = HtpResponseProgress::BODY;
        self.out_content_length = -1;
        self.out_body_data_left = -1;
        self.out_state = State::BODY_IDENTITY_STREAM_CLOSE;
        Ok(())
    }

    /// Extracts chunk length.
    ///
    /// Returns OK on state change, ERROR on error, or HTP_DATA when more data is needed.
    pub fn res_body_chunked_length(&mut self, data: &[u8]) -> Result<()> {
        if let Ok((_, line)) = take_till_lf(data) {
            self.out_curr_data
                .seek(SeekFrom::Current(line.len() as i64))?;
            if !self.out_buf.is_empty() {
                self.res_check_buffer_limit(line.len())?;
            }
            let mut data = std::mem::take(&mut self.out_buf);
            data.add(line);

            self.out_tx_mut_ok()?.response_message_len =
                (self.out_tx_mut_ok()?.response_message_len as u64)
                    .wrapping_add(data.len() as u64) as i64;
            if let Ok(Some(chunked_len)) = crate::parsers::parse_chunked_length(&data) {
                self.out_chunked_length = chunked_len as i64;
            } else {
                self.out_chunked_length = -1;
            }

            if self.out_chunked_length > 0 {
                self.out_state = State::BODY_CHUNKED_DATA;
            } else if self.out_chunked_length == 0 {
                self.out_state = State::HEADERS;
                self.out_tx_mut_ok()?.response_progress = HtpResponseProgress::TRAILER;
            } else {
                // A response can fall back to connection-close delimiting
                // rather than aborting the whole stream over a malformed
                // chunk length.
                htp_warn!(
                    self,
                    HtpLogCode::INVALID_RESPONSE_CHUNK_LEN,
                    "Response chunk encoding: Invalid chunk length"
                );
                self.out_content_length = -1;
                self.out_body_data_left = -1;
                self.out_state = State::BODY_IDENTITY_STREAM_CLOSE;
            }
            Ok(())
        } else {
            self.handle_absent_lf_out(data)
        }
    }

    /// Processes a chunk of data.
    ///
    /// Returns OK on state change, ERROR on error, or HTP_DATA when more data is needed.
    pub fn res_body_chunked_data(&mut self, data: &[u8]) -> Result<()> {
        let bytes_to_consume: usize = std::cmp::min(data.len(), self.out_chunked_length as usize);
        if bytes_to_consume == 0 {
            return Err(HtpStatus::DATA);
        }
        self.res_process_body_data_ex(Some(&data[0..bytes_to_consume]))?;
        self.out_curr_data
            .seek(SeekFrom::Current(bytes_to_consume as i64))?;
        self.out_tx_mut_ok()?.response_message_len =
            (self.out_tx_mut_ok()?.response_message_len as u64)
                .wrapping_add(bytes_to_consume as u64) as i64;
        self.out_chunked_length =
            (self.out_chunked_length as u64).wrapping_sub(bytes_to_consume as u64) as i64;
        if self.out_chunked_length == 0 {
            self.out_state = State::BODY_CHUNKED_DATA_END;
            return Ok(());
        }
        Err(HtpStatus::DATA)
    }

    /// Consumes bytes until the end of the current line.
    ///
    /// Returns OK on state change, ERROR on error, or DATA when more data is needed.
    pub fn res_body_chunked_data_end(&mut self, data: &[u8]) -> Result<()> {
        if let Ok((_, parsed)) = take_till_lf(data) {
            let len = parsed.len() as i64;
            self.out_curr_data.seek(SeekFrom::Current(len))?;
            self.out_tx_mut_ok()?.response_message_len += len;
            self.out_state = State::BODY_CHUNKED_LENGTH;
            Ok(())
        } else {
            self.out_tx_mut_ok()?.response_message_len += data.len() as i64;
            self.handle_absent_lf_out(data)
        }
    }

    /// Processes identity response body with a known length.
    ///
    /// Returns OK on state change, ERROR on error, or HTP_DATA when more data is needed.
    pub fn res_body_identity_cl_known(&mut self, data: &[u8]) -> Result<()> {
        let bytes_to_consume: usize = std::cmp::min(data.len(), self.out_body_data_left as usize);
        if bytes_to_consume == 0 {
            return Err(HtpStatus::DATA);
        }
        self.res_process_body_data_ex(Some(&data[0..bytes_to_consume]))?;
        self.out_curr_data
            .seek(SeekFrom::Current(bytes_to_consume as i64))?;
        self.out_tx_mut_ok()?.response_message_len =
            (self.out_tx_mut_ok()?.response_message_len as u64)
                .wrapping_add(bytes_to_consume as u64) as i64;
        self.out_body_data_left =
            (self.out_body_data_left as u64).wrapping_sub(bytes_to_consume as u64) as i64;
        if self.out_body_data_left == 0 {
            self.out_state = State::FINALIZE;
            return Ok(());
        }
        Err(HtpStatus::DATA)
    }

    /// Processes an identity response body delimited by connection close:
    /// every byte offered is body, and there is no definite end short of
    /// the stream actually closing.
    ///
    /// Returns OK on state change, or HTP_DATA when more data is needed.
    pub fn res_body_identity_stream_close(&mut self, data: &[u8]) -> Result<()> {
        if !data.is_empty() {
            self.res_process_body_data_ex(Some(data))?;
            self.out_curr_data.seek(SeekFrom::Current(data.len() as i64))?;
            self.out_tx_mut_ok()?.response_message_len =
                (self.out_tx_mut_ok()?.response_message_len as u64)
                    .wrapping_add(data.len() as u64) as i64;
        }
        if self.out_status == HtpStreamState::CLOSED {
            self.res_process_body_data_ex(None)?;
            self.out_state = State::FINALIZE;
            return Ok(());
        }
        Err(HtpStatus::DATA)
    }

    pub fn res_finalize(&mut self, data: &[u8]) -> Result<()> {
        let mut work = data;
        if self.out_status != HtpStreamState::CLOSED {
            let out_next_byte = self
                .out_curr_data
                .get_ref()
                .get(self.out_curr_data.position() as usize);
            if out_next_byte.is_none() {
                return self.state_response_complete_ex(0).into();
            }
            let lf = out_next_byte.map(|byte| *byte == b'\n').unwrap_or(false);
            if !lf {
                if let Ok((_, line)) = take_till_lf(data) {
                    self.out_curr_data
                        .seek(SeekFrom::Current(line.len() as i64))?;
                    work = line;
                } else {
                    return self.handle_absent_lf_out(data);
                }
            }
        }

        if !self.out_buf.is_empty() {
            self.res_check_buffer_limit(work.len())?;
        }
        self.out_buf.add(work);
        let data = std::mem::take(&mut self.out_buf);

        if data.is_empty() {
            return self.state_response_complete_ex(0).into();
        }

        if treat_response_line_as_body(&data) {
            // Does not look like a new status line; treat as continued body data.
            if self.out_body_data_left <= 0 {
                htp_warn!(
                    self,
                    HtpLogCode::RESPONSE_BODY_UNEXPECTED,
                    "Unexpected response body"
                );
            } else {
                self.out_body_data_left = 1;
            }
            let rc = self.res_process_body_data_ex(Some(&data));
            self.out_buf.clear();
            return rc;
        }

        self.out_buf = data;
        if (self.out_curr_data.position() as i64) < self.out_buf.len() as i64 {
            self.out_curr_data.set_position(0);
        } else {
            self.out_curr_data
                .seek(SeekFrom::Current((self.out_buf.len() as i64) * -1))?;
        }
        self.state_response_complete_ex(0).into()
    }

    fn handle_absent_lf_out(&mut self, data: &[u8]) -> Result<()> {
        self.out_curr_data.seek(SeekFrom::End(0))?;
        self.res_check_buffer_limit(data.len())?;
        self.out_buf.add(data);
        Err(HtpStatus::DATA_BUFFER)
    }

    /// Run the RESPONSE_BODY_DATA hook.
    pub fn res_run_hook_body_data(&mut self, d: &mut Data) -> Result<()> {
        // Do not invoke callbacks with an empty data chunk
        if !d.data().is_null() && d.len() == 0 {
            return Ok(());
        }
        if let Some(out_tx) = self.out_tx() {
            out_tx.hook_response_body_data.run_all(d)?;
        }
        self.cfg.hook_response_body_data.run_all(d)?;
        Ok(())
    }

    /// Returns HtpStreamState
    pub unsafe fn res_data(
        &mut self,
        timestamp: Option<Time>,
        data: *const core::ffi::c_void,
        len: usize,
    ) -> HtpStreamState {
        if self.out_status == HtpStreamState::STOP {
            htp_info!(
                self,
                HtpLogCode::PARSER_STATE_ERROR,
                "Outbound parser is in STOP state"
            );
            return HtpStreamState::STOP;
        }
        if self.out_status == HtpStreamState::ERROR {
            htp_error!(
                self,
                HtpLogCode::PARSER_STATE_ERROR,
                "Outbound parser is in ERROR state"
            );
            return HtpStreamState::ERROR;
        }
        if self.out_tx().is_none() && self.out_state != State::IDLE {
            self.out_status = HtpStreamState::ERROR;
            htp_error!(
                self,
                HtpLogCode::MISSING_OUTBOUND_TRANSACTION_DATA,
                "Missing outbound transaction data"
            );
            return HtpStreamState::ERROR;
        }
        if len == 0 && self.out_status != HtpStreamState::CLOSED {
            htp_error!(
                self,
                HtpLogCode::ZERO_LENGTH_DATA_CHUNKS,
                "Zero-length data chunks are not allowed"
            );
            return HtpStreamState::CLOSED;
        }
        if let Some(timestamp) = timestamp {
            self.out_timestamp = timestamp;
        }

        let chunk = std::slice::from_raw_parts(data as *mut u8, len);
        self.out_curr_data = Cursor::new(chunk.to_vec());
        self.out_current_receiver_offset = 0;
        self.conn.track_outbound_data(len);
        if self.out_status == HtpStreamState::TUNNEL {
            return HtpStreamState::TUNNEL;
        }

        loop {
            let mut rc;

            if data.is_null() && len > 0 {
                match self.out_state {
                    State::BODY_IDENTITY_STREAM_CLOSE => rc = self.handle_out_state(chunk),
                    State::FINALIZE => rc = self.state_response_complete_ex(0).into(),
                    _ => {
                        htp_error!(
                            self,
                            HtpLogCode::INVALID_GAP,
                            "Gaps are not allowed during this state"
                        );
                        return HtpStreamState::CLOSED;
                    }
                }
            } else {
                rc = self.handle_out_state(chunk);
            }

            if rc.is_ok() {
                if self.out_status == HtpStreamState::TUNNEL {
                    return HtpStreamState::TUNNEL;
                }
                rc = self.res_handle_state_change()
            }
            match rc {
                Ok(_) => {}
                Err(HtpStatus::DATA) | Err(HtpStatus::DATA_BUFFER) => {
                    let _ = self.res_receiver_send_data(false);
                    self.out_status = HtpStreamState::DATA;
                    return HtpStreamState::DATA;
                }
                Err(HtpStatus::STOP) => {
                    self.out_status = HtpStreamState::STOP;
                    return HtpStreamState::STOP;
                }
                Err(_) => {
                    self.out_status = HtpStreamState::ERROR;
                    return HtpStreamState::ERROR;
                }
            }
        }
    }

    pub fn res_curr_len(&self) -> i64 {
        self.out_curr_data.get_ref().len() as i64
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::Config;
    use crate::transaction::{Header, HtpResponseNumber};

    fn connp_with_tx() -> ConnectionParser {
        let mut connp = ConnectionParser::new(Config::default());
        connp.open(None, None, None, None, None);
        let index = connp.create_tx().unwrap();
        connp.set_out_tx_id(Some(index));
        connp
    }

    fn set_status(connp: &mut ConnectionParser, status: u16) {
        connp.out_tx_mut_ok().unwrap().response_status_number = HtpResponseNumber::VALUE(status);
    }

    fn add_header(connp: &mut ConnectionParser, name: &str, value: &str) {
        connp
            .out_tx_mut_ok()
            .unwrap()
            .response_headers
            .add(Bstr::from(name), Header::new(name, value));
    }

    #[test]
    fn chunked_transfer_encoding_selects_chunked_state() {
        let mut connp = connp_with_tx();
        set_status(&mut connp, 200);
        add_header(&mut connp, "Transfer-Encoding", "chunked");
        connp.res_body_determine().unwrap();
        assert_eq!(connp.out_state, State::BODY_CHUNKED_LENGTH);
        assert_eq!(
            connp.out_tx_mut_ok().unwrap().response_transfer_coding,
            HtpTransferCoding::CHUNKED
        );
    }

    #[test]
    fn content_length_selects_identity_known() {
        let mut connp = connp_with_tx();
        set_status(&mut connp, 200);
        add_header(&mut connp, "Content-Length", "42");
        connp.res_body_determine().unwrap();
        assert_eq!(connp.out_state, State::BODY_IDENTITY_CL_KNOWN);
        assert_eq!(connp.out_body_data_left, 42);
    }

    #[test]
    fn zero_content_length_has_no_body() {
        let mut connp = connp_with_tx();
        set_status(&mut connp, 200);
        add_header(&mut connp, "Content-Length", "0");
        connp.res_body_determine().unwrap();
        assert_eq!(connp.out_state, State::FINALIZE);
    }

    #[test]
    fn no_framing_header_falls_back_to_stream_close() {
        let mut connp = connp_with_tx();
        set_status(&mut connp, 200);
        connp.res_body_determine().unwrap();
        assert_eq!(connp.out_state, State::BODY_IDENTITY_STREAM_CLOSE);
        assert_eq!(connp.out_body_data_left, -1);
    }

    #[test]
    fn no_content_status_codes_have_no_body() {
        for status in [204, 304] {
            let mut connp = connp_with_tx();
            set_status(&mut connp, status);
            connp.res_body_determine().unwrap();
            assert_eq!(connp.out_state, State::FINALIZE, "status {}", status);
        }
    }

    #[test]
    fn head_response_has_no_body_regardless_of_framing() {
        let mut connp = connp_with_tx();
        set_status(&mut connp, 200);
        connp.out_tx_mut_ok().unwrap().request_method_number = HtpMethod::HEAD;
        add_header(&mut connp, "Content-Length", "100");
        connp.res_body_determine().unwrap();
        assert_eq!(connp.out_state, State::FINALIZE);
        assert_eq!(
            connp.out_tx_mut_ok().unwrap().response_transfer_coding,
            HtpTransferCoding::NO_BODY
        );
    }

    #[test]
    fn hundred_continue_resets_for_the_real_response() {
        let mut connp = connp_with_tx();
        set_status(&mut connp, 100);
        add_header(&mut connp, "X-Junk", "discarded");
        connp.res_body_determine().unwrap();
        assert_eq!(connp.out_state, State::LINE);
        assert_eq!(connp.out_tx_mut_ok().unwrap().seen_100continue, 1);
        assert_eq!(connp.out_tx_mut_ok().unwrap().response_headers.size(), 0);
    }

    #[test]
    fn repeated_hundred_continue_is_an_error() {
        let mut connp = connp_with_tx();
        set_status(&mut connp, 100);
        connp.res_body_determine().unwrap();
        set_status(&mut connp, 100);
        assert!(connp.res_body_determine().is_err());
    }

    #[test]
    fn connect_tunnel_response_finalizes_without_reverting_to_body_determine() {
        let mut connp = connp_with_tx();
        connp.out_tx_mut_ok().unwrap().request_method_number = HtpMethod::CONNECT;
        set_status(&mut connp, 200);
        connp.res_body_determine().unwrap();
        assert_eq!(connp.out_state, State::FINALIZE);
    }

    #[test]
    fn switching_protocols_without_framing_tunnels_both_directions() {
        let mut connp = connp_with_tx();
        set_status(&mut connp, 101);
        connp.res_body_determine().unwrap();
        assert_eq!(connp.out_state, State::FINALIZE);
        assert_eq!(connp.in_status, HtpStreamState::TUNNEL);
        assert_eq!(connp.out_status, HtpStreamState::TUNNEL);
    }

    #[test]
    fn switching_protocols_with_content_length_is_not_a_tunnel() {
        let mut connp = connp_with_tx();
        set_status(&mut connp, 101);
        add_header(&mut connp, "Content-Length", "10");
        connp.res_body_determine().unwrap();
        assert_eq!(connp.out_state, State::BODY_IDENTITY_CL_KNOWN);
        assert_ne!(connp.out_status, HtpStreamState::TUNNEL);
    }

    #[test]
    fn invalid_chunk_length_falls_back_to_stream_close() {
        let mut connp = connp_with_tx();
        set_status(&mut connp, 200);
        add_header(&mut connp, "Transfer-Encoding", "chunked");
        connp.res_body_determine().unwrap();
        connp.res_body_chunked_length(b"not-hex\r\n").unwrap();
        assert_eq!(connp.out_state, State::BODY_IDENTITY_STREAM_CLOSE);
        assert_eq!(connp.out_body_data_left, -1);
    }

    #[test]
    fn multipart_byteranges_content_type_is_rejected() {
        let mut connp = connp_with_tx();
        set_status(&mut connp, 200);
        add_header(&mut connp, "Content-Type", "multipart/byteranges; boundary=x");
        assert!(connp.res_body_determine().is_err());
    }
}
