use crate::{
    error::Result,
    headers::{response_headers, Flags as HeaderFlags},
    connection_parser::ConnectionParser,
    log::HtpLogCode,
    parsers::{parse_content_length, parse_protocol, parse_status},
    transaction::Header,
    util::{is_space, take_ascii_whitespace, take_is_space, FlagOperations, HtpFlags},
};
use nom::{bytes::complete::take_while, error::ErrorKind, sequence::tuple};
use std::cmp::Ordering;

impl ConnectionParser {
    /// Extract one response header. A header can span multiple lines, in
    /// which case they will be folded into one before parsing is attempted.
    ///
    /// Returns OK or ERROR
    fn process_response_header_generic(&mut self, header: Header) -> Result<()> {
        // Try to parse the header.
        let mut repeated = false;
        let reps = self.out_tx_mut_ok()?.res_header_repetitions;
        let mut update_reps = false;
        // Do we already have a header with the same name?
        if let Some((_, h_existing)) = self
            .out_tx_mut_ok()?
            .response_headers
            .get_nocase_mut(header.name.as_slice())
        {
            if !h_existing.flags.is_set(HtpFlags::FIELD_REPEATED) {
                // This is the second occurence for this header.
                repeated = true;
            } else if reps < 64 {
                update_reps = true;
            } else {
                return Ok(());
            }
            // For simplicity reasons, we count the repetitions of all headers
            // Keep track of repeated same-name headers.
            h_existing.flags.set(HtpFlags::FIELD_REPEATED);
            // Having multiple C-L headers is against the RFC but
            // servers may ignore the subsequent headers if the values are the same.
            if header.name.cmp_nocase("Content-Length") == Ordering::Equal {
                // Don't use string comparison here because we want to
                // ignore small formatting differences.
                let existing_cl = parse_content_length(&h_existing.value, None);
                let new_cl = parse_content_length(&header.value, None);
                // Ambiguous response C-L value.
                if existing_cl.is_none() || new_cl.is_none() || existing_cl != new_cl {
                    htp_warn!(
                        self,
                        HtpLogCode::DUPLICATE_CONTENT_LENGTH_FIELD_IN_RESPONSE,
                        "Ambiguous response C-L value"
                    );
                }
            } else {
                // Add to the existing header.
                h_existing.value.extend_from_slice(b", ");
                h_existing.value.extend_from_slice(header.value.as_slice());
            }
        } else {
            self.out_tx_mut_ok()?
                .response_headers
                .add(header.name.clone(), header);
        }
        if update_reps {
            self.out_tx_mut_ok()?.res_header_repetitions =
                self.out_tx_mut_ok()?.res_header_repetitions.wrapping_add(1)
        }
        if repeated {
            htp_warn!(
                self,
                HtpLogCode::RESPONSE_HEADER_REPETITION,
                "Repetition for header"
            );
        }
        Ok(())
    }

    /// Generic response header parser.
    pub fn process_response_headers_generic<'a>(
        &mut self,
        data: &'a [u8],
    ) -> Result<(&'a [u8], bool)> {
        let rc = response_headers(data);
        if let Ok((remaining, (headers, eoh))) = rc {
            for h in headers {
                let mut flags = 0;
                let name_flags = h.name.flags;
                // Ignore LWS after field-name.
                if name_flags.is_set(HeaderFlags::NAME_TRAILING_WHITESPACE) {
                    htp_warn_once!(
                        self,
                        HtpLogCode::RESPONSE_INVALID_LWS_AFTER_NAME,
                        "Response field invalid: LWS after name",
                        self.out_tx_mut_ok()?.flags,
                        flags,
                        HtpFlags::FIELD_INVALID
                    );
                }
                // Check that field-name is a token
                if name_flags.is_set(HeaderFlags::NAME_NON_TOKEN_CHARS) {
                    htp_warn_once!(
                        self,
                        HtpLogCode::RESPONSE_LINE_INVALID,
                        "Response header name is not a token",
                        self.out_tx_mut_ok()?.flags,
                        flags,
                        HtpFlags::FIELD_INVALID
                    );
                }
                // No colon?
                if name_flags.is_set(HeaderFlags::MISSING_COLON) {
                    // We handle this case as a header with an empty name, with the value equal
                    // to the entire input string.
                    htp_warn_once!(
                        self,
                        HtpLogCode::RESPONSE_FIELD_MISSING_COLON,
                        "Response field invalid: colon missing",
                        self.out_tx_mut_ok()?.flags,
                        flags,
                        HtpFlags::FIELD_UNPARSEABLE
                    );
                } else if name_flags.is_set(HeaderFlags::NAME_EMPTY) {
                    htp_warn_once!(
                        self,
                        HtpLogCode::RESPONSE_INVALID_EMPTY_NAME,
                        "Response field invalid: empty name",
                        self.out_tx_mut_ok()?.flags,
                        flags,
                        HtpFlags::FIELD_INVALID
                    );
                }
                self.process_response_header_generic(Header::new_with_flags(
                    h.name.name.into(),
                    h.value.value.into(),
                    flags,
                ))?;
            }
            Ok((remaining, eoh))
        } else {
            Ok((data, false))
        }
    }

    /// Parses the response status line, matching the teacher's lenient
    /// behavior: a missing protocol, status code, or reason phrase simply
    /// leaves the corresponding field unset rather than erroring out.
    pub fn parse_response_line_generic(&mut self, response_line: &[u8]) -> Result<()> {
        let line_parser = tuple::<_, _, (_, ErrorKind), _>((
            take_is_space,
            take_while(|c: u8| !is_space(c)),
        ));

        let (remaining, (_, protocol)) = match line_parser(response_line) {
            Ok(r) => r,
            Err(_) => return Ok(()),
        };
        if protocol.is_empty() {
            return Ok(());
        }
        self.out_tx_mut_ok()?.response_protocol = Some(crate::bstr::Bstr::from(protocol));
        self.out_tx_mut_ok()?.response_protocol_number = parse_protocol(protocol, self);

        // take_while never fails, so this unwrap is infallible.
        let (remaining, _) = take_ascii_whitespace()(remaining).unwrap();
        if remaining.is_empty() {
            return Ok(());
        }

        let status_parser = take_while::<_, _, (_, ErrorKind)>(|c: u8| !is_space(c));
        let (remaining, status) = match status_parser(remaining) {
            Ok(r) => r,
            Err(_) => return Ok(()),
        };
        if status.is_empty() {
            return Ok(());
        }
        self.out_tx_mut_ok()?.response_status = Some(crate::bstr::Bstr::from(status));
        self.out_tx_mut_ok()?.response_status_number = parse_status(status);

        // take_while never fails, so this unwrap is infallible.
        let (remaining, _) = take_ascii_whitespace()(remaining).unwrap();
        if remaining.is_empty() {
            return Ok(());
        }

        // Whatever is left on the line is the reason phrase.
        self.out_tx_mut_ok()?.response_message = Some(crate::bstr::Bstr::from(remaining));
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::Config;

    fn connp_with_tx() -> ConnectionParser {
        let mut connp = ConnectionParser::new(Config::default());
        connp.open(None, None, None, None, None);
        let index = connp.create_tx().unwrap();
        connp.set_out_tx_id(Some(index));
        connp
    }

    #[test]
    fn parses_a_well_formed_status_line() {
        let mut connp = connp_with_tx();
        connp
            .parse_response_line_generic(b"HTTP/1.1 200 OK")
            .unwrap();
        let tx = connp.out_tx().unwrap();
        assert_eq!(tx.response_protocol.as_ref().unwrap(), "HTTP/1.1");
        assert!(tx.response_status_number.eq_num(200));
        assert_eq!(tx.response_message.as_ref().unwrap(), "OK");
    }

    #[test]
    fn tolerates_a_missing_reason_phrase() {
        let mut connp = connp_with_tx();
        connp.parse_response_line_generic(b"HTTP/1.1 200").unwrap();
        let tx = connp.out_tx().unwrap();
        assert!(tx.response_status_number.eq_num(200));
        assert!(tx.response_message.is_none());
    }

    #[test]
    fn tolerates_a_protocol_only_line() {
        let mut connp = connp_with_tx();
        connp.parse_response_line_generic(b"HTTP/1.1").unwrap();
        let tx = connp.out_tx().unwrap();
        assert_eq!(tx.response_protocol.as_ref().unwrap(), "HTTP/1.1");
        assert_eq!(
            tx.response_status_number,
            crate::transaction::HtpResponseNumber::UNKNOWN
        );
    }
}
