//! The DMS XML sign protocol: XML documents exchanged with a sign server over a stream.
//!
//! A request wraps one or more request elements in a `DmsXml` root. The server answers with
//! one or more `DmsXml` documents: zero or more `InterStatus` progress notes followed by the
//! response element for each request. Documents arrive in arbitrary pieces and are
//! reassembled with a [`TokenReader`].
//!
//! # Examples
//!
//! ```
//! use roadlink_core::dmsxml::{XmlElem, XmlElems, ROOT_TAG};
//!
//! let mut reset = XmlElem::new("ResetDMSReqMsg", "ResetDMSRespMsg");
//! reset.add_req("Address", 5);
//! let mut elems = XmlElems::new();
//! elems.add(reset);
//! assert_eq!(
//!     "<DmsXml><ResetDMSReqMsg><Address>5</Address></ResetDMSReqMsg></DmsXml>",
//!     elems.build_request(ROOT_TAG)
//! );
//! ```
use std::time::{Duration, Instant};

use log::{debug, info};

use crate::errors::CommError;
use crate::transport::Transport;

mod elem;
mod token_reader;
mod xml;

pub use self::elem::{format_date, XmlElem, XmlElems};
pub use self::token_reader::TokenReader;
pub use self::xml::{escape_value, parse_children, push_tag, sanitize_name, second_tag_name};

pub(crate) const LOG_TARGET: &str = "roadlink::dmsxml";

/// Root element of every document.
pub const ROOT_TAG: &str = "DmsXml";

/// Element carrying intermediate status notes.
pub const INTER_STATUS_TAG: &str = "InterStatus";

/// Time allowed for a complete response when the link doesn't specify one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Width of a bitmap page in pixels.
pub const BITMAP_WIDTH: usize = 96;

/// Height of a bitmap page in pixels.
pub const BITMAP_HEIGHT: usize = 25;

/// Length of one bitmap page in bytes.
pub const BITMAP_PAGE_LEN: usize = BITMAP_WIDTH * BITMAP_HEIGHT / 8;

/// Error text used when a sign reports failure without saying why.
pub const FAILURE_UNKNOWN: &str = "Failure, unknown reason";

/// Outcome of a completed [`exchange`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Completion {
    /// Time from sending the request to reading the last response element.
    pub elapsed: Duration,

    /// Intermediate status notes received along the way, oldest first.
    pub inter_status: Vec<String>,
}

/// Sends the request built from `elems` and reads documents until every response element
/// has been read.
///
/// Buffered input is discarded before sending.
///
/// # Errors
///
/// Returns [`CommError::Timeout`] if the responses don't all arrive within `timeout`,
/// [`CommError::Parsing`] if a document is malformed, or [`CommError::Buffer`] if a
/// document is too large.
pub fn exchange<T: Transport + ?Sized>(
    transport: &mut T,
    reader: &mut TokenReader,
    elems: &mut XmlElems,
    timeout: Duration,
) -> Result<Completion, CommError> {
    let request = elems.build_request(ROOT_TAG);
    debug!(target: LOG_TARGET, "Writing {} bytes: {}", request.len(), request);
    reader.reset();
    transport.write_all(request.as_bytes())?;

    let start = Instant::now();
    let open = format!("<{}>", ROOT_TAG);
    let close = format!("</{}>", ROOT_TAG);
    let mut inter_status = Vec::new();
    while !elems.is_read_done() {
        let left = timeout.saturating_sub(start.elapsed());
        let token = match reader.read_token(transport, left, &open, &close)? {
            Some(token) => token,
            None => return Err(CommError::Timeout { elapsed: start.elapsed() }),
        };
        debug!(target: LOG_TARGET, "Found complete token: {}", token);
        elems.parse_response(ROOT_TAG, INTER_STATUS_TAG, &token)?;
        for status in elems.take_inter_status() {
            info!(target: LOG_TARGET, "Intermediate status: {}", status);
            inter_status.push(status);
        }
    }
    let elapsed = start.elapsed();
    debug!(target: LOG_TARGET, "Response received in {} ms", elapsed.as_millis());
    Ok(Completion { elapsed, inter_status })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io;

    #[derive(Debug, Default)]
    struct Server {
        written: Vec<u8>,
        replies: VecDeque<Vec<u8>>,
    }

    impl Transport for Server {
        fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
            self.written.extend_from_slice(bytes);
            Ok(())
        }

        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.replies.pop_front() {
                Some(reply) => {
                    let n = reply.len().min(buf.len());
                    buf[..n].copy_from_slice(&reply[..n]);
                    if n < reply.len() {
                        self.replies.push_front(reply[n..].to_vec());
                    }
                    Ok(n)
                }
                None => Err(io::Error::new(io::ErrorKind::WouldBlock, "empty")),
            }
        }

        fn timeout(&self) -> Duration {
            Duration::from_millis(10)
        }
    }

    fn blank_elems() -> XmlElems {
        let mut elem = XmlElem::new("SetBlankMsgReqMsg", "SetBlankMsgRespMsg");
        elem.add_req("Address", 2);
        elem.add_res("IsValid");
        let mut elems = XmlElems::new();
        elems.add(elem);
        elems
    }

    fn reader() -> TokenReader {
        TokenReader::with_sizes(64, 4096, Duration::from_millis(1)).unwrap()
    }

    #[test]
    fn status_then_response() {
        let mut server = Server::default();
        server
            .replies
            .push_back(b"<DmsXml><InterStatus><Id>1</Id><Msg>Connecting</Msg></InterStatus></DmsXml>".to_vec());
        server
            .replies
            .push_back(b"<DmsXml><SetBlankMsgRespMsg><IsValid>true</IsValid>".to_vec());
        server.replies.push_back(b"</SetBlankMsgRespMsg></DmsXml>".to_vec());

        let mut elems = blank_elems();
        let completion = exchange(&mut server, &mut reader(), &mut elems, Duration::from_secs(1)).unwrap();
        assert!(elems.get("SetBlankMsgRespMsg").unwrap().res_bool("IsValid").unwrap());
        assert_eq!(vec!["Connecting".to_string()], completion.inter_status);
        assert!(server.written.starts_with(b"<DmsXml><SetBlankMsgReqMsg>"));
    }

    #[test]
    fn silence_times_out() {
        let mut server = Server::default();
        let mut elems = blank_elems();
        let error = exchange(&mut server, &mut reader(), &mut elems, Duration::from_millis(20)).unwrap_err();
        assert!(matches!(error, CommError::Timeout { .. }));
    }

    #[test]
    fn malformed_response_is_parse_error() {
        let mut server = Server::default();
        server
            .replies
            .push_back(b"<DmsXml><SetBlankMsgRespMsg><IsValid>a & b</IsValid></SetBlankMsgRespMsg></DmsXml>".to_vec());
        let mut elems = blank_elems();
        let error = exchange(&mut server, &mut reader(), &mut elems, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(error, CommError::Parsing { .. }));
    }
}
