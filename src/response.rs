use crate::config::StatusStyle;
use crate::error::ResponseError;
use std::fmt;

// CGI line terminator
const CRLF: &str = "\r\n";

const CONTENT_TYPE: &str = "Content-Type";
const CONTENT_LENGTH: &str = "Content-Length";
const CONNECTION: &str = "Connection";
const STATUS: &str = "Status";

/// Pre-framed last resort, used when a response cannot be encoded.
pub const INTERNAL_SERVER_ERROR_RESPONSE: &str = "Status: 500 Internal Server Error\r\n\
    Content-Type: text/plain\r\n\
    Content-Length: 21\r\n\
    Connection: close\r\n\
    \r\n\
    Internal Server Error";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Status {
    code: u16,
    reason: &'static str,
}

impl Status {
    pub const OK: Status = Status {
        code: 200,
        reason: "OK",
    };
    pub const INTERNAL_SERVER_ERROR: Status = Status {
        code: 500,
        reason: "Internal Server Error",
    };
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.code, self.reason)
    }
}

/// A complete response, held in memory until it is encoded in one piece.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    status: Status,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Response {
    pub fn new(status: Status) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets a header, replacing any header of the same name (names compare
    /// case-insensitively), so conflicting duplicates can't be built.
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<(), ResponseError> {
        if !is_token(name) {
            return Err(ResponseError::InvalidHeaderName(name.to_owned()));
        }
        if [STATUS, CONTENT_LENGTH, CONNECTION]
            .iter()
            .any(|r| r.eq_ignore_ascii_case(name))
        {
            return Err(ResponseError::ReservedHeader(name.to_owned()));
        }
        if value.bytes().any(|b| b == b'\r' || b == b'\n' || b == 0) {
            return Err(ResponseError::InvalidHeaderValue(name.to_owned()));
        }
        let value = value.trim().to_owned();
        match self
            .headers
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            Some(header) => header.1 = value,
            None => self.headers.push((name.to_owned(), value)),
        }
        Ok(())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Frames the response: header lines, one blank line, then the body.
    ///
    /// The implicit style only applies to `200 OK`; any other status is always
    /// declared with a leading `Status:` line. Whenever the status line is
    /// written, `Content-Length` and `Connection` follow `Content-Type`.
    pub fn encode(&self, style: StatusStyle) -> Result<Vec<u8>, ResponseError> {
        let content_type = self
            .header(CONTENT_TYPE)
            .ok_or(ResponseError::MissingContentType)?;
        let explicit = style == StatusStyle::Explicit || self.status != Status::OK;

        let mut head = String::new();
        if explicit {
            push_line(&mut head, STATUS, &self.status.to_string());
        }
        push_line(&mut head, CONTENT_TYPE, content_type);
        if explicit {
            push_line(&mut head, CONTENT_LENGTH, &self.body.len().to_string());
            push_line(&mut head, CONNECTION, "close");
        }
        for (name, value) in &self.headers {
            if !name.eq_ignore_ascii_case(CONTENT_TYPE) {
                push_line(&mut head, name, value);
            }
        }
        head.push_str(CRLF);

        let mut out = Vec::with_capacity(head.len() + self.body.len());
        out.extend_from_slice(head.as_bytes());
        out.extend_from_slice(&self.body);
        Ok(out)
    }
}

fn push_line(head: &mut String, name: &str, value: &str) {
    head.push_str(name);
    head.push_str(": ");
    head.push_str(value);
    head.push_str(CRLF);
}

// RFC 7230 token
fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| {
            b.is_ascii_alphanumeric()
                || matches!(
                    b,
                    b'!' | b'#'
                        | b'$'
                        | b'%'
                        | b'&'
                        | b'\''
                        | b'*'
                        | b'+'
                        | b'-'
                        | b'.'
                        | b'^'
                        | b'_'
                        | b'`'
                        | b'|'
                        | b'~'
                )
        })
}
