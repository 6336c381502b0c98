//! Inspection of the collector's answer. Head and chunk-size parsing is done
//! by `httparse`; this module only decides when the answer is over and
//! whether it accepted the reading.

use std::borrow::Cow;

use httparse::Status;
use serde_json::Value;

/// Literal the server puts in its JSON answer when the reading was stored.
pub const SUCCESS_MARKER: &[u8] = br#""success":true"#;

/// Responses are inspected up to this size, the rest is left unread.
pub const MAX_RESPONSE_LEN: usize = 4096;

const MAX_HEADERS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Head {
    status: Option<u16>,
    body_start: usize,
    content_length: Option<usize>,
    chunked: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeadState {
    Partial,
    Invalid,
    Parsed(Head),
}

enum Chunks {
    Done(Vec<u8>),
    Pending,
    Malformed,
}

pub struct HttpResponse<'a> {
    raw: &'a [u8],
    head: HeadState,
}

impl<'a> HttpResponse<'a> {
    pub fn new(raw: &'a [u8]) -> Self {
        Self {
            raw,
            head: parse_head(raw),
        }
    }

    fn parsed(&self) -> Option<&Head> {
        match &self.head {
            HeadState::Parsed(head) => Some(head),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        self.parsed()?.status
    }

    pub fn content_length(&self) -> Option<usize> {
        self.parsed()?.content_length
    }

    pub fn is_chunked(&self) -> bool {
        self.parsed().map(|head| head.chunked).unwrap_or(false)
    }

    /// True when waiting longer cannot change the verdict: the framing says
    /// no more bytes follow, or what arrived is not HTTP at all. A response
    /// framed by connection close is never complete here; the caller sees
    /// the EOF.
    pub fn is_complete(&self) -> bool {
        let head = match &self.head {
            HeadState::Partial => return false,
            HeadState::Invalid => return true,
            HeadState::Parsed(head) => head,
        };
        let body = &self.raw[head.body_start..];

        if head.chunked {
            return !matches!(dechunk(body), Chunks::Pending);
        }

        match head.content_length {
            Some(len) => body.len() >= len,
            None => false,
        }
    }

    /// The body once its framing is satisfied (or, for a close-delimited
    /// response, whatever arrived). `None` for a partial or broken chunked
    /// body.
    pub fn body(&self) -> Option<Cow<'a, [u8]>> {
        let head = self.parsed()?;
        let body = &self.raw[head.body_start..];

        if head.chunked {
            return match dechunk(body) {
                Chunks::Done(decoded) => Some(Cow::Owned(decoded)),
                Chunks::Pending | Chunks::Malformed => None,
            };
        }

        match head.content_length {
            Some(len) => Some(Cow::Borrowed(&body[..len.min(body.len())])),
            None => Some(Cow::Borrowed(body)),
        }
    }

    /// The server accepted the reading: either the success marker appears
    /// anywhere in what was received, or the body is a JSON object whose
    /// `success` member is `true`.
    pub fn is_success(&self) -> bool {
        find(self.raw, SUCCESS_MARKER).is_some()
            || self.body().map(|body| json_success(&body)).unwrap_or(false)
    }
}

/// Same verdict as [`HttpResponse::is_success`] for a body whose framing was
/// already removed by an HTTP client.
pub fn is_success_body(body: &[u8]) -> bool {
    find(body, SUCCESS_MARKER).is_some() || json_success(body)
}

fn json_success(body: &[u8]) -> bool {
    serde_json::from_slice::<Value>(body)
        .map(|json| json.get("success") == Some(&Value::Bool(true)))
        .unwrap_or(false)
}

fn parse_head(raw: &[u8]) -> HeadState {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut response = httparse::Response::new(&mut headers);

    let body_start = match response.parse(raw) {
        Ok(Status::Complete(len)) => len,
        Ok(Status::Partial) => return HeadState::Partial,
        Err(_) => return HeadState::Invalid,
    };

    let value = |name: &str| {
        response
            .headers
            .iter()
            .find(|header| header.name.eq_ignore_ascii_case(name))
            .and_then(|header| std::str::from_utf8(header.value).ok())
            .map(str::trim)
    };

    HeadState::Parsed(Head {
        status: response.code,
        body_start,
        content_length: value("Content-Length").and_then(|v| v.parse().ok()),
        chunked: value("Transfer-Encoding")
            .map(|v| v.to_ascii_lowercase().contains("chunked"))
            .unwrap_or(false),
    })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Joins the chunks of a chunked body. A chunk that could never fit in the
/// response buffer is malformed.
fn dechunk(mut data: &[u8]) -> Chunks {
    let mut body = Vec::new();

    loop {
        let (consumed, size) = match httparse::parse_chunk_size(data) {
            Ok(Status::Complete(parsed)) => parsed,
            Ok(Status::Partial) => return Chunks::Pending,
            Err(_) => return Chunks::Malformed,
        };
        data = &data[consumed..];

        if size == 0 {
            return Chunks::Done(body);
        }

        let Some(size) = usize::try_from(size)
            .ok()
            .filter(|&size| size <= MAX_RESPONSE_LEN)
        else {
            return Chunks::Malformed;
        };

        if data.len() < size + 2 {
            return Chunks::Pending;
        }

        if &data[size..size + 2] != b"\r\n" {
            return Chunks::Malformed;
        }

        body.extend_from_slice(&data[..size]);
        data = &data[size + 2..];
    }
}
