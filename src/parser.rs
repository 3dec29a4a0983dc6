// Turns TCP payloads into HTTP request/response events.
//
// The correlator only sees `HttpEvent`s, so the classifier can be swapped
// without touching correlation or aggregation.

use std::net::SocketAddr;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::sniff::TcpSegment;

#[derive(Debug, Clone, PartialEq)]
pub struct RequestEvent {
    pub source: SocketAddr,
    pub destination: SocketAddr,
    pub timestamp: DateTime<Utc>,
    pub request_line: String,
    pub header_lines: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResponseEvent {
    pub source: SocketAddr,
    pub destination: SocketAddr,
    pub timestamp: DateTime<Utc>,
    pub status_line: String,
    pub is_success: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HttpEvent {
    Request(RequestEvent),
    Response(ResponseEvent),
}

impl HttpEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            HttpEvent::Request(req) => req.timestamp,
            HttpEvent::Response(resp) => resp.timestamp,
        }
    }
}

pub trait Classifier: Send + Sync {
    fn classify(&self, segment: &TcpSegment) -> Option<HttpEvent>;
}

/// String-prefix classification: `GET ` + `HTTP/` is a request, `HTTP/` +
/// `200 OK` is a response. Any other status line is not an event at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrefixClassifier;

impl Classifier for PrefixClassifier {
    fn classify(&self, segment: &TcpSegment) -> Option<HttpEvent> {
        let text = String::from_utf8_lossy(&segment.payload);

        if text.starts_with("GET ") && text.contains("HTTP/") {
            let mut lines = text.split("\r\n");
            let request_line = lines.next().unwrap_or_default().to_string();
            Some(HttpEvent::Request(RequestEvent {
                source: segment.src,
                destination: segment.dst,
                timestamp: segment.timestamp,
                request_line,
                header_lines: lines.map(str::to_string).collect(),
            }))
        } else if text.starts_with("HTTP/") && text.contains("200 OK") {
            let status_line = text.split("\r\n").next().unwrap_or_default().to_string();
            Some(HttpEvent::Response(ResponseEvent {
                source: segment.src,
                destination: segment.dst,
                timestamp: segment.timestamp,
                status_line,
                is_success: true,
            }))
        } else {
            None
        }
    }
}

const MAX_HEADERS: usize = 64;

/// Header parsing with `httparse`. Every response with a parseable status
/// becomes an event; only 2xx counts as success.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttparseClassifier;

impl HttparseClassifier {
    fn request(&self, segment: &TcpSegment) -> Option<HttpEvent> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut req = httparse::Request::new(&mut headers);
        match req.parse(&segment.payload) {
            Ok(httparse::Status::Complete(_)) => {}
            _ => return None,
        }
        if req.method != Some("GET") {
            return None;
        }

        let path = req.path?;
        let version = req.version.unwrap_or(1);
        let header_lines = req
            .headers
            .iter()
            .filter_map(|h| {
                let value = std::str::from_utf8(h.value).ok()?;
                Some(format!("{}: {}", canonical_header(h.name), value))
            })
            .collect();

        Some(HttpEvent::Request(RequestEvent {
            source: segment.src,
            destination: segment.dst,
            timestamp: segment.timestamp,
            request_line: format!("GET {path} HTTP/1.{version}"),
            header_lines,
        }))
    }

    fn response(&self, segment: &TcpSegment) -> Option<HttpEvent> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut resp = httparse::Response::new(&mut headers);
        // The status line is all we need; a truncated header block is fine.
        match resp.parse(&segment.payload) {
            Ok(_) => {}
            Err(_) => return None,
        }
        let code = resp.code?;
        let version = resp.version.unwrap_or(1);
        let reason = resp.reason.unwrap_or_default();

        Some(HttpEvent::Response(ResponseEvent {
            source: segment.src,
            destination: segment.dst,
            timestamp: segment.timestamp,
            status_line: format!("HTTP/1.{version} {code} {reason}"),
            is_success: (200..300).contains(&code),
        }))
    }
}

impl Classifier for HttparseClassifier {
    fn classify(&self, segment: &TcpSegment) -> Option<HttpEvent> {
        if segment.payload.starts_with(b"HTTP/") {
            self.response(segment)
        } else {
            self.request(segment)
        }
    }
}

fn canonical_header(name: &str) -> &str {
    if name.eq_ignore_ascii_case("host") {
        "Host"
    } else {
        name
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClassifierKind {
    #[default]
    Prefix,
    Httparse,
}

impl ClassifierKind {
    pub fn build(self) -> Box<dyn Classifier> {
        match self {
            ClassifierKind::Prefix => Box::new(PrefixClassifier),
            ClassifierKind::Httparse => Box::new(HttparseClassifier),
        }
    }
}

impl FromStr for ClassifierKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "prefix" => Ok(ClassifierKind::Prefix),
            "httparse" => Ok(ClassifierKind::Httparse),
            other => Err(format!("unknown classifier '{other}' (expected prefix or httparse)")),
        }
    }
}

/// Builds `http://<host><path>` from a request line and its header lines.
///
/// Returns `None` when the request line has no path or there is no
/// non-empty `Host: ` header.
pub fn extract_url(request_line: &str, header_lines: &[String]) -> Option<String> {
    let path = request_line.split(' ').nth(1).filter(|p| !p.is_empty())?;
    let host = header_lines
        .iter()
        .find_map(|line| line.strip_prefix("Host: "))
        .map(str::trim)
        .filter(|h| !h.is_empty())?;

    if path.starts_with('/') {
        Some(format!("http://{host}{path}"))
    } else {
        Some(format!("http://{host}/{path}"))
    }
}
