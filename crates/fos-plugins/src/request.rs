//! Plugin-issued requests
//!
//! Requests a plugin makes through the host's URL calls, and the parsing of
//! the raw POST buffers plugins hand over.

use std::ffi::c_void;
use std::path::PathBuf;

use url::Url;

use crate::error::{NpError, NpResult};

/// HTTP method
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Method {
    #[default]
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

/// A load to hand to the embedder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl ResourceRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::Get,
            url,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post(url: Url) -> Self {
        Self {
            method: Method::Post,
            url,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Script source of a `javascript:` URL, percent-decoded.
    pub fn script_source(&self) -> Option<String> {
        script_source(&self.url)
    }
}

/// Opaque token the plugin gets back with its URL notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotifyData(pub *mut c_void);

impl NotifyData {
    pub fn null() -> Self {
        Self(std::ptr::null_mut())
    }
}

/// One queued plugin request. Consumed exactly once.
#[derive(Debug, Clone)]
pub struct PluginRequest {
    /// Named frame to load into; `None` streams to the plugin
    pub target: Option<String>,
    pub request: ResourceRequest,
    /// Call URL notify when done
    pub send_notification: bool,
    pub notify_data: NotifyData,
    /// Popup permission when the request was made
    pub popups_allowed: bool,
}

/// Source of a `javascript:` URL.
pub fn script_source(url: &Url) -> Option<String> {
    if url.scheme() != "javascript" {
        return None;
    }
    let raw = &url.as_str()["javascript:".len()..];
    Some(percent_decode(raw))
}

/// Decode `%XX` escapes. Malformed escapes are kept as-is.
pub fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Offset just past the first blank line in a header-bearing buffer.
///
/// Recognises `\r\n\r\n`, `\n\n` and the `\n\r\n` some writers emit.
pub fn location_after_first_blank_line(bytes: &[u8]) -> Option<usize> {
    for i in 0..bytes.len() {
        let rest = &bytes[i..];
        if rest.starts_with(b"\r\n\r\n") {
            return Some(i + 4);
        }
        if rest.starts_with(b"\n\n") {
            return Some(i + 2);
        }
        if rest.starts_with(b"\n\r\n") {
            return Some(i + 3);
        }
    }
    None
}

/// Parse a `Name: value` header block. Lines without a colon are ignored.
pub fn parse_header_fields(block: &[u8]) -> Vec<(String, String)> {
    let text = String::from_utf8_lossy(block);
    let mut fields: Vec<(String, String)> = Vec::new();
    for line in text.split('\n') {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        if line.starts_with([' ', '\t']) {
            // Folded continuation of the previous field
            if let Some((_, value)) = fields.last_mut() {
                value.push(' ');
                value.push_str(line.trim());
            }
            continue;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        fields.push((name.to_string(), value.trim().to_string()));
    }
    fields
}

/// A POST body split into plugin-supplied headers and the payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostBody {
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// Split a header-bearing POST buffer.
///
/// A leading lone `\n` means "no headers" and is stripped. Otherwise
/// everything before the first blank line is a header block. A
/// `Content-Length` header is removed and enforced by truncating the body.
pub fn parse_post_buffer(buffer: &[u8]) -> PostBody {
    if buffer.first() == Some(&b'\n') {
        return PostBody {
            headers: Vec::new(),
            body: buffer[1..].to_vec(),
        };
    }

    let Some(location) = location_after_first_blank_line(buffer) else {
        return PostBody {
            headers: Vec::new(),
            body: buffer.to_vec(),
        };
    };

    let mut headers = parse_header_fields(&buffer[..location]);
    let mut body = buffer[location..].to_vec();

    let content_length = headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("Content-Length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok());
    if let Some(length) = content_length {
        body.truncate(length);
    }
    headers.retain(|(name, _)| !name.eq_ignore_ascii_case("Content-Length"));

    PostBody { headers, body }
}

/// Path of a file named in a file POST: a `file:` URL or a plain path.
pub fn post_file_path(spec: &str) -> NpResult<PathBuf> {
    if spec.starts_with("file:") {
        let url = Url::parse(spec).map_err(|_| NpError::FileNotFound)?;
        return url.to_file_path().map_err(|_| NpError::FileNotFound);
    }
    Ok(PathBuf::from(spec))
}

/// Read the body of a file POST.
pub fn read_post_file(spec: &str) -> NpResult<Vec<u8>> {
    let path = post_file_path(spec)?;
    std::fs::read(&path).map_err(|err| {
        tracing::debug!("Cannot read POST file {}: {}", path.display(), err);
        NpError::FileNotFound
    })
}
