//! The transport channel: one file plus metadata out, a raw response body
//! back. The channel validates nothing; interpreting the body is the
//! caller's problem.

use async_trait::async_trait;
use bytes::Bytes;
use hyper::client::HttpConnector;
use hyper::header::CONTENT_TYPE;
use hyper::{Body, Client, Request, Uri};
use serde::{Deserialize, Serialize};

/// Image dimensions reported alongside a stored file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
}

/// The file half of an upload request.
#[derive(Debug, Clone)]
pub struct FilePart {
    /// Form field name; the receiver matches it against the field id
    /// carried in the config part.
    pub name: String,
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
}

/// One multipart upload request: text fields first (the serialized config
/// and any global extra fields), then the file.
#[derive(Debug, Clone)]
pub struct MultipartPayload {
    pub fields: Vec<(String, String)>,
    pub file: FilePart,
}

impl MultipartPayload {
    /// Flatten to a multipart/form-data body with the given boundary.
    pub fn encode(&self, boundary: &str) -> Bytes {
        let mut buf: Vec<u8> = Vec::new();
        for (name, value) in &self.fields {
            buf.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
            buf.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
            );
            buf.extend_from_slice(value.as_bytes());
            buf.extend_from_slice(b"\r\n");
        }
        buf.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        buf.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                self.file.name, self.file.file_name
            )
            .as_bytes(),
        );
        buf.extend_from_slice(format!("Content-Type: {}\r\n\r\n", self.file.content_type).as_bytes());
        buf.extend_from_slice(&self.file.data);
        buf.extend_from_slice(b"\r\n");
        buf.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
        Bytes::from(buf)
    }
}

pub fn random_boundary() -> String {
    let n: u128 = rand::random();
    format!("----pack-upload-{n:032x}")
}

fn is_unreserved(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~')
}

/// Percent-encode a query component.
pub fn url_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for &b in s.as_bytes() {
        if is_unreserved(b) {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

/// Decode a percent-encoded query component; `+` becomes a space, malformed
/// escapes pass through untouched.
pub fn url_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' => {
                let hex = bytes.get(i + 1..i + 3).and_then(|h| {
                    std::str::from_utf8(h)
                        .ok()
                        .and_then(|h| u8::from_str_radix(h, 16).ok())
                });
                match hex {
                    Some(v) => {
                        out.push(v);
                        i += 3;
                    }
                    None => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Split a raw query string into decoded key/value pairs.
pub fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|p| !p.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (url_decode(k), url_decode(v)),
            None => (url_decode(pair), String::new()),
        })
        .collect()
}

/// Out-of-band request/response channel for uploads and delete
/// notifications. Completion is a future, not a page-load event.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Post one upload and hand back the raw response body. Network failure
    /// yields an empty body; the response parser treats that like any other
    /// malformed payload.
    async fn send(&self, endpoint: &str, payload: MultipartPayload) -> String;

    /// Fire-and-forget deletion notification; the response is ignored.
    fn notify_delete(&self, url: &str);
}

/// `Transport` over a plain hyper client.
pub struct HttpTransport {
    client: Client<HttpConnector>,
}

impl HttpTransport {
    pub fn new() -> Self {
        HttpTransport { client: Client::new() }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, endpoint: &str, payload: MultipartPayload) -> String {
        let boundary = random_boundary();
        let body = payload.encode(&boundary);
        let req = Request::post(endpoint)
            .header(
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body));
        let req = match req {
            Ok(req) => req,
            Err(e) => {
                log::warn!("upload request build failed: {e}");
                return String::new();
            }
        };
        match self.client.request(req).await {
            Ok(resp) => match hyper::body::to_bytes(resp.into_body()).await {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(e) => {
                    log::warn!("upload response read failed: {e}");
                    String::new()
                }
            },
            Err(e) => {
                log::warn!("upload request failed: {e}");
                String::new()
            }
        }
    }

    fn notify_delete(&self, url: &str) {
        let uri: Uri = match url.parse() {
            Ok(uri) => uri,
            Err(e) => {
                log::warn!("delete notification url {url:?} is invalid: {e}");
                return;
            }
        };
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                log::warn!("delete notification for {url:?} dropped: no async runtime");
                return;
            }
        };
        let client = self.client.clone();
        handle.spawn(async move {
            if let Err(e) = client.get(uri).await {
                log::debug!("delete notification failed: {e}");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> MultipartPayload {
        MultipartPayload {
            fields: vec![
                ("config".to_string(), r#"{"field":"file1"}"#.to_string()),
                ("sid".to_string(), "abc".to_string()),
            ],
            file: FilePart {
                name: "file1".to_string(),
                file_name: "pic.png".to_string(),
                content_type: "image/png".to_string(),
                data: Bytes::from_static(b"\x89PNG"),
            },
        }
    }

    #[test]
    fn encode_emits_every_part_and_the_terminator() {
        let body = payload().encode("XBOUND");
        let text = String::from_utf8_lossy(&body);
        assert!(text.contains("--XBOUND\r\nContent-Disposition: form-data; name=\"config\""));
        assert!(text.contains(r#"{"field":"file1"}"#));
        assert!(text.contains("name=\"sid\""));
        assert!(text.contains("name=\"file1\"; filename=\"pic.png\""));
        assert!(text.contains("Content-Type: image/png"));
        assert!(text.ends_with("--XBOUND--\r\n"));
    }

    #[test]
    fn boundaries_are_fresh() {
        assert_ne!(random_boundary(), random_boundary());
    }

    #[test]
    fn encode_decode_query_component() {
        assert_eq!(url_encode("/upload/a b.png"), "%2Fupload%2Fa%20b.png");
        assert_eq!(url_decode("%2Fupload%2Fa%20b.png"), "/upload/a b.png");
        assert_eq!(url_decode("a+b"), "a b");
        assert_eq!(url_decode("100%"), "100%");
    }

    #[test]
    fn parse_query_pairs() {
        let q = parse_query("file=%2Fupload%2Fx.png&ajax=//&flag");
        assert_eq!(q[0], ("file".to_string(), "/upload/x.png".to_string()));
        assert_eq!(q[1], ("ajax".to_string(), "//".to_string()));
        assert_eq!(q[2], ("flag".to_string(), String::new()));
    }

    // Best-effort by contract: with no runtime to spawn on, the
    // notification is logged and dropped, never a panic.
    #[test]
    fn delete_notification_without_a_runtime_is_dropped() {
        let transport = HttpTransport::new();
        transport.notify_delete("http://localhost:1/upload/remove?file=x.png&ajax=//");
        transport.notify_delete("not a uri");
    }
}
