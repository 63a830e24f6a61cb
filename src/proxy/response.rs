//! Client response building and serialization.

use super::error::{HttpError, HttpResult};
use bytes::{Bytes, BytesMut};
use http::{StatusCode, Version};
use std::collections::HashMap;

/// Maximum number of headers to parse.
const MAX_HEADERS: usize = 100;

/// Response written back to the client, either passed through from an
/// upstream or synthesized by the proxy.
#[derive(Debug, Clone)]
pub struct Response {
    /// HTTP status code.
    status: StatusCode,
    /// HTTP version.
    version: Version,
    /// Response headers, names lowercased.
    headers: HashMap<String, String>,
    /// Response body.
    body: Bytes,
}

impl Response {
    /// Create a new response builder.
    #[must_use]
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder::new()
    }

    /// Create an OK (200) response.
    #[must_use]
    pub fn ok() -> ResponseBuilder {
        ResponseBuilder::new().status(StatusCode::OK)
    }

    /// Create a Bad Request (400) response.
    #[must_use]
    pub fn bad_request() -> ResponseBuilder {
        ResponseBuilder::new().status(StatusCode::BAD_REQUEST)
    }

    /// Create a Service Unavailable (503) response.
    #[must_use]
    pub fn service_unavailable() -> ResponseBuilder {
        ResponseBuilder::new().status(StatusCode::SERVICE_UNAVAILABLE)
    }

    /// Get the status code.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Get a header value.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    /// Get the response body.
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Serialize the response to wire bytes.
    ///
    /// A Content-Length header is always emitted so keep-alive clients can
    /// frame the body.
    #[must_use]
    pub fn serialize(&self) -> BytesMut {
        let mut buf = BytesMut::new();

        let version_str = match self.version {
            Version::HTTP_10 => "HTTP/1.0",
            _ => "HTTP/1.1",
        };
        buf.extend_from_slice(
            format!(
                "{} {} {}\r\n",
                version_str,
                self.status.as_u16(),
                self.status.canonical_reason().unwrap_or("")
            )
            .as_bytes(),
        );

        for (name, value) in &self.headers {
            buf.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
        }

        if !self.headers.contains_key("content-length") {
            buf.extend_from_slice(format!("Content-Length: {}\r\n", self.body.len()).as_bytes());
        }

        buf.extend_from_slice(b"\r\n");
        buf.extend_from_slice(&self.body);

        buf
    }

    /// Parse a response from bytes, filling the body up to Content-Length.
    pub fn parse(data: &[u8]) -> HttpResult<(Self, usize)> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut resp = httparse::Response::new(&mut headers);

        match resp.parse(data)? {
            httparse::Status::Complete(body_offset) => {
                let status =
                    StatusCode::from_u16(resp.code.unwrap_or(200)).unwrap_or(StatusCode::OK);

                let version = match resp.version {
                    Some(0) => Version::HTTP_10,
                    _ => Version::HTTP_11,
                };

                let mut headers_map = HashMap::new();
                for header in resp.headers.iter() {
                    let name = header.name.to_lowercase();
                    let value = String::from_utf8_lossy(header.value).to_string();
                    headers_map.insert(name, value);
                }

                let declared = headers_map
                    .get("content-length")
                    .and_then(|s| s.parse::<usize>().ok())
                    .unwrap_or(data.len() - body_offset);
                let available = data.len() - body_offset;
                let body =
                    Bytes::copy_from_slice(&data[body_offset..body_offset + declared.min(available)]);

                let response = Response {
                    status,
                    version,
                    headers: headers_map,
                    body,
                };

                Ok((response, body_offset))
            },
            httparse::Status::Partial => {
                Err(HttpError::Parse("Incomplete response".to_string()))
            },
        }
    }
}

/// Builder for responses.
#[derive(Debug)]
pub struct ResponseBuilder {
    status: StatusCode,
    version: Version,
    headers: HashMap<String, String>,
    body: Bytes,
}

impl ResponseBuilder {
    /// Create a new response builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            version: Version::HTTP_11,
            headers: HashMap::new(),
            body: Bytes::new(),
        }
    }

    /// Set the status code.
    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Add a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_lowercase(), value.into());
        self
    }

    /// Set the response body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Set a text body with Content-Type: text/plain.
    pub fn text(self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.header("content-type", "text/plain; charset=utf-8")
            .body(Bytes::from(text))
    }

    /// Build the response.
    #[must_use]
    pub fn build(self) -> Response {
        Response {
            status: self.status,
            version: self.version,
            headers: self.headers,
            body: self.body,
        }
    }
}

impl Default for ResponseBuilder {
    fn default() -> Self {
        Self::new()
    }
}
