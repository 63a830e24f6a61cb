//! Client request parsing.

use super::error::{HttpError, HttpResult};
use bytes::Bytes;
use http::{Method, Uri, Version};
use std::collections::HashMap;
use std::str::FromStr;

/// Maximum number of headers to parse.
const MAX_HEADERS: usize = 100;

/// Parsed client request, as handed to the dispatcher.
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP method.
    method: Method,
    /// Request URI (origin form).
    uri: Uri,
    /// HTTP version.
    version: Version,
    /// Request headers, names lowercased.
    headers: HashMap<String, String>,
    /// Request body.
    body: Bytes,
}

impl Request {
    /// Create a new request builder.
    #[must_use]
    pub fn builder() -> RequestBuilder {
        RequestBuilder::new()
    }

    /// Get the HTTP method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Get the request URI.
    #[must_use]
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Get the request path.
    #[must_use]
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Get the path plus query string, as it is sent upstream.
    #[must_use]
    pub fn path_and_query(&self) -> &str {
        self.uri
            .path_and_query()
            .map_or("/", http::uri::PathAndQuery::as_str)
    }

    /// Get the HTTP version.
    #[must_use]
    pub fn version(&self) -> Version {
        self.version
    }

    /// Get a header value.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    /// Get all headers.
    #[must_use]
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Get the Content-Length header as usize.
    #[must_use]
    pub fn content_length(&self) -> Option<usize> {
        self.header("content-length").and_then(|s| s.parse().ok())
    }

    /// Get the request body.
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Set a header value.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers
            .insert(name.into().to_lowercase(), value.into());
    }

    /// Attach the body read after the header block.
    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        self.body = body.into();
    }

    /// Check if the connection should be kept alive after this request.
    #[must_use]
    pub fn is_keep_alive(&self) -> bool {
        match self.version {
            Version::HTTP_11 => self
                .header("connection")
                .map(|v| !v.eq_ignore_ascii_case("close"))
                .unwrap_or(true),
            Version::HTTP_10 => self
                .header("connection")
                .map(|v| v.eq_ignore_ascii_case("keep-alive"))
                .unwrap_or(false),
            _ => false,
        }
    }

    /// Parse a request head from bytes.
    ///
    /// Returns the request (body still empty) and the offset at which the
    /// body starts, or [`HttpError::Parse`] when the head is incomplete.
    pub fn parse(data: &[u8]) -> HttpResult<(Self, usize)> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut req = httparse::Request::new(&mut headers);

        match req.parse(data)? {
            httparse::Status::Complete(body_offset) => {
                let method = Method::from_str(req.method.unwrap_or("GET"))
                    .map_err(|e| HttpError::InvalidMethod(e.to_string()))?;

                let uri = Uri::from_str(req.path.unwrap_or("/"))
                    .map_err(|e| HttpError::InvalidUri(e.to_string()))?;

                let version = match req.version {
                    Some(0) => Version::HTTP_10,
                    _ => Version::HTTP_11,
                };

                let mut headers_map = HashMap::new();
                for header in req.headers.iter() {
                    let name = header.name.to_lowercase();
                    let value = String::from_utf8_lossy(header.value).to_string();
                    headers_map.insert(name, value);
                }

                let request = Request {
                    method,
                    uri,
                    version,
                    headers: headers_map,
                    body: Bytes::new(),
                };

                Ok((request, body_offset))
            },
            httparse::Status::Partial => Err(HttpError::Parse("Incomplete request".to_string())),
        }
    }
}

/// Builder for requests, mostly used by tests.
#[derive(Debug, Default)]
pub struct RequestBuilder {
    method: Option<Method>,
    uri: Option<Uri>,
    version: Option<Version>,
    headers: HashMap<String, String>,
    body: Bytes,
}

impl RequestBuilder {
    /// Create a new request builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the HTTP method.
    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Set the request URI.
    pub fn uri(mut self, uri: impl Into<String>) -> HttpResult<Self> {
        self.uri = Some(Uri::from_str(&uri.into())?);
        Ok(self)
    }

    /// Add a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_lowercase(), value.into());
        self
    }

    /// Set the request body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Build the request.
    pub fn build(self) -> HttpResult<Request> {
        Ok(Request {
            method: self.method.unwrap_or(Method::GET),
            uri: self.uri.unwrap_or_else(|| Uri::from_static("/")),
            version: self.version.unwrap_or(Version::HTTP_11),
            headers: self.headers,
            body: self.body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_request() {
        let data = b"GET /index.html HTTP/1.1\r\nHost: example.com\r\n\r\n";
        let (req, offset) = Request::parse(data).unwrap();

        assert_eq!(req.method(), Method::GET);
        assert_eq!(req.path(), "/index.html");
        assert_eq!(req.version(), Version::HTTP_11);
        assert_eq!(req.header("host"), Some("example.com"));
        assert_eq!(offset, data.len());
    }

    #[test]
    fn test_parse_partial_request() {
        let data = b"GET /index.html HTTP/1.1\r\nHost: exa";
        assert!(matches!(
            Request::parse(data),
            Err(HttpError::Parse(_))
        ));
    }

    #[test]
    fn test_path_and_query() {
        let data = b"GET /search?q=abc&page=2 HTTP/1.1\r\nHost: example.com\r\n\r\n";
        let (req, _) = Request::parse(data).unwrap();
        assert_eq!(req.path(), "/search");
        assert_eq!(req.path_and_query(), "/search?q=abc&page=2");
    }

    #[test]
    fn test_parse_post_with_content_length() {
        let data =
            b"POST /api HTTP/1.1\r\nHost: example.com\r\nContent-Length: 4\r\n\r\nbody";
        let (mut req, offset) = Request::parse(data).unwrap();

        assert_eq!(req.method(), Method::POST);
        assert_eq!(req.content_length(), Some(4));
        assert_eq!(offset, data.len() - 4);

        req.set_body(&data[offset..]);
        assert_eq!(&req.body()[..], b"body");
    }

    #[test]
    fn test_keep_alive() {
        let data = b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n";
        let (req, _) = Request::parse(data).unwrap();
        assert!(req.is_keep_alive());

        let data = b"GET / HTTP/1.1\r\nHost: example.com\r\nConnection: close\r\n\r\n";
        let (req, _) = Request::parse(data).unwrap();
        assert!(!req.is_keep_alive());

        let data = b"GET / HTTP/1.0\r\nHost: example.com\r\n\r\n";
        let (req, _) = Request::parse(data).unwrap();
        assert!(!req.is_keep_alive());
    }

    #[test]
    fn test_request_builder() {
        let req = Request::builder()
            .method(Method::PUT)
            .uri("/items/7?v=1")
            .unwrap()
            .header("Content-Type", "application/json")
            .body(&br#"{"name":"x"}"#[..])
            .build()
            .unwrap();

        assert_eq!(req.method(), Method::PUT);
        assert_eq!(req.path_and_query(), "/items/7?v=1");
        assert_eq!(req.header("content-type"), Some("application/json"));
        assert!(!req.body().is_empty());
    }

    #[test]
    fn test_set_header_lowercases() {
        let (mut req, _) = Request::parse(b"GET / HTTP/1.1\r\n\r\n").unwrap();
        req.set_header("X-Forwarded-For", "192.0.2.7");
        assert_eq!(req.header("x-forwarded-for"), Some("192.0.2.7"));
    }
}
