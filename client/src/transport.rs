use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;

use crate::descriptor::{FormPart, RequestBody};

/// Substrings of transport errors that point at a protocol-level fault.
const PROTOCOL_MARKERS: [&str; 7] = [
    "protocol error",
    "protocol_error",
    "http2 error",
    "h2 error",
    "goaway",
    "frame with invalid size",
    "invalid http version",
];

/// Substrings of transport errors that point at a response cut off mid-stream.
const CUTOFF_MARKERS: [&str; 11] = [
    "incomplete",
    "unexpected eof",
    "unexpected end of file",
    "connection closed before message completed",
    "connection reset",
    "broken pipe",
    "error decoding response body",
    "error reading a body",
    "end of stream",
    "truncated",
    "message closed",
];

/// What the executor hands to the transport.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
}

impl TransportRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Untyped transport failure; only its message is available for classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for TransportError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFault {
    Protocol,
    Cutoff,
    Other,
}

/// Heuristic: the transport gives us text, not a typed error.
pub fn classify_transport_error(message: &str) -> TransportFault {
    let lower = message.to_ascii_lowercase();
    if PROTOCOL_MARKERS.iter().any(|m| lower.contains(m)) {
        TransportFault::Protocol
    } else if CUTOFF_MARKERS.iter().any(|m| lower.contains(m)) {
        TransportFault::Cutoff
    } else {
        TransportFault::Other
    }
}

#[async_trait]
pub trait TransportResponse: Send {
    fn status(&self) -> u16;

    /// Read the whole body. Fails when the stream breaks mid-way.
    async fn text(self) -> Result<String, TransportError>;
}

/// The network seam of the executor.
#[async_trait]
pub trait Transport: Send + Sync {
    type Response: TransportResponse;

    async fn send(&self, request: TransportRequest) -> Result<Self::Response, TransportError>;
}

/// Production transport on top of `reqwest`.
#[derive(Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::new(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { http })
    }

    pub fn from_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    type Response = ReqwestResponse;

    async fn send(&self, request: TransportRequest) -> Result<ReqwestResponse, TransportError> {
        let mut builder = self.http.request(request.method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Bytes(bytes) => builder.body(bytes),
            RequestBody::Multipart(parts) => builder.multipart(multipart_form(parts)?),
        };

        let response = builder.send().await.map_err(|e| describe(&e))?;
        Ok(ReqwestResponse { inner: response })
    }
}

pub struct ReqwestResponse {
    inner: reqwest::Response,
}

#[async_trait]
impl TransportResponse for ReqwestResponse {
    fn status(&self) -> u16 {
        self.inner.status().as_u16()
    }

    async fn text(self) -> Result<String, TransportError> {
        let bytes = self.inner.bytes().await.map_err(|e| describe(&e))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

fn multipart_form(parts: Vec<FormPart>) -> Result<reqwest::multipart::Form, TransportError> {
    let mut form = reqwest::multipart::Form::new();
    for part in parts {
        let mut field = reqwest::multipart::Part::bytes(part.data);
        if let Some(filename) = part.filename {
            field = field.file_name(filename);
        }
        if let Some(content_type) = part.content_type {
            field = field
                .mime_str(&content_type)
                .map_err(|e| TransportError::new(format!("Invalid part content type: {e}")))?;
        }
        form = form.part(part.name, field);
    }
    Ok(form)
}

/// Flatten a reqwest error and its source chain into one message; hyper puts
/// the interesting part ("connection closed before message completed") in
/// the sources.
fn describe(err: &reqwest::Error) -> TransportError {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = std::error::Error::source(inner);
    }
    if err.is_timeout() && !message.to_ascii_lowercase().contains("timed out") {
        message.push_str(": operation timed out");
    }
    TransportError::new(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_faults_are_recognized() {
        assert_eq!(
            classify_transport_error("net::ERR_HTTP2_PROTOCOL_ERROR"),
            TransportFault::Protocol
        );
        assert_eq!(
            classify_transport_error("http2 error: stream error received: GOAWAY"),
            TransportFault::Protocol
        );
    }

    #[test]
    fn cutoffs_are_recognized() {
        assert_eq!(
            classify_transport_error("net::ERR_INCOMPLETE_CHUNKED_ENCODING"),
            TransportFault::Cutoff
        );
        assert_eq!(
            classify_transport_error(
                "error sending request: hyper::Error(IncompleteMessage): connection closed before message completed"
            ),
            TransportFault::Cutoff
        );
        assert_eq!(
            classify_transport_error("error decoding response body: unexpected EOF"),
            TransportFault::Cutoff
        );
    }

    #[test]
    fn everything_else_is_plain_transport() {
        assert_eq!(
            classify_transport_error("error trying to connect: tcp connect error: Connection refused"),
            TransportFault::Other
        );
        assert_eq!(
            classify_transport_error("dns error: failed to lookup address"),
            TransportFault::Other
        );
    }

    #[test]
    fn protocol_wins_over_cutoff() {
        assert_eq!(
            classify_transport_error("stream closed: protocol error, incomplete frame"),
            TransportFault::Protocol
        );
    }

    #[test]
    fn request_header_lookup_ignores_case() {
        let request = TransportRequest {
            method: Method::GET,
            url: "http://localhost/api".to_string(),
            headers: vec![("Authorization".to_string(), "Bearer t".to_string())],
            body: RequestBody::Empty,
        };
        assert_eq!(request.header("authorization"), Some("Bearer t"));
        assert_eq!(request.header("content-type"), None);
    }
}
