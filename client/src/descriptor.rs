use std::collections::BTreeMap;

use brightpath_core::MutationHint;
use reqwest::Method;
use reqwest::header::{HeaderName, HeaderValue};
use serde::Serialize;

/// How many alternate upload paths a descriptor may carry.
pub const MAX_UPLOAD_ALTERNATES: usize = 2;

/// Programmer errors caught while building a descriptor.
#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    #[error("API path must not be empty")]
    EmptyPath,
    #[error("pass an API path (e.g. /api/withdrawals), not a full URL: {0}")]
    AbsoluteUrl(String),
    #[error("invalid header '{name}': {reason}")]
    InvalidHeader { name: String, reason: String },
    #[error("request body could not be encoded: {0}")]
    Body(#[from] serde_json::Error),
    #[error("a mutation hint only makes sense on a writing method, not {0}")]
    HintOnRead(Method),
    #[error("alternate paths are only supported for multipart uploads")]
    AlternatesWithoutUpload,
    #[error("at most two alternate upload paths are allowed")]
    TooManyAlternates,
    #[error("invalid content type '{content_type}' on form part '{part}': {reason}")]
    InvalidContentType {
        part: String,
        content_type: String,
        reason: String,
    },
}

/// One part of a multipart form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormPart {
    pub name: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

impl FormPart {
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            filename: None,
            content_type: None,
            data: value.into().into_bytes(),
        }
    }

    pub fn file(name: impl Into<String>, filename: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            filename: Some(filename.into()),
            content_type: None,
            data,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Bytes(Vec<u8>),
    Multipart(Vec<FormPart>),
}

/// A fully validated request. Immutable once built.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    method: Method,
    path: String,
    headers: BTreeMap<String, String>,
    body: RequestBody,
    hint: Option<MutationHint>,
    expect_not_found: bool,
    alternate_paths: Vec<String>,
}

impl RequestDescriptor {
    pub fn builder(method: Method, path: impl Into<String>) -> RequestBuilder {
        RequestBuilder {
            method,
            path: path.into(),
            headers: BTreeMap::new(),
            body: RequestBody::Empty,
            hint: None,
            expect_not_found: false,
            alternate_paths: Vec::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> RequestBuilder {
        Self::builder(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> RequestBuilder {
        Self::builder(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> RequestBuilder {
        Self::builder(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> RequestBuilder {
        Self::builder(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> RequestBuilder {
        Self::builder(Method::DELETE, path)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn body(&self) -> &RequestBody {
        &self.body
    }

    pub fn hint(&self) -> Option<&MutationHint> {
        self.hint.as_ref()
    }

    pub fn expects_not_found(&self) -> bool {
        self.expect_not_found
    }

    pub fn is_mutating(&self) -> bool {
        is_mutating_method(&self.method)
    }

    pub fn is_upload(&self) -> bool {
        matches!(self.body, RequestBody::Multipart(_))
    }

    /// Primary path followed by the upload alternates, in retry order.
    pub fn candidate_paths(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.path.as_str()).chain(self.alternate_paths.iter().map(String::as_str))
    }
}

pub struct RequestBuilder {
    method: Method,
    path: String,
    headers: BTreeMap<String, String>,
    body: RequestBody,
    hint: Option<MutationHint>,
    expect_not_found: bool,
    alternate_paths: Vec<String>,
}

impl RequestBuilder {
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn query(mut self, pairs: &[(String, String)]) -> Self {
        if pairs.is_empty() {
            return self;
        }
        let encoded: Vec<String> = pairs
            .iter()
            .map(|(k, v)| format!("{}={}", encode_component(k), encode_component(v)))
            .collect();
        let sep = if self.path.contains('?') { '&' } else { '?' };
        self.path = format!("{}{sep}{}", self.path, encoded.join("&"));
        self
    }

    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, DescriptorError> {
        self.body = RequestBody::Bytes(serde_json::to_vec(body)?);
        Ok(self)
    }

    pub fn bytes(mut self, data: Vec<u8>) -> Self {
        self.body = RequestBody::Bytes(data);
        self
    }

    pub fn multipart(mut self, parts: Vec<FormPart>) -> Self {
        self.body = RequestBody::Multipart(parts);
        self
    }

    pub fn hint(mut self, hint: MutationHint) -> Self {
        self.hint = Some(hint);
        self
    }

    /// A 404 on this path is a normal answer ("nothing yet"), not an anomaly.
    pub fn expect_not_found(mut self) -> Self {
        self.expect_not_found = true;
        self
    }

    /// Path retried when the upload endpoint answers 405.
    pub fn alternate_path(mut self, path: impl Into<String>) -> Self {
        self.alternate_paths.push(path.into());
        self
    }

    pub fn build(self) -> Result<RequestDescriptor, DescriptorError> {
        let path = normalize_api_path(&self.path)?;
        for (name, value) in &self.headers {
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| DescriptorError::InvalidHeader {
                name: name.clone(),
                reason: e.to_string(),
            })?;
            HeaderValue::from_str(value).map_err(|e| DescriptorError::InvalidHeader {
                name: name.clone(),
                reason: e.to_string(),
            })?;
        }
        if let RequestBody::Multipart(parts) = &self.body {
            for part in parts {
                validate_part_content_type(part)?;
            }
        }
        if self.hint.is_some() && !is_mutating_method(&self.method) {
            return Err(DescriptorError::HintOnRead(self.method));
        }
        if !self.alternate_paths.is_empty() && !matches!(self.body, RequestBody::Multipart(_)) {
            return Err(DescriptorError::AlternatesWithoutUpload);
        }
        if self.alternate_paths.len() > MAX_UPLOAD_ALTERNATES {
            return Err(DescriptorError::TooManyAlternates);
        }
        let alternate_paths = self
            .alternate_paths
            .iter()
            .map(|p| normalize_api_path(p))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(RequestDescriptor {
            method: self.method,
            path,
            headers: self.headers,
            body: self.body,
            hint: self.hint,
            expect_not_found: self.expect_not_found,
            alternate_paths,
        })
    }
}

pub fn is_mutating_method(method: &Method) -> bool {
    [Method::POST, Method::PUT, Method::PATCH, Method::DELETE].contains(method)
}

fn validate_part_content_type(part: &FormPart) -> Result<(), DescriptorError> {
    let Some(content_type) = &part.content_type else {
        return Ok(());
    };
    reqwest::multipart::Part::bytes(Vec::new())
        .mime_str(content_type)
        .map(|_| ())
        .map_err(|e| DescriptorError::InvalidContentType {
            part: part.name.clone(),
            content_type: content_type.clone(),
            reason: e.to_string(),
        })
}

fn normalize_api_path(raw: &str) -> Result<String, DescriptorError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DescriptorError::EmptyPath);
    }
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        return Err(DescriptorError::AbsoluteUrl(trimmed.to_string()));
    }
    if trimmed.starts_with('/') {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("/{trimmed}"))
    }
}

fn encode_component(raw: &str) -> String {
    url::form_urlencoded::byte_serialize(raw.as_bytes()).collect()
}
