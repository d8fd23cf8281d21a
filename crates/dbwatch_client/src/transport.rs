//! Transport layer abstraction.

use crate::error::ClientResult;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

/// HTTP verb of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET (list, get, watch).
    Get,
    /// POST (create).
    Post,
    /// PUT (replace).
    Put,
    /// DELETE (delete).
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        })
    }
}

/// A request against the REST surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestRequest {
    /// HTTP verb.
    pub method: Method,
    /// Absolute path, e.g. `/apis/resource.donald.com/v1/databases/mysql`.
    pub path: String,
    /// Query parameters, unencoded.
    pub query: Vec<(String, String)>,
    /// JSON body for POST/PUT.
    pub body: Option<Vec<u8>>,
}

impl RestRequest {
    fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    /// GET request.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    /// POST request with a JSON body.
    pub fn post(path: impl Into<String>, body: Vec<u8>) -> Self {
        Self::new(Method::Post, path).with_body(body)
    }

    /// PUT request with a JSON body.
    pub fn put(path: impl Into<String>, body: Vec<u8>) -> Self {
        Self::new(Method::Put, path).with_body(body)
    }

    /// DELETE request.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    /// Appends query parameters.
    pub fn with_query(mut self, pairs: Vec<(String, String)>) -> Self {
        self.query.extend(pairs);
        self
    }

    /// Sets the body.
    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    /// Returns the first value of a query parameter.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// A unary response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl RestResponse {
    /// Creates a response.
    pub fn new(status: u16, body: Vec<u8>) -> Self {
        Self { status, body }
    }

    /// Returns true for 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Body of a streaming response, chunked however the transport likes.
pub type ByteStream = Pin<Box<dyn Stream<Item = ClientResult<Bytes>> + Send>>;

/// Performs requests against the remote API.
///
/// Implementations own connection handling, authentication and TLS. They
/// return non-2xx responses as `Ok` from `send`; mapping statuses to
/// errors is the client's job. `stream` only succeeds for 2xx.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends a unary request.
    async fn send(&self, request: RestRequest) -> ClientResult<RestResponse>;

    /// Opens a streaming request (watch).
    async fn stream(&self, request: RestRequest) -> ClientResult<ByteStream>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: RestRequest) -> ClientResult<RestResponse> {
        (**self).send(request).await
    }

    async fn stream(&self, request: RestRequest) -> ClientResult<ByteStream> {
        (**self).stream(request).await
    }
}
