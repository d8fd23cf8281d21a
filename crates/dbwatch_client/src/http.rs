//! HTTP and loopback transports.
//!
//! `HttpTransport` talks to a real API server with reqwest over rustls,
//! trusting the configured cluster CA and presenting the client
//! certificate when one is set. `LoopbackTransport` routes requests
//! straight into an in-process server, which keeps tests and demos off
//! the network.

use crate::config::{ClientConfig, TlsConfig};
use crate::error::{ClientError, ClientResult};
use crate::transport::{ByteStream, Method, RestRequest, RestResponse, Transport};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// HTTP transport over reqwest.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    bearer_token: Option<String>,
    timeout: Duration,
}

impl HttpTransport {
    /// Creates a transport from a client configuration.
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        let builder = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.connect_timeout);
        let client = configure_tls(builder, &config.tls)?
            .build()
            .map_err(|e| ClientError::Config(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.server.trim_end_matches('/').to_string(),
            bearer_token: config.bearer_token.clone(),
            timeout: config.timeout,
        })
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request_builder(&self, request: &RestRequest) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, request.path);
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self
            .client
            .request(method, url)
            .header(ACCEPT, "application/json");
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(ref token) = self.bearer_token {
            builder = builder.bearer_auth(token);
        }
        if let Some(ref body) = request.body {
            builder = builder
                .header(CONTENT_TYPE, "application/json")
                .body(body.clone());
        }
        builder
    }
}

fn configure_tls(
    mut builder: reqwest::ClientBuilder,
    tls: &TlsConfig,
) -> ClientResult<reqwest::ClientBuilder> {
    if let Some(ref pem) = tls.certificate_authority {
        let certificates = reqwest::Certificate::from_pem_bundle(pem)
            .map_err(|e| ClientError::Config(format!("invalid certificate authority: {}", e)))?;
        if certificates.is_empty() {
            return Err(ClientError::Config(
                "certificate authority holds no PEM certificates".to_string(),
            ));
        }
        for certificate in certificates {
            builder = builder.add_root_certificate(certificate);
        }
    }

    match (&tls.client_certificate, &tls.client_key) {
        (Some(certificate), Some(key)) => {
            let mut pem = certificate.clone();
            if !pem.ends_with(b"\n") {
                pem.push(b'\n');
            }
            pem.extend_from_slice(key);
            let identity = reqwest::Identity::from_pem(&pem)
                .map_err(|e| ClientError::Config(format!("invalid client certificate: {}", e)))?;
            builder = builder.identity(identity);
        }
        (None, None) => {}
        _ => {
            return Err(ClientError::Config(
                "client certificate and key must be set together".to_string(),
            ))
        }
    }

    if tls.insecure_skip_verify {
        warn!("server certificate verification is disabled");
        builder = builder.danger_accept_invalid_certs(true);
    }
    Ok(builder)
}

fn transport_error(err: reqwest::Error) -> ClientError {
    ClientError::Transport {
        message: err.to_string(),
        status: err.status().map(|s| s.as_u16()),
        retryable: !err.is_builder(),
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: RestRequest) -> ClientResult<RestResponse> {
        debug!(method = %request.method, path = %request.path, "sending request");
        let response = self
            .request_builder(&request)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(transport_error)?;
        Ok(RestResponse::new(status, body.to_vec()))
    }

    async fn stream(&self, request: RestRequest) -> ClientResult<ByteStream> {
        debug!(path = %request.path, "opening stream");
        let response = self
            .request_builder(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.bytes().await.map_err(transport_error)?;
            return Err(ClientError::from_response(status, &body, None));
        }

        Ok(Box::pin(
            response.bytes_stream().map(|chunk| chunk.map_err(transport_error)),
        ))
    }
}

/// Trait for servers that can handle loopback requests.
pub trait LoopbackServer: Send + Sync {
    /// Handles a unary request.
    fn handle(&self, request: &RestRequest) -> RestResponse;

    /// Opens a watch. A non-2xx response is returned as `Err`.
    fn watch(&self, request: &RestRequest) -> Result<ByteStream, RestResponse>;
}

/// A transport that routes requests directly to an in-process server.
pub struct LoopbackTransport<S: LoopbackServer> {
    server: Arc<S>,
}

impl<S: LoopbackServer> LoopbackTransport<S> {
    /// Creates a loopback transport connected to the given server.
    pub fn new(server: Arc<S>) -> Self {
        Self { server }
    }

    /// Returns the server.
    pub fn server(&self) -> &Arc<S> {
        &self.server
    }
}

impl<S: LoopbackServer> Clone for LoopbackTransport<S> {
    fn clone(&self) -> Self {
        Self {
            server: Arc::clone(&self.server),
        }
    }
}

#[async_trait]
impl<S: LoopbackServer + 'static> Transport for LoopbackTransport<S> {
    async fn send(&self, request: RestRequest) -> ClientResult<RestResponse> {
        Ok(self.server.handle(&request))
    }

    async fn stream(&self, request: RestRequest) -> ClientResult<ByteStream> {
        self.server
            .watch(&request)
            .map_err(|response| ClientError::from_response(response.status, &response.body, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use dbwatch_api::{encode_status, Status};
    use parking_lot::Mutex;

    #[test]
    fn http_request_shape() {
        let config = ClientConfig::new("https://api.example.com:6443/").with_bearer_token("abc");
        let transport = HttpTransport::new(&config).unwrap();
        assert_eq!(transport.base_url(), "https://api.example.com:6443");

        let request = RestRequest::get("/apis/resource.donald.com/v1/databases").with_query(vec![
            ("labelSelector".into(), "tier=gold".into()),
            ("watch".into(), "true".into()),
        ]);
        let built = transport.request_builder(&request).build().unwrap();

        assert_eq!(built.method(), reqwest::Method::GET);
        assert_eq!(
            built.url().as_str(),
            "https://api.example.com:6443/apis/resource.donald.com/v1/databases?labelSelector=tier%3Dgold&watch=true"
        );
        assert_eq!(built.headers()["authorization"], "Bearer abc");
        assert_eq!(built.headers()["accept"], "application/json");
    }

    #[test]
    fn http_request_body() {
        let transport = HttpTransport::new(&ClientConfig::default()).unwrap();
        let request = RestRequest::post("/apis/resource.donald.com/v1/databases", b"{}".to_vec());
        let built = transport.request_builder(&request).build().unwrap();

        assert_eq!(built.method(), reqwest::Method::POST);
        assert_eq!(built.headers()["content-type"], "application/json");
        assert!(built.headers().get("authorization").is_none());
        assert_eq!(built.body().and_then(|b| b.as_bytes()), Some(&b"{}"[..]));
    }

    const CA_PEM: &[u8] = include_bytes!("../testdata/ca.crt");
    const CLIENT_CERT_PEM: &[u8] = include_bytes!("../testdata/client.crt");
    const CLIENT_KEY_PEM: &[u8] = include_bytes!("../testdata/client.key");

    #[test]
    fn tls_material_is_installed() {
        let config = ClientConfig::new("https://203.0.113.10:6443")
            .with_certificate_authority(CA_PEM)
            .with_client_identity(CLIENT_CERT_PEM, CLIENT_KEY_PEM);
        assert!(HttpTransport::new(&config).is_ok());

        let insecure = ClientConfig::new("https://203.0.113.10:6443").with_insecure_skip_tls_verify(true);
        assert!(HttpTransport::new(&insecure).is_ok());
    }

    #[test]
    fn invalid_tls_material_is_a_config_error() {
        let bad_ca = ClientConfig::new("https://203.0.113.10:6443")
            .with_certificate_authority(b"foo".to_vec());
        assert!(matches!(
            HttpTransport::new(&bad_ca),
            Err(ClientError::Config(msg)) if msg.contains("certificate authority")
        ));

        let bad_identity = ClientConfig::new("https://203.0.113.10:6443")
            .with_client_identity(CLIENT_CERT_PEM, b"not a key".to_vec());
        assert!(matches!(
            HttpTransport::new(&bad_identity),
            Err(ClientError::Config(msg)) if msg.contains("client certificate")
        ));

        let mut half = ClientConfig::new("https://203.0.113.10:6443");
        half.tls.client_certificate = Some(CLIENT_CERT_PEM.to_vec());
        assert!(matches!(HttpTransport::new(&half), Err(ClientError::Config(_))));
    }

    struct RecordingServer {
        seen: Mutex<Vec<RestRequest>>,
    }

    impl LoopbackServer for RecordingServer {
        fn handle(&self, request: &RestRequest) -> RestResponse {
            self.seen.lock().push(request.clone());
            RestResponse::new(200, b"ok".to_vec())
        }

        fn watch(&self, request: &RestRequest) -> Result<ByteStream, RestResponse> {
            self.seen.lock().push(request.clone());
            if request.query_param("resourceVersion") == Some("1") {
                return Err(RestResponse::new(
                    410,
                    encode_status(&Status::expired("too old")).unwrap(),
                ));
            }
            Ok(Box::pin(futures::stream::iter(vec![Ok(Bytes::from_static(
                b"chunk",
            ))])))
        }
    }

    #[tokio::test]
    async fn loopback_routes_to_server() {
        let server = Arc::new(RecordingServer {
            seen: Mutex::new(Vec::new()),
        });
        let transport = LoopbackTransport::new(Arc::clone(&server));

        let response = transport.send(RestRequest::get("/x")).await.unwrap();
        assert_eq!(response.body, b"ok");

        let mut stream = transport.stream(RestRequest::get("/x")).await.unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap(), Bytes::from_static(b"chunk"));

        let err = transport
            .stream(RestRequest::get("/x").with_query(vec![("resourceVersion".into(), "1".into())]))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ClientError::Expired(_)));

        assert_eq!(server.seen.lock().len(), 3);
    }
}
