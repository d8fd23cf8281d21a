//! Client configuration.
//!
//! Configuration is an explicit value handed to the transport and client
//! constructors. It can be built by hand, read from a kubeconfig file, or
//! taken from the in-cluster service account environment.

use crate::error::{ClientError, ClientResult};
use base64::{engine::general_purpose::STANDARD, Engine};
use dbwatch_api::API_PATH;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Service account token mounted into every pod.
pub const IN_CLUSTER_TOKEN_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// File next to the service account token holding the cluster CA bundle.
pub const IN_CLUSTER_CA_FILE: &str = "ca.crt";

/// TLS material for the connection to the API server. All fields are PEM.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct TlsConfig {
    /// Certificate authorities trusted in addition to the built-in roots.
    pub certificate_authority: Option<Vec<u8>>,
    /// Client certificate chain presented to the server.
    pub client_certificate: Option<Vec<u8>>,
    /// Private key of the client certificate.
    pub client_key: Option<Vec<u8>>,
    /// Accept any server certificate.
    pub insecure_skip_verify: bool,
}

impl TlsConfig {
    /// Returns true when both a client certificate and its key are set.
    pub fn has_client_identity(&self) -> bool {
        self.client_certificate.is_some() && self.client_key.is_some()
    }
}

impl fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsConfig")
            .field("certificate_authority", &self.certificate_authority.as_ref().map(Vec::len))
            .field("client_certificate", &self.client_certificate.as_ref().map(Vec::len))
            .field("client_key", &self.client_key.as_ref().map(|_| "<redacted>"))
            .field("insecure_skip_verify", &self.insecure_skip_verify)
            .finish()
    }
}

/// Configuration for talking to the API server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the API server, e.g. `https://10.0.0.1:6443`.
    pub server: String,
    /// Path prefix for API groups.
    pub api_path: String,
    /// Bearer token sent with every request.
    pub bearer_token: Option<String>,
    /// User agent header.
    pub user_agent: String,
    /// Timeout for unary requests. Watch streams are not bounded by it.
    pub timeout: Duration,
    /// Timeout for establishing connections.
    pub connect_timeout: Duration,
    /// Server verification and client certificate.
    pub tls: TlsConfig,
}

impl ClientConfig {
    /// Creates a configuration for the given server URL.
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            api_path: API_PATH.to_string(),
            bearer_token: None,
            user_agent: format!("dbwatch/{}", env!("CARGO_PKG_VERSION")),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            tls: TlsConfig::default(),
        }
    }

    /// Sets the bearer token.
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Sets the user agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Sets the unary request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Trusts the given PEM certificate authority bundle.
    pub fn with_certificate_authority(mut self, pem: impl Into<Vec<u8>>) -> Self {
        self.tls.certificate_authority = Some(pem.into());
        self
    }

    /// Authenticates with a PEM client certificate and key.
    pub fn with_client_identity(
        mut self,
        certificate: impl Into<Vec<u8>>,
        key: impl Into<Vec<u8>>,
    ) -> Self {
        self.tls.client_certificate = Some(certificate.into());
        self.tls.client_key = Some(key.into());
        self
    }

    /// Disables server certificate verification.
    pub fn with_insecure_skip_tls_verify(mut self, skip: bool) -> Self {
        self.tls.insecure_skip_verify = skip;
        self
    }

    /// Loads the current context of a kubeconfig file.
    pub fn from_kubeconfig(path: &Path) -> ClientResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ClientError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let kubeconfig: Kubeconfig = serde_yaml::from_str(&text).map_err(|e| {
            ClientError::Config(format!("cannot parse {}: {}", path.display(), e))
        })?;
        kubeconfig.resolve(path.parent())
    }

    /// Builds a configuration from the in-cluster service account.
    pub fn in_cluster() -> ClientResult<Self> {
        let host = std::env::var("KUBERNETES_SERVICE_HOST").map_err(|_| {
            ClientError::Config("KUBERNETES_SERVICE_HOST is not set".to_string())
        })?;
        let port = std::env::var("KUBERNETES_SERVICE_PORT").unwrap_or_else(|_| "443".into());
        Self::in_cluster_from(&host, &port, Path::new(IN_CLUSTER_TOKEN_PATH))
    }

    /// Builds an in-cluster configuration from explicit parts.
    ///
    /// The cluster CA is read from `ca.crt` next to the token when present.
    pub fn in_cluster_from(host: &str, port: &str, token_path: &Path) -> ClientResult<Self> {
        if host.is_empty() {
            return Err(ClientError::Config("empty service host".to_string()));
        }
        let host = if host.contains(':') && !host.starts_with('[') {
            format!("[{}]", host)
        } else {
            host.to_string()
        };
        let token = read_token(token_path)?;
        let mut config = Self::new(format!("https://{}:{}", host, port)).with_bearer_token(token);

        let ca = token_path.with_file_name(IN_CLUSTER_CA_FILE);
        if ca.exists() {
            config.tls.certificate_authority = Some(read_file(&ca, "certificate authority")?);
        } else {
            warn!(path = %ca.display(), "service account CA not found, using built-in roots");
        }
        Ok(config)
    }

    /// Picks a configuration source.
    ///
    /// An existing file at `path` is always used. A missing file is an
    /// error when the path was given explicitly; otherwise the in-cluster
    /// environment is used instead. An empty path always means in-cluster.
    pub fn infer(path: &Path, explicit: bool) -> ClientResult<Self> {
        if path.as_os_str().is_empty() {
            info!("using in-cluster configuration");
            return Self::in_cluster();
        }
        if path.exists() {
            info!(path = %path.display(), "using configuration from kubeconfig");
            return Self::from_kubeconfig(path);
        }
        if explicit {
            return Err(ClientError::Config(format!(
                "kubeconfig {} does not exist",
                path.display()
            )));
        }
        info!(path = %path.display(), "kubeconfig not found, using in-cluster configuration");
        Self::in_cluster()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new("http://127.0.0.1:8080")
    }
}

fn read_token(path: &Path) -> ClientResult<String> {
    let token = std::fs::read_to_string(path)
        .map_err(|e| ClientError::Config(format!("cannot read token {}: {}", path.display(), e)))?;
    let token = token.trim();
    if token.is_empty() {
        return Err(ClientError::Config(format!(
            "token file {} is empty",
            path.display()
        )));
    }
    Ok(token.to_string())
}

fn read_file(path: &Path, what: &str) -> ClientResult<Vec<u8>> {
    std::fs::read(path)
        .map_err(|e| ClientError::Config(format!("cannot read {} {}: {}", what, path.display(), e)))
}

/// Resolves a kubeconfig `*-data` / file pair. Inline data wins.
fn load_material(
    data: Option<&str>,
    file: Option<&Path>,
    base_dir: Option<&Path>,
    what: &str,
) -> ClientResult<Option<Vec<u8>>> {
    if let Some(data) = data.map(str::trim).filter(|d| !d.is_empty()) {
        let compact: String = data.split_whitespace().collect();
        return STANDARD
            .decode(compact)
            .map(Some)
            .map_err(|e| ClientError::Config(format!("invalid base64 in {} data: {}", what, e)));
    }
    match file {
        Some(file) => {
            let file = match base_dir {
                Some(dir) if file.is_relative() => dir.join(file),
                _ => file.to_path_buf(),
            };
            read_file(&file, what).map(Some)
        }
        None => Ok(None),
    }
}

/// The subset of the kubeconfig format needed to reach one server.
#[derive(Debug, Deserialize)]
struct Kubeconfig {
    #[serde(rename = "current-context", default)]
    current_context: Option<String>,
    #[serde(default)]
    clusters: Vec<NamedCluster>,
    #[serde(default)]
    contexts: Vec<NamedContext>,
    #[serde(default)]
    users: Vec<NamedUser>,
}

#[derive(Debug, Deserialize)]
struct NamedCluster {
    name: String,
    cluster: Cluster,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct Cluster {
    server: String,
    #[serde(default)]
    certificate_authority: Option<PathBuf>,
    #[serde(default)]
    certificate_authority_data: Option<String>,
    #[serde(default)]
    insecure_skip_tls_verify: bool,
}

#[derive(Debug, Deserialize)]
struct NamedContext {
    name: String,
    context: Context,
}

#[derive(Debug, Deserialize)]
struct Context {
    cluster: String,
    #[serde(default)]
    user: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NamedUser {
    name: String,
    #[serde(default)]
    user: User,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct User {
    #[serde(default)]
    token: Option<String>,
    #[serde(rename = "tokenFile", default)]
    token_file: Option<PathBuf>,
    #[serde(default)]
    client_certificate: Option<PathBuf>,
    #[serde(default)]
    client_certificate_data: Option<String>,
    #[serde(default)]
    client_key: Option<PathBuf>,
    #[serde(default)]
    client_key_data: Option<String>,
}

impl Kubeconfig {
    fn resolve(self, base_dir: Option<&Path>) -> ClientResult<ClientConfig> {
        let context_name = match self.current_context.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ if self.contexts.len() == 1 => self.contexts[0].name.clone(),
            _ => return Err(ClientError::Config("no current-context set".to_string())),
        };

        let context = self
            .contexts
            .iter()
            .find(|c| c.name == context_name)
            .map(|c| &c.context)
            .ok_or_else(|| ClientError::Config(format!("context {:?} not found", context_name)))?;

        let cluster = self
            .clusters
            .iter()
            .find(|c| c.name == context.cluster)
            .map(|c| &c.cluster)
            .ok_or_else(|| {
                ClientError::Config(format!("cluster {:?} not found", context.cluster))
            })?;
        if cluster.server.is_empty() {
            return Err(ClientError::Config(format!(
                "cluster {:?} has no server",
                context.cluster
            )));
        }

        let mut config = ClientConfig::new(cluster.server.clone());
        config.tls.certificate_authority = load_material(
            cluster.certificate_authority_data.as_deref(),
            cluster.certificate_authority.as_deref(),
            base_dir,
            "certificate authority",
        )?;
        config.tls.insecure_skip_verify = cluster.insecure_skip_tls_verify;
        if config.tls.insecure_skip_verify && config.tls.certificate_authority.is_some() {
            return Err(ClientError::Config(format!(
                "cluster {:?} sets both a certificate authority and insecure-skip-tls-verify",
                context.cluster
            )));
        }

        if let Some(user_name) = context.user.as_deref() {
            let user = self
                .users
                .iter()
                .find(|u| u.name == user_name)
                .map(|u| &u.user)
                .ok_or_else(|| ClientError::Config(format!("user {:?} not found", user_name)))?;

            if let Some(token) = user.token.as_deref().filter(|t| !t.is_empty()) {
                config.bearer_token = Some(token.to_string());
            } else if let Some(file) = user.token_file.as_deref() {
                let file = match base_dir {
                    Some(dir) if file.is_relative() => dir.join(file),
                    _ => file.to_path_buf(),
                };
                config.bearer_token = Some(read_token(&file)?);
            }

            config.tls.client_certificate = load_material(
                user.client_certificate_data.as_deref(),
                user.client_certificate.as_deref(),
                base_dir,
                "client certificate",
            )?;
            config.tls.client_key = load_material(
                user.client_key_data.as_deref(),
                user.client_key.as_deref(),
                base_dir,
                "client key",
            )?;

            if config.tls.client_certificate.is_some() != config.tls.client_key.is_some() {
                return Err(ClientError::Config(format!(
                    "user {:?} needs both a client certificate and a client key",
                    user_name
                )));
            }
            if config.bearer_token.is_none() && !config.tls.has_client_identity() {
                return Err(ClientError::Config(format!(
                    "user {:?} has no supported credentials (token, tokenFile or client certificate)",
                    user_name
                )));
            }
        }

        Ok(config)
    }
}
