//! detective.toml configuration parser.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use detective::{Dependency, Detective, DetectiveError, DEFAULT_MAX_DEPTH};
use http::{Method, Request, Uri};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Address the query surface binds when `node.listen` is absent.
pub const DEFAULT_LISTEN: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8080);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("query path {0:?} must start with '/'")]
    InvalidPath(String),

    #[error("invalid endpoint {url:?}: {reason}")]
    InvalidEndpoint { url: String, reason: String },

    #[error(transparent)]
    Registration(#[from] DetectiveError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectiveConfig {
    pub node: NodeConfig,
    #[serde(default, rename = "dependency")]
    pub dependencies: Vec<DependencyConfig>,
    #[serde(default, rename = "endpoint")]
    pub endpoints: Vec<EndpointConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub name: String,
    pub listen: Option<SocketAddr>,
    pub path: Option<String>,
    pub max_depth: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyConfig {
    pub name: String,
    /// `host:port` that must accept a TCP connection for the dependency to be ok.
    pub tcp: Option<String>,
    #[serde(default, rename = "dependency")]
    pub dependencies: Vec<DependencyConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub url: String,
    pub method: Option<String>,
    pub headers: Option<BTreeMap<String, String>>,
    pub body: Option<String>,
}

impl DetectiveConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: DetectiveConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let path = self.path();
        if !path.starts_with('/') {
            return Err(ConfigError::InvalidPath(path.to_string()));
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> SocketAddr {
        self.node.listen.unwrap_or(DEFAULT_LISTEN)
    }

    pub fn path(&self) -> &str {
        self.node.path.as_deref().unwrap_or(detective::handler::DEFAULT_PATH)
    }

    /// Build the node with every configured dependency and endpoint.
    pub fn build(&self) -> Result<Detective, ConfigError> {
        let mut detective = Detective::new(&self.node.name)
            .with_max_depth(self.node.max_depth.unwrap_or(DEFAULT_MAX_DEPTH));

        for dep in &self.dependencies {
            dep.apply(detective.register(&dep.name));
        }

        for endpoint in &self.endpoints {
            if endpoint.is_plain() {
                detective.register_endpoint(&endpoint.url)?;
            } else {
                detective.register_endpoint_request(endpoint.request()?);
            }
        }

        debug!(
            node = %self.node.name,
            dependencies = detective.dependency_count(),
            endpoints = detective.endpoint_count(),
            "node built from config"
        );
        Ok(detective)
    }
}

impl DependencyConfig {
    fn apply(&self, dependency: &mut Dependency) {
        if let Some(address) = &self.tcp {
            let address = address.clone();
            dependency.detect(move || {
                let address = address.clone();
                async move { tokio::net::TcpStream::connect(address.as_str()).await.map(|_| ()) }
            });
        }
        for nested in &self.dependencies {
            nested.apply(dependency.register(&nested.name));
        }
    }
}

impl EndpointConfig {
    /// True when the endpoint is a bare URL probed with GET.
    fn is_plain(&self) -> bool {
        self.method.is_none() && self.headers.is_none() && self.body.is_none()
    }

    fn invalid(&self, reason: impl ToString) -> ConfigError {
        ConfigError::InvalidEndpoint {
            url: self.url.clone(),
            reason: reason.to_string(),
        }
    }

    fn request(&self) -> Result<Request<Bytes>, ConfigError> {
        let uri: Uri = self.url.parse().map_err(|e| self.invalid(e))?;
        if uri.scheme().is_none() || uri.authority().is_none() {
            return Err(self.invalid("url must include a scheme and host"));
        }
        let method = match &self.method {
            Some(m) => Method::from_bytes(m.to_ascii_uppercase().as_bytes()).map_err(|e| self.invalid(e))?,
            None => Method::GET,
        };

        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in self.headers.iter().flatten() {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let body = Bytes::from(self.body.clone().unwrap_or_default());
        builder.body(body).map_err(|e| self.invalid(e))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const FULL: &str = r#"
[node]
name = "A"
listen = "127.0.0.1:9000"
path = "/_health"
max_depth = 4

[[dependency]]
name = "db"

  [[dependency.dependency]]
  name = "replica"

[[dependency]]
name = "cache"
tcp = "127.0.0.1:1"

[[endpoint]]
url = "http://b:8080/health"

[[endpoint]]
url = "http://c:8080/health"
method = "post"
headers = { "x-token" = "abc" }
body = "{}"
"#;

    #[test]
    fn parse_full_config() {
        let config = DetectiveConfig::parse(FULL).unwrap();
        assert_eq!(config.node.name, "A");
        assert_eq!(config.listen_addr(), "127.0.0.1:9000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.path(), "/_health");
        assert_eq!(config.dependencies.len(), 2);
        assert_eq!(config.dependencies[0].dependencies[0].name, "replica");
        assert_eq!(config.dependencies[1].tcp.as_deref(), Some("127.0.0.1:1"));
        assert_eq!(config.endpoints.len(), 2);
    }

    #[test]
    fn defaults_when_omitted() {
        let config = DetectiveConfig::parse("[node]\nname = \"solo\"\n").unwrap();
        assert_eq!(config.listen_addr(), DEFAULT_LISTEN);
        assert_eq!(DEFAULT_LISTEN.to_string(), "0.0.0.0:8080");
        assert_eq!(config.path(), "/health");
        assert!(config.dependencies.is_empty());
        assert!(config.endpoints.is_empty());

        let detective = config.build().unwrap();
        assert_eq!(detective.max_depth(), DEFAULT_MAX_DEPTH);
    }

    #[test]
    fn build_registers_everything() {
        let detective = DetectiveConfig::parse(FULL).unwrap().build().unwrap();
        assert_eq!(detective.name(), "A");
        assert_eq!(detective.dependency_count(), 2);
        assert_eq!(detective.endpoint_count(), 2);
        assert_eq!(detective.max_depth(), 4);
    }

    #[test]
    fn custom_endpoint_request() {
        let config = DetectiveConfig::parse(FULL).unwrap();
        let req = config.endpoints[1].request().unwrap();
        assert_eq!(*req.method(), Method::POST);
        assert_eq!(req.headers()["x-token"], "abc");
        assert_eq!(req.body().as_ref(), b"{}");
    }

    #[test]
    fn relative_endpoint_is_rejected() {
        let config = DetectiveConfig::parse(
            "[node]\nname = \"A\"\n[[endpoint]]\nurl = \"/health\"\n",
        )
        .unwrap();
        let err = config.build().unwrap_err();
        assert!(matches!(err, ConfigError::Registration(DetectiveError::RelativeUrl(_))));
    }

    #[test]
    fn bad_custom_endpoint_is_rejected() {
        let config = DetectiveConfig::parse(
            "[node]\nname = \"A\"\n[[endpoint]]\nurl = \"/health\"\nmethod = \"GET\"\n",
        )
        .unwrap();
        let err = config.build().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEndpoint { .. }));
    }

    #[test]
    fn path_must_be_absolute() {
        let err = DetectiveConfig::parse("[node]\nname = \"A\"\npath = \"health\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPath(_)));
    }

    #[test]
    fn missing_node_is_a_parse_error() {
        let err = DetectiveConfig::parse("[[dependency]]\nname = \"db\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn from_file_reads_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FULL.as_bytes()).unwrap();

        let config = DetectiveConfig::from_file(file.path()).unwrap();
        assert_eq!(config.node.name, "A");
    }

    #[test]
    fn from_file_missing_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = DetectiveConfig::from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[tokio::test]
    async fn tcp_detector_reports_closed_port() {
        let config = r#"
[node]
name = "A"

[[dependency]]
name = "db"

  [[dependency.dependency]]
  name = "replica"

[[dependency]]
name = "cache"
tcp = "127.0.0.1:1"
"#;
        let detective = DetectiveConfig::parse(config).unwrap().build().unwrap();
        let state = detective.query_state().await;

        let cache = state.child("cache").unwrap();
        assert_eq!(cache.status, detective::Status::Unhealthy);
        let db = state.child("db").unwrap();
        assert_eq!(db.dependencies[0].name, "replica");
    }
}
