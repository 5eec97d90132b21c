//! Transport capability used by remote endpoints.
//!
//! A [`Doer`] sends one request and returns the full response or a
//! [`TransportError`]. The default [`HttpDoer`] opens a TCP connection per
//! request, wraps it in TLS for `https` peers and speaks HTTP/1.1 over hyper.

use std::fmt;
use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use http::header::{HOST, USER_AGENT};
use http::{HeaderValue, Request, Response, Uri};
use http_body_util::{BodyExt, Full};
use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::TlsConnector;
use tracing::debug;

use crate::error::TransportError;
use crate::probe::BoxFuture;

const DEFAULT_USER_AGENT: &str = concat!("detective/", env!("CARGO_PKG_VERSION"));

/// Sends a request and returns a response or a transport failure.
///
/// Implementations are shared by every endpoint of a node and must be safe
/// to call from many probes at once.
pub trait Doer: Send + Sync {
    fn send(&self, request: Request<Bytes>) -> BoxFuture<'_, Result<Response<Bytes>, TransportError>>;
}

/// Default HTTP/1.1 transport for `http` and `https` URIs.
///
/// `https` peers are verified against the Mozilla root store unless a
/// client config is supplied with [`with_tls_config`](Self::with_tls_config).
#[derive(Clone, Default)]
pub struct HttpDoer {
    tls: Option<Arc<rustls::ClientConfig>>,
}

impl HttpDoer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a pre-built `rustls` client config for `https` peers, for example
    /// one trusting a private CA.
    pub fn with_tls_config(client_config: Arc<rustls::ClientConfig>) -> Self {
        Self {
            tls: Some(client_config),
        }
    }
}

impl fmt::Debug for HttpDoer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpDoer")
            .field("custom_tls", &self.tls.is_some())
            .finish()
    }
}

impl Doer for HttpDoer {
    fn send(&self, request: Request<Bytes>) -> BoxFuture<'_, Result<Response<Bytes>, TransportError>> {
        Box::pin(send_http1(request, self.tls.clone()))
    }
}

/// Client config trusting the Mozilla roots, built once per process.
fn default_tls_config() -> Result<Arc<rustls::ClientConfig>, TransportError> {
    static CONFIG: OnceLock<Result<Arc<rustls::ClientConfig>, rustls::Error>> = OnceLock::new();

    CONFIG
        .get_or_init(|| {
            let mut root_store = rustls::RootCertStore::empty();
            root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

            let config = rustls::ClientConfig::builder_with_provider(
                rustls::crypto::ring::default_provider().into(),
            )
            .with_safe_default_protocol_versions()?
            .with_root_certificates(root_store)
            .with_no_client_auth();
            Ok(Arc::new(config))
        })
        .clone()
        .map_err(TransportError::TlsConfig)
}

/// Where a request goes: whether it needs TLS and the `host:port` to dial.
fn target(uri: &Uri) -> Result<(bool, String), TransportError> {
    let secure = match uri.scheme_str() {
        Some("http") => false,
        Some("https") => true,
        other => return Err(TransportError::UnsupportedScheme(other.unwrap_or_default().to_string())),
    };
    let authority = uri
        .authority()
        .ok_or_else(|| TransportError::MissingHost(uri.to_string()))?;
    let port = uri.port_u16().unwrap_or(if secure { 443 } else { 80 });
    Ok((secure, format!("{}:{}", authority.host(), port)))
}

async fn send_http1(
    request: Request<Bytes>,
    tls: Option<Arc<rustls::ClientConfig>>,
) -> Result<Response<Bytes>, TransportError> {
    let (mut parts, body) = request.into_parts();
    let uri = parts.uri.clone();
    let (secure, address) = target(&uri)?;
    let authority = uri
        .authority()
        .ok_or_else(|| TransportError::MissingHost(uri.to_string()))?;

    let stream = tokio::net::TcpStream::connect(address.as_str())
        .await
        .map_err(|source| TransportError::Connect {
            address: address.clone(),
            source,
        })?;

    // HTTP/1.1 origin-form: path and query on the request line, authority in Host.
    let origin = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    parts.uri = origin.parse::<Uri>().map_err(http::Error::from)?;
    if !parts.headers.contains_key(HOST) {
        let host = HeaderValue::from_str(authority.as_str()).map_err(http::Error::from)?;
        parts.headers.insert(HOST, host);
    }
    if !parts.headers.contains_key(USER_AGENT) {
        parts
            .headers
            .insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
    }
    let request = Request::from_parts(parts, Full::new(body));

    let resp = if secure {
        let client_config = match tls {
            Some(config) => config,
            None => default_tls_config()?,
        };
        // IPv6 literals keep their brackets in the authority.
        let host = authority.host().trim_start_matches('[').trim_end_matches(']');
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|_| TransportError::InvalidServerName(host.to_string()))?;

        let stream = TlsConnector::from(client_config)
            .connect(server_name, stream)
            .await
            .map_err(|source| TransportError::Tls {
                address: address.clone(),
                source,
            })?;
        exchange(stream, request).await?
    } else {
        exchange(stream, request).await?
    };

    debug!(%uri, status = %resp.status(), bytes = resp.body().len(), "request completed");
    Ok(resp)
}

/// Run one HTTP/1.1 exchange over an established stream.
async fn exchange<S>(stream: S, request: Request<Full<Bytes>>) -> Result<Response<Bytes>, TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let io = hyper_util::rt::TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(TransportError::Handshake)?;

    // Drive the connection in the background.
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!(error = %e, "connection closed with error");
        }
    });

    let resp = sender
        .send_request(request)
        .await
        .map_err(TransportError::Request)?;

    let (resp_parts, incoming) = resp.into_parts();
    let body = incoming
        .collect()
        .await
        .map_err(TransportError::Body)?
        .to_bytes();
    Ok(Response::from_parts(resp_parts, body))
}
