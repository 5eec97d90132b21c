//! Error types for detective registration and transport.

use thiserror::Error;

/// Result type alias for registration operations.
pub type DetectiveResult<T> = Result<T, DetectiveError>;

/// Errors surfaced synchronously while registering probe targets.
#[derive(Debug, Error)]
pub enum DetectiveError {
    #[error("invalid endpoint url {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: http::uri::InvalidUri,
    },

    #[error("endpoint url {0:?} must include a scheme and host")]
    RelativeUrl(String),
}

/// Errors produced by a [`Doer`](crate::transport::Doer) while sending a request.
///
/// Probes never propagate these; they are folded into an `unreachable`
/// [`HealthState`](crate::state::HealthState).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("unsupported scheme {0:?} (only http and https are supported)")]
    UnsupportedScheme(String),

    #[error("request uri {0:?} has no host")]
    MissingHost(String),

    #[error("connect to {address} failed: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0:?} is not a valid tls server name")]
    InvalidServerName(String),

    #[error("tls client configuration failed: {0}")]
    TlsConfig(#[source] rustls::Error),

    #[error("tls handshake with {address} failed: {source}")]
    Tls {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("http handshake failed: {0}")]
    Handshake(#[source] hyper::Error),

    #[error("request failed: {0}")]
    Request(#[source] hyper::Error),

    #[error("reading response body failed: {0}")]
    Body(#[source] hyper::Error),

    #[error("building request failed: {0}")]
    Build(#[from] http::Error),
}
