use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::{Host, Url};

const WEBSOCKET_SCHEME: &str = "ws";

/// Websocket address of the host daemon.
///
/// Accepts either a full `ws://host:port` URL or a bare `host:port` pair. The
/// canonical textual form is always the URL.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    /// Builds an endpoint from its parts.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Host name or IP literal, without IPv6 brackets.
    #[must_use]
    pub fn host(&self) -> &str {
        self.host.as_str()
    }

    /// TCP port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Returns a copy of the endpoint bound to a different port.
    ///
    /// Useful after binding port `0`, once the operating system has chosen.
    #[must_use]
    pub fn with_port(&self, port: u16) -> Self {
        Self::new(self.host.clone(), port)
    }

    /// Websocket URL a client should dial.
    #[must_use]
    pub fn url(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(formatter, "{WEBSOCKET_SCHEME}://[{}]:{}", self.host, self.port)
        } else {
            write!(formatter, "{WEBSOCKET_SCHEME}://{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for Endpoint {
    type Err = EndpointParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        let url = if trimmed.contains("://") {
            Url::parse(trimmed)?
        } else {
            Url::parse(&format!("{WEBSOCKET_SCHEME}://{trimmed}"))?
        };

        if url.scheme() != WEBSOCKET_SCHEME {
            return Err(EndpointParseError::UnsupportedScheme(url.scheme().to_owned()));
        }

        let host = match url.host() {
            Some(Host::Domain(domain)) => domain.to_owned(),
            Some(Host::Ipv4(address)) => address.to_string(),
            Some(Host::Ipv6(address)) => address.to_string(),
            None => return Err(EndpointParseError::MissingHost(input.to_owned())),
        };
        let port = url
            .port_or_known_default()
            .ok_or_else(|| EndpointParseError::MissingPort(input.to_owned()))?;

        Ok(Self { host, port })
    }
}

impl TryFrom<String> for Endpoint {
    type Error = EndpointParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Endpoint> for String {
    fn from(endpoint: Endpoint) -> Self {
        endpoint.to_string()
    }
}

/// Errors encountered while parsing an [`Endpoint`] from text.
#[derive(Debug, Error)]
pub enum EndpointParseError {
    /// Only plain websocket endpoints are supported.
    #[error("unsupported endpoint scheme '{0}', expected 'ws'")]
    UnsupportedScheme(String),
    /// The address carried no host.
    #[error("missing host in '{0}'")]
    MissingHost(String),
    /// The address carried no port and the scheme has no default.
    #[error("missing port in '{0}'")]
    MissingPort(String),
    /// The address is not a URL.
    #[error(transparent)]
    Url(#[from] url::ParseError),
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("ws://localhost:8765", "localhost", 8765)]
    #[case("localhost:9000", "localhost", 9000)]
    #[case("ws://127.0.0.1:1", "127.0.0.1", 1)]
    #[case("  ws://example.test:4000  ", "example.test", 4000)]
    #[case("ws://[::1]:8765", "::1", 8765)]
    fn parses_supported_forms(#[case] input: &str, #[case] host: &str, #[case] port: u16) {
        let endpoint: Endpoint = input.parse().expect("endpoint should parse");
        assert_eq!(endpoint.host(), host);
        assert_eq!(endpoint.port(), port);
    }

    #[rstest]
    fn rejects_secure_and_foreign_schemes() {
        let error = "wss://localhost:8765"
            .parse::<Endpoint>()
            .expect_err("wss is not supported");
        assert!(matches!(error, EndpointParseError::UnsupportedScheme(scheme) if scheme == "wss"));

        let error = "tcp://localhost:8765"
            .parse::<Endpoint>()
            .expect_err("tcp is not a websocket scheme");
        assert!(matches!(error, EndpointParseError::UnsupportedScheme(_)));
    }

    #[rstest]
    fn displays_canonical_url() {
        assert_eq!(Endpoint::new("localhost", 8765).url(), "ws://localhost:8765");
        assert_eq!(Endpoint::new("::1", 80).url(), "ws://[::1]:80");
    }

    #[rstest]
    fn with_port_replaces_only_the_port() {
        let endpoint = Endpoint::new("127.0.0.1", 0).with_port(4242);
        assert_eq!(endpoint, Endpoint::new("127.0.0.1", 4242));
    }
}
