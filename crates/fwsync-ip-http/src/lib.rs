// # HTTP IP Source
//
// Discovers the operator's public IPv4 address by asking an echo service.
//
// ## Behavior
//
// - One GET per call, no caching: every `fwsync update` must see the address
//   the network has right now
// - The response body is trimmed and parsed as an IP address
// - Every failure (transport, status, body) is a discovery error; callers
//   must not mutate any state when discovery fails
//
// The default endpoint is `https://ipv4.icanhazip.com`, which only answers
// over IPv4 and so never returns an IPv6 address for dual-stack hosts.

use fwsync_core::traits::IpSource;
use fwsync_core::{Error, Result};

use std::net::IpAddr;
use std::time::Duration;

/// Default echo service
pub const DEFAULT_IP_URL: &str = "https://ipv4.icanhazip.com";

/// Transport-level ceiling; the engine applies its own, shorter deadline
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP-based public IP source
#[derive(Debug, Clone)]
pub struct HttpIpSource {
    /// URL to fetch IP from
    url: String,

    /// HTTP client
    client: reqwest::Client,
}

impl HttpIpSource {
    /// Create a new HTTP IP source
    ///
    /// # Parameters
    ///
    /// - `url`: Endpoint answering with the caller's address as plain text
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::discovery(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            url: url.into(),
            client,
        })
    }

    /// Source using [`DEFAULT_IP_URL`]
    pub fn default_endpoint() -> Result<Self> {
        Self::new(DEFAULT_IP_URL)
    }

    /// Endpoint this source queries
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait::async_trait]
impl IpSource for HttpIpSource {
    async fn current(&self) -> Result<IpAddr> {
        tracing::debug!("Fetching public IP from {}", self.url);

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::discovery(format!("request to {} failed: {}", self.url, e)))?;

        if !response.status().is_success() {
            return Err(Error::discovery(format!(
                "{} answered with HTTP {}",
                self.url,
                response.status()
            )));
        }

        let ip_text = response
            .text()
            .await
            .map_err(|e| Error::discovery(format!("failed to read response: {}", e)))?;

        let ip_text = ip_text.trim();

        let ip: IpAddr = ip_text
            .parse()
            .map_err(|_| Error::discovery(format!("invalid IP address in response: {:?}", ip_text)))?;

        tracing::debug!("Public IP is {}", ip);
        Ok(ip)
    }
}
