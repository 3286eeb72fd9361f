// # Google Cloud Firewall Provider
//
// Drives a VPC firewall rule in a Google Cloud project through the Compute
// Engine REST API.
//
// ## Behavior
//
// - Firewall rules are keyed by name within a project, so no id resolution
//   is needed
// - `update` PATCHes only `sourceRanges`; every other field of the rule is
//   left as configured in the console
// - The returned operation is not awaited; the PATCH is accepted or rejected
//   synchronously
// - No retries, no caching, one request per call (paging excepted)
//
// ## Credentials
//
// A bearer token is read from `GOOGLE_OAUTH_ACCESS_TOKEN`, for example the
// output of `gcloud auth print-access-token`. The token never appears in logs
// or in `Debug` output.
//
// ## API Reference
//
// - List:  GET   `/projects/{project}/global/firewalls`
// - Get:   GET   `/projects/{project}/global/firewalls/{name}`
// - Patch: PATCH `/projects/{project}/global/firewalls/{name}`

use async_trait::async_trait;
use fwsync_core::config::ProviderConfig;
use fwsync_core::traits::{Firewall, FirewallProvider, FirewallProviderFactory};
use fwsync_core::{Error, Result};
use serde::Deserialize;
use std::time::Duration;

/// Compute Engine API base URL
const GCP_API_BASE: &str = "https://compute.googleapis.com/compute/v1";

/// Environment variable holding the OAuth access token
pub const TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

/// Provider tag in the config record
pub const PROVIDER_NAME: &str = "google";

/// Transport-level ceiling; the engine applies its own, shorter deadline
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FirewallResource {
    name: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    source_ranges: Vec<String>,
}

impl From<FirewallResource> for Firewall {
    fn from(resource: FirewallResource) -> Self {
        let firewall = Firewall::new(resource.name, resource.source_ranges);
        match resource.id {
            Some(id) => firewall.with_metadata("id", id),
            None => firewall,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FirewallList {
    #[serde(default)]
    items: Vec<FirewallResource>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// Google Cloud firewall provider
///
/// Stateless: every call goes to the API.
pub struct GcpProvider {
    /// OAuth bearer token
    /// ⚠️ NEVER log this value
    access_token: String,

    /// Project owning the firewall rules
    project: String,

    /// API root, overridable for tests
    base_url: String,

    client: reqwest::Client,
}

// Custom Debug implementation that hides the access token
impl std::fmt::Debug for GcpProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcpProvider")
            .field("access_token", &"<REDACTED>")
            .field("project", &self.project)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl GcpProvider {
    /// Create a new Google Cloud provider
    ///
    /// # Parameters
    ///
    /// - `access_token`: OAuth bearer token with `compute` scope
    /// - `project`: Project id the firewall rules live in
    ///
    /// # Returns
    ///
    /// - `Err(Error::Authentication)`: The token is empty
    /// - `Err(Error::Config)`: The project is empty
    pub fn new(access_token: impl Into<String>, project: impl Into<String>) -> Result<Self> {
        let access_token = access_token.into();
        if access_token.trim().is_empty() {
            return Err(Error::auth(format!(
                "google access token is empty; set {}",
                TOKEN_ENV
            )));
        }

        let project = project.into();
        if project.trim().is_empty() {
            return Err(Error::config("google provider requires a project"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::provider(PROVIDER_NAME, format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            access_token,
            project,
            base_url: GCP_API_BASE.to_string(),
            client,
        })
    }

    /// Point the provider at a different API root
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn firewalls_url(&self) -> String {
        format!("{}/projects/{}/global/firewalls", self.base_url, self.project)
    }

    fn firewall_url(&self, name: &str) -> String {
        format!("{}/{}", self.firewalls_url(), name)
    }

    /// Send a request and turn any non-success status into a typed error
    async fn send(&self, request: reqwest::RequestBuilder, subject: &str) -> Result<reqwest::Response> {
        let response = request
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| Error::provider(PROVIDER_NAME, format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error response".to_string());

        Err(match status.as_u16() {
            401 | 403 => Error::auth(format!(
                "google rejected the access token ({}): {}",
                status, error_text
            )),
            404 => Error::not_found(format!(
                "{} in project {}",
                subject, self.project
            )),
            _ => Error::provider(
                PROVIDER_NAME,
                format!("{} failed: {} - {}", subject, status, error_text),
            ),
        })
    }

    async fn parse<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        response
            .json()
            .await
            .map_err(|e| Error::provider(PROVIDER_NAME, format!("Failed to parse response: {}", e)))
    }
}

#[async_trait]
impl FirewallProvider for GcpProvider {
    async fn list(&self) -> Result<Vec<Firewall>> {
        let mut firewalls = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self.client.get(self.firewalls_url());
            if let Some(ref token) = page_token {
                request = request.query(&[("pageToken", token)]);
            }

            let response = self.send(request, "firewall list").await?;
            let page: FirewallList = Self::parse(response).await?;

            firewalls.extend(page.items.into_iter().map(Firewall::from));

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        tracing::debug!(
            "Listed {} firewall rule(s) in project {}",
            firewalls.len(),
            self.project
        );
        Ok(firewalls)
    }

    async fn get(&self, name: &str) -> Result<Firewall> {
        let response = self
            .send(self.client.get(self.firewall_url(name)), &format!("firewall {}", name))
            .await?;
        let resource: FirewallResource = Self::parse(response).await?;
        Ok(resource.into())
    }

    async fn update(&self, name: &str, source_addresses: &[String]) -> Result<()> {
        let payload = serde_json::json!({ "sourceRanges": source_addresses });

        self.send(
            self.client.patch(self.firewall_url(name)).json(&payload),
            &format!("firewall {}", name),
        )
        .await?;

        tracing::info!(
            "Patched google firewall {} with {} source range(s)",
            name,
            source_addresses.len()
        );
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER_NAME
    }
}

/// Factory for creating Google Cloud providers
///
/// The token comes from [`TOKEN_ENV`] unless one is supplied explicitly.
#[derive(Default)]
pub struct GcpFactory {
    access_token: Option<String>,
    base_url: Option<String>,
}

impl std::fmt::Debug for GcpFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcpFactory")
            .field("access_token", &self.access_token.as_ref().map(|_| "<REDACTED>"))
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl GcpFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `token` instead of reading the environment
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Build providers against a different API root
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }
}

impl FirewallProviderFactory for GcpFactory {
    fn create(&self, config: &ProviderConfig) -> Result<Box<dyn FirewallProvider>> {
        let project = config
            .project
            .clone()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| Error::config("google provider requires a project"))?;

        let token = self
            .access_token
            .clone()
            .or_else(|| std::env::var(TOKEN_ENV).ok())
            .ok_or_else(|| {
                Error::auth(format!("no google credentials found; set {}", TOKEN_ENV))
            })?;

        let mut provider = GcpProvider::new(token, project)?;
        if let Some(ref base_url) = self.base_url {
            provider = provider.with_base_url(base_url.clone());
        }
        Ok(Box::new(provider))
    }
}

/// Register the Google Cloud provider with a registry
///
/// # Example
///
/// ```rust
/// use fwsync_core::ProviderRegistry;
///
/// let registry = ProviderRegistry::new();
/// fwsync_provider_gcp::register(&registry);
/// assert!(registry.has_provider("google"));
/// ```
pub fn register(registry: &fwsync_core::ProviderRegistry) {
    registry.register_provider(PROVIDER_NAME, Box::new(GcpFactory::new()));
}
