// # Linode Cloud Firewall Provider
//
// Drives an Akamai/Linode Cloud Firewall through the Linode API v4.
//
// ## Identity resolution
//
// Linode addresses firewalls by numeric id, while the config record stores
// the human label. Every `get` resolves the label with an `X-Filter` query;
// `update` goes through `get` first. Nothing is cached between calls, so a
// firewall recreated under the same label is picked up on the next run.
//
// ## Rule layout
//
// fwsync owns the whole rule-set of the firewall it drives. An update writes:
//
// ```json
// {
//   "inbound_policy": "ACCEPT",
//   "inbound": [{
//     "label": "<firewall label>",
//     "action": "ACCEPT",
//     "protocol": "TCP",
//     "addresses": { "ipv4": ["9.9.9.9/32"] }
//   }],
//   "outbound_policy": "ACCEPT",
//   "outbound": []
// }
// ```
//
// Reading tolerates a firewall with no inbound rule (or a rule without IPv4
// addresses) and reports it as an empty allow-list.
//
// ## API Reference
//
// - List:   GET `/networking/firewalls?page=N`
// - Lookup: GET `/networking/firewalls` with `X-Filter: {"label": "<name>"}`
// - Rules:  PUT `/networking/firewalls/{id}/rules`

use async_trait::async_trait;
use fwsync_core::config::ProviderConfig;
use fwsync_core::traits::{Firewall, FirewallProvider, FirewallProviderFactory};
use fwsync_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Linode API base URL
const LINODE_API_BASE: &str = "https://api.linode.com/v4";

/// Environment variable holding the personal access token
pub const TOKEN_ENV: &str = "LINODE_TOKEN";

/// Provider tag in the config record
pub const PROVIDER_NAME: &str = "linode";

/// Metadata key carrying the numeric firewall id
pub const ID_KEY: &str = "id";

/// Largest page size the API accepts
const PAGE_SIZE: u32 = 500;

/// Transport-level ceiling; the engine applies its own, shorter deadline
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct Page<T> {
    #[serde(default)]
    data: Vec<T>,
    #[serde(default = "first_page")]
    page: u32,
    #[serde(default = "first_page")]
    pages: u32,
}

fn first_page() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
struct FirewallResource {
    id: u64,
    label: String,
    #[serde(default)]
    rules: RuleSet,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct RuleSet {
    #[serde(default)]
    inbound: Vec<Rule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inbound_policy: Option<String>,
    #[serde(default)]
    outbound: Vec<Rule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    outbound_policy: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
struct Rule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    label: Option<String>,
    action: String,
    protocol: String,
    #[serde(default)]
    addresses: Addresses,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct Addresses {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ipv4: Option<Vec<String>>,
}

impl RuleSet {
    /// Rule-set with one inbound TCP ACCEPT rule for `addresses`
    ///
    /// The inbound policy is `ACCEPT`: the rule does not close the firewall to
    /// other sources, and a `DROP` policy set by hand is overwritten on the
    /// next update.
    fn allow_only(label: &str, addresses: &[String]) -> Self {
        Self {
            inbound: vec![Rule {
                label: Some(label.to_string()),
                action: "ACCEPT".to_string(),
                protocol: "TCP".to_string(),
                addresses: Addresses {
                    ipv4: Some(addresses.to_vec()),
                },
            }],
            inbound_policy: Some("ACCEPT".to_string()),
            outbound: Vec::new(),
            outbound_policy: Some("ACCEPT".to_string()),
        }
    }

    /// IPv4 addresses of the first inbound rule, empty when there is none
    fn allowed_ipv4(&self) -> Vec<String> {
        self.inbound
            .first()
            .and_then(|rule| rule.addresses.ipv4.clone())
            .unwrap_or_default()
    }
}

impl From<FirewallResource> for Firewall {
    fn from(resource: FirewallResource) -> Self {
        Firewall::new(resource.label, resource.rules.allowed_ipv4())
            .with_metadata(ID_KEY, resource.id)
    }
}

/// Linode Cloud Firewall provider
pub struct LinodeProvider {
    /// Personal access token
    /// ⚠️ NEVER log this value
    api_token: String,

    /// API root, overridable for tests
    base_url: String,

    client: reqwest::Client,
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for LinodeProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinodeProvider")
            .field("api_token", &"<REDACTED>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl LinodeProvider {
    /// Create a new Linode provider
    ///
    /// # Parameters
    ///
    /// - `api_token`: Personal access token with `firewall:read_write`
    ///
    /// # Returns
    ///
    /// - `Err(Error::Authentication)`: The token is empty
    pub fn new(api_token: impl Into<String>) -> Result<Self> {
        let api_token = api_token.into();
        if api_token.trim().is_empty() {
            return Err(Error::auth(format!(
                "linode API token is empty; set {}",
                TOKEN_ENV
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::provider(PROVIDER_NAME, format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_token,
            base_url: LINODE_API_BASE.to_string(),
            client,
        })
    }

    /// Point the provider at a different API root
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn send(&self, request: reqwest::RequestBuilder, subject: &str) -> Result<reqwest::Response> {
        let response = request
            .bearer_auth(&self.api_token)
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
                "linode rejected the API token ({}): {}",
                status, error_text
            )),
            404 => Error::not_found(subject.to_string()),
            _ => Error::provider(
                PROVIDER_NAME,
                format!("{} failed: {} - {}", subject, status, error_text),
            ),
        })
    }

    /// Fetch every page of firewalls, optionally narrowed by an `X-Filter`
    async fn fetch_firewalls(&self, filter: Option<&serde_json::Value>) -> Result<Vec<FirewallResource>> {
        let url = format!("{}/networking/firewalls", self.base_url);
        let mut firewalls = Vec::new();
        let mut page = 1u32;

        loop {
            let mut request = self
                .client
                .get(&url)
                .query(&[("page", page), ("page_size", PAGE_SIZE)]);
            if let Some(filter) = filter {
                request = request.header("X-Filter", filter.to_string());
            }

            let response = self.send(request, "firewall list").await?;
            let body: Page<FirewallResource> = response
                .json()
                .await
                .map_err(|e| Error::provider(PROVIDER_NAME, format!("Failed to parse response: {}", e)))?;

            firewalls.extend(body.data);

            if body.page >= body.pages {
                break;
            }
            page = body.page + 1;
        }

        Ok(firewalls)
    }
}

#[async_trait]
impl FirewallProvider for LinodeProvider {
    async fn list(&self) -> Result<Vec<Firewall>> {
        let firewalls = self.fetch_firewalls(None).await?;
        tracing::debug!("Listed {} linode firewall(s)", firewalls.len());
        Ok(firewalls.into_iter().map(Firewall::from).collect())
    }

    async fn get(&self, name: &str) -> Result<Firewall> {
        let filter = serde_json::json!({ "label": name });
        let mut matches = self.fetch_firewalls(Some(&filter)).await?;

        match matches.len() {
            0 => Err(Error::not_found(format!(
                "no linode firewall labeled {}",
                name
            ))),
            1 => {
                let resource = matches.remove(0);
                tracing::debug!("Resolved linode firewall {} to id {}", name, resource.id);
                Ok(resource.into())
            }
            n => Err(Error::ambiguous(format!(
                "{} linode firewalls labeled {}",
                n, name
            ))),
        }
    }

    async fn update(&self, name: &str, source_addresses: &[String]) -> Result<()> {
        let firewall = self.get(name).await?;
        let id = firewall
            .provider_metadata
            .get(ID_KEY)
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| Error::provider(PROVIDER_NAME, format!("no id found for firewall {}", name)))?;

        let url = format!("{}/networking/firewalls/{}/rules", self.base_url, id);
        let rules = RuleSet::allow_only(&firewall.name, source_addresses);

        self.send(self.client.put(url).json(&rules), &format!("firewall {}", name))
            .await?;

        tracing::info!(
            "Replaced rules of linode firewall {} (id {}) with {} address(es)",
            name,
            id,
            source_addresses.len()
        );
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER_NAME
    }
}

/// Factory for creating Linode providers
///
/// The token comes from [`TOKEN_ENV`] unless one is supplied explicitly.
/// Linode has no project scope, so `ProviderConfig::project` is ignored.
#[derive(Default)]
pub struct LinodeFactory {
    api_token: Option<String>,
    base_url: Option<String>,
}

impl std::fmt::Debug for LinodeFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinodeFactory")
            .field("api_token", &self.api_token.as_ref().map(|_| "<REDACTED>"))
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl LinodeFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `token` instead of reading the environment
    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    /// Build providers against a different API root
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }
}

impl FirewallProviderFactory for LinodeFactory {
    fn create(&self, _config: &ProviderConfig) -> Result<Box<dyn FirewallProvider>> {
        let token = self
            .api_token
            .clone()
            .or_else(|| std::env::var(TOKEN_ENV).ok())
            .ok_or_else(|| {
                Error::auth(format!("no linode credentials found; set {}", TOKEN_ENV))
            })?;

        let mut provider = LinodeProvider::new(token)?;
        if let Some(ref base_url) = self.base_url {
            provider = provider.with_base_url(base_url.clone());
        }
        Ok(Box::new(provider))
    }
}

/// Register the Linode provider with a registry
///
/// # Example
///
/// ```rust
/// use fwsync_core::ProviderRegistry;
///
/// let registry = ProviderRegistry::new();
/// fwsync_provider_linode::register(&registry);
/// assert!(registry.has_provider("linode"));
/// ```
pub fn register(registry: &fwsync_core::ProviderRegistry) {
    registry.register_provider(PROVIDER_NAME, Box::new(LinodeFactory::new()));
}
