//! Provider endpoint configuration shared by all adapter crates.

use std::fmt;

use crate::error::AiError;

/// Connection settings for one provider.
///
/// Use struct-update syntax with [`Default`]:
///
/// ```rust
/// use threadkit::ProviderConfig;
///
/// let config = ProviderConfig {
///     name: "anthropic".into(),
///     base_url: "https://api.anthropic.com".into(),
///     api_key: "sk-ant-...".into(),
///     ..Default::default()
/// };
/// ```
#[derive(Clone, Default)]
pub struct ProviderConfig {
    /// Short provider name (e.g. `"anthropic"`, `"groq"`). Adapters embed
    /// it in their [`Adapter::name`](crate::Adapter::name).
    pub name: String,
    /// Base URL combined with the adapter's default endpoint path when
    /// [`endpoint`](Self::endpoint) is empty.
    pub base_url: String,
    /// Full endpoint URL. When set, takes precedence over
    /// [`base_url`](Self::base_url) — useful for proxies and tests.
    pub endpoint: String,
    /// API key; sent as a header or query parameter depending on the
    /// adapter.
    pub api_key: String,
    /// Provider-specific label of the server-side web-search tool. The
    /// tool is only offered when this is non-empty.
    pub web_search_tool: String,
    /// Provider-specific label of the server-side web-fetch tool. The
    /// tool is only offered when this is non-empty.
    pub web_fetch_tool: String,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("endpoint", &self.endpoint)
            .field("api_key", &"[REDACTED]")
            .field("web_search_tool", &self.web_search_tool)
            .field("web_fetch_tool", &self.web_fetch_tool)
            .finish()
    }
}

impl ProviderConfig {
    /// Resolves the URL to call: [`endpoint`](Self::endpoint) verbatim
    /// when set, otherwise [`base_url`](Self::base_url) joined with
    /// `default_path`.
    pub fn resolve_endpoint(&self, default_path: &str) -> Result<String, AiError> {
        let endpoint = self.endpoint.trim();
        if !endpoint.is_empty() {
            return Ok(endpoint.to_string());
        }
        let base = self.base_url.trim();
        if base.is_empty() {
            return Err(AiError::configuration(
                &self.name,
                "missing base_url/endpoint",
            ));
        }
        if default_path.is_empty() {
            return Err(AiError::configuration(&self.name, "missing default path"));
        }
        Ok(format!(
            "{}/{}",
            base.trim_end_matches('/'),
            default_path.trim_start_matches('/')
        ))
    }
}
