use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};

use crate::config::FlavorDbSettings;
use crate::error::HarvestError;

/// Outcome of a single FlavorDB request. Failures are values here; the sweep
/// decides which of them count as "not found".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawResult {
    Ok {
        body: Vec<u8>,
        content_type: Option<String>,
    },
    HttpError(u16),
    TransportError(String),
}

pub trait EntityFetcher: Send + Sync {
    fn fetch(&self, id: u32) -> RawResult;
}

/// Stands in for the HTTP client on runs that never contact FlavorDB
/// (FlavorGraph only, or extract-only), so no client is built.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineFetcher;

impl EntityFetcher for OfflineFetcher {
    fn fetch(&self, _id: u32) -> RawResult {
        RawResult::TransportError("FlavorDB requests are disabled for this run".to_string())
    }
}

#[derive(Clone)]
pub struct FlavorDbHttpClient {
    client: Client,
    api_base: String,
}

impl FlavorDbHttpClient {
    pub fn new(settings: &FlavorDbSettings) -> Result<Self, HarvestError> {
        Self::with_options(&settings.api_base, &settings.user_agent, settings.timeout)
    }

    pub fn with_options(
        api_base: &str,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<Self, HarvestError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(user_agent).map_err(|err| HarvestError::Http(err.to_string()))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        // The FlavorDB host serves a certificate chain that fails verification.
        tracing::warn!(api_base, "TLS certificate verification is disabled for FlavorDB");
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|err| HarvestError::Http(err.to_string()))?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    pub fn entity_url(&self, id: u32) -> String {
        entity_url(&self.api_base, id)
    }
}

pub fn entity_url(api_base: &str, id: u32) -> String {
    format!("{}/entities_json?id={id}", api_base.trim_end_matches('/'))
}

impl EntityFetcher for FlavorDbHttpClient {
    fn fetch(&self, id: u32) -> RawResult {
        let url = self.entity_url(id);
        let response = match self.client.get(&url).send() {
            Ok(response) => response,
            Err(err) => return RawResult::TransportError(err.to_string()),
        };
        let status = response.status();
        if !status.is_success() {
            return RawResult::HttpError(status.as_u16());
        }
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());
        match response.bytes() {
            Ok(bytes) => RawResult::Ok {
                body: bytes.to_vec(),
                content_type,
            },
            Err(err) => RawResult::TransportError(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_layout() {
        assert_eq!(
            entity_url("https://cosylab.iiitd.edu.in/flavordb2/", 42),
            "https://cosylab.iiitd.edu.in/flavordb2/entities_json?id=42"
        );
    }

    #[test]
    fn offline_fetcher_never_succeeds() {
        assert!(matches!(OfflineFetcher.fetch(0), RawResult::TransportError(_)));
    }
}
