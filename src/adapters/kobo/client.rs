//! KoboToolbox REST client
//!
//! Token-authenticated HTTP client implementing [`Paginator`] over the
//! `{count, next, previous, results}` list endpoints.

use super::hooks::log_response;
use super::models::PageEnvelope;
use super::paginator::{Page, PageRequest, Paginator};
use crate::config::{KoboConfig, SecretString};
use crate::domain::{KoboError, Result};
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use secrecy::ExposeSecret;
use std::time::Duration;
use url::Url;

/// KoboToolbox API client
///
/// # Example
///
/// ```no_run
/// use harvest::adapters::kobo::{KoboClient, PageRequest, Paginator};
/// use harvest::config::{secret_string, KoboConfig};
///
/// # async fn example() -> harvest::domain::Result<()> {
/// let config = KoboConfig {
///     base_url: "https://kf.kobotoolbox.org".to_string(),
///     token: secret_string("token".to_string()),
///     project_view: "pv123".to_string(),
///     timeout_seconds: 60,
///     page_size: 5000,
///     ignored_status_codes: vec![404, 502],
///     enable_http_logging: true,
/// };
/// let client = KoboClient::new(&config)?;
/// let page = client
///     .fetch_page(&PageRequest::new("kobo_asset", "/api/v2/assets/"))
///     .await?;
/// println!("{} assets", page.results.len());
/// # Ok(())
/// # }
/// ```
pub struct KoboClient {
    base_url: String,
    token: SecretString,
    client: Client,
    /// Same settings, but never follows redirects
    no_redirect_client: Client,
    http_logging: bool,
}

impl KoboClient {
    /// Build a client from configuration
    ///
    /// # Errors
    ///
    /// Returns `Transport` if the base URL is invalid or the HTTP client cannot be built.
    pub fn new(config: &KoboConfig) -> Result<Self> {
        Url::parse(&config.base_url)
            .map_err(|e| KoboError::InvalidUrl(format!("{}: {e}", config.base_url)))?;

        let timeout = Duration::from_secs(config.timeout_seconds);
        let client = ClientBuilder::new()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(KoboError::from)?;
        let no_redirect_client = ClientBuilder::new()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(30))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(KoboError::from)?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            client,
            no_redirect_client,
            http_logging: config.enable_http_logging,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn auth_header_value(&self) -> String {
        format!("Token {}", self.token.expose_secret().as_ref())
    }

    /// Absolute URL of a request, with its query parameters
    fn resolve(&self, request: &PageRequest) -> std::result::Result<Url, KoboError> {
        let raw = if request.is_absolute() {
            request.url.clone()
        } else if request.url.starts_with('/') {
            format!("{}{}", self.base_url, request.url)
        } else {
            format!("{}/{}", self.base_url, request.url)
        };

        let mut url = Url::parse(&raw).map_err(|e| KoboError::InvalidUrl(format!("{raw}: {e}")))?;
        if !request.params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &request.params {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// Verify that the server is reachable and the token is accepted
    ///
    /// # Errors
    ///
    /// Returns `Transport` if the request fails or the server rejects it.
    pub async fn health_check(&self) -> Result<()> {
        let request = PageRequest::new("health", "/api/v2/assets/").params(vec![
            ("format".to_string(), "json".to_string()),
            ("limit".to_string(), "1".to_string()),
        ]);

        match self.fetch_page(&request).await {
            Ok(_) => {
                tracing::info!(base_url = %self.base_url, "Kobo server health check passed");
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    base_url = %self.base_url,
                    error = %e,
                    "Kobo server health check failed"
                );
                Err(e)
            }
        }
    }

    /// Send a GET for `request`, accepting the `accept` media type
    ///
    /// Returns `None` for an ignored status, the response for a success, and
    /// an error for anything else.
    async fn send(
        &self,
        request: &PageRequest,
        accept: &str,
    ) -> Result<Option<(Url, reqwest::Response)>> {
        let url = self.resolve(request)?;
        let client = if request.allow_redirects {
            &self.client
        } else {
            &self.no_redirect_client
        };

        tracing::debug!(resource = %request.resource, url = %url, "Fetching page");

        let response = client
            .get(url.clone())
            .header("Authorization", self.auth_header_value())
            .header("Accept", accept)
            .send()
            .await
            .map_err(KoboError::from)?;

        let status = response.status();
        if self.http_logging {
            log_response(
                &request.resource,
                "GET",
                url.as_str(),
                status.as_u16(),
                status.canonical_reason().unwrap_or(""),
            );
        }

        if request.ignored_status_codes.contains(&status.as_u16()) {
            tracing::warn!(
                resource = %request.resource,
                status = status.as_u16(),
                url = %url,
                "Ignoring response status, ending pagination"
            );
            return Ok(None);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(KoboError::UnexpectedStatus {
                status: status.as_u16(),
                url: url.to_string(),
                body,
            }
            .into());
        }

        Ok(Some((url, response)))
    }
}

#[async_trait]
impl Paginator for KoboClient {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Page> {
        let Some((url, response)) = self.send(request, "application/json").await? else {
            return Ok(Page::empty());
        };

        let body = response.text().await.map_err(KoboError::from)?;
        let envelope: PageEnvelope = serde_json::from_str(&body).map_err(|e| {
            KoboError::InvalidResponse(format!("{url}: {e}"))
        })?;

        tracing::debug!(
            resource = %request.resource,
            records = envelope.results.len(),
            count = ?envelope.count,
            has_next = envelope.next.is_some(),
            "Fetched page"
        );

        Ok(Page {
            results: envelope.results,
            next: envelope.next,
            count: envelope.count,
        })
    }

    async fn fetch_bytes(&self, request: &PageRequest) -> Result<Vec<u8>> {
        let Some((url, response)) = self.send(request, "*/*").await? else {
            return Ok(Vec::new());
        };

        let body = response.bytes().await.map_err(KoboError::from)?;
        tracing::debug!(
            resource = %request.resource,
            url = %url,
            bytes = body.len(),
            "Downloaded file"
        );
        Ok(body.to_vec())
    }
}
