//! HTTP client for the vendor endpoint.

use std::time::Duration;

use reqwest::header;

use super::types::UpstreamPayload;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::store::ActiveCredential;

/// The vendor expects a browser-looking user agent.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Client for the fixed vendor endpoint. One instance is shared across all
/// requests; the credential is supplied per call from the request's
/// snapshot.
pub struct UpstreamClient {
    http: reqwest::Client,
    url: String,
    timeout: Duration,
    debug: bool,
}

impl UpstreamClient {
    pub fn new(config: &Config) -> Result<Self> {
        let mut builder = reqwest::Client::builder().connect_timeout(Duration::from_secs(10));
        if let Some(proxy_url) = &config.proxy_url {
            builder = builder.proxy(reqwest::Proxy::all(proxy_url)?);
        }

        Ok(UpstreamClient {
            http: builder.build()?,
            url: config.upstream_url.clone(),
            timeout: config.request_timeout,
            debug: config.debug,
        })
    }

    /// POST a generation request. Single attempt, fixed deadline, no retry.
    ///
    /// A non-success status is returned as [`Error::Upstream`] carrying the
    /// exact status code and body text.
    pub async fn generate(
        &self,
        credential: &ActiveCredential,
        payload: &UpstreamPayload,
        stream: bool,
    ) -> Result<reqwest::Response> {
        let mut query: Vec<(&str, &str)> = vec![("configId", credential.config_id.as_str())];
        if stream {
            query.push(("stream", "true"));
        }

        if self.debug {
            tracing::debug!(
                url = %self.url,
                payload = %serde_json::to_string(payload).unwrap_or_default(),
                "Sending upstream request"
            );
        }

        let response = self
            .http
            .post(&self.url)
            .query(&query)
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", credential.bearer_token.expose_secret()),
            )
            .header(header::USER_AGENT, USER_AGENT)
            .json(payload)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Upstream returned error");
            return Err(Error::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }
}
