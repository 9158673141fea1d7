pub mod notifications;
pub mod preferences;

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Method, RequestBuilder};
use url::Url;

use crate::errors::{EngineError, Result};

/// Thin client for the hosted backend's REST dialect. Filters are query
/// parameters (`column=op.value`), writes go through PATCH/POST with
/// `Prefer` headers. Stateless; repositories share one clone each.
#[derive(Clone)]
pub struct RestClient {
    client: reqwest::Client,
    base: Url,
    api_key: String,
}

impl RestClient {
    pub fn new(api_url: &str, api_key: &str) -> Result<Self> {
        let base = Url::parse(api_url)
            .map_err(|e| anyhow::anyhow!("invalid api url `{}`: {}", api_url, e))?;

        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self {
            client,
            base,
            api_key: api_key.to_string(),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!(
            "{}/rest/v1/{}",
            self.base.as_str().trim_end_matches('/'),
            table
        )
    }

    fn default_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Ok(key) = HeaderValue::from_str(&self.api_key) {
            headers.insert("apikey", key);
        }
        if let Ok(bearer) = HeaderValue::from_str(&format!("Bearer {}", self.api_key)) {
            headers.insert(AUTHORIZATION, bearer);
        }
        headers
    }

    pub(crate) fn request(&self, method: Method, table: &str) -> RequestBuilder {
        self.client
            .request(method, self.table_url(table))
            .headers(self.default_headers())
    }

    /// Maps a non-2xx response into `EngineError::Backend`, carrying the
    /// body so the failure is diagnosable from the error state alone.
    pub(crate) async fn expect_success(resp: reqwest::Response) -> Result<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let message = resp.text().await.unwrap_or_default();
        Err(EngineError::Backend {
            status: status.as_u16(),
            message,
        })
    }
}
