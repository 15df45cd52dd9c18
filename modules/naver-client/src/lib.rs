pub mod error;
pub mod types;

pub use error::{NaverError, Result};
pub use types::LocalItem;

use std::time::Duration;

use types::LocalSearchResponse;

const BASE_URL: &str = "https://openapi.naver.com/v1";

pub struct NaverClient {
    client: reqwest::Client,
    client_id: String,
    client_secret: String,
    base_url: String,
}

impl NaverClient {
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self {
            client: http_client(Duration::from_secs(10)),
            client_id,
            client_secret,
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = http_client(timeout);
        self
    }

    /// Best single place match for a free-text query. `None` is a valid "no match" answer.
    pub async fn search_place(&self, query: &str) -> Result<Option<LocalItem>> {
        let url = format!("{}/search/local.json", self.base_url);
        let resp = self
            .client
            .get(&url)
            .header("X-Naver-Client-Id", &self.client_id)
            .header("X-Naver-Client-Secret", &self.client_secret)
            .query(&[("query", query), ("display", "1")])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(NaverError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let body = resp.text().await?;
        let parsed: LocalSearchResponse = serde_json::from_str(&body)?;
        let item = parsed.items.into_iter().next();
        tracing::debug!(query, matched = item.is_some(), "Naver local search");
        Ok(item)
    }
}

fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}
