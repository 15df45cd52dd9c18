pub mod error;
pub mod types;

pub use error::{InstagramError, Result};
pub use types::{ChildMedia, MediaItem};

use std::time::Duration;

use serde::de::DeserializeOwned;
use types::{DataEnvelope, HashtagRef};

const BASE_URL: &str = "https://graph.facebook.com/v20.0";

/// Only what becomes part of a `Post`.
const MEDIA_FIELDS: &str = "id,caption,media_type,media_url,permalink,children{media_url,media_type}";

pub struct InstagramClient {
    client: reqwest::Client,
    access_token: String,
    user_id: String,
    base_url: String,
}

impl InstagramClient {
    pub fn new(access_token: String, user_id: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            access_token,
            user_id,
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    async fn get<T: DeserializeOwned>(&self, url: &str, params: &[(&str, &str)]) -> Result<T> {
        let resp = self
            .client
            .get(url)
            .query(&[
                ("user_id", self.user_id.as_str()),
                ("access_token", self.access_token.as_str()),
            ])
            .query(params)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(InstagramError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let body = resp.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Resolve a hashtag's Graph API id. `None` when the hashtag is unknown.
    pub async fn hashtag_id(&self, hashtag: &str) -> Result<Option<String>> {
        let url = format!("{}/ig_hashtag_search", self.base_url);
        let found: DataEnvelope<HashtagRef> = self.get(&url, &[("q", hashtag)]).await?;
        Ok(found.data.into_iter().next().map(|h| h.id))
    }

    /// Most recent media for a hashtag id, newest first.
    pub async fn recent_media(&self, hashtag_id: &str, limit: u32) -> Result<Vec<MediaItem>> {
        let url = format!("{}/{}/recent_media", self.base_url, hashtag_id);
        let limit = limit.to_string();
        let media: DataEnvelope<MediaItem> = self
            .get(&url, &[("fields", MEDIA_FIELDS), ("limit", limit.as_str())])
            .await?;
        Ok(media.data)
    }

    /// Hashtag search end-to-end: resolve the id, fetch recent media, keep image posts.
    pub async fn hashtag_posts(&self, hashtag: &str, limit: u32) -> Result<Vec<MediaItem>> {
        tracing::info!(hashtag, limit, "Starting Instagram hashtag fetch");

        let Some(hashtag_id) = self.hashtag_id(hashtag).await? else {
            tracing::warn!(hashtag, "Hashtag id not found");
            return Ok(Vec::new());
        };

        let media = self.recent_media(&hashtag_id, limit).await?;
        let total = media.len();
        let posts: Vec<MediaItem> = media.into_iter().filter(|m| m.is_image_like()).collect();
        tracing::info!(
            hashtag_id = %hashtag_id,
            total,
            kept = posts.len(),
            "Fetched Instagram hashtag media"
        );

        Ok(posts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_fields_request_only_post_attributes() {
        let top_level: Vec<&str> = MEDIA_FIELDS
            .split('{')
            .next()
            .unwrap_or_default()
            .split(',')
            .collect();
        assert_eq!(
            top_level,
            vec!["id", "caption", "media_type", "media_url", "permalink", "children"]
        );
    }
}
