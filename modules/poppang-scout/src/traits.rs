// Trait seams for every external collaborator the pipeline talks to.
//
// Each trait has a production impl over its client crate here, and an
// in-memory mock in `testing.rs` so the stages run without network,
// database or Docker.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use uuid::Uuid;

use poppang_common::{MediaType, Post, Subscription};
use poppang_store::{NewPopup, PgStore};

// ---------------------------------------------------------------------------
// PostSource: the social feed
// ---------------------------------------------------------------------------

#[async_trait]
pub trait PostSource: Send + Sync {
    /// Recent image/carousel posts for a tag, media URLs resolved.
    async fn recent_posts(&self, tag: &str, limit: u32) -> Result<Vec<Post>>;
}

#[async_trait]
impl PostSource for instagram_client::InstagramClient {
    async fn recent_posts(&self, tag: &str, limit: u32) -> Result<Vec<Post>> {
        let items = self.hashtag_posts(tag, limit).await?;
        Ok(items
            .into_iter()
            .map(|item| {
                let media_urls = item.media_urls();
                Post {
                    media_type: MediaType::from_wire(&item.media_type),
                    caption: item.caption.unwrap_or_default(),
                    permalink: item.permalink,
                    id: item.id,
                    media_urls,
                }
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// TextOracle: extraction LLM
// ---------------------------------------------------------------------------

#[async_trait]
pub trait TextOracle: Send + Sync {
    /// Zero-temperature completion; returns the raw response text.
    async fn complete(&self, system: &str, prompt: &str, max_tokens: u32) -> Result<String>;
}

#[async_trait]
impl TextOracle for ai_client::OpenAi {
    async fn complete(&self, system: &str, prompt: &str, max_tokens: u32) -> Result<String> {
        let options = ai_client::ChatOptions {
            temperature: 0.0,
            max_tokens,
        };
        Ok(self.chat_completion(system, prompt, options).await?)
    }
}

// ---------------------------------------------------------------------------
// Geocoder
// ---------------------------------------------------------------------------

/// Best match for a free-text place query. Any field may be missing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeoMatch {
    pub address: Option<String>,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    /// `Ok(None)` means the oracle found nothing, which is a valid answer.
    async fn geocode(&self, query: &str) -> Result<Option<GeoMatch>>;
}

#[async_trait]
impl Geocoder for naver_client::NaverClient {
    async fn geocode(&self, query: &str) -> Result<Option<GeoMatch>> {
        let item = self.search_place(query).await?;
        Ok(item.map(|item| GeoMatch {
            address: item.best_address().map(str::to_string),
            longitude: item.longitude(),
            latitude: item.latitude(),
        }))
    }
}

// ---------------------------------------------------------------------------
// ImageModerator: vision oracle
// ---------------------------------------------------------------------------

/// What the vision oracle saw in one image.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageInspection {
    pub faces: usize,
    pub labels: Vec<String>,
    /// Per-image oracle error; the other fields are meaningless when set.
    pub error: Option<String>,
}

#[async_trait]
pub trait ImageModerator: Send + Sync {
    /// One inspection per input image, in input order.
    async fn inspect(&self, images: &[Vec<u8>]) -> Result<Vec<ImageInspection>>;
}

#[async_trait]
impl ImageModerator for vision_client::VisionClient {
    async fn inspect(&self, images: &[Vec<u8>]) -> Result<Vec<ImageInspection>> {
        let responses = self.annotate_faces_and_labels(images).await?;
        Ok(responses
            .into_iter()
            .map(|r| ImageInspection {
                faces: r.face_annotations.len(),
                labels: r
                    .label_annotations
                    .into_iter()
                    .map(|l| l.description)
                    .collect(),
                error: r.error.map(|s| format!("{} ({})", s.message, s.code)),
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// ImageFetcher: plain HTTP downloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub status: u16,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedImage>;
}

pub struct HttpImageFetcher {
    client: reqwest::Client,
}

impl HttpImageFetcher {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedImage> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = resp.bytes().await?.to_vec();
        Ok(FetchedImage {
            status,
            content_type,
            bytes,
        })
    }
}

// ---------------------------------------------------------------------------
// PopupStore: relational store, opened per stage
// ---------------------------------------------------------------------------

#[async_trait]
pub trait PopupStore: Send + Sync {
    /// Transactional insert of popup + images + categories. Returns `(id, uuid)`.
    async fn insert_popup(&self, popup: &NewPopup) -> Result<(i64, Uuid)>;

    /// Active subscriptions, one per user with grouped keywords.
    async fn active_subscriptions(&self) -> Result<Vec<Subscription>>;

    /// Conditional insert of an alert record. `false` if it already existed.
    async fn record_alert(&self, user_id: i64, event_id: i64) -> Result<bool>;

    async fn close(self: Box<Self>);
}

#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn PopupStore>>;
}

#[async_trait]
impl PopupStore for PgStore {
    async fn insert_popup(&self, popup: &NewPopup) -> Result<(i64, Uuid)> {
        Ok(PgStore::insert_popup(self, popup).await?)
    }

    async fn active_subscriptions(&self) -> Result<Vec<Subscription>> {
        Ok(PgStore::active_subscriptions(self).await?)
    }

    async fn record_alert(&self, user_id: i64, event_id: i64) -> Result<bool> {
        Ok(PgStore::record_alert(self, user_id, event_id).await?)
    }

    async fn close(self: Box<Self>) {
        PgStore::close(*self).await;
    }
}

/// Opens a fresh single-connection Postgres store per stage.
pub struct PgConnector {
    database_url: String,
}

impl PgConnector {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
        }
    }
}

#[async_trait]
impl StoreConnector for PgConnector {
    async fn connect(&self) -> Result<Box<dyn PopupStore>> {
        let store = PgStore::connect(&self.database_url)
            .await
            .context("Failed to connect to Postgres")?;
        store.migrate().await.context("Failed to run migrations")?;
        Ok(Box::new(store))
    }
}

// ---------------------------------------------------------------------------
// PushSender
// ---------------------------------------------------------------------------

#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send(&self, device_token: &str, title: &str, body: &str) -> Result<()>;
}

#[async_trait]
impl PushSender for fcm_client::FcmClient {
    async fn send(&self, device_token: &str, title: &str, body: &str) -> Result<()> {
        let name = fcm_client::FcmClient::send(self, device_token, title, body).await?;
        tracing::debug!(message = %name, "Push accepted");
        Ok(())
    }
}
