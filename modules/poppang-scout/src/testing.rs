// Test mocks for the scout pipeline.
//
// One mock per trait boundary:
// - MockPostSource (PostSource): tag → posts
// - MockOracle (TextOracle): scripted responses in call order
// - MockGeocoder (Geocoder): query → match, plus failing queries
// - MockModerator (ImageModerator): image bytes → inspection
// - MockImageFetcher (ImageFetcher): URL → response
// - MockConnector (StoreConnector): stateful in-memory store shared across connects
// - MockPush (PushSender): records deliveries
//
// Plus builders for posts, events and subscriptions.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use uuid::Uuid;

use poppang_common::{
    AlertRecord, CandidateEvent, EnrichedEvent, MediaType, PersistedEvent, Post, Subscription,
};
use poppang_store::NewPopup;

use crate::traits::{
    FetchedImage, GeoMatch, Geocoder, ImageFetcher, ImageInspection, ImageModerator, PopupStore,
    PostSource, PushSender, StoreConnector, TextOracle,
};

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn post(id: &str, caption: &str) -> Post {
    Post {
        id: id.to_string(),
        caption: caption.to_string(),
        media_type: MediaType::Image,
        permalink: format!("https://www.instagram.com/p/{id}/"),
        media_urls: vec![format!("https://cdn/{id}.jpg")],
    }
}

/// A candidate with every required field populated.
pub fn candidate(name: &str) -> CandidateEvent {
    CandidateEvent {
        name: name.to_string(),
        start_date: "2025-10-07".to_string(),
        end_date: "2025-10-13".to_string(),
        open_time: Some("10:30".to_string()),
        close_time: Some("20:00".to_string()),
        address: "서울 성동구 연무장길 10".to_string(),
        region: "서울".to_string(),
        geocoding_query: Some(format!("서울 성수 {name}")),
        caption_summary: format!("{name} 소개"),
        categories: vec![4],
        source_section_index: 0,
        post_id: "p-1".to_string(),
        post_url: "https://www.instagram.com/p/p-1/".to_string(),
        caption: format!("{name} 오픈!"),
        media_type: MediaType::Image,
        image_urls: vec!["https://cdn/p-1.jpg".to_string()],
        image_paths: Vec::new(),
    }
}

pub fn enriched(name: &str) -> EnrichedEvent {
    EnrichedEvent {
        candidate: candidate(name),
        road_address: "서울 성동구 연무장길 10".to_string(),
        longitude: 127.0557,
        latitude: 37.5443,
    }
}

pub fn persisted(event_id: i64, name: &str) -> PersistedEvent {
    PersistedEvent {
        event: enriched(name),
        event_id,
        uuid: Uuid::new_v4(),
        stored_image_paths: vec!["https://cdn/p-1.jpg".to_string()],
    }
}

pub fn subscription(user_id: i64, keywords: &[&str]) -> Subscription {
    Subscription {
        user_id,
        nickname: format!("user{user_id}"),
        push_token: format!("token-{user_id}"),
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
    }
}

// ---------------------------------------------------------------------------
// MockPostSource
// ---------------------------------------------------------------------------

/// Returns `Err` for unregistered tags.
#[derive(Default)]
pub struct MockPostSource {
    posts: HashMap<String, Vec<Post>>,
}

impl MockPostSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_tag(mut self, tag: &str, posts: Vec<Post>) -> Self {
        self.posts.insert(tag.to_string(), posts);
        self
    }
}

#[async_trait]
impl PostSource for MockPostSource {
    async fn recent_posts(&self, tag: &str, _limit: u32) -> Result<Vec<Post>> {
        self.posts
            .get(tag)
            .cloned()
            .ok_or_else(|| anyhow!("MockPostSource: no posts registered for {tag}"))
    }
}

// ---------------------------------------------------------------------------
// MockOracle
// ---------------------------------------------------------------------------

/// Answers calls from a script, in order. `None` entries are transport failures.
#[derive(Default)]
pub struct MockOracle {
    script: Mutex<VecDeque<Option<String>>>,
    prompts: Mutex<Vec<String>>,
}

impl MockOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, text: &str) -> Self {
        self.script.lock().unwrap().push_back(Some(text.to_string()));
        self
    }

    pub fn fail(self) -> Self {
        self.script.lock().unwrap().push_back(None);
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextOracle for MockOracle {
    async fn complete(&self, _system: &str, prompt: &str, _max_tokens: u32) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match self.script.lock().unwrap().pop_front() {
            Some(Some(text)) => Ok(text),
            Some(None) => bail!("MockOracle: scripted failure"),
            None => bail!("MockOracle: no response scripted"),
        }
    }
}

// ---------------------------------------------------------------------------
// MockGeocoder
// ---------------------------------------------------------------------------

/// Unregistered queries resolve to "no match".
#[derive(Default)]
pub struct MockGeocoder {
    matches: HashMap<String, GeoMatch>,
    failing: HashSet<String>,
    queries: Mutex<Vec<String>>,
}

impl MockGeocoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_query(mut self, query: &str, m: GeoMatch) -> Self {
        self.matches.insert(query.to_string(), m);
        self
    }

    pub fn failing_on(mut self, query: &str) -> Self {
        self.failing.insert(query.to_string());
        self
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl Geocoder for MockGeocoder {
    async fn geocode(&self, query: &str) -> Result<Option<GeoMatch>> {
        self.queries.lock().unwrap().push(query.to_string());
        if self.failing.contains(query) {
            bail!("MockGeocoder: scripted failure for {query}");
        }
        Ok(self.matches.get(query).cloned())
    }
}

// ---------------------------------------------------------------------------
// MockModerator
// ---------------------------------------------------------------------------

/// Unregistered images come back clean (no faces, no labels).
#[derive(Default)]
pub struct MockModerator {
    by_bytes: HashMap<Vec<u8>, ImageInspection>,
    fail: bool,
    batches: Mutex<Vec<usize>>,
}

impl MockModerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_bytes(mut self, bytes: &[u8], inspection: ImageInspection) -> Self {
        self.by_bytes.insert(bytes.to_vec(), inspection);
        self
    }

    /// Every request fails at the transport level.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Size of each request made, including failed ones.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageModerator for MockModerator {
    async fn inspect(&self, images: &[Vec<u8>]) -> Result<Vec<ImageInspection>> {
        self.batches.lock().unwrap().push(images.len());
        if self.fail {
            bail!("MockModerator: scripted failure");
        }
        Ok(images
            .iter()
            .map(|b| self.by_bytes.get(b).cloned().unwrap_or_default())
            .collect())
    }
}

// ---------------------------------------------------------------------------
// MockImageFetcher
// ---------------------------------------------------------------------------

/// Returns `Err` for unregistered URLs.
#[derive(Default)]
pub struct MockImageFetcher {
    responses: HashMap<String, FetchedImage>,
    requested: Mutex<Vec<String>>,
}

impl MockImageFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_image(self, url: &str, bytes: &[u8]) -> Self {
        self.on_response(url, 200, Some("image/jpeg"), bytes)
    }

    pub fn on_status(self, url: &str, status: u16) -> Self {
        self.on_response(url, status, Some("text/html"), b"")
    }

    pub fn on_content_type(self, url: &str, content_type: &str) -> Self {
        self.on_response(url, 200, Some(content_type), b"not-an-image")
    }

    pub fn on_response(
        mut self,
        url: &str,
        status: u16,
        content_type: Option<&str>,
        bytes: &[u8],
    ) -> Self {
        self.responses.insert(
            url.to_string(),
            FetchedImage {
                status,
                content_type: content_type.map(str::to_string),
                bytes: bytes.to_vec(),
            },
        );
        self
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageFetcher for MockImageFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedImage> {
        self.requested.lock().unwrap().push(url.to_string());
        self.responses
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow!("MockImageFetcher: no response registered for {url}"))
    }
}

// ---------------------------------------------------------------------------
// MockConnector / MockStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct StoreInner {
    popups: Vec<NewPopup>,
    next_id: i64,
    alerts: Vec<AlertRecord>,
    subscriptions: Vec<Subscription>,
    fail_images_for: HashSet<String>,
    fail_connect: bool,
    connects: u32,
    closes: u32,
}

/// In-memory store state, shared by every store the connector opens.
#[derive(Default)]
pub struct MockStoreState {
    inner: Mutex<StoreInner>,
}

impl MockStoreState {
    /// Make the image insert fail for popups with this name, rolling back the unit.
    pub fn fail_images_for(&self, name: &str) {
        self.inner
            .lock()
            .unwrap()
            .fail_images_for
            .insert(name.to_string());
    }

    pub fn fail_connect(&self, fail: bool) {
        self.inner.lock().unwrap().fail_connect = fail;
    }

    pub fn add_subscription(&self, sub: Subscription) {
        self.inner.lock().unwrap().subscriptions.push(sub);
    }

    pub fn popups(&self) -> Vec<NewPopup> {
        self.inner.lock().unwrap().popups.clone()
    }

    pub fn alerts(&self) -> Vec<AlertRecord> {
        self.inner.lock().unwrap().alerts.clone()
    }

    pub fn connects(&self) -> u32 {
        self.inner.lock().unwrap().connects
    }

    pub fn closes(&self) -> u32 {
        self.inner.lock().unwrap().closes
    }
}

/// Clones share the same state.
#[derive(Default, Clone)]
pub struct MockConnector {
    state: Arc<MockStoreState>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &MockStoreState {
        &self.state
    }
}

#[async_trait]
impl StoreConnector for MockConnector {
    async fn connect(&self) -> Result<Box<dyn PopupStore>> {
        let mut inner = self.state.inner.lock().unwrap();
        if inner.fail_connect {
            bail!("MockConnector: connection refused");
        }
        inner.connects += 1;
        Ok(Box::new(MockStore {
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockStore {
    state: Arc<MockStoreState>,
}

#[async_trait]
impl PopupStore for MockStore {
    async fn insert_popup(&self, popup: &NewPopup) -> Result<(i64, Uuid)> {
        let mut inner = self.state.inner.lock().unwrap();
        if inner.fail_images_for.contains(&popup.name) {
            bail!("MockStore: image insert failed for {}", popup.name);
        }
        inner.next_id += 1;
        let id = inner.next_id;
        inner.popups.push(popup.clone());
        Ok((id, Uuid::new_v4()))
    }

    async fn active_subscriptions(&self) -> Result<Vec<Subscription>> {
        Ok(self.state.inner.lock().unwrap().subscriptions.clone())
    }

    async fn record_alert(&self, user_id: i64, event_id: i64) -> Result<bool> {
        let mut inner = self.state.inner.lock().unwrap();
        let record = AlertRecord { user_id, event_id };
        if inner.alerts.contains(&record) {
            return Ok(false);
        }
        inner.alerts.push(record);
        Ok(true)
    }

    async fn close(self: Box<Self>) {
        self.state.inner.lock().unwrap().closes += 1;
    }
}

// ---------------------------------------------------------------------------
// MockPush
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentPush {
    pub token: String,
    pub title: String,
    pub body: String,
}

/// Records accepted pushes. A failing mock rejects every send.
#[derive(Default)]
pub struct MockPush {
    sent: Mutex<Vec<SentPush>>,
    fail: bool,
}

impl MockPush {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn sent(&self) -> Vec<SentPush> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl PushSender for MockPush {
    async fn send(&self, device_token: &str, title: &str, body: &str) -> Result<()> {
        if self.fail {
            bail!("MockPush: delivery rejected");
        }
        self.sent.lock().unwrap().push(SentPush {
            token: device_token.to_string(),
            title: title.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

/// Lets a test keep a handle on a mock after boxing it into `ScoutDeps`.
pub struct Shared<T>(pub Arc<T>);

#[async_trait]
impl PushSender for Shared<MockPush> {
    async fn send(&self, device_token: &str, title: &str, body: &str) -> Result<()> {
        self.0.send(device_token, title, body).await
    }
}

#[async_trait]
impl TextOracle for Shared<MockOracle> {
    async fn complete(&self, system: &str, prompt: &str, max_tokens: u32) -> Result<String> {
        self.0.complete(system, prompt, max_tokens).await
    }
}

#[async_trait]
impl Geocoder for Shared<MockGeocoder> {
    async fn geocode(&self, query: &str) -> Result<Option<GeoMatch>> {
        self.0.geocode(query).await
    }
}

#[async_trait]
impl ImageModerator for Shared<MockModerator> {
    async fn inspect(&self, images: &[Vec<u8>]) -> Result<Vec<ImageInspection>> {
        self.0.inspect(images).await
    }
}
