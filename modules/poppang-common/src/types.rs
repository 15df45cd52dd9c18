use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Media kind as the feed reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaType {
    Image,
    CarouselAlbum,
    Video,
    #[default]
    #[serde(other)]
    Unknown,
}

impl MediaType {
    pub fn from_wire(s: &str) -> Self {
        match s {
            "IMAGE" => MediaType::Image,
            "CAROUSEL_ALBUM" => MediaType::CarouselAlbum,
            "VIDEO" => MediaType::Video,
            _ => MediaType::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Image => "IMAGE",
            MediaType::CarouselAlbum => "CAROUSEL_ALBUM",
            MediaType::Video => "VIDEO",
            MediaType::Unknown => "UNKNOWN",
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(self, MediaType::Video)
    }
}

/// A raw feed post. Immutable once fetched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub caption: String,
    pub media_type: MediaType,
    pub permalink: String,
    pub media_urls: Vec<String>,
}

/// Event as produced by extraction, paired with the post it came from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateEvent {
    pub name: String,
    pub start_date: String,
    pub end_date: String,
    pub open_time: Option<String>,
    pub close_time: Option<String>,
    pub address: String,
    pub region: String,
    pub geocoding_query: Option<String>,
    pub caption_summary: String,
    /// Category ids after vocabulary mapping. Never empty.
    pub categories: Vec<i32>,
    pub source_section_index: usize,

    pub post_id: String,
    pub post_url: String,
    pub caption: String,
    pub media_type: MediaType,
    pub image_urls: Vec<String>,
    #[serde(default)]
    pub image_paths: Vec<PathBuf>,
}

impl CandidateEvent {
    /// The geocoding search string: the explicit query when present, else the address.
    pub fn search_query(&self) -> Option<&str> {
        self.geocoding_query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .or_else(|| Some(self.address.trim()).filter(|a| !a.is_empty()))
    }
}

/// A candidate with a resolved location. Coordinates cannot be absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedEvent {
    #[serde(flatten)]
    pub candidate: CandidateEvent,
    pub road_address: String,
    pub longitude: f64,
    pub latitude: f64,
}

/// An event accepted by the store, with its assigned identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedEvent {
    #[serde(flatten)]
    pub event: EnrichedEvent,
    pub event_id: i64,
    pub uuid: Uuid,
    pub stored_image_paths: Vec<String>,
}

impl PersistedEvent {
    pub fn name(&self) -> &str {
        &self.event.candidate.name
    }

    pub fn region(&self) -> &str {
        &self.event.candidate.region
    }

    pub fn summary(&self) -> &str {
        &self.event.candidate.caption_summary
    }
}

/// One user's keyword subscription with their device token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub user_id: i64,
    pub nickname: String,
    pub push_token: String,
    pub keywords: Vec<String>,
}

/// Dedup marker: `user_id` has been alerted about `event_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlertRecord {
    pub user_id: i64,
    pub event_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_media_type_deserializes_to_unknown() {
        let m: MediaType = serde_json::from_str("\"REELS\"").unwrap();
        assert_eq!(m, MediaType::Unknown);
        let m: MediaType = serde_json::from_str("\"CAROUSEL_ALBUM\"").unwrap();
        assert_eq!(m, MediaType::CarouselAlbum);
    }

    #[test]
    fn search_query_prefers_geocoding_query() {
        let mut event = CandidateEvent {
            address: "서울 성동구 연무장길 10".into(),
            geocoding_query: Some("서울 성수 에스팩토리".into()),
            ..Default::default()
        };
        assert_eq!(event.search_query(), Some("서울 성수 에스팩토리"));

        event.geocoding_query = Some("   ".into());
        assert_eq!(event.search_query(), Some("서울 성동구 연무장길 10"));

        event.address.clear();
        assert_eq!(event.search_query(), None);
    }

    #[test]
    fn persisted_event_flattens_into_one_object() {
        let event = PersistedEvent {
            event: EnrichedEvent {
                candidate: CandidateEvent {
                    name: "잼 팝업".into(),
                    categories: vec![3],
                    ..Default::default()
                },
                road_address: "서울 강남구 신반포로 176".into(),
                longitude: 127.004,
                latitude: 37.504,
            },
            event_id: 42,
            uuid: Uuid::nil(),
            stored_image_paths: vec!["/images/a_1.jpg".into()],
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["name"], "잼 팝업");
        assert_eq!(json["event_id"], 42);
        assert_eq!(json["road_address"], "서울 강남구 신반포로 176");

        let back: PersistedEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
