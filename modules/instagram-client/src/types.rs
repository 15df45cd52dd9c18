use serde::Deserialize;

/// Graph API list envelope: `{"data": [...]}`.
#[derive(Debug, Clone, Deserialize)]
pub struct DataEnvelope<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HashtagRef {
    pub id: String,
}

/// A single media object from `/{hashtag-id}/recent_media`.
#[derive(Debug, Clone, Deserialize)]
pub struct MediaItem {
    pub id: String,
    pub caption: Option<String>,
    pub media_type: String,
    pub media_url: Option<String>,
    #[serde(default)]
    pub permalink: String,
    pub children: Option<DataEnvelope<ChildMedia>>,
}

/// A carousel child.
#[derive(Debug, Clone, Deserialize)]
pub struct ChildMedia {
    pub media_url: Option<String>,
    pub media_type: Option<String>,
}

impl MediaItem {
    /// Images and carousels carry event imagery; videos and reels do not.
    pub fn is_image_like(&self) -> bool {
        matches!(self.media_type.as_str(), "IMAGE" | "CAROUSEL_ALBUM")
    }

    /// Resolved media URLs: carousel children in order, otherwise the item's own URL.
    pub fn media_urls(&self) -> Vec<String> {
        match (&self.children, self.media_type.as_str()) {
            (Some(children), "CAROUSEL_ALBUM") => children
                .data
                .iter()
                .filter_map(|c| c.media_url.clone())
                .collect(),
            _ => self.media_url.iter().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn carousel_urls_come_from_children() {
        let item: MediaItem = serde_json::from_str(
            r#"{
                "id": "1",
                "caption": "pop-up",
                "media_type": "CAROUSEL_ALBUM",
                "media_url": "https://cdn/cover.jpg",
                "permalink": "https://instagram.com/p/1",
                "timestamp": "2025-10-21T09:00:00+0000",
                "like_count": 12,
                "children": {"data": [
                    {"media_url": "https://cdn/a.jpg", "media_type": "IMAGE"},
                    {"media_type": "VIDEO"},
                    {"media_url": "https://cdn/b.jpg", "media_type": "IMAGE"}
                ]}
            }"#,
        )
        .unwrap();

        assert!(item.is_image_like());
        assert_eq!(item.media_urls(), vec!["https://cdn/a.jpg", "https://cdn/b.jpg"]);
    }

    #[test]
    fn video_is_not_image_like() {
        let item: MediaItem = serde_json::from_str(
            r#"{"id": "2", "media_type": "VIDEO", "media_url": "https://cdn/v.mp4"}"#,
        )
        .unwrap();
        assert!(!item.is_image_like());
        assert_eq!(item.media_urls(), vec!["https://cdn/v.mp4"]);
    }
}
