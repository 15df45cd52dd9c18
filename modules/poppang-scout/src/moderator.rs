//! Vision moderation: drop events whose imagery shows people.
//!
//! An event passes only on a conclusive clean verdict. Images the oracle could
//! not judge are inconclusive, and an event with no conclusive image is skipped.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use poppang_common::{EnrichedEvent, ModerationConfig, Vocabulary};

use crate::retry::with_retry;
use crate::run_log::{EventKind, RunLog};
use crate::stats::RunStats;
use crate::traits::{ImageFetcher, ImageInspection, ImageModerator};

const SENDABLE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Outcome of moderating one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Reject(String),
    /// No image produced a conclusive result.
    Inconclusive(String),
}

#[derive(Debug, Clone)]
enum ImageSource {
    Local(PathBuf),
    Remote(String),
}

impl ImageSource {
    fn describe(&self) -> String {
        match self {
            ImageSource::Local(p) => p.display().to_string(),
            ImageSource::Remote(u) => u.clone(),
        }
    }
}

/// Verdict for a single inspected image: `Some(reason)` when it shows people.
pub fn depicts_people(inspection: &ImageInspection, vocab: &Vocabulary) -> Option<String> {
    if inspection.faces > 0 {
        return Some(format!("{} face(s) detected", inspection.faces));
    }
    inspection
        .labels
        .iter()
        .find(|label| vocab.is_human_label(label))
        .map(|label| format!("label \"{label}\""))
}

pub struct ContentModerator<'a> {
    moderator: &'a dyn ImageModerator,
    images: &'a dyn ImageFetcher,
    vocab: &'a Vocabulary,
    config: &'a ModerationConfig,
}

impl<'a> ContentModerator<'a> {
    pub fn new(
        moderator: &'a dyn ImageModerator,
        images: &'a dyn ImageFetcher,
        vocab: &'a Vocabulary,
        config: &'a ModerationConfig,
    ) -> Self {
        Self {
            moderator,
            images,
            vocab,
            config,
        }
    }

    /// Keep only events with a conclusive clean verdict (or video events).
    pub async fn moderate(
        &self,
        events: Vec<EnrichedEvent>,
        stats: &mut RunStats,
        run_log: &mut RunLog,
    ) -> Vec<EnrichedEvent> {
        let mut passed = Vec::with_capacity(events.len());

        for event in events {
            let name = event.candidate.name.clone();
            let verdict = self.judge(&event).await;

            let (label, reason) = match &verdict {
                Verdict::Pass => ("pass", None),
                Verdict::Reject(r) => ("reject", Some(r.clone())),
                Verdict::Inconclusive(r) => ("inconclusive", Some(r.clone())),
            };
            run_log.log(EventKind::Moderation {
                name: name.clone(),
                verdict: label.to_string(),
                reason,
            });

            match verdict {
                Verdict::Pass => {
                    stats.moderation_passed += 1;
                    passed.push(event);
                }
                Verdict::Reject(r) => {
                    info!(name = name.as_str(), reason = r.as_str(), "Rejected at moderation");
                    stats.moderation_rejected += 1;
                }
                Verdict::Inconclusive(r) => {
                    warn!(name = name.as_str(), reason = r.as_str(), "Moderation inconclusive, skipping");
                    stats.moderation_skipped += 1;
                }
            }
        }

        info!(
            passed = stats.moderation_passed,
            rejected = stats.moderation_rejected,
            skipped = stats.moderation_skipped,
            "Moderation complete"
        );
        passed
    }

    pub async fn judge(&self, event: &EnrichedEvent) -> Verdict {
        let candidate = &event.candidate;
        if candidate.media_type.is_video() {
            return Verdict::Pass;
        }

        let sources: Vec<ImageSource> = if !candidate.image_paths.is_empty() {
            candidate
                .image_paths
                .iter()
                .cloned()
                .map(ImageSource::Local)
                .collect()
        } else {
            candidate
                .image_urls
                .iter()
                .cloned()
                .map(ImageSource::Remote)
                .collect()
        };
        if sources.is_empty() {
            return Verdict::Inconclusive("no images".to_string());
        }

        let mut conclusive = 0usize;
        for chunk in sources.chunks(self.config.batch_size.max(1)) {
            let mut loaded = Vec::with_capacity(chunk.len());
            for source in chunk {
                if let Some(bytes) = self.load(source).await {
                    loaded.push((source, bytes));
                }
            }
            if loaded.is_empty() {
                continue;
            }

            let payload: Vec<Vec<u8>> = loaded.iter().map(|(_, b)| b.clone()).collect();
            let inspections = match with_retry("moderation", self.config.retry, || {
                self.moderator.inspect(&payload)
            })
            .await
            {
                Ok(r) if r.len() == payload.len() => r,
                Ok(r) => {
                    warn!(expected = payload.len(), got = r.len(), "Moderation response size mismatch");
                    continue;
                }
                Err(e) => {
                    warn!(images = payload.len(), error = %e, "Moderation batch failed");
                    continue;
                }
            };

            for ((source, _), inspection) in loaded.iter().zip(&inspections) {
                if let Some(err) = &inspection.error {
                    warn!(image = %source.describe(), error = err.as_str(), "Image not judged");
                    continue;
                }
                conclusive += 1;
                if let Some(reason) = depicts_people(inspection, self.vocab) {
                    return Verdict::Reject(reason);
                }
            }
        }

        if conclusive == 0 {
            Verdict::Inconclusive("no image could be judged".to_string())
        } else {
            Verdict::Pass
        }
    }

    async fn load(&self, source: &ImageSource) -> Option<Vec<u8>> {
        match source {
            ImageSource::Local(path) => {
                if !has_sendable_extension(path) {
                    warn!(path = %path.display(), "Unsupported image format, not sent");
                    return None;
                }
                match tokio::fs::read(path).await {
                    Ok(bytes) => Some(bytes),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Failed to read image");
                        None
                    }
                }
            }
            ImageSource::Remote(url) => match self.images.fetch(url).await {
                Ok(image) if image.status == 200 => Some(image.bytes),
                Ok(image) => {
                    warn!(url = url.as_str(), status = image.status, "Image fetch rejected");
                    None
                }
                Err(e) => {
                    warn!(url = url.as_str(), error = %e, "Image fetch failed");
                    None
                }
            },
        }
    }
}

fn has_sendable_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SENDABLE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{enriched, MockImageFetcher, MockModerator};
    use poppang_common::{MediaType, RetryConfig};

    fn config(batch_size: usize) -> ModerationConfig {
        ModerationConfig {
            batch_size,
            retry: RetryConfig {
                max_retries: 1,
                delay_ms: 0,
            },
            ..Default::default()
        }
    }

    fn labels(labels: &[&str]) -> ImageInspection {
        ImageInspection {
            labels: labels.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn with_remote_images(urls: &[&str]) -> EnrichedEvent {
        let mut event = enriched("팝업");
        event.candidate.image_paths.clear();
        event.candidate.image_urls = urls.iter().map(|s| s.to_string()).collect();
        event
    }

    #[test]
    fn faces_and_human_labels_mark_people() {
        let vocab = Vocabulary::embedded().unwrap();
        let face = ImageInspection {
            faces: 1,
            ..Default::default()
        };
        assert!(depicts_people(&face, &vocab).is_some());
        assert!(depicts_people(&labels(&["Crowd", "Event"]), &vocab).is_some());
        assert!(depicts_people(&labels(&["Cake", "Dessert"]), &vocab).is_none());
    }

    #[tokio::test]
    async fn any_face_rejects_the_event_and_stops_inspection() {
        let vocab = Vocabulary::embedded().unwrap();
        let cfg = config(1);
        let images = MockImageFetcher::new()
            .on_image("https://cdn/1.jpg", b"one")
            .on_image("https://cdn/2.jpg", b"two")
            .on_image("https://cdn/3.jpg", b"three");
        let moderator = MockModerator::new().on_bytes(
            b"two",
            ImageInspection {
                faces: 2,
                ..Default::default()
            },
        );
        let m = ContentModerator::new(&moderator, &images, &vocab, &cfg);

        let event = with_remote_images(&["https://cdn/1.jpg", "https://cdn/2.jpg", "https://cdn/3.jpg"]);
        let verdict = m.judge(&event).await;

        assert!(matches!(verdict, Verdict::Reject(_)));
        assert_eq!(moderator.batch_sizes(), vec![1, 1]);
    }

    #[tokio::test]
    async fn video_bypasses_inspection() {
        let vocab = Vocabulary::embedded().unwrap();
        let cfg = config(15);
        let images = MockImageFetcher::new();
        let moderator = MockModerator::new();
        let m = ContentModerator::new(&moderator, &images, &vocab, &cfg);

        let mut event = with_remote_images(&[]);
        event.candidate.media_type = MediaType::Video;
        assert_eq!(m.judge(&event).await, Verdict::Pass);
        assert!(moderator.batch_sizes().is_empty());
    }

    #[tokio::test]
    async fn per_image_errors_are_inconclusive_not_safe() {
        let vocab = Vocabulary::embedded().unwrap();
        let cfg = config(15);
        let images = MockImageFetcher::new()
            .on_image("https://cdn/1.jpg", b"one")
            .on_status("https://cdn/2.jpg", 403);
        let moderator = MockModerator::new().on_bytes(
            b"one",
            ImageInspection {
                error: Some("Bad image data".into()),
                ..Default::default()
            },
        );
        let m = ContentModerator::new(&moderator, &images, &vocab, &cfg);

        let event = with_remote_images(&["https://cdn/1.jpg", "https://cdn/2.jpg"]);
        assert!(matches!(m.judge(&event).await, Verdict::Inconclusive(_)));
    }

    #[tokio::test]
    async fn failed_batch_is_inconclusive() {
        let vocab = Vocabulary::embedded().unwrap();
        let cfg = config(15);
        let images = MockImageFetcher::new().on_image("https://cdn/1.jpg", b"one");
        let moderator = MockModerator::new().failing();
        let m = ContentModerator::new(&moderator, &images, &vocab, &cfg);

        let event = with_remote_images(&["https://cdn/1.jpg"]);
        assert!(matches!(m.judge(&event).await, Verdict::Inconclusive(_)));
        // one attempt plus one retry
        assert_eq!(moderator.batch_sizes(), vec![1, 1]);
    }

    #[tokio::test]
    async fn local_files_are_preferred_and_filtered_by_format() {
        let dir = tempfile::tempdir().unwrap();
        let jpg = dir.path().join("a_1.jpg");
        let webp = dir.path().join("a_2.webp");
        std::fs::write(&jpg, b"local-jpg").unwrap();
        std::fs::write(&webp, b"local-webp").unwrap();

        let vocab = Vocabulary::embedded().unwrap();
        let cfg = config(15);
        let images = MockImageFetcher::new();
        let moderator = MockModerator::new().on_bytes(b"local-jpg", labels(&["Dessert"]));
        let m = ContentModerator::new(&moderator, &images, &vocab, &cfg);

        let mut event = with_remote_images(&["https://cdn/remote.jpg"]);
        event.candidate.image_paths = vec![jpg, webp, dir.path().join("missing.png")];

        assert_eq!(m.judge(&event).await, Verdict::Pass);
        assert_eq!(moderator.batch_sizes(), vec![1]);
        assert!(images.requested().is_empty());
    }

    #[tokio::test]
    async fn moderate_counts_each_outcome() {
        let vocab = Vocabulary::embedded().unwrap();
        let cfg = config(15);
        let images = MockImageFetcher::new()
            .on_image("https://cdn/clean.jpg", b"clean")
            .on_image("https://cdn/crowd.jpg", b"crowd");
        let moderator = MockModerator::new()
            .on_bytes(b"clean", labels(&["Bakery"]))
            .on_bytes(b"crowd", labels(&["crowd"]));
        let m = ContentModerator::new(&moderator, &images, &vocab, &cfg);

        let events = vec![
            with_remote_images(&["https://cdn/clean.jpg"]),
            with_remote_images(&["https://cdn/crowd.jpg"]),
            with_remote_images(&[]),
        ];
        let mut stats = RunStats::default();
        let mut log = RunLog::new("r".into(), "t".into());
        let passed = m.moderate(events, &mut stats, &mut log).await;

        assert_eq!(passed.len(), 1);
        assert_eq!(stats.moderation_passed, 1);
        assert_eq!(stats.moderation_rejected, 1);
        assert_eq!(stats.moderation_skipped, 1);
    }
}
