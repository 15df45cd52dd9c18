use serde::{Deserialize, Serialize};

/// Counters for one pipeline run. A resumed run continues from the counters
/// stored in its checkpoint.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunStats {
    pub posts_fetched: u32,
    pub captions: u32,
    pub batches: u32,
    pub batches_failed: u32,
    pub candidates_parsed: u32,
    pub candidates_invalid: u32,
    pub candidates_without_images: u32,
    pub images_downloaded: u32,
    pub images_failed: u32,
    pub extracted: u32,
    pub geocoded: u32,
    pub geocode_dropped: u32,
    pub moderation_passed: u32,
    pub moderation_rejected: u32,
    pub moderation_skipped: u32,
    pub persisted: u32,
    pub persist_skipped: u32,
    pub subscriptions: u32,
    pub alerts_recorded: u32,
    pub pushes_sent: u32,
    pub push_failures: u32,
}

impl RunStats {
    /// Events that reached the store stage.
    pub fn attempted(&self) -> u32 {
        self.persisted + self.persist_skipped
    }

    /// Events dropped for any reason other than a deliberate moderation rejection.
    pub fn skipped(&self) -> u32 {
        self.candidates_invalid
            + self.candidates_without_images
            + self.geocode_dropped
            + self.moderation_skipped
            + self.persist_skipped
    }
}

impl std::fmt::Display for RunStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Scout Run Complete ===")?;
        writeln!(f, "Posts fetched:      {}", self.posts_fetched)?;
        writeln!(f, "Captions:           {}", self.captions)?;
        writeln!(f, "\nExtraction:")?;
        writeln!(f, "  Batches:          {} ({} failed)", self.batches, self.batches_failed)?;
        writeln!(f, "  Parsed:           {}", self.candidates_parsed)?;
        writeln!(f, "  Invalid:          {}", self.candidates_invalid)?;
        writeln!(f, "  No images:        {}", self.candidates_without_images)?;
        writeln!(
            f,
            "  Images:           {} stored, {} failed",
            self.images_downloaded, self.images_failed
        )?;
        writeln!(f, "  Extracted:        {}", self.extracted)?;
        writeln!(f, "\nGeocoding:")?;
        writeln!(f, "  Resolved:         {}", self.geocoded)?;
        writeln!(f, "  Dropped:          {}", self.geocode_dropped)?;
        writeln!(f, "\nModeration:")?;
        writeln!(f, "  Passed:           {}", self.moderation_passed)?;
        writeln!(f, "  Rejected:         {}", self.moderation_rejected)?;
        writeln!(f, "  Inconclusive:     {}", self.moderation_skipped)?;
        writeln!(f, "\nStore:")?;
        writeln!(f, "  Attempted:        {}", self.attempted())?;
        writeln!(f, "  Persisted:        {}", self.persisted)?;
        writeln!(f, "  Skipped:          {}", self.persist_skipped)?;
        if self.subscriptions > 0 {
            writeln!(f, "\nNotifications:")?;
            writeln!(f, "  Subscriptions:    {}", self.subscriptions)?;
            writeln!(f, "  Alerts recorded:  {}", self.alerts_recorded)?;
            writeln!(f, "  Pushes sent:      {}", self.pushes_sent)?;
            writeln!(f, "  Push failures:    {}", self.push_failures)?;
        }
        writeln!(
            f,
            "\nTotals: persisted {} / rejected {} / skipped {}",
            self.persisted,
            self.moderation_rejected,
            self.skipped()
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_totals_split_rejections_from_skips() {
        let stats = RunStats {
            candidates_invalid: 2,
            geocode_dropped: 1,
            moderation_rejected: 3,
            moderation_skipped: 1,
            persisted: 4,
            persist_skipped: 1,
            ..Default::default()
        };
        assert_eq!(stats.attempted(), 5);
        assert_eq!(stats.skipped(), 5);

        let text = stats.to_string();
        assert!(text.contains("persisted 4 / rejected 3 / skipped 5"));
        assert!(!text.contains("Notifications"));
    }
}
