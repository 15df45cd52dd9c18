use anyhow::{Context, Result};
use tracing::info;

use poppang_common::{Post, RetryConfig};

use crate::retry::with_retry;
use crate::run_log::{EventKind, RunLog};
use crate::stats::RunStats;
use crate::traits::PostSource;

/// Fetch recent posts for `tag`. Posts without resolved media are dropped.
///
/// A feed that stays unreachable after the bounded retries fails the run.
pub async fn fetch_posts(
    source: &dyn PostSource,
    tag: &str,
    limit: u32,
    retry: RetryConfig,
    stats: &mut RunStats,
    run_log: &mut RunLog,
) -> Result<Vec<Post>> {
    let posts = with_retry("feed", retry, || source.recent_posts(tag, limit))
        .await
        .with_context(|| format!("Failed to fetch posts for #{tag}"))?;

    let total = posts.len();
    let posts: Vec<Post> = posts
        .into_iter()
        .filter(|p| !p.media_urls.is_empty())
        .collect();

    stats.posts_fetched = posts.len() as u32;
    run_log.log(EventKind::PostsFetched {
        tag: tag.to_string(),
        count: posts.len() as u32,
    });
    info!(tag, fetched = total, kept = posts.len(), "Fetched posts");

    Ok(posts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{post, MockPostSource};

    const NO_DELAY: RetryConfig = RetryConfig {
        max_retries: 1,
        delay_ms: 0,
    };

    #[tokio::test]
    async fn drops_posts_without_media() {
        let mut bare = post("2", "캡션");
        bare.media_urls.clear();
        let source = MockPostSource::new().on_tag("팝업", vec![post("1", "캡션"), bare]);

        let mut stats = RunStats::default();
        let mut log = RunLog::new("r".into(), "팝업".into());
        let posts = fetch_posts(&source, "팝업", 50, NO_DELAY, &mut stats, &mut log)
            .await
            .unwrap();

        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].id, "1");
        assert_eq!(stats.posts_fetched, 1);
    }

    #[tokio::test]
    async fn unreachable_feed_is_an_error() {
        let source = MockPostSource::new();
        let mut stats = RunStats::default();
        let mut log = RunLog::new("r".into(), "팝업".into());
        let result = fetch_posts(&source, "팝업", 50, NO_DELAY, &mut stats, &mut log).await;
        assert!(result.is_err());
    }
}
