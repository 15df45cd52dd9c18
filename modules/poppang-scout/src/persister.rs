use std::path::Path;

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime};
use tracing::{info, warn};

use poppang_common::{EnrichedEvent, PersistedEvent, PoppangError};
use poppang_store::NewPopup;

use crate::run_log::{EventKind, RunLog};
use crate::stats::RunStats;
use crate::traits::StoreConnector;

/// Public path of a stored image: the `/images/...` suffix of its local path.
/// Paths outside an `images` directory are kept as-is.
pub fn public_image_path(path: &Path) -> String {
    let full = path.to_string_lossy().replace('\\', "/");
    match full.find("/images/") {
        Some(idx) => full[idx..].to_string(),
        None => full,
    }
}

fn parse_date(field: &str, value: &str) -> Result<NaiveDate, PoppangError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| PoppangError::Validation(format!("{field} is not YYYY-MM-DD: {value:?}")))
}

fn parse_time(value: Option<&str>) -> Option<NaiveTime> {
    let value = value?.trim();
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .ok()
}

/// Map an event to its store row. Image references are the public paths of
/// downloaded files, or the remote URLs when nothing was downloaded.
pub fn to_new_popup(event: &EnrichedEvent) -> Result<NewPopup, PoppangError> {
    let c = &event.candidate;
    let images = if c.image_paths.is_empty() {
        c.image_urls.clone()
    } else {
        c.image_paths.iter().map(|p| public_image_path(p)).collect()
    };

    Ok(NewPopup {
        name: c.name.clone(),
        start_date: parse_date("start_date", &c.start_date)?,
        end_date: parse_date("end_date", &c.end_date)?,
        open_time: parse_time(c.open_time.as_deref()),
        close_time: parse_time(c.close_time.as_deref()),
        address: c.address.clone(),
        road_address: event.road_address.clone(),
        region: c.region.clone(),
        latitude: event.latitude,
        longitude: event.longitude,
        geocoding_query: c.geocoding_query.clone(),
        insta_post_id: c.post_id.clone(),
        insta_post_url: c.post_url.clone(),
        caption_summary: c.caption_summary.clone(),
        caption: c.caption.clone(),
        media_type: c.media_type.as_str().to_string(),
        images,
        category_ids: c.categories.clone(),
    })
}

/// Insert each event as its own transactional unit.
///
/// A failed unit is rolled back and skipped; the rest continue. Failing to open
/// the store fails the stage.
pub async fn persist(
    connector: &dyn StoreConnector,
    events: Vec<EnrichedEvent>,
    stats: &mut RunStats,
    run_log: &mut RunLog,
) -> Result<Vec<PersistedEvent>> {
    if events.is_empty() {
        return Ok(Vec::new());
    }

    let store = connector
        .connect()
        .await
        .context("Failed to open store for persistence")?;
    let mut persisted = Vec::with_capacity(events.len());

    for event in events {
        let name = event.candidate.name.clone();

        let outcome = match to_new_popup(&event) {
            Ok(row) => store
                .insert_popup(&row)
                .await
                .map(|ids| (ids, row.images))
                .map_err(|e| PoppangError::Persistence(format!("{e:#}"))),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(((event_id, uuid), stored_image_paths)) => {
                stats.persisted += 1;
                run_log.log(EventKind::PopupPersisted {
                    event_id,
                    uuid: uuid.to_string(),
                    name: name.clone(),
                });
                info!(event_id, %uuid, name = name.as_str(), "Persisted popup");
                persisted.push(PersistedEvent {
                    event,
                    event_id,
                    uuid,
                    stored_image_paths,
                });
            }
            Err(e) => {
                warn!(name = name.as_str(), error = %e, "Skipping popup");
                stats.persist_skipped += 1;
                run_log.log(EventKind::PersistSkipped {
                    name,
                    reason: e.to_string(),
                });
            }
        }
    }

    store.close().await;
    Ok(persisted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{enriched, MockConnector};
    use std::path::PathBuf;

    #[test]
    fn public_paths_keep_images_suffix() {
        assert_eq!(
            public_image_path(Path::new("/srv/poppang/images/20251007-103000_1790/잼_1.jpg")),
            "/images/20251007-103000_1790/잼_1.jpg"
        );
        assert_eq!(public_image_path(Path::new("/tmp/x/a_1.jpg")), "/tmp/x/a_1.jpg");
    }

    #[test]
    fn row_mapping_uses_public_paths_in_order() {
        let mut event = enriched("잼 팝업");
        event.candidate.image_paths = vec![
            PathBuf::from("/data/images/run/a_1.jpg"),
            PathBuf::from("/data/images/run/a_2.png"),
        ];
        event.candidate.open_time = Some("10:30".into());
        event.candidate.close_time = Some("저녁".into());

        let row = to_new_popup(&event).unwrap();
        assert_eq!(row.images, vec!["/images/run/a_1.jpg", "/images/run/a_2.png"]);
        assert_eq!(row.open_time, NaiveTime::from_hms_opt(10, 30, 0));
        assert_eq!(row.close_time, None);
        assert_eq!(row.media_type, "IMAGE");
    }

    #[test]
    fn malformed_dates_fail_mapping() {
        let mut event = enriched("잼 팝업");
        event.candidate.end_date = "10월 13일".into();
        assert!(matches!(to_new_popup(&event), Err(PoppangError::Validation(_))));
    }

    #[tokio::test]
    async fn failed_unit_is_skipped_and_others_continue() {
        let connector = MockConnector::new();
        connector.state().fail_images_for("실패 팝업");

        let events = vec![enriched("첫 팝업"), enriched("실패 팝업"), enriched("셋째 팝업")];
        let mut stats = RunStats::default();
        let mut log = RunLog::new("r".into(), "t".into());
        let persisted = persist(&connector, events, &mut stats, &mut log).await.unwrap();

        assert_eq!(persisted.len(), 2);
        assert_eq!(stats.persisted, 2);
        assert_eq!(stats.persist_skipped, 1);
        let names: Vec<String> = connector.state().popups().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["첫 팝업", "셋째 팝업"]);
        assert_ne!(persisted[0].event_id, persisted[1].event_id);
        assert_eq!(connector.state().closes(), 1);
    }
}
