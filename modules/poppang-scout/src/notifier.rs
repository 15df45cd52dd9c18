//! Keyword-subscription fan-out.
//!
//! For each subscriber, every persisted event whose name or summary contains one
//! of their keywords is a match. Each matched pair is recorded as an alert
//! record first; only pairs recorded for the first time count toward the push,
//! and a subscriber gets at most one push per run.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use poppang_common::{PersistedEvent, Subscription};

use crate::run_log::{EventKind, RunLog};
use crate::stats::RunStats;
use crate::traits::{PushSender, StoreConnector};

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyReport {
    pub subscriptions: u32,
    pub matched_pairs: u32,
    pub alerts_recorded: u32,
    pub pushes_sent: u32,
    pub push_failures: u32,
    pub pushes_skipped: u32,
}

/// Keywords of `sub` found in the event's name or summary (case-sensitive), in keyword order.
pub fn matched_keywords<'s>(sub: &'s Subscription, event: &PersistedEvent) -> Vec<&'s str> {
    sub.keywords
        .iter()
        .map(String::as_str)
        .filter(|kw| !kw.is_empty())
        .filter(|kw| event.name().contains(kw) || event.summary().contains(kw))
        .collect()
}

/// `{name} {region}에서 열렸어요!` followed by the keywords as hashtags.
pub fn push_body(event: &PersistedEvent, keywords: &[&str]) -> String {
    let hashtags = keywords
        .iter()
        .map(|kw| format!("#{kw}"))
        .collect::<Vec<_>>()
        .join(" ");
    format!("{} {}에서 열렸어요!\n\n{}", event.name(), event.region(), hashtags)
}

pub struct Notifier<'a> {
    store: &'a dyn StoreConnector,
    push: &'a dyn PushSender,
    title: &'a str,
    dry_run: bool,
}

impl<'a> Notifier<'a> {
    pub fn new(store: &'a dyn StoreConnector, push: &'a dyn PushSender, title: &'a str) -> Self {
        Self {
            store,
            push,
            title,
            dry_run: false,
        }
    }

    /// Report matches and the pushes they would trigger without writing alert
    /// records or delivering anything, so a later real run still notifies.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub async fn notify(
        &self,
        events: &[PersistedEvent],
        stats: &mut RunStats,
        run_log: &mut RunLog,
    ) -> Result<NotifyReport> {
        let mut report = NotifyReport::default();
        if events.is_empty() {
            info!("No new popups, skipping notifications");
            return Ok(report);
        }

        let store = self
            .store
            .connect()
            .await
            .context("Failed to open store for notifications")?;
        let subscriptions = match store.active_subscriptions().await {
            Ok(subs) => subs,
            Err(e) => {
                store.close().await;
                return Err(e.context("Failed to load subscriptions"));
            }
        };
        report.subscriptions = subscriptions.len() as u32;

        for sub in &subscriptions {
            // (event, keywords) for pairs recorded for the first time this run
            let mut fresh: Vec<(&PersistedEvent, Vec<&str>)> = Vec::new();

            for event in events {
                let keywords = matched_keywords(sub, event);
                if keywords.is_empty() {
                    continue;
                }
                report.matched_pairs += 1;
                if self.dry_run {
                    fresh.push((event, keywords));
                    continue;
                }

                match store.record_alert(sub.user_id, event.event_id).await {
                    Ok(true) => {
                        report.alerts_recorded += 1;
                        run_log.log(EventKind::AlertRecorded {
                            user_id: sub.user_id,
                            event_id: event.event_id,
                        });
                        fresh.push((event, keywords));
                    }
                    Ok(false) => {}
                    Err(e) => warn!(
                        user_id = sub.user_id,
                        event_id = event.event_id,
                        error = %e,
                        "Failed to record alert"
                    ),
                }
            }

            let Some((first, _)) = fresh.first() else {
                continue;
            };

            let mut hashtags: Vec<&str> = Vec::new();
            for kw in fresh.iter().flat_map(|(_, kws)| kws.iter().copied()) {
                if !hashtags.contains(&kw) {
                    hashtags.push(kw);
                }
            }
            let body = push_body(first, &hashtags);

            if self.dry_run {
                info!(
                    user_id = sub.user_id,
                    events = fresh.len(),
                    body = body.as_str(),
                    "Dry run, nothing recorded or sent"
                );
                report.pushes_skipped += 1;
                continue;
            }
            if sub.push_token.trim().is_empty() {
                info!(user_id = sub.user_id, "No push token, alert recorded only");
                report.pushes_skipped += 1;
                continue;
            }

            let sent = self.push.send(&sub.push_token, self.title, &body).await;
            run_log.log(EventKind::PushSent {
                user_id: sub.user_id,
                events: fresh.len() as u32,
                success: sent.is_ok(),
            });
            match sent {
                Ok(()) => {
                    info!(user_id = sub.user_id, nickname = sub.nickname.as_str(), "Push sent");
                    report.pushes_sent += 1;
                }
                Err(e) => {
                    warn!(user_id = sub.user_id, error = %e, "Push failed");
                    report.push_failures += 1;
                }
            }
        }

        store.close().await;

        stats.subscriptions = report.subscriptions;
        stats.alerts_recorded = report.alerts_recorded;
        stats.pushes_sent = report.pushes_sent;
        stats.push_failures = report.push_failures;
        info!(
            subscriptions = report.subscriptions,
            alerts = report.alerts_recorded,
            pushes = report.pushes_sent,
            "Notifications complete"
        );
        Ok(report)
    }
}
