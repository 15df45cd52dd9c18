use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};
use uuid::Uuid;

use poppang_common::{AppConfig, FileConfig, PoppangError, Vocabulary};

use crate::enricher::enrich;
use crate::extractor::ExtractionEngine;
use crate::fetcher::fetch_posts;
use crate::moderator::ContentModerator;
use crate::notifier::Notifier;
use crate::persister::persist;
use crate::run_log::{EventKind, RunLog};
use crate::state::{RunState, Stage, StateStore};
use crate::stats::RunStats;
use crate::traits::{
    Geocoder, HttpImageFetcher, ImageFetcher, ImageModerator, PgConnector, PostSource,
    PushSender, StoreConnector, TextOracle,
};

/// Every external collaborator the pipeline needs.
pub struct ScoutDeps {
    pub source: Box<dyn PostSource>,
    pub oracle: Box<dyn TextOracle>,
    pub geocoder: Box<dyn Geocoder>,
    pub moderator: Box<dyn ImageModerator>,
    pub images: Box<dyn ImageFetcher>,
    pub store: Box<dyn StoreConnector>,
    pub push: Box<dyn PushSender>,
}

impl ScoutDeps {
    /// Production wiring over the real clients. Fails on unreadable push
    /// credentials so no stage runs against a sender that can never deliver.
    pub fn from_config(app: &AppConfig, file: &FileConfig) -> Result<Self> {
        let push = fcm_client::FcmClient::new(&app.fcm_credentials_path)
            .map_err(|e| PoppangError::Config(format!("FCM_CREDENTIALS_PATH: {e}")))?;
        info!(project_id = push.project_id(), "FCM credentials loaded");

        let mut instagram = instagram_client::InstagramClient::new(
            app.instagram_access_token.clone(),
            app.ig_user_id.clone(),
        );
        if let Some(url) = &file.scout.graph_base_url {
            instagram = instagram.with_base_url(url.clone());
        }

        Ok(Self {
            source: Box::new(instagram),
            oracle: Box::new(
                ai_client::OpenAi::new(&app.openai_api_key, &file.extraction.model)
                    .with_timeout(Duration::from_secs(file.extraction.timeout_secs)),
            ),
            geocoder: Box::new(
                naver_client::NaverClient::new(
                    app.naver_client_id.clone(),
                    app.naver_client_secret.clone(),
                )
                .with_timeout(Duration::from_secs(file.geocoding.timeout_secs)),
            ),
            moderator: Box::new(
                vision_client::VisionClient::new(app.google_vision_api_key.clone())
                    .with_timeout(Duration::from_secs(file.moderation.timeout_secs)),
            ),
            images: Box::new(HttpImageFetcher::new(Duration::from_secs(30))),
            store: Box::new(PgConnector::new(app.database_url.clone())),
            push: Box::new(push),
        })
    }
}

/// Per-invocation switches, usually from the CLI.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Overrides `[scout] hashtag`.
    pub tag: Option<String>,
    pub resume: bool,
    /// Overrides `[extraction] download_images`.
    pub download: Option<bool>,
    pub dry_run_notify: bool,
}

pub struct Scout {
    deps: ScoutDeps,
    config: FileConfig,
    vocab: Vocabulary,
    data_dir: PathBuf,
}

impl Scout {
    pub fn new(deps: ScoutDeps, config: FileConfig, vocab: Vocabulary, data_dir: PathBuf) -> Self {
        Self {
            deps,
            config,
            vocab,
            data_dir,
        }
    }

    /// Wire production clients from the environment and TOML config.
    pub fn from_config(app: &AppConfig, config: FileConfig, vocab: Vocabulary) -> Result<Self> {
        let deps = ScoutDeps::from_config(app, &config)?;
        Ok(Self::new(deps, config, vocab, app.data_dir()))
    }

    pub fn state_store(&self, tag: &str) -> StateStore {
        StateStore::for_tag(&self.data_dir, tag)
    }

    /// Run every remaining stage in order, checkpointing after each.
    pub async fn run(&self, options: &RunOptions) -> Result<RunStats> {
        let tag = options
            .tag
            .clone()
            .unwrap_or_else(|| self.config.scout.hashtag.clone());
        let state_store = self.state_store(&tag);

        let resumed = if options.resume {
            match state_store.load()? {
                Some((checkpoint, state)) if !state.is_terminal() => {
                    info!(run_id = checkpoint.run_id.as_str(), stage = %checkpoint.stage, "Resuming run");
                    Some((checkpoint, state))
                }
                Some(_) => {
                    info!("Last run completed, starting fresh");
                    None
                }
                None => {
                    warn!("No checkpoint to resume from, starting fresh");
                    None
                }
            }
        } else {
            None
        };

        let (mut stats, mut run_log, mut state) = match resumed {
            Some((checkpoint, state)) => {
                let mut run_log = RunLog::new(checkpoint.run_id, tag.clone());
                run_log.log(EventKind::Resumed {
                    stage: state.stage().to_string(),
                });
                (checkpoint.stats, run_log, state)
            }
            None => {
                let mut stats = RunStats::default();
                let run_id = Uuid::new_v4().to_string();
                let mut run_log = RunLog::new(run_id, tag.clone());
                info!(run_id = run_log.run_id.as_str(), tag = tag.as_str(), "Scout run starting");
                let fetched = fetch_posts(
                    self.deps.source.as_ref(),
                    &tag,
                    self.config.scout.fetch_limit,
                    self.config.scout.retry,
                    &mut stats,
                    &mut run_log,
                )
                .await
                .map(|posts| RunState::Fetched { posts })
                .and_then(|state| {
                    state_store.save(&run_log.run_id, &tag, &state, &stats)?;
                    Ok(state)
                });
                match fetched {
                    Ok(state) => (stats, run_log, state),
                    Err(e) => return Err(self.abandon(&mut run_log, None, &stats, e)),
                }
            }
        };

        while !state.is_terminal() {
            let completed = state.stage();
            let next = match self.advance(state, options, &mut stats, &mut run_log).await {
                Ok(next) => next,
                Err(e) => return Err(self.abandon(&mut run_log, Some(completed), &stats, e)),
            };
            if let Err(e) = state_store.save(&run_log.run_id, &tag, &next, &stats) {
                return Err(self.abandon(&mut run_log, Some(completed), &stats, e));
            }
            state = next;
        }

        if let Err(e) = run_log.save(&self.data_dir, &stats) {
            warn!(error = %e, "Failed to save run log");
        }
        info!("{stats}");
        Ok(stats)
    }

    /// Log the failure, persist the partial timeline and hand the error back.
    fn abandon(
        &self,
        run_log: &mut RunLog,
        completed: Option<Stage>,
        stats: &RunStats,
        err: anyhow::Error,
    ) -> anyhow::Error {
        let message = format!("{err:#}");
        warn!(
            run_id = run_log.run_id.as_str(),
            completed = completed.map(|s| s.as_str()).unwrap_or("none"),
            error = message.as_str(),
            "Scout run failed"
        );
        run_log.log(EventKind::StageFailed {
            completed: completed.map(|s| s.to_string()),
            error: message,
        });
        if let Err(e) = run_log.save(&self.data_dir, stats) {
            warn!(error = %e, "Failed to save run log");
        }
        err
    }

    async fn advance(
        &self,
        state: RunState,
        options: &RunOptions,
        stats: &mut RunStats,
        run_log: &mut RunLog,
    ) -> Result<RunState> {
        let next = match state {
            RunState::Fetched { posts } => {
                let download = options
                    .download
                    .unwrap_or(self.config.extraction.download_images);
                let engine = ExtractionEngine::new(
                    self.deps.oracle.as_ref(),
                    self.deps.images.as_ref(),
                    &self.vocab,
                    &self.config.extraction,
                )
                .with_download(download);
                RunState::Extracted {
                    events: engine.extract(&posts, stats, run_log).await,
                }
            }
            RunState::Extracted { events } => RunState::Enriched {
                events: enrich(
                    self.deps.geocoder.as_ref(),
                    events,
                    self.config.geocoding.retry,
                    stats,
                    run_log,
                )
                .await,
            },
            RunState::Enriched { events } => {
                let moderator = ContentModerator::new(
                    self.deps.moderator.as_ref(),
                    self.deps.images.as_ref(),
                    &self.vocab,
                    &self.config.moderation,
                );
                RunState::Moderated {
                    events: moderator.moderate(events, stats, run_log).await,
                }
            }
            RunState::Moderated { events } => RunState::Persisted {
                events: persist(self.deps.store.as_ref(), events, stats, run_log).await?,
            },
            RunState::Persisted { events } => {
                let notifier = Notifier::new(
                    self.deps.store.as_ref(),
                    self.deps.push.as_ref(),
                    &self.config.notify.push_title,
                )
                .dry_run(options.dry_run_notify);
                RunState::Notified {
                    report: notifier.notify(&events, stats, run_log).await?,
                }
            }
            done @ RunState::Notified { .. } => done,
        };
        Ok(next)
    }
}
