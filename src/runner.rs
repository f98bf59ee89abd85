use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::fetcher::Fetcher;
use crate::models::RunReport;
use crate::notifier::{EmailNotifier, Notifier};
use crate::orchestrator::Orchestrator;
use crate::renderer::{ChromeRenderer, PageRenderer};
use crate::store::{JsonFileStore, StateStore};
use crate::utils::error::Result;
use crate::watchlist::WatchlistLoader;

/// Wires the components together and owns the run lifecycle: load
/// watchlist and state, run one batch, flush state once, notify.
pub struct Watcher {
    config: AppConfig,
    orchestrator: Orchestrator<Fetcher>,
    store: StateStore<JsonFileStore>,
    notifier: EmailNotifier,
    loader: WatchlistLoader,
}

impl Watcher {
    pub fn new(config: AppConfig) -> Result<Self> {
        let renderer: Option<Arc<dyn PageRenderer>> = if config.fetcher.tier1_only {
            None
        } else {
            match ChromeRenderer::new(&config.fetcher) {
                Ok(r) => Some(Arc::new(r)),
                Err(e) => {
                    // Degrade to tier-1-only rather than refusing to start
                    warn!(error = %e, "browser unavailable, running tier-1 only");
                    None
                }
            }
        };

        let fetcher = Fetcher::new(config.fetcher.clone(), renderer)?;
        let orchestrator = Orchestrator::new(
            fetcher,
            config.backoff.clone(),
            config.batch.clone(),
            config.state.recheck_ended_hours,
        );
        let store = StateStore::new(JsonFileStore::new(&config.state.dir));
        let notifier = EmailNotifier::new(
            config.smtp.clone(),
            config.fetcher.offer_url_template.clone(),
        );

        Ok(Watcher {
            config,
            orchestrator,
            store,
            notifier,
            loader: WatchlistLoader::new(),
        })
    }

    /// One complete check cycle. State is flushed at most once per run.
    pub async fn run_once(&self) -> Result<RunReport> {
        let items = self.loader.load_dir(&self.config.watchlist)?;
        info!(count = items.len(), "watchlist loaded");

        let cooldown = self.store.load_cooldown();
        let mut ended_cache = self.store.load_ended_cache();

        let report = self
            .orchestrator
            .run(&items, cooldown.as_ref(), &mut ended_cache)
            .await;

        self.store.save_ended_cache(&ended_cache)?;
        if let Some(cd) = &report.cooldown {
            if cooldown.as_ref() != Some(cd) {
                self.store.save_cooldown(cd)?;
            }
        }

        for line in &report.errors {
            warn!("{}", line);
        }
        info!("{}", report.status_line());

        if !report.alerts.is_empty() {
            match self.notifier.notify(&report.alerts).await {
                Ok(sent) => debug!(sent, "notification attempted"),
                // A failed mail must not fail the run; the state is
                // already flushed and the next cycle will retry anyway.
                Err(e) => warn!(error = %e, "notification failed"),
            }
        }

        Ok(report)
    }

    /// Loop forever with heartbeat logging between cycles. A failed run
    /// is logged and the loop continues.
    pub async fn run_loop(&self) {
        loop {
            let started = std::time::Instant::now();
            match self.run_once().await {
                Ok(_) => {
                    info!(elapsed_secs = started.elapsed().as_secs(), "run complete");
                }
                Err(e) => {
                    error!(error = %e, "run failed");
                }
            }

            let interval = Duration::from_secs(self.config.worker.interval_secs);
            let heartbeat = Duration::from_secs(self.config.worker.heartbeat_secs.max(1));
            let deadline = tokio::time::Instant::now() + interval;
            while tokio::time::Instant::now() < deadline {
                let remaining = deadline - tokio::time::Instant::now();
                tokio::time::sleep(remaining.min(heartbeat)).await;
                let left = deadline
                    .saturating_duration_since(tokio::time::Instant::now())
                    .as_secs();
                if left > 0 {
                    debug!(seconds_left = left, "waiting for next cycle");
                }
            }
        }
    }
}
