use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::backoff::{BackoffController, BlockedAction};
use crate::config::{BackoffConfig, BatchConfig};
use crate::evaluator::evaluate;
use crate::fetcher::Fetcher;
use crate::models::{CooldownState, EndedCache, FetchOutcome, RunReport, WatchedItem};
use crate::utils::error::Result;

/// Seam between the orchestrator and the transport layer, so batch
/// policy is testable with scripted outcomes.
#[async_trait]
pub trait ItemFetcher: Send + Sync {
    fn validate_identifier(&self, raw: &str) -> Result<String>;
    async fn fetch(&self, id: &str) -> FetchOutcome;
}

#[async_trait]
impl ItemFetcher for Fetcher {
    fn validate_identifier(&self, raw: &str) -> Result<String> {
        Fetcher::validate_identifier(self, raw)
    }

    async fn fetch(&self, id: &str) -> FetchOutcome {
        Fetcher::fetch(self, id).await
    }
}

/// Drives fetch + parse + evaluate over a watchlist, in input order,
/// chunked, with the backoff policy applied between attempts. Owns no
/// persisted state; the caller loads it before the run and flushes it
/// once afterwards.
pub struct Orchestrator<F: ItemFetcher> {
    fetcher: F,
    backoff: BackoffConfig,
    batch: BatchConfig,
    recheck_ended_hours: i64,
}

impl<F: ItemFetcher> Orchestrator<F> {
    pub fn new(
        fetcher: F,
        backoff: BackoffConfig,
        batch: BatchConfig,
        recheck_ended_hours: i64,
    ) -> Self {
        Orchestrator {
            fetcher,
            backoff,
            batch,
            recheck_ended_hours,
        }
    }

    /// Run one batch pass. Items are processed sequentially in the order
    /// given; a hard cooldown aborts the remainder cooperatively
    /// (checked between items, never mid-fetch).
    pub async fn run(
        &self,
        items: &[WatchedItem],
        cooldown: Option<&CooldownState>,
        ended_cache: &mut EndedCache,
    ) -> RunReport {
        let mut report = RunReport::default();
        let now = Utc::now();

        // Persisted cooldown gates the whole run before any fetch.
        if let Some(cd) = cooldown {
            if cd.is_active(now) {
                info!(until = %cd.until.to_rfc3339(), reason = %cd.reason, "cooldown active, skipping run");
                report.cooldown = Some(cd.clone());
                return report;
            }
        }

        let deduped = self.dedup(items);
        let mut to_check = Vec::with_capacity(deduped.len());
        for item in deduped {
            if ended_cache.should_skip(&item.id, now, self.recheck_ended_hours) {
                report.skipped_ended += 1;
            } else {
                to_check.push(item);
            }
        }
        if report.skipped_ended > 0 {
            info!(
                skipped = report.skipped_ended,
                recheck_hours = self.recheck_ended_hours,
                "skipping recently ended listings"
            );
        }

        let mut controller = BackoffController::new(self.backoff.clone());
        let mut attempted = 0usize;

        'chunks: for chunk in to_check.chunks(self.batch.size) {
            for item in chunk {
                if self.batch.max_per_run > 0 && attempted >= self.batch.max_per_run {
                    info!(quota = self.batch.max_per_run, "per-run quota reached");
                    break 'chunks;
                }

                let id = match self.fetcher.validate_identifier(&item.id) {
                    Ok(id) => id,
                    Err(e) => {
                        report.errors.push(format!("[{}] {}", item.id, e));
                        continue;
                    }
                };

                attempted += 1;
                let mut outcome = self.fetcher.fetch(&id).await;

                // Block signals drive the backoff policy: one soft
                // retry of the same item, then a hard cooldown that
                // aborts the remainder of the run. Every other outcome
                // settles the item.
                loop {
                    match outcome {
                        FetchOutcome::Blocked(signal) => match controller.on_blocked() {
                            BlockedAction::RetryAfter(delay) => {
                                warn!(id = %id, signal = %signal, delay_secs = delay.as_secs(), "block signal, soft retry");
                                tokio::time::sleep(delay).await;
                                attempted += 1;
                                outcome = self.fetcher.fetch(&id).await;
                            }
                            BlockedAction::HardCooldown => {
                                let cd = controller.hard_cooldown(&signal, Utc::now());
                                warn!(id = %id, signal = %signal, until = %cd.until.to_rfc3339(), "hard cooldown set, aborting run");
                                report.cooldown = Some(cd);
                                break 'chunks;
                            }
                        },
                        FetchOutcome::Priced(price) => {
                            debug!(id = %id, %price, threshold = %item.threshold, "price checked");
                            if let Some(alert) = evaluate(item, price) {
                                report.alerts.push(alert);
                            }
                            report.processed += 1;
                            break;
                        }
                        FetchOutcome::Ended(reason) => {
                            // Soft outcome: cached, not logged as an error
                            debug!(id = %id, reason = %reason, "listing ended");
                            ended_cache.mark(&id, Utc::now());
                            report.processed += 1;
                            break;
                        }
                        FetchOutcome::TransportError(detail) | FetchOutcome::NotFound(detail) => {
                            report.errors.push(format!("[{}] {}", id, detail));
                            report.processed += 1;
                            break;
                        }
                    }
                }

                tokio::time::sleep(controller.pacing_delay()).await;
            }

            if self.batch.sleep_between_ms > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(
                    self.batch.sleep_between_ms,
                ))
                .await;
            }
        }

        ended_cache.prune(Utc::now(), self.recheck_ended_hours);
        report
    }

    /// Dedup key is (label, identifier) unless global dedup collapses it
    /// to the identifier alone. Input order is preserved.
    fn dedup<'a>(&self, items: &'a [WatchedItem]) -> Vec<&'a WatchedItem> {
        let mut seen = HashSet::new();
        items
            .iter()
            .filter(|item| {
                let key = if self.batch.global_dedup {
                    item.id.clone()
                } else {
                    format!("{}\u{1f}{}", item.label, item.id)
                };
                seen.insert(key)
            })
            .collect()
    }
}
