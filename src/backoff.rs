use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;
use std::time::Duration;

use crate::config::BackoffConfig;
use crate::models::CooldownState;

/// What to do with the item that produced a block signal.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockedAction {
    /// Sleep this long, then retry the same item once more within the run.
    RetryAfter(Duration),
    /// Stop the run and persist a hard cooldown.
    HardCooldown,
}

/// In-run retry pacing plus the cross-run cooldown policy. One instance
/// per run; the persisted cooldown itself lives in [`CooldownState`].
///
/// The target site treats bursty, evasive retry patterns as aggressive.
/// Backing off globally and deferring broadly is the sustainable policy;
/// retrying harder is explicitly not.
pub struct BackoffController {
    config: BackoffConfig,
    soft_delay: Duration,
    blocked_signals: u32,
}

impl BackoffController {
    pub fn new(config: BackoffConfig) -> Self {
        let soft_delay = Duration::from_secs(config.soft_backoff_start_secs);
        BackoffController {
            config,
            soft_delay,
            blocked_signals: 0,
        }
    }

    /// Randomized inter-request delay, applied after every fetch attempt
    /// regardless of outcome.
    pub fn pacing_delay(&self) -> Duration {
        let base = Duration::from_millis(self.config.base_delay_ms);
        if self.config.jitter_ms == 0 {
            return base;
        }
        let jitter = rand::thread_rng().gen_range(0..=self.config.jitter_ms);
        base + Duration::from_millis(jitter)
    }

    /// Register a block signal. The first one in a run earns a single
    /// soft retry with exponential spacing; a repeated signal, or any
    /// signal under the single-strike policy, escalates to a hard
    /// cooldown.
    pub fn on_blocked(&mut self) -> BlockedAction {
        self.blocked_signals += 1;
        if self.config.single_strike || self.blocked_signals > 1 {
            return BlockedAction::HardCooldown;
        }

        let delay = self.soft_delay;
        let ceiling = Duration::from_secs(self.config.soft_backoff_max_secs);
        self.soft_delay = (delay * 2).min(ceiling);
        BlockedAction::RetryAfter(delay)
    }

    /// Compute a randomized hard cooldown within the configured window.
    pub fn hard_cooldown(&self, reason: &str, now: DateTime<Utc>) -> CooldownState {
        let min_secs = self.config.cooldown_min_hours * 3600;
        let max_secs = self.config.cooldown_max_hours * 3600;
        let secs = if min_secs == max_secs {
            min_secs
        } else {
            rand::thread_rng().gen_range(min_secs..=max_secs)
        };
        CooldownState {
            until: now + ChronoDuration::seconds(secs as i64),
            reason: reason.to_string(),
            set_at: now,
        }
    }

    pub fn blocked_signals(&self) -> u32 {
        self.blocked_signals
    }
}
