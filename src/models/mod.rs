use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One auction entry loaded from a watchlist file. Immutable for the
/// duration of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchedItem {
    /// Numeric offer identifier on the marketplace.
    pub id: String,
    /// Human-readable label, typically the watchlist file stem.
    pub label: String,
    /// Minimum acceptable price. Anything strictly below triggers an alert.
    pub threshold: Decimal,
}

/// Classified result of a single fetch attempt. Exactly one variant per
/// attempt; the fetcher never drops an outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// A price was extracted from the page.
    Priced(Decimal),
    /// The listing is no longer available (404/410 or ended markers).
    Ended(String),
    /// Rate limit or bot challenge detected.
    Blocked(String),
    /// Network failure, timeout or unexpected status.
    TransportError(String),
    /// Page fetched but no extraction strategy produced a price.
    NotFound(String),
}

impl FetchOutcome {
    /// Terminal outcomes are never retried through the rendering tier:
    /// an ended page is ended regardless of transport, and a block signal
    /// must not be worked around by switching tiers.
    pub fn is_terminal(&self) -> bool {
        matches!(self, FetchOutcome::Ended(_) | FetchOutcome::Blocked(_))
    }
}

/// Produced when a fetched price is strictly below the item threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub label: String,
    pub id: String,
    pub price: Decimal,
    pub threshold: Decimal,
}

/// Persisted global pause after a block signal. While `now < until`
/// no fetch attempts are made at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CooldownState {
    pub until: DateTime<Utc>,
    pub reason: String,
    pub set_at: DateTime<Utc>,
}

impl CooldownState {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now < self.until
    }
}

/// Short-term memory of listings confirmed gone, keyed by identifier.
/// An entry younger than the re-check window suppresses fetching; once
/// the window elapses the identifier is checked again.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndedCache {
    #[serde(flatten)]
    entries: HashMap<String, DateTime<Utc>>,
}

impl EndedCache {
    pub fn should_skip(&self, id: &str, now: DateTime<Utc>, recheck_hours: i64) -> bool {
        match self.entries.get(id) {
            Some(seen) => now - *seen < ChronoDuration::hours(recheck_hours),
            None => false,
        }
    }

    pub fn mark(&mut self, id: &str, now: DateTime<Utc>) {
        self.entries.insert(id.to_string(), now);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Drop entries older than the re-check window so the persisted file
    /// does not grow without bound.
    pub fn prune(&mut self, now: DateTime<Utc>, recheck_hours: i64) {
        self.entries
            .retain(|_, seen| now - *seen < ChronoDuration::hours(recheck_hours));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Aggregated result of one run, reported to the operator and used to
/// decide whether to notify.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub alerts: Vec<AlertRecord>,
    pub errors: Vec<String>,
    pub processed: usize,
    pub skipped_ended: usize,
    pub cooldown: Option<CooldownState>,
}

impl RunReport {
    pub fn status_line(&self) -> String {
        let base = format!(
            "processed={} skipped={} alerted={} errored={}",
            self.processed,
            self.skipped_ended,
            self.alerts.len(),
            self.errors.len()
        );
        match &self.cooldown {
            Some(cd) => format!("{} cooldown_until={}", base, cd.until.to_rfc3339()),
            None => base,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_cooldown_active_window() {
        let now = Utc::now();
        let cd = CooldownState {
            until: now + ChronoDuration::hours(2),
            reason: "HTTP 429".to_string(),
            set_at: now,
        };
        assert!(cd.is_active(now));
        assert!(cd.is_active(now + ChronoDuration::minutes(119)));
        assert!(!cd.is_active(now + ChronoDuration::hours(2)));
    }

    #[test]
    fn test_ended_cache_skip_and_expiry() {
        let now = Utc::now();
        let mut cache = EndedCache::default();
        cache.mark("12345678", now - ChronoDuration::hours(10));

        assert!(cache.should_skip("12345678", now, 72));
        assert!(!cache.should_skip("12345678", now + ChronoDuration::hours(72), 72));
        assert!(!cache.should_skip("99999999", now, 72));
    }

    #[test]
    fn test_ended_cache_prune() {
        let now = Utc::now();
        let mut cache = EndedCache::default();
        cache.mark("11111111", now - ChronoDuration::hours(100));
        cache.mark("22222222", now - ChronoDuration::hours(1));

        cache.prune(now, 72);
        assert!(!cache.contains("11111111"));
        assert!(cache.contains("22222222"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_ended_cache_round_trip() {
        let now = Utc::now();
        let mut cache = EndedCache::default();
        cache.mark("12345678", now);

        let json = serde_json::to_string(&cache).unwrap();
        let restored: EndedCache = serde_json::from_str(&json).unwrap();
        assert!(restored.contains("12345678"));
    }

    #[test]
    fn test_cooldown_serialization_is_rfc3339() {
        let cd = CooldownState {
            until: "2026-01-02T03:04:05Z".parse().unwrap(),
            reason: "HTTP 403".to_string(),
            set_at: "2026-01-01T03:04:05Z".parse().unwrap(),
        };
        let json = serde_json::to_string(&cd).unwrap();
        assert!(json.contains("2026-01-02T03:04:05"));
        let restored: CooldownState = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, cd);
    }

    #[test]
    fn test_terminal_outcomes() {
        assert!(FetchOutcome::Ended("HTTP 404".into()).is_terminal());
        assert!(FetchOutcome::Blocked("HTTP 429".into()).is_terminal());
        assert!(!FetchOutcome::Priced(Decimal::new(1999, 2)).is_terminal());
        assert!(!FetchOutcome::NotFound("no price".into()).is_terminal());
        assert!(!FetchOutcome::TransportError("timeout".into()).is_terminal());
    }

    #[test]
    fn test_status_line_with_cooldown() {
        let report = RunReport {
            cooldown: Some(CooldownState {
                until: "2026-01-02T03:04:05Z".parse().unwrap(),
                reason: "HTTP 429".to_string(),
                set_at: "2026-01-01T03:04:05Z".parse().unwrap(),
            }),
            ..Default::default()
        };
        let line = report.status_line();
        assert!(line.contains("processed=0"));
        assert!(line.contains("cooldown_until=2026-01-02"));
    }
}
