use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub watchlist: WatchlistConfig,
    pub fetcher: FetcherConfig,
    pub backoff: BackoffConfig,
    pub batch: BatchConfig,
    pub state: StateConfig,
    pub smtp: SmtpConfig,
    pub worker: WorkerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchlistConfig {
    /// Directory scanned for *.txt watchlist files.
    pub dir: String,
    /// Restrict the run to a single file (stem or full name). Empty = all.
    pub target_file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    /// Offer URL template; `{id}` is replaced with the identifier.
    pub offer_url_template: String,
    pub user_agent: String,
    pub accept_language: String,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    /// Skip the rendering tier entirely.
    pub tier1_only: bool,
    /// Explicit Chrome/Chromium binary path for the rendering tier.
    pub chrome_path: Option<String>,
    /// Upper bound on waiting for price-bearing elements to attach.
    pub render_wait_secs: u64,
    /// Minimum digits for a valid offer identifier.
    pub min_id_digits: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Base politeness pause between requests, milliseconds.
    pub base_delay_ms: u64,
    /// Uniform jitter added on top of the base delay, milliseconds.
    pub jitter_ms: u64,
    /// Initial in-run soft backoff after a block signal, seconds.
    pub soft_backoff_start_secs: u64,
    /// Ceiling for the exponential soft backoff, seconds.
    pub soft_backoff_max_secs: u64,
    /// Hard cooldown duration is drawn uniformly from [min, max] hours.
    pub cooldown_min_hours: u64,
    pub cooldown_max_hours: u64,
    /// When true, the first block signal escalates straight to a hard
    /// cooldown instead of one soft in-run retry.
    pub single_strike: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Items per chunk.
    pub size: usize,
    /// Pause between chunks, milliseconds.
    pub sleep_between_ms: u64,
    /// Maximum fetch attempts per run; 0 = unlimited.
    pub max_per_run: usize,
    /// Dedup on identifier alone instead of (label, identifier).
    pub global_dedup: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    /// Directory holding the persisted cooldown and ended-cache files.
    pub dir: String,
    /// Hours before an ended listing is checked again.
    pub recheck_ended_hours: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_address: Option<String>,
    pub from_name: String,
    /// Comma-separated recipient list.
    pub to: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Seconds between runs in loop mode.
    pub interval_secs: u64,
    /// Seconds between heartbeat log lines while idle.
    pub heartbeat_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            watchlist: WatchlistConfig {
                dir: ".".to_string(),
                target_file: None,
            },
            fetcher: FetcherConfig {
                offer_url_template: "https://allegro.pl/oferta/{id}".to_string(),
                user_agent: "Mozilla/5.0 (compatible; OkazjaWatcher/0.1; cron-worker)"
                    .to_string(),
                accept_language: "pl-PL,pl;q=0.9".to_string(),
                connect_timeout_secs: 10,
                read_timeout_secs: 30,
                tier1_only: false,
                chrome_path: None,
                render_wait_secs: 5,
                min_id_digits: 8,
            },
            backoff: BackoffConfig {
                base_delay_ms: 800,
                jitter_ms: 800,
                soft_backoff_start_secs: 5,
                soft_backoff_max_secs: 900,
                cooldown_min_hours: 3,
                cooldown_max_hours: 8,
                single_strike: false,
            },
            batch: BatchConfig {
                size: 25,
                sleep_between_ms: 500,
                max_per_run: 0,
                global_dedup: false,
            },
            state: StateConfig {
                dir: "data".to_string(),
                recheck_ended_hours: 72,
            },
            smtp: SmtpConfig {
                host: "smtp.gmail.com".to_string(),
                port: 587,
                username: None,
                password: None,
                from_address: None,
                from_name: "Okazja Watcher".to_string(),
                to: None,
            },
            worker: WorkerConfig {
                interval_secs: 900,
                heartbeat_secs: 60,
            },
        }
    }
}

impl AppConfig {
    /// Layered load: built-in defaults, then `config/default.*`, then
    /// `OKAZJA__`-prefixed environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(Config::try_from(&AppConfig::default())?)
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::with_prefix("OKAZJA").separator("__"))
            .build()?;

        let config: AppConfig = s.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.fetcher.offer_url_template.contains("{id}") {
            return Err(ConfigError::Message(
                "fetcher.offer_url_template must contain '{id}'".into(),
            ));
        }

        if self.fetcher.min_id_digits == 0 {
            return Err(ConfigError::Message(
                "fetcher.min_id_digits must be greater than 0".into(),
            ));
        }

        if self.backoff.cooldown_min_hours > self.backoff.cooldown_max_hours {
            return Err(ConfigError::Message(
                "backoff.cooldown_min_hours cannot exceed cooldown_max_hours".into(),
            ));
        }

        if self.backoff.soft_backoff_start_secs > self.backoff.soft_backoff_max_secs {
            return Err(ConfigError::Message(
                "backoff.soft_backoff_start_secs cannot exceed soft_backoff_max_secs".into(),
            ));
        }

        if self.batch.size == 0 {
            return Err(ConfigError::Message(
                "batch.size must be greater than 0".into(),
            ));
        }

        if self.state.recheck_ended_hours <= 0 {
            return Err(ConfigError::Message(
                "state.recheck_ended_hours must be greater than 0".into(),
            ));
        }

        if self.smtp.port == 0 {
            return Err(ConfigError::Message(
                "smtp.port must be greater than 0".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_url_template_requires_placeholder() {
        let mut config = AppConfig::default();
        config.fetcher.offer_url_template = "https://allegro.pl/oferta/".to_string();

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("{id}"));
    }

    #[test]
    fn test_cooldown_bounds_ordering() {
        let mut config = AppConfig::default();
        config.backoff.cooldown_min_hours = 10;
        config.backoff.cooldown_max_hours = 5;

        let result = config.validate();
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("cooldown_min_hours"));
    }

    #[test]
    fn test_soft_backoff_bounds_ordering() {
        let mut config = AppConfig::default();
        config.backoff.soft_backoff_start_secs = 1000;
        config.backoff.soft_backoff_max_secs = 900;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_batch_size_must_be_positive() {
        let mut config = AppConfig::default();
        config.batch.size = 0;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_recheck_window_must_be_positive() {
        let mut config = AppConfig::default();
        config.state.recheck_ended_hours = 0;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_matches_polite_pacing() {
        let config = AppConfig::default();
        assert_eq!(config.backoff.base_delay_ms, 800);
        assert_eq!(config.backoff.jitter_ms, 800);
        assert!(!config.backoff.single_strike);
    }
}
