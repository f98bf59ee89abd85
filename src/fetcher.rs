use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE};
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::config::FetcherConfig;
use crate::models::FetchOutcome;
use crate::parser::{detect_ended, normalize_decimal, ParseOutcome, PriceParser};
use crate::renderer::PageRenderer;
use crate::utils::error::{AppError, Result};

/// Rendered-DOM selector candidates, tried in fixed priority order. The
/// first non-empty, numerically parsable result wins.
const DOM_PRICE_SELECTORS: &[&str] = &[
    r#"[data-price]"#,
    r#"[itemprop="price"]"#,
    ".price",
    ".offer-price",
    ".product-price",
];

/// Obtains a page payload for one identifier, cheap transport first,
/// rendering transport second, and classifies every attempt into exactly
/// one [`FetchOutcome`].
pub struct Fetcher {
    config: FetcherConfig,
    http: reqwest::Client,
    renderer: Option<Arc<dyn PageRenderer>>,
    parser: PriceParser,
    id_regex: Regex,
    slug_id_regex: Regex,
    challenge_regex: Regex,
}

impl Fetcher {
    pub fn new(config: FetcherConfig, renderer: Option<Arc<dyn PageRenderer>>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_str(&config.accept_language)
                .map_err(|e| AppError::Internal(format!("invalid accept_language: {}", e)))?,
        );

        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.read_timeout_secs))
            .build()?;

        let id_regex = Regex::new(&format!(r"^\d{{{},}}$", config.min_id_digits))
            .map_err(|e| AppError::Internal(format!("bad id regex: {}", e)))?;
        let slug_id_regex = Regex::new(&format!(r"\d{{{},}}", config.min_id_digits))
            .map_err(|e| AppError::Internal(format!("bad slug id regex: {}", e)))?;
        let challenge_regex =
            Regex::new(r"(?is)captcha|nie\s*jesteś\s*robotem|przepraszamy.*zabezpieczenie")
                .map_err(|e| AppError::Internal(format!("bad challenge regex: {}", e)))?;

        Ok(Fetcher {
            config,
            http,
            renderer,
            parser: PriceParser::new(),
            id_regex,
            slug_id_regex,
            challenge_regex,
        })
    }

    /// Reduce a raw watchlist entry (bare identifier or full offer URL)
    /// to a canonical identifier. Rejected entries never reach the
    /// network.
    pub fn validate_identifier(&self, raw: &str) -> Result<String> {
        let raw = raw.trim();
        if raw.contains("://") {
            let parsed = Url::parse(raw).map_err(|e| {
                AppError::Validation(format!("'{}' is not a valid offer URL: {}", raw, e))
            })?;
            // Slugged offer paths carry the identifier as the trailing
            // digit run; shorter runs in the slug never qualify.
            return self
                .slug_id_regex
                .find_iter(parsed.path())
                .last()
                .map(|m| m.as_str().to_string())
                .ok_or_else(|| {
                    AppError::Validation(format!(
                        "URL '{}' carries no numeric id of at least {} digits",
                        raw, self.config.min_id_digits
                    ))
                });
        }

        let candidate = raw
            .rsplit_once("/oferta/")
            .map(|(_, tail)| tail)
            .unwrap_or(raw);
        if self.id_regex.is_match(candidate) {
            Ok(candidate.to_string())
        } else {
            Err(AppError::Validation(format!(
                "identifier '{}' is not a numeric id of at least {} digits",
                raw, self.config.min_id_digits
            )))
        }
    }

    pub fn offer_url(&self, id: &str) -> String {
        self.config.offer_url_template.replace("{id}", id)
    }

    /// Fetch one validated identifier. Never panics and never drops an
    /// outcome; every failure mode maps to a [`FetchOutcome`] variant.
    pub async fn fetch(&self, id: &str) -> FetchOutcome {
        let url = self.offer_url(id);
        let tier1 = self.fetch_tier1(&url).await;

        match &tier1 {
            FetchOutcome::Priced(price) => {
                debug!(id, %price, "tier 1 extracted price");
                tier1
            }
            // Terminal at tier 1: an ended page is ended regardless of
            // transport, and a block signal is not worked around by
            // switching tiers.
            outcome if outcome.is_terminal() => tier1,
            _ if self.config.tier1_only || self.renderer.is_none() => tier1,
            _ => {
                debug!(id, "tier 1 produced no price, escalating to renderer");
                self.fetch_tier2(&url).await
            }
        }
    }

    async fn fetch_tier1(&self, url: &str) -> FetchOutcome {
        let response = match self.http.get(url).send().await {
            Ok(r) => r,
            Err(e) => return FetchOutcome::TransportError(format!("request failed: {}", e)),
        };

        let status = response.status();
        match status {
            StatusCode::NOT_FOUND | StatusCode::GONE => {
                return FetchOutcome::Ended(format!("HTTP {}", status.as_u16()));
            }
            StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
                return FetchOutcome::Blocked(format!("HTTP {}", status.as_u16()));
            }
            _ => {}
        }

        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => return FetchOutcome::TransportError(format!("body read failed: {}", e)),
        };

        if self.challenge_regex.is_match(&body) {
            return FetchOutcome::Blocked("challenge phrase in body".to_string());
        }

        if !status.is_success() {
            return FetchOutcome::TransportError(format!("HTTP {}", status.as_u16()));
        }

        match self.parser.parse(&body) {
            ParseOutcome::Price(price) => FetchOutcome::Priced(price),
            ParseOutcome::Ended(marker) => FetchOutcome::Ended(marker),
            ParseOutcome::NoPrice => {
                FetchOutcome::NotFound("no price extractable from direct fetch".to_string())
            }
        }
    }

    async fn fetch_tier2(&self, url: &str) -> FetchOutcome {
        let Some(renderer) = self.renderer.clone() else {
            return FetchOutcome::NotFound("rendering tier disabled".to_string());
        };

        let owned_url = url.to_string();
        let rendered =
            tokio::task::spawn_blocking(move || renderer.render(&owned_url)).await;

        let html = match rendered {
            Ok(Ok(html)) => html,
            Ok(Err(e)) => {
                warn!(url, error = %e, "render failed");
                return FetchOutcome::TransportError(format!("render failed: {}", e));
            }
            Err(e) => {
                return FetchOutcome::TransportError(format!("render task failed: {}", e));
            }
        };

        if self.challenge_regex.is_match(&html) {
            return FetchOutcome::Blocked("challenge phrase in rendered page".to_string());
        }
        if let Some(marker) = detect_ended(&html) {
            return FetchOutcome::Ended(marker);
        }

        if let Some(price) = self.price_from_selectors(&html) {
            return FetchOutcome::Priced(price);
        }

        match self.parser.parse(&html) {
            ParseOutcome::Price(price) => FetchOutcome::Priced(price),
            ParseOutcome::Ended(marker) => FetchOutcome::Ended(marker),
            ParseOutcome::NoPrice => {
                FetchOutcome::NotFound("no price extractable from rendered page".to_string())
            }
        }
    }

    /// Rendered-DOM candidates: attribute value first where the selector
    /// names one, element text otherwise.
    fn price_from_selectors(&self, html: &str) -> Option<rust_decimal::Decimal> {
        let document = scraper::Html::parse_document(html);
        for selector_str in DOM_PRICE_SELECTORS {
            let selector = scraper::Selector::parse(selector_str).ok()?;
            for element in document.select(&selector) {
                let candidate = element
                    .value()
                    .attr("data-price")
                    .or_else(|| element.value().attr("content"))
                    .map(str::to_string)
                    .unwrap_or_else(|| element.text().collect::<Vec<_>>().join(" "));
                if let Some(price) = normalize_decimal(&candidate) {
                    return Some(price);
                }
            }
        }
        None
    }
}
