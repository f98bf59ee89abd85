use regex::Regex;
use rust_decimal::Decimal;
use scraper::{Html, Selector};
use std::str::FromStr;

/// Result of running the extraction strategies over one page payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    /// A price was extracted, in the site's base currency unit.
    Price(Decimal),
    /// The payload carries an ended/removed marker. Checked before any
    /// price extraction because an ended page may still contain stale
    /// price text.
    Ended(String),
    /// No strategy produced a price.
    NoPrice,
}

/// Phrases that mark a listing as no longer available. Matched
/// case-insensitively against the raw payload.
const ENDED_MARKERS: &[&str] = &[
    "oferta zakończona",
    "aukcja zakończona",
    "oferta została zakończona",
    "zakończona przez sprzedającego",
    "oferta została usunięta",
    "oferta nie istnieje",
    "listing has ended",
    "listing was removed",
];

/// JSON keys that may carry a price inside embedded structured data.
/// Intentionally permissive: with multiple offers the first successfully
/// parsed value wins, no preference between them.
const PRICE_KEYS: &[&str] = &["price", "lowPrice", "currentPrice", "amount", "highPrice"];

/// Attribute/property selectors carrying structured price metadata, in
/// priority order. Each entry is (selector, attribute).
const META_PRICE_SELECTORS: &[(&str, &str)] = &[
    (r#"meta[itemprop="price"]"#, "content"),
    (r#"meta[property="product:price:amount"]"#, "content"),
    (r#"[itemprop="price"]"#, "content"),
    (r#"[data-price]"#, "data-price"),
];

/// Pure price extraction over a raw page payload. No I/O; deterministic
/// for identical inputs.
pub struct PriceParser {
    text_price_regex: Regex,
}

impl Default for PriceParser {
    fn default() -> Self {
        Self::new()
    }
}

impl PriceParser {
    pub fn new() -> Self {
        // 1 234,56 zł / 1.234,56zł / 39,99 zł / 1,234.56 PLN. The decimal
        // part is mandatory: an ungrouped integer like "1500 zł" must not
        // surrender its last three digits as a grouped match.
        let text_price_regex = Regex::new(
            r"(?i)(\d{1,3}(?:[ .,\u{a0}]\d{3})*[.,]\d{2}|\d+[.,]\d{2})\s*(?:zł|pln)",
        )
        .expect("static price regex");
        PriceParser { text_price_regex }
    }

    /// Run all extraction strategies over the payload, most to least
    /// structured. Ended detection short-circuits everything else.
    pub fn parse(&self, payload: &str) -> ParseOutcome {
        self.parse_with_state(payload, None)
    }

    /// Like [`parse`](Self::parse), with an optional in-page state blob
    /// (e.g. embedded script data already extracted by the caller)
    /// consulted between the metadata and JSON-LD strategies.
    pub fn parse_with_state(
        &self,
        payload: &str,
        state: Option<&serde_json::Value>,
    ) -> ParseOutcome {
        if let Some(marker) = detect_ended(payload) {
            return ParseOutcome::Ended(marker);
        }

        let document = Html::parse_document(payload);

        if let Some(price) = price_from_metadata(&document) {
            return ParseOutcome::Price(price);
        }

        if let Some(price) = state.and_then(price_from_json) {
            return ParseOutcome::Price(price);
        }

        if let Some(price) = price_from_jsonld(&document) {
            return ParseOutcome::Price(price);
        }

        if let Some(price) = self.price_from_text(payload) {
            return ParseOutcome::Price(price);
        }

        ParseOutcome::NoPrice
    }

    /// Free-text currency matching. Takes the minimum of all matched
    /// values: incidental larger numbers (delivery bundles, crossed-out
    /// prices) routinely appear before the actual price.
    pub fn price_from_text(&self, payload: &str) -> Option<Decimal> {
        self.text_price_regex
            .captures_iter(payload)
            .filter_map(|c| normalize_decimal(c.get(1)?.as_str()))
            .min()
    }
}

/// Returns the matched ended-marker, if any.
pub fn detect_ended(payload: &str) -> Option<String> {
    let haystack = payload.to_lowercase();
    ENDED_MARKERS
        .iter()
        .find(|marker| haystack.contains(*marker))
        .map(|marker| marker.to_string())
}

/// Locale-aware decimal normalization. A lone comma is a decimal
/// separator; with both separators present the later one is the decimal
/// point and the earlier one groups thousands. Non-breaking spaces and
/// currency markers are stripped first.
pub fn normalize_decimal(raw: &str) -> Option<Decimal> {
    let mut s = raw
        .replace('\u{a0}', "")
        .replace('\u{202f}', "")
        .replace(' ', "");
    for marker in ["zł", "PLN", "pln", "Zł", "ZŁ"] {
        s = s.replace(marker, "");
    }
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let last_comma = s.rfind(',');
    let last_dot = s.rfind('.');
    let cleaned = match (last_comma, last_dot) {
        (Some(c), Some(d)) if c > d => {
            // "1.234,56" -> dot groups thousands, comma is decimal
            let no_dots = s.replace('.', "");
            no_dots.replacen(',', ".", no_dots.matches(',').count())
        }
        (Some(_), Some(_)) => {
            // "1,234.56" -> comma groups thousands
            s.replace(',', "")
        }
        (Some(_), None) => s.replace(',', "."),
        _ => s.to_string(),
    };

    Decimal::from_str(&cleaned).ok()
}

/// Structured metadata attributes, tried in fixed priority order. Falls
/// back to element text when the attribute is absent.
pub fn price_from_metadata(document: &Html) -> Option<Decimal> {
    for (selector_str, attr) in META_PRICE_SELECTORS {
        let selector = match Selector::parse(selector_str) {
            Ok(s) => s,
            Err(_) => continue,
        };
        for element in document.select(&selector) {
            let candidate = element
                .value()
                .attr(attr)
                .map(str::to_string)
                .unwrap_or_else(|| element.text().collect::<Vec<_>>().join(" "));
            if let Some(price) = normalize_decimal(&candidate) {
                return Some(price);
            }
        }
    }
    None
}

/// Embedded JSON-LD blocks. Each block is parsed and walked for
/// price-bearing keys; the first parseable value wins.
pub fn price_from_jsonld(document: &Html) -> Option<Decimal> {
    let selector = Selector::parse(r#"script[type="application/ld+json"]"#).ok()?;
    for script in document.select(&selector) {
        let body = script.text().collect::<String>();
        let data: serde_json::Value = match serde_json::from_str(&body) {
            Ok(v) => v,
            Err(_) => continue,
        };
        if let Some(price) = price_from_json(&data) {
            return Some(price);
        }
    }
    None
}

/// Depth-first walk over a nested mapping/sequence structure, matching
/// known price-bearing keys.
pub fn price_from_json(data: &serde_json::Value) -> Option<Decimal> {
    let mut stack = vec![data];
    while let Some(node) = stack.pop() {
        match node {
            serde_json::Value::Object(map) => {
                for key in PRICE_KEYS {
                    if let Some(value) = map.get(*key) {
                        if let Some(price) = json_number(value) {
                            return Some(price);
                        }
                    }
                }
                stack.extend(map.values());
            }
            serde_json::Value::Array(items) => stack.extend(items),
            _ => {}
        }
    }
    None
}

fn json_number(value: &serde_json::Value) -> Option<Decimal> {
    match value {
        serde_json::Value::String(s) => normalize_decimal(s),
        serde_json::Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        _ => None,
    }
}
