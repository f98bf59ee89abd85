use regex::Regex;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::config::WatchlistConfig;
use crate::models::WatchedItem;
use crate::parser::normalize_decimal;
use crate::utils::error::{AppError, Result};

/// Loads threshold files. Two formats are accepted:
///
/// Format A: a `cena minimalna: <price>` header line followed by one
/// offer identifier (or full offer URL) per line.
///
/// Format B: `ID;MIN_PRICE` rows.
///
/// Blank lines and `#` comments are ignored. The file stem becomes the
/// item label. Duplicate identifiers within one file are dropped.
pub struct WatchlistLoader {
    header_regex: Regex,
    id_regex: Regex,
}

impl Default for WatchlistLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl WatchlistLoader {
    pub fn new() -> Self {
        WatchlistLoader {
            header_regex: Regex::new(r"(?i)cena\s*minimalna\s*:\s*([0-9][0-9 .,\t]*[0-9]|[0-9])\s*z?ł?")
                .expect("static header regex"),
            // Identifiers are at least 8 digits; shorter runs in a URL
            // slug (weights, counts) must not shadow the real id
            id_regex: Regex::new(r"(?:/oferta/)?(\d{8,})").expect("static id regex"),
        }
    }

    /// Scan a directory for `*.txt` watchlist files, optionally limited
    /// to one target file by stem or full name.
    pub fn load_dir(&self, config: &WatchlistConfig) -> Result<Vec<WatchedItem>> {
        let dir = Path::new(&config.dir);
        let mut paths: Vec<_> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().map(|e| e == "txt").unwrap_or(false))
            .collect();
        paths.sort();

        if let Some(target) = &config.target_file {
            let target_lower = target.to_lowercase();
            paths.retain(|p| {
                let stem = p
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_lowercase())
                    .unwrap_or_default();
                let name = p
                    .file_name()
                    .map(|s| s.to_string_lossy().to_lowercase())
                    .unwrap_or_default();
                stem == target_lower || name == target_lower
            });
            if paths.is_empty() {
                return Err(AppError::Watchlist(format!(
                    "target file '{}' not found in {}",
                    target, config.dir
                )));
            }
        }

        let mut items = Vec::new();
        for path in paths {
            let label = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            let contents = fs::read_to_string(&path)?;
            match self.parse_contents(&label, &contents) {
                Ok(mut file_items) => {
                    info!(file = %path.display(), count = file_items.len(), "loaded watchlist file");
                    items.append(&mut file_items);
                }
                Err(e) => {
                    // One broken file must not sink the whole run
                    warn!(file = %path.display(), error = %e, "skipping watchlist file");
                }
            }
        }
        Ok(items)
    }

    pub fn parse_contents(&self, label: &str, contents: &str) -> Result<Vec<WatchedItem>> {
        let lines: Vec<&str> = contents
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .collect();
        if lines.is_empty() {
            return Ok(Vec::new());
        }

        let items = if lines.iter().any(|l| l.contains(';')) {
            self.parse_format_b(label, &lines)?
        } else {
            self.parse_format_a(label, &lines)?
        };

        // dedup by identifier within the file
        let mut seen = HashSet::new();
        Ok(items
            .into_iter()
            .filter(|item| seen.insert(item.id.clone()))
            .collect())
    }

    /// `cena minimalna: <price>` header, then identifiers.
    fn parse_format_a(&self, label: &str, lines: &[&str]) -> Result<Vec<WatchedItem>> {
        let header = self.header_regex.captures(lines[0]).ok_or_else(|| {
            AppError::Watchlist(format!(
                "[{}] first line is not a 'cena minimalna:' header",
                label
            ))
        })?;
        let threshold = normalize_decimal(&header[1]).ok_or_else(|| {
            AppError::Watchlist(format!("[{}] unparsable threshold in header", label))
        })?;

        let mut items = Vec::new();
        for line in &lines[1..] {
            if self.header_regex.is_match(line) {
                continue;
            }
            if let Some(id) = self.extract_id(line) {
                items.push(WatchedItem {
                    id,
                    label: label.to_string(),
                    threshold,
                });
            }
        }
        Ok(items)
    }

    /// `ID;MIN_PRICE` rows; rows without a separator are ignored.
    fn parse_format_b(&self, label: &str, lines: &[&str]) -> Result<Vec<WatchedItem>> {
        let mut items = Vec::new();
        for line in lines {
            let Some((raw_id, raw_price)) = line.split_once(';') else {
                continue;
            };
            let Some(id) = self.extract_id(raw_id.trim()) else {
                continue;
            };
            let threshold = normalize_decimal(raw_price.trim()).ok_or_else(|| {
                AppError::Watchlist(format!("[{}] unparsable price in row '{}'", label, line))
            })?;
            items.push(WatchedItem {
                id,
                label: label.to_string(),
                threshold,
            });
        }
        Ok(items)
    }

    /// Accepts a bare identifier or a full offer URL.
    fn extract_id(&self, line: &str) -> Option<String> {
        self.id_regex
            .captures(line)
            .map(|c| c[1].to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use tempfile::tempdir;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_format_a_with_header() {
        let loader = WatchlistLoader::new();
        let contents = "cena minimalna: 40zł\n12345678\n87654321\n";
        let items = loader.parse_contents("Akwesan Starter", contents).unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, "12345678");
        assert_eq!(items[0].label, "Akwesan Starter");
        assert_eq!(items[0].threshold, dec("40"));
        assert_eq!(items[1].id, "87654321");
    }

    #[test]
    fn test_format_a_accepts_full_urls() {
        let loader = WatchlistLoader::new();
        let contents = "cena minimalna: 39,99\nhttps://allegro.pl/oferta/12345678\n";
        let items = loader.parse_contents("x", contents).unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "12345678");
        assert_eq!(items[0].threshold, dec("39.99"));
    }

    #[test]
    fn test_slug_url_digits_do_not_shadow_identifier() {
        let loader = WatchlistLoader::new();
        let contents =
            "cena minimalna: 40\nhttps://allegro.pl/oferta/akwesan-500g-12345678\n";
        let items = loader.parse_contents("x", contents).unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "12345678");
    }

    #[test]
    fn test_format_a_missing_header_is_error() {
        let loader = WatchlistLoader::new();
        let result = loader.parse_contents("x", "12345678\n87654321\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_format_b_rows() {
        let loader = WatchlistLoader::new();
        let contents = "12345678;49,99\n87654321;1 234,56\n";
        let items = loader.parse_contents("GR 0,5", contents).unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].threshold, dec("49.99"));
        assert_eq!(items[1].threshold, dec("1234.56"));
    }

    #[test]
    fn test_comments_and_blanks_ignored() {
        let loader = WatchlistLoader::new();
        let contents = "cena minimalna: 50\n# comment\n\n12345678\n";
        let items = loader.parse_contents("x", contents).unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_duplicates_within_file_dropped() {
        let loader = WatchlistLoader::new();
        let contents = "cena minimalna: 50\n12345678\n12345678\n";
        let items = loader.parse_contents("x", contents).unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_empty_file_yields_no_items() {
        let loader = WatchlistLoader::new();
        assert!(loader.parse_contents("x", "").unwrap().is_empty());
    }

    #[test]
    fn test_load_dir_with_target_file() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("Widget.txt"),
            "cena minimalna: 50\n12345678\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("Other.txt"),
            "cena minimalna: 10\n99999999\n",
        )
        .unwrap();

        let loader = WatchlistLoader::new();
        let config = WatchlistConfig {
            dir: dir.path().to_string_lossy().to_string(),
            target_file: Some("widget".to_string()),
        };
        let items = loader.load_dir(&config).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].label, "Widget");
    }

    #[test]
    fn test_load_dir_missing_target_is_error() {
        let dir = tempdir().unwrap();
        let loader = WatchlistLoader::new();
        let config = WatchlistConfig {
            dir: dir.path().to_string_lossy().to_string(),
            target_file: Some("nope".to_string()),
        };
        assert!(loader.load_dir(&config).is_err());
    }

    #[test]
    fn test_load_dir_broken_file_is_skipped() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("bad.txt"), "no header here\n").unwrap();
        std::fs::write(
            dir.path().join("good.txt"),
            "cena minimalna: 20\n12345678\n",
        )
        .unwrap();

        let loader = WatchlistLoader::new();
        let config = WatchlistConfig {
            dir: dir.path().to_string_lossy().to_string(),
            target_file: None,
        };
        let items = loader.load_dir(&config).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].label, "good");
    }
}
