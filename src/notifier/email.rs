use async_trait::async_trait;
use chrono::Utc;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use std::collections::HashSet;
use tracing::{info, warn};

use crate::config::SmtpConfig;
use crate::models::AlertRecord;
use crate::notifier::Notifier;
use crate::utils::error::{AppError, Result};

/// SMTP alert mail: one message per run listing every underpriced
/// listing, plain text.
pub struct EmailNotifier {
    config: SmtpConfig,
    offer_url_template: String,
}

impl EmailNotifier {
    pub fn new(config: SmtpConfig, offer_url_template: String) -> Self {
        EmailNotifier {
            config,
            offer_url_template,
        }
    }

    /// Dedup by (label, identifier); the orchestrator should already
    /// have collapsed duplicates, this is the last line of defence.
    fn dedup(alerts: &[AlertRecord]) -> Vec<&AlertRecord> {
        let mut seen = HashSet::new();
        alerts
            .iter()
            .filter(|a| seen.insert((a.label.clone(), a.id.clone())))
            .collect()
    }

    fn format_subject(&self, count: usize) -> String {
        let now = Utc::now().format("%Y-%m-%d %H:%M:%S");
        format!("[OKAZJA] Zaniżone ceny: {} ({})", count, now)
    }

    fn format_body(&self, alerts: &[&AlertRecord]) -> String {
        let mut body = format!("Znaleziono {} zaniżonych pozycji.\n\n", alerts.len());
        for alert in alerts {
            let url = self.offer_url_template.replace("{id}", &alert.id);
            body.push_str(&format!(
                "• {} | aukcja {} | cena: {:.2} zł (min: {:.2} zł)\n  {}\n",
                alert.label, alert.id, alert.price, alert.threshold, url
            ));
        }
        body
    }

    fn build_transport(&self) -> Result<SmtpTransport> {
        let transport = match (&self.config.username, &self.config.password) {
            (Some(user), Some(pass)) => {
                SmtpTransport::starttls_relay(&self.config.host)
                    .map_err(|e| AppError::Notification(format!("SMTP relay setup: {}", e)))?
                    .port(self.config.port)
                    .credentials(Credentials::new(user.clone(), pass.clone()))
                    .build()
            }
            _ => SmtpTransport::builder_dangerous(&self.config.host)
                .port(self.config.port)
                .build(),
        };
        Ok(transport)
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn notify(&self, alerts: &[AlertRecord]) -> Result<bool> {
        if alerts.is_empty() {
            info!("no alerts, not sending mail");
            return Ok(false);
        }

        let deduped = Self::dedup(alerts);

        let from_address = self
            .config
            .from_address
            .as_deref()
            .or(self.config.username.as_deref())
            .ok_or_else(|| {
                AppError::Notification("smtp.from_address or smtp.username required".to_string())
            })?;
        let to_raw = self
            .config
            .to
            .as_deref()
            .ok_or_else(|| AppError::Notification("smtp.to is not configured".to_string()))?;

        let mut builder = Message::builder()
            .from(
                format!("{} <{}>", self.config.from_name, from_address)
                    .parse()
                    .map_err(|e| AppError::Notification(format!("bad from address: {}", e)))?,
            )
            .subject(self.format_subject(deduped.len()));

        let mut recipients = 0;
        for addr in to_raw.split(',').map(str::trim).filter(|a| !a.is_empty()) {
            builder = builder.to(addr
                .parse()
                .map_err(|e| AppError::Notification(format!("bad recipient '{}': {}", addr, e)))?);
            recipients += 1;
        }
        if recipients == 0 {
            return Err(AppError::Notification(
                "smtp.to contains no valid recipients".to_string(),
            ));
        }

        let email = builder
            .body(self.format_body(&deduped))
            .map_err(|e| AppError::Notification(format!("mail build failed: {}", e)))?;

        let mailer = self.build_transport()?;
        match mailer.send(&email) {
            Ok(_) => {
                info!(recipients, alerts = deduped.len(), "alert mail sent");
                Ok(true)
            }
            Err(e) => {
                warn!(error = %e, "alert mail failed");
                Err(AppError::Notification(format!("send failed: {}", e)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn alert(label: &str, id: &str, price: &str, threshold: &str) -> AlertRecord {
        AlertRecord {
            label: label.to_string(),
            id: id.to_string(),
            price: Decimal::from_str(price).unwrap(),
            threshold: Decimal::from_str(threshold).unwrap(),
        }
    }

    fn notifier() -> EmailNotifier {
        EmailNotifier::new(
            SmtpConfig {
                host: "smtp.example.com".to_string(),
                port: 587,
                username: Some("watcher@example.com".to_string()),
                password: Some("secret".to_string()),
                from_address: None,
                from_name: "Okazja Watcher".to_string(),
                to: Some("ops@example.com".to_string()),
            },
            "https://allegro.pl/oferta/{id}".to_string(),
        )
    }

    #[tokio::test]
    async fn test_zero_alerts_do_not_notify() {
        let result = notifier().notify(&[]).await.unwrap();
        assert!(!result);
    }

    #[test]
    fn test_dedup_by_label_and_id() {
        let alerts = vec![
            alert("Widget", "10000123", "45.00", "50.00"),
            alert("Widget", "10000123", "45.00", "50.00"),
            alert("Other", "10000123", "45.00", "50.00"),
        ];
        let deduped = EmailNotifier::dedup(&alerts);
        assert_eq!(deduped.len(), 2);
    }

    #[test]
    fn test_body_format() {
        let alerts = vec![alert("Akwesan Starter", "10000123", "45.00", "50.00")];
        let deduped = EmailNotifier::dedup(&alerts);
        let body = notifier().format_body(&deduped);

        assert!(body.contains("Znaleziono 1 zaniżonych pozycji."));
        assert!(body.contains("• Akwesan Starter | aukcja 10000123"));
        assert!(body.contains("cena: 45.00 zł (min: 50.00 zł)"));
        assert!(body.contains("https://allegro.pl/oferta/10000123"));
    }

    #[test]
    fn test_subject_contains_count() {
        let subject = notifier().format_subject(3);
        assert!(subject.starts_with("[OKAZJA] Zaniżone ceny: 3"));
    }

    #[tokio::test]
    async fn test_missing_recipient_is_error() {
        let mut n = notifier();
        n.config.to = None;
        let alerts = vec![alert("Widget", "10000123", "45.00", "50.00")];
        assert!(n.notify(&alerts).await.is_err());
    }
}
