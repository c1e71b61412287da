// src/telegram_notifier.rs
use async_trait::async_trait;
use log::{info, warn};
use reqwest::{Client, StatusCode};
use serde_json::json;
use std::time::Duration;

use crate::error::AlertError;
use crate::types::{AlertEvent, AlertKind};

/// How often a rate-limited send is retried before giving up.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_alert(&self, event: &AlertEvent) -> Result<(), AlertError>;
}

pub struct TelegramNotifier {
    client: Client,
    token: Option<String>,
    chat_id: Option<String>,
    enabled: bool,
}

impl TelegramNotifier {
    pub fn new(token: Option<String>, chat_id: Option<String>) -> Self {
        let enabled = token.is_some() && chat_id.is_some();

        if enabled {
            info!("📱 Telegram notifier initialized");
        } else {
            warn!("📱 Telegram notifier disabled - missing TELEGRAM_TOKEN or TELEGRAM_CHAT_ID");
        }

        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
            token,
            chat_id,
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Posts one Markdown message. A 429 is retried up to
    /// `MAX_RATE_LIMIT_RETRIES` times, sleeping for the server-provided
    /// `retry_after`; any other non-2xx is a delivery error.
    pub async fn send_message(&self, text: &str) -> Result<(), AlertError> {
        if !self.enabled {
            return Ok(());
        }

        let bot_token = self.token.as_ref().unwrap();
        let chat_id = self.chat_id.as_ref().unwrap();

        let url = format!("https://api.telegram.org/bot{}/sendMessage", bot_token);
        let payload = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown",
            "disable_web_page_preview": true
        });

        let mut attempt = 0;
        loop {
            let response = self.client.post(&url).json(&payload).send().await?;

            if response.status().is_success() {
                return Ok(());
            }

            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            if status == StatusCode::TOO_MANY_REQUESTS && attempt < MAX_RATE_LIMIT_RETRIES {
                let wait = retry_after_seconds(&body).unwrap_or(3);
                attempt += 1;
                warn!(
                    "📱 Telegram rate limited, retrying in {}s (attempt {}/{})",
                    wait, attempt, MAX_RATE_LIMIT_RETRIES
                );
                tokio::time::sleep(Duration::from_secs(wait)).await;
                continue;
            }

            return Err(AlertError::Delivery(body));
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send_alert(&self, event: &AlertEvent) -> Result<(), AlertError> {
        let text = format_alert(event);
        self.send_message(&text).await?;
        info!(
            "📱 Telegram notification sent: {:?} {} @ {:.2}",
            event.kind, event.symbol, event.day_low
        );
        Ok(())
    }
}

/// Message text per alert kind. The evaluator only produces the record;
/// all presentation lives here.
pub fn format_alert(event: &AlertEvent) -> String {
    let zone_id = event.zone_id.as_deref().unwrap_or("?");
    match event.kind {
        AlertKind::ZoneApproaching => format!(
            "📶 *{}* zone approaching entry\nZone ID: `{}`\nProximal: ₹{:.2}\nDay Low: ₹{:.2}",
            event.symbol, zone_id, event.level, event.day_low
        ),
        AlertKind::ZoneEntry => format!(
            "🎯 *{}* zone entry hit!\nZone ID: `{}`\nProximal: ₹{:.2}\nDay Low: ₹{:.2}",
            event.symbol, zone_id, event.level, event.day_low
        ),
        AlertKind::ZoneBreach => format!(
            "🛑 *{}* zone breached distal!\nZone ID: `{}`\nDistal: ₹{:.2}\nDay Low: ₹{:.2}\n⛔ Marking as not fresh",
            event.symbol, zone_id, event.level, event.day_low
        ),
        AlertKind::TradeApproaching => format!(
            "⚠️ *{}* approaching entry ₹{:.2}\nDay Low: ₹{:.2}",
            event.symbol, event.level, event.day_low
        ),
        AlertKind::TradeEntry => format!(
            "✅ *{}* entry hit ₹{:.2}\nDay Low: ₹{:.2}",
            event.symbol, event.level, event.day_low
        ),
    }
}

/// Telegram 429 bodies look like
/// `{"ok":false,"error_code":429,"parameters":{"retry_after":5}}`.
fn retry_after_seconds(body: &str) -> Option<u64> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value.get("parameters")?.get("retry_after")?.as_u64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn event(kind: AlertKind) -> AlertEvent {
        AlertEvent {
            kind,
            symbol: "RELIANCE".to_string(),
            zone_id: Some("Z-1".to_string()),
            level: 100.0,
            day_low: 97.5,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_format_zone_breach_mentions_distal_and_retirement() {
        let text = format_alert(&event(AlertKind::ZoneBreach));
        assert!(text.contains("breached distal"));
        assert!(text.contains("Marking as not fresh"));
        assert!(text.contains("Z-1"));
    }

    #[test]
    fn test_format_trade_entry_has_prices() {
        let mut e = event(AlertKind::TradeEntry);
        e.zone_id = None;
        let text = format_alert(&e);
        assert!(text.contains("₹100.00"));
        assert!(text.contains("₹97.50"));
    }

    #[test]
    fn test_retry_after_parsing() {
        let body = r#"{"ok":false,"error_code":429,"description":"Too Many Requests","parameters":{"retry_after":7}}"#;
        assert_eq!(retry_after_seconds(body), Some(7));
        assert_eq!(retry_after_seconds("not json"), None);
    }

    #[test]
    fn test_disabled_notifier_is_a_noop() {
        let notifier = TelegramNotifier::new(None, None);
        assert!(!notifier.is_enabled());
    }
}
