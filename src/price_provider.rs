// src/price_provider.rs
// Day-low snapshots from the Yahoo Finance chart API. The batch call fans
// out per symbol under a semaphore and only returns once every symbol has
// either resolved or failed; a failed symbol is simply absent from the map.
use async_trait::async_trait;
use futures::future::join_all;
use log::{debug, info, warn};
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::error::AlertError;

#[async_trait]
pub trait DayLowProvider: Send + Sync {
    /// Normalized symbol -> latest session low. Missing key = fetch failed
    /// or no trading data for that symbol this cycle.
    async fn fetch_day_lows(&self, symbols: &[String]) -> HashMap<String, f64>;
}

pub struct YahooDayLowProvider {
    client: Client,
    base_url: String,
    concurrency_limit: usize,
}

impl YahooDayLowProvider {
    pub fn new(base_url: String, concurrency_limit: usize) -> Result<Self, AlertError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            // Yahoo rejects requests without a browser-ish agent.
            .user_agent("Mozilla/5.0 (compatible; stock-alert-bot/0.1)")
            .build()?;
        Ok(Self {
            client,
            base_url,
            concurrency_limit: concurrency_limit.max(1),
        })
    }

    async fn fetch_one(client: &Client, base_url: &str, symbol: &str) -> Result<f64, AlertError> {
        let body = fetch_chart(client, base_url, symbol, "1d").await?;
        extract_day_low(&body).ok_or_else(|| AlertError::PriceFetch {
            symbol: symbol.to_string(),
            reason: "no low data in chart response".to_string(),
        })
    }
}

/// One chart-API request, shared with the instrument filter binary.
pub async fn fetch_chart(
    client: &Client,
    base_url: &str,
    symbol: &str,
    range: &str,
) -> Result<Value, AlertError> {
    let url = format!("{}/v8/finance/chart/{}", base_url, symbol);
    let response = client
        .get(&url)
        .query(&[("interval", "1d"), ("range", range)])
        .send()
        .await
        .map_err(|e| AlertError::PriceFetch {
            symbol: symbol.to_string(),
            reason: format!("request failed: {}", e),
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(AlertError::PriceFetch {
            symbol: symbol.to_string(),
            reason: format!("chart API returned status {}", status),
        });
    }

    response.json::<Value>().await.map_err(|e| AlertError::PriceFetch {
        symbol: symbol.to_string(),
        reason: format!("bad JSON body: {}", e),
    })
}

/// Pulls the latest non-null low out of a chart response, falling back to
/// the meta field when the indicator arrays are empty.
pub fn extract_day_low(body: &Value) -> Option<f64> {
    let result = body.get("chart")?.get("result")?.get(0)?;
    if let Some(lows) = result
        .get("indicators")
        .and_then(|i| i.get("quote"))
        .and_then(|q| q.get(0))
        .and_then(|q| q.get("low"))
        .and_then(|l| l.as_array())
    {
        if let Some(low) = lows.iter().rev().find_map(|v| v.as_f64()) {
            return Some(low);
        }
    }
    result.get("meta")?.get("regularMarketDayLow")?.as_f64()
}

#[async_trait]
impl DayLowProvider for YahooDayLowProvider {
    async fn fetch_day_lows(&self, symbols: &[String]) -> HashMap<String, f64> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency_limit));
        let mut handles = Vec::new();

        for symbol in symbols {
            let permit_clone = Arc::clone(&semaphore);
            let client = self.client.clone();
            let base = self.base_url.clone();
            let sym = symbol.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permit_clone
                    .acquire_owned()
                    .await
                    .expect("price fetch semaphore closed");
                match YahooDayLowProvider::fetch_one(&client, &base, &sym).await {
                    Ok(low) => {
                        debug!("[PRICES] {} day low {:.2}", sym, low);
                        Some((sym, low))
                    }
                    Err(e) => {
                        warn!("⚠️ [PRICES] {}", e);
                        None
                    }
                }
            }));
        }

        let mut day_lows = HashMap::new();
        for result in join_all(handles).await {
            match result {
                Ok(Some((sym, low))) => {
                    day_lows.insert(sym, low);
                }
                Ok(None) => {}
                Err(e) => warn!("⚠️ [PRICES] Price fetch task panicked: {}", e),
            }
        }

        info!(
            "📊 [PRICES] Priced {} of {} symbols",
            day_lows.len(),
            symbols.len()
        );
        day_lows
    }
}
