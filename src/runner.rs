// src/runner.rs
use chrono::{DateTime, FixedOffset, NaiveTime};
use log::{error, info, warn};
use std::collections::HashSet;
use std::sync::Arc;

use crate::alert_event_logger::AlertEventLogger;
use crate::error::AlertError;
use crate::evaluator::{self, EvaluatorConfig};
use crate::price_provider::DayLowProvider;
use crate::repository::{TradeStore, ZoneStore};
use crate::telegram_notifier::Notifier;
use crate::types::{ist_now, normalize_symbol, CycleSummary};

/// Optional trading-hours window. When enabled, cycles outside the window
/// are skipped entirely (no store or price traffic). Close defaults past
/// 15:30 so the end-of-day trade reset still gets a chance to run.
#[derive(Debug, Clone)]
pub struct MarketGate {
    pub enabled: bool,
    pub open: NaiveTime,
    pub close: NaiveTime,
}

impl MarketGate {
    fn allows(&self, now: DateTime<FixedOffset>) -> bool {
        if !self.enabled {
            return true;
        }
        let t = now.time();
        t >= self.open && t <= self.close
    }
}

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub evaluator: EvaluatorConfig,
    pub default_exchange_suffix: String,
    pub market_gate: MarketGate,
}

/// Drives one full check cycle: load active records, batch-fetch day lows,
/// evaluate each record, persist the flag updates, then notify. A failure
/// on one record never blocks the rest of the batch.
pub struct AlertRunner {
    zones: Arc<dyn ZoneStore>,
    trades: Arc<dyn TradeStore>,
    provider: Arc<dyn DayLowProvider>,
    notifier: Arc<dyn Notifier>,
    config: RunnerConfig,
    event_logger: Option<AlertEventLogger>,
}

impl AlertRunner {
    pub fn new(
        zones: Arc<dyn ZoneStore>,
        trades: Arc<dyn TradeStore>,
        provider: Arc<dyn DayLowProvider>,
        notifier: Arc<dyn Notifier>,
        config: RunnerConfig,
        event_logger: Option<AlertEventLogger>,
    ) -> Self {
        Self {
            zones,
            trades,
            provider,
            notifier,
            config,
            event_logger,
        }
    }

    pub async fn run_cycle(&self) -> Result<CycleSummary, AlertError> {
        self.run_cycle_at(ist_now()).await
    }

    pub async fn run_cycle_at(
        &self,
        now: DateTime<FixedOffset>,
    ) -> Result<CycleSummary, AlertError> {
        let mut summary = CycleSummary::default();

        if !self.config.market_gate.allows(now) {
            info!("🕒 [CYCLE] Market closed at {}, skipping", now.time());
            summary.gated = true;
            return Ok(summary);
        }

        let zones = self.zones.find_active().await?;
        let trades = self.trades.find_open().await?;
        summary.zones_checked = zones.len();
        summary.trades_checked = trades.len();

        if zones.is_empty() && trades.is_empty() {
            info!("🔄 [CYCLE] Nothing to check");
            return Ok(summary);
        }

        // One batched price fetch for every symbol the cycle touches.
        let suffix = &self.config.default_exchange_suffix;
        let mut seen = HashSet::new();
        let mut symbols = Vec::new();
        for raw in zones
            .iter()
            .map(|z| z.ticker.as_str())
            .chain(trades.iter().map(|t| t.symbol.as_str()))
        {
            let normalized = normalize_symbol(raw, suffix);
            if seen.insert(normalized.clone()) {
                symbols.push(normalized);
            }
        }
        summary.symbols_requested = symbols.len();

        let prices = self.provider.fetch_day_lows(&symbols).await;
        summary.symbols_priced = prices.len();

        for zone in &zones {
            let symbol = normalize_symbol(&zone.ticker, suffix);
            let day_low = match prices.get(&symbol) {
                Some(low) => *low,
                None => {
                    warn!("💤 [ZONE] No price for {}, skipping {}", symbol, zone.zone_id);
                    summary.skipped_no_price += 1;
                    continue;
                }
            };

            let outcomes = match evaluator::evaluate_zone(zone, day_low, now, &self.config.evaluator)
            {
                Ok(outcomes) => outcomes,
                Err(e) => {
                    warn!("🚫 [ZONE] Skipping invalid record: {}", e);
                    summary.invalid_records += 1;
                    continue;
                }
            };

            for outcome in outcomes {
                let id = match zone.id.as_ref() {
                    Some(id) => id,
                    None => {
                        warn!("🚫 [ZONE] {} has no _id, cannot persist", zone.zone_id);
                        summary.invalid_records += 1;
                        continue;
                    }
                };

                // Flags go down before the message goes out; if the write
                // fails, the alert is withheld rather than risk a repeat.
                if let Err(e) = self.zones.update(id, outcome.update).await {
                    error!("💾 [ZONE] Update failed for {}: {}", zone.zone_id, e);
                    summary.update_failures += 1;
                    continue;
                }

                match self.notifier.send_alert(&outcome.alert).await {
                    Ok(()) => {
                        summary.alerts_sent += 1;
                        if let Some(logger) = &self.event_logger {
                            logger.log_alert(&outcome.alert).await;
                        }
                        summary.fired.push(outcome.alert);
                    }
                    Err(e) => {
                        error!("📱 [ZONE] Delivery failed for {}: {}", zone.zone_id, e);
                        summary.delivery_failures += 1;
                    }
                }
            }
        }

        for trade in &trades {
            let symbol = normalize_symbol(&trade.symbol, suffix);
            let day_low = match prices.get(&symbol) {
                Some(low) => *low,
                None => {
                    warn!("💤 [TRADE] No price for {}, skipping", symbol);
                    summary.skipped_no_price += 1;
                    continue;
                }
            };

            let outcome =
                match evaluator::evaluate_trade(trade, day_low, now, &self.config.evaluator) {
                    Ok(Some(outcome)) => outcome,
                    Ok(None) => continue,
                    Err(e) => {
                        warn!("🚫 [TRADE] Skipping invalid record: {}", e);
                        summary.invalid_records += 1;
                        continue;
                    }
                };

            let id = match trade.id.as_ref() {
                Some(id) => id,
                None => {
                    warn!("🚫 [TRADE] {} has no _id, cannot persist", trade.symbol);
                    summary.invalid_records += 1;
                    continue;
                }
            };

            if let Err(e) = self.trades.update(id, outcome.update).await {
                error!("💾 [TRADE] Update failed for {}: {}", trade.symbol, e);
                summary.update_failures += 1;
                continue;
            }

            match outcome.alert {
                Some(event) => match self.notifier.send_alert(&event).await {
                    Ok(()) => {
                        summary.alerts_sent += 1;
                        if let Some(logger) = &self.event_logger {
                            logger.log_alert(&event).await;
                        }
                        summary.fired.push(event);
                    }
                    Err(e) => {
                        error!("📱 [TRADE] Delivery failed for {}: {}", trade.symbol, e);
                        summary.delivery_failures += 1;
                    }
                },
                // An end-of-day reset is persisted silently.
                None => summary.trade_resets += 1,
            }
        }

        info!(
            "✅ [CYCLE] {} zones, {} trades, {}/{} symbols priced, {} alerts sent ({} delivery failures, {} update failures, {} resets)",
            summary.zones_checked,
            summary.trades_checked,
            summary.symbols_priced,
            summary.symbols_requested,
            summary.alerts_sent,
            summary.delivery_failures,
            summary.update_failures,
            summary.trade_resets
        );

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn gate(enabled: bool, open: &str, close: &str) -> MarketGate {
        MarketGate {
            enabled,
            open: NaiveTime::parse_from_str(open, "%H:%M").unwrap(),
            close: NaiveTime::parse_from_str(close, "%H:%M").unwrap(),
        }
    }

    fn at(hm: &str) -> DateTime<FixedOffset> {
        use chrono::TimeZone;
        let t = NaiveTime::parse_from_str(hm, "%H:%M").unwrap();
        crate::types::ist_offset()
            .with_ymd_and_hms(2024, 6, 3, 0, 0, 0)
            .unwrap()
            .with_time(t)
            .unwrap()
    }

    #[test]
    fn test_disabled_gate_always_allows() {
        assert!(gate(false, "09:15", "16:00").allows(at("03:00")));
    }

    #[test]
    fn test_gate_is_inclusive_at_edges() {
        let g = gate(true, "09:15", "16:00");
        assert!(g.allows(at("09:15")));
        assert!(g.allows(at("16:00")));
        assert!(!g.allows(at("09:14")));
        assert!(!g.allows(at("16:01")));
    }
}
