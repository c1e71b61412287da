// src/config.rs
// All runtime settings live here. Read once at startup and passed into the
// constructors; nothing else in the crate touches std::env.
use chrono::NaiveTime;
use log::warn;
use std::env;

use crate::evaluator::EvaluatorConfig;
use crate::runner::{MarketGate, RunnerConfig};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mongo_uri: String,
    pub database: String,
    pub zone_collection: String,
    pub trade_collection: String,

    pub telegram_token: Option<String>,
    pub telegram_chat_id: Option<String>,

    pub check_interval_secs: u64,
    pub zone_approach_pct: f64,
    pub trade_approach_pct: f64,
    /// 0 disables cool-down tracking entirely.
    pub cooldown_minutes: i64,
    pub default_exchange_suffix: String,

    pub chart_api_base: String,
    pub fetch_concurrency: usize,

    pub market_gate_enabled: bool,
    pub market_open: NaiveTime,
    pub market_close: NaiveTime,

    pub http_host: String,
    pub http_port: u16,

    pub alert_log_enabled: bool,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_time(key: &str, default: NaiveTime) -> NaiveTime {
    match env::var(key) {
        Ok(raw) => NaiveTime::parse_from_str(raw.trim(), "%H:%M").unwrap_or_else(|_| {
            warn!("Could not parse {}='{}' as HH:MM, using default", key, raw);
            default
        }),
        Err(_) => default,
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let market_gate_enabled =
            env_or("MARKET_HOURS_GATE", "false").trim().to_lowercase() == "true";

        Self {
            mongo_uri: env_or("MONGODB_URI", "mongodb://localhost:27017"),
            database: env_or("MONGODB_DATABASE", "stock_zones"),
            zone_collection: env_or("ZONE_COLLECTION", "demand_zones"),
            trade_collection: env_or("TRADE_COLLECTION", "trades"),

            telegram_token: env::var("TELEGRAM_TOKEN").ok(),
            telegram_chat_id: env::var("TELEGRAM_CHAT_ID").ok(),

            check_interval_secs: env_or("CHECK_INTERVAL_SECONDS", "300")
                .parse::<u64>()
                .unwrap_or(300),
            zone_approach_pct: env_or("ZONE_APPROACH_PCT", "0.03")
                .parse::<f64>()
                .unwrap_or(0.03),
            trade_approach_pct: env_or("TRADE_APPROACH_PCT", "0.02")
                .parse::<f64>()
                .unwrap_or(0.02),
            cooldown_minutes: env_or("COOLDOWN_MINUTES", "30")
                .parse::<i64>()
                .unwrap_or(30),
            default_exchange_suffix: env_or("DEFAULT_EXCHANGE_SUFFIX", ".NS"),

            chart_api_base: env_or("CHART_API_BASE", "https://query1.finance.yahoo.com"),
            fetch_concurrency: env_or("FETCH_CONCURRENCY_LIMIT", "8")
                .parse::<usize>()
                .unwrap_or(8)
                .max(1),

            market_gate_enabled,
            market_open: env_time(
                "MARKET_OPEN",
                NaiveTime::from_hms_opt(9, 15, 0).expect("valid default open time"),
            ),
            // Later than the 15:30 close so the end-of-day trade reset still
            // gets a cycle when the gate is on.
            market_close: env_time(
                "MARKET_CLOSE",
                NaiveTime::from_hms_opt(16, 0, 0).expect("valid default close time"),
            ),

            http_host: env_or("HTTP_HOST", "127.0.0.1"),
            http_port: env_or("HTTP_PORT", "8080").parse::<u16>().unwrap_or(8080),

            alert_log_enabled: env_or("ALERT_LOG_ENABLED", "true").trim().to_lowercase()
                == "true",
        }
    }

    pub fn evaluator_config(&self) -> EvaluatorConfig {
        EvaluatorConfig {
            zone_approach_pct: self.zone_approach_pct,
            trade_approach_pct: self.trade_approach_pct,
            cooldown_minutes: self.cooldown_minutes,
        }
    }

    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            evaluator: self.evaluator_config(),
            default_exchange_suffix: self.default_exchange_suffix.clone(),
            market_gate: MarketGate {
                enabled: self.market_gate_enabled,
                open: self.market_open,
                close: self.market_close,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_env() {
        // from_env falls back to defaults when nothing is set; the vars that
        // matter for the alert math all have the documented values.
        let cfg = AppConfig::from_env();
        assert_eq!(cfg.zone_collection, "demand_zones");
        assert_eq!(cfg.trade_collection, "trades");
        assert!((cfg.zone_approach_pct - 0.03).abs() < f64::EPSILON);
        assert!((cfg.trade_approach_pct - 0.02).abs() < f64::EPSILON);
        assert_eq!(cfg.default_exchange_suffix, ".NS");
    }
}
