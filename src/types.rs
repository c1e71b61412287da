// src/types.rs
use chrono::{DateTime, FixedOffset, Utc};
use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};

/// A demand zone document as stored in MongoDB.
///
/// `freshness == 0` means the zone is retired; the active query excludes it,
/// so a breached zone never re-enters the evaluation loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneRecord {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub zone_id: String,
    pub ticker: String,
    pub proximal_line: f64,
    pub distal_line: f64,
    pub freshness: i64,
    #[serde(default)]
    pub trade_score: f64,
    #[serde(default)]
    pub zone_alert_sent: bool,
    #[serde(default)]
    pub zone_entry_sent: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_alert_time: Option<BsonDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeStatus {
    Open,
    Closed,
}

/// An open trade document as stored in MongoDB.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub symbol: String,
    pub entry_price: f64,
    pub status: TradeStatus,
    #[serde(default)]
    pub alert_sent: bool,
    #[serde(default)]
    pub entry_alert_sent: bool,
}

/// Partial update for a zone document. Only the populated fields are written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ZoneUpdate {
    pub zone_alert_sent: Option<bool>,
    pub zone_entry_sent: Option<bool>,
    pub freshness: Option<i64>,
    pub trade_score: Option<f64>,
    pub last_alert_time: Option<BsonDateTime>,
}

/// Partial update for a trade document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TradeUpdate {
    pub alert_sent: Option<bool>,
    pub entry_alert_sent: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    ZoneApproaching,
    ZoneEntry,
    ZoneBreach,
    TradeApproaching,
    TradeEntry,
}

/// One notification produced by the evaluator. The notifier turns this into
/// message text; the evaluator itself never formats strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    pub kind: AlertKind,
    /// Raw ticker as stored on the record (no exchange suffix patching).
    pub symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone_id: Option<String>,
    /// The threshold that was crossed (proximal, distal or entry price).
    pub level: f64,
    pub day_low: f64,
    pub timestamp: DateTime<Utc>,
}

/// Counters for one runner cycle, surfaced on the /status endpoint.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleSummary {
    pub gated: bool,
    pub zones_checked: usize,
    pub trades_checked: usize,
    pub symbols_requested: usize,
    pub symbols_priced: usize,
    pub alerts_sent: usize,
    pub delivery_failures: usize,
    pub update_failures: usize,
    pub skipped_no_price: usize,
    pub invalid_records: usize,
    pub trade_resets: usize,
    #[serde(skip)]
    pub fired: Vec<AlertEvent>,
}

/// Appends the default exchange suffix when the ticker carries no exchange
/// qualifier. Must be used for every price lookup key so the batch fetch and
/// the per-record lookup agree on the normalized form.
pub fn normalize_symbol(raw: &str, default_suffix: &str) -> String {
    if raw.contains('.') {
        raw.to_string()
    } else {
        format!("{}{}", raw, default_suffix)
    }
}

/// Indian Standard Time, the exchange-local clock for the EOD reset and the
/// market-hours gate.
pub fn ist_offset() -> FixedOffset {
    FixedOffset::east_opt(5 * 3600 + 30 * 60).expect("IST offset is in range")
}

pub fn ist_now() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&ist_offset())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_symbol_appends_default_suffix() {
        assert_eq!(normalize_symbol("RELIANCE", ".NS"), "RELIANCE.NS");
        assert_eq!(normalize_symbol("TATAMOTORS", ".NS"), "TATAMOTORS.NS");
    }

    #[test]
    fn test_normalize_symbol_keeps_existing_exchange() {
        assert_eq!(normalize_symbol("RELIANCE.NS", ".NS"), "RELIANCE.NS");
        assert_eq!(normalize_symbol("TATASTEEL.BO", ".NS"), "TATASTEEL.BO");
    }

    #[test]
    fn test_trade_status_wire_format() {
        assert_eq!(
            serde_json::to_string(&TradeStatus::Open).unwrap(),
            "\"OPEN\""
        );
        assert_eq!(
            serde_json::from_str::<TradeStatus>("\"CLOSED\"").unwrap(),
            TradeStatus::Closed
        );
    }

    #[test]
    fn test_ist_offset_is_five_thirty() {
        assert_eq!(ist_offset().local_minus_utc(), 5 * 3600 + 30 * 60);
    }
}
