// src/evaluator.rs
// Pure alert decision logic. No I/O here: records and prices come in by
// value, field updates and notifications come out, and the runner applies
// them. Keeping this synchronous and deterministic is what makes the dedup
// and reset rules testable.
use chrono::{DateTime, Duration, FixedOffset, NaiveTime, Utc};
use mongodb::bson::DateTime as BsonDateTime;

use crate::error::AlertError;
use crate::types::{
    AlertEvent, AlertKind, TradeRecord, TradeUpdate, ZoneRecord, ZoneUpdate,
};

#[derive(Debug, Clone)]
pub struct EvaluatorConfig {
    pub zone_approach_pct: f64,
    pub trade_approach_pct: f64,
    /// Minutes a record is muted after any alert fired for it. 0 disables
    /// cool-down tracking and `last_alert_time` is left untouched.
    pub cooldown_minutes: i64,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            zone_approach_pct: 0.03,
            trade_approach_pct: 0.02,
            cooldown_minutes: 30,
        }
    }
}

/// One zone transition: the fields to persist and the notification to send.
#[derive(Debug, Clone)]
pub struct ZoneOutcome {
    pub update: ZoneUpdate,
    pub alert: AlertEvent,
}

/// The single trade transition for this cycle. The end-of-day reset carries
/// no alert, only a field update.
#[derive(Debug, Clone)]
pub struct TradeOutcome {
    pub update: TradeUpdate,
    pub alert: Option<AlertEvent>,
}

fn eod_reset_time() -> NaiveTime {
    NaiveTime::from_hms_opt(15, 30, 0).expect("valid reset time")
}

fn in_cooldown(last: Option<BsonDateTime>, now_utc: DateTime<Utc>, minutes: i64) -> bool {
    if minutes <= 0 {
        return false;
    }
    match last {
        Some(ts) => now_utc - ts.to_chrono() < Duration::minutes(minutes),
        None => false,
    }
}

/// Evaluates one zone against the session day low.
///
/// The three transitions are independent; approaching and entry can both
/// fire in the same cycle. A distal breach zeroes `freshness`, which removes
/// the zone from the active query for good, so the breach alert is
/// effectively once-per-breach without a dedicated sent flag.
pub fn evaluate_zone(
    zone: &ZoneRecord,
    day_low: f64,
    now: DateTime<FixedOffset>,
    cfg: &EvaluatorConfig,
) -> Result<Vec<ZoneOutcome>, AlertError> {
    if !zone.proximal_line.is_finite()
        || !zone.distal_line.is_finite()
        || zone.proximal_line <= zone.distal_line
    {
        return Err(AlertError::InvalidRecord {
            id: zone.zone_id.clone(),
            reason: format!(
                "proximal {} must be above distal {}",
                zone.proximal_line, zone.distal_line
            ),
        });
    }

    // Retired zones never produce anything, whatever the caller passed in.
    if zone.freshness <= 0 {
        return Ok(Vec::new());
    }

    let now_utc = now.with_timezone(&Utc);
    if in_cooldown(zone.last_alert_time, now_utc, cfg.cooldown_minutes) {
        return Ok(Vec::new());
    }

    let stamp = if cfg.cooldown_minutes > 0 {
        Some(BsonDateTime::from_chrono(now_utc))
    } else {
        None
    };

    let proximal = zone.proximal_line;
    let distal = zone.distal_line;
    let mut outcomes = Vec::new();

    // Approaching: within the threshold band but not an exact proximal
    // touch (the strict > 0 keeps a touch classified as entry).
    if !zone.zone_alert_sent {
        let distance_pct = (proximal - day_low).abs() / proximal;
        if distance_pct > 0.0 && distance_pct <= cfg.zone_approach_pct {
            outcomes.push(ZoneOutcome {
                update: ZoneUpdate {
                    zone_alert_sent: Some(true),
                    last_alert_time: stamp,
                    ..Default::default()
                },
                alert: AlertEvent {
                    kind: AlertKind::ZoneApproaching,
                    symbol: zone.ticker.clone(),
                    zone_id: Some(zone.zone_id.clone()),
                    level: proximal,
                    day_low,
                    timestamp: now_utc,
                },
            });
        }
    }

    if !zone.zone_entry_sent && day_low <= proximal {
        outcomes.push(ZoneOutcome {
            update: ZoneUpdate {
                zone_entry_sent: Some(true),
                last_alert_time: stamp,
                ..Default::default()
            },
            alert: AlertEvent {
                kind: AlertKind::ZoneEntry,
                symbol: zone.ticker.clone(),
                zone_id: Some(zone.zone_id.clone()),
                level: proximal,
                day_low,
                timestamp: now_utc,
            },
        });
    }

    // Breach is not flag-gated: zeroing freshness in the same apply step is
    // what stops it from firing again.
    if day_low < distal {
        outcomes.push(ZoneOutcome {
            update: ZoneUpdate {
                freshness: Some(0),
                trade_score: Some(0.0),
                last_alert_time: stamp,
                ..Default::default()
            },
            alert: AlertEvent {
                kind: AlertKind::ZoneBreach,
                symbol: zone.ticker.clone(),
                zone_id: Some(zone.zone_id.clone()),
                level: distal,
                day_low,
                timestamp: now_utc,
            },
        });
    }

    Ok(outcomes)
}

/// Evaluates one open trade. At most one of the three rules fires; entry-hit
/// is checked before approaching so a low that is both "near" and "through"
/// the entry price reports the entry, not the approach.
pub fn evaluate_trade(
    trade: &TradeRecord,
    day_low: f64,
    now: DateTime<FixedOffset>,
    cfg: &EvaluatorConfig,
) -> Result<Option<TradeOutcome>, AlertError> {
    if !trade.entry_price.is_finite() || trade.entry_price <= 0.0 {
        return Err(AlertError::InvalidRecord {
            id: trade.symbol.clone(),
            reason: format!("entry_price {} must be positive", trade.entry_price),
        });
    }

    let now_utc = now.with_timezone(&Utc);
    let entry = trade.entry_price;

    if day_low <= entry {
        if !trade.entry_alert_sent {
            return Ok(Some(TradeOutcome {
                update: TradeUpdate {
                    entry_alert_sent: Some(true),
                    ..Default::default()
                },
                alert: Some(AlertEvent {
                    kind: AlertKind::TradeEntry,
                    symbol: trade.symbol.clone(),
                    zone_id: None,
                    level: entry,
                    day_low,
                    timestamp: now_utc,
                }),
            }));
        }
        return Ok(None);
    }

    // day_low > entry here, so the distance is strictly positive.
    if !trade.alert_sent && (day_low - entry) / entry <= cfg.trade_approach_pct {
        return Ok(Some(TradeOutcome {
            update: TradeUpdate {
                alert_sent: Some(true),
                ..Default::default()
            },
            alert: Some(AlertEvent {
                kind: AlertKind::TradeApproaching,
                symbol: trade.symbol.clone(),
                zone_id: None,
                level: entry,
                day_low,
                timestamp: now_utc,
            }),
        }));
    }

    // After the close, clear the approaching flag so it can re-fire next
    // session. Silent: no notification.
    if trade.alert_sent && !trade.entry_alert_sent && now.time() >= eod_reset_time() {
        return Ok(Some(TradeOutcome {
            update: TradeUpdate {
                alert_sent: Some(false),
                ..Default::default()
            },
            alert: None,
        }));
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ist_offset;
    use chrono::TimeZone;

    fn zone(proximal: f64, distal: f64) -> ZoneRecord {
        ZoneRecord {
            id: None,
            zone_id: "Z-1".to_string(),
            ticker: "RELIANCE".to_string(),
            proximal_line: proximal,
            distal_line: distal,
            freshness: 3,
            trade_score: 1.5,
            zone_alert_sent: false,
            zone_entry_sent: false,
            last_alert_time: None,
        }
    }

    fn trade(entry: f64) -> TradeRecord {
        TradeRecord {
            id: None,
            symbol: "TCS".to_string(),
            entry_price: entry,
            status: crate::types::TradeStatus::Open,
            alert_sent: false,
            entry_alert_sent: false,
        }
    }

    fn midday() -> DateTime<FixedOffset> {
        ist_offset().with_ymd_and_hms(2024, 1, 15, 11, 0, 0).unwrap()
    }

    fn after_close() -> DateTime<FixedOffset> {
        ist_offset().with_ymd_and_hms(2024, 1, 15, 15, 30, 0).unwrap()
    }

    fn no_cooldown() -> EvaluatorConfig {
        EvaluatorConfig {
            cooldown_minutes: 0,
            ..Default::default()
        }
    }

    fn kinds(outcomes: &[ZoneOutcome]) -> Vec<AlertKind> {
        outcomes.iter().map(|o| o.alert.kind).collect()
    }

    #[test]
    fn test_zone_approaching_only_from_above() {
        // 2% above proximal: inside the band but not through it.
        let outcomes = evaluate_zone(&zone(100.0, 90.0), 102.0, midday(), &no_cooldown()).unwrap();
        assert_eq!(kinds(&outcomes), vec![AlertKind::ZoneApproaching]);
        assert_eq!(outcomes[0].update.zone_alert_sent, Some(true));
        assert_eq!(outcomes[0].update.freshness, None);
    }

    #[test]
    fn test_zone_approaching_and_entry_both_fire() {
        // 97.5 is within 3% of 100 and at-or-below it: two independent
        // transitions in the same cycle, no breach (97.5 >= 90).
        let outcomes = evaluate_zone(&zone(100.0, 90.0), 97.5, midday(), &no_cooldown()).unwrap();
        assert_eq!(
            kinds(&outcomes),
            vec![AlertKind::ZoneApproaching, AlertKind::ZoneEntry]
        );
    }

    #[test]
    fn test_zone_exact_proximal_touch_is_entry_not_approach() {
        let outcomes = evaluate_zone(&zone(100.0, 90.0), 100.0, midday(), &no_cooldown()).unwrap();
        assert_eq!(kinds(&outcomes), vec![AlertKind::ZoneEntry]);
    }

    #[test]
    fn test_zone_breach_zeroes_freshness_and_score_regardless_of_flags() {
        let mut z = zone(100.0, 90.0);
        z.zone_alert_sent = true;
        z.zone_entry_sent = true;
        let outcomes = evaluate_zone(&z, 85.0, midday(), &no_cooldown()).unwrap();
        assert_eq!(kinds(&outcomes), vec![AlertKind::ZoneBreach]);
        assert_eq!(outcomes[0].update.freshness, Some(0));
        assert_eq!(outcomes[0].update.trade_score, Some(0.0));
        assert_eq!(outcomes[0].alert.level, 90.0);
    }

    #[test]
    fn test_zone_sent_flags_suppress_refire() {
        let mut z = zone(100.0, 90.0);
        z.zone_alert_sent = true;
        z.zone_entry_sent = true;
        // Same qualifying price as the double-fire case: nothing new fires.
        let outcomes = evaluate_zone(&z, 97.5, midday(), &no_cooldown()).unwrap();
        assert!(outcomes.is_empty());
    }

    #[test]
    fn test_zone_with_zero_freshness_is_inert() {
        let mut z = zone(100.0, 90.0);
        z.freshness = 0;
        let outcomes = evaluate_zone(&z, 85.0, midday(), &no_cooldown()).unwrap();
        assert!(outcomes.is_empty());
    }

    #[test]
    fn test_zone_invalid_when_proximal_not_above_distal() {
        let err = evaluate_zone(&zone(90.0, 100.0), 95.0, midday(), &no_cooldown());
        assert!(matches!(err, Err(AlertError::InvalidRecord { .. })));
    }

    #[test]
    fn test_zone_cooldown_suppresses_everything() {
        let cfg = EvaluatorConfig::default(); // 30 minute cool-down
        let mut z = zone(100.0, 90.0);
        let now = midday();
        z.last_alert_time = Some(BsonDateTime::from_chrono(
            now.with_timezone(&Utc) - Duration::minutes(10),
        ));
        let outcomes = evaluate_zone(&z, 97.5, now, &cfg).unwrap();
        assert!(outcomes.is_empty());
    }

    #[test]
    fn test_zone_cooldown_expired_fires_and_restamps() {
        let cfg = EvaluatorConfig::default();
        let mut z = zone(100.0, 90.0);
        let now = midday();
        z.last_alert_time = Some(BsonDateTime::from_chrono(
            now.with_timezone(&Utc) - Duration::minutes(45),
        ));
        let outcomes = evaluate_zone(&z, 102.0, now, &cfg).unwrap();
        assert_eq!(kinds(&outcomes), vec![AlertKind::ZoneApproaching]);
        assert_eq!(
            outcomes[0].update.last_alert_time,
            Some(BsonDateTime::from_chrono(now.with_timezone(&Utc)))
        );
    }

    #[test]
    fn test_zone_no_stamp_when_cooldown_disabled() {
        let outcomes = evaluate_zone(&zone(100.0, 90.0), 102.0, midday(), &no_cooldown()).unwrap();
        assert_eq!(outcomes[0].update.last_alert_time, None);
    }

    #[test]
    fn test_trade_entry_takes_precedence_over_approaching() {
        // 49.5 satisfies the 2% approach band AND the entry condition: only
        // the entry alert fires.
        let outcome = evaluate_trade(&trade(50.0), 49.5, midday(), &no_cooldown())
            .unwrap()
            .unwrap();
        let alert = outcome.alert.unwrap();
        assert_eq!(alert.kind, AlertKind::TradeEntry);
        assert_eq!(outcome.update.entry_alert_sent, Some(true));
        assert_eq!(outcome.update.alert_sent, None);
    }

    #[test]
    fn test_trade_approaching_from_above() {
        let outcome = evaluate_trade(&trade(50.0), 50.8, midday(), &no_cooldown())
            .unwrap()
            .unwrap();
        assert_eq!(outcome.alert.unwrap().kind, AlertKind::TradeApproaching);
        assert_eq!(outcome.update.alert_sent, Some(true));
    }

    #[test]
    fn test_trade_outside_band_does_nothing() {
        let outcome = evaluate_trade(&trade(50.0), 51.5, midday(), &no_cooldown()).unwrap();
        assert!(outcome.is_none());
    }

    #[test]
    fn test_trade_flags_prevent_refire() {
        let mut t = trade(50.0);
        t.entry_alert_sent = true;
        assert!(evaluate_trade(&t, 49.5, midday(), &no_cooldown())
            .unwrap()
            .is_none());

        let mut t = trade(50.0);
        t.alert_sent = true;
        assert!(evaluate_trade(&t, 50.8, midday(), &no_cooldown())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_trade_eod_reset_clears_flag_silently() {
        let mut t = trade(50.0);
        t.alert_sent = true;
        let outcome = evaluate_trade(&t, 52.0, after_close(), &no_cooldown())
            .unwrap()
            .unwrap();
        assert_eq!(outcome.update.alert_sent, Some(false));
        assert!(outcome.alert.is_none());
    }

    #[test]
    fn test_trade_eod_reset_fires_past_the_hour() {
        // 16:05 must also reset; the old `minute >= 30` comparison missed it.
        let mut t = trade(50.0);
        t.alert_sent = true;
        let late = ist_offset().with_ymd_and_hms(2024, 1, 15, 16, 5, 0).unwrap();
        let outcome = evaluate_trade(&t, 52.0, late, &no_cooldown()).unwrap();
        assert!(outcome.is_some());
    }

    #[test]
    fn test_trade_no_reset_before_close_or_after_entry() {
        let mut t = trade(50.0);
        t.alert_sent = true;
        assert!(evaluate_trade(&t, 52.0, midday(), &no_cooldown())
            .unwrap()
            .is_none());

        t.entry_alert_sent = true;
        assert!(evaluate_trade(&t, 52.0, after_close(), &no_cooldown())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_trade_invalid_entry_price() {
        let err = evaluate_trade(&trade(0.0), 49.5, midday(), &no_cooldown());
        assert!(matches!(err, Err(AlertError::InvalidRecord { .. })));
    }
}
