// src/handlers.rs
use actix_web::{web, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::types::{AlertEvent, CycleSummary};

const RECENT_ALERTS_CAP: usize = 100;

/// Shared snapshot of the background service, served over HTTP.
#[derive(Debug, Serialize)]
pub struct ServiceStatus {
    pub started_at: DateTime<Utc>,
    pub cycles_run: u64,
    pub cycles_failed: u64,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub last_summary: Option<CycleSummary>,
    pub recent_alerts: VecDeque<AlertEvent>,
}

impl ServiceStatus {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            cycles_run: 0,
            cycles_failed: 0,
            last_cycle_at: None,
            last_summary: None,
            recent_alerts: VecDeque::new(),
        }
    }

    pub fn push_alert(&mut self, event: AlertEvent) {
        if self.recent_alerts.len() >= RECENT_ALERTS_CAP {
            self.recent_alerts.pop_front();
        }
        self.recent_alerts.push_back(event);
    }
}

impl Default for ServiceStatus {
    fn default() -> Self {
        Self::new()
    }
}

pub struct AppState {
    pub status: Arc<RwLock<ServiceStatus>>,
}

pub async fn health_check() -> impl Responder {
    HttpResponse::Ok().body("Stock Alert Bot is running")
}

pub async fn status(state: web::Data<AppState>) -> impl Responder {
    let status = state.status.read().await;
    HttpResponse::Ok().json(&*status)
}

pub async fn recent_alerts(state: web::Data<AppState>) -> impl Responder {
    let status = state.status.read().await;
    HttpResponse::Ok().json(&status.recent_alerts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AlertKind;

    fn event(symbol: &str) -> AlertEvent {
        AlertEvent {
            kind: AlertKind::ZoneEntry,
            symbol: symbol.to_string(),
            zone_id: None,
            level: 10.0,
            day_low: 9.5,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_recent_alerts_are_capped() {
        let mut status = ServiceStatus::new();
        for i in 0..150 {
            status.push_alert(event(&format!("SYM{}", i)));
        }
        assert_eq!(status.recent_alerts.len(), RECENT_ALERTS_CAP);
        assert_eq!(status.recent_alerts.front().unwrap().symbol, "SYM50");
        assert_eq!(status.recent_alerts.back().unwrap().symbol, "SYM149");
    }
}
