// src/repository.rs
// Zone and trade stores. The runner only sees the traits; MongoDB is an
// implementation detail wired up in main.
use async_trait::async_trait;
use futures::TryStreamExt;
use log::debug;
use mongodb::bson::{doc, oid::ObjectId, Document};
use mongodb::{Collection, Database};

use crate::error::AlertError;
use crate::types::{TradeRecord, TradeUpdate, ZoneRecord, ZoneUpdate};

#[async_trait]
pub trait ZoneStore: Send + Sync {
    /// Zones still worth watching: `freshness > 0`.
    async fn find_active(&self) -> Result<Vec<ZoneRecord>, AlertError>;
    async fn update(&self, id: &ObjectId, update: ZoneUpdate) -> Result<(), AlertError>;
}

#[async_trait]
pub trait TradeStore: Send + Sync {
    async fn find_open(&self) -> Result<Vec<TradeRecord>, AlertError>;
    async fn update(&self, id: &ObjectId, update: TradeUpdate) -> Result<(), AlertError>;
}

pub struct MongoZoneRepository {
    collection: Collection<ZoneRecord>,
}

impl MongoZoneRepository {
    pub fn new(db: &Database, collection_name: &str) -> Self {
        Self {
            collection: db.collection(collection_name),
        }
    }
}

fn zone_set_document(update: &ZoneUpdate) -> Document {
    let mut set = Document::new();
    if let Some(v) = update.zone_alert_sent {
        set.insert("zone_alert_sent", v);
    }
    if let Some(v) = update.zone_entry_sent {
        set.insert("zone_entry_sent", v);
    }
    if let Some(v) = update.freshness {
        set.insert("freshness", v);
    }
    if let Some(v) = update.trade_score {
        set.insert("trade_score", v);
    }
    if let Some(v) = update.last_alert_time {
        set.insert("last_alert_time", v);
    }
    set
}

fn trade_set_document(update: &TradeUpdate) -> Document {
    let mut set = Document::new();
    if let Some(v) = update.alert_sent {
        set.insert("alert_sent", v);
    }
    if let Some(v) = update.entry_alert_sent {
        set.insert("entry_alert_sent", v);
    }
    set
}

#[async_trait]
impl ZoneStore for MongoZoneRepository {
    async fn find_active(&self) -> Result<Vec<ZoneRecord>, AlertError> {
        let cursor = self
            .collection
            .find(doc! { "freshness": { "$gt": 0 } }, None)
            .await?;
        let zones: Vec<ZoneRecord> = cursor.try_collect().await?;
        debug!("[REPO] Loaded {} fresh zones", zones.len());
        Ok(zones)
    }

    async fn update(&self, id: &ObjectId, update: ZoneUpdate) -> Result<(), AlertError> {
        let set = zone_set_document(&update);
        if set.is_empty() {
            return Ok(());
        }
        self.collection
            .update_one(doc! { "_id": id.clone() }, doc! { "$set": set }, None)
            .await?;
        Ok(())
    }
}

pub struct MongoTradeRepository {
    collection: Collection<TradeRecord>,
}

impl MongoTradeRepository {
    pub fn new(db: &Database, collection_name: &str) -> Self {
        Self {
            collection: db.collection(collection_name),
        }
    }
}

#[async_trait]
impl TradeStore for MongoTradeRepository {
    async fn find_open(&self) -> Result<Vec<TradeRecord>, AlertError> {
        let cursor = self.collection.find(doc! { "status": "OPEN" }, None).await?;
        let trades: Vec<TradeRecord> = cursor.try_collect().await?;
        debug!("[REPO] Loaded {} open trades", trades.len());
        Ok(trades)
    }

    async fn update(&self, id: &ObjectId, update: TradeUpdate) -> Result<(), AlertError> {
        let set = trade_set_document(&update);
        if set.is_empty() {
            return Ok(());
        }
        self.collection
            .update_one(doc! { "_id": id.clone() }, doc! { "$set": set }, None)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zone_set_document_only_carries_present_fields() {
        let update = ZoneUpdate {
            freshness: Some(0),
            trade_score: Some(0.0),
            ..Default::default()
        };
        let set = zone_set_document(&update);
        assert_eq!(set.len(), 2);
        assert_eq!(set.get_i64("freshness").unwrap(), 0);
        assert!(set.get("zone_alert_sent").is_none());
    }

    #[test]
    fn test_trade_set_document_empty_for_noop_update() {
        assert!(trade_set_document(&TradeUpdate::default()).is_empty());
    }
}
