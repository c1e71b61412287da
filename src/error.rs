// src/error.rs
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AlertError {
    #[error("database error: {0}")]
    Repository(#[from] mongodb::error::Error),

    #[error("price fetch failed for {symbol}: {reason}")]
    PriceFetch { symbol: String, reason: String },

    #[error("notification request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Telegram API returned an error: {0}")]
    Delivery(String),

    #[error("invalid record {id}: {reason}")]
    InvalidRecord { id: String, reason: String },

    #[error("notifier is not configured. Missing TELEGRAM_TOKEN or TELEGRAM_CHAT_ID")]
    NotConfigured,
}
