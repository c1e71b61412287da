// src/lib.rs
pub mod alert_event_logger;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod handlers;
pub mod price_provider;
pub mod repository;
pub mod runner;
pub mod scheduler;
pub mod telegram_notifier;
pub mod types;
