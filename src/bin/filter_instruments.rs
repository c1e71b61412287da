// src/bin/filter_instruments.rs
//
// Offline screener that walks an instrument dump and flags symbols too
// illiquid to alert on: long stretches of flat candles, penny prices, or
// frozen highs. Appends findings to a CSV and checkpoints progress so an
// interrupted run can resume where it left off.
use clap::Parser;
use log::{info, warn};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;

use stock_alert_bot::price_provider::fetch_chart;
use stock_alert_bot::types::normalize_symbol;

#[derive(Parser, Debug)]
#[command(name = "filter_instruments", about = "Flag illiquid instruments")]
struct Args {
    /// Instrument dump with a `tradingsymbol` column
    #[arg(long, default_value = "Instruments.csv")]
    input: PathBuf,

    /// Where flagged symbols are appended
    #[arg(long, default_value = "illiquid_stocks.csv")]
    output: PathBuf,

    /// Checkpoint file holding the last processed symbol
    #[arg(long, default_value = "last_processed.txt")]
    resume_file: PathBuf,

    /// Flat (O=H=L=C) days tolerated over the lookback year
    #[arg(long, default_value_t = 5)]
    max_flat_days: usize,

    /// Symbols whose latest close is at or below this are flagged
    #[arg(long, default_value_t = 10.0)]
    min_price: f64,

    #[arg(long, default_value = "https://query1.finance.yahoo.com")]
    chart_api_base: String,

    #[arg(long, default_value = ".NS")]
    exchange_suffix: String,
}

const FROZEN_HIGH_RUN: usize = 15;

/// Returns the reason a symbol should be flagged, or None if it looks
/// tradeable. Candle arrays come straight off the chart API and may
/// contain nulls for holidays.
fn assess_liquidity(
    opens: &[Option<f64>],
    highs: &[Option<f64>],
    lows: &[Option<f64>],
    closes: &[Option<f64>],
    max_flat_days: usize,
    min_price: f64,
) -> Option<String> {
    let candles: Vec<(f64, f64, f64, f64)> = opens
        .iter()
        .zip(highs)
        .zip(lows)
        .zip(closes)
        .filter_map(|(((o, h), l), c)| Some(((*o)?, (*h)?, (*l)?, (*c)?)))
        .collect();

    if candles.is_empty() {
        return Some("no price data".to_string());
    }

    let flat_days = candles
        .iter()
        .filter(|(o, h, l, c)| o == h && h == l && l == c)
        .count();
    if flat_days > max_flat_days {
        return Some(format!("{} flat candles in lookback", flat_days));
    }

    let last_close = candles[candles.len() - 1].3;
    if last_close <= min_price {
        return Some(format!("last close {:.2} at or below floor", last_close));
    }

    let mut run = 1usize;
    for window in candles.windows(2) {
        if (window[0].1 - window[1].1).abs() < f64::EPSILON {
            run += 1;
            if run >= FROZEN_HIGH_RUN {
                return Some(format!("{} consecutive identical highs", run));
            }
        } else {
            run = 1;
        }
    }

    None
}

fn series(quote: &Value, key: &str) -> Vec<Option<f64>> {
    quote
        .get(key)
        .and_then(Value::as_array)
        .map(|arr| arr.iter().map(Value::as_f64).collect())
        .unwrap_or_default()
}

fn read_symbols(path: &PathBuf) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let col = headers
        .iter()
        .position(|h| h == "tradingsymbol")
        .ok_or("input CSV has no tradingsymbol column")?;

    let mut symbols = Vec::new();
    for record in reader.records() {
        let record = record?;
        if let Some(symbol) = record.get(col) {
            if !symbol.trim().is_empty() {
                symbols.push(symbol.trim().to_string());
            }
        }
    }
    Ok(symbols)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let args = Args::parse();
    let symbols = read_symbols(&args.input)?;
    info!("📋 Loaded {} symbols from {}", symbols.len(), args.input.display());

    // Resume past the last checkpointed symbol, if any.
    let mut start = 0usize;
    if let Ok(last) = std::fs::read_to_string(&args.resume_file) {
        let last = last.trim();
        if let Some(pos) = symbols.iter().position(|s| s == last) {
            start = pos + 1;
            info!("⏩ Resuming after {} ({} of {})", last, start, symbols.len());
        }
    }

    let mut output = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&args.output)?,
        );

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    let mut flagged = 0usize;
    for symbol in &symbols[start..] {
        let ticker = normalize_symbol(symbol, &args.exchange_suffix);

        let verdict = match fetch_chart(&client, &args.chart_api_base, &ticker, "1y").await {
            Ok(body) => {
                let quote = &body["chart"]["result"][0]["indicators"]["quote"][0];
                assess_liquidity(
                    &series(quote, "open"),
                    &series(quote, "high"),
                    &series(quote, "low"),
                    &series(quote, "close"),
                    args.max_flat_days,
                    args.min_price,
                )
            }
            Err(e) => {
                warn!("📉 {}: {}", ticker, e);
                Some("chart fetch failed".to_string())
            }
        };

        if let Some(reason) = verdict {
            info!("🚫 {} flagged: {}", symbol, reason);
            output.write_record(&[symbol.as_str(), reason.as_str()])?;
            output.flush()?;
            flagged += 1;
        }

        std::fs::write(&args.resume_file, symbol)?;
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    info!("✅ Done: {} of {} symbols flagged", flagged, symbols.len() - start);
    Ok(())
}
