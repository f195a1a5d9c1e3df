use anyhow::{Context, Result};
use tracing::info;

use orderflow_engine::{process_hist_data, HistBar, ResampleOptions};

/// Resample a JSON array of fine bars from the command line:
/// `resample <bars.json> [timeframe]`.
fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let mut args = std::env::args().skip(1);
    let path = args
        .next()
        .context("usage: resample <bars.json> [timeframe]")?;
    let timeframe = args.next().unwrap_or_else(|| "5m".to_string());

    let content =
        std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    let bars: Vec<HistBar> =
        serde_json::from_str(&content).context("parsing bars json")?;

    let options = ResampleOptions {
        by_symbol: bars.iter().any(|bar| bar.symbol.is_some()),
        ..Default::default()
    };
    let candles = process_hist_data(&bars, &timeframe, &options)?;
    info!(bars = bars.len(), candles = candles.len(), %timeframe, "resampled");

    println!("{}", serde_json::to_string_pretty(&candles)?);
    Ok(())
}
