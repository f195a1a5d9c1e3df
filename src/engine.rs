//! Process-wide aggregator registry and the live-data entry points.
//!
//! Aggregators are keyed by "symbol|timeframe|bucket_size|multiplier" and
//! created on demand. Mutation of one slot is serialized by the map; ticks
//! for different keys may be processed in parallel.

use dashmap::DashMap;
use once_cell::sync::Lazy;
use tracing::warn;

use crate::analysis::aggregator::CandleAggregator;
use crate::analysis::bucket::level_entry_mut;
use crate::analysis::session::Timeframe;
use crate::config::Settings;
use crate::data::{Candle, FootprintMap, TickEvent};
use crate::utils::math::round_dp;

static CANDLE_STATE: Lazy<DashMap<String, CandleAggregator>> = Lazy::new(DashMap::new);

fn state_key(symbol: &str, timeframe: &str, bucket_size: f64, multiplier: i64) -> String {
    format!("{symbol}|{timeframe}|{bucket_size}|{multiplier}")
}

/// Process one live tick through the registry.
///
/// When `hist_last_candle` is given and the aggregator is not already on that
/// candle, the aggregator is seeded from it so the live stream continues the
/// historical series without double counting. A tick that merely repeats the
/// seeded cumulative volume and carries no trade quantity returns the current
/// candle unchanged.
pub fn process_live_data(
    tick: &TickEvent,
    timeframe: &str,
    bucket_size: f64,
    multiplier: i64,
    hist_last_candle: Option<&Candle>,
) -> Option<Candle> {
    if tick.symbol.is_empty() || tick.ltp.is_none() {
        return None;
    }

    let key = state_key(&tick.symbol, timeframe, bucket_size, multiplier);
    let mut aggregator = CANDLE_STATE.entry(key).or_insert_with(|| {
        CandleAggregator::new(
            Timeframe::from_token(timeframe),
            bucket_size,
            multiplier,
            Settings::default(),
        )
    });

    if let Some(hist) = hist_last_candle {
        seed_aggregator(&mut aggregator, &tick.symbol, hist);
    }

    // a priming tick after seeding carries no new trade
    if tick.last_traded_qty.is_none() {
        if let (Some(incoming), Some(current)) =
            (tick.vol_traded_today, aggregator.current_candle(&tick.symbol))
        {
            if incoming == current.cum_volume {
                return Some(current.clone());
            }
        }
    }

    aggregator.process_tick(tick)
}

/// Drop one aggregator slot. Returns true when something was removed.
pub fn clear_processor_state(
    symbol: &str,
    timeframe: &str,
    bucket_size: f64,
    multiplier: i64,
) -> bool {
    CANDLE_STATE
        .remove(&state_key(symbol, timeframe, bucket_size, multiplier))
        .is_some()
}

fn seed_aggregator(aggregator: &mut CandleAggregator, symbol: &str, hist: &Candle) {
    if hist.time <= 0 {
        warn!(symbol, "historical candle without a usable time, continuing unseeded");
        return;
    }
    let already_current = aggregator
        .current_candle(symbol)
        .map_or(false, |current| current.time == hist.time);
    if already_current {
        return;
    }

    let mut seeded = hist.clone();
    seeded.symbol = symbol.to_string();

    // the source ladder may have been produced by a different rounding path
    let mut footprint = FootprintMap::new();
    for level in &hist.footprint {
        if !level.price_level.is_finite() {
            warn!(symbol, "skipping non-finite footprint level while seeding");
            continue;
        }
        let entry = level_entry_mut(&mut footprint, round_dp(level.price_level, 2));
        entry.buy += level.buy_volume;
        entry.sell += level.sell_volume;
    }

    let cum_volume = (hist.cum_volume >= 0).then_some(hist.cum_volume);
    aggregator.seed_symbol(symbol, seeded, footprint, cum_volume);
}
