use std::collections::{BTreeMap, HashMap, HashSet};

use anyhow::{bail, Result};

use crate::analysis::aggregator::reconcile_volume_totals;
use crate::analysis::bucket::{bucket_key, level_entry_mut};
use crate::analysis::footprint::build_footprint_from_map;
use crate::analysis::session::{SessionClock, Timeframe};
use crate::config::Settings;
use crate::data::{FootprintMap, HistBar, ResampledCandle};

/// Knobs for the historical resampler.
#[derive(Debug, Clone)]
pub struct ResampleOptions {
    /// Group per symbol instead of treating the input as one series.
    pub by_symbol: bool,
    /// Build the per-candle footprint ladder.
    pub footprint: bool,
    pub bucket_size: f64,
    pub multiplier: i64,
    /// Honor precomputed buy_vol/sell_vol columns instead of re-deriving
    /// them from price direction.
    pub preserve_live_data: bool,
}

impl Default for ResampleOptions {
    fn default() -> Self {
        Self {
            by_symbol: false,
            footprint: true,
            bucket_size: 0.05,
            multiplier: 100,
            preserve_live_data: true,
        }
    }
}

#[derive(Debug, Default)]
struct GroupAgg {
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: i64,
    buy: i64,
    sell: i64,
}

/// Collapse fine bars into target-timeframe candles with footprint and
/// per-session cumulative delta/volume columns, matching what the live
/// aggregator emits so its state can be seeded from the last row.
///
/// Bars are deduplicated by (timestamp, symbol) keeping the first, then
/// binned by epoch-floored time. Note the divergence from the live path:
/// live bins are anchored on the session open, which only matters for
/// pre-open data and the 1d timeframe.
pub fn process_hist_data(
    bars: &[HistBar],
    timeframe: &str,
    options: &ResampleOptions,
) -> Result<Vec<ResampledCandle>> {
    process_hist_data_with(bars, timeframe, options, &Settings::default())
}

pub fn process_hist_data_with(
    bars: &[HistBar],
    timeframe: &str,
    options: &ResampleOptions,
    settings: &Settings,
) -> Result<Vec<ResampledCandle>> {
    let interval = Timeframe::from_token(timeframe).interval_seconds();
    let clock = SessionClock::new(&settings.session);

    for bar in bars {
        if bar.timestamp <= 0 {
            bail!("historical bar has non-positive timestamp {}", bar.timestamp);
        }
        if bar.volume < 0 {
            bail!("historical bar at {} has negative volume", bar.timestamp);
        }
    }

    let by_symbol = options.by_symbol && bars.iter().any(|bar| bar.symbol.is_some());

    // dedup by (timestamp, symbol), keeping the first occurrence
    let mut seen: HashSet<(i64, Option<&str>)> = HashSet::with_capacity(bars.len());
    let mut rows: Vec<&HistBar> = Vec::with_capacity(bars.len());
    for bar in bars {
        let symbol = if by_symbol { bar.symbol.as_deref() } else { None };
        if seen.insert((bar.timestamp, symbol)) {
            rows.push(bar);
        }
    }
    rows.sort_by(|a, b| {
        let ka = (if by_symbol { a.symbol.as_deref() } else { None }, a.timestamp);
        let kb = (if by_symbol { b.symbol.as_deref() } else { None }, b.timestamp);
        ka.cmp(&kb)
    });

    let use_precomputed = options.preserve_live_data
        && !rows.is_empty()
        && rows.iter().all(|bar| bar.buy_vol.is_some() && bar.sell_vol.is_some());

    let bucket_value = options.bucket_size * options.multiplier as f64;
    let build_footprint = options.footprint && bucket_value > 0.0;

    let mut groups: BTreeMap<(Option<String>, i64), GroupAgg> = BTreeMap::new();
    let mut footprints: HashMap<(Option<String>, i64), FootprintMap> = HashMap::new();
    let mut prev_close: HashMap<Option<&str>, f64> = HashMap::new();

    for bar in rows.iter().copied() {
        let symbol = if by_symbol { bar.symbol.as_deref() } else { None };
        let (buy, sell) = if use_precomputed {
            (bar.buy_vol.unwrap_or(0), bar.sell_vol.unwrap_or(0))
        } else {
            directional_volumes(bar, prev_close.get(&symbol).copied())
        };
        prev_close.insert(symbol, bar.close);

        let time = bar.timestamp.div_euclid(interval) * interval;
        let group_key = (symbol.map(str::to_string), time);

        let group = groups.entry(group_key.clone()).or_insert_with(|| GroupAgg {
            open: bar.open,
            high: bar.high,
            low: bar.low,
            ..Default::default()
        });
        group.high = group.high.max(bar.high);
        group.low = group.low.min(bar.low);
        group.close = bar.close;
        group.volume += bar.volume;
        group.buy += buy;
        group.sell += sell;

        if build_footprint {
            let bucket = bucket_key(bar.close, options.bucket_size, options.multiplier);
            let entry = level_entry_mut(footprints.entry(group_key).or_default(), bucket);
            entry.buy += buy;
            entry.sell += sell;
        }
    }

    // cumulative columns reset at each new trading day; the BTreeMap walk is
    // symbol-major and time-ascending, exactly the order the fold needs
    let mut out: Vec<ResampledCandle> = Vec::with_capacity(groups.len());
    let mut current_symbol: Option<String> = None;
    let mut current_trading_day: Option<i64> = None;
    let mut cum_delta = 0i64;
    let mut cum_volume = 0i64;

    for ((symbol, time), group) in groups {
        let (buy, sell) =
            reconcile_volume_totals(group.volume, group.buy, group.sell, group.open, group.close);
        let delta = buy - sell;

        let trading_day = clock.market_open_ts(time);
        if symbol != current_symbol || current_trading_day != Some(trading_day) {
            cum_delta = 0;
            cum_volume = 0;
            current_symbol = symbol.clone();
            current_trading_day = Some(trading_day);
        }
        cum_delta += delta;
        cum_volume += group.volume;

        let footprint = if build_footprint {
            footprints
                .get(&(symbol.clone(), time))
                .map(|map| {
                    build_footprint_from_map(
                        group.low,
                        group.high,
                        buy,
                        sell,
                        map,
                        bucket_value,
                        settings.limits.max_footprint_levels,
                    )
                })
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        out.push(ResampledCandle {
            symbol,
            time,
            open: group.open,
            high: group.high,
            low: group.low,
            close: group.close,
            volume: group.volume,
            buy_vol: buy,
            sell_vol: sell,
            delta,
            cum_delta,
            cum_volume,
            vol_traded_today: cum_volume,
            last_cum_volume: cum_volume,
            footprint,
        });
    }

    out.sort_by(|a, b| (a.time, a.symbol.as_deref()).cmp(&(b.time, b.symbol.as_deref())));
    Ok(out)
}

/// Heuristic buy/sell columns for bars without orderflow data: direction of
/// the bar, with flat bars classified against the previous close.
fn directional_volumes(bar: &HistBar, prev_close: Option<f64>) -> (i64, i64) {
    let rising = bar.close > bar.open
        || (bar.close == bar.open && prev_close.map_or(false, |prev| bar.close > prev));
    let falling = bar.close < bar.open
        || (bar.close == bar.open && prev_close.map_or(false, |prev| bar.close < prev));

    if rising {
        (bar.volume, 0)
    } else if falling {
        (0, bar.volume)
    } else {
        (0, 0)
    }
}
