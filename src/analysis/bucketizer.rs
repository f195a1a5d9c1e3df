use std::collections::{BTreeMap, HashMap};

use crate::analysis::aggregator::{DedupRing, TradeKey};
use crate::analysis::aggressor::aggressor_volumes;
use crate::analysis::session::{normalize_timestamp_to_seconds, SessionClock};
use crate::analysis::volume::VolumeExtractor;
use crate::config::Settings;
use crate::data::{HistBar, TickEvent};
use crate::utils::math::price_micros;

/// Default bin width for fine bars.
const DEFAULT_BIN_SECONDS: i64 = 5;

/// Aggregates live ticks into fine OHLCV rows compatible with the historical
/// resampler's input, sharing the volume extraction, de-duplication and
/// aggressor classification of the live candle path. Lets a feed build its
/// own resampler input during the session.
pub struct TickBucketizer {
    interval_seconds: i64,
    clock: SessionClock,
    settings: Settings,
    buckets: BTreeMap<(i64, String), HistBar>,
    recent_trades: HashMap<String, DedupRing>,
    extractors: HashMap<String, VolumeExtractor>,
}

impl TickBucketizer {
    /// Five-second bins.
    pub fn new(settings: Settings) -> Self {
        Self::with_interval(DEFAULT_BIN_SECONDS, settings)
    }

    pub fn with_interval(interval_seconds: i64, settings: Settings) -> Self {
        Self {
            interval_seconds: interval_seconds.max(1),
            clock: SessionClock::new(&settings.session),
            settings,
            buckets: BTreeMap::new(),
            recent_trades: HashMap::new(),
            extractors: HashMap::new(),
        }
    }

    /// Fold one tick into its bin. Returns a copy of the bin's current row.
    pub fn process_tick(&mut self, tick: &TickEvent) -> Option<HistBar> {
        if tick.symbol.is_empty() {
            return None;
        }
        let ltp = tick.ltp.filter(|price| price.is_finite())?;
        let ts = normalize_timestamp_to_seconds(tick.feed_timestamp()?, self.clock.time_zone())?;
        let time_bin = self.clock.aligned_time_bin(ts, self.interval_seconds);

        let extractor = self.extractors.entry(tick.symbol.clone()).or_default();
        let vol = extractor.extract(
            tick.last_traded_qty,
            tick.vol_traded_today,
            self.settings.limits.max_cum_volume_step,
        );
        if vol <= 0 || vol > self.settings.limits.max_tick_volume {
            return None;
        }
        let last_cum = extractor.last_processed();

        let (buy, sell) = aggressor_volumes(tick, vol);

        let ring_capacity = self.settings.limits.recent_trade_capacity;
        let ring = self
            .recent_trades
            .entry(tick.symbol.clone())
            .or_insert_with(|| DedupRing::new(ring_capacity));
        let key = TradeKey {
            ts,
            price_micros: price_micros(ltp),
            volume: vol,
            buy,
            sell,
            trade_id: tick.trade_id.clone(),
        };
        if !ring.insert(key) {
            return None;
        }

        let row = self
            .buckets
            .entry((time_bin, tick.symbol.clone()))
            .and_modify(|row| {
                row.high = row.high.max(ltp);
                row.low = row.low.min(ltp);
                row.close = ltp;
                row.volume += vol;
                row.buy_vol = Some(row.buy_vol.unwrap_or(0) + buy);
                row.sell_vol = Some(row.sell_vol.unwrap_or(0) + sell);
                row.cum_volume = match last_cum {
                    Some(cum) => Some(cum),
                    None => Some(row.cum_volume.unwrap_or(0) + vol),
                };
            })
            .or_insert_with(|| HistBar {
                timestamp: time_bin,
                symbol: Some(tick.symbol.clone()),
                open: ltp,
                high: ltp,
                low: ltp,
                close: ltp,
                volume: vol,
                buy_vol: Some(buy),
                sell_vol: Some(sell),
                cum_volume: Some(last_cum.unwrap_or(vol)),
            });

        Some(row.clone())
    }

    /// Drain all rows, ordered by (time, symbol).
    pub fn flush(&mut self) -> Vec<HistBar> {
        let rows = std::mem::take(&mut self.buckets);
        rows.into_values().collect()
    }

    pub fn pending_rows(&self) -> usize {
        self.buckets.len()
    }
}
