use std::collections::{HashMap, HashSet, VecDeque};

use tracing::warn;

use crate::analysis::aggressor::aggressor_volumes;
use crate::analysis::alloc::proportional_alloc;
use crate::analysis::bucket::{bucket_key, level_entry_mut};
use crate::analysis::footprint::build_footprint_from_map;
use crate::analysis::session::{normalize_timestamp_to_seconds, SessionClock, Timeframe};
use crate::analysis::volume::VolumeExtractor;
use crate::config::Settings;
use crate::data::{Candle, FootprintMap, TickEvent};
use crate::utils::math::price_micros;

/// Identity of one trade, used to fold replayed duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct TradeKey {
    pub ts: i64,
    pub price_micros: i64,
    pub volume: i64,
    pub buy: i64,
    pub sell: i64,
    pub trade_id: Option<String>,
}

/// Bounded FIFO of recent trade keys with O(1) membership checks.
#[derive(Debug)]
pub(crate) struct DedupRing {
    order: VecDeque<TradeKey>,
    seen: HashSet<TradeKey>,
    capacity: usize,
}

impl DedupRing {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            order: VecDeque::with_capacity(capacity),
            seen: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    /// Returns false when the key was already present.
    pub fn insert(&mut self, key: TradeKey) -> bool {
        if self.seen.contains(&key) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.seen.remove(&evicted);
            }
        }
        self.seen.insert(key.clone());
        self.order.push_back(key);
        true
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.seen.clear();
    }
}

/// Everything the aggregator tracks for one symbol.
#[derive(Debug)]
struct SymbolState {
    candle: Option<Candle>,
    footprint: FootprintMap,
    recent_trades: DedupRing,
    extractor: VolumeExtractor,
    last_ltp: Option<f64>,
    /// Latest cumulative session volume the feed reported, accepted or not.
    last_seen_cum_volume: Option<i64>,
    session_cum_delta: i64,
    last_trading_day: Option<i64>,
    current_candle_time: Option<i64>,
}

impl SymbolState {
    fn new(ring_capacity: usize) -> Self {
        Self {
            candle: None,
            footprint: FootprintMap::new(),
            recent_trades: DedupRing::new(ring_capacity),
            extractor: VolumeExtractor::default(),
            last_ltp: None,
            last_seen_cum_volume: None,
            session_cum_delta: 0,
            last_trading_day: None,
            current_candle_time: None,
        }
    }
}

/// Live per-tick candle aggregator with footprint and per-session cumulative
/// delta for one (timeframe, bucket) configuration across many symbols.
pub struct CandleAggregator {
    timeframe: Timeframe,
    bucket_size: f64,
    multiplier: i64,
    clock: SessionClock,
    settings: Settings,
    symbols: HashMap<String, SymbolState>,
}

impl CandleAggregator {
    pub fn new(timeframe: Timeframe, bucket_size: f64, multiplier: i64, settings: Settings) -> Self {
        Self {
            timeframe,
            bucket_size,
            multiplier,
            clock: SessionClock::new(&settings.session),
            settings,
            symbols: HashMap::new(),
        }
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn current_candle(&self, symbol: &str) -> Option<&Candle> {
        self.symbols.get(symbol).and_then(|state| state.candle.as_ref())
    }

    /// Bin start of the candle currently being built for a symbol.
    pub fn current_candle_time(&self, symbol: &str) -> Option<i64> {
        self.symbols.get(symbol).and_then(|state| state.current_candle_time)
    }

    pub fn last_traded_price(&self, symbol: &str) -> Option<f64> {
        self.symbols.get(symbol).and_then(|state| state.last_ltp)
    }

    /// Ingest one tick. Returns a copy of the symbol's current candle, or
    /// `None` when the tick is invalid, duplicated, or carries no volume.
    pub fn process_tick(&mut self, tick: &TickEvent) -> Option<Candle> {
        if tick.symbol.is_empty() {
            return None;
        }
        let ltp = tick.ltp.filter(|price| price.is_finite())?;
        let ts = normalize_timestamp_to_seconds(tick.feed_timestamp()?, self.clock.time_zone())?;

        let interval = self.timeframe.interval_seconds();
        let time_bin = self.clock.aligned_time_bin(ts, interval);
        let first_of_day = self.is_first_candle_of_day(time_bin);
        let trading_day = self.clock.market_open_ts(time_bin);

        let max_tick_volume = self.settings.limits.max_tick_volume;
        let max_step = self.settings.limits.max_cum_volume_step;
        let ring_capacity = self.settings.limits.recent_trade_capacity;
        let max_levels = self.settings.limits.max_footprint_levels;
        let bucket_size = self.bucket_size;
        let multiplier = self.multiplier;

        let state = self
            .symbols
            .entry(tick.symbol.clone())
            .or_insert_with(|| SymbolState::new(ring_capacity));

        if let Some(cum) = tick.vol_traded_today.filter(|c| *c >= 0) {
            state.last_seen_cum_volume = Some(cum);
        }

        let vol = state
            .extractor
            .extract(tick.last_traded_qty, tick.vol_traded_today, max_step);
        if vol <= 0 || vol > max_tick_volume {
            return None;
        }

        state.last_ltp = Some(ltp);

        let (mut buy, mut sell) = aggressor_volumes(tick, vol);
        let diff = vol - (buy + sell);
        if diff != 0 {
            if buy >= sell {
                buy += diff;
            } else {
                sell += diff;
            }
        }

        let trade_key = TradeKey {
            ts,
            price_micros: price_micros(ltp),
            volume: vol,
            buy,
            sell,
            trade_id: tick.trade_id.clone(),
        };
        if !state.recent_trades.insert(trade_key) {
            return None;
        }

        let bucket = bucket_key(ltp, bucket_size, multiplier);

        let is_new = state.candle.as_ref().map_or(true, |c| c.time != time_bin);
        if is_new {
            if state.last_trading_day != Some(trading_day) {
                state.session_cum_delta = 0;
                state.last_trading_day = Some(trading_day);
            }
            state.current_candle_time = Some(time_bin);

            let open = match tick.open_price {
                Some(daily_open) if first_of_day => daily_open,
                _ => ltp,
            };

            let delta = buy - sell;
            state.session_cum_delta += delta;

            state.candle = Some(Candle {
                symbol: tick.symbol.clone(),
                time: time_bin,
                open,
                high: ltp,
                low: ltp,
                close: ltp,
                volume: vol,
                buy_vol: buy,
                sell_vol: sell,
                delta,
                cum_delta: state.session_cum_delta,
                cum_volume: state.last_seen_cum_volume.unwrap_or(vol),
                footprint: Vec::new(),
            });
            state.footprint = FootprintMap::new();
            level_entry_mut(&mut state.footprint, bucket).buy += buy;
            level_entry_mut(&mut state.footprint, bucket).sell += sell;
        } else if let Some(candle) = state.candle.as_mut() {
            candle.high = candle.high.max(ltp);
            candle.low = candle.low.min(ltp);
            candle.close = ltp;
            candle.volume += vol;
            candle.buy_vol += buy;
            candle.sell_vol += sell;

            let new_delta = candle.buy_vol - candle.sell_vol;
            state.session_cum_delta += new_delta - candle.delta;
            candle.delta = new_delta;
            candle.cum_delta = state.session_cum_delta;

            candle.cum_volume = match state.last_seen_cum_volume {
                Some(cum) => cum,
                None => candle.cum_volume + vol,
            };

            let entry = level_entry_mut(&mut state.footprint, bucket);
            entry.buy += buy;
            entry.sell += sell;
        }

        reconcile_candle_and_footprint(state, bucket_size, multiplier, max_levels);

        state.candle.clone()
    }

    /// Install a historical candle as the symbol's current state so live
    /// ticks continue it instead of opening a fresh candle.
    pub(crate) fn seed_symbol(
        &mut self,
        symbol: &str,
        seeded: Candle,
        footprint: FootprintMap,
        cum_volume: Option<i64>,
    ) {
        let trading_day = self.clock.market_open_ts(seeded.time);
        let ring_capacity = self.settings.limits.recent_trade_capacity;
        let state = self
            .symbols
            .entry(symbol.to_string())
            .or_insert_with(|| SymbolState::new(ring_capacity));

        state.session_cum_delta = seeded.cum_delta;
        state.current_candle_time = Some(seeded.time);
        state.last_trading_day = Some(trading_day);
        state.last_ltp = Some(seeded.close);
        if !footprint.is_empty() {
            state.footprint = footprint;
        }
        if let Some(cum) = cum_volume.filter(|c| *c >= 0) {
            state.extractor.seed(cum);
            state.last_seen_cum_volume = Some(cum);
            // old trade keys predate the snapshot and must not fold new ones
            state.recent_trades.clear();
        }
        state.candle = Some(seeded);
    }

    pub fn clear_symbol(&mut self, symbol: &str) -> bool {
        self.symbols.remove(symbol).is_some()
    }

    fn is_first_candle_of_day(&self, time_bin: i64) -> bool {
        let (hour, minute) = self.clock.local_hour_minute(time_bin);
        let (open_hour, open_minute) = self.clock.open_hour_minute();
        if self.timeframe.is_intraday() {
            hour == open_hour && minute == open_minute
        } else {
            hour == open_hour && minute >= open_minute && minute <= open_minute + 5
        }
    }
}

/// Restore the candle invariants after an update: buy + sell must equal
/// volume, and the footprint must sum to the candle totals.
fn reconcile_candle_and_footprint(
    state: &mut SymbolState,
    bucket_size: f64,
    multiplier: i64,
    max_levels: usize,
) {
    let SymbolState {
        candle,
        footprint,
        session_cum_delta,
        ..
    } = state;
    let Some(candle) = candle.as_mut() else {
        return;
    };

    let (buy, sell) = reconcile_volume_totals(
        candle.volume,
        candle.buy_vol,
        candle.sell_vol,
        candle.open,
        candle.close,
    );
    candle.buy_vol = buy;
    candle.sell_vol = sell;

    let new_delta = buy - sell;
    *session_cum_delta += new_delta - candle.delta;
    candle.delta = new_delta;
    candle.cum_delta = *session_cum_delta;

    let close_bucket = bucket_key(candle.close, bucket_size, multiplier);
    reconcile_footprint_map(footprint, buy, sell, close_bucket);

    let bucket_value = bucket_size * multiplier as f64;
    candle.footprint = build_footprint_from_map(
        candle.low,
        candle.high,
        candle.buy_vol,
        candle.sell_vol,
        footprint,
        bucket_value,
        max_levels,
    );
}

/// Make buy + sell equal volume, preserving their proportions where they
/// exist and falling back to price direction when they don't. Shared by the
/// live and historical paths.
pub(crate) fn reconcile_volume_totals(
    volume: i64,
    buy: i64,
    sell: i64,
    open: f64,
    close: f64,
) -> (i64, i64) {
    let diff = volume - (buy + sell);
    if diff == 0 {
        return (buy, sell);
    }

    if diff < 0 {
        // over-allocated: scale both sides back down to the volume
        if buy + sell > 0 {
            let shares = proportional_alloc(volume, &[buy, sell]);
            return (shares[0].max(0), shares[1].max(0));
        }
        return (0, 0);
    }

    if buy == 0 && sell == 0 {
        // nothing to scale; use price direction as the hint
        if close > open {
            return (buy + diff, sell);
        }
        if close < open {
            return (buy, sell + diff);
        }
        let half = diff / 2;
        return (buy + half, sell + diff - half);
    }

    let adds = proportional_alloc(diff, &[buy, sell]);
    (buy + adds[0], sell + adds[1])
}

/// Bring the footprint map's totals in line with the candle totals. The
/// difference lands on the single busiest bucket (clamped at zero) so the
/// point-of-control read is not distorted; an empty map collects everything
/// at the close bucket.
fn reconcile_footprint_map(
    map: &mut FootprintMap,
    target_buy: i64,
    target_sell: i64,
    close_bucket: f64,
) {
    let current_buy: i64 = map.values().map(|v| v.buy).sum();
    let current_sell: i64 = map.values().map(|v| v.sell).sum();
    let d_buy = target_buy - current_buy;
    let d_sell = target_sell - current_sell;

    if d_buy == 0 && d_sell == 0 {
        if map.is_empty() {
            level_entry_mut(map, close_bucket).buy = target_buy;
            level_entry_mut(map, close_bucket).sell = target_sell;
        }
        return;
    }

    if map.is_empty() {
        level_entry_mut(map, close_bucket).buy = target_buy;
        level_entry_mut(map, close_bucket).sell = target_sell;
        return;
    }

    if let Some(entry) = map.values_mut().max_by_key(|v| v.buy + v.sell) {
        entry.buy = (entry.buy + d_buy).max(0);
        entry.sell = (entry.sell + d_sell).max(0);
    }

    let final_buy: i64 = map.values().map(|v| v.buy).sum();
    let final_sell: i64 = map.values().map(|v| v.sell).sum();
    if final_buy != target_buy || final_sell != target_sell {
        warn!(
            final_buy,
            target_buy, final_sell, target_sell, "footprint reconciliation incomplete"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{LevelVolume, RawTimestamp};
    use ordered_float::OrderedFloat;

    // 2024-08-14 09:15:00 IST
    const OPEN_TS: i64 = 1723618500;

    fn aggregator(timeframe: Timeframe, bucket_size: f64, multiplier: i64) -> CandleAggregator {
        CandleAggregator::new(timeframe, bucket_size, multiplier, Settings::default())
    }

    fn tick(symbol: &str, ltp: f64, ts: i64, qty: i64) -> TickEvent {
        TickEvent {
            symbol: symbol.to_string(),
            ltp: Some(ltp),
            exch_feed_time: Some(RawTimestamp::Int(ts)),
            last_traded_qty: Some(qty),
            ..Default::default()
        }
    }

    #[test]
    fn test_single_tick_opens_candle() {
        let mut agg = aggregator(Timeframe::M5, 0.05, 100);
        let mut first = tick("NSE:SBIN-EQ", 100.0, OPEN_TS, 10);
        first.ch = Some(0.0);
        first.open_price = Some(100.0);

        let candle = agg.process_tick(&first).unwrap();
        assert_eq!(candle.time, OPEN_TS);
        assert_eq!(candle.open, 100.0);
        assert_eq!(candle.high, 100.0);
        assert_eq!(candle.low, 100.0);
        assert_eq!(candle.close, 100.0);
        assert_eq!(candle.volume, 10);
        assert_eq!(candle.buy_vol, 5);
        assert_eq!(candle.sell_vol, 5);
        assert_eq!(candle.delta, 0);
        assert_eq!(candle.cum_delta, 0);
        assert_eq!(candle.cum_volume, 10);
        assert_eq!(candle.footprint.len(), 1);
        assert_eq!(candle.footprint[0].price_level, 100.0);
        assert_eq!(candle.footprint[0].buy_volume, 5);
        assert_eq!(candle.footprint[0].sell_volume, 5);
    }

    #[test]
    fn test_aggressive_buy_updates_candle_and_footprint() {
        // one-rupee buckets so each price gets its own ladder rung
        let mut agg = aggregator(Timeframe::M5, 0.01, 100);
        let mut first = tick("NSE:SBIN-EQ", 100.0, OPEN_TS, 10);
        first.ch = Some(0.0);
        agg.process_tick(&first).unwrap();

        let mut second = tick("NSE:SBIN-EQ", 101.0, OPEN_TS + 30, 8);
        second.bid_price = Some(100.95);
        second.ask_price = Some(101.0);
        let candle = agg.process_tick(&second).unwrap();

        assert_eq!(candle.high, 101.0);
        assert_eq!(candle.close, 101.0);
        assert_eq!(candle.volume, 18);
        assert_eq!(candle.buy_vol, 13);
        assert_eq!(candle.sell_vol, 5);
        assert_eq!(candle.delta, 8);
        assert_eq!(candle.cum_delta, 8);

        let levels: Vec<f64> = candle.footprint.iter().map(|l| l.price_level).collect();
        assert_eq!(levels, vec![101.0, 100.0]);
        assert_eq!(candle.footprint[0].buy_volume, 8);
        assert_eq!(candle.footprint[0].sell_volume, 0);
        assert_eq!(candle.footprint[1].buy_volume, 5);
        assert_eq!(candle.footprint[1].sell_volume, 5);
    }

    #[test]
    fn test_duplicate_tick_is_dropped() {
        let mut agg = aggregator(Timeframe::M5, 0.05, 100);
        let first = tick("NSE:SBIN-EQ", 100.0, OPEN_TS, 10);

        assert!(agg.process_tick(&first).is_some());
        assert!(agg.process_tick(&first).is_none());
        // state did not double
        assert_eq!(agg.current_candle("NSE:SBIN-EQ").unwrap().volume, 10);
    }

    #[test]
    fn test_distinct_trades_without_ids_both_count() {
        let mut agg = aggregator(Timeframe::M5, 0.05, 100);
        agg.process_tick(&tick("NSE:SBIN-EQ", 100.0, OPEN_TS, 10));
        // same second, different quantity: a real second trade
        agg.process_tick(&tick("NSE:SBIN-EQ", 100.0, OPEN_TS, 7));
        assert_eq!(agg.current_candle("NSE:SBIN-EQ").unwrap().volume, 17);
    }

    #[test]
    fn test_new_bin_opens_new_candle_and_carries_cum_delta() {
        let mut agg = aggregator(Timeframe::M5, 0.05, 100);
        let mut first = tick("NSE:SBIN-EQ", 100.0, OPEN_TS, 10);
        first.ch = Some(1.0); // all buy
        agg.process_tick(&first).unwrap();

        let mut second = tick("NSE:SBIN-EQ", 100.5, OPEN_TS + 300, 4);
        second.ch = Some(1.0);
        let candle = agg.process_tick(&second).unwrap();

        assert_eq!(candle.time, OPEN_TS + 300);
        assert_eq!(candle.open, 100.5); // not the first candle of the day
        assert_eq!(candle.delta, 4);
        assert_eq!(candle.cum_delta, 14);
    }

    #[test]
    fn test_cum_delta_resets_on_new_trading_day() {
        let mut agg = aggregator(Timeframe::M5, 0.05, 100);
        let mut last_of_day = tick("NSE:SBIN-EQ", 100.0, OPEN_TS + 22495, 1200); // 15:29:55
        last_of_day.ch = Some(2.0);
        let candle = agg.process_tick(&last_of_day).unwrap();
        assert_eq!(candle.cum_delta, 1200);

        let mut next_morning = tick("NSE:SBIN-EQ", 101.0, OPEN_TS + 86400, 3);
        next_morning.ch = Some(0.5);
        let candle = agg.process_tick(&next_morning).unwrap();
        assert_eq!(candle.delta, 3);
        assert_eq!(candle.cum_delta, 3);
    }

    #[test]
    fn test_late_tick_in_current_bin_is_accepted() {
        let mut agg = aggregator(Timeframe::M5, 0.05, 100);
        agg.process_tick(&tick("NSE:SBIN-EQ", 100.0, OPEN_TS + 60, 10));
        // older timestamp, same bin
        let candle = agg
            .process_tick(&tick("NSE:SBIN-EQ", 99.5, OPEN_TS + 10, 5))
            .unwrap();
        assert_eq!(candle.time, OPEN_TS);
        assert_eq!(candle.volume, 15);
        assert_eq!(candle.low, 99.5);
    }

    #[test]
    fn test_invalid_and_oversized_ticks_return_none() {
        let mut agg = aggregator(Timeframe::M5, 0.05, 100);

        let mut missing_price = tick("NSE:SBIN-EQ", 0.0, OPEN_TS, 10);
        missing_price.ltp = None;
        assert!(agg.process_tick(&missing_price).is_none());

        let mut bad_ts = tick("NSE:SBIN-EQ", 100.0, 0, 10);
        bad_ts.exch_feed_time = Some(RawTimestamp::Int(-1));
        assert!(agg.process_tick(&bad_ts).is_none());

        assert!(agg.process_tick(&tick("NSE:SBIN-EQ", 100.0, OPEN_TS, 0)).is_none());
        assert!(agg
            .process_tick(&tick("NSE:SBIN-EQ", 100.0, OPEN_TS, 6_000_000))
            .is_none());

        assert!(agg.process_tick(&tick("", 100.0, OPEN_TS, 10)).is_none());
    }

    #[test]
    fn test_cumulative_volume_feed_drives_quantities() {
        let mut agg = aggregator(Timeframe::M5, 0.05, 100);

        let mut first = tick("NSE:SBIN-EQ", 100.0, OPEN_TS, 10);
        first.vol_traded_today = Some(1000);
        let candle = agg.process_tick(&first).unwrap();
        assert_eq!(candle.volume, 10); // baseline tick uses the raw quantity
        assert_eq!(candle.cum_volume, 1000);

        let mut second = tick("NSE:SBIN-EQ", 100.2, OPEN_TS + 10, 0);
        second.last_traded_qty = None;
        second.vol_traded_today = Some(1025);
        let candle = agg.process_tick(&second).unwrap();
        assert_eq!(candle.volume, 35); // 10 + (1025 - 1000)
        assert_eq!(candle.cum_volume, 1025);
    }

    #[test]
    fn test_reconcile_volume_totals() {
        // over-allocated scales back proportionally
        assert_eq!(reconcile_volume_totals(10, 8, 4, 100.0, 100.0), (7, 3));
        // under-allocated with no split uses price direction
        assert_eq!(reconcile_volume_totals(10, 0, 0, 100.0, 101.0), (10, 0));
        assert_eq!(reconcile_volume_totals(10, 0, 0, 101.0, 100.0), (0, 10));
        assert_eq!(reconcile_volume_totals(9, 0, 0, 100.0, 100.0), (4, 5));
        // under-allocated with an existing split grows proportionally
        assert_eq!(reconcile_volume_totals(12, 4, 2, 100.0, 100.0), (8, 4));
        // balanced stays put
        assert_eq!(reconcile_volume_totals(10, 6, 4, 100.0, 100.0), (6, 4));
    }

    #[test]
    fn test_footprint_residual_lands_on_busiest_bucket() {
        let mut map = FootprintMap::new();
        map.insert(OrderedFloat(100.0), LevelVolume { buy: 10, sell: 8 });
        map.insert(OrderedFloat(99.0), LevelVolume { buy: 3, sell: 1 });

        reconcile_footprint_map(&mut map, 14, 7, 100.0);

        let poc = map.get(&OrderedFloat(100.0)).unwrap();
        assert_eq!(poc.buy, 11); // +1
        assert_eq!(poc.sell, 6); // -2
        let other = map.get(&OrderedFloat(99.0)).unwrap();
        assert_eq!(*other, LevelVolume { buy: 3, sell: 1 });
    }

    #[test]
    fn test_footprint_created_at_close_when_empty() {
        let mut map = FootprintMap::new();
        reconcile_footprint_map(&mut map, 6, 4, 100.25);
        assert_eq!(
            map.get(&OrderedFloat(100.25)),
            Some(&LevelVolume { buy: 6, sell: 4 })
        );
    }

    #[test]
    fn test_invariants_hold_over_random_walk() {
        let mut agg = aggregator(Timeframe::M1, 0.05, 100);
        let mut price = 250.0f64;
        for i in 0..500i64 {
            // deterministic pseudo-random walk
            let step = ((i * 2654435761) % 7 - 3) as f64 * 0.05;
            price += step;
            let mut t = tick("NSE:TCS-EQ", (price * 100.0).round() / 100.0, OPEN_TS + i * 7, (i % 13) + 1);
            t.ch = Some(step);
            if let Some(candle) = agg.process_tick(&t) {
                assert_eq!(candle.buy_vol + candle.sell_vol, candle.volume);
                assert_eq!(candle.delta, candle.buy_vol - candle.sell_vol);
                let fp_buy: i64 = candle.footprint.iter().map(|l| l.buy_volume).sum();
                let fp_sell: i64 = candle.footprint.iter().map(|l| l.sell_volume).sum();
                assert_eq!(fp_buy, candle.buy_vol);
                assert_eq!(fp_sell, candle.sell_vol);
                for pair in candle.footprint.windows(2) {
                    assert!(pair[0].price_level > pair[1].price_level);
                }
                assert!(candle.volume >= 0 && candle.buy_vol >= 0 && candle.sell_vol >= 0);
            }
        }
    }
}
