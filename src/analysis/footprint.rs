use std::cmp::Ordering;

use tracing::{debug, warn};

use crate::analysis::alloc::proportional_alloc_signed;
use crate::analysis::bucket::level_entry;
use crate::data::{FootprintMap, PriceLevel};
use crate::utils::math::round_dp;

/// Build the emitted price ladder for a candle from its working footprint.
///
/// The ladder spans every bucket between `floor(low/B)` and `floor(high/B)`,
/// sorted descending by price, and its totals are reconciled against the
/// candle's buy/sell volumes so the two always agree.
pub fn build_footprint_from_map(
    low: f64,
    high: f64,
    buy_vol: i64,
    sell_vol: i64,
    map: &FootprintMap,
    bucket_value: f64,
    max_levels: usize,
) -> Vec<PriceLevel> {
    if bucket_value <= 0.0 || map.is_empty() {
        return Vec::new();
    }
    if !low.is_finite() || !high.is_finite() {
        return Vec::new();
    }

    let mut min_idx = (low / bucket_value).floor() as i64;
    let mut max_idx = (high / bucket_value).floor() as i64;
    let count = max_idx as i128 - min_idx as i128 + 1;
    if count <= 0 {
        return Vec::new();
    }
    if count > max_levels as i128 {
        warn!(
            needed = count as i64,
            max = max_levels,
            "footprint range too wide, truncating to a centered window"
        );
        let mid = ((min_idx as i128 + max_idx as i128) / 2) as i64;
        min_idx = mid - max_levels as i64 / 2;
        max_idx = min_idx + max_levels as i64 - 1;
    }

    let mut ladder: Vec<PriceLevel> = (min_idx..=max_idx)
        .map(|idx| {
            let level = round_dp(idx as f64 * bucket_value, 2);
            let entry = level_entry(map, level);
            PriceLevel {
                price_level: level,
                buy_volume: entry.buy,
                sell_volume: entry.sell,
            }
        })
        .collect();

    ladder.sort_by(|a, b| {
        b.price_level
            .partial_cmp(&a.price_level)
            .unwrap_or(Ordering::Equal)
    });

    reconcile_ladder(&mut ladder, buy_vol, sell_vol);
    ladder
}

/// Force the ladder's totals to match the candle totals: proportional signed
/// allocation by level volume, then any clamping residue on the single
/// busiest level.
fn reconcile_ladder(ladder: &mut [PriceLevel], target_buy: i64, target_sell: i64) {
    if ladder.is_empty() {
        return;
    }

    let sum = |ladder: &[PriceLevel]| {
        ladder.iter().fold((0i64, 0i64), |(b, s), level| {
            (b + level.buy_volume, s + level.sell_volume)
        })
    };

    let (current_buy, current_sell) = sum(ladder);
    let d_buy = target_buy - current_buy;
    let d_sell = target_sell - current_sell;
    if d_buy == 0 && d_sell == 0 {
        return;
    }
    debug!(d_buy, d_sell, "ladder totals off target before reconciliation");

    if current_buy + current_sell > 0 {
        let weights: Vec<i64> = ladder
            .iter()
            .map(|level| level.buy_volume + level.sell_volume)
            .collect();
        if d_buy != 0 {
            for (level, add) in ladder.iter_mut().zip(proportional_alloc_signed(d_buy, &weights)) {
                level.buy_volume = (level.buy_volume + add).max(0);
            }
        }
        if d_sell != 0 {
            for (level, add) in ladder.iter_mut().zip(proportional_alloc_signed(d_sell, &weights)) {
                level.sell_volume = (level.sell_volume + add).max(0);
            }
        }
    }

    let (current_buy, current_sell) = sum(ladder);
    if current_buy != target_buy || current_sell != target_sell {
        if let Some(busiest) = ladder
            .iter_mut()
            .max_by_key(|level| level.buy_volume + level.sell_volume)
        {
            busiest.buy_volume = (busiest.buy_volume + (target_buy - current_buy)).max(0);
            busiest.sell_volume = (busiest.sell_volume + (target_sell - current_sell)).max(0);
        }
        let (final_buy, final_sell) = sum(ladder);
        if final_buy != target_buy || final_sell != target_sell {
            warn!(
                final_buy,
                target_buy, final_sell, target_sell, "ladder reconciliation incomplete"
            );
        }
    }
}
