use ordered_float::OrderedFloat;

use crate::data::{FootprintMap, LevelVolume};
use crate::utils::math::round_dp;

/// Absolute tolerance when matching float bucket keys. Keys produced by
/// `bucket_key` compare exactly; seeded maps may carry small drift.
pub const BUCKET_TOLERANCE: f64 = 1e-6;

/// Lower boundary of the price bucket containing `price`.
///
/// One floor and one round, so live and historical paths quantize
/// identically. A non-positive bucket value degrades to plain 2-dp rounding.
pub fn bucket_key(price: f64, bucket_size: f64, multiplier: i64) -> f64 {
    let bucket_value = bucket_size * multiplier as f64;
    if bucket_value <= 0.0 || !bucket_value.is_finite() {
        return round_dp(price, 2);
    }
    round_dp((price / bucket_value).floor() * bucket_value, 2)
}

/// Tolerant footprint read; absent levels come back as zero volume.
pub fn level_entry(map: &FootprintMap, level: f64) -> LevelVolume {
    let lo = OrderedFloat(level - BUCKET_TOLERANCE);
    let hi = OrderedFloat(level + BUCKET_TOLERANCE);
    map.range(lo..=hi)
        .next()
        .map(|(_, volume)| *volume)
        .unwrap_or_default()
}

/// Tolerant footprint upsert: reuse an existing key within tolerance rather
/// than inserting a near-duplicate level.
pub fn level_entry_mut(map: &mut FootprintMap, level: f64) -> &mut LevelVolume {
    let lo = OrderedFloat(level - BUCKET_TOLERANCE);
    let hi = OrderedFloat(level + BUCKET_TOLERANCE);
    let key = map
        .range(lo..=hi)
        .next()
        .map(|(key, _)| *key)
        .unwrap_or(OrderedFloat(level));
    map.entry(key).or_default()
}
