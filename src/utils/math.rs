/// Numeric helpers shared by bucketing, footprint and de-duplication code.

/// Round to a fixed number of decimal places.
pub fn round_dp(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Price in integer micro-units (6 decimal places), for hashable trade keys.
pub fn price_micros(price: f64) -> i64 {
    (price * 1_000_000.0).round() as i64
}
