use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Buy and sell volume accumulated at one price bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LevelVolume {
    pub buy: i64,
    pub sell: i64,
}

/// Working footprint: bucket key (lower bucket boundary, rounded to 2
/// decimals) to buy/sell volume. Reads must tolerate key drift of 1e-6.
pub type FootprintMap = BTreeMap<OrderedFloat<f64>, LevelVolume>;

/// One rung of the emitted footprint ladder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    #[serde(rename = "priceLevel")]
    pub price_level: f64,
    #[serde(rename = "buyVolume")]
    pub buy_volume: i64,
    #[serde(rename = "sellVolume")]
    pub sell_volume: i64,
}

/// A session-aligned candle with footprint and cumulative session counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: String,
    /// Bin start, unix seconds, aligned on the session open.
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
    pub buy_vol: i64,
    pub sell_vol: i64,
    /// buy_vol - sell_vol for this candle.
    pub delta: i64,
    /// Running delta since session open, across candles.
    pub cum_delta: i64,
    /// Cumulative session traded volume at the last update.
    pub cum_volume: i64,
    /// Price ladder, descending by price.
    pub footprint: Vec<PriceLevel>,
}

/// Output row of the historical resampler: a candle plus the legacy
/// cumulative-volume aliases older consumers still read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResampledCandle {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    pub time: i64,
    #[serde(serialize_with = "crate::utils::json::nan_as_null")]
    pub open: f64,
    #[serde(serialize_with = "crate::utils::json::nan_as_null")]
    pub high: f64,
    #[serde(serialize_with = "crate::utils::json::nan_as_null")]
    pub low: f64,
    #[serde(serialize_with = "crate::utils::json::nan_as_null")]
    pub close: f64,
    pub volume: i64,
    pub buy_vol: i64,
    pub sell_vol: i64,
    pub delta: i64,
    pub cum_delta: i64,
    pub cum_volume: i64,
    pub vol_traded_today: i64,
    pub last_cum_volume: i64,
    pub footprint: Vec<PriceLevel>,
}

impl From<&ResampledCandle> for Candle {
    fn from(row: &ResampledCandle) -> Self {
        Candle {
            symbol: row.symbol.clone().unwrap_or_default(),
            time: row.time,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
            buy_vol: row.buy_vol,
            sell_vol: row.sell_vol,
            delta: row.delta,
            cum_delta: row.cum_delta,
            cum_volume: row.cum_volume,
            footprint: row.footprint.clone(),
        }
    }
}
