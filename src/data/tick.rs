use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp as delivered by a feed: an epoch number in unknown units or an
/// ISO-8601 string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<i64> for RawTimestamp {
    fn from(value: i64) -> Self {
        RawTimestamp::Int(value)
    }
}

impl From<DateTime<Utc>> for RawTimestamp {
    fn from(value: DateTime<Utc>) -> Self {
        RawTimestamp::Int(value.timestamp())
    }
}

/// Normalized live tick as received from a quote feed.
///
/// Everything except the symbol is optional; validation happens at the point
/// of use so a partial tick degrades to a silent no-op instead of an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TickEvent {
    pub symbol: String,
    /// Last traded price.
    pub ltp: Option<f64>,
    pub exch_feed_time: Option<RawTimestamp>,
    pub last_traded_time: Option<RawTimestamp>,
    pub last_traded_qty: Option<i64>,
    /// Cumulative session volume reported by the exchange.
    pub vol_traded_today: Option<i64>,
    pub bid_price: Option<f64>,
    pub ask_price: Option<f64>,
    pub tot_buy_qty: Option<i64>,
    pub tot_sell_qty: Option<i64>,
    /// Price change for the day.
    pub ch: Option<f64>,
    /// Session opening price.
    pub open_price: Option<f64>,
    pub trade_id: Option<String>,
}

impl TickEvent {
    /// Exchange feed time, falling back to the last-traded time.
    pub fn feed_timestamp(&self) -> Option<&RawTimestamp> {
        self.exch_feed_time
            .as_ref()
            .or(self.last_traded_time.as_ref())
    }
}

/// One fine-grained historical bar, the resampler's input row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistBar {
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buy_vol: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sell_vol: Option<i64>,
    /// Cumulative session volume at the end of the bar, when the producer
    /// (e.g. the live tick bucketizer) knows it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cum_volume: Option<i64>,
}
