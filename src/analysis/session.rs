use chrono::{DateTime, Datelike, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Timelike};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::SessionConfig;
use crate::data::RawTimestamp;

/// Timestamp magnitude thresholds: anything at or above is not in seconds.
const NS_THRESHOLD: i64 = 1_000_000_000_000_000_000;
const US_THRESHOLD: i64 = 1_000_000_000_000_000;
const MS_THRESHOLD: i64 = 1_000_000_000_000;

/// Candle timeframe. Unknown tokens fall back to five minutes rather than
/// erroring, so a misconfigured caller still gets candles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    D1,
}

impl Timeframe {
    pub fn from_token(token: &str) -> Self {
        match token {
            "1m" => Timeframe::M1,
            "5m" => Timeframe::M5,
            "15m" => Timeframe::M15,
            "1d" => Timeframe::D1,
            _ => Timeframe::M5,
        }
    }

    pub fn interval_seconds(self) -> i64 {
        match self {
            Timeframe::M1 => 60,
            Timeframe::M5 => 300,
            Timeframe::M15 => 900,
            Timeframe::D1 => 86400,
        }
    }

    pub fn is_intraday(self) -> bool {
        !matches!(self, Timeframe::D1)
    }

    pub fn token(self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::D1 => "1d",
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.token())
    }
}

/// Normalize a feed timestamp to unix seconds.
///
/// Numeric inputs are classified by magnitude (ns, us, ms, s) and integer
/// divided down. ISO strings accept RFC 3339 and, failing that, a naive
/// datetime interpreted in the given zone. Non-positive and unparseable
/// inputs return `None`.
pub fn normalize_timestamp_to_seconds(raw: &RawTimestamp, tz: Tz) -> Option<i64> {
    match raw {
        RawTimestamp::Int(t) => {
            let t = *t;
            if t <= 0 {
                None
            } else if t >= NS_THRESHOLD {
                Some(t / 1_000_000_000)
            } else if t >= US_THRESHOLD {
                Some(t / 1_000_000)
            } else if t >= MS_THRESHOLD {
                Some(t / 1_000)
            } else {
                Some(t)
            }
        }
        RawTimestamp::Float(t) => {
            let t = *t;
            if !t.is_finite() || t <= 0.0 {
                None
            } else if t >= 1e18 {
                Some((t / 1e9) as i64)
            } else if t >= 1e15 {
                Some((t / 1e6) as i64)
            } else if t >= 1e12 {
                Some((t / 1e3) as i64)
            } else {
                Some(t as i64)
            }
        }
        RawTimestamp::Text(s) => parse_iso_timestamp(s, tz),
    }
}

fn parse_iso_timestamp(s: &str, tz: Tz) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp());
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return resolve_local(tz, naive).map(|dt| dt.timestamp());
        }
    }
    None
}

fn resolve_local(tz: Tz, naive: NaiveDateTime) -> Option<DateTime<Tz>> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt),
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        LocalResult::None => None,
    }
}

/// Session-anchored clock for one trading venue.
///
/// Candle bins after the session open land on open + k*interval regardless of
/// epoch drift; pre-open timestamps fall back to epoch-aligned bins.
#[derive(Debug, Clone)]
pub struct SessionClock {
    tz: Tz,
    open_hour: u32,
    open_minute: u32,
}

impl SessionClock {
    pub fn new(config: &SessionConfig) -> Self {
        let tz = config.time_zone.parse().unwrap_or_else(|_| {
            warn!(zone = %config.time_zone, "unknown session time zone, using Asia/Kolkata");
            chrono_tz::Asia::Kolkata
        });
        Self {
            tz,
            open_hour: config.open_hour,
            open_minute: config.open_minute,
        }
    }

    pub fn time_zone(&self) -> Tz {
        self.tz
    }

    pub fn open_hour_minute(&self) -> (u32, u32) {
        (self.open_hour, self.open_minute)
    }

    /// Unix second of the session open on the timestamp's local date.
    pub fn market_open_ts(&self, ts: i64) -> i64 {
        let date = match self.tz.timestamp_opt(ts, 0) {
            LocalResult::Single(dt) => dt.date_naive(),
            LocalResult::Ambiguous(dt, _) => dt.date_naive(),
            LocalResult::None => return ts.div_euclid(86400) * 86400,
        };
        self.open_ts_for_date(date)
    }

    fn open_ts_for_date(&self, date: NaiveDate) -> i64 {
        match self.tz.with_ymd_and_hms(
            date.year(),
            date.month(),
            date.day(),
            self.open_hour,
            self.open_minute,
            0,
        ) {
            LocalResult::Single(dt) => dt.timestamp(),
            LocalResult::Ambiguous(earliest, _) => earliest.timestamp(),
            // DST gap swallowed the open; fall back to the naive UTC reading.
            LocalResult::None => date
                .and_hms_opt(self.open_hour, self.open_minute, 0)
                .map(|naive| naive.and_utc().timestamp())
                .unwrap_or_default(),
        }
    }

    /// Align a timestamp to its candle bin.
    pub fn aligned_time_bin(&self, ts: i64, interval_seconds: i64) -> i64 {
        let open = self.market_open_ts(ts);
        if ts < open {
            return ts.div_euclid(interval_seconds) * interval_seconds;
        }
        open + ((ts - open) / interval_seconds) * interval_seconds
    }

    pub fn is_same_trading_day(&self, a: i64, b: i64) -> bool {
        self.market_open_ts(a) == self.market_open_ts(b)
    }

    /// Local wall-clock hour and minute for a unix second.
    pub fn local_hour_minute(&self, ts: i64) -> (u32, u32) {
        match self.tz.timestamp_opt(ts, 0) {
            LocalResult::Single(dt) => (dt.hour(), dt.minute()),
            LocalResult::Ambiguous(dt, _) => (dt.hour(), dt.minute()),
            LocalResult::None => (0, 0),
        }
    }
}
