//! Tick-to-candle aggregation engine with price-level footprints.
//!
//! The crate turns a normalized quote-feed tick stream into session-aligned
//! candles carrying a buy/sell footprint and per-session cumulative delta,
//! and resamples fine historical bars into equivalent candles so a live
//! aggregator can be seeded from history. Volume is conserved bit for bit:
//! per-level footprint volumes always sum to the candle's buy/sell totals,
//! which always sum to its volume.
//!
//! Transport, broker authentication and persistence live outside this crate;
//! callers hand in [`TickEvent`]s and [`HistBar`]s and get [`Candle`]s back.

pub mod analysis;
pub mod config;
pub mod data;
pub mod engine;
pub mod utils;

pub use analysis::aggregator::CandleAggregator;
pub use analysis::bucketizer::TickBucketizer;
pub use analysis::resampler::{process_hist_data, process_hist_data_with, ResampleOptions};
pub use analysis::session::Timeframe;
pub use config::Settings;
pub use data::{Candle, FootprintMap, HistBar, LevelVolume, PriceLevel, RawTimestamp, ResampledCandle, TickEvent};
pub use engine::{clear_processor_state, process_live_data};
