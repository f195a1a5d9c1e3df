use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub session: SessionConfig,
    pub limits: LimitsConfig,
}

/// Trading session window and time zone. All bin alignment and cumulative
/// counters are anchored on this session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub time_zone: String,
    pub open_hour: u32,
    pub open_minute: u32,
    pub close_hour: u32,
    pub close_minute: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Hard cap on a single tick's traded quantity.
    pub max_tick_volume: i64,
    /// Largest believable jump in cumulative session volume between ticks.
    pub max_cum_volume_step: i64,
    /// Recent-trade ring capacity used for de-duplication.
    pub recent_trade_capacity: usize,
    /// Widest footprint ladder emitted before truncating to a centered window.
    pub max_footprint_levels: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            time_zone: "Asia/Kolkata".to_string(),
            open_hour: 9,
            open_minute: 15,
            close_hour: 15,
            close_minute: 30,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_tick_volume: 5_000_000,
            max_cum_volume_step: 2_000_000,
            recent_trade_capacity: 200,
            max_footprint_levels: 5000,
        }
    }
}

impl Settings {
    /// Load settings from a TOML file. Missing keys fall back to defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        toml::from_str(&content).map_err(|e| anyhow::anyhow!("config parse error: {}", e))
    }
}
