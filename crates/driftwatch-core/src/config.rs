//! Engine configuration
//!
//! Thresholds that are product knobs live here. Config is loaded with a
//! two-layer resolution:
//! 1. Check for an override (explicit path, or ~/.local/share/driftwatch/config/engine.toml)
//! 2. Fall back to embedded defaults (compiled into binary)
//!
//! Statistical bucket boundaries (z-score and percentage severity cutoffs)
//! are fixed constants in the creep scorer and are not configurable.

use std::fs;
use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::PeriodType;

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/engine.toml");

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub aggregation: AggregationConfig,
    pub baseline: BaselineConfig,
    pub income: IncomeConfig,
    pub creep: CreepConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    pub period_types: Vec<PeriodType>,
    pub transaction_page_size: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BaselineConfig {
    pub min_history_months: usize,
    pub window_months: usize,
    pub min_transactions: i64,
    pub lock_after_compute: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct IncomeConfig {
    #[serde(with = "rust_decimal::serde::str")]
    pub min_amount: Decimal,
    pub high_confidence_threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CreepConfig {
    pub trend_lookback_periods: usize,
    #[serde(with = "rust_decimal::serde::str")]
    pub pacing_tolerance: Decimal,
    pub elevated_stability_cap: i64,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            period_types: vec![PeriodType::Monthly, PeriodType::Weekly],
            transaction_page_size: 500,
        }
    }
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            min_history_months: 2,
            window_months: 3,
            min_transactions: 2,
            lock_after_compute: true,
        }
    }
}

impl Default for IncomeConfig {
    fn default() -> Self {
        Self {
            min_amount: dec!(50),
            high_confidence_threshold: 0.80,
        }
    }
}

impl Default for CreepConfig {
    fn default() -> Self {
        Self {
            trend_lookback_periods: 4,
            pacing_tolerance: dec!(5),
            elevated_stability_cap: 85,
        }
    }
}

impl EngineConfig {
    /// Load using the default override location, falling back to embedded defaults
    pub fn load() -> Result<Self> {
        load_config(None)
    }

    /// Load from an explicit override path (embedded defaults if it doesn't exist)
    pub fn load_from(path: &Path) -> Result<Self> {
        load_config(Some(path))
    }

    /// Parse configuration text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse engine config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.aggregation.transaction_page_size <= 0 {
            return Err(Error::Config(
                "aggregation.transaction_page_size must be positive".to_string(),
            ));
        }
        if self.baseline.window_months == 0 {
            return Err(Error::Config(
                "baseline.window_months must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.income.high_confidence_threshold) {
            return Err(Error::Config(
                "income.high_confidence_threshold must be within [0, 1]".to_string(),
            ));
        }
        if self.creep.trend_lookback_periods == 0 {
            return Err(Error::Config(
                "creep.trend_lookback_periods must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("driftwatch").join("config").join("engine.toml"))
}

/// Load configuration (override first, then default)
fn load_config(override_path: Option<&Path>) -> Result<EngineConfig> {
    let path = override_path
        .map(Path::to_path_buf)
        .or_else(default_config_path);

    let content = match path {
        Some(ref p) if p.exists() => {
            debug!("Loading engine config from {}", p.display());
            fs::read_to_string(p)
                .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?
        }
        _ => DEFAULT_CONFIG.to_string(),
    };

    EngineConfig::from_toml(&content)
}
