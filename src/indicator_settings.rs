//! Indicator engine settings with per-field validation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSettings {
    pub rsi_period: u32,
    pub sma_fast: u32,
    pub sma_slow: u32,
    pub ema_fast: u32,
    pub ema_slow: u32,
    pub bb_period: u32,
    pub bb_std: f64,
}

impl Default for IndicatorSettings {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            sma_fast: 20,
            sma_slow: 50,
            ema_fast: 12,
            ema_slow: 26,
            bb_period: 20,
            bb_std: 2.0,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum IndicatorSettingsError {
    #[error("{field} must be >= 1")]
    ZeroPeriod { field: &'static str },
    #[error("bb_std must be a positive finite number, got {0}")]
    InvalidBandWidth(f64),
}

impl IndicatorSettings {
    /// Checks every field and reports all violations, not just the first.
    pub fn validate(&self) -> Result<(), Vec<IndicatorSettingsError>> {
        let mut errors = Vec::new();

        for (field, value) in [
            ("rsi_period", self.rsi_period),
            ("sma_fast", self.sma_fast),
            ("sma_slow", self.sma_slow),
            ("ema_fast", self.ema_fast),
            ("ema_slow", self.ema_slow),
            ("bb_period", self.bb_period),
        ] {
            if value == 0 {
                errors.push(IndicatorSettingsError::ZeroPeriod { field });
            }
        }

        if !self.bb_std.is_finite() || self.bb_std <= 0.0 {
            errors.push(IndicatorSettingsError::InvalidBandWidth(self.bb_std));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
