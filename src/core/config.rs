use std::{fs, path::Path};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use super::types::RiskBand;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub base_growth_rate: f64,
    pub low_growth_rate: f64,
    pub moderate_growth_rate: f64,
    pub high_growth_rate: f64,
    /// Gross monthly income multiple used as a proxy for the mortgage ceiling.
    pub affordability_multiplier: i64,
    /// Share of the median monthly surplus considered safe to invest.
    pub investment_haircut: f64,
    pub min_history_months: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            base_growth_rate: 0.03,
            low_growth_rate: 0.04,
            moderate_growth_rate: 0.06,
            high_growth_rate: 0.08,
            affordability_multiplier: 80,
            investment_haircut: 0.8,
            min_history_months: 3,
        }
    }
}

impl PlannerConfig {
    /// Reads a YAML (or JSON) config file; absent keys keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let s = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let cfg: Self = serde_yaml::from_str(&s)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        cfg.validate().map_err(anyhow::Error::msg)?;
        Ok(cfg)
    }

    /// Annual rate used to solve years-to-target for a band. Band 1 saves at the base rate.
    pub fn growth_rate(&self, band: RiskBand) -> f64 {
        match band {
            RiskBand::NoRisk => self.base_growth_rate,
            RiskBand::Low => self.low_growth_rate,
            RiskBand::Moderate => self.moderate_growth_rate,
            RiskBand::High => self.high_growth_rate,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        for (name, rate) in [
            ("base_growth_rate", self.base_growth_rate),
            ("low_growth_rate", self.low_growth_rate),
            ("moderate_growth_rate", self.moderate_growth_rate),
            ("high_growth_rate", self.high_growth_rate),
        ] {
            if !rate.is_finite() || rate <= -1.0 {
                return Err(format!("{name} must be > -100%"));
            }
        }

        if !self.investment_haircut.is_finite()
            || self.investment_haircut <= 0.0
            || self.investment_haircut > 1.0
        {
            return Err("investment_haircut must be in (0, 1]".to_string());
        }

        if self.affordability_multiplier <= 0 {
            return Err("affordability_multiplier must be > 0".to_string());
        }

        if self.min_history_months == 0 {
            return Err("min_history_months must be > 0".to_string());
        }

        Ok(())
    }
}
