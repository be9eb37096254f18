use anyhow::{Context, Result};
use figment::{providers::{Env, Format, Toml}, Figment};
use serde::{Deserialize, Serialize};

use crate::dsm::LifetimeFamily;
use crate::error::EngineError;
use crate::extrapolation::CurveStrategy;
use crate::flow::{MassBalanceTolerance, SteelOptions};
use crate::trade::{BalanceTarget, TradeSide};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub model: ModelConfig,
    pub mass_balance: MassBalanceConfig,
    pub trade: TradeConfig,
    pub scenario: ScenarioConfig,
}

/// Which evaluation plan the flow system runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemKind {
    Plastics,
    Steel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub system: SystemKind,
    pub lifetime_model: String,
    pub curve_strategy: String,
    pub include_trade: bool,
    pub include_scrap_trade: bool,
    pub max_scrap_share_production: f64,
    pub parallel: bool,
    /// Fail the run on negative flows instead of logging them
    #[serde(default)]
    pub reject_negative_flows: bool,
}

impl ModelConfig {
    pub fn lifetime_family(&self) -> crate::error::Result<LifetimeFamily> {
        LifetimeFamily::parse(&self.lifetime_model)
    }

    pub fn curve_strategy(&self) -> crate::error::Result<CurveStrategy> {
        CurveStrategy::parse(&self.curve_strategy)
    }

    pub fn steel_options(&self) -> SteelOptions {
        SteelOptions {
            include_trade: self.include_trade,
            include_scrap_trade: self.include_scrap_trade,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MassBalanceConfig {
    #[serde(default = "default_absolute_tolerance")]
    pub absolute_tolerance: f64,
    #[serde(default = "default_relative_tolerance")]
    pub relative_tolerance: f64,
}

fn default_absolute_tolerance() -> f64 {
    1000.0
}

fn default_relative_tolerance() -> f64 {
    1e-6
}

impl MassBalanceConfig {
    /// Whole-economy steel magnitudes get an absolute tolerance, plastics a relative one
    pub fn tolerance_for(&self, system: SystemKind) -> MassBalanceTolerance {
        match system {
            SystemKind::Plastics => MassBalanceTolerance::Relative(self.relative_tolerance),
            SystemKind::Steel => MassBalanceTolerance::Absolute(self.absolute_tolerance),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeConfig {
    pub scale_first: TradeSide,
    #[serde(default)]
    pub balance_to: Option<BalanceTarget>,
    pub adopt_scaler_dims: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioConfig {
    pub regions: Vec<String>,
    pub goods: Vec<String>,
    pub first_historic_year: i32,
    pub historic_years: usize,
    pub future_years: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Toml::file("config/default.toml"))
            .merge(Env::prefixed("MFE__").split("__"));
        Self::from_figment(figment)
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract().context("reading configuration")?;
        config.validate().context("validating configuration")?;
        Ok(config)
    }

    pub fn validate(&self) -> crate::error::Result<()> {
        self.model.lifetime_family()?;
        self.model.curve_strategy()?;

        let share = self.model.max_scrap_share_production;
        if !(0.0..=1.0).contains(&share) {
            return Err(EngineError::InvalidConfig(format!(
                "max_scrap_share_production must lie in [0, 1] (got {share})"
            )));
        }
        if self.model.include_scrap_trade && !self.model.include_trade {
            return Err(EngineError::InvalidConfig(
                "include_scrap_trade requires include_trade".to_string(),
            ));
        }
        for (name, value) in [
            ("absolute_tolerance", self.mass_balance.absolute_tolerance),
            ("relative_tolerance", self.mass_balance.relative_tolerance),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(EngineError::InvalidConfig(format!(
                    "{name} must be positive and finite (got {value})"
                )));
            }
        }

        let scenario = &self.scenario;
        if scenario.regions.is_empty() || scenario.goods.is_empty() {
            return Err(EngineError::InvalidConfig("scenario needs regions and goods".to_string()));
        }
        if scenario.historic_years < 2 {
            return Err(EngineError::InvalidConfig(format!(
                "scenario needs at least 2 historic years (got {})",
                scenario.historic_years
            )));
        }
        Ok(())
    }
}
