//! Trade & scrap balancing
//!
//! [`Trade`] pairs imports and exports over identical region-bearing axes.
//! Balancing and prediction are injected strategies chosen at construction;
//! invoking an unset one is an error rather than a silent no-op.

pub mod balance;
pub mod predict;
pub mod scrap;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::dims::{Quantity, HISTORIC_TIME, REGION};
use crate::error::{EngineError, Result};

pub use balance::{balance_by_ratio, BalanceTarget};
pub use predict::{predict_by_extrapolation, ExtrapolationPredictor};
pub use scrap::{buffer_scrap, buffer_scrap_by_region, ScrapBuffer};

/// Which side of a trade pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TradeSide {
    Imports,
    Exports,
}

impl TradeSide {
    pub fn other(self) -> Self {
        match self {
            TradeSide::Imports => TradeSide::Exports,
            TradeSide::Exports => TradeSide::Imports,
        }
    }
}

/// Externally supplied balancing rule, applied in place
pub trait TradeBalancer: Send + Sync + fmt::Debug {
    fn balance(&self, imports: &mut Quantity, exports: &mut Quantity) -> Result<()>;
}

/// Externally supplied prediction rule producing a future trade pair
pub trait TradePredictor: Send + Sync + fmt::Debug {
    fn predict(&self, trade: &Trade) -> Result<Trade>;
}

#[derive(Debug, Clone, Default)]
pub enum BalanceStrategy {
    #[default]
    Unset,
    Ratio(BalanceTarget),
    Custom(Arc<dyn TradeBalancer>),
}

#[derive(Debug, Clone, Default)]
pub enum PredictStrategy {
    #[default]
    Unset,
    Extrapolation(ExtrapolationPredictor),
    Custom(Arc<dyn TradePredictor>),
}

#[derive(Debug, Clone)]
pub struct Trade {
    imports: Quantity,
    exports: Quantity,
    balancer: BalanceStrategy,
    predictor: PredictStrategy,
}

impl Trade {
    /// Both sides need a region axis and identical dimensions
    pub fn new(imports: Quantity, exports: Quantity) -> Result<Self> {
        for (side, quantity) in [("imports", &imports), ("exports", &exports)] {
            if !quantity.dims().contains(REGION) {
                return Err(EngineError::MissingRegionAxis {
                    side,
                    axes: quantity.dims().to_string(),
                });
            }
        }
        if imports.dims() != exports.dims() {
            return Err(EngineError::TradeDimensionMismatch {
                imports: imports.dims().to_string(),
                exports: exports.dims().to_string(),
            });
        }
        Ok(Self {
            imports,
            exports,
            balancer: BalanceStrategy::Unset,
            predictor: PredictStrategy::Unset,
        })
    }

    pub fn with_balancer(mut self, balancer: BalanceStrategy) -> Self {
        self.balancer = balancer;
        self
    }

    pub fn with_predictor(mut self, predictor: PredictStrategy) -> Self {
        self.predictor = predictor;
        self
    }

    pub fn imports(&self) -> &Quantity {
        &self.imports
    }

    pub fn exports(&self) -> &Quantity {
        &self.exports
    }

    pub fn side(&self, side: TradeSide) -> &Quantity {
        match side {
            TradeSide::Imports => &self.imports,
            TradeSide::Exports => &self.exports,
        }
    }

    /// Net inflow per slice, `imports - exports`
    pub fn net_imports(&self) -> Result<Quantity> {
        Ok(self.imports.sub(&self.exports)?.renamed("net_imports"))
    }

    /// Apply the configured balancer in place
    pub fn balance(&mut self) -> Result<()> {
        match &self.balancer {
            BalanceStrategy::Unset => Err(EngineError::BalancerNotConfigured),
            BalanceStrategy::Ratio(target) => balance_by_ratio(&mut self.imports, &mut self.exports, *target),
            BalanceStrategy::Custom(balancer) => balancer.balance(&mut self.imports, &mut self.exports),
        }
    }

    /// Future trade from the configured predictor; needs historic data on both sides
    pub fn predict(&self) -> Result<Trade> {
        if matches!(self.predictor, PredictStrategy::Unset) {
            return Err(EngineError::PredictorNotConfigured);
        }
        for quantity in [&self.imports, &self.exports] {
            if !quantity.dims().contains(HISTORIC_TIME) {
                return Err(EngineError::Precondition(format!(
                    "trade '{}' has no historic time axis to predict from",
                    quantity.name()
                )));
            }
        }
        match &self.predictor {
            PredictStrategy::Unset => Err(EngineError::PredictorNotConfigured),
            PredictStrategy::Extrapolation(predictor) => predictor.predict(self),
            PredictStrategy::Custom(predictor) => predictor.predict(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dims::{Dimension, DimensionSet};

    fn dims(letters: &str) -> DimensionSet {
        DimensionSet::new(
            letters
                .chars()
                .map(|l| match l {
                    'h' => Dimension::years("Historic Time", 'h', 2000, 2004),
                    'r' => Dimension::new("Region", 'r', ["EU", "CN", "US"]),
                    _ => Dimension::new("Good", 'g', ["Cars", "Buildings"]),
                })
                .collect(),
        )
        .unwrap()
    }

    #[derive(Debug)]
    struct Zeroing;

    impl TradeBalancer for Zeroing {
        fn balance(&self, imports: &mut Quantity, exports: &mut Quantity) -> Result<()> {
            *imports = imports.scale(0.0);
            *exports = exports.scale(0.0);
            Ok(())
        }
    }

    #[test]
    fn test_region_axis_required() {
        let result = Trade::new(Quantity::zeros("i", dims("hg")), Quantity::zeros("e", dims("hg")));
        assert!(matches!(result, Err(EngineError::MissingRegionAxis { side: "imports", .. })));
    }

    #[test]
    fn test_dimensions_must_match() {
        let result = Trade::new(Quantity::zeros("i", dims("hr")), Quantity::zeros("e", dims("hrg")));
        assert!(matches!(result, Err(EngineError::TradeDimensionMismatch { .. })));
    }

    #[test]
    fn test_unset_strategies_fail() {
        let mut trade = Trade::new(Quantity::zeros("i", dims("hr")), Quantity::zeros("e", dims("hr"))).unwrap();
        assert!(matches!(trade.balance(), Err(EngineError::BalancerNotConfigured)));
        assert!(matches!(trade.predict(), Err(EngineError::PredictorNotConfigured)));
    }

    #[test]
    fn test_custom_balancer_applies_in_place() {
        let mut trade = Trade::new(Quantity::filled("i", dims("hr"), 3.0), Quantity::filled("e", dims("hr"), 1.0))
            .unwrap()
            .with_balancer(BalanceStrategy::Custom(Arc::new(Zeroing)));
        trade.balance().unwrap();
        assert_eq!(trade.imports().sum(), 0.0);
        assert_eq!(trade.net_imports().unwrap().sum(), 0.0);
    }

    #[test]
    fn test_side_parsing() {
        assert_eq!("imports".parse::<TradeSide>().unwrap(), TradeSide::Imports);
        assert_eq!(TradeSide::Imports.other(), TradeSide::Exports);
    }
}
