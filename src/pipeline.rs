//! End-to-end model run
//!
//! historic production -> inflow-driven DSM -> per-capita stock projection ->
//! stock-driven DSM -> flow plan -> mass balance, with trade prediction for steel.

use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::config::{Config, SystemKind};
use crate::dims::{DimensionSet, Quantity, HISTORIC_TIME, REGION, TIME};
use crate::dsm::{compute_inflow_driven, compute_stock_driven, DsmBatch, LifetimeSpec, NegativeInflow};
use crate::error::Result;
use crate::extrapolation::extrapolate_stock;
use crate::flow::{plastics, steel, MfaSystem, SteelTrade};
use crate::trade::{ExtrapolationPredictor, PredictStrategy, Trade};

/// Flows below this are reported as negative; smaller dips are rounding noise
const NEGATIVE_FLOW_TOLERANCE: f64 = 1e-8;

#[derive(Debug)]
pub struct ModelRun {
    pub system: MfaSystem,
    pub historic: DsmBatch,
    pub projected_stock: Quantity,
    pub future: DsmBatch,
    pub trade: Option<Trade>,
    pub scrap_trade: Option<Trade>,
}

impl ModelRun {
    /// Negative solved inflows of the future stock-driven run, kept as computed
    pub fn negative_inflows(&self) -> &[NegativeInflow] {
        &self.future.negative_inflows
    }
}

pub fn run(config: &Config, dimensions: DimensionSet, parameters: BTreeMap<String, Quantity>) -> Result<ModelRun> {
    let model = &config.model;
    let definition = match model.system {
        SystemKind::Plastics => plastics::definition(dimensions),
        SystemKind::Steel => steel::definition(dimensions, model.steel_options())?,
    };
    let in_use_process = definition
        .stock("in_use")?
        .process
        .clone()
        .unwrap_or_default();
    let mut system = MfaSystem::new(definition, parameters)?;
    info!(system = %system.definition().name, flows = system.flows().count(), "system allocated");

    let lifetime = LifetimeSpec {
        family: model.lifetime_family()?,
        mean: system.parameter("lifetime_mean")?.clone(),
        std: system.parameter("lifetime_std")?.clone(),
    };

    let historic = compute_inflow_driven(
        "in_use_historic",
        &in_use_process,
        system.parameter("production")?,
        HISTORIC_TIME,
        &lifetime,
        model.parallel,
    )?;
    let projected_stock = extrapolate_stock(
        &historic.stock.level,
        system.parameter("population")?,
        system.parameter("gdppc")?,
        model.curve_strategy()?,
        model.parallel,
    )?;
    let future = compute_stock_driven(
        "in_use_dsm",
        &in_use_process,
        &projected_stock,
        TIME,
        &lifetime,
        model.parallel,
    )?;
    if !future.negative_inflows.is_empty() {
        warn!(count = future.negative_inflows.len(), "projected stock implies negative inflows");
    }

    let tolerance = config.mass_balance.tolerance_for(model.system);
    let (trade, scrap_trade) = match model.system {
        SystemKind::Plastics => {
            plastics::prepare_in_use_stock(&mut system, &future.stock)?;
            plastics::compute(&mut system, tolerance)?;
            (None, None)
        }
        SystemKind::Steel => {
            let demand = future.stock.inflow.sum_to(&[TIME, REGION])?.renamed("steel_demand");
            let trade = if model.include_trade {
                Some(predict_trade(config, &system, "steel", &demand)?)
            } else {
                None
            };
            let scrap_trade = if model.include_scrap_trade {
                let discards = future.stock.outflow.sum_to(&[TIME, REGION])?.renamed("steel_discards");
                Some(predict_trade(config, &system, "scrap", &discards)?)
            } else {
                None
            };
            let trades = SteelTrade {
                final_steel: trade.as_ref(),
                scrap: scrap_trade.as_ref(),
            };
            steel::compute(
                &mut system,
                &future.stock,
                trades,
                model.max_scrap_share_production,
                tolerance,
            )?;
            (trade, scrap_trade)
        }
    };

    if model.reject_negative_flows {
        system.check_non_negative(NEGATIVE_FLOW_TOLERANCE, &[])?;
    } else {
        let negative = system.negative_flows(NEGATIVE_FLOW_TOLERANCE);
        if !negative.is_empty() {
            warn!(flows = ?negative, "negative flows kept");
        }
    }

    info!(
        system = %system.definition().name,
        historic_stock = historic.stock.level.sum(),
        projected_stock = projected_stock.sum(),
        "model run complete"
    );
    Ok(ModelRun {
        system,
        historic,
        projected_stock,
        future,
        trade,
        scrap_trade,
    })
}

/// Predict `{prefix}_imports` / `{prefix}_exports` history over the scaler's horizon
fn predict_trade(config: &Config, system: &MfaSystem, prefix: &str, scaler: &Quantity) -> Result<Trade> {
    let historic = Trade::new(
        system.parameter(&format!("{prefix}_imports"))?.clone(),
        system.parameter(&format!("{prefix}_exports"))?.clone(),
    )?
    .with_predictor(PredictStrategy::Extrapolation(ExtrapolationPredictor {
        scaler: scaler.clone(),
        scale_first: config.trade.scale_first,
        adopt_scaler_dims: config.trade.adopt_scaler_dims,
        balance_to: config.trade.balance_to,
    }));
    let future = historic.predict()?;
    info!(
        trade = prefix,
        imports = future.imports().sum(),
        exports = future.exports().sum(),
        "trade predicted"
    );
    Ok(future)
}
