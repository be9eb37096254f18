//! Whole-economy steel system: production, final steel with optional trade,
//! in-use stocks, recycling and a capacity-bounded usable scrap buffer

use tracing::{info, warn};

use super::balance::MassBalanceTolerance;
use super::schema::{flow_name, FlowDefinition, MfaDefinition, ParameterDefinition, StockDefinition, StockKind, SYSENV};
use super::system::MfaSystem;
use crate::dims::{DimensionSet, Quantity};
use crate::error::{EngineError, Result};
use crate::stock::Stock;
use crate::trade::{buffer_scrap_by_region, Trade};

pub const PRODUCTION: &str = "production";
pub const FINAL_STEEL: &str = "final_steel";
pub const USABLE_SCRAP: &str = "usable_scrap";
pub const USING: &str = "using";
pub const RECYCLING: &str = "recycling";
pub const WASTE: &str = "waste";

const TER: [char; 3] = ['t', 'e', 'r'];

/// Which optional trade flows exist in the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SteelOptions {
    pub include_trade: bool,
    pub include_scrap_trade: bool,
}

/// Schema of the steel system; `dimensions` must provide t, h, e, r, g and w
pub fn definition(dimensions: DimensionSet, options: SteelOptions) -> Result<MfaDefinition> {
    if options.include_scrap_trade && !options.include_trade {
        return Err(EngineError::InvalidConfig(
            "scrap trade cannot be included without final steel trade".to_string(),
        ));
    }

    let mut flows = vec![
        FlowDefinition::new(SYSENV, PRODUCTION, &TER),
        FlowDefinition::new(USABLE_SCRAP, PRODUCTION, &TER),
        FlowDefinition::new(PRODUCTION, FINAL_STEEL, &TER),
        FlowDefinition::new(FINAL_STEEL, USING, &['t', 'e', 'r', 'g']),
        FlowDefinition::new(USING, RECYCLING, &['t', 'e', 'r', 'g', 'w']),
        FlowDefinition::new(RECYCLING, USABLE_SCRAP, &['t', 'e', 'r', 'w']),
        FlowDefinition::new(RECYCLING, WASTE, &['t', 'e', 'r', 'w']),
    ];
    if options.include_trade {
        flows.push(FlowDefinition::new(SYSENV, FINAL_STEEL, &TER));
        flows.push(FlowDefinition::new(FINAL_STEEL, SYSENV, &TER));
    }
    if options.include_scrap_trade {
        flows.push(FlowDefinition::new(SYSENV, USABLE_SCRAP, &TER));
        flows.push(FlowDefinition::new(USABLE_SCRAP, SYSENV, &TER));
    }

    let mut parameters = vec![
        ParameterDefinition::new("end_use_distribution", &['g', 'w']),
        ParameterDefinition::new("recycling_usable_rate", &['w']),
        ParameterDefinition::new("production", &['h', 'r', 'g']),
        ParameterDefinition::new("lifetime_mean", &['g']),
        ParameterDefinition::new("lifetime_std", &['g']),
        ParameterDefinition::new("population", &['t', 'r']),
        ParameterDefinition::new("gdppc", &['t', 'r']),
    ];
    if options.include_trade {
        parameters.push(ParameterDefinition::new("steel_imports", &['h', 'r']));
        parameters.push(ParameterDefinition::new("steel_exports", &['h', 'r']));
    }
    if options.include_scrap_trade {
        parameters.push(ParameterDefinition::new("scrap_imports", &['h', 'r']));
        parameters.push(ParameterDefinition::new("scrap_exports", &['h', 'r']));
    }

    Ok(MfaDefinition {
        name: "steel".to_string(),
        dimensions,
        processes: [SYSENV, PRODUCTION, FINAL_STEEL, USABLE_SCRAP, USING, RECYCLING, WASTE]
            .iter()
            .map(|p| p.to_string())
            .collect(),
        flows,
        stocks: vec![
            StockDefinition::new("in_use_historic", None, &['h', 'r', 'g'], StockKind::InflowDriven),
            StockDefinition::new("in_use_dsm", None, &['t', 'r', 'g'], StockKind::StockDriven),
            StockDefinition::new("in_use", Some(USING), &['t', 'e', 'r', 'g'], StockKind::FlowDriven),
            StockDefinition::new("usable_scrap", Some(USABLE_SCRAP), &TER, StockKind::FlowDriven),
            StockDefinition::new("waste", Some(WASTE), &TER, StockKind::FlowDriven),
        ],
        parameters,
    })
}

/// Future trade pairs over (t, r), already predicted
#[derive(Debug, Clone, Copy, Default)]
pub struct SteelTrade<'a> {
    pub final_steel: Option<&'a Trade>,
    pub scrap: Option<&'a Trade>,
}

/// Evaluate the steel plan for a (t, r, g) in-use DSM result
///
/// `max_scrap_share_production` bounds scrap use per period to that share of production.
pub fn compute(
    sys: &mut MfaSystem,
    dsm: &Stock,
    trade: SteelTrade<'_>,
    max_scrap_share_production: f64,
    tolerance: MassBalanceTolerance,
) -> Result<()> {
    let in_use_dims = sys.stock("in_use")?.dims().clone();
    let in_use = Stock::from_parts(
        "in_use",
        USING,
        dsm.level.cast_to(&in_use_dims)?.renamed("in_use_stock"),
        dsm.inflow.cast_to(&in_use_dims)?.renamed("in_use_inflow"),
        dsm.outflow.cast_to(&in_use_dims)?.renamed("in_use_outflow"),
    )?;
    sys.set_flow(&flow_name(FINAL_STEEL, USING), &in_use.inflow)?;
    let total_inflow = in_use.inflow.sum_to(&TER)?;

    let v = in_use.outflow.mul(sys.parameter("end_use_distribution")?)?;
    sys.set_flow(&flow_name(USING, RECYCLING), &v)?;
    sys.set_stock(in_use)?;

    let recycling_inflow = sys.flow(&flow_name(USING, RECYCLING))?.sum_to(&['t', 'e', 'r', 'w'])?;
    let usable_rate = sys.parameter("recycling_usable_rate")?;
    let to_scrap = recycling_inflow.mul(usable_rate)?;
    let to_waste = recycling_inflow.mul(&usable_rate.mapv(|r| 1.0 - r))?;
    sys.set_flow(&flow_name(RECYCLING, USABLE_SCRAP), &to_scrap)?;
    sys.set_flow(&flow_name(RECYCLING, WASTE), &to_waste)?;

    let ter = sys.flow(&flow_name(PRODUCTION, FINAL_STEEL))?.dims().clone();
    let mut total_production = total_inflow;
    if let Some(final_steel) = trade.final_steel {
        let imports = final_steel.imports().cast_to(&ter)?;
        let exports = final_steel.exports().cast_to(&ter)?;
        sys.set_flow(&flow_name(SYSENV, FINAL_STEEL), &imports)?;
        sys.set_flow(&flow_name(FINAL_STEEL, SYSENV), &exports)?;
        total_production = total_production.sub(&imports)?.add(&exports)?;
    }
    if total_production.values().iter().any(|&v| v < 0.0) {
        warn!("net imports exceed domestic demand; production is negative in some periods");
    }
    sys.set_flow(&flow_name(PRODUCTION, FINAL_STEEL), &total_production)?;

    let cap = sys
        .flow(&flow_name(PRODUCTION, FINAL_STEEL))?
        .scale(max_scrap_share_production)
        .renamed("max_scrap_use");
    let mut available = sys.flow(&flow_name(RECYCLING, USABLE_SCRAP))?.sum_to(&TER)?;
    if let Some(scrap) = trade.scrap {
        let imports = scrap.imports().cast_to(&ter)?;
        let exports = scrap.exports().cast_to(&ter)?;
        sys.set_flow(&flow_name(SYSENV, USABLE_SCRAP), &imports)?;
        sys.set_flow(&flow_name(USABLE_SCRAP, SYSENV), &exports)?;
        available = available.add(&imports)?.sub(&exports)?;
    }

    let (recyclable, inventory) = buffer_scrap_by_region(&available, &cap)?;
    sys.set_flow(&flow_name(USABLE_SCRAP, PRODUCTION), &recyclable)?;
    let primary = total_production.sub(&recyclable)?;
    sys.set_flow(&flow_name(SYSENV, PRODUCTION), &primary)?;

    compute_other_stocks(sys, &available, &recyclable)?;
    info!(
        production = total_production.sum(),
        recycled = recyclable.sum(),
        scrap_left = last_period_total(&inventory),
        "steel flows computed"
    );
    sys.check_mass_balance(tolerance)
}

fn compute_other_stocks(sys: &mut MfaSystem, available: &Quantity, recyclable: &Quantity) -> Result<()> {
    let waste_in = sys.flow(&flow_name(RECYCLING, WASTE))?.clone();
    let waste = sys.stock_mut("waste")?;
    waste.inflow.assign(&waste_in)?;
    waste.compute_from_flows();

    let scrap = sys.stock_mut("usable_scrap")?;
    scrap.inflow.assign(available)?;
    scrap.outflow.assign(recyclable)?;
    scrap.compute_from_flows();
    Ok(())
}

fn last_period_total(quantity: &Quantity) -> f64 {
    let values = quantity.values();
    match values.shape().first() {
        Some(&n) if n > 0 => values.index_axis(ndarray::Axis(0), n - 1).sum(),
        _ => 0.0,
    }
}
