//! Plastics system: element/material resolved flows through virgin production,
//! fabrication, use, end-of-life treatment and carbon capture

use tracing::info;

use super::balance::MassBalanceTolerance;
use super::schema::{FlowDefinition, MfaDefinition, ParameterDefinition, StockDefinition, StockKind, SYSENV};
use super::system::MfaSystem;
use crate::dims::{DimensionSet, Quantity};
use crate::error::Result;
use crate::stock::Stock;

pub const CARBON: &str = "C";
pub const OTHER_ELEMENTS: &str = "Other Elements";

const PROCESSES: [&str; 19] = [
    SYSENV,
    "virginfoss",
    "virginbio",
    "virgindaccu",
    "virginccu",
    "virgin",
    "fabrication",
    "recl",
    "reclmech",
    "reclchem",
    "reclsolv",
    "use",
    "eol",
    "incineration",
    "landfill",
    "uncontrolled",
    "emission",
    "captured",
    "atmosphere",
];

const TERM: [char; 4] = ['t', 'e', 'r', 'm'];
const TER: [char; 3] = ['t', 'e', 'r'];
const TERMG: [char; 5] = ['t', 'e', 'r', 'm', 'g'];

/// Schema of the plastics system; `dimensions` must provide t, h, e, r, m and g
pub fn definition(dimensions: DimensionSet) -> MfaDefinition {
    let flows = vec![
        FlowDefinition::new(SYSENV, "virginfoss", &TERM),
        FlowDefinition::new(SYSENV, "virginbio", &TERM),
        FlowDefinition::new(SYSENV, "virgindaccu", &TERM),
        FlowDefinition::new(SYSENV, "virginccu", &TERM),
        FlowDefinition::new("atmosphere", "virginbio", &TER),
        FlowDefinition::new("atmosphere", "virgindaccu", &TER),
        FlowDefinition::new("virginfoss", "virgin", &TERM),
        FlowDefinition::new("virginbio", "virgin", &TERM),
        FlowDefinition::new("virgindaccu", "virgin", &TERM),
        FlowDefinition::new("virginccu", "virgin", &TERM),
        FlowDefinition::new("virgin", "fabrication", &TERM),
        FlowDefinition::new("fabrication", "use", &TERMG),
        FlowDefinition::new("use", "eol", &TERMG),
        FlowDefinition::new("eol", "reclmech", &TERM),
        FlowDefinition::new("eol", "reclchem", &TERM),
        FlowDefinition::new("eol", "reclsolv", &TERM),
        FlowDefinition::new("eol", "uncontrolled", &TERM),
        FlowDefinition::new("eol", "landfill", &TERM),
        FlowDefinition::new("eol", "incineration", &TERM),
        FlowDefinition::new("reclmech", "recl", &TERM),
        FlowDefinition::new("reclchem", "recl", &TERM),
        FlowDefinition::new("reclsolv", "recl", &TERM),
        FlowDefinition::new("recl", "fabrication", &TERM),
        FlowDefinition::new("reclmech", "uncontrolled", &TERM),
        FlowDefinition::new("reclmech", "incineration", &TERM),
        FlowDefinition::new("incineration", "emission", &TER),
        FlowDefinition::new("emission", "captured", &TER),
        FlowDefinition::new("emission", "atmosphere", &TER),
        FlowDefinition::new("captured", "virginccu", &TER),
    ];

    let stocks = vec![
        StockDefinition::new("in_use_historic", None, &['h', 'r', 'g'], StockKind::InflowDriven),
        StockDefinition::new("in_use_dsm", None, &['t', 'r', 'g'], StockKind::StockDriven),
        StockDefinition::new("in_use", Some("use"), &TERMG, StockKind::FlowDriven),
        StockDefinition::new("atmospheric", Some("atmosphere"), &TER, StockKind::FlowDriven),
        StockDefinition::new("landfill", Some("landfill"), &TERM, StockKind::FlowDriven),
        StockDefinition::new("uncontrolled", Some("uncontrolled"), &TERM, StockKind::FlowDriven),
    ];

    let tm = ['t', 'm'];
    let parameters = vec![
        ParameterDefinition::new("mechanical_recycling_rate", &tm),
        ParameterDefinition::new("chemical_recycling_rate", &tm),
        ParameterDefinition::new("solvent_recycling_rate", &tm),
        ParameterDefinition::new("incineration_rate", &tm),
        ParameterDefinition::new("uncontrolled_losses_rate", &tm),
        ParameterDefinition::new("bio_production_rate", &tm),
        ParameterDefinition::new("daccu_production_rate", &tm),
        ParameterDefinition::new("mechanical_recycling_yield", &tm),
        ParameterDefinition::new("reclmech_loss_uncontrolled_rate", &tm),
        ParameterDefinition::new("material_shares_in_goods", &['m', 'g']),
        ParameterDefinition::new("emission_capture_rate", &['t']),
        ParameterDefinition::new("carbon_content_materials", &['e', 'm']),
        ParameterDefinition::new("production", &['h', 'r', 'g']),
        ParameterDefinition::new("lifetime_mean", &['g']),
        ParameterDefinition::new("lifetime_std", &['g']),
        ParameterDefinition::new("population", &['t', 'r']),
        ParameterDefinition::new("gdppc", &['t', 'r']),
    ];

    MfaDefinition {
        name: "plastics".to_string(),
        dimensions,
        processes: PROCESSES.iter().map(|p| p.to_string()).collect(),
        flows,
        stocks,
        parameters,
    }
}

/// Expand a (t, r, g) DSM result into the (t, e, r, m, g) in-use stock of the system
pub fn prepare_in_use_stock(system: &mut MfaSystem, dsm: &Stock) -> Result<()> {
    let material_shares = system.parameter("material_shares_in_goods")?;
    let carbon_content = system.parameter("carbon_content_materials")?;
    let dims = system.stock("in_use")?.dims().clone();

    let expand = |part: &Quantity, name: &str| -> Result<Quantity> {
        let expanded = part.mul(material_shares)?.mul(carbon_content)?;
        Ok(expanded.cast_to(&dims)?.renamed(name))
    };
    let stock = Stock::from_parts(
        "in_use",
        "use",
        expand(&dsm.level, "in_use_stock")?,
        expand(&dsm.inflow, "in_use_inflow")?,
        expand(&dsm.outflow, "in_use_outflow")?,
    )?;
    system.set_stock(stock)
}

/// Evaluate every flow in dependency order, then the flow-driven stocks, then check mass balance
pub fn compute(system: &mut MfaSystem, tolerance: MassBalanceTolerance) -> Result<()> {
    compute_flows(system)?;
    compute_other_stocks(system)?;
    system.check_mass_balance(tolerance)
}

fn compute_flows(sys: &mut MfaSystem) -> Result<()> {
    let in_use = sys.stock("in_use")?;
    let (inflow, outflow) = (in_use.inflow.clone(), in_use.outflow.clone());
    sys.set_flow("fabrication => use", &inflow)?;
    sys.set_flow("use => eol", &outflow)?;

    let v = sys.flow("use => eol")?.mul(sys.parameter("mechanical_recycling_rate")?)?;
    sys.set_flow("eol => reclmech", &v)?;
    let v = sys.flow("eol => reclmech")?.mul(sys.parameter("mechanical_recycling_yield")?)?;
    sys.set_flow("reclmech => recl", &v)?;
    let reclmech_loss = sys.flow("eol => reclmech")?.sub(sys.flow("reclmech => recl")?)?;
    let v = reclmech_loss.mul(sys.parameter("reclmech_loss_uncontrolled_rate")?)?;
    sys.set_flow("reclmech => uncontrolled", &v)?;
    let v = reclmech_loss.sub(sys.flow("reclmech => uncontrolled")?)?;
    sys.set_flow("reclmech => incineration", &v)?;

    let v = sys.flow("use => eol")?.mul(sys.parameter("chemical_recycling_rate")?)?;
    sys.set_flow("eol => reclchem", &v)?;
    let v = sys.flow("eol => reclchem")?.clone();
    sys.set_flow("reclchem => recl", &v)?;

    let v = sys.flow("use => eol")?.mul(sys.parameter("solvent_recycling_rate")?)?;
    sys.set_flow("eol => reclsolv", &v)?;
    let v = sys.flow("eol => reclsolv")?.clone();
    sys.set_flow("reclsolv => recl", &v)?;

    let v = sys.flow("use => eol")?.mul(sys.parameter("incineration_rate")?)?;
    sys.set_flow("eol => incineration", &v)?;
    let v = sys.flow("use => eol")?.mul(sys.parameter("uncontrolled_losses_rate")?)?;
    sys.set_flow("eol => uncontrolled", &v)?;

    // landfill takes whatever end-of-life material is not diverted
    let v = sys
        .flow("use => eol")?
        .sub(sys.flow("eol => reclmech")?)?
        .sub(sys.flow("eol => reclchem")?)?
        .sub(sys.flow("eol => reclsolv")?)?
        .sub(sys.flow("eol => incineration")?)?
        .sub(sys.flow("eol => uncontrolled")?)?;
    sys.set_flow("eol => landfill", &v)?;

    let v = sys
        .flow("eol => incineration")?
        .add(sys.flow("reclmech => incineration")?)?;
    sys.set_flow("incineration => emission", &v)?;

    let v = sys
        .flow("incineration => emission")?
        .mul(sys.parameter("emission_capture_rate")?)?;
    sys.set_flow("emission => captured", &v)?;
    let v = sys
        .flow("incineration => emission")?
        .sub(sys.flow("emission => captured")?)?;
    sys.set_flow("emission => atmosphere", &v)?;
    let v = sys.flow("emission => captured")?.clone();
    sys.set_flow("captured => virginccu", &v)?;

    let v = sys
        .flow("reclmech => recl")?
        .add(sys.flow("reclchem => recl")?)?
        .add(sys.flow("reclsolv => recl")?)?;
    sys.set_flow("recl => fabrication", &v)?;
    let v = sys
        .flow("fabrication => use")?
        .sub(sys.flow("recl => fabrication")?)?;
    sys.set_flow("virgin => fabrication", &v)?;

    let v = sys
        .flow("virgin => fabrication")?
        .mul(sys.parameter("daccu_production_rate")?)?;
    sys.set_flow("virgindaccu => virgin", &v)?;
    let v = sys
        .flow("virgin => fabrication")?
        .mul(sys.parameter("bio_production_rate")?)?;
    sys.set_flow("virginbio => virgin", &v)?;

    // captured carbon is split across materials like virgin demand
    let virgin = sys.flow("virgin => fabrication")?;
    let virgin_all_materials = virgin.sum_to(&TER)?;
    let virgin_material_shares = virgin.div(&virgin_all_materials)?.nan_to_zero();
    let captured_by_material = sys
        .flow("captured => virginccu")?
        .mul(&virgin_material_shares)?
        .cast_to(&sys.flow("virginccu => virgin")?.dims().clone())?;

    let carbon = captured_by_material.slice_item('e', CARBON)?;
    sys.flow_mut("virginccu => virgin")?.set_item('e', CARBON, &carbon)?;
    let carbon_content = sys.parameter("carbon_content_materials")?;
    let ratio_other_to_carbon = carbon_content
        .slice_item('e', OTHER_ELEMENTS)?
        .div(&carbon_content.slice_item('e', CARBON)?)?
        .nan_to_zero();
    let other = sys
        .flow("virginccu => virgin")?
        .slice_item('e', CARBON)?
        .mul(&ratio_other_to_carbon)?;
    sys.flow_mut("virginccu => virgin")?.set_item('e', OTHER_ELEMENTS, &other)?;

    let v = sys
        .flow("virgin => fabrication")?
        .sub(sys.flow("virgindaccu => virgin")?)?
        .sub(sys.flow("virginbio => virgin")?)?
        .sub(sys.flow("virginccu => virgin")?)?;
    sys.set_flow("virginfoss => virgin", &v)?;

    let v = sys.flow("virginfoss => virgin")?.clone();
    sys.set_flow("sysenv => virginfoss", &v)?;
    let v = sys.flow("virginbio => virgin")?.clone();
    sys.set_flow("atmosphere => virginbio", &v)?;
    let v = sys.flow("virgindaccu => virgin")?.clone();
    sys.set_flow("atmosphere => virgindaccu", &v)?;
    // non-carbon captured material has no physical source and enters from outside
    let v = sys.flow("virginccu => virgin")?.sub(&captured_by_material)?;
    sys.set_flow("sysenv => virginccu", &v)?;

    info!(flows = sys.flows().count(), "plastics flows computed");
    Ok(())
}

fn compute_other_stocks(sys: &mut MfaSystem) -> Result<()> {
    let landfill_in = sys.flow("eol => landfill")?.clone();
    let landfill = sys.stock_mut("landfill")?;
    landfill.inflow.assign(&landfill_in)?;
    landfill.compute_from_flows();

    let uncontrolled_in = sys
        .flow("eol => uncontrolled")?
        .add(sys.flow("reclmech => uncontrolled")?)?;
    let uncontrolled = sys.stock_mut("uncontrolled")?;
    uncontrolled.inflow.assign(&uncontrolled_in)?;
    uncontrolled.compute_from_flows();

    let atmospheric_in = sys.flow("emission => atmosphere")?.clone();
    let atmospheric_out = sys
        .flow("atmosphere => virgindaccu")?
        .add(sys.flow("atmosphere => virginbio")?)?;
    let atmospheric = sys.stock_mut("atmospheric")?;
    atmospheric.inflow.assign(&atmospheric_in)?;
    atmospheric.outflow.assign(&atmospheric_out)?;
    atmospheric.compute_from_flows();
    Ok(())
}
