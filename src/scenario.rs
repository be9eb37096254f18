//! Deterministic synthetic inputs for the plastics and steel systems
//!
//! Values are smooth closed-form curves: growing population and GDP per capita,
//! production rising from a region/good specific base, fixed material compositions.
//! They drive the binary and the integration tests.

use std::collections::BTreeMap;

use ndarray::{ArrayD, Dimension as _, IxDyn};

use crate::config::ScenarioConfig;
use crate::dims::{Dimension, DimensionSet, Quantity, HISTORIC_TIME, REGION, TIME};
use crate::error::Result;
use crate::flow::SteelOptions;

pub const PLASTICS_MATERIALS: [&str; 3] = ["PE", "PP", "PVC"];
pub const PLASTICS_ELEMENTS: [&str; 2] = ["C", "Other Elements"];
pub const STEEL_WASTE: [&str; 3] = ["construction_waste", "end_of_life_vehicles", "other_waste"];

/// Dimensions plus every parameter one system declares
#[derive(Debug, Clone)]
pub struct Scenario {
    pub dimensions: DimensionSet,
    pub parameters: BTreeMap<String, Quantity>,
}

struct Axes {
    time: Dimension,
    historic: Dimension,
    region: Dimension,
    good: Dimension,
}

impl Axes {
    fn new(cfg: &ScenarioConfig) -> Self {
        let first = cfg.first_historic_year;
        let last_historic = first + cfg.historic_years as i32 - 1;
        let last = last_historic + cfg.future_years as i32;
        Self {
            time: Dimension::years("Time", TIME, first, last),
            historic: Dimension::years("Historic Time", HISTORIC_TIME, first, last_historic),
            region: Dimension::new("Region", REGION, cfg.regions.iter().cloned()),
            good: Dimension::new("Good", 'g', cfg.goods.iter().cloned()),
        }
    }

    fn set(&self, extra: &[&Dimension]) -> Result<DimensionSet> {
        let mut dims = vec![
            self.time.clone(),
            self.historic.clone(),
            self.region.clone(),
            self.good.clone(),
        ];
        dims.extend(extra.iter().map(|d| (*d).clone()));
        DimensionSet::new(dims)
    }
}

/// Build a quantity by evaluating `f` at every multi-index
fn tabulate(name: &str, dims: DimensionSet, f: impl Fn(&[usize]) -> f64) -> Result<Quantity> {
    let values = ArrayD::from_shape_fn(IxDyn(&dims.shape()), |index| f(index.slice()));
    Quantity::from_values(name, dims, values)
}

/// Parameters shared by both systems: production history, lifetimes and socioeconomic drivers
fn common(axes: &Axes, parameters: &mut BTreeMap<String, Quantity>) -> Result<()> {
    let hrg = DimensionSet::new(vec![axes.historic.clone(), axes.region.clone(), axes.good.clone()])?;
    let tr = DimensionSet::new(vec![axes.time.clone(), axes.region.clone()])?;
    let g = DimensionSet::new(vec![axes.good.clone()])?;

    let entries = [
        tabulate("production", hrg, |i| {
            let base = 10.0 * (1.0 + i[1] as f64) * (1.0 + 0.5 * i[2] as f64);
            base * 1.04_f64.powi(i[0] as i32)
        })?,
        tabulate("lifetime_mean", g.clone(), |i| 10.0 + 5.0 * i[0] as f64)?,
        tabulate("lifetime_std", g, |i| 0.3 * (10.0 + 5.0 * i[0] as f64))?,
        tabulate("population", tr.clone(), |i| {
            (50.0 + 30.0 * i[1] as f64) * 1.01_f64.powi(i[0] as i32)
        })?,
        tabulate("gdppc", tr, |i| {
            (10_000.0 + 5_000.0 * i[1] as f64) * 1.03_f64.powi(i[0] as i32)
        })?,
    ];
    for quantity in entries {
        parameters.insert(quantity.name().to_string(), quantity);
    }
    Ok(())
}

/// Linear ramp over the time axis from `start` to `end`
fn ramp(i: usize, periods: usize, start: f64, end: f64) -> f64 {
    if periods < 2 {
        return start;
    }
    start + (end - start) * i as f64 / (periods - 1) as f64
}

pub fn plastics(cfg: &ScenarioConfig) -> Result<Scenario> {
    let axes = Axes::new(cfg);
    let materials = Dimension::new("Material", 'm', PLASTICS_MATERIALS);
    let elements = Dimension::new("Element", 'e', PLASTICS_ELEMENTS);
    let dimensions = axes.set(&[&materials, &elements])?;

    let mut parameters = BTreeMap::new();
    common(&axes, &mut parameters)?;

    let periods = axes.time.len();
    let tm = DimensionSet::new(vec![axes.time.clone(), materials.clone()])?;
    let rates: [(&str, f64, f64); 9] = [
        ("mechanical_recycling_rate", 0.10, 0.25),
        ("chemical_recycling_rate", 0.00, 0.10),
        ("solvent_recycling_rate", 0.00, 0.05),
        ("incineration_rate", 0.25, 0.30),
        ("uncontrolled_losses_rate", 0.10, 0.02),
        ("bio_production_rate", 0.01, 0.10),
        ("daccu_production_rate", 0.00, 0.05),
        ("mechanical_recycling_yield", 0.75, 0.85),
        ("reclmech_loss_uncontrolled_rate", 0.05, 0.05),
    ];
    for (name, start, end) in rates {
        let q = tabulate(name, tm.clone(), |i| {
            // PVC recycles worse than the polyolefins
            let material = if i[1] == 2 { 0.5 } else { 1.0 };
            ramp(i[0], periods, start, end) * material
        })?;
        parameters.insert(name.to_string(), q);
    }

    let mg = DimensionSet::new(vec![materials.clone(), axes.good.clone()])?;
    let shares = tabulate("material_shares_in_goods", mg, |i| {
        let raw = [0.5, 0.3, 0.2];
        let shift = (i[1] % 3) as f64 * 0.1;
        let weights = [raw[0] - shift, raw[1], raw[2] + shift];
        weights[i[0]] / weights.iter().sum::<f64>()
    })?;
    parameters.insert("material_shares_in_goods".to_string(), shares);

    let t = DimensionSet::new(vec![axes.time.clone()])?;
    parameters.insert(
        "emission_capture_rate".to_string(),
        tabulate("emission_capture_rate", t, |i| ramp(i[0], periods, 0.0, 0.2))?,
    );

    let em = DimensionSet::new(vec![elements, materials])?;
    parameters.insert(
        "carbon_content_materials".to_string(),
        tabulate("carbon_content_materials", em, |i| {
            let carbon = [0.86, 0.86, 0.38][i[1]];
            if i[0] == 0 {
                carbon
            } else {
                1.0 - carbon
            }
        })?,
    );

    Ok(Scenario { dimensions, parameters })
}

pub fn steel(cfg: &ScenarioConfig, options: SteelOptions) -> Result<Scenario> {
    let axes = Axes::new(cfg);
    let elements = Dimension::new("Element", 'e', ["Fe"]);
    let waste = Dimension::new("Waste", 'w', STEEL_WASTE);
    let dimensions = axes.set(&[&elements, &waste])?;

    let mut parameters = BTreeMap::new();
    common(&axes, &mut parameters)?;

    let gw = DimensionSet::new(vec![axes.good.clone(), waste.clone()])?;
    let n_waste = waste.len();
    parameters.insert(
        "end_use_distribution".to_string(),
        tabulate("end_use_distribution", gw, |i| {
            // each good discards mostly into its own waste category
            let own = i[0] % n_waste;
            let off = 0.2 / (n_waste - 1).max(1) as f64;
            if n_waste == 1 {
                1.0
            } else if i[1] == own {
                0.8
            } else {
                off
            }
        })?,
    );
    let w = DimensionSet::new(vec![waste])?;
    parameters.insert(
        "recycling_usable_rate".to_string(),
        tabulate("recycling_usable_rate", w, |i| [0.9, 0.85, 0.6].get(i[0]).copied().unwrap_or(0.6))?,
    );

    let hr = DimensionSet::new(vec![axes.historic.clone(), axes.region.clone()])?;
    let mut trade = Vec::new();
    if options.include_trade {
        trade.push(("steel_imports", 2.0, 0.03));
        trade.push(("steel_exports", 1.5, 0.02));
    }
    if options.include_scrap_trade {
        trade.push(("scrap_imports", 0.5, 0.02));
        trade.push(("scrap_exports", 0.8, 0.03));
    }
    for (name, base, growth) in trade {
        let q = tabulate(name, hr.clone(), |i| {
            base * (1.0 + i[1] as f64) * (1.0_f64 + growth).powi(i[0] as i32)
        })?;
        parameters.insert(name.to_string(), q);
    }

    Ok(Scenario { dimensions, parameters })
}
