use ndarray::{ArrayView1, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{DsmMode, DynamicStockModel, LifetimeFamily, LifetimeModel};
use crate::dims::{DimensionSet, Quantity};
use crate::error::{EngineError, Result};
use crate::stock::Stock;

/// Lifetime assumption for a whole batch: one family, mean/std per slice.
/// `mean` and `std` may carry any subset of the non-time axes.
#[derive(Debug, Clone)]
pub struct LifetimeSpec {
    pub family: LifetimeFamily,
    pub mean: Quantity,
    pub std: Quantity,
}

/// A negative solved inflow, located by slice labels and period label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegativeInflow {
    pub slice: Vec<String>,
    pub period: String,
    pub value: f64,
}

/// Result of a batch run: the stock triple plus any flagged negative inflows
#[derive(Debug, Clone)]
pub struct DsmBatch {
    pub stock: Stock,
    pub negative_inflows: Vec<NegativeInflow>,
}

/// Inflow-driven DSM for every slice of `inflow` (time axis `time` leading)
pub fn compute_inflow_driven(
    name: &str,
    process: &str,
    inflow: &Quantity,
    time: char,
    lifetime: &LifetimeSpec,
    parallel: bool,
) -> Result<DsmBatch> {
    run_batch(name, process, inflow, time, lifetime, DsmMode::InflowDriven, parallel)
}

/// Stock-driven DSM for every slice of `stock` (time axis `time` leading)
pub fn compute_stock_driven(
    name: &str,
    process: &str,
    stock: &Quantity,
    time: char,
    lifetime: &LifetimeSpec,
    parallel: bool,
) -> Result<DsmBatch> {
    run_batch(name, process, stock, time, lifetime, DsmMode::StockDriven, parallel)
}

fn run_batch(
    name: &str,
    process: &str,
    known: &Quantity,
    time: char,
    lifetime: &LifetimeSpec,
    mode: DsmMode,
    parallel: bool,
) -> Result<DsmBatch> {
    if known.dims().first_letter() != Some(time) {
        return Err(EngineError::Precondition(format!(
            "DSM input '{}' must lead with time axis '{time}', got {}",
            known.name(),
            known.dims()
        )));
    }
    let dims = known.dims().clone();
    let slice_dims = dims.without(time);
    let mean = lifetime.mean.cast_to(&slice_dims)?;
    let std = lifetime.std.cast_to(&slice_dims)?;

    let values = known.values();
    let mean_values = mean.values();
    let std_values = std.values();
    let inputs: Vec<(Vec<f64>, f64, f64)> = values
        .lanes(Axis(0))
        .into_iter()
        .zip(mean_values.iter().zip(std_values.iter()))
        .map(|(lane, (&m, &s))| (lane.to_vec(), m, s))
        .collect();

    let solve = |(series, m, s): (Vec<f64>, f64, f64)| -> Result<DynamicStockModel> {
        let model = LifetimeModel::new(lifetime.family, m, s)?;
        match mode {
            DsmMode::InflowDriven => DynamicStockModel::inflow_driven(series, &model),
            DsmMode::StockDriven => DynamicStockModel::stock_driven(series, &model),
        }
    };
    let models: Vec<DynamicStockModel> = if parallel {
        inputs.into_par_iter().map(solve).collect::<Result<_>>()?
    } else {
        inputs.into_iter().map(solve).collect::<Result<_>>()?
    };
    debug!(stock = name, slices = models.len(), ?mode, "dynamic stock models computed");

    let mut stock = Stock::new(name, process, dims.clone());
    write_lanes(&mut stock.level, &models, DynamicStockModel::stock);
    write_lanes(&mut stock.inflow, &models, DynamicStockModel::inflow);
    write_lanes(&mut stock.outflow, &models, DynamicStockModel::outflow);

    let time_items = &dims.dim(time)?.items;
    let mut negative_inflows = Vec::new();
    for (flat, model) in models.iter().enumerate() {
        for &t in model.negative_inflow_periods() {
            negative_inflows.push(NegativeInflow {
                slice: slice_labels(&slice_dims, flat),
                period: time_items[t].clone(),
                value: model.inflow()[t],
            });
        }
    }
    if !negative_inflows.is_empty() {
        warn!(
            stock = name,
            count = negative_inflows.len(),
            first = ?negative_inflows.first(),
            "stock-driven model solved negative inflows; stock targets may be infeasible"
        );
    }

    Ok(DsmBatch {
        stock,
        negative_inflows,
    })
}

fn write_lanes(target: &mut Quantity, models: &[DynamicStockModel], series: fn(&DynamicStockModel) -> &[f64]) {
    let mut values = target.values_mut();
    for (mut lane, model) in values.lanes_mut(Axis(0)).into_iter().zip(models) {
        lane.assign(&ArrayView1::from(series(model)));
    }
}

/// Row-major unravel of a flat slice index into item labels
fn slice_labels(slice_dims: &DimensionSet, mut flat: usize) -> Vec<String> {
    let dims: Vec<_> = slice_dims.iter().collect();
    let mut labels = vec![String::new(); dims.len()];
    for (i, dim) in dims.iter().enumerate().rev() {
        let len = dim.len().max(1);
        labels[i] = dim.items[flat % len].clone();
        flat /= len;
    }
    labels
}
