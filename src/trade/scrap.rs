use ndarray::{ArrayView1, Axis, Zip};
use serde::{Deserialize, Serialize};

use crate::dims::{Quantity, TIME};
use crate::error::{EngineError, Result};

/// Per-period outcome of the usable-scrap buffer for one region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapBuffer {
    /// Scrap consumed each period, never above the cap
    pub recyclable: Vec<f64>,
    /// Carried inventory at the end of each period
    pub inventory: Vec<f64>,
}

impl ScrapBuffer {
    /// Demand the buffer could not cover, to be met from primary production
    pub fn shortfall(&self, cap: &[f64]) -> Vec<f64> {
        cap.iter().zip(&self.recyclable).map(|(c, r)| c - r).collect()
    }
}

/// Greedy bounded buffer over time: consume up to `cap[t]` from this period's
/// availability plus carried inventory, carry any surplus forward
pub fn buffer_scrap(available: &[f64], cap: &[f64]) -> Result<ScrapBuffer> {
    if available.len() != cap.len() {
        return Err(EngineError::Precondition(format!(
            "scrap availability covers {} periods but the cap covers {}",
            available.len(),
            cap.len()
        )));
    }
    Ok(run_buffer(available, cap))
}

fn run_buffer(available: &[f64], cap: &[f64]) -> ScrapBuffer {
    let mut stored = 0.0;
    let mut recyclable = Vec::with_capacity(available.len());
    let mut inventory = Vec::with_capacity(available.len());
    for (&avail, &max) in available.iter().zip(cap) {
        if avail > max {
            recyclable.push(max);
            stored += avail - max;
        } else if avail + stored > max {
            recyclable.push(max);
            stored -= max - avail;
        } else {
            recyclable.push(avail + stored);
            stored = 0.0;
        }
        inventory.push(stored);
    }
    ScrapBuffer {
        recyclable,
        inventory,
    }
}

/// [`buffer_scrap`] for every slice of a time-leading quantity
///
/// `cap` is cast onto the axes of `available`. Returns `(recyclable, inventory)`.
pub fn buffer_scrap_by_region(available: &Quantity, cap: &Quantity) -> Result<(Quantity, Quantity)> {
    if available.dims().first_letter() != Some(TIME) {
        return Err(EngineError::Precondition(format!(
            "scrap availability '{}' must lead with time, got {}",
            available.name(),
            available.dims()
        )));
    }
    let cap = cap.cast_to(available.dims())?;
    let mut recyclable = Quantity::zeros("recyclable_scrap", available.dims().clone());
    let mut inventory = Quantity::zeros("usable_scrap_inventory", available.dims().clone());

    let available_values = available.values();
    let cap_values = cap.values();
    let mut recyclable_values = recyclable.values_mut();
    let mut inventory_values = inventory.values_mut();
    Zip::from(available_values.lanes(Axis(0)))
        .and(cap_values.lanes(Axis(0)))
        .and(recyclable_values.lanes_mut(Axis(0)))
        .and(inventory_values.lanes_mut(Axis(0)))
        .for_each(|avail, max, mut used, mut stored| {
            let buffer = run_buffer(&avail.to_vec(), &max.to_vec());
            used.assign(&ArrayView1::from(buffer.recyclable.as_slice()));
            stored.assign(&ArrayView1::from(buffer.inventory.as_slice()));
        });
    Ok((recyclable, inventory))
}
