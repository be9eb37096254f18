use ndarray::{ArrayView1, Axis};

use super::regression::{check_leading, historic_positions};
use crate::dims::{DimensionSet, Quantity, HISTORIC_TIME, TIME};
use crate::error::{EngineError, Result};

/// Number of most recent historic periods carrying weight
pub const N_LAST_POINTS: usize = 5;

/// Linear weights rising over the last `n_last` of `n_hist` periods, normalised to one
///
/// `w[i] = max(0, i - n_hist + n_last + 1)`, so with `n_hist <= n_last` every period is weighted.
pub fn recent_point_weights(n_hist: usize, n_last: usize) -> Vec<f64> {
    let raw: Vec<f64> = (0..n_hist)
        .map(|i| (i as f64 - n_hist as f64 + n_last as f64 + 1.0).max(0.0))
        .collect();
    let total: f64 = raw.iter().sum();
    if total > 0.0 {
        raw.into_iter().map(|w| w / total).collect()
    } else {
        raw
    }
}

/// Ratio of value to scaler as a weighted least-squares slope through the origin
///
/// Returns 0 when the weighted scaler carries no signal.
pub fn weighted_ratio(values: &[f64], scaler: &[f64], weights: &[f64]) -> f64 {
    let (num, den) = values
        .iter()
        .zip(scaler)
        .zip(weights)
        .fold((0.0, 0.0), |(num, den), ((&y, &x), &w)| (num + w * x * y, den + w * x * x));
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

/// Extend `historic` (h, ...) over the scaler's time horizon (t, ...) keeping
/// its recent share of the scaler
///
/// The scaler's non-time axes must be a subset of the historic non-time axes;
/// historic-only axes receive the scaler by equal replication. Historic periods
/// of the result are the historic values unchanged.
pub fn extrapolate_to_future(historic: &Quantity, scale_by: &Quantity) -> Result<Quantity> {
    check_leading(historic, HISTORIC_TIME, "historic series")?;
    check_leading(scale_by, TIME, "scaler")?;
    let slice_dims = historic.dims().without(HISTORIC_TIME);
    if !scale_by.dims().without(TIME).is_subset_of(&slice_dims) {
        return Err(EngineError::Precondition(format!(
            "scaler axes {} are not a subset of historic axes {}",
            scale_by.dims(),
            historic.dims()
        )));
    }
    let positions = historic_positions(historic.dims(), scale_by.dims())?;

    let mut dims = vec![scale_by.dims().dim(TIME)?.clone()];
    dims.extend(slice_dims.iter().cloned());
    let out_dims = DimensionSet::new(dims)?;
    let scaler = scale_by.cast_to(&out_dims)?;
    let weights = recent_point_weights(positions.len(), N_LAST_POINTS);

    let mut out = Quantity::zeros(historic.name(), out_dims);
    let historic_values = historic.values();
    let scaler_values = scaler.values();
    let mut out_values = out.values_mut();
    for ((mut lane, y), x) in out_values
        .lanes_mut(Axis(0))
        .into_iter()
        .zip(historic_values.lanes(Axis(0)))
        .zip(scaler_values.lanes(Axis(0)))
    {
        let x_hist: Vec<f64> = positions.iter().map(|&p| x[p]).collect();
        let y_hist = y.to_vec();
        let ratio = weighted_ratio(&y_hist, &x_hist, &weights);
        let mut projected: Vec<f64> = x.iter().map(|&xi| ratio * xi).collect();
        for (&p, &value) in positions.iter().zip(&y_hist) {
            projected[p] = value;
        }
        lane.assign(&ArrayView1::from(projected.as_slice()));
    }
    Ok(out)
}
