use ndarray::{ArrayD, ArrayViewD, ArrayViewMutD, Axis, IxDyn};
use serde::{Deserialize, Serialize};

use super::{Dimension, DimensionSet};
use crate::error::{EngineError, Result};

/// Named tensor whose shape always equals the cardinalities of its dimension set
///
/// Axis semantics are explicit:
/// - `mul`/`div` operate on the union of both operands' axes
/// - `add`/`sub` first reduce both operands to their shared axes
/// - `assign` sums away surplus axes of the right-hand side and rejects missing ones
///
/// Shared letters must carry identical items, otherwise the operation fails with
/// [`EngineError::AxisMismatch`] instead of broadcasting positionally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawQuantity")]
pub struct Quantity {
    name: String,
    dims: DimensionSet,
    values: ArrayD<f64>,
}

/// Decoded form, checked by [`Quantity::from_values`] before use
#[derive(Deserialize)]
struct RawQuantity {
    name: String,
    dims: DimensionSet,
    values: ArrayD<f64>,
}

impl TryFrom<RawQuantity> for Quantity {
    type Error = EngineError;

    fn try_from(raw: RawQuantity) -> Result<Self> {
        Self::from_values(raw.name, raw.dims, raw.values)
    }
}

impl Quantity {
    pub fn zeros(name: impl Into<String>, dims: DimensionSet) -> Self {
        Self::filled(name, dims, 0.0)
    }

    pub fn filled(name: impl Into<String>, dims: DimensionSet, value: f64) -> Self {
        let values = ArrayD::from_elem(IxDyn(&dims.shape()), value);
        Self {
            name: name.into(),
            dims,
            values,
        }
    }

    pub fn scalar(name: impl Into<String>, value: f64) -> Self {
        Self::filled(name, DimensionSet::empty(), value)
    }

    pub fn from_values(name: impl Into<String>, dims: DimensionSet, values: ArrayD<f64>) -> Result<Self> {
        let name = name.into();
        if values.shape() != dims.shape().as_slice() {
            return Err(EngineError::ShapeMismatch {
                name,
                expected: dims.shape(),
                actual: values.shape().to_vec(),
            });
        }
        Ok(Self { name, dims, values })
    }

    /// Build from row-major values
    pub fn from_vec(name: impl Into<String>, dims: DimensionSet, values: Vec<f64>) -> Result<Self> {
        let name = name.into();
        let expected = dims.shape();
        if values.len() != expected.iter().product::<usize>() {
            return Err(EngineError::ShapeMismatch {
                name,
                expected,
                actual: vec![values.len()],
            });
        }
        let values = ArrayD::from_shape_vec(IxDyn(&expected), values)?;
        Ok(Self { name, dims, values })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dims(&self) -> &DimensionSet {
        &self.dims
    }

    pub fn values(&self) -> ArrayViewD<'_, f64> {
        self.values.view()
    }

    /// Mutable element access; the shape cannot change through this view
    pub fn values_mut(&mut self) -> ArrayViewMutD<'_, f64> {
        self.values.view_mut()
    }

    pub fn into_values(self) -> ArrayD<f64> {
        self.values
    }

    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn sum(&self) -> f64 {
        self.values.sum()
    }

    pub fn max_abs(&self) -> f64 {
        self.values.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()))
    }

    pub fn mapv(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            name: self.name.clone(),
            dims: self.dims.clone(),
            values: self.values.mapv(f),
        }
    }

    pub fn scale(&self, factor: f64) -> Self {
        self.mapv(|v| v * factor)
    }

    /// Replace NaN and infinities by zero
    pub fn nan_to_zero(mut self) -> Self {
        self.values.mapv_inplace(|v| if v.is_finite() { v } else { 0.0 });
        self
    }

    /// Values laid out on `target`, which must be a superset of this quantity's axes.
    /// Missing axes are filled by equal replication.
    fn aligned_values(&self, target: &DimensionSet) -> Result<ArrayD<f64>> {
        for dim in self.dims.iter() {
            let theirs = target.get(dim.letter).ok_or_else(|| EngineError::AxisMismatch {
                letter: dim.letter,
                reason: format!("{} cannot be cast to {target}", self.dims),
            })?;
            if theirs.items != dim.items {
                return Err(EngineError::AxisMismatch {
                    letter: dim.letter,
                    reason: format!("items of '{}' differ from target", self.name),
                });
            }
        }

        let mut order: Vec<usize> = (0..self.dims.ndim()).collect();
        let letters = self.dims.letters();
        order.sort_by_key(|&i| target.position(letters[i]).unwrap_or(usize::MAX));

        let permuted = self
            .values
            .view()
            .permuted_axes(order)
            .as_standard_layout()
            .into_owned();

        let expanded: Vec<usize> = target
            .iter()
            .map(|d| if self.dims.contains(d.letter) { d.len() } else { 1 })
            .collect();
        let reshaped = permuted.into_shape(IxDyn(&expanded))?;
        let full = target.shape();
        let broadcast = reshaped
            .broadcast(IxDyn(&full))
            .ok_or_else(|| EngineError::ShapeMismatch {
                name: self.name.clone(),
                expected: full.clone(),
                actual: expanded.clone(),
            })?;
        Ok(broadcast.to_owned())
    }

    /// Broadcast to a superset of axes by equal replication
    pub fn cast_to(&self, target: &DimensionSet) -> Result<Self> {
        Ok(Self {
            name: self.name.clone(),
            dims: target.clone(),
            values: self.aligned_values(target)?,
        })
    }

    /// Sum over every axis not in `letters`, returning axes in `letters` order
    pub fn sum_to(&self, letters: &[char]) -> Result<Self> {
        let target = self.dims.subset(letters)?;
        let mut values = self.values.clone();
        let own = self.dims.letters();
        for (i, letter) in own.iter().enumerate().rev() {
            if !letters.contains(letter) {
                values = values.sum_axis(Axis(i));
            }
        }
        let kept = DimensionSet::new(
            self.dims
                .iter()
                .filter(|d| letters.contains(&d.letter))
                .cloned()
                .collect(),
        )?;
        Self {
            name: self.name.clone(),
            dims: kept,
            values,
        }
        .cast_to(&target)
    }

    pub fn sum_over(&self, letters: &[char]) -> Result<Self> {
        for &letter in letters {
            self.dims.dim(letter)?;
        }
        let keep: Vec<char> = self
            .dims
            .letters()
            .into_iter()
            .filter(|l| !letters.contains(l))
            .collect();
        self.sum_to(&keep)
    }

    /// `self / self.sum_over(letters)`; slices summing to zero yield NaN
    pub fn get_shares_over(&self, letters: &[char]) -> Result<Self> {
        self.div(&self.sum_over(letters)?)
    }

    fn zip_union(&self, other: &Quantity, f: impl Fn(f64, f64) -> f64) -> Result<Self> {
        let dims = self.dims.union_with(&other.dims)?;
        let mut a = self.aligned_values(&dims)?;
        let b = other.aligned_values(&dims)?;
        ndarray::Zip::from(&mut a).and(&b).for_each(|x, &y| *x = f(*x, y));
        Ok(Self {
            name: self.name.clone(),
            dims,
            values: a,
        })
    }

    fn zip_shared(&self, other: &Quantity, f: impl Fn(f64, f64) -> f64) -> Result<Self> {
        let shared = self.dims.intersect_with(&other.dims)?.letters();
        let mut a = self.sum_to(&shared)?;
        let b = other.sum_to(&shared)?;
        ndarray::Zip::from(&mut a.values)
            .and(&b.values)
            .for_each(|x, &y| *x = f(*x, y));
        Ok(a)
    }

    pub fn mul(&self, other: &Quantity) -> Result<Self> {
        self.zip_union(other, |a, b| a * b)
    }

    pub fn div(&self, other: &Quantity) -> Result<Self> {
        self.zip_union(other, |a, b| a / b)
    }

    pub fn add(&self, other: &Quantity) -> Result<Self> {
        self.zip_shared(other, |a, b| a + b)
    }

    pub fn sub(&self, other: &Quantity) -> Result<Self> {
        self.zip_shared(other, |a, b| a - b)
    }

    /// Values of `self` reduced onto exactly `target`'s axes
    fn reduced_values(&self, target: &DimensionSet) -> Result<ArrayD<f64>> {
        if let Some(missing) = target.iter().find(|d| !self.dims.contains(d.letter)) {
            return Err(EngineError::AxisMismatch {
                letter: missing.letter,
                reason: format!("'{}' {} lacks an axis of {target}", self.name, self.dims),
            });
        }
        let reduced = self.sum_to(&target.letters())?;
        if reduced.dims != *target {
            return Err(EngineError::AxisMismatch {
                letter: target.first_letter().unwrap_or('?'),
                reason: format!("items of '{}' differ from target {target}", self.name),
            });
        }
        Ok(reduced.values)
    }

    /// Overwrite all values from `other`, summing away its surplus axes
    pub fn assign(&mut self, other: &Quantity) -> Result<()> {
        self.values = other.reduced_values(&self.dims)?;
        Ok(())
    }

    /// Sub-array at one item of an axis; the axis is dropped
    pub fn slice_item(&self, letter: char, item: &str) -> Result<Self> {
        let pos = self.axis(letter)?;
        let idx = self.dims.dim(letter)?.position(item)?;
        Ok(Self {
            name: format!("{}[{item}]", self.name),
            dims: self.dims.without(letter),
            values: self.values.index_axis(Axis(pos), idx).to_owned(),
        })
    }

    /// Write `value` into the slice at one item of an axis
    pub fn set_item(&mut self, letter: char, item: &str, value: &Quantity) -> Result<()> {
        let pos = self.axis(letter)?;
        let idx = self.dims.dim(letter)?.position(item)?;
        let reduced = value.reduced_values(&self.dims.without(letter))?;
        self.values.index_axis_mut(Axis(pos), idx).assign(&reduced);
        Ok(())
    }

    /// Re-express one axis on another dimension whose items are found by label,
    /// e.g. the simulation time axis onto its historic subset
    pub fn reindex_axis(&self, letter: char, target: &Dimension) -> Result<Self> {
        let pos = self.axis(letter)?;
        let source = self.dims.dim(letter)?;
        let indices = target
            .items
            .iter()
            .map(|item| {
                source.index_of(item).ok_or_else(|| EngineError::UnknownItem {
                    letter,
                    item: item.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            name: self.name.clone(),
            dims: self.dims.replace(letter, target.clone())?,
            values: self.values.select(Axis(pos), &indices),
        })
    }

    /// Reorder axes so `letter` leads
    pub fn with_leading(&self, letter: char) -> Result<Self> {
        self.cast_to(&self.dims.with_leading(letter)?)
    }

    fn axis(&self, letter: char) -> Result<usize> {
        self.dims.position(letter).ok_or_else(|| EngineError::UnknownAxis {
            letter,
            context: format!("{} {}", self.name, self.dims),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_decoding_checks_shape_against_dims() {
        let q = Quantity::filled("q", dims(&['t', 'r']), 1.0);
        let mut json: serde_json::Value = serde_json::to_value(&q).unwrap();
        let round: Quantity = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(round, q);

        // drop one region from the dimension set but keep the 3x2 values
        json["dims"]["dims"][1]["items"] = serde_json::json!(["EU"]);
        let decoded: std::result::Result<Quantity, _> = serde_json::from_value(json);
        assert!(decoded.unwrap_err().to_string().contains("Shape mismatch"));
    }

    fn dims(letters: &[char]) -> DimensionSet {
        let all = [
            Dimension::years("Time", 't', 2000, 2002),
            Dimension::new("Region", 'r', ["EU", "CN"]),
            Dimension::new("Good", 'g', ["Cars", "Buildings"]),
        ];
        DimensionSet::new(
            letters
                .iter()
                .map(|l| all.iter().find(|d| d.letter == *l).unwrap().clone())
                .collect(),
        )
        .unwrap()
    }

    fn ramp(name: &str, letters: &[char]) -> Quantity {
        let d = dims(letters);
        let n: usize = d.shape().iter().product();
        Quantity::from_vec(name, d, (0..n).map(|v| v as f64).collect()).unwrap()
    }

    #[test]
    fn test_shape_checked_on_construction() {
        let result = Quantity::from_vec("bad", dims(&['t', 'r']), vec![1.0; 5]);
        assert!(matches!(result, Err(EngineError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_cast_replicates_and_reorders() {
        let q = ramp("q", &['r', 't']);
        let cast = q.cast_to(&dims(&['t', 'g', 'r'])).unwrap();
        assert_eq!(cast.values().shape(), &[3, 2, 2]);
        // q[r=CN, t=2001] = 1*3 + 1 = 4
        assert_eq!(cast.values()[[1, 0, 1]], 4.0);
        assert_eq!(cast.values()[[1, 1, 1]], 4.0);
    }

    #[test]
    fn test_sum_to_reorders() {
        let q = ramp("q", &['t', 'r', 'g']);
        let summed = q.sum_to(&['g', 't']).unwrap();
        assert_eq!(summed.dims().letters(), vec!['g', 't']);
        // t=0: values 0..4 => g0: 0+2, g1: 1+3
        assert_eq!(summed.values()[[0, 0]], 2.0);
        assert_eq!(summed.values()[[1, 0]], 4.0);
        assert_eq!(q.sum(), summed.sum());
    }

    #[test]
    fn test_add_reduces_to_shared_axes() {
        let a = ramp("a", &['t', 'r', 'g']);
        let b = ramp("b", &['t', 'r']);
        let c = a.sub(&b).unwrap();
        assert_eq!(c.dims().letters(), vec!['t', 'r']);
        // t=0, r=EU: a sums 0+1, b is 0
        assert_eq!(c.values()[[0, 0]], 1.0);
    }

    #[test]
    fn test_mul_takes_union() {
        let a = ramp("a", &['t', 'r']);
        let b = Quantity::filled("b", dims(&['g']), 2.0);
        let c = a.mul(&b).unwrap();
        assert_eq!(c.dims().letters(), vec!['t', 'r', 'g']);
        assert_eq!(c.sum(), a.sum() * 4.0);
    }

    #[test]
    fn test_shares_sum_to_one() {
        let q = ramp("q", &['t', 'g']).mapv(|v| v + 1.0);
        let shares = q.get_shares_over(&['g']).unwrap();
        let total = shares.sum_over(&['g']).unwrap();
        for v in total.values().iter() {
            assert_relative_eq!(*v, 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_assign_rejects_missing_axis() {
        let mut target = Quantity::zeros("target", dims(&['t', 'r', 'g']));
        let source = ramp("source", &['t', 'r']);
        assert!(matches!(target.assign(&source), Err(EngineError::AxisMismatch { .. })));

        let mut narrow = Quantity::zeros("narrow", dims(&['r', 't']));
        narrow.assign(&ramp("wide", &['t', 'r', 'g'])).unwrap();
        assert_eq!(narrow.values()[[0, 0]], 1.0);
    }

    #[test]
    fn test_slice_and_set_item() {
        let mut q = ramp("q", &['t', 'r']);
        let eu = q.slice_item('r', "EU").unwrap();
        assert_eq!(eu.dims().letters(), vec!['t']);
        assert_eq!(eu.values().iter().copied().collect::<Vec<_>>(), vec![0.0, 2.0, 4.0]);

        q.set_item('r', "CN", &eu).unwrap();
        assert_eq!(q.values()[[2, 1]], 4.0);
        assert!(q.slice_item('r', "US").is_err());
    }

    #[test]
    fn test_reindex_axis_by_label() {
        let q = ramp("q", &['t', 'r']);
        let hist = Dimension::years("Historic Time", 'h', 2001, 2002);
        let h = q.reindex_axis('t', &hist).unwrap();
        assert_eq!(h.dims().letters(), vec!['h', 'r']);
        assert_eq!(h.values()[[0, 0]], 2.0);

        let outside = Dimension::years("Historic Time", 'h', 1990, 1991);
        assert!(q.reindex_axis('t', &outside).is_err());
    }
}
