//! Parameter bounds for an external optimizer
//!
//! Bounds are validated on construction: inverted pairs are rejected and
//! zero-width pairs are widened so every range is strictly non-degenerate.

use ndarray::{stack, ArrayD, Axis, IxDyn};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dims::{DimensionSet, Quantity};
use crate::error::{EngineError, Result};

/// Relative widening of equal bounds, absolute when both are zero
pub const BOUND_EPSILON: f64 = 1e-10;

/// Scalar or flat row-major bound values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BoundValues {
    Scalar(f64),
    Array(Vec<f64>),
}

/// Bound as read from configuration, before validation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundDefinition {
    pub var_name: Option<String>,
    #[serde(default)]
    pub dims: Option<DimensionSet>,
    pub lower_bound: Option<BoundValues>,
    pub upper_bound: Option<BoundValues>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bound {
    var_name: String,
    lower: Quantity,
    upper: Quantity,
}

impl Bound {
    pub fn new(var_name: impl Into<String>, lower: Quantity, upper: Quantity) -> Result<Self> {
        let var_name = var_name.into();
        if lower.dims() != upper.dims() {
            return Err(EngineError::ShapeMismatch {
                name: var_name,
                expected: lower.dims().shape(),
                actual: upper.dims().shape(),
            });
        }
        if lower.values().iter().zip(upper.values().iter()).any(|(l, u)| l > u) {
            return Err(EngineError::InvertedBound(var_name));
        }

        let mut lower = lower.renamed("lower_bound");
        let mut upper = upper.renamed("upper_bound");
        let mut widened = 0usize;
        ndarray::Zip::from(lower.values_mut())
            .and(upper.values_mut())
            .for_each(|l, u| {
                if *l == *u {
                    widened += 1;
                    if *l == 0.0 {
                        *l = -BOUND_EPSILON;
                        *u = BOUND_EPSILON;
                    } else {
                        *l -= BOUND_EPSILON * l.abs();
                        *u += BOUND_EPSILON * u.abs();
                    }
                }
            });
        if widened > 0 {
            debug!(parameter = %var_name, widened, "zero-width bounds widened");
        }
        Ok(Self { var_name, lower, upper })
    }

    pub fn var_name(&self) -> &str {
        &self.var_name
    }

    pub fn dims(&self) -> &DimensionSet {
        self.lower.dims()
    }

    pub fn lower(&self) -> &Quantity {
        &self.lower
    }

    pub fn upper(&self) -> &Quantity {
        &self.upper
    }

    /// Broadcast both sides onto a superset of axes
    pub fn extend_dims(self, target: &DimensionSet) -> Result<Self> {
        Ok(Self {
            lower: self.lower.cast_to(target)?,
            upper: self.upper.cast_to(target)?,
            var_name: self.var_name,
        })
    }
}

impl TryFrom<BoundDefinition> for Bound {
    type Error = EngineError;

    fn try_from(definition: BoundDefinition) -> Result<Self> {
        let var_name = definition.var_name.ok_or(EngineError::MissingBoundField("var_name"))?;
        let lower = definition
            .lower_bound
            .ok_or(EngineError::MissingBoundField("lower_bound"))?;
        let upper = definition
            .upper_bound
            .ok_or(EngineError::MissingBoundField("upper_bound"))?;
        let dims = definition.dims.unwrap_or_else(DimensionSet::empty);
        Bound::new(
            var_name,
            bound_quantity("lower_bound", &dims, lower)?,
            bound_quantity("upper_bound", &dims, upper)?,
        )
    }
}

fn bound_quantity(name: &str, dims: &DimensionSet, values: BoundValues) -> Result<Quantity> {
    match values {
        BoundValues::Scalar(value) => Ok(Quantity::filled(name, dims.clone(), value)),
        BoundValues::Array(values) => Quantity::from_vec(name, dims.clone(), values),
    }
}

/// Bounds of several parameters on common target axes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundList {
    bounds: Vec<Bound>,
    target_dims: DimensionSet,
}

impl BoundList {
    /// Every bound must carry only axes of `target_dims`
    pub fn new(bounds: Vec<Bound>, target_dims: DimensionSet) -> Result<Self> {
        let bounds = bounds
            .into_iter()
            .map(|bound| {
                if let Some(extra) = bound.dims().iter().find(|d| !target_dims.contains(d.letter)) {
                    return Err(EngineError::AxisMismatch {
                        letter: extra.letter,
                        reason: format!("bound '{}' has axes outside {target_dims}", bound.var_name),
                    });
                }
                bound.extend_dims(&target_dims)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { bounds, target_dims })
    }

    pub fn from_definitions(definitions: Vec<BoundDefinition>, target_dims: DimensionSet) -> Result<Self> {
        let bounds = definitions
            .into_iter()
            .map(Bound::try_from)
            .collect::<Result<Vec<_>>>()?;
        Self::new(bounds, target_dims)
    }

    pub fn bounds(&self) -> &[Bound] {
        &self.bounds
    }

    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }

    /// `(lower, upper)` per parameter, shaped `target_shape + [2, n_params]`
    ///
    /// Parameters are ordered as in `all_params`; those without a bound get
    /// `(-inf, +inf)`. An empty list exports `None`.
    pub fn to_array(&self, all_params: &[&str]) -> Result<Option<ArrayD<f64>>> {
        if self.bounds.is_empty() {
            return Ok(None);
        }
        let mut unknown: Vec<String> = self
            .bounds
            .iter()
            .filter(|b| !all_params.contains(&b.var_name.as_str()))
            .map(|b| b.var_name.clone())
            .collect();
        if !unknown.is_empty() {
            unknown.sort();
            unknown.dedup();
            return Err(EngineError::UnknownBoundParameter(unknown));
        }

        let mut shape = self.target_dims.shape();
        let param_axis = Axis(shape.len());
        shape.push(all_params.len());
        let mut lower = ArrayD::from_elem(IxDyn(&shape), f64::NEG_INFINITY);
        let mut upper = ArrayD::from_elem(IxDyn(&shape), f64::INFINITY);
        for bound in &self.bounds {
            let Some(pos) = all_params.iter().position(|p| *p == bound.var_name) else {
                continue;
            };
            lower.index_axis_mut(param_axis, pos).assign(&bound.lower.values());
            upper.index_axis_mut(param_axis, pos).assign(&bound.upper.values());
        }
        Ok(Some(stack(param_axis, &[lower.view(), upper.view()])?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dims::Dimension;
    use proptest::prelude::*;

    fn regions() -> DimensionSet {
        DimensionSet::new(vec![Dimension::new("Region", 'r', ["EU", "CN", "US"])]).unwrap()
    }

    fn scalar_bound(name: &str, lower: f64, upper: f64) -> Bound {
        Bound::new(name, Quantity::scalar("l", lower), Quantity::scalar("u", upper)).unwrap()
    }

    #[test]
    fn test_zero_width_at_zero_is_widened_absolutely() {
        let bound = scalar_bound("x", 0.0, 0.0);
        assert_eq!(bound.lower().sum(), -BOUND_EPSILON);
        assert_eq!(bound.upper().sum(), BOUND_EPSILON);
    }

    #[test]
    fn test_zero_width_is_widened_relatively() {
        let bound = scalar_bound("x", 5.0, 5.0);
        assert!(bound.lower().sum() < 5.0);
        assert!(bound.upper().sum() > 5.0);
    }

    #[test]
    fn test_inverted_bound_rejected() {
        let result = Bound::new("x", Quantity::scalar("l", 2.0), Quantity::scalar("u", 1.0));
        assert!(matches!(result, Err(EngineError::InvertedBound(name)) if name == "x"));
    }

    #[test]
    fn test_missing_field_from_json() {
        let definition: BoundDefinition =
            serde_json::from_str(r#"{"var_name": "saturation", "lower_bound": 0.0}"#).unwrap();
        assert!(matches!(
            Bound::try_from(definition),
            Err(EngineError::MissingBoundField("upper_bound"))
        ));
        let definition: BoundDefinition = serde_json::from_str(r#"{"lower_bound": 0.0, "upper_bound": 1.0}"#).unwrap();
        assert!(matches!(
            Bound::try_from(definition),
            Err(EngineError::MissingBoundField("var_name"))
        ));
    }

    #[test]
    fn test_export_orders_parameters_and_fills_unbounded() {
        let per_region = Bound::new(
            "saturation",
            Quantity::from_vec("l", regions(), vec![1.0, 2.0, 3.0]).unwrap(),
            Quantity::from_vec("u", regions(), vec![4.0, 5.0, 6.0]).unwrap(),
        )
        .unwrap();
        let list = BoundList::new(vec![per_region, scalar_bound("slope", 0.0, 1.0)], regions()).unwrap();
        let array = list.to_array(&["slope", "offset", "saturation"]).unwrap().unwrap();

        assert_eq!(array.shape(), &[3, 2, 3]);
        // region CN, (lower, upper), saturation
        assert_eq!(array[[1, 0, 2]], 2.0);
        assert_eq!(array[[1, 1, 2]], 5.0);
        assert_eq!(array[[2, 1, 0]], 1.0);
        assert_eq!(array[[0, 0, 1]], f64::NEG_INFINITY);
        assert_eq!(array[[0, 1, 1]], f64::INFINITY);
    }

    #[test]
    fn test_unknown_parameter_and_empty_list() {
        let list = BoundList::new(vec![scalar_bound("slope", 0.0, 1.0)], DimensionSet::empty()).unwrap();
        assert!(matches!(
            list.to_array(&["offset"]),
            Err(EngineError::UnknownBoundParameter(names)) if names == vec!["slope".to_string()]
        ));
        assert!(BoundList::default().to_array(&["offset"]).unwrap().is_none());
    }

    #[test]
    fn test_bound_axes_must_be_in_target() {
        let per_region = Bound::new(
            "saturation",
            Quantity::filled("l", regions(), 0.0),
            Quantity::filled("u", regions(), 1.0),
        )
        .unwrap();
        assert!(matches!(
            BoundList::new(vec![per_region], DimensionSet::empty()),
            Err(EngineError::AxisMismatch { letter: 'r', .. })
        ));
    }

    proptest! {
        #[test]
        fn prop_equal_bounds_become_strict(value in -1e6f64..1e6) {
            let bound = scalar_bound("x", value, value);
            prop_assert!(bound.lower().sum() < value);
            prop_assert!(bound.upper().sum() > value);
        }
    }
}
