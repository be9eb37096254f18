//! Extrapolation strategies
//!
//! Projections of historic series (leading `h` axis) over the simulation horizon
//! (leading `t` axis). Every strategy returns the historic periods unchanged.

pub mod curve_fit;
pub mod proportional;
pub mod regression;

pub use curve_fit::{fit_curve, CurveKind, FittedCurve};
pub use proportional::{extrapolate_to_future, recent_point_weights, weighted_ratio, N_LAST_POINTS};
pub use regression::{extrapolate_stock, gdp_regression, CurveStrategy};
