//! Dynamic Stock Models
//!
//! Cohort survival models that convert between inflow, outflow and stock level.
//! Each (region, category) slice is an independent left-to-right scan over time;
//! slices may run on the rayon pool, time never does.

pub mod batch;
pub mod lifetime;
pub mod model;

pub use batch::{compute_inflow_driven, compute_stock_driven, DsmBatch, LifetimeSpec, NegativeInflow};
pub use lifetime::{LifetimeFamily, LifetimeModel};
pub use model::{DsmMode, DynamicStockModel};
