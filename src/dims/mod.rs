//! Named-axis arrays
//!
//! [`Dimension`] and [`DimensionSet`] describe axes by single-letter codes
//! (`t` time, `h` historic time, `r` region, `g` good, `m` material, `e` element, ...).
//! [`Quantity`] pairs a set with an `ndarray` tensor of matching shape.

pub mod dimension;
pub mod quantity;

pub use dimension::{Dimension, DimensionSet};
pub use quantity::Quantity;

/// Simulation time
pub const TIME: char = 't';
/// Historic subset of simulation time
pub const HISTORIC_TIME: char = 'h';
pub const REGION: char = 'r';
