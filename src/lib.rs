//! Material Flow Engine
//!
//! Forecasts in-use material stocks from historic production and socioeconomic drivers,
//! derives the flows of a material system from them and checks that every process
//! conserves mass.

pub mod bounds;
pub mod config;
pub mod dims;
pub mod dsm;
pub mod error;
pub mod extrapolation;
pub mod flow;
pub mod pipeline;
pub mod scenario;
pub mod snapshot;
pub mod stock;
pub mod telemetry;
pub mod trade;

pub use error::{EngineError, Result};
