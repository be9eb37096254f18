//! Material flow systems
//!
//! An [`MfaDefinition`] declares processes, flows, stocks and parameters over a shared
//! [`DimensionSet`](crate::dims::DimensionSet). An [`MfaSystem`] allocates them and is
//! filled by one of the evaluation plans ([`plastics`], [`steel`]), which finish with a
//! per-process mass-balance check.

pub mod balance;
pub mod plastics;
pub mod schema;
pub mod steel;
pub mod system;

pub use balance::{MassBalanceTolerance, ProcessBalance};
pub use schema::{flow_name, FlowDefinition, MfaDefinition, ParameterDefinition, StockDefinition, StockKind, SYSENV};
pub use steel::{SteelOptions, SteelTrade};
pub use system::{Flow, MfaSystem};
