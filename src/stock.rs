use ndarray::{Axis, Zip};
use serde::{Deserialize, Serialize};

use crate::dims::{DimensionSet, Quantity};
use crate::error::{EngineError, Result};

/// Stock attached to a process: level, inflow and outflow over time
///
/// Invariant: `level[t] = level[t-1] + inflow[t] - outflow[t]`, with
/// `level[t0] = inflow[t0] - outflow[t0]`. All three share one dimension set
/// whose leading axis is time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stock {
    pub name: String,
    pub process: String,
    pub level: Quantity,
    pub inflow: Quantity,
    pub outflow: Quantity,
}

impl Stock {
    /// Empty stock over `dims`; the first axis must be time
    pub fn new(name: impl Into<String>, process: impl Into<String>, dims: DimensionSet) -> Self {
        let name = name.into();
        Self {
            level: Quantity::zeros(format!("{name}_stock"), dims.clone()),
            inflow: Quantity::zeros(format!("{name}_inflow"), dims.clone()),
            outflow: Quantity::zeros(format!("{name}_outflow"), dims),
            process: process.into(),
            name,
        }
    }

    pub fn from_parts(
        name: impl Into<String>,
        process: impl Into<String>,
        level: Quantity,
        inflow: Quantity,
        outflow: Quantity,
    ) -> Result<Self> {
        let name = name.into();
        for part in [&inflow, &outflow] {
            if part.dims() != level.dims() {
                return Err(EngineError::AxisMismatch {
                    letter: level.dims().first_letter().unwrap_or('?'),
                    reason: format!("stock '{name}' parts have axes {} and {}", level.dims(), part.dims()),
                });
            }
        }
        Ok(Self {
            name,
            process: process.into(),
            level,
            inflow,
            outflow,
        })
    }

    pub fn dims(&self) -> &DimensionSet {
        self.level.dims()
    }

    /// Flow-driven computation: `level = cumsum(inflow - outflow)` along time
    pub fn compute_from_flows(&mut self) {
        let mut level = self.level.values_mut();
        let inflow = self.inflow.values();
        let outflow = self.outflow.values();
        Zip::from(level.lanes_mut(Axis(0)))
            .and(inflow.lanes(Axis(0)))
            .and(outflow.lanes(Axis(0)))
            .for_each(|mut lvl, i, o| {
                let mut running = 0.0;
                for t in 0..lvl.len() {
                    running += i[t] - o[t];
                    lvl[t] = running;
                }
            });
    }

    /// Net change per period, `inflow - outflow`
    pub fn change(&self) -> Result<Quantity> {
        self.inflow.sub(&self.outflow)
    }

    /// Check the stock recurrence holds within `tolerance` (absolute)
    pub fn check_recurrence(&self, tolerance: f64) -> Result<()> {
        let level = self.level.values();
        let inflow = self.inflow.values();
        let outflow = self.outflow.values();
        let periods = level.len_of(Axis(0));
        for t in 0..periods {
            let lvl = level.index_axis(Axis(0), t);
            let i = inflow.index_axis(Axis(0), t);
            let o = outflow.index_axis(Axis(0), t);
            let deviation = if t == 0 {
                Zip::from(&lvl)
                    .and(&i)
                    .and(&o)
                    .fold(0.0_f64, |acc, &l, &i, &o| acc.max((l - (i - o)).abs()))
            } else {
                let prev = level.index_axis(Axis(0), t - 1);
                Zip::from(&lvl)
                    .and(&prev)
                    .and(&i)
                    .and(&o)
                    .fold(0.0_f64, |acc, &l, &p, &i, &o| acc.max((l - (p + i - o)).abs()))
            };
            if deviation > tolerance {
                return Err(EngineError::StockRecurrence {
                    stock: self.name.clone(),
                    period: t,
                    deviation,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dims::Dimension;

    fn dims() -> DimensionSet {
        DimensionSet::new(vec![
            Dimension::years("Time", 't', 2000, 2003),
            Dimension::new("Region", 'r', ["EU", "CN"]),
        ])
        .unwrap()
    }

    #[test]
    fn test_flow_driven_stock_accumulates() {
        let mut stock = Stock::new("landfill", "landfill", dims());
        stock.inflow.assign(&Quantity::filled("in", dims(), 2.0)).unwrap();
        stock.outflow.assign(&Quantity::filled("out", dims(), 0.5)).unwrap();
        stock.compute_from_flows();

        let level = stock.level.values();
        assert_eq!(level[[0, 0]], 1.5);
        assert_eq!(level[[3, 1]], 6.0);
        assert!(stock.check_recurrence(1e-12).is_ok());
    }

    #[test]
    fn test_recurrence_violation_detected() {
        let mut stock = Stock::new("waste", "waste", dims());
        stock.inflow.assign(&Quantity::filled("in", dims(), 1.0)).unwrap();
        stock.compute_from_flows();
        stock.level.values_mut()[[2, 0]] += 0.1;

        match stock.check_recurrence(1e-9) {
            Err(EngineError::StockRecurrence { period, .. }) => assert_eq!(period, 2),
            other => panic!("expected recurrence error, got {other:?}"),
        }
    }
}
