use serde::{Deserialize, Serialize};

use super::LifetimeModel;
use crate::error::Result;

/// Which series is the known input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DsmMode {
    InflowDriven,
    StockDriven,
}

/// Cohort-based dynamic stock model for one (region, category) series
///
/// The model is computed on construction and immutable afterwards.
/// Survival only depends on cohort age: `survival(t, τ) = sf[t - τ]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicStockModel {
    mode: DsmMode,
    survival: Vec<f64>,
    inflow: Vec<f64>,
    outflow: Vec<f64>,
    stock: Vec<f64>,
    negative_inflow_periods: Vec<usize>,
}

impl DynamicStockModel {
    /// Known inflow; stock is the surviving sum of all cohorts so far
    ///
    /// `stock[t] = Σ_{τ≤t} inflow[τ]·sf[t-τ]`, `outflow[t] = inflow[t] + stock[t-1] - stock[t]`
    pub fn inflow_driven(inflow: Vec<f64>, lifetime: &LifetimeModel) -> Result<Self> {
        let periods = inflow.len();
        let survival = lifetime.survival_by_age(periods)?;

        let stock: Vec<f64> = (0..periods)
            .map(|t| {
                (0..=t)
                    .map(|cohort| inflow[cohort] * survival[t - cohort])
                    .sum()
            })
            .collect();
        let outflow = outflow_from(&inflow, &stock);

        Ok(Self {
            mode: DsmMode::InflowDriven,
            survival,
            inflow,
            outflow,
            stock,
            negative_inflow_periods: Vec::new(),
        })
    }

    /// Known stock; inflow is solved left to right
    ///
    /// `inflow[t] = (stock[t] - Σ_{τ<t} inflow[τ]·sf[t-τ]) / sf[0]`, or 0 when `sf[0] == 0`.
    /// Negative solutions are kept and reported through [`Self::negative_inflow_periods`].
    pub fn stock_driven(stock: Vec<f64>, lifetime: &LifetimeModel) -> Result<Self> {
        let periods = stock.len();
        let survival = lifetime.survival_by_age(periods)?;

        let mut inflow = vec![0.0; periods];
        let mut negative_inflow_periods = Vec::new();
        for t in 0..periods {
            let surviving: f64 = (0..t)
                .map(|cohort| inflow[cohort] * survival[t - cohort])
                .sum();
            if survival[0] != 0.0 {
                inflow[t] = (stock[t] - surviving) / survival[0];
            }
            if inflow[t] < 0.0 {
                negative_inflow_periods.push(t);
            }
        }
        let outflow = outflow_from(&inflow, &stock);

        Ok(Self {
            mode: DsmMode::StockDriven,
            survival,
            inflow,
            outflow,
            stock,
            negative_inflow_periods,
        })
    }

    pub fn mode(&self) -> DsmMode {
        self.mode
    }

    pub fn inflow(&self) -> &[f64] {
        &self.inflow
    }

    pub fn outflow(&self) -> &[f64] {
        &self.outflow
    }

    pub fn stock(&self) -> &[f64] {
        &self.stock
    }

    pub fn survival(&self) -> &[f64] {
        &self.survival
    }

    /// Periods whose solved inflow came out negative (stock-driven only).
    /// Usually a sign of an infeasible stock target rather than real negative material.
    pub fn negative_inflow_periods(&self) -> &[usize] {
        &self.negative_inflow_periods
    }
}

fn outflow_from(inflow: &[f64], stock: &[f64]) -> Vec<f64> {
    let mut previous = 0.0;
    inflow
        .iter()
        .zip(stock)
        .map(|(&i, &s)| {
            let o = i + previous - s;
            previous = s;
            o
        })
        .collect()
}
