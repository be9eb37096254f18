use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::schema::SYSENV;
use super::system::MfaSystem;
use crate::dims::{DimensionSet, Quantity};
use crate::error::{EngineError, Result};

/// Acceptable summed absolute imbalance per process
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MassBalanceTolerance {
    /// In mass units, for whole-economy systems with large magnitudes
    Absolute(f64),
    /// Share of the process throughput (at least one mass unit)
    Relative(f64),
}

impl MassBalanceTolerance {
    fn allows(&self, balance: &ProcessBalance) -> bool {
        match *self {
            MassBalanceTolerance::Absolute(limit) => balance.imbalance <= limit,
            MassBalanceTolerance::Relative(share) => balance.imbalance <= share * balance.throughput.max(1.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessBalance {
    pub process: String,
    /// `Σ|inflows - outflows - Δstock|` over all periods and shared axes
    pub imbalance: f64,
    /// `Σ|inflows|`
    pub throughput: f64,
}

impl MfaSystem {
    /// Per-process balance of every process except the system boundary
    ///
    /// Contributions are reduced to the axes all of them share before summing.
    pub fn mass_balance(&self) -> Result<Vec<ProcessBalance>> {
        let mut balances = Vec::new();
        for process in &self.definition().processes {
            if process == SYSENV {
                continue;
            }
            let mut inflows: Vec<&Quantity> = Vec::new();
            let mut outflows: Vec<&Quantity> = Vec::new();
            for (_, flow) in self.flows() {
                if &flow.to == process {
                    inflows.push(&flow.values);
                }
                if &flow.from == process {
                    outflows.push(&flow.values);
                }
            }
            let changes = self
                .stocks()
                .filter(|(_, stock)| &stock.process == process)
                .map(|(_, stock)| stock.change())
                .collect::<Result<Vec<_>>>()?;

            let mut contributions = inflows.iter().copied().chain(outflows.iter().copied()).chain(changes.iter());
            let Some(first) = contributions.next() else {
                continue;
            };
            let shared = contributions.try_fold(first.dims().clone(), |acc: DimensionSet, q| acc.intersect_with(q.dims()))?;

            let mut total = Quantity::zeros(format!("{process}_balance"), shared.clone());
            let mut throughput = 0.0;
            for inflow in &inflows {
                total = total.add(inflow)?;
                throughput += inflow.values().iter().map(|v| v.abs()).sum::<f64>();
            }
            for outflow in outflows.iter().copied().chain(changes.iter()) {
                total = total.sub(outflow)?;
            }
            balances.push(ProcessBalance {
                process: process.clone(),
                imbalance: total.values().iter().map(|v| v.abs()).sum(),
                throughput,
            });
        }
        Ok(balances)
    }

    /// Fail with every process imbalance if any process exceeds `tolerance`
    pub fn check_mass_balance(&self, tolerance: MassBalanceTolerance) -> Result<()> {
        let balances = self.mass_balance()?;
        let worst = balances
            .iter()
            .max_by(|a, b| a.imbalance.total_cmp(&b.imbalance))
            .map(|b| (b.process.as_str(), b.imbalance));
        if balances.iter().all(|b| tolerance.allows(b)) {
            info!(system = %self.definition().name, ?tolerance, ?worst, "mass balance ok");
            return Ok(());
        }
        warn!(system = %self.definition().name, ?tolerance, ?worst, "mass balance violated");
        Err(EngineError::MassBalance {
            imbalances: balances.into_iter().map(|b| (b.process, b.imbalance)).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dims::{Dimension, DimensionSet};
    use crate::flow::schema::{FlowDefinition, MfaDefinition, StockDefinition, StockKind};
    use std::collections::BTreeMap;

    fn system() -> MfaSystem {
        let definition = MfaDefinition {
            name: "toy".to_string(),
            dimensions: DimensionSet::new(vec![
                Dimension::years("Time", 't', 2000, 2002),
                Dimension::new("Region", 'r', ["EU", "CN"]),
                Dimension::new("Good", 'g', ["Cars", "Buildings"]),
            ])
            .unwrap(),
            processes: vec![SYSENV.to_string(), "use".to_string(), "landfill".to_string()],
            flows: vec![
                FlowDefinition::new(SYSENV, "use", &['t', 'r', 'g']),
                FlowDefinition::new("use", "landfill", &['t', 'r']),
            ],
            stocks: vec![
                StockDefinition::new("in_use", Some("use"), &['t', 'r', 'g'], StockKind::FlowDriven),
                StockDefinition::new("landfill", Some("landfill"), &['t', 'r'], StockKind::FlowDriven),
            ],
            parameters: vec![],
        };
        let mut system = MfaSystem::new(definition, BTreeMap::new()).unwrap();
        let dims = system.flow("sysenv => use").unwrap().dims().clone();
        let supply = Quantity::filled("supply", dims, 10.0);
        let discard = supply.scale(0.25);
        system.set_flow("sysenv => use", &supply).unwrap();
        system.set_flow("use => landfill", &discard).unwrap();

        let in_use = system.stock_mut("in_use").unwrap();
        in_use.inflow.assign(&supply).unwrap();
        in_use.outflow.assign(&discard).unwrap();
        in_use.compute_from_flows();
        let landfill = system.stock_mut("landfill").unwrap();
        landfill.inflow.assign(&discard).unwrap();
        landfill.compute_from_flows();
        system
    }

    #[test]
    fn test_balanced_system_passes() {
        let system = system();
        for balance in system.mass_balance().unwrap() {
            assert!(balance.imbalance < 1e-9, "{balance:?}");
        }
        system.check_mass_balance(MassBalanceTolerance::Relative(1e-9)).unwrap();
    }

    #[test]
    fn test_perturbation_is_reported_per_process() {
        let mut system = system();
        let perturbed = system.flow("use => landfill").unwrap().mapv(|v| v + 100.0);
        system.set_flow("use => landfill", &perturbed).unwrap();

        let error = system.check_mass_balance(MassBalanceTolerance::Absolute(100.0)).unwrap_err();
        let imbalances = match error {
            EngineError::MassBalance { imbalances } => imbalances,
            other => panic!("expected a mass balance error, got {other:?}"),
        };
        // 3 periods x 2 regions x 100 on both ends of the flow
        assert_eq!(imbalances.len(), 2);
        assert!(imbalances.iter().all(|(_, v)| (*v - 600.0).abs() < 1e-9));
        assert!(system.check_mass_balance(MassBalanceTolerance::Absolute(1000.0)).is_ok());
        assert!(system.check_mass_balance(MassBalanceTolerance::Relative(1e-6)).is_err());
    }
}
