use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::schema::{MfaDefinition, StockKind};
use crate::dims::Quantity;
use crate::error::{EngineError, Result};
use crate::stock::Stock;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    pub from: String,
    pub to: String,
    pub values: Quantity,
}

/// Flows, process stocks and parameters of one simulation run
///
/// Flows start at zero and are filled by an evaluation plan; parameters are
/// read-only once the system is built.
#[derive(Debug, Clone)]
pub struct MfaSystem {
    definition: MfaDefinition,
    flows: BTreeMap<String, Flow>,
    stocks: BTreeMap<String, Stock>,
    parameters: BTreeMap<String, Quantity>,
}

impl MfaSystem {
    /// Allocate every flow and process stock, and align the supplied parameters
    /// to their declared axes
    pub fn new(definition: MfaDefinition, mut supplied: BTreeMap<String, Quantity>) -> Result<Self> {
        definition.validate()?;

        let mut parameters = BTreeMap::new();
        for parameter in &definition.parameters {
            let value = supplied
                .remove(&parameter.name)
                .ok_or_else(|| EngineError::UnknownParameter(parameter.name.clone()))?;
            let dims = definition.dims_of(&parameter.dim_letters)?;
            if !value.dims().is_subset_of(&dims) {
                return Err(EngineError::AxisMismatch {
                    letter: value.dims().difference_with(&dims).first_letter().unwrap_or('?'),
                    reason: format!("parameter '{}' has axes outside {dims}", parameter.name),
                });
            }
            parameters.insert(parameter.name.clone(), value.cast_to(&dims)?.renamed(&parameter.name));
        }
        if !supplied.is_empty() {
            debug!(unused = ?supplied.keys().collect::<Vec<_>>(), "parameters not declared by the system were ignored");
        }

        let mut flows = BTreeMap::new();
        for flow in &definition.flows {
            let name = flow.name();
            let values = Quantity::zeros(&name, definition.dims_of(&flow.dim_letters)?);
            flows.insert(
                name,
                Flow {
                    from: flow.from.clone(),
                    to: flow.to.clone(),
                    values,
                },
            );
        }

        let mut stocks = BTreeMap::new();
        for stock in &definition.stocks {
            if let (StockKind::FlowDriven, Some(process)) = (stock.kind, &stock.process) {
                let dims = definition.dims_of(&stock.dim_letters)?;
                stocks.insert(stock.name.clone(), Stock::new(&stock.name, process, dims));
            }
        }

        Ok(Self {
            definition,
            flows,
            stocks,
            parameters,
        })
    }

    pub fn definition(&self) -> &MfaDefinition {
        &self.definition
    }

    pub fn flow(&self, name: &str) -> Result<&Quantity> {
        self.flows
            .get(name)
            .map(|f| &f.values)
            .ok_or_else(|| EngineError::UnknownFlow(name.to_string()))
    }

    pub fn flow_mut(&mut self, name: &str) -> Result<&mut Quantity> {
        self.flows
            .get_mut(name)
            .map(|f| &mut f.values)
            .ok_or_else(|| EngineError::UnknownFlow(name.to_string()))
    }

    /// Overwrite a flow, summing away axes it does not carry
    pub fn set_flow(&mut self, name: &str, value: &Quantity) -> Result<()> {
        self.flow_mut(name)?.assign(value)
    }

    pub fn has_flow(&self, name: &str) -> bool {
        self.flows.contains_key(name)
    }

    pub fn flows(&self) -> impl Iterator<Item = (&String, &Flow)> {
        self.flows.iter()
    }

    pub fn stock(&self, name: &str) -> Result<&Stock> {
        self.stocks
            .get(name)
            .ok_or_else(|| EngineError::UnknownStock(name.to_string()))
    }

    pub fn stock_mut(&mut self, name: &str) -> Result<&mut Stock> {
        self.stocks
            .get_mut(name)
            .ok_or_else(|| EngineError::UnknownStock(name.to_string()))
    }

    /// Replace a process stock by one computed elsewhere (e.g. by a DSM)
    pub fn set_stock(&mut self, stock: Stock) -> Result<()> {
        let slot = self.stock_mut(&stock.name)?;
        if slot.dims() != stock.dims() || slot.process != stock.process {
            return Err(EngineError::AxisMismatch {
                letter: stock.dims().first_letter().unwrap_or('?'),
                reason: format!(
                    "stock '{}' {} on '{}' does not match its slot {} on '{}'",
                    stock.name,
                    stock.dims(),
                    stock.process,
                    slot.dims(),
                    slot.process
                ),
            });
        }
        *slot = stock;
        Ok(())
    }

    pub fn stocks(&self) -> impl Iterator<Item = (&String, &Stock)> {
        self.stocks.iter()
    }

    pub fn parameter(&self, name: &str) -> Result<&Quantity> {
        self.parameters
            .get(name)
            .ok_or_else(|| EngineError::UnknownParameter(name.to_string()))
    }

    pub fn parameters(&self) -> &BTreeMap<String, Quantity> {
        &self.parameters
    }

    /// Most negative value of every flow that drops below `-tolerance`
    pub fn negative_flows(&self, tolerance: f64) -> Vec<(String, f64)> {
        self.flows
            .iter()
            .filter_map(|(name, flow)| {
                let min = flow.values.values().iter().copied().fold(f64::INFINITY, f64::min);
                (min < -tolerance).then(|| (name.clone(), min))
            })
            .collect()
    }

    /// Fail with every negative flow, except those named in `exceptions`
    pub fn check_non_negative(&self, tolerance: f64, exceptions: &[&str]) -> Result<()> {
        let flows: Vec<_> = self
            .negative_flows(tolerance)
            .into_iter()
            .filter(|(name, _)| !exceptions.contains(&name.as_str()))
            .collect();
        if flows.is_empty() {
            return Ok(());
        }
        warn!(system = %self.definition.name, count = flows.len(), "negative flows after computation");
        Err(EngineError::NegativeFlows { flows })
    }

    pub(crate) fn restore(
        definition: MfaDefinition,
        flows: BTreeMap<String, Flow>,
        stocks: BTreeMap<String, Stock>,
        parameters: BTreeMap<String, Quantity>,
    ) -> Self {
        Self {
            definition,
            flows,
            stocks,
            parameters,
        }
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        MfaDefinition,
        BTreeMap<String, Flow>,
        BTreeMap<String, Stock>,
        BTreeMap<String, Quantity>,
    ) {
        (self.definition, self.flows, self.stocks, self.parameters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dims::{Dimension, DimensionSet};
    use crate::flow::schema::{FlowDefinition, ParameterDefinition, StockDefinition, SYSENV};

    pub(crate) fn toy_definition() -> MfaDefinition {
        MfaDefinition {
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
                StockDefinition::new("in_use_dsm", None, &['t', 'r', 'g'], StockKind::StockDriven),
            ],
            parameters: vec![ParameterDefinition::new("loss_rate", &['g', 'r'])],
        }
    }

    fn toy_parameters() -> BTreeMap<String, Quantity> {
        let dims = DimensionSet::new(vec![
            Dimension::new("Region", 'r', ["EU", "CN"]),
            Dimension::new("Good", 'g', ["Cars", "Buildings"]),
        ])
        .unwrap();
        BTreeMap::from([("loss_rate".to_string(), Quantity::filled("x", dims, 0.1))])
    }

    #[test]
    fn test_allocation() {
        let system = MfaSystem::new(toy_definition(), toy_parameters()).unwrap();
        assert_eq!(system.flow("sysenv => use").unwrap().values().shape(), &[3, 2, 2]);
        assert!(system.stock("landfill").is_ok());
        assert!(matches!(system.stock("in_use_dsm"), Err(EngineError::UnknownStock(_))));
        // parameters are reordered to their declared axes
        assert_eq!(system.parameter("loss_rate").unwrap().dims().letters(), vec!['g', 'r']);
    }

    #[test]
    fn test_missing_parameter() {
        let result = MfaSystem::new(toy_definition(), BTreeMap::new());
        assert!(matches!(result, Err(EngineError::UnknownParameter(p)) if p == "loss_rate"));
    }

    #[test]
    fn test_set_flow_sums_surplus_axes() {
        let mut system = MfaSystem::new(toy_definition(), toy_parameters()).unwrap();
        let full = Quantity::filled("x", system.flow("sysenv => use").unwrap().dims().clone(), 2.0);
        system.set_flow("use => landfill", &full).unwrap();
        assert_eq!(system.flow("use => landfill").unwrap().values()[[0, 0]], 4.0);
        assert!(matches!(
            system.set_flow("use => recycling", &full),
            Err(EngineError::UnknownFlow(_))
        ));
    }

    #[test]
    fn test_negative_flows_are_named() {
        let mut system = MfaSystem::new(toy_definition(), toy_parameters()).unwrap();
        assert!(system.check_non_negative(0.0, &[]).is_ok());

        let dims = system.flow("use => landfill").unwrap().dims().clone();
        let mut values = vec![1.0; 6];
        values[4] = -3.0;
        let dented = Quantity::from_vec("x", dims, values).unwrap();
        system.set_flow("use => landfill", &dented).unwrap();

        match system.check_non_negative(1e-9, &[]) {
            Err(EngineError::NegativeFlows { flows }) => {
                assert_eq!(flows, vec![("use => landfill".to_string(), -3.0)]);
            }
            other => panic!("expected negative flows, got {other:?}"),
        }
        assert!(system.check_non_negative(5.0, &[]).is_ok());
        assert!(system.check_non_negative(1e-9, &["use => landfill"]).is_ok());
    }

    #[test]
    fn test_set_stock_checks_slot() {
        let mut system = MfaSystem::new(toy_definition(), toy_parameters()).unwrap();
        let dims = system.stock("landfill").unwrap().dims().clone();
        assert!(system.set_stock(Stock::new("landfill", "use", dims.clone())).is_err());
        assert!(system.set_stock(Stock::new("landfill", "landfill", dims)).is_ok());
    }
}
