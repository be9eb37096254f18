use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::dims::{DimensionSet, TIME};
use crate::error::{EngineError, Result};

/// Process standing for everything outside the system boundary; excluded from mass balance
pub const SYSENV: &str = "sysenv";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowDefinition {
    pub from: String,
    pub to: String,
    pub dim_letters: Vec<char>,
}

impl FlowDefinition {
    pub fn new(from: &str, to: &str, dim_letters: &[char]) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            dim_letters: dim_letters.to_vec(),
        }
    }

    /// Flows are named after their endpoints, `"from => to"`
    pub fn name(&self) -> String {
        flow_name(&self.from, &self.to)
    }
}

pub fn flow_name(from: &str, to: &str) -> String {
    format!("{from} => {to}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockKind {
    InflowDriven,
    StockDriven,
    /// Level accumulated from explicitly computed inflow and outflow
    FlowDriven,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockDefinition {
    pub name: String,
    /// Owning process; DSM helper stocks outside the flow graph have none
    pub process: Option<String>,
    pub dim_letters: Vec<char>,
    pub kind: StockKind,
    #[serde(default = "default_time_letter")]
    pub time_letter: char,
}

fn default_time_letter() -> char {
    TIME
}

impl StockDefinition {
    pub fn new(name: &str, process: Option<&str>, dim_letters: &[char], kind: StockKind) -> Self {
        Self {
            name: name.to_string(),
            process: process.map(str::to_string),
            dim_letters: dim_letters.to_vec(),
            kind,
            time_letter: dim_letters.first().copied().unwrap_or(TIME),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterDefinition {
    pub name: String,
    pub dim_letters: Vec<char>,
}

impl ParameterDefinition {
    pub fn new(name: &str, dim_letters: &[char]) -> Self {
        Self {
            name: name.to_string(),
            dim_letters: dim_letters.to_vec(),
        }
    }
}

/// Declarative topology of one system: dimensions, processes, flows, stocks and parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MfaDefinition {
    pub name: String,
    pub dimensions: DimensionSet,
    pub processes: Vec<String>,
    pub flows: Vec<FlowDefinition>,
    pub stocks: Vec<StockDefinition>,
    pub parameters: Vec<ParameterDefinition>,
}

impl MfaDefinition {
    /// Axis-letter and process-reference consistency; domain semantics are not checked
    pub fn validate(&self) -> Result<()> {
        for (i, process) in self.processes.iter().enumerate() {
            if self.processes[..i].contains(process) {
                return Err(EngineError::InvalidConfig(format!("duplicate process '{process}'")));
            }
        }
        for flow in &self.flows {
            for endpoint in [&flow.from, &flow.to] {
                self.check_process(endpoint)?;
            }
            if !flow.dim_letters.contains(&TIME) {
                return Err(EngineError::InvalidConfig(format!(
                    "flow '{}' has no time axis",
                    flow.name()
                )));
            }
            self.dims_of(&flow.dim_letters)?;
        }
        for stock in &self.stocks {
            if let Some(process) = &stock.process {
                self.check_process(process)?;
            }
            self.dims_of(&stock.dim_letters)?;
        }
        for parameter in &self.parameters {
            self.dims_of(&parameter.dim_letters)?;
        }
        Ok(())
    }

    fn check_process(&self, name: &str) -> Result<()> {
        if self.processes.iter().any(|p| p == name) {
            Ok(())
        } else {
            Err(EngineError::UnknownProcess(name.to_string()))
        }
    }

    pub fn dims_of(&self, letters: &[char]) -> Result<DimensionSet> {
        self.dimensions.subset(letters)
    }

    pub fn stock(&self, name: &str) -> Result<&StockDefinition> {
        self.stocks
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| EngineError::UnknownStock(name.to_string()))
    }

    /// SHA-256 over the canonical JSON form
    pub fn fingerprint(&self) -> Result<String> {
        let canonical = serde_json::to_string(self).map_err(|e| EngineError::Snapshot(e.to_string()))?;
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        Ok(format!("{:x}", hasher.finalize()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dims::Dimension;

    fn definition() -> MfaDefinition {
        MfaDefinition {
            name: "toy".to_string(),
            dimensions: DimensionSet::new(vec![
                Dimension::years("Time", 't', 2000, 2002),
                Dimension::new("Region", 'r', ["EU"]),
            ])
            .unwrap(),
            processes: vec![SYSENV.to_string(), "use".to_string()],
            flows: vec![FlowDefinition::new(SYSENV, "use", &['t', 'r'])],
            stocks: vec![StockDefinition::new("in_use", Some("use"), &['t', 'r'], StockKind::FlowDriven)],
            parameters: vec![ParameterDefinition::new("share", &['r'])],
        }
    }

    #[test]
    fn test_valid_definition() {
        let definition = definition();
        definition.validate().unwrap();
        assert_eq!(definition.flows[0].name(), "sysenv => use");
        assert_eq!(definition.stock("in_use").unwrap().time_letter, 't');
    }

    #[test]
    fn test_unknown_process_and_axis() {
        let mut definition = definition();
        definition.flows.push(FlowDefinition::new("use", "landfill", &['t']));
        assert!(matches!(definition.validate(), Err(EngineError::UnknownProcess(p)) if p == "landfill"));

        let mut definition = self::definition();
        definition.parameters.push(ParameterDefinition::new("rate", &['m']));
        assert!(matches!(definition.validate(), Err(EngineError::UnknownAxis { letter: 'm', .. })));
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let a = definition();
        let mut b = definition();
        assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
        b.processes.push("landfill".to_string());
        assert_ne!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
        assert_eq!(a.fingerprint().unwrap().len(), 64);
    }
}
