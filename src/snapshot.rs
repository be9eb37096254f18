//! Persisted system state
//!
//! A snapshot holds the computed flows and stocks of one run together with a
//! fingerprint of everything that determined them: the system definition, the
//! parameter values and the model and trade settings. Restoring into a run whose
//! fingerprint differs (or from a different snapshot format) fails instead of
//! silently reusing data.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::config::{Config, SystemKind, TradeConfig};
use crate::dims::Quantity;
use crate::error::{EngineError, Result};
use crate::flow::{Flow, MfaSystem};
use crate::stock::Stock;

pub const SNAPSHOT_VERSION: u32 = 2;

/// Settings that change computed values; thread count and tolerances do not
#[derive(Serialize)]
struct RunKey<'a> {
    definition: String,
    system: SystemKind,
    lifetime_model: &'a str,
    curve_strategy: &'a str,
    include_trade: bool,
    include_scrap_trade: bool,
    max_scrap_share_production: f64,
    trade: &'a TradeConfig,
    parameters: &'a BTreeMap<String, Quantity>,
}

/// SHA-256 over the definition fingerprint, the system's parameters and the run settings
pub fn run_fingerprint(system: &MfaSystem, config: &Config) -> Result<String> {
    let model = &config.model;
    let key = RunKey {
        definition: system.definition().fingerprint()?,
        system: model.system,
        lifetime_model: &model.lifetime_model,
        curve_strategy: &model.curve_strategy,
        include_trade: model.include_trade,
        include_scrap_trade: model.include_scrap_trade,
        max_scrap_share_production: model.max_scrap_share_production,
        trade: &config.trade,
        parameters: system.parameters(),
    };
    let canonical = serde_json::to_vec(&key).map_err(|e| EngineError::Snapshot(e.to_string()))?;
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    Ok(format!("{:x}", hasher.finalize()))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemSnapshot {
    pub version: u32,
    pub fingerprint: String,
    pub flows: BTreeMap<String, Flow>,
    pub stocks: BTreeMap<String, Stock>,
    pub parameters: BTreeMap<String, Quantity>,
}

impl SystemSnapshot {
    pub fn capture(system: &MfaSystem, config: &Config) -> Result<Self> {
        let fingerprint = run_fingerprint(system, config)?;
        let (_, flows, stocks, parameters) = system.clone().into_parts();
        Ok(Self {
            version: SNAPSHOT_VERSION,
            fingerprint,
            flows,
            stocks,
            parameters,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let bytes = bincode::serialize(self)?;
        debug!(bytes = bytes.len(), flows = self.flows.len(), "snapshot encoded");
        Ok(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }

    /// Reject snapshots of another format version or another run fingerprint
    pub fn ensure_matches(&self, fingerprint: &str) -> Result<()> {
        if self.version != SNAPSHOT_VERSION {
            return Err(EngineError::StaleSnapshot {
                expected: format!("version {SNAPSHOT_VERSION}"),
                found: format!("version {}", self.version),
            });
        }
        if self.fingerprint != fingerprint {
            return Err(EngineError::StaleSnapshot {
                expected: fingerprint.to_string(),
                found: self.fingerprint.clone(),
            });
        }
        Ok(())
    }

    /// Fill `fresh` (a newly allocated system for the intended run) with the stored
    /// flows and stocks; the snapshot must have been taken under the same definition,
    /// parameters and settings
    pub fn restore(self, fresh: MfaSystem, config: &Config) -> Result<MfaSystem> {
        self.ensure_matches(&run_fingerprint(&fresh, config)?)?;
        let (definition, _, _, parameters) = fresh.into_parts();
        for flow in &definition.flows {
            let name = flow.name();
            if !self.flows.contains_key(&name) {
                return Err(EngineError::Snapshot(format!("snapshot lacks flow '{name}'")));
            }
        }
        info!(system = %definition.name, flows = self.flows.len(), stocks = self.stocks.len(), "snapshot reused");
        Ok(MfaSystem::restore(definition, self.flows, self.stocks, parameters))
    }
}
