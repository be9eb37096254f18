use thiserror::Error;

/// Result alias used throughout the engine
pub type Result<T, E = EngineError> = std::result::Result<T, E>;

/// Engine errors
///
/// Every variant is fatal to the run that raised it. Inputs are deterministic,
/// so nothing here is retried; the caller fixes configuration or data and reruns.
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration / validation
    #[error("Unknown curve strategy: {0} (expected GDP_regression or Exponential_GDP_regression)")]
    UnknownCurveStrategy(String),

    #[error("Unknown lifetime model: {0}")]
    UnknownLifetimeModel(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Trade {side} must have a region dimension 'r' (got axes {axes})")]
    MissingRegionAxis { side: &'static str, axes: String },

    #[error("Imports and exports must have the same dimensions: {imports} vs {exports}")]
    TradeDimensionMismatch { imports: String, exports: String },

    #[error("Unknown parameters in bounds: {0:?}")]
    UnknownBoundParameter(Vec<String>),

    #[error("Missing required bound field: {0}")]
    MissingBoundField(&'static str),

    #[error("Lower bound exceeds upper bound for {0}")]
    InvertedBound(String),

    // Extrapolation entry preconditions
    #[error("Precondition failed: {0}")]
    Precondition(String),

    // Dimension algebra
    #[error("Duplicate dimension letter '{0}'")]
    DuplicateAxis(char),

    #[error("Unknown dimension letter '{letter}' in {context}")]
    UnknownAxis { letter: char, context: String },

    #[error("Item '{item}' not found in dimension '{letter}'")]
    UnknownItem { letter: char, item: String },

    #[error("Axis mismatch on '{letter}': {reason}")]
    AxisMismatch { letter: char, reason: String },

    #[error("Shape mismatch for {name}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    // Strategies
    #[error("No balancer has been configured for this trade")]
    BalancerNotConfigured,

    #[error("No predictor has been configured for this trade")]
    PredictorNotConfigured,

    // Lookups
    #[error("Unknown flow: {0}")]
    UnknownFlow(String),

    #[error("Unknown stock: {0}")]
    UnknownStock(String),

    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),

    #[error("Unknown process: {0}")]
    UnknownProcess(String),

    // Consistency
    #[error("Mass balance violated: {}", format_imbalances(.imbalances))]
    MassBalance { imbalances: Vec<(String, f64)> },

    #[error("Negative flow values: {}", format_imbalances(.flows))]
    NegativeFlows { flows: Vec<(String, f64)> },

    #[error("Stock recurrence violated for {stock} at period {period}: deviation {deviation:.3e}")]
    StockRecurrence {
        stock: String,
        period: usize,
        deviation: f64,
    },

    // Snapshots
    #[error("Stale snapshot: expected fingerprint {expected}, found {found}")]
    StaleSnapshot { expected: String, found: String },

    #[error("Snapshot error: {0}")]
    Snapshot(String),
}

fn format_imbalances(imbalances: &[(String, f64)]) -> String {
    use itertools::Itertools;
    imbalances
        .iter()
        .map(|(process, value)| format!("{process}={value:.3e}"))
        .join(", ")
}

impl From<ndarray::ShapeError> for EngineError {
    fn from(error: ndarray::ShapeError) -> Self {
        EngineError::ShapeMismatch {
            name: error.to_string(),
            expected: Vec::new(),
            actual: Vec::new(),
        }
    }
}

impl From<bincode::Error> for EngineError {
    fn from(error: bincode::Error) -> Self {
        EngineError::Snapshot(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mass_balance_display_lists_processes() {
        let error = EngineError::MassBalance {
            imbalances: vec![("use".to_string(), 1500.0), ("waste".to_string(), 0.0)],
        };
        let text = error.to_string();
        assert!(text.contains("use=1.500e3"));
        assert!(text.contains("waste=0.000e0"));
    }

    #[test]
    fn test_error_display() {
        let error = EngineError::UnknownCurveStrategy("Linear".to_string());
        assert!(error.to_string().starts_with("Unknown curve strategy: Linear"));
    }
}
