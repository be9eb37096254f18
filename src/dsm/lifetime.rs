use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, LogNormal, Normal};
use strum::{Display, EnumString};

use crate::error::{EngineError, Result};

/// Lifetime distribution family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
pub enum LifetimeFamily {
    /// Every unit leaves exactly `mean` periods after entering
    Fixed,
    Normal,
    /// Normal folded at zero, so no unit leaves before it enters
    FoldedNormal,
    /// Log-normal parameterised by the mean and standard deviation of the lifetime itself
    LogNormal,
}

impl LifetimeFamily {
    pub fn parse(name: &str) -> Result<Self> {
        name.parse()
            .map_err(|_| EngineError::UnknownLifetimeModel(name.to_string()))
    }
}

/// Lifetime distribution of one category
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LifetimeModel {
    pub family: LifetimeFamily,
    pub mean: f64,
    pub std: f64,
}

impl LifetimeModel {
    pub fn new(family: LifetimeFamily, mean: f64, std: f64) -> Result<Self> {
        if !mean.is_finite() || !std.is_finite() {
            return Err(EngineError::InvalidConfig(format!(
                "lifetime mean/std must be finite (got {mean}, {std})"
            )));
        }
        if std < 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "lifetime std must be non-negative (got {std})"
            )));
        }
        Ok(Self { family, mean, std })
    }

    /// Probability that a unit is still in use `periods` ages after entering,
    /// evaluated at ages `0..periods`
    pub fn survival_by_age(&self, periods: usize) -> Result<Vec<f64>> {
        let ages = (0..periods).map(|a| a as f64);
        let survival: Vec<f64> = match self.family {
            _ if self.std == 0.0 => ages.map(|a| step(a, self.mean)).collect(),
            LifetimeFamily::Fixed => ages.map(|a| step(a, self.mean)).collect(),
            LifetimeFamily::Normal => {
                let normal = self.normal()?;
                ages.map(|a| 1.0 - normal.cdf(a)).collect()
            }
            LifetimeFamily::FoldedNormal => {
                let normal = self.normal()?;
                ages.map(|a| (1.0 - normal.cdf(a)) + normal.cdf(-a)).collect()
            }
            LifetimeFamily::LogNormal => {
                if self.mean <= 0.0 {
                    ages.map(|a| step(a, 0.0)).collect()
                } else {
                    let sigma2 = (1.0 + (self.std / self.mean).powi(2)).ln();
                    let mu = self.mean.ln() - sigma2 / 2.0;
                    let log_normal = LogNormal::new(mu, sigma2.sqrt())
                        .map_err(|e| EngineError::InvalidConfig(format!("log-normal lifetime: {e}")))?;
                    ages.map(|a| if a <= 0.0 { 1.0 } else { 1.0 - log_normal.cdf(a) })
                        .collect()
                }
            }
        };
        Ok(survival.into_iter().map(|s| s.clamp(0.0, 1.0)).collect())
    }

    fn normal(&self) -> Result<Normal> {
        Normal::new(self.mean, self.std)
            .map_err(|e| EngineError::InvalidConfig(format!("normal lifetime: {e}")))
    }
}

/// Deterministic survival: in use while younger than the lifetime
fn step(age: f64, lifetime: f64) -> f64 {
    if age < lifetime {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[rstest]
    #[case(LifetimeFamily::Normal)]
    #[case(LifetimeFamily::FoldedNormal)]
    #[case(LifetimeFamily::LogNormal)]
    fn test_survival_is_monotone_and_bounded(#[case] family: LifetimeFamily) {
        let model = LifetimeModel::new(family, 10.0, 3.0).unwrap();
        let sf = model.survival_by_age(40).unwrap();
        assert!(sf.iter().all(|s| (0.0..=1.0).contains(s)));
        assert!(sf.windows(2).all(|w| w[1] <= w[0] + 1e-12));
        assert!(sf[39] < 1e-3);
    }

    #[test]
    fn test_zero_std_is_a_step() {
        let model = LifetimeModel::new(LifetimeFamily::Normal, 1.0, 0.0).unwrap();
        assert_eq!(model.survival_by_age(4).unwrap(), vec![1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_normal_half_survives_at_mean() {
        let model = LifetimeModel::new(LifetimeFamily::Normal, 5.0, 2.0).unwrap();
        let sf = model.survival_by_age(10).unwrap();
        assert_relative_eq!(sf[5], 0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_folded_normal_starts_at_one() {
        let model = LifetimeModel::new(LifetimeFamily::FoldedNormal, 1.0, 2.0).unwrap();
        assert_relative_eq!(model.survival_by_age(1).unwrap()[0], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_parse_family() {
        assert_eq!(LifetimeFamily::parse("LogNormal").unwrap(), LifetimeFamily::LogNormal);
        assert!(matches!(
            LifetimeFamily::parse("Weibull"),
            Err(EngineError::UnknownLifetimeModel(_))
        ));
        assert!(LifetimeModel::new(LifetimeFamily::Normal, 5.0, -1.0).is_err());
    }
}
