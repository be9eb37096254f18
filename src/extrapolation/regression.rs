use ndarray::{ArrayView1, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::{debug, info};

use super::curve_fit::{fit_curve, CurveKind};
use crate::dims::{DimensionSet, Quantity, HISTORIC_TIME, TIME};
use crate::error::{EngineError, Result};

/// How future per-capita stocks are projected from GDP per capita
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
pub enum CurveStrategy {
    #[strum(serialize = "GDP_regression")]
    #[serde(rename = "GDP_regression")]
    GdpRegression,
    #[strum(serialize = "Exponential_GDP_regression")]
    #[serde(rename = "Exponential_GDP_regression")]
    ExponentialGdpRegression,
}

impl CurveStrategy {
    pub fn parse(name: &str) -> Result<Self> {
        name.parse()
            .map_err(|_| EngineError::UnknownCurveStrategy(name.to_string()))
    }

    pub fn curve_kind(self) -> CurveKind {
        match self {
            CurveStrategy::GdpRegression => CurveKind::Sigmoid,
            CurveStrategy::ExponentialGdpRegression => CurveKind::Exponential,
        }
    }
}

/// Positions of each historic period on the simulation time axis
pub(crate) fn historic_positions(historic: &DimensionSet, future: &DimensionSet) -> Result<Vec<usize>> {
    let time = future.dim(TIME)?;
    historic
        .dim(HISTORIC_TIME)?
        .items
        .iter()
        .map(|item| time.position(item))
        .collect()
}

pub(crate) fn check_leading(quantity: &Quantity, letter: char, role: &str) -> Result<()> {
    if quantity.dims().first_letter() != Some(letter) {
        return Err(EngineError::Precondition(format!(
            "{role} '{}' must lead with axis '{letter}', got {}",
            quantity.name(),
            quantity.dims()
        )));
    }
    Ok(())
}

/// Project `historic` (h, ...) along a driver (t, ...) by a per-slice curve fit
///
/// Each slice is fitted on its historic pairs only, evaluated at every driver value,
/// shifted so the last historic period matches exactly, and finally overwritten by the
/// historic values themselves. The driver's non-time axes must be a subset of the
/// historic non-time axes.
pub fn gdp_regression(historic: &Quantity, driver: &Quantity, kind: CurveKind, parallel: bool) -> Result<Quantity> {
    check_leading(historic, HISTORIC_TIME, "historic series")?;
    check_leading(driver, TIME, "driver")?;
    let slice_dims = historic.dims().without(HISTORIC_TIME);
    if !driver.dims().without(TIME).is_subset_of(&slice_dims) {
        return Err(EngineError::Precondition(format!(
            "driver axes {} are not a subset of historic axes {}",
            driver.dims(),
            historic.dims()
        )));
    }
    let positions = historic_positions(historic.dims(), driver.dims())?;
    let Some(&anchor) = positions.last() else {
        return Err(EngineError::Precondition(format!(
            "'{}' has no historic periods",
            historic.name()
        )));
    };

    let mut dims = vec![driver.dims().dim(TIME)?.clone()];
    dims.extend(slice_dims.iter().cloned());
    let out_dims = DimensionSet::new(dims)?;
    let driver = driver.cast_to(&out_dims)?;

    let driver_values = driver.values();
    let historic_values = historic.values();
    let inputs: Vec<(Vec<f64>, Vec<f64>)> = driver_values
        .lanes(Axis(0))
        .into_iter()
        .zip(historic_values.lanes(Axis(0)))
        .map(|(x, y)| (x.to_vec(), y.to_vec()))
        .collect();

    let project = |(x, y): (Vec<f64>, Vec<f64>)| -> Result<(Vec<f64>, bool)> {
        let x_hist: Vec<f64> = positions.iter().map(|&p| x[p]).collect();
        let curve = fit_curve(kind, &x_hist, &y)?;
        let pure: Vec<f64> = x.iter().map(|&xi| curve.evaluate(xi)).collect();
        let offset = pure[anchor] - y[y.len() - 1];
        let mut projected: Vec<f64> = pure.iter().map(|p| p - offset).collect();
        for (&p, &value) in positions.iter().zip(&y) {
            projected[p] = value;
        }
        Ok((projected, curve.converged))
    };
    let projections: Vec<(Vec<f64>, bool)> = if parallel {
        inputs.into_par_iter().map(project).collect::<Result<_>>()?
    } else {
        inputs.into_iter().map(project).collect::<Result<_>>()?
    };

    let unconverged = projections.iter().filter(|(_, converged)| !converged).count();
    debug!(series = historic.name(), slices = projections.len(), unconverged, ?kind, "driver regression fitted");

    let mut out = Quantity::zeros(historic.name(), out_dims);
    let mut values = out.values_mut();
    for (mut lane, (projected, _)) in values.lanes_mut(Axis(0)).into_iter().zip(&projections) {
        lane.assign(&ArrayView1::from(projected.as_slice()));
    }
    Ok(out)
}

/// Per-capita stock projection
///
/// `historic_stocks` (h, r, g) is divided by historic population, projected against
/// GDP per capita (t, r) and multiplied back by the full population (t, r).
pub fn extrapolate_stock(
    historic_stocks: &Quantity,
    population: &Quantity,
    gdppc: &Quantity,
    strategy: CurveStrategy,
    parallel: bool,
) -> Result<Quantity> {
    check_leading(historic_stocks, HISTORIC_TIME, "historic stocks")?;
    let historic_time = historic_stocks.dims().dim(HISTORIC_TIME)?;
    let historic_pop = population
        .reindex_axis(TIME, historic_time)?
        .renamed("historic_population");

    let stocks_pc = historic_stocks.div(&historic_pop)?.renamed("historic_stocks_pc");
    let projected_pc = gdp_regression(&stocks_pc, gdppc, strategy.curve_kind(), parallel)?;
    let stocks = projected_pc.mul(population)?.renamed("in_use_stock");
    info!(%strategy, dims = %stocks.dims(), total = stocks.sum(), "stock projection complete");
    Ok(stocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dims::Dimension;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn regions() -> Dimension {
        Dimension::new("Region", 'r', ["EU", "CN"])
    }

    fn goods() -> Dimension {
        Dimension::new("Good", 'g', ["Cars", "Buildings"])
    }

    fn gdppc() -> Quantity {
        let dims = DimensionSet::new(vec![Dimension::years("Time", 't', 2000, 2014), regions()]).unwrap();
        let values = (0..15)
            .flat_map(|t| [20_000.0 + 800.0 * t as f64, 5_000.0 + 900.0 * t as f64])
            .collect();
        Quantity::from_vec("gdppc", dims, values).unwrap()
    }

    fn historic_pc() -> Quantity {
        let dims = DimensionSet::new(vec![Dimension::years("Historic Time", 'h', 2000, 2004), regions(), goods()])
            .unwrap();
        let values = (0..5)
            .flat_map(|t| {
                let t = t as f64;
                [8.0 + 0.3 * t, 30.0 + t, 1.0 + 0.4 * t, 5.0 + 1.5 * t]
            })
            .collect();
        Quantity::from_vec("stocks_pc", dims, values).unwrap()
    }

    #[rstest]
    #[case(CurveStrategy::GdpRegression)]
    #[case(CurveStrategy::ExponentialGdpRegression)]
    fn test_regression_keeps_history_exactly(#[case] strategy: CurveStrategy) {
        let historic = historic_pc();
        let projected = gdp_regression(&historic, &gdppc(), strategy.curve_kind(), true).unwrap();
        assert_eq!(projected.dims().letters(), vec!['t', 'r', 'g']);
        assert_eq!(projected.values().shape(), &[15, 2, 2]);
        for year in 2000..=2004 {
            let label = year.to_string();
            assert_eq!(
                projected.slice_item('t', &label).unwrap().values(),
                historic.slice_item('h', &label).unwrap().values()
            );
        }
    }

    #[test]
    fn test_regression_is_continuous_at_anchor() {
        let projected = gdp_regression(&historic_pc(), &gdppc(), CurveKind::Sigmoid, false).unwrap();
        let last = projected.slice_item('t', "2004").unwrap();
        let next = projected.slice_item('t', "2005").unwrap();
        for (a, b) in last.values().iter().zip(next.values().iter()) {
            // one driver step away from the anchor, so the jump is bounded by the local slope
            assert!((b - a).abs() < 0.2 * a.abs().max(1.0));
        }
    }

    #[test]
    fn test_regression_preconditions() {
        let time_first = historic_pc().with_leading('r').unwrap();
        assert!(matches!(
            gdp_regression(&time_first, &gdppc(), CurveKind::Sigmoid, false),
            Err(EngineError::Precondition(_))
        ));
        let driver = gdppc().with_leading('r').unwrap();
        assert!(matches!(
            gdp_regression(&historic_pc(), &driver, CurveKind::Sigmoid, false),
            Err(EngineError::Precondition(_))
        ));
    }

    #[test]
    fn test_extrapolate_stock_round_trips_population() {
        let population = gdppc().mapv(|_| 2.0).renamed("population");
        let historic_stocks = historic_pc().scale(2.0);
        let stocks =
            extrapolate_stock(&historic_stocks, &population, &gdppc(), CurveStrategy::GdpRegression, false).unwrap();
        let first = stocks.slice_item('t', "2000").unwrap();
        let expected = historic_stocks.slice_item('h', "2000").unwrap();
        for (a, b) in first.values().iter().zip(expected.values().iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_parse_strategy() {
        assert_eq!(CurveStrategy::parse("GDP_regression").unwrap(), CurveStrategy::GdpRegression);
        assert_eq!(CurveStrategy::ExponentialGdpRegression.to_string(), "Exponential_GDP_regression");
        assert!(matches!(
            CurveStrategy::parse("Linear_regression"),
            Err(EngineError::UnknownCurveStrategy(_))
        ));
    }
}
