use nalgebra::{Matrix2, Vector2};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EngineError, Result};

const MAX_ITERATIONS: usize = 200;
const MAX_DAMPING: f64 = 1e12;
const RELATIVE_TOLERANCE: f64 = 1e-12;

/// Monotonic curve families for driver regressions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CurveKind {
    /// `a / (1 + exp(b / x))`, saturating at `a / 2` for large drivers
    Sigmoid,
    /// `a · (1 - exp(-b·x))`, saturating at `a`
    Exponential,
}

/// Two-parameter curve fitted by least squares
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FittedCurve {
    pub kind: CurveKind,
    pub params: [f64; 2],
    pub converged: bool,
}

impl FittedCurve {
    pub fn evaluate(&self, x: f64) -> f64 {
        evaluate(self.kind, self.params, x)
    }
}

fn evaluate(kind: CurveKind, [a, b]: [f64; 2], x: f64) -> f64 {
    match kind {
        CurveKind::Sigmoid => a / (1.0 + (b / x).exp()),
        CurveKind::Exponential => a * (1.0 - (-b * x).exp()),
    }
}

fn gradient(kind: CurveKind, [a, b]: [f64; 2], x: f64) -> Vector2<f64> {
    match kind {
        CurveKind::Sigmoid => {
            let e = (b / x).exp();
            let denom = 1.0 + e;
            Vector2::new(1.0 / denom, -a * e / (x * denom * denom))
        }
        CurveKind::Exponential => {
            let e = (-b * x).exp();
            Vector2::new(1.0 - e, a * x * e)
        }
    }
}

/// Start from a curve through the last observation, saturating at twice its level
fn initial_guess(kind: CurveKind, x_last: f64, y_last: f64) -> [f64; 2] {
    let level = if y_last.abs() > f64::EPSILON { y_last } else { 1.0 };
    match kind {
        // a/(1+e^(b/x)) = level with a = 4·level  =>  e^(b/x) = 3
        CurveKind::Sigmoid => [4.0 * level, x_last * 3.0_f64.ln()],
        // a(1-e^(-bx)) = level with a = 2·level  =>  e^(-bx) = 1/2
        CurveKind::Exponential => [2.0 * level, 2.0_f64.ln() / x_last],
    }
}

fn sum_of_squares(kind: CurveKind, params: [f64; 2], x: &[f64], y: &[f64]) -> f64 {
    x.iter()
        .zip(y)
        .map(|(&xi, &yi)| (yi - evaluate(kind, params, xi)).powi(2))
        .sum()
}

/// Fit `y ≈ f(x)` with Levenberg–Marquardt
///
/// Drivers must be strictly positive. A fit that stops improving before
/// converging still returns its best parameters, flagged `converged: false`.
pub fn fit_curve(kind: CurveKind, x: &[f64], y: &[f64]) -> Result<FittedCurve> {
    if x.len() != y.len() || x.is_empty() {
        return Err(EngineError::Precondition(format!(
            "curve fit needs matching non-empty series (got {} drivers, {} values)",
            x.len(),
            y.len()
        )));
    }
    if let Some(bad) = x.iter().find(|v| !(v.is_finite() && **v > 0.0)) {
        return Err(EngineError::Precondition(format!(
            "curve fit drivers must be finite and positive (got {bad})"
        )));
    }

    let n = x.len();
    let mut params = initial_guess(kind, x[n - 1], y[n - 1]);
    let mut cost = sum_of_squares(kind, params, x, y);
    let mut damping = 1e-3;
    let mut converged = false;

    for _ in 0..MAX_ITERATIONS {
        let mut jtj = Matrix2::zeros();
        let mut jtr = Vector2::zeros();
        for (&xi, &yi) in x.iter().zip(y) {
            let g = gradient(kind, params, xi);
            let residual = yi - evaluate(kind, params, xi);
            jtj += g * g.transpose();
            jtr += g * residual;
        }

        let mut improved = false;
        while damping <= MAX_DAMPING {
            let mut lhs = jtj;
            for i in 0..2 {
                lhs[(i, i)] += damping * jtj[(i, i)].max(1e-12);
            }
            let Some(step) = lhs.lu().solve(&jtr) else {
                damping *= 10.0;
                continue;
            };
            let candidate = [params[0] + step[0], params[1] + step[1]];
            let candidate_cost = sum_of_squares(kind, candidate, x, y);
            if candidate_cost.is_finite() && candidate_cost <= cost {
                let gain = cost - candidate_cost;
                params = candidate;
                cost = candidate_cost;
                damping = (damping / 10.0).max(1e-15);
                improved = true;
                if gain <= RELATIVE_TOLERANCE * (cost + f64::EPSILON) {
                    converged = true;
                }
                break;
            }
            damping *= 10.0;
        }

        if !improved {
            // no step reduces the cost: we are at a (local) minimum
            converged = true;
            break;
        }
        if converged {
            break;
        }
    }

    if !converged {
        debug!(?kind, ?params, cost, "curve fit stopped before converging");
    }
    Ok(FittedCurve {
        kind,
        params,
        converged,
    })
}
