use ndarray::Zip;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::debug;

use crate::dims::{Quantity, REGION};
use crate::error::Result;

/// Global total both sides are rescaled to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BalanceTarget {
    /// Exports follow the global import total
    Imports,
    /// Imports follow the global export total
    Exports,
    Maximum,
    Minimum,
    /// Mean of both global totals
    Hybrid,
}

impl BalanceTarget {
    fn target(self, imports: f64, exports: f64) -> f64 {
        match self {
            BalanceTarget::Imports => imports,
            BalanceTarget::Exports => exports,
            BalanceTarget::Maximum => imports.max(exports),
            BalanceTarget::Minimum => imports.min(exports),
            BalanceTarget::Hybrid => 0.5 * (imports + exports),
        }
    }
}

/// Rescale both sides so their region totals meet the target in every non-region slice
///
/// A side with a zero region total cannot be rescaled and stays zero.
pub fn balance_by_ratio(imports: &mut Quantity, exports: &mut Quantity, to: BalanceTarget) -> Result<()> {
    let global_imports = imports.sum_over(&[REGION])?;
    let global_exports = exports.sum_over(&[REGION])?;

    let mut import_factor = global_imports.clone();
    let mut export_factor = global_exports.clone();
    Zip::from(import_factor.values_mut())
        .and(export_factor.values_mut())
        .and(global_imports.values())
        .and(global_exports.values())
        .for_each(|fi, fe, &i, &e| {
            let target = to.target(i, e);
            *fi = ratio(target, i);
            *fe = ratio(target, e);
        });

    let balanced_imports = imports.mul(&import_factor)?;
    let balanced_exports = exports.mul(&export_factor)?;
    imports.assign(&balanced_imports)?;
    exports.assign(&balanced_exports)?;
    debug!(
        %to,
        imports_before = global_imports.sum(),
        exports_before = global_exports.sum(),
        total_after = imports.sum(),
        "trade balanced"
    );
    Ok(())
}

fn ratio(target: f64, current: f64) -> f64 {
    if current == 0.0 {
        0.0
    } else {
        target / current
    }
}
