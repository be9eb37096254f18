use tracing::info;

use super::{BalanceStrategy, BalanceTarget, Trade, TradeSide};
use crate::dims::{Quantity, HISTORIC_TIME, REGION, TIME};
use crate::error::Result;
use crate::extrapolation::extrapolate_to_future;

/// Prediction by weighted proportional extrapolation against a scaler
#[derive(Debug, Clone)]
pub struct ExtrapolationPredictor {
    pub scaler: Quantity,
    pub scale_first: TradeSide,
    pub adopt_scaler_dims: bool,
    pub balance_to: Option<BalanceTarget>,
}

impl ExtrapolationPredictor {
    pub fn predict(&self, trade: &Trade) -> Result<Trade> {
        predict_by_extrapolation(trade, &self.scaler, self.scale_first, self.adopt_scaler_dims, self.balance_to)
    }
}

/// Project a historic trade pair over the scaler's time horizon
///
/// `scale_first` is extrapolated against the scaler summed to the trade's axes; the
/// other side is then extrapolated against the region total of the first. With
/// `adopt_scaler_dims` both sides are further split along the scaler's extra axes in
/// the scaler's proportions. `balance_to` balances the result by ratio.
pub fn predict_by_extrapolation(
    trade: &Trade,
    scaler: &Quantity,
    scale_first: TradeSide,
    adopt_scaler_dims: bool,
    balance_to: Option<BalanceTarget>,
) -> Result<Trade> {
    let scale_second = scale_first.other();
    let historic_dims_with_time = trade
        .imports()
        .dims()
        .replace(HISTORIC_TIME, scaler.dims().dim(TIME)?.clone())?;
    let shared = historic_dims_with_time.intersect_with(scaler.dims())?.letters();
    let total_scaler = scaler.sum_to(&shared)?;

    let mut future_first = extrapolate_to_future(trade.side(scale_first), &total_scaler)?;
    let mut global_first = future_first.sum_over(&[REGION])?;
    let mut future_second = extrapolate_to_future(trade.side(scale_second), &global_first)?;

    let future_dims = if adopt_scaler_dims {
        let missing = scaler.dims().difference_with(future_first.dims()).letters();
        if !missing.is_empty() {
            future_first = future_first.mul(&scaler.get_shares_over(&missing)?)?.nan_to_zero();
            global_first = future_first.sum_over(&[REGION])?;
            future_second = future_second
                .mul(&global_first.get_shares_over(&missing)?)?
                .nan_to_zero();
        }
        scaler.dims().clone()
    } else {
        historic_dims_with_time
    };

    let mut first = Quantity::zeros(trade.side(scale_first).name(), future_dims.clone());
    first.assign(&future_first)?;
    let mut second = Quantity::zeros(trade.side(scale_second).name(), future_dims);
    second.assign(&future_second)?;
    let (imports, exports) = match scale_first {
        TradeSide::Imports => (first, second),
        TradeSide::Exports => (second, first),
    };

    let mut future = Trade::new(imports, exports)?;
    if let Some(target) = balance_to {
        future = future.with_balancer(BalanceStrategy::Ratio(target));
        future.balance()?;
    }
    info!(
        %scale_first,
        adopt_scaler_dims,
        imports = future.imports().sum(),
        exports = future.exports().sum(),
        "trade predicted"
    );
    Ok(future)
}
