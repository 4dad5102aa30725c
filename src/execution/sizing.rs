use rust_decimal::Decimal;

use crate::error::TradeError;
use crate::models::Symbol;

/// Floor `quantity` to a multiple of `step_size`.
///
/// The result keeps the step's decimal precision (`-log10(step)` for the usual
/// power-of-ten steps), so it can be sent to the venue as-is.
pub fn align_to_step(quantity: Decimal, step_size: Decimal) -> Decimal {
    if step_size <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    let precision = step_size.normalize().scale();
    ((quantity / step_size).floor() * step_size).round_dp(precision)
}

/// True when `quantity` is an exact multiple of `step_size`
pub fn is_step_aligned(quantity: Decimal, step_size: Decimal) -> bool {
    step_size > Decimal::ZERO && (quantity % step_size).is_zero()
}

/// Quantity bought with `notional` quote units at `price`, floored to the lot step.
///
/// Fails with `QuantityTooSmall` instead of producing a zero-size order.
pub fn lot_size_quantity(
    symbol: &Symbol,
    notional: Decimal,
    price: Decimal,
    step_size: Decimal,
) -> Result<Decimal, TradeError> {
    let too_small = || TradeError::QuantityTooSmall {
        symbol: symbol.to_string(),
        notional,
        price,
        step_size,
    };

    if notional <= Decimal::ZERO || price <= Decimal::ZERO || step_size <= Decimal::ZERO {
        return Err(too_small());
    }

    let raw = notional / price;
    let quantity = align_to_step(raw, step_size);

    if quantity.is_zero() {
        return Err(too_small());
    }
    Ok(quantity)
}
