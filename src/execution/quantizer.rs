//! Lot size quantization
//!
//! Quantities are floored to the venue step size in decimal arithmetic and
//! rounded to 8 fractional digits, the precision venues accept.

use crate::error::TradingError;
use crate::models::VenueConstraints;
use crate::Result;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

pub const QUANTITY_DECIMALS: u32 = 8;

/// Floor `desired` to a multiple of the step size and check the venue bounds
pub fn quantize(desired: f64, constraints: &VenueConstraints) -> Result<f64> {
    let step = to_decimal(constraints.step_size, "step size")?;
    if step <= Decimal::ZERO {
        return Err(TradingError::Configuration(format!(
            "step size must be positive, got {}",
            constraints.step_size
        )));
    }
    let desired_dec = to_decimal(desired, "quantity")?;

    // Huge quantities over a fine step overflow the 96-bit mantissa
    let quantized_dec = desired_dec
        .checked_div(step)
        .and_then(|steps| steps.floor().checked_mul(step))
        .map(|q| q.round_dp(QUANTITY_DECIMALS))
        .ok_or(TradingError::QuantityRejected {
            quantity: desired,
            min_quantity: constraints.min_quantity,
            max_quantity: constraints.max_quantity,
        })?;
    let quantized = quantized_dec.to_f64().ok_or_else(|| {
        TradingError::Configuration(format!("quantity {} out of range", quantized_dec))
    })?;

    if quantized < constraints.min_quantity || quantized > constraints.max_quantity {
        return Err(TradingError::QuantityRejected {
            quantity: quantized,
            min_quantity: constraints.min_quantity,
            max_quantity: constraints.max_quantity,
        });
    }

    Ok(quantized)
}

fn to_decimal(value: f64, what: &str) -> Result<Decimal> {
    Decimal::from_f64(value)
        .ok_or_else(|| TradingError::Configuration(format!("{} {} is not representable", what, value)))
}
