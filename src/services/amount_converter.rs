use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{AppError, Result};
use crate::models::Currency;

/// Converts fixed-point amounts to the integer minor units the gateway expects.
pub struct AmountConverter;

impl AmountConverter {
    /// Scales `amount` by `10^exponent` and rounds half-up.
    ///
    /// Fails for non-positive amounts, for amounts that round to zero and for
    /// results outside the `i64` range.
    pub fn to_minor_units(amount: Decimal, exponent: u32) -> Result<i64> {
        if amount <= Decimal::ZERO {
            return Err(AppError::AmountInvalid(format!("Amount must be positive, got {}", amount)));
        }

        let factor = 10i64
            .checked_pow(exponent)
            .ok_or_else(|| AppError::AmountInvalid(format!("Unsupported minor-unit exponent {}", exponent)))?;

        let scaled = amount
            .checked_mul(Decimal::from(factor))
            .ok_or_else(|| AppError::AmountInvalid(format!("Amount {} is too large", amount)))?;

        let minor = scaled
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .ok_or_else(|| AppError::AmountInvalid(format!("Amount {} does not fit in minor units", amount)))?;

        if minor <= 0 {
            return Err(AppError::AmountInvalid(format!("Amount {} rounds to zero minor units", amount)));
        }

        Ok(minor)
    }

    pub fn to_minor_units_for(amount: Decimal, currency: Currency) -> Result<i64> {
        Self::to_minor_units(amount, currency.minor_unit_exponent())
    }

    pub fn from_minor_units(minor: i64, exponent: u32) -> Decimal {
        Decimal::new(minor, exponent)
    }
}
