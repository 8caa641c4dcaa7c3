//! Fee and currency-conversion arithmetic. Pure functions over Money.

use crate::domain::Money;
use crate::error::FundingError;

/// `round2(amount * fee_percentage / 100)`.
pub fn compute_fee(amount: Money, fee_percentage: Money) -> Money {
    (amount * fee_percentage / Money::hundred()).round2()
}

/// `round2(amount * rate)`.
pub fn convert(amount: Money, rate: Money) -> Money {
    (amount * rate).round2()
}

/// Fee percentages live in `[0, 100]`.
pub fn validate_fee_percentage(fee_percentage: Money) -> Result<Money, FundingError> {
    if fee_percentage.is_negative() || fee_percentage > Money::hundred() {
        return Err(FundingError::validation(
            "fee_percentage",
            format!("must be between 0 and 100, got {}", fee_percentage),
        ));
    }
    Ok(fee_percentage)
}

/// Amounts entering a request must be strictly positive and representable in storage.
pub fn validate_amount(amount: Money) -> Result<Money, FundingError> {
    if !amount.is_positive() {
        return Err(FundingError::validation(
            "amount",
            format!("must be greater than zero, got {}", amount),
        ));
    }
    amount.to_storage()?;
    Ok(amount.round2())
}
