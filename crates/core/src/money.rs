use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Convert a 2-dp decimal amount to integer cents for storage. `None` when
/// the value does not fit in i64 cents.
pub fn decimal_to_cents(amount: Decimal) -> Option<i64> {
    amount.checked_mul(Decimal::from(100))?.round().to_i64()
}

pub fn cents_to_decimal(cents: i64) -> Decimal {
    Decimal::from(cents) / Decimal::from(100)
}
