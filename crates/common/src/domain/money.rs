//! Money arithmetic on two-decimal amounts

use rust_decimal::{Decimal, RoundingStrategy};

use crate::errors::{AppError, Result};

/// Number of minor units kept for every stored amount
pub const MONEY_SCALE: u32 = 2;

/// Round to cents, half away from zero
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Reject non-positive amounts or amounts with sub-cent precision
pub fn ensure_positive_amount(field: &str, amount: Decimal) -> Result<Decimal> {
    if amount <= Decimal::ZERO {
        return Err(AppError::invalid_field(field, "must be greater than zero"));
    }
    ensure_money_amount(field, amount)
}

/// Reject negative amounts or amounts with sub-cent precision; zero is allowed
pub fn ensure_money_amount(field: &str, amount: Decimal) -> Result<Decimal> {
    if amount < Decimal::ZERO {
        return Err(AppError::invalid_field(field, "must not be negative"));
    }
    if amount.normalize().scale() > MONEY_SCALE {
        return Err(AppError::invalid_field(
            field,
            "must not have more than two decimal places",
        ));
    }
    Ok(round_money(amount))
}

/// Fee retained by the platform for a contribution of `amount`
pub fn platform_fee(amount: Decimal, percent: Decimal) -> Decimal {
    round_money(amount * percent / Decimal::ONE_HUNDRED)
}

/// Validate a fee percentage
pub fn ensure_fee_percent(percent: Decimal) -> Result<Decimal> {
    if percent < Decimal::ZERO || percent > Decimal::ONE_HUNDRED {
        return Err(AppError::invalid_field(
            "platform_fee_percent",
            "must be between 0 and 100",
        ));
    }
    Ok(percent.round_dp(MONEY_SCALE))
}

/// Split `amount` into `count` cent-exact parts.
///
/// Every part gets the floor share; the leftover cents go to the first part,
/// so the parts always sum back to `amount`.
pub fn split_installments(amount: Decimal, count: u32) -> Vec<Decimal> {
    if count == 0 {
        return Vec::new();
    }
    let amount = round_money(amount);
    let cents = amount * Decimal::ONE_HUNDRED;
    let share = (cents / Decimal::from(count)).floor();
    let remainder = cents - share * Decimal::from(count);

    let mut parts = vec![share / Decimal::ONE_HUNDRED; count as usize];
    if let Some(first) = parts.first_mut() {
        *first = (share + remainder) / Decimal::ONE_HUNDRED;
    }
    parts
}

/// Upper-case an ISO-4217 style currency code, rejecting anything but three letters
pub fn normalize_currency(code: &str) -> Result<String> {
    let code = code.trim();
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(AppError::invalid_field("currency", "must be a three-letter code"));
    }
    Ok(code.to_ascii_uppercase())
}

/// Sum a sequence of amounts
pub fn total<'a>(amounts: impl IntoIterator<Item = &'a Decimal>) -> Decimal {
    amounts.into_iter().copied().sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_fee_rounds_half_away_from_zero() {
        assert_eq!(platform_fee(dec!(100.00), dec!(5)), dec!(5.00));
        // 0.125 rounds up to 0.13
        assert_eq!(platform_fee(dec!(2.50), dec!(5)), dec!(0.13));
        assert_eq!(platform_fee(dec!(19.99), dec!(0)), dec!(0));
    }

    #[test]
    fn test_split_keeps_total() {
        let parts = split_installments(dec!(100.00), 3);
        assert_eq!(parts, vec![dec!(33.34), dec!(33.33), dec!(33.33)]);
        assert_eq!(total(&parts), dec!(100.00));

        let parts = split_installments(dec!(0.05), 4);
        assert_eq!(parts, vec![dec!(0.02), dec!(0.01), dec!(0.01), dec!(0.01)]);
        assert_eq!(total(&parts), dec!(0.05));
    }

    #[test]
    fn test_split_even_amount() {
        let parts = split_installments(dec!(120), 12);
        assert!(parts.iter().all(|p| *p == dec!(10)));
        assert!(split_installments(dec!(10), 0).is_empty());
    }

    #[test]
    fn test_positive_amount_rules() {
        assert!(ensure_positive_amount("amount", dec!(0)).is_err());
        assert!(ensure_positive_amount("amount", dec!(-1)).is_err());
        assert!(ensure_positive_amount("amount", dec!(1.005)).is_err());
        assert_eq!(
            ensure_positive_amount("amount", dec!(1.50)).ok(),
            Some(dec!(1.50))
        );
        // trailing zeros beyond two places are fine
        assert!(ensure_positive_amount("amount", dec!(2.5000)).is_ok());
    }

    #[test]
    fn test_money_amount_rejects_sub_cent_totals() {
        assert_eq!(ensure_money_amount("total_amount", dec!(0)).ok(), Some(dec!(0)));
        assert_eq!(
            ensure_money_amount("total_amount", dec!(1999.90)).ok(),
            Some(dec!(1999.90))
        );
        assert!(ensure_money_amount("total_amount", dec!(-0.01)).is_err());

        let err = ensure_money_amount("total_amount", dec!(1000.005)).unwrap_err();
        assert!(
            matches!(err, AppError::Validation { field: Some(ref f), .. } if f == "total_amount"),
            "{:?}",
            err
        );
    }

    #[test]
    fn test_fee_percent_bounds() {
        assert!(ensure_fee_percent(dec!(-0.01)).is_err());
        assert!(ensure_fee_percent(dec!(100.01)).is_err());
        assert_eq!(ensure_fee_percent(dec!(7.5)).ok(), Some(dec!(7.5)));
    }

    #[test]
    fn test_currency_codes() {
        assert_eq!(normalize_currency(" eur ").ok(), Some("EUR".to_string()));
        assert!(normalize_currency("EURO").is_err());
        assert!(normalize_currency("U$D").is_err());
    }
}
