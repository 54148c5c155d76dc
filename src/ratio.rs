/// Household income is approximated as per-capita income times the
/// 2019-2023 U.S. median household size.
pub const HOUSEHOLD_SIZE: f64 = 2.54;

pub const MONTHS: f64 = 12.0;

/// Price-to-income ratio. NaN when income is not a positive finite number.
pub fn ratio(price: f64, income: f64) -> f64 {
    if !price.is_finite() || !income.is_finite() || income <= 0.0 {
        return f64::NAN;
    }
    price / household_income(income)
}

pub fn household_income(per_capita: f64) -> f64 {
    per_capita * HOUSEHOLD_SIZE
}

pub fn monthly(annual: f64) -> f64 {
    annual / MONTHS
}

/// A row is usable only when both values are positive and finite.
pub fn valid_pair(price: f64, income: f64) -> bool {
    price.is_finite() && income.is_finite() && price > 0.0 && income > 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worked_examples() {
        let r = ratio(300_000.0, 50_000.0);
        assert!((r - 2.362).abs() < 1e-3);
        let r = ratio(900_000.0, 70_000.0);
        assert!((r - 5.062).abs() < 1e-3);
    }

    #[test]
    fn nan_without_income() {
        assert!(ratio(300_000.0, 0.0).is_nan());
        assert!(ratio(300_000.0, -1.0).is_nan());
        assert!(ratio(300_000.0, f64::NAN).is_nan());
        assert!(ratio(f64::INFINITY, 10.0).is_nan());
    }

    #[test]
    fn household_scaling() {
        assert_eq!(household_income(10_000.0), 25_400.0);
        assert_eq!(ratio(25_400.0, 10_000.0), 1.0);
    }

    #[test]
    fn pair_validity() {
        assert!(valid_pair(1.0, 1.0));
        assert!(!valid_pair(0.0, 1.0));
        assert!(!valid_pair(1.0, f64::INFINITY));
    }
}
