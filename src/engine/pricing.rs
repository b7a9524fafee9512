use rust_decimal::Decimal;

use crate::model::Stay;

use super::EngineError;

/// `duration_days × nightly_rate`. Rates must be strictly positive.
pub fn compute_total(stay: &Stay, nightly_rate: Decimal) -> Result<Decimal, EngineError> {
    if nightly_rate <= Decimal::ZERO {
        return Err(EngineError::InvalidRate(nightly_rate));
    }
    Decimal::from(stay.duration_days())
        .checked_mul(nightly_rate)
        .ok_or(EngineError::LimitExceeded("total amount overflow"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Ms;
    use rust_decimal_macros::dec;

    const H: Ms = 3_600_000;

    #[test]
    fn two_nights_at_hundred() {
        let stay = Stay::new(1, 13 * H, 13 * H + 47 * H).unwrap();
        assert_eq!(compute_total(&stay, dec!(100)).unwrap(), dec!(200));
    }

    #[test]
    fn short_stay_bills_one_night() {
        let stay = Stay::new(1, 0, 2 * H).unwrap();
        assert_eq!(compute_total(&stay, dec!(85.50)).unwrap(), dec!(85.50));
    }

    #[test]
    fn rejects_non_positive_rate() {
        let stay = Stay::new(1, 0, 24 * H).unwrap();
        assert!(matches!(
            compute_total(&stay, Decimal::ZERO),
            Err(EngineError::InvalidRate(_))
        ));
        assert!(matches!(
            compute_total(&stay, dec!(-10)),
            Err(EngineError::InvalidRate(_))
        ));
    }

    #[test]
    fn linear_in_rate() {
        let stay = Stay::new(1, 0, 50 * H).unwrap();
        let one = compute_total(&stay, dec!(40)).unwrap();
        let triple = compute_total(&stay, dec!(120)).unwrap();
        assert_eq!(one * dec!(3), triple);
    }

    #[test]
    fn later_checkout_never_costs_less() {
        let mut previous = Decimal::ZERO;
        for end in (1..=200).map(|h| h * H) {
            let stay = Stay::new(1, 0, end).unwrap();
            let total = compute_total(&stay, dec!(70)).unwrap();
            assert!(total >= previous, "total dropped at {end}");
            previous = total;
        }
    }
}
