use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// VAT applied to every order subtotal (19%).
pub const TAX_RATE: Decimal = Decimal::from_parts(19, 0, 0, false, 2);

/// Flat delivery fee used when the configuration does not override it.
pub const DEFAULT_DELIVERY_FEE: Decimal = Decimal::from_parts(4000, 0, 0, false, 0);

/// Money breakdown of an order. There is no promotion engine, so the
/// discount is always zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub delivery_fee: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
}

impl OrderTotals {
    pub fn compute(subtotal: Decimal, delivery_fee: Decimal) -> Self {
        let tax = (subtotal * TAX_RATE).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        let discount = Decimal::ZERO;
        Self {
            subtotal,
            tax,
            delivery_fee,
            discount,
            total: subtotal + tax + delivery_fee - discount,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_for_reference_cart() {
        let totals = OrderTotals::compute(Decimal::from(40), DEFAULT_DELIVERY_FEE);

        assert_eq!(totals.tax, Decimal::new(760, 2));
        assert_eq!(totals.discount, Decimal::ZERO);
        assert_eq!(totals.total, Decimal::new(404760, 2));
    }

    #[test]
    fn tax_is_rounded_to_cents() {
        // 0.19 * 10.05 = 1.9095
        let totals = OrderTotals::compute(Decimal::new(1005, 2), Decimal::ZERO);
        assert_eq!(totals.tax, Decimal::new(191, 2));
        assert_eq!(totals.total, totals.subtotal + totals.tax);
    }
}
