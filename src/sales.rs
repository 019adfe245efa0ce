//! Pricing, totals and status rules for sales.
//!
//! Everything here is pure so both repository implementations apply exactly the same
//! arithmetic and transition table.

use crate::models::OrderStatus;

/// Products at or below this stock are reported as low stock on the dashboard.
pub const LOW_STOCK_THRESHOLD: i32 = 5;

const BPS_DENOMINATOR: i64 = 10_000;

/// Subtotal, tax and total of an order, in minor currency units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Totals {
    pub subtotal: i64,
    pub tax: i64,
    pub total: i64,
}

/// Price of one line. Returns `None` on overflow.
pub fn line_total(unit_price: i64, quantity: i32) -> Option<i64> {
    unit_price.checked_mul(i64::from(quantity))
}

/// Tax on `subtotal` at `rate_bps` basis points, rounded half up. Returns `None` on overflow.
pub fn tax_for(subtotal: i64, rate_bps: i64) -> Option<i64> {
    let scaled = subtotal.checked_mul(rate_bps)?;
    Some(scaled.checked_add(BPS_DENOMINATOR / 2)? / BPS_DENOMINATOR)
}

/// Sums line totals and applies the tax rate. Returns `None` when any step overflows.
pub fn compute_totals<I>(line_totals: I, rate_bps: i64) -> Option<Totals>
where
    I: IntoIterator<Item = i64>,
{
    let subtotal = line_totals
        .into_iter()
        .try_fold(0i64, |acc, line| acc.checked_add(line))?;
    let tax = tax_for(subtotal, rate_bps)?;
    Some(Totals {
        subtotal,
        tax,
        total: subtotal.checked_add(tax)?,
    })
}

/// Allowed moves: pending → completed, pending → cancelled, completed → cancelled.
pub fn can_transition(from: OrderStatus, to: OrderStatus) -> bool {
    matches!(
        (from, to),
        (OrderStatus::Pending, OrderStatus::Completed)
            | (OrderStatus::Pending, OrderStatus::Cancelled)
            | (OrderStatus::Completed, OrderStatus::Cancelled)
    )
}

/// Error message used by both repositories when a transition is refused.
pub fn transition_error(from: OrderStatus, to: OrderStatus) -> String {
    format!("cannot change order status from {from} to {to}")
}

/// Formats an amount the way receipts print it: `$ 1.234.567`.
pub fn format_money(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }
    if amount < 0 {
        format!("-$ {grouped}")
    } else {
        format!("$ {grouped}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tax_rounds_half_up() {
        // 19% of 12_345 = 2345.55
        assert_eq!(tax_for(12_345, 1900), Some(2346));
        // 19% of 50 = 9.5
        assert_eq!(tax_for(50, 1900), Some(10));
        assert_eq!(tax_for(0, 1900), Some(0));
        assert_eq!(tax_for(10_000, 0), Some(0));
    }

    #[test]
    fn totals_add_tax_to_subtotal() {
        let totals = compute_totals([25_000, 2 * 18_000], 1900).unwrap();
        assert_eq!(totals.subtotal, 61_000);
        assert_eq!(totals.tax, 11_590);
        assert_eq!(totals.total, 72_590);
    }

    #[test]
    fn oversized_amounts_are_refused_instead_of_wrapping() {
        let line = line_total(10_000_000_000_000_000, 1).unwrap();
        assert_eq!(tax_for(line, 1900), None);
        assert_eq!(compute_totals([line], 1900), None);
        assert_eq!(compute_totals([i64::MAX, 1], 0), None);

        // Large but representable amounts still price exactly.
        let totals = compute_totals([1_000_000_000_000], 1900).unwrap();
        assert_eq!(totals.tax, 190_000_000_000);
        assert_eq!(totals.total, 1_190_000_000_000);
    }

    #[test]
    fn line_total_detects_overflow() {
        assert_eq!(line_total(1_500, 3), Some(4_500));
        assert_eq!(line_total(i64::MAX, 2), None);
    }

    #[test]
    fn transition_table() {
        use OrderStatus::*;
        assert!(can_transition(Pending, Completed));
        assert!(can_transition(Pending, Cancelled));
        assert!(can_transition(Completed, Cancelled));

        assert!(!can_transition(Completed, Pending));
        assert!(!can_transition(Cancelled, Pending));
        assert!(!can_transition(Cancelled, Completed));
        assert!(!can_transition(Pending, Pending));
    }

    #[test]
    fn money_uses_dot_thousands_separator() {
        assert_eq!(format_money(0), "$ 0");
        assert_eq!(format_money(950), "$ 950");
        assert_eq!(format_money(1_000), "$ 1.000");
        assert_eq!(format_money(1_234_567), "$ 1.234.567");
        assert_eq!(format_money(-45_000), "-$ 45.000");
    }
}
