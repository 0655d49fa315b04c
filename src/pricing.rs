use rust_decimal::Decimal;
use uuid::Uuid;

/// A priced order line captured at placement time. This is deliberately a
/// different shape from a cart line: cart lines follow the live product
/// price, snapshot lines never change once taken.
#[derive(Debug, Clone)]
pub struct SnapshotLine {
    pub product_id: Uuid,
    pub product_name: String,
    pub price_at_purchase: Decimal,
    pub quantity: i32,
}

impl SnapshotLine {
    pub fn subtotal(&self) -> Decimal {
        line_subtotal(self.price_at_purchase, self.quantity)
    }
}

pub fn line_subtotal(price: Decimal, quantity: i32) -> Decimal {
    price * Decimal::from(quantity)
}

pub fn order_total<'a, I>(lines: I) -> Decimal
where
    I: IntoIterator<Item = &'a SnapshotLine>,
{
    lines
        .into_iter()
        .map(SnapshotLine::subtotal)
        .fold(Decimal::ZERO, |acc, subtotal| acc + subtotal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn line(name: &str, price: &str, quantity: i32) -> SnapshotLine {
        SnapshotLine {
            product_id: Uuid::new_v4(),
            product_name: name.to_string(),
            price_at_purchase: dec(price),
            quantity,
        }
    }

    #[test]
    fn subtotal_is_price_times_quantity() {
        assert_eq!(line_subtotal(dec("100.00"), 2), dec("200.00"));
        assert_eq!(line_subtotal(dec("0.10"), 3), dec("0.30"));
    }

    #[test]
    fn total_sums_line_subtotals_exactly() {
        let lines = vec![line("P1", "100.00", 2), line("P2", "50.00", 1)];
        assert_eq!(order_total(&lines), dec("250.00"));
    }

    #[test]
    fn total_of_no_lines_is_zero() {
        assert_eq!(order_total(&[]), Decimal::ZERO);
    }

    #[test]
    fn no_binary_float_drift() {
        // 0.1 + 0.2 style sums stay exact in decimal arithmetic.
        let lines = vec![line("A", "0.10", 1), line("B", "0.20", 1)];
        assert_eq!(order_total(&lines), dec("0.30"));
    }
}
