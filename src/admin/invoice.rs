//! Invoice built by `/invoice`. Transient: rendered and sent, never stored.

use rust_decimal::Decimal;

use crate::channels::{ChatId, escape_html};

/// Currencies quoted without minor units.
const ZERO_DECIMAL_CURRENCIES: [&str; 2] = ["RUB", "GEL"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoice {
    /// Client the invoice goes to.
    pub target: ChatId,
    pub base: Decimal,
    pub fee: Decimal,
    pub currency: String,
    pub note: String,
}

impl Invoice {
    fn zero_decimal(&self) -> bool {
        ZERO_DECIMAL_CURRENCIES.contains(&self.currency.as_str())
    }

    /// `base + fee`, whole units for RUB/GEL, cents otherwise.
    pub fn total(&self) -> Decimal {
        let sum = self.base + self.fee;
        if self.zero_decimal() {
            sum.round()
        } else {
            sum.round_dp(2)
        }
    }

    fn format_amount(&self, amount: Decimal) -> String {
        if self.zero_decimal() {
            format!("{:.0}", amount.round())
        } else {
            format!("{:.2}", amount.round_dp(2))
        }
    }

    pub fn format_total(&self) -> String {
        self.format_amount(self.total())
    }

    /// Client-facing invoice text (HTML).
    pub fn render(&self, payment_details: &str) -> String {
        let mut text = String::from("🧾 <b>Invoice</b>\n");
        if self.note.is_empty() {
            text.push('\n');
        } else {
            text.push_str(&escape_html(&self.note));
            text.push_str("\n\n");
        }
        text.push_str(&format!(
            "<b>TripBuddy service payment</b>\n\
             Amount due: <b>{total} {currency}</b>\n\
             Breakdown: base price {base} + service fee {fee}\n\n\
             {details}\n\n\
             <i>After paying, tap “✅ I have paid” in the bot and send the receipt.</i>",
            total = self.format_total(),
            currency = self.currency,
            base = self.format_amount(self.base),
            fee = self.format_amount(self.fee),
            details = payment_details,
        ));
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn invoice(base: Decimal, fee: Decimal, currency: &str) -> Invoice {
        Invoice {
            target: 1,
            base,
            fee,
            currency: currency.into(),
            note: String::new(),
        }
    }

    #[test]
    fn zero_decimal_currencies_round_to_units() {
        let inv = invoice(dec!(1000.4), dec!(99.7), "RUB");
        assert_eq!(inv.total(), dec!(1100));
        assert_eq!(inv.format_total(), "1100");

        let inv = invoice(dec!(10.5), dec!(0), "GEL");
        // Banker's rounding, as the totals have always been computed.
        assert_eq!(inv.format_total(), "10");
    }

    #[test]
    fn other_currencies_keep_cents() {
        let inv = invoice(dec!(65000), dec!(500), "USD");
        assert_eq!(inv.total(), dec!(65500));
        assert_eq!(inv.format_total(), "65500.00");

        let inv = invoice(dec!(10.005), dec!(0.001), "EUR");
        assert_eq!(inv.format_total(), "10.01");
    }

    #[test]
    fn render_includes_breakdown_and_details() {
        let mut inv = invoice(dec!(65000), dec!(500), "USD");
        inv.note = "deposit <hotel>".into();
        let text = inv.render("Bank: Example Bank");

        assert!(text.starts_with("🧾 <b>Invoice</b>\ndeposit &lt;hotel&gt;\n\n"));
        assert!(text.contains("Amount due: <b>65500.00 USD</b>"));
        assert!(text.contains("base price 65000.00 + service fee 500.00"));
        assert!(text.contains("Bank: Example Bank"));
    }

    #[test]
    fn render_without_note() {
        let text = invoice(dec!(100), dec!(0), "RUB").render("x");
        assert!(text.starts_with("🧾 <b>Invoice</b>\n\n<b>TripBuddy"));
        assert!(text.contains("base price 100 + service fee 0"));
    }
}
