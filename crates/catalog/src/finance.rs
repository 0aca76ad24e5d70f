//! Repayment and comparison rate calculations
//!
//! Amounts are dollars, rates are annual percentages, terms are months.

use loan_agent_config::constants::matching;

/// Amortized monthly repayment, rounded to cents
///
/// `EMI = L·r(1+r)^n / ((1+r)^n − 1)` with `r = rate / 1200`. A zero rate
/// repays the principal evenly. Returns `None` for a non-positive amount
/// or a zero term.
pub fn monthly_payment(amount: f64, annual_rate_percent: f64, term_months: u32) -> Option<f64> {
    if amount <= 0.0 || term_months == 0 || !amount.is_finite() {
        return None;
    }

    let n = term_months as f64;
    let r = annual_rate_percent / 1200.0;
    if r <= 0.0 {
        return Some(round2(amount / n));
    }

    let growth = (1.0 + r).powf(n);
    Some(round2(amount * r * growth / (growth - 1.0)))
}

/// Comparison rate including fees, rounded to 2 dp
///
/// Spreads one-off fees and the monthly fees over the term as an annual
/// percentage of the loan amount. Missing amounts or terms fall back to
/// the reference values.
pub fn comparison_rate(
    annual_rate_percent: f64,
    fixed_fees: f64,
    monthly_fees: f64,
    amount: Option<f64>,
    term_months: Option<u32>,
) -> f64 {
    let amount = amount
        .filter(|a| *a > 0.0)
        .unwrap_or(matching::REFERENCE_LOAN_AMOUNT);
    let n = term_months
        .filter(|t| *t > 0)
        .unwrap_or(matching::REFERENCE_TERM_MONTHS) as f64;

    let total_fees = fixed_fees + monthly_fees * n;
    let years = n / 12.0;
    round2(annual_rate_percent + (total_fees / amount) / years * 100.0)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monthly_payment() {
        let payment = monthly_payment(50_000.0, 7.0, 60).unwrap();
        assert!((payment - 990.06).abs() < 0.01, "payment was {}", payment);

        let payment = monthly_payment(100_000.0, 12.0, 12).unwrap();
        assert!((payment - 8884.88).abs() < 0.01, "payment was {}", payment);
    }

    #[test]
    fn test_zero_rate() {
        assert_eq!(monthly_payment(12_000.0, 0.0, 12), Some(1000.0));
    }

    #[test]
    fn test_missing_inputs() {
        assert_eq!(monthly_payment(0.0, 7.0, 60), None);
        assert_eq!(monthly_payment(50_000.0, 7.0, 0), None);
    }

    #[test]
    fn test_comparison_rate_reference_values() {
        // $600 over 5 years on $30k adds 0.4% a year
        assert_eq!(comparison_rate(6.5, 600.0, 0.0, None, None), 6.9);
        // $10/month over 60 months is another $600
        assert_eq!(comparison_rate(6.5, 0.0, 10.0, None, None), 6.9);
        assert_eq!(comparison_rate(6.5, 0.0, 0.0, Some(50_000.0), Some(36)), 6.5);
    }

    #[test]
    fn test_comparison_rate_with_amount_and_term() {
        // $500 over 2 years on $10k adds 2.5% a year
        assert_eq!(comparison_rate(8.0, 500.0, 0.0, Some(10_000.0), Some(24)), 10.5);
    }
}
