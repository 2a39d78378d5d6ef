//! Retirement returns for NPS and index fund investments.

use super::financial::{
    Instrument, compound_interest, group_savings_by_k, inflation_adjusted, investment_years,
    nps_tax_benefit, round2,
};
use super::schema::{KPeriod, ReturnsRequest, ReturnsResponse, Transaction};
use super::transactions::apply_rules;

/// Saver profile the returns are projected for.
#[derive(Debug, Clone, Copy)]
pub struct Investor {
    pub age: i64,
    /// Monthly wage.
    pub wage: f64,
    pub inflation: f64,
}

impl Investor {
    pub fn annual_wage(&self) -> f64 {
        self.wage * 12.0
    }
}

/// Project the inflation-adjusted profit of each k bucket.
///
/// Totals cover every given transaction. Empty buckets keep zero profits.
pub fn compute_returns(
    transactions: &[Transaction],
    k_periods: &[KPeriod],
    investor: Investor,
    instrument: Instrument,
) -> ReturnsResponse {
    let total_amount: f64 = transactions.iter().map(|t| t.amount).sum();
    let total_ceiling: f64 = transactions.iter().map(|t| t.ceiling).sum();

    let years = investment_years(investor.age);
    let mut savings = group_savings_by_k(transactions, k_periods);

    for bucket in savings.iter_mut().filter(|s| s.amount > 0.0) {
        let future_value = compound_interest(bucket.amount, instrument.rate(), years);
        let real_value = inflation_adjusted(future_value, investor.inflation, years);
        bucket.profits = round2(real_value - bucket.amount);
        if instrument.has_tax_benefit() {
            bucket.tax_benefit = round2(nps_tax_benefit(bucket.amount, investor.annual_wage()));
        }
    }

    ReturnsResponse {
        transactions_total_amount: round2(total_amount),
        transactions_total_ceiling: round2(total_ceiling),
        savings_by_dates: savings,
    }
}

/// Filter the request's transactions and compute returns on the survivors.
///
/// Transactions with unparseable dates are dropped silently.
pub fn process_returns(request: &ReturnsRequest, instrument: Instrument) -> ReturnsResponse {
    let filtered = apply_rules(&request.transactions, &request.q, &request.p);
    tracing::debug!(
        instrument = instrument.as_str(),
        accepted = filtered.valid.len(),
        dropped = filtered.invalid.len(),
        "filtered transactions for returns"
    );
    compute_returns(
        &filtered.valid,
        &request.k,
        Investor {
            age: request.age,
            wage: request.wage,
            inflation: request.inflation,
        },
        instrument,
    )
}
