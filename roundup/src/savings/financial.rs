//! Investment, inflation and income tax formulas.

use super::schema::{KPeriod, SavingsByDate, Transaction};
use super::temporal::{Window, parse_date};

/// Annual return of the National Pension Scheme.
pub const NPS_RATE: f64 = 0.0711;

/// Annual return of the index fund.
pub const INDEX_RATE: f64 = 0.1449;

/// Retirement age the investment horizon is measured against.
pub const RETIREMENT_AGE: i64 = 60;

/// Horizon used for savers already at or past retirement age.
pub const MIN_INVESTMENT_YEARS: i64 = 5;

/// Upper bound of the NPS deduction, in rupees.
pub const NPS_DEDUCTION_CAP: f64 = 200_000.0;

/// Share of annual income deductible through NPS.
pub const NPS_DEDUCTION_WAGE_SHARE: f64 = 0.10;

/// Marginal slabs as (lower bound, rate), highest first.
const TAX_SLABS: [(f64, f64); 4] = [
    (1_500_000.0, 0.30),
    (1_200_000.0, 0.20),
    (1_000_000.0, 0.15),
    (700_000.0, 0.10),
];

/// Where the savings of a request are invested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instrument {
    Nps,
    IndexFund,
}

impl Instrument {
    pub fn rate(self) -> f64 {
        match self {
            Instrument::Nps => NPS_RATE,
            Instrument::IndexFund => INDEX_RATE,
        }
    }

    /// Only NPS contributions are tax deductible.
    pub fn has_tax_benefit(self) -> bool {
        matches!(self, Instrument::Nps)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Instrument::Nps => "nps",
            Instrument::IndexFund => "index",
        }
    }
}

pub fn investment_years(age: i64) -> i64 {
    if age < RETIREMENT_AGE {
        RETIREMENT_AGE.saturating_sub(age)
    } else {
        MIN_INVESTMENT_YEARS
    }
}

/// `A = P (1 + r)^t`
pub fn compound_interest(principal: f64, rate: f64, years: i64) -> f64 {
    principal * (1.0 + rate).powf(years as f64)
}

/// `A_real = A / (1 + inflation)^t`
pub fn inflation_adjusted(amount: f64, inflation: f64, years: i64) -> f64 {
    amount / (1.0 + inflation).powf(years as f64)
}

pub fn income_tax(income: f64) -> f64 {
    let mut remaining = income;
    let mut tax = 0.0;
    for (floor, rate) in TAX_SLABS {
        if remaining > floor {
            tax += (remaining - floor) * rate;
            remaining = floor;
        }
    }
    tax
}

/// Tax saved by deducting an NPS contribution from the annual wage.
pub fn nps_tax_benefit(invested: f64, annual_wage: f64) -> f64 {
    let deduction = invested
        .min(annual_wage * NPS_DEDUCTION_WAGE_SHARE)
        .min(NPS_DEDUCTION_CAP);
    income_tax(annual_wage) - income_tax((annual_wage - deduction).max(0.0))
}

/// Round to two decimals from the exact binary value, ties to even.
///
/// `0.125` is exact in binary and rounds to `0.12`; `2.675` is stored just
/// below the tie and rounds to `2.67`.
pub fn round2(value: f64) -> f64 {
    format!("{value:.2}").parse().unwrap_or(value)
}

/// Sum remanents into one bucket per k period, in request order.
///
/// A transaction inside several k periods counts towards each of them.
/// Profits and tax benefit are left at zero for the caller to fill.
pub fn group_savings_by_k(transactions: &[Transaction], k_periods: &[KPeriod]) -> Vec<SavingsByDate> {
    let dated: Vec<_> = transactions
        .iter()
        .filter_map(|t| parse_date(&t.date).map(|at| (at, t.remanent)))
        .collect();

    k_periods
        .iter()
        .map(|k| {
            let amount: f64 = match Window::parse(&k.start, &k.end) {
                Some(window) => dated
                    .iter()
                    .filter(|(at, _)| window.contains(*at))
                    .map(|(_, remanent)| remanent)
                    .sum(),
                None => 0.0,
            };
            SavingsByDate {
                start: k.start.clone(),
                end: k.end.clone(),
                amount,
                profits: 0.0,
                tax_benefit: 0.0,
            }
        })
        .collect()
}
