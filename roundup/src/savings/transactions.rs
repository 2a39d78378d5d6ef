//! Round-up parsing, validation and temporal filtering of transactions.

use std::collections::HashSet;

use super::schema::{
    Expense, FilterRequest, InvalidTransaction, PPeriod, QPeriod, Transaction, ValidationResponse,
};
use super::temporal::TemporalRules;

/// Expenses are rounded up to the next multiple of this.
pub const ROUND_UP_UNIT: f64 = 100.0;

/// Amounts at or above this are rejected.
pub const MAX_TRANSACTION_AMOUNT: f64 = 500_000.0;

pub const NEGATIVE_AMOUNT_MESSAGE: &str = "Negative amount not allowed";
pub const EXCEEDS_LIMIT_MESSAGE: &str = "Exceeds max limit";
pub const DUPLICATE_DATE_MESSAGE: &str = "Duplicate date";

/// Round one expense up to the next hundred.
///
/// Exact multiples still round up a full unit (250 → 300, 300 → 400); a zero
/// expense saves nothing.
pub fn round_up(expense: &Expense) -> Transaction {
    let amount = expense.amount;
    let (ceiling, remanent) = if amount == 0.0 {
        (0.0, 0.0)
    } else {
        let ceiling = (amount / ROUND_UP_UNIT).floor() * ROUND_UP_UNIT + ROUND_UP_UNIT;
        (ceiling, ceiling - amount)
    };
    Transaction {
        date: expense.date.clone(),
        amount,
        ceiling,
        remanent,
    }
}

pub fn parse_expenses(expenses: &[Expense]) -> Vec<Transaction> {
    expenses.iter().map(round_up).collect()
}

/// Split transactions into valid and invalid ones, in input order.
///
/// Only dates of previously accepted transactions count as duplicates.
pub fn validate_transactions(transactions: Vec<Transaction>) -> ValidationResponse {
    let mut seen_dates: HashSet<String> = HashSet::with_capacity(transactions.len());
    let mut response = ValidationResponse::default();

    for t in transactions {
        let fault = if t.amount < 0.0 {
            Some(NEGATIVE_AMOUNT_MESSAGE)
        } else if t.amount >= MAX_TRANSACTION_AMOUNT {
            Some(EXCEEDS_LIMIT_MESSAGE)
        } else if seen_dates.contains(&t.date) {
            Some(DUPLICATE_DATE_MESSAGE)
        } else {
            None
        };

        match fault {
            Some(message) => response
                .invalid
                .push(InvalidTransaction::rejected(&t, message)),
            None => {
                seen_dates.insert(t.date.clone());
                response.valid.push(t);
            }
        }
    }

    response
}

/// Apply q/p rules to every transaction; unparseable dates are rejected.
pub fn apply_rules(
    transactions: &[Transaction],
    q: &[QPeriod],
    p: &[PPeriod],
) -> ValidationResponse {
    let rules = TemporalRules::new(q, p);
    let mut response = ValidationResponse::default();
    for t in transactions {
        match rules.apply(t) {
            Ok(updated) => response.valid.push(updated),
            Err(message) => response
                .invalid
                .push(InvalidTransaction::rejected(t, message)),
        }
    }
    response
}

pub fn filter_transactions(request: &FilterRequest) -> ValidationResponse {
    apply_rules(&request.transactions, &request.q, &request.p)
}
