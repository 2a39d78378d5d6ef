//! Date parsing and the q/p/k period rules.

use chrono::NaiveDateTime;

use super::schema::{PPeriod, QPeriod, Transaction};

pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const INVALID_DATE_MESSAGE: &str = "Invalid date format";

pub fn parse_date(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, DATE_FORMAT).ok()
}

/// Inclusive date window with both bounds already parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Window {
    /// `None` when either bound is unparseable; such periods never match.
    pub fn parse(start: &str, end: &str) -> Option<Self> {
        Some(Self {
            start: parse_date(start)?,
            end: parse_date(end)?,
        })
    }

    pub fn contains(&self, at: NaiveDateTime) -> bool {
        self.start <= at && at <= self.end
    }
}

/// q and p periods parsed once and applied to many transactions.
///
/// Among several matching q periods the one starting latest wins; equal
/// starts go to the one listed first. p extras are added after the q
/// override.
pub struct TemporalRules {
    q: Vec<(Window, f64)>,
    p: Vec<(Window, f64)>,
}

impl TemporalRules {
    pub fn new(q_periods: &[QPeriod], p_periods: &[PPeriod]) -> Self {
        Self {
            q: q_periods
                .iter()
                .filter_map(|q| Window::parse(&q.start, &q.end).map(|w| (w, q.fixed)))
                .collect(),
            p: p_periods
                .iter()
                .filter_map(|p| Window::parse(&p.start, &p.end).map(|w| (w, p.extra)))
                .collect(),
        }
    }

    /// Returns the updated transaction, or the rejection message when the
    /// transaction's own date cannot be parsed.
    pub fn apply(&self, transaction: &Transaction) -> Result<Transaction, &'static str> {
        let Some(at) = parse_date(&transaction.date) else {
            return Err(INVALID_DATE_MESSAGE);
        };

        let mut updated = transaction.clone();

        let mut chosen: Option<(NaiveDateTime, f64)> = None;
        for (window, fixed) in &self.q {
            if !window.contains(at) {
                continue;
            }
            // strictly later start replaces; ties keep the earlier entry
            if chosen.is_none_or(|(best, _)| window.start > best) {
                chosen = Some((window.start, *fixed));
            }
        }
        if let Some((_, fixed)) = chosen {
            updated.remanent = fixed;
        }

        let extra: f64 = self
            .p
            .iter()
            .filter(|(window, _)| window.contains(at))
            .map(|(_, extra)| extra)
            .sum();
        updated.remanent += extra;

        Ok(updated)
    }
}

/// Apply the q (override) and p (extra) rules to one transaction.
pub fn apply_temporal_rules(
    transaction: &Transaction,
    q_periods: &[QPeriod],
    p_periods: &[PPeriod],
) -> Result<Transaction, &'static str> {
    TemporalRules::new(q_periods, p_periods).apply(transaction)
}
