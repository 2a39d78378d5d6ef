//! Savings engine: round-ups, validation, temporal rules and returns.

pub mod calculate;
pub mod financial;
pub mod returns;
pub mod schema;
pub mod temporal;
pub mod transactions;

pub use calculate::calculate;
pub use financial::Instrument;
pub use returns::{Investor, compute_returns, process_returns};
pub use transactions::{filter_transactions, parse_expenses, validate_transactions};
