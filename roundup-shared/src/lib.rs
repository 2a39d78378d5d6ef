//! Types shared between the Roundup service, its build tooling and tests.

pub mod constants;
pub mod errors;

pub use errors::{RoundupError, RoundupResult};
