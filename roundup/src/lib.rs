//! Roundup: automated micro-savings for retirement.
//!
//! Expenses are rounded up to the next multiple of 100 and the remanent is
//! invested in NPS or an index fund. The crate holds the savings engine, the
//! HTTP service exposing it, and the two-stage builder that packages the
//! service into a runnable image.

pub mod deploy;
pub mod jobs;
pub mod metrics;
pub mod pipeline;
pub mod runtime;
pub mod savings;
pub mod server;
pub mod util;

pub use roundup_shared::{RoundupError, RoundupResult};
pub use runtime::ServerOptions;
pub use server::Server;
