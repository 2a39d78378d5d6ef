//! Process-level setup shared by the binaries: options and logging.

pub mod logging;
pub mod options;

pub use logging::{LoggingGuard, init_logging};
pub use options::ServerOptions;
