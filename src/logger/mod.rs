//! Global `tracing` subscriber with a reloadable filter.
//! See `bin/logger_demo.rs` for a binary that shows the reload in action.

mod logger;
pub use logger::*;

pub use tracing::{debug, error, info, trace, warn};
