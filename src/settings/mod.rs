//! Settings are read from TOML and overridden by `STOREFRONT__*` variables.
//! See `bin/settings_demo.rs` for a binary that prints the merged result.

mod cli;
pub use clap::Parser;
pub use cli::*;

mod settings;
pub use settings::*;
