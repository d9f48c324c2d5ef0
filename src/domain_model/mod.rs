mod cart;
mod client;
mod locale;
mod session;
mod shipping;
mod validation;

pub use cart::*;
pub use client::*;
pub use locale::*;
pub use session::*;
pub use shipping::*;
pub use validation::*;

#[cfg(test)]
pub(crate) use cart::fixtures;
