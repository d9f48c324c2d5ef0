mod cart_service;
mod envelope;
mod error;
mod rate_limiter;
mod session_service;

pub use cart_service::*;
pub use envelope::*;
pub use error::*;
pub use rate_limiter::*;
pub use session_service::*;
