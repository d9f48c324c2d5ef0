mod cart_batch;
mod cart_store;
mod rate_limiter_impl;
mod response_cache;
mod session_manager;
mod session_registry;

pub use cart_batch::*;
pub use cart_store::*;
pub use rate_limiter_impl::*;
pub use response_cache::*;
pub use session_manager::*;
pub use session_registry::*;
