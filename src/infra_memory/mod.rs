mod clock_manual;
mod storefront_backend_memory;

pub use clock_manual::*;
pub use storefront_backend_memory::*;
