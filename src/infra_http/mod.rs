mod fetch;
mod response;
mod storefront_backend_http;

pub use fetch::*;
pub use response::*;
pub use storefront_backend_http::*;
