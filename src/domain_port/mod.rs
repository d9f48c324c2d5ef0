// backend

mod auth_backend;
mod cart_backend;

pub use auth_backend::*;
pub use cart_backend::*;

// time

mod clock;

pub use clock::*;
