mod error;
mod handler;
mod router;

pub use error::{ApiRejection, envelope_reply, recover_error};
pub use handler::{Admission, LoginRequest, LoginResponse, SessionContext};
pub use router::routes;
