//! Request data model and fingerprinting.

mod fingerprint;
mod types;

pub use fingerprint::Fingerprint;
pub use types::{Request, RequestBuilder};
