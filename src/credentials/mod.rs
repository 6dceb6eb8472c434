//! Clone transport selection and credential handling for upstream URLs.

pub mod transport;

pub use transport::{redact, CloneTransport};
