//! Types shared between vboxkit crates.

pub mod errors;

pub use errors::{VboxError, VboxResult};
