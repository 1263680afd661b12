//! Pure data types for skiff: values, deferred values and the evaluation contract.
//!
//! This crate is a leaf dependency with no parser and no I/O. The only
//! runtime piece it touches is `tokio::sync::watch`, which backs the
//! deferred-value capability and works on any executor.

pub mod deferred;
pub mod error;
pub mod request;
pub mod value;

// Flat re-exports for convenience
pub use deferred::*;
pub use error::*;
pub use request::*;
pub use value::*;
