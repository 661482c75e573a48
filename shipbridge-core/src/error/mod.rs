//! Error taxonomy and failure classification
//!
//! Everything that goes wrong while talking to an external provider is
//! funneled through this module: raw transport failures and non-2xx
//! responses are classified once into a [`ClassifiedError`] carrying a kind
//! from the closed taxonomy, a transport status, and structured diagnostic
//! details. The retry executor and circuit breaker branch only on the kind;
//! the details exist for humans and the error collector.

pub mod classify;
pub mod types;

pub use classify::{classify, Failure};
pub use types::{ClassifiedError, ErrorDetails, ErrorKind, Result};
