//! steptrace common library
//!
//! Raw instrumentation events, the reconstructed test/step model and the
//! error type shared by the steptrace crates.

pub mod error;
pub mod event;
pub mod types;

pub use error::{Error, Result};
pub use event::{CommandInfo, EventKind, RawEvent, StepPayload, Timestamp};
pub use types::*;

/// steptrace version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
