//! Type definitions for revtrack

mod error;
mod link;
mod revenue;

pub use error::*;
pub use link::*;
pub use revenue::*;

/// Currency assumed when the analytics source omits one
pub const DEFAULT_CURRENCY: &str = "USD";
