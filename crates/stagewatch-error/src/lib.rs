//! # stagewatch-error
//!
//! Unified error handling for stagewatch.
//!
//! ## Design Philosophy
//!
//! - **ErrorKind**: Know what went wrong (e.g. StageFailed, OperationFailed, Timeout)
//! - **ErrorStatus**: Decide how to handle it (Permanent, Temporary, Persistent)
//! - **Error Context**: Carry the stage key, the condition, the wait budget
//! - **Error Source**: Wrap underlying IO / parse errors without leaking raw types
//!
//! ## Usage
//!
//! ```rust
//! use stagewatch_error::{Error, ErrorKind};
//!
//! fn example() -> Result<(), Error> {
//!     Err(Error::new(ErrorKind::OperationFailed, "quota exceeded")
//!         .with_operation("poller::poll")
//!         .with_context("condition", "Ready"))
//! }
//! ```
//!
//! ## Principles
//!
//! - All functions return `Result<T, stagewatch_error::Error>`
//! - External errors are wrapped with `set_source(err)`
//! - Same error handled once, subsequent ops only append context

mod error;
mod kind;
mod status;

pub use error::Error;
pub use kind::ErrorKind;
pub use status::ErrorStatus;

/// Result type alias using stagewatch Error
pub type Result<T> = std::result::Result<T, Error>;
