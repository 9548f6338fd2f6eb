//! Configuration structures for one bundle build.
//!
//! [`BuildContext`] is the immutable configuration of a single invocation,
//! constructed and validated by [`BuildContextBuilder`].

mod builder;
mod core;
mod entry;
mod format;

pub use builder::BuildContextBuilder;
pub use core::{BuildContext, Toggles};
pub use entry::EntryPoint;
pub(crate) use entry::is_identifier;
pub use format::OutputFormat;

/// Packages force-kept by default because the launcher runs them without the
/// application importing them.
pub const DEFAULT_SERVER_PACKAGES: &[&str] = &["uvicorn"];
