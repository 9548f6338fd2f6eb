//! Build orchestration.
//!
//! - [`checksum`] - SHA-256 of file and directory artifacts
//! - [`lock`] - advisory lock on the output path
//! - [`orchestrator`] - the [`Bundler`] that runs every stage in order
//! - [`tool_detection`] - cached lookup of external tools

pub mod checksum;
pub mod lock;
mod orchestrator;
pub mod tool_detection;

pub use orchestrator::{BuildReport, Bundler, promote};
