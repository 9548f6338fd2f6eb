//! The bundle pipeline.
//!
//! ```text
//! runtime -> stage -> analyze (graph, prune) -> optimize -> freeze
//!         -> launcher -> platform (package) -> promote
//! ```
//!
//! [`Bundler`] runs the stages in that order over a staging tree laid out by
//! [`BundleLayout`]. Each stage is also usable on its own.

pub mod analyze;
pub mod builder;
pub mod deps;
pub mod error;
pub mod freeze;
pub mod launcher;
pub mod layout;
pub mod optimize;
pub mod platform;
pub mod runtime;
pub mod settings;
pub mod stage;
pub mod utils;

pub use builder::{BuildReport, Bundler};
pub use error::{Error, Result};
pub use layout::BundleLayout;
pub use platform::BundleArtifact;
pub use runtime::RuntimeDescriptor;
pub use settings::{BuildContext, BuildContextBuilder, EntryPoint, OutputFormat, Toggles};
