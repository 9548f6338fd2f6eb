//! Static analysis of the application.
//!
//! - [`imports`] extracts import statements from source text.
//! - [`graph`] builds the module reachability graph.
//! - [`prune`] maps reachability to distributions and deletes the rest.
//! - [`entry`] checks the entry reference without running it.

pub mod entry;
pub mod graph;
pub mod imports;
pub mod prune;

pub use entry::{Binding, EntryReport, inspect_entry};
pub use graph::{ImportGraph, ModuleNode, ModuleOrigin, SearchRoots};
pub use imports::{ImportRecord, extract_imports};
pub use prune::{PrunePlan, PruneReport, RemovedDistribution};
