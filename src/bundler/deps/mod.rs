//! Installed dependency distributions.
//!
//! - [`DistributionIndex`] enumerates the distributions installed in a
//!   `site-packages` directory and maps top-level modules to their owners.
//! - [`Installer`] is the seam to the external dependency installer.

pub(crate) mod index;
mod installer;

pub use index::{Distribution, DistributionIndex, EntryPointRecord, UNKNOWN_VERSION};
pub use installer::{Installer, PipInstaller};

/// PEP 503 name normalization: lowercase, runs of `-`, `_` and `.` become `-`.
///
/// ```
/// use shrinkwrap::bundler::deps::normalize_name;
///
/// assert_eq!(normalize_name("Typing_Extensions"), "typing-extensions");
/// assert_eq!(normalize_name("zope.interface"), "zope-interface");
/// ```
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_separator = false;
    for c in name.trim().chars() {
        if matches!(c, '-' | '_' | '.') {
            if !in_separator {
                out.push('-');
            }
            in_separator = true;
        } else {
            out.extend(c.to_lowercase());
            in_separator = false;
        }
    }
    out
}
