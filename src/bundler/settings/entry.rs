//! Entry point references (`module:attribute`).

use crate::bundler::{Error, Result};
use std::fmt;

/// Reference to the application object the server loads.
///
/// # Examples
///
/// ```
/// use shrinkwrap::bundler::EntryPoint;
///
/// let entry: EntryPoint = "app.main:app".parse().unwrap();
/// assert_eq!(entry.module(), "app.main");
/// assert_eq!(entry.attribute(), "app");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    module: String,
    attribute: String,
}

impl EntryPoint {
    /// Dotted module path.
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Attribute holding the application object.
    pub fn attribute(&self) -> &str {
        &self.attribute
    }
}

impl std::str::FromStr for EntryPoint {
    type Err = Error;

    fn from_str(entry: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidEntryPoint {
            entry: entry.to_string(),
            reason: reason.to_string(),
        };

        let (module, attribute) = entry
            .split_once(':')
            .ok_or_else(|| invalid("expected the form 'module:attribute'"))?;

        if module.is_empty() || attribute.is_empty() {
            return Err(invalid("both module and attribute are required"));
        }

        if !module.split('.').all(is_identifier) {
            return Err(invalid("module path is not a dotted identifier"));
        }

        // uvicorn accepts `module:factory.attr` chains
        if !attribute.split('.').all(is_identifier) {
            return Err(invalid("attribute is not an identifier"));
        }

        Ok(Self {
            module: module.to_string(),
            attribute: attribute.to_string(),
        })
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module, self.attribute)
    }
}

/// True if `name` is a Python identifier (ASCII subset).
pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_alphanumeric())
}
