//! Source locations attached to diagnostics.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A position in a source document (1-based line and column).
///
/// Every field is optional: nodes synthesized during preprocessing have no
/// line information, and standalone fragments have no document URI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    /// Absolute URI of the document, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    /// Line number (1-based)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    /// Column number (1-based, in characters)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<usize>,
}

impl SourceLocation {
    pub fn new(uri: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            uri: Some(uri.into()),
            line: Some(line),
            column: Some(column),
        }
    }

    /// A location that only names a document.
    pub fn document(uri: impl Into<String>) -> Self {
        Self {
            uri: Some(uri.into()),
            line: None,
            column: None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.uri.is_none() && self.line.is_none()
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unknown() {
            return write!(f, "unknown location");
        }
        write!(f, "{}", self.uri.as_deref().unwrap_or("?"))?;
        if let Some(line) = self.line {
            write!(f, ":{}", line)?;
            if let Some(column) = self.column {
                write!(f, ":{}", column)?;
            }
        }
        Ok(())
    }
}
