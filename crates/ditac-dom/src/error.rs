//! Error types for document parsing and serialization.

use ditac_diagnostics::{DiagnosticMessage, DiagnosticMessageBuilder, SourceLocation};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DomError>;

#[derive(Debug, Clone, Error)]
pub enum DomError {
    /// XML syntax error reported by quick-xml.
    #[error("XML syntax error: {message}")]
    XmlSyntax {
        message: String,
        location: Option<SourceLocation>,
    },

    #[error("Unexpected end of input, expected {expected}")]
    UnexpectedEof {
        expected: String,
        location: Option<SourceLocation>,
    },

    #[error("Mismatched end tag: expected </{expected}>, found </{found}>")]
    MismatchedEndTag {
        expected: String,
        found: String,
        location: Option<SourceLocation>,
    },

    #[error("Empty XML document: no root element found")]
    EmptyDocument { uri: Option<String> },

    #[error("Invalid XML: multiple root elements")]
    MultipleRoots { location: Option<SourceLocation> },

    #[error("Namespace prefix `{prefix}` is not bound")]
    UnboundPrefix {
        prefix: String,
        location: Option<SourceLocation>,
    },

    #[error("Cannot read `{uri}`: {message}")]
    Read { uri: String, message: String },

    #[error("Cannot serialize document: {0}")]
    Write(String),
}

impl DomError {
    pub fn location(&self) -> Option<&SourceLocation> {
        match self {
            DomError::XmlSyntax { location, .. }
            | DomError::UnexpectedEof { location, .. }
            | DomError::MismatchedEndTag { location, .. }
            | DomError::MultipleRoots { location }
            | DomError::UnboundPrefix { location, .. } => location.as_ref(),
            DomError::EmptyDocument { .. } | DomError::Read { .. } | DomError::Write(_) => None,
        }
    }

    /// Convert this error to a DiagnosticMessage with a D-1-* code.
    pub fn to_diagnostic(&self) -> DiagnosticMessage {
        let builder = match self {
            DomError::XmlSyntax { message, .. } => {
                DiagnosticMessageBuilder::error("XML Syntax Error")
                    .with_code("D-1-1")
                    .problem(message.clone())
            }
            DomError::UnexpectedEof { expected, .. } => {
                DiagnosticMessageBuilder::error("Unexpected End of XML Input")
                    .with_code("D-1-2")
                    .problem(format!(
                        "The XML document ended unexpectedly; expected {}",
                        expected
                    ))
            }
            DomError::MismatchedEndTag {
                expected, found, ..
            } => DiagnosticMessageBuilder::error("Mismatched XML End Tag")
                .with_code("D-1-3")
                .problem(format!(
                    "End tag </{}> does not match start tag <{}>",
                    found, expected
                ))
                .add_hint("Check that all opening tags have matching closing tags?"),
            DomError::EmptyDocument { uri } => {
                let builder = DiagnosticMessageBuilder::error("Empty XML Document")
                    .with_code("D-1-4")
                    .problem("The XML document contains no root element");
                match uri {
                    Some(uri) => builder.with_location(SourceLocation::document(uri.clone())),
                    None => builder,
                }
            }
            DomError::MultipleRoots { .. } => {
                DiagnosticMessageBuilder::error("Multiple XML Root Elements")
                    .with_code("D-1-5")
                    .problem("The XML document contains multiple root elements")
                    .add_hint("Wrap multiple elements in a single container element?")
            }
            DomError::UnboundPrefix { prefix, .. } => {
                DiagnosticMessageBuilder::error("Unbound Namespace Prefix")
                    .with_code("D-1-6")
                    .problem(format!("Prefix `{}` has no namespace declaration", prefix))
                    .add_hint(format!("Declare it with xmlns:{}=\"...\"?", prefix))
            }
            DomError::Read { uri, message } => DiagnosticMessageBuilder::error("Cannot Read Document")
                .with_code("D-1-7")
                .problem(message.clone())
                .with_location(SourceLocation::document(uri.clone())),
            DomError::Write(message) => DiagnosticMessageBuilder::error("Internal Error")
                .with_code("D-0-1")
                .problem(message.clone()),
        };
        match self.location() {
            Some(location) => builder.with_location(location.clone()).build(),
            None => builder.build(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mismatched_tag_diagnostic() {
        let err = DomError::MismatchedEndTag {
            expected: "topic".into(),
            found: "title".into(),
            location: Some(SourceLocation::new("file:///a.dita", 3, 1)),
        };
        let diag = err.to_diagnostic();
        assert_eq!(diag.code.as_deref(), Some("D-1-3"));
        assert_eq!(diag.location.and_then(|l| l.line), Some(3));
    }

    #[test]
    fn test_display() {
        let err = DomError::UnboundPrefix {
            prefix: "ditac".into(),
            location: None,
        };
        assert_eq!(err.to_string(), "Namespace prefix `ditac` is not bound");
    }
}
