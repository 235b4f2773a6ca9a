//! Fatal errors of the preprocessor.
//!
//! Unresolvable references are not errors: they are reported to the
//! [`DiagnosticSink`](ditac_diagnostics::DiagnosticSink) and processing goes on.
//! The types here cover what aborts a document load, a profile load or the
//! whole run.

use ditac_diagnostics::{DiagnosticMessage, DiagnosticMessageBuilder, SourceLocation};
use ditac_dom::DomError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PreprocessError>;

/// A ditaval profile that cannot be used.
#[derive(Debug, Clone, Error)]
pub enum FilterError {
    #[error("`{name}` is not a ditaval profile")]
    NotADitaval {
        name: String,
        location: Option<SourceLocation>,
    },

    #[error("Unknown element `{name}` in ditaval profile")]
    UnknownElement {
        name: String,
        location: Option<SourceLocation>,
    },

    #[error("Missing attribute `{name}`")]
    MissingAttribute {
        name: String,
        location: Option<SourceLocation>,
    },

    #[error("Invalid value `{value}` for attribute `{name}`")]
    InvalidAttribute {
        value: String,
        name: String,
        location: Option<SourceLocation>,
    },

    #[error("Invalid color `{value}`")]
    InvalidColor {
        value: String,
        location: Option<SourceLocation>,
    },

    #[error("Invalid style `{value}`")]
    InvalidStyle {
        value: String,
        location: Option<SourceLocation>,
    },
}

impl FilterError {
    pub fn location(&self) -> Option<&SourceLocation> {
        match self {
            FilterError::NotADitaval { location, .. }
            | FilterError::UnknownElement { location, .. }
            | FilterError::MissingAttribute { location, .. }
            | FilterError::InvalidAttribute { location, .. }
            | FilterError::InvalidColor { location, .. }
            | FilterError::InvalidStyle { location, .. } => location.as_ref(),
        }
    }

    /// Convert this error to a DiagnosticMessage with a D-2-* code.
    pub fn to_diagnostic(&self) -> DiagnosticMessage {
        let builder = match self {
            FilterError::NotADitaval { .. } => DiagnosticMessageBuilder::error("Not a Ditaval Profile")
                .with_code("D-2-1")
                .problem(self.to_string())
                .add_hint("The root element of a ditaval profile is `<val>`"),
            FilterError::UnknownElement { .. } => {
                DiagnosticMessageBuilder::error("Unknown Ditaval Element")
                    .with_code("D-2-2")
                    .problem(self.to_string())
                    .add_hint("Only `prop`, `revprop` and `style-conflict` are allowed here")
            }
            FilterError::MissingAttribute { .. } => {
                DiagnosticMessageBuilder::error("Missing Ditaval Attribute")
                    .with_code("D-2-3")
                    .problem(self.to_string())
            }
            FilterError::InvalidAttribute { .. } => {
                DiagnosticMessageBuilder::error("Invalid Ditaval Attribute")
                    .with_code("D-2-4")
                    .problem(self.to_string())
            }
            FilterError::InvalidColor { .. } => DiagnosticMessageBuilder::error("Invalid Flag Color")
                .with_code("D-2-5")
                .problem(self.to_string())
                .add_hint("Use a named color such as `red` or a `#rrggbb` value"),
            FilterError::InvalidStyle { .. } => DiagnosticMessageBuilder::error("Invalid Flag Style")
                .with_code("D-2-6")
                .problem(self.to_string())
                .add_hint(
                    "Use one of underline, double-underline, overline, line-through, italics, bold",
                ),
        };
        builder.with_optional_location(self.location().cloned()).build()
    }
}

/// An error which aborts loading a document or the whole run.
#[derive(Debug, Clone, Error)]
pub enum PreprocessError {
    #[error(transparent)]
    Dom(#[from] DomError),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error("Cannot load `{url}`: {message}")]
    Load { url: String, message: String },

    #[error("`{url}` has unsupported document element `{root}`")]
    UnsupportedDocument { url: String, root: String },

    #[error("Invalid processing instruction `<?{target} {data}?>`")]
    InvalidKeyscopePi {
        target: String,
        data: String,
        location: Option<SourceLocation>,
    },

    #[error("Key space `{id}` has no keyscope")]
    MissingKeyscope {
        id: String,
        location: Option<SourceLocation>,
    },

    #[error("Unknown key space `{id}`")]
    UnknownKeySpace {
        id: String,
        location: Option<SourceLocation>,
    },

    #[error("Topic `{id}` not found in `{url}`")]
    TopicNotFound {
        id: String,
        url: String,
        location: Option<SourceLocation>,
    },

    #[error("`{url}` is not a map")]
    NotAMap { url: String },

    #[error("`{url}` is not a topic")]
    NotATopic {
        url: String,
        location: Option<SourceLocation>,
    },

    #[error("Map reference target `{href}` not found")]
    MaprefTargetNotFound {
        href: String,
        location: Option<SourceLocation>,
    },

    #[error("Cyclic map reference to `{url}`")]
    CyclicMapref {
        url: String,
        location: Option<SourceLocation>,
    },

    /// A stage was used out of order.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PreprocessError {
    pub fn load(url: impl ToString, message: impl ToString) -> Self {
        PreprocessError::Load {
            url: url.to_string(),
            message: message.to_string(),
        }
    }

    pub fn location(&self) -> Option<SourceLocation> {
        match self {
            PreprocessError::Dom(err) => err.location().cloned(),
            PreprocessError::Filter(err) => err.location().cloned(),
            PreprocessError::Load { url, .. }
            | PreprocessError::UnsupportedDocument { url, .. }
            | PreprocessError::NotAMap { url } => Some(SourceLocation::document(url.clone())),
            PreprocessError::InvalidKeyscopePi { location, .. }
            | PreprocessError::MissingKeyscope { location, .. }
            | PreprocessError::UnknownKeySpace { location, .. }
            | PreprocessError::TopicNotFound { location, .. }
            | PreprocessError::NotATopic { location, .. }
            | PreprocessError::MaprefTargetNotFound { location, .. }
            | PreprocessError::CyclicMapref { location, .. } => location.clone(),
            PreprocessError::Internal(_) => None,
        }
    }

    /// Convert this error to a DiagnosticMessage.
    pub fn to_diagnostic(&self) -> DiagnosticMessage {
        let builder = match self {
            PreprocessError::Dom(err) => return err.to_diagnostic(),
            PreprocessError::Filter(err) => return err.to_diagnostic(),
            PreprocessError::Load { message, .. } => {
                DiagnosticMessageBuilder::error("Cannot Load Document")
                    .with_code("D-4-1")
                    .problem(message.clone())
            }
            PreprocessError::UnsupportedDocument { .. } => {
                DiagnosticMessageBuilder::error("Unsupported Document Type")
                    .with_code("D-4-2")
                    .problem(self.to_string())
                    .add_hint("Inputs must be maps, bookmaps, topics or `<dita>` documents")
            }
            PreprocessError::InvalidKeyscopePi { .. } => {
                DiagnosticMessageBuilder::error("Invalid Key Scope Marker")
                    .with_code("D-3-5")
                    .problem(self.to_string())
            }
            PreprocessError::MissingKeyscope { .. } => DiagnosticMessageBuilder::error("Missing Keyscope")
                .with_code("D-3-7")
                .problem(self.to_string()),
            PreprocessError::UnknownKeySpace { .. } => {
                DiagnosticMessageBuilder::error("Unknown Key Space")
                    .with_code("D-3-6")
                    .problem(self.to_string())
            }
            PreprocessError::TopicNotFound { .. } => DiagnosticMessageBuilder::error("Topic Not Found")
                .with_code("D-4-5")
                .problem(self.to_string()),
            PreprocessError::NotAMap { .. } => DiagnosticMessageBuilder::error("Not a Map")
                .with_code("D-5-1")
                .problem(self.to_string()),
            PreprocessError::NotATopic { .. } => DiagnosticMessageBuilder::error("Not a Topic")
                .with_code("D-4-9")
                .problem(self.to_string())
                .add_hint("A topicref with `format=\"dita\"` must point to a topic or a `<dita>` document"),
            PreprocessError::MaprefTargetNotFound { .. } => {
                DiagnosticMessageBuilder::error("Map Reference Target Not Found")
                    .with_code("D-5-2")
                    .problem(self.to_string())
            }
            PreprocessError::CyclicMapref { .. } => DiagnosticMessageBuilder::error("Cyclic Map Reference")
                .with_code("D-5-3")
                .problem(self.to_string())
                .add_hint("A map must not include itself, directly or through other maps"),
            PreprocessError::Internal(message) => DiagnosticMessageBuilder::error("Internal Error")
                .with_code("D-0-1")
                .problem(message.clone()),
        };
        builder.with_optional_location(self.location()).build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_error_diagnostic() {
        let err = FilterError::InvalidColor {
            value: "mauve".into(),
            location: Some(SourceLocation::new("file:///p.ditaval", 4, 3)),
        };
        let diag = err.to_diagnostic();
        assert_eq!(diag.code.as_deref(), Some("D-2-5"));
        assert_eq!(diag.location.and_then(|l| l.line), Some(4));
    }

    #[test]
    fn test_dom_error_keeps_its_code() {
        let err = PreprocessError::from(DomError::EmptyDocument { uri: None });
        assert_eq!(err.to_diagnostic().code.as_deref(), Some("D-1-4"));
    }

    #[test]
    fn test_load_error_points_at_document() {
        let err = PreprocessError::load("file:///a.dita", "no such file");
        assert_eq!(err.to_string(), "Cannot load `file:///a.dita`: no such file");
        let location = err.location().unwrap();
        assert_eq!(location.uri.as_deref(), Some("file:///a.dita"));
    }
}
