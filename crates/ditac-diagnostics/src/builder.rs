//! Builder API for diagnostic messages.

use crate::{DetailItem, DetailKind, DiagnosticKind, DiagnosticMessage, SourceLocation};

/// Builder for [`DiagnosticMessage`].
///
/// # Example
///
/// ```
/// use ditac_diagnostics::DiagnosticMessageBuilder;
///
/// let msg = DiagnosticMessageBuilder::warning("Cannot resolve key reference")
///     .with_code("D-3-3")
///     .problem("Key `intro` is not defined in any enclosing key scope")
///     .add_hint("Check the keys attribute of the key definition?")
///     .build();
/// assert_eq!(msg.code.as_deref(), Some("D-3-3"));
/// ```
#[derive(Debug, Clone)]
pub struct DiagnosticMessageBuilder {
    message: DiagnosticMessage,
}

impl DiagnosticMessageBuilder {
    fn new(kind: DiagnosticKind, title: impl Into<String>) -> Self {
        Self {
            message: DiagnosticMessage::new(kind, title),
        }
    }

    pub fn error(title: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Error, title)
    }

    pub fn warning(title: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Warning, title)
    }

    pub fn info(title: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Info, title)
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.message.code = Some(code.into());
        self
    }

    pub fn problem(mut self, problem: impl Into<String>) -> Self {
        self.message.problem = Some(problem.into());
        self
    }

    pub fn add_detail(mut self, detail: impl Into<String>) -> Self {
        self.message.details.push(DetailItem {
            kind: DetailKind::Error,
            content: detail.into(),
            location: None,
        });
        self
    }

    pub fn add_info(mut self, info: impl Into<String>) -> Self {
        self.message.details.push(DetailItem {
            kind: DetailKind::Info,
            content: info.into(),
            location: None,
        });
        self
    }

    pub fn add_note(mut self, note: impl Into<String>) -> Self {
        self.message.details.push(DetailItem {
            kind: DetailKind::Note,
            content: note.into(),
            location: None,
        });
        self
    }

    pub fn add_hint(mut self, hint: impl Into<String>) -> Self {
        self.message.hints.push(hint.into());
        self
    }

    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.message.location = Some(location);
        self
    }

    /// Attach a location when one is available.
    pub fn with_optional_location(mut self, location: Option<SourceLocation>) -> Self {
        self.message.location = location;
        self
    }

    pub fn build(self) -> DiagnosticMessage {
        self.message
    }
}
