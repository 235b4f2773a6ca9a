//! Core diagnostic message types.
//!
//! Messages follow the tidyverse structure used throughout the workspace:
//! a short title, an optional problem statement, bulleted details and hints.

use crate::SourceLocation;
use serde::{Deserialize, Serialize};

/// The kind of diagnostic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticKind {
    /// An error; the operation that reported it may or may not continue
    Error,
    /// A problem that does not prevent completion
    Warning,
    /// Progress or informational message
    Info,
    /// Additional context
    Note,
}

impl DiagnosticKind {
    pub fn label(self) -> &'static str {
        match self {
            DiagnosticKind::Error => "Error",
            DiagnosticKind::Warning => "Warning",
            DiagnosticKind::Info => "Info",
            DiagnosticKind::Note => "Note",
        }
    }

    fn json_name(self) -> &'static str {
        match self {
            DiagnosticKind::Error => "error",
            DiagnosticKind::Warning => "warning",
            DiagnosticKind::Info => "info",
            DiagnosticKind::Note => "note",
        }
    }
}

/// How a detail item is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetailKind {
    /// ✖ bullet
    Error,
    /// ℹ bullet
    Info,
    /// • bullet
    Note,
}

impl DetailKind {
    fn bullet(self) -> &'static str {
        match self {
            DetailKind::Error => "✖",
            DetailKind::Info => "ℹ",
            DetailKind::Note => "•",
        }
    }

    fn json_name(self) -> &'static str {
        match self {
            DetailKind::Error => "error",
            DetailKind::Info => "info",
            DetailKind::Note => "note",
        }
    }
}

/// A detail item in a diagnostic message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailItem {
    pub kind: DetailKind,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
}

/// A diagnostic message.
///
/// Structure:
/// 1. **Code**: optional stable code (e.g. "D-3-3") listed in the catalog
/// 2. **Title**: brief message
/// 3. **Kind**: error, warning, info or note
/// 4. **Problem**: what went wrong
/// 5. **Details**: specific information, one fact per bullet
/// 6. **Hints**: guidance for fixing (ends with ?)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub title: String,
    pub kind: DiagnosticKind,
    pub problem: Option<String>,
    pub details: Vec<DetailItem>,
    pub hints: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
}

impl DiagnosticMessage {
    pub fn new(kind: DiagnosticKind, title: impl Into<String>) -> Self {
        Self {
            code: None,
            title: title.into(),
            kind,
            problem: None,
            details: Vec::new(),
            hints: Vec::new(),
            location: None,
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
        self.code = Some(code.into());
        self
    }

    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    /// The subsystem of this message's code, looked up in the catalog.
    pub fn subsystem(&self) -> Option<&str> {
        self.code
            .as_deref()
            .and_then(crate::catalog::get_subsystem)
    }

    /// The problem statement: the one given, else the default wording of
    /// the code in the catalog.
    pub fn problem_text(&self) -> Option<&str> {
        self.problem.as_deref().or_else(|| {
            self.code
                .as_deref()
                .and_then(crate::catalog::get_error_info)
                .map(|info| info.message_template.as_str())
        })
    }

    /// Render this diagnostic message as text.
    ///
    /// ```text
    /// Warning [D-3-3]: Cannot resolve key reference
    /// at file:///doc/a.dita:12:5
    /// Key `intro` is not defined
    /// ✖ detail
    /// ? hint
    /// ```
    pub fn to_text(&self) -> String {
        let mut result = String::new();

        result.push_str(self.kind.label());
        if let Some(code) = &self.code {
            result.push_str(" [");
            result.push_str(code);
            result.push(']');
        }
        result.push_str(": ");
        result.push_str(&self.title);
        result.push('\n');

        if let Some(location) = &self.location {
            result.push_str("at ");
            result.push_str(&location.to_string());
            result.push('\n');
        }

        if let Some(problem) = self.problem_text() {
            result.push_str(problem);
            result.push('\n');
        }

        for detail in &self.details {
            result.push_str(detail.kind.bullet());
            result.push(' ');
            result.push_str(&detail.content);
            if let Some(location) = &detail.location {
                result.push_str(" (");
                result.push_str(&location.to_string());
                result.push(')');
            }
            result.push('\n');
        }

        for hint in &self.hints {
            result.push_str("? ");
            result.push_str(hint);
            result.push('\n');
        }

        result
    }

    /// Render this diagnostic message as a JSON value.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::json;

        let mut obj = json!({
            "kind": self.kind.json_name(),
            "title": self.title,
        });

        if let Some(code) = &self.code {
            obj["code"] = json!(code);
            if let Some(info) = crate::catalog::get_error_info(code) {
                obj["category"] = json!(info.title);
            }
        }
        if let Some(problem) = self.problem_text() {
            obj["problem"] = json!(problem);
        }
        if !self.details.is_empty() {
            let details: Vec<_> = self
                .details
                .iter()
                .map(|d| {
                    let mut detail = json!({
                        "kind": d.kind.json_name(),
                        "content": d.content,
                    });
                    if let Some(location) = &d.location {
                        detail["location"] = json!(location);
                    }
                    detail
                })
                .collect();
            obj["details"] = json!(details);
        }
        if !self.hints.is_empty() {
            obj["hints"] = json!(self.hints);
        }
        if let Some(location) = &self.location {
            obj["location"] = json!(location);
        }

        obj
    }
}
