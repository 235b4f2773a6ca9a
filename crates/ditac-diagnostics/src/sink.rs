/*
 * sink.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Shared diagnostics sink for one preprocessing run.
 */

use crate::{DiagnosticKind, DiagnosticMessage, DiagnosticMessageBuilder, SourceLocation};
use std::cell::RefCell;
use std::rc::Rc;

/// Collects the diagnostics of one preprocessing run.
///
/// The sink is a cheap handle: clones share the same message list, so the key
/// loader, the document cache and the filtering engine can all report into
/// it. Every report is also emitted as a `tracing` event. Warnings and errors
/// are recorded; info messages only go to `tracing`.
///
/// Reporting an error never aborts anything. The caller decides whether to
/// continue.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticSink {
    messages: Rc<RefCell<Vec<DiagnosticMessage>>>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report a fully built message.
    pub fn push(&self, message: DiagnosticMessage) {
        let location = message
            .location
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "unknown location".to_string());
        let code = message.code.as_deref().unwrap_or("-");
        match message.kind {
            DiagnosticKind::Error => {
                tracing::error!(code, %location, "{}", message.title);
            }
            DiagnosticKind::Warning => {
                tracing::warn!(code, %location, "{}", message.title);
            }
            DiagnosticKind::Info | DiagnosticKind::Note => {
                tracing::info!(%location, "{}", message.title);
                return;
            }
        }
        self.messages.borrow_mut().push(message);
    }

    pub fn error(&self, code: &str, title: impl Into<String>, location: Option<SourceLocation>) {
        self.push(
            DiagnosticMessageBuilder::error(title)
                .with_code(code)
                .with_optional_location(location)
                .build(),
        );
    }

    pub fn warning(&self, code: &str, title: impl Into<String>, location: Option<SourceLocation>) {
        self.push(
            DiagnosticMessageBuilder::warning(title)
                .with_code(code)
                .with_optional_location(location)
                .build(),
        );
    }

    pub fn info(&self, title: impl Into<String>, location: Option<SourceLocation>) {
        self.push(
            DiagnosticMessageBuilder::info(title)
                .with_optional_location(location)
                .build(),
        );
    }

    /// Snapshot of every recorded message, in report order.
    pub fn messages(&self) -> Vec<DiagnosticMessage> {
        self.messages.borrow().clone()
    }

    pub fn warnings(&self) -> Vec<DiagnosticMessage> {
        self.of_kind(DiagnosticKind::Warning)
    }

    pub fn errors(&self) -> Vec<DiagnosticMessage> {
        self.of_kind(DiagnosticKind::Error)
    }

    pub fn has_errors(&self) -> bool {
        self.messages
            .borrow()
            .iter()
            .any(|m| m.kind == DiagnosticKind::Error)
    }

    /// Number of recorded messages carrying `code`.
    pub fn count_code(&self, code: &str) -> usize {
        self.messages
            .borrow()
            .iter()
            .filter(|m| m.code.as_deref() == Some(code))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.borrow().is_empty()
    }

    /// Remove and return every recorded message.
    pub fn take(&self) -> Vec<DiagnosticMessage> {
        std::mem::take(&mut *self.messages.borrow_mut())
    }

    fn of_kind(&self, kind: DiagnosticKind) -> Vec<DiagnosticMessage> {
        self.messages
            .borrow()
            .iter()
            .filter(|m| m.kind == kind)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_messages() {
        let sink = DiagnosticSink::new();
        let other = sink.clone();
        other.warning("D-3-3", "Cannot resolve key reference", None);
        assert_eq!(sink.warnings().len(), 1);
        assert!(!sink.has_errors());
    }

    #[test]
    fn test_info_is_not_recorded() {
        let sink = DiagnosticSink::new();
        sink.info("Loading keys", None);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_error_does_not_abort_and_is_counted() {
        let sink = DiagnosticSink::new();
        sink.error("D-4-1", "Cannot load", Some(SourceLocation::document("file:///x")));
        sink.error("D-4-1", "Cannot load again", None);
        assert!(sink.has_errors());
        assert_eq!(sink.count_code("D-4-1"), 2);
        assert_eq!(sink.take().len(), 2);
        assert!(sink.is_empty());
    }
}
