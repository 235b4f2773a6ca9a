//! Diagnostic messages for the ditac preprocessor.
//!
//! This crate provides:
//! - [`DiagnosticMessage`]: a structured error, warning or info message
//! - [`DiagnosticMessageBuilder`]: tidyverse-style construction
//! - [`SourceLocation`]: where in a document a message applies
//! - [`DiagnosticSink`]: the shared collector every preprocessing component
//!   reports into
//! - an error-code catalog (`D-<subsystem>-<n>`)
//!
//! # Example
//!
//! ```
//! use ditac_diagnostics::{DiagnosticSink, SourceLocation};
//!
//! let sink = DiagnosticSink::new();
//! sink.warning(
//!     "D-3-3",
//!     "Cannot resolve keyref=\"intro\"",
//!     Some(SourceLocation::new("file:///doc/a.dita", 12, 5)),
//! );
//! assert_eq!(sink.warnings().len(), 1);
//! ```

pub mod builder;
pub mod catalog;
pub mod diagnostic;
pub mod location;
pub mod sink;

pub use builder::DiagnosticMessageBuilder;
pub use catalog::{ERROR_CATALOG, ErrorCodeInfo, get_error_info, get_subsystem};
pub use diagnostic::{DetailItem, DetailKind, DiagnosticKind, DiagnosticMessage};
pub use location::SourceLocation;
pub use sink::DiagnosticSink;
