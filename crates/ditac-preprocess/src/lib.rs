//! Preprocessing core of ditac: key spaces, conditional filtering and
//! reference resolution for DITA maps and topics.
//!
//! The crate turns a set of input documents into:
//! - a single simplified map, its submaps inlined ([`simplify`])
//! - the [`KeySpaces`] of that map, collected to a fixpoint ([`keys`])
//! - documents whose `href`, `keyref` and `conkeyref` are resolved ([`resolve`])
//! - a map and topics filtered by ditaval profiles ([`filter`])
//!
//! [`PreProcessor`] chains these stages. Fatal problems are returned as
//! [`PreprocessError`]; everything else is reported to a
//! [`DiagnosticSink`](ditac_diagnostics::DiagnosticSink) and processing
//! goes on.
//!
//! # Example
//!
//! ```rust
//! use std::rc::Rc;
//! use ditac_diagnostics::DiagnosticSink;
//! use ditac_preprocess::{MemorySource, PreProcessor, PreprocessOptions};
//! use url::Url;
//!
//! let source = MemorySource::new()
//!     .with(
//!         "file:///doc/m.ditamap",
//!         r#"<map><keydef keys="intro" href="intro.dita"/><topicref keyref="intro"/></map>"#,
//!     )
//!     .with(
//!         "file:///doc/intro.dita",
//!         r#"<topic id="intro"><title>Introduction</title></topic>"#,
//!     );
//!
//! let sink = DiagnosticSink::new();
//! let out = PreProcessor::new(PreprocessOptions::default(), Rc::new(source), sink.clone())
//!     .run(&[Url::parse("file:///doc/m.ditamap").unwrap()])
//!     .unwrap();
//!
//! let map = &out.map.document;
//! let topicref = map.child_elements(map.root()).nth(1).unwrap();
//! assert_eq!(map.attribute(topicref, "href"), Some("file:///doc/intro.dita#intro"));
//! assert!(!sink.has_errors());
//! ```

pub mod dita;
pub mod documents;
pub mod error;
pub mod filter;
pub mod keys;
pub mod options;
pub mod pipeline;
pub mod resolve;
pub mod simplify;
pub mod source;
pub mod uri;
pub mod vocab;

pub use documents::{DocumentType, LoadedDocument, LoadedDocuments, LoadedTopic};
pub use error::{FilterError, PreprocessError, Result};
pub use filter::{Filter, FilterAction, Filters, Flags};
pub use keys::{KeyDefinition, KeyLoader, KeySpace, KeySpaceId, KeySpaces};
pub use options::{Media, PreprocessOptions};
pub use pipeline::{PreProcessor, Preprocessed};
pub use resolve::Resolver;
pub use simplify::MapSimplifier;
pub use source::{DocumentSource, FileSystemSource, MemorySource};
