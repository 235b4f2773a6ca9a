//! Arena document tree for the ditac preprocessor.
//!
//! Documents are parsed with [`quick-xml`] into a [`Document`]: an arena of
//! nodes addressed by [`NodeId`], where every node remembers its
//! [`SourceLocation`](ditac_diagnostics::SourceLocation). The tree supports
//! the operations the preprocessor needs and nothing more:
//!
//! - attribute access by `(namespace, local name)`
//! - parent, child and sibling navigation
//! - class queries through the [`ElementKind`] capability flags and
//!   [`Document::has_class`]
//! - node creation, deep cloning and import across documents
//! - per-node user data
//! - serialization back to XML
//!
//! # Example
//!
//! ```rust
//! use ditac_dom::{Document, ElementKind};
//!
//! let doc = Document::parse(
//!     r#"<map><keydef keys="intro" href="intro.dita"/></map>"#,
//!     None,
//! ).unwrap();
//!
//! let keydef = doc.first_child_element(doc.root()).unwrap();
//! assert!(doc.is(keydef, ElementKind::TOPICREF));
//! assert!(doc.has_class(keydef, "mapgroup-d/keydef"));
//! ```

pub mod class;
pub mod document;
pub mod error;
pub mod parser;
pub mod text;
pub mod types;
pub mod writer;

pub use class::{ElementKind, class_has_token, default_class};
pub use document::Document;
pub use error::{DomError, Result};
pub use parser::parse;
pub use types::{Attribute, Element, NodeData, NodeId, NodeKind, QName, XML_NS};
