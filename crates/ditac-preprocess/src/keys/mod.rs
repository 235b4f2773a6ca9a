//! Key spaces: scoped key bindings and the fixpoint that collects them.
//!
//! A [`KeySpaces`] forest is built once per run by the [`KeyLoader`] from
//! a simplified copy of the main map, then consulted read-only by
//! reference resolution.

mod definition;
mod loader;
mod space;
mod spaces;

pub use definition::{KeyDefinition, KeyNode};
pub use loader::{KeyLoader, MAX_PASSES};
pub use space::{KeySpace, KeySpaceId};
pub use spaces::KeySpaces;
