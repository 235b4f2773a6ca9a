//! Conditional processing: ditaval profiles and their evaluation.
//!
//! A [`Filter`] is one parsed profile. [`Filters`] evaluates the stack of
//! profiles active at a point of a map: the external profile first, then
//! the profile of each enclosing `ditavalref`.

mod engine;
mod flags;
mod profile;

pub use engine::{DITAC_FLAGS, FilterAction, Filters};
pub use flags::Flags;
pub use profile::{Action, Filter, Prop, PropValue};
