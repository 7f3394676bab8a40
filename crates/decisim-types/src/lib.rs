//! Shared key/value/action vocabulary for the decisim decision engine.
//!
//! This crate is the single source of truth for the types that cross the boundary between the
//! factored-state algebra, the dynamics registry, and the lookahead policy in `decisim-core`.
//! It defines no behavior beyond construction and simple predicates; everything stateful lives
//! downstream.
//!
//! # Modules
//!
//! - [`key`] -- opaque, decorated key identifiers into the factored state
//! - [`value`] -- variable domains and the symbolic values they admit
//! - [`action`] -- actions, action sets, and dynamics-lookup patterns
//! - [`error`] -- errors raised while authoring or resolving the above

pub mod action;
pub mod error;
pub mod key;
pub mod value;

pub use action::{Action, ActionPattern, ActionSet, ParameterBinding};
pub use error::TypesError;
pub use key::{CONSTANT, Key, TERMINATED};
pub use value::{Combinator, Domain, Value, VariableDescriptor};
