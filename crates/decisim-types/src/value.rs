//! Variable domains and the symbolic values that live in them.
//!
//! Internally, every value is stored as `f64` inside a keyed vector; [`Value`] is the
//! domain-level view a caller deals with, and [`Domain`]/[`VariableDescriptor`] describe how a
//! [`Value`] maps to and from that float.

use serde::{Deserialize, Serialize};

use crate::key::Key;

/// A domain-level value for one key. The engine converts these to and from floats via the
/// owning variable's [`Domain`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// A boolean feature, stored as `0.0` / `1.0`.
    Bool(bool),
    /// An unbounded integer feature, stored as its exact float representation.
    Int(i64),
    /// A floating-point feature, stored verbatim.
    Float(f64),
    /// One symbol out of an enumerated list, stored as the symbol's interned index.
    Enum(String),
    /// A named action identifier, stored as the symbol's interned index.
    ActionSymbol(String),
}

impl Value {
    /// A short tag naming this value's runtime variant, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Enum(_) => "enum",
            Self::ActionSymbol(_) => "action",
        }
    }
}

/// The domain a variable's values are drawn from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Domain {
    /// `true`/`false`, stored as `1.0`/`0.0`.
    Bool,
    /// Integers, optionally bounded.
    Int {
        /// Inclusive lower bound, if any.
        lo: Option<i64>,
        /// Inclusive upper bound, if any.
        hi: Option<i64>,
    },
    /// Floating-point numbers, optionally bounded.
    Float {
        /// Inclusive lower bound, if any.
        lo: Option<f64>,
        /// Inclusive upper bound, if any.
        hi: Option<f64>,
    },
    /// A closed list of mutually exclusive symbols.
    EnumList(Vec<String>),
    /// A closed set of symbols any subset of which may be simultaneously true.
    EnumSet(Vec<String>),
    /// The domain of an action-set-valued key.
    ActionSet,
}

impl Domain {
    /// Whether `symbol` is a legal member of this domain, for the domains that are symbolic.
    pub fn contains_symbol(&self, symbol: &str) -> bool {
        match self {
            Self::EnumList(xs) | Self::EnumSet(xs) => xs.iter().any(|x| x == symbol),
            Self::ActionSet => true,
            Self::Bool | Self::Int { .. } | Self::Float { .. } => false,
        }
    }
}

/// How multiple matching dynamics PLTs for one key are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Combinator {
    /// Only one PLT may ever match for this key; more than one is an authoring error.
    #[default]
    Single,
    /// Multiple matching PLTs are composed by successive application, in registration order.
    Compose,
}

/// The authoring-time description of one key: its domain, bounds already folded into `domain`,
/// optional human-readable description, and how multiple dynamics combine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableDescriptor {
    /// The key being described.
    pub key: Key,
    /// The domain values for this key are drawn from.
    pub domain: Domain,
    /// Human-readable description, for diagnostics only.
    pub description: Option<String>,
    /// How multiple matching dynamics PLTs combine for this key.
    pub combinator: Combinator,
}

impl VariableDescriptor {
    /// Build a descriptor with no description and the default (`Single`) combinator.
    pub fn new(key: Key, domain: Domain) -> Self {
        Self {
            key,
            domain,
            description: None,
            combinator: Combinator::Single,
        }
    }

    /// Attach a human-readable description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the combinator explicitly.
    pub fn with_combinator(mut self, combinator: Combinator) -> Self {
        self.combinator = combinator;
        self
    }
}
