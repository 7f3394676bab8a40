//! Errors raised while authoring or resolving keys, values, and actions.

use crate::key::Key;

/// Errors from the shared vocabulary layer: malformed symbols, out-of-domain values, and
/// unresolvable key/action references encountered before the engine proper gets involved.
#[derive(Debug, thiserror::Error)]
pub enum TypesError {
    /// A symbol was requested for an enum-domain key that does not contain it.
    #[error("unknown symbol {symbol:?} for key {key}")]
    UnknownSymbol {
        /// The key whose domain was consulted.
        key: Key,
        /// The symbol that was not found.
        symbol: String,
    },

    /// A value's runtime kind does not match the key's declared domain.
    #[error("value of kind {found} does not fit the domain of key {key}")]
    DomainMismatch {
        /// The key whose domain was violated.
        key: Key,
        /// The runtime kind of the offending value.
        found: &'static str,
    },

    /// A key was referenced that has never been declared.
    #[error("unknown key {0}")]
    UnknownKey(Key),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn unknown_symbol_message_includes_key_and_symbol() {
        let err = TypesError::UnknownSymbol {
            key: Key::new("coin"),
            symbol: "Q".to_string(),
        };
        assert!(err.to_string().contains("coin"));
        assert!(err.to_string().contains('Q'));
    }
}
