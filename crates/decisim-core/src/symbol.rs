//! Process-wide symbol table.
//!
//! Enum and action-set domains store their values as float codes inside keyed vectors. The
//! symbol table is the append-only bijection between those codes and the domain-level strings;
//! per the authoring note in [`crate::world`], there is exactly one of these per [`crate::world::World`],
//! never one per variable, so indices stay stable once interned.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// An append-only symbol table mapping strings to stable float codes.
///
/// Indices are never reused or reassigned once interned, which is what lets a float extracted
/// from a vector be resolved back to its symbol at any later point in the simulation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SymbolTable {
    symbols: Vec<String>,
    index: HashMap<String, usize>,
}

impl SymbolTable {
    /// An empty symbol table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `symbol`, returning its stable float code. Returns the existing code if already
    /// interned.
    #[allow(clippy::cast_precision_loss)]
    pub fn intern(&mut self, symbol: &str) -> f64 {
        if let Some(&i) = self.index.get(symbol) {
            return i as f64;
        }
        let i = self.symbols.len();
        self.symbols.push(symbol.to_string());
        self.index.insert(symbol.to_string(), i);
        i as f64
    }

    /// Look up an already-interned symbol's code without interning it.
    #[allow(clippy::cast_precision_loss)]
    pub fn lookup(&self, symbol: &str) -> Option<f64> {
        self.index.get(symbol).map(|&i| i as f64)
    }

    /// Resolve a float code back to its symbol.
    ///
    /// `code` is rounded to the nearest index; codes produced by [`Self::intern`] are always
    /// exact integers, so this only loses precision if the float has been corrupted upstream.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn resolve(&self, code: f64) -> Option<&str> {
        if !code.is_finite() || code < 0.0 {
            return None;
        }
        let i = code.round() as usize;
        self.symbols.get(i).map(String::as_str)
    }

    /// The number of interned symbols.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Whether no symbols have been interned yet.
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn interning_same_symbol_twice_returns_same_code() {
        let mut table = SymbolTable::new();
        let a = table.intern("H");
        let b = table.intern("H");
        assert!((a - b).abs() < f64::EPSILON);
    }

    #[test]
    fn distinct_symbols_get_distinct_codes() {
        let mut table = SymbolTable::new();
        let a = table.intern("H");
        let b = table.intern("T");
        assert!((a - b).abs() > f64::EPSILON);
    }

    #[test]
    fn resolve_round_trips_intern() {
        let mut table = SymbolTable::new();
        let code = table.intern("rational");
        assert_eq!(table.resolve(code), Some("rational"));
    }

    #[test]
    fn resolve_of_unknown_code_is_none() {
        let table = SymbolTable::new();
        assert_eq!(table.resolve(7.0), None);
    }
}
