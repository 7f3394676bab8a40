//! The registry of declared variable descriptors, and the float/value conversion that sits
//! on top of it and the symbol table.

use std::collections::BTreeMap;

use decisim_types::{Domain, Key, TypesError, Value, VariableDescriptor};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::symbol::SymbolTable;

/// All declared variables, keyed by [`Key`]. Variables are declared once, before stepping
/// begins, and never redefined.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VariableRegistry {
    descriptors: BTreeMap<Key, VariableDescriptor>,
}

impl VariableRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a new variable.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DuplicateDefinition`] if `descriptor.key` is already declared.
    pub fn define(&mut self, descriptor: VariableDescriptor) -> Result<(), CoreError> {
        if self.descriptors.contains_key(&descriptor.key) {
            return Err(CoreError::DuplicateDefinition(descriptor.key.to_string()));
        }
        self.descriptors.insert(descriptor.key.clone(), descriptor);
        Ok(())
    }

    /// The descriptor for `key`, if declared.
    pub fn get(&self, key: &Key) -> Option<&VariableDescriptor> {
        self.descriptors.get(key)
    }

    /// Iterate all declared descriptors.
    pub fn iter(&self) -> impl Iterator<Item = &VariableDescriptor> {
        self.descriptors.values()
    }

    /// Convert a domain-level [`Value`] to the float code stored in a keyed vector, interning
    /// any new symbol via `symbols`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownKey`] if `key` was never declared, or the wrapped
    /// [`TypesError::UnknownSymbol`] if `value` names a symbol outside the variable's domain.
    pub fn value_to_float(
        &self,
        key: &Key,
        value: &Value,
        symbols: &mut SymbolTable,
    ) -> Result<f64, CoreError> {
        let descriptor = self
            .get(key)
            .ok_or_else(|| CoreError::UnknownKey(key.clone()))?;
        match (&descriptor.domain, value) {
            (Domain::Bool, Value::Bool(b)) => Ok(if *b { 1.0 } else { 0.0 }),
            (Domain::Int { .. }, Value::Int(i)) => Ok(float_from_i64(*i)),
            (Domain::Float { .. }, Value::Float(f)) => Ok(*f),
            (Domain::EnumList(_) | Domain::EnumSet(_), Value::Enum(symbol))
            | (Domain::ActionSet, Value::ActionSymbol(symbol)) => {
                if !descriptor.domain.contains_symbol(symbol) {
                    return Err(CoreError::Types(TypesError::UnknownSymbol {
                        key: key.clone(),
                        symbol: symbol.clone(),
                    }));
                }
                Ok(symbols.intern(symbol))
            }
            _ => Err(CoreError::Types(TypesError::DomainMismatch {
                key: key.clone(),
                found: value.kind(),
            })),
        }
    }

    /// Convert a float code back to its domain-level [`Value`], resolving symbols via
    /// `symbols`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownKey`] if `key` was never declared, or
    /// [`CoreError::InvariantViolation`] if a symbolic domain's float code does not resolve to
    /// any interned symbol.
    pub fn float_to_value(
        &self,
        key: &Key,
        code: f64,
        symbols: &SymbolTable,
    ) -> Result<Value, CoreError> {
        let descriptor = self
            .get(key)
            .ok_or_else(|| CoreError::UnknownKey(key.clone()))?;
        match &descriptor.domain {
            Domain::Bool => Ok(Value::Bool(code >= 0.5)),
            Domain::Int { .. } => Ok(Value::Int(i64_from_float(code))),
            Domain::Float { .. } => Ok(Value::Float(code)),
            Domain::EnumList(_) | Domain::EnumSet(_) => {
                let symbol = symbols.resolve(code).ok_or_else(|| CoreError::InvariantViolation {
                    message: format!("float code {code} for key {key} does not resolve to any interned symbol"),
                })?;
                Ok(Value::Enum(symbol.to_string()))
            }
            Domain::ActionSet => {
                let symbol = symbols.resolve(code).ok_or_else(|| CoreError::InvariantViolation {
                    message: format!("float code {code} for key {key} does not resolve to any interned symbol"),
                })?;
                Ok(Value::ActionSymbol(symbol.to_string()))
            }
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn float_from_i64(i: i64) -> f64 {
    i as f64
}

#[allow(clippy::cast_possible_truncation)]
fn i64_from_float(f: f64) -> i64 {
    f.round() as i64
}
