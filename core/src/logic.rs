//! Logical composition of constraints.
//!
//! [`All`], [`Any`] and [`Not`] combine built constraints with short-circuit
//! evaluation. Prefer the [`and`] / [`or`] helpers over the structs: they
//! normalize the degenerate cases so callers never wrap a single operand.

use std::sync::Arc;

use serde_json::json;

use crate::constraint::{
    Compare, Constraint, ConstraintRef, FloatCompare, IntCompare, Invalid, UintCompare,
};
use crate::value::Value;

/// Every operand must hold. Short-circuits on the first `false`.
#[derive(Debug, Clone)]
pub struct All(pub Vec<ConstraintRef>);

impl Constraint for All {
    fn test(&self, value: &Value) -> bool {
        self.0.iter().all(|c| c.test(value))
    }

    fn details(&self) -> serde_json::Value {
        json!({ "name": "and", "of": self.0.iter().map(|c| c.details()).collect::<Vec<_>>() })
    }
}

/// At least one operand must hold. Short-circuits on the first `true`.
#[derive(Debug, Clone)]
pub struct Any(pub Vec<ConstraintRef>);

impl Constraint for Any {
    fn test(&self, value: &Value) -> bool {
        self.0.iter().any(|c| c.test(value))
    }

    fn details(&self) -> serde_json::Value {
        json!({ "name": "or", "of": self.0.iter().map(|c| c.details()).collect::<Vec<_>>() })
    }
}

/// Inverts its operand.
#[derive(Debug, Clone)]
pub struct Not(pub ConstraintRef);

impl Constraint for Not {
    fn test(&self, value: &Value) -> bool {
        !self.0.test(value)
    }

    fn details(&self) -> serde_json::Value {
        json!({ "name": "not", "of": self.0.details() })
    }
}

/// Compose with AND semantics.
///
/// - Empty → [`Invalid`] (nothing to satisfy is a misconfiguration)
/// - Single → that operand, unwrapped
/// - Multiple → [`All`]
///
/// ```
/// use std::sync::Arc;
/// use fieldtools::{Constraint, ConstraintRef, Value};
/// use fieldtools::constraint::Required;
/// use fieldtools::logic::and;
///
/// assert!(!and(vec![]).test(&Value::from("x")));
///
/// let required: ConstraintRef = Arc::new(Required);
/// let single = and(vec![Arc::clone(&required)]);
/// assert!(Arc::ptr_eq(&single, &required));
/// ```
#[must_use]
pub fn and(mut operands: Vec<ConstraintRef>) -> ConstraintRef {
    match operands.len() {
        0 => Arc::new(Invalid),
        1 => operands.swap_remove(0),
        _ => Arc::new(All(operands)),
    }
}

/// Compose with OR semantics. Degenerate cases as in [`and`].
#[must_use]
pub fn or(mut operands: Vec<ConstraintRef>) -> ConstraintRef {
    match operands.len() {
        0 => Arc::new(Invalid),
        1 => operands.swap_remove(0),
        _ => Arc::new(Any(operands)),
    }
}

/// Invert a constraint.
#[must_use]
pub fn not(operand: ConstraintRef) -> ConstraintRef {
    Arc::new(Not(operand))
}

/// Inclusive signed range: `and(>= lower, <= upper)`.
#[must_use]
pub fn int_between(lower: i64, upper: i64) -> ConstraintRef {
    and(vec![
        Arc::new(IntCompare::new(Compare::Gte, lower)),
        Arc::new(IntCompare::new(Compare::Lte, upper)),
    ])
}

/// Inclusive unsigned range: `and(>= lower, <= upper)`.
#[must_use]
pub fn uint_between(lower: u64, upper: u64) -> ConstraintRef {
    and(vec![
        Arc::new(UintCompare::new(Compare::Gte, lower)),
        Arc::new(UintCompare::new(Compare::Lte, upper)),
    ])
}

/// Inclusive float range: `and(>= lower, <= upper)`.
#[must_use]
pub fn float_between(lower: f64, upper: f64) -> ConstraintRef {
    and(vec![
        Arc::new(FloatCompare::new(Compare::Gte, lower)),
        Arc::new(FloatCompare::new(Compare::Lte, upper)),
    ])
}
