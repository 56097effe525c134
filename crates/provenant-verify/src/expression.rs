//! Predicate-attribute expressions.
//!
//! Expressions are written in CEL and must evaluate to a boolean. They
//! see the current statement as `this` and every statement accepted by an
//! earlier predicate-attribute policy under its rule name.

use std::collections::BTreeMap;

use cel_interpreter::{Context, Program, Value};
use cel_parser::{Atom, Expression, UnaryOp};

use crate::error::VerificationError;

/// Statements bound under rule names, in JSON shape.
#[derive(Debug, Clone, Default)]
pub struct ExpressionBindings {
    statements: BTreeMap<String, serde_json::Value>,
}

impl ExpressionBindings {
    /// Bind a statement under `rule_name`. The first binding for a name is kept.
    pub fn register(&mut self, rule_name: &str, statement: serde_json::Value) {
        if self.statements.contains_key(rule_name) {
            tracing::debug!(rule = rule_name, "expression binding already registered");
            return;
        }
        self.statements.insert(rule_name.to_owned(), statement);
    }

    /// The statement bound under `rule_name`.
    pub fn get(&self, rule_name: &str) -> Option<&serde_json::Value> {
        self.statements.get(rule_name)
    }

    /// Iterate bindings in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &serde_json::Value)> {
        self.statements.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Number of bound statements.
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    /// Whether nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

/// Evaluates one boolean expression.
pub trait ExpressionEvaluator: Send + Sync {
    /// Evaluate `expression` with `this` bound to `current` and each earlier
    /// statement bound under its rule name.
    ///
    /// Returns the boolean result, or an error when the expression does
    /// not compile, fails at runtime, or does not produce a boolean.
    fn evaluate(
        &self,
        expression: &str,
        current: &serde_json::Value,
        bindings: &ExpressionBindings,
    ) -> Result<bool, VerificationError>;
}

/// CEL evaluator backed by `cel-interpreter`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CelEvaluator;

impl ExpressionEvaluator for CelEvaluator {
    fn evaluate(
        &self,
        expression: &str,
        current: &serde_json::Value,
        bindings: &ExpressionBindings,
    ) -> Result<bool, VerificationError> {
        let compile_err = |reason: String| VerificationError::InvalidExpression {
            expression: expression.to_owned(),
            reason,
        };
        let parsed = cel_parser::parse(expression)
            .map_err(|e| compile_err(e.to_string()))?;
        if let Some(actual) = non_boolean_kind(&parsed) {
            return Err(VerificationError::ExpressionType {
                expression: expression.to_owned(),
                actual: actual.to_owned(),
            });
        }
        let program = Program::compile(expression)
            .map_err(|e| compile_err(e.to_string()))?;

        let runtime_err = |reason: String| VerificationError::ExpressionEvaluation {
            expression: expression.to_owned(),
            reason,
        };
        let mut context = Context::default();
        for (name, statement) in bindings.iter() {
            context
                .add_variable(name, statement.clone())
                .map_err(|e| runtime_err(e.to_string()))?;
        }
        // `this` shadows a rule that happens to be named "this".
        context
            .add_variable("this", current.clone())
            .map_err(|e| runtime_err(e.to_string()))?;

        let value = program
            .execute(&context)
            .map_err(|e| runtime_err(e.to_string()))?;
        match value {
            Value::Bool(result) => Ok(result),
            other => Err(VerificationError::ExpressionType {
                expression: expression.to_owned(),
                actual: describe(&other).to_owned(),
            }),
        }
    }
}

/// Functions whose result is always a boolean.
const BOOLEAN_FUNCTIONS: &[&str] = &[
    "all",
    "contains",
    "endsWith",
    "exists",
    "exists_one",
    "has",
    "matches",
    "startsWith",
];

/// What `expression` may produce instead of a boolean, or `None` when
/// every evaluation of it yields a boolean.
///
/// Field accesses and variables are dynamically typed, so they are
/// rejected at the top of an expression; compare them instead.
fn non_boolean_kind(expression: &Expression) -> Option<&'static str> {
    match expression {
        Expression::Relation(..)
        | Expression::And(..)
        | Expression::Or(..)
        | Expression::Unary(UnaryOp::Not | UnaryOp::DoubleNot, _)
        | Expression::Atom(Atom::Bool(_)) => None,
        Expression::Ternary(_, then, otherwise) => {
            non_boolean_kind(then).or_else(|| non_boolean_kind(otherwise))
        }
        Expression::FunctionCall(function, _, _) => match function.as_ref() {
            Expression::Ident(name) if BOOLEAN_FUNCTIONS.contains(&name.as_str()) => None,
            _ => Some("dyn"),
        },
        Expression::Unary(..) | Expression::Arithmetic(..) => Some("a number"),
        Expression::Atom(Atom::Int(_)) => Some("int"),
        Expression::Atom(Atom::UInt(_)) => Some("uint"),
        Expression::Atom(Atom::Float(_)) => Some("double"),
        Expression::Atom(Atom::String(_)) => Some("string"),
        Expression::Atom(Atom::Bytes(_)) => Some("bytes"),
        Expression::Atom(Atom::Null) => Some("null"),
        Expression::List(_) => Some("list"),
        Expression::Map(_) => Some("map"),
        Expression::Member(..) | Expression::Ident(_) => Some("dyn"),
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Int(_) => "int",
        Value::UInt(_) => "uint",
        Value::Float(_) => "double",
        Value::String(_) => "string",
        Value::Bytes(_) => "bytes",
        Value::List(_) => "list",
        Value::Map(_) => "map",
        Value::Null => "null",
        _ => "a non-boolean value",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn current() -> serde_json::Value {
        json!({
            "_type": "https://in-toto.io/Statement/v1",
            "subject": [{ "name": "out.bin", "digest": { "sha256": "abc" } }],
            "predicateType": "https://in-toto.io/attestation/link/v0.3",
            "predicate": {
                "name": "build",
                "command": ["make"],
                "byproducts": { "returnValue": 0 }
            }
        })
    }

    fn eval(expression: &str, bindings: &ExpressionBindings) -> Result<bool, VerificationError> {
        CelEvaluator.evaluate(expression, &current(), bindings)
    }

    fn type_error(expression: &str) -> String {
        match eval(expression, &ExpressionBindings::default()) {
            Err(VerificationError::ExpressionType { actual, .. }) => actual,
            other => panic!("{expression}: expected a type error, got {other:?}"),
        }
    }

    #[test]
    fn boolean_results() {
        let none = ExpressionBindings::default();
        assert!(eval("this.predicate.name == 'build'", &none).unwrap());
        assert!(eval("this.predicate.command[0] == 'make'", &none).unwrap());
        assert!(eval("size(this.subject) == 1", &none).unwrap());
        let slsa = "this.predicateType == 'https://slsa.dev/provenance/v1'";
        assert!(!eval(slsa, &none).unwrap());
    }

    #[test]
    fn earlier_rules_are_bound_by_name() {
        let mut bindings = ExpressionBindings::default();
        bindings.register(
            "fetch",
            json!({ "subject": [{ "name": "src.tar", "digest": { "sha256": "abc" } }] }),
        );
        let expression = "fetch.subject[0].digest.sha256 == this.subject[0].digest.sha256";
        assert!(eval(expression, &bindings).unwrap());
    }

    #[test]
    fn first_binding_wins() {
        let mut bindings = ExpressionBindings::default();
        bindings.register("a", json!({ "n": 1 }));
        bindings.register("a", json!({ "n": 2 }));
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings.get("a").unwrap()["n"], 1);
    }

    #[test]
    fn non_boolean_is_type_error() {
        assert_eq!(type_error("this.predicate.name"), "dyn");
        assert_eq!(type_error("'build'"), "string");
        assert_eq!(type_error("size(this.subject)"), "dyn");
        assert_eq!(type_error("1 + 1"), "a number");
        assert_eq!(type_error("[true]"), "list");
    }

    #[test]
    fn ternary_arms_must_both_be_boolean() {
        assert_eq!(type_error("true ? true : 'not a bool'"), "string");
        assert_eq!(type_error("false ? 1 : true"), "int");

        let none = ExpressionBindings::default();
        let expression = "size(this.subject) > 0 ? this.predicate.name == 'build' : false";
        assert!(eval(expression, &none).unwrap());
    }

    #[test]
    fn boolean_functions_and_operators() {
        let none = ExpressionBindings::default();
        assert!(eval("has(this.predicate.name)", &none).unwrap());
        assert!(eval("this.predicate.name.startsWith('bu')", &none).unwrap());
        assert!(eval("!(this.predicate.name == 'test') && true", &none).unwrap());
        assert!(eval("this.subject.exists(s, s.name == 'out.bin')", &none).unwrap());
    }

    #[test]
    fn syntax_error_is_invalid_expression() {
        let err = eval("this.predicate.name ==", &ExpressionBindings::default()).unwrap_err();
        assert!(matches!(err, VerificationError::InvalidExpression { .. }));
    }

    #[test]
    fn unknown_variable_is_evaluation_error() {
        let none = ExpressionBindings::default();
        let err = eval("missing.subject == this.subject", &none).unwrap_err();
        assert!(matches!(err, VerificationError::ExpressionEvaluation { .. }));
    }
}
