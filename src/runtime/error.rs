use std::fmt;

use thiserror::Error;

/// Faults raised while evaluating a program. Evaluation never recovers; the
/// first error aborts the current top-level invocation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("Undefined variable '{name}'")]
    UndefinedVariable { name: String },
    #[error("Expected a class instance, got {type_name}")]
    ExpectedInstance { type_name: String },
    #[error("Method '{method}' is not implemented")]
    MethodNotImplemented { method: String },
    #[error("Class '{class}' has no method '{method}' taking {argc} arguments")]
    UnknownMethod {
        class: String,
        method: String,
        argc: usize,
    },
    #[error("Method '{method}' expected {expected} arguments, got {found}")]
    MethodArityMismatch {
        method: String,
        expected: usize,
        found: usize,
    },
    #[error("Unsupported operand types for '{op}': {lhs} and {rhs}")]
    UnsupportedOperands {
        op: char,
        lhs: &'static str,
        rhs: &'static str,
    },
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Condition must be a bool, got {type_name}")]
    ConditionNotBool { type_name: &'static str },
    #[error("Logical operand must be a bool, got {type_name}")]
    OperandNotBool { type_name: &'static str },
    #[error("Cannot compare {lhs} and {rhs}")]
    NotComparable {
        lhs: &'static str,
        rhs: &'static str,
    },
    #[error("Method '{method}' must return a bool")]
    ComparisonNotBool { method: &'static str },
    #[error("Return outside of a method body")]
    ReturnOutsideMethod,
    #[error("Failed to write to the output sink")]
    OutputSink,
}

impl From<fmt::Error> for RuntimeError {
    fn from(_: fmt::Error) -> Self {
        RuntimeError::OutputSink
    }
}
