//! Tree-walking evaluator.
//!
//! Evaluation is a single-threaded recursive traversal. Scopes are passed as
//! mutable references; the context carries the output sink. An early return
//! travels on the error channel as [`Unwind::Return`] so that `?` carries it
//! through every intermediate frame, and only the `MethodBody` arm catches
//! it.

use std::cell::RefCell;
use std::fmt::Write as _;
use std::rc::Rc;

use crate::ast::{ComparisonOp, Node, Program};
use crate::runtime::{Closure, Context, Instance, InstanceRef, RuntimeError, Value};

const INIT_METHOD: &str = "__init__";
const STR_METHOD: &str = "__str__";
const EQ_METHOD: &str = "__eq__";
const LT_METHOD: &str = "__lt__";
const ADD_METHOD: &str = "__add__";

/// Control effect raised during evaluation: either a runtime fault or an
/// early return travelling to the nearest enclosing method body.
#[derive(Debug)]
enum Unwind {
    Return(Value),
    Error(RuntimeError),
}

impl From<RuntimeError> for Unwind {
    fn from(error: RuntimeError) -> Self {
        Unwind::Error(error)
    }
}

type EvalResult = Result<Value, Unwind>;

/// Settles an evaluation result at a frame no return may cross: a return
/// still in flight here escaped every method body.
fn settle(result: EvalResult) -> Result<Value, RuntimeError> {
    match result {
        Ok(value) => Ok(value),
        Err(Unwind::Return(_)) => Err(RuntimeError::ReturnOutsideMethod),
        Err(Unwind::Error(error)) => Err(error),
    }
}

impl Program {
    /// Runs the program body against a caller-supplied top-level scope.
    /// Successful completion yields the absent value.
    pub fn execute(
        &self,
        scope: &mut Closure,
        context: &mut dyn Context,
    ) -> Result<Value, RuntimeError> {
        self.body.execute(scope, context)
    }
}

impl Node {
    /// Evaluates this node as a top-level fragment. A return that escapes
    /// every method body is reported as [`RuntimeError::ReturnOutsideMethod`].
    pub fn execute(
        &self,
        scope: &mut Closure,
        context: &mut dyn Context,
    ) -> Result<Value, RuntimeError> {
        settle(self.eval(scope, context))
    }

    fn eval(&self, scope: &mut Closure, ctx: &mut dyn Context) -> EvalResult {
        match self {
            Node::NumericConst(value) => Ok(Value::Number(*value)),
            Node::StringConst(value) => Ok(Value::String(value.clone())),
            Node::BoolConst(value) => Ok(Value::Bool(*value)),
            Node::None => Ok(Value::None),

            Node::VariableValue { dotted_ids } => lookup_dotted(dotted_ids, scope),

            Node::Assignment { name, value } => {
                let value = value.eval(scope, ctx)?;
                scope.insert(name.clone(), value.clone());
                Ok(value)
            }

            Node::FieldAssignment {
                receiver,
                field,
                value,
            } => {
                let instance = match receiver.eval(scope, ctx)? {
                    Value::Instance(instance) => instance,
                    other => {
                        return Err(RuntimeError::ExpectedInstance {
                            type_name: other.type_name().to_string(),
                        }
                        .into());
                    }
                };
                let value = value.eval(scope, ctx)?;
                instance
                    .borrow_mut()
                    .fields_mut()
                    .insert(field.clone(), value.clone());
                Ok(value)
            }

            Node::Print(args) => {
                let mut line = String::new();
                for (index, arg) in args.iter().enumerate() {
                    if index != 0 {
                        line.push(' ');
                    }
                    let value = arg.eval(scope, ctx)?;
                    render_value(&value, &mut line, ctx)?;
                }
                writeln!(ctx.output(), "{line}").map_err(RuntimeError::from)?;
                Ok(Value::String(line))
            }

            Node::Return(value) => {
                let value = value.eval(scope, ctx)?;
                Err(Unwind::Return(value))
            }

            Node::IfElse {
                condition,
                then_body,
                else_body,
            } => {
                let truth = match condition.eval(scope, ctx)? {
                    Value::Bool(truth) => truth,
                    other => {
                        return Err(RuntimeError::ConditionNotBool {
                            type_name: other.type_name(),
                        }
                        .into());
                    }
                };
                if truth {
                    then_body.eval(scope, ctx)
                } else if let Some(else_body) = else_body {
                    else_body.eval(scope, ctx)
                } else {
                    Ok(Value::None)
                }
            }

            Node::Compound(statements) => {
                for statement in statements {
                    statement.eval(scope, ctx)?;
                }
                Ok(Value::None)
            }

            Node::MethodBody(body) => match body.eval(scope, ctx) {
                Err(Unwind::Return(value)) => Ok(value),
                other => other,
            },

            Node::ClassDefinition(class) => {
                let value = Value::Class(Rc::clone(class));
                scope.insert(class.name().to_string(), value.clone());
                Ok(value)
            }

            Node::Add { lhs, rhs } => {
                let lhs = lhs.eval(scope, ctx)?;
                let rhs = rhs.eval(scope, ctx)?;
                match (lhs, rhs) {
                    (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a.wrapping_add(b))),
                    (Value::String(a), Value::String(b)) => Ok(Value::String(a + &b)),
                    (Value::Instance(instance), rhs)
                        if instance.borrow().has_method(ADD_METHOD, 1) =>
                    {
                        Ok(call_method(&instance, ADD_METHOD, vec![rhs], ctx)?)
                    }
                    (lhs, rhs) => Err(RuntimeError::UnsupportedOperands {
                        op: '+',
                        lhs: lhs.type_name(),
                        rhs: rhs.type_name(),
                    }
                    .into()),
                }
            }

            Node::Sub { lhs, rhs } => numeric_binary_op(lhs, rhs, scope, ctx, '-', |a, b| {
                Ok(a.wrapping_sub(b))
            }),

            Node::Mult { lhs, rhs } => numeric_binary_op(lhs, rhs, scope, ctx, '*', |a, b| {
                Ok(a.wrapping_mul(b))
            }),

            Node::Div { lhs, rhs } => numeric_binary_op(lhs, rhs, scope, ctx, '/', |a, b| {
                if b == 0 {
                    return Err(RuntimeError::DivisionByZero);
                }
                Ok(a.wrapping_div(b))
            }),

            Node::And { lhs, rhs } => {
                if !eval_bool_operand(lhs, scope, ctx)? {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(eval_bool_operand(rhs, scope, ctx)?))
            }

            Node::Or { lhs, rhs } => {
                if eval_bool_operand(lhs, scope, ctx)? {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(eval_bool_operand(rhs, scope, ctx)?))
            }

            Node::Not(operand) => Ok(Value::Bool(!eval_bool_operand(operand, scope, ctx)?)),

            Node::Comparison { op, lhs, rhs } => {
                let lhs = lhs.eval(scope, ctx)?;
                let rhs = rhs.eval(scope, ctx)?;
                Ok(Value::Bool(compare(*op, &lhs, &rhs, ctx)?))
            }

            Node::Stringify(arg) => {
                let value = arg.eval(scope, ctx)?;
                let mut rendered = String::new();
                render_value(&value, &mut rendered, ctx)?;
                Ok(Value::String(rendered))
            }

            Node::NewInstance { class, args } => {
                let instance = Rc::new(RefCell::new(Instance::new(Rc::clone(class))));
                if class.has_method(INIT_METHOD, args.len()) {
                    let mut actual_args = Vec::with_capacity(args.len());
                    for arg in args {
                        actual_args.push(arg.eval(scope, ctx)?);
                    }
                    call_method(&instance, INIT_METHOD, actual_args, ctx)?;
                }
                Ok(Value::Instance(instance))
            }

            Node::MethodCall {
                receiver,
                method,
                args,
            } => {
                let instance = match receiver.eval(scope, ctx)? {
                    Value::Instance(instance) => instance,
                    other => {
                        return Err(RuntimeError::ExpectedInstance {
                            type_name: other.type_name().to_string(),
                        }
                        .into());
                    }
                };
                if !instance.borrow().has_method(method, args.len()) {
                    return Err(RuntimeError::UnknownMethod {
                        class: instance.borrow().class().name().to_string(),
                        method: method.clone(),
                        argc: args.len(),
                    }
                    .into());
                }
                let mut actual_args = Vec::with_capacity(args.len());
                for arg in args {
                    actual_args.push(arg.eval(scope, ctx)?);
                }
                Ok(call_method(&instance, method, actual_args, ctx)?)
            }
        }
    }
}

fn numeric_binary_op<F>(
    lhs: &Node,
    rhs: &Node,
    scope: &mut Closure,
    ctx: &mut dyn Context,
    op: char,
    apply: F,
) -> EvalResult
where
    F: FnOnce(i64, i64) -> Result<i64, RuntimeError>,
{
    let lhs = lhs.eval(scope, ctx)?;
    let rhs = rhs.eval(scope, ctx)?;
    match (&lhs, &rhs) {
        (Value::Number(a), Value::Number(b)) => Ok(Value::Number(apply(*a, *b)?)),
        _ => Err(RuntimeError::UnsupportedOperands {
            op,
            lhs: lhs.type_name(),
            rhs: rhs.type_name(),
        }
        .into()),
    }
}

fn eval_bool_operand(
    operand: &Node,
    scope: &mut Closure,
    ctx: &mut dyn Context,
) -> Result<bool, Unwind> {
    let value = operand.eval(scope, ctx)?;
    match value {
        Value::Bool(truth) => Ok(truth),
        other => Err(RuntimeError::OperandNotBool {
            type_name: other.type_name(),
        }
        .into()),
    }
}

fn lookup_dotted(dotted_ids: &[String], scope: &Closure) -> EvalResult {
    let Some((first, rest)) = dotted_ids.split_first() else {
        return Err(RuntimeError::UndefinedVariable {
            name: String::new(),
        }
        .into());
    };
    let mut value = scope
        .get(first)
        .cloned()
        .ok_or_else(|| RuntimeError::UndefinedVariable {
            name: first.clone(),
        })?;

    for segment in rest {
        let instance = match &value {
            Value::Instance(instance) => Rc::clone(instance),
            other => {
                return Err(RuntimeError::ExpectedInstance {
                    type_name: other.type_name().to_string(),
                }
                .into());
            }
        };
        let next = instance
            .borrow()
            .fields()
            .get(segment)
            .cloned()
            .ok_or_else(|| RuntimeError::UndefinedVariable {
                name: segment.clone(),
            })?;
        value = next;
    }
    Ok(value)
}

/// Invokes a method on an instance: fresh scope seeded with `self`, formal
/// parameters bound positionally. Surplus arguments are ignored; missing
/// ones are an error.
pub fn call_method(
    instance: &InstanceRef,
    method_name: &str,
    actual_args: Vec<Value>,
    ctx: &mut dyn Context,
) -> Result<Value, RuntimeError> {
    let class = Rc::clone(instance.borrow().class());
    let Some(method) = class.get_method(method_name) else {
        return Err(RuntimeError::MethodNotImplemented {
            method: method_name.to_string(),
        });
    };
    if actual_args.len() < method.formal_params.len() {
        return Err(RuntimeError::MethodArityMismatch {
            method: method_name.to_string(),
            expected: method.formal_params.len(),
            found: actual_args.len(),
        });
    }

    let mut scope = Closure::new();
    scope.insert("self".to_string(), Value::Instance(Rc::clone(instance)));
    for (param, value) in method.formal_params.iter().zip(actual_args) {
        scope.insert(param.clone(), value);
    }

    settle(method.body.eval(&mut scope, ctx))
}

/// Renders a value the way `print` would, appending to `out`. Instances
/// delegate to a zero-argument `__str__` when the class provides one.
pub fn render_value(
    value: &Value,
    out: &mut String,
    ctx: &mut dyn Context,
) -> Result<(), RuntimeError> {
    match value {
        Value::None => out.push_str("None"),
        Value::Number(number) => write!(out, "{number}")?,
        Value::Bool(truth) => out.push_str(if *truth { "True" } else { "False" }),
        Value::String(text) => out.push_str(text),
        Value::Class(class) => write!(out, "Class {}", class.name())?,
        Value::Instance(instance) => {
            if instance.borrow().has_method(STR_METHOD, 0) {
                let rendered = call_method(instance, STR_METHOD, Vec::new(), ctx)?;
                render_value(&rendered, out, ctx)?;
            } else {
                write!(out, "<{} object>", instance.borrow().class().name())?;
            }
        }
    }
    Ok(())
}

fn compare(
    op: ComparisonOp,
    lhs: &Value,
    rhs: &Value,
    ctx: &mut dyn Context,
) -> Result<bool, RuntimeError> {
    match op {
        ComparisonOp::Eq => equal(lhs, rhs, ctx),
        ComparisonOp::NotEq => not_equal(lhs, rhs, ctx),
        ComparisonOp::Less => less(lhs, rhs, ctx),
        ComparisonOp::Greater => greater(lhs, rhs, ctx),
        ComparisonOp::LessOrEq => less_or_equal(lhs, rhs, ctx),
        ComparisonOp::GreaterOrEq => greater_or_equal(lhs, rhs, ctx),
    }
}

/// Built-in equality over matching value kinds; an instance LHS may supply
/// a one-argument `__eq__`. Two absent values are equal.
pub fn equal(lhs: &Value, rhs: &Value, ctx: &mut dyn Context) -> Result<bool, RuntimeError> {
    match (lhs, rhs) {
        (Value::None, Value::None) => Ok(true),
        (Value::Bool(a), Value::Bool(b)) => Ok(a == b),
        (Value::Number(a), Value::Number(b)) => Ok(a == b),
        (Value::String(a), Value::String(b)) => Ok(a == b),
        _ => dispatch_comparison(lhs, rhs, EQ_METHOD, ctx),
    }
}

/// Built-in ordering over matching value kinds (false < true for bools); an
/// instance LHS may supply a one-argument `__lt__`.
pub fn less(lhs: &Value, rhs: &Value, ctx: &mut dyn Context) -> Result<bool, RuntimeError> {
    match (lhs, rhs) {
        (Value::Bool(a), Value::Bool(b)) => Ok(a < b),
        (Value::Number(a), Value::Number(b)) => Ok(a < b),
        (Value::String(a), Value::String(b)) => Ok(a < b),
        _ => dispatch_comparison(lhs, rhs, LT_METHOD, ctx),
    }
}

pub fn not_equal(lhs: &Value, rhs: &Value, ctx: &mut dyn Context) -> Result<bool, RuntimeError> {
    Ok(!equal(lhs, rhs, ctx)?)
}

pub fn greater(lhs: &Value, rhs: &Value, ctx: &mut dyn Context) -> Result<bool, RuntimeError> {
    Ok(!less(lhs, rhs, ctx)? && !equal(lhs, rhs, ctx)?)
}

pub fn less_or_equal(
    lhs: &Value,
    rhs: &Value,
    ctx: &mut dyn Context,
) -> Result<bool, RuntimeError> {
    Ok(less(lhs, rhs, ctx)? || equal(lhs, rhs, ctx)?)
}

pub fn greater_or_equal(
    lhs: &Value,
    rhs: &Value,
    ctx: &mut dyn Context,
) -> Result<bool, RuntimeError> {
    Ok(!less(lhs, rhs, ctx)?)
}

fn dispatch_comparison(
    lhs: &Value,
    rhs: &Value,
    method: &'static str,
    ctx: &mut dyn Context,
) -> Result<bool, RuntimeError> {
    if let Value::Instance(instance) = lhs
        && instance.borrow().has_method(method, 1)
    {
        let result = call_method(instance, method, vec![rhs.clone()], ctx)?;
        return result
            .as_bool()
            .ok_or(RuntimeError::ComparisonNotBool { method });
    }
    Err(RuntimeError::NotComparable {
        lhs: lhs.type_name(),
        rhs: rhs.type_name(),
    })
}
