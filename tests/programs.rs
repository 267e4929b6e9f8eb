use anyhow::{Context as _, Result};
use indoc::indoc;

use minipy::{Closure, Lexer, RuntimeError, StringContext, parse_program};

fn normalize_output(output: &str) -> String {
    output.replace("\r\n", "\n").trim_end().to_string()
}

fn run_program(source: &str) -> Result<String> {
    let lexer = Lexer::new(source).context("Tokenizing program")?;
    let program = parse_program(lexer).context("Parsing program")?;
    let mut globals = Closure::new();
    let mut context = StringContext::new();
    program
        .execute(&mut globals, &mut context)
        .context("Running program")?;
    Ok(context.into_output())
}

fn assert_output(source: &str, expected: &str) {
    let output = run_program(source).expect("program should run");
    assert_eq!(normalize_output(&output), normalize_output(expected));
}

fn expect_error_containing(source: &str, fragment: &str) {
    let error = run_program(source).expect_err("program should fail");
    let message = format!("{error:#}");
    assert!(
        message.contains(fragment),
        "Expected error containing '{fragment}', got '{message}'"
    );
}

#[test]
fn prints_a_variable() {
    assert_output("a = 10\nprint a\n", "10");
}

#[test]
fn branches_on_comparison() {
    let source = "a = 10\nif a > 1:\n  print 'more'\nelse:\n  print 'less'\n";
    assert_output(source, "more");
}

#[test]
fn calls_a_method_with_an_argument() {
    let source = indoc! {"
        class C:
          def f(self, x):
            return x + 1

        c = C()
        print c.f(4)
    "};
    assert_output(source, "5");
}

#[test]
fn dispatches_through_inheritance() {
    let source = indoc! {"
        class A:
          def g(self):
            return 1

        class B(A):
          def h(self):
            return 2

        b = B()
        print b.g(), b.h()
    "};
    assert_output(source, "1 2");
}

#[test]
fn concatenates_string_literals() {
    assert_output("print 'x' + 'y'\n", "xy");
}

#[test]
fn prints_instances_via_str_method() {
    let source = indoc! {"
        class P:
          def __str__(self):
            return 'p'

        print P()
    "};
    assert_output(source, "p");
}

#[test]
fn runs_a_linked_structure_program() {
    let source = indoc! {"
        class Node:
          def __init__(self, value):
            self.value = value
            self.has_next = False
          def append(self, node):
            self.next = node
            self.has_next = True
            return node
          def total(self):
            if self.has_next:
              return self.value + self.next.total()
            return self.value

        head = Node(1)
        mid = head.append(Node(2))
        mid.append(Node(3))
        print head.total()
    "};
    assert_output(source, "6");
}

#[test]
fn init_chain_and_comparison_methods_cooperate() {
    let source = indoc! {"
        class Money:
          def __init__(self, amount):
            self.amount = amount
          def __eq__(self, other):
            return self.amount == other.amount
          def __lt__(self, other):
            return self.amount < other.amount
          def __str__(self):
            return str(self.amount)

        a = Money(5)
        b = Money(12)
        if a < b:
          print a, 'is less than', b
        else:
          print a, 'is at least', b
    "};
    assert_output(source, "5 is less than 12");
}

#[test]
fn partial_output_is_retained_on_failure() {
    let source = "print 'first'\nprint 1 + 'x'\n";
    let lexer = Lexer::new(source).expect("lexing should succeed");
    let program = parse_program(lexer).expect("parsing should succeed");
    let mut globals = Closure::new();
    let mut context = StringContext::new();
    let error = program
        .execute(&mut globals, &mut context)
        .expect_err("expected a runtime failure");
    assert_eq!(
        error,
        RuntimeError::UnsupportedOperands {
            op: '+',
            lhs: "int",
            rhs: "str"
        }
    );
    assert_eq!(context.as_str(), "first\n");
}

#[test]
fn rejects_three_space_indentation() {
    let source = "if True:\n   print 'x'\n";
    let error = Lexer::new(source).err().expect("expected a lex error");
    assert!(error.to_string().contains("odd number of spaces"));
}

#[test]
fn rejects_top_level_function_calls() {
    let lexer = Lexer::new("foo()\n").expect("lexing should succeed");
    let error = parse_program(lexer).expect_err("expected a parse error");
    assert!(error.to_string().contains("only methods"));
}

#[test]
fn allows_top_level_stringify() {
    assert_output("s = str(5)\nprint s\n", "5");
}

#[test]
fn allows_bare_stringify_statement() {
    assert_output("str(5)\nprint 5\n", "5");
}

#[test]
fn rejects_adding_number_and_string() {
    expect_error_containing("print 1 + 'x'\n", "Unsupported operand types");
}

#[test]
fn rejects_non_bool_condition() {
    expect_error_containing("if 1:\n  print 'x'\n", "Condition must be a bool");
}

#[test]
fn reports_division_by_zero_distinctly() {
    expect_error_containing("print 1 / 0\n", "Division by zero");
}

#[test]
fn comments_are_ignored_everywhere() {
    let source = indoc! {"
        # leading comment
        a = 2  # trailing comment
        if a == 2:
          # comment inside a suite
          print 'ok'
    "};
    assert_output(source, "ok");
}

#[test]
fn top_level_scope_is_caller_owned() {
    let lexer = Lexer::new("b = a + 1\nprint b\n").expect("lexing should succeed");
    let program = parse_program(lexer).expect("parsing should succeed");
    let mut globals = Closure::new();
    globals.insert("a".to_string(), minipy::Value::Number(41));
    let mut context = StringContext::new();
    program
        .execute(&mut globals, &mut context)
        .expect("program should run");
    assert_eq!(normalize_output(context.as_str()), "42");
    assert!(matches!(globals.get("b"), Some(minipy::Value::Number(42))));
}

#[test]
fn successful_execution_returns_absent() {
    let lexer = Lexer::new("a = 1\n").expect("lexing should succeed");
    let program = parse_program(lexer).expect("parsing should succeed");
    let mut globals = Closure::new();
    let mut context = StringContext::new();
    let result = program
        .execute(&mut globals, &mut context)
        .expect("program should run");
    assert!(matches!(result, minipy::Value::None));
}
