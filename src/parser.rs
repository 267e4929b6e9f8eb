use std::collections::HashMap;
use std::mem;
use std::rc::Rc;

use thiserror::Error;

use crate::ast::{ComparisonOp, Node, Program};
use crate::lexer::Lexer;
use crate::runtime::{Class, Method};
use crate::token::Token;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Expected {expected}, got {found}")]
    UnexpectedToken { expected: String, found: String },
    #[error("Base class '{base}' not found for class '{class}'")]
    UnknownBaseClass { base: String, class: String },
    #[error("Class '{name}' is already defined")]
    DuplicateClass { name: String },
    #[error("Free functions are not supported, only methods: '{name}'")]
    FreeFunctionCall { name: String },
    #[error("Unknown call to '{name}()'")]
    UnknownCall { name: String },
    #[error("str() takes exactly one argument, got {found}")]
    StringifyArity { found: usize },
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Parses the whole token stream into a program.
pub fn parse_program(lexer: Lexer) -> ParseResult<Program> {
    Parser::new(lexer).parse_program()
}

/// Recursive-descent parser with one token of lookahead.
///
/// Class descriptors are built while parsing and collected into a registry;
/// `ClassDefinition` nodes share handles into it, and the registry itself
/// moves into the resulting [`Program`].
pub struct Parser {
    lexer: Lexer,
    classes: HashMap<String, Rc<Class>>,
}

impl Parser {
    pub fn new(lexer: Lexer) -> Self {
        Self {
            lexer,
            classes: HashMap::new(),
        }
    }

    pub fn parse_program(mut self) -> ParseResult<Program> {
        let mut statements = Vec::new();
        while *self.lexer.current() != Token::Eof {
            statements.push(self.parse_statement()?);
        }
        Ok(Program {
            body: Node::Compound(statements),
            classes: self.classes,
        })
    }

    // Statement := 'class' ClassDef | 'if' Condition | SimpleStmt Newline
    fn parse_statement(&mut self) -> ParseResult<Node> {
        match self.lexer.current() {
            Token::Class => {
                self.lexer.advance();
                self.parse_class_definition()
            }
            Token::If => self.parse_condition(),
            _ => {
                let statement = self.parse_simple_statement()?;
                self.expect_token(Token::Newline, "newline")?;
                Ok(statement)
            }
        }
    }

    // SimpleStmt := 'return' Test | 'print' [TestList] | AssignOrCall
    fn parse_simple_statement(&mut self) -> ParseResult<Node> {
        match self.lexer.current() {
            Token::Return => {
                self.lexer.advance();
                Ok(Node::Return(Box::new(self.parse_test()?)))
            }
            Token::Print => {
                self.lexer.advance();
                let args = if *self.lexer.current() != Token::Newline {
                    self.parse_test_list()?
                } else {
                    Vec::new()
                };
                Ok(Node::Print(args))
            }
            _ => self.parse_assignment_or_call(),
        }
    }

    // AssignOrCall := DottedIds ('=' Test | '(' [TestList] ')')
    fn parse_assignment_or_call(&mut self) -> ParseResult<Node> {
        let (prefix, last) = self.parse_dotted_ids()?;

        if self.consume_char('=') {
            let value = Box::new(self.parse_test()?);
            if prefix.is_empty() {
                return Ok(Node::Assignment { name: last, value });
            }
            return Ok(Node::FieldAssignment {
                receiver: Box::new(Node::VariableValue { dotted_ids: prefix }),
                field: last,
                value,
            });
        }

        self.expect_char('(')?;
        if prefix.is_empty() && last != "str" {
            return Err(ParseError::FreeFunctionCall { name: last });
        }
        let args = if !self.lexer.current().is_char(')') {
            self.parse_test_list()?
        } else {
            Vec::new()
        };
        self.expect_char(')')?;

        if prefix.is_empty() {
            return self.stringify_node(args);
        }
        Ok(Node::MethodCall {
            receiver: Box::new(Node::VariableValue { dotted_ids: prefix }),
            method: last,
            args,
        })
    }

    // ClassDef := Id ['(' Id ')'] ':' Newline Indent Def+ Dedent
    fn parse_class_definition(&mut self) -> ParseResult<Node> {
        let class_name = self.expect_id()?;

        let parent = if self.consume_char('(') {
            let base = self.expect_id()?;
            self.expect_char(')')?;
            match self.classes.get(&base) {
                Some(class) => Some(Rc::clone(class)),
                Option::None => {
                    return Err(ParseError::UnknownBaseClass {
                        base,
                        class: class_name,
                    });
                }
            }
        } else {
            Option::None
        };

        self.expect_char(':')?;
        self.expect_token(Token::Newline, "newline")?;
        self.expect_token(Token::Indent, "indent")?;

        if *self.lexer.current() != Token::Def {
            return Err(self.unexpected("def"));
        }
        let mut methods = Vec::new();
        while *self.lexer.current() == Token::Def {
            methods.push(self.parse_method_definition()?);
        }
        self.expect_token(Token::Dedent, "dedent")?;

        let class = Rc::new(Class::new(class_name.clone(), methods, parent));
        if self
            .classes
            .insert(class_name.clone(), Rc::clone(&class))
            .is_some()
        {
            return Err(ParseError::DuplicateClass { name: class_name });
        }
        Ok(Node::ClassDefinition(class))
    }

    // Def := 'def' Id '(' [Id (',' Id)*] ')' ':' Suite
    fn parse_method_definition(&mut self) -> ParseResult<Method> {
        self.expect_token(Token::Def, "def")?;
        let name = self.expect_id()?;
        self.expect_char('(')?;

        let mut formal_params = Vec::new();
        if matches!(self.lexer.current(), Token::Id(_)) {
            formal_params.push(self.expect_id()?);
            while self.consume_char(',') {
                formal_params.push(self.expect_id()?);
            }
        }
        // The receiver parameter is implicit at call time; a declared leading
        // `self` only names it.
        if formal_params.first().is_some_and(|param| param == "self") {
            formal_params.remove(0);
        }

        self.expect_char(')')?;
        self.expect_char(':')?;
        let body = Node::MethodBody(Box::new(self.parse_suite()?));

        Ok(Method {
            name,
            formal_params,
            body,
        })
    }

    // Suite := Newline Indent Statement+ Dedent
    fn parse_suite(&mut self) -> ParseResult<Node> {
        self.expect_token(Token::Newline, "newline")?;
        self.expect_token(Token::Indent, "indent")?;

        let mut statements = Vec::new();
        while !matches!(self.lexer.current(), Token::Dedent | Token::Eof) {
            statements.push(self.parse_statement()?);
        }
        self.expect_token(Token::Dedent, "dedent")?;

        Ok(Node::Compound(statements))
    }

    // Condition := 'if' Test ':' Suite ['else' ':' Suite]
    fn parse_condition(&mut self) -> ParseResult<Node> {
        self.expect_token(Token::If, "if")?;
        let condition = Box::new(self.parse_test()?);
        self.expect_char(':')?;
        let then_body = Box::new(self.parse_suite()?);

        let else_body = if self.consume_token(&Token::Else) {
            self.expect_char(':')?;
            Some(Box::new(self.parse_suite()?))
        } else {
            Option::None
        };

        Ok(Node::IfElse {
            condition,
            then_body,
            else_body,
        })
    }

    // Test := AndTest ('or' AndTest)*
    fn parse_test(&mut self) -> ParseResult<Node> {
        let mut result = self.parse_and_test()?;
        while self.consume_token(&Token::Or) {
            result = Node::Or {
                lhs: Box::new(result),
                rhs: Box::new(self.parse_and_test()?),
            };
        }
        Ok(result)
    }

    // AndTest := NotTest ('and' NotTest)*
    fn parse_and_test(&mut self) -> ParseResult<Node> {
        let mut result = self.parse_not_test()?;
        while self.consume_token(&Token::And) {
            result = Node::And {
                lhs: Box::new(result),
                rhs: Box::new(self.parse_not_test()?),
            };
        }
        Ok(result)
    }

    // NotTest := 'not' NotTest | Comparison
    fn parse_not_test(&mut self) -> ParseResult<Node> {
        if self.consume_token(&Token::Not) {
            return Ok(Node::Not(Box::new(self.parse_not_test()?)));
        }
        self.parse_comparison()
    }

    // Comparison := Expr [CMPOP Expr]  -- single, non-associative
    fn parse_comparison(&mut self) -> ParseResult<Node> {
        let lhs = self.parse_expr()?;

        let op = match self.lexer.current() {
            Token::Char('<') => ComparisonOp::Less,
            Token::Char('>') => ComparisonOp::Greater,
            Token::Eq => ComparisonOp::Eq,
            Token::NotEq => ComparisonOp::NotEq,
            Token::LessOrEq => ComparisonOp::LessOrEq,
            Token::GreaterOrEq => ComparisonOp::GreaterOrEq,
            _ => return Ok(lhs),
        };
        self.lexer.advance();

        Ok(Node::Comparison {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(self.parse_expr()?),
        })
    }

    // Expr := Adder (('+'|'-') Adder)*  -- left-associative
    fn parse_expr(&mut self) -> ParseResult<Node> {
        let mut result = self.parse_adder()?;
        loop {
            if self.consume_char('+') {
                result = Node::Add {
                    lhs: Box::new(result),
                    rhs: Box::new(self.parse_adder()?),
                };
            } else if self.consume_char('-') {
                result = Node::Sub {
                    lhs: Box::new(result),
                    rhs: Box::new(self.parse_adder()?),
                };
            } else {
                return Ok(result);
            }
        }
    }

    // Adder := Mult (('*'|'/') Mult)*
    fn parse_adder(&mut self) -> ParseResult<Node> {
        let mut result = self.parse_mult()?;
        loop {
            if self.consume_char('*') {
                result = Node::Mult {
                    lhs: Box::new(result),
                    rhs: Box::new(self.parse_mult()?),
                };
            } else if self.consume_char('/') {
                result = Node::Div {
                    lhs: Box::new(result),
                    rhs: Box::new(self.parse_mult()?),
                };
            } else {
                return Ok(result);
            }
        }
    }

    // Mult := '(' Test ')' | Number | '-' Mult | String
    //       | 'True' | 'False' | 'None' | DottedIds ['(' [TestList] ')']
    fn parse_mult(&mut self) -> ParseResult<Node> {
        if self.consume_char('(') {
            let inner = self.parse_test()?;
            self.expect_char(')')?;
            return Ok(inner);
        }
        if self.consume_char('-') {
            // Unary minus desugars to multiplication by -1.
            return Ok(Node::Mult {
                lhs: Box::new(self.parse_mult()?),
                rhs: Box::new(Node::NumericConst(-1)),
            });
        }

        match self.lexer.current() {
            Token::Number(value) => {
                let value = *value;
                self.lexer.advance();
                Ok(Node::NumericConst(value))
            }
            Token::Str(value) => {
                let value = value.clone();
                self.lexer.advance();
                Ok(Node::StringConst(value))
            }
            Token::True => {
                self.lexer.advance();
                Ok(Node::BoolConst(true))
            }
            Token::False => {
                self.lexer.advance();
                Ok(Node::BoolConst(false))
            }
            Token::None => {
                self.lexer.advance();
                Ok(Node::None)
            }
            _ => self.parse_dotted_expression(),
        }
    }

    fn parse_dotted_expression(&mut self) -> ParseResult<Node> {
        let (mut prefix, last) = self.parse_dotted_ids()?;

        if !self.consume_char('(') {
            prefix.push(last);
            return Ok(Node::VariableValue { dotted_ids: prefix });
        }

        let args = if !self.lexer.current().is_char(')') {
            self.parse_test_list()?
        } else {
            Vec::new()
        };
        self.expect_char(')')?;

        if !prefix.is_empty() {
            return Ok(Node::MethodCall {
                receiver: Box::new(Node::VariableValue { dotted_ids: prefix }),
                method: last,
                args,
            });
        }
        if let Some(class) = self.classes.get(&last) {
            return Ok(Node::NewInstance {
                class: Rc::clone(class),
                args,
            });
        }
        if last == "str" {
            return self.stringify_node(args);
        }
        Err(ParseError::UnknownCall { name: last })
    }

    fn stringify_node(&self, mut args: Vec<Node>) -> ParseResult<Node> {
        if args.len() != 1 {
            return Err(ParseError::StringifyArity { found: args.len() });
        }
        Ok(Node::Stringify(Box::new(args.remove(0))))
    }

    // DottedIds := Id ('.' Id)*  -- returned as (prefix path, final segment)
    fn parse_dotted_ids(&mut self) -> ParseResult<(Vec<String>, String)> {
        let mut last = self.expect_id()?;
        let mut prefix = Vec::new();
        while self.consume_char('.') {
            let next = self.expect_id()?;
            prefix.push(mem::replace(&mut last, next));
        }
        Ok((prefix, last))
    }

    // TestList := Test (',' Test)*
    fn parse_test_list(&mut self) -> ParseResult<Vec<Node>> {
        let mut result = vec![self.parse_test()?];
        while self.consume_char(',') {
            result.push(self.parse_test()?);
        }
        Ok(result)
    }

    fn expect_id(&mut self) -> ParseResult<String> {
        if let Token::Id(name) = self.lexer.current() {
            let name = name.clone();
            self.lexer.advance();
            return Ok(name);
        }
        Err(self.unexpected("identifier"))
    }

    fn expect_char(&mut self, expected: char) -> ParseResult<()> {
        if self.lexer.current().is_char(expected) {
            self.lexer.advance();
            return Ok(());
        }
        Err(self.unexpected(&format!("'{expected}'")))
    }

    fn expect_token(&mut self, expected: Token, description: &str) -> ParseResult<()> {
        if *self.lexer.current() == expected {
            self.lexer.advance();
            return Ok(());
        }
        Err(self.unexpected(description))
    }

    fn consume_char(&mut self, expected: char) -> bool {
        if self.lexer.current().is_char(expected) {
            self.lexer.advance();
            return true;
        }
        false
    }

    fn consume_token(&mut self, expected: &Token) -> bool {
        if self.lexer.current() == expected {
            self.lexer.advance();
            return true;
        }
        false
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        ParseError::UnexpectedToken {
            expected: expected.to_string(),
            found: self.lexer.current().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn parse(source: &str) -> Program {
        let lexer = Lexer::new(source).expect("lexing should succeed");
        parse_program(lexer).expect("parsing should succeed")
    }

    fn parse_err(source: &str) -> ParseError {
        let lexer = Lexer::new(source).expect("lexing should succeed");
        parse_program(lexer).expect_err("expected a parse error")
    }

    #[test]
    fn parses_assignment_and_print() {
        let program = parse("n = 4 + 4\nprint n\n");
        let expected = Node::Compound(vec![
            Node::Assignment {
                name: "n".to_string(),
                value: Box::new(Node::Add {
                    lhs: Box::new(Node::NumericConst(4)),
                    rhs: Box::new(Node::NumericConst(4)),
                }),
            },
            Node::Print(vec![Node::variable("n")]),
        ]);
        assert_eq!(program.body, expected);
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let program = parse("x = 1 + 2 * 3\n");
        let expected = Node::Compound(vec![Node::Assignment {
            name: "x".to_string(),
            value: Box::new(Node::Add {
                lhs: Box::new(Node::NumericConst(1)),
                rhs: Box::new(Node::Mult {
                    lhs: Box::new(Node::NumericConst(2)),
                    rhs: Box::new(Node::NumericConst(3)),
                }),
            }),
        }]);
        assert_eq!(program.body, expected);
    }

    #[test]
    fn unary_minus_desugars_to_multiplication() {
        let program = parse("x = -y\n");
        let expected = Node::Compound(vec![Node::Assignment {
            name: "x".to_string(),
            value: Box::new(Node::Mult {
                lhs: Box::new(Node::variable("y")),
                rhs: Box::new(Node::NumericConst(-1)),
            }),
        }]);
        assert_eq!(program.body, expected);
    }

    #[test]
    fn comparison_takes_a_single_operator() {
        let program = parse("x = 1 < 2\n");
        let expected = Node::Compound(vec![Node::Assignment {
            name: "x".to_string(),
            value: Box::new(Node::Comparison {
                op: ComparisonOp::Less,
                lhs: Box::new(Node::NumericConst(1)),
                rhs: Box::new(Node::NumericConst(2)),
            }),
        }]);
        assert_eq!(program.body, expected);

        let err = parse_err("x = 1 < 2 < 3\n");
        assert!(matches!(err, ParseError::UnexpectedToken { .. }));
    }

    #[test]
    fn logic_operators_nest_or_over_and_over_not() {
        let program = parse("x = not a and b or c\n");
        let expected = Node::Compound(vec![Node::Assignment {
            name: "x".to_string(),
            value: Box::new(Node::Or {
                lhs: Box::new(Node::And {
                    lhs: Box::new(Node::Not(Box::new(Node::variable("a")))),
                    rhs: Box::new(Node::variable("b")),
                }),
                rhs: Box::new(Node::variable("c")),
            }),
        }]);
        assert_eq!(program.body, expected);
    }

    #[test]
    fn parses_dotted_assignment_and_method_call() {
        let program = parse("a.b.c = 1\na.b.f(2, 3)\n");
        let expected = Node::Compound(vec![
            Node::FieldAssignment {
                receiver: Box::new(Node::VariableValue {
                    dotted_ids: vec!["a".to_string(), "b".to_string()],
                }),
                field: "c".to_string(),
                value: Box::new(Node::NumericConst(1)),
            },
            Node::MethodCall {
                receiver: Box::new(Node::VariableValue {
                    dotted_ids: vec!["a".to_string(), "b".to_string()],
                }),
                method: "f".to_string(),
                args: vec![Node::NumericConst(2), Node::NumericConst(3)],
            },
        ]);
        assert_eq!(program.body, expected);
    }

    #[test]
    fn parses_class_definition_and_new_instance() {
        let program = parse(indoc! {"
            class Point:
              def __init__(self, x):
                self.x = x

            p = Point(3)
        "});

        let class = program
            .classes
            .get("Point")
            .expect("Point should be registered");
        assert_eq!(class.name(), "Point");
        let init = class.get_method("__init__").expect("__init__ exists");
        assert_eq!(init.formal_params, vec!["x".to_string()]);

        let Node::Compound(statements) = &program.body else {
            panic!("program body must be a compound");
        };
        assert!(matches!(&statements[0], Node::ClassDefinition(c) if c.name() == "Point"));
        assert!(matches!(
            &statements[1],
            Node::Assignment { name, value } if name == "p"
                && matches!(value.as_ref(), Node::NewInstance { class, args }
                    if class.name() == "Point" && args.len() == 1)
        ));
    }

    #[test]
    fn parses_inheritance_from_registered_base() {
        let program = parse(indoc! {"
            class A:
              def f(self):
                return 1

            class B(A):
              def g(self):
                return 2
        "});
        let b = program.classes.get("B").expect("B should be registered");
        let parent = b.parent().expect("B should have a parent");
        assert_eq!(parent.name(), "A");
        assert!(b.get_method("f").is_some());
    }

    #[test]
    fn rejects_unknown_base_class() {
        let err = parse_err(indoc! {"
            class B(A):
              def g(self):
                return 2
        "});
        assert_eq!(
            err,
            ParseError::UnknownBaseClass {
                base: "A".to_string(),
                class: "B".to_string()
            }
        );
    }

    #[test]
    fn rejects_duplicate_class() {
        let err = parse_err(indoc! {"
            class A:
              def f(self):
                return 1

            class A:
              def g(self):
                return 2
        "});
        assert_eq!(
            err,
            ParseError::DuplicateClass {
                name: "A".to_string()
            }
        );
    }

    #[test]
    fn rejects_receiverless_call() {
        let err = parse_err("foo()\n");
        assert_eq!(
            err,
            ParseError::FreeFunctionCall {
                name: "foo".to_string()
            }
        );
        assert!(err.to_string().contains("only methods"));

        let err = parse_err("x = foo()\n");
        assert_eq!(
            err,
            ParseError::UnknownCall {
                name: "foo".to_string()
            }
        );
    }

    #[test]
    fn recognizes_stringify() {
        let program = parse("x = str(1)\n");
        let expected = Node::Compound(vec![Node::Assignment {
            name: "x".to_string(),
            value: Box::new(Node::Stringify(Box::new(Node::NumericConst(1)))),
        }]);
        assert_eq!(program.body, expected);

        let err = parse_err("x = str(1, 2)\n");
        assert_eq!(err, ParseError::StringifyArity { found: 2 });
    }

    #[test]
    fn parses_if_else_with_suites() {
        let program = parse(indoc! {"
            if a > 1:
              print 'more'
            else:
              print 'less'
        "});
        let expected = Node::Compound(vec![Node::IfElse {
            condition: Box::new(Node::Comparison {
                op: ComparisonOp::Greater,
                lhs: Box::new(Node::variable("a")),
                rhs: Box::new(Node::NumericConst(1)),
            }),
            then_body: Box::new(Node::Compound(vec![Node::Print(vec![Node::StringConst(
                "more".to_string(),
            )])])),
            else_body: Some(Box::new(Node::Compound(vec![Node::Print(vec![
                Node::StringConst("less".to_string()),
            ])]))),
        }]);
        assert_eq!(program.body, expected);
    }

    #[test]
    fn method_bodies_are_wrapped() {
        let program = parse(indoc! {"
            class C:
              def f(self):
                return 1
        "});
        let class = program.classes.get("C").expect("C should be registered");
        let method = class.get_method("f").expect("f exists");
        assert!(matches!(&method.body, Node::MethodBody(_)));
    }

    #[test]
    fn class_body_requires_methods() {
        let err = parse_err(indoc! {"
            class C:
              x = 1
        "});
        assert!(matches!(err, ParseError::UnexpectedToken { .. }));
    }
}
