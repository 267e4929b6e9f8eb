use thiserror::Error;

use crate::token::Token;

/// Number of spaces per indentation level.
const SPACES_PER_INDENT: usize = 2;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LexError {
    #[error("Unexpected character '{character}' at position {position}")]
    UnexpectedCharacter { character: char, position: usize },
    #[error("Indent at position {position} contains an odd number of spaces ({count})")]
    OddIndentation { count: usize, position: usize },
    #[error("Unterminated string literal at position {position}")]
    UnterminatedString { position: usize },
    #[error("Unrecognized escape sequence '\\{escape}' at position {position}")]
    UnknownEscape { escape: char, position: usize },
    #[error("Line break inside string literal at position {position}")]
    StringLineBreak { position: usize },
    #[error("Invalid integer literal '{literal}' at position {position}")]
    InvalidIntegerLiteral { literal: String, position: usize },
}

pub type LexResult<T> = Result<T, LexError>;

/// Materialized token stream with a read cursor.
///
/// The whole input is scanned up front, so every lex error surfaces at
/// construction time. `current` peeks, `advance` moves one token forward and
/// peeks, saturating at the trailing `Eof`.
pub struct Lexer {
    tokens: Vec<Token>,
    pos: usize,
}

impl Lexer {
    pub fn new(input: &str) -> LexResult<Self> {
        Ok(Self {
            tokens: tokenize(input)?,
            pos: 0,
        })
    }

    pub fn current(&self) -> &Token {
        &self.tokens[self.pos]
    }

    pub fn advance(&mut self) -> &Token {
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        self.current()
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }
}

/// Scans `input` into a complete token vector terminated by exactly one
/// [`Token::Eof`].
pub fn tokenize(input: &str) -> LexResult<Vec<Token>> {
    Scanner::new(input).run()
}

struct Scanner<'a> {
    input: &'a str,
    pos: usize,
    indent_level: usize,
    tokens: Vec<Token>,
}

impl<'a> Scanner<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            indent_level: 0,
            tokens: Vec::new(),
        }
    }

    fn run(mut self) -> LexResult<Vec<Token>> {
        // Leading spaces on the first line are not indentation.
        self.skip_spaces();

        while self.peek_char().is_some() {
            let start = self.pos;

            self.scan_word();
            self.scan_operator_or_symbol();
            self.scan_number()?;
            self.scan_string()?;
            self.skip_spaces();
            self.scan_comment();
            self.scan_newline();
            self.scan_indentation()?;

            if self.pos == start {
                let character = self.peek_char().unwrap_or_default();
                return Err(LexError::UnexpectedCharacter {
                    character,
                    position: self.pos,
                });
            }
        }

        if let Some(last) = self.tokens.last()
            && !matches!(last, Token::Newline | Token::Dedent)
        {
            self.tokens.push(Token::Newline);
        }
        // Close any indentation still open so Indent/Dedent stay balanced.
        while self.indent_level > 0 {
            self.tokens.push(Token::Dedent);
            self.indent_level -= 1;
        }
        self.tokens.push(Token::Eof);

        Ok(self.tokens)
    }

    fn scan_word(&mut self) {
        let Some(c) = self.peek_char() else { return };
        if !c.is_ascii_alphabetic() && c != '_' {
            return;
        }

        let start = self.pos;
        self.consume_while(|c| c.is_ascii_alphanumeric() || c == '_');
        let word = &self.input[start..self.pos];

        let token = match word {
            "class" => Token::Class,
            "return" => Token::Return,
            "if" => Token::If,
            "else" => Token::Else,
            "def" => Token::Def,
            "print" => Token::Print,
            "and" => Token::And,
            "or" => Token::Or,
            "not" => Token::Not,
            "None" => Token::None,
            "True" => Token::True,
            "False" => Token::False,
            _ => Token::Id(word.to_string()),
        };
        self.tokens.push(token);
    }

    fn scan_operator_or_symbol(&mut self) {
        let Some(c) = self.peek_char() else { return };
        // Quotes and '#' belong to the string and comment rules.
        if !c.is_ascii_punctuation() || matches!(c, '\'' | '"' | '#') {
            return;
        }

        self.consume_char();
        let token = match (c, self.peek_char()) {
            ('=', Some('=')) => {
                self.consume_char();
                Token::Eq
            }
            ('!', Some('=')) => {
                self.consume_char();
                Token::NotEq
            }
            ('<', Some('=')) => {
                self.consume_char();
                Token::LessOrEq
            }
            ('>', Some('=')) => {
                self.consume_char();
                Token::GreaterOrEq
            }
            _ => Token::Char(c),
        };
        self.tokens.push(token);
    }

    fn scan_number(&mut self) -> LexResult<()> {
        let Some(c) = self.peek_char() else {
            return Ok(());
        };
        if !c.is_ascii_digit() {
            return Ok(());
        }

        let start = self.pos;
        self.consume_while(|c| c.is_ascii_digit());
        let literal = &self.input[start..self.pos];
        let value = literal
            .parse::<i64>()
            .map_err(|_| LexError::InvalidIntegerLiteral {
                literal: literal.to_string(),
                position: start,
            })?;
        self.tokens.push(Token::Number(value));
        Ok(())
    }

    fn scan_string(&mut self) -> LexResult<()> {
        let Some(quote) = self.peek_char() else {
            return Ok(());
        };
        if quote != '\'' && quote != '"' {
            return Ok(());
        }

        let start = self.pos;
        self.consume_char();

        let mut contents = String::new();
        loop {
            let Some(c) = self.consume_char() else {
                return Err(LexError::UnterminatedString { position: start });
            };
            if c == quote {
                break;
            }
            match c {
                '\\' => {
                    let position = self.pos;
                    let Some(escape) = self.consume_char() else {
                        return Err(LexError::UnterminatedString { position: start });
                    };
                    contents.push(match escape {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        '"' => '"',
                        '\'' => '\'',
                        '\\' => '\\',
                        other => {
                            return Err(LexError::UnknownEscape {
                                escape: other,
                                position,
                            });
                        }
                    });
                }
                '\n' | '\r' => {
                    return Err(LexError::StringLineBreak { position: start });
                }
                other => contents.push(other),
            }
        }

        self.tokens.push(Token::Str(contents));
        Ok(())
    }

    fn scan_comment(&mut self) {
        if self.peek_char() != Some('#') {
            return;
        }

        self.consume_while(|c| c != '\n');
        self.consume_char(); // line break, if any

        // A trailing comment still terminates the line it shares with code.
        if let Some(last) = self.tokens.last()
            && !matches!(last, Token::Newline | Token::Dedent)
        {
            self.tokens.push(Token::Newline);
        }
    }

    fn scan_newline(&mut self) {
        if self.peek_char() != Some('\n') {
            return;
        }

        self.consume_char();
        // Blank and leading empty lines collapse: never two Newlines in a row.
        if let Some(last) = self.tokens.last()
            && *last != Token::Newline
        {
            self.tokens.push(Token::Newline);
        }
    }

    fn scan_indentation(&mut self) -> LexResult<()> {
        if !matches!(self.tokens.last(), Some(Token::Newline)) {
            return Ok(());
        }
        if self.peek_char() == Some('\n') {
            return Ok(());
        }

        let start = self.pos;
        let count = self.consume_while(|c| c == ' ');

        // Blank lines, comment-only lines, and EOF leave the level untouched.
        match self.peek_char() {
            Option::None | Some('\n') | Some('#') => return Ok(()),
            _ => {}
        }

        if count % SPACES_PER_INDENT != 0 {
            return Err(LexError::OddIndentation {
                count,
                position: start,
            });
        }

        let level = count / SPACES_PER_INDENT;
        while self.indent_level < level {
            self.tokens.push(Token::Indent);
            self.indent_level += 1;
        }
        while self.indent_level > level {
            self.tokens.push(Token::Dedent);
            self.indent_level -= 1;
        }
        Ok(())
    }

    fn skip_spaces(&mut self) {
        self.consume_while(|c| c == ' ');
    }

    fn consume_while<P>(&mut self, keep: P) -> usize
    where
        P: Fn(char) -> bool,
    {
        let start = self.pos;
        while let Some(c) = self.peek_char() {
            if !keep(c) {
                break;
            }
            self.consume_char();
        }
        self.pos - start
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn consume_char(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        Some(c)
    }
}
