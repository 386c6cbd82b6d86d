//! Formula parser
//!
//! A recursive descent parser with operator precedence. Syntax errors are
//! reported to an [`ErrorListener`]; parsing stops at the first one.

use crate::ast::{BinaryOperator, FormulaExpr, Literal, UnaryOperator};
use crate::error::{FormulaResult, FormulaSyntaxError};
use crate::error_listener::{
    line_column, Diagnostic, DiagnosticKind, ErrorListener, FormulaErrorListener, EOF_TOKEN,
};

/// Maximum syntactic nesting (parentheses, call arguments, operator chains)
///
/// Evaluation walks the tree recursively, so this also bounds evaluation depth.
pub const MAX_NESTING_DEPTH: usize = 256;

/// Parse a formula string into an AST
///
/// # Example
/// ```rust
/// use gridbase_formula::parse_formula;
///
/// let ast = parse_formula("1 + 2").unwrap();
/// let ast = parse_formula("SUM({fldPrice}, 10)").unwrap();
/// let ast = parse_formula("IF({fldAge} > 18, 'adult', 'minor')").unwrap();
/// ```
pub fn parse_formula(source: &str) -> FormulaResult<FormulaExpr> {
    let mut listener = FormulaErrorListener::new();
    match parse_with_listener(source, &mut listener) {
        Some(expr) if !listener.has_error() => Ok(expr),
        _ => Err(listener
            .into_error()
            .unwrap_or_else(|| end_of_input_error(source))
            .into()),
    }
}

/// Syntax error positioned at the end of `source`
fn end_of_input_error(source: &str) -> FormulaSyntaxError {
    let (line, column) = line_column(source, source.len());
    FormulaSyntaxError {
        token: EOF_TOKEN.to_string(),
        line,
        column,
        message: "Unexpected end of formula".to_string(),
    }
}

/// Parse a formula, reporting the first syntax error to `listener`
///
/// Returns `None` when an error was reported.
pub fn parse_with_listener(source: &str, listener: &mut dyn ErrorListener) -> Option<FormulaExpr> {
    let result = FormulaParser::new(source).and_then(|mut parser| parser.parse_root());
    match result {
        Ok(expr) => Some(expr),
        Err(diagnostic) => {
            listener.syntax_error(source, diagnostic);
            None
        }
    }
}

type ParseResult<T> = std::result::Result<T, Diagnostic>;

/// Token types
#[derive(Debug, Clone, PartialEq)]
enum Token {
    // Literals
    Number(f64),
    String(String),
    Boolean(bool),

    // Identifiers and references
    Identifier(String),
    Field(String),

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Ampersand,
    AmpAmp,
    PipePipe,
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
    Comma,

    // Delimiters
    LeftParen,
    RightParen,

    // End of input
    Eof,
}

/// A parsed subtree and its height
struct Node {
    expr: FormulaExpr,
    depth: usize,
}

impl Node {
    fn leaf(expr: FormulaExpr) -> Self {
        Self { expr, depth: 1 }
    }
}

/// Formula parser
struct FormulaParser<'a> {
    input: &'a str,
    pos: usize,
    current_token: Token,
    /// Byte offset where the current token starts
    token_start: usize,
    /// Open parentheses and call argument lists
    nesting: usize,
}

impl<'a> FormulaParser<'a> {
    fn new(input: &'a str) -> ParseResult<Self> {
        let mut parser = Self {
            input,
            pos: 0,
            current_token: Token::Eof,
            token_start: 0,
            nesting: 0,
        };
        parser.advance_token()?;
        Ok(parser)
    }

    fn parse_root(&mut self) -> ParseResult<FormulaExpr> {
        let node = self.parse_expression()?;

        // Make sure we consumed all input
        if self.current_token != Token::Eof {
            return Err(self.error_here(DiagnosticKind::TrailingInput));
        }

        Ok(node.expr)
    }

    // === Token scanning ===

    fn advance_token(&mut self) -> ParseResult<()> {
        self.skip_trivia()?;
        self.token_start = self.pos;
        self.current_token = self.scan_token()?;
        Ok(())
    }

    fn scan_token(&mut self) -> ParseResult<Token> {
        let c = match self.peek_char() {
            Some(c) => c,
            None => return Ok(Token::Eof),
        };

        // Single-character tokens
        let single = match c {
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '*' => Some(Token::Star),
            '/' => Some(Token::Slash),
            '%' => Some(Token::Percent),
            ',' => Some(Token::Comma),
            '(' => Some(Token::LeftParen),
            ')' => Some(Token::RightParen),
            '=' => Some(Token::Equal),
            _ => None,
        };
        if let Some(token) = single {
            self.advance();
            return Ok(token);
        }

        // One- or two-character operators
        match c {
            '&' => {
                self.advance();
                if self.peek_char() == Some('&') {
                    self.advance();
                    return Ok(Token::AmpAmp);
                }
                return Ok(Token::Ampersand);
            }
            '|' => {
                self.advance();
                if self.peek_char() == Some('|') {
                    self.advance();
                    return Ok(Token::PipePipe);
                }
                return Err(self.error_from(self.token_start, DiagnosticKind::InvalidCharacter));
            }
            '!' => {
                self.advance();
                if self.peek_char() == Some('=') {
                    self.advance();
                    return Ok(Token::NotEqual);
                }
                return Err(self.error_from(self.token_start, DiagnosticKind::InvalidCharacter));
            }
            '<' => {
                self.advance();
                if self.peek_char() == Some('=') {
                    self.advance();
                    return Ok(Token::LessEqual);
                } else if self.peek_char() == Some('>') {
                    self.advance();
                    return Ok(Token::NotEqual);
                }
                return Ok(Token::LessThan);
            }
            '>' => {
                self.advance();
                if self.peek_char() == Some('=') {
                    self.advance();
                    return Ok(Token::GreaterEqual);
                }
                return Ok(Token::GreaterThan);
            }
            _ => {}
        }

        // String literal
        if c == '"' || c == '\'' {
            return self.scan_string(c);
        }

        // Field reference
        if c == '{' {
            return self.scan_field();
        }

        // Number
        if c.is_ascii_digit()
            || (c == '.' && self.peek_char_at(1).map_or(false, |c| c.is_ascii_digit()))
        {
            return self.scan_number();
        }

        // Function name or boolean
        if c.is_alphabetic() || c == '_' {
            return Ok(self.scan_identifier());
        }

        // Unknown character
        self.advance();
        Err(self.error_from(self.token_start, DiagnosticKind::InvalidCharacter))
    }

    /// Scan the body of a quoted or braced token, resolving backslash escapes
    fn scan_delimited(&mut self, close: char) -> Option<String> {
        let mut s = String::new();
        while let Some(c) = self.peek_char() {
            self.advance();
            if c == close {
                return Some(s);
            }
            if c == '\\' {
                match self.peek_char() {
                    Some(escaped) => {
                        self.advance();
                        s.push(match escaped {
                            'n' => '\n',
                            'r' => '\r',
                            't' => '\t',
                            other => other,
                        });
                    }
                    None => return None,
                }
            } else {
                s.push(c);
            }
        }
        None
    }

    fn scan_string(&mut self, quote: char) -> ParseResult<Token> {
        self.advance(); // Skip opening quote
        match self.scan_delimited(quote) {
            Some(s) => Ok(Token::String(s)),
            None => Err(self.error_from(self.token_start, DiagnosticKind::UnterminatedString)),
        }
    }

    fn scan_field(&mut self) -> ParseResult<Token> {
        self.advance(); // Skip '{'
        match self.scan_delimited('}') {
            Some(key) if key.trim().is_empty() => {
                Err(self.error_from(self.token_start, DiagnosticKind::EmptyFieldReference))
            }
            Some(key) => Ok(Token::Field(key)),
            None => Err(self.error_from(
                self.token_start,
                DiagnosticKind::UnterminatedFieldReference,
            )),
        }
    }

    fn scan_number(&mut self) -> ParseResult<Token> {
        let start = self.pos;

        // Integer part
        while self.peek_char().map_or(false, |c| c.is_ascii_digit()) {
            self.advance();
        }

        // Decimal part
        if self.peek_char() == Some('.') {
            self.advance();
            while self.peek_char().map_or(false, |c| c.is_ascii_digit()) {
                self.advance();
            }
        }

        // Exponent part, only when digits follow
        if self.peek_char().map_or(false, |c| c == 'e' || c == 'E') {
            let signed = self
                .peek_char_at(1)
                .map_or(false, |c| c == '+' || c == '-');
            let digit_at = if signed { 2 } else { 1 };
            if self
                .peek_char_at(digit_at)
                .map_or(false, |c| c.is_ascii_digit())
            {
                for _ in 0..digit_at {
                    self.advance();
                }
                while self.peek_char().map_or(false, |c| c.is_ascii_digit()) {
                    self.advance();
                }
            }
        }

        let num_str = &self.input[start..self.pos];
        match num_str.parse::<f64>() {
            Ok(n) if n.is_finite() => Ok(Token::Number(n)),
            _ => Err(self.error_from(start, DiagnosticKind::InvalidNumber)),
        }
    }

    fn scan_identifier(&mut self) -> Token {
        let start = self.pos;
        while self
            .peek_char()
            .map_or(false, |c| c.is_alphanumeric() || c == '_')
        {
            self.advance();
        }
        let text = &self.input[start..self.pos];

        // TRUE/FALSE are literals unless called like functions
        if !self.next_non_trivia_is('(') {
            let upper = text.to_uppercase();
            if upper == "TRUE" {
                return Token::Boolean(true);
            }
            if upper == "FALSE" {
                return Token::Boolean(false);
            }
        }

        Token::Identifier(text.to_string())
    }

    // === Helper methods ===

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_char_at(&self, offset: usize) -> Option<char> {
        self.input[self.pos..].chars().nth(offset)
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek_char() {
            self.pos += c.len_utf8();
        }
    }

    fn next_non_trivia_is(&self, expected: char) -> bool {
        self.input[self.pos..].trim_start().starts_with(expected)
    }

    /// Skip whitespace, `//` line comments and `/* */` block comments
    fn skip_trivia(&mut self) -> ParseResult<()> {
        loop {
            while self.peek_char().map_or(false, |c| c.is_whitespace()) {
                self.advance();
            }

            let rest = &self.input[self.pos..];
            if rest.starts_with("//") {
                let len = rest.find('\n').unwrap_or(rest.len());
                self.pos += len;
            } else if rest.starts_with("/*") {
                match rest[2..].find("*/") {
                    Some(end) => self.pos += end + 4,
                    None => {
                        return Err(Diagnostic {
                            kind: DiagnosticKind::UnterminatedComment,
                            offset: self.pos,
                            token: "/*".into(),
                        })
                    }
                }
            } else {
                return Ok(());
            }
        }
    }

    fn token_text(&self) -> String {
        if self.current_token == Token::Eof {
            EOF_TOKEN.to_string()
        } else {
            self.input[self.token_start..self.pos].to_string()
        }
    }

    fn error_here(&self, kind: DiagnosticKind) -> Diagnostic {
        Diagnostic {
            kind,
            offset: self.token_start,
            token: self.token_text(),
        }
    }

    fn error_from(&self, start: usize, kind: DiagnosticKind) -> Diagnostic {
        let end = self.pos.max(start);
        Diagnostic {
            kind,
            offset: start,
            token: self.input[start..end].to_string(),
        }
    }

    /// Report that something else was expected at the current token
    fn unexpected(&self, expected: &'static str) -> Diagnostic {
        if self.current_token == Token::Eof {
            self.error_here(DiagnosticKind::UnexpectedEnd { expected })
        } else {
            self.error_here(DiagnosticKind::UnexpectedToken { expected })
        }
    }

    fn consume(&mut self) -> ParseResult<Token> {
        let token = std::mem::replace(&mut self.current_token, Token::Eof);
        self.advance_token()?;
        Ok(token)
    }

    fn expect(&mut self, expected: &Token, description: &'static str) -> ParseResult<()> {
        if &self.current_token == expected {
            self.consume()?;
            Ok(())
        } else {
            Err(self.unexpected(description))
        }
    }

    fn binary(&self, op: BinaryOperator, left: Node, right: Node, at: usize) -> ParseResult<Node> {
        let depth = left.depth.max(right.depth) + 1;
        if depth > MAX_NESTING_DEPTH {
            return Err(Diagnostic {
                kind: DiagnosticKind::TooDeeplyNested {
                    limit: MAX_NESTING_DEPTH,
                },
                offset: at,
                token: op.symbol().to_string(),
            });
        }
        Ok(Node {
            expr: FormulaExpr::Binary {
                op,
                left: Box::new(left.expr),
                right: Box::new(right.expr),
            },
            depth,
        })
    }

    fn enter(&mut self) -> ParseResult<()> {
        self.nesting += 1;
        if self.nesting > MAX_NESTING_DEPTH {
            return Err(self.error_here(DiagnosticKind::TooDeeplyNested {
                limit: MAX_NESTING_DEPTH,
            }));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.nesting -= 1;
    }

    // === Expression parsing with precedence ===
    // Precedence (lowest to highest):
    // 1. Logical or: ||
    // 2. Logical and: &&
    // 3. Equality: =, !=, <>
    // 4. Relational: <, <=, >, >=
    // 5. Concatenation: &
    // 6. Addition/Subtraction: +, -
    // 7. Multiplication/Division/Remainder: *, /, %
    // 8. Unary: -, +
    // 9. Primary: literals, field references, function calls, parentheses

    fn parse_expression(&mut self) -> ParseResult<Node> {
        self.parse_or()
    }

    /// Parse one left-associative precedence level
    fn parse_level(
        &mut self,
        operator: fn(&Token) -> Option<BinaryOperator>,
        next: fn(&mut Self) -> ParseResult<Node>,
    ) -> ParseResult<Node> {
        let mut left = next(self)?;

        while let Some(op) = operator(&self.current_token) {
            let at = self.token_start;
            self.consume()?;
            let right = next(self)?;
            left = self.binary(op, left, right, at)?;
        }

        Ok(left)
    }

    fn parse_or(&mut self) -> ParseResult<Node> {
        self.parse_level(
            |token| match token {
                Token::PipePipe => Some(BinaryOperator::Or),
                _ => None,
            },
            Self::parse_and,
        )
    }

    fn parse_and(&mut self) -> ParseResult<Node> {
        self.parse_level(
            |token| match token {
                Token::AmpAmp => Some(BinaryOperator::And),
                _ => None,
            },
            Self::parse_equality,
        )
    }

    fn parse_equality(&mut self) -> ParseResult<Node> {
        self.parse_level(
            |token| match token {
                Token::Equal => Some(BinaryOperator::Equal),
                Token::NotEqual => Some(BinaryOperator::NotEqual),
                _ => None,
            },
            Self::parse_relational,
        )
    }

    fn parse_relational(&mut self) -> ParseResult<Node> {
        self.parse_level(
            |token| match token {
                Token::LessThan => Some(BinaryOperator::LessThan),
                Token::LessEqual => Some(BinaryOperator::LessEqual),
                Token::GreaterThan => Some(BinaryOperator::GreaterThan),
                Token::GreaterEqual => Some(BinaryOperator::GreaterEqual),
                _ => None,
            },
            Self::parse_concatenation,
        )
    }

    fn parse_concatenation(&mut self) -> ParseResult<Node> {
        self.parse_level(
            |token| match token {
                Token::Ampersand => Some(BinaryOperator::Concat),
                _ => None,
            },
            Self::parse_additive,
        )
    }

    fn parse_additive(&mut self) -> ParseResult<Node> {
        self.parse_level(
            |token| match token {
                Token::Plus => Some(BinaryOperator::Add),
                Token::Minus => Some(BinaryOperator::Subtract),
                _ => None,
            },
            Self::parse_multiplicative,
        )
    }

    fn parse_multiplicative(&mut self) -> ParseResult<Node> {
        self.parse_level(
            |token| match token {
                Token::Star => Some(BinaryOperator::Multiply),
                Token::Slash => Some(BinaryOperator::Divide),
                Token::Percent => Some(BinaryOperator::Modulo),
                _ => None,
            },
            Self::parse_unary,
        )
    }

    fn parse_unary(&mut self) -> ParseResult<Node> {
        // Prefix unary minus
        if matches!(self.current_token, Token::Minus) {
            self.enter()?;
            self.consume()?;
            let operand = self.parse_unary()?;
            self.leave();
            return Ok(Node {
                expr: FormulaExpr::Unary {
                    op: UnaryOperator::Negate,
                    operand: Box::new(operand.expr),
                },
                depth: operand.depth + 1,
            });
        }

        // Prefix plus (no-op)
        if matches!(self.current_token, Token::Plus) {
            self.enter()?;
            self.consume()?;
            let operand = self.parse_unary();
            self.leave();
            return operand;
        }

        self.parse_primary()
    }

    fn parse_primary(&mut self) -> ParseResult<Node> {
        match self.current_token.clone() {
            Token::Number(n) => {
                self.consume()?;
                Ok(Node::leaf(FormulaExpr::Literal(Literal::Number(n))))
            }

            Token::String(s) => {
                self.consume()?;
                Ok(Node::leaf(FormulaExpr::Literal(Literal::String(s))))
            }

            Token::Boolean(b) => {
                self.consume()?;
                Ok(Node::leaf(FormulaExpr::Literal(Literal::Boolean(b))))
            }

            Token::Field(key) => {
                self.consume()?;
                Ok(Node::leaf(FormulaExpr::FieldRef(key)))
            }

            Token::LeftParen => {
                self.enter()?;
                self.consume()?;
                let node = self.parse_expression()?;
                self.expect(&Token::RightParen, "')'")?;
                self.leave();
                Ok(node)
            }

            Token::Identifier(name) => {
                self.consume()?;
                if matches!(self.current_token, Token::LeftParen) {
                    self.parse_function_call(name)
                } else {
                    Err(self.unexpected("'(' after function name"))
                }
            }

            _ => Err(self.unexpected("an expression")),
        }
    }

    fn parse_function_call(&mut self, name: String) -> ParseResult<Node> {
        self.enter()?;
        self.expect(&Token::LeftParen, "'('")?;

        let mut args = Vec::new();
        let mut depth = 0;

        // Parse arguments
        if !matches!(self.current_token, Token::RightParen) {
            let arg = self.parse_expression()?;
            depth = depth.max(arg.depth);
            args.push(arg.expr);

            while matches!(self.current_token, Token::Comma) {
                self.consume()?;
                let arg = self.parse_expression()?;
                depth = depth.max(arg.depth);
                args.push(arg.expr);
            }
        }

        self.expect(&Token::RightParen, "',' or ')'")?;
        self.leave();

        Ok(Node {
            expr: FormulaExpr::Call {
                name: name.to_uppercase(),
                args,
            },
            depth: depth + 1,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FormulaError;
    use pretty_assertions::assert_eq;

    fn syntax_error(source: &str) -> FormulaSyntaxError {
        match parse_formula(source) {
            Err(FormulaError::Syntax(e)) => e,
            other => panic!("Expected syntax error for {:?}, got {:?}", source, other),
        }
    }

    #[test]
    fn test_end_of_input_error_is_positioned_syntax_error() {
        assert_eq!(
            end_of_input_error("1 +\n  2 *"),
            FormulaSyntaxError {
                token: "<EOF>".to_string(),
                line: 2,
                column: 5,
                message: "Unexpected end of formula".to_string(),
            }
        );
        assert!(matches!(
            FormulaError::from(end_of_input_error("")),
            FormulaError::Syntax(FormulaSyntaxError { line: 1, column: 0, .. })
        ));
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_formula("42").unwrap(), FormulaExpr::number(42.0));
        assert_eq!(parse_formula("3.14").unwrap(), FormulaExpr::number(3.14));
        assert_eq!(parse_formula("1e10").unwrap(), FormulaExpr::number(1e10));
        assert_eq!(parse_formula(".5").unwrap(), FormulaExpr::number(0.5));
    }

    #[test]
    fn test_parse_string() {
        assert_eq!(
            parse_formula("\"Hello\"").unwrap(),
            FormulaExpr::string("Hello")
        );
        assert_eq!(
            parse_formula("'it\\'s'").unwrap(),
            FormulaExpr::string("it's")
        );
        assert_eq!(
            parse_formula("\"a\\nb\"").unwrap(),
            FormulaExpr::string("a\nb")
        );
    }

    #[test]
    fn test_parse_boolean() {
        assert_eq!(parse_formula("TRUE").unwrap(), FormulaExpr::boolean(true));
        assert_eq!(parse_formula("false").unwrap(), FormulaExpr::boolean(false));
    }

    #[test]
    fn test_parse_field_reference() {
        assert_eq!(
            parse_formula("{fldAbc123}").unwrap(),
            FormulaExpr::field("fldAbc123")
        );
        assert_eq!(
            parse_formula("{Unit Price}").unwrap(),
            FormulaExpr::field("Unit Price")
        );
        assert_eq!(
            parse_formula("{a\\}b}").unwrap(),
            FormulaExpr::field("a}b")
        );
    }

    #[test]
    fn test_parse_arithmetic_precedence() {
        let ast = parse_formula("1+2*3").unwrap();
        if let FormulaExpr::Binary { op, left, right } = ast {
            assert_eq!(op, BinaryOperator::Add);
            assert_eq!(*left, FormulaExpr::number(1.0));
            assert!(matches!(
                *right,
                FormulaExpr::Binary {
                    op: BinaryOperator::Multiply,
                    ..
                }
            ));
        } else {
            panic!("Expected Binary");
        }
    }

    #[test]
    fn test_parse_left_associative() {
        let ast = parse_formula("10 - 4 - 3").unwrap();
        assert_eq!(ast.to_string(), "10 - 4 - 3");
        if let FormulaExpr::Binary { left, .. } = ast {
            assert!(matches!(
                *left,
                FormulaExpr::Binary {
                    op: BinaryOperator::Subtract,
                    ..
                }
            ));
        } else {
            panic!("Expected Binary");
        }
    }

    #[test]
    fn test_parse_logical_and_comparison() {
        let ast = parse_formula("{a} > 1 && {b} != 'x' || {c}").unwrap();
        assert!(matches!(
            ast,
            FormulaExpr::Binary {
                op: BinaryOperator::Or,
                ..
            }
        ));
        assert_eq!(ast.to_string(), "{a} > 1 && {b} != \"x\" || {c}");

        let ast = parse_formula("1 <> 2").unwrap();
        assert!(matches!(
            ast,
            FormulaExpr::Binary {
                op: BinaryOperator::NotEqual,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_concat_binds_looser_than_addition() {
        let ast = parse_formula("'n=' & 1 + 2").unwrap();
        if let FormulaExpr::Binary { op, right, .. } = ast {
            assert_eq!(op, BinaryOperator::Concat);
            assert!(matches!(
                *right,
                FormulaExpr::Binary {
                    op: BinaryOperator::Add,
                    ..
                }
            ));
        } else {
            panic!("Expected Binary");
        }
    }

    #[test]
    fn test_parse_unary() {
        let ast = parse_formula("-5").unwrap();
        assert!(matches!(
            ast,
            FormulaExpr::Unary {
                op: UnaryOperator::Negate,
                ..
            }
        ));
        assert_eq!(parse_formula("+5").unwrap(), FormulaExpr::number(5.0));
    }

    #[test]
    fn test_parse_function() {
        let ast = parse_formula("sum(1, 2, {fldA})").unwrap();
        if let FormulaExpr::Call { name, args } = ast {
            assert_eq!(name, "SUM");
            assert_eq!(args.len(), 3);
            assert_eq!(args[2], FormulaExpr::field("fldA"));
        } else {
            panic!("Expected Call");
        }

        let ast = parse_formula("NOW()").unwrap();
        assert_eq!(
            ast,
            FormulaExpr::Call {
                name: "NOW".into(),
                args: vec![]
            }
        );
    }

    #[test]
    fn test_parse_nested_function() {
        let ast = parse_formula("IF({a} > 0, SUM({b}, 1), 0)").unwrap();
        if let FormulaExpr::Call { name, args } = ast {
            assert_eq!(name, "IF");
            assert_eq!(args.len(), 3);
            assert!(matches!(&args[1], FormulaExpr::Call { name, .. } if name == "SUM"));
        } else {
            panic!("Expected Call");
        }
    }

    #[test]
    fn test_parse_comments() {
        let ast = parse_formula("/* total */ 1 + // first\n 2").unwrap();
        assert_eq!(ast.to_string(), "1 + 2");
    }

    #[test]
    fn test_parse_is_deterministic_and_round_trips() {
        let source = "IF(AND({a} >= 10, NOT({b})), -({c} + 1) * 2 % 3, CONCATENATE('x', \"y\"))";
        let first = parse_formula(source).unwrap();
        assert_eq!(first, parse_formula(source).unwrap());
        assert_eq!(parse_formula(&first.to_string()).unwrap(), first);
    }

    #[test]
    fn test_incomplete_expression_points_at_end() {
        let err = syntax_error("1 + ");
        assert_eq!(err.token, "<EOF>");
        assert_eq!(err.line, 1);
        assert_eq!(err.column, 4);
        assert_eq!(
            err.message,
            "Unexpected end of formula, expected an expression"
        );
    }

    #[test]
    fn test_syntax_error_positions() {
        let err = syntax_error("1 +\n  * 2");
        assert_eq!(err.token, "*");
        assert_eq!((err.line, err.column), (2, 2));

        let err = syntax_error("SUM(1, 2");
        assert_eq!(err.token, "<EOF>");
        assert_eq!(err.column, 8);

        let err = syntax_error("1 2");
        assert_eq!(err.token, "2");
        assert_eq!(err.message, "Unexpected '2' after expression");
    }

    #[test]
    fn test_lexical_errors() {
        let err = syntax_error("'abc");
        assert_eq!(err.message, "Unterminated string literal");
        assert_eq!(err.column, 0);

        let err = syntax_error("{fldA + 1");
        assert_eq!(err.message, "Unterminated field reference, expected '}'");

        let err = syntax_error("{}");
        assert_eq!(err.message, "Empty field reference");

        let err = syntax_error("1 # 2");
        assert_eq!(err.token, "#");
        assert_eq!(err.column, 2);

        let err = syntax_error("1 | 2");
        assert_eq!(err.token, "|");

        let err = syntax_error("1 /* open");
        assert_eq!(err.message, "Unterminated block comment");
    }

    #[test]
    fn test_bare_identifier_is_rejected() {
        let err = syntax_error("price * 2");
        assert_eq!(err.token, "*");
        assert_eq!(err.message, "Unexpected '*', expected '(' after function name");
    }

    #[test]
    fn test_nesting_limit() {
        let deep = format!("{}1{}", "(".repeat(MAX_NESTING_DEPTH + 1), ")".repeat(MAX_NESTING_DEPTH + 1));
        let err = syntax_error(&deep);
        assert!(err.message.contains("nested more than"));

        let long_chain = vec!["1"; MAX_NESTING_DEPTH + 2].join(" + ");
        let err = syntax_error(&long_chain);
        assert_eq!(err.token, "+");

        let ok = format!("{}1{}", "(".repeat(50), ")".repeat(50));
        assert_eq!(parse_formula(&ok).unwrap(), FormulaExpr::number(1.0));
    }
}
