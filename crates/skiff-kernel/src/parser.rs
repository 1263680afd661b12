//! Recursive descent parser for skiff.
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! program  := sep* (stmt (sep+ stmt)*)? sep*
//! stmt     := 'let' IDENT '=' expr | expr
//! expr     := additive (('==' | '!=') additive)*
//! additive := term (('+' | '-') term)*
//! term     := unary (('*' | '/' | '%') unary)*
//! unary    := '-' unary | postfix
//! postfix  := primary ('.' IDENT)*
//! primary  := literal | IDENT | IDENT '(' args ')' | '(' expr ')' | '[' args ']'
//! ```

use logos::Span;
use thiserror::Error;

use skiff_types::EvalError;

use crate::ast::{BinaryOp, Expr, Literal, Program, Stmt};
use crate::lexer::{tokenize, Spanned, Token};

/// Maximum height of an expression tree: parentheses, negations and every
/// operator or member access in a chain all count. Evaluating and dropping
/// the tree recurse once per level, so this bounds the stack.
const MAX_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
    pub span: Span,
}

impl ParseError {
    fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}

impl From<ParseError> for EvalError {
    fn from(err: ParseError) -> Self {
        EvalError::syntax(err.message, err.span)
    }
}

/// Parse source text into a program.
pub fn parse(source: &str) -> Result<Program, ParseError> {
    let tokens = tokenize(source).map_err(|errors| {
        // Report the first lexer error; the rest are usually knock-on noise.
        let first = &errors[0];
        ParseError::new(first.token.to_string(), first.span.clone())
    })?;
    Parser::new(tokens, source.len()).program()
}

struct Parser {
    tokens: Vec<Spanned<Token>>,
    pos: usize,
    end: usize,
    depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Spanned<Token>>, end: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            end,
            depth: 0,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|t| &t.token)
    }

    fn span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .map(|t| t.span.clone())
            .unwrap_or(self.end..self.end)
    }

    fn advance(&mut self) -> Option<Spanned<Token>> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token) -> Result<(), ParseError> {
        if self.eat(&expected) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("expected '{expected}'")))
        }
    }

    fn unexpected(&self, what: &str) -> ParseError {
        match self.peek() {
            Some(token) => ParseError::new(format!("{what}, found '{token}'"), self.span()),
            None => ParseError::new(format!("{what}, found end of input"), self.span()),
        }
    }

    fn ident(&mut self, what: &str) -> Result<String, ParseError> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.unexpected(what)),
        }
    }

    fn at_separator(&self) -> bool {
        matches!(self.peek(), Some(Token::Newline | Token::Semi))
    }

    fn skip_separators(&mut self) -> bool {
        let mut skipped = false;
        while self.at_separator() {
            self.pos += 1;
            skipped = true;
        }
        skipped
    }

    fn program(mut self) -> Result<Program, ParseError> {
        let mut stmts = Vec::new();
        self.skip_separators();
        while self.peek().is_some() {
            stmts.push(self.stmt()?);
            if !self.skip_separators() && self.peek().is_some() {
                return Err(self.unexpected("expected end of statement"));
            }
        }
        Ok(Program { stmts })
    }

    fn stmt(&mut self) -> Result<Stmt, ParseError> {
        if !self.eat(&Token::Let) {
            return Ok(Stmt::Expr(self.expr()?));
        }
        let name = self.ident("expected a name after 'let'")?;
        self.expect(Token::Eq)?;
        let value = self.expr()?;
        Ok(Stmt::Let { name, value })
    }

    /// Count one more level of tree height. Any error aborts the whole
    /// parse, so callers only restore the depth on success.
    fn descend(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ParseError::new("expression nested too deeply", self.span()));
        }
        Ok(())
    }

    fn expr(&mut self) -> Result<Expr, ParseError> {
        self.descend()?;
        let result = self.equality()?;
        self.depth -= 1;
        Ok(result)
    }

    // Operator chains fold into a left-nested tree, one level per operator,
    // so each fold counts against the limit like a parenthesis does.

    fn equality(&mut self) -> Result<Expr, ParseError> {
        let base = self.depth;
        let mut lhs = self.additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::EqEq) => BinaryOp::Eq,
                Some(Token::NotEq) => BinaryOp::NotEq,
                _ => break,
            };
            self.pos += 1;
            self.descend()?;
            let rhs = self.additive()?;
            lhs = binary(op, lhs, rhs);
        }
        self.depth = base;
        Ok(lhs)
    }

    fn additive(&mut self) -> Result<Expr, ParseError> {
        let base = self.depth;
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.pos += 1;
            self.descend()?;
            let rhs = self.term()?;
            lhs = binary(op, lhs, rhs);
        }
        self.depth = base;
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr, ParseError> {
        let base = self.depth;
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Rem,
                _ => break,
            };
            self.pos += 1;
            self.descend()?;
            let rhs = self.unary()?;
            lhs = binary(op, lhs, rhs);
        }
        self.depth = base;
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        if self.eat(&Token::Minus) {
            self.descend()?;
            let inner = self.unary()?;
            self.depth -= 1;
            return Ok(Expr::Neg(Box::new(inner)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, ParseError> {
        let base = self.depth;
        let mut expr = self.primary()?;
        while self.eat(&Token::Dot) {
            self.descend()?;
            let field = self.ident("expected a field name after '.'")?;
            expr = Expr::Member {
                target: Box::new(expr),
                field,
            };
        }
        self.depth = base;
        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let start = self.span();
        let Some(Spanned { token, span }) = self.advance() else {
            return Err(self.unexpected("expected an expression"));
        };
        match token {
            Token::Null => Ok(Expr::Literal(Literal::Null)),
            Token::True => Ok(Expr::Literal(Literal::Bool(true))),
            Token::False => Ok(Expr::Literal(Literal::Bool(false))),
            Token::Int(i) => Ok(Expr::Literal(Literal::Int(i))),
            Token::Float(x) => Ok(Expr::Literal(Literal::Float(x))),
            Token::String(s) | Token::SingleString(s) => Ok(Expr::Literal(Literal::String(s))),
            Token::Ident(name) => {
                if !self.eat(&Token::LParen) {
                    return Ok(Expr::Ident(name));
                }
                let args = self.list_items(Token::RParen)?;
                let end = self.tokens[self.pos - 1].span.end;
                Ok(Expr::Call {
                    name,
                    args,
                    span: span.start..end,
                })
            }
            Token::LParen => {
                let inner = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::LBracket => Ok(Expr::List(self.list_items(Token::RBracket)?)),
            other => Err(ParseError::new(
                format!("expected an expression, found '{other}'"),
                start,
            )),
        }
    }

    /// Comma-separated expressions up to `close`, which is consumed.
    /// Newlines inside the brackets are allowed.
    fn list_items(&mut self, close: Token) -> Result<Vec<Expr>, ParseError> {
        let mut items = Vec::new();
        loop {
            while self.eat(&Token::Newline) {}
            if self.eat(&close) {
                return Ok(items);
            }
            items.push(self.expr()?);
            while self.eat(&Token::Newline) {}
            if self.eat(&close) {
                return Ok(items);
            }
            if !self.eat(&Token::Comma) {
                return Err(self.unexpected(&format!("expected ',' or '{close}'")));
            }
        }
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}
