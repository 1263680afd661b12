//! Lexer for skiff source code.
//!
//! Converts source text into a stream of tokens using the logos lexer
//! generator. Spaces, tabs and `#` comments are skipped; newlines are kept
//! because they separate statements.

use logos::{Logos, Span};
use std::fmt;

/// A token with its span in the source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub token: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(token: T, span: Span) -> Self {
        Self { token, span }
    }
}

/// Lexer error types.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum LexerError {
    #[default]
    UnexpectedCharacter,
    InvalidEscape(char),
    InvalidNumber,
}

impl fmt::Display for LexerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexerError::UnexpectedCharacter => write!(f, "unexpected character"),
            LexerError::InvalidEscape(c) => write!(f, "invalid escape sequence '\\{c}'"),
            LexerError::InvalidNumber => write!(f, "invalid number"),
        }
    }
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(error = LexerError)]
#[logos(skip r"[ \t\r]+")]
#[logos(skip r"#[^\n]*")]
pub enum Token {
    // ═══════════════════════════════════════════════════════════════════
    // Keywords (must come before Ident for priority)
    // ═══════════════════════════════════════════════════════════════════
    #[token("let")]
    Let,

    #[token("true")]
    True,

    #[token("false")]
    False,

    #[token("null")]
    Null,

    // ═══════════════════════════════════════════════════════════════════
    // Operators and punctuation
    // ═══════════════════════════════════════════════════════════════════
    #[token("==")]
    EqEq,

    #[token("!=")]
    NotEq,

    #[token("=")]
    Eq,

    #[token("+")]
    Plus,

    #[token("-")]
    Minus,

    #[token("*")]
    Star,

    #[token("/")]
    Slash,

    #[token("%")]
    Percent,

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token("[")]
    LBracket,

    #[token("]")]
    RBracket,

    #[token(",")]
    Comma,

    #[token(".")]
    Dot,

    #[token(";")]
    Semi,

    #[token("\n")]
    Newline,

    // ═══════════════════════════════════════════════════════════════════
    // Literals and names
    // ═══════════════════════════════════════════════════════════════════
    #[regex(r"[0-9]+\.[0-9]+", lex_float)]
    Float(f64),

    #[regex(r"[0-9]+", lex_int)]
    Int(i64),

    /// Double-quoted string with escapes.
    #[regex(r#""([^"\\]|\\.)*""#, lex_string)]
    String(String),

    /// Single-quoted string with escapes.
    #[regex(r"'([^'\\]|\\.)*'", lex_string)]
    SingleString(String),

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Let => write!(f, "let"),
            Token::True => write!(f, "true"),
            Token::False => write!(f, "false"),
            Token::Null => write!(f, "null"),
            Token::EqEq => write!(f, "=="),
            Token::NotEq => write!(f, "!="),
            Token::Eq => write!(f, "="),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Percent => write!(f, "%"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::Comma => write!(f, ","),
            Token::Dot => write!(f, "."),
            Token::Semi => write!(f, ";"),
            Token::Newline => write!(f, "newline"),
            Token::Float(x) => write!(f, "{x}"),
            Token::Int(i) => write!(f, "{i}"),
            Token::String(s) | Token::SingleString(s) => write!(f, "{s:?}"),
            Token::Ident(name) => write!(f, "{name}"),
        }
    }
}

/// Lex a quoted string literal, stripping the quotes and processing escapes.
fn lex_string(lex: &mut logos::Lexer<Token>) -> Result<String, LexerError> {
    let s = lex.slice();
    unescape(&s[1..s.len() - 1])
}

fn unescape(body: &str) -> Result<String, LexerError> {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some('\'') => out.push('\''),
            Some(other) => return Err(LexerError::InvalidEscape(other)),
            None => return Err(LexerError::InvalidEscape(' ')),
        }
    }
    Ok(out)
}

/// Lex an integer literal.
fn lex_int(lex: &mut logos::Lexer<Token>) -> Result<i64, LexerError> {
    lex.slice().parse().map_err(|_| LexerError::InvalidNumber)
}

/// Lex a float literal.
fn lex_float(lex: &mut logos::Lexer<Token>) -> Result<f64, LexerError> {
    lex.slice().parse().map_err(|_| LexerError::InvalidNumber)
}

/// Tokenize source code into a vector of spanned tokens.
///
/// Collects every lexer error rather than stopping at the first one.
pub fn tokenize(source: &str) -> Result<Vec<Spanned<Token>>, Vec<Spanned<LexerError>>> {
    let lexer = Token::lexer(source);
    let mut tokens = Vec::new();
    let mut errors = Vec::new();

    for (result, span) in lexer.spanned() {
        match result {
            Ok(token) => tokens.push(Spanned::new(token, span)),
            Err(err) => errors.push(Spanned::new(err, span)),
        }
    }

    if errors.is_empty() {
        Ok(tokens)
    } else {
        Err(errors)
    }
}
