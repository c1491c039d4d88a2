// Lexer for instruction listings.
//
// Tokenizes both stage-boundary text forms: bare `dest = op(args)` lines and
// the allocator listing with its `Memories:` table. Uses the `logos` crate
// for DFA-based lexing.
//
// Preconditions: input is valid UTF-8.
// Postconditions: returns all tokens with byte-offset spans, plus any lex errors.
// Failure modes: unrecognized characters produce `LexError`; lexing continues.
// Side effects: none.

use chumsky::span::SimpleSpan;
use logos::Logos;
use std::fmt;

/// Byte-offset span in source text. Shared with the parser and carried on
/// every parsed instruction.
pub type Span = SimpleSpan;

/// A lexer error with location.
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub span: Span,
    pub message: String,
}

/// Result of lexing: tokens plus any errors (non-fatal).
#[derive(Debug)]
pub struct LexResult {
    pub tokens: Vec<(Token, Span)>,
    pub errors: Vec<LexError>,
}

/// Listing token types.
///
/// Section headers are matched as fixed strings. Literals carry parsed
/// values. Identifiers carry no value — use the span to retrieve the text
/// from the source.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t]+|#[^\n]*")]
pub enum Token {
    // ── Section headers ──
    #[token("Memories")]
    Memories,
    #[token("Total")]
    Total,
    #[token("Instructions")]
    Instructions,

    // ── Symbols ──
    #[token("=")]
    Equals,
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
    #[token(":")]
    Colon,

    // ── Literals ──
    //
    // A float needs a fraction or an exponent; a bare digit run is an integer.
    /// Float literal (`0.5`, `-65.0`, `1e-5`).
    #[regex(r"-?[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?", parse_float)]
    #[regex(r"-?[0-9]+[eE][+-]?[0-9]+", parse_float)]
    Float(f32),

    /// Integer literal, optionally negative.
    #[regex(r"-?[0-9]+", parse_int)]
    Int(i64),

    // ── Identifier ──
    /// Slot, temporary, register, or operation name: `[a-zA-Z_][a-zA-Z0-9_]*`
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    Ident,

    // ── Structure ──
    /// One or more line breaks (instruction terminator).
    #[regex(r"[\r\n]+")]
    Newline,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Memories => write!(f, "Memories"),
            Token::Total => write!(f, "Total"),
            Token::Instructions => write!(f, "Instructions"),
            Token::Equals => write!(f, "="),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::Comma => write!(f, ","),
            Token::Colon => write!(f, ":"),
            Token::Float(v) => write!(f, "{v:?}"),
            Token::Int(v) => write!(f, "{v}"),
            Token::Ident => write!(f, "<ident>"),
            Token::Newline => write!(f, "<newline>"),
        }
    }
}

// ── Callbacks ──

fn parse_float(lex: &mut logos::Lexer<'_, Token>) -> Option<f32> {
    lex.slice().parse().ok()
}

fn parse_int(lex: &mut logos::Lexer<'_, Token>) -> Option<i64> {
    lex.slice().parse().ok()
}

// ── Public API ──

/// Lex listing text into tokens.
///
/// Returns all successfully parsed tokens together with any errors for
/// unrecognised characters. Lexing is non-fatal: errors are collected and
/// the lexer continues past bad characters.
pub fn lex(source: &str) -> LexResult {
    let lexer = Token::lexer(source);
    let mut tokens = Vec::new();
    let mut errors = Vec::new();

    for (result, range) in lexer.spanned() {
        let span = Span::from(range);
        match result {
            Ok(token) => tokens.push((token, span)),
            Err(()) => errors.push(LexError {
                span,
                message: format!("unexpected character: {:?}", &source[span.start..span.end]),
            }),
        }
    }

    LexResult { tokens, errors }
}

// ── Tests ──
