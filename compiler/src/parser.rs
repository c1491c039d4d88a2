// Parser for instruction listings.
//
// Parses a token stream (from the lexer) into instructions, optionally
// preceded by the allocator's memory table. Uses chumsky combinators.
//
// Grammar (one instruction or table entry per line):
//   listing  := memory? inst*
//   memory   := "Memories" ":" (INT ":" IDENT)* "Total" "memories" ":" INT "Instructions" ":"
//   inst     := target "=" IDENT "(" operand ("," operand)* ")"
//   target   := IDENT | "mem" "[" INT "]"
//   operand  := target | INT | FLOAT
//
// Preconditions: input is a valid token stream from `lexer::lex()`.
// Postconditions: returns instructions plus any parse errors (non-fatal).
// Failure modes: syntax errors produce `Rich` diagnostics; parsing continues.
// Side effects: none.

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;
use chumsky::span::SimpleSpan;

use crate::asm::{Inst, Operand, MAX_ARITY};
use crate::diag::{codes, Diagnostic};
use crate::lexer::Token;

/// The `Memories:` section of an allocator listing.
#[derive(Debug, Clone, PartialEq)]
pub struct MemorySection {
    /// `(address, name)` pairs in listing order.
    pub entries: Vec<(u32, String)>,
    pub total: u32,
}

/// A parsed listing: optional memory table plus instructions.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedListing {
    pub memory: Option<MemorySection>,
    pub insts: Vec<Inst>,
}

/// Result of parsing: listing plus any errors.
#[derive(Debug)]
pub struct ParseResult {
    pub listing: Option<ParsedListing>,
    pub errors: Vec<Rich<'static, Token, SimpleSpan>>,
}

/// Parse listing text. Lexes then parses.
///
/// Returns the listing (if parsing succeeded) plus any errors.
pub fn parse(source: &str) -> ParseResult {
    let lex_result = crate::lexer::lex(source);
    let len = source.len();

    // Lexer spans are chumsky spans already.
    let token_iter = lex_result.tokens.into_iter();
    let eoi: SimpleSpan = (len..len).into();
    let stream = Stream::from_iter(token_iter).map(eoi, |(t, s): (_, _)| (t, s));

    let parser = listing_parser(source);
    let (listing, parse_errors) = parser.parse(stream).into_output_errors();

    // Merge lex errors + parse errors.
    let mut all_errors: Vec<Rich<'static, Token, SimpleSpan>> = lex_result
        .errors
        .into_iter()
        .map(|e| Rich::custom(e.span, e.message))
        .collect();
    all_errors.extend(parse_errors.into_iter().map(|e| e.into_owned()));

    ParseResult {
        listing,
        errors: all_errors,
    }
}

/// Parse a listing, failing on the first error.
pub fn parse_listing(source: &str) -> Result<ParsedListing, Diagnostic> {
    let result = parse(source);
    if let Some(err) = result
        .errors
        .iter()
        .min_by_key(|e| e.span().start)
    {
        let span = *err.span();
        let diag = Diagnostic::error(codes::E0001, format!("malformed instruction: {err}"))
            .with_span(span)
            .with_hint("expected `<dest> = <op>(<arg>, ...)`, one instruction per line");
        let line = diag.line_in(source).unwrap_or(1);
        return Err(Diagnostic {
            message: format!("line {line}: {}", diag.message),
            ..diag
        });
    }
    result.listing.ok_or_else(|| {
        Diagnostic::error(codes::E0001, "listing parse failed with no output")
    })
}

/// Parse bare instruction text (no memory table expected, but tolerated).
pub fn parse_insts(source: &str) -> Result<Vec<Inst>, Diagnostic> {
    parse_listing(source).map(|l| l.insts)
}

/// Register names are `r` followed by a decimal index.
fn register_index(name: &str) -> Option<u32> {
    let digits = name.strip_prefix('r')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

// ── Main parser builder ──

fn listing_parser<'tokens, 'src: 'tokens, I>(
    source: &'src str,
) -> impl Parser<'tokens, I, ParsedListing, extra::Err<Rich<'tokens, Token, SimpleSpan>>> + 'src
where
    'tokens: 'src,
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    // ── Newlines ──

    let nl = just(Token::Newline).repeated().ignored();
    let line_break = just(Token::Newline).repeated().at_least(1).ignored();

    // ── Identifier ──

    let ident = just(Token::Ident).map_with(move |_, e| {
        let span: SimpleSpan = e.span();
        source[span.start()..span.end()].to_string()
    });

    let index = select! { Token::Int(n) => n }
        .try_map(|n, span| {
            u32::try_from(n)
                .map_err(|_| Rich::custom(span, format!("memory index {n} is out of range")))
        });

    // ── Operands ──

    let target = ident
        .clone()
        .then(
            index
                .clone()
                .delimited_by(just(Token::LBracket), just(Token::RBracket))
                .or_not(),
        )
        .try_map(|(name, idx), span| match idx {
            Some(i) if name == "mem" => Ok(Operand::Mem(i)),
            Some(_) => Err(Rich::custom(
                span,
                format!("only `mem` can be indexed, found '{name}'"),
            )),
            None => Ok(match register_index(&name) {
                Some(r) => Operand::Reg(r),
                None => Operand::Name(name),
            }),
        });

    let literal = select! {
        Token::Int(n) => Operand::Int(n),
        Token::Float(x) => Operand::Float(x),
    };

    let operand = literal.or(target.clone());

    // ── Instruction ──

    let args = operand
        .separated_by(just(Token::Comma))
        .at_least(1)
        .collect::<Vec<_>>()
        .delimited_by(just(Token::LParen), just(Token::RParen))
        .try_map(|args: Vec<Operand>, span| {
            if args.len() > MAX_ARITY {
                Err(Rich::custom(
                    span,
                    format!("at most {MAX_ARITY} operands allowed, found {}", args.len()),
                ))
            } else {
                Ok(args)
            }
        });

    let inst = target
        .then_ignore(just(Token::Equals))
        .then(ident.clone())
        .then(args)
        .map_with(|((dest, op), args), e| Inst {
            dest,
            op,
            args,
            span: Some(e.span()),
        });

    // ── Memory table ──

    let entry = index
        .clone()
        .then_ignore(just(Token::Colon))
        .then(ident.clone())
        .then_ignore(line_break.clone());

    let total = just(Token::Total)
        .ignore_then(ident.filter(|word: &String| word == "memories"))
        .ignore_then(just(Token::Colon))
        .ignore_then(index);

    let memory = just(Token::Memories)
        .ignore_then(just(Token::Colon))
        .ignore_then(line_break.clone())
        .ignore_then(entry.repeated().collect::<Vec<_>>())
        .then(total)
        .then_ignore(line_break)
        .then_ignore(just(Token::Instructions))
        .then_ignore(just(Token::Colon))
        .map(|(entries, total)| MemorySection { entries, total });

    // ── Listing ──

    nl.clone()
        .ignore_then(memory.then_ignore(nl.clone()).or_not())
        .then(
            inst.separated_by(just(Token::Newline).repeated().at_least(1))
                .allow_trailing()
                .collect::<Vec<_>>(),
        )
        .then_ignore(nl)
        .map(|(memory, insts)| ParsedListing { memory, insts })
}

// ── Tests ──
