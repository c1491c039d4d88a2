// diag.rs — Unified diagnostics model
//
// Provides the shared diagnostic type returned by every compiler stage.
// All conditions are fatal: a stage stops at its first violation and hands
// back exactly one Diagnostic naming the offending instruction or operand.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

use crate::asm::Span;

// ── Diagnostic code ──────────────────────────────────────────────────────

/// A stable diagnostic code (e.g., `E0001`, `E0301`).
///
/// Codes are `&'static str` constants defined in the `codes` module.
/// Once assigned, a code must never be reassigned to a different semantic
/// meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiagCode(pub &'static str);

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable codes, one family per error class.
pub mod codes {
    use super::DiagCode;

    /// Listing text does not parse as `dest = op(args)`.
    pub const E0001: DiagCode = DiagCode("E0001");
    /// Operand cannot be resolved to a register, memory address, or literal.
    pub const E0002: DiagCode = DiagCode("E0002");
    /// Operand types disagree, or an operation received a type it rejects.
    pub const E0100: DiagCode = DiagCode("E0100");
    /// More temporaries simultaneously live than registers available.
    pub const E0200: DiagCode = DiagCode("E0200");
    /// Operation absent from the opcode table.
    pub const E0300: DiagCode = DiagCode("E0300");
    /// Literal does not fit its immediate field.
    pub const E0301: DiagCode = DiagCode("E0301");
}

// ── Severity level ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagLevel {
    Error,
    Warning,
}

// ── Error class ──────────────────────────────────────────────────────────

/// The error taxonomy. Every code maps to exactly one class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    MalformedInstruction,
    GraphTypeError,
    AllocationExhausted,
    UnknownOperation,
    ImmediateRangeError,
}

// ── Diagnostic ───────────────────────────────────────────────────────────

/// A compiler diagnostic emitted by any stage.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: Option<DiagCode>,
    pub level: DiagLevel,
    /// Source location, when the failing stage consumed text.
    pub span: Option<Span>,
    pub message: String,
    pub hint: Option<String>,
}

impl Diagnostic {
    /// Create a new diagnostic with no code, span, or hint.
    pub fn new(level: DiagLevel, message: impl Into<String>) -> Self {
        Self {
            code: None,
            level,
            span: None,
            message: message.into(),
            hint: None,
        }
    }

    /// Shorthand for an error-level diagnostic carrying `code`.
    pub fn error(code: DiagCode, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Error, message).with_code(code)
    }

    /// Attach a stable diagnostic code.
    pub fn with_code(mut self, code: DiagCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Attach a source span.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Attach a source span if one is known.
    pub fn with_span_opt(mut self, span: Option<Span>) -> Self {
        self.span = span.or(self.span);
        self
    }

    /// Attach a remediation hint.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Classify this diagnostic by its code.
    pub fn class(&self) -> Option<ErrorClass> {
        let code = self.code?;
        Some(match code.0 {
            "E0001" | "E0002" => ErrorClass::MalformedInstruction,
            "E0100" => ErrorClass::GraphTypeError,
            "E0200" => ErrorClass::AllocationExhausted,
            "E0300" => ErrorClass::UnknownOperation,
            "E0301" => ErrorClass::ImmediateRangeError,
            _ => return None,
        })
    }

    /// 1-based line number of the span within `source`, if any.
    pub fn line_in(&self, source: &str) -> Option<usize> {
        let span = self.span?;
        let end = span.start.min(source.len());
        Some(source[..end].bytes().filter(|&b| b == b'\n').count() + 1)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            DiagLevel::Error => "error",
            DiagLevel::Warning => "warning",
        };
        if let Some(code) = &self.code {
            write!(f, "{}[{}]: {}", level, code, self.message)?;
        } else {
            write!(f, "{}: {}", level, self.message)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_without_code() {
        let d = Diagnostic::new(DiagLevel::Error, "something failed");
        assert_eq!(format!("{d}"), "error: something failed");
    }

    #[test]
    fn display_with_code_and_hint() {
        let d = Diagnostic::error(codes::E0301, "immediate 9000 does not fit")
            .with_hint("lift the literal into a constant slot");
        assert_eq!(
            format!("{d}"),
            "error[E0301]: immediate 9000 does not fit\n  hint: lift the literal into a constant slot"
        );
    }

    #[test]
    fn codes_map_to_classes() {
        let cases = [
            (codes::E0001, ErrorClass::MalformedInstruction),
            (codes::E0002, ErrorClass::MalformedInstruction),
            (codes::E0100, ErrorClass::GraphTypeError),
            (codes::E0200, ErrorClass::AllocationExhausted),
            (codes::E0300, ErrorClass::UnknownOperation),
            (codes::E0301, ErrorClass::ImmediateRangeError),
        ];
        for (code, class) in cases {
            assert_eq!(Diagnostic::error(code, "x").class(), Some(class));
        }
        assert_eq!(Diagnostic::new(DiagLevel::Warning, "x").class(), None);
    }

    #[test]
    fn line_lookup_from_span() {
        use chumsky::span::Span as _;
        let src = "a = b(c)\nd = e(f)\n";
        let d = Diagnostic::error(codes::E0001, "bad").with_span(Span::new((), 9..10));
        assert_eq!(d.line_in(src), Some(2));
    }
}
