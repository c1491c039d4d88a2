// asm.rs — Symbolic instruction model shared by every stage after the graph
//
// One instruction per line, `<dest> = <op>(<arg0>[, <arg1>[, <arg2>]])`.
// Operands start out symbolic (slot names, temporaries, literals) and are
// rewritten to registers and memory addresses by the allocators.
//
// Preconditions: none (data-only module).
// Postconditions: `Display` output re-parses to an equal instruction.
// Failure modes: none.
// Side effects: none.

use std::fmt;

pub use crate::lexer::Span;

/// Prefix shared by every temporary name (`T_<index>`, `T_f_0_5`, ...).
pub const TEMP_PREFIX: &str = "T_";

/// Maximum number of operands any operation takes.
pub const MAX_ARITY: usize = 3;

// ── Operands ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Symbolic name: a named slot (`V_v_m`) or a temporary (`T_4`).
    Name(String),
    /// Register `r<N>`.
    Reg(u32),
    /// Memory site `mem[<N>]`.
    Mem(u32),
    /// Integer literal.
    Int(i64),
    /// Single-precision float literal.
    Float(f32),
}

impl Operand {
    pub fn name(name: impl Into<String>) -> Self {
        Operand::Name(name.into())
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            Operand::Name(n) => Some(n),
            _ => None,
        }
    }

    pub fn is_temp(&self) -> bool {
        self.as_name().is_some_and(is_temp_name)
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Operand::Int(_) | Operand::Float(_))
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Name(n) => write!(f, "{n}"),
            Operand::Reg(r) => write!(f, "r{r}"),
            Operand::Mem(m) => write!(f, "mem[{m}]"),
            Operand::Int(i) => write!(f, "{i}"),
            Operand::Float(x) => write!(f, "{x:?}"),
        }
    }
}

pub fn is_temp_name(name: &str) -> bool {
    name.starts_with(TEMP_PREFIX)
}

// ── Name classes ──────────────────────────────────────────────────────────

/// What a symbolic name denotes, read off its prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameClass {
    Temporary,
    /// A persistent named slot. `indexed` is set for the `VI_`/`II_`/`CI_`/`OI_` forms.
    Slot { indexed: bool },
    /// Anything else; never produced by the linearizer.
    Unknown,
}

pub fn classify_name(name: &str) -> NameClass {
    if is_temp_name(name) {
        return NameClass::Temporary;
    }
    let Some((prefix, rest)) = name.split_once('_') else {
        return NameClass::Unknown;
    };
    if rest.is_empty() {
        return NameClass::Unknown;
    }
    match prefix {
        "V" | "I" | "C" | "O" => NameClass::Slot { indexed: false },
        "VI" | "II" | "CI" | "OI" => NameClass::Slot { indexed: true },
        _ => NameClass::Unknown,
    }
}

// ── Instructions ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Inst {
    pub dest: Operand,
    pub op: String,
    pub args: Vec<Operand>,
    /// Source span when the instruction was parsed from text.
    pub span: Option<Span>,
}

impl Inst {
    pub fn new(dest: Operand, op: impl Into<String>, args: Vec<Operand>) -> Self {
        Self {
            dest,
            op: op.into(),
            args,
            span: None,
        }
    }

    /// Destination name, if still symbolic.
    pub fn dest_name(&self) -> Option<&str> {
        self.dest.as_name()
    }

    pub fn defines_temp(&self) -> bool {
        self.dest.is_temp()
    }

    /// Temporary names read by this instruction, in argument order.
    pub fn temp_uses(&self) -> impl Iterator<Item = &str> {
        self.args
            .iter()
            .filter_map(Operand::as_name)
            .filter(|n| is_temp_name(n))
    }
}

/// Spans are provenance only and do not take part in equality.
impl PartialEq for Inst {
    fn eq(&self, other: &Self) -> bool {
        self.dest == other.dest && self.op == other.op && self.args == other.args
    }
}

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}(", self.dest, self.op)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i != 0 {
                write!(f, ", ")?;
            }
            write!(f, "{arg}")?;
        }
        write!(f, ")")
    }
}

/// Render instructions one per line, newline-terminated.
pub fn format_insts(insts: &[Inst]) -> String {
    let mut out = String::new();
    for inst in insts {
        out.push_str(&inst.to_string());
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_symbolic_instruction() {
        let inst = Inst::new(
            Operand::name("T_3"),
            "muladd_f",
            vec![Operand::name("C_e_m"), Operand::name("V_v_m"), Operand::Float(0.5)],
        );
        assert_eq!(inst.to_string(), "T_3 = muladd_f(C_e_m, V_v_m, 0.5)");
    }

    #[test]
    fn display_resolved_instruction() {
        let inst = Inst::new(Operand::Mem(4), "sub_i_imm", vec![Operand::Reg(2), Operand::Int(-1)]);
        assert_eq!(inst.to_string(), "mem[4] = sub_i_imm(r2, -1)");
    }

    #[test]
    fn float_literals_keep_a_decimal_point() {
        assert_eq!(Operand::Float(125.0).to_string(), "125.0");
        assert_eq!(Operand::Float(0.04).to_string(), "0.04");
    }

    #[test]
    fn name_classes() {
        assert_eq!(classify_name("T_12"), NameClass::Temporary);
        assert_eq!(classify_name("T_f_0_5"), NameClass::Temporary);
        assert_eq!(classify_name("V_v_m"), NameClass::Slot { indexed: false });
        assert_eq!(classify_name("C_f_0_04"), NameClass::Slot { indexed: false });
        assert_eq!(classify_name("II_weight"), NameClass::Slot { indexed: true });
        assert_eq!(classify_name("VI_exc"), NameClass::Slot { indexed: true });
        assert_eq!(classify_name("r3"), NameClass::Unknown);
        assert_eq!(classify_name("V_"), NameClass::Unknown);
    }

    #[test]
    fn equality_ignores_span() {
        use chumsky::span::Span as _;
        let a = Inst::new(Operand::Reg(0), "move", vec![Operand::Mem(1)]);
        let mut b = a.clone();
        b.span = Some(Span::new((), 3..9));
        assert_eq!(a, b);
    }

    #[test]
    fn temp_uses_skip_slots_and_literals() {
        let inst = Inst::new(
            Operand::name("V_x"),
            "mux",
            vec![Operand::name("T_1"), Operand::name("C_c"), Operand::name("T_4")],
        );
        assert_eq!(inst.temp_uses().collect::<Vec<_>>(), vec!["T_1", "T_4"]);
    }
}
