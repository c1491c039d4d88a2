// encode.rs — Resolved instructions → 32-bit machine words
//
// Word layout (bit 0 = least significant):
//
//   31    26 25    20 19    14  13  12     7 6       0
//   | src0  | src1  | src2  |imm0|  dst   | opcode  |
//
// Register `rN` encodes as N, memory site `mem[N]` as 32 + N. A literal at
// argument 1 is split into src1/src2/imm0 (13 bits); a literal at argument 0
// is split into src0/src1/src2/imm0 (19 bits).
//
// Preconditions: every operand is a register, memory site, or integer literal.
// Postconditions: `disassemble(encode(i)) == i` for every accepted instruction.
// Failure modes: unknown operation (E0300), immediate out of range (E0301),
//                unresolvable operand, wrong arity, or literal in a register
//                position (E0002).
// Side effects: none.

use std::fmt::Write as _;

use crate::asm::{Inst, Operand};
use crate::diag::{codes, Diagnostic};

/// Number of registers, and of memory sites addressable by one operand field.
pub const REGISTERS: u32 = 32;
pub const MEMORY_SITES: u32 = 32;

/// Signed range of the 13-bit immediate (argument 1).
pub const IMM13_MIN: i64 = -(1 << 12);
pub const IMM13_MAX: i64 = (1 << 12) - 1;

/// Signed range of the 19-bit immediate (argument 0).
pub const IMM19_MIN: i64 = -(1 << 18);
pub const IMM19_MAX: i64 = (1 << 18) - 1;

const FIELD_MASK: u32 = 0x3F;
const OPCODE_MASK: u32 = 0x7F;

// ── Opcode table ──────────────────────────────────────────────────────────

/// Operand shape of an operation. The top two opcode bits give the class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Form {
    /// Class 00: one 19-bit literal.
    Imm19,
    /// Class 01: one operand plus a 13-bit literal.
    RegImm13,
    /// Class 01: one operand.
    Unary,
    /// Class 10: two operands.
    Binary,
    /// Class 11: three operands.
    Ternary,
}

impl Form {
    pub fn arity(self) -> usize {
        match self {
            Form::Imm19 | Form::Unary => 1,
            Form::RegImm13 | Form::Binary => 2,
            Form::Ternary => 3,
        }
    }

    /// The argument position that must hold a literal, if any.
    pub fn literal_position(self) -> Option<usize> {
        match self {
            Form::Imm19 => Some(0),
            Form::RegImm13 => Some(1),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Opcode {
    pub name: &'static str,
    pub code: u8,
    pub form: Form,
}

const fn op(name: &'static str, code: u8, form: Form) -> Opcode {
    Opcode { name, code, form }
}

pub const OPCODES: &[Opcode] = &[
    op("lu_imm", 0b00_00001, Form::Imm19),
    op("ls_imm", 0b00_00010, Form::Imm19),
    op("pois_imm", 0b00_00011, Form::Imm19),
    op("not_i", 0b01_00000, Form::Unary),
    op("gt_i_imm", 0b01_00001, Form::RegImm13),
    op("sub_i_imm", 0b01_00010, Form::RegImm13),
    op("or_i_imm", 0b01_00011, Form::RegImm13),
    op("move", 0b01_00100, Form::Unary),
    op("fire", 0b01_00101, Form::Unary),
    op("exp_f", 0b01_00110, Form::Unary),
    op("and_i", 0b10_00000, Form::Binary),
    op("or_i", 0b10_00001, Form::Binary),
    op("sub_i", 0b10_00010, Form::Binary),
    op("mul_f", 0b10_00011, Form::Binary),
    op("add_f", 0b10_00100, Form::Binary),
    op("sub_f", 0b10_00101, Form::Binary),
    op("ge_f", 0b10_00110, Form::Binary),
    op("div_f", 0b10_00111, Form::Binary),
    op("le_f", 0b10_01000, Form::Binary),
    op("mul_x", 0b10_01001, Form::Binary),
    op("add_x", 0b10_01010, Form::Binary),
    op("sub_x", 0b10_01011, Form::Binary),
    op("ge_x", 0b10_01100, Form::Binary),
    op("le_x", 0b10_01101, Form::Binary),
    op("muladd_f", 0b11_00000, Form::Ternary),
    op("mulsub_f", 0b11_00001, Form::Ternary),
    op("mux", 0b11_00010, Form::Ternary),
];

pub fn lookup(name: &str) -> Option<&'static Opcode> {
    OPCODES.iter().find(|o| o.name == name)
}

pub fn lookup_code(code: u8) -> Option<&'static Opcode> {
    OPCODES.iter().find(|o| o.code == code)
}

// ── Fields ────────────────────────────────────────────────────────────────

/// The five bit-fields of an instruction word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Fields {
    pub opcode: u8,
    pub dst: u8,
    pub imm0: u8,
    pub src: [u8; 3],
}

impl Fields {
    pub fn pack(self) -> u32 {
        let f = |v: u8| u32::from(v) & FIELD_MASK;
        (f(self.src[0]) << 26)
            | (f(self.src[1]) << 20)
            | (f(self.src[2]) << 14)
            | ((u32::from(self.imm0) & 1) << 13)
            | (f(self.dst) << 7)
            | (u32::from(self.opcode) & OPCODE_MASK)
    }
}

/// Split a word into its fields.
pub fn decode(word: u32) -> Fields {
    let f = |shift: u32| ((word >> shift) & FIELD_MASK) as u8;
    Fields {
        opcode: (word & OPCODE_MASK) as u8,
        dst: f(7),
        imm0: ((word >> 13) & 1) as u8,
        src: [f(26), f(20), f(14)],
    }
}

// ── Immediate packing ─────────────────────────────────────────────────────

/// Raw 13-bit split: `(imm >> 7, (imm >> 1) & 0x3F, imm & 1)`, each masked
/// to its field width. No range check.
pub fn split_imm13(imm: i64) -> (u8, u8, u8) {
    (
        ((imm >> 7) & 0x3F) as u8,
        ((imm >> 1) & 0x3F) as u8,
        (imm & 1) as u8,
    )
}

/// Raw 19-bit split into src0, src1, src2 and the low bit. No range check.
pub fn split_imm19(imm: i64) -> (u8, u8, u8, u8) {
    (
        ((imm >> 13) & 0x3F) as u8,
        ((imm >> 7) & 0x3F) as u8,
        ((imm >> 1) & 0x3F) as u8,
        (imm & 1) as u8,
    )
}

fn join_imm(fields: &Fields, bits: u32) -> i64 {
    let raw = (u32::from(fields.src[0]) << 13)
        | (u32::from(fields.src[1]) << 7)
        | (u32::from(fields.src[2]) << 1)
        | u32::from(fields.imm0);
    let raw = raw & ((1u32 << bits) - 1);
    let shift = 64 - bits;
    (i64::from(raw) << shift) >> shift
}

// ── Encoding ──────────────────────────────────────────────────────────────

fn malformed(inst: &Inst, message: String) -> Diagnostic {
    Diagnostic::error(codes::E0002, format!("{message} in `{inst}`")).with_span_opt(inst.span)
}

fn site(inst: &Inst, operand: &Operand) -> Result<u8, Diagnostic> {
    match *operand {
        Operand::Reg(r) if r < REGISTERS => Ok(r as u8),
        Operand::Mem(m) if m < MEMORY_SITES => Ok((REGISTERS + m) as u8),
        Operand::Reg(r) => Err(malformed(inst, format!("register r{r} does not exist"))),
        Operand::Mem(m) => Err(malformed(
            inst,
            format!("memory site mem[{m}] is outside the {MEMORY_SITES}-site window"),
        )
        .with_hint("the program uses more memory sites than one operand field can address")),
        Operand::Name(ref n) => Err(malformed(inst, format!("unresolved operand '{n}'"))
            .with_hint("run register and memory allocation before encoding")),
        Operand::Int(_) | Operand::Float(_) => Err(malformed(
            inst,
            format!("literal {operand} is not allowed in this position"),
        )),
    }
}

fn immediate(inst: &Inst, operand: &Operand, min: i64, max: i64) -> Result<i64, Diagnostic> {
    match *operand {
        Operand::Int(v) if (min..=max).contains(&v) => Ok(v),
        Operand::Int(v) => Err(Diagnostic::error(
            codes::E0301,
            format!("immediate {v} does not fit the field of `{inst}`"),
        )
        .with_span_opt(inst.span)
        .with_hint(format!("accepted range is [{min}, {max}]"))),
        Operand::Float(_) => Err(malformed(inst, "float literal in immediate field".into())
            .with_hint("float literals must be lowered to integer loads first")),
        _ => Err(malformed(inst, format!("expected a literal, found {operand}"))),
    }
}

/// Encode one resolved instruction.
pub fn encode(inst: &Inst) -> Result<u32, Diagnostic> {
    let opcode = lookup(&inst.op).ok_or_else(|| {
        Diagnostic::error(codes::E0300, format!("unknown operation '{}'", inst.op))
            .with_span_opt(inst.span)
    })?;
    let form = opcode.form;
    if inst.args.len() != form.arity() {
        return Err(malformed(
            inst,
            format!(
                "{} takes {} operand(s), found {}",
                opcode.name,
                form.arity(),
                inst.args.len()
            ),
        ));
    }

    let mut fields = Fields {
        opcode: opcode.code,
        dst: site(inst, &inst.dest)?,
        ..Fields::default()
    };
    match form {
        Form::Imm19 => {
            let imm = immediate(inst, &inst.args[0], IMM19_MIN, IMM19_MAX)?;
            let (s0, s1, s2, bit) = split_imm19(imm);
            fields.src = [s0, s1, s2];
            fields.imm0 = bit;
        }
        Form::RegImm13 => {
            fields.src[0] = site(inst, &inst.args[0])?;
            let imm = immediate(inst, &inst.args[1], IMM13_MIN, IMM13_MAX)?;
            let (s1, s2, bit) = split_imm13(imm);
            fields.src[1] = s1;
            fields.src[2] = s2;
            fields.imm0 = bit;
        }
        Form::Unary | Form::Binary | Form::Ternary => {
            for (slot, arg) in fields.src.iter_mut().zip(&inst.args) {
                *slot = site(inst, arg)?;
            }
        }
    }
    Ok(fields.pack())
}

/// Encode a whole program, stopping at the first failure.
pub fn encode_all(insts: &[Inst]) -> Result<Vec<u32>, Diagnostic> {
    insts.iter().map(encode).collect()
}

/// Check a symbolic instruction's operation and operand count before any
/// rewriting. Integer ops that only exist as an `_imm` twin (`gt_i`) take
/// that twin's two operands.
pub fn check_operation(inst: &Inst) -> Result<(), Diagnostic> {
    let arity = match lookup(&inst.op) {
        Some(opcode) => opcode.form.arity(),
        None => match lookup(&format!("{}_imm", inst.op)) {
            Some(twin) if twin.form == Form::RegImm13 => twin.form.arity(),
            _ => {
                return Err(
                    Diagnostic::error(codes::E0300, format!("unknown operation '{}'", inst.op))
                        .with_span_opt(inst.span),
                )
            }
        },
    };
    if inst.args.len() != arity {
        return Err(malformed(
            inst,
            format!("{} takes {arity} operand(s), found {}", inst.op, inst.args.len()),
        ));
    }
    Ok(())
}

/// One lowercase 8-digit hex word per line.
pub fn format_hex(words: &[u32]) -> String {
    let mut out = String::with_capacity(words.len() * 9);
    for w in words {
        let _ = writeln!(out, "{w:08x}");
    }
    out
}

// ── Decoding ──────────────────────────────────────────────────────────────

fn operand_of(field: u8) -> Operand {
    let v = u32::from(field);
    if v < REGISTERS {
        Operand::Reg(v)
    } else {
        Operand::Mem(v - REGISTERS)
    }
}

/// Reconstruct the resolved instruction a word encodes.
pub fn disassemble(word: u32) -> Result<Inst, Diagnostic> {
    let fields = decode(word);
    let opcode = lookup_code(fields.opcode).ok_or_else(|| {
        Diagnostic::error(
            codes::E0300,
            format!("word {word:08x} has unknown opcode {:#09b}", fields.opcode),
        )
    })?;
    let args = match opcode.form {
        Form::Imm19 => vec![Operand::Int(join_imm(&fields, 19))],
        Form::RegImm13 => {
            let low = Fields {
                src: [0, fields.src[1], fields.src[2]],
                ..fields
            };
            vec![operand_of(fields.src[0]), Operand::Int(join_imm(&low, 13))]
        }
        form => fields.src[..form.arity()]
            .iter()
            .map(|&f| operand_of(f))
            .collect(),
    };
    Ok(Inst::new(operand_of(fields.dst), opcode.name, args))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::ErrorClass;

    fn inst(dest: Operand, op: &str, args: Vec<Operand>) -> Inst {
        Inst::new(dest, op, args)
    }

    #[test]
    fn opcode_classes_match_forms() {
        for o in OPCODES {
            let class = o.code >> 5;
            let expected = match o.form {
                Form::Imm19 => 0b00,
                Form::RegImm13 | Form::Unary => 0b01,
                Form::Binary => 0b10,
                Form::Ternary => 0b11,
            };
            assert_eq!(class, expected, "{}", o.name);
            assert_eq!(lookup_code(o.code).map(|x| x.name), Some(o.name));
        }
    }

    #[test]
    fn binary_register_and_memory() {
        let i = inst(
            Operand::Reg(0),
            "add_f",
            vec![Operand::Mem(0), Operand::Mem(1)],
        );
        // src0 = 32, src1 = 33, dst = 0, opcode = 0b1000100
        let expected = (32 << 26) | (33 << 20) | 0b10_00100;
        assert_eq!(encode(&i).unwrap(), expected);
        assert_eq!(format_hex(&[expected]), "82100044\n");
    }

    #[test]
    fn thirteen_bit_split_of_5000() {
        assert_eq!(split_imm13(5000), (39, 20, 0));
        let (a, b, c) = split_imm13(5000);
        assert_eq!((i64::from(a) << 7) | (i64::from(b) << 1) | i64::from(c), 5000);
    }

    #[test]
    fn thirteen_bit_bounds() {
        let at = |v| inst(Operand::Reg(1), "sub_i_imm", vec![Operand::Reg(0), Operand::Int(v)]);
        assert!(encode(&at(IMM13_MAX)).is_ok());
        assert!(encode(&at(IMM13_MIN)).is_ok());
        let err = encode(&at(5000)).unwrap_err();
        assert_eq!(err.class(), Some(ErrorClass::ImmediateRangeError));
        assert!(encode(&at(IMM13_MIN - 1)).is_err());
    }

    #[test]
    fn nineteen_bit_bounds() {
        let load = |v| inst(Operand::Reg(3), "lu_imm", vec![Operand::Int(v)]);
        let word = encode(&load(70000)).unwrap();
        assert_eq!(disassemble(word).unwrap(), load(70000));
        let err = encode(&load(300000)).unwrap_err();
        assert_eq!(err.code, Some(codes::E0301));
        assert!(encode(&load(IMM19_MIN)).is_ok());
        assert!(encode(&load(IMM19_MIN - 1)).is_err());
    }

    #[test]
    fn negative_immediates_round_trip() {
        let i = inst(Operand::Mem(4), "or_i_imm", vec![Operand::Reg(2), Operand::Int(-1)]);
        let word = encode(&i).unwrap();
        let f = decode(word);
        assert_eq!((f.src[1], f.src[2], f.imm0), (0x3F, 0x3F, 1));
        assert_eq!(disassemble(word).unwrap(), i);
    }

    #[test]
    fn unknown_operation() {
        let err = encode(&inst(Operand::Reg(0), "frobnicate", vec![Operand::Reg(1)])).unwrap_err();
        assert_eq!(err.class(), Some(ErrorClass::UnknownOperation));
    }

    #[test]
    fn operand_errors_are_malformed() {
        let cases = [
            inst(Operand::Reg(0), "move", vec![Operand::name("V_x")]),
            inst(Operand::Reg(0), "move", vec![Operand::Reg(32)]),
            inst(Operand::Reg(0), "move", vec![Operand::Mem(32)]),
            inst(Operand::Reg(0), "add_f", vec![Operand::Reg(1)]),
            inst(Operand::Reg(0), "add_f", vec![Operand::Reg(1), Operand::Int(3)]),
            inst(Operand::Reg(0), "lu_imm", vec![Operand::Reg(1)]),
            inst(Operand::Reg(0), "lu_imm", vec![Operand::Float(0.5)]),
            inst(Operand::Int(0), "move", vec![Operand::Reg(1)]),
        ];
        for case in &cases {
            let err = encode(case).unwrap_err();
            assert_eq!(err.code, Some(codes::E0002), "{case}");
        }
    }

    #[test]
    fn disassemble_rejects_unknown_opcode() {
        let err = disassemble(0x7F).unwrap_err();
        assert_eq!(err.class(), Some(ErrorClass::UnknownOperation));
    }

    #[test]
    fn ternary_round_trip() {
        let i = inst(
            Operand::Mem(31),
            "muladd_f",
            vec![Operand::Reg(31), Operand::Mem(0), Operand::Reg(7)],
        );
        assert_eq!(disassemble(encode(&i).unwrap()).unwrap(), i);
    }

    #[test]
    fn symbolic_operations_are_checked_before_rewriting() {
        let name = |n: &str| Operand::name(n);
        assert!(check_operation(&inst(name("T_0"), "mul_f", vec![name("V_a"), Operand::Float(0.5)])).is_ok());
        assert!(check_operation(&inst(name("T_0"), "gt_i", vec![name("V_a"), Operand::Int(0)])).is_ok());

        let short = check_operation(&inst(name("T_1"), "mul_f", vec![name("V_a")])).unwrap_err();
        assert_eq!(short.code, Some(codes::E0002));
        assert!(short.message.contains("takes 2 operand(s), found 1"), "{}", short.message);

        let unknown = check_operation(&inst(name("T_1"), "gt_f", vec![name("V_a"), name("V_b")]))
            .unwrap_err();
        assert_eq!(unknown.class(), Some(ErrorClass::UnknownOperation));
    }
}
