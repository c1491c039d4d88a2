// listing.rs — Allocator output: memory table plus resolved instructions
//
// Text form, consumed by the encoder and by the external header generator:
//
//   Memories:
//   0: V_v
//   Total memories: 1
//   Instructions:
//   r0 = add_f(mem[0], mem[0])
//
// Preconditions: `allocate` takes a symbolic program.
// Postconditions: every operand of the resolved program is `rN`, `mem[N]`,
//                 or an integer/float literal.
// Failure modes: register exhaustion (E0200), unresolvable names (E0002),
//                inconsistent memory tables when parsing (E0001).
// Side effects: none.

use std::fmt;

use crate::asm::{is_temp_name, Inst, Operand};
use crate::diag::{codes, Diagnostic};
use crate::memalloc::{self, MemoryMap};
use crate::regalloc::{self, Allocation};

/// A fully allocated program.
#[derive(Debug, Clone, PartialEq)]
pub struct Listing {
    pub memory: MemoryMap,
    pub insts: Vec<Inst>,
}

impl fmt::Display for Listing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Memories:")?;
        for (addr, name) in self.memory.entries() {
            writeln!(f, "{addr}: {name}")?;
        }
        writeln!(f, "Total memories: {}", self.memory.total())?;
        writeln!(f, "Instructions:")?;
        for inst in &self.insts {
            writeln!(f, "{inst}")?;
        }
        Ok(())
    }
}

/// Run both allocators and rewrite the program onto registers and memory.
pub fn allocate(insts: &[Inst], registers: u32) -> Result<Listing, Diagnostic> {
    let regs = regalloc::allocate(insts, registers)?;
    log::debug!(
        "regalloc: {} temporaries, peak pressure {}",
        regs.registers.len(),
        regs.pressure()
    );
    let memory = memalloc::allocate(insts)?;
    let insts = resolve(insts, &regs, &memory)?;
    Ok(Listing { memory, insts })
}

/// Rewrite symbolic names to their register or memory site.
pub fn resolve(
    insts: &[Inst],
    regs: &Allocation,
    memory: &MemoryMap,
) -> Result<Vec<Inst>, Diagnostic> {
    insts
        .iter()
        .map(|inst| -> Result<Inst, Diagnostic> {
            let lookup = |op: &Operand| resolve_operand(inst, op, regs, memory);
            Ok(Inst {
                dest: lookup(&inst.dest)?,
                op: inst.op.clone(),
                args: inst.args.iter().map(lookup).collect::<Result<_, _>>()?,
                span: inst.span,
            })
        })
        .collect()
}

fn resolve_operand(
    inst: &Inst,
    op: &Operand,
    regs: &Allocation,
    memory: &MemoryMap,
) -> Result<Operand, Diagnostic> {
    let unresolved = |what: String| {
        Diagnostic::error(codes::E0002, format!("{what} in `{inst}`")).with_span_opt(inst.span)
    };
    match op {
        Operand::Int(_) | Operand::Float(_) => Ok(op.clone()),
        Operand::Reg(_) | Operand::Mem(_) => Err(unresolved(format!(
            "symbolic program already contains resolved operand {op}"
        ))),
        Operand::Name(n) if is_temp_name(n) => regs
            .register_of(n)
            .map(Operand::Reg)
            .ok_or_else(|| unresolved(format!("temporary {n} is used before it is defined"))),
        Operand::Name(n) => memory
            .address(n)
            .map(Operand::Mem)
            .ok_or_else(|| unresolved(format!("cannot resolve operand '{n}'"))),
    }
}

impl Listing {
    /// Parse listing text. A missing memory table yields an empty map.
    pub fn parse(source: &str) -> Result<Listing, Diagnostic> {
        let parsed = crate::parser::parse_listing(source)?;
        let mut memory = MemoryMap::new();
        if let Some(section) = parsed.memory {
            for (addr, name) in &section.entries {
                if *addr != memory.total() || memory.address(name).is_some() {
                    return Err(Diagnostic::error(
                        codes::E0001,
                        format!("memory table entry `{addr}: {name}` is out of order or repeated"),
                    ));
                }
                memory.assign(name);
            }
            if section.total != memory.total() {
                return Err(Diagnostic::error(
                    codes::E0001,
                    format!(
                        "memory table lists {} sites but declares a total of {}",
                        memory.total(),
                        section.total
                    ),
                ));
            }
        }
        Ok(Listing {
            memory,
            insts: parsed.insts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::ErrorClass;
    use crate::parser::parse_insts;

    #[test]
    fn two_instruction_listing() {
        let p = parse_insts("T_0 = add_f(V_x, C_c)\nV_x = move(T_0)\n").unwrap();
        let listing = allocate(&p, 32).unwrap();
        assert_eq!(
            listing.to_string(),
            "Memories:\n0: V_x\n1: C_c\nTotal memories: 2\nInstructions:\n\
             r0 = add_f(mem[0], mem[1])\nmem[0] = move(r0)\n"
        );
    }

    #[test]
    fn literals_pass_through() {
        let p = parse_insts("T_0 = sub_i_imm(V_n, -1)\nV_n = move(T_0)\n").unwrap();
        let listing = allocate(&p, 32).unwrap();
        assert_eq!(listing.insts[0].to_string(), "r0 = sub_i_imm(mem[0], -1)");
    }

    #[test]
    fn use_before_definition_is_malformed() {
        let p = parse_insts("V_x = move(T_9)\n").unwrap();
        let err = allocate(&p, 32).unwrap_err();
        assert_eq!(err.class(), Some(ErrorClass::MalformedInstruction));
    }

    #[test]
    fn resolved_operands_in_symbolic_input() {
        let p = parse_insts("V_x = move(r3)\n").unwrap();
        assert!(allocate(&p, 32).is_err());
    }

    #[test]
    fn text_round_trip() {
        let p = parse_insts("T_0 = add_f(V_x, C_c)\nV_x = move(T_0)\n").unwrap();
        let listing = allocate(&p, 32).unwrap();
        let reparsed = Listing::parse(&listing.to_string()).unwrap();
        assert_eq!(reparsed, listing);
    }

    #[test]
    fn bare_instructions_parse_with_empty_table() {
        let listing = Listing::parse("r0 = move(mem[1])\n").unwrap();
        assert!(listing.memory.is_empty());
        assert_eq!(listing.insts.len(), 1);
    }

    #[test]
    fn inconsistent_tables_rejected() {
        let gap = "Memories:\n0: V_a\n2: V_b\nTotal memories: 2\nInstructions:\n";
        assert_eq!(Listing::parse(gap).unwrap_err().code, Some(codes::E0001));
        let total = "Memories:\n0: V_a\nTotal memories: 3\nInstructions:\n";
        assert_eq!(Listing::parse(total).unwrap_err().code, Some(codes::E0001));
    }
}
