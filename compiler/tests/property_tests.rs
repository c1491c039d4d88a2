// Property-based tests for compiler invariants.
//
// Three categories:
// 1. Encoder: every well-formed resolved instruction survives encode → disassemble
// 2. Memory allocator: addresses are dense, unique, and cover every slot
// 3. Register allocator: temporaries whose live ranges overlap (definition
//    through last use, inclusive) never share a register
//
// Uses proptest with explicit configuration to prevent CI flakiness.

use ncc::asm::{Inst, Operand};
use ncc::encode::{self, Form, IMM13_MAX, IMM13_MIN, IMM19_MAX, IMM19_MIN, OPCODES};
use proptest::prelude::*;
use std::collections::{HashMap, HashSet};

// ── Generators ──────────────────────────────────────────────────────────────

fn arb_site() -> impl Strategy<Value = Operand> {
    prop_oneof![(0u32..32).prop_map(Operand::Reg), (0u32..32).prop_map(Operand::Mem),]
}

fn arb_resolved_inst() -> impl Strategy<Value = Inst> {
    (
        0..OPCODES.len(),
        arb_site(),
        prop::collection::vec(arb_site(), 3),
        IMM13_MIN..=IMM13_MAX,
        IMM19_MIN..=IMM19_MAX,
    )
        .prop_map(|(which, dest, sites, imm13, imm19)| {
            let opcode = &OPCODES[which];
            let args = match opcode.form {
                Form::Imm19 => vec![Operand::Int(imm19)],
                Form::RegImm13 => vec![sites[0].clone(), Operand::Int(imm13)],
                form => sites[..form.arity()].to_vec(),
            };
            Inst::new(dest, opcode.name, args)
        })
}

const SLOTS: &[&str] = &[
    "V_v", "V_u", "V_exc", "V_inh", "C_a", "C_b", "I_in", "VI_acc", "II_w", "O_fire",
];

/// A symbolic straight-line program: `T_i = op(x, y)` where each operand is
/// a slot or an earlier temporary, followed by write-backs of a few results.
fn arb_symbolic_program() -> impl Strategy<Value = Vec<Inst>> {
    let step = (
        prop_oneof![Just("add_f"), Just("mul_f"), Just("sub_f")],
        any::<prop::sample::Index>(),
        any::<bool>(),
        any::<prop::sample::Index>(),
        any::<bool>(),
    );
    (
        prop::collection::vec(step, 1..40),
        prop::collection::vec((any::<prop::sample::Index>(), any::<prop::sample::Index>()), 1..4),
    )
        .prop_map(|(steps, writes)| {
            let mut insts = Vec::new();
            for (i, (op, a, a_slot, b, b_slot)) in steps.iter().enumerate() {
                let pick = |idx: &prop::sample::Index, slot: bool| {
                    if slot || i == 0 {
                        Operand::name(*idx.get(SLOTS))
                    } else {
                        Operand::name(format!("T_{}", idx.index(i)))
                    }
                };
                insts.push(Inst::new(
                    Operand::name(format!("T_{i}")),
                    *op,
                    vec![pick(a, *a_slot), pick(b, *b_slot)],
                ));
            }
            let n = steps.len();
            for (slot, temp) in writes {
                insts.push(Inst::new(
                    Operand::name(*slot.get(SLOTS)),
                    "move",
                    vec![Operand::name(format!("T_{}", temp.index(n)))],
                ));
            }
            insts
        })
}

// ── Encoder round trip ──────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 500,
        max_shrink_iters: 200,
        .. ProptestConfig::default()
    })]

    #[test]
    fn encode_disassemble_roundtrip(inst in arb_resolved_inst()) {
        let word = encode::encode(&inst);
        prop_assert!(word.is_ok(), "{inst}: {:?}", word.err().map(|d| d.to_string()));
        let word = word.unwrap();
        let back = encode::disassemble(word).unwrap();
        prop_assert_eq!(&back, &inst, "word {:08x}", word);
        prop_assert_eq!(encode::decode(word).pack(), word);
    }

    #[test]
    fn out_of_range_imm13_is_rejected(
        imm in prop_oneof![(IMM13_MAX + 1)..=IMM19_MAX, IMM19_MIN..IMM13_MIN],
        reg in 0u32..32,
    ) {
        let inst = Inst::new(Operand::Reg(0), "sub_i_imm", vec![Operand::Reg(reg), Operand::Int(imm)]);
        let err = encode::encode(&inst).unwrap_err();
        prop_assert_eq!(err.code, Some(ncc::diag::codes::E0301));
    }
}

// ── Allocation invariants ───────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 200,
        max_shrink_iters: 200,
        .. ProptestConfig::default()
    })]

    #[test]
    fn memory_addresses_are_dense(program in arb_symbolic_program()) {
        let map = ncc::memalloc::allocate(&program).unwrap();
        let entries: Vec<(u32, String)> =
            map.entries().map(|(a, n)| (a, n.to_string())).collect();

        for (i, (addr, _)) in entries.iter().enumerate() {
            prop_assert_eq!(*addr, i as u32);
        }
        let unique: HashSet<&String> = entries.iter().map(|(_, n)| n).collect();
        prop_assert_eq!(unique.len(), entries.len());

        let mut slots = HashSet::new();
        for inst in &program {
            for op in std::iter::once(&inst.dest).chain(&inst.args) {
                if let Some(name) = op.as_name().filter(|n| !n.starts_with("T_")) {
                    slots.insert(name.to_string());
                }
            }
        }
        prop_assert_eq!(slots.len() as u32, map.total());
        for name in &slots {
            prop_assert!(map.address(name).is_some(), "{name} has no address");
        }
    }

    #[test]
    fn overlapping_live_ranges_get_distinct_registers(program in arb_symbolic_program()) {
        let alloc = ncc::regalloc::allocate(&program, 32);
        prop_assume!(alloc.is_ok());
        let alloc = alloc.unwrap();

        // Live range of each temporary: definition index through last use.
        let mut def: HashMap<String, usize> = HashMap::new();
        let mut last: HashMap<String, usize> = HashMap::new();
        for (i, inst) in program.iter().enumerate() {
            for used in inst.temp_uses() {
                last.insert(used.to_string(), i);
            }
            if let Some(d) = inst.dest_name().filter(|d| d.starts_with("T_")) {
                def.insert(d.to_string(), i);
                last.entry(d.to_string()).or_insert(i);
            }
        }

        let temps: Vec<&String> = def.keys().collect();
        for (x, a) in temps.iter().enumerate() {
            for b in &temps[x + 1..] {
                let (da, la) = (def[*a], last[*a]);
                let (db, lb) = (def[*b], last[*b]);
                // Ranges are inclusive at both ends.
                if da <= lb && db <= la {
                    prop_assert_ne!(
                        alloc.register_of(a),
                        alloc.register_of(b),
                        "{} [{}, {}] and {} [{}, {}]", a, da, la, b, db, lb
                    );
                }
            }
        }
    }

    #[test]
    fn resolved_listing_encodes(program in arb_symbolic_program()) {
        let listing = ncc::listing::allocate(&program, 32);
        prop_assume!(listing.is_ok());
        let listing = listing.unwrap();
        prop_assume!(listing.memory.total() <= encode::MEMORY_SITES);
        let words = encode::encode_all(&listing.insts).unwrap();
        prop_assert_eq!(words.len(), program.len());
    }
}
