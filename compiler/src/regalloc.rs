// regalloc.rs — Liveness analysis and linear-scan register allocation
//
// Only temporaries compete for registers; named slots always live in memory.
// Liveness is one backward pass; allocation is one forward pass that assigns
// the lowest free register to the current destination and only then releases
// the registers of temporaries read for the last time by that instruction.
//
// Preconditions: instructions are symbolic; temporaries are defined before use.
// Postconditions: two temporaries share a register only if their live ranges
//                 (definition through last use, both inclusive) are disjoint.
// Failure modes: more simultaneously live temporaries than registers →
//                AllocationExhausted (E0200). There is no spilling.
// Side effects: none.

use std::collections::{BTreeSet, HashMap};

use crate::asm::Inst;
use crate::diag::{codes, Diagnostic};

/// Register assignment for one program.
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    /// Temporaries live after each instruction.
    pub live: Vec<BTreeSet<String>>,
    /// Register of every temporary destination.
    pub registers: HashMap<String, u32>,
    /// Destination register per instruction; `None` for memory destinations.
    pub assigned: Vec<Option<u32>>,
    /// Most registers held at once, counting operands still being read.
    pub peak: usize,
}

impl Allocation {
    pub fn register_of(&self, temp: &str) -> Option<u32> {
        self.registers.get(temp).copied()
    }

    /// Highest number of registers in use at once.
    pub fn pressure(&self) -> usize {
        self.peak
    }
}

/// Backward liveness over temporaries: entry `i` is the set live right after
/// instruction `i`.
pub fn liveness(insts: &[Inst]) -> Vec<BTreeSet<String>> {
    let mut live_after = vec![BTreeSet::new(); insts.len()];
    let mut live: BTreeSet<String> = BTreeSet::new();
    for (i, inst) in insts.iter().enumerate().rev() {
        live_after[i] = live.clone();
        if let Some(dest) = inst.dest_name() {
            live.remove(dest);
        }
        live.extend(inst.temp_uses().map(str::to_string));
    }
    live_after
}

/// Assign `available` registers to temporaries by linear scan.
pub fn allocate(insts: &[Inst], available: u32) -> Result<Allocation, Diagnostic> {
    let live = liveness(insts);
    let mut free: BTreeSet<u32> = (0..available).collect();
    let mut registers: HashMap<String, u32> = HashMap::new();
    let mut assigned = Vec::with_capacity(insts.len());
    let empty = BTreeSet::new();
    let mut peak = 0;

    for (i, inst) in insts.iter().enumerate() {
        let before = if i == 0 { &empty } else { &live[i - 1] };

        if inst.defines_temp() {
            let dest = inst.dest.to_string();
            let Some(r) = free.pop_first() else {
                return Err(Diagnostic::error(
                    codes::E0200,
                    format!(
                        "no free register for {dest} in `{inst}`: {} temporaries are live",
                        before.len()
                    ),
                )
                .with_span_opt(inst.span)
                .with_hint(format!(
                    "at most {available} temporaries may be live at once; there is no spilling"
                )));
            };
            log::trace!("regalloc: {dest} -> r{r}");
            peak = peak.max(available as usize - free.len());
            if !live[i].contains(&dest) {
                // Never read; the register is reusable right away.
                free.insert(r);
            }
            registers.insert(dest, r);
            assigned.push(Some(r));
        } else {
            peak = peak.max(before.len());
            assigned.push(None);
        }

        // Operands read here for the last time.
        for died in before.difference(&live[i]) {
            if let Some(&r) = registers.get(died) {
                free.insert(r);
            }
        }
    }

    Ok(Allocation {
        live,
        registers,
        assigned,
        peak,
    })
}
