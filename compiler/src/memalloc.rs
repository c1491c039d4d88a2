// memalloc.rs — Three-tier dense memory addressing for named slots
//
// Every non-temporary name gets one address in [0, total). Tiers are filled
// in order, each scanning instructions first to last, operands before the
// destination:
//   1. indexed state (VI_/II_/CI_) read as operands
//   2. the synaptic accumulators V_exc and V_inh read as operands
//   3. remaining slot operands (indexed outputs included), then each
//      instruction's named destination
//
// Preconditions: instructions are symbolic (no registers or addresses yet).
// Postconditions: addresses are dense and unique; a name keeps the address
//                 of the first tier that saw it.
// Failure modes: a name that is neither a temporary nor a slot → E0002.
// Side effects: none.

use std::collections::HashMap;

use crate::asm::{classify_name, Inst, NameClass, Operand};
use crate::diag::{codes, Diagnostic};

/// Accumulator slots kept together right after the indexed tier.
pub const ACCUMULATORS: [&str; 2] = ["V_exc", "V_inh"];

/// Prefixes of the per-target state placed in the first tier. Indexed
/// outputs are not state and are placed with the scalars.
const INDEXED_STATE: [&str; 3] = ["VI_", "II_", "CI_"];

/// Name → address table, in address order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryMap {
    names: Vec<String>,
    index: HashMap<String, u32>,
}

impl MemoryMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Give `name` the next address unless it already has one.
    pub fn assign(&mut self, name: &str) -> u32 {
        if let Some(&addr) = self.index.get(name) {
            return addr;
        }
        let addr = self.names.len() as u32;
        self.names.push(name.to_string());
        self.index.insert(name.to_string(), addr);
        addr
    }

    pub fn address(&self, name: &str) -> Option<u32> {
        self.index.get(name).copied()
    }

    pub fn total(&self) -> u32 {
        self.names.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// `(address, name)` pairs in address order.
    pub fn entries(&self) -> impl Iterator<Item = (u32, &str)> + '_ {
        self.names
            .iter()
            .enumerate()
            .map(|(i, n)| (i as u32, n.as_str()))
    }
}

fn slot_name<'a>(inst: &Inst, operand: &'a Operand) -> Result<Option<(&'a str, bool)>, Diagnostic> {
    let Some(name) = operand.as_name() else {
        return Ok(None);
    };
    match classify_name(name) {
        NameClass::Temporary => Ok(None),
        NameClass::Slot { indexed } => Ok(Some((name, indexed))),
        NameClass::Unknown => Err(Diagnostic::error(
            codes::E0002,
            format!("cannot resolve operand '{name}' in `{inst}`"),
        )
        .with_span_opt(inst.span)
        .with_hint("slot names start with V_, I_, C_ or O_ (VI_, II_, CI_, OI_ when indexed)")),
    }
}

/// Assign addresses to every named slot of a symbolic program.
pub fn allocate(insts: &[Inst]) -> Result<MemoryMap, Diagnostic> {
    let mut map = MemoryMap::new();

    for inst in insts {
        for arg in &inst.args {
            if let Some((name, true)) = slot_name(inst, arg)? {
                if INDEXED_STATE.iter().any(|p| name.starts_with(p)) {
                    map.assign(name);
                }
            }
        }
    }

    for inst in insts {
        for arg in &inst.args {
            if let Some(name) = arg.as_name().filter(|n| ACCUMULATORS.contains(n)) {
                map.assign(name);
            }
        }
    }

    for inst in insts {
        for arg in &inst.args {
            if let Some((name, _)) = slot_name(inst, arg)? {
                map.assign(name);
            }
        }
        if let Some((name, _)) = slot_name(inst, &inst.dest)? {
            map.assign(name);
        }
    }

    log::debug!("memalloc: {} memory sites", map.total());
    Ok(map)
}
