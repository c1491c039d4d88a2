// linearize.rs — Value graph → straight-line symbolic instructions
//
// Walks the arena in creation order, emitting one instruction per temporary,
// then reconciles every declared variable/output with the value it is bound
// to at the end of the step by inserting exactly one write-back.
//
// Preconditions: `graph` is fully built (declare + activate completed).
// Postconditions: every operand names an earlier destination or a leaf;
//                 each declared variable/output has one write-back, placed
//                 right after the instruction defining its final value or,
//                 when no instruction defines it, at the end.
// Failure modes: none.
// Side effects: none.

use std::collections::HashMap;

use crate::asm::{Inst, Operand};
use crate::ir::{Graph, ValueId, ValueKind, ValueType};

/// Output slot whose write-back emits a spike instead of a plain store.
const FIRE_SLOT: &str = "O_fire";

/// Linearize a graph into symbolic instructions.
pub fn linearize(graph: &Graph) -> Vec<Inst> {
    let mut trailing = Vec::new();
    let mut after: HashMap<ValueId, Vec<Inst>> = HashMap::new();

    for (slot, value) in graph.final_bindings() {
        let name = graph.name(slot);
        let op = if name == FIRE_SLOT { "fire" } else { "move" };
        let write_back = Inst::new(Operand::Name(name), op, vec![operand(graph, value)]);
        if graph.node(value).kind == ValueKind::Temporary {
            after.entry(value).or_default().push(write_back);
        } else {
            trailing.push(write_back);
        }
    }

    let mut insts = Vec::with_capacity(graph.len() + trailing.len());
    for node in graph.nodes() {
        if node.kind != ValueKind::Temporary {
            continue;
        }
        insts.push(Inst::new(
            Operand::Name(graph.name(node.id)),
            node.op.clone(),
            node.operands.iter().map(|&o| operand(graph, o)).collect(),
        ));
        if let Some(write_backs) = after.remove(&node.id) {
            insts.extend(write_backs);
        }
    }
    insts.extend(trailing);
    insts
}

/// Operand form of a node: literals become numeric operands, everything
/// else is referenced by its generated name.
fn operand(graph: &Graph, id: ValueId) -> Operand {
    let node = graph.node(id);
    let name = graph.name(id);
    if node.kind != ValueKind::Literal {
        return Operand::Name(name);
    }
    let parsed = match node.ty {
        ValueType::Integer | ValueType::Fixed => name.parse().ok().map(Operand::Int),
        ValueType::Float => name.parse().ok().map(Operand::Float),
    };
    parsed.unwrap_or(Operand::Name(name))
}
