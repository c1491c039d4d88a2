// ir.rs — Value graph for neuron update programs
//
// A client program declares named slots (inputs, constants, variables,
// outputs), then describes one activation step through builder methods.
// Every builder call appends one immutable node to an arena; operands are
// arena indices, so creation order is also a valid topological order.
//
// Preconditions: none; a `Graph` is constructed fresh per program.
// Postconditions: nodes are never mutated after creation; every operand id
//                 is lower than the id of the node that consumes it.
// Failure modes: operand type mismatch, type-restricted operation on the
//                wrong type, unrepresentable literal → GraphTypeError (E0100).
// Side effects: none.

use std::collections::HashMap;
use std::fmt;

use crate::diag::{codes, Diagnostic};

// ── Node identity and classification ────────────────────────────────────

/// Arena index of a node; doubles as its creation-order key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Input,
    Const,
    Variable,
    Output,
    Literal,
    Temporary,
}

/// The declarable subset of `ValueKind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamedKind {
    Input,
    Const,
    Variable,
    Output,
}

impl From<NamedKind> for ValueKind {
    fn from(kind: NamedKind) -> Self {
        match kind {
            NamedKind::Input => ValueKind::Input,
            NamedKind::Const => ValueKind::Const,
            NamedKind::Variable => ValueKind::Variable,
            NamedKind::Output => ValueKind::Output,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Integer,
    Float,
    Fixed,
}

impl ValueType {
    /// Opcode suffix selecting the typed variant of an operation.
    pub fn suffix(self) -> &'static str {
        match self {
            ValueType::Integer => "_i",
            ValueType::Float => "_f",
            ValueType::Fixed => "_x",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Integer => write!(f, "integer"),
            ValueType::Float => write!(f, "float"),
            ValueType::Fixed => write!(f, "fixed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Access {
    /// One slot per logical instance.
    #[default]
    Strided,
    /// One slot per target (per-synapse / per-projection arrays).
    Indexed,
}

/// Fixed-point scale: literals are stored as `round(x * 2^23)`.
pub const FIXED_SCALE: f64 = (1u32 << 23) as f64;

/// A node in the value graph.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: ValueId,
    pub kind: ValueKind,
    pub ty: ValueType,
    /// Operation name; empty for leaves.
    pub op: String,
    pub operands: Vec<ValueId>,
    pub access: Access,
    /// Declared name for named leaves, literal text for literals.
    pub label: Option<String>,
}

// ── Graph ────────────────────────────────────────────────────────────────

/// Compilation context for one client program: node arena, declared slots,
/// and the current binding of every rebindable slot.
#[derive(Debug, Default)]
pub struct Graph {
    nodes: Vec<Node>,
    /// Variables and outputs, in declaration order.
    slots: Vec<ValueId>,
    bindings: HashMap<ValueId, ValueId>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: ValueId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    /// All nodes in creation order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn ty(&self, id: ValueId) -> ValueType {
        self.node(id).ty
    }

    /// Declared variables and outputs with their final bindings, in
    /// declaration order.
    pub fn final_bindings(&self) -> impl Iterator<Item = (ValueId, ValueId)> + '_ {
        self.slots.iter().map(|&slot| (slot, self.current(slot)))
    }

    /// Generated name of a node, as it appears in linear instructions.
    pub fn name(&self, id: ValueId) -> String {
        let node = self.node(id);
        let indexed = if node.access == Access::Indexed { "I" } else { "" };
        let label = node.label.as_deref().unwrap_or_default();
        match node.kind {
            ValueKind::Input => format!("I{indexed}_{label}"),
            ValueKind::Const => format!("C{indexed}_{label}"),
            ValueKind::Variable => format!("V{indexed}_{label}"),
            ValueKind::Output => format!("O{indexed}_{label}"),
            ValueKind::Literal => label.to_string(),
            ValueKind::Temporary => format!("T_{}", id.0),
        }
    }

    fn push(&mut self, mut node: Node) -> ValueId {
        let id = ValueId(self.nodes.len() as u32);
        node.id = id;
        self.nodes.push(node);
        id
    }

    // ── Declarations ──

    /// Declare a named slot. Variables and outputs become rebindable and
    /// start out bound to themselves.
    pub fn declare(&mut self, kind: NamedKind, name: &str, ty: ValueType, access: Access) -> ValueId {
        let id = self.push(Node {
            id: ValueId(0),
            kind: kind.into(),
            ty,
            op: String::new(),
            operands: Vec::new(),
            access,
            label: Some(name.to_string()),
        });
        if matches!(kind, NamedKind::Variable | NamedKind::Output) {
            self.slots.push(id);
            self.bindings.insert(id, id);
        }
        id
    }

    pub fn input(&mut self, name: &str, ty: ValueType) -> ValueId {
        self.declare(NamedKind::Input, name, ty, Access::Strided)
    }

    pub fn constant(&mut self, name: &str, ty: ValueType) -> ValueId {
        self.declare(NamedKind::Const, name, ty, Access::Strided)
    }

    pub fn variable(&mut self, name: &str, ty: ValueType) -> ValueId {
        self.declare(NamedKind::Variable, name, ty, Access::Strided)
    }

    pub fn output(&mut self, name: &str, ty: ValueType) -> ValueId {
        self.declare(NamedKind::Output, name, ty, Access::Strided)
    }

    // ── Literals ──

    fn push_literal(&mut self, text: String, ty: ValueType) -> ValueId {
        self.push(Node {
            id: ValueId(0),
            kind: ValueKind::Literal,
            ty,
            op: String::new(),
            operands: Vec::new(),
            access: Access::Strided,
            label: Some(text),
        })
    }

    pub fn int(&mut self, value: i64) -> ValueId {
        self.push_literal(value.to_string(), ValueType::Integer)
    }

    /// Float literal, narrowed to single precision.
    pub fn float(&mut self, value: f64) -> Result<ValueId, Diagnostic> {
        let narrowed = value as f32;
        if !narrowed.is_finite() {
            return Err(type_error(format!(
                "float literal {value} is not representable as a finite f32"
            )));
        }
        Ok(self.push_literal(format!("{narrowed:?}"), ValueType::Float))
    }

    /// Fixed-point literal: the 32-bit two's-complement word `round(x * 2^23)`,
    /// printed as its signed value.
    pub fn fixed(&mut self, value: f64) -> Result<ValueId, Diagnostic> {
        let word = fixed_word(value).ok_or_else(|| {
            type_error(format!(
                "fixed-point literal {value} does not fit a 32-bit word at scale 2^23"
            ))
        })?;
        Ok(self.push_literal(word.to_string(), ValueType::Fixed))
    }

    /// Typed literal from a numeric value, the way client programs spell them.
    pub fn literal(&mut self, value: f64, ty: ValueType) -> Result<ValueId, Diagnostic> {
        match ty {
            ValueType::Integer => Ok(self.int(value.trunc() as i64)),
            ValueType::Float => self.float(value),
            ValueType::Fixed => self.fixed(value),
        }
    }

    // ── Operations ──

    fn push_temp(&mut self, ty: ValueType, op: String, operands: Vec<ValueId>) -> ValueId {
        debug_assert!(operands.len() <= crate::asm::MAX_ARITY);
        let access = if operands
            .iter()
            .any(|&o| self.node(o).access == Access::Indexed)
        {
            Access::Indexed
        } else {
            Access::Strided
        };
        self.push(Node {
            id: ValueId(0),
            kind: ValueKind::Temporary,
            ty,
            op,
            operands,
            access,
            label: None,
        })
    }

    fn same_type(&self, op: &str, a: ValueId, b: ValueId) -> Result<ValueType, Diagnostic> {
        let (ta, tb) = (self.ty(a), self.ty(b));
        if ta != tb {
            return Err(type_error(format!(
                "type mismatch in {op}: {} is {ta}, {} is {tb}",
                self.name(a),
                self.name(b)
            )));
        }
        Ok(ta)
    }

    fn require(&self, op: &str, v: ValueId, ty: ValueType) -> Result<(), Diagnostic> {
        let actual = self.ty(v);
        if actual != ty {
            return Err(type_error(format!(
                "{op} requires a {ty} operand, {} is {actual}",
                self.name(v)
            )));
        }
        Ok(())
    }

    fn arith(&mut self, base: &str, a: ValueId, b: ValueId) -> Result<ValueId, Diagnostic> {
        let ty = self.same_type(base, a, b)?;
        Ok(self.push_temp(ty, format!("{base}{}", ty.suffix()), vec![a, b]))
    }

    fn compare(&mut self, base: &str, a: ValueId, b: ValueId) -> Result<ValueId, Diagnostic> {
        let ty = self.same_type(base, a, b)?;
        Ok(self.push_temp(
            ValueType::Integer,
            format!("{base}{}", ty.suffix()),
            vec![a, b],
        ))
    }

    pub fn add(&mut self, a: ValueId, b: ValueId) -> Result<ValueId, Diagnostic> {
        self.arith("add", a, b)
    }

    pub fn sub(&mut self, a: ValueId, b: ValueId) -> Result<ValueId, Diagnostic> {
        self.arith("sub", a, b)
    }

    pub fn mul(&mut self, a: ValueId, b: ValueId) -> Result<ValueId, Diagnostic> {
        self.arith("mul", a, b)
    }

    pub fn div(&mut self, a: ValueId, b: ValueId) -> Result<ValueId, Diagnostic> {
        self.arith("div", a, b)
    }

    pub fn le(&mut self, a: ValueId, b: ValueId) -> Result<ValueId, Diagnostic> {
        self.compare("le", a, b)
    }

    pub fn ge(&mut self, a: ValueId, b: ValueId) -> Result<ValueId, Diagnostic> {
        self.compare("ge", a, b)
    }

    pub fn gt(&mut self, a: ValueId, b: ValueId) -> Result<ValueId, Diagnostic> {
        self.compare("gt", a, b)
    }

    pub fn and(&mut self, a: ValueId, b: ValueId) -> Result<ValueId, Diagnostic> {
        self.require("and", a, ValueType::Integer)?;
        self.require("and", b, ValueType::Integer)?;
        Ok(self.push_temp(ValueType::Integer, "and_i".into(), vec![a, b]))
    }

    pub fn or(&mut self, a: ValueId, b: ValueId) -> Result<ValueId, Diagnostic> {
        self.require("or", a, ValueType::Integer)?;
        self.require("or", b, ValueType::Integer)?;
        Ok(self.push_temp(ValueType::Integer, "or_i".into(), vec![a, b]))
    }

    pub fn not(&mut self, a: ValueId) -> Result<ValueId, Diagnostic> {
        self.require("not", a, ValueType::Integer)?;
        Ok(self.push_temp(ValueType::Integer, "not_i".into(), vec![a]))
    }

    /// Three-way select: `cond ? on_true : on_false`.
    pub fn mux(
        &mut self,
        cond: ValueId,
        on_true: ValueId,
        on_false: ValueId,
    ) -> Result<ValueId, Diagnostic> {
        self.require("mux condition", cond, ValueType::Integer)?;
        let ty = self.same_type("mux", on_true, on_false)?;
        Ok(self.push_temp(ty, "mux".into(), vec![cond, on_true, on_false]))
    }

    pub fn exp(&mut self, a: ValueId) -> Result<ValueId, Diagnostic> {
        self.require("exp", a, ValueType::Float)?;
        Ok(self.push_temp(ValueType::Float, "exp_f".into(), vec![a]))
    }

    /// Poisson spike source with rate `lambda`: the hardware compares a
    /// uniform 16-bit sample against `exp(-lambda) * 2^16`.
    pub fn poisson(&mut self, lambda: f64) -> Result<ValueId, Diagnostic> {
        let threshold = (-lambda).exp() * 65536.0;
        if !threshold.is_finite() {
            return Err(type_error(format!("poisson rate {lambda} is not finite")));
        }
        let imm = self.int(threshold.trunc() as i64);
        Ok(self.push_temp(ValueType::Integer, "pois_imm".into(), vec![imm]))
    }

    // ── Slot bindings ──

    /// Rebind a variable or output to a newly computed value.
    pub fn bind(&mut self, slot: ValueId, value: ValueId) -> Result<(), Diagnostic> {
        match self.bindings.get_mut(&slot) {
            Some(current) => {
                *current = value;
                Ok(())
            }
            None => Err(type_error(format!(
                "{} is not a variable or output and cannot be rebound",
                self.name(slot)
            ))),
        }
    }

    /// The value currently bound to `slot`; non-rebindable nodes resolve to themselves.
    pub fn current(&self, slot: ValueId) -> ValueId {
        self.bindings.get(&slot).copied().unwrap_or(slot)
    }
}

fn fixed_word(value: f64) -> Option<i32> {
    let scaled = (value * FIXED_SCALE).round();
    if !scaled.is_finite() || scaled < i32::MIN as f64 || scaled > u32::MAX as f64 {
        return None;
    }
    // Values in [2^31, 2^32) are already a two's-complement bit pattern.
    Some(scaled as i64 as u32 as i32)
}

fn type_error(message: String) -> Diagnostic {
    Diagnostic::error(codes::E0100, message)
}

// ── Client programs ─────────────────────────────────────────────────────

/// A neuron update program: slot declarations plus one activation step.
pub trait NeuronProgram: Sized {
    fn declare(g: &mut Graph) -> Result<Self, Diagnostic>;

    fn activate(&self, g: &mut Graph) -> Result<(), Diagnostic>;
}

/// Build a program's graph in a fresh compilation context.
pub fn build_program<P: NeuronProgram>() -> Result<Graph, Diagnostic> {
    let mut g = Graph::new();
    let program = P::declare(&mut g)?;
    program.activate(&mut g)?;
    Ok(g)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::ErrorClass;

    #[test]
    fn ids_follow_creation_order() {
        let mut g = Graph::new();
        let v = g.variable("v", ValueType::Float);
        let c = g.constant("c", ValueType::Float);
        let t = g.add(v, c).unwrap();
        assert_eq!((v, c, t), (ValueId(0), ValueId(1), ValueId(2)));
        assert_eq!(g.node(t).operands, vec![v, c]);
        assert_eq!(g.node(t).op, "add_f");
    }

    #[test]
    fn generated_names() {
        let mut g = Graph::new();
        let w = g.declare(NamedKind::Input, "weight", ValueType::Float, Access::Indexed);
        let exc = g.declare(NamedKind::Variable, "exc", ValueType::Float, Access::Indexed);
        let c = g.constant("v_thresh", ValueType::Float);
        let o = g.output("fire", ValueType::Integer);
        let t = g.add(exc, w).unwrap();
        let lit = g.int(7);
        assert_eq!(g.name(w), "II_weight");
        assert_eq!(g.name(exc), "VI_exc");
        assert_eq!(g.name(c), "C_v_thresh");
        assert_eq!(g.name(o), "O_fire");
        assert_eq!(g.name(t), "T_4");
        assert_eq!(g.name(lit), "7");
        assert_eq!(g.node(t).access, Access::Indexed);
    }

    #[test]
    fn compare_yields_integer() {
        let mut g = Graph::new();
        let v = g.variable("v", ValueType::Float);
        let th = g.constant("th", ValueType::Float);
        let f = g.ge(v, th).unwrap();
        assert_eq!(g.ty(f), ValueType::Integer);
        assert_eq!(g.node(f).op, "ge_f");
    }

    #[test]
    fn mismatched_operands_rejected() {
        let mut g = Graph::new();
        let i = g.variable("count", ValueType::Integer);
        let f = g.variable("v", ValueType::Float);
        let err = g.sub(i, f).unwrap_err();
        assert_eq!(err.class(), Some(ErrorClass::GraphTypeError));
        assert!(err.message.contains("V_count"), "{}", err.message);
    }

    #[test]
    fn bitwise_ops_require_integers() {
        let mut g = Graph::new();
        let f = g.variable("v", ValueType::Float);
        assert!(g.not(f).is_err());
        assert!(g.and(f, f).is_err());
        assert!(g.or(f, f).is_err());
        let i = g.variable("n", ValueType::Integer);
        let n = g.not(i).unwrap();
        assert_eq!(g.node(n).op, "not_i");
    }

    #[test]
    fn mux_checks_condition_and_arms() {
        let mut g = Graph::new();
        let cond = g.variable("c", ValueType::Integer);
        let a = g.variable("a", ValueType::Float);
        let b = g.variable("b", ValueType::Fixed);
        assert!(g.mux(a, a, a).is_err());
        assert!(g.mux(cond, a, b).is_err());
        let m = g.mux(cond, a, a).unwrap();
        assert_eq!(g.ty(m), ValueType::Float);
    }

    #[test]
    fn float_literal_text() {
        let mut g = Graph::new();
        let a = g.float(125.0).unwrap();
        let b = g.literal(2.0, ValueType::Float).unwrap();
        let c = g.float(0.04).unwrap();
        assert_eq!(g.name(a), "125.0");
        assert_eq!(g.name(b), "2.0");
        assert_eq!(g.name(c), "0.04");
        assert!(g.float(f64::INFINITY).is_err());
    }

    #[test]
    fn fixed_literal_is_scaled_word() {
        let mut g = Graph::new();
        let one = g.fixed(1.0).unwrap();
        let neg = g.fixed(-1.0).unwrap();
        let half = g.fixed(0.5).unwrap();
        assert_eq!(g.name(one), "8388608");
        assert_eq!(g.name(neg), "-8388608");
        assert_eq!(g.name(half), "4194304");
        assert!(g.fixed(1.0e9).is_err());
    }

    #[test]
    fn poisson_threshold() {
        let mut g = Graph::new();
        let p = g.poisson(0.5).unwrap();
        let imm = g.node(p).operands[0];
        assert_eq!(g.name(imm), "39749");
        assert_eq!(g.node(p).op, "pois_imm");
    }

    #[test]
    fn rebinding_tracks_latest_value() {
        let mut g = Graph::new();
        let v = g.variable("v", ValueType::Float);
        let c = g.constant("c", ValueType::Float);
        assert_eq!(g.current(v), v);
        let t1 = g.add(v, c).unwrap();
        g.bind(v, t1).unwrap();
        let t2 = g.mul(g.current(v), c).unwrap();
        g.bind(v, t2).unwrap();
        assert_eq!(g.current(v), t2);
        assert_eq!(g.final_bindings().collect::<Vec<_>>(), vec![(v, t2)]);
    }

    #[test]
    fn constants_cannot_be_rebound() {
        let mut g = Graph::new();
        let c = g.constant("c", ValueType::Float);
        let err = g.bind(c, c).unwrap_err();
        assert_eq!(err.class(), Some(ErrorClass::GraphTypeError));
    }
}
