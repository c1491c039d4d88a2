// izhikevich.rs — Izhikevich two-variable neuron
//
//   v' = 0.04 v² + 5 v + 140 − u + I
//   u' = a (b v − u)
//
// written as 0.04·v·(v + 125) + 140 − u. `Izhikevich` integrates v with
// two half steps, `IzhikevichEuler` with a single full step.
//
// Preconditions: none.
// Postconditions: on a spike v resets to c and u increments by d.
// Failure modes: literals unrepresentable in the chosen arithmetic (E0100).
// Side effects: none.

use crate::diag::Diagnostic;
use crate::ir::{Graph, NeuronProgram, ValueId, ValueType};

/// Slots and literals of the Izhikevich model.
pub struct Izhikevich {
    v: ValueId,
    u: ValueId,
    exc: ValueId,
    inh: ValueId,
    a: ValueId,
    b: ValueId,
    c: ValueId,
    d: ValueId,
    v_thresh: ValueId,
    dt: ValueId,
    fire: ValueId,
    half: ValueId,
    k2: ValueId,
    k1: ValueId,
    k0: ValueId,
}

impl Izhikevich {
    pub fn declare_with(g: &mut Graph, ty: ValueType) -> Result<Self, Diagnostic> {
        Ok(Self {
            v: g.variable("v", ty),
            u: g.variable("u", ty),
            exc: g.variable("exc", ty),
            inh: g.variable("inh", ty),
            a: g.constant("a", ty),
            b: g.constant("b", ty),
            c: g.constant("c", ty),
            d: g.constant("d", ty),
            v_thresh: g.constant("v_thresh", ty),
            dt: g.constant("dt", ty),
            fire: g.output("fire", ValueType::Integer),
            half: g.literal(0.5, ty)?,
            k2: g.literal(0.04, ty)?,
            k1: g.literal(125.0, ty)?,
            k0: g.literal(140.0, ty)?,
        })
    }

    /// 0.04·v·(v + 125)
    fn quadratic(&self, g: &mut Graph, v: ValueId) -> Result<ValueId, Diagnostic> {
        let scaled = g.mul(v, self.k2)?;
        let shifted = g.add(v, self.k1)?;
        g.mul(scaled, shifted)
    }

    fn half_step(&self, g: &mut Graph, v: ValueId) -> Result<ValueId, Diagnostic> {
        let h = g.mul(self.half, self.dt)?;
        let q = self.quadratic(g, v)?;
        let rest = g.sub(self.k0, self.u)?;
        let dv = g.add(q, rest)?;
        let step = g.mul(h, dv)?;
        g.add(v, step)
    }

    fn euler_step(&self, g: &mut Graph, v: ValueId) -> Result<ValueId, Diagnostic> {
        let q = self.quadratic(g, v)?;
        let dv = g.add(q, self.k0)?;
        let dv = g.sub(dv, self.u)?;
        let step = g.mul(dv, self.dt)?;
        g.add(v, step)
    }

    /// Shared tail: recovery update, threshold, reset, accumulator clear.
    fn finish(&self, g: &mut Graph, v: ValueId) -> Result<(), Diagnostic> {
        // u = u + a*(b*v - u)*dt
        let bv = g.mul(self.b, v)?;
        let du = g.sub(bv, self.u)?;
        let du = g.mul(self.a, du)?;
        let du = g.mul(du, self.dt)?;
        let u = g.add(self.u, du)?;

        let fire = g.ge(v, self.v_thresh)?;
        let v = g.mux(fire, self.c, v)?;
        let bumped = g.add(self.d, u)?;
        let u = g.mux(fire, bumped, u)?;

        g.bind(self.v, v)?;
        g.bind(self.u, u)?;
        g.bind(self.fire, fire)?;
        let zero = g.int(0);
        g.bind(self.exc, zero)?;
        g.bind(self.inh, zero)
    }

    fn inject(&self, g: &mut Graph) -> Result<ValueId, Diagnostic> {
        let v = g.add(self.v, self.exc)?;
        g.sub(v, self.inh)
    }
}

impl NeuronProgram for Izhikevich {
    fn declare(g: &mut Graph) -> Result<Self, Diagnostic> {
        Self::declare_with(g, ValueType::Float)
    }

    fn activate(&self, g: &mut Graph) -> Result<(), Diagnostic> {
        let v = self.inject(g)?;
        let v = self.half_step(g, v)?;
        let v = self.half_step(g, v)?;
        self.finish(g, v)
    }
}

/// Izhikevich with one forward-Euler step per activation.
pub struct IzhikevichEuler(Izhikevich);

impl NeuronProgram for IzhikevichEuler {
    fn declare(g: &mut Graph) -> Result<Self, Diagnostic> {
        Izhikevich::declare_with(g, ValueType::Float).map(Self)
    }

    fn activate(&self, g: &mut Graph) -> Result<(), Diagnostic> {
        let v = self.0.inject(g)?;
        let v = self.0.euler_step(g, v)?;
        self.0.finish(g, v)
    }
}

/// Two-half-step Izhikevich in fixed point.
pub struct IzhikevichFixed(Izhikevich);

impl NeuronProgram for IzhikevichFixed {
    fn declare(g: &mut Graph) -> Result<Self, Diagnostic> {
        Izhikevich::declare_with(g, ValueType::Fixed).map(Self)
    }

    fn activate(&self, g: &mut Graph) -> Result<(), Diagnostic> {
        self.0.activate(g)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::format_insts;
    use crate::ir::build_program;
    use crate::linearize::linearize;

    #[test]
    fn half_steps_double_the_integration() {
        let full = build_program::<Izhikevich>().unwrap();
        let euler = build_program::<IzhikevichEuler>().unwrap();
        let count = |g: &Graph, op: &str| g.nodes().iter().filter(|n| n.op == op).count();
        assert_eq!(count(&full, "mul_f") - count(&euler, "mul_f"), 5);
        assert_eq!(count(&full, "ge_f"), 1);
        assert_eq!(count(&euler, "mux"), 2);
    }

    #[test]
    fn literals_keep_their_text() {
        let g = build_program::<Izhikevich>().unwrap();
        let text = format_insts(&linearize(&g));
        assert!(text.contains("mul_f(0.5, C_dt)"), "{text}");
        assert!(text.contains(", 0.04)"), "{text}");
        assert!(text.contains("add_f(T_"), "{text}");
        assert!(text.contains("sub_f(140.0, V_u)"), "{text}");
    }

    #[test]
    fn reset_binds_both_state_variables() {
        let g = build_program::<IzhikevichEuler>().unwrap();
        let text = format_insts(&linearize(&g));
        assert!(text.contains("mux(T_"), "{text}");
        assert!(text.ends_with("V_exc = move(0)\nV_inh = move(0)\n"), "{text}");
        assert_eq!(text.matches("V_v = move(").count(), 1);
        assert_eq!(text.matches("V_u = move(").count(), 1);
    }

    #[test]
    fn fixed_literals_are_scaled_words() {
        let g = build_program::<IzhikevichFixed>().unwrap();
        let text = format_insts(&linearize(&g));
        assert!(text.contains("mul_x(4194304, C_dt)"), "{text}");
        assert!(!text.contains("_f("), "{text}");
    }
}
