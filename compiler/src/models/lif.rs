// lif.rs — Leaky and non-leaky integrate-and-fire neurons
//
// All three share a refractory counter: while `ref_step` is positive the
// membrane holds and the counter counts down; a spike reloads it.
//
// Preconditions: none.
// Postconditions: every model binds `fire` and clears the synaptic
//                 accumulators `exc` and `inh` for the next step.
// Failure modes: literals unrepresentable in the chosen arithmetic (E0100).
// Side effects: none.

use crate::diag::Diagnostic;
use crate::ir::{Graph, NeuronProgram, ValueId, ValueType};

// ── Shared refractory handling ──

/// `refract = ref_step > 0; ref_step -= refract`
fn count_down(g: &mut Graph, ref_step: ValueId) -> Result<(ValueId, ValueId), Diagnostic> {
    let zero = g.int(0);
    let refract = g.gt(ref_step, zero)?;
    let remaining = g.sub(ref_step, refract)?;
    Ok((refract, remaining))
}

/// Clear both accumulators. They are zeroed with an integer literal even
/// when declared as a different type; a zero word reads the same either way.
fn clear_accumulators(g: &mut Graph, exc: ValueId, inh: ValueId) -> Result<(), Diagnostic> {
    let zero = g.int(0);
    g.bind(exc, zero)?;
    g.bind(inh, zero)
}

// ── LIF with current-based synapses ─────────────────────────────────────

/// Leaky integrate-and-fire with exponentially decaying synaptic currents.
pub struct Lif {
    ref_step: ValueId,
    v_m: ValueId,
    i_e: ValueId,
    i_i: ValueId,
    exc: ValueId,
    inh: ValueId,
    e_m: ValueId,
    v_tmp: ValueId,
    c_e: ValueId,
    c_i: ValueId,
    e_e: ValueId,
    e_i: ValueId,
    v_thresh: ValueId,
    v_reset: ValueId,
    ref_time_m1: ValueId,
    fire: ValueId,
}

impl NeuronProgram for Lif {
    fn declare(g: &mut Graph) -> Result<Self, Diagnostic> {
        use ValueType::{Float, Integer};
        Ok(Self {
            ref_step: g.variable("ref_step", Integer),
            v_m: g.variable("v_m", Float),
            i_e: g.variable("i_e", Float),
            i_i: g.variable("i_i", Float),
            exc: g.variable("exc", Float),
            inh: g.variable("inh", Float),
            e_m: g.constant("e_m", Float),
            v_tmp: g.constant("v_tmp", Float),
            c_e: g.constant("c_e", Float),
            c_i: g.constant("c_i", Float),
            e_e: g.constant("e_e", Float),
            e_i: g.constant("e_i", Float),
            v_thresh: g.constant("v_thresh", Float),
            v_reset: g.constant("v_reset", Float),
            ref_time_m1: g.constant("ref_time_m1", Integer),
            fire: g.output("fire", Integer),
        })
    }

    fn activate(&self, g: &mut Graph) -> Result<(), Diagnostic> {
        let (refract, ref_step) = count_down(g, self.ref_step)?;

        // v_m = e_m*v_m + v_tmp + i_e*c_e + i_i*c_i
        let leak = g.mul(self.e_m, self.v_m)?;
        let acc = g.add(leak, self.v_tmp)?;
        let exc_drive = g.mul(self.i_e, self.c_e)?;
        let acc = g.add(acc, exc_drive)?;
        let inh_drive = g.mul(self.i_i, self.c_i)?;
        let integrated = g.add(acc, inh_drive)?;
        let v_m = g.mux(refract, self.v_m, integrated)?;

        let decayed = g.mul(self.i_e, self.e_e)?;
        let i_e = g.add(decayed, self.exc)?;
        let decayed = g.mul(self.i_i, self.e_i)?;
        let i_i = g.add(decayed, self.inh)?;

        let fire = g.ge(v_m, self.v_thresh)?;
        let ref_step = g.mux(fire, self.ref_time_m1, ref_step)?;
        let v_m = g.mux(fire, self.v_reset, v_m)?;

        g.bind(self.ref_step, ref_step)?;
        g.bind(self.v_m, v_m)?;
        g.bind(self.i_e, i_e)?;
        g.bind(self.i_i, i_i)?;
        g.bind(self.fire, fire)?;
        clear_accumulators(g, self.exc, self.inh)
    }
}

// ── LIF as run on the SNAVA platform ────────────────────────────────────

/// Leaky integrate-and-fire where spikes add straight into the membrane.
/// Generic over the membrane arithmetic so it also runs in fixed point.
pub struct LifSnava {
    ref_step: ValueId,
    v_m: ValueId,
    exc: ValueId,
    inh: ValueId,
    e_m: ValueId,
    v_tmp: ValueId,
    v_thresh: ValueId,
    v_reset: ValueId,
    ref_time_m1: ValueId,
    fire: ValueId,
}

impl LifSnava {
    pub fn declare_with(g: &mut Graph, ty: ValueType) -> Self {
        use ValueType::Integer;
        Self {
            ref_step: g.variable("ref_step", Integer),
            v_m: g.variable("v_m", ty),
            exc: g.variable("exc", ty),
            inh: g.variable("inh", ty),
            e_m: g.constant("e_m", ty),
            v_tmp: g.constant("v_tmp", ty),
            v_thresh: g.constant("v_thresh", ty),
            v_reset: g.constant("v_reset", ty),
            ref_time_m1: g.constant("ref_time_m1", Integer),
            fire: g.output("fire", Integer),
        }
    }
}

impl NeuronProgram for LifSnava {
    fn declare(g: &mut Graph) -> Result<Self, Diagnostic> {
        Ok(Self::declare_with(g, ValueType::Float))
    }

    fn activate(&self, g: &mut Graph) -> Result<(), Diagnostic> {
        let (refract, ref_step) = count_down(g, self.ref_step)?;

        let leak = g.mul(self.e_m, self.v_m)?;
        let acc = g.add(leak, self.v_tmp)?;
        let acc = g.add(acc, self.exc)?;
        let integrated = g.sub(acc, self.inh)?;
        let v_m = g.mux(refract, self.v_m, integrated)?;

        let fire = g.ge(v_m, self.v_thresh)?;
        let ref_step = g.mux(fire, self.ref_time_m1, ref_step)?;
        let v_m = g.mux(fire, self.v_reset, v_m)?;

        g.bind(self.ref_step, ref_step)?;
        g.bind(self.v_m, v_m)?;
        g.bind(self.fire, fire)?;
        clear_accumulators(g, self.exc, self.inh)
    }
}

/// `LifSnava` in 8.23 fixed point.
pub struct LifSnavaFixed(LifSnava);

impl NeuronProgram for LifSnavaFixed {
    fn declare(g: &mut Graph) -> Result<Self, Diagnostic> {
        Ok(Self(LifSnava::declare_with(g, ValueType::Fixed)))
    }

    fn activate(&self, g: &mut Graph) -> Result<(), Diagnostic> {
        self.0.activate(g)
    }
}

// ── Non-leaky integrate-and-fire ────────────────────────────────────────

pub struct If {
    ref_step: ValueId,
    v_m: ValueId,
    exc: ValueId,
    inh: ValueId,
    c_e: ValueId,
    c_i: ValueId,
    v_thresh: ValueId,
    v_reset: ValueId,
    ref_time: ValueId,
    fire: ValueId,
}

impl NeuronProgram for If {
    fn declare(g: &mut Graph) -> Result<Self, Diagnostic> {
        use ValueType::{Float, Integer};
        Ok(Self {
            ref_step: g.variable("ref_step", Integer),
            v_m: g.variable("v_m", Float),
            exc: g.variable("exc", Float),
            inh: g.variable("inh", Float),
            c_e: g.constant("c_e", Float),
            c_i: g.constant("c_i", Float),
            v_thresh: g.constant("v_thresh", Float),
            v_reset: g.constant("v_reset", Float),
            ref_time: g.constant("ref_time", Integer),
            fire: g.output("fire", Integer),
        })
    }

    fn activate(&self, g: &mut Graph) -> Result<(), Diagnostic> {
        let (refract, ref_step) = count_down(g, self.ref_step)?;

        let exc_drive = g.mul(self.exc, self.c_e)?;
        let acc = g.add(self.v_m, exc_drive)?;
        let inh_drive = g.mul(self.inh, self.c_i)?;
        let integrated = g.add(acc, inh_drive)?;
        let v_m = g.mux(refract, self.v_m, integrated)?;

        let fire = g.ge(v_m, self.v_thresh)?;
        let one = g.int(1);
        let reload = g.sub(self.ref_time, one)?;
        let ref_step = g.mux(fire, reload, ref_step)?;
        let v_m = g.mux(fire, self.v_reset, v_m)?;

        g.bind(self.ref_step, ref_step)?;
        g.bind(self.v_m, v_m)?;
        g.bind(self.fire, fire)?;
        clear_accumulators(g, self.exc, self.inh)
    }
}
