// hodgkin_huxley.rs — Hodgkin-Huxley neuron with conductance synapses
//
// Traub-Miles gating kinetics, forward Euler over one `dt`. Rate functions
// are evaluated on the membrane potential shifted by `v_offset`.
//
// Preconditions: none.
// Postconditions: `fire` is a plain threshold crossing; there is no reset,
//                 the sodium and potassium currents bring the membrane down.
// Failure modes: none beyond graph type errors (E0100).
// Side effects: none.

use crate::diag::Diagnostic;
use crate::ir::{Graph, NeuronProgram, ValueId, ValueType};

pub struct HodgkinHuxley {
    v: ValueId,
    n: ValueId,
    m: ValueId,
    h: ValueId,
    g_exc: ValueId,
    g_inh: ValueId,
    exc: ValueId,
    inh: ValueId,
    inv_c_m: ValueId,
    g_na: ValueId,
    g_k: ValueId,
    g_l: ValueId,
    e_na: ValueId,
    e_k: ValueId,
    e_l: ValueId,
    e_ex: ValueId,
    e_in: ValueId,
    inv_tau_syn_e: ValueId,
    inv_tau_syn_i: ValueId,
    i_offset: ValueId,
    v_offset: ValueId,
    v_thresh: ValueId,
    dt: ValueId,
    fire: ValueId,
    lit: Literals,
}

/// Numeric constants of the rate functions.
struct Literals {
    k0_032: ValueId,
    k0_128: ValueId,
    k0_2: ValueId,
    k0_25: ValueId,
    k0_28: ValueId,
    k0_32: ValueId,
    k0_5: ValueId,
    k1: ValueId,
    k4: ValueId,
    k10: ValueId,
    k13: ValueId,
    k15: ValueId,
    k17: ValueId,
    k18: ValueId,
    k40: ValueId,
}

impl Literals {
    fn declare(g: &mut Graph) -> Result<Self, Diagnostic> {
        Ok(Self {
            k0_032: g.float(0.032)?,
            k0_128: g.float(0.128)?,
            k0_2: g.float(0.2)?,
            k0_25: g.float(0.25)?,
            k0_28: g.float(0.28)?,
            k0_32: g.float(0.32)?,
            k0_5: g.float(0.5)?,
            k1: g.float(1.0)?,
            k4: g.float(4.0)?,
            k10: g.float(10.0)?,
            k13: g.float(13.0)?,
            k15: g.float(15.0)?,
            k17: g.float(17.0)?,
            k18: g.float(18.0)?,
            k40: g.float(40.0)?,
        })
    }
}

/// `x + (alpha - (alpha + beta) * x) * dt`
fn gate(
    g: &mut Graph,
    x: ValueId,
    alpha: ValueId,
    beta: ValueId,
    dt: ValueId,
) -> Result<ValueId, Diagnostic> {
    let rate = g.add(alpha, beta)?;
    let decay = g.mul(rate, x)?;
    let dx = g.sub(alpha, decay)?;
    let step = g.mul(dx, dt)?;
    g.add(x, step)
}

/// `g_syn - g_syn * inv_tau * dt + spikes`
fn synapse(
    g: &mut Graph,
    g_syn: ValueId,
    inv_tau: ValueId,
    dt: ValueId,
    spikes: ValueId,
) -> Result<ValueId, Diagnostic> {
    let decay = g.mul(g_syn, inv_tau)?;
    let decay = g.mul(decay, dt)?;
    let left = g.sub(g_syn, decay)?;
    g.add(left, spikes)
}

/// `numerator / (exp(arg) - 1)`
fn exp_ratio(
    g: &mut Graph,
    numerator: ValueId,
    arg: ValueId,
    one: ValueId,
) -> Result<ValueId, Diagnostic> {
    let e = g.exp(arg)?;
    let denom = g.sub(e, one)?;
    g.div(numerator, denom)
}

impl HodgkinHuxley {
    /// Ionic and synaptic currents at potential `v`, summed into the
    /// membrane update.
    fn membrane(&self, g: &mut Graph) -> Result<ValueId, Diagnostic> {
        let v = self.v;

        // i_na = g_na * m³ * h * (v - e_na)
        let i_na = g.mul(self.g_na, self.m)?;
        let i_na = g.mul(i_na, self.m)?;
        let i_na = g.mul(i_na, self.m)?;
        let i_na = g.mul(i_na, self.h)?;
        let dv_na = g.sub(v, self.e_na)?;
        let i_na = g.mul(i_na, dv_na)?;

        // i_k = g_k * n⁴ * (v - e_k)
        let i_k = g.mul(self.g_k, self.n)?;
        let i_k = g.mul(i_k, self.n)?;
        let i_k = g.mul(i_k, self.n)?;
        let i_k = g.mul(i_k, self.n)?;
        let dv_k = g.sub(v, self.e_k)?;
        let i_k = g.mul(i_k, dv_k)?;

        let dv_l = g.sub(v, self.e_l)?;
        let i_l = g.mul(self.g_l, dv_l)?;

        let dv_ex = g.sub(v, self.e_ex)?;
        let i_syn_exc = g.mul(self.g_exc, dv_ex)?;
        let dv_in = g.sub(v, self.e_in)?;
        let i_syn_inh = g.mul(self.g_inh, dv_in)?;

        let mut total = self.i_offset;
        for current in [i_na, i_k, i_l, i_syn_exc, i_syn_inh] {
            total = g.sub(total, current)?;
        }
        let dv = g.mul(total, self.inv_c_m)?;
        let dv = g.mul(dv, self.dt)?;
        g.add(v, dv)
    }
}

impl NeuronProgram for HodgkinHuxley {
    fn declare(g: &mut Graph) -> Result<Self, Diagnostic> {
        use ValueType::{Float, Integer};
        Ok(Self {
            v: g.variable("v", Float),
            n: g.variable("n", Float),
            m: g.variable("m", Float),
            h: g.variable("h", Float),
            g_exc: g.variable("g_exc", Float),
            g_inh: g.variable("g_inh", Float),
            exc: g.variable("exc", Float),
            inh: g.variable("inh", Float),
            inv_c_m: g.constant("inv_c_m", Float),
            g_na: g.constant("g_na", Float),
            g_k: g.constant("g_k", Float),
            g_l: g.constant("g_l", Float),
            e_na: g.constant("e_na", Float),
            e_k: g.constant("e_k", Float),
            e_l: g.constant("e_l", Float),
            e_ex: g.constant("e_ex", Float),
            e_in: g.constant("e_in", Float),
            inv_tau_syn_e: g.constant("inv_tau_syn_E", Float),
            inv_tau_syn_i: g.constant("inv_tau_syn_I", Float),
            i_offset: g.constant("i_offset", Float),
            v_offset: g.constant("v_offset", Float),
            v_thresh: g.constant("v_thresh", Float),
            dt: g.constant("dt", Float),
            fire: g.output("fire", Integer),
            lit: Literals::declare(g)?,
        })
    }

    fn activate(&self, g: &mut Graph) -> Result<(), Diagnostic> {
        let k = &self.lit;
        let v = self.membrane(g)?;
        let shifted = g.sub(v, self.v_offset)?;

        // alpha_m = 0.32 (13 - V) / (exp((13 - V) / 4) - 1)
        let d = g.sub(k.k13, shifted)?;
        let num = g.mul(k.k0_32, d)?;
        let d = g.sub(k.k13, shifted)?;
        let arg = g.mul(d, k.k0_25)?;
        let alpha_m = exp_ratio(g, num, arg, k.k1)?;

        // beta_m = 0.28 (V - 40) / (exp((V - 40) / 5) - 1)
        let d = g.sub(shifted, k.k40)?;
        let num = g.mul(k.k0_28, d)?;
        let d = g.sub(shifted, k.k40)?;
        let arg = g.mul(d, k.k0_2)?;
        let beta_m = exp_ratio(g, num, arg, k.k1)?;

        // alpha_n = 0.032 (15 - V) / (exp((15 - V) / 5) - 1)
        let d = g.sub(k.k15, shifted)?;
        let num = g.mul(k.k0_032, d)?;
        let d = g.sub(k.k15, shifted)?;
        let arg = g.mul(d, k.k0_2)?;
        let alpha_n = exp_ratio(g, num, arg, k.k1)?;

        // beta_n = 0.5 exp((10 - V) / 40)
        let d = g.sub(k.k10, shifted)?;
        let arg = g.div(d, k.k40)?;
        let e = g.exp(arg)?;
        let beta_n = g.mul(k.k0_5, e)?;

        // alpha_h = 0.128 exp((17 - V) / 18)
        let d = g.sub(k.k17, shifted)?;
        let arg = g.div(d, k.k18)?;
        let e = g.exp(arg)?;
        let alpha_h = g.mul(k.k0_128, e)?;

        // beta_h = 4 / (1 + exp((40 - V) / 5))
        let d = g.sub(k.k40, shifted)?;
        let arg = g.mul(d, k.k0_2)?;
        let e = g.exp(arg)?;
        let denom = g.add(k.k1, e)?;
        let beta_h = g.div(k.k4, denom)?;

        let m = gate(g, self.m, alpha_m, beta_m, self.dt)?;
        let h = gate(g, self.h, alpha_h, beta_h, self.dt)?;
        let n = gate(g, self.n, alpha_n, beta_n, self.dt)?;

        let g_exc = synapse(g, self.g_exc, self.inv_tau_syn_e, self.dt, self.exc)?;
        let g_inh = synapse(g, self.g_inh, self.inv_tau_syn_i, self.dt, self.inh)?;

        let fire = g.ge(v, self.v_thresh)?;

        g.bind(self.v, v)?;
        g.bind(self.m, m)?;
        g.bind(self.h, h)?;
        g.bind(self.n, n)?;
        g.bind(self.g_exc, g_exc)?;
        g.bind(self.g_inh, g_inh)?;
        g.bind(self.fire, fire)?;
        let zero = g.int(0);
        g.bind(self.exc, zero)?;
        g.bind(self.inh, zero)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::format_insts;
    use crate::ir::build_program;
    use crate::linearize::linearize;

    #[test]
    fn six_exponentials() {
        let g = build_program::<HodgkinHuxley>().unwrap();
        let exps = g.nodes().iter().filter(|n| n.op == "exp_f").count();
        assert_eq!(exps, 6);
    }

    #[test]
    fn every_state_variable_written_once() {
        let g = build_program::<HodgkinHuxley>().unwrap();
        let text = format_insts(&linearize(&g));
        for slot in ["V_v", "V_n", "V_m", "V_h", "V_g_exc", "V_g_inh", "V_exc", "V_inh"] {
            assert_eq!(
                text.matches(&format!("\n{slot} = move(")).count(),
                1,
                "{slot} in\n{text}"
            );
        }
        assert!(text.contains("O_fire = fire("), "{text}");
    }

    #[test]
    fn rates_read_the_shifted_potential() {
        let g = build_program::<HodgkinHuxley>().unwrap();
        let text = format_insts(&linearize(&g));
        assert!(text.contains(", C_v_offset)"), "{text}");
        assert!(text.contains("sub_f(13.0, T_"), "{text}");
        assert!(text.contains("div_f(4.0, T_"), "{text}");
    }
}
