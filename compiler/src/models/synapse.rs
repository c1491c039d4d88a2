// synapse.rs — Spike delivery and Poisson spike sources
//
// Preconditions: none.
// Postconditions: `Spike` touches only indexed slots; `PoissonSource`
//                 declares nothing but its output.
// Failure modes: none.
// Side effects: none.

use crate::diag::Diagnostic;
use crate::ir::{Access, Graph, NamedKind, NeuronProgram, ValueId, ValueType};

/// Adds an incoming synapse weight onto the target's excitatory accumulator.
pub struct Spike {
    weight: ValueId,
    exc: ValueId,
}

impl NeuronProgram for Spike {
    fn declare(g: &mut Graph) -> Result<Self, Diagnostic> {
        Ok(Self {
            weight: g.declare(NamedKind::Input, "weight", ValueType::Float, Access::Indexed),
            exc: g.declare(NamedKind::Variable, "exc", ValueType::Float, Access::Indexed),
        })
    }

    fn activate(&self, g: &mut Graph) -> Result<(), Diagnostic> {
        let sum = g.add(self.exc, self.weight)?;
        g.bind(self.exc, sum)
    }
}

/// Fires with Poisson statistics at a fixed rate per step.
pub struct PoissonSource {
    fire: ValueId,
}

impl PoissonSource {
    pub const RATE: f64 = 0.5;
}

impl NeuronProgram for PoissonSource {
    fn declare(g: &mut Graph) -> Result<Self, Diagnostic> {
        Ok(Self {
            fire: g.output("fire", ValueType::Integer),
        })
    }

    fn activate(&self, g: &mut Graph) -> Result<(), Diagnostic> {
        let spike = g.poisson(Self::RATE)?;
        g.bind(self.fire, spike)
    }
}
