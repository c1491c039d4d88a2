// models — Built-in neuron and synapse programs
//
// Each model is a `NeuronProgram`; `Model` names them so the command line
// and the benchmarks can pick one by string.
//
// Preconditions: none.
// Postconditions: `Model::build` returns a fully built graph.
// Failure modes: unknown model names (E0002); graph type errors (E0100).
// Side effects: none.

pub mod hodgkin_huxley;
pub mod izhikevich;
pub mod lif;
pub mod synapse;

use std::fmt;
use std::str::FromStr;

use crate::diag::{codes, Diagnostic};
use crate::ir::{build_program, Graph};

pub use hodgkin_huxley::HodgkinHuxley;
pub use izhikevich::{Izhikevich, IzhikevichEuler, IzhikevichFixed};
pub use lif::{If, Lif, LifSnava, LifSnavaFixed};
pub use synapse::{PoissonSource, Spike};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Model {
    Lif,
    LifSnava,
    LifSnavaFixed,
    If,
    Izhikevich,
    IzhikevichEuler,
    IzhikevichFixed,
    HodgkinHuxley,
    Spike,
    Poisson,
}

impl Model {
    pub const ALL: [Model; 10] = [
        Model::Lif,
        Model::LifSnava,
        Model::LifSnavaFixed,
        Model::If,
        Model::Izhikevich,
        Model::IzhikevichEuler,
        Model::IzhikevichFixed,
        Model::HodgkinHuxley,
        Model::Spike,
        Model::Poisson,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Model::Lif => "lif",
            Model::LifSnava => "lif_snava",
            Model::LifSnavaFixed => "lif_snava_fixed",
            Model::If => "if",
            Model::Izhikevich => "izhikevich",
            Model::IzhikevichEuler => "izhikevich_euler",
            Model::IzhikevichFixed => "izhikevich_fixed",
            Model::HodgkinHuxley => "hodgkin_huxley",
            Model::Spike => "spike",
            Model::Poisson => "poisson",
        }
    }

    pub fn build(self) -> Result<Graph, Diagnostic> {
        match self {
            Model::Lif => build_program::<Lif>(),
            Model::LifSnava => build_program::<LifSnava>(),
            Model::LifSnavaFixed => build_program::<LifSnavaFixed>(),
            Model::If => build_program::<If>(),
            Model::Izhikevich => build_program::<Izhikevich>(),
            Model::IzhikevichEuler => build_program::<IzhikevichEuler>(),
            Model::IzhikevichFixed => build_program::<IzhikevichFixed>(),
            Model::HodgkinHuxley => build_program::<HodgkinHuxley>(),
            Model::Spike => build_program::<Spike>(),
            Model::Poisson => build_program::<PoissonSource>(),
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Model {
    type Err = Diagnostic;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Model::ALL
            .into_iter()
            .find(|m| m.name() == s)
            .ok_or_else(|| {
                let known: Vec<&str> = Model::ALL.iter().map(|m| m.name()).collect();
                Diagnostic::error(codes::E0002, format!("unknown model '{s}'"))
                    .with_hint(format!("available models: {}", known.join(", ")))
            })
    }
}
