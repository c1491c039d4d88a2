// pass.rs — Stage descriptors, dependency resolution, artifact IDs
//
// Declares the compiler's stages, their dependency edges, and the artifacts
// they produce. The pipeline runner uses this to compute the minimal stage
// list for each --emit target and to skip stages whose artifacts were
// supplied as text (--from linear / --from listing).
//
// Preconditions: none.
// Postconditions: `required_passes` returns stages in execution order.
// Failure modes: none.
// Side effects: none.

use std::collections::HashSet;

// ── Pass and Artifact identifiers ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassId {
    /// Model → value graph.
    Build,
    Linearize,
    /// Optimization rounds plus literal lowering.
    Optimize,
    /// Register and memory allocation.
    Allocate,
    Encode,
}

/// Each maps to one field of the compilation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactId {
    Graph,     // ir::Graph
    Linear,    // Vec<Inst>, symbolic
    Optimized, // Vec<Inst>, symbolic and encodable
    Listing,   // listing::Listing
    Words,     // Vec<u32>
}

// ── Pass descriptor ────────────────────────────────────────────────────────

/// Static metadata about a compiler stage.
pub struct PassDescriptor {
    pub name: &'static str,
    /// Stages whose outputs this stage consumes.
    pub inputs: &'static [PassId],
    pub outputs: &'static [ArtifactId],
    /// Postconditions, for verbose output and documentation.
    pub invariants: &'static str,
}

pub fn descriptor(id: PassId) -> PassDescriptor {
    match id {
        PassId::Build => PassDescriptor {
            name: "build",
            inputs: &[],
            outputs: &[ArtifactId::Graph],
            invariants: "operands precede their consumers, types agree",
        },
        PassId::Linearize => PassDescriptor {
            name: "linearize",
            inputs: &[PassId::Build],
            outputs: &[ArtifactId::Linear],
            invariants: "one instruction per temporary, one write-back per slot",
        },
        PassId::Optimize => PassDescriptor {
            name: "optimize",
            inputs: &[PassId::Linearize],
            outputs: &[ArtifactId::Optimized],
            invariants: "side effects kept in order, literals in immediate positions",
        },
        PassId::Allocate => PassDescriptor {
            name: "allocate",
            inputs: &[PassId::Optimize],
            outputs: &[ArtifactId::Listing],
            invariants: "registers disjoint over live ranges, addresses dense",
        },
        PassId::Encode => PassDescriptor {
            name: "encode",
            inputs: &[PassId::Allocate],
            outputs: &[ArtifactId::Words],
            invariants: "one 32-bit word per instruction",
        },
    }
}

// ── Dependency resolution ──────────────────────────────────────────────────

pub const ALL_PASSES: [PassId; 5] = [
    PassId::Build,
    PassId::Linearize,
    PassId::Optimize,
    PassId::Allocate,
    PassId::Encode,
];

/// The stage that produces `artifact`.
pub fn producer(artifact: ArtifactId) -> PassId {
    match artifact {
        ArtifactId::Graph => PassId::Build,
        ArtifactId::Linear => PassId::Linearize,
        ArtifactId::Optimized => PassId::Optimize,
        ArtifactId::Listing => PassId::Allocate,
        ArtifactId::Words => PassId::Encode,
    }
}

/// Compute the minimal ordered set of passes needed to produce `terminal`.
/// Returns passes in topological (execution) order.
pub fn required_passes(terminal: PassId) -> Vec<PassId> {
    required_passes_from(terminal, &[])
}

/// Like `required_passes`, but treating every artifact in `available` as
/// already produced: its producer and everything upstream of it is skipped.
pub fn required_passes_from(terminal: PassId, available: &[ArtifactId]) -> Vec<PassId> {
    let mut visited: HashSet<PassId> = available.iter().map(|&a| producer(a)).collect();
    let mut order = Vec::new();
    visit(terminal, &mut visited, &mut order);
    order
}

fn visit(id: PassId, visited: &mut HashSet<PassId>, order: &mut Vec<PassId>) {
    if !visited.insert(id) {
        return;
    }
    for &dep in descriptor(id).inputs {
        visit(dep, visited, order);
    }
    order.push(id);
}

// ── Tests ──────────────────────────────────────────────────────────────────
