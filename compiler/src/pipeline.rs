// pipeline.rs — Compilation state and stage orchestration
//
// Holds every stage artifact in one state struct and runs the minimal set of
// stages for a given terminal PassId. A compilation starts from a built-in
// model, from linear instruction text, or from an allocated listing; stages
// upstream of the supplied artifact are skipped.
//
// Preconditions: the state was created by one of the `CompilationState`
//                constructors; options pass `CompileOptions::validate`.
// Postconditions: every artifact of `required_passes(terminal)` is populated,
//                 or the first failing stage's diagnostic is returned.
// Failure modes: any stage diagnostic; asking for an artifact upstream of
//                the supplied input.
// Side effects: logs stage completion and timing at info level; calls
//               `on_pass_complete` after each stage.

use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::asm::Inst;
use crate::diag::{DiagLevel, Diagnostic};
use crate::encode::{self, REGISTERS};
use crate::ir::Graph;
use crate::linearize::linearize;
use crate::listing::{self, Listing};
use crate::models::Model;
use crate::opt::{self, OptStats};
use crate::parser::parse_insts;
use crate::pass::{descriptor, required_passes_from, ArtifactId, PassId};

// ── Options ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileOptions {
    /// Size of the register file handed to the allocator.
    pub registers: u32,
    /// Run the optimizer rounds. Literal lowering runs regardless.
    pub optimize: bool,
    pub opt_rounds: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            registers: REGISTERS,
            optimize: true,
            opt_rounds: 5,
        }
    }
}

impl CompileOptions {
    pub fn validate(&self) -> Result<(), Diagnostic> {
        if self.registers == 0 || self.registers > REGISTERS {
            return Err(Diagnostic::new(
                DiagLevel::Error,
                format!("register file size {} is out of range", self.registers),
            )
            .with_hint(format!("the encoding addresses 1 to {REGISTERS} registers")));
        }
        Ok(())
    }

    fn rounds(&self) -> usize {
        if self.optimize {
            self.opt_rounds
        } else {
            0
        }
    }
}

// ── Provenance ─────────────────────────────────────────────────────────────

/// Provenance metadata embedded in the JSON artifact.
///
/// `source_hash`: SHA-256 of the text the compilation started from (the
/// linear form, for built-in models).
/// `compiler_version`: crate version from `Cargo.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Provenance {
    #[serde(serialize_with = "serialize_hash")]
    pub source_hash: [u8; 32],
    pub compiler_version: &'static str,
}

impl Provenance {
    /// Hex string of the source hash (64 characters).
    pub fn source_hash_hex(&self) -> String {
        bytes_to_hex(&self.source_hash)
    }
}

fn serialize_hash<S: serde::Serializer>(hash: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&bytes_to_hex(hash))
}

fn bytes_to_hex(bytes: &[u8; 32]) -> String {
    let mut s = String::with_capacity(64);
    for b in bytes {
        use std::fmt::Write;
        let _ = write!(s, "{:02x}", b);
    }
    s
}

pub fn compute_provenance(source: &str) -> Provenance {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    let result = hasher.finalize();
    let mut source_hash = [0u8; 32];
    source_hash.copy_from_slice(&result);

    Provenance {
        source_hash,
        compiler_version: env!("CARGO_PKG_VERSION"),
    }
}

// ── Compilation state ──────────────────────────────────────────────────────

/// All artifacts of one compilation. Each `Option` is filled by the stage
/// that produces it, or by the constructor when supplied as input.
#[derive(Debug)]
pub struct CompilationState {
    /// Program name carried into the JSON artifact.
    pub name: String,
    pub model: Option<Model>,
    pub graph: Option<Graph>,
    pub linear: Option<Vec<Inst>>,
    pub optimized: Option<Vec<Inst>>,
    pub opt_stats: Option<OptStats>,
    pub listing: Option<Listing>,
    pub words: Option<Vec<u32>>,
    pub provenance: Option<Provenance>,
}

impl CompilationState {
    fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: None,
            graph: None,
            linear: None,
            optimized: None,
            opt_stats: None,
            listing: None,
            words: None,
            provenance: None,
        }
    }

    pub fn from_model(model: Model) -> Self {
        let mut state = Self::empty(model.name());
        state.model = Some(model);
        state
    }

    /// Start from symbolic instruction text.
    pub fn from_linear(name: impl Into<String>, source: &str) -> Result<Self, Diagnostic> {
        let mut state = Self::empty(name);
        state.linear = Some(parse_insts(source)?);
        state.provenance = Some(compute_provenance(source));
        Ok(state)
    }

    /// Start from an allocated listing (with or without its memory table).
    pub fn from_listing(name: impl Into<String>, source: &str) -> Result<Self, Diagnostic> {
        let mut state = Self::empty(name);
        state.listing = Some(Listing::parse(source)?);
        state.provenance = Some(compute_provenance(source));
        Ok(state)
    }

    /// Artifacts supplied as input rather than produced by a stage.
    fn supplied(&self) -> Vec<ArtifactId> {
        let mut supplied = Vec::new();
        if self.model.is_none() {
            if self.linear.is_some() {
                supplied.push(ArtifactId::Linear);
            }
            if self.listing.is_some() {
                supplied.push(ArtifactId::Listing);
            }
        }
        supplied
    }

    /// The artifact as the external header generator reads it.
    pub fn artifact(&self) -> Result<Artifact, Diagnostic> {
        let (Some(listing), Some(words), Some(provenance)) =
            (&self.listing, &self.words, &self.provenance)
        else {
            return Err(Diagnostic::new(
                DiagLevel::Error,
                "the artifact needs an encoded program",
            ));
        };
        Ok(Artifact {
            name: self.name.clone(),
            memory: listing
                .memory
                .entries()
                .map(|(address, name)| MemoryEntry {
                    address,
                    name: name.to_string(),
                })
                .collect(),
            total_memories: listing.memory.total(),
            words: words.iter().map(|w| format!("{w:08x}")).collect(),
            provenance: provenance.clone(),
        })
    }
}

// ── JSON artifact ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemoryEntry {
    pub address: u32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub name: String,
    pub memory: Vec<MemoryEntry>,
    pub total_memories: u32,
    /// Eight lowercase hex digits per word.
    pub words: Vec<String>,
    pub provenance: Provenance,
}

impl Artifact {
    pub fn to_json(&self) -> serde_json::Result<String> {
        let mut text = serde_json::to_string_pretty(self)?;
        text.push('\n');
        Ok(text)
    }
}

// ── Error type ─────────────────────────────────────────────────────────────

/// Pipeline execution stopped at `failing_pass`.
#[derive(Debug)]
pub struct PipelineError {
    pub failing_pass: PassId,
    pub diagnostic: Diagnostic,
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.diagnostic)
    }
}

impl std::error::Error for PipelineError {}

fn fail(pass: PassId) -> impl Fn(Diagnostic) -> PipelineError {
    move |diagnostic| PipelineError {
        failing_pass: pass,
        diagnostic,
    }
}

/// A stage ran without the artifact it consumes.
fn missing(pass: PassId, artifact: &str) -> PipelineError {
    PipelineError {
        failing_pass: pass,
        diagnostic: Diagnostic::new(
            DiagLevel::Error,
            format!("{} needs {artifact}, which this input does not provide", descriptor(pass).name),
        ),
    }
}

fn finish_pass(pass: PassId, elapsed: Duration, on_pass_complete: &mut impl FnMut(PassId)) {
    on_pass_complete(pass);
    log::info!(
        "ncc: {} complete, {:.1}ms",
        descriptor(pass).name,
        elapsed.as_secs_f64() * 1000.0
    );
}

// ── Pipeline runner ────────────────────────────────────────────────────────

/// Run the minimal set of stages to produce `terminal`.
pub fn run_pipeline(
    state: &mut CompilationState,
    terminal: PassId,
    options: &CompileOptions,
    mut on_pass_complete: impl FnMut(PassId),
) -> Result<(), PipelineError> {
    options.validate().map_err(fail(terminal))?;
    let passes = required_passes_from(terminal, &state.supplied());

    for pass in passes {
        let t = Instant::now();
        match pass {
            PassId::Build => {
                let model = state.model.ok_or_else(|| missing(pass, "a model"))?;
                state.graph = Some(model.build().map_err(fail(pass))?);
            }
            PassId::Linearize => {
                let graph = state.graph.as_ref().ok_or_else(|| missing(pass, "a graph"))?;
                let linear = linearize(graph);
                if state.provenance.is_none() {
                    state.provenance = Some(compute_provenance(&crate::asm::format_insts(&linear)));
                }
                state.linear = Some(linear);
            }
            PassId::Optimize => {
                let mut insts = state
                    .linear
                    .clone()
                    .ok_or_else(|| missing(pass, "linear instructions"))?;
                for inst in &insts {
                    encode::check_operation(inst).map_err(fail(pass))?;
                }
                let stats = opt::optimize(&mut insts, options.rounds());
                log::info!("ncc: optimize: {stats}");
                state.optimized = Some(insts);
                state.opt_stats = Some(stats);
            }
            PassId::Allocate => {
                let insts = state
                    .optimized
                    .as_ref()
                    .ok_or_else(|| missing(pass, "optimized instructions"))?;
                state.listing = Some(listing::allocate(insts, options.registers).map_err(fail(pass))?);
            }
            PassId::Encode => {
                let listing = state.listing.as_ref().ok_or_else(|| missing(pass, "a listing"))?;
                state.words = Some(encode::encode_all(&listing.insts).map_err(fail(pass))?);
            }
        }
        finish_pass(pass, t.elapsed(), &mut on_pass_complete);
    }
    Ok(())
}

/// Compile a built-in model all the way to machine words.
pub fn compile_model(model: Model, options: &CompileOptions) -> Result<CompilationState, PipelineError> {
    let mut state = CompilationState::from_model(model);
    run_pipeline(&mut state, PassId::Encode, options, |_| {})?;
    Ok(state)
}

/// Convenience check used by callers that accept either text form.
pub fn looks_like_listing(source: &str) -> bool {
    source
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .is_some_and(|l| l == "Memories:")
}
