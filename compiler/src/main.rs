use clap::{ArgGroup, Parser};
use std::io::Read;
use std::path::PathBuf;

use ncc::models::Model;
use ncc::pass::PassId;
use ncc::pipeline::{self, CompilationState, CompileOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum EmitStage {
    /// Symbolic instructions straight out of the linearizer
    Linear,
    /// Symbolic instructions after optimization and literal lowering
    Opt,
    /// Allocated listing: memory table plus resolved instructions
    Asm,
    /// One 8-digit hex word per line
    Hex,
    /// Memory table, words and provenance as JSON
    Json,
}

impl EmitStage {
    fn terminal(self) -> PassId {
        match self {
            EmitStage::Linear => PassId::Linearize,
            EmitStage::Opt => PassId::Optimize,
            EmitStage::Asm => PassId::Allocate,
            EmitStage::Hex | EmitStage::Json => PassId::Encode,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum InputForm {
    /// Symbolic `dest = op(args)` lines
    Linear,
    /// Allocated listing, with or without its memory table
    Listing,
}

#[derive(Parser, Debug)]
#[command(
    name = "ncc",
    version,
    about = "Neuron Compiler Collection — compiles neuron update programs to 32-bit accelerator machine code",
    group(ArgGroup::new("input").required(true).args(["source", "model"]))
)]
struct Cli {
    /// Input instruction file (`-` reads stdin)
    source: Option<PathBuf>,

    /// Compile a built-in model instead of a file
    #[arg(long, value_parser = parse_model)]
    model: Option<Model>,

    /// Form of the input file (detected from its first line when omitted)
    #[arg(long, value_enum)]
    from: Option<InputForm>,

    /// Output stage
    #[arg(long, value_enum, default_value_t = EmitStage::Hex)]
    emit: EmitStage,

    /// Skip optimization rounds (literal lowering still runs)
    #[arg(long)]
    no_opt: bool,

    /// Optimization rounds before and after literal lowering
    #[arg(long, default_value_t = 5)]
    opt_rounds: usize,

    /// Register file size
    #[arg(long, default_value_t = 32, value_parser = clap::value_parser!(u32).range(1..=32))]
    registers: u32,

    /// Output file path (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print compiler stages and timing
    #[arg(long)]
    verbose: bool,
}

fn parse_model(s: &str) -> Result<Model, String> {
    s.parse::<Model>().map_err(|d| d.to_string())
}

fn read_source(path: &PathBuf) -> std::io::Result<String> {
    if path.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        return Ok(text);
    }
    std::fs::read_to_string(path)
}

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .format_target(false)
        .init();

    log::info!("ncc: emit   = {:?}", cli.emit);

    let options = CompileOptions {
        registers: cli.registers,
        optimize: !cli.no_opt,
        opt_rounds: cli.opt_rounds,
    };

    // ── Load input ──
    let mut input: Option<(PathBuf, String)> = None;
    let mut state = match (&cli.model, &cli.source) {
        (Some(model), _) => {
            log::info!("ncc: model  = {model}");
            CompilationState::from_model(*model)
        }
        (None, Some(path)) => {
            log::info!("ncc: source = {}", path.display());
            let source = match read_source(path) {
                Ok(s) => s,
                Err(e) => {
                    eprintln!("ncc: error: {}: {}", path.display(), e);
                    std::process::exit(2);
                }
            };
            let form = cli.from.unwrap_or(if pipeline::looks_like_listing(&source) {
                InputForm::Listing
            } else {
                InputForm::Linear
            });
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "stdin".to_string());
            let loaded = match form {
                InputForm::Linear => CompilationState::from_linear(name, &source),
                InputForm::Listing => CompilationState::from_listing(name, &source),
            };
            input = Some((path.clone(), source));
            match loaded {
                Ok(state) => state,
                Err(diag) => {
                    report(&diag, input.as_ref());
                    std::process::exit(1);
                }
            }
        }
        (None, None) => {
            eprintln!("ncc: error: no input; pass a SOURCE file or --model");
            std::process::exit(2);
        }
    };

    // ── Compile ──
    if let Err(e) = pipeline::run_pipeline(&mut state, cli.emit.terminal(), &options, |_| {}) {
        log::info!("ncc: stopped in {:?}", e.failing_pass);
        report(&e.diagnostic, input.as_ref());
        std::process::exit(1);
    }

    // ── Emit ──
    let text = match render(&state, cli.emit) {
        Ok(text) => text,
        Err(msg) => {
            eprintln!("ncc: error: {msg}");
            std::process::exit(1);
        }
    };
    match &cli.output {
        Some(path) => {
            if let Err(e) = std::fs::write(path, text) {
                eprintln!("ncc: error: {}: {}", path.display(), e);
                std::process::exit(2);
            }
            log::info!("ncc: wrote {}", path.display());
        }
        None => print!("{text}"),
    }
}

fn report(diag: &ncc::diag::Diagnostic, input: Option<&(PathBuf, String)>) {
    match input.and_then(|(path, text)| Some((path, diag.line_in(text)?))) {
        Some((path, line)) => eprintln!("ncc: {}:{}: {}", path.display(), line, diag),
        None => eprintln!("ncc: {diag}"),
    }
}

fn render(state: &CompilationState, emit: EmitStage) -> Result<String, String> {
    let absent = || format!("nothing to emit for --emit {emit:?}").to_lowercase();
    match emit {
        EmitStage::Linear => state
            .linear
            .as_deref()
            .map(ncc::asm::format_insts)
            .ok_or_else(absent),
        EmitStage::Opt => state
            .optimized
            .as_deref()
            .map(ncc::asm::format_insts)
            .ok_or_else(absent),
        EmitStage::Asm => state
            .listing
            .as_ref()
            .map(|l| l.to_string())
            .ok_or_else(absent),
        EmitStage::Hex => state
            .words
            .as_deref()
            .map(ncc::encode::format_hex)
            .ok_or_else(absent),
        EmitStage::Json => {
            let artifact = state.artifact().map_err(|d| d.to_string())?;
            artifact.to_json().map_err(|e| e.to_string())
        }
    }
}
