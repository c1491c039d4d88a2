// End-to-end compilation of every built-in model through the library API.
//
// Each model goes graph → linear → optimized → listing → words, and the
// words are checked against the listing they came from.

use std::collections::HashMap;

use ncc::asm::Operand;
use ncc::encode;
use ncc::ir::ValueKind;
use ncc::models::Model;
use ncc::pass::PassId;
use ncc::pipeline::{compile_model, run_pipeline, CompilationState, CompileOptions};

fn compile(model: Model) -> CompilationState {
    compile_model(model, &CompileOptions::default())
        .unwrap_or_else(|e| panic!("{model} failed in {:?}: {}", e.failing_pass, e.diagnostic))
}

#[test]
fn every_model_compiles() {
    for model in Model::ALL {
        let state = compile(model);
        let listing = state.listing.as_ref().unwrap();
        let words = state.words.as_ref().unwrap();
        assert_eq!(words.len(), listing.insts.len(), "{model}");
        assert!(listing.memory.total() <= encode::MEMORY_SITES, "{model}");
    }
}

#[test]
fn words_disassemble_to_their_listing() {
    for model in Model::ALL {
        let state = compile(model);
        let listing = state.listing.as_ref().unwrap();
        for (word, inst) in state.words.as_ref().unwrap().iter().zip(&listing.insts) {
            let back = encode::disassemble(*word).unwrap();
            assert_eq!(&back, inst, "{model}: {word:08x}");
        }
    }
}

#[test]
fn resolved_operands_only() {
    for model in Model::ALL {
        let state = compile(model);
        for inst in &state.listing.as_ref().unwrap().insts {
            for op in std::iter::once(&inst.dest).chain(&inst.args) {
                assert!(
                    matches!(op, Operand::Reg(_) | Operand::Mem(_) | Operand::Int(_)),
                    "{model}: `{inst}`"
                );
            }
        }
    }
}

#[test]
fn linear_form_is_topologically_ordered() {
    for model in Model::ALL {
        let state = compile(model);
        let linear = state.linear.as_ref().unwrap();
        let mut defined: HashMap<&str, usize> = HashMap::new();
        for (i, inst) in linear.iter().enumerate() {
            for used in inst.temp_uses() {
                assert!(
                    defined.contains_key(used),
                    "{model}: `{inst}` reads {used} before it is defined"
                );
            }
            if let Some(dest) = inst.dest_name().filter(|_| inst.defines_temp()) {
                assert!(
                    defined.insert(dest, i).is_none(),
                    "{model}: {dest} is defined twice"
                );
            }
        }
    }
}

#[test]
fn each_declared_slot_is_written_back_once() {
    for model in Model::ALL {
        let state = compile(model);
        let graph = state.graph.as_ref().unwrap();
        let linear = state.linear.as_ref().unwrap();

        for (slot, value) in graph.final_bindings() {
            let name = graph.name(slot);
            let writes: Vec<usize> = linear
                .iter()
                .enumerate()
                .filter(|(_, inst)| inst.dest_name() == Some(name.as_str()))
                .map(|(i, _)| i)
                .collect();
            assert_eq!(writes.len(), 1, "{model}: {name} written at {writes:?}");

            let write_back = &linear[writes[0]];
            let expected_op = if name == "O_fire" { "fire" } else { "move" };
            assert_eq!(write_back.op, expected_op, "{model}: `{write_back}`");

            if graph.node(value).kind == ValueKind::Temporary {
                let source = graph.name(value);
                assert_eq!(write_back.args[0].as_name(), Some(source.as_str()), "{model}");
                let def = linear
                    .iter()
                    .position(|inst| inst.dest_name() == Some(source.as_str()))
                    .unwrap_or_else(|| panic!("{model}: {source} is never defined"));
                assert!(def < writes[0], "{model}: `{write_back}` precedes {source}");
            }
        }
    }
}

#[test]
fn every_fire_output_is_spiked_once() {
    for model in Model::ALL {
        let state = compile(model);
        let linear = state.linear.as_ref().unwrap();
        let fires = linear.iter().filter(|i| i.op == "fire").count();
        let expected = usize::from(model != Model::Spike);
        assert_eq!(fires, expected, "{model}");

        let optimized = state.optimized.as_ref().unwrap();
        assert_eq!(
            optimized.iter().filter(|i| i.op == "fire").count(),
            expected,
            "{model} lost or duplicated its spike"
        );
    }
}

#[test]
fn optimizer_shrinks_or_keeps_programs() {
    for model in [Model::Lif, Model::LifSnava, Model::Izhikevich, Model::HodgkinHuxley] {
        let state = compile(model);
        let stats = state.opt_stats.unwrap();
        assert!(stats.fused + stats.folded > 0, "{model}: {stats}");
    }
}

#[test]
fn fused_multiply_add_appears_in_lif() {
    let state = compile(Model::Lif);
    let ops: Vec<&str> = state
        .optimized
        .as_ref()
        .unwrap()
        .iter()
        .map(|i| i.op.as_str())
        .collect();
    assert!(ops.contains(&"muladd_f"), "{ops:?}");
}

#[test]
fn unoptimized_small_models_still_encode() {
    let options = CompileOptions {
        optimize: false,
        ..CompileOptions::default()
    };
    for model in [Model::Spike, Model::Poisson, Model::LifSnava, Model::If] {
        let state = compile_model(model, &options)
            .unwrap_or_else(|e| panic!("{model}: {}", e.diagnostic));
        let stats = state.opt_stats.unwrap();
        assert_eq!(stats.fused + stats.merged + stats.removed + stats.folded, 0, "{model}");
        assert!(state.words.is_some());
    }
}

#[test]
fn compilation_is_deterministic() {
    for model in Model::ALL {
        let a = compile(model);
        let b = compile(model);
        assert_eq!(a.words, b.words, "{model}");
        assert_eq!(a.provenance, b.provenance, "{model}");
    }
}

#[test]
fn asm_text_reencodes_identically() {
    for model in Model::ALL {
        let state = compile(model);
        let text = state.listing.as_ref().unwrap().to_string();
        let mut again = CompilationState::from_listing(model.name(), &text).unwrap();
        run_pipeline(&mut again, PassId::Encode, &CompileOptions::default(), |_| {}).unwrap();
        assert_eq!(again.words, state.words, "{model}");
        assert_eq!(again.listing, state.listing, "{model}");
    }
}
