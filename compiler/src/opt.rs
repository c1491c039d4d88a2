// opt.rs — Peephole optimizer and literal lowering over symbolic instructions
//
// Runs between the linearizer and the register allocator. One round is
// fma → math → dce → peephole → cse → literal_to_mem; `optimize` runs the
// configured number of rounds, lowers the remaining literals into encodable
// immediate forms, then runs the same number of rounds again.
//
// Preconditions: temporaries are single-assignment and defined before use.
// Postconditions: program order of side effects (`fire`, named-slot writes)
//                 is preserved; after `lower`, every literal sits in an
//                 immediate position of its opcode (or does not fit one and
//                 is left for the encoder to reject).
// Failure modes: none; rewrites that cannot be proven safe are skipped.
// Side effects: logs each rewrite at debug level.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::asm::{is_temp_name, Inst, Operand};
use crate::encode::{self, IMM13_MAX, IMM13_MIN, MEMORY_SITES};

/// Operations whose result must never be discarded or merged.
const SIDE_EFFECTS: &[&str] = &["fire"];

/// Operations never merged by CSE (each one draws a fresh sample or spikes).
const NO_CSE: &[&str] = &["fire", "pois_imm"];

/// Integer ops with a 13-bit immediate twin (`<op>_imm`).
const IMM_TWINS: &[&str] = &["gt_i", "sub_i", "or_i"];

/// Rewrite counters, accumulated over all rounds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptStats {
    pub fused: usize,
    pub simplified: usize,
    pub removed: usize,
    pub folded: usize,
    pub merged: usize,
    pub lifted: usize,
    pub materialized: usize,
}

impl fmt::Display for OptStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} fused, {} simplified, {} removed, {} folded, {} merged, {} lifted, {} materialized",
            self.fused,
            self.simplified,
            self.removed,
            self.folded,
            self.merged,
            self.lifted,
            self.materialized
        )
    }
}

// ── Driver ────────────────────────────────────────────────────────────────

/// Full optimization: `rounds` rounds, lowering, `rounds` more rounds.
pub fn optimize(insts: &mut Vec<Inst>, rounds: usize) -> OptStats {
    let mut stats = OptStats::default();
    run_rounds(insts, rounds, &mut stats);
    stats.materialized += lower(insts);
    run_rounds(insts, rounds, &mut stats);
    stats
}

fn run_rounds(insts: &mut Vec<Inst>, rounds: usize, stats: &mut OptStats) {
    for _ in 0..rounds {
        stats.fused += fuse_multiply_add(insts);
        stats.simplified += simplify(insts);
        stats.removed += eliminate_dead_code(insts);
        stats.folded += fold_moves(insts);
        stats.merged += eliminate_common_subexpressions(insts);
        stats.lifted += literal_to_mem(insts);
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────

/// Instruction indices reading each temporary, one entry per occurrence.
fn use_sites(insts: &[Inst]) -> HashMap<String, Vec<usize>> {
    let mut uses: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, inst) in insts.iter().enumerate() {
        for name in inst.temp_uses() {
            uses.entry(name.to_string()).or_default().push(i);
        }
    }
    uses
}

fn is_named(op: &Operand) -> bool {
    op.as_name().is_some_and(|n| !is_temp_name(n))
}

/// Whether any instruction strictly between `from` and `to` writes `name`.
fn written_between(insts: &[Inst], name: &str, from: usize, to: usize) -> bool {
    insts[from + 1..to]
        .iter()
        .any(|i| i.dest_name() == Some(name))
}

/// Whether any instruction strictly between `from` and `to` reads or writes `name`.
fn touched_between(insts: &[Inst], name: &str, from: usize, to: usize) -> bool {
    insts[from + 1..to].iter().any(|i| {
        i.dest_name() == Some(name) || i.args.iter().any(|a| a.as_name() == Some(name))
    })
}

fn remove_marked(insts: &mut Vec<Inst>, dead: &[bool]) {
    let mut idx = 0;
    insts.retain(|_| {
        let keep = !dead[idx];
        idx += 1;
        keep
    });
}

fn rename_uses(inst: &mut Inst, from: &str, to: &Operand) {
    for arg in &mut inst.args {
        if arg.as_name() == Some(from) {
            *arg = to.clone();
        }
    }
}

/// Literal text as it appears inside generated names: `.` → `_`, `-` → `m`.
fn mangle(lit: &Operand) -> String {
    lit.to_string().replace('.', "_").replace('-', "m")
}

// ── fma ───────────────────────────────────────────────────────────────────

/// `T = mul_f(a, b)` used once by `add_f`/`sub_f` → fused multiply-add.
fn fuse_multiply_add(insts: &mut Vec<Inst>) -> usize {
    let uses = use_sites(insts);
    let mut dead = vec![false; insts.len()];
    let mut fused = 0;

    for i in 0..insts.len() {
        if insts[i].op != "mul_f" || !insts[i].defines_temp() {
            continue;
        }
        let name = insts[i].dest.to_string();
        let user = match uses.get(&name).map(Vec::as_slice) {
            Some(&[user]) if !dead[user] => user,
            _ => continue,
        };
        let u = &insts[user];
        let (op, other) = match (u.op.as_str(), u.args.as_slice()) {
            ("add_f", [a, b]) if a.as_name() == Some(name.as_str()) => ("muladd_f", b.clone()),
            ("sub_f", [a, b]) if a.as_name() == Some(name.as_str()) => ("mulsub_f", b.clone()),
            ("add_f", [a, b]) if b.as_name() == Some(name.as_str()) => ("muladd_f", a.clone()),
            _ => continue,
        };
        let [f0, f1] = insts[i].args.as_slice() else {
            continue;
        };
        let factors = [f0.clone(), f1.clone()];
        if factors
            .iter()
            .filter_map(|f| f.as_name().filter(|_| is_named(f)))
            .any(|n| written_between(&insts[..], n, i, user))
        {
            continue;
        }

        let u = &mut insts[user];
        u.op = op.to_string();
        let [a, b] = factors;
        u.args = vec![a, b, other];
        log::debug!("fma: folded {name} into `{u}`");
        dead[i] = true;
        fused += 1;
    }

    remove_marked(insts, &dead);
    fused
}

// ── math ──────────────────────────────────────────────────────────────────

/// Algebraic simplifications that need no use information.
fn simplify(insts: &mut [Inst]) -> usize {
    let one = Operand::Float(1.0);
    let mut count = 0;
    for inst in insts.iter_mut() {
        let rewritten = match (inst.op.as_str(), inst.args.as_slice()) {
            ("mul_f", [a, b]) if *a == one => Some(("move", vec![b.clone()])),
            ("muladd_f", [a, b, c]) if *b == one => Some(("add_f", vec![a.clone(), c.clone()])),
            ("div_f", [x, Operand::Float(k)]) if (1.0 / k).is_finite() => {
                Some(("mul_f", vec![x.clone(), Operand::Float(1.0 / k)]))
            }
            _ => None,
        };
        if let Some((op, args)) = rewritten {
            inst.op = op.to_string();
            inst.args = args;
            log::debug!("math: `{inst}`");
            count += 1;
        }
    }
    count
}

// ── dce ───────────────────────────────────────────────────────────────────

/// Remove temporaries nobody reads. One backward sweep catches whole dead
/// chains.
fn eliminate_dead_code(insts: &mut Vec<Inst>) -> usize {
    let mut counts: HashMap<String, usize> = use_sites(insts)
        .into_iter()
        .map(|(k, v)| (k, v.len()))
        .collect();
    let mut dead = vec![false; insts.len()];
    let mut removed = 0;

    for i in (0..insts.len()).rev() {
        let inst = &insts[i];
        if !inst.defines_temp() || SIDE_EFFECTS.contains(&inst.op.as_str()) {
            continue;
        }
        if counts.get(&inst.dest.to_string()).copied().unwrap_or(0) > 0 {
            continue;
        }
        for name in inst.temp_uses() {
            if let Some(c) = counts.get_mut(name) {
                *c = c.saturating_sub(1);
            }
        }
        log::debug!("dce: removed `{inst}`");
        dead[i] = true;
        removed += 1;
    }

    remove_marked(insts, &dead);
    removed
}

// ── peephole ──────────────────────────────────────────────────────────────

/// Move folding: a definition whose only use is a `move` takes over the
/// move's destination, and temporary-to-temporary copies are propagated.
fn fold_moves(insts: &mut Vec<Inst>) -> usize {
    let mut folded = 0;

    let uses = use_sites(insts);
    let mut dead = vec![false; insts.len()];
    for i in 0..insts.len() {
        if dead[i] || !insts[i].defines_temp() {
            continue;
        }
        let name = insts[i].dest.to_string();
        let j = match uses.get(&name).map(Vec::as_slice) {
            Some(&[j]) if !dead[j] && insts[j].op == "move" => j,
            _ => continue,
        };
        let target = insts[j].dest.clone();
        if let Some(n) = target.as_name() {
            if touched_between(insts, n, i, j) {
                continue;
            }
        }
        log::debug!("peephole: `{}` writes {target} directly", insts[i]);
        insts[i].dest = target;
        dead[j] = true;
        folded += 1;
    }
    remove_marked(insts, &dead);

    let uses = use_sites(insts);
    let mut dead = vec![false; insts.len()];
    for i in 0..insts.len() {
        let inst = &insts[i];
        if inst.op != "move" || !inst.defines_temp() || inst.args.len() != 1 {
            continue;
        }
        let name = inst.dest.to_string();
        let source = inst.args[0].clone();
        let sites = uses.get(&name).cloned().unwrap_or_default();
        if let (Some(n), Some(&last)) = (source.as_name().filter(|_| is_named(&source)), sites.last()) {
            if written_between(insts, n, i, last) {
                continue;
            }
        }
        for &s in &sites {
            rename_uses(&mut insts[s], &name, &source);
        }
        log::debug!("peephole: propagated {source} into {} use(s) of {name}", sites.len());
        dead[i] = true;
        folded += 1;
    }
    remove_marked(insts, &dead);

    folded
}

// ── cse ───────────────────────────────────────────────────────────────────

fn rhs_key(inst: &Inst) -> String {
    let args: Vec<String> = inst.args.iter().map(Operand::to_string).collect();
    format!("{}({})", inst.op, args.join(", "))
}

/// Merge repeated computations into their first temporary. A remembered
/// result is forgotten as soon as a named slot it reads is written.
fn eliminate_common_subexpressions(insts: &mut Vec<Inst>) -> usize {
    let mut seen: HashMap<String, String> = HashMap::new();
    let mut readers: HashMap<String, Vec<String>> = HashMap::new();
    let mut renames: HashMap<String, Operand> = HashMap::new();
    let mut dead = vec![false; insts.len()];
    let mut merged = 0;

    for (i, inst) in insts.iter_mut().enumerate() {
        for arg in &mut inst.args {
            if let Some(to) = arg.as_name().and_then(|n| renames.get(n)) {
                *arg = to.clone();
            }
        }

        if let Some(dest) = inst.dest_name().filter(|n| !is_temp_name(n)) {
            for key in readers.remove(dest).unwrap_or_default() {
                seen.remove(&key);
            }
        }
        if !inst.defines_temp() || NO_CSE.contains(&inst.op.as_str()) {
            continue;
        }

        let key = rhs_key(inst);
        let dest = inst.dest.to_string();
        match seen.get(&key) {
            Some(first) => {
                log::debug!("cse: {dest} reuses {first} for {key}");
                renames.insert(dest, Operand::Name(first.clone()));
                dead[i] = true;
                merged += 1;
            }
            None => {
                for arg in inst.args.iter().filter(|a| is_named(a)) {
                    if let Some(n) = arg.as_name() {
                        readers.entry(n.to_string()).or_default().push(key.clone());
                    }
                }
                seen.insert(key, dest);
            }
        }
    }

    remove_marked(insts, &dead);
    merged
}

// ── literal_to_mem ────────────────────────────────────────────────────────

/// Registers-worth of words needed to materialize a literal, or `None` when
/// it fits an immediate as-is.
fn materialize_cost(lit: &Operand) -> Option<usize> {
    match *lit {
        Operand::Float(f) if f.to_bits() & 0x1FFF == 0 => Some(1),
        Operand::Float(_) => Some(2),
        Operand::Int(n) if n & !0x1FFF != 0 => Some(2),
        _ => None,
    }
}

fn takes_immediates(op: &str) -> bool {
    op.ends_with("_imm")
}

/// Lift the costliest literals into constant memory slots while free memory
/// sites remain.
fn literal_to_mem(insts: &mut [Inst]) -> usize {
    let mut named: HashSet<&str> = HashSet::new();
    for inst in insts.iter() {
        named.extend(
            inst.args
                .iter()
                .chain(std::iter::once(&inst.dest))
                .filter(|o| is_named(o))
                .filter_map(Operand::as_name),
        );
    }
    let avail = (MEMORY_SITES as usize).saturating_sub(named.len());
    if avail == 0 {
        return 0;
    }

    let mut candidates: Vec<(Operand, usize)> = Vec::new();
    for inst in insts.iter().filter(|i| !takes_immediates(&i.op)) {
        for arg in &inst.args {
            if let Some(cost) = materialize_cost(arg) {
                if !candidates.iter().any(|(c, _)| c == arg) {
                    candidates.push((arg.clone(), cost));
                }
            }
        }
    }
    // Stable: equal costs keep first-appearance order.
    candidates.sort_by(|a, b| b.1.cmp(&a.1));
    candidates.truncate(avail);

    let lifted: Vec<(Operand, Operand)> = candidates
        .into_iter()
        .map(|(lit, _)| {
            let kind = if matches!(lit, Operand::Float(_)) { "f" } else { "i" };
            let slot = Operand::Name(format!("C_{kind}_{}", mangle(&lit)));
            log::debug!("literal_to_mem: {lit} → {slot}");
            (lit, slot)
        })
        .collect();
    if lifted.is_empty() {
        return 0;
    }

    for inst in insts.iter_mut().filter(|i| !takes_immediates(&i.op)) {
        for arg in &mut inst.args {
            if let Some((_, slot)) = lifted.iter().find(|(lit, _)| lit == arg) {
                *arg = slot.clone();
            }
        }
    }
    lifted.len()
}

// ── lower ─────────────────────────────────────────────────────────────────

/// A 32-bit pattern as `lu_imm` upper part and signed 13-bit low part.
fn split_word(bits: u32) -> (i64, i64) {
    let hi = i64::from((bits as i32) >> 13);
    let lo = i64::from(bits & 0x1FFF);
    let lo = if lo > IMM13_MAX { lo - 0x2000 } else { lo };
    (hi, lo)
}

/// The 32-bit pattern of a literal, if it has one.
fn word_of(lit: &Operand) -> Option<u32> {
    match *lit {
        Operand::Float(f) => Some(f.to_bits()),
        Operand::Int(n) => i32::try_from(n)
            .map(|v| v as u32)
            .or_else(|_| u32::try_from(n))
            .ok(),
        _ => None,
    }
}

/// Rewrite every literal outside an immediate position into something the
/// encoder accepts. Float and large integer constants are materialized once
/// each at the head of the program. Returns the number of rewritten operands.
pub fn lower(insts: &mut Vec<Inst>) -> usize {
    let mut prelude: Vec<Inst> = Vec::new();
    let mut temps: HashMap<String, Operand> = HashMap::new();
    let mut count = 0;

    for inst in insts.iter_mut() {
        let literal_slot = encode::lookup(&inst.op).and_then(|o| o.form.literal_position());
        for pos in 0..inst.args.len() {
            let arg = &inst.args[pos];
            if !arg.is_literal() || literal_slot == Some(pos) {
                continue;
            }
            let Some(bits) = word_of(arg) else {
                continue;
            };

            if let Operand::Int(n) = *arg {
                if pos == 1
                    && IMM_TWINS.contains(&inst.op.as_str())
                    && (IMM13_MIN..=IMM13_MAX).contains(&n)
                {
                    inst.op = format!("{}_imm", inst.op);
                    log::debug!("lower: `{inst}`");
                    count += 1;
                    continue;
                }
                if inst.op == "move" && bits & 0x1FFF == 0 {
                    let (hi, _) = split_word(bits);
                    inst.op = "lu_imm".into();
                    inst.args = vec![Operand::Int(hi)];
                    log::debug!("lower: `{inst}`");
                    count += 1;
                    break;
                }
            }

            let key = arg.to_string();
            let temp = match temps.get(&key) {
                Some(t) => t.clone(),
                None => {
                    let t = materialize(arg, bits, &mut prelude);
                    temps.insert(key, t.clone());
                    t
                }
            };
            inst.args[pos] = temp;
            count += 1;
        }
    }

    if !prelude.is_empty() {
        prelude.append(insts);
        *insts = prelude;
    }
    count
}

fn materialize(lit: &Operand, bits: u32, prelude: &mut Vec<Inst>) -> Operand {
    let kind = if matches!(lit, Operand::Float(_)) { "f" } else { "i" };
    let name = format!("T_{kind}_{}", mangle(lit));
    let (hi, lo) = split_word(bits);
    if lo == 0 {
        prelude.push(Inst::new(Operand::name(&name), "lu_imm", vec![Operand::Int(hi)]));
    } else {
        let upper = format!("T_{kind}_hi_{}", mangle(lit));
        prelude.push(Inst::new(Operand::name(&upper), "lu_imm", vec![Operand::Int(hi)]));
        prelude.push(Inst::new(
            Operand::name(&name),
            "or_i_imm",
            vec![Operand::Name(upper), Operand::Int(lo)],
        ));
    }
    log::debug!("lower: materialized {lit} as {name}");
    Operand::Name(name)
}
