//! Liveness and availability dataflow over an instruction stream.
//!
//! The stream is partitioned into basic blocks at bound labels and after
//! control transfers. Liveness runs backward to a fixed point so a value
//! live across a loop back edge is live at the loop header; availability
//! runs forward. The result carries per-instruction live sets, the
//! interference relation over virtual registers, and definition order,
//! which is everything the allocator needs.

use bumpalo::collections::Vec as BumpVec;
use bumpalo::Bump;
use hashbrown::{HashMap, HashSet};
use log::trace;

use crate::core::error::{AsmError, AsmResult};
use crate::x64::registers::RegKey;

/// Control-flow effect of one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKind {
    /// Falls through to the next instruction.
    Fall,
    /// Transfer to the instruction at `target`; conditional branches also
    /// fall through.
    Branch { target: usize, conditional: bool },
    /// Control leaves the function.
    Stop,
}

/// Register effects of one instruction, reduced to bank-qualified keys.
#[derive(Debug, Clone)]
pub struct InstEffects {
    pub uses: Vec<RegKey>,
    pub defs: Vec<RegKey>,
    pub flow: FlowKind,
}

/// Per-bank count of live registers, checked against the physical budget.
pub const BANK_BUDGET: [usize; 4] = [15, 8, 16, 8];

const BANK_NAMES: [&str; 4] = ["general-purpose", "mmx", "xmm/ymm", "mask"];

/// Analysis results consumed by the allocator and by tests.
#[derive(Debug)]
pub struct Analysis {
    /// Registers live immediately before each instruction.
    pub live_before: Vec<HashSet<RegKey>>,
    /// Registers live immediately after each instruction.
    pub live_after: Vec<HashSet<RegKey>>,
    /// Registers holding a still-valid value before each instruction.
    pub avail_before: Vec<HashSet<RegKey>>,
    /// Interference sets per virtual register.
    pub conflicts: HashMap<u32, HashSet<RegKey>>,
    /// Instruction index of each virtual register's first definition.
    pub first_def: HashMap<u32, usize>,
    /// Instruction index of each virtual register's last occurrence.
    pub last_use: HashMap<u32, usize>,
    /// Every instruction index where a virtual register occurs, in order.
    pub occurrences: HashMap<u32, Vec<usize>>,
    /// Allocation bank of each virtual register.
    pub bank_of: HashMap<u32, u8>,
}

#[derive(Debug, Clone, Copy)]
struct Block {
    start: usize,
    /// One past the last instruction.
    end: usize,
}

/// Split the stream into basic blocks. `extra_starts` are the positions of
/// bound labels (branch targets).
fn build_blocks<'a>(
    arena: &'a Bump,
    effects: &[InstEffects],
    extra_starts: &[usize],
) -> BumpVec<'a, Block> {
    let mut starts: BumpVec<bool> = BumpVec::from_iter_in(
        std::iter::repeat(false).take(effects.len() + 1),
        arena,
    );
    starts[0] = true;
    for &s in extra_starts {
        starts[s] = true;
    }
    for (i, eff) in effects.iter().enumerate() {
        match eff.flow {
            FlowKind::Fall => {}
            FlowKind::Branch { target, .. } => {
                starts[i + 1] = true;
                starts[target] = true;
            }
            FlowKind::Stop => starts[i + 1] = true,
        }
    }
    let mut blocks = BumpVec::new_in(arena);
    let mut current = 0;
    for i in 1..=effects.len() {
        if starts[i] {
            blocks.push(Block {
                start: current,
                end: i,
            });
            current = i;
        }
    }
    if current < effects.len() {
        blocks.push(Block {
            start: current,
            end: effects.len(),
        });
    }
    blocks
}

fn block_of(blocks: &[Block], inst: usize) -> usize {
    // blocks are sorted and contiguous
    blocks
        .iter()
        .position(|b| b.start <= inst && inst < b.end)
        .unwrap_or(blocks.len().saturating_sub(1))
}

fn successors(blocks: &[Block], effects: &[InstEffects], block: usize) -> Vec<usize> {
    let b = blocks[block];
    if b.end == b.start {
        return Vec::new();
    }
    let last = &effects[b.end - 1];
    let mut succs = Vec::new();
    match last.flow {
        FlowKind::Fall => {
            if block + 1 < blocks.len() {
                succs.push(block + 1);
            }
        }
        FlowKind::Branch {
            target,
            conditional,
        } => {
            succs.push(block_of(blocks, target));
            if conditional && block + 1 < blocks.len() {
                succs.push(block + 1);
            }
        }
        FlowKind::Stop => {}
    }
    succs
}

/// Reject programs no amount of spilling can help: a single instruction
/// touching more distinct registers of one bank than the bank holds.
pub fn check_instruction_pressure(effects: &[InstEffects]) -> AsmResult<()> {
    for (i, eff) in effects.iter().enumerate() {
        let mut touched: HashSet<RegKey> = HashSet::new();
        touched.extend(eff.uses.iter().copied());
        touched.extend(eff.defs.iter().copied());
        let mut counts = [0usize; 4];
        for key in &touched {
            // rsp is never allocatable and never counted
            if key.bank == 0 && key.code == 4 {
                continue;
            }
            counts[key.bank as usize] += 1;
        }
        for bank in 0..4 {
            if counts[bank] > BANK_BUDGET[bank] {
                return Err(AsmError::RegisterAllocation {
                    reason: format!(
                        "instruction {} touches {} {} registers, but only {} exist",
                        i, counts[bank], BANK_NAMES[bank], BANK_BUDGET[bank]
                    ),
                });
            }
        }
    }
    Ok(())
}

/// Run the dataflow passes and build the interference relation.
pub fn analyze(effects: &[InstEffects], label_positions: &[usize]) -> AsmResult<Analysis> {
    let arena = Bump::new();
    let blocks = build_blocks(&arena, effects, label_positions);
    let n_blocks = blocks.len();

    // backward liveness to a fixed point
    let mut live_in: Vec<HashSet<RegKey>> = vec![HashSet::new(); n_blocks];
    let mut live_out: Vec<HashSet<RegKey>> = vec![HashSet::new(); n_blocks];
    let mut changed = true;
    while changed {
        changed = false;
        for bi in (0..n_blocks).rev() {
            let mut out: HashSet<RegKey> = HashSet::new();
            for succ in successors(&blocks, effects, bi) {
                out.extend(live_in[succ].iter().copied());
            }
            let mut live = out.clone();
            for i in (blocks[bi].start..blocks[bi].end).rev() {
                for def in &effects[i].defs {
                    live.remove(def);
                }
                for use_ in &effects[i].uses {
                    live.insert(*use_);
                }
            }
            if live != live_in[bi] || out != live_out[bi] {
                changed = true;
                live_in[bi] = live;
                live_out[bi] = out;
            }
        }
    }

    // forward availability to a fixed point: a register is available at a
    // point if it was defined on every path reaching it
    let mut avail_in: Vec<HashSet<RegKey>> = vec![HashSet::new(); n_blocks];
    let mut avail_out: Vec<HashSet<RegKey>> = vec![HashSet::new(); n_blocks];
    let mut preds: Vec<Vec<usize>> = vec![Vec::new(); n_blocks];
    for bi in 0..n_blocks {
        for succ in successors(&blocks, effects, bi) {
            preds[succ].push(bi);
        }
    }
    let mut changed = true;
    let mut first_pass = vec![true; n_blocks];
    while changed {
        changed = false;
        for bi in 0..n_blocks {
            let mut inp: Option<HashSet<RegKey>> = None;
            for &p in &preds[bi] {
                inp = Some(match inp {
                    None => avail_out[p].clone(),
                    Some(acc) => acc.intersection(&avail_out[p]).copied().collect(),
                });
            }
            let inp = inp.unwrap_or_default();
            let mut avail = inp.clone();
            for eff in &effects[blocks[bi].start..blocks[bi].end] {
                for def in &eff.defs {
                    avail.insert(*def);
                }
            }
            if first_pass[bi] || inp != avail_in[bi] || avail != avail_out[bi] {
                changed |= first_pass[bi] || inp != avail_in[bi] || avail != avail_out[bi];
                first_pass[bi] = false;
                avail_in[bi] = inp;
                avail_out[bi] = avail;
            }
        }
    }

    // per-instruction sets
    let n = effects.len();
    let mut live_before = vec![HashSet::new(); n];
    let mut live_after = vec![HashSet::new(); n];
    let mut avail_before = vec![HashSet::new(); n];
    for (bi, b) in blocks.iter().enumerate() {
        let mut live = live_out[bi].clone();
        for i in (b.start..b.end).rev() {
            live_after[i] = live.clone();
            for def in &effects[i].defs {
                live.remove(def);
            }
            for use_ in &effects[i].uses {
                live.insert(*use_);
            }
            live_before[i] = live.clone();
        }
        let mut avail = avail_in[bi].clone();
        for i in b.start..b.end {
            avail_before[i] = avail.clone();
            for def in &effects[i].defs {
                avail.insert(*def);
            }
        }
    }

    // interference: every definition conflicts with everything live after
    // the defining instruction
    let mut conflicts: HashMap<u32, HashSet<RegKey>> = HashMap::new();
    let mut first_def: HashMap<u32, usize> = HashMap::new();
    let mut last_use: HashMap<u32, usize> = HashMap::new();
    let mut bank_of: HashMap<u32, u8> = HashMap::new();
    let mut occurrences: HashMap<u32, Vec<usize>> = HashMap::new();
    let mut note = |key: &RegKey, i: usize| {
        if let Some(v) = key.virt() {
            last_use.entry(v).and_modify(|u| *u = (*u).max(i)).or_insert(i);
            bank_of.entry(v).or_insert(key.bank);
            let occ = occurrences.entry(v).or_default();
            if occ.last() != Some(&i) {
                occ.push(i);
            }
        }
    };
    for (i, eff) in effects.iter().enumerate() {
        for use_ in &eff.uses {
            note(use_, i);
        }
        for def in &eff.defs {
            note(def, i);
            if let Some(v) = def.virt() {
                first_def.entry(v).or_insert(i);
            }
            for other in &live_after[i] {
                if other == def {
                    continue;
                }
                if other.bank != def.bank {
                    continue;
                }
                if let Some(v) = def.virt() {
                    conflicts.entry(v).or_default().insert(*other);
                }
                if let Some(v) = other.virt() {
                    conflicts.entry(v).or_default().insert(*def);
                }
            }
        }
    }

    trace!(
        "analyzed {} instructions in {} blocks, {} virtual registers",
        n,
        n_blocks,
        first_def.len()
    );

    Ok(Analysis {
        live_before,
        live_after,
        avail_before,
        conflicts,
        first_def,
        last_use,
        occurrences,
        bank_of,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn virt(v: u32) -> RegKey {
        RegKey {
            bank: 0,
            code: -(v as i64) - 1,
        }
    }

    fn phys(code: i64) -> RegKey {
        RegKey { bank: 0, code }
    }

    fn eff(uses: Vec<RegKey>, defs: Vec<RegKey>, flow: FlowKind) -> InstEffects {
        InstEffects { uses, defs, flow }
    }

    #[test]
    fn straight_line_liveness() {
        // v0 = ...; v1 = v0; use v1
        let effects = vec![
            eff(vec![], vec![virt(0)], FlowKind::Fall),
            eff(vec![virt(0)], vec![virt(1)], FlowKind::Fall),
            eff(vec![virt(1)], vec![], FlowKind::Stop),
        ];
        let a = analyze(&effects, &[]).unwrap();
        assert!(a.live_after[0].contains(&virt(0)));
        assert!(!a.live_after[1].contains(&virt(0)));
        assert!(a.live_after[1].contains(&virt(1)));
        assert!(a.live_after[2].is_empty());
        // in-regs always subset of live-before
        for (i, e) in effects.iter().enumerate() {
            for u in &e.uses {
                assert!(a.live_before[i].contains(u));
            }
        }
    }

    #[test]
    fn loop_reaches_fixed_point() {
        // 0: v0 = ...          (counter)
        // 1: label target: use v0, def v0
        // 2: cond branch to 1
        // 3: use v1 after loop, v1 defined at 0 too
        let effects = vec![
            eff(vec![], vec![virt(0), virt(1)], FlowKind::Fall),
            eff(vec![virt(0)], vec![virt(0)], FlowKind::Fall),
            eff(
                vec![],
                vec![],
                FlowKind::Branch {
                    target: 1,
                    conditional: true,
                },
            ),
            eff(vec![virt(1)], vec![], FlowKind::Stop),
        ];
        let a = analyze(&effects, &[1]).unwrap();
        // counter live around the back edge
        assert!(a.live_after[2].contains(&virt(0)));
        assert!(a.live_before[1].contains(&virt(0)));
        // v1 live across the whole loop
        assert!(a.live_before[1].contains(&virt(1)));
        assert!(a.live_after[2].contains(&virt(1)));
        // loop header live set equals back-edge predecessor live-out
        assert_eq!(a.live_before[1], a.live_after[2]);
        // simultaneously live values interfere
        assert!(a.conflicts[&0].contains(&virt(1)));
        assert!(a.conflicts[&1].contains(&virt(0)));
    }

    #[test]
    fn def_conflicts_with_live_physical() {
        // v0 = ...; rax = ...; use v0 and rax
        let effects = vec![
            eff(vec![], vec![virt(0)], FlowKind::Fall),
            eff(vec![], vec![phys(0)], FlowKind::Fall),
            eff(vec![virt(0), phys(0)], vec![], FlowKind::Stop),
        ];
        let a = analyze(&effects, &[]).unwrap();
        assert!(a.conflicts[&0].contains(&phys(0)));
    }

    #[test]
    fn dead_def_no_conflict() {
        let effects = vec![
            eff(vec![], vec![virt(0)], FlowKind::Fall),
            eff(vec![], vec![virt(1)], FlowKind::Fall),
            eff(vec![virt(1)], vec![], FlowKind::Stop),
        ];
        let a = analyze(&effects, &[]).unwrap();
        // v0 dead after its definition: conflicts with nothing
        assert!(a.conflicts.get(&0).map_or(true, |s| !s.contains(&virt(1))));
    }

    #[test]
    fn single_instruction_pressure_is_fatal() {
        // one instruction reading 16 distinct GP registers can never be
        // satisfied, spilling or not
        let mut effects: Vec<InstEffects> = (0..16)
            .map(|v| eff(vec![], vec![virt(v)], FlowKind::Fall))
            .collect();
        effects.push(eff((0..16).map(virt).collect(), vec![], FlowKind::Stop));
        assert!(matches!(
            check_instruction_pressure(&effects),
            Err(AsmError::RegisterAllocation { .. })
        ));
        // dataflow itself still succeeds
        assert!(analyze(&effects, &[]).is_ok());
    }

    #[test]
    fn availability_forward() {
        let effects = vec![
            eff(vec![], vec![virt(0)], FlowKind::Fall),
            eff(vec![virt(0)], vec![virt(1)], FlowKind::Fall),
            eff(vec![virt(1)], vec![], FlowKind::Stop),
        ];
        let a = analyze(&effects, &[]).unwrap();
        assert!(a.avail_before[0].is_empty());
        assert!(a.avail_before[1].contains(&virt(0)));
        assert!(a.avail_before[2].contains(&virt(0)));
        assert!(a.avail_before[2].contains(&virt(1)));
    }
}
