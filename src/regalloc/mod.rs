//! Register liveness and the analyses built on it.
//!
//! The register allocator itself lives elsewhere. This module gives it what
//! it needs and finishes the job once it has decided:
//!
//! 1. [`liveness`]: per-instruction births and deaths, and per-block live-in
//!    sets, computed one SCC of the control flow graph at a time.
//! 2. [`conflicts`]: cliques of simultaneously live registers, and the moves
//!    the allocator may try to coalesce.
//! 3. [`spill_coalesce`]: extra move candidates between a spilled register
//!    and the register later reloaded from the same slot.
//! 4. [`patch`]: apply the allocator's register substitution and drop the
//!    moves it made redundant.
//! 5. [`strip`]: materialise spill pseudo-ops and discard liveness.
//!
//! All passes are generic over the [`Instruction`] trait. ZKIR machine
//! instructions implement it in `crate::mir`.

pub mod cfg;
pub mod conflicts;
pub mod error;
pub mod instr;
pub mod liveness;
pub mod patch;
pub mod spill_coalesce;
pub mod strip;

pub use conflicts::{slurp_conflicts, Conflicts};
pub use error::{LivenessError, LivenessResult};
pub use instr::{BlockId, Instruction, LiveBlock, LiveInstr, Liveness, RegSet, RegUsage, Scc, Slot};
pub use liveness::{reg_liveness, LiveFunction, LiveInfo};
pub use patch::{patch_erase_live, patch_live_instr};
pub use spill_coalesce::slurp_reload_coalesce;
pub use strip::{erase_deltas_live, strip_live, StrippedBlock, StrippedFunction};

use crate::mir::{MachineFunction, MachineInst, Reg};
use crate::stats::{RegallocStats, Timer};
use crate::target::TargetConfig;
use anyhow::{Context, Result};
use std::collections::HashMap;

/// Analysis switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// Check that SCCs come in reverse dependent order before the fixpoint.
    pub verify_order: bool,
    /// Look for spill/reload move candidates.
    pub coalesce_spills: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self { verify_order: true, coalesce_spills: true }
    }
}

/// Everything the allocator gets back from [`analyze`].
#[derive(Debug)]
pub struct Analysis<I: Instruction> {
    pub function: LiveFunction<I>,
    /// Conflict cliques and moves. `None` when the code already holds spill
    /// pseudo-ops, since conflicts are only extracted before spilling.
    pub conflicts: Option<Conflicts<I::Reg>>,
    /// (reloaded, spilled) move candidates.
    pub spill_moves: Vec<(I::Reg, I::Reg)>,
    pub stats: RegallocStats,
}

impl<I: Instruction> Analysis<I> {
    /// Register moves and spill/reload pairs together, as one coalescing pool.
    pub fn all_moves(&self) -> Vec<(I::Reg, I::Reg)> {
        let mut moves = self.conflicts.as_ref().map(|c| c.moves.clone()).unwrap_or_default();
        moves.extend(self.spill_moves.iter().copied());
        moves
    }
}

/// Run liveness, then conflict extraction and spill-reload coalescing.
///
/// `blocks` are in source order; `entry` defaults to the first block.
pub fn analyze<I: Instruction>(
    name: &str,
    statics: Vec<String>,
    entry: Option<BlockId>,
    blocks: Vec<LiveBlock<I>>,
    options: Options,
) -> Result<Analysis<I>> {
    let mut stats = RegallocStats::new();
    stats.num_blocks = blocks.len();
    stats.num_insts = blocks.iter().map(|b| b.instrs.len()).sum();
    let spilled = blocks.iter().flat_map(|b| &b.instrs).any(LiveInstr::is_pseudo);

    let timer = Timer::start();
    let (function, rounds) = reg_liveness(name, statics, entry, blocks, options.verify_order)
        .with_context(|| format!("liveness analysis failed for '{}'", name))?;
    stats.liveness_time = timer.stop();
    stats.num_sccs = function.sccs.len();
    stats.record_rounds(&rounds);

    let conflicts = if spilled {
        log::debug!("'{}' already holds spill code, not extracting conflicts", name);
        None
    } else {
        let timer = Timer::start();
        let conflicts = slurp_conflicts(&function)
            .with_context(|| format!("conflict extraction failed for '{}'", name))?;
        stats.conflicts_time = timer.stop();
        stats.num_conflict_sets = conflicts.cliques.len();
        stats.num_moves = conflicts.moves.len();
        Some(conflicts)
    };

    let spill_moves = if options.coalesce_spills {
        let timer = Timer::start();
        let moves = slurp_reload_coalesce(&function);
        stats.coalesce_time = timer.stop();
        stats.num_spill_moves = moves.len();
        moves
    } else {
        Vec::new()
    };

    Ok(Analysis { function, conflicts, spill_moves, stats })
}

/// Apply the allocator's substitution and materialise spill code.
///
/// Statistics for this phase are added to `stats`.
pub fn finalize<I: Instruction>(
    config: &I::Config,
    function: LiveFunction<I>,
    subst: &dyn Fn(I::Reg) -> I::Reg,
    stats: &mut RegallocStats,
) -> Result<StrippedFunction<I>> {
    let name = function.name.clone();
    let timer = Timer::start();

    let (function, eliminated) = patch_erase_live(subst, function);
    stats.num_moves_eliminated += eliminated;

    for instr in function.blocks().flat_map(|b| &b.instrs) {
        match instr {
            LiveInstr::Spill(..) => stats.num_spills += 1,
            LiveInstr::Reload(..) => stats.num_reloads += 1,
            LiveInstr::Instr(..) => {}
        }
    }

    let stripped = strip_live(config, function)
        .with_context(|| format!("materialising spill code failed for '{}'", name))?;
    stats.finalize_time += timer.stop();
    Ok(stripped)
}

/// [`analyze`] for a machine function.
pub fn analyze_function(func: &MachineFunction, options: Options) -> Result<Analysis<MachineInst>> {
    log::debug!("analysing '{}' ({} blocks)", func.name, func.blocks.len());
    let entry = (!func.entry.is_empty()).then(|| func.entry.clone());
    analyze(&func.name, func.statics.clone(), entry, func.to_live_blocks(), options)
}

/// [`finalize`] for a machine function.
///
/// Registers missing from `subst` keep their name.
pub fn finalize_function(
    config: &TargetConfig,
    function: LiveFunction<MachineInst>,
    subst: &HashMap<Reg, Reg>,
    stats: &mut RegallocStats,
) -> Result<MachineFunction> {
    config.validate().context("invalid target configuration")?;
    let lookup = |r: Reg| subst.get(&r).copied().unwrap_or(r);
    let stripped = finalize(config, function, &lookup, stats)?;
    Ok(MachineFunction::from_stripped(stripped))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::{MachineBlock, VReg};
    use crate::target::Register;

    fn counting_loop() -> MachineFunction {
        let mut func = MachineFunction::new("count");
        let i = func.new_vreg();
        let n = func.new_vreg();
        let one = func.new_vreg();

        func.add_block(MachineBlock::with_insts(
            "entry",
            vec![
                MachineInst::li(i, 0),
                MachineInst::li(n, 10),
                MachineInst::li(one, 1),
                MachineInst::j("loop"),
            ],
        ));
        func.add_block(MachineBlock::with_insts(
            "loop",
            vec![
                MachineInst::add(i, i, one),
                MachineInst::blt(i, n, "loop"),
                MachineInst::j("exit"),
            ],
        ));
        func.add_block(MachineBlock::with_insts(
            "exit",
            vec![MachineInst::mov(Register::A0, i), MachineInst::ret()],
        ));
        func
    }

    #[test]
    fn test_analyze_loop() {
        let analysis = analyze_function(&counting_loop(), Options::default()).unwrap();
        let stats = &analysis.stats;
        assert_eq!(stats.num_blocks, 3);
        assert_eq!(stats.num_sccs, 3);
        assert_eq!(stats.num_cyclic_sccs, 1);
        assert!(stats.max_rounds >= 1);

        let conflicts = analysis.conflicts.as_ref().unwrap();
        let v = |n| Reg::Virtual(VReg(n));
        assert!(conflicts.interferes(v(0), v(1)));
        assert!(conflicts.interferes(v(0), v(2)));
        assert_eq!(conflicts.moves, vec![(v(0), Reg::Physical(Register::A0))]);
        assert!(analysis.spill_moves.is_empty());
    }

    #[test]
    fn test_finalize_applies_substitution() {
        let analysis = analyze_function(&counting_loop(), Options::default()).unwrap();
        let mut stats = analysis.stats.clone();

        let subst: HashMap<Reg, Reg> = [
            (Reg::Virtual(VReg(0)), Reg::Physical(Register::A0)),
            (Reg::Virtual(VReg(1)), Reg::Physical(Register::R10)),
            (Reg::Virtual(VReg(2)), Reg::Physical(Register::R11)),
        ]
        .into_iter()
        .collect();

        let config = TargetConfig::default();
        let func = finalize_function(&config, analysis.function, &subst, &mut stats).unwrap();
        assert_eq!(func.entry, "entry");
        assert_eq!(stats.num_moves_eliminated, 1);
        let exit = func.get_block("exit").unwrap();
        assert_eq!(exit.insts, vec![MachineInst::ret()]);
        assert!(func.iter_insts().all(|i| i.uses().iter().all(|r| r.as_vreg().is_none())));
    }

    #[test]
    fn test_spilled_code_skips_conflicts() {
        let blocks: Vec<LiveBlock<MachineInst>> = vec![LiveBlock::new(
            "entry",
            vec![
                LiveInstr::plain(MachineInst::li(VReg(1), 1)),
                LiveInstr::Spill(Reg::Virtual(VReg(1)), 0),
                LiveInstr::Reload(0, Reg::Virtual(VReg(2))),
                LiveInstr::plain(MachineInst::mov(Register::A0, VReg(2))),
                LiveInstr::plain(MachineInst::ret()),
            ],
        )];
        let analysis = analyze("spilled", Vec::new(), None, blocks, Options::default()).unwrap();
        assert!(analysis.conflicts.is_none());
        assert_eq!(analysis.spill_moves, vec![(Reg::Virtual(VReg(2)), Reg::Virtual(VReg(1)))]);
        assert_eq!(analysis.all_moves().len(), 1);

        let mut stats = analysis.stats.clone();
        let config = TargetConfig::default();
        let stripped = finalize(&config, analysis.function, &|r| r, &mut stats).unwrap();
        assert_eq!(stats.num_spills, 1);
        assert_eq!(stats.num_reloads, 1);
        assert_eq!(stripped.blocks[0].instrs[1], MachineInst::sw(VReg(1), Register::SP, 0));
    }

    #[test]
    fn test_coalescing_can_be_disabled() {
        let blocks: Vec<LiveBlock<MachineInst>> = vec![LiveBlock::new(
            "entry",
            vec![
                LiveInstr::Spill(Reg::Virtual(VReg(1)), 0),
                LiveInstr::Reload(0, Reg::Virtual(VReg(2))),
            ],
        )];
        let options = Options { coalesce_spills: false, ..Options::default() };
        let analysis = analyze("f", Vec::new(), None, blocks, options).unwrap();
        assert!(analysis.spill_moves.is_empty());
    }
}
