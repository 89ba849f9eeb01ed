//! Liveness analysis for register allocation.
//!
//! Annotates every instruction with the registers born, dying on read and
//! dying on write there, and records the live-in set of every block.
//!
//! Blocks are visited one SCC at a time, successors first (see
//! [`super::cfg`]). An acyclic SCC needs a single linear pass. A cyclic SCC
//! is re-run until no live-in set of its blocks changes. Live-in sets only
//! grow from round to round and are bounded by the registers the function
//! mentions, so this always terminates.
//!
//! Each linear pass over a block runs twice:
//!
//! - backwards, to find deaths: a register dies where nothing after it reads it;
//! - forwards, to find births: a register is born where it is written while
//!   not already live.
//!
//! Births need the block's live-in set, which the backward pass produces.

use super::cfg::{build_sccs, check_reverse_dependent};
use super::error::{LivenessError, LivenessResult};
use super::instr::{BlockId, Instruction, LiveBlock, LiveInstr, Liveness, RegSet, Scc};
use indexmap::IndexMap;
use std::fmt;

/// Live-in sets, keyed by block.
pub type BlockMap<R> = IndexMap<BlockId, RegSet<R>>;

/// Function-level liveness information.
#[derive(Debug, Clone)]
pub struct LiveInfo<R: Ord> {
    /// Static data directives, passed through untouched.
    pub statics: Vec<String>,
    /// The entry block, if the function has one.
    pub entry: Option<BlockId>,
    /// Registers live on entry to each block.
    pub live_in: BlockMap<R>,
}

impl<R: Ord> LiveInfo<R> {
    /// Live-in set of a block.
    pub fn live_in_of(&self, block: &str) -> LivenessResult<&RegSet<R>> {
        self.live_in
            .get(block)
            .ok_or_else(|| LivenessError::MissingBlock { block: block.to_string() })
    }
}

impl<R: Ord + fmt::Display> fmt::Display for LiveInfo<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for directive in &self.statics {
            writeln!(f, "{}", directive)?;
        }
        match &self.entry {
            Some(entry) => writeln!(f, "# entry: {}", entry)?,
            None => writeln!(f, "# entry: <none>")?,
        }
        writeln!(f, "# live-in:")?;
        for (block, regs) in &self.live_in {
            write!(f, "#   {}:", block)?;
            for reg in regs {
                write!(f, " {}", reg)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// A function whose blocks have been analysed.
///
/// SCCs are stored in dependency order: the entry's SCC first, successors
/// after their predecessors wherever the graph allows it.
#[derive(Debug, Clone)]
pub struct LiveFunction<I: Instruction> {
    pub name: String,
    pub info: LiveInfo<I::Reg>,
    pub sccs: Vec<Scc<LiveBlock<I>>>,
}

impl<I: Instruction> LiveFunction<I> {
    /// Iterate over blocks in SCC order.
    pub fn blocks(&self) -> impl Iterator<Item = &LiveBlock<I>> {
        self.sccs.iter().flat_map(|scc| scc.iter())
    }

    /// Look up a block by id.
    pub fn block(&self, id: &str) -> Option<&LiveBlock<I>> {
        self.blocks().find(|b| b.id == id)
    }

    /// Total number of instructions, pseudo-ops included.
    pub fn num_instrs(&self) -> usize {
        self.blocks().map(|b| b.instrs.len()).sum()
    }

    /// Apply `f` to every block, keeping the SCC structure.
    pub fn map_blocks(self, mut f: impl FnMut(LiveBlock<I>) -> LiveBlock<I>) -> Self {
        Self {
            name: self.name,
            info: self.info,
            sccs: self.sccs.into_iter().map(|scc| scc.map(&mut f)).collect(),
        }
    }
}

impl<I: Instruction> fmt::Display for LiveFunction<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "function {}:", self.name)?;
        write!(f, "{}", self.info)?;
        for scc in &self.sccs {
            match scc {
                Scc::Acyclic(block) => {
                    writeln!(f)?;
                    write!(f, "{}", block)?;
                }
                Scc::Cyclic(blocks) => {
                    writeln!(f)?;
                    writeln!(f, "# cyclic SCC")?;
                    for block in blocks {
                        write!(f, "{}", block)?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Result of running the fixpoint over a function's SCCs.
#[derive(Debug)]
pub struct ComputedLiveness<I: Instruction> {
    /// Live-in set of every block.
    pub live_in: BlockMap<I::Reg>,
    /// Annotated SCCs, in the order they were processed.
    pub sccs: Vec<Scc<LiveBlock<I>>>,
    /// Rounds needed by each cyclic SCC, in processing order.
    pub cyclic_rounds: Vec<usize>,
}

/// Analyse a function.
///
/// `blocks` are in source order. When `verify_order` is set the SCC list is
/// checked to be in reverse dependent order before the fixpoint runs.
pub fn reg_liveness<I: Instruction>(
    name: impl Into<String>,
    statics: Vec<String>,
    entry: Option<BlockId>,
    blocks: Vec<LiveBlock<I>>,
    verify_order: bool,
) -> LivenessResult<(LiveFunction<I>, Vec<usize>)> {
    let name = name.into();
    let entry = entry.or_else(|| blocks.first().map(|b| b.id.clone()));

    let sccs = build_sccs(blocks, entry.as_deref());
    if verify_order {
        check_reverse_dependent(&sccs)?;
    }

    let computed = compute_liveness(sccs)?;
    log::debug!(
        "liveness for '{}': {} blocks, {} cyclic SCCs",
        name,
        computed.live_in.len(),
        computed.cyclic_rounds.len()
    );

    let mut sccs = computed.sccs;
    sccs.reverse();

    let function = LiveFunction {
        name,
        info: LiveInfo { statics, entry, live_in: computed.live_in },
        sccs,
    };
    Ok((function, computed.cyclic_rounds))
}

/// Run the fixpoint over SCCs given successors first.
pub fn compute_liveness<I: Instruction>(
    sccs: Vec<Scc<LiveBlock<I>>>,
) -> LivenessResult<ComputedLiveness<I>> {
    let mut live_in: BlockMap<I::Reg> = IndexMap::new();
    let mut annotated = Vec::with_capacity(sccs.len());
    let mut cyclic_rounds = Vec::new();

    for scc in sccs {
        match scc {
            Scc::Acyclic(block) => {
                let (entry_live, block) = linear_liveness_block(&live_in, block)?;
                live_in.insert(block.id.clone(), entry_live);
                annotated.push(Scc::Acyclic(block));
            }
            Scc::Cyclic(blocks) => {
                let (blocks, rounds) = iterate_until_unchanged(&mut live_in, blocks)?;
                cyclic_rounds.push(rounds);
                annotated.push(Scc::Cyclic(blocks));
            }
        }
    }

    Ok(ComputedLiveness { live_in, sccs: annotated, cyclic_rounds })
}

/// Re-run a cyclic SCC until none of its live-in sets change.
///
/// Returns the annotated blocks and the number of rounds taken.
fn iterate_until_unchanged<I: Instruction>(
    live_in: &mut BlockMap<I::Reg>,
    blocks: Vec<LiveBlock<I>>,
) -> LivenessResult<(Vec<LiveBlock<I>>, usize)> {
    if blocks.is_empty() {
        return Err(LivenessError::EmptyCyclicScc);
    }

    let limit = round_limit(live_in, &blocks);
    let mut blocks = blocks;
    let mut rounds = 0;

    loop {
        rounds += 1;
        if rounds > limit {
            return Err(LivenessError::NoConvergence { rounds: limit });
        }

        let mut changed = false;
        let mut next = Vec::with_capacity(blocks.len());
        for block in blocks {
            let (entry_live, block) = linear_liveness_block(live_in, block)?;
            if live_in.get(&block.id) != Some(&entry_live) {
                changed = true;
                log::trace!("round {}: live-in of '{}' is now {:?}", rounds, block.id, entry_live);
                live_in.insert(block.id.clone(), entry_live);
            }
            next.push(block);
        }
        blocks = next;

        if !changed {
            log::debug!(
                "cyclic SCC of {} blocks converged after {} rounds",
                blocks.len(),
                rounds
            );
            return Ok((blocks, rounds));
        }
    }
}

/// Upper bound on the rounds a cyclic SCC can need.
///
/// Every round that is not the last adds at least one register to at least
/// one live-in set, and no set can hold more than the registers in scope.
fn round_limit<I: Instruction>(live_in: &BlockMap<I::Reg>, blocks: &[LiveBlock<I>]) -> usize {
    let mut universe: RegSet<I::Reg> = RegSet::new();
    for block in blocks {
        for instr in &block.instrs {
            let usage = instr.reg_usage();
            universe.extend(usage.reads);
            universe.extend(usage.writes);
        }
        for target in block.jump_targets() {
            if let Some(regs) = live_in.get(&target) {
                universe.extend(regs.iter().copied());
            }
        }
    }
    blocks.len() * (universe.len() + 1) + 1
}

/// Backward then forward pass over one block.
///
/// Returns the block's live-in set and the annotated block.
pub fn linear_liveness_block<I: Instruction>(
    live_in: &BlockMap<I::Reg>,
    block: LiveBlock<I>,
) -> LivenessResult<(RegSet<I::Reg>, LiveBlock<I>)> {
    let LiveBlock { id, instrs } = block;
    let (entry_live, instrs, pseudo_deaths) = liveness_backward(live_in, instrs);
    let instrs = liveness_forward(&id, &entry_live, instrs, &pseudo_deaths)?;
    Ok((entry_live, LiveBlock { id, instrs }))
}

/// Backward pass: compute deaths and the live-in set.
///
/// Also returns, per instruction, whether a spill pseudo-op is the last
/// reader (or a reload the dead writer) of its register. Pseudo-ops carry no
/// liveness record, so the forward pass needs this on the side.
fn liveness_backward<I: Instruction>(
    live_in: &BlockMap<I::Reg>,
    instrs: Vec<LiveInstr<I>>,
) -> (RegSet<I::Reg>, Vec<LiveInstr<I>>, Vec<bool>) {
    let mut live: RegSet<I::Reg> = RegSet::new();
    let mut pseudo_deaths = vec![false; instrs.len()];
    let mut annotated = Vec::with_capacity(instrs.len());

    for (idx, instr) in instrs.into_iter().enumerate().rev() {
        let instr = match instr {
            LiveInstr::Instr(instr, _) if instr.is_meta() => LiveInstr::Instr(instr, None),

            LiveInstr::Instr(instr, _) => {
                let liveness = liveness1(live_in, &mut live, &instr);
                LiveInstr::Instr(instr, Some(liveness))
            }

            LiveInstr::Spill(reg, slot) => {
                pseudo_deaths[idx] = live.insert(reg);
                LiveInstr::Spill(reg, slot)
            }

            LiveInstr::Reload(slot, reg) => {
                pseudo_deaths[idx] = !live.remove(&reg);
                LiveInstr::Reload(slot, reg)
            }
        };
        annotated.push(instr);
    }

    annotated.reverse();
    (live, annotated, pseudo_deaths)
}

/// Step the backward pass over one target instruction.
///
/// `live` holds the registers live after `instr` on entry and the registers
/// live before it on return.
fn liveness1<I: Instruction>(
    live_in: &BlockMap<I::Reg>,
    live: &mut RegSet<I::Reg>,
    instr: &I,
) -> Liveness<I::Reg> {
    let usage = instr.reg_usage();

    // Everything live on entry to a jump target is live here too.
    let mut from_branch: RegSet<I::Reg> = RegSet::new();
    for target in instr.jump_targets() {
        if let Some(regs) = live_in.get(&target) {
            from_branch.extend(regs.iter().copied());
        }
    }
    let live_br: RegSet<I::Reg> = live.union(&from_branch).copied().collect();

    let mut die_read: RegSet<I::Reg> = usage
        .reads
        .iter()
        .filter(|r| !usage.writes.contains(r) && !live_br.contains(r))
        .copied()
        .collect();
    let die_write: RegSet<I::Reg> = usage
        .writes
        .iter()
        .filter(|r| !live_br.contains(r))
        .copied()
        .collect();

    // Registers only live in the targets are dead as far as this block goes.
    die_read.extend(from_branch.difference(live).copied());

    let mut before = live_br;
    for reg in &usage.writes {
        before.remove(reg);
    }
    before.extend(usage.reads.iter().copied());
    *live = before;

    Liveness { born: RegSet::new(), die_read, die_write }
}

/// Forward pass: compute births from the block's live-in set.
fn liveness_forward<I: Instruction>(
    block: &str,
    entry_live: &RegSet<I::Reg>,
    instrs: Vec<LiveInstr<I>>,
    pseudo_deaths: &[bool],
) -> LivenessResult<Vec<LiveInstr<I>>> {
    let mut live = entry_live.clone();
    let mut annotated = Vec::with_capacity(instrs.len());

    for (idx, instr) in instrs.into_iter().enumerate() {
        let instr = match instr {
            LiveInstr::Instr(instr, Some(mut liveness)) => {
                let writes = instr.reg_usage().writes;
                liveness.born = writes.iter().filter(|r| !live.contains(r)).copied().collect();

                live.extend(writes);
                live.retain(|r| !liveness.dies(r));
                LiveInstr::Instr(instr, Some(liveness))
            }

            LiveInstr::Instr(instr, None) if instr.is_meta() => LiveInstr::Instr(instr, None),

            LiveInstr::Instr(_, None) => {
                return Err(LivenessError::MissingLiveness { block: block.to_string(), index: idx });
            }

            LiveInstr::Spill(reg, slot) => {
                if pseudo_deaths[idx] {
                    live.remove(&reg);
                }
                LiveInstr::Spill(reg, slot)
            }

            LiveInstr::Reload(slot, reg) => {
                if pseudo_deaths[idx] {
                    live.remove(&reg);
                } else {
                    live.insert(reg);
                }
                LiveInstr::Reload(slot, reg)
            }
        };
        annotated.push(instr);
    }

    Ok(annotated)
}
