//! Conflict cliques and move candidates for the allocator.

use super::error::{LivenessError, LivenessResult};
use super::instr::{Instruction, LiveBlock, LiveInstr, RegSet};
use super::liveness::{BlockMap, LiveFunction};
use std::collections::BTreeSet;

/// Everything the allocator needs to build its interference graph.
///
/// Cliques form a bag: duplicates are kept and order carries no meaning.
/// Every pair of registers inside one clique interferes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflicts<R: Ord> {
    pub cliques: Vec<RegSet<R>>,
    /// Register-to-register moves as (src, dst).
    pub moves: Vec<(R, R)>,
}

impl<R: Ord + Copy> Conflicts<R> {
    pub fn new() -> Self {
        Self { cliques: Vec::new(), moves: Vec::new() }
    }

    /// Fold the clique bag into a set of unordered pairs, smaller first.
    pub fn interference_edges(&self) -> BTreeSet<(R, R)> {
        let mut edges = BTreeSet::new();
        for clique in &self.cliques {
            let regs: Vec<R> = clique.iter().copied().collect();
            for (i, &a) in regs.iter().enumerate() {
                for &b in &regs[i + 1..] {
                    edges.insert((a, b));
                }
            }
        }
        edges
    }

    /// Every register mentioned by a clique or a move.
    pub fn registers(&self) -> RegSet<R> {
        let mut regs: RegSet<R> = self.cliques.iter().flatten().copied().collect();
        for &(src, dst) in &self.moves {
            regs.insert(src);
            regs.insert(dst);
        }
        regs
    }

    /// Do `a` and `b` appear together in some clique?
    pub fn interferes(&self, a: R, b: R) -> bool {
        a != b && self.cliques.iter().any(|c| c.contains(&a) && c.contains(&b))
    }
}

impl<R: Ord + Copy> Default for Conflicts<R> {
    fn default() -> Self {
        Self::new()
    }
}

/// Collect conflict cliques and move candidates from an analysed function.
///
/// Must run before any spill code is inserted.
pub fn slurp_conflicts<I: Instruction>(
    func: &LiveFunction<I>,
) -> LivenessResult<Conflicts<I::Reg>> {
    let mut conflicts = Conflicts::new();
    for block in func.blocks() {
        slurp_block(&func.info.live_in, block, &mut conflicts)?;
    }
    log::debug!(
        "'{}': {} conflict sets, {} move candidates",
        func.name,
        conflicts.cliques.len(),
        conflicts.moves.len()
    );
    Ok(conflicts)
}

fn slurp_block<I: Instruction>(
    live_in: &BlockMap<I::Reg>,
    block: &LiveBlock<I>,
    out: &mut Conflicts<I::Reg>,
) -> LivenessResult<()> {
    let entry_live = live_in
        .get(&block.id)
        .ok_or_else(|| LivenessError::MissingBlock { block: block.id.clone() })?;

    out.cliques.push(entry_live.clone());
    let mut live = entry_live.clone();

    for instr in &block.instrs {
        match instr {
            LiveInstr::Instr(_, None) => {}

            LiveInstr::Instr(target, Some(liveness)) => {
                let mut next: RegSet<I::Reg> =
                    live.difference(&liveness.die_read).copied().collect();
                next.extend(liveness.born.iter().copied());
                next.retain(|r| !liveness.die_write.contains(r));

                // Orphans never outlive their instruction but still need a register.
                let mut clique = next.clone();
                clique.extend(liveness.orphans());
                out.cliques.push(clique);

                if let Some(pair) = target.reg_move() {
                    out.moves.push(pair);
                }
                live = next;
            }

            LiveInstr::Spill(..) | LiveInstr::Reload(..) => {
                return Err(LivenessError::UnexpectedPseudo {
                    block: block.id.clone(),
                    instr: instr.to_string().trim().to_string(),
                });
            }
        }
    }

    out.cliques.push(live);
    Ok(())
}
