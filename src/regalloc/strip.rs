//! Turn annotated code back into plain target instructions.
//!
//! Spill and reload pseudo-ops become real stores and loads addressed
//! relative to the current frame delta. Delta markers update that delta and
//! are dropped. All liveness records are discarded.

use super::error::{LivenessError, LivenessResult};
use super::instr::{flatten_sccs, BlockId, Instruction, LiveBlock, LiveInstr};
use super::liveness::LiveFunction;
use std::fmt;

/// A block of final instructions.
#[derive(Debug, Clone)]
pub struct StrippedBlock<I> {
    pub id: BlockId,
    pub instrs: Vec<I>,
}

/// A function ready for emission. The entry block comes first.
#[derive(Debug, Clone)]
pub struct StrippedFunction<I> {
    pub name: String,
    pub statics: Vec<String>,
    pub blocks: Vec<StrippedBlock<I>>,
}

impl<I: fmt::Display> fmt::Display for StrippedFunction<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for directive in &self.statics {
            writeln!(f, "{}", directive)?;
        }
        writeln!(f, "{}:", self.name)?;
        for block in &self.blocks {
            writeln!(f, "{}:", block.id)?;
            for instr in &block.instrs {
                writeln!(f, "\t{}", instr)?;
            }
        }
        Ok(())
    }
}

/// Materialise spill code and drop liveness for a whole function.
pub fn strip_live<I: Instruction>(
    config: &I::Config,
    func: LiveFunction<I>,
) -> LivenessResult<StrippedFunction<I>> {
    let LiveFunction { name, info, sccs } = func;
    let mut blocks = flatten_sccs(sccs);

    if let Some(entry) = &info.entry {
        let pos = blocks
            .iter()
            .position(|b| &b.id == entry)
            .ok_or_else(|| LivenessError::MissingBlock { block: entry.clone() })?;
        let first = blocks.remove(pos);
        blocks.insert(0, first);
    }

    let blocks = blocks
        .into_iter()
        .map(|block| strip_live_block(config, block))
        .collect::<LivenessResult<Vec<_>>>()?;

    Ok(StrippedFunction { name, statics: info.statics, blocks })
}

/// Materialise one block, starting with a frame delta of zero.
pub fn strip_live_block<I: Instruction>(
    config: &I::Config,
    block: LiveBlock<I>,
) -> LivenessResult<StrippedBlock<I>> {
    let mut delta = 0;
    let mut instrs = Vec::with_capacity(block.instrs.len());
    let out_of_range = |slot, delta| LivenessError::SlotOutOfRange {
        block: block.id.clone(),
        slot,
        delta,
    };

    for instr in block.instrs {
        match instr {
            LiveInstr::Instr(target, _) => match target.frame_delta() {
                Some(new_delta) => delta = new_delta,
                None => instrs.push(target),
            },
            LiveInstr::Spill(reg, slot) => instrs.push(
                I::mk_spill(config, reg, delta, slot).ok_or_else(|| out_of_range(slot, delta))?,
            ),
            LiveInstr::Reload(slot, reg) => instrs.push(
                I::mk_reload(config, reg, delta, slot).ok_or_else(|| out_of_range(slot, delta))?,
            ),
        }
    }

    Ok(StrippedBlock { id: block.id, instrs })
}

/// Remove frame delta markers, leaving everything else annotated.
pub fn erase_deltas_live<I: Instruction>(func: LiveFunction<I>) -> LiveFunction<I> {
    func.map_blocks(|block| LiveBlock {
        id: block.id,
        instrs: block
            .instrs
            .into_iter()
            .filter(|instr| !matches!(instr, LiveInstr::Instr(t, _) if t.frame_delta().is_some()))
            .collect(),
    })
}
