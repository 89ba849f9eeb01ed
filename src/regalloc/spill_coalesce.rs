//! Move candidates between spilled and reloaded registers.
//!
//! If `r1` is spilled to a slot and `r2` is later reloaded from it with no
//! other spill to that slot in between, giving `r1` and `r2` the same
//! register turns the spill/reload pair into a no-op.
//!
//! Two rounds run over the function. The first walks each block on its own
//! and records, at every jump, which register each slot holds. The second
//! walks each block again starting from the slot map merged from those
//! records, and emits the candidates. There is no further iteration, so
//! slot contents are only propagated one block deep.

use super::instr::{BlockId, Instruction, LiveBlock, LiveInstr, Slot};
use super::liveness::LiveFunction;
use std::collections::{BTreeMap, HashMap};

/// Register last stored into each slot.
pub type SlotMap<R> = BTreeMap<Slot, R>;

/// Slot maps published to each block by the jumps into it.
type Incoming<R> = HashMap<BlockId, Vec<SlotMap<R>>>;

/// Find (reloaded, spilled) register pairs worth coalescing.
pub fn slurp_reload_coalesce<I: Instruction>(func: &LiveFunction<I>) -> Vec<(I::Reg, I::Reg)> {
    let mut incoming: Incoming<I::Reg> = HashMap::new();
    for block in func.blocks() {
        walk_block(block, SlotMap::new(), |target, map| {
            incoming.entry(target).or_default().push(map.clone());
        });
    }

    let mut moves = Vec::new();
    for block in func.blocks() {
        let start = incoming
            .get(&block.id)
            .map(|maps| merge_slot_maps(maps))
            .unwrap_or_default();
        moves.extend(walk_block(block, start, |_, _| {}));
    }

    log::debug!("'{}': {} spill-reload move candidates", func.name, moves.len());
    moves
}

/// Walk one block from `slots`, reporting the slot map at each jump.
///
/// Returns the (reloaded, spilled) pairs found along the way.
fn walk_block<I: Instruction>(
    block: &LiveBlock<I>,
    mut slots: SlotMap<I::Reg>,
    mut publish: impl FnMut(BlockId, &SlotMap<I::Reg>),
) -> Vec<(I::Reg, I::Reg)> {
    let mut moves = Vec::new();
    for instr in &block.instrs {
        match instr {
            LiveInstr::Spill(reg, slot) => {
                slots.insert(*slot, *reg);
            }
            LiveInstr::Reload(slot, reg) => {
                if let Some(&stored) = slots.get(slot) {
                    if stored != *reg {
                        moves.push((*reg, stored));
                    }
                }
            }
            LiveInstr::Instr(target, _) => {
                for dest in target.jump_targets() {
                    publish(dest, &slots);
                }
            }
        }
    }
    moves
}

/// Keep only the slots every map agrees on.
fn merge_slot_maps<R: Copy + Eq>(maps: &[SlotMap<R>]) -> SlotMap<R> {
    let Some((first, rest)) = maps.split_first() else {
        return SlotMap::new();
    };
    first
        .iter()
        .filter(|(slot, reg)| rest.iter().all(|m| m.get(slot) == Some(reg)))
        .map(|(&slot, &reg)| (slot, reg))
        .collect()
}
