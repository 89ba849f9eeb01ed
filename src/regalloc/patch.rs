//! Apply the allocator's register substitution to annotated code.

use super::instr::{Instruction, LiveBlock, LiveInstr, Liveness, RegSet};
use super::liveness::LiveFunction;

fn patch_set<R: Ord + Copy>(f: &dyn Fn(R) -> R, set: &RegSet<R>) -> RegSet<R> {
    set.iter().map(|&r| f(r)).collect()
}

/// Rename every register of one instruction, its liveness record included.
pub fn patch_live_instr<I: Instruction>(
    f: &dyn Fn(I::Reg) -> I::Reg,
    instr: &LiveInstr<I>,
) -> LiveInstr<I> {
    match instr {
        LiveInstr::Instr(target, live) => {
            let live = live.as_ref().map(|l| Liveness {
                born: patch_set(f, &l.born),
                die_read: patch_set(f, &l.die_read),
                die_write: patch_set(f, &l.die_write),
            });
            LiveInstr::Instr(target.patch_regs(f), live)
        }
        LiveInstr::Spill(reg, slot) => LiveInstr::Spill(f(*reg), *slot),
        LiveInstr::Reload(slot, reg) => LiveInstr::Reload(*slot, f(*reg)),
    }
}

/// Is this (already patched) instruction a move that can be deleted?
///
/// True when it copies a register onto itself, or when its destination is
/// born and dies right here so the copied value is never read.
fn eats_move<I: Instruction>(instr: &LiveInstr<I>) -> bool {
    let LiveInstr::Instr(target, live) = instr else {
        return false;
    };
    let Some((src, dst)) = target.reg_move() else {
        return false;
    };
    if src == dst {
        return true;
    }
    live.as_ref()
        .map_or(false, |l| l.born.contains(&dst) && l.dies(&dst))
}

/// Rename every register in the function and delete the moves that
/// became useless.
///
/// The live-in map is renamed too. Returns the rewritten function and the
/// number of moves removed.
pub fn patch_erase_live<I: Instruction>(
    f: &dyn Fn(I::Reg) -> I::Reg,
    func: LiveFunction<I>,
) -> (LiveFunction<I>, usize) {
    let mut eliminated = 0;

    let mut info = func.info;
    for set in info.live_in.values_mut() {
        *set = patch_set(f, set);
    }

    let func = LiveFunction { name: func.name, info, sccs: func.sccs };
    let func = func.map_blocks(|block| {
        let mut instrs = Vec::with_capacity(block.instrs.len());
        for instr in &block.instrs {
            let patched = patch_live_instr(f, instr);
            if eats_move(&patched) {
                log::trace!("'{}': dropping {}", block.id, patched.to_string().trim());
                eliminated += 1;
            } else {
                instrs.push(patched);
            }
        }
        LiveBlock { id: block.id, instrs }
    });

    log::debug!("'{}': {} moves eliminated after renaming", func.name, eliminated);
    (func, eliminated)
}
