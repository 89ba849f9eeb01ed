//! Instructions annotated with liveness.
//!
//! The passes in this module family never look inside a concrete
//! instruction set. Everything they need to know about an instruction
//! comes through the [`Instruction`] trait, which each target implements.

use std::collections::BTreeSet;
use std::fmt;
use std::hash::Hash;

/// Block identifier (the block's label).
pub type BlockId = String;

/// Index of an abstract stack slot.
pub type Slot = u32;

/// A set of registers, ordered so that dumps are stable.
pub type RegSet<R> = BTreeSet<R>;

/// Registers read and written by one instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegUsage<R> {
    pub reads: Vec<R>,
    pub writes: Vec<R>,
}

impl<R> RegUsage<R> {
    pub fn new(reads: Vec<R>, writes: Vec<R>) -> Self {
        Self { reads, writes }
    }

    pub fn none() -> Self {
        Self { reads: Vec::new(), writes: Vec::new() }
    }
}

/// What a target must tell the liveness passes about its instructions.
pub trait Instruction: Clone + fmt::Display {
    /// Register type, virtual or physical.
    type Reg: Copy + Eq + Ord + Hash + fmt::Debug + fmt::Display;

    /// Target settings needed to materialize spill code.
    type Config;

    /// Registers read and written by this instruction.
    fn reg_usage(&self) -> RegUsage<Self::Reg>;

    /// Blocks this instruction may transfer control to. Empty if it never jumps.
    fn jump_targets(&self) -> Vec<BlockId>;

    /// `Some((src, dst))` if this is a plain register-to-register move.
    fn reg_move(&self) -> Option<(Self::Reg, Self::Reg)>;

    /// Comments and other markers that never get a liveness record.
    fn is_meta(&self) -> bool;

    /// New frame delta if this instruction is a delta marker.
    fn frame_delta(&self) -> Option<i32>;

    /// Copy of this instruction with every register passed through `f`.
    fn patch_regs(&self, f: &dyn Fn(Self::Reg) -> Self::Reg) -> Self;

    /// Store `reg` into `slot` with the frame currently `delta` bytes deep.
    ///
    /// `None` if the slot cannot be addressed at that delta.
    fn mk_spill(config: &Self::Config, reg: Self::Reg, delta: i32, slot: Slot) -> Option<Self>;

    /// Load `reg` from `slot` with the frame currently `delta` bytes deep.
    fn mk_reload(config: &Self::Config, reg: Self::Reg, delta: i32, slot: Slot)
        -> Option<Self>;
}

/// Liveness facts for a single instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Liveness<R: Ord> {
    /// Written here with no live value before: the first definition.
    pub born: RegSet<R>,
    /// Read here for the last time.
    pub die_read: RegSet<R>,
    /// Written here, but the value is never read.
    pub die_write: RegSet<R>,
}

impl<R: Ord> Liveness<R> {
    pub fn empty() -> Self {
        Self {
            born: RegSet::new(),
            die_read: RegSet::new(),
            die_write: RegSet::new(),
        }
    }

    /// Does `reg` die here, by either a last read or a dead write?
    pub fn dies(&self, reg: &R) -> bool {
        self.die_read.contains(reg) || self.die_write.contains(reg)
    }

    /// Registers born and dead in this same instruction.
    pub fn orphans(&self) -> RegSet<R>
    where
        R: Copy,
    {
        self.born.iter().filter(|r| self.dies(r)).copied().collect()
    }
}

impl<R: Ord + fmt::Display> fmt::Display for Liveness<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_regs(f, "born:   ", &self.born)?;
        write_regs(f, "r_dying:", &self.die_read)?;
        write_regs(f, "w_dying:", &self.die_write)
    }
}

fn write_regs<R: fmt::Display>(
    f: &mut fmt::Formatter<'_>,
    header: &str,
    regs: &RegSet<R>,
) -> fmt::Result {
    if regs.is_empty() {
        return Ok(());
    }
    write!(f, "\n\t\t# {}", header)?;
    for reg in regs {
        write!(f, " {}", reg)?;
    }
    Ok(())
}

/// An instruction as seen by the liveness passes.
#[derive(Debug, Clone)]
pub enum LiveInstr<I: Instruction> {
    /// A target instruction, with liveness once analysis has run.
    Instr(I, Option<Liveness<I::Reg>>),
    /// Store a register into an abstract stack slot.
    Spill(I::Reg, Slot),
    /// Load a register from an abstract stack slot.
    Reload(Slot, I::Reg),
}

impl<I: Instruction> LiveInstr<I> {
    /// Wrap a target instruction that has not been analysed yet.
    pub fn plain(instr: I) -> Self {
        LiveInstr::Instr(instr, None)
    }

    pub fn liveness(&self) -> Option<&Liveness<I::Reg>> {
        match self {
            LiveInstr::Instr(_, live) => live.as_ref(),
            LiveInstr::Spill(..) | LiveInstr::Reload(..) => None,
        }
    }

    pub fn is_pseudo(&self) -> bool {
        matches!(self, LiveInstr::Spill(..) | LiveInstr::Reload(..))
    }

    /// Register usage, including that of the spill pseudo-ops.
    pub fn reg_usage(&self) -> RegUsage<I::Reg> {
        match self {
            LiveInstr::Instr(instr, _) => instr.reg_usage(),
            LiveInstr::Spill(reg, _) => RegUsage::new(vec![*reg], Vec::new()),
            LiveInstr::Reload(_, reg) => RegUsage::new(Vec::new(), vec![*reg]),
        }
    }

    pub fn jump_targets(&self) -> Vec<BlockId> {
        match self {
            LiveInstr::Instr(instr, _) => instr.jump_targets(),
            LiveInstr::Spill(..) | LiveInstr::Reload(..) => Vec::new(),
        }
    }
}

impl<I: Instruction> fmt::Display for LiveInstr<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiveInstr::Instr(instr, live) => {
                write!(f, "\t{}", instr)?;
                if let Some(live) = live {
                    write!(f, "{}", live)?;
                }
                Ok(())
            }
            LiveInstr::Spill(reg, slot) => write!(f, "\tSPILL {} SLOT({})", reg, slot),
            LiveInstr::Reload(slot, reg) => write!(f, "\tRELOAD SLOT({}) {}", slot, reg),
        }
    }
}

/// A basic block of annotated instructions.
#[derive(Debug, Clone)]
pub struct LiveBlock<I: Instruction> {
    pub id: BlockId,
    pub instrs: Vec<LiveInstr<I>>,
}

impl<I: Instruction> LiveBlock<I> {
    pub fn new(id: impl Into<BlockId>, instrs: Vec<LiveInstr<I>>) -> Self {
        Self { id: id.into(), instrs }
    }

    /// Build an un-analysed block from target instructions.
    pub fn from_instrs(id: impl Into<BlockId>, instrs: impl IntoIterator<Item = I>) -> Self {
        Self::new(id, instrs.into_iter().map(LiveInstr::plain).collect())
    }

    /// All blocks this block may jump to, in first-seen order.
    pub fn jump_targets(&self) -> Vec<BlockId> {
        let mut targets: Vec<BlockId> = Vec::new();
        for instr in &self.instrs {
            for target in instr.jump_targets() {
                if !targets.contains(&target) {
                    targets.push(target);
                }
            }
        }
        targets
    }
}

impl<I: Instruction> fmt::Display for LiveBlock<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:", self.id)?;
        for instr in &self.instrs {
            writeln!(f, "{}", instr)?;
        }
        Ok(())
    }
}

/// A strongly connected component of the control flow graph.
#[derive(Debug, Clone)]
pub enum Scc<T> {
    /// A single block that cannot reach itself.
    Acyclic(T),
    /// Blocks that can all reach each other, or a block with a self-loop.
    Cyclic(Vec<T>),
}

impl<T> Scc<T> {
    pub fn is_cyclic(&self) -> bool {
        matches!(self, Scc::Cyclic(_))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        match self {
            Scc::Acyclic(node) => std::slice::from_ref(node).iter(),
            Scc::Cyclic(nodes) => nodes.iter(),
        }
    }

    pub fn into_vec(self) -> Vec<T> {
        match self {
            Scc::Acyclic(node) => vec![node],
            Scc::Cyclic(nodes) => nodes,
        }
    }

    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> Scc<U> {
        match self {
            Scc::Acyclic(node) => Scc::Acyclic(f(node)),
            Scc::Cyclic(nodes) => Scc::Cyclic(nodes.into_iter().map(f).collect()),
        }
    }
}

/// Flatten SCCs into their blocks, keeping order.
pub fn flatten_sccs<T>(sccs: Vec<Scc<T>>) -> Vec<T> {
    sccs.into_iter().flat_map(Scc::into_vec).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orphans() {
        let mut live: Liveness<u32> = Liveness::empty();
        live.born.extend([1, 2, 3]);
        live.die_write.insert(2);
        live.die_read.insert(3);
        live.die_read.insert(7);

        assert_eq!(live.orphans(), RegSet::from([2, 3]));
        assert!(live.dies(&7));
        assert!(!live.dies(&1));
    }

    #[test]
    fn test_liveness_display_skips_empty_sets() {
        let mut live: Liveness<u32> = Liveness::empty();
        assert_eq!(format!("{}", live), "");

        live.die_read.insert(4);
        live.die_read.insert(5);
        assert_eq!(format!("{}", live), "\n\t\t# r_dying: 4 5");
    }

    #[test]
    fn test_scc_helpers() {
        let acyclic = Scc::Acyclic(1);
        let cyclic = Scc::Cyclic(vec![2, 3]);
        assert!(!acyclic.is_cyclic());
        assert!(cyclic.is_cyclic());
        assert_eq!(cyclic.iter().copied().collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(flatten_sccs(vec![acyclic, cyclic.map(|n| n * 10)]), vec![1, 20, 30]);
    }
}
