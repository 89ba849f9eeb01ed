//! How the liveness passes see ZKIR machine instructions.

use super::block::MachineBlock;
use super::function::MachineFunction;
use super::instruction::{MachineInst, Opcode};
use super::value::Reg;
use crate::regalloc::{BlockId, Instruction, LiveBlock, RegUsage, Slot, StrippedFunction};
use crate::target::TargetConfig;

impl Instruction for MachineInst {
    type Reg = Reg;
    type Config = TargetConfig;

    fn reg_usage(&self) -> RegUsage<Reg> {
        if self.opcode.is_meta() {
            return RegUsage::none();
        }
        RegUsage::new(self.uses(), self.defs())
    }

    fn jump_targets(&self) -> Vec<BlockId> {
        self.branch_labels()
    }

    fn reg_move(&self) -> Option<(Reg, Reg)> {
        if self.opcode != Opcode::MOV {
            return None;
        }
        let dst = self.dst.as_ref()?.as_reg()?;
        let src = self.srcs.first()?.as_reg()?;
        Some((src, dst))
    }

    fn is_meta(&self) -> bool {
        self.opcode.is_meta()
    }

    fn frame_delta(&self) -> Option<i32> {
        if self.opcode != Opcode::DELTA {
            return None;
        }
        let imm = self.srcs.first()?.as_imm()?;
        Some(i32::try_from(imm).unwrap_or_else(|_| {
            log::warn!("frame delta {} does not fit in 32 bits, clamping", imm);
            imm.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
        }))
    }

    fn patch_regs(&self, f: &dyn Fn(Reg) -> Reg) -> Self {
        self.map_regs(f)
    }

    fn mk_spill(config: &TargetConfig, reg: Reg, delta: i32, slot: Slot) -> Option<Self> {
        let offset = config.slot_offset(delta, slot)?;
        Some(MachineInst::sw(reg, config.frame_reg, offset))
    }

    fn mk_reload(config: &TargetConfig, reg: Reg, delta: i32, slot: Slot) -> Option<Self> {
        let offset = config.slot_offset(delta, slot)?;
        Some(MachineInst::lw(reg, config.frame_reg, offset))
    }
}

impl MachineFunction {
    /// Blocks in source order, ready for liveness analysis.
    ///
    /// Control never falls through, so a block without a terminator is
    /// treated as an exit.
    pub fn to_live_blocks(&self) -> Vec<LiveBlock<MachineInst>> {
        self.iter_blocks()
            .map(|b| {
                if !b.has_terminator() {
                    log::warn!("'{}': block '{}' has no terminator", self.name, b.label);
                }
                LiveBlock::from_instrs(b.label.clone(), b.insts.iter().cloned())
            })
            .collect()
    }

    /// Rebuild a function from materialised code.
    pub fn from_stripped(stripped: StrippedFunction<MachineInst>) -> Self {
        let mut func = MachineFunction::new(stripped.name);
        func.statics = stripped.statics;
        for block in stripped.blocks {
            func.add_block(MachineBlock::with_insts(block.id, block.instrs));
        }
        func
    }
}
