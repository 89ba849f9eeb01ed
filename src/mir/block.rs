//! Machine basic blocks.

use super::instruction::MachineInst;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A machine basic block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineBlock {
    /// Block label/name
    pub label: String,
    /// Instructions in this block
    #[serde(default)]
    pub insts: Vec<MachineInst>,
}

impl MachineBlock {
    /// Create a new empty block.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            insts: Vec::new(),
        }
    }

    /// Create a block from a list of instructions.
    pub fn with_insts(label: impl Into<String>, insts: Vec<MachineInst>) -> Self {
        Self { label: label.into(), insts }
    }

    /// Add an instruction to the block.
    pub fn push(&mut self, inst: MachineInst) {
        self.insts.push(inst);
    }

    /// Get the terminator instruction (last instruction if it's a terminator).
    pub fn terminator(&self) -> Option<&MachineInst> {
        self.insts.last().filter(|inst| inst.is_terminator())
    }

    /// Check if this block has a terminator.
    pub fn has_terminator(&self) -> bool {
        self.terminator().is_some()
    }

    /// Is this block empty?
    pub fn is_empty(&self) -> bool {
        self.insts.is_empty()
    }

    /// Number of instructions.
    pub fn len(&self) -> usize {
        self.insts.len()
    }
}

impl fmt::Display for MachineBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:", self.label)?;
        for inst in &self.insts {
            writeln!(f, "    {}", inst)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::VReg;

    #[test]
    fn test_block_basic() {
        let mut block = MachineBlock::new("entry");
        assert!(block.is_empty());

        block.push(MachineInst::add(VReg(0), VReg(1), VReg(2)));
        assert_eq!(block.len(), 1);
        assert!(!block.has_terminator());

        block.push(MachineInst::ret());
        assert!(block.has_terminator());
    }
}
