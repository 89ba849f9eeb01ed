//! Machine functions.

use super::block::MachineBlock;
use super::instruction::{MachineInst, Opcode};
use super::value::VReg;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A machine function.
///
/// On disk a function is `{"name", "entry"?, "statics"?, "blocks": [...]}`.
/// When `entry` is omitted the first block is the entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "FunctionRepr", into = "FunctionRepr")]
pub struct MachineFunction {
    /// Function name
    pub name: String,
    /// Basic blocks (ordered)
    pub blocks: IndexMap<String, MachineBlock>,
    /// Entry block label
    pub entry: String,
    /// Static data directives emitted alongside the function
    pub statics: Vec<String>,
    /// Next virtual register ID
    next_vreg: u32,
}

/// Errors found while loading a function.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FunctionError {
    #[error("duplicate block label '{0}'")]
    DuplicateBlock(String),

    #[error("entry block '{0}' is not defined")]
    UnknownEntry(String),

    #[error("block '{block}' has a frame delta that is not a 32-bit immediate: {inst}")]
    InvalidDelta { block: String, inst: String },
}

impl MachineFunction {
    /// Create a new function.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            blocks: IndexMap::new(),
            entry: String::new(),
            statics: Vec::new(),
            next_vreg: 0,
        }
    }

    /// Allocate a new virtual register.
    pub fn new_vreg(&mut self) -> VReg {
        let vreg = VReg::new(self.next_vreg);
        self.next_vreg += 1;
        vreg
    }

    /// Get the number of virtual registers allocated.
    pub fn num_vregs(&self) -> u32 {
        self.next_vreg
    }

    /// Add a basic block. The first block added becomes the entry.
    pub fn add_block(&mut self, block: MachineBlock) {
        if self.entry.is_empty() {
            self.entry = block.label.clone();
        }
        self.bump_vregs(&block);
        self.blocks.insert(block.label.clone(), block);
    }

    fn bump_vregs(&mut self, block: &MachineBlock) {
        for inst in &block.insts {
            for reg in inst.defs().into_iter().chain(inst.uses()) {
                if let Some(v) = reg.as_vreg() {
                    self.next_vreg = self.next_vreg.max(v.id() + 1);
                }
            }
        }
    }

    /// Get a block by label.
    pub fn get_block(&self, label: &str) -> Option<&MachineBlock> {
        self.blocks.get(label)
    }

    /// Iterate over all blocks.
    pub fn iter_blocks(&self) -> impl Iterator<Item = &MachineBlock> {
        self.blocks.values()
    }

    /// Get block labels in order.
    pub fn block_labels(&self) -> Vec<&str> {
        self.blocks.keys().map(|s| s.as_str()).collect()
    }

    /// Total number of instructions.
    pub fn num_insts(&self) -> usize {
        self.blocks.values().map(|b| b.len()).sum()
    }

    /// Iterate over every instruction in block order.
    pub fn iter_insts(&self) -> impl Iterator<Item = &MachineInst> {
        self.blocks.values().flat_map(|b| b.insts.iter())
    }
}

impl fmt::Display for MachineFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for directive in &self.statics {
            writeln!(f, "{}", directive)?;
        }
        writeln!(f, "function {}:", self.name)?;
        writeln!(f, "  ; {} vregs, entry: {}", self.next_vreg, self.entry)?;

        for block in self.blocks.values() {
            writeln!(f)?;
            write!(f, "{}", block)?;
        }

        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct FunctionRepr {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    entry: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    statics: Vec<String>,
    blocks: Vec<MachineBlock>,
}

impl TryFrom<FunctionRepr> for MachineFunction {
    type Error = FunctionError;

    fn try_from(repr: FunctionRepr) -> Result<Self, Self::Error> {
        let mut func = MachineFunction::new(repr.name);
        func.statics = repr.statics;
        for block in repr.blocks {
            if func.blocks.contains_key(&block.label) {
                return Err(FunctionError::DuplicateBlock(block.label));
            }
            if let Some(bad) = block.insts.iter().find(|i| !is_valid_delta(i)) {
                return Err(FunctionError::InvalidDelta {
                    block: block.label.clone(),
                    inst: bad.to_string(),
                });
            }
            func.add_block(block);
        }
        if let Some(entry) = repr.entry {
            if !func.blocks.contains_key(&entry) {
                return Err(FunctionError::UnknownEntry(entry));
            }
            func.entry = entry;
        }
        Ok(func)
    }
}

/// Anything but a delta marker passes; a marker needs one immediate that
/// fits in 32 bits.
fn is_valid_delta(inst: &MachineInst) -> bool {
    if inst.opcode != Opcode::DELTA {
        return true;
    }
    match inst.srcs.as_slice() {
        [src] => src.as_imm().is_some_and(|imm| i32::try_from(imm).is_ok()),
        _ => false,
    }
}

impl From<MachineFunction> for FunctionRepr {
    fn from(func: MachineFunction) -> Self {
        FunctionRepr {
            name: func.name,
            entry: (!func.entry.is_empty()).then_some(func.entry),
            statics: func.statics,
            blocks: func.blocks.into_values().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::Operand;

    #[test]
    fn test_function_basic() {
        let mut func = MachineFunction::new("test");

        let v0 = func.new_vreg();
        let v1 = func.new_vreg();
        assert_eq!(v0.id(), 0);
        assert_eq!(v1.id(), 1);
        assert_eq!(func.num_vregs(), 2);

        let mut entry = MachineBlock::new("entry");
        entry.push(MachineInst::add(v0, v0, v1));
        entry.push(MachineInst::ret());
        func.add_block(entry);

        assert_eq!(func.entry, "entry");
        assert!(func.get_block("entry").is_some());
        assert_eq!(func.num_insts(), 2);
    }

    #[test]
    fn test_vreg_counter_follows_blocks() {
        let mut func = MachineFunction::new("f");
        func.add_block(MachineBlock::with_insts("b", vec![MachineInst::li(VReg(41), 0)]));
        assert_eq!(func.new_vreg(), VReg(42));
    }

    #[test]
    fn test_load_from_json() {
        let json = r#"{
            "name": "f",
            "entry": "start",
            "statics": [".align 4"],
            "blocks": [
                {"label": "exit", "insts": [{"opcode": "RET"}]},
                {"label": "start", "insts": [
                    {"opcode": "LI", "dst": {"Reg": "v3"}, "srcs": [{"Imm": 1}]},
                    {"opcode": "JAL", "dst": {"Reg": "zero"}, "srcs": [{"Label": "exit"}]}
                ]}
            ]
        }"#;
        let func: MachineFunction = serde_json::from_str(json).unwrap();
        assert_eq!(func.entry, "start");
        assert_eq!(func.block_labels(), vec!["exit", "start"]);
        assert_eq!(func.statics, vec![".align 4".to_string()]);
        assert_eq!(func.num_vregs(), 4);
    }

    #[test]
    fn test_load_rejects_bad_functions() {
        let dup = r#"{"name": "f", "blocks": [{"label": "a"}, {"label": "a"}]}"#;
        assert!(serde_json::from_str::<MachineFunction>(dup).is_err());

        let entry = r#"{"name": "f", "entry": "nope", "blocks": [{"label": "a"}]}"#;
        assert!(serde_json::from_str::<MachineFunction>(entry).is_err());
    }

    #[test]
    fn test_load_rejects_oversized_delta() {
        let repr = |imm: i64| FunctionRepr {
            name: "f".to_string(),
            entry: None,
            statics: Vec::new(),
            blocks: vec![MachineBlock::with_insts(
                "a",
                vec![MachineInst::new(Opcode::DELTA).src(Operand::Imm(imm)), MachineInst::ret()],
            )],
        };

        let err = MachineFunction::try_from(repr(1 << 40)).unwrap_err();
        assert!(matches!(err, FunctionError::InvalidDelta { ref block, .. } if block == "a"));
        assert!(MachineFunction::try_from(repr(i64::from(i32::MIN))).is_ok());

        let json = r#"{"name": "f", "blocks": [{"label": "a", "insts": [
            {"opcode": "DELTA", "srcs": [{"Imm": 4294967296}]}
        ]}]}"#;
        assert!(serde_json::from_str::<MachineFunction>(json).is_err());

        let missing = r#"{"name": "f", "blocks": [
            {"label": "a", "insts": [{"opcode": "DELTA"}]}
        ]}"#;
        assert!(serde_json::from_str::<MachineFunction>(missing).is_err());
    }
}
