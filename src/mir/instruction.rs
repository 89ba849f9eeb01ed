//! Machine instructions for ZKIR.
//!
//! This is the instruction set the register allocator sees: real ZKIR
//! operations plus a handful of compiler-internal pseudo-operations.
//!
//! ## Pseudo-Operations
//!
//! - **MOV** (0xF0): Register-to-register move (lowered to ADDI rd, rs, 0)
//! - **LI** (0xF1): Load immediate (lowered to ADDI or LUI+ADDI)
//! - **NOP** (0xF2): No operation (lowered to ADDI zero, zero, 0)
//! - **RET** (0xF3): Return from function (lowered to JALR zero, ra, 0)
//! - **CALL** (0xF4): Function call (lowered to JAL ra, offset)
//! - **COMMENT** (0xF9): Annotation for listings, emits nothing
//! - **DELTA** (0xFA): Records that the stack frame is now `imm` bytes deep
//!
//! COMMENT and DELTA are meta instructions: they touch no registers and
//! never receive a liveness record.

use super::value::Reg;
use crate::target::{Register, ARG_REGS, CALLER_SAVED, RET_REGS};
use serde::{Deserialize, Serialize};
use std::fmt;

/// ZKIR opcodes. Real opcodes keep their ZKIR encoding values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    // ========== Arithmetic ==========
    /// ADD: rd = rs1 + rs2
    ADD = 0x00,
    /// SUB: rd = rs1 - rs2
    SUB = 0x01,
    /// MUL: rd = (rs1 * rs2) lower bits
    MUL = 0x02,
    /// DIVU: rd = rs1 / rs2 (unsigned)
    DIVU = 0x04,
    /// REMU: rd = rs1 % rs2 (unsigned)
    REMU = 0x05,
    /// ADDI: rd = rs1 + imm
    ADDI = 0x08,

    // ========== Logical ==========
    AND = 0x10,
    OR = 0x11,
    XOR = 0x12,
    ANDI = 0x13,
    ORI = 0x14,
    XORI = 0x15,

    // ========== Shift ==========
    SLL = 0x18,
    SRL = 0x19,
    SLLI = 0x1B,
    SRLI = 0x1C,

    // ========== Compare ==========
    SLTU = 0x20,
    SLT = 0x22,
    SEQ = 0x24,
    SNE = 0x25,

    // ========== Load ==========
    /// LW: rd = mem[rs1 + imm][31:0]
    LW = 0x34,
    /// LD: rd = mem[rs1 + imm][59:0]
    LD = 0x35,

    // ========== Store ==========
    /// SW: mem[rs1 + imm][31:0] = rs2[31:0]
    SW = 0x3A,
    /// SD: mem[rs1 + imm][59:0] = rs2[59:0]
    SD = 0x3B,

    // ========== Branch ==========
    BEQ = 0x40,
    BNE = 0x41,
    BLT = 0x42,
    BGE = 0x43,
    BLTU = 0x44,
    BGEU = 0x45,

    // ========== Jump ==========
    /// JAL: rd = PC + 4; PC += offset
    JAL = 0x48,
    /// JALR: rd = PC + 4; PC = (rs1 + imm) & ~1
    JALR = 0x49,

    // ========== System ==========
    ECALL = 0x50,
    EBREAK = 0x51,

    // ========== Pseudo-ops (0xF0+) ==========
    MOV = 0xF0,
    LI = 0xF1,
    NOP = 0xF2,
    RET = 0xF3,
    CALL = 0xF4,
    COMMENT = 0xF9,
    DELTA = 0xFA,
}

impl Opcode {
    /// Is this a conditional branch?
    pub fn is_branch(self) -> bool {
        matches!(self, Opcode::BEQ | Opcode::BNE | Opcode::BLT |
                      Opcode::BGE | Opcode::BLTU | Opcode::BGEU)
    }

    /// Is this a terminator instruction?
    pub fn is_terminator(self) -> bool {
        self.is_branch() || matches!(self, Opcode::JAL | Opcode::JALR |
                                          Opcode::RET | Opcode::EBREAK)
    }

    /// Does this instruction exist only for the compiler's benefit?
    pub fn is_meta(self) -> bool {
        matches!(self, Opcode::COMMENT | Opcode::DELTA)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Opcode::ADD => "add",
            Opcode::SUB => "sub",
            Opcode::MUL => "mul",
            Opcode::DIVU => "divu",
            Opcode::REMU => "remu",
            Opcode::ADDI => "addi",
            Opcode::AND => "and",
            Opcode::OR => "or",
            Opcode::XOR => "xor",
            Opcode::ANDI => "andi",
            Opcode::ORI => "ori",
            Opcode::XORI => "xori",
            Opcode::SLL => "sll",
            Opcode::SRL => "srl",
            Opcode::SLLI => "slli",
            Opcode::SRLI => "srli",
            Opcode::SLTU => "sltu",
            Opcode::SLT => "slt",
            Opcode::SEQ => "seq",
            Opcode::SNE => "sne",
            Opcode::LW => "lw",
            Opcode::LD => "ld",
            Opcode::SW => "sw",
            Opcode::SD => "sd",
            Opcode::BEQ => "beq",
            Opcode::BNE => "bne",
            Opcode::BLT => "blt",
            Opcode::BGE => "bge",
            Opcode::BLTU => "bltu",
            Opcode::BGEU => "bgeu",
            Opcode::JAL => "jal",
            Opcode::JALR => "jalr",
            Opcode::ECALL => "ecall",
            Opcode::EBREAK => "ebreak",
            Opcode::MOV => "mov",
            Opcode::LI => "li",
            Opcode::NOP => "nop",
            Opcode::RET => "ret",
            Opcode::CALL => "call",
            Opcode::COMMENT => "comment",
            Opcode::DELTA => "delta",
        };
        write!(f, "{}", name)
    }
}

/// An operand for a machine instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operand {
    /// Register, virtual or physical
    Reg(Reg),
    /// Immediate value
    Imm(i64),
    /// Label (block name or function name)
    Label(String),
    /// Memory operand: base register + offset
    Mem { base: Reg, offset: i32 },
}

impl Operand {
    /// Get as register if applicable.
    pub fn as_reg(&self) -> Option<Reg> {
        match self {
            Operand::Reg(r) => Some(*r),
            _ => None,
        }
    }

    /// Get as immediate if applicable.
    pub fn as_imm(&self) -> Option<i64> {
        match self {
            Operand::Imm(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as label if applicable.
    pub fn as_label(&self) -> Option<&str> {
        match self {
            Operand::Label(l) => Some(l),
            _ => None,
        }
    }

    /// The register this operand reads or writes, if any.
    fn reg(&self) -> Option<Reg> {
        match self {
            Operand::Reg(r) | Operand::Mem { base: r, .. } => Some(*r),
            Operand::Imm(_) | Operand::Label(_) => None,
        }
    }

    fn map_reg(&self, f: &dyn Fn(Reg) -> Reg) -> Operand {
        match self {
            Operand::Reg(r) => Operand::Reg(f(*r)),
            Operand::Mem { base, offset } => Operand::Mem { base: f(*base), offset: *offset },
            other => other.clone(),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Reg(r) => write!(f, "{}", r),
            Operand::Imm(i) => write!(f, "{}", i),
            Operand::Label(l) => write!(f, "{}", l),
            Operand::Mem { base, offset } => write!(f, "{}({})", offset, base),
        }
    }
}

/// A machine instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineInst {
    /// Opcode
    pub opcode: Opcode,
    /// Destination operand (if any)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst: Option<Operand>,
    /// Source operands
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub srcs: Vec<Operand>,
    /// Comment for debugging (the text of a COMMENT instruction)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl MachineInst {
    /// Create a new instruction.
    pub fn new(opcode: Opcode) -> Self {
        Self {
            opcode,
            dst: None,
            srcs: Vec::new(),
            comment: None,
        }
    }

    /// Set the destination.
    pub fn dst(mut self, dst: Operand) -> Self {
        self.dst = Some(dst);
        self
    }

    /// Add a source operand.
    pub fn src(mut self, src: Operand) -> Self {
        self.srcs.push(src);
        self
    }

    /// Attach a comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    fn rrr(opcode: Opcode, rd: impl Into<Reg>, rs1: impl Into<Reg>, rs2: impl Into<Reg>) -> Self {
        Self::new(opcode)
            .dst(Operand::Reg(rd.into()))
            .src(Operand::Reg(rs1.into()))
            .src(Operand::Reg(rs2.into()))
    }

    fn branch(
        opcode: Opcode,
        rs1: impl Into<Reg>,
        rs2: impl Into<Reg>,
        label: impl Into<String>,
    ) -> Self {
        Self::new(opcode)
            .src(Operand::Reg(rs1.into()))
            .src(Operand::Reg(rs2.into()))
            .src(Operand::Label(label.into()))
    }

    /// Create ADD rd, rs1, rs2
    pub fn add(rd: impl Into<Reg>, rs1: impl Into<Reg>, rs2: impl Into<Reg>) -> Self {
        Self::rrr(Opcode::ADD, rd, rs1, rs2)
    }

    /// Create SUB rd, rs1, rs2
    pub fn sub(rd: impl Into<Reg>, rs1: impl Into<Reg>, rs2: impl Into<Reg>) -> Self {
        Self::rrr(Opcode::SUB, rd, rs1, rs2)
    }

    /// Create MUL rd, rs1, rs2
    pub fn mul(rd: impl Into<Reg>, rs1: impl Into<Reg>, rs2: impl Into<Reg>) -> Self {
        Self::rrr(Opcode::MUL, rd, rs1, rs2)
    }

    /// Create ADDI rd, rs1, imm
    pub fn addi(rd: impl Into<Reg>, rs1: impl Into<Reg>, imm: i64) -> Self {
        Self::new(Opcode::ADDI)
            .dst(Operand::Reg(rd.into()))
            .src(Operand::Reg(rs1.into()))
            .src(Operand::Imm(imm))
    }

    /// Create MOV rd, rs (pseudo-op)
    pub fn mov(rd: impl Into<Reg>, rs: impl Into<Reg>) -> Self {
        Self::new(Opcode::MOV)
            .dst(Operand::Reg(rd.into()))
            .src(Operand::Reg(rs.into()))
    }

    /// Create LI rd, imm (pseudo-op)
    pub fn li(rd: impl Into<Reg>, imm: i64) -> Self {
        Self::new(Opcode::LI)
            .dst(Operand::Reg(rd.into()))
            .src(Operand::Imm(imm))
    }

    /// Create LW rd, offset(base)
    pub fn lw(rd: impl Into<Reg>, base: impl Into<Reg>, offset: i32) -> Self {
        Self::new(Opcode::LW)
            .dst(Operand::Reg(rd.into()))
            .src(Operand::Mem { base: base.into(), offset })
    }

    /// Create SW rs, offset(base)
    pub fn sw(rs: impl Into<Reg>, base: impl Into<Reg>, offset: i32) -> Self {
        Self::new(Opcode::SW)
            .src(Operand::Reg(rs.into()))
            .src(Operand::Mem { base: base.into(), offset })
    }

    /// Create BEQ rs1, rs2, label
    pub fn beq(rs1: impl Into<Reg>, rs2: impl Into<Reg>, label: impl Into<String>) -> Self {
        Self::branch(Opcode::BEQ, rs1, rs2, label)
    }

    /// Create BNE rs1, rs2, label
    pub fn bne(rs1: impl Into<Reg>, rs2: impl Into<Reg>, label: impl Into<String>) -> Self {
        Self::branch(Opcode::BNE, rs1, rs2, label)
    }

    /// Create BLT rs1, rs2, label
    pub fn blt(rs1: impl Into<Reg>, rs2: impl Into<Reg>, label: impl Into<String>) -> Self {
        Self::branch(Opcode::BLT, rs1, rs2, label)
    }

    /// Create JAL rd, label
    pub fn jal(rd: impl Into<Reg>, label: impl Into<String>) -> Self {
        Self::new(Opcode::JAL)
            .dst(Operand::Reg(rd.into()))
            .src(Operand::Label(label.into()))
    }

    /// Create an unconditional jump (JAL zero, label)
    pub fn j(label: impl Into<String>) -> Self {
        Self::jal(Register::ZERO, label)
    }

    /// Create CALL function (pseudo-op)
    pub fn call(function: impl Into<String>) -> Self {
        Self::new(Opcode::CALL).src(Operand::Label(function.into()))
    }

    /// Create RET (pseudo-op)
    pub fn ret() -> Self {
        Self::new(Opcode::RET)
    }

    /// Create NOP
    pub fn nop() -> Self {
        Self::new(Opcode::NOP)
    }

    /// Create a listing comment (meta)
    pub fn comment(text: impl Into<String>) -> Self {
        Self::new(Opcode::COMMENT).with_comment(text)
    }

    /// Create a frame delta marker (meta)
    pub fn delta(delta: i32) -> Self {
        Self::new(Opcode::DELTA).src(Operand::Imm(delta as i64))
    }

    /// Registers written, excluding the zero register.
    ///
    /// A call clobbers every caller-saved register.
    pub fn defs(&self) -> Vec<Reg> {
        if self.opcode == Opcode::CALL {
            return CALLER_SAVED.iter().map(|&r| Reg::Physical(r)).collect();
        }
        self.dst
            .as_ref()
            .and_then(|op| op.as_reg())
            .filter(|r| !r.is_zero())
            .into_iter()
            .collect()
    }

    /// Registers read, excluding the zero register.
    ///
    /// A return reads the return value registers and a call reads the
    /// argument registers.
    pub fn uses(&self) -> Vec<Reg> {
        let implicit: &[Register] = match self.opcode {
            Opcode::RET => &RET_REGS,
            Opcode::CALL => &ARG_REGS,
            _ => &[],
        };
        self.srcs
            .iter()
            .filter_map(Operand::reg)
            .chain(implicit.iter().map(|&r| Reg::Physical(r)))
            .filter(|r| !r.is_zero())
            .collect()
    }

    /// Labels of blocks this instruction may branch to.
    ///
    /// CALL labels name functions, not blocks, and are not included.
    pub fn branch_labels(&self) -> Vec<String> {
        if !(self.opcode.is_branch() || self.opcode == Opcode::JAL) {
            return Vec::new();
        }
        self.srcs
            .iter()
            .filter_map(|op| op.as_label().map(str::to_string))
            .collect()
    }

    /// Copy of this instruction with every register operand mapped.
    pub fn map_regs(&self, f: &dyn Fn(Reg) -> Reg) -> Self {
        Self {
            opcode: self.opcode,
            dst: self.dst.as_ref().map(|op| op.map_reg(f)),
            srcs: self.srcs.iter().map(|op| op.map_reg(f)).collect(),
            comment: self.comment.clone(),
        }
    }

    /// Is this a terminator instruction?
    pub fn is_terminator(&self) -> bool {
        self.opcode.is_terminator()
    }
}

impl fmt::Display for MachineInst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.opcode == Opcode::COMMENT {
            return write!(f, "# {}", self.comment.as_deref().unwrap_or(""));
        }

        write!(f, "{}", self.opcode)?;

        if let Some(dst) = &self.dst {
            write!(f, " {}", dst)?;
        }

        for (i, src) in self.srcs.iter().enumerate() {
            if i == 0 && self.dst.is_none() {
                write!(f, " {}", src)?;
            } else {
                write!(f, ", {}", src)?;
            }
        }

        if let Some(comment) = &self.comment {
            write!(f, "  # {}", comment)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::VReg;

    #[test]
    fn test_instruction_display() {
        let inst = MachineInst::add(VReg(0), VReg(1), VReg(2));
        assert_eq!(format!("{}", inst), "add v0, v1, v2");

        let inst = MachineInst::addi(VReg(0), VReg(1), 42);
        assert_eq!(format!("{}", inst), "addi v0, v1, 42");

        let inst = MachineInst::lw(VReg(0), Register::SP, 8);
        assert_eq!(format!("{}", inst), "lw v0, 8(r2)");

        let inst = MachineInst::sw(VReg(3), VReg(1), -4);
        assert_eq!(format!("{}", inst), "sw v3, -4(v1)");

        assert_eq!(MachineInst::comment("spill area").to_string(), "# spill area");
        assert_eq!(MachineInst::delta(-16).to_string(), "delta -16");
        assert_eq!(MachineInst::j("exit").to_string(), "jal r0, exit");
    }

    #[test]
    fn test_def_use() {
        let inst = MachineInst::add(VReg(0), VReg(1), VReg(2));
        assert_eq!(inst.defs(), vec![Reg::Virtual(VReg(0))]);
        assert_eq!(inst.uses(), vec![Reg::Virtual(VReg(1)), Reg::Virtual(VReg(2))]);

        let store = MachineInst::sw(VReg(5), Register::SP, 0);
        assert!(store.defs().is_empty());
        assert_eq!(store.uses(), vec![Reg::Virtual(VReg(5)), Reg::Physical(Register::SP)]);
    }

    #[test]
    fn test_return_reads_result_registers() {
        let ret = MachineInst::ret();
        assert!(ret.defs().is_empty());
        assert_eq!(ret.uses(), vec![Reg::Physical(Register::A0), Reg::Physical(Register::R5)]);
    }

    #[test]
    fn test_call_reads_arguments_and_clobbers_caller_saved() {
        let call = MachineInst::call("memcpy");
        let uses = call.uses();
        assert_eq!(uses.len(), ARG_REGS.len());
        assert!(uses.contains(&Reg::Physical(Register::R9)));

        let defs = call.defs();
        assert_eq!(defs.len(), CALLER_SAVED.len());
        assert!(defs.contains(&Reg::Physical(Register::RA)));
        assert!(defs.contains(&Reg::Physical(Register::R15)));
        assert!(!defs.contains(&Reg::Physical(Register::S0)));
    }

    #[test]
    fn test_zero_register_is_invisible() {
        let jump = MachineInst::j("loop");
        assert!(jump.defs().is_empty());
        let cmp = MachineInst::beq(VReg(1), Register::ZERO, "out");
        assert_eq!(cmp.uses(), vec![Reg::Virtual(VReg(1))]);
    }

    #[test]
    fn test_branch_labels() {
        assert_eq!(MachineInst::beq(VReg(1), VReg(2), "done").branch_labels(), vec!["done"]);
        assert_eq!(MachineInst::j("top").branch_labels(), vec!["top"]);
        assert!(MachineInst::call("memcpy").branch_labels().is_empty());
        assert!(MachineInst::ret().branch_labels().is_empty());
    }

    #[test]
    fn test_map_regs() {
        let inst = MachineInst::lw(VReg(1), VReg(2), 12);
        let mapped = inst.map_regs(&|r| match r {
            Reg::Virtual(VReg(n)) => Reg::Physical(Register::from_index(n as u8 + 9).unwrap()),
            other => other,
        });
        assert_eq!(mapped.to_string(), "lw r10, 12(r11)");
    }

    #[test]
    fn test_instruction_serde() {
        let inst = MachineInst::beq(VReg(1), Register::A0, "exit");
        let json = serde_json::to_string(&inst).unwrap();
        let back: MachineInst = serde_json::from_str(&json).unwrap();
        assert_eq!(back, inst);

        let json = r#"{"opcode":"MOV","dst":{"Reg":"v2"},"srcs":[{"Reg":"t0"}]}"#;
        let parsed: MachineInst = serde_json::from_str(json).unwrap();
        assert_eq!(parsed, MachineInst::mov(VReg(2), Register::T0));
    }
}
