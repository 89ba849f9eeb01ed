//! Register definitions for ZKIR.
//!
//! ZKIR has 16 general-purpose registers (r0-r15) with specific ABI roles.
//! `r0` is hard-wired to zero and never carries a value.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of architectural registers.
pub const NUM_REGISTERS: usize = 16;

/// A physical ZKIR register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Register {
    R0 = 0,
    R1,
    R2,
    R3,
    R4,
    R5,
    R6,
    R7,
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
    R14,
    R15,
}

impl Register {
    pub const ZERO: Register = Register::R0;
    pub const RA: Register = Register::R1;
    pub const SP: Register = Register::R2;
    pub const FP: Register = Register::R3;
    pub const A0: Register = Register::R4;
    pub const S0: Register = Register::R10;
    pub const T0: Register = Register::R14;

    /// Register number.
    #[inline]
    pub fn index(self) -> u8 {
        self as u8
    }

    /// Register from its number.
    pub fn from_index(n: u8) -> Option<Register> {
        ALL_REGISTERS.get(n as usize).copied()
    }

    /// Is this the hard-wired zero register?
    #[inline]
    pub fn is_zero(self) -> bool {
        self == Register::R0
    }

    /// Is this register allocatable for general use?
    #[inline]
    pub fn is_allocatable(self) -> bool {
        // Exclude: zero, sp, fp (reserved)
        !matches!(self, Register::R0 | Register::R2 | Register::R3)
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.index())
    }
}

/// Error returned when a register name does not parse.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown register '{0}'")]
pub struct ParseRegisterError(pub String);

impl FromStr for Register {
    type Err = ParseRegisterError;

    /// Accepts both `r<n>` and ABI names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(pos) = ABI_NAMES.iter().position(|name| *name == s) {
            return Ok(ALL_REGISTERS[pos]);
        }
        s.strip_prefix('r')
            .and_then(|n| n.parse::<u8>().ok())
            .and_then(Register::from_index)
            .ok_or_else(|| ParseRegisterError(s.to_string()))
    }
}

/// All registers in order.
pub const ALL_REGISTERS: [Register; NUM_REGISTERS] = [
    Register::R0, Register::R1, Register::R2, Register::R3,
    Register::R4, Register::R5, Register::R6, Register::R7,
    Register::R8, Register::R9, Register::R10, Register::R11,
    Register::R12, Register::R13, Register::R14, Register::R15,
];

/// ABI names, indexed by register number.
pub const ABI_NAMES: [&str; NUM_REGISTERS] = [
    "zero", // r0
    "ra",   // r1
    "sp",   // r2
    "fp",   // r3
    "a0",   // r4
    "a1",   // r5
    "a2",   // r6
    "a3",   // r7
    "a4",   // r8
    "a5",   // r9
    "s0",   // r10
    "s1",   // r11
    "s2",   // r12
    "s3",   // r13
    "t0",   // r14
    "t1",   // r15
];

/// Argument registers: a0-a5.
pub const ARG_REGS: [Register; 6] = [
    Register::R4, Register::R5, Register::R6,
    Register::R7, Register::R8, Register::R9,
];

/// Return value registers: a0-a1.
pub const RET_REGS: [Register; 2] = [Register::R4, Register::R5];

/// Registers a call may clobber: ra, a0-a5, t0-t1.
pub const CALLER_SAVED: [Register; 9] = [
    Register::RA,
    Register::R4, Register::R5, Register::R6,
    Register::R7, Register::R8, Register::R9,
    Register::R14, Register::R15,
];

/// Allocatable registers (for register allocation).
/// Excludes: zero, sp, fp
pub const ALLOCATABLE: [Register; 13] = [
    Register::R1,   // ra (caller-saved, but allocatable)
    Register::R4, Register::R5,   // a0-a1
    Register::R6, Register::R7,   // a2-a3
    Register::R8, Register::R9,   // a4-a5
    Register::R10, Register::R11, // s0-s1
    Register::R12, Register::R13, // s2-s3
    Register::R14, Register::R15, // t0-t1
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_from_index() {
        assert_eq!(Register::from_index(0), Some(Register::R0));
        assert_eq!(Register::from_index(15), Some(Register::R15));
        assert_eq!(Register::from_index(16), None);
    }

    #[test]
    fn test_abi_names() {
        assert_eq!("zero".parse::<Register>(), Ok(Register::ZERO));
        assert_eq!("ra".parse::<Register>(), Ok(Register::RA));
        assert_eq!("a0".parse::<Register>(), Ok(Register::A0));
        assert_eq!("s0".parse::<Register>(), Ok(Register::S0));
        assert_eq!("t0".parse::<Register>(), Ok(Register::T0));
    }

    #[test]
    fn test_calling_convention() {
        assert_eq!(RET_REGS, [Register::A0, Register::R5]);
        assert_eq!(ARG_REGS[0], Register::A0);
        assert!(ARG_REGS.iter().all(|r| CALLER_SAVED.contains(r)));
        assert!(CALLER_SAVED.contains(&Register::RA));
        assert!(!CALLER_SAVED.contains(&Register::S0));
        assert!(!CALLER_SAVED.contains(&Register::SP));
    }

    #[test]
    fn test_parse_register() {
        assert_eq!("r7".parse::<Register>(), Ok(Register::R7));
        assert_eq!("sp".parse::<Register>(), Ok(Register::SP));
        assert_eq!("t1".parse::<Register>(), Ok(Register::R15));
        assert!("r16".parse::<Register>().is_err());
        assert!("x1".parse::<Register>().is_err());
        assert_eq!(Register::SP.to_string(), "r2");
    }

    #[test]
    fn test_allocatable() {
        assert!(!Register::R0.is_allocatable()); // zero
        assert!(!Register::R2.is_allocatable()); // sp
        assert!(!Register::R3.is_allocatable()); // fp
        assert!(Register::R4.is_allocatable()); // a0
        assert!(ALLOCATABLE.iter().all(|r| r.is_allocatable()));
    }
}
