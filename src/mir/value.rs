//! Machine registers, virtual and physical.

use crate::target::{ParseRegisterError, Register};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Virtual register identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VReg(pub u32);

impl VReg {
    /// Create a new virtual register.
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the register ID.
    pub fn id(self) -> u32 {
        self.0
    }
}

impl fmt::Display for VReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A register operand: virtual before allocation, physical after.
///
/// Serialised as its text form (`v3`, `r5`); ABI names are accepted on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Reg {
    Virtual(VReg),
    Physical(Register),
}

impl Reg {
    /// Is this the hard-wired zero register?
    pub fn is_zero(self) -> bool {
        matches!(self, Reg::Physical(r) if r.is_zero())
    }

    pub fn as_vreg(self) -> Option<VReg> {
        match self {
            Reg::Virtual(v) => Some(v),
            Reg::Physical(_) => None,
        }
    }
}

impl From<VReg> for Reg {
    fn from(v: VReg) -> Self {
        Reg::Virtual(v)
    }
}

impl From<Register> for Reg {
    fn from(r: Register) -> Self {
        Reg::Physical(r)
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reg::Virtual(v) => write!(f, "{}", v),
            Reg::Physical(r) => write!(f, "{}", r),
        }
    }
}

impl FromStr for Reg {
    type Err = ParseRegisterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(n) = s.strip_prefix('v').and_then(|n| n.parse::<u32>().ok()) {
            return Ok(Reg::Virtual(VReg(n)));
        }
        s.parse::<Register>().map(Reg::Physical)
    }
}

impl TryFrom<String> for Reg {
    type Error = ParseRegisterError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Reg> for String {
    fn from(r: Reg) -> Self {
        r.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reg_text_forms() {
        assert_eq!("v12".parse::<Reg>(), Ok(Reg::Virtual(VReg(12))));
        assert_eq!("r4".parse::<Reg>(), Ok(Reg::Physical(Register::R4)));
        assert_eq!("a0".parse::<Reg>(), Ok(Reg::Physical(Register::R4)));
        assert!("vx".parse::<Reg>().is_err());
        assert_eq!(Reg::from(VReg(3)).to_string(), "v3");
    }

    #[test]
    fn test_reg_serde_as_string() {
        let json = serde_json::to_string(&Reg::Physical(Register::SP)).unwrap();
        assert_eq!(json, "\"r2\"");
        let reg: Reg = serde_json::from_str("\"fp\"").unwrap();
        assert_eq!(reg, Reg::Physical(Register::FP));
    }

    #[test]
    fn test_virtual_sorts_before_physical() {
        assert!(Reg::Virtual(VReg(100)) < Reg::Physical(Register::R0));
        assert!(Reg::Physical(Register::R0).is_zero());
    }
}
