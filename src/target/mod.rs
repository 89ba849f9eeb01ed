//! Target description for ZKIR.
//!
//! This module defines the pieces of the ZKIR target the register
//! allocator needs:
//! - Register definitions, ABI names and the calling convention
//! - Spill slot layout

pub mod config;
pub mod registers;

pub use config::{ConfigError, TargetConfig};
pub use registers::{
    ParseRegisterError, Register, ABI_NAMES, ALLOCATABLE, ALL_REGISTERS, ARG_REGS, CALLER_SAVED,
    RET_REGS,
};
