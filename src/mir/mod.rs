//! Machine IR (MIR) for ZKIR.
//!
//! The register allocator works on this representation. Registers are
//! virtual until the allocator's substitution maps them to physical ones.
//!
//! # Structure
//!
//! ```text
//! MachineFunction
//! └── MachineBlocks
//!     └── MachineInsts
//! ```

mod arch;
mod block;
mod function;
mod instruction;
mod value;

pub use block::MachineBlock;
pub use function::{FunctionError, MachineFunction};
pub use instruction::{MachineInst, Opcode, Operand};
pub use value::{Reg, VReg};
