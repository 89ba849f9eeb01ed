//! Register liveness for the ZKIR backend.
//!
//! This crate computes per-instruction register liveness over a function's
//! machine-level control flow graph and uses it to:
//! - build the conflict cliques and move candidates a graph-colouring
//!   register allocator needs,
//! - suggest coalescing spilled and reloaded registers,
//! - rename registers once the allocator has decided, and
//! - turn spill pseudo-ops into real loads and stores.

pub mod mir;
pub mod regalloc;
pub mod stats;
pub mod target;

pub use mir::{MachineFunction, MachineInst, Reg, VReg};
pub use regalloc::{analyze_function, finalize_function, Analysis, Options};
pub use stats::RegallocStats;
pub use target::{Register, TargetConfig};

use anyhow::{bail, Context, Result};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::path::Path;

/// Load a machine function from a JSON file.
pub fn load_function(path: &Path) -> Result<MachineFunction> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let func: MachineFunction = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse machine function in {}", path.display()))?;
    log::debug!(
        "loaded '{}': {} blocks, {} instructions",
        func.name,
        func.blocks.len(),
        func.num_insts()
    );
    Ok(func)
}

/// Parse a register substitution: a JSON object mapping register names to
/// register names, e.g. `{"v0": "a0", "v1": "r10"}`.
///
/// Virtual registers may only be mapped onto allocatable registers.
pub fn parse_substitution(json: &str) -> Result<HashMap<Reg, Reg>> {
    let raw: IndexMap<String, String> = serde_json::from_str(json)
        .context("substitution must be a JSON object of register names")?;

    raw.iter()
        .map(|(from, to)| {
            let from: Reg = from
                .parse()
                .with_context(|| format!("bad register '{}' in substitution", from))?;
            let to: Reg = to
                .parse()
                .with_context(|| format!("bad register '{}' in substitution", to))?;
            if let (Reg::Virtual(_), Reg::Physical(phys)) = (from, to) {
                if !phys.is_allocatable() {
                    bail!("{} cannot be assigned to reserved register {}", from, to);
                }
            }
            Ok((from, to))
        })
        .collect()
}
