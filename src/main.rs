//! ZKIR register liveness CLI
//!
//! Reads a machine function (JSON) and prints its liveness, its conflict
//! data or the final code after a register substitution.
//!
//! # Usage
//!
//! ```bash
//! # Annotated code with births, deaths and live-in sets
//! zkir-regalloc func.json
//!
//! # Conflict cliques for an allocator
//! zkir-regalloc func.json --emit conflicts
//!
//! # Apply an allocation and materialise spill code
//! zkir-regalloc func.json --emit final --subst alloc.json
//! ```

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::collections::HashMap;
use std::path::PathBuf;
use zkir_regalloc::regalloc::{self, Options};
use zkir_regalloc::TargetConfig;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EmitType {
    /// Annotated code with liveness (default)
    Liveness,
    /// Conflict cliques and interference edges
    Conflicts,
    /// Move candidates, including spill/reload pairs
    Moves,
    /// Code after substitution and spill materialisation
    Final,
}

#[derive(Parser, Debug)]
#[command(
    name = "zkir-regalloc",
    version,
    about = "Register liveness, conflicts and spill coalescing for ZKIR machine code",
    long_about = r#"
ZKIR register liveness

Analyses a machine function given as JSON:

  {"name": "f", "entry": "start", "blocks": [{"label": "start", "insts": [...]}]}

PRESETS (spill slot layout, used by --emit final):
  --preset default   4-byte slots off sp
  --preset wide      8-byte slots off sp
  --preset fp        4-byte slots off fp
"#
)]
struct Args {
    /// Input machine function (.json)
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output file path
    #[arg(short, long, value_name = "OUTPUT")]
    output: Option<PathBuf>,

    /// Output type
    #[arg(long, value_enum, default_value = "liveness")]
    emit: EmitType,

    /// Register substitution (JSON object of register names) for --emit final
    #[arg(long, value_name = "FILE")]
    subst: Option<PathBuf>,

    /// Spill slot layout preset
    #[arg(long, value_name = "NAME", default_value = "default")]
    preset: String,

    /// Skip the SCC order check
    #[arg(long)]
    no_verify: bool,

    /// Skip spill-reload coalescing
    #[arg(long)]
    no_coalesce: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    if args.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    }

    let config = TargetConfig::preset(&args.preset).ok_or_else(|| {
        anyhow::anyhow!(
            "Unknown preset '{}'. Available presets: {}",
            args.preset,
            TargetConfig::preset_names().join(", ")
        )
    })?;

    let options = Options {
        verify_order: !args.no_verify,
        coalesce_spills: !args.no_coalesce,
    };

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }
    let func = zkir_regalloc::load_function(&args.input)?;

    let analysis = regalloc::analyze_function(&func, options)
        .with_context(|| format!("Failed to analyse {}", args.input.display()))?;
    let mut stats = analysis.stats.clone();

    let text = match args.emit {
        EmitType::Liveness => analysis.function.to_string(),

        EmitType::Conflicts => {
            let conflicts = analysis
                .conflicts
                .as_ref()
                .context("conflicts are not available for code that already holds spill code")?;
            let mut text = String::new();
            for clique in &conflicts.cliques {
                let regs: Vec<String> = clique.iter().map(|r| r.to_string()).collect();
                text.push_str(&format!("{{{}}}\n", regs.join(", ")));
            }
            text.push_str("# interference edges\n");
            for (a, b) in conflicts.interference_edges() {
                text.push_str(&format!("{} -- {}\n", a, b));
            }
            text
        }

        EmitType::Moves => {
            let mut text = String::new();
            for (src, dst) in analysis.all_moves() {
                text.push_str(&format!("{} -> {}\n", src, dst));
            }
            text
        }

        EmitType::Final => {
            let subst = match &args.subst {
                Some(path) => {
                    let json = std::fs::read_to_string(path)
                        .with_context(|| format!("Failed to read {}", path.display()))?;
                    zkir_regalloc::parse_substitution(&json)?
                }
                None => HashMap::new(),
            };
            let finished =
                regalloc::finalize_function(&config, analysis.function, &subst, &mut stats)?;
            finished.to_string()
        }
    };

    if let Some(output) = &args.output {
        std::fs::write(output, &text)
            .with_context(|| format!("Failed to write {}", output.display()))?;
    } else {
        print!("{}", text);
    }

    if args.verbose {
        stats.display();
    }

    Ok(())
}
