//! Command-line front end for the exitscope instrumenter.
//!
//! Modules travel as JSON-serialized IR. `instrument` rewrites a module
//! and writes the serialized type table next to it; `run` additionally
//! executes the rewritten module under the VM, producing the transcript.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use exitscope_compiler::InstrumentOptions;
use exitscope_ir::Module;
use exitscope_vm::Vm;

#[derive(Parser)]
#[command(name = "exitscope")]
#[command(version)]
#[command(about = "Instrument IR modules to report program state at function exits")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// The pass flags. All default off; with no region flag set, every memory
/// region is inspected.
#[derive(Args, Clone, Copy)]
struct ModeFlags {
    /// Instrument only the main function
    #[arg(long)]
    only_main: bool,
    /// Inspect the variables on the stack of functions
    #[arg(long)]
    inspect_stack: bool,
    /// Inspect the variables pointing to the heap
    #[arg(long)]
    inspect_heap: bool,
    /// Inspect the static variables
    #[arg(long)]
    inspect_static: bool,
    /// Dereference pointers (precise mode)
    #[arg(long)]
    precise: bool,
    /// Dump the entire heap at every observation point
    #[arg(long)]
    full_heap: bool,
}

impl ModeFlags {
    fn options(self) -> InstrumentOptions {
        InstrumentOptions {
            only_main: self.only_main,
            inspect_stack: self.inspect_stack,
            inspect_heap: self.inspect_heap,
            inspect_static: self.inspect_static,
            precise: self.precise,
            full_heap: self.full_heap,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Rewrite a module with observation points and write the type table
    Instrument {
        /// JSON module to instrument
        module: PathBuf,
        #[command(flatten)]
        flags: ModeFlags,
        /// Where to write the rewritten module (default:
        /// <module>.instrumented.json)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Instrument a module and execute it, producing its transcript
    Run {
        /// JSON module to instrument and execute
        module: PathBuf,
        #[command(flatten)]
        flags: ModeFlags,
        /// Directory for the type table, transcript and other outputs
        /// (default: current directory)
        #[arg(long)]
        workdir: Option<PathBuf>,
    },
}

fn load_module(path: &Path) -> Result<Module> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("cannot read module {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("cannot parse module {}", path.display()))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Instrument {
            module: path,
            flags,
            output,
        } => {
            let mut module = load_module(&path)?;
            let table_dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."))
                .to_path_buf();
            let result = exitscope_compiler::run(&mut module, &flags.options(), &table_dir)?;
            let output = output.unwrap_or_else(|| {
                let mut name = path.as_os_str().to_owned();
                name.push(".instrumented.json");
                PathBuf::from(name)
            });
            fs::write(&output, serde_json::to_string_pretty(&module)?)
                .with_context(|| format!("cannot write {}", output.display()))?;
            info!(stats = ?result.stats, "pass finished");
            println!(
                "instrumented module: {}\ntype table: {} ({} descriptors)",
                output.display(),
                result.type_table_path.display(),
                result.table_size
            );
        }
        Commands::Run {
            module: path,
            flags,
            workdir,
        } => {
            let mut module = load_module(&path)?;
            let workdir = workdir.unwrap_or_else(|| PathBuf::from("."));
            let result = exitscope_compiler::run(&mut module, &flags.options(), &workdir)?;
            info!(stats = ?result.stats, "pass finished");
            let mut vm = Vm::new(&module, &workdir)?;
            let code = vm.run()?;
            println!(
                "program exited with code {code}; transcript written under {}",
                workdir.display()
            );
        }
    }
    Ok(())
}
