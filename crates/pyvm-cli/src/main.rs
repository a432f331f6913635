//! pyvm - CLI
//!
//! Command-line driver: disassemble or run a code object stored as JSON.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use pyvm_core::bytecode::disassembler::listing;
use pyvm_core::{VirtualMachine, VmConfig};
use pyvm_host::builtins;

#[derive(Parser, Debug)]
#[command(name = "pyvm")]
#[command(about = "Disassemble and run CPython 3.12 code objects")]
struct Cli {
    /// TOML file overriding the VM configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the listing of a code object
    Dis {
        path: PathBuf,

        /// Also list code objects found in the constant pool
        #[arg(long)]
        recursive: bool,
    },

    /// Execute a code object and dump the resulting globals
    Run {
        path: PathBuf,

        /// Print every executed instruction
        #[arg(long)]
        trace: bool,

        /// Include builtins in the globals dump
        #[arg(long)]
        all_globals: bool,
    },
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,pyvm=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> VmConfig {
    let Some(path) = path else {
        return VmConfig::default();
    };
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            error!("failed to read config {}: {}", path.display(), e);
            process::exit(1);
        }
    };
    match toml::from_str(&text) {
        Ok(config) => {
            info!("loaded config from {}", path.display());
            config
        }
        Err(e) => {
            error!("invalid config {}: {}", path.display(), e);
            process::exit(1);
        }
    }
}

fn main() {
    init_logging();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref());

    match cli.command {
        Command::Dis { path, recursive } => dis(config, &path, recursive),
        Command::Run {
            path,
            trace,
            all_globals,
        } => run(config, &path, trace, all_globals),
    }
}

fn dis(config: VmConfig, path: &Path, recursive: bool) {
    let code = match pyvm_host::load_path(path, &config.operand_extensions) {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };
    match listing(&code, &config.operand_extensions, recursive) {
        Ok(text) => print!("{}", text),
        Err(e) => {
            error!("disassembly failed: {}", e);
            process::exit(1);
        }
    }
}

fn run(mut config: VmConfig, path: &Path, trace: bool, all_globals: bool) {
    let code = match pyvm_host::load_path(path, &config.operand_extensions) {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };

    // Entries are printed as they happen; the VM buffers nothing.
    let stream_trace = std::mem::take(&mut config.record_trace) || trace;

    let builtins = builtins::standard();
    let mut vm = VirtualMachine::with_builtins(config, code, &builtins);
    if stream_trace {
        vm.set_trace_sink(|entry| println!("{}", entry));
    }
    info!("executing {}", path.display());

    if let Err(e) = vm.execute() {
        error!(
            "runtime error in {} at offset {}: {}",
            vm.code().name(),
            vm.ip(),
            e
        );
        process::exit(1);
    }

    println!("Global Variables:");
    let globals = vm.globals();
    for (name, value) in globals.borrow().iter() {
        if all_globals || !builtins.provides(name, value) {
            println!("  {} = {}", name, value.repr());
        }
    }
}
