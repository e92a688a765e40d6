//! FullCircle compiler CLI.
//!
//! Compiles `.fc` sources to bytecode, runs them on the built-in VM, and
//! renders bytecode listings.

use clap::{CommandFactory, Parser as ClapParser, Subcommand};
use clap_complete::{Shell, generate};
use fc_core::Instr;
use fc_vm::DEFAULT_STACK_SIZE;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process;

#[derive(ClapParser)]
#[command(name = "fcc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "FullCircle compiler - compile and run .fc programs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a .fc file to a bytecode file
    Build {
        /// Input .fc source file
        input: PathBuf,

        /// Output bytecode path (defaults to the input with a .fcb
        /// extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Compile (or load) a program and execute it
    Run {
        /// Input .fc source file or .fcb bytecode file
        input: PathBuf,

        /// Stack arena size in bytes
        #[arg(long, default_value_t = DEFAULT_STACK_SIZE)]
        stack_size: usize,
    },

    /// Print the linked bytecode of a program
    Emit {
        /// Input .fc source file
        input: PathBuf,

        /// Emit the listing as JSON instead of mnemonics
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { input, output } => {
            let output = output.unwrap_or_else(|| input.with_extension("fcb"));
            run_build(&input, &output);
        }
        Commands::Run { input, stack_size } => {
            run_program(&input, stack_size);
        }
        Commands::Emit { input, json } => {
            run_emit(&input, json);
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "fcc", &mut io::stdout());
        }
    }
}

fn fail(error: impl std::fmt::Display) -> ! {
    eprintln!("Error: {}", error);
    process::exit(1);
}

fn compile_file(input: &Path) -> Vec<Instr> {
    let source = match fs::read_to_string(input) {
        Ok(source) => source,
        Err(e) => fail(format_args!("reading {}: {}", input.display(), e)),
    };
    match fcc::compile_source(&source) {
        Ok(code) => code,
        Err(e) => fail(format_args!("{}: {}", input.display(), e)),
    }
}

/// Load a program: `.fcb` files deserialize directly, anything else is
/// compiled as source.
fn load_program(input: &Path) -> Vec<Instr> {
    if input.extension().is_some_and(|ext| ext == "fcb") {
        let bytes = match fs::read(input) {
            Ok(bytes) => bytes,
            Err(e) => fail(format_args!("reading {}: {}", input.display(), e)),
        };
        match bincode::deserialize(&bytes) {
            Ok(code) => code,
            Err(e) => fail(format_args!("{}: invalid bytecode: {}", input.display(), e)),
        }
    } else {
        compile_file(input)
    }
}

fn run_build(input: &Path, output: &Path) {
    let code = compile_file(input);
    let bytes = match bincode::serialize(&code) {
        Ok(bytes) => bytes,
        Err(e) => fail(e),
    };
    if let Err(e) = fs::write(output, bytes) {
        fail(format_args!("writing {}: {}", output.display(), e));
    }
    println!("Compiled {} -> {}", input.display(), output.display());
}

fn run_program(input: &Path, stack_size: usize) {
    let code = load_program(input);
    if let Err(e) = fc_vm::run(&code, stack_size) {
        fail(e);
    }
}

fn run_emit(input: &Path, json: bool) {
    let code = compile_file(input);
    if json {
        match serde_json::to_string_pretty(&code) {
            Ok(text) => println!("{}", text),
            Err(e) => fail(e),
        }
    } else {
        for (index, instr) in code.iter().enumerate() {
            println!("{:>4}  {}", index, instr);
        }
    }
}
