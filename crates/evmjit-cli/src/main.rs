#![allow(missing_docs)]

use alloy_primitives::hex;
use clap::{ArgAction, Args, Parser, Subcommand};
use color_eyre::{eyre::WrapErr, Result};
use evmjit::{
    format_bytecode, DummyExt, EvmCompiler, ExecutionEngine, ExecutionEnv, OptimizationLevel,
    ThreadedBackend,
};
use evmjit_cli::read_code;
use std::path::PathBuf;

#[derive(Parser)]
#[command(version, about = "Compile and run EVM bytecode")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,

    /// Increase logging verbosity. Ignored when `RUST_LOG` is set.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Cmd {
    /// Print the decoded instructions.
    Disasm(CodeArgs),
    /// Translate the code and print the linked IR.
    Compile {
        #[command(flatten)]
        code: CodeArgs,
        #[command(flatten)]
        compiler: CompilerArgs,
        /// Dump the bytecode, IR and control-flow graph to this directory.
        #[arg(short = 'o', long, visible_alias = "out-dir")]
        dump: Option<PathBuf>,
    },
    /// Compile the code and execute it against an in-memory host.
    Run {
        #[command(flatten)]
        code: CodeArgs,
        #[command(flatten)]
        compiler: CompilerArgs,
        #[arg(long, default_value = "1000000")]
        gas_limit: u64,
        /// Hex encoded call data.
        #[arg(long)]
        calldata: Option<String>,
    },
}

#[derive(Args)]
struct CodeArgs {
    /// Code as hex or mnemonics.
    #[arg(long, required_unless_present = "code_path")]
    code: Option<String>,
    /// Path to a `.hex`, `.bin` or `.evm` file.
    #[arg(long, conflicts_with = "code")]
    code_path: Option<PathBuf>,
}

impl CodeArgs {
    fn read(&self) -> Result<Vec<u8>> {
        read_code(self.code.as_deref(), self.code_path.as_deref())
    }
}

#[derive(Args)]
struct CompilerArgs {
    #[arg(short = 'O', long, default_value = "3")]
    opt_level: OptimizationLevel,
    #[arg(long)]
    no_gas: bool,
    #[arg(long)]
    no_stack_checks: bool,
    /// Name of the compiled function.
    #[arg(long)]
    name: Option<String>,
}

impl CompilerArgs {
    fn compiler(&self) -> EvmCompiler<ThreadedBackend> {
        let mut compiler = EvmCompiler::new(ThreadedBackend::new(self.opt_level));
        compiler.gas_metering(!self.no_gas);
        compiler.stack_checks(!self.no_stack_checks);
        compiler
    }
}

fn main() -> Result<()> {
    if std::env::var_os("RUST_BACKTRACE").is_none() {
        std::env::set_var("RUST_BACKTRACE", "1");
    }
    let _ = color_eyre::install();

    let cli = Cli::parse();
    let _ = init_tracing_subscriber(cli.verbose);

    match cli.cmd {
        Cmd::Disasm(code) => {
            let code = code.read()?;
            print!("{}", format_bytecode(&code));
        }
        Cmd::Compile { code, compiler: args, dump } => {
            let code = code.read()?;
            let mut compiler = args.compiler();
            compiler.set_dump_to(dump);
            let module = compiler.translate(args.name.as_deref(), &code)?;
            print!("{module}");
            if let Some(out_dir) = compiler.out_dir() {
                // Also dumps the lowered backend program.
                let out_dir = out_dir.to_path_buf();
                compiler.jit(Some(&module.name), &code)?;
                eprintln!("Dumped {} to {}", module.name, out_dir.display());
            }
        }
        Cmd::Run { code, compiler: args, gas_limit, calldata } => {
            let code = code.read()?;
            let calldata = match calldata {
                Some(calldata) => hex::decode(calldata).wrap_err("invalid calldata")?,
                None => Vec::new(),
            };
            let module = args.compiler().translate(args.name.as_deref(), &code)?;
            tracing::debug!(code_len = code.len(), calldata_len = calldata.len(), "running");

            let mut ext = DummyExt::new(code).with_call_data(calldata);
            let mut engine = ExecutionEngine::new(ThreadedBackend::new(args.opt_level));
            let outcome = engine.run(&module, ExecutionEnv::new(gas_limit, &mut ext))?;

            println!("result:       {}", outcome.result);
            println!("gas used:     {}", outcome.gas_used());
            println!("gas refunded: {}", outcome.gas_refunded);
            println!("memory size:  {}", outcome.memory_size);
            println!("output:       {}", hex::encode_prefixed(&outcome.output));
            for (i, log) in ext.logs.iter().enumerate() {
                println!("log {i}:        {log:?}");
            }
            for (key, value) in &ext.storage {
                println!("storage:      {key} = {value}");
            }
        }
    }

    Ok(())
}

fn init_tracing_subscriber(verbose: u8) -> Result<(), tracing_subscriber::util::TryInitError> {
    use tracing_subscriber::{prelude::*, EnvFilter};
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        })
    });
    tracing_subscriber::Registry::default()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
}
