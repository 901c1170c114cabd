//! The assembler driver: source file in, binary (and optional debug
//! sidecar) out, or a direct run with `-r`.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::process::exit;

use anyhow::{Context, Result};
use clap::Parser;

use birdie::assembler::assemble;
use birdie::bytecode::disassemble;
use birdie::machine::Machine;

#[derive(Parser)]
#[command(name = "birdie-as", about = "Assembler for the birdie CPU", version)]
struct Args {
  /// Source file
  file: PathBuf,

  /// Output binary (defaults to the source path with extension `bin`)
  #[arg(short = 'o', value_name = "FILE")]
  output: Option<PathBuf>,

  /// Debug sidecar (defaults to the source path with extension `dbg`)
  #[arg(short = 'd', value_name = "FILE")]
  debug: Option<PathBuf>,

  /// Print a disassembly of the encoded instruction stream
  #[arg(long)]
  dump: bool,

  /// Don't produce a binary, run the program directly
  #[arg(short = 'r', long)]
  run: bool,
}

fn main() -> Result<()> {
  env_logger::init();
  let args = Args::parse();

  let source = fs::read_to_string(&args.file)
    .with_context(|| format!("cannot read {}", args.file.display()))?;
  let program = assemble(&source)?;

  if args.dump {
    for (offset, instruction) in
      disassemble(&program.image.code).context("assembler emitted undecodable bytes")?
    {
      println!("{:#06x}  {}", offset, instruction);
    }
    return Ok(());
  }

  if args.run {
    let mut machine = Machine::new(program.image)
      .with_input(io::stdin())
      .with_output(io::stdout());
    let code = machine.run()?;
    exit(code as i32);
  }

  let output = args
    .output
    .clone()
    .unwrap_or_else(|| args.file.with_extension("bin"));
  let bytes = program.image.to_bytes()?;
  fs::write(&output, bytes).with_context(|| format!("cannot write {}", output.display()))?;

  let debug = args.debug.clone().unwrap_or_else(|| args.file.with_extension("dbg"));
  fs::write(&debug, program.debug.to_json()?)
    .with_context(|| format!("cannot write {}", debug.display()))?;

  Ok(())
}
