//! The virtual machine driver: loads a binary, wires the I/O cell to
//! stdin/stdout, runs to halt or fault, and reports the verdict with the
//! register file.

use std::fs;
use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use birdie::bytecode::Image;
use birdie::machine::{Machine, MemoryLimits, TraceEvent, TraceSink};

#[derive(Parser)]
#[command(name = "birdie-vm", about = "Virtual machine for the birdie CPU", version)]
struct Args {
  /// Binary to run
  file: PathBuf,

  /// Seed for the `rand` instruction, for reproducible runs
  #[arg(long)]
  seed: Option<u64>,

  /// Heap region limit in bytes
  #[arg(long, value_name = "BYTES")]
  heap_limit: Option<u64>,

  /// Stack region limit in bytes
  #[arg(long, value_name = "BYTES")]
  stack_limit: Option<u64>,

  /// Log every committed instruction (at debug level)
  #[arg(long)]
  trace: bool,
}

/// Logs committed instructions; wired in only when `--trace` is given.
struct LogTrace;

impl TraceSink for LogTrace {
  fn record(&mut self, event: &TraceEvent) {
    log::debug!(
      "{:#06x}  {:<4} {:?}  cycle {}",
      event.address,
      event.opcode.to_string(),
      event.operands,
      event.cycles
    );
  }
}

fn main() -> Result<()> {
  env_logger::init();
  let args = Args::parse();

  let bytes =
    fs::read(&args.file).with_context(|| format!("cannot read {}", args.file.display()))?;
  let image = Image::from_bytes(&bytes)?;

  let mut limits = MemoryLimits::default();
  if let Some(heap) = args.heap_limit {
    limits.heap = heap;
  }
  if let Some(stack) = args.stack_limit {
    limits.stack = stack;
  }

  let mut machine = Machine::with_limits(image, limits)
    .with_input(io::stdin())
    .with_output(io::stdout());
  if let Some(seed) = args.seed {
    machine = machine.with_seed(seed);
  }
  if args.trace {
    machine = machine.with_trace(LogTrace);
  }

  match machine.run() {
    Ok(code) => {
      println!(
        "Execution terminated after {} cycles with exit code {}. Register file at exit:",
        machine.cycles(),
        code
      );
      machine.register_table().printstd();
      Ok(())
    }
    Err(fault) => {
      eprintln!("{}", fault);
      machine.register_table().printstd();
      Err(fault.into())
    }
  }
}
