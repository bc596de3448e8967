use std::{
    error::Error,
    fs::{self, File},
    io::{self, BufWriter, Write},
    path::PathBuf,
    process::ExitCode,
};

use clap::{Parser, Subcommand};
use microasm::{ConstantInput, Processor, compile, format_binary, parse_binary};
use tracing::Level;

mod tui;

#[derive(Parser)]
#[command(version, about = "Assembler and simulator for the microasm accumulator machine", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// One of `TRACE`, `DEBUG`, `INFO`, `WARN`, or `ERROR`
    #[arg(short, long, global = true, default_value_t = Level::WARN)]
    log_level: Level,
}

#[derive(Subcommand)]
enum Command {
    /// Assemble a source file into a binary listing
    Asm {
        /// Assembly source file
        source: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Assemble (or load) a program and run it until it halts
    Run {
        /// Assembly source, or a binary listing with `--binary`
        program: PathBuf,

        /// Treat the input as a binary listing instead of source
        #[arg(short, long)]
        binary: bool,

        /// Cycle ceiling before the run is aborted
        #[arg(long, default_value_t = microasm::config::CYCLE_TIMEOUT)]
        cycle_limit: u64,

        /// Value held on input port 1
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        input1: i32,

        /// Value held on input port 2
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        input2: i32,

        /// Also print the framebuffer after the run
        #[arg(short, long)]
        verbose: bool,
    },
    /// Interactive editor and single-stepper
    Tui {
        /// Source file to open in the editor
        source: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();

    // the stepper owns the terminal; it logs to its own pane instead
    if !matches!(args.command, Command::Tui { .. }) {
        tracing_subscriber::fmt()
            .with_max_level(args.log_level)
            .with_writer(io::stderr)
            .init();
    }

    if let Err(e) = main_real(args) {
        tracing::error!("{e}");
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn main_real(args: Args) -> Result<(), Box<dyn Error>> {
    match args.command {
        Command::Asm { source, output } => {
            let text = fs::read_to_string(&source).map_err(|e| format!("cant open {}: {e}", source.display()))?;
            let words = compile(&text)?;
            tracing::info!(words = words.len(), "assembled {}", source.display());

            let mut output: Box<dyn Write> = match output {
                Some(path) => Box::new(BufWriter::new(
                    File::create(&path).map_err(|e| format!("cant open {}: {e}", path.display()))?,
                )),
                None => Box::new(io::stdout()),
            };
            writeln!(output, "{}", format_binary(&words))?;
            output.flush()?;
        }
        Command::Run { program, binary, cycle_limit, input1, input2, verbose } => {
            let text = fs::read_to_string(&program).map_err(|e| format!("cant open {}: {e}", program.display()))?;
            let words = if binary { parse_binary(&text)? } else { compile(&text)? };

            let mut processor = Processor::new(words).with_cycle_limit(cycle_limit);
            let state = processor.run(&mut ConstantInput([input1, input2]))?;

            println!("halted after {} cycles", state.cycles);
            println!("W     = {}", state.w);
            println!("OUT1  = {}", state.outputs[0]);
            println!("OUT2  = {}", state.outputs[1]);
            if verbose {
                for line in state.display.to_lines() {
                    println!("{line}");
                }
            }
        }
        Command::Tui { source } => {
            let text = match source {
                Some(path) => fs::read_to_string(&path).map_err(|e| format!("cant open {}: {e}", path.display()))?,
                None => String::new(),
            };
            tui::run(&text)?;
        }
    }
    Ok(())
}
