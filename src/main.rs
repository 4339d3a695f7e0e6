use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser as ClapParser;
use log::error;

use classvm_compiler::driver::compile_dir;

/// Compiles every `.jack` source file under a directory to stack-based VM code.
#[derive(ClapParser, Debug)]
#[command(name = "classvm", version, about)]
struct Cli {
    /// Directory to walk for `.jack` source files.
    source_dir: PathBuf,

    /// Where to write the generated `.vm` files (defaults to alongside each source file).
    #[arg(short, long)]
    out_dir: Option<PathBuf>,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let failures = compile_dir(&cli.source_dir, cli.out_dir.as_deref());
    for failure in &failures {
        error!("{}: {}", failure.path.display(), failure.error);
        eprintln!("{}: {}", failure.path.display(), failure.error);
    }

    if failures.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
