use clap::{Parser, Subcommand};
use eyre::Result;

mod cmd;

use cmd::console::ConsoleArgs;
use cmd::tail::TailArgs;

#[derive(Debug, Parser)]
#[command(
    name = "proxy-console",
    version,
    about = "Live log tail and performance metrics for a proxy monitoring backend"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Full-screen dashboard with live logs and metrics
    Console(ConsoleArgs),
    /// Print live log records to stdout
    Tail(TailArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Console(args) => args.run(),
        Command::Tail(args) => args.run(),
    }
}
