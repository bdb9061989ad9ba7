//! Quizforge CLI — sandboxed question-template execution.

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "quizforge",
    version,
    about = "Sandboxed template execution — generate randomized questions, validate answers"
)]
struct Cli {
    #[command(subcommand)]
    command: quizforge::cli::Commands,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = quizforge::cli::dispatch(cli.command) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
