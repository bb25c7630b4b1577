//! twtools - task/interval store coordination CLI
//!
//! Also installed as `taskget`, `taskfql`, `taskcheck` and `tasksync`;
//! the invocation name selects the subcommand.

use clap::Parser;
use twtools::cli::dispatch::normalize_args;
use twtools::cli::Cli;
use twtools::error::exit_codes;
use twtools::output::{emit_error, infer_command_name};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() {
    let args = normalize_args(std::env::args());
    let command = infer_command_name(&args);
    let cli = match Cli::try_parse_from(&args) {
        Ok(cli) => cli,
        Err(err) => {
            // --help and --version land here too and are not failures.
            let _ = err.print();
            let code = if err.use_stderr() {
                exit_codes::FAILURE
            } else {
                exit_codes::SUCCESS
            };
            std::process::exit(code);
        }
    };

    // Tracing is opt-in via RUST_LOG (or --verbose).
    // Keep startup robust: ignore invalid/huge filters.
    let fallback = if cli.verbose { "twtools=debug" } else { "off" };
    let filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|raw| {
            let raw = raw.trim();
            if raw.is_empty() || raw.len() > 4096 {
                return None;
            }
            EnvFilter::try_new(raw).ok()
        })
        .unwrap_or_else(|| EnvFilter::new(fallback));

    // stdout belongs to command output and the hook protocol.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let json = cli.json;
    if let Err(err) = cli.run() {
        let _ = emit_error(&command, &err, json);
        std::process::exit(err.exit_code());
    }
}
