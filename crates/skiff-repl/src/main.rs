//! skiff CLI entry point.
//!
//! Usage:
//!   skiff                      # Interactive shell in the current project
//!   skiff --root <dir>         # Shell in another project
//!   skiff -c <expr>            # Evaluate one expression and exit

use std::env;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use skiff_kernel::{paths, EvaluationOutcome, ReplConfig};
use skiff_repl::Repl;

fn main() -> ExitCode {
    // Initialize tracing (respects RUST_LOG env var). Off by default: the
    // shell prints its own errors, and a log line would repeat them.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("off"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

#[derive(Debug, Default)]
struct Args {
    root: Option<PathBuf>,
    command: Option<String>,
    help: bool,
    version: bool,
}

fn parse_args(args: &[String]) -> Result<Args> {
    let mut parsed = Args::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--help" | "-h" => parsed.help = true,
            "--version" | "-V" => parsed.version = true,
            "-c" => {
                let expr = iter.next().context("-c requires an expression argument")?;
                parsed.command = Some(expr.clone());
            }
            "--root" => {
                let dir = iter.next().context("--root requires a directory")?;
                parsed.root = Some(PathBuf::from(dir));
            }
            other => match other.strip_prefix("--root=") {
                Some(dir) => parsed.root = Some(PathBuf::from(dir)),
                None => bail!("Unknown option: {other}\nRun 'skiff --help' for usage."),
            },
        }
    }
    Ok(parsed)
}

fn run() -> Result<ExitCode> {
    let args: Vec<String> = env::args().skip(1).collect();
    let args = parse_args(&args)?;

    if args.help {
        print_help();
        return Ok(ExitCode::SUCCESS);
    }
    if args.version {
        println!(
            "skiff {} ({} {})",
            env!("CARGO_PKG_VERSION"),
            env!("SKIFF_GIT_HASH"),
            env!("SKIFF_BUILD_DATE")
        );
        return Ok(ExitCode::SUCCESS);
    }

    let root = paths::root_from_env(args.root.as_deref()).context("Failed to resolve the project root")?;
    let config = ReplConfig::load_from(&paths::manifest_path(&root))?;

    match args.command {
        Some(expr) => run_command(&root, config, &expr),
        None => {
            let terminal = config.terminal && std::io::stdin().is_terminal();
            let repl = Repl::with_config(&root, config.with_terminal(terminal))?;
            skiff_repl::run(repl)
        }
    }
}

/// Evaluate one expression and exit.
fn run_command(root: &std::path::Path, config: ReplConfig, expr: &str) -> Result<ExitCode> {
    let mut repl = Repl::with_config(root, config.with_terminal(false))?;
    let outcome = repl.evaluate(expr);
    let rendered = repl.render(&outcome);
    match outcome {
        EvaluationOutcome::Value(_) => {
            if let Some(text) = rendered {
                println!("{text}");
            }
            Ok(ExitCode::SUCCESS)
        }
        EvaluationOutcome::Failure(_) => {
            if let Some(text) = rendered {
                eprintln!("{text}");
            }
            Ok(ExitCode::FAILURE)
        }
    }
}

fn print_help() {
    println!(
        r#"skiff v{}

Usage:
  skiff                        Interactive shell
  skiff -c <expr>              Evaluate an expression and exit

Options:
  --root <dir>                 Project root (default: ${}, else the working directory)
  -c <expr>                    Evaluate an expression and exit
  -h, --help                   Show this help
  -V, --version                Show version

The project root must contain a skiff.toml.

Examples:
  skiff                        # Start the shell
  skiff -c 'project.name'      # Print the project name
  skiff --root ../other        # Shell in another project
"#,
        env!("CARGO_PKG_VERSION"),
        paths::ROOT_ENV
    );
}
