//! flag-quiz - prefetch assets, play, and manage preferences from the terminal.

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::env;
use std::path::PathBuf;

use flag_quiz::AppConfig;

fn print_usage() {
    eprintln!("Usage: flag-quiz [--config <FILE>] <COMMAND> [OPTIONS]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  fetch               Download the country list and flag images");
    eprintln!("  play                Play a game in the terminal");
    eprintln!("  prefs               Show or change saved preferences");
    eprintln!("  resolve <CODE>...   Show where each flag is loaded from");
    eprintln!();
    eprintln!("Fetch options:");
    eprintln!("  --json-only         Only write the country list (same as --no-images)");
    eprintln!("  --svg-only          Only download SVG flags");
    eprintln!("  --png-only          Only download PNG flags");
    eprintln!("  --both              Download SVG and PNG flags");
    eprintln!("  -n, --limit <N>     Only the first N countries by name");
    eprintln!("  -f, --force         Overwrite existing files");
    eprintln!("  -p, --parallel <N>  Concurrent downloads (default: 8)");
    eprintln!("  --root <DIR>        Asset root (default: current directory)");
    eprintln!();
    eprintln!("Play options:");
    eprintln!("  -m, --mode <MODE>   quiz or pairs (default: saved preference)");
    eprintln!("  -r, --rounds <N>    Questions, or pairs on the board");
    eprintln!();
    eprintln!("Prefs options:");
    eprintln!("  -t, --theme <THEME> light, dark, system or toggle");
    eprintln!("  -m, --mode <MODE>   quiz or pairs");
    eprintln!();
    eprintln!("Global options:");
    eprintln!("  --config <FILE>     Config file (default: {})", AppConfig::default_path().display());
    eprintln!("  -h, --help          Show this help");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  RUST_LOG            Log filter (default: info)");
}

fn fail(message: &str) -> ! {
    eprintln!("Error: {message}");
    eprintln!("Run 'flag-quiz --help' for usage.");
    std::process::exit(2);
}

#[tokio::main]
async fn main() -> flag_quiz::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args: Vec<String> = env::args().skip(1).collect();

    let mut config_path = AppConfig::default_path();
    if let Some(pos) = args.iter().position(|a| a == "--config") {
        if pos + 1 >= args.len() {
            fail("--config requires a value");
        }
        config_path = PathBuf::from(args.remove(pos + 1));
        args.remove(pos);
    }

    if args.is_empty() || args.iter().any(|a| a == "-h" || a == "--help") {
        print_usage();
        std::process::exit(0);
    }

    let config = AppConfig::load(&config_path)?;

    run(config, &args[0], &args[1..]).await
}

#[cfg(feature = "cli")]
async fn run(config: AppConfig, command: &str, rest: &[String]) -> flag_quiz::Result<()> {
    use flag_quiz::cli;

    match command {
        "fetch" => {
            let options = cli::parse_fetch_args(rest).unwrap_or_else(|e| fail(&e));
            cli::run_fetch(config, options).await
        }
        "play" => {
            let options = cli::parse_play_args(rest).unwrap_or_else(|e| fail(&e));
            cli::run_play(config, options).await
        }
        "prefs" => {
            let options = cli::parse_prefs_args(rest).unwrap_or_else(|e| fail(&e));
            cli::run_prefs(config, options).await
        }
        "resolve" => {
            if rest.is_empty() {
                fail("resolve needs at least one country code");
            }
            cli::run_resolve(config, rest).await
        }
        other => fail(&format!("Unknown command: {other}")),
    }
}

#[cfg(not(feature = "cli"))]
async fn run(_config: AppConfig, _command: &str, _rest: &[String]) -> flag_quiz::Result<()> {
    eprintln!("Terminal commands not compiled in (enable the 'cli' feature)");
    std::process::exit(1);
}
