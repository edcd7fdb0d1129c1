//! CLI argument parsing for obbywatch.
//!
//! Defines the `Command` enum and `parse_args()` function for the three
//! subcommands -- no argument-parsing crate, `std::env::args()` is walked
//! by hand, same as the indexer's `src/cli.rs`.

use anyhow::Result;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Start the watcher pipeline, the batch summarizer scheduler, and the
    /// HTTP/SSE server, and block until shutdown.
    Run {
        root: PathBuf,
        http_addr: Option<String>,
        debounce_ms: Option<u64>,
    },
    /// Write default `.obbywatch`/`.obbyignore` rule files and create the
    /// database at `root`, without starting the pipeline.
    Init { root: PathBuf },
    /// Print the current watch state (pattern counts, last batch run,
    /// pending change count) and exit.
    Status { root: PathBuf },
}

pub fn print_usage() {
    eprintln!("obbywatch - local observability pipeline for a watched note/code tree");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  obbywatch run --root <DIR> [--http-addr <HOST:PORT>] [--debounce-ms <N>]");
    eprintln!("  obbywatch init --root <DIR>");
    eprintln!("  obbywatch status --root <DIR>");
    eprintln!("  obbywatch --help");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  run      Watch the tree, run the batch summarizer, and serve the HTTP/SSE API");
    eprintln!("  init     Write default .obbywatch/.obbyignore and create the database");
    eprintln!("  status   Print current watch state and exit");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  --root <DIR>             Directory to watch (required)");
    eprintln!("  --http-addr <HOST:PORT>  HTTP bind address (default: 127.0.0.1:4173)");
    eprintln!("  --debounce-ms <N>        Debounce window in milliseconds (default: 500)");
}

pub fn parse_args() -> Result<Command> {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        return Err(anyhow::anyhow!("missing command"));
    }

    let command = args[1].as_str();
    match command {
        "run" => parse_run(&args[2..]),
        "init" => parse_root_only(&args[2..]).map(|root| Command::Init { root }),
        "status" => parse_root_only(&args[2..]).map(|root| Command::Status { root }),
        other => Err(anyhow::anyhow!("unknown command: {}", other)),
    }
}

fn parse_run(args: &[String]) -> Result<Command> {
    let mut root: Option<PathBuf> = None;
    let mut http_addr: Option<String> = None;
    let mut debounce_ms: Option<u64> = None;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--root" => {
                root = Some(PathBuf::from(next_value(args, &mut i, "--root")?));
            }
            "--http-addr" => {
                http_addr = Some(next_value(args, &mut i, "--http-addr")?.to_string());
            }
            "--debounce-ms" => {
                debounce_ms = Some(next_value(args, &mut i, "--debounce-ms")?.parse()?);
            }
            other => return Err(anyhow::anyhow!("unknown argument: {}", other)),
        }
    }

    let root = root.ok_or_else(|| anyhow::anyhow!("--root is required"))?;
    Ok(Command::Run {
        root,
        http_addr,
        debounce_ms,
    })
}

fn parse_root_only(args: &[String]) -> Result<PathBuf> {
    let mut root: Option<PathBuf> = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--root" => {
                root = Some(PathBuf::from(next_value(args, &mut i, "--root")?));
            }
            other => return Err(anyhow::anyhow!("unknown argument: {}", other)),
        }
    }
    root.ok_or_else(|| anyhow::anyhow!("--root is required"))
}

/// Consumes `args[i]` (the flag itself) and returns `args[i + 1]`, advancing
/// `i` past both. Errors if no value follows the flag.
fn next_value<'a>(args: &'a [String], i: &mut usize, flag: &str) -> Result<&'a str> {
    if *i + 1 >= args.len() {
        return Err(anyhow::anyhow!("{} requires an argument", flag));
    }
    let value = args[*i + 1].as_str();
    *i += 2;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_run_requires_root() {
        let args = vec!["obbywatch".to_string(), "run".to_string()];
        std_args_test(&args, |a| parse_run(&a[2..]).is_err());
    }

    #[test]
    fn parse_run_accepts_all_flags() {
        let args = vec![
            "obbywatch".to_string(),
            "run".to_string(),
            "--root".to_string(),
            "/tmp/notes".to_string(),
            "--http-addr".to_string(),
            "0.0.0.0:8080".to_string(),
            "--debounce-ms".to_string(),
            "250".to_string(),
        ];
        let command = parse_run(&args[2..]).unwrap();
        assert_eq!(
            command,
            Command::Run {
                root: PathBuf::from("/tmp/notes"),
                http_addr: Some("0.0.0.0:8080".to_string()),
                debounce_ms: Some(250),
            }
        );
    }

    #[test]
    fn parse_root_only_rejects_unknown_flags() {
        let args = vec!["--bogus".to_string()];
        assert!(parse_root_only(&args).is_err());
    }

    fn std_args_test(args: &[String], check: impl Fn(&[String]) -> bool) {
        assert!(check(args));
    }
}
