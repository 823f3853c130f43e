use std::path::PathBuf;

use anyhow::{bail, Context, Result};

fn main() {
    if handle_cli_flags() {
        return;
    }

    init_tracing();

    let options = match parse_browse_args(std::env::args().skip(1)) {
        Ok(options) => options,
        Err(err) => {
            eprintln!("error: {err:?}");
            std::process::exit(2);
        }
    };

    if let Err(err) = wallfeed::run(options) {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_env("WALLFEED_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("wallfeed=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn handle_cli_flags() -> bool {
    let mut saw_flag = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("wallfeed {}", wallfeed::VERSION);
                saw_flag = true;
            }
            "--help" | "-h" => {
                println!(
                    "wallfeed - Shuffled wallpaper feed with gated interstitials.\n\n  browse                Browse a catalog (default command)\n  --catalog <path>      Catalog JSON file\n  --start <id>          Item to start from (random if omitted)\n  --config <path>       Config file\n  --version, -V         Show version and exit\n  --help,    -h         Show this help message\n\nCommands while browsing: n (next), p (previous), w (wait for ad), s (status), q (quit)"
                );
                saw_flag = true;
            }
            _ => {}
        }
    }
    saw_flag
}

fn parse_browse_args<I>(args: I) -> Result<wallfeed::app::BrowseOptions>
where
    I: IntoIterator<Item = String>,
{
    let mut options = wallfeed::app::BrowseOptions::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "browse" => {}
            "--catalog" => {
                let value = args.next().context("--catalog needs a path")?;
                options.catalog = Some(PathBuf::from(value));
            }
            "--start" => {
                options.start = Some(args.next().context("--start needs an item id")?);
            }
            "--config" => {
                let value = args.next().context("--config needs a path")?;
                options.config_file = Some(PathBuf::from(value));
            }
            other => bail!("unrecognized argument {other:?}"),
        }
    }
    Ok(options)
}
