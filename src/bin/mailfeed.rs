use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};

use mailfeed::config::{Config, Paths, default_config_path};
use mailfeed::daemon::{run_daemon, run_prune, run_sweep};
use mailfeed::mail::ImapSource;
use mailfeed::secrets;
use mailfeed::store::SqliteStore;

#[derive(Parser)]
#[command(name = "mailfeed")]
#[command(about = "Publish IMAP folders as Atom feeds", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the daemon: sweep feeds on a timer, prune weekly
    Run {
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Generate every feed once and exit
    Once {
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Remove state of feeds that are no longer configured
    Prune {
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Store an account password or token in the keyring (read from stdin)
    SetSecret {
        #[arg(long)]
        account: String,

        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn load(path: Option<PathBuf>) -> Result<Config> {
    let path = match path {
        Some(p) => p,
        None => default_config_path()?,
    };
    Config::load(&path).map_err(|e| anyhow!("Configuration error: {e}"))
}

/// `RUST_LOG` wins over the configured level.
fn init_logging(cfg: &Config) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(cfg.app.level_filter());
    if let Ok(spec) = std::env::var("RUST_LOG") {
        builder.parse_filters(&spec);
    }
    builder.init();
}

fn open_state(cfg: &Config) -> Result<(Paths, SqliteStore)> {
    let paths = Paths::from_config(&cfg.app)?;
    paths
        .make_run_dirs()
        .context("Failed to create data and output directories")?;
    let store = SqliteStore::open(&paths.db_path)
        .with_context(|| format!("Failed to open store at {}", paths.db_path.display()))?;
    Ok((paths, store))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.cmd {
        Command::SetSecret { account, config } => {
            let cfg = load(config)?;
            init_logging(&cfg);
            cfg.account(&account)?;

            eprintln!("Paste password or token (end with Ctrl-D):");
            let mut secret = String::new();
            std::io::Read::read_to_string(&mut std::io::stdin(), &mut secret)?;
            let secret = secret.trim();
            if secret.is_empty() {
                bail!("No secret given");
            }
            secrets::save_account_secret(&account, secret)?;
            println!("Saved secret for account {}", account);
            Ok(())
        }

        Command::Run { config } => {
            let cfg = load(config)?;
            init_logging(&cfg);
            let (paths, store) = open_state(&cfg)?;
            run_daemon(&cfg, &paths, &store, &ImapSource::new())
        }

        Command::Once { config } => {
            let cfg = load(config)?;
            init_logging(&cfg);
            let (paths, store) = open_state(&cfg)?;
            let report = run_sweep(&cfg, &paths, &store, &ImapSource::new(), &AtomicBool::new(true));
            let added: usize = report.completed.iter().map(|o| o.added).sum();
            println!(
                "{} feeds generated, {} new entries, {} failed",
                report.completed.len(),
                added,
                report.failed.len()
            );
            if !report.failed.is_empty() {
                bail!("Failed feeds: {}", report.failed.join(", "));
            }
            Ok(())
        }

        Command::Prune { config } => {
            let cfg = load(config)?;
            init_logging(&cfg);
            let (paths, store) = open_state(&cfg)?;
            let report = run_prune(&cfg, &paths, &store);
            println!(
                "Removed {} orphaned records and files, {} failures",
                report.total_removed(),
                report.failures
            );
            if !report.is_clean() {
                bail!("Prune finished with {} failures", report.failures);
            }
            Ok(())
        }
    }
}
