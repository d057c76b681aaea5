//! Media Inventory CLI
//!
//! Incremental media inventory with parallel directory traversal.

use clap::{Parser, Subcommand};
use env_logger::Env;
use log::{error, info};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use media_inventory::{
    find_by_encoding, list_encodings, open_store, run_scan, Outcome, OutcomeCounter, PersistMode,
    ScanConfig, ScanError,
};

/// Incremental media inventory
#[derive(Parser)]
#[command(name = "media_inventory")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Store file (default: ~/.media_inventory/inventory.json)
    #[arg(short = 'd', long = "database", global = true)]
    database: Option<PathBuf>,

    /// JSON config file
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a directory tree and probe new or changed files
    Scan {
        /// Root directory to scan
        #[arg(short = 's', long = "scan")]
        root: PathBuf,

        /// Worker threads (0 = hardware parallelism)
        #[arg(short = 't', long)]
        threads: Option<usize>,

        /// Output the tally as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the video encodings seen so far
    List,
    /// Find files with the given video encoding
    Find {
        /// Video encoding as reported by the probe, e.g. mpeg4
        #[arg(short = 'e', long)]
        encoding: String,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let start = Instant::now();

    match run(cli) {
        Ok(()) => {
            info!("Runtime: {}ms", start.elapsed().as_millis());
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), ScanError> {
    let mut config = match &cli.config {
        Some(path) => ScanConfig::from_file(path)?,
        None => ScanConfig::default(),
    };
    if let Some(database) = cli.database {
        config.store_path = Some(database);
    }

    match cli.command {
        Commands::Scan {
            root,
            threads,
            json,
        } => {
            if let Some(threads) = threads {
                config.num_threads = threads;
            }
            info!("Scanning {:?} into {:?}", root, config.effective_store_path());
            let result = run_scan(&config, &root)?;
            print_tally(&result, json)?;
        }
        Commands::List => {
            let store = open_store(&config, true, PersistMode::Inline)?;
            let encodings = list_encodings(&store);
            for encoding in &encodings {
                println!("  {}", encoding);
            }
            println!("Found: {}", encodings.len());
        }
        Commands::Find { encoding } => {
            let store = open_store(&config, true, PersistMode::Inline)?;
            let found = find_by_encoding(&store, &encoding);
            for path in &found {
                let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
                println!("{} [{} B]", path.display(), size);
            }
            println!("Found: {}", found.len());
        }
    }
    Ok(())
}

fn print_tally(result: &OutcomeCounter, json: bool) -> Result<(), ScanError> {
    if json {
        let tally: serde_json::Map<String, serde_json::Value> = result
            .iter()
            .map(|(outcome, count)| (outcome.as_str().to_lowercase(), count.into()))
            .collect();
        println!("{}", serde_json::to_string_pretty(&tally)?);
    } else {
        for outcome in Outcome::ALL {
            println!("{}: {}", outcome, result.count(outcome));
        }
    }
    Ok(())
}
