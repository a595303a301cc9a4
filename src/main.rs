use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use scholar_harvest::config::{load_config, HarvestConfig, DEFAULT_CONFIG_FILE};
use scholar_harvest::export::{ExportOutputs, Exporter};
use scholar_harvest::harvest::{read_marker, Harvester};
use scholar_harvest::sources::GoogleScholarSource;
use scholar_harvest::utils::RecordCache;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Scholar Harvest - Scrape Google Scholar into a local cache and export it
#[derive(Parser, Debug)]
#[command(name = "scholar-harvest")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Scrape Google Scholar results into a local cache and export them as JSON, CSV and BibTeX", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (can be used multiple times for more verbosity: -v, -vv, -vvv)
    #[arg(long, short, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(long, short)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run every configured query and cache the results
    Scrape {
        /// Configuration file (JSON)
        #[arg(long, short, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,

        /// Cache directory (overrides the configuration)
        #[arg(long)]
        cache_dir: Option<PathBuf>,

        /// Progress marker file (overrides the configuration)
        #[arg(long)]
        progress_file: Option<PathBuf>,

        /// Seconds to wait before and after each detail fetch
        #[arg(long)]
        delay: Option<u64>,
    },

    /// Export the cache as JSON, CSV and BibTeX
    Export {
        /// Cache directory to read
        #[arg(long, default_value = "scholar_cache")]
        cache_dir: PathBuf,

        /// JSON output file
        #[arg(long, default_value = "scholar_results.json")]
        json: PathBuf,

        /// CSV output file
        #[arg(long, default_value = "scholar_results.csv")]
        csv: PathBuf,

        /// BibTeX output file
        #[arg(long, default_value = "scholar_results.bib")]
        bib: PathBuf,
    },

    /// Show the progress marker of the last scrape
    Status {
        /// Progress marker file
        #[arg(long, default_value = "progress.json")]
        progress_file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize tracing based on verbosity
    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let env_filter = if cli.quiet { "error" } else { log_level };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| format!("scholar_harvest={}", env_filter)),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Scrape {
            config,
            cache_dir,
            progress_file,
            delay,
        } => {
            let mut settings = load_config(&config)
                .with_context(|| format!("Could not read configuration {}", config.display()))?;
            apply_overrides(&mut settings, cache_dir, progress_file, delay);
            scrape(settings).await
        }

        Commands::Export {
            cache_dir,
            json,
            csv,
            bib,
        } => {
            let outputs = ExportOutputs { json, csv, bib };
            let summary = Exporter::new(RecordCache::new(&cache_dir))
                .export(&outputs)
                .with_context(|| format!("Export of {} failed", cache_dir.display()))?;

            println!(
                "Exported {} records from {} queries to {}, {} and {}",
                summary.records,
                summary.queries,
                outputs.json.display(),
                outputs.csv.display(),
                outputs.bib.display()
            );
            Ok(ExitCode::SUCCESS)
        }

        Commands::Status { progress_file } => {
            let marker = read_marker(&progress_file).with_context(|| {
                format!("No readable progress marker at {}", progress_file.display())
            })?;

            println!("Query:     {}", marker.query.as_deref().unwrap_or("-"));
            println!("Index:     {}", marker.idx);
            println!("Completed: {}", marker.completed);
            println!("Error:     {}", marker.error);
            Ok(if marker.completed {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

fn apply_overrides(
    settings: &mut HarvestConfig,
    cache_dir: Option<PathBuf>,
    progress_file: Option<PathBuf>,
    delay: Option<u64>,
) {
    if let Some(dir) = cache_dir {
        settings.cache_dir = dir;
    }
    if let Some(path) = progress_file {
        settings.progress_file = path;
    }
    if let Some(secs) = delay {
        settings.request_delay_secs = secs;
    }
}

async fn scrape(settings: HarvestConfig) -> Result<ExitCode> {
    if settings.start_year.is_some() || settings.end_year.is_some() {
        tracing::warn!(
            "Year bounds {:?}..{:?} are not applied to searches",
            settings.start_year,
            settings.end_year
        );
    }

    let source = GoogleScholarSource::new().context("Could not create HTTP client")?;
    let harvester = Harvester::from_config(Arc::new(source), &settings);

    tracing::info!(
        "Scraping {} queries into {}",
        settings.queries.len(),
        settings.cache_dir.display()
    );
    let marker = harvester.run(&settings.queries).await?;

    if marker.completed {
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!(
            "Scrape stopped at query {:?}, index {}: {}",
            marker.query.as_deref().unwrap_or("-"),
            marker.idx,
            marker.error
        );
        Ok(ExitCode::FAILURE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_verbose_flag() {
        let cli = Cli::parse_from(["scholar-harvest", "-v", "export"]);
        assert_eq!(cli.verbose, 1);

        let cli = Cli::parse_from(["scholar-harvest", "-vv", "export"]);
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_cli_quiet_flag() {
        let cli = Cli::parse_from(["scholar-harvest", "--quiet", "export"]);
        assert!(cli.quiet);
    }

    #[test]
    fn test_cli_scrape_defaults() {
        let cli = Cli::parse_from(["scholar-harvest", "scrape"]);
        match cli.command {
            Commands::Scrape {
                config,
                cache_dir,
                progress_file,
                delay,
            } => {
                assert_eq!(config, PathBuf::from("config.json"));
                assert!(cache_dir.is_none());
                assert!(progress_file.is_none());
                assert!(delay.is_none());
            }
            _ => panic!("Expected Scrape command"),
        }
    }

    #[test]
    fn test_cli_scrape_overrides() {
        let cli = Cli::parse_from([
            "scholar-harvest",
            "scrape",
            "--config",
            "queries.json",
            "--cache-dir",
            "/tmp/cache",
            "--delay",
            "0",
        ]);
        let Commands::Scrape {
            config,
            cache_dir,
            progress_file,
            delay,
        } = cli.command
        else {
            panic!("Expected Scrape command");
        };
        assert_eq!(config, PathBuf::from("queries.json"));

        let mut settings = HarvestConfig::default();
        apply_overrides(&mut settings, cache_dir, progress_file, delay);
        assert_eq!(settings.cache_dir, PathBuf::from("/tmp/cache"));
        assert_eq!(settings.progress_file, PathBuf::from("progress.json"));
        assert_eq!(settings.request_delay_secs, 0);
    }

    #[test]
    fn test_cli_export_defaults() {
        let cli = Cli::parse_from(["scholar-harvest", "export"]);
        match cli.command {
            Commands::Export {
                cache_dir,
                json,
                csv,
                bib,
            } => {
                assert_eq!(cache_dir, PathBuf::from("scholar_cache"));
                assert_eq!(json, PathBuf::from("scholar_results.json"));
                assert_eq!(csv, PathBuf::from("scholar_results.csv"));
                assert_eq!(bib, PathBuf::from("scholar_results.bib"));
            }
            _ => panic!("Expected Export command"),
        }
    }

    #[test]
    fn test_cli_status_command() {
        let cli = Cli::parse_from(["scholar-harvest", "status", "--progress-file", "p.json"]);
        match cli.command {
            Commands::Status { progress_file } => {
                assert_eq!(progress_file, PathBuf::from("p.json"));
            }
            _ => panic!("Expected Status command"),
        }
    }

    #[test]
    fn test_cli_requires_command() {
        assert!(Cli::try_parse_from(["scholar-harvest"]).is_err());
    }
}
