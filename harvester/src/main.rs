use clap::{Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use harvest_core::HarvestConfig;

#[derive(Parser, Debug)]
#[command(
	author,
	version,
	about = "Resilient, high-concurrency harvester for a tile-based art catalog service",
	long_about = None,
	propagate_version = true,
	disable_help_subcommand = true,
)]
struct Cli {
	#[command(subcommand)]
	command: Commands,

	#[command(flatten)]
	verbose: Verbosity<InfoLevel>,
}

#[derive(Subcommand, Debug)]
enum Commands {
	/// Crawl an artist CSV to completion, downloading every tile of every
	/// variant it reaches.
	Run(HarvestConfig),
}

fn main() -> anyhow::Result<()> {
	let cli = Cli::parse();

	env_logger::Builder::new().filter_level(cli.verbose.log_level_filter()).format_timestamp(None).init();

	let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
	runtime.block_on(run(cli))
}

async fn run(cli: Cli) -> anyhow::Result<()> {
	match &cli.command {
		Commands::Run(config) => harvester::tools::run(config).await,
	}
}

#[cfg(test)]
mod tests {
	use super::{Cli, Commands};
	use clap::Parser;

	#[test]
	fn requires_artist_csv_flag() {
		let err = Cli::try_parse_from(["harvester", "run"]).unwrap_err();
		assert!(err.to_string().contains("artist-csv"));
	}

	#[test]
	fn parses_minimal_required_flags() {
		let cli = Cli::try_parse_from(["harvester", "run", "--artist-csv", "artists.csv"]).unwrap();
		let Commands::Run(config) = cli.command;
		assert_eq!(config.artist_csv.to_str(), Some("artists.csv"));
		assert_eq!(config.workers, None);
		assert_eq!(config.effective_workers(), 1);
		assert!(!config.use_proxy);
	}

	#[test]
	fn accepts_proxy_and_worker_overrides() {
		let cli = Cli::try_parse_from(["harvester", "run", "--artist-csv", "artists.csv", "--use-proxy", "--workers", "4", "--proxy-key", "secret"]).unwrap();
		let Commands::Run(config) = cli.command;
		assert!(config.use_proxy);
		assert_eq!(config.workers, Some(4));
		assert_eq!(config.proxy_key, "secret");
	}

	#[test]
	fn use_proxy_without_explicit_workers_defaults_to_ten() {
		let cli = Cli::try_parse_from(["harvester", "run", "--artist-csv", "artists.csv", "--use-proxy"]).unwrap();
		let Commands::Run(config) = cli.command;
		assert_eq!(config.workers, None);
		assert_eq!(config.effective_workers(), 10);
	}
}
