//! Top-level orchestration: builds the shared session pool from
//! configuration, then fans the artist list out across a fixed-width
//! `tokio::sync::Semaphore`-bounded set of worker tasks. No inter-artist
//! coordination happens beyond shared pool membership.

use crate::tile::TileFetcher;
use crate::worker::ArtistWorker;
use harvest_core::config::MAX_PROXY_RETRIES;
use harvest_core::csv_input::read_artist_csv;
use harvest_core::progress::get_progress;
use harvest_core::{HarvestConfig, RawdataPaths};
use harvest_pool::{ProxyProvider, SessionFactory, SessionPool};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// The proxy-vendor secret placeholder passed to [`ProxyProvider`] when
/// `--use-proxy` is off; `ProxyProvider` never dials out in that mode, but
/// its constructor still rejects an empty key.
const NO_PROXY_PLACEHOLDER_KEY: &str = "direct-mode-no-proxy";

/// Builds the session pool and worker set from `config`, then runs every
/// artist in the input CSV to completion. Duplicate artist ids in the CSV
/// are neither deduplicated nor rejected — each row gets its own worker
/// task (see `DESIGN.md`).
///
/// # Errors
/// Propagates configuration errors (missing CSV, missing proxy secret) and
/// failures building the initial session pool. Per-artist failures never
/// surface here — they are logged and confined to that artist's worker.
pub async fn harvest(config: &HarvestConfig) -> anyhow::Result<()> {
	config.validate()?;
	let proxy_key = config.resolve_proxy_key()?;

	let artists = read_artist_csv(&config.artist_csv)?;
	log::info!("loaded {} artist rows from {}", artists.len(), config.artist_csv.display());

	let timeout = Duration::from_secs(config.timeout_secs);
	let provider_key = if proxy_key.is_empty() { NO_PROXY_PLACEHOLDER_KEY.to_string() } else { proxy_key };
	let proxy_provider = ProxyProvider::new(provider_key, timeout)?;
	let factory = SessionFactory::new(timeout);

	let pool = Arc::new(
		SessionPool::build(
			proxy_provider,
			factory,
			config.use_proxy,
			config.effective_workers(),
			config.secondary_pool_size(),
			config.token_pool_capacity(),
			MAX_PROXY_RETRIES,
		)
		.await?,
	);
	log::info!(
		"session pool ready: {} primary, {} secondary, token pool capacity {}",
		config.effective_workers(),
		config.secondary_pool_size(),
		config.token_pool_capacity()
	);

	let paths = RawdataPaths::new(&config.output_dir);
	let tile_fetcher = Arc::new(TileFetcher::new(Arc::clone(&pool), paths.clone(), config.use_proxy, MAX_PROXY_RETRIES));
	let worker = Arc::new(ArtistWorker::new(pool, tile_fetcher, paths, MAX_PROXY_RETRIES));

	let semaphore = Arc::new(Semaphore::new(config.effective_workers()));
	let mut progress = get_progress("harvesting artists", artists.len() as u64);
	let mut handles = Vec::with_capacity(artists.len());

	for (index, artist) in artists.into_iter().enumerate() {
		let semaphore = Arc::clone(&semaphore);
		let worker = Arc::clone(&worker);
		handles.push(tokio::spawn(async move {
			let _permit = semaphore.acquire_owned().await.expect("harvest semaphore is never closed");
			worker.run(index, &artist).await;
		}));
	}

	for handle in handles {
		if let Err(e) = handle.await {
			log::error!("artist worker task panicked: {e}");
		}
		progress.inc(1);
	}
	progress.finish();

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::path::PathBuf;

	fn base_config(dir: &tempfile::TempDir, csv_path: PathBuf) -> HarvestConfig {
		HarvestConfig {
			artist_csv: csv_path,
			output_dir: dir.path().join("rawdata"),
			workers: Some(2),
			use_proxy: false,
			proxy_key: harvest_core::config::PROXY_KEY_PLACEHOLDER.to_string(),
			timeout_secs: 1,
		}
	}

	#[tokio::test]
	async fn missing_csv_surfaces_as_config_error_before_any_network_call() {
		let dir = tempfile::tempdir().unwrap();
		let config = base_config(&dir, dir.path().join("does-not-exist.csv"));
		let err = harvest(&config).await.unwrap_err();
		assert!(err.to_string().contains("not found"));
	}
}
