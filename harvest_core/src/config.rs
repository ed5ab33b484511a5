//! Typed configuration for a harvest run, assembled from CLI flags plus
//! environment variables, mirroring the constants hard-coded in the source
//! script.

use crate::error::HarvestError;
use clap::Args;
use std::path::PathBuf;

/// The literal placeholder the source script used for its proxy key; real
/// keys are read from `QINGGOU_KEY` only when this default is left in place.
pub const PROXY_KEY_PLACEHOLDER: &str = "YOUR_TOKEN_HERE";

/// Default request timeout for every HTTP call (catalog and tile), in
/// seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 20;

/// Cap on the secondary (tile-download) pool size, regardless of `3 * N`.
pub const MAX_SECONDARY_POOL: usize = 200;

/// Shared attempt cap for every rotation loop (proxy replacement, token
/// rotation).
pub const MAX_PROXY_RETRIES: u32 = 5;

#[derive(Debug, Clone, Args)]
pub struct HarvestConfig {
	/// CSV file with an `Id` column (and optionally `name`) listing artists to harvest.
	#[arg(long, value_name = "PATH")]
	pub artist_csv: PathBuf,

	/// Root directory tiles and catalog JSON are written under.
	#[arg(long, value_name = "DIR", default_value = "data/rawdata")]
	pub output_dir: PathBuf,

	/// Number of concurrent artist workers (also the primary pool size).
	/// Defaults to 10 when `--use-proxy` is set and 1 without it, matching a
	/// direct connection's single real identity.
	#[arg(long)]
	pub workers: Option<usize>,

	/// Route every request through rotating proxies. When false, a single
	/// direct session is reused for both pools and no rotation happens.
	#[arg(long, default_value_t = false)]
	pub use_proxy: bool,

	/// Proxy-vendor secret. Falls back to `QINGGOU_KEY` when left as the
	/// placeholder and `use_proxy` is set.
	#[arg(long, default_value = PROXY_KEY_PLACEHOLDER)]
	pub proxy_key: String,

	/// Per-request timeout in seconds.
	#[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
	pub timeout_secs: u64,
}

/// Default worker count (also the primary pool size) when proxies are in
/// use: enough concurrency to make rotation worthwhile against a vendor that
/// expects many distinct identities.
pub const DEFAULT_WORKERS_WITH_PROXY: usize = 10;

/// Default worker count without a proxy pool: one direct identity, so a
/// misconfigured high worker count doesn't hammer the origin from a single
/// IP under many concurrent tasks.
pub const DEFAULT_WORKERS_WITHOUT_PROXY: usize = 1;

impl HarvestConfig {
	/// Worker count: the explicit `--workers` value if given, otherwise
	/// [`DEFAULT_WORKERS_WITH_PROXY`] or [`DEFAULT_WORKERS_WITHOUT_PROXY`]
	/// depending on `--use-proxy`. Floored at 1: a misconfigured `--workers 0`
	/// would wedge every modulo-based pool index.
	#[must_use]
	pub fn effective_workers(&self) -> usize {
		self.workers
			.unwrap_or(if self.use_proxy { DEFAULT_WORKERS_WITH_PROXY } else { DEFAULT_WORKERS_WITHOUT_PROXY })
			.max(1)
	}

	/// Secondary pool size: `3 * N`, capped at [`MAX_SECONDARY_POOL`].
	#[must_use]
	pub fn secondary_pool_size(&self) -> usize {
		(self.effective_workers() * 3).min(MAX_SECONDARY_POOL)
	}

	/// Token pool capacity: `clamp(2 * N, 3, 20)`.
	#[must_use]
	pub fn token_pool_capacity(&self) -> usize {
		(self.effective_workers() * 2).clamp(3, 20)
	}

	/// Resolves the proxy-vendor secret, reading `QINGGOU_KEY` only when the
	/// configured key is still the literal placeholder.
	///
	/// # Errors
	/// Returns [`HarvestError::Config`] when proxies are enabled but no
	/// usable secret can be found.
	pub fn resolve_proxy_key(&self) -> Result<String, HarvestError> {
		if !self.use_proxy {
			return Ok(String::new());
		}
		if self.proxy_key != PROXY_KEY_PLACEHOLDER {
			return Ok(self.proxy_key.clone());
		}
		std::env::var("QINGGOU_KEY").map_err(|_| HarvestError::Config {
			detail: "proxy mode requested but no QINGGOU_KEY is set and --proxy-key was left at its placeholder".into(),
		})
	}

	/// Validates that the artist CSV exists before any worker starts.
	///
	/// # Errors
	/// Returns [`HarvestError::Config`] if the path is missing.
	pub fn validate(&self) -> Result<(), HarvestError> {
		if !self.artist_csv.exists() {
			return Err(HarvestError::Config {
				detail: format!("artist CSV not found at {}", self.artist_csv.display()),
			});
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn base_config() -> HarvestConfig {
		HarvestConfig {
			artist_csv: PathBuf::from("artists.csv"),
			output_dir: PathBuf::from("data/rawdata"),
			workers: Some(10),
			use_proxy: false,
			proxy_key: PROXY_KEY_PLACEHOLDER.to_string(),
			timeout_secs: DEFAULT_TIMEOUT_SECS,
		}
	}

	#[test]
	fn secondary_pool_is_triple_n_capped() {
		let mut cfg = base_config();
		cfg.workers = Some(10);
		assert_eq!(cfg.secondary_pool_size(), 30);

		cfg.workers = Some(1000);
		assert_eq!(cfg.secondary_pool_size(), MAX_SECONDARY_POOL);
	}

	#[test]
	fn token_pool_capacity_is_clamped() {
		let mut cfg = base_config();
		cfg.workers = Some(1);
		assert_eq!(cfg.token_pool_capacity(), 3);

		cfg.workers = Some(5);
		assert_eq!(cfg.token_pool_capacity(), 10);

		cfg.workers = Some(50);
		assert_eq!(cfg.token_pool_capacity(), 20);
	}

	#[test]
	fn zero_workers_floors_to_one() {
		let mut cfg = base_config();
		cfg.workers = Some(0);
		assert_eq!(cfg.effective_workers(), 1);
	}

	#[test]
	fn default_workers_is_ten_with_proxy_and_one_without() {
		let mut cfg = base_config();
		cfg.workers = None;
		assert_eq!(cfg.effective_workers(), DEFAULT_WORKERS_WITHOUT_PROXY);

		cfg.use_proxy = true;
		assert_eq!(cfg.effective_workers(), DEFAULT_WORKERS_WITH_PROXY);
	}

	#[test]
	fn proxy_key_resolution_without_proxy_mode_is_empty() {
		let cfg = base_config();
		assert_eq!(cfg.resolve_proxy_key().unwrap(), "");
	}

	#[test]
	fn proxy_key_resolution_uses_explicit_key() {
		let mut cfg = base_config();
		cfg.use_proxy = true;
		cfg.proxy_key = "explicit-secret".to_string();
		assert_eq!(cfg.resolve_proxy_key().unwrap(), "explicit-secret");
	}

	#[test]
	fn validate_rejects_missing_csv() {
		let cfg = base_config();
		assert!(cfg.validate().is_err());
	}

	#[test]
	fn validate_accepts_existing_csv() {
		let dir = tempfile::tempdir().unwrap();
		let csv_path = dir.path().join("artists.csv");
		std::fs::write(&csv_path, "Id,name\n1,Artist One\n").unwrap();

		let mut cfg = base_config();
		cfg.artist_csv = csv_path;
		assert!(cfg.validate().is_ok());
	}
}
