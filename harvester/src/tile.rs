//! Downloads a single tile through the secondary session pool, applying the
//! tile-specific retry schedule and secondary-bundle rotation on proxy-auth
//! responses.

use crate::signer::{sign_suha, sign_sufa};
use async_trait::async_trait;
use harvest_core::error::status_is_proxy_auth;
use harvest_core::{write_atomic, Family, HarvestError, RawdataPaths};
use harvest_pool::retry::TILE_BACKOFF_SECS;
use harvest_pool::{PoolKind, SessionPool};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

const DEFAULT_TILE_BASE_URL: &str = "https://cag.ltfc.net";

/// The catalog coordinates identifying which tile grid a fetch belongs to.
#[derive(Debug, Clone)]
pub struct VariantContext {
	pub artist_id: String,
	pub work_id: String,
	pub resource_id: String,
	pub variant_id: String,
	pub family: Family,
}

/// The result of one tile-fetch attempt sequence: either the tile landed on
/// disk (possibly because it already had, idempotently) or every scheduled
/// attempt came back empty — a miss, not an error, for [`crate::grid`] to
/// interpret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileOutcome {
	Saved(PathBuf),
	Miss,
}

/// A source of tiles for one (x, y) coordinate, abstracted so the grid
/// sweep's termination logic can be unit-tested against a fake
/// implementation instead of a real network. Implementations own their own
/// session-slot selection; the grid sweep never sees pool internals.
#[async_trait]
pub trait TileSource: Send + Sync {
	async fn fetch(&self, ctx: &VariantContext, x: u32, y: u32) -> Result<TileOutcome, HarvestError>;
}

/// Fetches tiles through the shared [`SessionPool`]'s secondary tier.
pub struct TileFetcher {
	pool: Arc<SessionPool>,
	paths: RawdataPaths,
	use_proxy: bool,
	max_proxy_retries: u32,
	tile_base_url: String,
}

impl TileFetcher {
	#[must_use]
	pub fn new(pool: Arc<SessionPool>, paths: RawdataPaths, use_proxy: bool, max_proxy_retries: u32) -> Self {
		Self { pool, paths, use_proxy, max_proxy_retries, tile_base_url: DEFAULT_TILE_BASE_URL.to_string() }
	}

	/// Builds a fetcher against a non-default tile host; used by
	/// integration tests to point tile downloads at a local stub server.
	#[must_use]
	pub fn with_tile_base_url(pool: Arc<SessionPool>, paths: RawdataPaths, use_proxy: bool, max_proxy_retries: u32, tile_base_url: impl Into<String>) -> Self {
		Self { pool, paths, use_proxy, max_proxy_retries, tile_base_url: tile_base_url.into() }
	}

	/// # Errors
	/// Propagates [`HarvestError`] from secondary-bundle replacement or from
	/// a filesystem failure writing the tile bytes.
	pub async fn fetch_tile(&self, ctx: &VariantContext, x: u32, y: u32) -> Result<TileOutcome, HarvestError> {
		let tile_path = self.paths.tile_path(&ctx.artist_id, &ctx.work_id, &ctx.resource_id, &ctx.variant_id, x, y);
		if tile_path.exists() {
			return Ok(TileOutcome::Saved(tile_path));
		}

		let base_url = format!("{}/cagstore/{}/17/{x}_{y}.jpg", self.tile_base_url, ctx.variant_id);
		let signed_url = self.sign(&base_url, ctx.family).await;

		// The secondary slot is claimed once per tile and held across this
		// tile's own retry schedule; a proxy-auth replacement swaps the
		// bundle in that same slot rather than claiming a new one.
		let (_, _, secondary_slot) = self.pool.next_secondary().await;

		let schedule: &[f64] = if self.use_proxy { &TILE_BACKOFF_SECS } else { &[0.0] };
		let mut proxy_replacements = 0u32;
		let mut attempt = 0usize;

		loop {
			if attempt >= schedule.len() {
				return Ok(TileOutcome::Miss);
			}
			if attempt > 0 {
				sleep(Duration::from_secs_f64(schedule[attempt])).await;
			}

			let client = self.pool.secondary_at(secondary_slot).await.0;
			match client.get(&signed_url).send().await {
				Ok(response) => {
					let status = response.status().as_u16();
					if self.use_proxy && status_is_proxy_auth(status) && proxy_replacements < self.max_proxy_retries {
						self.pool.replace(PoolKind::Secondary, secondary_slot, status == 407).await?;
						proxy_replacements += 1;
						continue;
					}
					let content_type = response.headers().get("content-type").and_then(|v| v.to_str().ok()).unwrap_or("").to_string();
					if status == 200 && content_type.starts_with("image") {
						let bytes = response
							.bytes()
							.await
							.map_err(|e| HarvestError::Transient { detail: format!("failed to read tile body: {e}") })?;
						write_atomic(&tile_path, &bytes).map_err(|e| HarvestError::LocalFilesystem { detail: e.to_string() })?;
						log::info!("saved tile {}", tile_path.display());
						return Ok(TileOutcome::Saved(tile_path));
					}
					log::debug!("tile miss for {variant} ({x},{y}): status {status}", variant = ctx.variant_id);
					attempt += 1;
				}
				Err(e) => {
					if self.use_proxy && is_proxy_auth_shaped_transport_error(&e) && proxy_replacements < self.max_proxy_retries {
						self.pool.replace(PoolKind::Secondary, secondary_slot, true).await?;
						proxy_replacements += 1;
						continue;
					}
					log::warn!("tile request failed for {variant} ({x},{y}): {e}", variant = ctx.variant_id);
					attempt += 1;
				}
			}
		}
	}

	async fn sign(&self, base_url: &str, family: Family) -> String {
		match family {
			Family::Suha => sign_suha(base_url),
			Family::Sufa => sign_sufa(base_url).await.unwrap_or_else(|e| {
				log::warn!("SUFA signing failed, falling back to unsigned url: {e}");
				base_url.to_string()
			}),
		}
	}
}

fn is_proxy_auth_shaped_transport_error(err: &reqwest::Error) -> bool {
	let text = err.to_string();
	text.contains("407") || text.contains("Proxy Authentication Required")
}

#[async_trait]
impl TileSource for TileFetcher {
	async fn fetch(&self, ctx: &VariantContext, x: u32, y: u32) -> Result<TileOutcome, HarvestError> {
		self.fetch_tile(ctx, x, y).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use harvest_pool::{ProxyProvider, SessionFactory};
	use serde_json::json;
	use wiremock::matchers::{method, path_regex};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	fn ctx() -> VariantContext {
		VariantContext {
			artist_id: "artist1".into(),
			work_id: "work1".into(),
			resource_id: "res1".into(),
			variant_id: "var1".into(),
			family: Family::Suha,
		}
	}

	async fn build_fetcher(dir: &tempfile::TempDir, tile_server: &MockServer, token_server: &MockServer) -> TileFetcher {
		let factory = SessionFactory::with_access_token_url(Duration::from_secs(5), format!("{}/token", token_server.uri()));
		let proxy = ProxyProvider::new("disabled".to_string(), Duration::from_secs(5)).unwrap();
		let pool = SessionPool::build(proxy, factory, false, 1, 1, 5, 3).await.unwrap();
		let paths = RawdataPaths::new(dir.path());
		TileFetcher::with_tile_base_url(Arc::new(pool), paths, false, 3, tile_server.uri())
	}

	#[tokio::test]
	async fn fetch_existing_tile_is_idempotent_without_network() {
		let dir = tempfile::tempdir().unwrap();
		let token_server = MockServer::start().await;
		Mock::given(method("POST")).respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "t"}))).mount(&token_server).await;
		let tile_server = MockServer::start().await;
		// no mocks mounted on tile_server: any request would fail the test

		let fetcher = build_fetcher(&dir, &tile_server, &token_server).await;
		let path = fetcher_path(&fetcher, &ctx(), 0, 0);
		std::fs::create_dir_all(path.parent().unwrap()).unwrap();
		std::fs::write(&path, b"already-there").unwrap();

		let outcome = fetcher.fetch_tile(&ctx(), 0, 0).await.unwrap();
		assert_eq!(outcome, TileOutcome::Saved(path));
	}

	#[tokio::test]
	async fn fetch_saves_image_response() {
		let dir = tempfile::tempdir().unwrap();
		let token_server = MockServer::start().await;
		Mock::given(method("POST")).respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "t"}))).mount(&token_server).await;
		let tile_server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path_regex(r"/cagstore/.*"))
			.respond_with(ResponseTemplate::new(200).set_body_bytes(b"jpeg-bytes".to_vec()).insert_header("content-type", "image/jpeg"))
			.mount(&tile_server)
			.await;

		let fetcher = build_fetcher(&dir, &tile_server, &token_server).await;
		let outcome = fetcher.fetch_tile(&ctx(), 0, 0).await.unwrap();
		match outcome {
			TileOutcome::Saved(path) => assert_eq!(std::fs::read(path).unwrap(), b"jpeg-bytes"),
			TileOutcome::Miss => panic!("expected a saved tile"),
		}
	}

	#[tokio::test]
	async fn fetch_reports_miss_after_exhausting_schedule() {
		let dir = tempfile::tempdir().unwrap();
		let token_server = MockServer::start().await;
		Mock::given(method("POST")).respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "t"}))).mount(&token_server).await;
		let tile_server = MockServer::start().await;
		Mock::given(method("GET")).and(path_regex(r"/cagstore/.*")).respond_with(ResponseTemplate::new(404)).mount(&tile_server).await;

		let fetcher = build_fetcher(&dir, &tile_server, &token_server).await;
		let outcome = fetcher.fetch_tile(&ctx(), 0, 0).await.unwrap();
		assert_eq!(outcome, TileOutcome::Miss);
	}

	fn fetcher_path(fetcher: &TileFetcher, ctx: &VariantContext, x: u32, y: u32) -> PathBuf {
		fetcher.paths.tile_path(&ctx.artist_id, &ctx.work_id, &ctx.resource_id, &ctx.variant_id, x, y)
	}
}
