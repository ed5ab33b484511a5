//! The session pool: a primary tier sized to the worker count plus a larger
//! secondary tier used for tile-grid fan-out, both replaceable in place when
//! a bundle's proxy goes bad.
//!
//! Replacement performs network I/O (allocating a new proxy, minting or
//! reusing a token) inside its critical section, so the pool state lives
//! behind a [`tokio::sync::Mutex`] rather than `parking_lot`'s: a
//! `parking_lot::MutexGuard` is not `Send` across an `.await` point, and
//! every replacement here awaits one.

use crate::proxy::ProxyProvider;
use crate::session::{SessionBundle, SessionFactory};
use crate::token_pool::TokenPool;
use harvest_core::error::HarvestError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;

const REPLACEMENT_RETRY_DELAY: Duration = Duration::from_secs(1);
const TOKEN_WARMUP_MAX_ATTEMPT_FACTOR: usize = 3;
const TOKEN_WARMUP_RATE_LIMIT_DELAY: Duration = Duration::from_secs(1);

/// Which tier a rotation request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
	Primary,
	Secondary,
}

struct Inner {
	primary: Vec<SessionBundle>,
	secondary: Vec<SessionBundle>,
	tokens: TokenPool,
}

/// Owns both session tiers and the spare-token stash; cheap to clone
/// (`Arc`-wrapped by callers) and safe to share across worker tasks.
pub struct SessionPool {
	inner: Mutex<Inner>,
	proxy: ProxyProvider,
	factory: SessionFactory,
	use_proxy: bool,
	max_proxy_retries: u32,
	secondary_counter: AtomicUsize,
}

impl SessionPool {
	/// Builds the pool and fills both tiers, minting one token per primary
	/// slot and reusing it for the corresponding first secondary slots.
	///
	/// # Errors
	/// Propagates the first [`HarvestError`] hit while allocating proxies
	/// or minting the initial sessions.
	pub async fn build(
		proxy: ProxyProvider,
		factory: SessionFactory,
		use_proxy: bool,
		primary_size: usize,
		secondary_size: usize,
		token_capacity: usize,
		max_proxy_retries: u32,
	) -> Result<Self, HarvestError> {
		let primary_proxies = if use_proxy { proxy.allocate(primary_size.max(1)).await? } else { Vec::new() };
		let mut primary = Vec::with_capacity(primary_size);
		for i in 0..primary_size {
			let proxy_url = if use_proxy { primary_proxies.get(i % primary_proxies.len().max(1)).cloned() } else { None };
			primary.push(factory.create(proxy_url, None).await?);
		}

		let secondary_proxies = if use_proxy { proxy.allocate(secondary_size.max(1)).await? } else { Vec::new() };
		let mut secondary = Vec::with_capacity(secondary_size);
		for i in 0..secondary_size {
			let proxy_url = if use_proxy { secondary_proxies.get(i % secondary_proxies.len().max(1)).cloned() } else { None };
			secondary.push(factory.create(proxy_url, None).await?);
		}

		let mut tokens = TokenPool::new(token_capacity);
		for bundle in primary.iter().chain(secondary.iter()) {
			tokens.push(bundle.tour_token.clone());
		}

		Ok(Self {
			inner: Mutex::new(Inner { primary, secondary, tokens }),
			proxy,
			factory,
			use_proxy,
			max_proxy_retries,
			secondary_counter: AtomicUsize::new(0),
		})
	}

	/// Returns the tour token currently bound to primary slot `index`.
	///
	/// # Panics
	/// Panics if `index` is out of range for the primary tier; callers
	/// index by worker id and the tier is sized to the worker count.
	pub async fn primary_token(&self, index: usize) -> String {
		self.inner.lock().await.primary[index].tour_token.clone()
	}

	/// Clones the reqwest client bound to primary slot `index`.
	pub async fn primary_client(&self, index: usize) -> reqwest::Client {
		self.inner.lock().await.primary[index].client.clone()
	}

	/// Clones the reqwest client and token for the secondary slot at
	/// `index % secondary_len`, so callers can round-robin past the tier
	/// size without bounds-checking.
	pub async fn secondary_at(&self, index: usize) -> (reqwest::Client, String) {
		let inner = self.inner.lock().await;
		let len = inner.secondary.len().max(1);
		let bundle = &inner.secondary[index % len];
		(bundle.client.clone(), bundle.tour_token.clone())
	}

	pub async fn secondary_len(&self) -> usize {
		self.inner.lock().await.secondary.len()
	}

	/// Claims the next secondary slot in round-robin order: a monotone
	/// counter owned by the pool, wrapped into the tier's size, so
	/// concurrently racing tile fetches fan out evenly across the tier
	/// instead of every caller picking its own (possibly colliding) index.
	///
	/// Returns the client, token, and the resolved slot index, so the
	/// caller can feed the slot back into [`SessionPool::replace`] if the
	/// fetch through it fails.
	pub async fn next_secondary(&self) -> (reqwest::Client, String, usize) {
		let counter = self.secondary_counter.fetch_add(1, Ordering::Relaxed);
		let inner = self.inner.lock().await;
		let len = inner.secondary.len().max(1);
		let slot = counter % len;
		let bundle = &inner.secondary[slot];
		(bundle.client.clone(), bundle.tour_token.clone(), slot)
	}

	/// Resolves the primary slot for global artist index `i`. Every time
	/// `i` lands on a fresh cycle through the tier (`i % tier_size == 0`),
	/// the entire primary tier is torn down and rebuilt from fresh proxies
	/// before the token pool is topped back up, so a new batch of artists
	/// starts on sessions that haven't been seen by the vendor yet.
	///
	/// # Errors
	/// Propagates [`HarvestError`] from proxy allocation or session
	/// creation during the rebuild.
	pub async fn get_primary(&self, i: usize) -> Result<(reqwest::Client, String, usize), HarvestError> {
		let tier_size = self.inner.lock().await.primary.len().max(1);
		let slot = i % tier_size;
		if i % tier_size == 0 {
			self.rebuild_primary().await?;
			self.warm_token_pool().await;
		}
		let inner = self.inner.lock().await;
		let bundle = &inner.primary[slot];
		Ok((bundle.client.clone(), bundle.tour_token.clone(), slot))
	}

	async fn rebuild_primary(&self) -> Result<(), HarvestError> {
		let tier_size = self.inner.lock().await.primary.len();
		let proxies = if self.use_proxy { self.proxy.allocate(tier_size.max(1)).await? } else { Vec::new() };

		let mut fresh = Vec::with_capacity(tier_size);
		for i in 0..tier_size {
			let proxy_url = if self.use_proxy { proxies.get(i % proxies.len().max(1)).cloned() } else { None };
			fresh.push(self.factory.create(proxy_url, None).await?);
		}

		let mut inner = self.inner.lock().await;
		for bundle in &fresh {
			inner.tokens.push(bundle.tour_token.clone());
		}
		inner.primary = fresh;
		Ok(())
	}

	/// Tops the spare-token stash back up through the (freshly rebuilt)
	/// first primary slot, tolerating rate-limit rejections with a short
	/// sleep since the vendor throttles token minting bursts.
	async fn warm_token_pool(&self) {
		let target = { self.inner.lock().await.tokens.capacity() };
		if target == 0 {
			return;
		}
		let max_attempts = target.saturating_mul(TOKEN_WARMUP_MAX_ATTEMPT_FACTOR);
		let mut minted = 0;
		for _ in 0..max_attempts {
			if minted >= target {
				break;
			}
			let token = {
				let inner = self.inner.lock().await;
				match inner.primary.first() {
					Some(bundle) => bundle.mint_fresh_token().await,
					None => return,
				}
			};
			match token {
				Ok(tok) => {
					self.inner.lock().await.tokens.push(tok);
					minted += 1;
				}
				Err(e) if e.is_rate_limit() => sleep(TOKEN_WARMUP_RATE_LIMIT_DELAY).await,
				Err(_) => sleep(TOKEN_WARMUP_RATE_LIMIT_DELAY).await,
			}
		}
	}

	/// Replaces the bundle at `index` in `kind`'s tier: allocates a new
	/// proxy, builds a session against it (minting a fresh token unless
	/// `force_new_token` is false and the spare-token stash has one to
	/// reuse), and swaps it in. Retries proxy allocation up to
	/// `max_proxy_retries` times with a short delay between attempts before
	/// giving up.
	///
	/// # Errors
	/// The last [`HarvestError`] observed once retries are exhausted.
	pub async fn replace(&self, kind: PoolKind, index: usize, force_new_token: bool) -> Result<(), HarvestError> {
		let mut last_err = None;
		for attempt in 0..self.max_proxy_retries {
			if attempt > 0 {
				sleep(REPLACEMENT_RETRY_DELAY).await;
			}
			match self.try_replace_once(kind, index, force_new_token).await {
				Ok(()) => return Ok(()),
				Err(e) => last_err = Some(e),
			}
		}
		Err(last_err.unwrap_or(HarvestError::FatalProxy { detail: "replacement retries exhausted with no recorded error".into() }))
	}

	async fn try_replace_once(&self, kind: PoolKind, index: usize, force_new_token: bool) -> Result<(), HarvestError> {
		let proxy_url = if self.use_proxy { self.proxy.allocate(1).await?.into_iter().next() } else { None };

		let reuse_token = if force_new_token {
			None
		} else {
			let mut inner = self.inner.lock().await;
			inner.tokens.pop()
		};

		let bundle = self.factory.create(proxy_url, reuse_token).await?;

		let mut inner = self.inner.lock().await;
		inner.tokens.push(bundle.tour_token.clone());
		match kind {
			PoolKind::Primary => inner.primary[index] = bundle,
			PoolKind::Secondary => inner.secondary[index] = bundle,
		}
		Ok(())
	}

	/// Rotates just the token for `kind`'s slot at `index`, keeping the same
	/// proxy binding. Used when the vendor rejects a token (rate limit)
	/// rather than the proxy itself.
	///
	/// # Errors
	/// Propagates [`HarvestError`] from minting the replacement token.
	pub async fn rotate_token(&self, kind: PoolKind, index: usize) -> Result<(), HarvestError> {
		let reused = {
			let mut inner = self.inner.lock().await;
			let old_token = match kind {
				PoolKind::Primary => inner.primary[index].tour_token.clone(),
				PoolKind::Secondary => inner.secondary[index].tour_token.clone(),
			};
			inner.tokens.discard(&old_token);
			inner.tokens.pop()
		};

		let new_token = match reused {
			Some(token) => token,
			None => {
				let proxy_url = {
					let inner = self.inner.lock().await;
					match kind {
						PoolKind::Primary => inner.primary[index].proxy.clone(),
						PoolKind::Secondary => inner.secondary[index].proxy.clone(),
					}
				};
				let scratch = self.factory.create(proxy_url, None).await?;
				scratch.tour_token
			}
		};

		let mut inner = self.inner.lock().await;
		inner.tokens.push(new_token.clone());
		match kind {
			PoolKind::Primary => inner.primary[index].tour_token = new_token,
			PoolKind::Secondary => inner.secondary[index].tour_token = new_token,
		}
		Ok(())
	}

	/// Replaces every secondary-tier slot, used after a crawl phase that
	/// burned through the tier's tokens (e.g. a full grid-probe pass).
	///
	/// # Errors
	/// The first [`HarvestError`] hit while replacing any slot.
	pub async fn refresh_secondary_all(&self, force_new_token: bool) -> Result<(), HarvestError> {
		let len = self.inner.lock().await.secondary.len();
		for index in 0..len {
			self.replace(PoolKind::Secondary, index, force_new_token).await?;
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;
	use wiremock::matchers::method;
	use wiremock::{Mock, MockServer, ResponseTemplate};

	#[test]
	fn pool_kind_equality() {
		assert_eq!(PoolKind::Primary, PoolKind::Primary);
		assert_ne!(PoolKind::Primary, PoolKind::Secondary);
	}

	async fn stub_token_server() -> MockServer {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "stub-token"})))
			.mount(&server)
			.await;
		server
	}

	async fn build_no_proxy_pool(server: &MockServer, primary_size: usize, secondary_size: usize) -> SessionPool {
		let factory = SessionFactory::with_access_token_url(Duration::from_secs(5), format!("{}/token", server.uri()));
		let proxy = ProxyProvider::new("disabled".to_string(), Duration::from_secs(5)).unwrap();
		SessionPool::build(proxy, factory, false, primary_size, secondary_size, 10, 3).await.unwrap()
	}

	#[tokio::test]
	async fn next_secondary_round_robins_across_the_tier() {
		let server = stub_token_server().await;
		let pool = build_no_proxy_pool(&server, 2, 3).await;

		let slots: Vec<usize> = futures::future::join_all((0..6).map(|_| pool.next_secondary()))
			.await
			.into_iter()
			.map(|(_, _, slot)| slot)
			.collect();
		assert_eq!(slots, vec![0, 1, 2, 0, 1, 2]);
	}

	#[tokio::test]
	async fn get_primary_wraps_within_tier() {
		let server = stub_token_server().await;
		let pool = build_no_proxy_pool(&server, 3, 3).await;

		let (_, _, slot0) = pool.get_primary(0).await.unwrap();
		let (_, _, slot1) = pool.get_primary(1).await.unwrap();
		let (_, _, slot3) = pool.get_primary(3).await.unwrap();
		assert_eq!(slot0, 0);
		assert_eq!(slot1, 1);
		assert_eq!(slot3, 0);
	}

	#[tokio::test]
	async fn get_primary_rebuild_keeps_token_pool_populated() {
		let server = stub_token_server().await;
		let pool = build_no_proxy_pool(&server, 2, 2).await;

		pool.get_primary(0).await.unwrap();
		let spare = pool.inner.lock().await.tokens.spare();
		assert!(spare < 10);
	}

	#[tokio::test]
	async fn rotate_token_never_reuses_the_failing_token() {
		let server = stub_token_server().await;
		let pool = build_no_proxy_pool(&server, 1, 0).await;

		{
			let mut inner = pool.inner.lock().await;
			inner.primary[0].tour_token = "failing-token".to_string();
			inner.tokens = TokenPool::new(10);
			inner.tokens.push("failing-token".to_string());
		}

		pool.rotate_token(PoolKind::Primary, 0).await.unwrap();

		let inner = pool.inner.lock().await;
		assert_ne!(inner.primary[0].tour_token, "failing-token", "the failing token must not be handed back out");
		assert!(!inner.tokens.contains("failing-token"));
	}
}
