//! The outer rotation loop: wraps a catalog call with (pool, kind, index)
//! context and reacts to the error classes `with_inner_retry` escalates,
//! rotating the implicated session bundle instead of just retrying through
//! it.

use harvest_core::error::HarvestError;
use harvest_pool::retry::{classify, RotationAction};
use harvest_pool::{PoolKind, SessionPool};
use std::future::Future;

/// Runs `op` against the slot currently bound to `(kind, index)`, rotating
/// on rate-limit (token only) or proxy-auth (whole bundle) until `op`
/// succeeds or the pool's retry budget is exhausted.
///
/// `op` receives the up-to-date `(client, token)` pair on every attempt —
/// after a rotation the caller always sees the slot's current bundle, never
/// a stale one captured before the swap.
///
/// # Errors
/// The last [`HarvestError`] observed once rotation gives up (`GiveUp`
/// propagates immediately; `ReplaceProxy`/`RotateToken` retry until
/// `max_proxy_retries` rotations have been attempted).
pub async fn call_with_rotation<T, F, Fut>(
	pool: &SessionPool,
	kind: PoolKind,
	index: usize,
	max_proxy_retries: u32,
	mut op: F,
) -> Result<T, HarvestError>
where
	F: FnMut(reqwest::Client, String) -> Fut,
	Fut: Future<Output = Result<T, HarvestError>>,
{
	for _ in 0..max_proxy_retries.max(1) {
		let (client, token) = current_bundle(pool, kind, index).await;
		match op(client, token).await {
			Ok(value) => return Ok(value),
			Err(e) => match classify(&e) {
				RotationAction::ReplaceProxy => {
					pool.replace(kind, index, true).await?;
				}
				RotationAction::RotateToken => {
					pool.rotate_token(kind, index).await?;
				}
				RotationAction::GiveUp => return Err(e),
			},
		}
	}
	Err(HarvestError::FatalProxy { detail: "rotation retries exhausted".into() })
}

async fn current_bundle(pool: &SessionPool, kind: PoolKind, index: usize) -> (reqwest::Client, String) {
	match kind {
		PoolKind::Primary => (pool.primary_client(index).await, pool.primary_token(index).await),
		PoolKind::Secondary => pool.secondary_at(index).await,
	}
}
