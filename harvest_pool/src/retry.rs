//! The three-layer retry envelope: a short inner backoff around each raw
//! HTTP attempt, an outer rotation loop that swaps proxy/token on the
//! vendor's rejection codes, and a looser schedule for tile fetches, which
//! tolerate a miss (an absent tile) far more often than a catalog call does.

use harvest_core::error::HarvestError;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Backoff between the three inner-layer HTTP attempts, in seconds.
pub const INNER_BACKOFF_SECS: [f64; 3] = [1.0, 2.0, 4.0];

/// Backoff used around tile-specific fetch attempts when running with a
/// proxy pool; without one, tiles are fetched with a single attempt.
pub const TILE_BACKOFF_SECS: [f64; 3] = [1.0, 2.5, 4.5];

/// Runs `op` with the inner HTTP retry schedule: up to
/// [`INNER_BACKOFF_SECS`]'s length attempts, sleeping the listed duration
/// between them. An attempt that fails with a rotation-shaped error (proxy
/// auth or rate limit) escalates immediately instead of burning through the
/// rest of the schedule — the outer rotation loop, not another same-bundle
/// retry, is what can actually fix those. Returns the last error if every
/// attempt fails.
pub async fn with_inner_retry<T, F, Fut>(mut op: F) -> Result<T, HarvestError>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T, HarvestError>>,
{
	let mut last_err = None;
	for (attempt, delay) in INNER_BACKOFF_SECS.iter().enumerate() {
		if attempt > 0 {
			sleep(Duration::from_secs_f64(*delay)).await;
		}
		match op().await {
			Ok(value) => return Ok(value),
			Err(e) => {
				if classify(&e) != RotationAction::GiveUp {
					return Err(e);
				}
				last_err = Some(e);
			}
		}
	}
	Err(last_err.expect("schedule must contain at least one attempt"))
}

/// What the outer rotation loop should do after the inner retry layer gives
/// up on an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationAction {
	/// Replace the proxy binding entirely (and mint a fresh token).
	ReplaceProxy,
	/// Keep the proxy, rotate just the token.
	RotateToken,
	/// Not a rotation-shaped failure; surface the error to the caller.
	GiveUp,
}

/// Classifies a [`HarvestError`] for the outer rotation loop: proxy-auth
/// failures need a whole new proxy, rate limits just need a fresh token,
/// and everything else should propagate.
#[must_use]
pub fn classify(err: &HarvestError) -> RotationAction {
	if err.is_proxy_auth_shaped() {
		RotationAction::ReplaceProxy
	} else if err.is_rate_limit() {
		RotationAction::RotateToken
	} else {
		RotationAction::GiveUp
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicU32, Ordering};

	#[tokio::test]
	async fn inner_retry_returns_first_success() {
		let calls = AtomicU32::new(0);
		let result = with_inner_retry(|| async {
			calls.fetch_add(1, Ordering::SeqCst);
			Ok::<_, HarvestError>(42)
		})
		.await;
		assert_eq!(result.unwrap(), 42);
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn inner_retry_stops_after_schedule_length() {
		let calls = AtomicU32::new(0);
		let result: Result<(), HarvestError> = with_inner_retry(|| async {
			calls.fetch_add(1, Ordering::SeqCst);
			Err(HarvestError::Transient { detail: "nope".into() })
		})
		.await;
		assert!(result.is_err());
		assert_eq!(calls.load(Ordering::SeqCst), INNER_BACKOFF_SECS.len() as u32);
	}

	#[tokio::test]
	async fn inner_retry_escalates_immediately_on_rate_limit() {
		let calls = AtomicU32::new(0);
		let result: Result<(), HarvestError> = with_inner_retry(|| async {
			calls.fetch_add(1, Ordering::SeqCst);
			Err(HarvestError::RateLimit)
		})
		.await;
		assert!(matches!(result, Err(HarvestError::RateLimit)));
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn inner_retry_escalates_immediately_on_proxy_auth() {
		let calls = AtomicU32::new(0);
		let result: Result<(), HarvestError> = with_inner_retry(|| async {
			calls.fetch_add(1, Ordering::SeqCst);
			Err(HarvestError::Transient { detail: "407 Proxy Authentication Required".into() })
		})
		.await;
		assert!(result.is_err());
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn classify_maps_each_error_shape() {
		assert_eq!(classify(&HarvestError::ProxyAuth { detail: "x".into() }), RotationAction::ReplaceProxy);
		assert_eq!(classify(&HarvestError::RateLimit), RotationAction::RotateToken);
		assert_eq!(classify(&HarvestError::Transient { detail: "x".into() }), RotationAction::GiveUp);
	}
}
