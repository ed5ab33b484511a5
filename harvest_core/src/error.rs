//! The closed error taxonomy the retry and rotation layers dispatch on.
//!
//! Everything above the rotation layer (the coordinator, the CLI) just
//! propagates `anyhow::Result`; `HarvestError` exists so the rotation wrapper
//! can `match` on *kind* instead of string-sniffing an opaque error.

use std::fmt;

/// The error classes from the harvest engine's retry/rotation design.
#[derive(Debug)]
pub enum HarvestError {
	/// HTTP 407/408, or a transport error whose message chain mentions
	/// "407 Proxy Authentication Required". Reaction: rotate the implicated
	/// bundle's proxy (and force a fresh token).
	ProxyAuth { detail: String },

	/// The JSON payload carried `{"Code": -11}`. Reaction: rotate the token
	/// on the implicated bundle, consulting the token pool first.
	RateLimit,

	/// Generic network failure or a non-JSON response body. Reaction: inner
	/// delay-and-retry, bounded by the inner attempt cap.
	Transient { detail: String },

	/// Proxy-rotation attempts were exhausted without landing a working
	/// bundle. Reaction: fail the current call; callers treat this as a
	/// partial failure of the containing unit of work, never as a reason to
	/// kill sibling workers.
	FatalProxy { detail: String },

	/// A filesystem write (tile bytes, marker, JSON mirror) failed.
	/// Reaction: log and treat the affected unit as a miss; this does not
	/// consume a retry slot because retrying won't change a filesystem
	/// error.
	LocalFilesystem { detail: String },

	/// Missing CSV path or missing proxy-vendor secret. Reaction: abort the
	/// process before any worker starts.
	Config { detail: String },
}

impl fmt::Display for HarvestError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			HarvestError::ProxyAuth { detail } => write!(f, "proxy authentication failed: {detail}"),
			HarvestError::RateLimit => write!(f, "rate limited (Code -11)"),
			HarvestError::Transient { detail } => write!(f, "transient transport error: {detail}"),
			HarvestError::FatalProxy { detail } => write!(f, "proxy rotation exhausted: {detail}"),
			HarvestError::LocalFilesystem { detail } => write!(f, "local filesystem error: {detail}"),
			HarvestError::Config { detail } => write!(f, "configuration error: {detail}"),
		}
	}
}

impl std::error::Error for HarvestError {}

impl HarvestError {
	/// True for [`HarvestError::ProxyAuth`]; also fires on a transient
	/// transport error whose message mentions "407 Proxy Authentication
	/// Required" anywhere in its chain, matching the source's cause-chain
	/// text match.
	#[must_use]
	pub fn is_proxy_auth_shaped(&self) -> bool {
		match self {
			HarvestError::ProxyAuth { .. } => true,
			HarvestError::Transient { detail } => detail.contains("407 Proxy Authentication Required"),
			_ => false,
		}
	}

	#[must_use]
	pub fn is_rate_limit(&self) -> bool {
		matches!(self, HarvestError::RateLimit)
	}
}

/// Inspects an HTTP status code the way the retry envelope does: 407/408
/// escalate immediately to proxy-auth, anything else is left to the caller.
#[must_use]
pub fn status_is_proxy_auth(status: u16) -> bool {
	status == 407 || status == 408
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn proxy_auth_detected_from_status() {
		assert!(status_is_proxy_auth(407));
		assert!(status_is_proxy_auth(408));
		assert!(!status_is_proxy_auth(404));
		assert!(!status_is_proxy_auth(500));
	}

	#[test]
	fn transient_with_407_text_is_proxy_auth_shaped() {
		let err = HarvestError::Transient {
			detail: "connect error: 407 Proxy Authentication Required".to_string(),
		};
		assert!(err.is_proxy_auth_shaped());
	}

	#[test]
	fn plain_transient_is_not_proxy_auth_shaped() {
		let err = HarvestError::Transient {
			detail: "connection reset by peer".to_string(),
		};
		assert!(!err.is_proxy_auth_shaped());
	}

	#[test]
	fn rate_limit_kind_check() {
		assert!(HarvestError::RateLimit.is_rate_limit());
		assert!(!HarvestError::FatalProxy { detail: String::new() }.is_rate_limit());
	}

	#[test]
	fn display_messages_are_human_readable() {
		assert_eq!(
			HarvestError::Config {
				detail: "missing QINGGOU_KEY".into()
			}
			.to_string(),
			"configuration error: missing QINGGOU_KEY"
		);
	}
}
