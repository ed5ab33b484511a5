//! Vendor proxy allocation: `proxy.qg.net/allocate?Key=...&Num=...`.
//!
//! Stateless beyond the vendor secret — no retry here, callers (the
//! replacement algorithms in [`crate::pool`]) retry at a higher level.

use harvest_core::error::HarvestError;
use serde_json::Value;
use std::time::Duration;

const ALLOCATE_URL: &str = "https://proxy.qg.net/allocate";

/// Allocates outbound HTTP proxies from the vendor endpoint.
#[derive(Debug, Clone)]
pub struct ProxyProvider {
	client: reqwest::Client,
	key: String,
	allocate_url: String,
}

impl ProxyProvider {
	/// # Errors
	/// Returns [`HarvestError::Config`] if `key` is empty.
	pub fn new(key: String, timeout: Duration) -> Result<Self, HarvestError> {
		Self::with_allocate_url(key, timeout, ALLOCATE_URL)
	}

	/// Builds a provider against a non-default allocate endpoint; used by
	/// integration tests to point proxy allocation at a local stub server.
	///
	/// # Errors
	/// Returns [`HarvestError::Config`] if `key` is empty.
	pub fn with_allocate_url(key: String, timeout: Duration, allocate_url: impl Into<String>) -> Result<Self, HarvestError> {
		if key.trim().is_empty() {
			return Err(HarvestError::Config { detail: "proxy-vendor secret is empty".into() });
		}
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| HarvestError::Config { detail: format!("failed to build proxy client: {e}") })?;
		Ok(Self { client, key, allocate_url: allocate_url.into() })
	}

	/// Requests up to `n` proxy URLs. Each `Data[].host` entry is normalized
	/// to `http://host:port`; bare `host:port` strings are auto-prefixed,
	/// `{http, https}` objects use the `http` field.
	///
	/// # Errors
	/// [`HarvestError::FatalProxy`] when the response lacks a `Data` array
	/// or every entry is unparsable (the caller treats this the same as an
	/// exhausted rotation attempt).
	pub async fn allocate(&self, n: usize) -> Result<Vec<String>, HarvestError> {
		let url = format!("{}?Key={}&Num={n}", self.allocate_url, self.key);
		let response = self
			.client
			.get(&url)
			.send()
			.await
			.map_err(|e| HarvestError::Transient { detail: format!("proxy allocation request failed: {e}") })?;

		let payload: Value = response
			.json()
			.await
			.map_err(|e| HarvestError::Transient { detail: format!("proxy allocation response is not JSON: {e}") })?;

		let entries = payload
			.get("Data")
			.and_then(Value::as_array)
			.ok_or_else(|| HarvestError::FatalProxy { detail: format!("proxy allocation response has no Data array: {payload}") })?;

		let proxies: Vec<String> = entries.iter().filter_map(normalize_entry).collect();
		if proxies.is_empty() {
			return Err(HarvestError::FatalProxy { detail: "every proxy entry was unparsable".into() });
		}
		Ok(proxies)
	}
}

fn normalize_entry(entry: &Value) -> Option<String> {
	let host = entry.get("host")?;
	if let Some(bare) = host.as_str() {
		return Some(normalize_bare(bare));
	}
	host.get("http").and_then(Value::as_str).map(str::to_owned)
}

fn normalize_bare(bare: &str) -> String {
	if bare.starts_with("http://") || bare.starts_with("https://") {
		bare.to_string()
	} else {
		format!("http://{bare}")
	}
}
