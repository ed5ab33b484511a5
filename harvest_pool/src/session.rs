//! Authenticated session bundles: a reqwest client bound to an optional
//! proxy, plus the tour token minted (or reused) for it.

use harvest_core::error::HarvestError;
use harvest_core::http::{random_user_agent, ACCEPT_LANGUAGE, ORIGIN, REFERER};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use std::time::Duration;

const ACCESS_TOKEN_URL: &str = "https://api.quanku.art/cag2.TouristService/getAccessToken";

/// One authenticated, proxied session: the HTTP client owns the proxy
/// binding and the fixed header set; `tour_token` is the only field
/// rotated in place.
pub struct SessionBundle {
	pub client: reqwest::Client,
	pub proxy: Option<String>,
	pub tour_token: String,
	access_token_url: String,
}

impl SessionBundle {
	/// Mints a fresh tour token through this bundle's own client, without
	/// rebuilding the client or touching its proxy binding. Used by token
	/// rotation when the token pool is empty.
	///
	/// # Errors
	/// See [`mint_token`].
	pub async fn mint_fresh_token(&self) -> Result<String, HarvestError> {
		mint_token(&self.client, &self.access_token_url).await
	}
}

/// Builds [`SessionBundle`]s: sets the fixed browser-like headers, binds an
/// optional proxy, and either reuses a supplied tour token or mints a fresh
/// one from the anonymous-access endpoint.
#[derive(Debug, Clone)]
pub struct SessionFactory {
	timeout: Duration,
	access_token_url: String,
}

impl SessionFactory {
	#[must_use]
	pub fn new(timeout: Duration) -> Self {
		Self { timeout, access_token_url: ACCESS_TOKEN_URL.to_string() }
	}

	/// Builds a factory against a non-default access-token endpoint; used
	/// by integration tests to point token minting at a local stub server.
	#[must_use]
	pub fn with_access_token_url(timeout: Duration, access_token_url: impl Into<String>) -> Self {
		Self { timeout, access_token_url: access_token_url.into() }
	}

	/// # Errors
	/// [`HarvestError::ProxyAuth`] if the token mint observes an HTTP
	/// 407/408, [`HarvestError::Transient`] on other request failures, or
	/// if the JSON response lacks a `token` field.
	pub async fn create(&self, proxy: Option<String>, reuse_token: Option<String>) -> Result<SessionBundle, HarvestError> {
		let mut builder = reqwest::Client::builder().timeout(self.timeout).default_headers(fixed_headers());
		if let Some(proxy_url) = &proxy {
			let proxy = reqwest::Proxy::all(proxy_url)
				.map_err(|e| HarvestError::Config { detail: format!("invalid proxy url {proxy_url}: {e}") })?;
			builder = builder.proxy(proxy);
		}
		let client = builder
			.build()
			.map_err(|e| HarvestError::Config { detail: format!("failed to build session client: {e}") })?;

		let tour_token = match reuse_token {
			Some(token) => token,
			None => mint_token(&client, &self.access_token_url).await?,
		};

		Ok(SessionBundle { client, proxy, tour_token, access_token_url: self.access_token_url.clone() })
	}
}

fn fixed_headers() -> HeaderMap {
	let mut headers = HeaderMap::new();
	headers.insert("accept", HeaderValue::from_static("application/json"));
	headers.insert("accept-language", HeaderValue::from_static(ACCEPT_LANGUAGE));
	headers.insert("content-type", HeaderValue::from_static("application/json;charset=UTF-8"));
	headers.insert("origin", HeaderValue::from_static(ORIGIN));
	headers.insert("referer", HeaderValue::from_static(REFERER));
	if let (Ok(name), Ok(value)) = (HeaderName::from_bytes(b"user-agent"), HeaderValue::from_str(random_user_agent())) {
		headers.insert(name, value);
	}
	headers
}

pub(crate) async fn mint_token(client: &reqwest::Client, access_token_url: &str) -> Result<String, HarvestError> {
	let response = client.post(access_token_url).body("{}").send().await.map_err(|e| {
		if e.to_string().contains("407") || e.to_string().contains("Proxy Authentication Required") {
			HarvestError::ProxyAuth { detail: e.to_string() }
		} else {
			HarvestError::Transient { detail: format!("getAccessToken request failed: {e}") }
		}
	})?;

	let status = response.status().as_u16();
	if status == 407 || status == 408 {
		return Err(HarvestError::ProxyAuth { detail: format!("getAccessToken returned HTTP {status}") });
	}

	let payload: Value = response
		.json()
		.await
		.map_err(|e| HarvestError::Transient { detail: format!("getAccessToken response is not JSON: {e}") })?;

	payload
		.get("token")
		.and_then(Value::as_str)
		.map(str::to_owned)
		.ok_or_else(|| HarvestError::Transient { detail: format!("getAccessToken response has no token field: {payload}") })
}
