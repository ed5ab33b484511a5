//! Typed wrapper over the four JSON catalog endpoints. Each call is bound
//! to a fixed primary-pool slot, runs through the outer rotation loop
//! (`crate::rotation`) around the inner HTTP retry (`harvest_pool::retry`),
//! and mirrors its raw response — or an `{error, request}` envelope on
//! failure — to the deterministic path under the rawdata tree.

use harvest_core::error::status_is_proxy_auth;
use harvest_core::json_walk::get;
use harvest_core::{Family, HarvestError, RawdataPaths};
use harvest_pool::retry::with_inner_retry;
use harvest_pool::{PoolKind, SessionPool};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;

const LIST_HUIA_URL: &str = "https://api.quanku.art/cag2.ArtistService/listHuiaOfArtist";
const LIST_SUFA_URL: &str = "https://api.quanku.art/cag2.ArtistService/listSufaOfArtist";
const GET_SUB_LIST_URL: &str = "https://api.quanku.art/cag2.ResourceService/getSubList";
const GET_RESOURCE_URL: &str = "https://api.quanku.art/cag2.ResourceService/getResource";

/// `skip`/`limit` page requested on every `listOfArtist` call — the source
/// always asks for the whole list in one page.
const LIST_PAGE_SKIP: u32 = 0;
const LIST_PAGE_LIMIT: u32 = 999;

#[derive(Debug, Clone)]
struct CatalogUrls {
	list_huia: String,
	list_sufa: String,
	sub_list: String,
	resource: String,
}

impl Default for CatalogUrls {
	fn default() -> Self {
		Self {
			list_huia: LIST_HUIA_URL.to_string(),
			list_sufa: LIST_SUFA_URL.to_string(),
			sub_list: GET_SUB_LIST_URL.to_string(),
			resource: GET_RESOURCE_URL.to_string(),
		}
	}
}

/// Bound to one artist's primary-pool slot: every call issued through this
/// client rotates that same slot, matching the source's "one session per
/// artist worker" discipline.
pub struct CatalogClient {
	pool: Arc<SessionPool>,
	paths: RawdataPaths,
	primary_index: usize,
	max_proxy_retries: u32,
	urls: CatalogUrls,
}

impl CatalogClient {
	#[must_use]
	pub fn new(pool: Arc<SessionPool>, paths: RawdataPaths, primary_index: usize, max_proxy_retries: u32) -> Self {
		Self { pool, paths, primary_index, max_proxy_retries, urls: CatalogUrls::default() }
	}

	/// Builds a client against a local stub server, used by integration
	/// tests in place of the real `api.quanku.art` endpoints.
	#[must_use]
	pub fn with_base_url(pool: Arc<SessionPool>, paths: RawdataPaths, primary_index: usize, max_proxy_retries: u32, base: &str) -> Self {
		Self {
			pool,
			paths,
			primary_index,
			max_proxy_retries,
			urls: CatalogUrls {
				list_huia: format!("{base}/listHuiaOfArtist"),
				list_sufa: format!("{base}/listSufaOfArtist"),
				sub_list: format!("{base}/getSubList"),
				resource: format!("{base}/getResource"),
			},
		}
	}

	/// `listHuiaOfArtist` / `listSufaOfArtist`: the one page (skip=0,
	/// limit=999) of an artist's works for `family`.
	///
	/// # Errors
	/// See [`CatalogClient::call`].
	pub async fn list_of_artist(&self, family: Family, artist_id: &str) -> Result<Value, HarvestError> {
		let url = match family {
			Family::Suha => self.urls.list_huia.clone(),
			Family::Sufa => self.urls.list_sufa.clone(),
		};
		let body = json!({
			"Id": artist_id,
			"page": {"skip": LIST_PAGE_SKIP, "limit": LIST_PAGE_LIMIT},
		});
		let mirror_path = self.paths.listing_path(artist_id, family);
		self.call(&url, body, &mirror_path).await
	}

	/// `getSubList`: the sub-resources (plus parent metadata) of one work.
	///
	/// # Errors
	/// See [`CatalogClient::call`].
	pub async fn get_sub_list(&self, artist_id: &str, work_id: &str, family: Family) -> Result<Value, HarvestError> {
		let body = json!({"src": family.src_tag(), "id": work_id});
		let mirror_path = self.paths.sub_list_path(artist_id, work_id);
		self.call(&self.urls.sub_list.clone(), body, &mirror_path).await
	}

	/// `getResource`: the detail payload (nested hdp trees) of one
	/// resource.
	///
	/// # Errors
	/// See [`CatalogClient::call`].
	pub async fn get_resource(&self, artist_id: &str, work_id: &str, resource_id: &str, family: Family) -> Result<Value, HarvestError> {
		let body = json!({"id": resource_id, "src": family.src_tag()});
		let mirror_path = self.paths.resource_json_path(artist_id, work_id, resource_id);
		self.call(&self.urls.resource.clone(), body, &mirror_path).await
	}

	async fn call(&self, url: &str, body: Value, mirror_path: &Path) -> Result<Value, HarvestError> {
		let result = crate::rotation::call_with_rotation(&self.pool, PoolKind::Primary, self.primary_index, self.max_proxy_retries, |client, token| {
			let mut request_body = body.clone();
			request_body["context"] = json!({"tourToken": token});
			let url = url.to_string();
			async move { post_and_classify(&client, &url, request_body).await }
		})
		.await;

		match &result {
			Ok(payload) => {
				if let Err(e) = write_json_mirror(mirror_path, payload) {
					log::warn!("failed to write catalog mirror at {}: {e}", mirror_path.display());
				}
			}
			Err(e) => {
				log::warn!("catalog call to {url} failed: {e}");
				let envelope = json!({"error": e.to_string(), "request": body});
				if let Err(write_err) = write_json_mirror(mirror_path, &envelope) {
					log::warn!("failed to write catalog error sentinel at {}: {write_err}", mirror_path.display());
				}
			}
		}
		result
	}
}

/// One raw attempt: POST, classify 407/408 and `{Code: -11}` immediately,
/// otherwise return the parsed payload. Wrapped by `with_inner_retry` for
/// the three-attempt backoff schedule and by `call_with_rotation` for
/// proxy/token rotation.
async fn post_and_classify(client: &reqwest::Client, url: &str, body: Value) -> Result<Value, HarvestError> {
	with_inner_retry(|| {
		let body = body.clone();
		async move {
			let response = client.post(url).json(&body).send().await.map_err(|e| {
				let text = e.to_string();
				if text.contains("407") || text.contains("Proxy Authentication Required") {
					HarvestError::ProxyAuth { detail: text }
				} else {
					HarvestError::Transient { detail: format!("request to {url} failed: {text}") }
				}
			})?;

			let status = response.status().as_u16();
			if status_is_proxy_auth(status) {
				return Err(HarvestError::ProxyAuth { detail: format!("{url} returned HTTP {status}") });
			}

			let payload: Value = response.json().await.map_err(|e| HarvestError::Transient { detail: format!("{url} response is not JSON: {e}") })?;

			if get(&payload, "Code").and_then(Value::as_i64) == Some(-11) {
				return Err(HarvestError::RateLimit);
			}

			Ok(payload)
		}
	})
	.await
}

fn write_json_mirror(path: &Path, value: &Value) -> std::io::Result<()> {
	if let Some(parent) = path.parent() {
		std::fs::create_dir_all(parent)?;
	}
	let bytes = serde_json::to_vec_pretty(value).unwrap_or_else(|_| b"{}".to_vec());
	std::fs::write(path, bytes)
}
