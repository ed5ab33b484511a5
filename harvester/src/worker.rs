//! The per-artist traversal: catalog listings → sub-lists → resource
//! detail → variant extraction → grid probe, with completion markers at the
//! variant and artist level providing the only durable cancellation
//! contract.

use crate::catalog::CatalogClient;
use crate::grid::GridProber;
use crate::tile::{TileFetcher, VariantContext};
use crate::variant::extract_variants;
use harvest_core::json_walk::{first_non_empty, get_array, get_path, get_str};
use harvest_core::model::is_valid_id;
use harvest_core::{write_completion_marker, ArtistRecord, Family, RawdataPaths, Variant, Work};
use harvest_pool::SessionPool;
use serde_json::Value;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Drives one artist's full traversal against a shared [`SessionPool`] and
/// [`TileFetcher`]. Cheap to construct per coordinator; the expensive state
/// (pool, fetcher) is shared via `Arc`.
pub struct ArtistWorker {
	pool: Arc<SessionPool>,
	tile_fetcher: Arc<TileFetcher>,
	paths: RawdataPaths,
	max_proxy_retries: u32,
	catalog_base_url: Option<String>,
}

impl ArtistWorker {
	#[must_use]
	pub fn new(pool: Arc<SessionPool>, tile_fetcher: Arc<TileFetcher>, paths: RawdataPaths, max_proxy_retries: u32) -> Self {
		Self { pool, tile_fetcher, paths, max_proxy_retries, catalog_base_url: None }
	}

	/// Builds a worker whose catalog calls target a local stub server
	/// instead of the real `api.quanku.art` endpoints; used by integration
	/// tests.
	#[must_use]
	pub fn with_catalog_base_url(pool: Arc<SessionPool>, tile_fetcher: Arc<TileFetcher>, paths: RawdataPaths, max_proxy_retries: u32, catalog_base_url: impl Into<String>) -> Self {
		Self { pool, tile_fetcher, paths, max_proxy_retries, catalog_base_url: Some(catalog_base_url.into()) }
	}

	/// Runs the full traversal for one artist. Never returns an error: every
	/// failure short of missing a primary session is logged and treated as
	/// a partial success so the coordinator's other workers are unaffected.
	pub async fn run(&self, artist_index: usize, artist: &ArtistRecord) {
		let marker = self.paths.artist_marker(&artist.id);
		if marker.exists() {
			log::info!("artist {} ({}) already complete, skipping", artist.id, artist.name);
			return;
		}

		let primary_index = match self.pool.get_primary(artist_index).await {
			Ok((_, _, index)) => index,
			Err(e) => {
				log::error!("artist {} ({}): could not obtain a primary session, aborting this artist: {e}", artist.id, artist.name);
				return;
			}
		};

		let catalog = match &self.catalog_base_url {
			Some(base) => CatalogClient::with_base_url(Arc::clone(&self.pool), self.paths.clone(), primary_index, self.max_proxy_retries, base),
			None => CatalogClient::new(Arc::clone(&self.pool), self.paths.clone(), primary_index, self.max_proxy_retries),
		};

		let mut works = Vec::new();
		for family in [Family::Suha, Family::Sufa] {
			match catalog.list_of_artist(family, &artist.id).await {
				Ok(payload) => works.extend(parse_works(&payload, family)),
				Err(e) => log::warn!("artist {} ({}): {family:?} listing failed: {e}", artist.id, artist.name),
			}
		}
		log::info!("artist {} ({}): {} works across both families", artist.id, artist.name, works.len());

		let mut any_work_downloaded = false;
		for work in &works {
			if self.process_work(&catalog, &artist.id, work).await {
				any_work_downloaded = true;
			}
		}

		if any_work_downloaded {
			if let Err(e) = write_completion_marker(&marker, unix_now()) {
				log::warn!("failed to write artist completion marker at {}: {e}", marker.display());
			}
		} else {
			log::info!("artist {} ({}): no work produced a download, no completion marker written", artist.id, artist.name);
		}
	}

	/// Expands one work into its resources (via the sub-list endpoint, or a
	/// synthesized fallback resource when the sub-list is empty) and probes
	/// every resource's variants. Returns whether any variant saved a tile.
	async fn process_work(&self, catalog: &CatalogClient, artist_id: &str, work: &Work) -> bool {
		let sub_list = match catalog.get_sub_list(artist_id, &work.id, work.family).await {
			Ok(payload) => payload,
			Err(e) => {
				log::warn!("work {} ({artist_id}): sub-list fetch failed: {e}", work.id);
				return false;
			}
		};

		let entries = get_array(&sub_list, "data");
		if entries.is_empty() {
			return self.process_fallback_resource(catalog, artist_id, work, &sub_list).await;
		}

		let mut downloaded = false;
		for entry in entries {
			let Some(child) = sub_entry_child(entry, work.family) else { continue };
			let Some(resource_id) = get_str(child, "Id") else { continue };
			if !is_valid_id(resource_id) {
				continue;
			}
			let display_name =
				first_non_empty(&[get_str(child, "name"), get_str(child, "title"), Some(work.display_name.as_str())]).unwrap_or(resource_id).to_string();

			if self.process_resource(catalog, artist_id, work, resource_id, &display_name).await {
				downloaded = true;
			}
		}
		downloaded
	}

	/// An empty sub-list synthesizes a single resource from the sub-list
	/// response's `parentData.{suha|sufa}` metadata, falling back to the
	/// work's own id/name if even that is missing.
	async fn process_fallback_resource(&self, catalog: &CatalogClient, artist_id: &str, work: &Work, sub_list: &Value) -> bool {
		let parent = get_path(sub_list, &["parentData", work.family.json_key()]);
		let resource_id = parent.and_then(|p| get_str(p, "Id")).filter(|id| is_valid_id(id)).unwrap_or(&work.id);
		let display_name = parent
			.and_then(|p| first_non_empty(&[get_str(p, "name"), get_str(p, "title")]))
			.unwrap_or(work.display_name.as_str())
			.to_string();

		self.process_resource(catalog, artist_id, work, resource_id, &display_name).await
	}

	/// Fetches one resource's detail payload, extracts its variants
	/// (synthesizing a fallback variant equal to the resource if extraction
	/// yields none), and probes every variant's tile grid. Returns whether
	/// any variant saved a tile.
	async fn process_resource(&self, catalog: &CatalogClient, artist_id: &str, work: &Work, resource_id: &str, display_name: &str) -> bool {
		let resource_payload = match catalog.get_resource(artist_id, &work.id, resource_id, work.family).await {
			Ok(payload) => payload,
			Err(e) => {
				log::warn!("resource {resource_id} ({artist_id}/{}): fetch failed: {e}", work.id);
				return false;
			}
		};

		let data = get_path(&resource_payload, &["data"]).cloned().unwrap_or(Value::Null);
		let mut variants = extract_variants(&data, work.family);
		if variants.is_empty() {
			variants.push(Variant { id: resource_id.to_string(), display_name: display_name.to_string() });
		}

		let mut downloaded = false;
		for variant in variants {
			if self.process_variant(artist_id, work, resource_id, &variant).await {
				downloaded = true;
			}
		}
		downloaded
	}

	async fn process_variant(&self, artist_id: &str, work: &Work, resource_id: &str, variant: &Variant) -> bool {
		let marker = self.paths.variant_marker(artist_id, &work.id, resource_id, &variant.id);
		if marker.exists() {
			return true;
		}

		let ctx = VariantContext {
			artist_id: artist_id.to_string(),
			work_id: work.id.clone(),
			resource_id: resource_id.to_string(),
			variant_id: variant.id.clone(),
			family: work.family,
		};

		let prober = GridProber::new(self.tile_fetcher.as_ref(), &self.paths);
		match prober.probe(&ctx).await {
			Ok(outcome) => outcome.any_tile_saved,
			Err(e) => {
				log::warn!("variant {} ({artist_id}/{}/{resource_id}): grid probe failed: {e}", variant.id, work.id);
				false
			}
		}
	}
}

/// Reads a sub-list entry's child object: always tries `"suha"` first, and
/// only falls back to `"sufa"` when the work's family is SUFA and `"suha"`
/// was absent. A SUFA work's sub-entries carry their child under `"suha"`
/// far more often than under `"sufa"` itself.
fn sub_entry_child(entry: &Value, family: Family) -> Option<&Value> {
	get_path(entry, &["suha"]).or_else(|| if family == Family::Sufa { get_path(entry, &["sufa"]) } else { None })
}

/// Parses a `listHuiaOfArtist`/`listSufaOfArtist` response's `data` array
/// into [`Work`]s, reading the entity id from the PascalCase `Id` field and
/// filtering out entries with an empty or missing one.
fn parse_works(payload: &Value, family: Family) -> Vec<Work> {
	get_array(payload, "data")
		.iter()
		.filter_map(|entry| {
			let id = get_str(entry, "Id")?;
			if !is_valid_id(id) {
				return None;
			}
			let display_name = first_non_empty(&[get_str(entry, "name"), get_str(entry, "title")]).unwrap_or(id).to_string();
			Some(Work { id: id.to_string(), display_name, family })
		})
		.collect()
}

fn unix_now() -> u64 {
	SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn parse_works_filters_empty_ids_and_falls_back_display_name() {
		let payload = json!({"data": [
			{"Id": "W1", "name": "Work One"},
			{"Id": "", "name": "Nobody"},
			{"Id": "W2"},
		]});
		let works = parse_works(&payload, Family::Suha);
		assert_eq!(works.len(), 2);
		assert_eq!(works[0].display_name, "Work One");
		assert_eq!(works[1].display_name, "W2");
		assert!(works.iter().all(|w| w.family == Family::Suha));
	}

	#[test]
	fn parse_works_ignores_entries_missing_the_id_field() {
		let payload = json!({"data": [{"name": "No id here"}]});
		let works = parse_works(&payload, Family::Sufa);
		assert!(works.is_empty());
	}

	#[test]
	fn sub_entry_child_prefers_suha_even_for_sufa_works() {
		let entry = json!({"suha": {"Id": "R1"}});
		let child = sub_entry_child(&entry, Family::Sufa).unwrap();
		assert_eq!(get_str(child, "Id"), Some("R1"));
	}

	#[test]
	fn sub_entry_child_falls_back_to_sufa_only_for_sufa_family() {
		let entry = json!({"sufa": {"Id": "R2"}});
		assert!(sub_entry_child(&entry, Family::Suha).is_none(), "SUHA works must not fall back to the sufa key");

		let child = sub_entry_child(&entry, Family::Sufa).unwrap();
		assert_eq!(get_str(child, "Id"), Some("R2"));
	}
}
