//! Extracts selectable image variants from a resource-detail payload.
//!
//! The shape is inherently dynamic (SUHA/SUFA key dispatch, three distinct
//! sources for "the same kind of hdp entry"), so this walks the payload with
//! `harvest_core::json_walk` rather than typed `Deserialize` structs.

use harvest_core::json_walk::{first_non_empty, get_array, get_path, get_str};
use harvest_core::{Family, Variant};
use serde_json::Value;

/// Enumerates `{variantId, displayName}` tuples from a resource payload's
/// `data.{suha|sufa}.hdp` tree, in order: `hdpic`, then `hdpcoll.hdps[]`,
/// then the resource-level `otherHdps[]`. Deduplicates by id, keeping the
/// first occurrence.
#[must_use]
pub fn extract_variants(resource_data: &Value, family: Family) -> Vec<Variant> {
	let family_key = family.json_key();
	let Some(info) = get_path(resource_data, &[family_key]) else {
		return Vec::new();
	};
	let info_name = get_str(info, "name");

	let mut variants = Vec::new();
	if let Some(hdp) = get_path(info, &["hdp"]) {
		if let Some(hdpic) = get_path(hdp, &["hdpic"]) {
			push_if_new(&mut variants, hdpic, info_name);
		}
		if let Some(hdpcoll) = get_path(hdp, &["hdpcoll"]) {
			for item in get_array(hdpcoll, "hdps") {
				push_if_new(&mut variants, item, info_name);
			}
		}
	}
	for extra in get_array(info, "otherHdps") {
		push_if_new(&mut variants, extra, info_name);
	}

	dedup_by_id(variants)
}

fn push_if_new(variants: &mut Vec<Variant>, entry: &Value, parent_name: Option<&str>) {
	let Some(id) = get_str(entry, "resourceId") else { return };
	if id.is_empty() {
		return;
	}
	let name_field = get_str(entry, "name");
	let title_field = get_str(entry, "title");
	let display_name = first_non_empty(&[name_field, title_field, parent_name, Some(id)]).unwrap_or(id).to_string();
	variants.push(Variant { id: id.to_string(), display_name });
}

fn dedup_by_id(variants: Vec<Variant>) -> Vec<Variant> {
	let mut seen = std::collections::HashSet::new();
	variants.into_iter().filter(|v| seen.insert(v.id.clone())).collect()
}
