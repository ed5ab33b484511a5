//! A small, explicit walker over `serde_json::Value`.
//!
//! The catalog payloads are dynamically shaped (SUHA/SUFA key dispatch, three
//! different sources for "the same kind of sub-object"), so typed
//! `Deserialize` structs would just grow a thicket of `Option` fields. This
//! module gives narrow, named accessors that return `Option`/`Result`
//! explicitly instead of chains of `unwrap()` — the host toolbox's own
//! dynamic-JSON module takes the same shape, generalized here from a
//! parse/stringify pair to a typed accessor pair.

use serde_json::Value;

/// Borrows `value.key` as an object field, if `value` is an object and the
/// field is present.
#[must_use]
pub fn get<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
	value.as_object()?.get(key)
}

/// Walks a `.`-free chain of object keys, short-circuiting to `None` as soon
/// as a link is missing or not an object.
#[must_use]
pub fn get_path<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
	let mut current = value;
	for key in path {
		current = get(current, key)?;
	}
	Some(current)
}

/// Reads a string field, falling through `None` for anything that isn't a
/// JSON string (including a present-but-wrong-typed field).
#[must_use]
pub fn get_str<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
	get(value, key)?.as_str()
}

/// Reads an array field as a slice, or an empty slice if absent/wrong-typed
/// — callers that only ever iterate don't need to distinguish the two.
#[must_use]
pub fn get_array<'a>(value: &'a Value, key: &str) -> &'a [Value] {
	get(value, key).and_then(Value::as_array).map_or(&[], Vec::as_slice)
}

/// The first non-empty string among several candidate `(value, key)`
/// lookups, used for the "name || title || parent.name || id" fallback
/// chains throughout variant extraction.
#[must_use]
pub fn first_non_empty<'a>(candidates: &[Option<&'a str>]) -> Option<&'a str> {
	candidates.iter().flatten().find(|s| !s.is_empty()).copied()
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn get_path_walks_nested_objects() {
		let value = json!({"data": {"suha": {"hdp": {"hdpic": {"resourceId": "R1"}}}}});
		let hdpic = get_path(&value, &["data", "suha", "hdp", "hdpic"]).unwrap();
		assert_eq!(get_str(hdpic, "resourceId"), Some("R1"));
	}

	#[test]
	fn get_path_short_circuits_on_missing_link() {
		let value = json!({"data": {"suha": {}}});
		assert!(get_path(&value, &["data", "suha", "hdp", "hdpic"]).is_none());
	}

	#[test]
	fn get_path_short_circuits_on_wrong_type() {
		let value = json!({"data": "not an object"});
		assert!(get_path(&value, &["data", "suha"]).is_none());
	}

	#[test]
	fn get_array_defaults_to_empty_slice() {
		let value = json!({"otherHdps": "nope"});
		assert!(get_array(&value, "otherHdps").is_empty());
		assert!(get_array(&value, "missing").is_empty());

		let value = json!({"otherHdps": [{"resourceId": "R1"}]});
		assert_eq!(get_array(&value, "otherHdps").len(), 1);
	}

	#[test]
	fn first_non_empty_skips_missing_and_blank() {
		assert_eq!(first_non_empty(&[None, Some(""), Some("title"), Some("fallback")]), Some("title"));
		assert_eq!(first_non_empty(&[None, Some("")]), None);
	}
}
