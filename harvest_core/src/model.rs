//! Catalog data model: families, works, resources, variants, and the
//! filesystem paths they map to under the rawdata tree.

use std::path::{Path, PathBuf};

/// Painting vs calligraphy content channels. Determines which catalog
/// listing endpoint, which JSON key path inside resource payloads, and
/// which URL-signing strategy is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
	/// "Huia" listing / `data.suha` payload shape / inline MD5 signing.
	Suha,
	/// "Sufa" listing / `data.sufa` payload shape / external signer.
	Sufa,
}

impl Family {
	/// The JSON object key holding this family's payload inside a resource
	/// or sub-list entry (`"suha"` or `"sufa"`).
	#[must_use]
	pub fn json_key(self) -> &'static str {
		match self {
			Family::Suha => "suha",
			Family::Sufa => "sufa",
		}
	}

	/// The `src` value sent on `getSubList`/`getResource` request bodies.
	#[must_use]
	pub fn src_tag(self) -> &'static str {
		match self {
			Family::Suha => "SUHA",
			Family::Sufa => "SUFA",
		}
	}

	/// The listing JSON mirror filename under `<artistId>/`.
	#[must_use]
	pub fn listing_filename(self) -> &'static str {
		match self {
			Family::Suha => "all_huia_of_artist.json",
			Family::Sufa => "all_sufa_of_artist.json",
		}
	}
}

/// A work belonging to an artist, as returned by a listing endpoint.
#[derive(Debug, Clone)]
pub struct Work {
	pub id: String,
	pub display_name: String,
	pub family: Family,
}

/// One selectable image variant of a resource, extracted from the
/// resource-detail payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
	pub id: String,
	pub display_name: String,
}

/// A row from the artist input CSV.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtistRecord {
	pub id: String,
	pub name: String,
}

/// Filesystem path conventions for the rawdata tree:
/// `<root>/<artistId>/<workId>/<resourceId>/<variantId>/tile/<x>_<y>.jpg`.
#[derive(Debug, Clone)]
pub struct RawdataPaths {
	root: PathBuf,
}

impl RawdataPaths {
	#[must_use]
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self { root: root.into() }
	}

	#[must_use]
	pub fn artist_dir(&self, artist_id: &str) -> PathBuf {
		self.root.join(artist_id)
	}

	#[must_use]
	pub fn artist_marker(&self, artist_id: &str) -> PathBuf {
		self.artist_dir(artist_id).join(".completed")
	}

	#[must_use]
	pub fn listing_path(&self, artist_id: &str, family: Family) -> PathBuf {
		self.artist_dir(artist_id).join(family.listing_filename())
	}

	#[must_use]
	pub fn work_dir(&self, artist_id: &str, work_id: &str) -> PathBuf {
		self.artist_dir(artist_id).join(work_id)
	}

	#[must_use]
	pub fn sub_list_path(&self, artist_id: &str, work_id: &str) -> PathBuf {
		self.work_dir(artist_id, work_id).join("sub_list.json")
	}

	#[must_use]
	pub fn resource_dir(&self, artist_id: &str, work_id: &str, resource_id: &str) -> PathBuf {
		self.work_dir(artist_id, work_id).join(resource_id)
	}

	#[must_use]
	pub fn resource_json_path(&self, artist_id: &str, work_id: &str, resource_id: &str) -> PathBuf {
		self.resource_dir(artist_id, work_id, resource_id).join("resource.json")
	}

	#[must_use]
	pub fn variant_dir(&self, artist_id: &str, work_id: &str, resource_id: &str, variant_id: &str) -> PathBuf {
		self.resource_dir(artist_id, work_id, resource_id).join(variant_id)
	}

	#[must_use]
	pub fn variant_marker(&self, artist_id: &str, work_id: &str, resource_id: &str, variant_id: &str) -> PathBuf {
		self.variant_dir(artist_id, work_id, resource_id, variant_id).join(".completed")
	}

	#[must_use]
	pub fn tile_dir(&self, artist_id: &str, work_id: &str, resource_id: &str, variant_id: &str) -> PathBuf {
		self.variant_dir(artist_id, work_id, resource_id, variant_id).join("tile")
	}

	#[must_use]
	pub fn tile_path(&self, artist_id: &str, work_id: &str, resource_id: &str, variant_id: &str, x: u32, y: u32) -> PathBuf {
		self.tile_dir(artist_id, work_id, resource_id, variant_id).join(format!("{x}_{y}.jpg"))
	}
}

/// True if every path segment candidate (artist/work/resource/variant id) is
/// non-empty; empty identifiers are filtered at ingest per the data model's
/// invariant.
#[must_use]
pub fn is_valid_id(id: &str) -> bool {
	!id.trim().is_empty()
}

/// Writes a `.completed` marker containing the current unix timestamp,
/// matching the source's `flag_path.write_text(str(int(time.time())))`.
///
/// # Errors
/// Propagates filesystem errors from creating the parent directory or the
/// file itself.
pub fn write_completion_marker(path: &Path, now_unix: u64) -> std::io::Result<()> {
	if let Some(parent) = path.parent() {
		std::fs::create_dir_all(parent)?;
	}
	std::fs::write(path, now_unix.to_string())
}

/// Writes `bytes` to `path` atomically: the content lands in a sibling
/// temp file (`<name>.part-<random>`) in the same directory, then gets
/// renamed into place, so a concurrent reader or a killed process never
/// observes a partially-written tile.
///
/// # Errors
/// Propagates filesystem errors from creating the parent directory,
/// writing the temp file, or the final rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
	if let Some(parent) = path.parent() {
		std::fs::create_dir_all(parent)?;
	}
	let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("file");
	let suffix: u64 = rand::random();
	let tmp_path = path.with_file_name(format!("{file_name}.part-{suffix:x}"));
	std::fs::write(&tmp_path, bytes)?;
	std::fs::rename(&tmp_path, path)?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn family_mappings_are_distinct() {
		assert_eq!(Family::Suha.json_key(), "suha");
		assert_eq!(Family::Sufa.json_key(), "sufa");
		assert_eq!(Family::Suha.src_tag(), "SUHA");
		assert_eq!(Family::Sufa.src_tag(), "SUFA");
		assert_ne!(Family::Suha.listing_filename(), Family::Sufa.listing_filename());
	}

	#[test]
	fn paths_nest_as_specified() {
		let paths = RawdataPaths::new("data/rawdata");
		assert_eq!(
			paths.tile_path("artist1", "work1", "res1", "var1", 3, 4),
			PathBuf::from("data/rawdata/artist1/work1/res1/var1/tile/3_4.jpg")
		);
		assert_eq!(
			paths.variant_marker("artist1", "work1", "res1", "var1"),
			PathBuf::from("data/rawdata/artist1/work1/res1/var1/.completed")
		);
		assert_eq!(paths.artist_marker("artist1"), PathBuf::from("data/rawdata/artist1/.completed"));
	}

	#[test]
	fn empty_ids_are_rejected() {
		assert!(!is_valid_id(""));
		assert!(!is_valid_id("   "));
		assert!(is_valid_id("abc123"));
	}

	#[test]
	fn completion_marker_creates_parent_dirs() {
		let dir = tempfile::tempdir().unwrap();
		let marker = dir.path().join("a/b/.completed");
		write_completion_marker(&marker, 1_700_000_000).unwrap();
		assert_eq!(std::fs::read_to_string(&marker).unwrap(), "1700000000");
	}

	#[test]
	fn atomic_write_leaves_no_temp_file_behind() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("tile/0_0.jpg");
		write_atomic(&path, b"fake-jpeg-bytes").unwrap();
		assert_eq!(std::fs::read(&path).unwrap(), b"fake-jpeg-bytes");

		let siblings: Vec<_> = std::fs::read_dir(path.parent().unwrap()).unwrap().map(|e| e.unwrap().file_name()).collect();
		assert_eq!(siblings, vec![std::ffi::OsString::from("0_0.jpg")]);
	}

	#[test]
	fn atomic_write_overwrites_existing_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("tile.jpg");
		write_atomic(&path, b"first").unwrap();
		write_atomic(&path, b"second").unwrap();
		assert_eq!(std::fs::read(&path).unwrap(), b"second");
	}
}
