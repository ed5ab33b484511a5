//! Reads the artist input CSV: an `Id` column (required) and a `name`
//! column (optional, falls back to the id for display).

use crate::model::{is_valid_id, ArtistRecord};
use crate::progress::get_progress;
use anyhow::{Context, Result};
use std::path::Path;

/// Reads every row of the artist CSV. Rows with an empty or missing `Id`
/// are dropped; duplicate ids are kept as-is (the source neither
/// deduplicates nor errors — see `DESIGN.md`).
///
/// # Errors
/// Returns an error if the file cannot be opened or the header lacks an
/// `Id` column.
pub fn read_artist_csv(path: &Path) -> Result<Vec<ArtistRecord>> {
	let file = std::fs::File::open(path).with_context(|| format!("failed to open artist CSV at {}", path.display()))?;
	let size = file.metadata().map(|m| m.len()).unwrap_or(0);

	let mut reader = csv::Reader::from_reader(file);
	let headers = reader.headers().context("failed to read CSV headers")?.clone();

	let id_col = headers
		.iter()
		.position(|h| h == "Id")
		.context("artist CSV is missing an 'Id' column")?;
	let name_col = headers.iter().position(|h| h == "name");

	let mut progress = get_progress("reading artist CSV", size);
	let mut records = Vec::new();
	for result in reader.records() {
		let record = result.context("failed to read CSV record")?;
		if let Some(pos) = record.position() {
			progress.set_position(pos.byte());
		}

		let id = record.get(id_col).unwrap_or("").trim().to_string();
		if !is_valid_id(&id) {
			continue;
		}
		let name = name_col
			.and_then(|col| record.get(col))
			.map(str::trim)
			.filter(|s| !s.is_empty())
			.map(str::to_string)
			.unwrap_or_else(|| id.clone());

		records.push(ArtistRecord { id, name });
	}
	progress.finish();

	Ok(records)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn write_csv(dir: &tempfile::TempDir, content: &str) -> std::path::PathBuf {
		let path = dir.path().join("artists.csv");
		std::fs::write(&path, content).unwrap();
		path
	}

	#[test]
	fn reads_id_and_name() {
		let dir = tempfile::tempdir().unwrap();
		let path = write_csv(&dir, "Id,name\nA1,Artist One\nA2,Artist Two\n");
		let records = read_artist_csv(&path).unwrap();
		assert_eq!(
			records,
			vec![
				ArtistRecord { id: "A1".into(), name: "Artist One".into() },
				ArtistRecord { id: "A2".into(), name: "Artist Two".into() },
			]
		);
	}

	#[test]
	fn missing_name_falls_back_to_id() {
		let dir = tempfile::tempdir().unwrap();
		let path = write_csv(&dir, "Id\nA1\n");
		let records = read_artist_csv(&path).unwrap();
		assert_eq!(records, vec![ArtistRecord { id: "A1".into(), name: "A1".into() }]);
	}

	#[test]
	fn empty_ids_are_dropped() {
		let dir = tempfile::tempdir().unwrap();
		let path = write_csv(&dir, "Id,name\n,Nobody\nA1,Artist One\n   ,Blank\n");
		let records = read_artist_csv(&path).unwrap();
		assert_eq!(records, vec![ArtistRecord { id: "A1".into(), name: "Artist One".into() }]);
	}

	#[test]
	fn duplicate_ids_are_kept() {
		let dir = tempfile::tempdir().unwrap();
		let path = write_csv(&dir, "Id,name\nA1,First\nA1,Second\n");
		let records = read_artist_csv(&path).unwrap();
		assert_eq!(records.len(), 2);
	}

	#[test]
	fn missing_id_column_errors() {
		let dir = tempfile::tempdir().unwrap();
		let path = write_csv(&dir, "name\nArtist One\n");
		assert!(read_artist_csv(&path).is_err());
	}
}
