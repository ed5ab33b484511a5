//! Drives the unknown two-dimensional tile-grid sweep for one variant:
//! columns x=0,1,2,… until three consecutive empty columns are seen, with
//! each column's row sweep bounded by the height the first column-local
//! miss established.

use crate::tile::{TileOutcome, TileSource, VariantContext};
use harvest_core::{write_completion_marker, HarvestError, RawdataPaths};
use std::time::{SystemTime, UNIX_EPOCH};

/// Consecutive empty columns that terminate a probe. Tolerates up to two
/// sparse misses in a row before concluding the variant is exhausted.
const EMPTY_COLUMN_LIMIT: u32 = 3;

/// What a completed probe accomplished, reported back to the artist worker
/// so it can decide whether the owning work downloaded anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeOutcome {
	pub any_tile_saved: bool,
	pub columns_probed: u32,
}

/// Sweeps one variant's tile grid through a [`TileSource`], writing the
/// variant's completion marker when the sweep ends with at least one saved
/// tile.
pub struct GridProber<'a> {
	source: &'a dyn TileSource,
	paths: &'a RawdataPaths,
}

impl<'a> GridProber<'a> {
	#[must_use]
	pub fn new(source: &'a dyn TileSource, paths: &'a RawdataPaths) -> Self {
		Self { source, paths }
	}

	/// Runs the full column/row sweep for `ctx`.
	///
	/// # Errors
	/// Propagates a [`HarvestError`] surfaced by the tile source (pool
	/// exhaustion); the probe stops at whatever column it had reached and
	/// no completion marker is written.
	pub async fn probe(&self, ctx: &VariantContext) -> Result<ProbeOutcome, HarvestError> {
		let mut max_y_limit: Option<u32> = None;
		let mut consecutive_empty_columns = 0u32;
		let mut any_tile_saved = false;
		let mut x = 0u32;

		loop {
			let column_saved = self.probe_column(ctx, x, &mut max_y_limit, &mut any_tile_saved).await?;
			if column_saved {
				consecutive_empty_columns = 0;
			} else {
				consecutive_empty_columns += 1;
				if consecutive_empty_columns >= EMPTY_COLUMN_LIMIT {
					break;
				}
			}
			x += 1;
		}
		let columns_probed = x + 1;

		if any_tile_saved {
			let marker = self.paths.variant_marker(&ctx.artist_id, &ctx.work_id, &ctx.resource_id, &ctx.variant_id);
			if let Err(e) = write_completion_marker(&marker, unix_now()) {
				log::warn!("failed to write variant completion marker at {}: {e}", marker.display());
			}
		} else {
			log::info!("variant {} of {}/{} probed empty after {columns_probed} columns, no marker written", ctx.variant_id, ctx.artist_id, ctx.work_id);
		}

		Ok(ProbeOutcome { any_tile_saved, columns_probed })
	}

	/// Sweeps rows `y = 0, 1, …` of column `x`, stopping at `max_y_limit`
	/// once a prior column has established one. Returns whether any row in
	/// this column saved a tile.
	async fn probe_column(&self, ctx: &VariantContext, x: u32, max_y_limit: &mut Option<u32>, any_tile_saved: &mut bool) -> Result<bool, HarvestError> {
		let mut column_saved = false;
		let mut y = 0u32;
		loop {
			if let Some(limit) = *max_y_limit {
				if y >= limit {
					break;
				}
			}
			match self.source.fetch(ctx, x, y).await? {
				TileOutcome::Saved(_) => {
					column_saved = true;
					*any_tile_saved = true;
					y += 1;
				}
				TileOutcome::Miss => {
					if max_y_limit.is_none() {
						*max_y_limit = Some(y);
					}
					break;
				}
			}
		}
		Ok(column_saved)
	}
}

fn unix_now() -> u64 {
	SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}
