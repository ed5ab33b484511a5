//! The `harvester` CLI's single job: parse a [`HarvestConfig`] from the
//! command line and drive [`crate::coordinator::harvest`] to completion.
//! Kept as its own module (rather than inlined in `main.rs`) so it can be
//! exercised directly from integration tests without going through `clap`.

use harvest_core::HarvestConfig;

/// Runs one full harvest to completion against `config`.
///
/// # Errors
/// Propagates configuration errors and any failure building the initial
/// session pool; see [`crate::coordinator::harvest`].
pub async fn run(config: &HarvestConfig) -> anyhow::Result<()> {
	crate::coordinator::harvest(config).await
}
