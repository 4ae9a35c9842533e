//! Idempotent local staging of granule bundles.
//!
//! Band files of one granule are fetched into
//! `<outputRoot>/cache/safe/<tileId>/`. Already-present files are never
//! overwritten, so concurrent or repeated fetches of the same tile coalesce.

use cfsi_core::{
	BlobStoreTrait, CfsiError, DatasetDoc, GetOptions, OutputPlanner, Result, parse_s3_uri, with_retry,
};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

const RETRY_ATTEMPTS: usize = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// Fetches the granule's objects to the cache directory and returns it.
pub async fn fetch_safe(blob: &dyn BlobStoreTrait, planner: &OutputPlanner, l1c: &DatasetDoc) -> Result<PathBuf> {
	let (bucket, _) = parse_s3_uri(&l1c.uri)?;
	let s3_key = l1c
		.properties
		.s3_key
		.as_deref()
		.ok_or_else(|| CfsiError::MalformedMetadata(format!("dataset {} has no s3_key", l1c.id)))?;

	let target = planner.safe_cache_dir().join(&l1c.properties.tile_id);
	fs::create_dir_all(&target)?;
	log::info!("fetching granule {} to {}", l1c.properties.tile_id, target.display());

	let entries = blob.list(bucket, s3_key, true).await?;
	let mut fetched = 0;
	for entry in entries {
		let file_name = match entry.key.rsplit('/').next() {
			Some(name) if !name.is_empty() => name.to_string(),
			_ => continue,
		};
		// only granule-root objects, no aux subdirectories
		if entry.key.trim_start_matches(&format!("{s3_key}/")).contains('/') {
			continue;
		}
		let local = target.join(&file_name);
		if local.exists() {
			continue;
		}
		let options = GetOptions::requester_pays();
		let bytes = with_retry(RETRY_ATTEMPTS, RETRY_BASE_DELAY, || blob.get(bucket, &entry.key, &options)).await?;
		let temporary = local.with_extension("part");
		fs::write(&temporary, &bytes)?;
		fs::rename(&temporary, &local)?;
		fetched += 1;
	}
	log::debug!("fetched {fetched} new objects for {}", l1c.properties.tile_id);
	Ok(target)
}
