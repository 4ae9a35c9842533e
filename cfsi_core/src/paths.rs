//! Output layout and container/host path translation.
//!
//! # Overview
//!
//! All derived rasters land under one output root: per-tile products under
//! `<root>/<s3Key>/<productName>/` and mosaics under `<root>/mosaics/`. Runs
//! may execute with a container-local view of that root while the catalog
//! must carry externally valid URIs; [`OutputPlanner::translate`] maps
//! between the two and leaves anything outside the root untouched.

use crate::{ProductName, Result};
use chrono::NaiveDate;
use std::env;
use std::path::{Path, PathBuf};

/// Environment variable naming the container-local output root.
pub const ENV_OUTPUT_CONTAINER: &str = "CFSI_OUTPUT_CONTAINER";
/// Environment variable naming the externally visible output root.
pub const ENV_OUTPUT_HOST: &str = "CFSI_OUTPUT_HOST";

#[derive(Debug, Clone)]
pub struct OutputPlanner {
	output_root: PathBuf,
	host_root: PathBuf,
}

impl OutputPlanner {
	/// A planner whose catalogued paths equal its local paths.
	pub fn new(output_root: impl Into<PathBuf>) -> OutputPlanner {
		let output_root = output_root.into();
		OutputPlanner {
			host_root: output_root.clone(),
			output_root,
		}
	}

	/// A planner that rewrites the local root to `host_root` in every
	/// externally visible URI.
	pub fn with_host_root(output_root: impl Into<PathBuf>, host_root: impl Into<PathBuf>) -> OutputPlanner {
		OutputPlanner {
			output_root: output_root.into(),
			host_root: host_root.into(),
		}
	}

	/// Reads both roots from the environment; the host root defaults to the
	/// container root.
	pub fn from_env() -> Result<OutputPlanner> {
		let output_root = env::var(ENV_OUTPUT_CONTAINER).map_err(|_| {
			crate::CfsiError::ConfigInvalid(format!("environment variable {ENV_OUTPUT_CONTAINER} is not set"))
		})?;
		Ok(match env::var(ENV_OUTPUT_HOST) {
			Ok(host_root) => Self::with_host_root(output_root, host_root),
			Err(_) => Self::new(output_root),
		})
	}

	pub fn output_root(&self) -> &Path {
		&self.output_root
	}

	/// Directory of all rasters of one product derived from one granule.
	/// `product` is a product name or a reference-output directory such as
	/// `rgb`.
	pub fn tile_output_dir(&self, s3_key: &str, product: &str) -> PathBuf {
		self.output_root.join(s3_key).join(product)
	}

	/// Path of one derived raster, `<tileId>[_<band>].tif`.
	pub fn tile_output_path(&self, s3_key: &str, product: &str, tile_id: &str, band_name: Option<&str>) -> PathBuf {
		let file_name = match band_name {
			Some(band) => format!("{tile_id}_{band}.tif"),
			None => format!("{tile_id}.tif"),
		};
		self.tile_output_dir(s3_key, product).join(file_name)
	}

	pub fn mosaic_dir(&self) -> PathBuf {
		self.output_root.join("mosaics")
	}

	/// First collision-free `<endDate>_<product>_<n>.tif` in the mosaic
	/// directory.
	pub fn mosaic_output_path(&self, end_date: NaiveDate, product: ProductName) -> PathBuf {
		let directory = self.mosaic_dir();
		let mut index = 0;
		loop {
			let candidate = directory.join(format!("{end_date}_{product}_{index}.tif"));
			if !candidate.exists() {
				return candidate;
			}
			index += 1;
		}
	}

	/// Idempotent staging area for fetched `.SAFE` bundles.
	pub fn safe_cache_dir(&self) -> PathBuf {
		self.output_root.join("cache").join("safe")
	}

	/// Rewrites the local output root to the host root, keeping a `file://`
	/// scheme prefix intact. Paths outside the root pass through unchanged.
	pub fn translate(&self, path: &str) -> String {
		let (scheme, rest) = match path.strip_prefix("file://") {
			Some(rest) => ("file://", rest),
			None => ("", path),
		};
		let container = self.output_root.to_string_lossy();
		match rest.strip_prefix(container.as_ref()) {
			Some(suffix) => format!("{scheme}{}{suffix}", self.host_root.to_string_lossy()),
			None => path.to_string(),
		}
	}

	/// `file://` URI of a local path, translated for the catalog.
	pub fn file_uri(&self, path: &Path) -> String {
		self.translate(&format!("file://{}", path.to_string_lossy()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use assert_fs::TempDir;

	fn planner() -> OutputPlanner {
		OutputPlanner::with_host_root("/output", "/home/ubuntu/cfsi_output")
	}

	#[test]
	fn tile_paths_follow_key_product_tile_layout() {
		let path = planner().tile_output_path(
			"tiles/35/P/PM/2020/10/2/0",
			ProductName::S2Level1cS2cloudless.as_str(),
			"L1C_T35PPM_A027723_20201002T084052",
			Some("clouds"),
		);
		assert_eq!(
			path,
			PathBuf::from(
				"/output/tiles/35/P/PM/2020/10/2/0/s2_level1c_s2cloudless/L1C_T35PPM_A027723_20201002T084052_clouds.tif"
			)
		);
	}

	#[test]
	fn translate_respects_scheme_and_foreign_paths() {
		let planner = planner();
		assert_eq!(
			planner.translate("file:///output/tiles/x/clouds.tif"),
			"file:///home/ubuntu/cfsi_output/tiles/x/clouds.tif"
		);
		assert_eq!(
			planner.translate("/output/mosaics/a.tif"),
			"/home/ubuntu/cfsi_output/mosaics/a.tif"
		);
		assert_eq!(planner.translate("/elsewhere/a.tif"), "/elsewhere/a.tif");
		assert_eq!(
			planner.translate("s3://sentinel-s2-l1c/tiles/35/P/PM"),
			"s3://sentinel-s2-l1c/tiles/35/P/PM"
		);
	}

	#[test]
	fn identity_planner_translates_to_itself() {
		let planner = OutputPlanner::new("/output");
		assert_eq!(planner.translate("/output/a.tif"), "/output/a.tif");
	}

	#[test]
	fn mosaic_path_avoids_collisions() {
		let temp = TempDir::new().unwrap();
		let planner = OutputPlanner::new(temp.path());
		let date = NaiveDate::from_ymd_opt(2020, 10, 15).unwrap();

		let first = planner.mosaic_output_path(date, ProductName::S2Level1cS2cloudless);
		assert!(first.ends_with("2020-10-15_s2_level1c_s2cloudless_0.tif"));

		std::fs::create_dir_all(planner.mosaic_dir()).unwrap();
		std::fs::write(&first, b"x").unwrap();
		let second = planner.mosaic_output_path(date, ProductName::S2Level1cS2cloudless);
		assert!(second.ends_with("2020-10-15_s2_level1c_s2cloudless_1.tif"));
	}
}
