//! Fmask mask backend.
//!
//! The Fmask classifier is opaque to the pipeline: it receives a staged
//! granule directory and writes a single classified GeoTIFF. The backend
//! only stages the granule, picks the output location and registers the
//! result under the `fmask` measurement; value conventions (1 = clear land,
//! 4 = water, 5 = snow) are interpreted by the mosaic compositor.

use crate::{MaskBackend, fetch_safe};
use cfsi_core::{
	BlobStore, CfsiError, DatasetDoc, GridSpec, OutputPlanner, ProductName, Result, config::FmaskConfig,
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

/// Shared handle to an Fmask implementation.
pub type FmaskRoutine = Arc<dyn FmaskRoutineTrait>;

pub trait FmaskRoutineTrait: Send + Sync {
	/// Runs Fmask over a granule directory, writing the classified mask to
	/// `output_path`.
	fn run(&self, granule_dir: &Path, output_path: &Path) -> Result<()>;
}

/// External Fmask executable, invoked as
/// `<command> --granuledir <dir> -o <output>`.
pub struct CommandFmaskRoutine {
	command: PathBuf,
}

impl CommandFmaskRoutine {
	pub fn new(command: impl Into<PathBuf>) -> CommandFmaskRoutine {
		CommandFmaskRoutine { command: command.into() }
	}
}

impl FmaskRoutineTrait for CommandFmaskRoutine {
	fn run(&self, granule_dir: &Path, output_path: &Path) -> Result<()> {
		let status = Command::new(&self.command)
			.arg("--granuledir")
			.arg(granule_dir)
			.arg("-o")
			.arg(output_path)
			.status()
			.map_err(|err| CfsiError::RasterIoFailed(format!("cannot run {}: {err}", self.command.display())))?;
		if !status.success() {
			return Err(CfsiError::RasterIoFailed(format!(
				"{} exited with {status}",
				self.command.display()
			)));
		}
		Ok(())
	}
}

/// Closure-backed routine for tests.
pub struct FnFmaskRoutine {
	function: Box<dyn Fn(&Path, &Path) -> Result<()> + Send + Sync>,
}

impl FnFmaskRoutine {
	pub fn new(function: impl Fn(&Path, &Path) -> Result<()> + Send + Sync + 'static) -> FnFmaskRoutine {
		FnFmaskRoutine {
			function: Box::new(function),
		}
	}
}

impl FmaskRoutineTrait for FnFmaskRoutine {
	fn run(&self, granule_dir: &Path, output_path: &Path) -> Result<()> {
		(self.function)(granule_dir, output_path)
	}
}

pub struct FmaskBackend {
	blob: BlobStore,
	planner: OutputPlanner,
	routine: FmaskRoutine,
	config: FmaskConfig,
}

impl FmaskBackend {
	pub fn new(blob: BlobStore, planner: OutputPlanner, routine: FmaskRoutine, config: FmaskConfig) -> FmaskBackend {
		FmaskBackend {
			blob,
			planner,
			routine,
			config,
		}
	}
}

#[async_trait]
impl MaskBackend for FmaskBackend {
	fn product_name(&self) -> ProductName {
		ProductName::S2Level1cFmask
	}

	fn enabled(&self) -> bool {
		self.config.generate
	}

	fn max_iterations(&self) -> usize {
		self.config.max_iterations
	}

	/// Fmask output is registered on the 20 m grid.
	fn output_grid(&self, l1c: &DatasetDoc) -> Result<GridSpec> {
		l1c
			.grids
			.get("20m")
			.cloned()
			.ok_or_else(|| CfsiError::MalformedMetadata(format!("dataset {} has no 20m grid", l1c.id)))
	}

	async fn compute(&self, l1c: &DatasetDoc) -> Result<BTreeMap<String, PathBuf>> {
		let s3_key = l1c
			.properties
			.s3_key
			.as_deref()
			.ok_or_else(|| CfsiError::MalformedMetadata(format!("dataset {} has no s3_key", l1c.id)))?;

		let granule_dir = fetch_safe(self.blob.as_ref(), &self.planner, l1c).await?;
		let output_path =
			self.planner
				.tile_output_path(s3_key, self.product_name().as_str(), &l1c.properties.tile_id, None);
		if let Some(parent) = output_path.parent() {
			std::fs::create_dir_all(parent)?;
		}

		log::info!("generating fmask masks for {s3_key}");
		self.routine.run(&granule_dir, &output_path)?;
		if !output_path.exists() {
			return Err(CfsiError::RasterIoFailed(format!(
				"fmask routine produced no output at {}",
				output_path.display()
			)));
		}

		let mut written = BTreeMap::new();
		written.insert("fmask".to_string(), output_path);
		Ok(written)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::{seeded_l1c, write_band_objects};
	use cfsi_core::FsBlobStore;

	fn enabled_config() -> FmaskConfig {
		FmaskConfig {
			generate: true,
			max_iterations: 5,
			command: None,
		}
	}

	#[tokio::test]
	async fn stages_granule_and_collects_output() -> Result<()> {
		let temp = assert_fs::TempDir::new().unwrap();
		let store = Arc::new(FsBlobStore::new(temp.path().join("buckets")));
		let l1c = seeded_l1c();
		write_band_objects(&store, &l1c).await?;

		let routine: FmaskRoutine = Arc::new(FnFmaskRoutine::new(|granule_dir, output_path| {
			assert!(granule_dir.join("B01.jp2").exists());
			std::fs::write(output_path, b"classified").unwrap();
			Ok(())
		}));
		let backend = FmaskBackend::new(
			store,
			OutputPlanner::new(temp.path().join("output")),
			routine,
			enabled_config(),
		);

		let written = backend.compute(&l1c).await?;
		assert_eq!(written.len(), 1);
		assert!(written["fmask"].ends_with(
			"tiles/35/P/PM/2020/10/2/0/s2_level1c_fmask/L1C_T35PPM_A027723_20201002T084052.tif"
		));
		assert!(written["fmask"].exists());
		Ok(())
	}

	#[tokio::test]
	async fn missing_output_is_a_raster_failure() -> Result<()> {
		let temp = assert_fs::TempDir::new().unwrap();
		let store = Arc::new(FsBlobStore::new(temp.path().join("buckets")));
		let l1c = seeded_l1c();
		write_band_objects(&store, &l1c).await?;

		let routine: FmaskRoutine = Arc::new(FnFmaskRoutine::new(|_, _| Ok(())));
		let backend = FmaskBackend::new(
			store,
			OutputPlanner::new(temp.path().join("output")),
			routine,
			enabled_config(),
		);
		assert!(matches!(
			backend.compute(&l1c).await,
			Err(CfsiError::RasterIoFailed(_))
		));
		Ok(())
	}

	#[test]
	fn output_grid_is_the_20m_grid() {
		let temp = assert_fs::TempDir::new().unwrap();
		let backend = FmaskBackend::new(
			Arc::new(FsBlobStore::new(temp.path())),
			OutputPlanner::new(temp.path()),
			Arc::new(FnFmaskRoutine::new(|_, _| Ok(()))),
			enabled_config(),
		);
		let l1c = seeded_l1c();
		let grid = backend.output_grid(&l1c).unwrap();
		assert_eq!(grid, l1c.grids["20m"]);
	}
}
