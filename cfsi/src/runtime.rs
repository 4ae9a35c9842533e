//! Shared state of one pipeline run.
//!
//! The runtime bundles the parsed configuration, the output planner and the
//! three collaborator handles, plus the cancellation channel every long
//! loop watches between tiles. The binary builds it from the environment;
//! tests assemble it from in-memory parts.

use cfsi_core::{
	BlobStore, Catalog, GtiffRasterIo, HttpBlobStore, OutputPlanner, RasterIo, Result, SqliteCatalog, config::Config,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

pub struct Runtime {
	pub config: Config,
	pub planner: OutputPlanner,
	pub catalog: Catalog,
	pub blob: BlobStore,
	pub raster: RasterIo,
	cancel_sender: watch::Sender<bool>,
	cancel: watch::Receiver<bool>,
}

impl Runtime {
	pub fn new(
		config: Config,
		planner: OutputPlanner,
		catalog: Catalog,
		blob: BlobStore,
		raster: RasterIo,
	) -> Runtime {
		let (cancel_sender, cancel) = watch::channel(false);
		Runtime {
			config,
			planner,
			catalog,
			blob,
			raster,
			cancel_sender,
			cancel,
		}
	}

	/// Production wiring: YAML config and output roots from the
	/// environment, SQLite catalog, HTTP object store, built-in GeoTIFF
	/// raster backend.
	pub fn from_env() -> Result<Runtime> {
		let config = Config::from_env()?;
		let planner = OutputPlanner::from_env()?;
		let catalog_path = catalog_path(&config, &planner);
		let catalog = Arc::new(SqliteCatalog::open(&catalog_path)?);
		let blob = Arc::new(HttpBlobStore::new(cfsi_core::DEFAULT_REGION)?);
		let raster = Arc::new(GtiffRasterIo::new());
		Ok(Runtime::new(config, planner, catalog, blob, raster))
	}

	pub fn cancel_receiver(&self) -> watch::Receiver<bool> {
		self.cancel.clone()
	}

	/// Flips the cancellation flag; workers exit between tiles.
	pub fn cancel(&self) {
		let _ = self.cancel_sender.send(true);
	}

	/// Sender half for interrupt handlers.
	pub fn cancel_handle(&self) -> watch::Sender<bool> {
		self.cancel_sender.clone()
	}

	pub fn is_cancelled(&self) -> bool {
		*self.cancel.borrow()
	}
}

/// Configured catalog location, defaulting to a file below the output root.
pub fn catalog_path(config: &Config, planner: &OutputPlanner) -> PathBuf {
	config
		.catalog
		.path
		.clone()
		.unwrap_or_else(|| planner.output_root().join("cfsi-catalog.sqlite"))
}

#[cfg(test)]
mod tests {
	use super::*;
	use cfsi_core::{FsBlobStore, MemoryCatalog};

	fn test_runtime(temp: &assert_fs::TempDir) -> Runtime {
		Runtime::new(
			Config::default(),
			OutputPlanner::new(temp.path().join("output")),
			Arc::new(MemoryCatalog::new()),
			Arc::new(FsBlobStore::new(temp.path().join("buckets"))),
			Arc::new(GtiffRasterIo::new()),
		)
	}

	#[test]
	fn cancellation_is_observable() {
		let temp = assert_fs::TempDir::new().unwrap();
		let runtime = test_runtime(&temp);
		let receiver = runtime.cancel_receiver();
		assert!(!*receiver.borrow());
		runtime.cancel();
		assert!(*receiver.borrow());
		assert!(runtime.is_cancelled());
	}

	#[test]
	fn catalog_path_prefers_config() {
		let temp = assert_fs::TempDir::new().unwrap();
		let runtime = test_runtime(&temp);
		assert_eq!(
			catalog_path(&runtime.config, &runtime.planner),
			temp.path().join("output/cfsi-catalog.sqlite")
		);

		let mut config = Config::default();
		config.catalog.path = Some(PathBuf::from("/var/lib/cfsi/catalog.sqlite"));
		assert_eq!(
			catalog_path(&config, &runtime.planner),
			PathBuf::from("/var/lib/cfsi/catalog.sqlite")
		);
	}
}
