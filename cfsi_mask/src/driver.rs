//! Backend-agnostic mask generation driver.
//!
//! # Overview
//!
//! A [`MaskBackend`] only knows how to turn one L1C granule into mask
//! rasters; everything around it lives here: candidate selection, the
//! already-processed and cloud-threshold skip policies, the iteration bound,
//! indexing of finished masks, optional reference rasters and the run
//! summary. Per-tile failures are logged and counted, never propagated.

use crate::reference::write_references;
use cfsi_core::{
	BlobStore, BlobStoreTrait as _, Catalog, CatalogTrait as _, DatasetDoc, GridSpec, OutputPlanner, ProductName,
	RasterIo, Result, SearchQuery, config::MasksConfig,
};
use async_trait::async_trait;
use cfsi_index::MaskIndexer;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::sync::watch;

/// One mask strategy. Implementations stay stateless; iteration state
/// belongs to the driver.
#[async_trait]
pub trait MaskBackend: Send + Sync {
	fn product_name(&self) -> ProductName;

	/// Whether this backend is switched on in the configuration.
	fn enabled(&self) -> bool;

	/// Configured per-run iteration bound.
	fn max_iterations(&self) -> usize;

	/// Grid the generated masks are registered on.
	fn output_grid(&self, l1c: &DatasetDoc) -> Result<GridSpec>;

	/// Computes and writes the mask rasters for one granule, returning
	/// measurement name to written path.
	async fn compute(&self, l1c: &DatasetDoc) -> Result<BTreeMap<String, PathBuf>>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaskRunSummary {
	pub processed: usize,
	pub skipped_existing: usize,
	pub skipped_threshold: usize,
	pub failed: usize,
}

pub struct MaskDriver {
	catalog: Catalog,
	planner: OutputPlanner,
	raster: RasterIo,
	blob: BlobStore,
	config: MasksConfig,
}

impl MaskDriver {
	pub fn new(
		catalog: Catalog,
		planner: OutputPlanner,
		raster: RasterIo,
		blob: BlobStore,
		config: MasksConfig,
	) -> MaskDriver {
		MaskDriver {
			catalog,
			planner,
			raster,
			blob,
			config,
		}
	}

	/// Config-gated copy of finished masks into the object store. Failures
	/// are logged, never fatal; local files remain the source of truth.
	async fn write_through(&self, s3_key: &str, product: ProductName, masks: &BTreeMap<String, PathBuf>) {
		let Some(bucket) = self.config.write_through.as_deref() else {
			return;
		};
		for path in masks.values() {
			let Some(file_name) = path.file_name().map(|name| name.to_string_lossy().to_string()) else {
				continue;
			};
			let key = format!("{s3_key}/{product}/{file_name}");
			let result = match std::fs::read(path) {
				Ok(bytes) => self.blob.put(bucket, &key, &bytes).await,
				Err(err) => Err(err.into()),
			};
			if let Err(err) = result {
				log::warn!("write-through of {} to s3://{bucket}/{key} failed: {err}", path.display());
			}
		}
	}

	/// All indexed L1C granules, oldest first.
	async fn candidates(&self) -> Result<Vec<DatasetDoc>> {
		self
			.catalog
			.search(&SearchQuery::product(ProductName::S2Level1cGranule))
			.await
	}

	/// Metadata cloud percentage against the configured window; `true`
	/// means the granule should be processed. The upper bound is inclusive.
	fn clouds_in_threshold(&self, l1c: &DatasetDoc) -> bool {
		let Some(cloud_percentage) = l1c.properties.cloudy_pixel_percentage else {
			log::warn!("dataset {} has no cloud percentage, skipping", l1c.id);
			return false;
		};
		if cloud_percentage > self.config.max_cloud_threshold {
			log::info!(
				"metadata cloud percentage greater than max threshold value: {} < {cloud_percentage}",
				self.config.max_cloud_threshold
			);
			return false;
		}
		if cloud_percentage < self.config.min_cloud_threshold {
			log::info!(
				"metadata cloud percentage lower than min threshold value: {} > {cloud_percentage}",
				self.config.min_cloud_threshold
			);
			return false;
		}
		true
	}

	/// Runs one backend over all candidates. Returns the indexed mask
	/// documents; an empty result is reported as a warning, not an error.
	pub async fn run(&self, backend: &dyn MaskBackend, cancel: &watch::Receiver<bool>) -> Result<Vec<DatasetDoc>> {
		let product = backend.product_name();
		if !backend.enabled() {
			log::info!("skipping {product} mask generation due to config");
			return Ok(Vec::new());
		}

		let candidates = self.candidates().await?;
		let max_iterations = backend.max_iterations().min(candidates.len());
		let mask_indexer = MaskIndexer::new(self.catalog.clone(), self.planner.clone());

		let mut summary = MaskRunSummary::default();
		let mut indexed: Vec<DatasetDoc> = Vec::new();
		let mut iteration = 1;

		for l1c in &candidates {
			if *cancel.borrow() {
				log::info!("{product} mask generation cancelled");
				break;
			}
			let Some(s3_key) = l1c.properties.s3_key.as_deref() else {
				log::warn!("dataset {} has no s3_key, skipping", l1c.id);
				summary.failed += 1;
				continue;
			};
			if self.planner.tile_output_dir(s3_key, product.as_str()).exists() {
				log::info!("{product} files for dataset {} already exist, skipping", l1c.id);
				summary.skipped_existing += 1;
				continue;
			}
			if !self.clouds_in_threshold(l1c) {
				summary.skipped_threshold += 1;
				continue;
			}

			log::info!("iteration {iteration}/{max_iterations}: {}", l1c.uri);
			let masks = match backend.compute(l1c).await {
				Ok(masks) => masks,
				Err(err) => {
					log::error!("mask generation failed for {}: {err}", l1c.uri);
					summary.failed += 1;
					continue;
				}
			};

			let grid = backend.output_grid(l1c)?;
			let doc = mask_indexer.index_masks(l1c, product, &grid, &masks).await?;
			self.write_through(s3_key, product, &masks).await;
			if let Err(err) = write_references(self.raster.as_ref(), &self.planner, l1c, &self.config).await {
				log::warn!("reference output failed for {}: {err}", l1c.uri);
			}
			indexed.push(doc);
			summary.processed += 1;

			iteration += 1;
			if iteration > max_iterations {
				log::warn!("reached maximum iterations count {max_iterations}");
				break;
			}
		}

		if indexed.is_empty() {
			log::warn!("no new {product} masks generated");
		}
		log::info!(
			"{product} mask run finished: {} processed, {} already existed, {} outside thresholds, {} failed",
			summary.processed,
			summary.skipped_existing,
			summary.skipped_threshold,
			summary.failed
		);
		Ok(indexed)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::{l1c_doc_with_local_bands, test_grid};
	use cfsi_core::{BlobStoreTrait as _, CatalogTrait as _, CfsiError, FsBlobStore, GtiffRasterIo, MemoryCatalog};
	use std::sync::Arc;
	use std::sync::atomic::{AtomicUsize, Ordering};

	struct StubBackend {
		enabled: bool,
		max_iterations: usize,
		calls: AtomicUsize,
		fail: bool,
		output_dir: PathBuf,
	}

	#[async_trait]
	impl MaskBackend for StubBackend {
		fn product_name(&self) -> ProductName {
			ProductName::S2Level1cS2cloudless
		}

		fn enabled(&self) -> bool {
			self.enabled
		}

		fn max_iterations(&self) -> usize {
			self.max_iterations
		}

		fn output_grid(&self, l1c: &DatasetDoc) -> Result<GridSpec> {
			Ok(l1c.default_grid()?.clone())
		}

		async fn compute(&self, l1c: &DatasetDoc) -> Result<BTreeMap<String, PathBuf>> {
			self.calls.fetch_add(1, Ordering::SeqCst);
			if self.fail {
				return Err(CfsiError::CloudDetectorFailed("stub".to_string()));
			}
			let mut masks = BTreeMap::new();
			let directory = self.output_dir.join(&l1c.properties.tile_id);
			std::fs::create_dir_all(&directory).unwrap();
			for name in ["cloud_mask", "shadow_mask"] {
				let path = directory.join(format!("{name}.tif"));
				std::fs::write(&path, b"tif").unwrap();
				masks.insert(name.to_string(), path);
			}
			Ok(masks)
		}
	}

	fn driver(temp: &assert_fs::TempDir, catalog: Arc<MemoryCatalog>, config: MasksConfig) -> MaskDriver {
		MaskDriver::new(
			catalog,
			OutputPlanner::new(temp.path().join("output")),
			Arc::new(GtiffRasterIo::new()),
			Arc::new(FsBlobStore::new(temp.path().join("buckets"))),
			config,
		)
	}

	fn backend(temp: &assert_fs::TempDir, fail: bool) -> StubBackend {
		StubBackend {
			enabled: true,
			max_iterations: 10,
			calls: AtomicUsize::new(0),
			fail,
			output_dir: temp.path().join("scratch"),
		}
	}

	async fn seeded_catalog(cloud_percentage: f64) -> Arc<MemoryCatalog> {
		let catalog = Arc::new(MemoryCatalog::new());
		let mut doc = l1c_doc_with_local_bands(std::path::Path::new("/nonexistent"), &test_grid(6));
		doc.properties.cloudy_pixel_percentage = Some(cloud_percentage);
		catalog.add(&doc).await.unwrap();
		catalog
	}

	#[tokio::test]
	async fn disabled_backend_is_skipped() -> Result<()> {
		let temp = assert_fs::TempDir::new().unwrap();
		let catalog = seeded_catalog(50.0).await;
		let driver = driver(&temp, catalog, MasksConfig::default());
		let mut stub = backend(&temp, false);
		stub.enabled = false;

		let (_tx, cancel) = watch::channel(false);
		let indexed = driver.run(&stub, &cancel).await?;
		assert!(indexed.is_empty());
		assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
		Ok(())
	}

	#[tokio::test]
	async fn threshold_rejection_means_no_output() -> Result<()> {
		let temp = assert_fs::TempDir::new().unwrap();
		// below the default min threshold of 1.0
		let catalog = seeded_catalog(0.5).await;
		let driver = driver(&temp, catalog.clone(), MasksConfig::default());
		let stub = backend(&temp, false);

		let (_tx, cancel) = watch::channel(false);
		let indexed = driver.run(&stub, &cancel).await?;
		assert!(indexed.is_empty());
		assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
		assert_eq!(catalog.len(), 1); // only the L1C doc
		Ok(())
	}

	#[tokio::test]
	async fn boundary_percentage_is_included() -> Result<()> {
		let temp = assert_fs::TempDir::new().unwrap();
		// exactly the default max threshold
		let catalog = seeded_catalog(94.0).await;
		let driver = driver(&temp, catalog.clone(), MasksConfig::default());
		let stub = backend(&temp, false);

		let (_tx, cancel) = watch::channel(false);
		let indexed = driver.run(&stub, &cancel).await?;
		assert_eq!(indexed.len(), 1);
		assert_eq!(catalog.len(), 2);
		Ok(())
	}

	#[tokio::test]
	async fn existing_output_directory_skips_candidate() -> Result<()> {
		let temp = assert_fs::TempDir::new().unwrap();
		let catalog = seeded_catalog(50.0).await;
		let driver = driver(&temp, catalog, MasksConfig::default());
		let stub = backend(&temp, false);

		std::fs::create_dir_all(
			temp
				.path()
				.join("output/tiles/35/P/PM/2020/10/2/0/s2_level1c_s2cloudless"),
		)?;

		let (_tx, cancel) = watch::channel(false);
		let indexed = driver.run(&stub, &cancel).await?;
		assert!(indexed.is_empty());
		assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
		Ok(())
	}

	#[tokio::test]
	async fn backend_failure_is_absorbed() -> Result<()> {
		let temp = assert_fs::TempDir::new().unwrap();
		let catalog = seeded_catalog(50.0).await;
		let driver = driver(&temp, catalog.clone(), MasksConfig::default());
		let stub = backend(&temp, true);

		let (_tx, cancel) = watch::channel(false);
		let indexed = driver.run(&stub, &cancel).await?;
		assert!(indexed.is_empty());
		assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
		Ok(())
	}

	#[tokio::test]
	async fn successful_run_indexes_masks() -> Result<()> {
		let temp = assert_fs::TempDir::new().unwrap();
		let catalog = seeded_catalog(50.0).await;
		let driver = driver(&temp, catalog.clone(), MasksConfig::default());
		let stub = backend(&temp, false);

		let (_tx, cancel) = watch::channel(false);
		let indexed = driver.run(&stub, &cancel).await?;
		assert_eq!(indexed.len(), 1);
		assert_eq!(indexed[0].product_name(), ProductName::S2Level1cS2cloudless);
		assert!(catalog.get(&indexed[0].id).await?.is_some());
		Ok(())
	}

	#[tokio::test]
	async fn write_through_copies_masks_into_the_store() -> Result<()> {
		let temp = assert_fs::TempDir::new().unwrap();
		let catalog = seeded_catalog(50.0).await;
		let store = Arc::new(FsBlobStore::new(temp.path().join("buckets")));
		let config = MasksConfig {
			write_through: Some("cfsi-masks".to_string()),
			..MasksConfig::default()
		};
		let driver = MaskDriver::new(
			catalog,
			OutputPlanner::new(temp.path().join("output")),
			Arc::new(GtiffRasterIo::new()),
			store.clone(),
			config,
		);
		let stub = backend(&temp, false);

		let (_tx, cancel) = watch::channel(false);
		driver.run(&stub, &cancel).await?;

		let copied = store.list("cfsi-masks", "tiles/35/P/PM", false).await?;
		assert_eq!(copied.len(), 2);
		assert!(copied.iter().any(|entry| entry.key.ends_with("cloud_mask.tif")));
		Ok(())
	}

	#[tokio::test]
	async fn cancellation_stops_before_first_tile() -> Result<()> {
		let temp = assert_fs::TempDir::new().unwrap();
		let catalog = seeded_catalog(50.0).await;
		let driver = driver(&temp, catalog, MasksConfig::default());
		let stub = backend(&temp, false);

		let (_tx, cancel) = watch::channel(true);
		let indexed = driver.run(&stub, &cancel).await?;
		assert!(indexed.is_empty());
		assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
		Ok(())
	}
}
