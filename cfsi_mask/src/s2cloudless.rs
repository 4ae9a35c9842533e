//! s2cloudless mask backend.
//!
//! # Overview
//!
//! For each accepted granule: assemble the 13-band stack (through the
//! catalog or from a staged granule directory, per config), run the injected
//! cloud detector, project shadows along the mean sun azimuth gated by the
//! near-infrared dark-pixel rule, and write both masks as single-band
//! `uint8` GeoTIFFs on the granule's 10 m grid.

use crate::{
	BandStack, CloudDetector, MaskBackend, assemble_from_catalog, assemble_from_safe, fetch_safe, project_shadows,
	validate_mask,
};
use cfsi_core::{
	BlobStore, CfsiError, Compression, DatasetDoc, GridSpec, OutputPlanner, ProductName, RasterBands, RasterIo,
	Result, config::S2cloudlessConfig,
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;

pub struct S2cloudlessBackend {
	blob: BlobStore,
	raster: RasterIo,
	planner: OutputPlanner,
	detector: CloudDetector,
	config: S2cloudlessConfig,
}

impl S2cloudlessBackend {
	pub fn new(
		blob: BlobStore,
		raster: RasterIo,
		planner: OutputPlanner,
		detector: CloudDetector,
		config: S2cloudlessConfig,
	) -> S2cloudlessBackend {
		S2cloudlessBackend {
			blob,
			raster,
			planner,
			detector,
			config,
		}
	}

	async fn assemble(&self, l1c: &DatasetDoc) -> Result<BandStack> {
		if self.config.cache {
			let granule_dir = fetch_safe(self.blob.as_ref(), &self.planner, l1c).await?;
			assemble_from_safe(self.raster.as_ref(), &granule_dir).await
		} else {
			assemble_from_catalog(self.raster.as_ref(), l1c).await
		}
	}
}

#[async_trait]
impl MaskBackend for S2cloudlessBackend {
	fn product_name(&self) -> ProductName {
		ProductName::S2Level1cS2cloudless
	}

	fn enabled(&self) -> bool {
		self.config.generate
	}

	fn max_iterations(&self) -> usize {
		self.config.max_iterations
	}

	fn output_grid(&self, l1c: &DatasetDoc) -> Result<GridSpec> {
		Ok(l1c.default_grid()?.clone())
	}

	async fn compute(&self, l1c: &DatasetDoc) -> Result<BTreeMap<String, PathBuf>> {
		let s3_key = l1c
			.properties
			.s3_key
			.as_deref()
			.ok_or_else(|| CfsiError::MalformedMetadata(format!("dataset {} has no s3_key", l1c.id)))?;
		let azimuth = l1c
			.properties
			.mean_sun_azimuth
			.ok_or_else(|| CfsiError::MalformedMetadata(format!("dataset {} has no sun azimuth", l1c.id)))?;

		log::info!("fetching band stack for {s3_key}");
		let stack = self.assemble(l1c).await?;
		log::debug!("loaded stack shaped {:?}", stack.bands.dim());

		log::info!("generating cloud masks for {s3_key}");
		let clouds = self.detector.detect(&stack.bands, self.config.cloud_threshold)?;
		validate_mask(&stack.bands, &clouds)?;

		log::info!("generating shadow masks for {s3_key}");
		let shadows = project_shadows(
			&clouds,
			&stack.nir(),
			azimuth,
			self.config.cloud_projection_distance,
			self.config.dark_pixel_threshold,
			self.config.row_direction,
		);

		let product = self.product_name();
		let tile_id = &l1c.properties.tile_id;
		let mut written = BTreeMap::new();
		for (measurement, band_suffix, mask) in [
			("cloud_mask", "clouds", clouds),
			("shadow_mask", "shadows", shadows),
		] {
			let path = self
				.planner
				.tile_output_path(s3_key, product.as_str(), tile_id, Some(band_suffix));
			self
				.raster
				.write_geotiff(
					&path,
					&RasterBands::U8(vec![mask]),
					&stack.crs,
					&stack.grid,
					0.0,
					Compression::Uncompressed,
				)
				.await?;
			written.insert(measurement.to_string(), path);
		}
		log::info!("mask generation done for {s3_key}");
		Ok(written)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::FnCloudDetector;
	use crate::test_support::{l1c_doc_with_local_bands, test_grid, write_band_files};
	use cfsi_core::{FsBlobStore, GtiffRasterIo, RasterIoTrait as _};
	use ndarray::Array2;
	use std::sync::Arc;

	fn constant_detector(mask_value: u8) -> CloudDetector {
		Arc::new(FnCloudDetector::new(move |bands, _| {
			let (nrows, ncols, _) = bands.dim();
			Array2::from_elem((nrows, ncols), mask_value)
		}))
	}

	async fn backend_with_bands(
		temp: &assert_fs::TempDir,
		detector: CloudDetector,
		config: S2cloudlessConfig,
	) -> (S2cloudlessBackend, DatasetDoc) {
		let raster = Arc::new(GtiffRasterIo::new());
		let band_dir = temp.path().join("bands");
		write_band_files(&raster, &band_dir, &test_grid(6)).await.unwrap();
		let l1c = l1c_doc_with_local_bands(&band_dir, &test_grid(6));
		let backend = S2cloudlessBackend::new(
			Arc::new(FsBlobStore::new(temp.path().join("buckets"))),
			raster,
			OutputPlanner::new(temp.path().join("output")),
			detector,
			config,
		);
		(backend, l1c)
	}

	#[tokio::test]
	async fn masks_are_written_on_the_granule_grid() -> Result<()> {
		let temp = assert_fs::TempDir::new().unwrap();
		let (backend, l1c) = backend_with_bands(&temp, constant_detector(0), S2cloudlessConfig::default()).await;

		let written = backend.compute(&l1c).await?;
		assert_eq!(written.len(), 2);
		let cloud_path = &written["cloud_mask"];
		assert!(cloud_path.ends_with(
			"tiles/35/P/PM/2020/10/2/0/s2_level1c_s2cloudless/L1C_T35PPM_A027723_20201002T084052_clouds.tif"
		));

		let raster = GtiffRasterIo::new();
		let info = raster.open(cloud_path).await?;
		assert_eq!(info.grid, *l1c.default_grid()?);
		assert_eq!(info.crs, l1c.crs);
		assert_eq!(info.nodata, Some(0.0));
		Ok(())
	}

	#[tokio::test]
	async fn all_cloudy_means_no_shadows() -> Result<()> {
		let temp = assert_fs::TempDir::new().unwrap();
		let (backend, l1c) = backend_with_bands(&temp, constant_detector(1), S2cloudlessConfig::default()).await;

		let written = backend.compute(&l1c).await?;
		let raster = GtiffRasterIo::new();
		let clouds = raster.read(&written["cloud_mask"], 1).await?;
		let shadows = raster.read(&written["shadow_mask"], 1).await?;
		assert!(clouds.iter().all(|v| *v == 1.0));
		// every pixel is cloud, so the clear precondition never holds
		assert!(shadows.iter().all(|v| *v == 0.0));
		Ok(())
	}

	#[tokio::test]
	async fn detector_shape_mismatch_is_a_failure() -> Result<()> {
		let temp = assert_fs::TempDir::new().unwrap();
		let bad: CloudDetector = Arc::new(FnCloudDetector::new(|_, _| Array2::zeros((1, 1))));
		let (backend, l1c) = backend_with_bands(&temp, bad, S2cloudlessConfig::default()).await;
		assert!(matches!(
			backend.compute(&l1c).await,
			Err(CfsiError::CloudDetectorFailed(_))
		));
		Ok(())
	}
}
