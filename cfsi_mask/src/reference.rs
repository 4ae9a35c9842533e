//! Optional reference rasters written next to generated masks.
//!
//! For validating mask output against the imagery it was derived from: an
//! RGB composite (B02/B03/B04) or the full 13-band stack, normalized to
//! reflectance and written as `float32` under the `rgb` / `l1c` product
//! directories.

use crate::stack::{CANONICAL_BAND_ORDER, REFLECTANCE_SCALE, local_path};
use cfsi_core::{
	CfsiError, Compression, DatasetDoc, OutputPlanner, RasterBands, RasterIoTrait, Resampling, Result,
	config::MasksConfig,
};
use ndarray::Array2;

const RGB_BANDS: [&str; 3] = ["B02", "B03", "B04"];

/// Writes the reference rasters enabled in `config`; a no-op when both
/// flags are off.
pub async fn write_references(
	raster: &dyn RasterIoTrait,
	planner: &OutputPlanner,
	l1c: &DatasetDoc,
	config: &MasksConfig,
) -> Result<()> {
	if config.write_rgb {
		write_l1c_reference(raster, planner, l1c, &RGB_BANDS, "rgb").await?;
	}
	if config.write_l1c {
		write_l1c_reference(raster, planner, l1c, &CANONICAL_BAND_ORDER, "l1c").await?;
	}
	Ok(())
}

async fn write_l1c_reference(
	raster: &dyn RasterIoTrait,
	planner: &OutputPlanner,
	l1c: &DatasetDoc,
	band_names: &[&str],
	product_dir: &str,
) -> Result<()> {
	let s3_key = l1c
		.properties
		.s3_key
		.as_deref()
		.ok_or_else(|| CfsiError::MalformedMetadata(format!("dataset {} has no s3_key", l1c.id)))?;
	let grid = l1c.default_grid()?;

	let mut bands: Vec<Array2<f32>> = Vec::with_capacity(band_names.len());
	for band in band_names {
		let measurement = l1c
			.measurements
			.get(*band)
			.ok_or_else(|| CfsiError::MalformedMetadata(format!("dataset {} has no measurement {band}", l1c.id)))?;
		let values = raster
			.read_reprojected(&local_path(&measurement.path), 1, &l1c.crs, grid, 0.0, Resampling::Nearest)
			.await?;
		bands.push(values.mapv(|value| (value / REFLECTANCE_SCALE) as f32));
	}

	let path = planner.tile_output_path(s3_key, product_dir, &l1c.properties.tile_id, None);
	log::info!("writing {product_dir} reference for {s3_key}");
	raster
		.write_geotiff(&path, &RasterBands::F32(bands), &l1c.crs, grid, 0.0, Compression::Uncompressed)
		.await
}
