use super::{Compression, RasterBands, RasterInfo, Resampling};
use crate::{GridSpec, Result};
use async_trait::async_trait;
use ndarray::Array2;
use std::path::Path;
use std::sync::Arc;

/// Shared handle to a raster I/O implementation.
pub type RasterIo = Arc<dyn RasterIoTrait>;

#[async_trait]
pub trait RasterIoTrait: Send + Sync {
	/// Reads geometry and storage metadata without touching pixel data.
	async fn open(&self, path: &Path) -> Result<RasterInfo>;

	/// Reads one band (1-based) in its native grid, as `f64`.
	async fn read(&self, path: &Path, band: usize) -> Result<Array2<f64>>;

	/// Reads one band resampled onto `grid` in `crs`. Pixels outside the
	/// source are filled with `nodata`.
	async fn read_reprojected(
		&self,
		path: &Path,
		band: usize,
		crs: &str,
		grid: &GridSpec,
		nodata: f64,
		resampling: Resampling,
	) -> Result<Array2<f64>>;

	/// Writes a tagged GeoTIFF atomically (temp path + rename).
	async fn write_geotiff(
		&self,
		path: &Path,
		bands: &RasterBands,
		crs: &str,
		grid: &GridSpec,
		nodata: f64,
		compression: Compression,
	) -> Result<()>;

	/// Builds external overviews (`<path>.ovr`) at the given downsample
	/// levels.
	async fn build_overviews(&self, path: &Path, levels: &[usize], resampling: Resampling) -> Result<()>;
}
