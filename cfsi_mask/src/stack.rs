//! Assembly of the 13-band detector input stack.
//!
//! # Overview
//!
//! The cloud detector wants one `[H, W, 13]` array of `f64` reflectances in
//! canonical band order, normalized by the reflectance scale. Two assembly
//! strategies exist: the catalog path reads every measurement of the L1C
//! document reprojected onto its 10 m grid; the cache path works from a
//! locally staged granule directory, using B02 to establish the reference
//! grid and aligning the remaining bands to it.

use cfsi_core::{CfsiError, DatasetDoc, GridSpec, RasterIoTrait, Resampling, Result};
use ndarray::{Array3, s};
use std::path::{Path, PathBuf};

/// Canonical Sentinel-2 band order, B8A between B08 and B09.
pub const CANONICAL_BAND_ORDER: [&str; 13] = [
	"B01", "B02", "B03", "B04", "B05", "B06", "B07", "B08", "B8A", "B09", "B10", "B11", "B12",
];

/// Index of the near-infrared band (B08) in the canonical order.
pub const NIR_BAND_INDEX: usize = 7;

/// Divisor turning archive sample values into reflectances.
pub const REFLECTANCE_SCALE: f64 = 10000.0;

/// An assembled detector input with the grid it lives on.
#[derive(Debug, Clone)]
pub struct BandStack {
	/// `[H, W, 13]`, normalized to reflectance.
	pub bands: Array3<f64>,
	pub grid: GridSpec,
	pub crs: String,
}

impl BandStack {
	/// The normalized near-infrared band.
	pub fn nir(&self) -> ndarray::Array2<f64> {
		self.bands.slice(s![.., .., NIR_BAND_INDEX]).to_owned()
	}
}

/// Local filesystem path of a measurement URI. `file://` URIs are resolved,
/// plain paths pass through; anything else is left for the raster
/// collaborator to reject.
pub fn local_path(uri: &str) -> PathBuf {
	match uri.strip_prefix("file://") {
		Some(path) => PathBuf::from(path),
		None => PathBuf::from(uri),
	}
}

/// Catalog strategy: reads all 13 measurements of the L1C document onto its
/// default grid.
pub async fn assemble_from_catalog(raster: &dyn RasterIoTrait, l1c: &DatasetDoc) -> Result<BandStack> {
	let grid = l1c.default_grid()?.clone();
	let [nrows, ncols] = grid.shape;
	let mut bands = Array3::zeros((nrows, ncols, CANONICAL_BAND_ORDER.len()));

	for (index, band) in CANONICAL_BAND_ORDER.iter().enumerate() {
		let measurement = l1c
			.measurements
			.get(*band)
			.ok_or_else(|| CfsiError::MalformedMetadata(format!("dataset {} has no measurement {band}", l1c.id)))?;
		let values = raster
			.read_reprojected(&local_path(&measurement.path), 1, &l1c.crs, &grid, 0.0, Resampling::Nearest)
			.await?;
		bands
			.slice_mut(s![.., .., index])
			.assign(&values.mapv(|value| value / REFLECTANCE_SCALE));
	}

	Ok(BandStack {
		bands,
		grid,
		crs: l1c.crs.clone(),
	})
}

/// Cache strategy: reads the `B??.jp2` files of a staged granule
/// directory. Files are ordered lexically with the trailing B8A moved back
/// to its canonical slot; B02 establishes the 10 m reference grid.
pub async fn assemble_from_safe(raster: &dyn RasterIoTrait, granule_dir: &Path) -> Result<BandStack> {
	let mut files: Vec<PathBuf> = std::fs::read_dir(granule_dir)?
		.filter_map(|entry| entry.ok().map(|entry| entry.path()))
		.filter(|path| {
			let name = path.file_name().map(|name| name.to_string_lossy().to_string()).unwrap_or_default();
			name.starts_with('B') && name.ends_with(".jp2")
		})
		.collect();
	files.sort();

	if files.len() != CANONICAL_BAND_ORDER.len() {
		log::warn!(
			"expected {} band files in {}, found {}",
			CANONICAL_BAND_ORDER.len(),
			granule_dir.display(),
			files.len()
		);
	}
	if files.len() < CANONICAL_BAND_ORDER.len() {
		return Err(CfsiError::RasterIoFailed(format!(
			"granule directory {} is incomplete",
			granule_dir.display()
		)));
	}

	// lexical order puts B8A last; its canonical slot is between B08 and B09
	let b8a = files.pop().unwrap();
	files.insert(NIR_BAND_INDEX + 1, b8a);

	let reference = raster.open(&files[1]).await?;
	let grid = reference.grid;
	let crs = reference.crs;
	let [nrows, ncols] = grid.shape;

	let mut bands = Array3::zeros((nrows, ncols, CANONICAL_BAND_ORDER.len()));
	for (index, file) in files.iter().enumerate() {
		let values = raster
			.read_reprojected(file, 1, &crs, &grid, 0.0, Resampling::Nearest)
			.await?;
		bands
			.slice_mut(s![.., .., index])
			.assign(&values.mapv(|value| value / REFLECTANCE_SCALE));
	}

	Ok(BandStack { bands, grid, crs })
}
