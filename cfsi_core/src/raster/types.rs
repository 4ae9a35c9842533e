use crate::{CfsiError, GridSpec, Result};
use ndarray::Array2;

/// Pixel storage type of a raster band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterDtype {
	U8,
	U16,
	F32,
	F64,
}

impl RasterDtype {
	pub fn bits(&self) -> u16 {
		match self {
			RasterDtype::U8 => 8,
			RasterDtype::U16 => 16,
			RasterDtype::F32 => 32,
			RasterDtype::F64 => 64,
		}
	}
}

/// Resampling kernels offered by the interface. The built-in implementation
/// only carries nearest-neighbor, which is all the pipeline uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Resampling {
	#[default]
	Nearest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
	/// Uncompressed leaves room for external overviews.
	#[default]
	Uncompressed,
	Deflate,
}

/// Metadata of an opened raster file.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterInfo {
	pub crs: String,
	pub grid: GridSpec,
	pub dtype: RasterDtype,
	pub bands: usize,
	pub nodata: Option<f64>,
}

/// A stack of equally shaped bands sharing one storage type.
#[derive(Debug, Clone, PartialEq)]
pub enum RasterBands {
	U8(Vec<Array2<u8>>),
	U16(Vec<Array2<u16>>),
	F32(Vec<Array2<f32>>),
}

impl RasterBands {
	pub fn dtype(&self) -> RasterDtype {
		match self {
			RasterBands::U8(_) => RasterDtype::U8,
			RasterBands::U16(_) => RasterDtype::U16,
			RasterBands::F32(_) => RasterDtype::F32,
		}
	}

	pub fn count(&self) -> usize {
		match self {
			RasterBands::U8(bands) => bands.len(),
			RasterBands::U16(bands) => bands.len(),
			RasterBands::F32(bands) => bands.len(),
		}
	}

	/// `[nrows, ncols]` shared by all bands.
	pub fn shape(&self) -> Result<[usize; 2]> {
		let shapes: Vec<[usize; 2]> = match self {
			RasterBands::U8(bands) => bands.iter().map(|b| [b.nrows(), b.ncols()]).collect(),
			RasterBands::U16(bands) => bands.iter().map(|b| [b.nrows(), b.ncols()]).collect(),
			RasterBands::F32(bands) => bands.iter().map(|b| [b.nrows(), b.ncols()]).collect(),
		};
		let first = *shapes
			.first()
			.ok_or_else(|| CfsiError::RasterIoFailed("no bands to write".to_string()))?;
		if shapes.iter().any(|shape| *shape != first) {
			return Err(CfsiError::RasterIoFailed("bands differ in shape".to_string()));
		}
		Ok(first)
	}

	/// Band as `f64`, 0-based index.
	pub fn band_f64(&self, index: usize) -> Result<Array2<f64>> {
		let out = match self {
			RasterBands::U8(bands) => bands.get(index).map(|b| b.mapv(f64::from)),
			RasterBands::U16(bands) => bands.get(index).map(|b| b.mapv(f64::from)),
			RasterBands::F32(bands) => bands.get(index).map(|b| b.mapv(f64::from)),
		};
		out.ok_or_else(|| CfsiError::RasterIoFailed(format!("band index {index} out of range")))
	}
}
