//! Built-in GeoTIFF raster I/O.
//!
//! # Overview
//!
//! [`GtiffRasterIo`] implements [`RasterIoTrait`] for the rasters the
//! pipeline itself produces: tagged, uncompressed baseline GeoTIFFs with one
//! plane per band. Writes are atomic (temp path + rename), reprojection is
//! nearest-neighbor within one CRS, and overviews go into an external
//! `<path>.ovr` file holding one reduced page per level, so the base file
//! never gets rewritten once indexed.

mod decode;
mod encode;
mod tags;

use super::{Compression, RasterBands, RasterInfo, RasterIoTrait, Resampling, resample_nearest};
use crate::{CfsiError, GridSpec, RasterDtype, Result};
use async_trait::async_trait;
use byteorder::{LE, WriteBytesExt};
use encode::{GeoTags, Page};
use ndarray::Array2;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Default)]
pub struct GtiffRasterIo;

impl GtiffRasterIo {
	pub fn new() -> GtiffRasterIo {
		GtiffRasterIo
	}

	fn epsg_code(crs: &str) -> Result<u16> {
		crs
			.strip_prefix("EPSG:")
			.and_then(|code| code.parse().ok())
			.ok_or_else(|| CfsiError::RasterIoFailed(format!("expected an EPSG code, got '{crs}'")))
	}

	fn read_file(path: &Path) -> Result<Vec<u8>> {
		fs::read(path).map_err(|err| CfsiError::RasterIoFailed(format!("cannot read {}: {err}", path.display())))
	}

	fn planes_of(bands: &RasterBands) -> Vec<Vec<u8>> {
		match bands {
			RasterBands::U8(list) => list.iter().map(|band| band.iter().copied().collect()).collect(),
			RasterBands::U16(list) => list
				.iter()
				.map(|band| {
					let mut plane = Vec::with_capacity(band.len() * 2);
					for value in band {
						plane.write_u16::<LE>(*value).unwrap();
					}
					plane
				})
				.collect(),
			RasterBands::F32(list) => list
				.iter()
				.map(|band| {
					let mut plane = Vec::with_capacity(band.len() * 4);
					for value in band {
						plane.write_f32::<LE>(*value).unwrap();
					}
					plane
				})
				.collect(),
		}
	}

	fn plane_from_f64(values: &Array2<f64>, dtype: RasterDtype) -> Vec<u8> {
		let mut plane = Vec::with_capacity(values.len() * (dtype.bits() as usize / 8));
		for value in values {
			match dtype {
				RasterDtype::U8 => plane.push(*value as u8),
				RasterDtype::U16 => plane.write_u16::<LE>(*value as u16).unwrap(),
				RasterDtype::F32 => plane.write_f32::<LE>(*value as f32).unwrap(),
				RasterDtype::F64 => plane.write_f64::<LE>(*value).unwrap(),
			}
		}
		plane
	}

	fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent)?;
		}
		let temporary: PathBuf = path.with_extension("tif.tmp");
		fs::write(&temporary, bytes)?;
		fs::rename(&temporary, path)?;
		Ok(())
	}
}

#[async_trait]
impl RasterIoTrait for GtiffRasterIo {
	async fn open(&self, path: &Path) -> Result<RasterInfo> {
		let buffer = Self::read_file(path)?;
		let pages = decode::parse_ifds(&buffer)?;
		decode::page_info(&pages[0])
	}

	async fn read(&self, path: &Path, band: usize) -> Result<Array2<f64>> {
		let buffer = Self::read_file(path)?;
		let pages = decode::parse_ifds(&buffer)?;
		let info = decode::page_info(&pages[0])?;
		decode::page_band(&pages[0], &info, band)
	}

	async fn read_reprojected(
		&self,
		path: &Path,
		band: usize,
		crs: &str,
		grid: &GridSpec,
		nodata: f64,
		_resampling: Resampling,
	) -> Result<Array2<f64>> {
		let buffer = Self::read_file(path)?;
		let pages = decode::parse_ifds(&buffer)?;
		let info = decode::page_info(&pages[0])?;
		if info.crs != crs {
			return Err(CfsiError::RasterIoFailed(format!(
				"cannot warp {} from {} to {crs}; cross-CRS reprojection needs the external raster backend",
				path.display(),
				info.crs
			)));
		}
		let source = decode::page_band(&pages[0], &info, band)?;
		if info.grid == *grid {
			return Ok(source);
		}
		resample_nearest(&source, &info.grid, grid, nodata)
	}

	async fn write_geotiff(
		&self,
		path: &Path,
		bands: &RasterBands,
		crs: &str,
		grid: &GridSpec,
		nodata: f64,
		compression: Compression,
	) -> Result<()> {
		if compression != Compression::Uncompressed {
			return Err(CfsiError::RasterIoFailed(
				"the built-in writer only produces uncompressed GeoTIFFs".to_string(),
			));
		}
		let [nrows, ncols] = bands.shape()?;
		if [nrows, ncols] != grid.shape {
			return Err(CfsiError::RasterIoFailed(format!(
				"band shape [{nrows}, {ncols}] does not match grid shape {:?}",
				grid.shape
			)));
		}
		let page = Page {
			nrows,
			ncols,
			dtype: bands.dtype(),
			planes: Self::planes_of(bands),
			geo: GeoTags {
				epsg: Self::epsg_code(crs)?,
				transform: grid.transform,
				nodata,
			},
		};
		Self::write_atomic(path, &encode::encode(&[page])?)
	}

	async fn build_overviews(&self, path: &Path, levels: &[usize], _resampling: Resampling) -> Result<()> {
		let buffer = Self::read_file(path)?;
		let pages = decode::parse_ifds(&buffer)?;
		let info = decode::page_info(&pages[0])?;
		let epsg = Self::epsg_code(&info.crs)?;
		let nodata = info.nodata.unwrap_or(0.0);

		let source_bands: Vec<Array2<f64>> = (1..=info.bands)
			.map(|band| decode::page_band(&pages[0], &info, band))
			.collect::<Result<_>>()?;

		let mut overview_pages = Vec::with_capacity(levels.len());
		for level in levels {
			let level = (*level).max(1);
			let nrows = info.grid.nrows().div_ceil(level);
			let ncols = info.grid.ncols().div_ceil(level);
			let t = &info.grid.transform;
			let reduced = GridSpec::new(
				[nrows, ncols],
				[
					t[0] * level as f64,
					t[1],
					t[2],
					t[3],
					t[4] * level as f64,
					t[5],
					0.0,
					0.0,
					1.0,
				],
			);
			let planes = source_bands
				.iter()
				.map(|band| {
					resample_nearest(band, &info.grid, &reduced, nodata)
						.map(|reduced_band| Self::plane_from_f64(&reduced_band, info.dtype))
				})
				.collect::<Result<Vec<_>>>()?;
			overview_pages.push(Page {
				nrows,
				ncols,
				dtype: info.dtype,
				planes,
				geo: GeoTags {
					epsg,
					transform: reduced.transform,
					nodata,
				},
			});
		}

		let mut overview_path = path.as_os_str().to_owned();
		overview_path.push(".ovr");
		Self::write_atomic(Path::new(&overview_path), &encode::encode(&overview_pages)?)
	}
}
