//! The mosaic compositor.
//!
//! # Overview
//!
//! For one mask product and one end date, [`MosaicCreator`] selects the mask
//! datasets of the configured window, pairs each with its surface-
//! reflectance sibling (by recorded id, falling back to a bucket-URI
//! lookup), blanks non-clear pixels and reduces each requested band to the
//! most recent clear value. The composite is written as one `uint16`
//! multi-band GeoTIFF, uncompressed so external overviews can be added, and
//! indexed under the `<maskProduct>_mosaic` product.

use crate::{clear_mask, mask_measurements, reduce_time_stack};
use cfsi_core::{
	Catalog, CatalogTrait as _, CfsiError, Compression, DatasetDoc, GridSpec, L2A_BUCKET, Measurement,
	OutputPlanner, ProductName, RasterBands, RasterIo, Resampling, Result, SearchQuery,
	config::{MosaicConfig, resolve_date},
	find_by_uri,
};
use cfsi_index::MosaicIndexer;
use chrono::{DateTime, Days, NaiveDate, Utc};
use itertools::Itertools;
use ndarray::Array2;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Downsample levels of the external overviews.
pub const OVERVIEW_LEVELS: [usize; 5] = [2, 4, 8, 16, 32];

/// A written and indexed mosaic.
#[derive(Debug, Clone)]
pub struct MosaicOutput {
	pub doc: DatasetDoc,
	pub path: PathBuf,
}

/// One time step of the joined stack.
struct TimeSlice {
	date: NaiveDate,
	mask: DatasetDoc,
	l2a: DatasetDoc,
}

pub struct MosaicCreator {
	catalog: Catalog,
	raster: RasterIo,
	planner: OutputPlanner,
	config: MosaicConfig,
	product: ProductName,
	start_date: NaiveDate,
	end_date: NaiveDate,
}

impl MosaicCreator {
	/// `date_token` is `YYYY-MM-DD` or the literal `today`; the window
	/// reaches `config.range` days back from it.
	pub fn new(
		catalog: Catalog,
		raster: RasterIo,
		planner: OutputPlanner,
		config: MosaicConfig,
		product: ProductName,
		date_token: &str,
	) -> Result<MosaicCreator> {
		mask_measurements(product)?;
		let end_date = resolve_date(date_token)?;
		let start_date = end_date
			.checked_sub_days(Days::new(config.range as u64))
			.ok_or_else(|| CfsiError::ConfigInvalid(format!("window of {} days underflows {end_date}", config.range)))?;
		Ok(MosaicCreator {
			catalog,
			raster,
			planner,
			config,
			product,
			start_date,
			end_date,
		})
	}

	/// Builds, writes and indexes the mosaic.
	pub async fn create(&self) -> Result<MosaicOutput> {
		let slices = self.collect_slices().await?;
		log::info!(
			"creating {} mosaic from {} masks between {} and {}",
			self.product,
			slices.len(),
			self.start_date,
			self.end_date
		);

		let Some(latest) = slices.last() else {
			return Err(CfsiError::NoMasks {
				product: self.product.to_string(),
				start: self.start_date,
				end: self.end_date,
			});
		};
		let grid = latest.l2a.default_grid()?.clone();
		let crs = latest.l2a.crs.clone();

		let clear_masks = self.load_clear_masks(&slices, &crs, &grid).await?;

		let mut band_planes: Vec<Array2<u16>> = Vec::new();
		let mut band_names: Vec<String> = Vec::new();
		let mut shared_recency: Option<Array2<u16>> = None;
		let mut recency_planes: Vec<(String, Array2<u16>)> = Vec::new();

		let mut recentness = self.config.recentness;
		for (index, band) in self.config.output_bands.iter().enumerate() {
			log::info!(
				"creating {} mosaic for band {band}, {}/{}",
				self.product,
				index + 1,
				self.config.output_bands.len()
			);
			let stack = self.load_band_stack(&slices, band, &crs, &grid, &clear_masks).await?;
			let reduced = reduce_time_stack(&stack, recentness > 0)?;
			band_planes.push(reduced.values);
			band_names.push(band.clone());
			if let Some(recency) = reduced.recency {
				if recentness == 1 {
					log::info!("generated recentness array once");
					shared_recency = Some(recency);
					recentness = 0;
				} else {
					log::info!("generated recentness array for band {band}");
					recency_planes.push((format!("{band}_recentness"), recency));
				}
			}
		}
		if let Some(recency) = shared_recency {
			band_planes.push(recency);
			band_names.push("recentness".to_string());
		}
		for (name, recency) in recency_planes {
			band_planes.push(recency);
			band_names.push(name);
		}

		let path = self.planner.mosaic_output_path(self.end_date, self.product);
		log::info!("writing mosaic to {}", path.display());
		self
			.raster
			.write_geotiff(
				&path,
				&RasterBands::U16(band_planes),
				&crs,
				&grid,
				0.0,
				Compression::Uncompressed,
			)
			.await?;
		self
			.raster
			.build_overviews(&path, &OVERVIEW_LEVELS, Resampling::Nearest)
			.await?;

		let datetime: DateTime<Utc> = self
			.end_date
			.and_hms_opt(0, 0, 0)
			.expect("midnight exists")
			.and_utc();
		let indexer = MosaicIndexer::new(self.catalog.clone(), self.raster.clone(), self.planner.clone());
		let doc = indexer.index_mosaic(self.product, &path, &band_names, datetime).await?;
		log::info!("generated mosaic {}", path.display());
		Ok(MosaicOutput { doc, path })
	}

	/// Mask datasets of the window joined with their L2A siblings, oldest
	/// first. Masks without a resolvable sibling are skipped, an empty
	/// window is `NoMasks`.
	async fn collect_slices(&self) -> Result<Vec<TimeSlice>> {
		let window_start = self.start_date.and_hms_opt(0, 0, 0).expect("midnight exists").and_utc();
		let window_end = self
			.end_date
			.and_hms_opt(23, 59, 59)
			.expect("end of day exists")
			.and_utc();
		let masks = self
			.catalog
			.search(&SearchQuery::product(self.product).with_time(window_start, window_end))
			.await?;
		if masks.is_empty() {
			return Err(CfsiError::NoMasks {
				product: self.product.to_string(),
				start: self.start_date,
				end: self.end_date,
			});
		}

		let mut slices = Vec::with_capacity(masks.len());
		for mask in masks {
			match self.resolve_l2a(&mask).await {
				Ok(l2a) => slices.push(TimeSlice {
					date: mask.datetime().date_naive(),
					mask,
					l2a,
				}),
				Err(CfsiError::CatalogNotFound(message)) => {
					log::warn!("L2A dataset not in index, skipping mask {}: {message}", mask.id);
				}
				Err(err) => return Err(err),
			}
		}
		if slices.is_empty() {
			return Err(CfsiError::NoMasks {
				product: self.product.to_string(),
				start: self.start_date,
				end: self.end_date,
			});
		}
		Ok(slices)
	}

	/// The L2A dataset belonging to a mask: by recorded id when present,
	/// otherwise by reconstructing the archive URI from the mask's s3 key.
	async fn resolve_l2a(&self, mask: &DatasetDoc) -> Result<DatasetDoc> {
		if let Some(id) = mask.properties.l2a_dataset_id.as_deref() {
			return self
				.catalog
				.get(id)
				.await?
				.ok_or_else(|| CfsiError::CatalogNotFound(format!("l2a dataset {id} is gone")));
		}
		let s3_key = mask
			.properties
			.s3_key
			.as_deref()
			.ok_or_else(|| CfsiError::CatalogNotFound(format!("mask {} has neither l2a id nor s3 key", mask.id)))?;
		let uri = format!("s3://{L2A_BUCKET}/{s3_key}");
		log::info!("L2A dataset id not provided, searching using URI {uri}");
		find_by_uri(self.catalog.as_ref(), ProductName::S2Sen2corGranule, &uri).await
	}

	/// Clear masks of every slice on the target grid.
	async fn load_clear_masks(
		&self,
		slices: &[TimeSlice],
		crs: &str,
		grid: &GridSpec,
	) -> Result<Vec<Array2<bool>>> {
		let mut clear_masks = Vec::with_capacity(slices.len());
		for slice in slices {
			let mut measurements = BTreeMap::new();
			for name in mask_measurements(self.product)? {
				let measurement = slice.mask.measurements.get(*name).ok_or_else(|| {
					CfsiError::CatalogNotFound(format!("mask {} has no measurement '{name}'", slice.mask.id))
				})?;
				let values = self.read_measurement(measurement, crs, grid).await?;
				measurements.insert((*name).to_string(), values);
			}
			clear_masks.push(clear_mask(self.product, &measurements)?);
		}
		Ok(clear_masks)
	}

	/// One band's time stack with non-clear pixels blanked to nodata,
	/// oldest first.
	async fn load_band_stack(
		&self,
		slices: &[TimeSlice],
		band: &str,
		crs: &str,
		grid: &GridSpec,
		clear_masks: &[Array2<bool>],
	) -> Result<Vec<(NaiveDate, Array2<u16>)>> {
		let mut stack = Vec::with_capacity(slices.len());
		for (slice, clear) in slices.iter().zip(clear_masks) {
			let measurement = find_band(&slice.l2a, band)?;
			let values = self.read_measurement(measurement, crs, grid).await?;
			let mut plane = values.mapv(|value| value as u16);
			ndarray::Zip::from(&mut plane).and(clear).for_each(|value, &clear| {
				if !clear {
					*value = 0;
				}
			});
			stack.push((slice.date, plane));
		}
		Ok(stack)
	}

	async fn read_measurement(&self, measurement: &Measurement, crs: &str, grid: &GridSpec) -> Result<Array2<f64>> {
		let path = match measurement.path.strip_prefix("file://") {
			Some(local) => PathBuf::from(local),
			None => PathBuf::from(&measurement.path),
		};
		self
			.raster
			.read_reprojected(
				Path::new(&path),
				measurement.band.unwrap_or(1),
				crs,
				grid,
				0.0,
				Resampling::Nearest,
			)
			.await
	}
}

/// L2A measurement for a configured band name, tolerating the
/// resolution-suffixed keys of indexed granules.
fn find_band<'a>(l2a: &'a DatasetDoc, band: &str) -> Result<&'a Measurement> {
	let candidates = [
		band.to_string(),
		format!("{band}_10m"),
		format!("{band}_20m"),
		format!("{band}_60m"),
	];
	candidates
		.iter()
		.find_map(|key| l2a.measurements.get(key))
		.ok_or_else(|| {
			CfsiError::ConfigInvalid(format!(
				"band '{band}' not found in dataset {} (has: {})",
				l2a.id,
				l2a.measurements.keys().join(", ")
			))
		})
}
