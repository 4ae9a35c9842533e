//! Shared fixtures for the mask tests.

use crate::stack::CANONICAL_BAND_ORDER;
use cfsi_core::{
	BlobStoreTrait, Compression, DEFAULT_GRID, DatasetDoc, DocProperties, FsBlobStore, GridSpec, GtiffRasterIo,
	Measurement, ProductName, RasterBands, RasterIoTrait, Result,
};
use ndarray::Array2;
use std::collections::BTreeMap;
use std::path::Path;

pub const TEST_URI: &str = "s3://sentinel-s2-l1c/tiles/35/P/PM/2020/10/2/0";
pub const TEST_TILE_ID: &str = "L1C_T35PPM_A027723_20201002T084052";

pub fn test_grid(size: usize) -> GridSpec {
	GridSpec::from_geoposition(size, size, 600000.0, 1000020.0, 10.0, -10.0)
}

fn base_properties() -> DocProperties {
	let mut properties = DocProperties::new(
		TEST_TILE_ID.to_string(),
		"2020-10-02T08:48:04Z".parse().unwrap(),
		"JPEG2000",
	);
	properties.region_code = Some("35PPM".to_string());
	properties.mean_sun_zenith = Some(25.14);
	properties.mean_sun_azimuth = Some(135.0);
	properties.cloudy_pixel_percentage = Some(50.0);
	properties.s3_key = Some("tiles/35/P/PM/2020/10/2/0".to_string());
	properties
}

fn doc_with_measurements(measurements: BTreeMap<String, Measurement>, grid: &GridSpec) -> DatasetDoc {
	let mut grids = BTreeMap::new();
	grids.insert(DEFAULT_GRID.to_string(), grid.clone());
	grids.insert("20m".to_string(), {
		let [nrows, ncols] = grid.shape;
		GridSpec::from_geoposition(
			nrows.div_ceil(2),
			ncols.div_ceil(2),
			grid.transform[2],
			grid.transform[5],
			grid.transform[0] * 2.0,
			grid.transform[4] * 2.0,
		)
	});
	DatasetDoc::new(
		ProductName::S2Level1cGranule,
		TEST_URI.to_string(),
		"EPSG:32635".to_string(),
		grids,
		measurements,
		base_properties(),
	)
}

/// L1C document whose measurements point at `file://` band rasters below
/// `band_dir`.
pub fn l1c_doc_with_local_bands(band_dir: &Path, grid: &GridSpec) -> DatasetDoc {
	let measurements = CANONICAL_BAND_ORDER
		.iter()
		.map(|band| {
			(
				(*band).to_string(),
				Measurement::new(format!("file://{}/{band}.jp2", band_dir.display())),
			)
		})
		.collect();
	doc_with_measurements(measurements, grid)
}

/// L1C document with archive-style `s3://` measurement URIs.
pub fn seeded_l1c() -> DatasetDoc {
	let measurements = CANONICAL_BAND_ORDER
		.iter()
		.map(|band| ((*band).to_string(), Measurement::new(format!("{TEST_URI}/{band}.jp2"))))
		.collect();
	doc_with_measurements(measurements, &test_grid(6))
}

/// Writes the 13 band files as GeoTIFFs named `B??.jp2`; every pixel of
/// band `i` holds `(i + 1) * 1000`.
pub async fn write_band_files(raster: &GtiffRasterIo, directory: &Path, grid: &GridSpec) -> Result<()> {
	for (index, band) in CANONICAL_BAND_ORDER.iter().enumerate() {
		let value = (index as u16 + 1) * 1000;
		let [nrows, ncols] = grid.shape;
		raster
			.write_geotiff(
				&directory.join(format!("{band}.jp2")),
				&RasterBands::U16(vec![Array2::from_elem((nrows, ncols), value)]),
				"EPSG:32635",
				grid,
				0.0,
				Compression::Uncompressed,
			)
			.await?;
	}
	Ok(())
}

/// Seeds a blob store with the granule's objects: 13 band files (opaque
/// bytes) plus a `metadata.xml`.
pub async fn write_band_objects(store: &FsBlobStore, l1c: &DatasetDoc) -> Result<()> {
	let s3_key = l1c.properties.s3_key.as_deref().unwrap();
	for band in CANONICAL_BAND_ORDER {
		store
			.put("sentinel-s2-l1c", &format!("{s3_key}/{band}.jp2"), b"jp2-bytes")
			.await?;
	}
	store
		.put("sentinel-s2-l1c", &format!("{s3_key}/metadata.xml"), b"<xml/>")
		.await?;
	// nested aux data must not be staged
	store
		.put("sentinel-s2-l1c", &format!("{s3_key}/qi/MSK_CLOUDS_B00.gml"), b"<gml/>")
		.await?;
	Ok(())
}
