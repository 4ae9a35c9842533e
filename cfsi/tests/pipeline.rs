//! End-to-end run of the pipeline stages against local collaborators: a
//! directory-tree object store, an in-memory catalog and the built-in
//! GeoTIFF raster backend.

use cfsi::{Runtime, run_index, run_mask, run_mosaic};
use cfsi_core::{
	BlobStoreTrait, CatalogTrait, Compression, FsBlobStore, GridSpec, GtiffRasterIo, MemoryCatalog, Measurement,
	OutputPlanner, ProductName, RasterBands, RasterIoTrait, Result, SearchQuery, config::Config, upsert,
};
use cfsi_mask::{FnCloudDetector, MaskBackend, S2cloudlessBackend};
use ndarray::Array2;
use std::sync::Arc;

const L1C_BUCKET: &str = "sentinel-s2-l1c";
const L2A_BUCKET: &str = "sentinel-s2-l2a";
const GRID_SIZE: usize = 8;

/// Tile manifest with a small grid so band stacks stay tiny.
fn metadata_xml(day: u32) -> String {
	let mut grid_sections = String::new();
	for (resolution, size, dim) in [(10, GRID_SIZE, 10), (20, GRID_SIZE / 2, 20), (60, GRID_SIZE / 4, 60)] {
		grid_sections.push_str(&format!(
			"<Size resolution=\"{resolution}\"><NROWS>{size}</NROWS><NCOLS>{size}</NCOLS></Size>\
			<Geoposition resolution=\"{resolution}\"><ULX>600000</ULX><ULY>1000020</ULY>\
			<XDIM>{dim}</XDIM><YDIM>-{dim}</YDIM></Geoposition>"
		));
	}
	format!(
		"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
		<Tile><General_Info>\
		<TILE_ID>L1C_T35PPM_A0277{day:02}_20201002T084052</TILE_ID>\
		<SENSING_TIME>2020-10-{day:02}T08:48:04.919Z</SENSING_TIME>\
		</General_Info><Geometric_Info><Tile_Geocoding>\
		<HORIZONTAL_CS_CODE>epsg:32635</HORIZONTAL_CS_CODE>{grid_sections}\
		</Tile_Geocoding><Tile_Angles><Mean_Sun_Angle>\
		<ZENITH_ANGLE>25.0</ZENITH_ANGLE><AZIMUTH_ANGLE>135.0</AZIMUTH_ANGLE>\
		</Mean_Sun_Angle></Tile_Angles></Geometric_Info>\
		<Quality_Indicators_Info><Image_Content_QI>\
		<CLOUDY_PIXEL_PERCENTAGE>20.0</CLOUDY_PIXEL_PERCENTAGE>\
		</Image_Content_QI></Quality_Indicators_Info></Tile>"
	)
}

fn grid_10m() -> GridSpec {
	GridSpec::from_geoposition(GRID_SIZE, GRID_SIZE, 600000.0, 1000020.0, 10.0, -10.0)
}

fn config_yaml() -> &'static str {
	r#"
index:
  s2_index:
    s3_buckets: [sentinel-s2-l1c, sentinel-s2-l2a]
    grids: [35PPM]
    years: [2020]
    months: [10]
masks:
  max_cloud_threshold: 94.0
  min_cloud_threshold: 1.0
  s2cloudless_masks:
    generate: true
    max_iterations: 10
    cloud_threshold: 0.3
    cloud_projection_distance: 3.0
    dark_pixel_threshold: 0.15
    cache: true
mosaic:
  products: [s2_level1c_s2cloudless]
  dates: ["2020-10-14"]
  range: 30
  output_bands: [B02]
  recentness: 1
"#
}

struct Pipeline {
	temp: assert_fs::TempDir,
	runtime: Runtime,
	raster: Arc<GtiffRasterIo>,
}

impl Pipeline {
	async fn new() -> Pipeline {
		let temp = assert_fs::TempDir::new().unwrap();
		let raster = Arc::new(GtiffRasterIo::new());
		let blob = Arc::new(FsBlobStore::new(temp.path().join("buckets")));
		seed_archive(&raster, blob.as_ref(), &temp).await.unwrap();

		let runtime = Runtime::new(
			Config::from_string(config_yaml()).unwrap(),
			OutputPlanner::new(temp.path().join("output")),
			Arc::new(MemoryCatalog::new()),
			blob,
			raster.clone(),
		);
		Pipeline { temp, runtime, raster }
	}

	/// s2cloudless backend over a test detector: a pixel is cloud when its
	/// B01 reflectance exceeds the threshold.
	fn backends(&self) -> Vec<Box<dyn MaskBackend>> {
		vec![Box::new(S2cloudlessBackend::new(
			self.runtime.blob.clone(),
			self.runtime.raster.clone(),
			self.runtime.planner.clone(),
			Arc::new(FnCloudDetector::band_threshold()),
			self.runtime.config.masks.s2cloudless_masks.clone(),
		))]
	}
}

/// Two captures (Oct 2 and Oct 7) in both buckets. Band B01 carries the
/// cloud pattern the test detector reacts to: the Oct 7 capture is cloudy
/// in its upper-left pixel, the Oct 2 capture is clear everywhere. B02
/// carries a per-capture fill value (1000 * day).
async fn seed_archive(
	raster: &GtiffRasterIo,
	blob: &FsBlobStore,
	temp: &assert_fs::TempDir,
) -> Result<()> {
	let scratch = temp.path().join("scratch");
	for day in [2u32, 7] {
		let key_root = format!("tiles/35/P/PM/2020/10/{day}/0");
		for bucket in [L1C_BUCKET, L2A_BUCKET] {
			blob
				.put(bucket, &format!("{key_root}/metadata.xml"), metadata_xml(day).as_bytes())
				.await?;
		}
		for band in [
			"B01", "B02", "B03", "B04", "B05", "B06", "B07", "B08", "B8A", "B09", "B10", "B11", "B12",
		] {
			let mut values = Array2::from_elem((GRID_SIZE, GRID_SIZE), 2000u16);
			if band == "B01" && day == 7 {
				values[[0, 0]] = 9000; // normalized 0.9 > cloud threshold
			}
			if band == "B02" {
				values.fill(1000 * day as u16);
			}
			if band == "B08" {
				values.fill(8000); // bright NIR, no shadow candidates
			}
			let path = scratch.join(format!("{day}_{band}.tif"));
			raster
				.write_geotiff(&path, &RasterBands::U16(vec![values]), "EPSG:32635", &grid_10m(), 0.0, Compression::Uncompressed)
				.await?;
			blob
				.put(L1C_BUCKET, &format!("{key_root}/{band}.jp2"), &std::fs::read(&path)?)
				.await?;
		}
	}
	Ok(())
}

/// The indexed L2A documents point at `s3://` JP2s the built-in raster
/// backend cannot decode; in production the injected backend reads them
/// directly. The test stands in for it by rewriting the B02 measurement to
/// a local GeoTIFF per capture.
async fn localize_l2a_bands(pipeline: &Pipeline) -> Result<()> {
	let raster = &pipeline.raster;
	let catalog = &pipeline.runtime.catalog;
	for mut doc in catalog.search(&SearchQuery::product(ProductName::S2Sen2corGranule)).await? {
		let day = doc.datetime().format("%d").to_string().parse::<u32>().unwrap();
		let path = pipeline.temp.path().join(format!("l2a_local/{day}_B02.tif"));
		let values = Array2::from_elem((GRID_SIZE, GRID_SIZE), 1000 * day as u16);
		raster
			.write_geotiff(&path, &RasterBands::U16(vec![values]), "EPSG:32635", &grid_10m(), 0.0, Compression::Uncompressed)
			.await?;
		doc.measurements.insert(
			"B02_10m".to_string(),
			Measurement::new(format!("file://{}", path.display())),
		);
		upsert(catalog.as_ref(), &doc).await?;
	}
	Ok(())
}

#[tokio::test]
async fn index_mask_mosaic_round_trip() -> Result<()> {
	let pipeline = Pipeline::new().await;
	let runtime = &pipeline.runtime;

	// index: both buckets, both captures
	let summary = run_index(runtime).await?;
	assert_eq!(summary.listed, 4);
	assert_eq!(summary.indexed, 4);

	// re-index is a no-op
	let second = run_index(runtime).await?;
	assert_eq!(second.indexed, 0);
	assert_eq!(second.skipped, 4);

	localize_l2a_bands(&pipeline).await?;

	// mask: one mask dataset per L1C capture
	let indexed_masks = run_mask(runtime, &pipeline.backends()).await?;
	assert_eq!(indexed_masks.len(), 2);
	for mask in &indexed_masks {
		assert_eq!(mask.product_name(), ProductName::S2Level1cS2cloudless);
		assert!(mask.properties.l2a_dataset_id.is_some());
		mask.validate()?;
	}

	// re-running the mask stage skips the existing outputs
	let rerun = run_mask(runtime, &pipeline.backends()).await?;
	assert!(rerun.is_empty());

	// mosaic: most recent clear pixel wins, recency records the source day
	let outputs = run_mosaic(runtime).await?;
	assert_eq!(outputs.len(), 1);
	let mosaic = &outputs[0];
	assert_eq!(mosaic.doc.product_name(), ProductName::S2cloudlessMosaic);

	let values = pipeline.raster.read(&mosaic.path, 1).await?;
	// cloud-free pixels come from the newest capture (Oct 7, value 7000)
	assert_eq!(values[[4, 4]], 7000.0);
	// the cloudy upper-left pixel of Oct 7 falls back to Oct 2
	assert_eq!(values[[0, 0]], 2000.0);

	let recency = pipeline.raster.read(&mosaic.path, 2).await?;
	assert_ne!(recency[[0, 0]], recency[[4, 4]]);

	// overviews exist next to the mosaic
	let overview = format!("{}.ovr", mosaic.path.display());
	assert!(std::path::Path::new(&overview).exists());
	Ok(())
}
