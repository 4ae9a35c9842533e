//! Catalog sink for written mosaics.
//!
//! The mosaic document reads its grid back from the written file, keys every
//! output band to a 1-based band index inside that single multi-band
//! GeoTIFF, and remembers the mask product it was composited from.

use cfsi_core::{
	Catalog, CatalogTrait as _, DatasetDoc, DocProperties, Measurement, OutputPlanner, ProductName, RasterIo, Result,
	upsert,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::Path;

pub struct MosaicIndexer {
	catalog: Catalog,
	raster: RasterIo,
	planner: OutputPlanner,
}

impl MosaicIndexer {
	pub fn new(catalog: Catalog, raster: RasterIo, planner: OutputPlanner) -> MosaicIndexer {
		MosaicIndexer { catalog, raster, planner }
	}

	/// Indexes a written mosaic file under the mask product's mosaic
	/// product. `band_names` lists the bands in file order, recency bands
	/// included.
	pub async fn index_mosaic(
		&self,
		mask_product: ProductName,
		path: &Path,
		band_names: &[String],
		datetime: DateTime<Utc>,
	) -> Result<DatasetDoc> {
		let info = self.raster.open(path).await?;
		let uri = self.planner.file_uri(path);

		let mut measurements = BTreeMap::new();
		for (index, name) in band_names.iter().enumerate() {
			measurements.insert(name.clone(), Measurement::new(uri.clone()).with_band(index + 1));
		}

		let mut grids = BTreeMap::new();
		grids.insert(cfsi_core::DEFAULT_GRID.to_string(), info.grid.clone());

		let file_name = path
			.file_name()
			.map(|name| name.to_string_lossy().to_string())
			.unwrap_or_default();
		let mut properties = DocProperties::new(file_name, datetime, "GTiff");
		properties.mask_name = Some(mask_product.to_string());

		let product = mask_product
			.mosaic()
			.ok_or_else(|| cfsi_core::CfsiError::ConfigInvalid(format!("{mask_product} has no mosaic product")))?;
		let doc = DatasetDoc::new(product, uri, info.crs.clone(), grids, measurements, properties);
		log::info!("indexing mosaic {}", path.display());
		upsert(self.catalog.as_ref(), &doc).await?;
		Ok(doc)
	}
}
