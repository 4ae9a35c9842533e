//! Catalog sink for generated mask rasters.
//!
//! A mask document inherits the originating L1C granule's properties and
//! grid, points its measurements at the locally written GeoTIFFs (as
//! translated absolute `file://` URIs) and records the matching L2A dataset
//! id so the compositor can join the two. A missing L2A sibling is not an
//! error here; the document is written without the id and the compositor
//! falls back to a URI lookup or skips it.

use cfsi_core::{
	Catalog, CatalogTrait as _, CfsiError, DatasetDoc, GridSpec, Measurement, OutputPlanner, ProductName, Result,
	find_by_uri, swap_bucket_names, upsert,
};
use std::collections::BTreeMap;
use std::path::PathBuf;

pub struct MaskIndexer {
	catalog: Catalog,
	planner: OutputPlanner,
}

impl MaskIndexer {
	pub fn new(catalog: Catalog, planner: OutputPlanner) -> MaskIndexer {
		MaskIndexer { catalog, planner }
	}

	/// Id of the L2A dataset sharing the L1C granule's tile, found through
	/// the swapped bucket URI.
	pub async fn l2a_dataset_id(&self, l1c: &DatasetDoc) -> Result<Option<String>> {
		let swapped = swap_bucket_names(&l1c.uri)?;
		match find_by_uri(self.catalog.as_ref(), ProductName::S2Sen2corGranule, &swapped).await {
			Ok(doc) => Ok(Some(doc.id)),
			Err(CfsiError::CatalogNotFound(_)) => {
				log::warn!("no L2A dataset for {}, mask will carry no l2a_dataset_id", l1c.uri);
				Ok(None)
			}
			Err(err) => Err(err),
		}
	}

	/// Builds and upserts the document for one granule's mask output.
	/// `masks` maps measurement names (`cloud_mask`, `shadow_mask`, `fmask`)
	/// to the written files; `grid` is the grid the masks were written on.
	pub async fn index_masks(
		&self,
		l1c: &DatasetDoc,
		product: ProductName,
		grid: &GridSpec,
		masks: &BTreeMap<String, PathBuf>,
	) -> Result<DatasetDoc> {
		let first = masks
			.values()
			.next()
			.ok_or_else(|| CfsiError::RasterIoFailed("no mask files to index".to_string()))?;
		let base_directory = first
			.parent()
			.ok_or_else(|| CfsiError::RasterIoFailed(format!("mask path {} has no parent", first.display())))?;
		let uri = self.planner.file_uri(base_directory);

		let mut measurements = BTreeMap::new();
		for (name, path) in masks {
			measurements.insert(name.clone(), Measurement::new(self.planner.file_uri(path)));
		}

		let mut grids = BTreeMap::new();
		grids.insert(cfsi_core::DEFAULT_GRID.to_string(), grid.clone());

		let mut properties = l1c.properties.clone();
		properties.file_format = "GTiff".to_string();
		properties.l2a_dataset_id = self.l2a_dataset_id(l1c).await?;

		let doc = DatasetDoc::new(product, uri, l1c.crs.clone(), grids, measurements, properties);
		log::info!("indexing {product} masks for {}", l1c.uri);
		upsert(self.catalog.as_ref(), &doc).await?;
		Ok(doc)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::indexer::S2Indexer;
	use crate::metadata::tests::sample_metadata_xml;
	use cfsi_core::{
		BlobStoreTrait as _, CatalogTrait as _, FsBlobStore, L1C_BUCKET, L2A_BUCKET, MemoryCatalog, SearchQuery,
		config::S2IndexConfig,
	};
	use std::sync::Arc;

	async fn indexed_granules(catalog: Arc<MemoryCatalog>, buckets: &[&str]) {
		let temp = assert_fs::TempDir::new().unwrap();
		let store = Arc::new(FsBlobStore::new(temp.path()));
		for bucket in buckets {
			store
				.put(bucket, "tiles/35/P/PM/2020/10/2/0/metadata.xml", sample_metadata_xml().as_bytes())
				.await
				.unwrap();
			let indexer = S2Indexer::new(store.clone(), catalog.clone(), S2IndexConfig::default());
			indexer
				.index_key(bucket, "tiles/35/P/PM/2020/10/2/0/metadata.xml")
				.await
				.unwrap();
		}
	}

	fn mask_paths() -> BTreeMap<String, PathBuf> {
		let mut masks = BTreeMap::new();
		masks.insert(
			"cloud_mask".to_string(),
			PathBuf::from("/output/tiles/35/P/PM/2020/10/2/0/s2_level1c_s2cloudless/tile_clouds.tif"),
		);
		masks.insert(
			"shadow_mask".to_string(),
			PathBuf::from("/output/tiles/35/P/PM/2020/10/2/0/s2_level1c_s2cloudless/tile_shadows.tif"),
		);
		masks
	}

	#[tokio::test]
	async fn mask_doc_links_l2a_and_translates_paths() -> Result<()> {
		let catalog = Arc::new(MemoryCatalog::new());
		indexed_granules(catalog.clone(), &[L1C_BUCKET, L2A_BUCKET]).await;

		let l1c = catalog
			.search(&SearchQuery::product(ProductName::S2Level1cGranule))
			.await?
			.remove(0);
		let l2a = catalog
			.search(&SearchQuery::product(ProductName::S2Sen2corGranule))
			.await?
			.remove(0);

		let planner = OutputPlanner::with_host_root("/output", "/srv/cfsi");
		let indexer = MaskIndexer::new(catalog.clone(), planner);
		let grid = l1c.default_grid()?.clone();
		let doc = indexer
			.index_masks(&l1c, ProductName::S2Level1cS2cloudless, &grid, &mask_paths())
			.await?;

		assert_eq!(doc.properties.l2a_dataset_id.as_deref(), Some(l2a.id.as_str()));
		assert_eq!(doc.properties.tile_id, l1c.properties.tile_id);
		assert_eq!(doc.properties.file_format, "GTiff");
		assert!(doc.uri.starts_with("file:///srv/cfsi/tiles/35/P/PM"));
		assert!(doc.measurements["cloud_mask"].path.starts_with("file:///srv/cfsi/"));
		assert_eq!(doc.default_grid()?, &grid);
		assert!(catalog.get(&doc.id).await?.is_some());
		Ok(())
	}

	#[tokio::test]
	async fn missing_l2a_is_tolerated() -> Result<()> {
		let catalog = Arc::new(MemoryCatalog::new());
		indexed_granules(catalog.clone(), &[L1C_BUCKET]).await;

		let l1c = catalog
			.search(&SearchQuery::product(ProductName::S2Level1cGranule))
			.await?
			.remove(0);
		let planner = OutputPlanner::new("/output");
		let indexer = MaskIndexer::new(catalog.clone(), planner);
		let grid = l1c.default_grid()?.clone();
		let doc = indexer
			.index_masks(&l1c, ProductName::S2Level1cS2cloudless, &grid, &mask_paths())
			.await?;
		assert_eq!(doc.properties.l2a_dataset_id, None);
		Ok(())
	}
}
