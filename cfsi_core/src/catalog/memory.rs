//! In-memory catalog for tests and dry runs.

use super::{CatalogTrait, SearchQuery, finish_search};
use crate::{CfsiError, DatasetDoc, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Default)]
pub struct MemoryCatalog {
	docs: RwLock<HashMap<String, DatasetDoc>>,
}

impl MemoryCatalog {
	pub fn new() -> MemoryCatalog {
		MemoryCatalog::default()
	}

	pub fn len(&self) -> usize {
		self.docs.read().unwrap().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

#[async_trait]
impl CatalogTrait for MemoryCatalog {
	async fn get(&self, id: &str) -> Result<Option<DatasetDoc>> {
		Ok(self.docs.read().unwrap().get(id).cloned())
	}

	async fn search(&self, query: &SearchQuery) -> Result<Vec<DatasetDoc>> {
		let docs = self.docs.read().unwrap();
		let hits = docs.values().filter(|doc| query.matches(doc)).cloned().collect();
		Ok(finish_search(hits, query.limit))
	}

	async fn add(&self, doc: &DatasetDoc) -> Result<()> {
		doc.validate()?;
		let mut docs = self.docs.write().unwrap();
		match docs.get(&doc.id) {
			Some(existing) if existing == doc => Ok(()),
			Some(_) => Err(CfsiError::DocumentMismatch(doc.id.clone())),
			None => {
				docs.insert(doc.id.clone(), doc.clone());
				Ok(())
			}
		}
	}

	async fn update(&self, doc: &DatasetDoc) -> Result<()> {
		doc.validate()?;
		let mut docs = self.docs.write().unwrap();
		if !docs.contains_key(&doc.id) {
			return Err(CfsiError::CatalogNotFound(doc.id.clone()));
		}
		docs.insert(doc.id.clone(), doc.clone());
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::super::upsert;
	use super::*;
	use crate::{DEFAULT_GRID, DocProperties, GridSpec, Measurement, ProductName};
	use std::collections::BTreeMap;

	fn doc(uri: &str, datetime: &str) -> DatasetDoc {
		let mut grids = BTreeMap::new();
		grids.insert(
			DEFAULT_GRID.to_string(),
			GridSpec::from_geoposition(10980, 10980, 600000.0, 1000020.0, 10.0, -10.0),
		);
		let mut measurements = BTreeMap::new();
		measurements.insert("B02".to_string(), Measurement::new(format!("{uri}/B02.jp2")));
		DatasetDoc::new(
			ProductName::S2Level1cGranule,
			uri.to_string(),
			"EPSG:32635".to_string(),
			grids,
			measurements,
			DocProperties::new("tile".to_string(), datetime.parse().unwrap(), "JPEG2000"),
		)
	}

	#[tokio::test]
	async fn add_is_idempotent_for_identical_docs() -> Result<()> {
		let catalog = MemoryCatalog::new();
		let d = doc("s3://sentinel-s2-l1c/tiles/35/P/PM/2020/10/2/0", "2020-10-02T08:48:04Z");
		catalog.add(&d).await?;
		catalog.add(&d).await?;
		assert_eq!(catalog.len(), 1);
		Ok(())
	}

	#[tokio::test]
	async fn mismatch_falls_back_to_update() -> Result<()> {
		let catalog = MemoryCatalog::new();
		let d = doc("s3://sentinel-s2-l1c/tiles/35/P/PM/2020/10/2/0", "2020-10-02T08:48:04Z");
		catalog.add(&d).await?;

		let mut changed = d.clone();
		changed.properties.cloudy_pixel_percentage = Some(12.0);
		assert!(matches!(
			catalog.add(&changed).await,
			Err(CfsiError::DocumentMismatch(_))
		));

		upsert(&catalog, &changed).await?;
		assert_eq!(
			catalog.get(&d.id).await?.unwrap().properties.cloudy_pixel_percentage,
			Some(12.0)
		);
		Ok(())
	}

	#[tokio::test]
	async fn search_orders_by_time_and_respects_limit() -> Result<()> {
		let catalog = MemoryCatalog::new();
		let newer = doc("s3://sentinel-s2-l1c/tiles/35/P/PM/2020/10/7/0", "2020-10-07T08:48:04Z");
		let older = doc("s3://sentinel-s2-l1c/tiles/35/P/PM/2020/10/2/0", "2020-10-02T08:48:04Z");
		catalog.add(&newer).await?;
		catalog.add(&older).await?;

		let hits = catalog
			.search(&SearchQuery::product(ProductName::S2Level1cGranule))
			.await?;
		assert_eq!(hits.len(), 2);
		assert_eq!(hits[0].id, older.id);

		let limited = catalog
			.search(&SearchQuery::product(ProductName::S2Level1cGranule).with_limit(1))
			.await?;
		assert_eq!(limited.len(), 1);
		Ok(())
	}

	#[tokio::test]
	async fn time_range_is_inclusive() -> Result<()> {
		let catalog = MemoryCatalog::new();
		let d = doc("s3://sentinel-s2-l1c/tiles/35/P/PM/2020/10/2/0", "2020-10-02T08:48:04Z");
		catalog.add(&d).await?;

		let query = SearchQuery::product(ProductName::S2Level1cGranule)
			.with_time("2020-10-02T08:48:04Z".parse().unwrap(), "2020-10-30T00:00:00Z".parse().unwrap());
		assert_eq!(catalog.search(&query).await?.len(), 1);

		let miss = SearchQuery::product(ProductName::S2Level1cGranule)
			.with_time("2020-10-03T00:00:00Z".parse().unwrap(), "2020-10-30T00:00:00Z".parse().unwrap());
		assert!(catalog.search(&miss).await?.is_empty());
		Ok(())
	}
}
