//! SQLite-backed catalog.
//!
//! Documents are stored as JSON alongside the columns the search paths
//! filter on (product, uri, datetime). Timestamps are serialized as UTC
//! RFC 3339 with fixed precision so the inclusive range filter can compare
//! them lexically. Connections come from an `r2d2` pool; every worker clones
//! the handle and gets its own connection.

use super::{CatalogTrait, SearchQuery, finish_search};
use crate::{CfsiError, DatasetDoc, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use r2d2_sqlite::rusqlite::{OptionalExtension, params};
use std::path::Path;

pub struct SqliteCatalog {
	pool: Pool<SqliteConnectionManager>,
}

fn catalog_error<E: std::fmt::Display>(err: E) -> CfsiError {
	CfsiError::CatalogFailed(err.to_string())
}

fn timestamp(datetime: DateTime<Utc>) -> String {
	datetime.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl SqliteCatalog {
	/// Opens (or creates) the catalog database and ensures the schema.
	pub fn open(path: &Path) -> Result<SqliteCatalog> {
		if let Some(parent) = path.parent() {
			std::fs::create_dir_all(parent)?;
		}
		let manager = SqliteConnectionManager::file(path);
		let pool = Pool::builder().max_size(16).build(manager).map_err(catalog_error)?;
		let catalog = SqliteCatalog { pool };
		catalog.init_schema()?;
		Ok(catalog)
	}

	/// In-memory database, one shared connection. Test use only.
	pub fn open_in_memory() -> Result<SqliteCatalog> {
		let manager = SqliteConnectionManager::memory();
		let pool = Pool::builder().max_size(1).build(manager).map_err(catalog_error)?;
		let catalog = SqliteCatalog { pool };
		catalog.init_schema()?;
		Ok(catalog)
	}

	pub fn init_schema(&self) -> Result<()> {
		self
			.connection()?
			.execute_batch(
				"CREATE TABLE IF NOT EXISTS datasets (
					id TEXT PRIMARY KEY,
					product TEXT NOT NULL,
					uri TEXT NOT NULL,
					datetime TEXT NOT NULL,
					doc TEXT NOT NULL
				);
				CREATE INDEX IF NOT EXISTS idx_datasets_product ON datasets (product);
				CREATE INDEX IF NOT EXISTS idx_datasets_uri ON datasets (uri);
				CREATE INDEX IF NOT EXISTS idx_datasets_datetime ON datasets (datetime);",
			)
			.map_err(catalog_error)
	}

	fn connection(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
		self.pool.get().map_err(catalog_error)
	}

	fn row_to_doc(json: &str) -> Result<DatasetDoc> {
		serde_json::from_str(json).map_err(catalog_error)
	}
}

#[async_trait]
impl CatalogTrait for SqliteCatalog {
	async fn get(&self, id: &str) -> Result<Option<DatasetDoc>> {
		let connection = self.connection()?;
		let json: Option<String> = connection
			.query_row("SELECT doc FROM datasets WHERE id = ?1", params![id], |row| row.get(0))
			.optional()
			.map_err(catalog_error)?;
		json.as_deref().map(Self::row_to_doc).transpose()
	}

	async fn search(&self, query: &SearchQuery) -> Result<Vec<DatasetDoc>> {
		let mut sql = "SELECT doc FROM datasets WHERE 1=1".to_string();
		let mut values: Vec<String> = Vec::new();

		if let Some(product) = query.product {
			sql.push_str(&format!(" AND product = ?{}", values.len() + 1));
			values.push(product.to_string());
		}
		if let Some(uri) = &query.uri {
			sql.push_str(&format!(" AND uri = ?{}", values.len() + 1));
			values.push(uri.clone());
		}
		if let Some((start, end)) = query.time {
			sql.push_str(&format!(" AND datetime >= ?{}", values.len() + 1));
			values.push(timestamp(start));
			sql.push_str(&format!(" AND datetime <= ?{}", values.len() + 1));
			values.push(timestamp(end));
		}

		let connection = self.connection()?;
		let mut statement = connection.prepare(&sql).map_err(catalog_error)?;
		let rows = statement
			.query_map(
				r2d2_sqlite::rusqlite::params_from_iter(values.iter()),
				|row| row.get::<_, String>(0),
			)
			.map_err(catalog_error)?;

		let mut docs = Vec::new();
		for row in rows {
			docs.push(Self::row_to_doc(&row.map_err(catalog_error)?)?);
		}
		Ok(finish_search(docs, query.limit))
	}

	async fn add(&self, doc: &DatasetDoc) -> Result<()> {
		doc.validate()?;
		let json = serde_json::to_string(doc).map_err(catalog_error)?;
		let connection = self.connection()?;
		let inserted = connection
			.execute(
				"INSERT OR IGNORE INTO datasets (id, product, uri, datetime, doc) VALUES (?1, ?2, ?3, ?4, ?5)",
				params![
					doc.id,
					doc.product_name().as_str(),
					doc.uri,
					timestamp(doc.datetime()),
					json
				],
			)
			.map_err(catalog_error)?;
		if inserted == 1 {
			return Ok(());
		}

		// id already present: identical content is a no-op, anything else
		// must go through update
		let existing: String = connection
			.query_row("SELECT doc FROM datasets WHERE id = ?1", params![doc.id], |row| {
				row.get(0)
			})
			.map_err(catalog_error)?;
		if Self::row_to_doc(&existing)? == *doc {
			Ok(())
		} else {
			Err(CfsiError::DocumentMismatch(doc.id.clone()))
		}
	}

	async fn update(&self, doc: &DatasetDoc) -> Result<()> {
		doc.validate()?;
		let json = serde_json::to_string(doc).map_err(catalog_error)?;
		let connection = self.connection()?;
		let updated = connection
			.execute(
				"UPDATE datasets SET product = ?2, uri = ?3, datetime = ?4, doc = ?5 WHERE id = ?1",
				params![
					doc.id,
					doc.product_name().as_str(),
					doc.uri,
					timestamp(doc.datetime()),
					json
				],
			)
			.map_err(catalog_error)?;
		if updated == 0 {
			return Err(CfsiError::CatalogNotFound(doc.id.clone()));
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::super::{find_by_uri, upsert};
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
			ProductName::S2Sen2corGranule,
			uri.to_string(),
			"EPSG:32635".to_string(),
			grids,
			measurements,
			DocProperties::new("tile".to_string(), datetime.parse().unwrap(), "JPEG2000"),
		)
	}

	#[tokio::test]
	async fn round_trip_through_file_database() -> Result<()> {
		let temp = tempfile::tempdir().unwrap();
		let catalog = SqliteCatalog::open(&temp.path().join("catalog.sqlite"))?;

		let d = doc("s3://sentinel-s2-l2a/tiles/35/P/PM/2020/10/2/0", "2020-10-02T08:48:04Z");
		catalog.add(&d).await?;
		assert!(catalog.exists(&d.id).await?);
		assert_eq!(catalog.get(&d.id).await?.unwrap(), d);
		Ok(())
	}

	#[tokio::test]
	async fn add_then_mismatch_then_upsert() -> Result<()> {
		let catalog = SqliteCatalog::open_in_memory()?;
		let d = doc("s3://sentinel-s2-l2a/tiles/35/P/PM/2020/10/2/0", "2020-10-02T08:48:04Z");
		catalog.add(&d).await?;
		catalog.add(&d).await?;

		let mut changed = d.clone();
		changed.properties.cloudy_pixel_percentage = Some(50.0);
		assert!(matches!(
			catalog.add(&changed).await,
			Err(CfsiError::DocumentMismatch(_))
		));
		upsert(&catalog, &changed).await?;
		assert_eq!(
			catalog.get(&d.id).await?.unwrap().properties.cloudy_pixel_percentage,
			Some(50.0)
		);
		Ok(())
	}

	#[tokio::test]
	async fn search_by_product_uri_and_time() -> Result<()> {
		let catalog = SqliteCatalog::open_in_memory()?;
		let first = doc("s3://sentinel-s2-l2a/tiles/35/P/PM/2020/10/2/0", "2020-10-02T08:48:04Z");
		let second = doc("s3://sentinel-s2-l2a/tiles/35/P/PM/2020/10/7/0", "2020-10-07T08:48:04Z");
		catalog.add(&first).await?;
		catalog.add(&second).await?;

		let by_uri = find_by_uri(&catalog, ProductName::S2Sen2corGranule, &first.uri).await?;
		assert_eq!(by_uri.id, first.id);

		let windowed = catalog
			.search(
				&SearchQuery::product(ProductName::S2Sen2corGranule)
					.with_time("2020-10-05T00:00:00Z".parse().unwrap(), "2020-10-30T00:00:00Z".parse().unwrap()),
			)
			.await?;
		assert_eq!(windowed.len(), 1);
		assert_eq!(windowed[0].id, second.id);

		assert!(matches!(
			find_by_uri(&catalog, ProductName::S2Sen2corGranule, "s3://sentinel-s2-l2a/tiles/nope").await,
			Err(CfsiError::CatalogNotFound(_))
		));
		Ok(())
	}

	#[tokio::test]
	async fn update_of_missing_doc_fails() {
		let catalog = SqliteCatalog::open_in_memory().unwrap();
		let d = doc("s3://sentinel-s2-l2a/tiles/35/P/PM/2020/10/2/0", "2020-10-02T08:48:04Z");
		assert!(matches!(
			catalog.update(&d).await,
			Err(CfsiError::CatalogNotFound(_))
		));
	}
}
